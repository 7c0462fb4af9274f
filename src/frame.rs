//! Frames: the oracle-computed static type state at each program point.
//!
//! The dataflow fixed-point itself lives outside this crate; lowering only
//! consumes its result through [`FrameOracle`]. Frames here are value-indexed
//! on the stack side: a long or double occupies one stack entry (its second
//! slot is implicit), while local slots are indexed exactly as in the class
//! file, with the high half of a wide value marked [`SlotType::Uninit`].

use crate::classfile::{MethodCode, MethodDef, Type};
use crate::common::Result;

/// Static type of one local slot or stack entry.
#[derive(Debug, Clone, PartialEq)]
pub enum SlotType {
    /// Unknown or dead: never-written locals, high halves of wide values,
    /// and slots the analysis proved unused past this point.
    Uninit,
    Value(Type),
}

impl SlotType {
    pub fn as_type(&self) -> Option<&Type> {
        match self {
            SlotType::Uninit => None,
            SlotType::Value(ty) => Some(ty),
        }
    }

    pub fn is_uninit(&self) -> bool {
        matches!(self, SlotType::Uninit)
    }
}

impl From<Type> for SlotType {
    fn from(ty: Type) -> Self {
        SlotType::Value(ty)
    }
}

/// Types of all locals and stack entries at one program point.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Frame {
    pub locals: Vec<SlotType>,
    pub stack: Vec<SlotType>,
}

impl Frame {
    pub fn new(locals: Vec<SlotType>, stack: Vec<SlotType>) -> Self {
        Frame { locals, stack }
    }

    /// Number of values on the stack (category-2 values count once).
    pub fn stack_height(&self) -> usize {
        self.stack.len()
    }

    /// Stack entry `depth` positions below the top (0 = top).
    pub fn stack_from_top(&self, depth: usize) -> Option<&SlotType> {
        let height = self.stack.len();
        if depth < height {
            self.stack.get(height - 1 - depth)
        } else {
            None
        }
    }

    pub fn local(&self, slot: u16) -> Option<&SlotType> {
        self.locals.get(slot as usize)
    }
}

/// Entry frames for every instruction of one method body.
///
/// `before(i)` is the state on entry to instruction `i`; `after(i)` is
/// defined as `before(i + 1)`. Both are `None` for unreachable positions,
/// and `after` of an instruction that never falls through is `None`.
#[derive(Debug, Clone, PartialEq)]
pub struct FrameTable {
    frames: Vec<Option<Frame>>,
}

impl FrameTable {
    /// Build from one entry frame per instruction, `None` for unreachable.
    pub fn new(frames: Vec<Option<Frame>>) -> Self {
        FrameTable { frames }
    }

    pub fn before(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index).and_then(|f| f.as_ref())
    }

    pub fn after(&self, index: usize) -> Option<&Frame> {
        self.before(index + 1)
    }

    pub fn is_reachable(&self, index: usize) -> bool {
        self.before(index).is_some()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// The external dataflow analysis, seen from the lowering side.
///
/// Called once per method before lowering, and a second time when the
/// dead-code pass removed instructions (dropping dead merge predecessors can
/// tighten the surviving types).
pub trait FrameOracle {
    fn analyze(&self, method: &MethodDef, code: &MethodCode) -> Result<FrameTable>;
}
