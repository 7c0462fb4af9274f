//! Method and class containers as handed over by the class-file reader.

use std::collections::HashMap;

use crate::classfile::flags;
use crate::classfile::instr::{Instruction, LabelId};
use crate::consts;

/// One entry of the exception table (JVMS 4.7.3): the range
/// `[start, end)` is guarded by `handler`. `catch_type` is the caught class
/// in internal form; `None` means catch-all (finally ranges).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExceptionRange {
    pub start: LabelId,
    pub end: LabelId,
    pub handler: LabelId,
    pub catch_type: Option<String>,
}

/// One LocalVariableTable entry (JVMS 4.7.13): slot `slot` holds a variable
/// named `name` of type `descriptor` over the label range `[start, end)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVarInfo {
    pub name: String,
    pub descriptor: String,
    pub signature: Option<String>,
    pub start: LabelId,
    pub end: LabelId,
    pub slot: u16,
}

/// Decoded body of a concrete method.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodCode {
    pub instructions: Vec<Instruction>,
    /// Exception ranges in dispatch order.
    pub exception_table: Vec<ExceptionRange>,
    pub local_vars: Vec<LocalVarInfo>,
    pub max_locals: u16,
}

impl MethodCode {
    /// Map every defined label to its list position.
    pub fn label_positions(&self) -> HashMap<LabelId, usize> {
        let mut positions = HashMap::new();
        for (index, insn) in self.instructions.iter().enumerate() {
            if let Instruction::Label(label) = insn {
                positions.insert(*label, index);
            }
        }
        positions
    }
}

/// A method as declared in a class file, body included when concrete.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodDef {
    /// Internal name of the declaring class.
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    pub signature: Option<String>,
    /// Declared checked exceptions, internal names.
    pub exceptions: Vec<String>,
    /// `None` for native and abstract methods.
    pub code: Option<MethodCode>,
}

impl MethodDef {
    pub fn is_static(&self) -> bool {
        flags::is_static(self.access)
    }

    pub fn is_constructor(&self) -> bool {
        self.name == consts::CONSTRUCTOR_NAME
    }

    /// `owner.name(descriptor)` form used in error messages.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}{}", self.class_name, self.name, self.descriptor)
    }
}

/// The slice of a class declaration this crate consumes.
#[derive(Debug, Clone, PartialEq)]
pub struct ClassDef {
    pub name: String,
    pub super_name: Option<String>,
    pub access: u16,
    pub methods: Vec<MethodDef>,
}
