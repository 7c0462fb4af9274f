//! Decoded method-body instructions.
//!
//! One variant per lowering-relevant instruction shape rather than per raw
//! opcode: the concrete opcode families (`iload`/`lload`/..., `iadd`/`ladd`/...)
//! collapse into a shape plus an operand kind. Label and line-number markers
//! are carried inline in the instruction list (JVMS 4.7.12, 4.7.13 attribute
//! data, already resolved to list positions by the class-file reader).

use crate::classfile::types::Type;

/// Symbolic position in an instruction list. Branches, exception ranges and
/// local-variable scopes all refer to labels; a downstream linker resolves
/// them, this crate only keeps them stable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

/// Operand kind of a typed opcode family (the `i`/`l`/`f`/`d`/`a` prefix).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    Int,
    Long,
    Float,
    Double,
    Reference,
}

impl OpType {
    /// The stack type this operand kind denotes. Reference operands are only
    /// known up to `java/lang/Object` from the opcode alone.
    pub fn as_type(&self) -> Type {
        match self {
            OpType::Int => Type::Int,
            OpType::Long => Type::Long,
            OpType::Float => Type::Float,
            OpType::Double => Type::Double,
            OpType::Reference => Type::object().clone(),
        }
    }
}

/// Element kind of an array access opcode. `Byte` covers both `byte[]` and
/// `boolean[]` (JVMS baload/bastore); the operand frame disambiguates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    Int,
    Long,
    Float,
    Double,
    Reference,
    Byte,
    Char,
    Short,
}

/// Binary arithmetic, shift and bitwise operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    Shl,
    Shr,
    Ushr,
    And,
    Or,
    Xor,
}

/// The `lcmp`/`fcmpl`/`fcmpg`/`dcmpl`/`dcmpg` family. The `G`/`L` suffix
/// decides the result for unordered (NaN) float/double operands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpVariant {
    LCmp,
    FCmpL,
    FCmpG,
    DCmpL,
    DCmpG,
}

/// Relational sense of a conditional branch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Cond {
    Eq,
    Ne,
    Lt,
    Ge,
    Gt,
    Le,
}

/// Dispatch form of an invoke opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InvokeKind {
    Static,
    Virtual,
    Special,
    Interface,
}

/// Loadable constant (JVMS 4.4, ldc-reachable kinds plus the short const
/// opcodes). Method-handle, method-type and dynamically-computed constants
/// are carried so the engine can report them; they have no lowering.
#[derive(Debug, Clone, PartialEq)]
pub enum ConstValue {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(Type),
    MethodHandle,
    MethodType,
    Dynamic,
}

/// Symbolic reference to a method (owner in internal form).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

/// Symbolic reference to a field (owner in internal form).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FieldRef {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
}

/// One decoded instruction or inline marker.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    // Markers
    Label(LabelId),
    Line(u32),
    Nop,

    // Constants
    Push(ConstValue),

    // Local variable access
    Load { kind: OpType, slot: u16 },
    Store { kind: OpType, slot: u16 },
    Iinc { slot: u16, delta: i32 },

    // Array access
    ArrayLoad(ArrayKind),
    ArrayStore(ArrayKind),

    // Operand stack shuffling
    Pop,
    Pop2,
    Dup,
    DupX1,
    DupX2,
    Dup2,
    Dup2X1,
    Dup2X2,
    Swap,

    // Arithmetic
    Binary { op: BinaryOp, kind: OpType },
    Neg(OpType),
    Convert { from: OpType, to: Type },
    Cmp(CmpVariant),

    // Control flow
    If { cond: Cond, target: LabelId },
    IfICmp { cond: Cond, target: LabelId },
    IfACmp { equal: bool, target: LabelId },
    IfNull { is_null: bool, target: LabelId },
    Goto(LabelId),
    Jsr(LabelId),
    Ret { slot: u16 },
    TableSwitch { low: i32, high: i32, default: LabelId, targets: Vec<LabelId> },
    LookupSwitch { default: LabelId, pairs: Vec<(i32, LabelId)> },
    Return(Option<OpType>),
    Athrow,

    // Field access
    GetStatic(FieldRef),
    PutStatic(FieldRef),
    GetField(FieldRef),
    PutField(FieldRef),

    // Invocation
    Invoke { kind: InvokeKind, method: MethodRef },
    InvokeDynamic { name: String, descriptor: String },

    // Object and array creation
    New(String),
    NewArray(Type),
    MultiNewArray { array_type: Type, dims: u8 },
    ArrayLength,
    CheckCast(Type),
    InstanceOf(Type),

    // Synchronization
    MonitorEnter,
    MonitorExit,
}

impl Instruction {
    pub fn is_label(&self) -> bool {
        matches!(self, Instruction::Label(_))
    }

    pub fn is_marker(&self) -> bool {
        matches!(self, Instruction::Label(_) | Instruction::Line(_) | Instruction::Nop)
    }

    /// Labels this instruction can transfer control to.
    pub fn targets(&self) -> Vec<LabelId> {
        match self {
            Instruction::If { target, .. }
            | Instruction::IfICmp { target, .. }
            | Instruction::IfACmp { target, .. }
            | Instruction::IfNull { target, .. }
            | Instruction::Goto(target)
            | Instruction::Jsr(target) => vec![*target],
            Instruction::TableSwitch { default, targets, .. } => {
                let mut all = vec![*default];
                all.extend(targets.iter().copied());
                all
            }
            Instruction::LookupSwitch { default, pairs } => {
                let mut all = vec![*default];
                all.extend(pairs.iter().map(|(_, t)| *t));
                all
            }
            _ => Vec::new(),
        }
    }

    /// Whether execution can continue at the next list position. `jsr`
    /// counts as falling through: its return point is the instruction after
    /// it, which the inliner treats as the in-routine successor.
    pub fn falls_through(&self) -> bool {
        !matches!(
            self,
            Instruction::Goto(_)
                | Instruction::Ret { .. }
                | Instruction::TableSwitch { .. }
                | Instruction::LookupSwitch { .. }
                | Instruction::Return(_)
                | Instruction::Athrow
        )
    }

    /// Copy of this instruction with every label reference passed through
    /// `f`. Label definitions themselves are remapped too.
    pub fn remap_labels(&self, f: impl Fn(LabelId) -> LabelId) -> Instruction {
        match self {
            Instruction::Label(l) => Instruction::Label(f(*l)),
            Instruction::If { cond, target } => Instruction::If { cond: *cond, target: f(*target) },
            Instruction::IfICmp { cond, target } => {
                Instruction::IfICmp { cond: *cond, target: f(*target) }
            }
            Instruction::IfACmp { equal, target } => {
                Instruction::IfACmp { equal: *equal, target: f(*target) }
            }
            Instruction::IfNull { is_null, target } => {
                Instruction::IfNull { is_null: *is_null, target: f(*target) }
            }
            Instruction::Goto(target) => Instruction::Goto(f(*target)),
            Instruction::Jsr(target) => Instruction::Jsr(f(*target)),
            Instruction::TableSwitch { low, high, default, targets } => Instruction::TableSwitch {
                low: *low,
                high: *high,
                default: f(*default),
                targets: targets.iter().map(|t| f(*t)).collect(),
            },
            Instruction::LookupSwitch { default, pairs } => Instruction::LookupSwitch {
                default: f(*default),
                pairs: pairs.iter().map(|(k, t)| (*k, f(*t))).collect(),
            },
            other => other.clone(),
        }
    }
}
