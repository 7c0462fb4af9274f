//! Input model: decoded class-file methods, instructions and types.

pub mod descriptor;
pub mod flags;
pub mod instr;
pub mod method;
pub mod types;

pub use descriptor::{parse_field_descriptor, parse_method_descriptor, MethodDescriptor};
pub use instr::{
    ArrayKind, BinaryOp, CmpVariant, Cond, ConstValue, FieldRef, Instruction, InvokeKind, LabelId,
    MethodRef, OpType,
};
pub use method::{ClassDef, ExceptionRange, LocalVarInfo, MethodCode, MethodDef};
pub use types::Type;
