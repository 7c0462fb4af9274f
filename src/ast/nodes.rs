//! Three-address statement and expression nodes.
//!
//! Every value flows through a named [`Variable`]; there is no implicit
//! operand stack. Control flow is flat: labels, gotos, case markers and
//! catch-block links all carry symbolic ids that a downstream linker
//! resolves into real references.

use std::fmt;

use crate::classfile::{BinaryOp, Cond, FieldRef, LabelId, MethodRef, Type};

// Variables

/// Handle into a method's variable list. Two handles are the same variable
/// exactly when they are equal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

/// Role a variable plays in the method.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VarOrigin {
    /// The receiver of an instance method.
    This,
    /// A declared parameter.
    Parameter,
    /// Engine-synthesized: stack temporaries, unnamed locals, caught
    /// exceptions, swap temporaries.
    Synthetic,
    /// A named local from debug info.
    Local,
}

/// One named value of the lowered method.
#[derive(Debug, Clone, PartialEq)]
pub struct Variable {
    /// Deterministic identity string (`s_0_I`, `p_1_J`, `count_2_I`, ...).
    pub id: String,
    /// Display name; equals `id` unless debug info supplied a source name.
    pub name: String,
    pub ty: Type,
    pub signature: Option<String>,
    pub origin: VarOrigin,
}

impl Variable {
    pub fn is_synthetic(&self) -> bool {
        matches!(self.origin, VarOrigin::Synthetic)
    }
}

// Symbolic ids

/// Identifies one case of one switch: `switch_index` numbers the switches
/// of the method in lowering order, `case_index` the cases of that switch
/// with 0 reserved for the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CaseId {
    pub switch_index: u32,
    pub case_index: u32,
}

/// Identifies one exception handler (one per distinct handler label).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct HandlerId(pub u32);

// Expressions

/// Loadable constant in expression position.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    Class(Type),
}

/// How a cast behaves at runtime (see the crate docs on boolean aliasing).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    /// Bit-level or static-type adjustment; can never throw.
    Reinterpret,
    /// Checked class cast or numeric conversion; observable at runtime.
    Dynamic,
}

/// Dispatch classification of a call site, decidable from the invoke
/// opcode and the target name alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MethodKind {
    Static,
    InstanceVirtual,
    InstanceNonVirtual,
}

/// Whether the call needs runtime dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKind {
    Direct,
    Virtual,
}

/// Resolved call target with its dispatch classification.
#[derive(Debug, Clone, PartialEq)]
pub struct CallTarget {
    pub method: MethodRef,
    pub kind: MethodKind,
    pub dispatch: DispatchKind,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(Literal),
    Var(VarId),
    /// Binary arithmetic over `operand_ty` operands.
    Binary {
        op: BinaryOp,
        operand_ty: Type,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Neg {
        operand_ty: Type,
        operand: Box<Expr>,
    },
    /// Relational test; result is boolean-valued.
    Compare {
        cond: Cond,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Not(Box<Expr>),
    Cast {
        kind: CastKind,
        ty: Type,
        expr: Box<Expr>,
    },
    ArrayGet {
        array: Box<Expr>,
        index: Box<Expr>,
    },
    ArrayLength(Box<Expr>),
    /// Field read; `object` is `None` for static fields.
    FieldGet {
        field: FieldRef,
        object: Option<Box<Expr>>,
    },
    /// Method call; `receiver` is `None` for static targets.
    Call {
        target: CallTarget,
        receiver: Option<Box<Expr>>,
        args: Vec<Expr>,
    },
    /// Uninitialized instance allocation; paired with a later
    /// [`StmtKind::ConstructorCall`].
    Alloc {
        class: String,
    },
    /// Array allocation; one dimension expression per allocated dimension.
    NewArray {
        array_ty: Type,
        dims: Vec<Expr>,
    },
    InstanceOf {
        expr: Box<Expr>,
        ty: Type,
    },
    /// The exception value implicitly on the stack at a handler entry.
    CaughtException,
}

impl Expr {
    pub fn var(id: VarId) -> Expr {
        Expr::Var(id)
    }

    pub fn cast(kind: CastKind, ty: Type, expr: Expr) -> Expr {
        Expr::Cast {
            kind,
            ty,
            expr: Box::new(expr),
        }
    }

    pub fn not(expr: Expr) -> Expr {
        Expr::Not(Box::new(expr))
    }

    pub fn compare(cond: Cond, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Compare {
            cond,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }
}

// Statements

/// One case of a switch statement's case list.
#[derive(Debug, Clone, PartialEq)]
pub struct SwitchCase {
    pub id: CaseId,
    /// `None` marks the default case.
    pub key: Option<i32>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Assign {
        dest: VarId,
        value: Expr,
    },
    /// Effect-only expression, e.g. a void call.
    Expr(Expr),
    /// `invokespecial <init>` on a fresh allocation or on `this`/`super`.
    /// The receiver is intentionally never cast.
    ConstructorCall {
        receiver: Expr,
        method: MethodRef,
        args: Vec<Expr>,
    },
    ArraySet {
        array: Expr,
        index: Expr,
        value: Expr,
    },
    /// Field write; `object` is `None` for static fields.
    FieldSet {
        field: FieldRef,
        object: Option<Expr>,
        value: Expr,
    },
    Label(LabelId),
    Goto(LabelId),
    /// Conditional jump, taken when `cond` evaluates true.
    If {
        cond: Expr,
        target: LabelId,
    },
    /// Switch dispatch; the case bodies are the [`StmtKind::Case`]/goto
    /// pairs that follow this statement.
    Switch {
        value: Expr,
        cases: Vec<SwitchCase>,
    },
    /// Binding point of one switch case, immediately followed by the goto
    /// to the original target.
    Case(CaseId),
    Return(Option<Expr>),
    Throw(Expr),
    MonitorEnter(Expr),
    MonitorExit(Expr),
}

/// A statement with its source position and exception context.
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    pub kind: StmtKind,
    /// Source line active at this statement, when line markers are present
    /// and line emission is enabled.
    pub line: Option<u32>,
    /// Handlers guarding this statement, in dispatch order.
    pub handlers: Vec<HandlerId>,
}

impl Stmt {
    pub fn new(kind: StmtKind) -> Self {
        Stmt {
            kind,
            line: None,
            handlers: Vec::new(),
        }
    }
}

// Catch blocks

/// One exception handler: every range sharing a handler label merges into a
/// single block (multi-catch), with one caught-exception variable.
#[derive(Debug, Clone, PartialEq)]
pub struct CatchBlock {
    pub id: HandlerId,
    /// Label of the original handler code inside the body.
    pub handler_label: LabelId,
    /// Declared caught types, in range order.
    pub caught: Vec<Type>,
    /// Whether any merged range was a catch-all entry.
    pub catch_all: bool,
    pub var: VarId,
    /// Prologue: bind the caught exception, then jump to the handler code.
    pub body: Vec<Stmt>,
}

// Method

/// A fully lowered method body.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodAst {
    pub class_name: String,
    pub name: String,
    pub descriptor: String,
    pub access: u16,
    pub signature: Option<String>,
    pub exceptions: Vec<String>,
    pub this_var: Option<VarId>,
    pub params: Vec<VarId>,
    /// Every other variable the body uses, in interning order.
    pub locals: Vec<VarId>,
    pub body: Vec<Stmt>,
    pub catches: Vec<CatchBlock>,
    /// Backing store for [`VarId`] handles.
    pub variables: Vec<Variable>,
}

impl MethodAst {
    pub fn var(&self, id: VarId) -> &Variable {
        &self.variables[id.0 as usize]
    }
}

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", self.0)
    }
}

impl fmt::Display for CaseId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "case_{}_{}", self.switch_index, self.case_index)
    }
}

impl fmt::Display for HandlerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "h{}", self.0)
    }
}
