// Shared test harness: instruction builders and frame oracles.
//
// `SimpleOracle` is a small forward-flow simulator standing in for the real
// dataflow collaborator: one pass of reachability plus type propagation with
// merge widening, no liveness. Tests that need liveness-derived facts (dead
// stores) script their frames explicitly through `ScriptedOracle`.

#![allow(dead_code)]

use std::cell::{Cell, RefCell};

use classlift::ast::{Expr, Literal, MethodAst, StmtKind, Variable};
use classlift::classfile::{
    flags, parse_field_descriptor, parse_method_descriptor, ArrayKind, ConstValue, ExceptionRange,
    Instruction, InvokeKind, LabelId, LocalVarInfo, MethodCode, MethodDef, OpType, Type,
};
use classlift::frame::{Frame, FrameOracle, FrameTable, SlotType};
use classlift::{Config, Result};

pub const CLASS: &str = "com/example/Demo";

// --- Builders ---------------------------------------------------------

pub fn body(max_locals: u16, instructions: Vec<Instruction>) -> MethodCode {
    MethodCode {
        instructions,
        exception_table: Vec::new(),
        local_vars: Vec::new(),
        max_locals,
    }
}

pub fn static_method(name: &str, descriptor: &str, code: MethodCode) -> MethodDef {
    MethodDef {
        class_name: CLASS.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        access: flags::ACC_PUBLIC | flags::ACC_STATIC,
        signature: None,
        exceptions: Vec::new(),
        code: Some(code),
    }
}

pub fn instance_method(name: &str, descriptor: &str, code: MethodCode) -> MethodDef {
    MethodDef {
        class_name: CLASS.to_string(),
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        access: flags::ACC_PUBLIC,
        signature: None,
        exceptions: Vec::new(),
        code: Some(code),
    }
}

pub fn lower(method: &MethodDef) -> Result<MethodAst> {
    classlift::lower_method(method, &SimpleOracle, &Config::default())
}

pub fn lower_ok(method: &MethodDef) -> MethodAst {
    lower(method).expect("lowering failed")
}

pub fn l(n: u32) -> LabelId {
    LabelId(n)
}

pub fn label(n: u32) -> Instruction {
    Instruction::Label(LabelId(n))
}

pub fn local_var(name: &str, descriptor: &str, slot: u16, start: LabelId, end: LabelId) -> LocalVarInfo {
    LocalVarInfo {
        name: name.to_string(),
        descriptor: descriptor.to_string(),
        signature: None,
        start,
        end,
        slot,
    }
}

pub fn guarded(start: LabelId, end: LabelId, handler: LabelId, catch_type: Option<&str>) -> ExceptionRange {
    ExceptionRange {
        start,
        end,
        handler,
        catch_type: catch_type.map(str::to_string),
    }
}

pub fn iconst(value: i32) -> Instruction {
    Instruction::Push(ConstValue::Int(value))
}

pub fn iload(slot: u16) -> Instruction {
    Instruction::Load { kind: OpType::Int, slot }
}

pub fn istore(slot: u16) -> Instruction {
    Instruction::Store { kind: OpType::Int, slot }
}

pub fn aload(slot: u16) -> Instruction {
    Instruction::Load { kind: OpType::Reference, slot }
}

pub fn astore(slot: u16) -> Instruction {
    Instruction::Store { kind: OpType::Reference, slot }
}

pub fn lload(slot: u16) -> Instruction {
    Instruction::Load { kind: OpType::Long, slot }
}

pub fn fload(slot: u16) -> Instruction {
    Instruction::Load { kind: OpType::Float, slot }
}

pub fn dload(slot: u16) -> Instruction {
    Instruction::Load { kind: OpType::Double, slot }
}

pub fn ireturn() -> Instruction {
    Instruction::Return(Some(OpType::Int))
}

pub fn lreturn() -> Instruction {
    Instruction::Return(Some(OpType::Long))
}

pub fn dreturn() -> Instruction {
    Instruction::Return(Some(OpType::Double))
}

pub fn areturn() -> Instruction {
    Instruction::Return(Some(OpType::Reference))
}

pub fn vreturn() -> Instruction {
    Instruction::Return(None)
}

// --- AST inspection ---------------------------------------------------

pub fn var_by_id<'a>(ast: &'a MethodAst, id: &str) -> &'a Variable {
    ast.variables
        .iter()
        .find(|v| v.id == id)
        .unwrap_or_else(|| panic!("no variable with id {}", id))
}

pub fn has_var(ast: &MethodAst, id: &str) -> bool {
    ast.variables.iter().any(|v| v.id == id)
}

/// Static type of an expression, when derivable without context.
pub fn expr_type(ast: &MethodAst, expr: &Expr) -> Option<Type> {
    match expr {
        Expr::Const(literal) => Some(match literal {
            Literal::Null => Type::object().clone(),
            Literal::Int(_) => Type::Int,
            Literal::Long(_) => Type::Long,
            Literal::Float(_) => Type::Float,
            Literal::Double(_) => Type::Double,
            Literal::String(_) => Type::string().clone(),
            Literal::Class(_) => Type::class().clone(),
        }),
        Expr::Var(id) => Some(ast.var(*id).ty.clone()),
        Expr::Binary { operand_ty, .. } => Some(operand_ty.clone()),
        Expr::Neg { operand_ty, .. } => Some(operand_ty.clone()),
        Expr::Compare { .. } | Expr::Not(_) | Expr::InstanceOf { .. } => Some(Type::Boolean),
        Expr::Cast { ty, .. } => Some(ty.clone()),
        Expr::ArrayGet { array, .. } => match expr_type(ast, array) {
            Some(Type::Array(elem)) => Some(*elem),
            _ => None,
        },
        Expr::ArrayLength(_) => Some(Type::Int),
        Expr::FieldGet { field, .. } => parse_field_descriptor(&field.descriptor).ok(),
        Expr::Call { target, .. } => parse_method_descriptor(&target.method.descriptor)
            .ok()
            .and_then(|d| d.ret),
        Expr::Alloc { class } => Some(Type::Reference(class.clone())),
        Expr::NewArray { array_ty, .. } => Some(array_ty.clone()),
        Expr::CaughtException => None,
    }
}

/// Every assignment must agree with its destination on booleanness; the
/// engine inserts reinterpreting casts exactly where they would disagree.
pub fn assert_boolean_integrity(ast: &MethodAst) {
    let stmts = ast
        .body
        .iter()
        .chain(ast.catches.iter().flat_map(|c| c.body.iter()));
    for stmt in stmts {
        if let StmtKind::Assign { dest, value } = &stmt.kind {
            let dest_ty = &ast.var(*dest).ty;
            if let Some(src_ty) = expr_type(ast, value) {
                assert_eq!(
                    dest_ty.is_boolean(),
                    src_ty.is_boolean(),
                    "boolean width mismatch assigning {:?} (type {:?}) into {} (type {:?})",
                    value,
                    src_ty,
                    ast.var(*dest).id,
                    dest_ty,
                );
            }
        }
    }
}

// --- Oracles ----------------------------------------------------------

/// Hands out pre-built frame tables, one per `analyze` call.
pub struct ScriptedOracle {
    tables: RefCell<Vec<FrameTable>>,
}

impl ScriptedOracle {
    pub fn new(tables: Vec<FrameTable>) -> Self {
        ScriptedOracle {
            tables: RefCell::new(tables),
        }
    }
}

impl FrameOracle for ScriptedOracle {
    fn analyze(&self, _method: &MethodDef, _code: &MethodCode) -> Result<FrameTable> {
        let mut tables = self.tables.borrow_mut();
        assert!(!tables.is_empty(), "oracle called more often than scripted");
        Ok(tables.remove(0))
    }
}

/// Counts `analyze` calls, delegating to `SimpleOracle`.
pub struct CountingOracle {
    pub calls: Cell<usize>,
}

impl CountingOracle {
    pub fn new() -> Self {
        CountingOracle { calls: Cell::new(0) }
    }
}

impl FrameOracle for CountingOracle {
    fn analyze(&self, method: &MethodDef, code: &MethodCode) -> Result<FrameTable> {
        self.calls.set(self.calls.get() + 1);
        SimpleOracle.analyze(method, code)
    }
}

/// Forward type propagation over the instruction list.
pub struct SimpleOracle;

impl FrameOracle for SimpleOracle {
    fn analyze(&self, method: &MethodDef, code: &MethodCode) -> Result<FrameTable> {
        Ok(simulate(method, code))
    }
}

struct Guard {
    start: usize,
    end: usize,
    handler: usize,
    caught: Type,
}

fn simulate(method: &MethodDef, code: &MethodCode) -> FrameTable {
    let positions = code.label_positions();
    let count = code.instructions.len();
    let mut before: Vec<Option<Frame>> = vec![None; count];

    let parsed =
        parse_method_descriptor(&method.descriptor).expect("test method descriptor is valid");
    let mut locals = vec![SlotType::Uninit; code.max_locals as usize];
    let mut slot = 0usize;
    if !method.is_static() {
        locals[0] = SlotType::Value(Type::Reference(method.class_name.clone()));
        slot = 1;
    }
    for ty in &parsed.params {
        locals[slot] = SlotType::Value(ty.clone());
        slot += ty.width() as usize;
    }

    let guards: Vec<Guard> = code
        .exception_table
        .iter()
        .filter_map(|range| {
            let start = *positions.get(&range.start)?;
            let end = *positions.get(&range.end)?;
            let handler = *positions.get(&range.handler)?;
            let caught = match &range.catch_type {
                Some(name) => Type::Reference(name.clone()),
                None => Type::throwable().clone(),
            };
            Some(Guard { start, end, handler, caught })
        })
        .collect();

    let mut work: Vec<(usize, Frame)> = vec![(0, Frame::new(locals, Vec::new()))];
    while let Some((index, incoming)) = work.pop() {
        if index >= count {
            continue;
        }
        let merged = match &before[index] {
            None => incoming,
            Some(existing) => {
                let widened = merge_frames(existing, &incoming);
                if widened == *existing {
                    continue;
                }
                widened
            }
        };
        before[index] = Some(merged.clone());

        for guard in &guards {
            if guard.start <= index && index < guard.end {
                work.push((
                    guard.handler,
                    Frame::new(
                        merged.locals.clone(),
                        vec![SlotType::Value(guard.caught.clone())],
                    ),
                ));
            }
        }

        let (fallthrough, jumps) = step(&merged, &code.instructions[index]);
        if let Some(frame) = fallthrough {
            work.push((index + 1, frame));
        }
        for (target, frame) in jumps {
            let position = *positions
                .get(&target)
                .unwrap_or_else(|| panic!("branch to undefined label {}", target.0));
            work.push((position, frame));
        }
    }
    FrameTable::new(before)
}

fn merge_slot(a: &SlotType, b: &SlotType) -> SlotType {
    match (a, b) {
        (SlotType::Value(x), SlotType::Value(y)) => {
            if x == y {
                SlotType::Value(x.clone())
            } else if x.is_reference() && y.is_reference() {
                SlotType::Value(Type::object().clone())
            } else if x.normalized() == y.normalized() {
                SlotType::Value(x.normalized())
            } else {
                SlotType::Uninit
            }
        }
        _ => SlotType::Uninit,
    }
}

fn merge_frames(a: &Frame, b: &Frame) -> Frame {
    assert_eq!(
        a.stack.len(),
        b.stack.len(),
        "merging frames with different stack heights"
    );
    let slots = a.locals.len().max(b.locals.len());
    let mut locals = Vec::with_capacity(slots);
    for i in 0..slots {
        let x = a.locals.get(i).unwrap_or(&SlotType::Uninit);
        let y = b.locals.get(i).unwrap_or(&SlotType::Uninit);
        locals.push(merge_slot(x, y));
    }
    let stack = a
        .stack
        .iter()
        .zip(&b.stack)
        .map(|(x, y)| {
            let merged = merge_slot(x, y);
            assert!(
                !merged.is_uninit(),
                "merging incompatible stack entries {:?} and {:?}",
                x,
                y
            );
            merged
        })
        .collect();
    Frame::new(locals, stack)
}

fn pop(frame: &mut Frame) -> Type {
    match frame.stack.pop() {
        Some(SlotType::Value(ty)) => ty,
        other => panic!("stack underflow in test oracle: {:?}", other),
    }
}

fn push(frame: &mut Frame, ty: Type) {
    frame.stack.push(SlotType::Value(ty));
}

fn push_value(frame: &mut Frame, ty: Type) {
    // Sub-int values live on the stack as int, mirroring the verifier.
    if ty.is_sub_int() || ty.is_boolean() {
        push(frame, Type::Int);
    } else {
        push(frame, ty);
    }
}

fn set_local(frame: &mut Frame, slot: u16, ty: Type) {
    let index = slot as usize;
    let needed = index + ty.width() as usize;
    if frame.locals.len() < needed {
        frame.locals.resize(needed, SlotType::Uninit);
    }
    // Overwriting the high half of a wide value kills the whole value.
    if index > 0 {
        if let SlotType::Value(prev) = &frame.locals[index - 1] {
            if prev.width() == 2 {
                frame.locals[index - 1] = SlotType::Uninit;
            }
        }
    }
    if ty.width() == 2 {
        frame.locals[index + 1] = SlotType::Uninit;
    }
    frame.locals[index] = SlotType::Value(ty);
}

fn local_type(frame: &Frame, slot: u16) -> Type {
    match frame.local(slot) {
        Some(SlotType::Value(ty)) => ty.clone(),
        other => panic!("load from dead local slot {}: {:?}", slot, other),
    }
}

fn category(frame: &Frame, depth: usize) -> u8 {
    match frame.stack_from_top(depth) {
        Some(SlotType::Value(ty)) => ty.category(),
        other => panic!("missing stack entry at depth {}: {:?}", depth, other),
    }
}

type StepResult = (Option<Frame>, Vec<(LabelId, Frame)>);

fn step(before: &Frame, insn: &Instruction) -> StepResult {
    let mut f = before.clone();
    match insn {
        Instruction::Label(_) | Instruction::Line(_) | Instruction::Nop => {}

        Instruction::Push(value) => {
            let ty = match value {
                ConstValue::Null => Type::object().clone(),
                ConstValue::Int(_) => Type::Int,
                ConstValue::Long(_) => Type::Long,
                ConstValue::Float(_) => Type::Float,
                ConstValue::Double(_) => Type::Double,
                ConstValue::String(_) => Type::string().clone(),
                ConstValue::Class(_) => Type::class().clone(),
                ConstValue::MethodHandle => Type::Reference("java/lang/invoke/MethodHandle".into()),
                ConstValue::MethodType => Type::Reference("java/lang/invoke/MethodType".into()),
                ConstValue::Dynamic => Type::object().clone(),
            };
            push(&mut f, ty);
        }

        Instruction::Load { slot, .. } => {
            let ty = local_type(&f, *slot);
            push_value(&mut f, ty);
        }
        Instruction::Store { slot, .. } => {
            let ty = pop(&mut f);
            set_local(&mut f, *slot, ty);
        }
        Instruction::Iinc { .. } => {}

        Instruction::ArrayLoad(kind) => {
            let _index = pop(&mut f);
            let array = pop(&mut f);
            let elem = element_type(*kind, &array);
            push_value(&mut f, elem);
        }
        Instruction::ArrayStore(_) => {
            let _value = pop(&mut f);
            let _index = pop(&mut f);
            let _array = pop(&mut f);
        }

        Instruction::Pop => {
            pop(&mut f);
        }
        Instruction::Pop2 => {
            if category(&f, 0) == 2 {
                pop(&mut f);
            } else {
                pop(&mut f);
                pop(&mut f);
            }
        }
        Instruction::Dup => {
            let top = pop(&mut f);
            push(&mut f, top.clone());
            push(&mut f, top);
        }
        Instruction::DupX1 => {
            let v1 = pop(&mut f);
            let v2 = pop(&mut f);
            push(&mut f, v1.clone());
            push(&mut f, v2);
            push(&mut f, v1);
        }
        Instruction::DupX2 => {
            let v1 = pop(&mut f);
            let v2 = pop(&mut f);
            if v2.category() == 2 {
                push(&mut f, v1.clone());
                push(&mut f, v2);
                push(&mut f, v1);
            } else {
                let v3 = pop(&mut f);
                push(&mut f, v1.clone());
                push(&mut f, v3);
                push(&mut f, v2);
                push(&mut f, v1);
            }
        }
        Instruction::Dup2 => {
            if category(&f, 0) == 2 {
                let v1 = pop(&mut f);
                push(&mut f, v1.clone());
                push(&mut f, v1);
            } else {
                let v1 = pop(&mut f);
                let v2 = pop(&mut f);
                push(&mut f, v2.clone());
                push(&mut f, v1.clone());
                push(&mut f, v2);
                push(&mut f, v1);
            }
        }
        Instruction::Dup2X1 => {
            if category(&f, 0) == 2 {
                let v1 = pop(&mut f);
                let v2 = pop(&mut f);
                push(&mut f, v1.clone());
                push(&mut f, v2);
                push(&mut f, v1);
            } else {
                let v1 = pop(&mut f);
                let v2 = pop(&mut f);
                let v3 = pop(&mut f);
                push(&mut f, v2.clone());
                push(&mut f, v1.clone());
                push(&mut f, v3);
                push(&mut f, v2);
                push(&mut f, v1);
            }
        }
        Instruction::Dup2X2 => {
            if category(&f, 0) == 2 {
                let v1 = pop(&mut f);
                if category(&f, 0) == 2 {
                    let v2 = pop(&mut f);
                    push(&mut f, v1.clone());
                    push(&mut f, v2);
                    push(&mut f, v1);
                } else {
                    let v2 = pop(&mut f);
                    let v3 = pop(&mut f);
                    push(&mut f, v1.clone());
                    push(&mut f, v3);
                    push(&mut f, v2);
                    push(&mut f, v1);
                }
            } else {
                let v1 = pop(&mut f);
                let v2 = pop(&mut f);
                if category(&f, 0) == 2 {
                    let v3 = pop(&mut f);
                    push(&mut f, v2.clone());
                    push(&mut f, v1.clone());
                    push(&mut f, v3);
                    push(&mut f, v2);
                    push(&mut f, v1);
                } else {
                    let v3 = pop(&mut f);
                    let v4 = pop(&mut f);
                    push(&mut f, v2.clone());
                    push(&mut f, v1.clone());
                    push(&mut f, v4);
                    push(&mut f, v3);
                    push(&mut f, v2);
                    push(&mut f, v1);
                }
            }
        }
        Instruction::Swap => {
            let v1 = pop(&mut f);
            let v2 = pop(&mut f);
            push(&mut f, v1);
            push(&mut f, v2);
        }

        Instruction::Binary { kind, .. } => {
            pop(&mut f);
            pop(&mut f);
            push(&mut f, kind.as_type());
        }
        Instruction::Neg(kind) => {
            pop(&mut f);
            push(&mut f, kind.as_type());
        }
        Instruction::Convert { to, .. } => {
            pop(&mut f);
            push_value(&mut f, to.clone());
        }
        Instruction::Cmp(_) => {
            pop(&mut f);
            pop(&mut f);
            push(&mut f, Type::Int);
        }

        Instruction::If { target, .. } | Instruction::IfNull { target, .. } => {
            pop(&mut f);
            return (Some(f.clone()), vec![(*target, f)]);
        }
        Instruction::IfICmp { target, .. } | Instruction::IfACmp { target, .. } => {
            pop(&mut f);
            pop(&mut f);
            return (Some(f.clone()), vec![(*target, f)]);
        }
        Instruction::Goto(target) => {
            return (None, vec![(*target, f)]);
        }
        Instruction::Jsr(_) | Instruction::Ret { .. } => {
            panic!("jsr/ret must be inlined before frame analysis");
        }
        Instruction::TableSwitch { default, targets, .. } => {
            pop(&mut f);
            let mut jumps = vec![(*default, f.clone())];
            jumps.extend(targets.iter().map(|t| (*t, f.clone())));
            return (None, jumps);
        }
        Instruction::LookupSwitch { default, pairs } => {
            pop(&mut f);
            let mut jumps = vec![(*default, f.clone())];
            jumps.extend(pairs.iter().map(|(_, t)| (*t, f.clone())));
            return (None, jumps);
        }
        Instruction::Return(kind) => {
            if kind.is_some() {
                pop(&mut f);
            }
            return (None, Vec::new());
        }
        Instruction::Athrow => {
            pop(&mut f);
            return (None, Vec::new());
        }

        Instruction::GetStatic(field) => {
            let ty = parse_field_descriptor(&field.descriptor).expect("field descriptor");
            push_value(&mut f, ty);
        }
        Instruction::GetField(field) => {
            pop(&mut f);
            let ty = parse_field_descriptor(&field.descriptor).expect("field descriptor");
            push_value(&mut f, ty);
        }
        Instruction::PutStatic(_) => {
            pop(&mut f);
        }
        Instruction::PutField(_) => {
            pop(&mut f);
            pop(&mut f);
        }

        Instruction::Invoke { kind, method } => {
            let parsed = parse_method_descriptor(&method.descriptor).expect("method descriptor");
            for _ in 0..parsed.params.len() {
                pop(&mut f);
            }
            if *kind != InvokeKind::Static {
                pop(&mut f);
            }
            if let Some(ret) = parsed.ret {
                push_value(&mut f, ret);
            }
        }
        Instruction::InvokeDynamic { descriptor, .. } => {
            let parsed = parse_method_descriptor(descriptor).expect("indy descriptor");
            for _ in 0..parsed.params.len() {
                pop(&mut f);
            }
            if let Some(ret) = parsed.ret {
                push_value(&mut f, ret);
            }
        }

        Instruction::New(class) => {
            push(&mut f, Type::Reference(class.clone()));
        }
        Instruction::NewArray(elem) => {
            pop(&mut f);
            push(&mut f, elem.clone().array_of());
        }
        Instruction::MultiNewArray { array_type, dims } => {
            for _ in 0..*dims {
                pop(&mut f);
            }
            push(&mut f, array_type.clone());
        }
        Instruction::ArrayLength => {
            pop(&mut f);
            push(&mut f, Type::Int);
        }
        Instruction::CheckCast(ty) => {
            pop(&mut f);
            push(&mut f, ty.clone());
        }
        Instruction::InstanceOf(_) => {
            pop(&mut f);
            push(&mut f, Type::Int);
        }

        Instruction::MonitorEnter | Instruction::MonitorExit => {
            pop(&mut f);
        }
    }
    (Some(f), Vec::new())
}

fn element_type(kind: ArrayKind, array: &Type) -> Type {
    match kind {
        ArrayKind::Int => Type::Int,
        ArrayKind::Long => Type::Long,
        ArrayKind::Float => Type::Float,
        ArrayKind::Double => Type::Double,
        ArrayKind::Char => Type::Char,
        ArrayKind::Short => Type::Short,
        ArrayKind::Byte => match array {
            Type::Array(elem) if **elem == Type::Boolean => Type::Boolean,
            _ => Type::Byte,
        },
        ArrayKind::Reference => match array {
            Type::Array(elem) => (**elem).clone(),
            _ => Type::object().clone(),
        },
    }
}
