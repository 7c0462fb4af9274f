//! Instruction lowering rules.
//!
//! Every rule reads its operands from the before-frame of the instruction
//! and writes one destination variable taken from the after-frame, or emits
//! a bare statement for control and effect instructions. The boolean
//! bit-width rule is enforced at every assignment boundary: a value whose
//! booleanness differs from its destination always passes through a
//! reinterpreting cast, because the downstream format stores booleans as
//! 32-bit ints while typed slots stay boolean-tagged.

use std::collections::HashMap;

use crate::ast::{
    CallTarget, CastKind, DispatchKind, Expr, Literal, MethodKind, StmtKind, VarId, VarOrigin,
};
use crate::classfile::{
    descriptor, ArrayKind, BinaryOp, CmpVariant, Cond, ConstValue, FieldRef, Instruction,
    InvokeKind, LabelId, MethodCode, MethodDef, MethodRef, OpType, Type,
};
use crate::common::{Error, Result};
use crate::config::Config;
use crate::consts;
use crate::frame::{Frame, FrameTable, SlotType};
use crate::lower::shuffle::lower_shuffle;
use crate::lower::switches::lower_switch;
use crate::lower::vars::VariableTable;

/// A recorded long/float/double comparison waiting for the branch that
/// consumes its result.
#[derive(Debug, Clone)]
struct CmpOperands {
    variant: CmpVariant,
    lhs: VarId,
    rhs: VarId,
}

/// Per-method lowering engine. One call to [`Lowerer::lower`] per reachable
/// instruction, in list order.
pub(crate) struct Lowerer<'a> {
    method: &'a MethodDef,
    qualified: String,
    config: &'a Config,
    code: &'a MethodCode,
    frames: &'a FrameTable,
    vars: &'a mut VariableTable,
    label_positions: HashMap<LabelId, usize>,
    return_type: Option<Type>,
    pending_cmps: HashMap<VarId, CmpOperands>,
    switch_count: u32,
}

impl<'a> Lowerer<'a> {
    pub fn new(
        method: &'a MethodDef,
        config: &'a Config,
        code: &'a MethodCode,
        frames: &'a FrameTable,
        vars: &'a mut VariableTable,
    ) -> Result<Self> {
        let parsed = descriptor::parse_method_descriptor(&method.descriptor)?;
        Ok(Lowerer {
            method,
            qualified: method.qualified_name(),
            config,
            code,
            frames,
            vars,
            label_positions: code.label_positions(),
            return_type: parsed.ret,
            pending_cmps: HashMap::new(),
            switch_count: 0,
        })
    }

    /// Lower one instruction into zero or more statement kinds.
    pub fn lower(&mut self, index: usize, insn: &Instruction) -> Result<Vec<StmtKind>> {
        match insn {
            Instruction::Label(_) | Instruction::Line(_) => Err(Error::internal(
                &self.qualified,
                "markers must be handled by the body walk",
            )),
            Instruction::Nop | Instruction::Pop | Instruction::Pop2 => Ok(Vec::new()),

            Instruction::Push(value) => self.lower_const(index, value),
            Instruction::Load { slot, .. } => self.lower_load(index, *slot),
            Instruction::Store { slot, .. } => self.lower_store(index, *slot),
            Instruction::Iinc { slot, delta } => self.lower_iinc(index, *slot, *delta),

            Instruction::ArrayLoad(kind) => self.lower_array_load(index, *kind),
            Instruction::ArrayStore(kind) => self.lower_array_store(index, *kind),

            Instruction::Dup
            | Instruction::DupX1
            | Instruction::DupX2
            | Instruction::Dup2
            | Instruction::Dup2X1
            | Instruction::Dup2X2
            | Instruction::Swap => {
                let before = self.before(index)?.clone();
                lower_shuffle(&self.qualified, insn, &before, self.vars)
            }

            Instruction::Binary { op, kind } => self.lower_binary(index, *op, *kind),
            Instruction::Neg(kind) => self.lower_neg(index, *kind),
            Instruction::Convert { to, .. } => self.lower_convert(index, to.clone()),
            Instruction::Cmp(variant) => self.lower_cmp(index, *variant),

            Instruction::If { cond, target } => self.lower_if_zero(index, *cond, *target),
            Instruction::IfICmp { cond, target } => self.lower_if_icmp(index, *cond, *target),
            Instruction::IfACmp { equal, target } => self.lower_if_acmp(index, *equal, *target),
            Instruction::IfNull { is_null, target } => self.lower_if_null(index, *is_null, *target),
            Instruction::Goto(target) => Ok(vec![StmtKind::Goto(*target)]),
            Instruction::Jsr(_) | Instruction::Ret { .. } => Err(Error::internal(
                &self.qualified,
                "subroutine instruction survived inlining",
            )),
            Instruction::TableSwitch { .. } | Instruction::LookupSwitch { .. } => {
                let before = self.before(index)?.clone();
                let switch_index = self.switch_count;
                self.switch_count += 1;
                lower_switch(&self.qualified, insn, &before, switch_index, self.vars)
            }
            Instruction::Return(kind) => self.lower_return(index, *kind),
            Instruction::Athrow => {
                let before = self.before(index)?.clone();
                let (value, _) = self.stack_operand(&before, 0)?;
                Ok(vec![StmtKind::Throw(Expr::Var(value))])
            }

            Instruction::GetStatic(field) => self.lower_get_field(index, field, false),
            Instruction::GetField(field) => self.lower_get_field(index, field, true),
            Instruction::PutStatic(field) => self.lower_put_field(index, field, false),
            Instruction::PutField(field) => self.lower_put_field(index, field, true),

            Instruction::Invoke { kind, method } => self.lower_invoke(index, *kind, method),
            Instruction::InvokeDynamic { name, .. } => Err(Error::unsupported(
                &self.qualified,
                format!("invokedynamic call site '{}'", name),
            )),

            Instruction::New(class) => self.lower_new(index, class),
            Instruction::NewArray(elem) => self.lower_new_array(index, elem.clone()),
            Instruction::MultiNewArray { array_type, dims } => {
                self.lower_multi_new_array(index, array_type.clone(), *dims)
            }
            Instruction::ArrayLength => self.lower_array_length(index),
            Instruction::CheckCast(ty) => self.lower_checkcast(index, ty.clone()),
            Instruction::InstanceOf(ty) => self.lower_instanceof(index, ty.clone()),

            Instruction::MonitorEnter => {
                let before = self.before(index)?.clone();
                let (value, _) = self.stack_operand(&before, 0)?;
                Ok(vec![StmtKind::MonitorEnter(Expr::Var(value))])
            }
            Instruction::MonitorExit => {
                let before = self.before(index)?.clone();
                let (value, _) = self.stack_operand(&before, 0)?;
                Ok(vec![StmtKind::MonitorExit(Expr::Var(value))])
            }
        }
    }

    /// A recorded comparison that no branch consumed is unlowerable.
    pub fn finish(&self) -> Result<()> {
        if self.pending_cmps.is_empty() {
            Ok(())
        } else {
            Err(Error::malformed(
                &self.qualified,
                "comparison result is never consumed by a conditional branch",
            ))
        }
    }

    // === Frame and operand access =======================================

    fn before(&self, index: usize) -> Result<&Frame> {
        self.frames.before(index).ok_or_else(|| {
            Error::internal(
                &self.qualified,
                format!("no entry frame for reachable instruction {}", index),
            )
        })
    }

    fn after(&self, index: usize) -> Result<&Frame> {
        self.frames.after(index).ok_or_else(|| {
            Error::internal(
                &self.qualified,
                format!("no exit frame for instruction {}", index),
            )
        })
    }

    /// Stack operand `depth` values below the top of `frame`. Returns the
    /// interned variable and the frame's exact type at that position.
    fn stack_operand(&mut self, frame: &Frame, depth: usize) -> Result<(VarId, Type)> {
        let ty = frame
            .stack_from_top(depth)
            .and_then(SlotType::as_type)
            .cloned()
            .ok_or_else(|| {
                Error::internal(
                    &self.qualified,
                    format!("missing stack operand at depth {}", depth),
                )
            })?;
        let height = frame.stack_height() - 1 - depth;
        let var = self.vars.stack(height, &ty);
        Ok((var, ty))
    }

    /// Destination variable: top of the after-frame stack.
    fn dest_operand(&mut self, index: usize) -> Result<(VarId, Type)> {
        let after = self.after(index)?.clone();
        let ty = after
            .stack_from_top(0)
            .and_then(SlotType::as_type)
            .cloned()
            .ok_or_else(|| {
                Error::internal(
                    &self.qualified,
                    format!("instruction {} pushes no value", index),
                )
            })?;
        let height = after.stack_height() - 1;
        let var = self.vars.stack(height, &ty);
        Ok((var, ty.normalized()))
    }

    // === Local variable resolution ======================================

    /// Variable for local `slot` at instruction `index`. Debug info wins
    /// when an entry covers the position (for stores, the position just
    /// after, since a store's scope begins at the following label);
    /// otherwise the slot is anonymous and normalized.
    fn local_variable(
        &mut self,
        index: usize,
        slot: u16,
        frame_ty: &Type,
        is_store: bool,
    ) -> Result<(VarId, Type)> {
        if self.config.use_debug_names {
            for entry in &self.code.local_vars {
                if entry.slot != slot {
                    continue;
                }
                let (Some(&start), Some(&end)) = (
                    self.label_positions.get(&entry.start),
                    self.label_positions.get(&entry.end),
                ) else {
                    continue;
                };
                let covers = start <= index && index < end;
                let starts_right_after = is_store && self.starts_after(index, start) && index < end;
                if covers || starts_right_after {
                    let ty = descriptor::parse_field_descriptor(&entry.descriptor)?;
                    let var = self.vars.named_local(
                        slot,
                        &entry.name,
                        ty.clone(),
                        &entry.descriptor,
                        entry.signature.clone(),
                        VarOrigin::Local,
                    );
                    return Ok((var, ty));
                }
            }
        }
        let var = self.vars.unnamed_local(slot, frame_ty);
        Ok((var, frame_ty.normalized()))
    }

    /// Whether `start` is the first non-marker position after `index`.
    fn starts_after(&self, index: usize, start: usize) -> bool {
        let mut j = index + 1;
        while j < self.code.instructions.len() {
            if j == start {
                return true;
            }
            if !self.code.instructions[j].is_marker() {
                return false;
            }
            j += 1;
        }
        false
    }

    // === Constants ======================================================

    fn lower_const(&mut self, index: usize, value: &ConstValue) -> Result<Vec<StmtKind>> {
        let literal = match value {
            ConstValue::Null => Literal::Null,
            ConstValue::Int(v) => Literal::Int(*v),
            ConstValue::Long(v) => Literal::Long(*v),
            ConstValue::Float(v) => Literal::Float(*v),
            ConstValue::Double(v) => Literal::Double(*v),
            ConstValue::String(s) => Literal::String(s.clone()),
            ConstValue::Class(ty) => Literal::Class(ty.clone()),
            ConstValue::MethodHandle => {
                return Err(Error::unsupported(&self.qualified, "method handle constant"))
            }
            ConstValue::MethodType => {
                return Err(Error::unsupported(&self.qualified, "method type constant"))
            }
            ConstValue::Dynamic => {
                return Err(Error::unsupported(
                    &self.qualified,
                    "dynamically computed constant",
                ))
            }
        };
        let (dest, _) = self.dest_operand(index)?;
        Ok(vec![StmtKind::Assign {
            dest,
            value: Expr::Const(literal),
        }])
    }

    // === Locals =========================================================

    fn lower_load(&mut self, index: usize, slot: u16) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let frame_ty = before
            .local(slot)
            .and_then(SlotType::as_type)
            .cloned()
            .ok_or_else(|| {
                Error::internal(
                    &self.qualified,
                    format!("load from uninitialized local slot {}", slot),
                )
            })?;
        let (local, local_ty) = self.local_variable(index, slot, &frame_ty, false)?;
        let (dest, dest_ty) = self.dest_operand(index)?;
        Ok(vec![StmtKind::Assign {
            dest,
            value: adapt(Expr::Var(local), &local_ty, &dest_ty),
        }])
    }

    fn lower_store(&mut self, index: usize, slot: u16) -> Result<Vec<StmtKind>> {
        let after = self.after(index)?.clone();
        let slot_state = after.local(slot).cloned().unwrap_or(SlotType::Uninit);
        let frame_ty = match slot_state {
            // The oracle proved no later read sees this store.
            SlotType::Uninit => return Ok(Vec::new()),
            SlotType::Value(ty) => ty,
        };

        let before = self.before(index)?.clone();
        let (value, value_frame_ty) = self.stack_operand(&before, 0)?;
        let value_ty = value_frame_ty.normalized();
        let (local, local_ty) = self.local_variable(index, slot, &frame_ty, true)?;
        Ok(vec![StmtKind::Assign {
            dest: local,
            value: adapt(Expr::Var(value), &value_ty, &local_ty),
        }])
    }

    fn lower_iinc(&mut self, index: usize, slot: u16, delta: i32) -> Result<Vec<StmtKind>> {
        let after = self.after(index)?.clone();
        let slot_state = after.local(slot).cloned().unwrap_or(SlotType::Uninit);
        let frame_ty = match slot_state {
            SlotType::Uninit => return Ok(Vec::new()),
            SlotType::Value(ty) => ty,
        };
        let (local, local_ty) = self.local_variable(index, slot, &frame_ty, false)?;
        let sum = Expr::Binary {
            op: BinaryOp::Add,
            operand_ty: Type::Int,
            lhs: Box::new(Expr::Var(local)),
            rhs: Box::new(Expr::Const(Literal::Int(delta))),
        };
        Ok(vec![StmtKind::Assign {
            dest: local,
            value: adapt(sum, &Type::Int, &local_ty),
        }])
    }

    // === Arrays =========================================================

    /// Exact element-array type an access opcode implies. `baload` and
    /// `bastore` cover both `byte[]` and `boolean[]`; the operand frame
    /// decides which one, keeping the byte/boolean aliasing visible.
    fn element_array_type(kind: ArrayKind, array_frame_ty: &Type) -> Type {
        match kind {
            ArrayKind::Int => Type::Int.array_of(),
            ArrayKind::Long => Type::Long.array_of(),
            ArrayKind::Float => Type::Float.array_of(),
            ArrayKind::Double => Type::Double.array_of(),
            ArrayKind::Char => Type::Char.array_of(),
            ArrayKind::Short => Type::Short.array_of(),
            ArrayKind::Byte => match array_frame_ty {
                Type::Array(elem) if **elem == Type::Boolean => Type::Boolean.array_of(),
                _ => Type::Byte.array_of(),
            },
            ArrayKind::Reference => match array_frame_ty {
                Type::Array(_) => array_frame_ty.clone(),
                _ => Type::object().clone().array_of(),
            },
        }
    }

    fn element_type(array_ty: &Type) -> Type {
        match array_ty {
            Type::Array(elem) => (**elem).clone(),
            other => other.clone(),
        }
    }

    fn lower_array_load(&mut self, index: usize, kind: ArrayKind) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (array, array_frame_ty) = self.stack_operand(&before, 1)?;
        let (idx, _) = self.stack_operand(&before, 0)?;

        let array_ty = Self::element_array_type(kind, &array_frame_ty);
        let elem_ty = Self::element_type(&array_ty);
        let get = Expr::ArrayGet {
            array: Box::new(Expr::cast(
                CastKind::Reinterpret,
                array_ty,
                Expr::Var(array),
            )),
            index: Box::new(Expr::Var(idx)),
        };
        let (dest, dest_ty) = self.dest_operand(index)?;
        Ok(vec![StmtKind::Assign {
            dest,
            value: adapt(get, &elem_ty, &dest_ty),
        }])
    }

    fn lower_array_store(&mut self, index: usize, kind: ArrayKind) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (array, array_frame_ty) = self.stack_operand(&before, 2)?;
        let (idx, _) = self.stack_operand(&before, 1)?;
        let (value, value_frame_ty) = self.stack_operand(&before, 0)?;

        let array_ty = Self::element_array_type(kind, &array_frame_ty);
        let elem_ty = Self::element_type(&array_ty);
        let value_ty = value_frame_ty.normalized();
        Ok(vec![StmtKind::ArraySet {
            array: Expr::cast(CastKind::Reinterpret, array_ty, Expr::Var(array)),
            index: Expr::Var(idx),
            value: adapt(Expr::Var(value), &value_ty, &elem_ty),
        }])
    }

    fn lower_array_length(&mut self, index: usize) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (array, _) = self.stack_operand(&before, 0)?;
        let (dest, _) = self.dest_operand(index)?;
        Ok(vec![StmtKind::Assign {
            dest,
            value: Expr::ArrayLength(Box::new(Expr::Var(array))),
        }])
    }

    // === Arithmetic =====================================================

    fn lower_binary(&mut self, index: usize, op: BinaryOp, kind: OpType) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (lhs, _) = self.stack_operand(&before, 1)?;
        let (rhs, _) = self.stack_operand(&before, 0)?;
        let (dest, dest_ty) = self.dest_operand(index)?;
        let operand_ty = kind.as_type();
        let expr = Expr::Binary {
            op,
            operand_ty: operand_ty.clone(),
            lhs: Box::new(Expr::Var(lhs)),
            rhs: Box::new(Expr::Var(rhs)),
        };
        Ok(vec![StmtKind::Assign {
            dest,
            value: adapt(expr, &operand_ty, &dest_ty),
        }])
    }

    fn lower_neg(&mut self, index: usize, kind: OpType) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (operand, _) = self.stack_operand(&before, 0)?;
        let (dest, _) = self.dest_operand(index)?;
        Ok(vec![StmtKind::Assign {
            dest,
            value: Expr::Neg {
                operand_ty: kind.as_type(),
                operand: Box::new(Expr::Var(operand)),
            },
        }])
    }

    /// Numeric conversions are checked casts: narrowing has observable
    /// precision-loss semantics, so the cast kind is never a reinterpret.
    fn lower_convert(&mut self, index: usize, to: Type) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (operand, _) = self.stack_operand(&before, 0)?;
        let (dest, dest_ty) = self.dest_operand(index)?;
        let cast = Expr::cast(CastKind::Dynamic, to.clone(), Expr::Var(operand));
        Ok(vec![StmtKind::Assign {
            dest,
            value: adapt(cast, &to, &dest_ty),
        }])
    }

    // === Comparisons and branches =======================================

    /// `lcmp`/`fcmp*`/`dcmp*` emit nothing yet: the operands are recorded
    /// against the result variable and the following branch fuses them
    /// into one relational expression.
    fn lower_cmp(&mut self, index: usize, variant: CmpVariant) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (lhs, _) = self.stack_operand(&before, 1)?;
        let (rhs, _) = self.stack_operand(&before, 0)?;
        let (result, _) = self.dest_operand(index)?;
        if self
            .pending_cmps
            .insert(result, CmpOperands { variant, lhs, rhs })
            .is_some()
        {
            return Err(Error::internal(
                &self.qualified,
                "two pending comparisons target the same result variable",
            ));
        }
        Ok(Vec::new())
    }

    /// Fuse `result <cond> 0` with the recorded comparison. For float and
    /// double operands the relational sense must respect which unordered
    /// variant produced the result: when the branch asks for a relation
    /// the variant does not encode directly, the negation of the inverse
    /// relation is emitted so NaN operands still branch identically.
    fn fuse_cmp(&self, cmp: &CmpOperands, cond: Cond) -> Expr {
        let lhs = Expr::Var(cmp.lhs);
        let rhs = Expr::Var(cmp.rhs);
        match cmp.variant {
            CmpVariant::LCmp => Expr::compare(cond, lhs, rhs),
            CmpVariant::FCmpG | CmpVariant::DCmpG => match cond {
                Cond::Lt | Cond::Le | Cond::Eq | Cond::Ne => Expr::compare(cond, lhs, rhs),
                Cond::Gt => Expr::not(Expr::compare(Cond::Le, lhs, rhs)),
                Cond::Ge => Expr::not(Expr::compare(Cond::Lt, lhs, rhs)),
            },
            CmpVariant::FCmpL | CmpVariant::DCmpL => match cond {
                Cond::Gt | Cond::Ge | Cond::Eq | Cond::Ne => Expr::compare(cond, lhs, rhs),
                Cond::Lt => Expr::not(Expr::compare(Cond::Ge, lhs, rhs)),
                Cond::Le => Expr::not(Expr::compare(Cond::Gt, lhs, rhs)),
            },
        }
    }

    fn lower_if_zero(&mut self, index: usize, cond: Cond, target: LabelId) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (operand, _) = self.stack_operand(&before, 0)?;
        let test = match self.pending_cmps.remove(&operand) {
            Some(cmp) => self.fuse_cmp(&cmp, cond),
            None => Expr::compare(cond, Expr::Var(operand), Expr::Const(Literal::Int(0))),
        };
        Ok(vec![StmtKind::If { cond: test, target }])
    }

    fn lower_if_icmp(&mut self, index: usize, cond: Cond, target: LabelId) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (lhs, _) = self.stack_operand(&before, 1)?;
        let (rhs, _) = self.stack_operand(&before, 0)?;
        Ok(vec![StmtKind::If {
            cond: Expr::compare(cond, Expr::Var(lhs), Expr::Var(rhs)),
            target,
        }])
    }

    fn lower_if_acmp(&mut self, index: usize, equal: bool, target: LabelId) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (lhs, _) = self.stack_operand(&before, 1)?;
        let (rhs, _) = self.stack_operand(&before, 0)?;
        let cond = if equal { Cond::Eq } else { Cond::Ne };
        Ok(vec![StmtKind::If {
            cond: Expr::compare(cond, Expr::Var(lhs), Expr::Var(rhs)),
            target,
        }])
    }

    fn lower_if_null(&mut self, index: usize, is_null: bool, target: LabelId) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (operand, _) = self.stack_operand(&before, 0)?;
        let cond = if is_null { Cond::Eq } else { Cond::Ne };
        Ok(vec![StmtKind::If {
            cond: Expr::compare(cond, Expr::Var(operand), Expr::Const(Literal::Null)),
            target,
        }])
    }

    fn lower_return(&mut self, index: usize, kind: Option<OpType>) -> Result<Vec<StmtKind>> {
        match kind {
            None => Ok(vec![StmtKind::Return(None)]),
            Some(_) => {
                let before = self.before(index)?.clone();
                let (value, value_frame_ty) = self.stack_operand(&before, 0)?;
                let declared = self.return_type.clone().ok_or_else(|| {
                    Error::malformed(&self.qualified, "typed return in a void method")
                })?;
                let value_ty = value_frame_ty.normalized();
                Ok(vec![StmtKind::Return(Some(adapt_exact(
                    Expr::Var(value),
                    &value_ty,
                    &declared,
                )))])
            }
        }
    }

    // === Fields =========================================================

    fn lower_get_field(
        &mut self,
        index: usize,
        field: &FieldRef,
        has_object: bool,
    ) -> Result<Vec<StmtKind>> {
        let field_ty = descriptor::parse_field_descriptor(&field.descriptor)?;
        let object = if has_object {
            let before = self.before(index)?.clone();
            let (object, _) = self.stack_operand(&before, 0)?;
            Some(Box::new(Expr::Var(object)))
        } else {
            None
        };
        let (dest, dest_ty) = self.dest_operand(index)?;
        let get = Expr::FieldGet {
            field: field.clone(),
            object,
        };
        Ok(vec![StmtKind::Assign {
            dest,
            value: adapt(get, &field_ty, &dest_ty),
        }])
    }

    fn lower_put_field(
        &mut self,
        index: usize,
        field: &FieldRef,
        has_object: bool,
    ) -> Result<Vec<StmtKind>> {
        let field_ty = descriptor::parse_field_descriptor(&field.descriptor)?;
        let before = self.before(index)?.clone();
        let (value, value_frame_ty) = self.stack_operand(&before, 0)?;
        let object = if has_object {
            let (object, _) = self.stack_operand(&before, 1)?;
            Some(Expr::Var(object))
        } else {
            None
        };
        let value_ty = value_frame_ty.normalized();
        Ok(vec![StmtKind::FieldSet {
            field: field.clone(),
            object,
            value: adapt(Expr::Var(value), &value_ty, &field_ty),
        }])
    }

    // === Invocation =====================================================

    /// Owner as a type: array owners occur for calls like `clone()` on an
    /// array receiver.
    fn owner_type(&self, owner: &str) -> Result<Type> {
        if owner.starts_with('[') {
            descriptor::parse_field_descriptor(owner)
        } else {
            Ok(Type::Reference(owner.to_string()))
        }
    }

    fn lower_invoke(
        &mut self,
        index: usize,
        kind: InvokeKind,
        method_ref: &MethodRef,
    ) -> Result<Vec<StmtKind>> {
        let parsed = descriptor::parse_method_descriptor(&method_ref.descriptor)?;
        let before = self.before(index)?.clone();
        let arg_count = parsed.params.len();

        // Arguments sit on top of the stack, last argument on top.
        let mut args = Vec::with_capacity(arg_count);
        for (position, param_ty) in parsed.params.iter().enumerate() {
            let depth = arg_count - 1 - position;
            let (arg, arg_frame_ty) = self.stack_operand(&before, depth)?;
            let arg_ty = arg_frame_ty.normalized();
            args.push(adapt_argument(Expr::Var(arg), &arg_ty, param_ty));
        }

        let is_constructor = method_ref.name == consts::CONSTRUCTOR_NAME;
        if is_constructor {
            if kind != InvokeKind::Special {
                return Err(Error::malformed(
                    &self.qualified,
                    "constructor invoked without invokespecial",
                ));
            }
            // The receiver is a fresh allocation or this/super delegation;
            // it must never be wrapped in a cast.
            let (receiver, _) = self.stack_operand(&before, arg_count)?;
            return Ok(vec![StmtKind::ConstructorCall {
                receiver: Expr::Var(receiver),
                method: method_ref.clone(),
                args,
            }]);
        }

        let (method_kind, dispatch) = match kind {
            InvokeKind::Static => (MethodKind::Static, DispatchKind::Direct),
            InvokeKind::Virtual | InvokeKind::Interface => {
                (MethodKind::InstanceVirtual, DispatchKind::Virtual)
            }
            InvokeKind::Special => (MethodKind::InstanceNonVirtual, DispatchKind::Direct),
        };

        let receiver = if kind == InvokeKind::Static {
            None
        } else {
            let (receiver, receiver_frame_ty) = self.stack_operand(&before, arg_count)?;
            let owner_ty = self.owner_type(&method_ref.owner)?;
            let receiver_ty = receiver_frame_ty.normalized();
            let expr = if receiver_ty == owner_ty {
                Expr::Var(receiver)
            } else {
                Expr::cast(CastKind::Reinterpret, owner_ty, Expr::Var(receiver))
            };
            Some(Box::new(expr))
        };

        let call = Expr::Call {
            target: CallTarget {
                method: method_ref.clone(),
                kind: method_kind,
                dispatch,
            },
            receiver,
            args,
        };

        match parsed.ret {
            None => Ok(vec![StmtKind::Expr(call)]),
            Some(ret_ty) => {
                let (dest, dest_ty) = self.dest_operand(index)?;
                Ok(vec![StmtKind::Assign {
                    dest,
                    value: adapt(call, &ret_ty, &dest_ty),
                }])
            }
        }
    }

    // === Object and array creation ======================================

    fn lower_new(&mut self, index: usize, class: &str) -> Result<Vec<StmtKind>> {
        let (dest, _) = self.dest_operand(index)?;
        Ok(vec![StmtKind::Assign {
            dest,
            value: Expr::Alloc {
                class: class.to_string(),
            },
        }])
    }

    fn lower_new_array(&mut self, index: usize, elem: Type) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (count, _) = self.stack_operand(&before, 0)?;
        let (dest, _) = self.dest_operand(index)?;
        Ok(vec![StmtKind::Assign {
            dest,
            value: Expr::NewArray {
                array_ty: elem.array_of(),
                dims: vec![Expr::Var(count)],
            },
        }])
    }

    fn lower_multi_new_array(
        &mut self,
        index: usize,
        array_type: Type,
        dims: u8,
    ) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let count = dims as usize;
        let mut sizes = Vec::with_capacity(count);
        for position in 0..count {
            // First dimension was pushed first, so it sits deepest.
            let depth = count - 1 - position;
            let (size, _) = self.stack_operand(&before, depth)?;
            sizes.push(Expr::Var(size));
        }
        let (dest, _) = self.dest_operand(index)?;
        Ok(vec![StmtKind::Assign {
            dest,
            value: Expr::NewArray {
                array_ty: array_type,
                dims: sizes,
            },
        }])
    }

    // === Type tests =====================================================

    fn lower_checkcast(&mut self, index: usize, ty: Type) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (operand, _) = self.stack_operand(&before, 0)?;
        let (dest, dest_ty) = self.dest_operand(index)?;
        let cast = Expr::cast(CastKind::Dynamic, ty.clone(), Expr::Var(operand));
        Ok(vec![StmtKind::Assign {
            dest,
            value: adapt(cast, &ty, &dest_ty),
        }])
    }

    fn lower_instanceof(&mut self, index: usize, ty: Type) -> Result<Vec<StmtKind>> {
        let before = self.before(index)?.clone();
        let (operand, _) = self.stack_operand(&before, 0)?;
        let (dest, dest_ty) = self.dest_operand(index)?;
        let test = Expr::InstanceOf {
            expr: Box::new(Expr::Var(operand)),
            ty,
        };
        Ok(vec![StmtKind::Assign {
            dest,
            value: adapt(test, &Type::Boolean, &dest_ty),
        }])
    }
}

/// Wrap `expr` in a reinterpreting cast when its booleanness differs from
/// the destination, or when the destination is a sub-int type the source
/// does not already have. Identical types pass through.
pub(crate) fn adapt(expr: Expr, from: &Type, to: &Type) -> Expr {
    if from == to {
        return expr;
    }
    if from.is_boolean() != to.is_boolean() || to.is_sub_int() {
        return Expr::cast(CastKind::Reinterpret, to.clone(), expr);
    }
    expr
}

/// Reinterpret to the exact target type whenever it differs; used where the
/// declared type must be restored (typed returns).
fn adapt_exact(expr: Expr, from: &Type, to: &Type) -> Expr {
    if from == to {
        return expr;
    }
    Expr::cast(CastKind::Reinterpret, to.clone(), expr)
}

/// Arguments are cast to their declared parameter type when that type is a
/// reference, an array, or a boolean/sub-int primitive; plain numeric
/// parameters already match the operand width.
fn adapt_argument(expr: Expr, from: &Type, param: &Type) -> Expr {
    if from == param {
        return expr;
    }
    if param.is_reference() || param.is_sub_int() {
        return Expr::cast(CastKind::Reinterpret, param.clone(), expr);
    }
    expr
}
