//! Method-level assembly.
//!
//! Binds the receiver and parameters to entry variables, walks the pruned
//! instruction list through the engine, tags every emitted statement with
//! its source line and active handlers, and packs the result into a
//! [`MethodAst`].

use std::collections::HashMap;

use log::debug;

use crate::ast::{Expr, MethodAst, Stmt, StmtKind, VarId, VarOrigin};
use crate::classfile::{
    parse_field_descriptor, parse_method_descriptor, Instruction, LabelId, LocalVarInfo,
    MethodCode, MethodDef, MethodRef, Type,
};
use crate::common::{Error, Result};
use crate::config::Config;
use crate::consts;
use crate::frame::FrameTable;
use crate::lower::catches::CatchTracker;
use crate::lower::engine::{adapt, Lowerer};
use crate::lower::vars::VariableTable;

struct EntryBinding {
    this_var: Option<VarId>,
    params: Vec<VarId>,
    copies: Vec<StmtKind>,
}

/// Lower a pruned, frame-annotated body into its method AST.
pub(crate) fn build(
    method: &MethodDef,
    code: &MethodCode,
    frames: &FrameTable,
    config: &Config,
) -> Result<MethodAst> {
    let mut vars = VariableTable::new();
    let EntryBinding {
        this_var,
        params,
        copies,
    } = bind_entry(method, code, config, &mut vars)?;
    let mut tracker = CatchTracker::new(&code.exception_table, &mut vars)?;
    let mut engine = Lowerer::new(method, config, code, frames, &mut vars)?;

    let mut body: Vec<Stmt> = Vec::with_capacity(code.instructions.len());
    for kind in copies {
        body.push(Stmt::new(kind));
    }

    let mut current_line: Option<u32> = None;
    for (index, insn) in code.instructions.iter().enumerate() {
        match insn {
            Instruction::Line(line) => {
                if config.emit_line_numbers {
                    current_line = Some(*line);
                }
            }
            Instruction::Label(label) => {
                tracker.enter_label(*label);
                body.push(positioned(StmtKind::Label(*label), current_line, &tracker));
            }
            _ => {
                for kind in engine.lower(index, insn)? {
                    body.push(positioned(kind, current_line, &tracker));
                }
            }
        }
    }
    engine.finish()?;

    let catches = tracker.into_catch_blocks();
    debug!(
        "{}: lowered {} statement(s), {} catch block(s)",
        method.qualified_name(),
        body.len(),
        catches.len()
    );

    let mut bound: Vec<VarId> = Vec::new();
    bound.extend(this_var);
    bound.extend(params.iter().copied());
    let locals: Vec<VarId> = vars.ids().filter(|id| !bound.contains(id)).collect();

    Ok(MethodAst {
        class_name: method.class_name.clone(),
        name: method.name.clone(),
        descriptor: method.descriptor.clone(),
        access: method.access,
        signature: method.signature.clone(),
        exceptions: method.exceptions.clone(),
        this_var,
        params,
        locals,
        body,
        catches,
        variables: vars.into_variables(),
    })
}

/// A body with no instructions at all: tolerated only in tolerant mode, by
/// substituting `throw new AssertionError()`.
pub(crate) fn build_empty(method: &MethodDef, config: &Config) -> Result<MethodAst> {
    if !config.tolerant {
        return Err(Error::malformed(
            method.qualified_name(),
            "method body has no instructions",
        ));
    }
    debug!(
        "{}: empty body, substituting a throwing fallback",
        method.qualified_name()
    );

    let mut vars = VariableTable::new();
    let parsed = parse_method_descriptor(&method.descriptor)?;
    let mut slot: u16 = 0;
    let mut this_var = None;
    if !method.is_static() {
        let declared = Type::Reference(method.class_name.clone());
        this_var = Some(vars.parameter(0, declared, VarOrigin::This));
        slot = 1;
    }
    let mut params = Vec::with_capacity(parsed.params.len());
    for ty in parsed.params {
        let width = ty.width();
        params.push(vars.parameter(slot, ty, VarOrigin::Parameter));
        slot += width;
    }

    let error_ty = Type::assertion_error().clone();
    let exception = vars.stack(0, &error_ty);
    let body = vec![
        Stmt::new(StmtKind::Assign {
            dest: exception,
            value: Expr::Alloc {
                class: consts::JAVA_LANG_ASSERTION_ERROR.to_string(),
            },
        }),
        Stmt::new(StmtKind::ConstructorCall {
            receiver: Expr::Var(exception),
            method: MethodRef {
                owner: consts::JAVA_LANG_ASSERTION_ERROR.to_string(),
                name: consts::CONSTRUCTOR_NAME.to_string(),
                descriptor: "()V".to_string(),
            },
            args: Vec::new(),
        }),
        Stmt::new(StmtKind::Throw(Expr::Var(exception))),
    ];

    let mut bound: Vec<VarId> = Vec::new();
    bound.extend(this_var);
    bound.extend(params.iter().copied());
    let locals: Vec<VarId> = vars.ids().filter(|id| !bound.contains(id)).collect();

    Ok(MethodAst {
        class_name: method.class_name.clone(),
        name: method.name.clone(),
        descriptor: method.descriptor.clone(),
        access: method.access,
        signature: method.signature.clone(),
        exceptions: method.exceptions.clone(),
        this_var,
        params,
        locals,
        body,
        catches: Vec::new(),
        variables: vars.into_variables(),
    })
}

fn positioned(kind: StmtKind, line: Option<u32>, tracker: &CatchTracker) -> Stmt {
    let mut stmt = Stmt::new(kind);
    stmt.line = line;
    stmt.handlers = tracker.active_handlers();
    stmt
}

/// Bind receiver and parameter slots. Each binding resolves through debug
/// info when an entry covers the method entry point; an anonymous slot gets
/// a shadow copy so that body stores never alias the incoming binding.
fn bind_entry(
    method: &MethodDef,
    code: &MethodCode,
    config: &Config,
    vars: &mut VariableTable,
) -> Result<EntryBinding> {
    let parsed = parse_method_descriptor(&method.descriptor)?;
    let positions = code.label_positions();
    let entry_pos = first_real_index(code);

    let mut copies = Vec::new();
    let mut slot: u16 = 0;
    let mut this_var = None;
    if !method.is_static() {
        let declared = Type::Reference(method.class_name.clone());
        let (var, mut shadow) = bind_slot(
            code, &positions, config, vars, slot, declared, VarOrigin::This, entry_pos,
        )?;
        copies.append(&mut shadow);
        this_var = Some(var);
        slot = 1;
    }
    let mut params = Vec::with_capacity(parsed.params.len());
    for declared in parsed.params {
        let width = declared.width();
        let (var, mut shadow) = bind_slot(
            code,
            &positions,
            config,
            vars,
            slot,
            declared,
            VarOrigin::Parameter,
            entry_pos,
        )?;
        copies.append(&mut shadow);
        params.push(var);
        slot += width;
    }
    Ok(EntryBinding {
        this_var,
        params,
        copies,
    })
}

#[allow(clippy::too_many_arguments)]
fn bind_slot(
    code: &MethodCode,
    positions: &HashMap<LabelId, usize>,
    config: &Config,
    vars: &mut VariableTable,
    slot: u16,
    declared: Type,
    origin: VarOrigin,
    entry_pos: usize,
) -> Result<(VarId, Vec<StmtKind>)> {
    if config.use_debug_names {
        if let Some(entry) = covering_entry(code, positions, slot, entry_pos) {
            let ty = parse_field_descriptor(&entry.descriptor)?;
            let var = vars.named_local(
                slot,
                &entry.name,
                ty,
                &entry.descriptor,
                entry.signature.clone(),
                origin,
            );
            // Body loads and stores resolve to the same named variable, so
            // the binding needs no shadow copy.
            return Ok((var, Vec::new()));
        }
    }

    let binding = vars.parameter(slot, declared.clone(), origin);
    let body_var = vars.unnamed_local(slot, &declared);
    let mut copies = Vec::new();
    if body_var != binding {
        let body_ty = declared.normalized();
        copies.push(StmtKind::Assign {
            dest: body_var,
            value: adapt(Expr::Var(binding), &declared, &body_ty),
        });
    }
    Ok((binding, copies))
}

fn covering_entry<'c>(
    code: &'c MethodCode,
    positions: &HashMap<LabelId, usize>,
    slot: u16,
    entry_pos: usize,
) -> Option<&'c LocalVarInfo> {
    for entry in &code.local_vars {
        if entry.slot != slot {
            continue;
        }
        let (Some(&start), Some(&end)) = (positions.get(&entry.start), positions.get(&entry.end))
        else {
            continue;
        };
        if start <= entry_pos && entry_pos < end {
            return Some(entry);
        }
    }
    None
}

fn first_real_index(code: &MethodCode) -> usize {
    code.instructions
        .iter()
        .position(|insn| !insn.is_marker())
        .unwrap_or(0)
}
