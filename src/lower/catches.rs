//! Exception range lowering.
//!
//! Ranges sharing a handler label collapse into one handler with one
//! caught-exception variable. While the body is walked, ranges activate at
//! their start label and deactivate at their end label, and every emitted
//! statement is tagged with the handlers active at its position, in
//! exception-table order (dispatch order).

use std::collections::HashMap;

use crate::ast::{CatchBlock, Expr, HandlerId, Stmt, StmtKind, VarId};
use crate::classfile::{ExceptionRange, LabelId, Type};
use crate::common::Result;
use crate::lower::vars::VariableTable;

struct TrackedRange {
    start: LabelId,
    end: LabelId,
    handler: HandlerId,
    active: bool,
}

struct HandlerInfo {
    id: HandlerId,
    label: LabelId,
    caught: Vec<Type>,
    catch_all: bool,
    var: VarId,
}

/// Per-method exception bookkeeping for the lowering walk.
pub struct CatchTracker {
    ranges: Vec<TrackedRange>,
    handlers: Vec<HandlerInfo>,
}

impl CatchTracker {
    /// Group `table` by handler label and synthesize one caught-exception
    /// variable per handler. A handler guarding a single declared type
    /// keeps it; multiple declared types or a catch-all entry widen the
    /// variable to `java/lang/Throwable`.
    pub fn new(table: &[ExceptionRange], vars: &mut VariableTable) -> Result<CatchTracker> {
        let mut handlers: Vec<HandlerInfo> = Vec::new();
        let mut by_label: HashMap<LabelId, usize> = HashMap::new();
        let mut ranges = Vec::with_capacity(table.len());

        for range in table {
            if range.start == range.end {
                continue;
            }
            let slot = match by_label.get(&range.handler) {
                Some(&slot) => slot,
                None => {
                    let slot = handlers.len();
                    by_label.insert(range.handler, slot);
                    handlers.push(HandlerInfo {
                        id: HandlerId(slot as u32),
                        label: range.handler,
                        caught: Vec::new(),
                        catch_all: false,
                        var: VarId(0),
                    });
                    slot
                }
            };
            let info = &mut handlers[slot];
            match &range.catch_type {
                Some(name) => {
                    let ty = Type::Reference(name.clone());
                    if !info.caught.contains(&ty) {
                        info.caught.push(ty);
                    }
                }
                None => info.catch_all = true,
            }
            ranges.push(TrackedRange {
                start: range.start,
                end: range.end,
                handler: HandlerId(slot as u32),
                active: false,
            });
        }

        for info in &mut handlers {
            let var_ty = if info.caught.len() == 1 && !info.catch_all {
                info.caught[0].clone()
            } else {
                Type::throwable().clone()
            };
            info.var = vars.exception(var_ty);
        }

        Ok(CatchTracker { ranges, handlers })
    }

    /// Update range activation for a label in the body walk. End labels
    /// are exclusive, so deactivation runs before activation.
    pub fn enter_label(&mut self, label: LabelId) {
        for range in &mut self.ranges {
            if range.end == label {
                range.active = false;
            }
        }
        for range in &mut self.ranges {
            if range.start == label {
                range.active = true;
            }
        }
    }

    /// Handlers guarding the current position, in dispatch order.
    pub fn active_handlers(&self) -> Vec<HandlerId> {
        let mut out = Vec::new();
        for range in &self.ranges {
            if range.active && !out.contains(&range.handler) {
                out.push(range.handler);
            }
        }
        out
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Build the catch-block prologues: bind the implicit exception value,
    /// then jump into the handler code that still lives in the body.
    pub fn into_catch_blocks(self) -> Vec<CatchBlock> {
        self.handlers
            .into_iter()
            .map(|info| {
                let body = vec![
                    Stmt::new(StmtKind::Assign {
                        dest: info.var,
                        value: Expr::CaughtException,
                    }),
                    Stmt::new(StmtKind::Goto(info.label)),
                ];
                CatchBlock {
                    id: info.id,
                    handler_label: info.label,
                    caught: info.caught,
                    catch_all: info.catch_all,
                    var: info.var,
                    body,
                }
            })
            .collect()
    }
}
