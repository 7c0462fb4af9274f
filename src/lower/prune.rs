//! Unreachable-code removal.

use log::debug;

use crate::classfile::{Instruction, MethodCode};
use crate::frame::FrameTable;

/// Drop every instruction the oracle proved unreachable. Labels survive
/// unconditionally: exception ranges and local-variable scopes resolve by
/// label identity, and a referenced label must stay resolvable even when
/// the code around it is gone.
///
/// Returns the pruned body and whether anything was removed; removal means
/// the frames must be recomputed, since a surviving merge point can get an
/// exact type once its dead predecessors are gone.
pub fn prune_unreachable(method: &str, code: &MethodCode, frames: &FrameTable) -> (MethodCode, bool) {
    let mut instructions = Vec::with_capacity(code.instructions.len());
    let mut removed = 0usize;
    for (i, insn) in code.instructions.iter().enumerate() {
        if insn.is_label() || frames.is_reachable(i) {
            instructions.push(insn.clone());
        } else {
            removed += 1;
        }
    }

    if removed > 0 {
        debug!("{}: pruned {} unreachable instruction(s)", method, removed);
    }

    let pruned = MethodCode {
        instructions,
        exception_table: code.exception_table.clone(),
        local_vars: code.local_vars.clone(),
        max_locals: code.max_locals,
    };
    (pruned, removed > 0)
}
