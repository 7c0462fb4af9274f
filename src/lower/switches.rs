//! Switch lowering.
//!
//! A `tableswitch`/`lookupswitch` becomes one switch statement carrying the
//! ordered case list (default first, then the keys in encoded order),
//! followed by one case-marker/goto pair per case. The gotos dispatch to
//! the original targets; a downstream linker ties case ids and labels
//! together.

use crate::ast::{CaseId, Expr, StmtKind, SwitchCase};
use crate::classfile::{Instruction, LabelId, Type};
use crate::common::{Error, Result};
use crate::frame::Frame;
use crate::lower::vars::VariableTable;

pub(crate) fn lower_switch(
    method: &str,
    insn: &Instruction,
    before: &Frame,
    switch_index: u32,
    vars: &mut VariableTable,
) -> Result<Vec<StmtKind>> {
    let (default, keyed): (LabelId, Vec<(i32, LabelId)>) = match insn {
        Instruction::TableSwitch { low, high, default, targets } => {
            let span = (*high as i64 - *low as i64 + 1).max(0) as usize;
            if targets.len() != span {
                return Err(Error::malformed(
                    method,
                    format!(
                        "tableswitch covers {} key(s) but has {} target(s)",
                        span,
                        targets.len()
                    ),
                ));
            }
            let keyed = targets
                .iter()
                .enumerate()
                .map(|(i, t)| (*low + i as i32, *t))
                .collect();
            (*default, keyed)
        }
        Instruction::LookupSwitch { default, pairs } => (*default, pairs.clone()),
        other => {
            return Err(Error::internal(
                method,
                format!("not a switch instruction: {:?}", other),
            ))
        }
    };

    let height = before.stack_height();
    if height == 0 {
        return Err(Error::internal(method, "switch with an empty operand stack"));
    }
    let value = vars.stack(height - 1, &Type::Int);

    // Default first, then the keys in encoded order; targets keep pairing
    // with their case ids through the trailing marker/goto block.
    let mut cases = Vec::with_capacity(keyed.len() + 1);
    let mut targets = Vec::with_capacity(keyed.len() + 1);
    cases.push(SwitchCase {
        id: CaseId { switch_index, case_index: 0 },
        key: None,
    });
    targets.push(default);
    for (ordinal, (key, target)) in keyed.iter().enumerate() {
        cases.push(SwitchCase {
            id: CaseId {
                switch_index,
                case_index: ordinal as u32 + 1,
            },
            key: Some(*key),
        });
        targets.push(*target);
    }

    let mut out = Vec::with_capacity(1 + cases.len() * 2);
    out.push(StmtKind::Switch {
        value: Expr::Var(value),
        cases: cases.clone(),
    });
    for (case, target) in cases.iter().zip(targets.iter()) {
        out.push(StmtKind::Case(case.id));
        out.push(StmtKind::Goto(*target));
    }
    Ok(out)
}
