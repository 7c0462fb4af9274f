//! Subroutine (`jsr`/`ret`) elimination by call-site inlining.
//!
//! Frames are computed only after this pass: the dataflow analysis does not
//! model subroutine returns, so every `jsr` is replaced by a jump into a
//! freshly relabelled copy of the callee, and the callee's `ret` becomes a
//! jump back to the call site's return point.
//!
//! Membership is marked by flood fill: the main body first, then each `jsr`
//! target, first claim wins. A `jsr`'s in-routine successor is the
//! instruction after it (the return point), never its target. Exception
//! handlers of ranges intersecting a routine are pulled into that routine
//! until nothing changes, so handler code clones along with the code it
//! guards.

use std::collections::{HashMap, VecDeque};

use log::debug;

use crate::classfile::{ConstValue, ExceptionRange, Instruction, LabelId, MethodCode};
use crate::common::{Error, Result};

/// Rewrite `code` into an equivalent body without `jsr`/`ret`. Bodies that
/// never use subroutines pass through unchanged.
pub fn inline_subroutines(method: &str, code: &MethodCode) -> Result<MethodCode> {
    let heads = collect_heads(method, code)?;
    if heads.is_empty() {
        return Ok(code.clone());
    }

    let label_pos = code.label_positions();
    let range_spans = resolve_range_spans(method, code, &label_pos)?;
    let memberships = mark_memberships(method, code, &heads, &label_pos, &range_spans)?;

    let mut owner_of: Vec<Option<usize>> = vec![None; code.instructions.len()];
    for (sub, membership) in memberships.iter().enumerate() {
        for (i, owned) in membership.iter().enumerate() {
            if *owned {
                owner_of[i] = Some(sub);
            }
        }
    }

    let mut next_label = fresh_label_base(code);
    let head_sub: HashMap<LabelId, usize> = heads
        .iter()
        .enumerate()
        .map(|(k, head)| (*head, k + 1))
        .collect();

    let mut instantiations: Vec<Instantiation> = Vec::new();
    let mut worklist: VecDeque<usize> = VecDeque::new();
    instantiations.push(Instantiation::main());
    worklist.push_back(0);

    let mut out_insns: Vec<Instruction> = Vec::new();
    let mut out_ranges: Vec<ExceptionRange> = Vec::new();
    let mut clone_count = 0usize;

    while let Some(current) = worklist.pop_front() {
        if instantiations[current].parent.is_some() {
            clone_count += 1;
        }
        emit_instantiation(
            method,
            code,
            current,
            &mut instantiations,
            &mut worklist,
            &owner_of,
            &label_pos,
            &head_sub,
            &mut next_label,
            &mut out_insns,
        )?;
        emit_ranges(
            code,
            &instantiations,
            current,
            &owner_of,
            &range_spans,
            &label_pos,
            &mut out_ranges,
        );
    }

    debug!(
        "{}: inlined {} subroutine instantiation(s) over {} head(s)",
        method,
        clone_count,
        heads.len()
    );

    Ok(MethodCode {
        instructions: out_insns,
        exception_table: out_ranges,
        local_vars: code.local_vars.clone(),
        max_locals: code.max_locals,
    })
}

/// Distinct `jsr` targets in scan order.
fn collect_heads(method: &str, code: &MethodCode) -> Result<Vec<LabelId>> {
    let label_pos = code.label_positions();
    let mut heads = Vec::new();
    for insn in &code.instructions {
        if let Instruction::Jsr(target) = insn {
            if !label_pos.contains_key(target) {
                return Err(Error::malformed(
                    method,
                    format!("jsr target label {} is not defined", target.0),
                ));
            }
            if !heads.contains(target) {
                heads.push(*target);
            }
        }
    }
    Ok(heads)
}

/// Instruction index interval `[start, end)` of each exception range.
fn resolve_range_spans(
    method: &str,
    code: &MethodCode,
    label_pos: &HashMap<LabelId, usize>,
) -> Result<Vec<(usize, usize)>> {
    code.exception_table
        .iter()
        .map(|range| {
            let start = label_pos.get(&range.start).copied().ok_or_else(|| {
                Error::malformed(
                    method,
                    format!("exception range start label {} is not defined", range.start.0),
                )
            })?;
            let end = label_pos.get(&range.end).copied().ok_or_else(|| {
                Error::malformed(
                    method,
                    format!("exception range end label {} is not defined", range.end.0),
                )
            })?;
            Ok((start, end))
        })
        .collect()
}

/// Membership vectors: index 0 is the main body, then one per head.
fn mark_memberships(
    method: &str,
    code: &MethodCode,
    heads: &[LabelId],
    label_pos: &HashMap<LabelId, usize>,
    range_spans: &[(usize, usize)],
) -> Result<Vec<Vec<bool>>> {
    let n = code.instructions.len();
    let mut memberships = vec![vec![false; n]; heads.len() + 1];
    let mut claimed = vec![false; n];

    mark_routine(code, 0, &mut memberships[0], &mut claimed, label_pos, range_spans);
    for (k, head) in heads.iter().enumerate() {
        let start = *label_pos.get(head).ok_or_else(|| {
            Error::malformed(method, format!("jsr target label {} is not defined", head.0))
        })?;
        mark_routine(
            code,
            start,
            &mut memberships[k + 1],
            &mut claimed,
            label_pos,
            range_spans,
        );
    }
    Ok(memberships)
}

/// Flood fill one routine from `start`, then grow over intersecting
/// exception ranges to a fixed point.
fn mark_routine(
    code: &MethodCode,
    start: usize,
    membership: &mut Vec<bool>,
    claimed: &mut Vec<bool>,
    label_pos: &HashMap<LabelId, usize>,
    range_spans: &[(usize, usize)],
) {
    flood(code, start, membership, claimed, label_pos);
    loop {
        let mut changed = false;
        for (range_index, (range_start, range_end)) in range_spans.iter().enumerate() {
            let intersects = (*range_start..*range_end).any(|i| membership.get(i) == Some(&true));
            if !intersects {
                continue;
            }
            let handler = code.exception_table[range_index].handler;
            if let Some(&handler_pos) = label_pos.get(&handler) {
                if flood(code, handler_pos, membership, claimed, label_pos) {
                    changed = true;
                }
            }
        }
        if !changed {
            break;
        }
    }
}

fn flood(
    code: &MethodCode,
    start: usize,
    membership: &mut Vec<bool>,
    claimed: &mut Vec<bool>,
    label_pos: &HashMap<LabelId, usize>,
) -> bool {
    let mut changed = false;
    let mut stack = vec![start];
    while let Some(i) = stack.pop() {
        if i >= code.instructions.len() || membership[i] {
            continue;
        }
        if claimed[i] {
            continue;
        }
        membership[i] = true;
        claimed[i] = true;
        changed = true;
        let insn = &code.instructions[i];
        match insn {
            // The callee belongs to its own routine; only the return point
            // continues here.
            Instruction::Jsr(_) => stack.push(i + 1),
            _ => {
                for target in insn.targets() {
                    if let Some(&pos) = label_pos.get(&target) {
                        stack.push(pos);
                    }
                }
                if insn.falls_through() {
                    stack.push(i + 1);
                }
            }
        }
    }
    changed
}

fn fresh_label_base(code: &MethodCode) -> u32 {
    let mut max = 0u32;
    for insn in &code.instructions {
        if let Instruction::Label(l) = insn {
            max = max.max(l.0);
        }
        for t in insn.targets() {
            max = max.max(t.0);
        }
    }
    for range in &code.exception_table {
        max = max.max(range.start.0).max(range.end.0).max(range.handler.0);
    }
    for var in &code.local_vars {
        max = max.max(var.start.0).max(var.end.0);
    }
    max + 1
}

/// One emission of one routine. The main body is the instantiation with no
/// parent; clones carry a fresh duplicate for every original label so that
/// range boundaries stay pinned inside the copied code.
struct Instantiation {
    parent: Option<usize>,
    /// 0 = main body, `k + 1` = the k-th subroutine head.
    sub: usize,
    /// `None` means identity (the main body keeps original labels).
    label_map: Option<HashMap<LabelId, LabelId>>,
    return_label: Option<LabelId>,
}

impl Instantiation {
    fn main() -> Self {
        Instantiation {
            parent: None,
            sub: 0,
            label_map: None,
            return_label: None,
        }
    }

    fn map_label(&self, label: LabelId) -> LabelId {
        match &self.label_map {
            None => label,
            Some(map) => map.get(&label).copied().unwrap_or(label),
        }
    }
}

/// Duplicate labels for a clone: consecutive label positions with no owned
/// instruction between them collapse onto one duplicate.
fn build_clone_label_map(
    code: &MethodCode,
    sub: usize,
    owner_of: &[Option<usize>],
    next_label: &mut u32,
) -> HashMap<LabelId, LabelId> {
    let mut map = HashMap::new();
    let mut dup: Option<LabelId> = None;
    for (i, insn) in code.instructions.iter().enumerate() {
        match insn {
            Instruction::Label(l) => {
                let d = *dup.get_or_insert_with(|| {
                    let fresh = LabelId(*next_label);
                    *next_label += 1;
                    fresh
                });
                map.insert(*l, d);
            }
            _ => {
                if owner_of[i] == Some(sub) {
                    dup = None;
                }
            }
        }
    }
    map
}

/// Resolve a branch target inside an instantiation: the label belongs to
/// whichever routine claimed its position, and the nearest enclosing
/// instantiation of that routine supplies the replacement.
fn resolve_target(
    instantiations: &[Instantiation],
    current: usize,
    label: LabelId,
    owner_of: &[Option<usize>],
    label_pos: &HashMap<LabelId, usize>,
) -> LabelId {
    let owner = label_pos.get(&label).and_then(|&pos| owner_of[pos]);
    let mut cursor = Some(current);
    while let Some(idx) = cursor {
        let inst = &instantiations[idx];
        if Some(inst.sub) == owner {
            return inst.map_label(label);
        }
        cursor = inst.parent;
    }
    label
}

#[allow(clippy::too_many_arguments)]
fn emit_instantiation(
    method: &str,
    code: &MethodCode,
    current: usize,
    instantiations: &mut Vec<Instantiation>,
    worklist: &mut VecDeque<usize>,
    owner_of: &[Option<usize>],
    label_pos: &HashMap<LabelId, usize>,
    head_sub: &HashMap<LabelId, usize>,
    next_label: &mut u32,
    out: &mut Vec<Instruction>,
) -> Result<()> {
    let mut last_label: Option<LabelId> = None;
    for (i, insn) in code.instructions.iter().enumerate() {
        if let Instruction::Label(l) = insn {
            let mapped = instantiations[current].map_label(*l);
            if last_label != Some(mapped) {
                out.push(Instruction::Label(mapped));
                last_label = Some(mapped);
            }
            continue;
        }
        if owner_of[i] != Some(instantiations[current].sub) {
            continue;
        }
        last_label = None;
        match insn {
            Instruction::Ret { .. } => {
                let back = instantiations[current].return_label.ok_or_else(|| {
                    Error::malformed(method, "ret instruction outside of any subroutine")
                })?;
                out.push(Instruction::Goto(back));
            }
            Instruction::Jsr(target) => {
                let callee = *head_sub.get(target).ok_or_else(|| {
                    Error::internal(method, format!("jsr target {} has no routine", target.0))
                })?;

                // A routine already being instantiated somewhere up the
                // chain means the subroutine recurses.
                let mut cursor = Some(current);
                while let Some(idx) = cursor {
                    if instantiations[idx].sub == callee {
                        return Err(Error::malformed(method, "recursive subroutine call"));
                    }
                    cursor = instantiations[idx].parent;
                }

                let return_label = LabelId(*next_label);
                *next_label += 1;
                let label_map = build_clone_label_map(code, callee, owner_of, next_label);
                let entry = label_map.get(target).copied().ok_or_else(|| {
                    Error::internal(method, format!("no duplicate for head label {}", target.0))
                })?;
                instantiations.push(Instantiation {
                    parent: Some(current),
                    sub: callee,
                    label_map: Some(label_map),
                    return_label: Some(return_label),
                });
                worklist.push_back(instantiations.len() - 1);

                // The pushed null stands in for the return address the
                // callee's entry store expects.
                out.push(Instruction::Push(ConstValue::Null));
                out.push(Instruction::Goto(entry));
                out.push(Instruction::Label(return_label));
                last_label = Some(return_label);
            }
            other => {
                let remapped = other.remap_labels(|t| {
                    resolve_target(instantiations, current, t, owner_of, label_pos)
                });
                out.push(remapped);
            }
        }
    }
    Ok(())
}

/// Clone every exception range that guards at least one instruction of this
/// instantiation, with its boundary labels remapped into the emitted copy.
fn emit_ranges(
    code: &MethodCode,
    instantiations: &[Instantiation],
    current: usize,
    owner_of: &[Option<usize>],
    range_spans: &[(usize, usize)],
    label_pos: &HashMap<LabelId, usize>,
    out: &mut Vec<ExceptionRange>,
) {
    let inst = &instantiations[current];
    for (range_index, (start, end)) in range_spans.iter().enumerate() {
        let covers_owned = (*start..*end).any(|i| owner_of.get(i) == Some(&Some(inst.sub)));
        if !covers_owned {
            continue;
        }
        let range = &code.exception_table[range_index];
        out.push(ExceptionRange {
            start: inst.map_label(range.start),
            end: inst.map_label(range.end),
            handler: resolve_target(instantiations, current, range.handler, owner_of, label_pos),
            catch_type: range.catch_type.clone(),
        });
    }
}
