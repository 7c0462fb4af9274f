//! Stack shuffle lowering (`dup` family, `swap`).
//!
//! The output has no operand stack, so each shuffle becomes an explicit
//! sequence of stack-variable copies reproducing the JVMS 6.5 post-state.
//! Frames are value-indexed: a category-2 value is one entry, which folds
//! the four `dup2_x2` forms (and the `_x` form2 variants) onto a handful of
//! shared move sequences. Which sequence applies is decided by the operand
//! categories in the before-frame; an impossible category mix means the
//! oracle and the code disagree.

use std::collections::HashMap;

use crate::ast::{Expr, StmtKind};
use crate::classfile::{Instruction, Type};
use crate::common::{Error, Result};
use crate::frame::Frame;
use crate::lower::vars::VariableTable;

/// Copy moves as (destination, source) offsets relative to the before
/// stack height. Within one sequence a source offset re-reads whatever an
/// earlier move wrote there.
const DUP: &[(isize, isize)] = &[(0, -1)];
const DUP_X1: &[(isize, isize)] = &[(0, -1), (-1, -2), (-2, 0)];
const DUP_X2: &[(isize, isize)] = &[(0, -1), (-1, -2), (-2, -3), (-3, 0)];
const DUP2: &[(isize, isize)] = &[(0, -2), (1, -1)];
const DUP2_X1: &[(isize, isize)] = &[(1, -1), (0, -2), (-1, -3), (-3, 0), (-2, 1)];
const DUP2_X2: &[(isize, isize)] = &[(1, -1), (0, -2), (-1, -3), (-2, -4), (-4, 0), (-3, 1)];

pub(crate) fn lower_shuffle(
    method: &str,
    insn: &Instruction,
    before: &Frame,
    vars: &mut VariableTable,
) -> Result<Vec<StmtKind>> {
    let mut shuffle = Shuffle::new(method, before, vars);
    match insn {
        Instruction::Dup => {
            shuffle.require(&[1])?;
            shuffle.run(DUP)
        }
        Instruction::DupX1 => {
            shuffle.require(&[1, 1])?;
            shuffle.run(DUP_X1)
        }
        Instruction::DupX2 => {
            if shuffle.category(1)? == 2 {
                shuffle.require(&[1, 2])?;
                shuffle.run(DUP_X1)
            } else {
                shuffle.require(&[1, 1, 1])?;
                shuffle.run(DUP_X2)
            }
        }
        Instruction::Dup2 => {
            if shuffle.category(0)? == 2 {
                shuffle.run(DUP)
            } else {
                shuffle.require(&[1, 1])?;
                shuffle.run(DUP2)
            }
        }
        Instruction::Dup2X1 => {
            if shuffle.category(0)? == 2 {
                shuffle.require(&[2, 1])?;
                shuffle.run(DUP_X1)
            } else {
                shuffle.require(&[1, 1, 1])?;
                shuffle.run(DUP2_X1)
            }
        }
        Instruction::Dup2X2 => {
            if shuffle.category(0)? == 2 {
                if shuffle.category(1)? == 2 {
                    shuffle.run(DUP_X1)
                } else {
                    shuffle.require(&[2, 1, 1])?;
                    shuffle.run(DUP_X2)
                }
            } else if shuffle.category(2)? == 2 {
                shuffle.require(&[1, 1, 2])?;
                shuffle.run(DUP2_X1)
            } else {
                shuffle.require(&[1, 1, 1, 1])?;
                shuffle.run(DUP2_X2)
            }
        }
        Instruction::Swap => {
            shuffle.require(&[1, 1])?;
            shuffle.swap()
        }
        other => Err(Error::internal(
            method,
            format!("not a stack shuffle instruction: {:?}", other),
        )),
    }
}

struct Shuffle<'a> {
    method: &'a str,
    before: &'a Frame,
    vars: &'a mut VariableTable,
    height: usize,
    /// Value type per absolute stack height, updated as moves execute.
    layout: HashMap<usize, Type>,
}

impl<'a> Shuffle<'a> {
    fn new(method: &'a str, before: &'a Frame, vars: &'a mut VariableTable) -> Self {
        Shuffle {
            method,
            before,
            vars,
            height: before.stack_height(),
            layout: HashMap::new(),
        }
    }

    /// Type of the operand `depth` values below the top of the before
    /// stack.
    fn operand(&self, depth: usize) -> Result<Type> {
        self.before
            .stack_from_top(depth)
            .and_then(|slot| slot.as_type())
            .cloned()
            .ok_or_else(|| {
                Error::internal(
                    self.method,
                    format!("stack shuffle needs a typed operand at depth {}", depth),
                )
            })
    }

    fn category(&self, depth: usize) -> Result<u8> {
        Ok(self.operand(depth)?.category())
    }

    /// Check the operand categories from the top down.
    fn require(&mut self, categories: &[u8]) -> Result<()> {
        for (depth, expected) in categories.iter().enumerate() {
            let actual = self.category(depth)?;
            if actual != *expected {
                return Err(Error::internal(
                    self.method,
                    format!(
                        "stack shuffle category mismatch at depth {}: expected {}, found {}",
                        depth, expected, actual
                    ),
                ));
            }
            let h = self.height - 1 - depth;
            let ty = self.operand(depth)?;
            self.layout.insert(h, ty);
        }
        Ok(())
    }

    fn abs(&self, offset: isize) -> Result<usize> {
        let h = self.height as isize + offset;
        if h < 0 {
            return Err(Error::internal(self.method, "operand stack too shallow"));
        }
        Ok(h as usize)
    }

    fn run(mut self, moves: &[(isize, isize)]) -> Result<Vec<StmtKind>> {
        // Seed any source the move list reads that require() did not cover.
        for (_, src) in moves {
            if *src < 0 {
                let depth = (-*src - 1) as usize;
                let h = self.abs(*src)?;
                if !self.layout.contains_key(&h) {
                    let ty = self.operand(depth)?;
                    self.layout.insert(h, ty);
                }
            }
        }

        let mut out = Vec::with_capacity(moves.len());
        for (dst_off, src_off) in moves {
            let src = self.abs(*src_off)?;
            let dst = self.abs(*dst_off)?;
            let ty = self.layout.get(&src).cloned().ok_or_else(|| {
                Error::internal(self.method, format!("no value at stack height {}", src))
            })?;
            let src_var = self.vars.stack(src, &ty);
            let dst_var = self.vars.stack(dst, &ty);
            out.push(StmtKind::Assign {
                dest: dst_var,
                value: Expr::Var(src_var),
            });
            self.layout.insert(dst, ty);
        }
        Ok(out)
    }

    /// `swap` routes through a temporary so neither operand is clobbered.
    fn swap(mut self) -> Result<Vec<StmtKind>> {
        let top = self.operand(0)?;
        let under = self.operand(1)?;
        let top_pos = self.height - 1;
        let under_pos = self.height - 2;

        let tmp = self.vars.swap_tmp(&under);
        let under_var = self.vars.stack(under_pos, &under);
        let top_var = self.vars.stack(top_pos, &top);
        let new_under = self.vars.stack(under_pos, &top);
        let new_top = self.vars.stack(top_pos, &under);

        Ok(vec![
            StmtKind::Assign {
                dest: tmp,
                value: Expr::Var(under_var),
            },
            StmtKind::Assign {
                dest: new_under,
                value: Expr::Var(top_var),
            },
            StmtKind::Assign {
                dest: new_top,
                value: Expr::Var(tmp),
            },
        ])
    }
}
