//! The per-method lowering pipeline.
//!
//! `lower_method` runs the full sequence: subroutine inlining, frame
//! analysis through the caller-supplied oracle, dead-code pruning (with a
//! second oracle pass when anything was removed, since dropping dead merge
//! predecessors can tighten surviving types), then the instruction walk
//! that produces the method AST.

mod body;
mod catches;
mod engine;
pub mod prune;
pub mod subroutine;
mod shuffle;
mod switches;
pub mod vars;

use log::debug;

use crate::ast::MethodAst;
use crate::classfile::{flags, ClassDef, MethodDef};
use crate::common::{Error, Result};
use crate::config::Config;
use crate::frame::FrameOracle;

pub use prune::prune_unreachable;
pub use subroutine::inline_subroutines;
pub use vars::VariableTable;

/// Lower one method body into its AST.
pub fn lower_method(
    method: &MethodDef,
    oracle: &dyn FrameOracle,
    config: &Config,
) -> Result<MethodAst> {
    let qualified = method.qualified_name();
    let code = method
        .code
        .as_ref()
        .ok_or_else(|| Error::malformed(&qualified, "method has no code attribute"))?;
    if code.instructions.is_empty() {
        return body::build_empty(method, config);
    }

    let inlined = inline_subroutines(&qualified, code)?;
    let frames = oracle.analyze(method, &inlined)?;
    let (pruned, changed) = prune_unreachable(&qualified, &inlined, &frames);
    // Indices in `frames` only stay valid when pruning removed nothing.
    let frames = if changed {
        oracle.analyze(method, &pruned)?
    } else {
        frames
    };

    debug!(
        "{}: lowering {} instruction(s)",
        qualified,
        pruned.instructions.len()
    );
    body::build(method, &pruned, &frames, config)
}

/// Lower every concrete method of `class`, aborting on the first error.
/// Abstract and native methods carry no code and are skipped.
pub fn lower_class(
    class: &ClassDef,
    oracle: &dyn FrameOracle,
    config: &Config,
) -> Result<Vec<MethodAst>> {
    let mut lowered = Vec::with_capacity(class.methods.len());
    for method in &class.methods {
        if !flags::has_code(method.access) {
            continue;
        }
        lowered.push(lower_method(method, oracle, config)?);
    }
    Ok(lowered)
}
