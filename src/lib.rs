//! classlift
//!
//! Lowers JVM stack-machine method bodies (class-file instructions plus
//! their exception, local-variable and line-number tables) into a typed
//! three-address AST: flat statement sequences over explicit named
//! variables, with symbolic labels, case markers and catch blocks that a
//! downstream linker resolves.
//!
//! ## Architecture
//!
//! - **classfile**: decoded input model (instructions, descriptors, method
//!   and class shells)
//! - **frame**: the oracle interface and the per-instruction type frames it
//!   produces; the dataflow fixed point itself lives outside this crate
//! - **lower**: the lowering pipeline (subroutine inlining, dead-code
//!   pruning, the instruction engine, exception tracking, method assembly)
//! - **ast**: the produced statement/expression nodes and a debug printer
//!
//! ## Lowering Flow
//!
//! ```text
//! MethodDef → Subroutine Inliner → Frame Oracle → Dead-Code Pruner
//!                                       ↑               ↓ (if changed)
//!                                       └─── re-analyze ┘
//!                                → Lowering Engine + Catch Tracker → MethodAst
//! ```
//!
//! Lowering one method is a pure, synchronous function of (instructions,
//! descriptor, oracle frames); independent methods may be lowered
//! concurrently with separate engine state.

pub mod ast;
pub mod classfile;
pub mod common;
pub mod config;
pub mod consts;
pub mod frame;
pub mod lower;

pub use common::{Error, Result};
pub use config::Config;
pub use frame::{Frame, FrameOracle, FrameTable, SlotType};
pub use lower::{lower_class, lower_method};
