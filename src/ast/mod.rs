//! Output representation: typed three-address statements over named
//! variables.
//!
//! This module defines the AST nodes a lowered method body consists of.

mod nodes;
mod printer;

pub use nodes::*;
pub use printer::*;
