//! Variable manipulation nodes.

mod assign;

pub use assign::AssignVarHandler;
