//! Per-file static analysis run off the protocol task

mod pool;
mod syntax;

pub use pool::{BatchPool, BatchReport, FileOutcome, FileTask};
pub use syntax::{parse_diagnostic, Diagnostic, SyntaxCheckTask};
