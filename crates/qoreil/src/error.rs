//! Error types (C8's companion): a raised exception that escaped every
//! landing pad, plus a top-level error enum spanning the pipeline stages
//! this core actually has.
//!
//! Grounded on `ouros::repl_error::ReplError`'s by-stage enum shape and
//! hand-rolled `Display`/`From` impls; this core has no bytecode compiler
//! or parser of its own (spec.md §1's external collaborators), so the
//! enum only needs two stages instead of ouros's four.

use std::fmt;

use crate::value::{Heap, HeapId};

/// An exception that unwound past every landing pad in a function and
/// past `Script::run`'s own three calls — spec.md §7's "unhandled
/// exception" termination. Carries the heap id of the exception object
/// so a caller can still inspect or render it; the heap itself is not
/// torn down, matching the "undefined which destructors still run"
/// Non-goal.
#[derive(Debug, Clone, Copy)]
pub struct Raised(pub HeapId);

impl Raised {
    #[must_use]
    pub fn message(self, heap: &Heap) -> String {
        match heap.data(self.0) {
            crate::value::HeapData::Exception(e) => e.message.clone(),
            _ => "<non-exception value raised>".to_owned(),
        }
    }
}

impl fmt::Display for Raised {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unhandled exception (heap id {})", self.0.index())
    }
}

impl std::error::Error for Raised {}

/// Top-level error spanning analysis and execution. Analysis failures are
/// collected as diagnostics (`scope::DiagnosticReporter`) rather than
/// short-circuited, so `Error::Sema` is only produced by a caller that
/// chooses to treat "any diagnostics were reported" as fatal.
#[derive(Debug, Clone)]
pub enum Error {
    /// One or more diagnostics were reported during analysis.
    Sema(Vec<String>),
    /// An exception propagated out of the running script unhandled.
    Runtime(Raised),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Sema(diags) => write!(f, "{} diagnostic(s) reported: {}", diags.len(), diags.join("; ")),
            Self::Runtime(raised) => write!(f, "{raised}"),
        }
    }
}

impl std::error::Error for Error {}

impl From<Raised> for Error {
    fn from(raised: Raised) -> Self {
        Self::Runtime(raised)
    }
}
