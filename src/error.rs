//! Typed error kinds for the parts of the pipeline that need to branch on
//! failure category. Most fallible code still returns `anyhow::Result` with
//! `.context()`; these variants exist so the concurrency harness and the
//! CLI entry point can distinguish "stop everything" from "skip this
//! locus" from "abort, this is a programmer error".
use thiserror::Error;

/// A classification of why something failed, attached to an [`anyhow::Error`]
/// via [`anyhow::Error::downcast_ref`] when the distinction matters.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Bad catalog JSON, unknown variant subtype, non-consecutive variant
    /// nodes, an empty read sequence. Fails the whole run before any worker
    /// starts.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// I/O failure against the aligned-read archive or reference FASTA.
    /// Worker-local; surfaced through the cancellation mechanism.
    #[error("archive I/O failure: {0}")]
    ArchiveIo(String),

    /// Runtime invariant violation (non-consecutive node bundle, path
    /// extending past a node boundary, invalid periodicity). Treated as a
    /// programmer error: the run aborts with a description.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),
}

impl CoreError {
    pub fn malformed(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(CoreError::MalformedInput(msg.into()))
    }
    pub fn archive_io(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(CoreError::ArchiveIo(msg.into()))
    }
    pub fn invariant(msg: impl Into<String>) -> anyhow::Error {
        anyhow::Error::new(CoreError::InvariantViolation(msg.into()))
    }
}
