//! The crate's error type and `Result` alias.
//!
//! Every variant here is constructed by code elsewhere in the crate; the
//! shapes are dictated by those call sites. Errors carry enough context to
//! be rendered through `miette` at the task/API boundary — the [`Report`]
//! variant wraps an already-formatted [`miette::Report`], and the typed
//! variants describe the specific failure modes the pipeline distinguishes.
//!
//! [`Report`]: Error::Report

use std::fmt;

/// A crate-wide result whose error is [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// The failures the pipeline can produce.
#[derive(Debug)]
pub enum Error {
    /// A time string could not be parsed; holds the offending input.
    InvalidTimeFormat(String),
    /// A URL did not yield a source identifier; holds the URL.
    NoSourceId(String),
    /// A required media stream was absent; names the stream kind.
    MissingStream(&'static str),
    /// The source reported the stream as unavailable.
    UnavailableStream,
    /// An external program was not found on `PATH`; holds its name.
    MissingBinary(String),
    /// An external program exited non-zero after any retries.
    CommandFailed {
        /// The program that failed.
        program: String,
        /// The captured standard error from the final attempt.
        stderr: String,
    },
    /// The target volume is below the minimum free-space threshold.
    InsufficientDiskSpace {
        /// Space available on the target volume, in MiB.
        available_mb: u64,
        /// Space the check requires, in MiB.
        required_mb: u64,
    },
    /// An otherwise-untyped failure carried as a `miette` report.
    Report(miette::Report),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::InvalidTimeFormat(input) => {
                write!(f, "Invalid time format: '{input}'")
            }
            Error::NoSourceId(url) => {
                write!(f, "Could not derive a source id from URL: '{url}'")
            }
            Error::MissingStream(kind) => {
                write!(f, "Missing {kind} stream")
            }
            Error::UnavailableStream => {
                write!(f, "The requested stream is unavailable")
            }
            Error::MissingBinary(program) => {
                write!(f, "Required program not found: '{program}'")
            }
            Error::CommandFailed { program, stderr } => {
                write!(f, "Command '{program}' failed: {}", stderr.trim())
            }
            Error::InsufficientDiskSpace {
                available_mb,
                required_mb,
            } => {
                write!(
                    f,
                    "Insufficient disk space: {available_mb} MB available, {required_mb} MB required"
                )
            }
            Error::Report(report) => fmt::Display::fmt(report, f),
        }
    }
}

impl std::error::Error for Error {}

impl miette::Diagnostic for Error {}

impl From<miette::Report> for Error {
    fn from(report: miette::Report) -> Self {
        Error::Report(report)
    }
}
