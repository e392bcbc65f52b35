use std::io;
use std::sync::Arc;

use thiserror::Error;

/// The errors that can occur while splitting a STEP file.
///
/// Only whole-pipeline failures are represented here. Per-entity parse
/// failures, dangling references, and name-resolution misses are recovered
/// from internally and never surface as an `Error`.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// The input file could not be opened or read.
    #[error("failed to read input file {1}: {0}")]
    InputRead(#[source] Arc<io::Error>, String),

    /// No `DATA;...ENDSEC;` section could be located in the input.
    #[error("Invalid STEP file: {0}")]
    MalformedStepFile(String),

    /// The output directory could not be created, or an output file could
    /// not be written.
    #[error("failed to write output {1}: {0}")]
    OutputWrite(#[source] Arc<io::Error>, String),

    /// An internal invariant was violated. Not expected to trigger on valid
    /// input; kept as a named variant instead of `unwrap`/`panic` so
    /// callers can report it like any other fatal error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// The result type used throughout this crate.
pub type Result<T> = std::result::Result<T, Error>;
