//! Error types for pepcert.

use thiserror::Error;

/// Error type for pepcert operations.
#[derive(Debug, Error)]
pub enum PepError {
    /// An object created under another problem (or before a counter reset) was registered.
    #[error("Object belongs to a different problem: {0}")]
    ScopeMismatch(String),

    /// Unsupported relation operator or relation tag.
    #[error("Invalid relation: {0}")]
    InvalidRelation(String),

    /// Invalid function-class parameter or setting.
    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    /// The requested SDP backend is not compiled into this build.
    #[error("Solver unavailable: {0}")]
    SolverUnavailable(String),

    /// Invalid problem specification or lifecycle misuse.
    #[error("Invalid problem: {0}")]
    InvalidProblem(String),

    /// `solve()` was called on a problem that has already been solved.
    #[error("Problem has already been solved")]
    AlreadySolved,

    /// Backend setup failure.
    #[error("Solver error: {0}")]
    SolverError(String),

    /// Numerical error.
    #[error("Numerical error: {0}")]
    NumericalError(String),
}

/// Result type for pepcert operations.
pub type Result<T> = std::result::Result<T, PepError>;
