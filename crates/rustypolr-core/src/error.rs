// =============================================================================
// Error Types
// =============================================================================
//
// Every fallible operation in the library returns `Result<T>`, which is
// `std::result::Result<T, PolrError>`. Validation happens up front, before any
// work is handed to the sampling engine, so most errors describe a bad input
// rather than a numerical failure.
//
// =============================================================================

use thiserror::Error;

/// Errors raised while preparing, dispatching or recovering an ordinal fit.
#[derive(Debug, Error)]
pub enum PolrError {
    /// Array shapes disagree (e.g. X has 10 rows but y has 9 entries).
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// A required input has no elements.
    #[error("Empty input: {0}")]
    EmptyInput(String),

    /// An argument is outside its valid range.
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// The response is not a usable ordered factor.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    /// Prior settings cannot be translated for the engine.
    #[error("Invalid prior: {0}")]
    InvalidPrior(String),

    /// The combination of options does not describe a supported model.
    #[error("Incompatible model: {0}")]
    IncompatibleModel(String),

    /// QR decomposition or triangular inversion failed.
    #[error("Linear algebra error: {0}")]
    LinearAlgebraError(String),

    /// The model formula could not be parsed or resolved against the data.
    #[error("Formula error: {0}")]
    Formula(String),

    /// The sampling engine failed or returned unusable draws.
    #[error("Backend error: {0}")]
    Backend(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Csv(#[from] csv::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, PolrError>;
