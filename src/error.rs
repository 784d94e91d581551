use thiserror::Error;

/// Error types for the aci-fit library.
#[derive(Error, Debug)]
pub enum FitError {
    /// The grouping field named in a batch request does not exist in the table.
    #[error("Invalid group key: field '{0}' not found in the dataset")]
    InvalidGroupKey(String),

    /// A group produced by the grouping partition contains no observations.
    #[error("Empty group: '{0}' contains no observations")]
    EmptyGroup(String),

    /// A named field lookup failed.
    #[error("Field not found: {0}")]
    FieldNotFound(String),

    /// The nonlinear solver exhausted its iterations without meeting tolerance.
    #[error("Fit failed to converge: {0}")]
    NonConvergence(String),

    /// The solver's Jacobian was rank-deficient and the damped system
    /// remained unsolvable.
    #[error("Singular system encountered: {0}")]
    SingularSystem(String),

    /// Fewer observations than the fit has degrees of freedom for.
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Mismatch in vector or matrix dimensions.
    #[error("Dimension mismatch: {0}")]
    DimensionMismatch(String),

    /// Invalid input data.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Error during computational operations.
    #[error("Computation error: {0}")]
    ComputationError(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl FitError {
    /// Whether this error is a per-curve numerical failure that the batch
    /// driver recovers from with the bilinear fallback, as opposed to a
    /// structural error that aborts the whole batch.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            FitError::NonConvergence(_)
                | FitError::SingularSystem(_)
                | FitError::InsufficientData(_)
        )
    }
}

/// Result type alias for aci-fit operations.
pub type Result<T> = std::result::Result<T, FitError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = FitError::InvalidGroupKey("leaf".to_string());
        assert!(format!("{}", err).contains("'leaf'"));

        let err = FitError::NonConvergence("exceeded max iterations".to_string());
        assert!(format!("{}", err).contains("exceeded max iterations"));
    }

    #[test]
    fn test_recoverable_classification() {
        assert!(FitError::NonConvergence("x".into()).is_recoverable());
        assert!(FitError::SingularSystem("x".into()).is_recoverable());
        assert!(FitError::InsufficientData("x".into()).is_recoverable());
        assert!(!FitError::InvalidGroupKey("x".into()).is_recoverable());
        assert!(!FitError::EmptyGroup("x".into()).is_recoverable());
        assert!(!FitError::FieldNotFound("x".into()).is_recoverable());
    }
}
