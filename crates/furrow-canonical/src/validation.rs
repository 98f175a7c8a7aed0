use thiserror::Error;

/// Validation errors for canonical primitives.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// The value does not match the identifier pattern.
    #[error("{field} ('{value}') is not allowed")]
    PatternMismatch {
        /// Identifier or field name.
        field: &'static str,
        /// Offending value.
        value: String,
    },
    /// A numeric value is negative, NaN or infinite.
    #[error("{field} ({value}) is out of bounds")]
    OutOfBounds {
        /// Field name.
        field: &'static str,
        /// Offending value, rendered.
        value: String,
    },
    /// A required text field is empty.
    #[error("{field} must not be empty")]
    Empty {
        /// Field name.
        field: &'static str,
    },
}
