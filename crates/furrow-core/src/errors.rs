use thiserror::Error;

/// Any failure raised by the core, for callers that handle them uniformly.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Trace query failed.
    #[error("traceback failed: {0}")]
    Trace(#[from] crate::traceback::TraceError),
    /// Mass-balance input rejected.
    #[error("mass balance rejected: {0}")]
    MassBalance(#[from] crate::mass_balance::MassBalanceError),
    /// Audit chain operation failed.
    #[error("audit chain: {0}")]
    Audit(#[from] crate::audit::AuditError),
    /// Recording or annotation failed.
    #[error("record failed: {0}")]
    Record(#[from] crate::recorder::RecordError),
    /// Conversion table could not be loaded.
    #[error("conversion table: {0}")]
    ConversionTable(#[from] crate::conversion::ConversionTableError),
    /// Event store backend failed.
    #[error(transparent)]
    Query(#[from] crate::query::BackendError),
}

impl CoreError {
    /// Stable machine-readable kind, used in JSON error output.
    pub fn kind(&self) -> &'static str {
        use crate::traceback::TraceError;
        match self {
            CoreError::Trace(TraceError::NotFound(_)) => "not_found",
            CoreError::Trace(TraceError::InvalidInput(_)) | CoreError::MassBalance(_) => "invalid_input",
            CoreError::Trace(TraceError::Timeout(_)) => "timeout",
            CoreError::Trace(_) | CoreError::Query(_) => "query",
            CoreError::Audit(crate::audit::AuditError::ChainIntegrityViolation { .. }) => {
                "chain_integrity_violation"
            }
            CoreError::Audit(_) => "audit",
            CoreError::Record(_) => "record",
            CoreError::ConversionTable(_) => "configuration",
        }
    }
}
