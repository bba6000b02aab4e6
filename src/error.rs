use thiserror::Error;

/// Machine-checkable error taxonomy for the optimization core.
///
/// Every variant carries the data needed to render both a machine code
/// (via `code()`) and a human message (via `Display`). No exception ever
/// escapes an engine operation boundary; callers match on this enum.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unknown algorithm: {0}")]
    InvalidAlgorithm(String),

    #[error("algorithm {algorithm} cannot run against a {dimension} job")]
    AlgorithmMismatch { algorithm: String, dimension: String },

    #[error("{field} out of range: {value}")]
    InvalidRange { field: String, value: String },

    #[error("scenario {0} not found")]
    ScenarioNotFound(uuid::Uuid),

    #[error("plan {0} not found")]
    PlanNotFound(uuid::Uuid),

    #[error("cutting job {0} not found")]
    JobNotFound(uuid::Uuid),

    #[error("no stock available for the requested material/thickness")]
    NoStock,

    #[error("invalid status transition for {entity} {id}: {from} -> {to}")]
    InvalidStatusTransition {
        entity: &'static str,
        id: uuid::Uuid,
        from: String,
        to: String,
    },

    #[error("invalid status for {entity} {id}: expected one of {expected}, got {actual}")]
    InvalidStatus {
        entity: &'static str,
        id: uuid::Uuid,
        expected: String,
        actual: String,
    },

    #[error("optimization failed: {0}")]
    OptimizationFailed(String),

    #[error("cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("algorithm not found in registry: {0}")]
    AlgorithmNotFound(String),

    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl EngineError {
    /// Stable machine code, matching the taxonomy in the platform's error contract.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "VALIDATION_ERROR",
            EngineError::InvalidAlgorithm(_) => "INVALID_ALGORITHM",
            EngineError::AlgorithmMismatch { .. } => "ALGORITHM_MISMATCH",
            EngineError::InvalidRange { .. } => "INVALID_RANGE",
            EngineError::ScenarioNotFound(_) => "SCENARIO_NOT_FOUND",
            EngineError::PlanNotFound(_) => "PLAN_NOT_FOUND",
            EngineError::JobNotFound(_) => "JOB_NOT_FOUND",
            EngineError::NoStock => "NO_STOCK",
            EngineError::InvalidStatusTransition { .. } => "INVALID_STATUS_TRANSITION",
            EngineError::InvalidStatus { .. } => "INVALID_STATUS",
            EngineError::OptimizationFailed(_) => "OPTIMIZATION_FAILED",
            EngineError::Cancelled => "CANCELLED",
            EngineError::Timeout(_) => "TIMEOUT",
            EngineError::AlgorithmNotFound(_) => "ALGORITHM_NOT_FOUND",
            EngineError::UpstreamUnavailable(_) => "UPSTREAM_UNAVAILABLE",
            EngineError::Conflict(_) => "CONFLICT",
            EngineError::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// True for errors that are never recovered by a fallback and must be
    /// surfaced to the caller unchanged (state-machine violations, validation).
    pub fn is_terminal_for_caller(&self) -> bool {
        matches!(
            self,
            EngineError::InvalidStatusTransition { .. } | EngineError::InvalidStatus { .. }
        )
    }
}
