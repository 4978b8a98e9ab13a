use thiserror::Error;

/// Engine-level error taxonomy.
///
/// `ControlNotFound` is the only kind the engine recovers from silently (the
/// owning stage is skipped). Everything else is converted into a structured
/// [`EstimateResult`](crate::types::EstimateResult) at the public boundary;
/// no error leaves `run_estimate` as a raised fault.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Invalid request: {0}")]
    Validation(String),

    #[error("Option not found in {control}: {wanted}")]
    ControlNotFound { control: String, wanted: String },

    #[error("Commit failed for instance {index}: {reason}")]
    CommitFailed { index: usize, reason: String },

    #[error("Extraction failed at {stage}: {reason}")]
    ExtractionFailed { stage: String, reason: String },

    #[error("Browser resource failure: {0}")]
    Resource(String),

    #[error("Timed out after {elapsed_ms}ms waiting for {waiting_for}")]
    Timeout { waiting_for: String, elapsed_ms: u64 },

    #[error("Driver fault: {0}")]
    Driver(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, EngineError>;

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Driver(err.to_string())
    }
}

impl EngineError {
    /// Stable machine-readable code carried in `EstimateResult.failed_stage`.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::ControlNotFound { .. } => "control_not_found",
            EngineError::CommitFailed { .. } => "commit_failed",
            EngineError::ExtractionFailed { .. } => "extraction_failed",
            EngineError::Resource(_) => "resource_error",
            EngineError::Timeout { .. } => "timeout",
            EngineError::Driver(_) => "driver_fault",
            EngineError::Serialization(_) => "serialization_error",
            EngineError::Io(_) => "io_error",
        }
    }
}
