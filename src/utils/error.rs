use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum PlannerError {
    #[error("Invalid optimization query: {message}")]
    InvalidQuery { message: String },

    #[error("Invalid optimization request event: {message}")]
    InvalidEvent { message: String },

    #[error("Invalid project: {message}")]
    InvalidProject { message: String },

    #[error("Cannot save {actual} projects at a time (limit {limit})")]
    TooManyProjects { limit: usize, actual: usize },

    #[error("Project not found for ID: {id}")]
    NotFound { id: Uuid },

    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    #[error("Circuit breaker for {resource} is open; call not permitted")]
    CircuitOpen { resource: String },

    #[error("Message broker unavailable: {message}")]
    BrokerUnavailable { message: String },

    #[error("No projects available for capital maximization")]
    CatalogEmpty,

    #[error("Optimistic lock conflict on project {id}: expected version {expected:?}, found {actual:?}")]
    OptimisticLock {
        id: Uuid,
        expected: Option<u64>,
        actual: Option<u64>,
    },

    #[error("Cache operation failed: {message}")]
    CacheError { message: String },

    #[error("Catalog store operation failed: {message}")]
    StoreError { message: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Invalid configuration value for '{field}': {value} ({reason})")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Failure classes used by the retry and alerting policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    NotFound,
    Transient,
    Structural,
    Fatal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl PlannerError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            PlannerError::InvalidQuery { .. }
            | PlannerError::InvalidEvent { .. }
            | PlannerError::InvalidProject { .. }
            | PlannerError::TooManyProjects { .. }
            | PlannerError::OptimisticLock { .. }
            | PlannerError::SerializationError(_)
            | PlannerError::CsvError(_)
            | PlannerError::ConfigError { .. }
            | PlannerError::InvalidConfigValueError { .. } => ErrorCategory::Validation,
            PlannerError::NotFound { .. } => ErrorCategory::NotFound,
            PlannerError::Timeout { .. }
            | PlannerError::CircuitOpen { .. }
            | PlannerError::BrokerUnavailable { .. }
            | PlannerError::CacheError { .. }
            | PlannerError::StoreError { .. } => ErrorCategory::Transient,
            PlannerError::CatalogEmpty => ErrorCategory::Structural,
            PlannerError::IoError(_) | PlannerError::Internal { .. } => ErrorCategory::Fatal,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self.category() {
            ErrorCategory::NotFound => ErrorSeverity::Low,
            ErrorCategory::Transient => ErrorSeverity::Medium,
            ErrorCategory::Validation | ErrorCategory::Structural => ErrorSeverity::High,
            ErrorCategory::Fatal => ErrorSeverity::Critical,
        }
    }

    /// Whether the consumer retry loop may attempt the operation again.
    /// Structural failures are retried unless the retry policy says otherwise.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.category(),
            ErrorCategory::Transient | ErrorCategory::Structural | ErrorCategory::Fatal
        )
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self {
            PlannerError::InvalidQuery { .. } | PlannerError::InvalidEvent { .. } => {
                "Check that maxSelections is positive and initialCapital is non-negative"
            }
            PlannerError::InvalidProject { .. } | PlannerError::TooManyProjects { .. } => {
                "Fix the project data (non-blank name, non-negative amounts) and resubmit in smaller batches"
            }
            PlannerError::NotFound { .. } => "Verify the project identifier exists in the catalog",
            PlannerError::Timeout { .. } | PlannerError::StoreError { .. } => {
                "Check catalog store latency and availability"
            }
            PlannerError::CircuitOpen { .. } => {
                "The catalog store is failing repeatedly; wait for the cool-down and inspect the store"
            }
            PlannerError::BrokerUnavailable { .. } => "Check message broker connectivity",
            PlannerError::CatalogEmpty => "Seed the project catalog before requesting optimizations",
            PlannerError::OptimisticLock { .. } => "Reload the project and retry the update",
            PlannerError::CacheError { .. } => "Check cache availability; reads fall back to the store",
            PlannerError::SerializationError(_) | PlannerError::CsvError(_) => {
                "Check the payload or input file format"
            }
            PlannerError::IoError(_) => "Check file paths and permissions",
            PlannerError::ConfigError { .. } | PlannerError::InvalidConfigValueError { .. } => {
                "Fix the configuration file and restart"
            }
            PlannerError::Internal { .. } => "Inspect the logs for the underlying failure",
        }
    }
}

pub type Result<T> = std::result::Result<T, PlannerError>;
