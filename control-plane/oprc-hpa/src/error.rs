use thiserror::Error;

/// Failure to derive an external metric name for a container.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NamingError {
    #[error("metric prefix annotation {annotation} is missing")]
    MissingPrefix { annotation: &'static str },

    #[error("resource {0} has no external metric naming scheme")]
    UnsupportedResource(String),
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("write conflict: {0}")]
    Conflict(String),

    #[error("kube api error: {0}")]
    Kube(#[from] kube::Error),
}

impl StoreError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

#[derive(Error, Debug)]
pub enum HpaError {
    #[error("naming error: {0}")]
    Naming(#[from] NamingError),

    #[error("no {bound} recommendation slot for {weekday} {hour:02}:00")]
    RecommendationGap {
        bound: &'static str,
        weekday: chrono::Weekday,
        hour: u32,
    },

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("workload autoscaler is missing {0}")]
    MissingWorkloadField(&'static str),
}

impl HpaError {
    /// Only optimistic-concurrency failures are worth an immediate retry
    /// from a fresh read.
    pub fn is_retryable(&self) -> bool {
        matches!(self, HpaError::Store(e) if e.is_conflict())
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("replica reduction factor must be in (0, 1], got {0}")]
    ReductionFactor(f64),

    #[error("{field} must be within 1..=100, got {value}")]
    TargetPercent { field: &'static str, value: i32 },

    #[error("update retries must be at most {max}, got {value}")]
    UpdateMaxRetries { value: usize, max: usize },
}
