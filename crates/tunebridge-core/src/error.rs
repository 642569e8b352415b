use thiserror::Error;

#[derive(Debug, Error)]
pub enum TuneError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("upstream error: {0}")]
    Upstream(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("already following playlist {entity_id}")]
    AlreadyFollowing { entity_id: String },
    #[error("too many subscribers: {count} (max {max})")]
    TooManySubscribers { count: usize, max: usize },
    #[error("unsupported platform: {0}")]
    UnsupportedPlatform(String),
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("operation cancelled")]
    Cancelled,
}

impl TuneError {
    /// Retried on the next sync pass instead of backing the follow off.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Cancelled)
    }
}

impl From<serde_json::Error> for TuneError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type TuneResult<T> = Result<T, TuneError>;
