/// Central error type for the mirror engine.
#[derive(Debug, thiserror::Error)]
pub enum GitmirError {
    #[error("mirror not found: {id}")]
    MirrorNotFound { id: String },

    #[error("mirror already exists: {owner}/{name}")]
    MirrorAlreadyExists { owner: String, name: String },

    #[error("attempt not found: {id}")]
    AttemptNotFound { id: String },

    #[error("git error: {message}")]
    GitError { message: String },

    #[error("git command timed out after {secs}s")]
    GitTimeout { secs: u64 },

    #[error("gitea API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("gitea authentication failed: {message}")]
    Unauthorized { message: String },

    #[error("gitea permission denied: {message}")]
    Forbidden { message: String },

    #[error("gitea resource not found: {message}")]
    NotFound { message: String },

    #[error("rate limited — retry after {retry_after_secs}s")]
    RateLimited { retry_after_secs: u64 },

    #[error("lease held by another worker for mirror {mirror_id}")]
    LeaseHeld { mirror_id: String },

    #[error("config error: {message}")]
    Config { message: String },

    #[error("database error: {0}")]
    Database(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("transport error: {message}")]
    Transport { message: String },

    #[error("{0}")]
    Other(String),
}

impl GitmirError {
    /// True if this error, when it surfaces from the Gitea client, should be
    /// treated as rate limiting by the failure classifier.
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, GitmirError::RateLimited { .. })
    }
}
