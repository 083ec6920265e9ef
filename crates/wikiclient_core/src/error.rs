use thiserror::Error;

pub type Result<T> = std::result::Result<T, WikiError>;

/// Every failure the client surfaces to callers.
///
/// Server-reported failures keep the original `code`/`info` pair so callers
/// can log or match on them without re-parsing the response body.
#[derive(Debug, Error)]
pub enum WikiError {
    #[error("API query could not be completed: {reason}")]
    Transport { reason: String, status: Option<u16> },

    #[error("API response could not be decoded: {0}")]
    Decode(String),

    #[error("maxlag retries exhausted after {attempts} attempts")]
    RateLimitExhausted { attempts: usize },

    #[error("MediaWiki API error [{code}]: {info}")]
    Api { code: String, info: String },

    #[error("API returned warnings: {0}")]
    ApiWarnings(String),

    #[error("login failed ({result}): {reason}")]
    Login { result: String, reason: String },

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("edit conflict [{code}]: {info}")]
    EditConflict { code: String, info: String },

    #[error("content too large: {0}")]
    ContentTooLarge(String),

    #[error("spam filter rejected the edit: {0}")]
    SpamRejected(String),

    #[error("abuse filter rejected the edit: {0}")]
    FilterRejected(String),

    #[error("page already exists: {0}")]
    PageExists(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("invalid option: {0}")]
    InvalidOption(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl WikiError {
    pub fn api(code: impl Into<String>, info: impl Into<String>) -> Self {
        Self::Api {
            code: code.into(),
            info: info.into(),
        }
    }

    /// Server error code for `Api` and `EditConflict`, `None` otherwise.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } | Self::EditConflict { code, .. } => Some(code),
            _ => None,
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::EditConflict { .. })
    }
}

impl From<serde_json::Error> for WikiError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}
