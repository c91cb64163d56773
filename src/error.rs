use thiserror::Error;

/// Failures of the media resolution and selection path.
#[derive(Debug, Error)]
pub enum GrabError {
    #[error("failed to fetch manifest: {0}")]
    ManifestFetch(String),

    #[error("failed to parse manifest: {0}")]
    ManifestParse(String),

    #[error("failed to fetch post: {0}")]
    PostFetch(String),

    #[error("selection token is expired or unknown")]
    CacheExpired,

    #[error("malformed callback payload: {0}")]
    CallbackMalformed(String),

    #[error("cached selection has no link for key {key:?}")]
    InconsistentCacheEntry { key: Option<String> },

    #[error("unknown media kind: {0}")]
    UnknownMediaKind(String),

    #[error("upload failed: {0:#}")]
    Upload(#[source] anyhow::Error),
}

/// What the chat user is told when a request fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// The token can no longer be resolved; sending the link again fixes it.
    ResendLink,
    /// Something upstream failed; no detail is shown.
    Generic,
    /// Our own invariants were violated.
    Internal,
    BrokenCallback,
}

impl GrabError {
    pub fn notice(&self) -> Notice {
        match self {
            GrabError::ManifestFetch(_)
            | GrabError::ManifestParse(_)
            | GrabError::PostFetch(_)
            | GrabError::Upload(_) => Notice::Generic,
            GrabError::CacheExpired => Notice::ResendLink,
            GrabError::CallbackMalformed(_) => Notice::BrokenCallback,
            GrabError::InconsistentCacheEntry { .. } | GrabError::UnknownMediaKind(_) => {
                Notice::Internal
            }
        }
    }

    /// Internal errors are bugs on our side and get logged louder.
    pub fn is_internal(&self) -> bool {
        self.notice() == Notice::Internal
    }
}
