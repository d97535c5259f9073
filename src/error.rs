use thiserror::Error;

/// Outcome of a failed handshake.
///
/// Cloneable so that a single handshake result can be handed to every caller
/// waiting on it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("Failed to get auth challenge from router")]
    MissingChallenge,

    #[error("Authentication failed (HTTP {status}). Check credentials.")]
    Rejected { status: u16 },

    #[error("Authentication request timed out")]
    Timeout,

    #[error("Authentication request failed: {0}")]
    Transport(String),
}

impl AuthError {
    pub(crate) fn transport(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout
        } else {
            Self::Transport(err.to_string())
        }
    }
}

#[derive(Debug, Error)]
pub enum RciError {
    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error("RCI request {path} timed out")]
    Timeout { path: String },

    #[error("RCI request {path} failed: {source}")]
    Transport {
        path: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("RCI request {path} failed (HTTP {status}): {body}")]
    Status {
        path: String,
        status: u16,
        body: String,
    },

    #[error("RCI response for {path} is not valid: {source}")]
    Decode {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

impl RciError {
    pub(crate) fn transport(path: &str, source: reqwest::Error) -> Self {
        if source.is_timeout() {
            Self::Timeout {
                path: path.to_string(),
            }
        } else {
            Self::Transport {
                path: path.to_string(),
                source,
            }
        }
    }
}

pub type Result<T> = std::result::Result<T, RciError>;
