use thiserror::Error;

#[derive(Error, Debug)]
pub enum WorkerError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request to {url} failed with status {status}: {body}")]
    BadStatus { url: String, status: u16, body: String },

    #[error("Required asset could not be cached: {url}")]
    Install {
        url: String,
        #[source]
        source: Box<WorkerError>,
    },

    #[error("Storage error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Corrupt cache entry: {0}")]
    CorruptEntry(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid control message: {0}")]
    InvalidMessage(String),
}

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Maximum length for response bodies quoted in error messages
const MAX_ERROR_BODY_LENGTH: usize = 200;

impl WorkerError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &[u8]) -> String {
        let text = String::from_utf8_lossy(body);
        if text.len() <= MAX_ERROR_BODY_LENGTH {
            text.into_owned()
        } else {
            let cut: String = text.chars().take(MAX_ERROR_BODY_LENGTH).collect();
            format!("{}... (truncated, {} total bytes)", cut, body.len())
        }
    }

    pub fn from_status(url: &str, status: u16, body: &[u8]) -> Self {
        WorkerError::BadStatus {
            url: url.to_string(),
            status,
            body: Self::truncate_body(body),
        }
    }

    /// Whether the failure came from the network rather than local storage
    pub fn is_network(&self) -> bool {
        matches!(self, WorkerError::Network(_) | WorkerError::BadStatus { .. })
    }
}

impl From<reqwest::Error> for WorkerError {
    fn from(e: reqwest::Error) -> Self {
        WorkerError::Network(e.to_string())
    }
}
