//! Error types for the image creator protocol client.

use std::time::Duration;

/// All errors that can occur while talking to the image creator endpoint.
#[derive(thiserror::Error, Debug)]
pub enum CreatorError {
    /// Submission or polling returned something other than 200.
    #[error("Bing Image Creator Error: response status = {status}")]
    HttpStatus { status: u16 },

    /// The endpoint answered with its error container instead of a polling URL.
    /// The message is the remote text, untouched.
    #[error("Bing Image Creator Error: {message}")]
    Remote { message: String },

    /// A 200 response carried neither a polling URL nor an error container.
    #[error("Bing Image Creator Error: response contained no polling url")]
    MissingPollingUrl,

    /// The progress callback asked to stop.
    #[error("Bing Image Creator Error: cancelled")]
    Cancelled,

    /// Polling exceeded the caller's wall-clock budget.
    #[error("Bing Image Creator Error: polling timed out after {}s", waited.as_secs())]
    Timeout { waited: Duration },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Render error: {0}")]
    Render(String),

    #[error("Invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CreatorError {
    /// True when the failure was requested by the caller rather than caused
    /// by the endpoint, so front ends can stay quiet about it.
    pub fn is_cancelled(&self) -> bool {
        matches!(self, CreatorError::Cancelled)
    }
}

impl From<reqwest::Error> for CreatorError {
    fn from(e: reqwest::Error) -> Self {
        CreatorError::Transport(e.to_string())
    }
}

/// Convenience result type.
pub type CreatorResult<T> = Result<T, CreatorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_message_matches_endpoint_wording() {
        let err = CreatorError::HttpStatus { status: 500 };
        assert_eq!(
            err.to_string(),
            "Bing Image Creator Error: response status = 500"
        );
    }

    #[test]
    fn test_only_cancelled_is_cancelled() {
        assert!(CreatorError::Cancelled.is_cancelled());
        assert!(!CreatorError::MissingPollingUrl.is_cancelled());
        assert!(!CreatorError::Timeout {
            waited: Duration::from_secs(3)
        }
        .is_cancelled());
    }
}
