use confluence_core::{Timeframe, error::ProviderError};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// All errors generated in `confluence-data`.
#[derive(Debug, Clone, Eq, PartialEq, Hash, Deserialize, Serialize, Error)]
pub enum VenueError {
    #[error("HTTP error: {0}")]
    Http(String),

    #[error("venue responded with status {status}: {message}")]
    Status { status: u16, message: String },

    #[error("failed to parse venue response: {0}")]
    Parse(String),

    #[error("SocketError: {0}")]
    Socket(String),

    #[error("{0} venue not yet implemented")]
    NotSupported(String),

    #[error("unsupported venue: {0}")]
    UnknownVenue(String),

    #[error("venue credentials are missing")]
    MissingCredentials,
}

impl VenueError {
    /// Determine if retrying the same request could succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            VenueError::Http(_) | VenueError::Socket(_) => true,
            VenueError::Status { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }

    /// Convert into the [`ProviderError`] reported for a failed candle fetch.
    pub fn into_provider_error(self, timeframe: Timeframe) -> ProviderError {
        ProviderError::Unavailable {
            timeframe,
            reason: self.to_string(),
        }
    }
}

impl From<reqwest::Error> for VenueError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            Self::Parse(value.to_string())
        } else {
            Self::Http(value.to_string())
        }
    }
}

impl From<serde_json::Error> for VenueError {
    fn from(value: serde_json::Error) -> Self {
        Self::Parse(value.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for VenueError {
    fn from(value: tokio_tungstenite::tungstenite::Error) -> Self {
        Self::Socket(value.to_string())
    }
}
