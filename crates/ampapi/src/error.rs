use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum AmpError {
    #[error("request failed with HTTP {status} during {operation}")]
    Status {
        status: StatusCode,
        operation: &'static str,
    },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("invalid URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("catalog returned no data for {entity} {id}")]
    Empty {
        entity: &'static str,
        id: String,
    },

    #[error("no developer token found in the web bundle")]
    TokenNotFound,

    #[error("webplayback returned no playable asset for {id}")]
    NoAsset { id: String },
}

impl AmpError {
    pub fn status(status: StatusCode, operation: &'static str) -> Self {
        Self::Status { status, operation }
    }

    pub fn empty(entity: &'static str, id: impl Into<String>) -> Self {
        Self::Empty {
            entity,
            id: id.into(),
        }
    }

    /// True when the failure is a refused TCP connection. The queue runner
    /// uses this to suppress the interactive retry loop.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            Self::Network { source } => source
                .to_string()
                .to_lowercase()
                .contains("connection refused"),
            _ => false,
        }
    }
}
