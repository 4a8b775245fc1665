use ampapi::AmpError;
use hlspick::PickError;
use wrapper::WrapperError;

pub type Result<T> = std::result::Result<T, Error>;

/// Application error. The retry/abort policy branches on these variants:
/// transient wrapper failures retry once after a readiness ping,
/// connection-refused failures set the abort-retries flag, and everything
/// else is reported and counted.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("configuration error: {reason}")]
    Config { reason: String },

    #[error("catalog request failed: {source}")]
    RemoteFailure {
        #[from]
        source: AmpError,
    },

    #[error("no codec found")]
    NoCodec,

    #[error("bad manifest: {reason}")]
    ManifestBad { reason: String },

    #[error("web playlist only carries the prefetch key")]
    PrefetchKeyOnly,

    #[error("wrapper failed (transient): {source}")]
    WrapperTransient { source: WrapperError },

    #[error("wrapper failed: {source}")]
    WrapperFatal { source: WrapperError },

    #[error("required tool `{name}` not found on PATH")]
    ToolMissing { name: String },

    #[error("unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("{message}")]
    InvalidSelection { message: String },

    #[error("unrecognized URL `{input}`")]
    InvalidUrl { input: String },

    #[error("failed to write tags: {reason}")]
    TagWriteFailed { reason: String },

    #[error("transcode failed: {reason}")]
    TranscodeFailed { reason: String },

    #[error("I/O error: {source}")]
    Io {
        #[from]
        source: std::io::Error,
    },
}

impl Error {
    pub fn config(reason: impl Into<String>) -> Self {
        Self::Config {
            reason: reason.into(),
        }
    }

    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    pub fn selection(message: impl Into<String>) -> Self {
        Self::InvalidSelection {
            message: message.into(),
        }
    }

    pub fn tag_write(reason: impl Into<String>) -> Self {
        Self::TagWriteFailed {
            reason: reason.into(),
        }
    }

    pub fn transcode(reason: impl Into<String>) -> Self {
        Self::TranscodeFailed {
            reason: reason.into(),
        }
    }

    /// Connection refused anywhere (catalog, wrapper) suppresses the
    /// interactive end-of-queue retry loop.
    pub fn is_connection_refused(&self) -> bool {
        match self {
            Self::RemoteFailure { source } => source.is_connection_refused(),
            Self::WrapperTransient { source } | Self::WrapperFatal { source } => {
                source.is_connection_refused()
            }
            Self::Io { source } => source.kind() == std::io::ErrorKind::ConnectionRefused,
            _ => false,
        }
    }
}

impl From<PickError> for Error {
    fn from(err: PickError) -> Self {
        match err {
            PickError::NoCodec => Self::NoCodec,
            other => Self::ManifestBad {
                reason: other.to_string(),
            },
        }
    }
}

impl From<WrapperError> for Error {
    fn from(err: WrapperError) -> Self {
        if err.is_transient() {
            Self::WrapperTransient { source: err }
        } else {
            Self::WrapperFatal { source: err }
        }
    }
}
