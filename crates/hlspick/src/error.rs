use reqwest::StatusCode;

#[derive(Debug, thiserror::Error)]
pub enum PickError {
    #[error("no codec found")]
    NoCodec,

    #[error("m3u8 not of master type")]
    NotMaster,

    #[error("m3u8 not of media type")]
    NotMedia,

    #[error("failed to parse playlist: {reason}")]
    Parse { reason: String },

    #[error("invalid playlist URL `{input}`: {reason}")]
    InvalidUrl { input: String, reason: String },

    #[error("request failed with HTTP {status} fetching playlist")]
    Status { status: StatusCode },

    #[error("HTTP request failed: {source}")]
    Network {
        #[from]
        source: reqwest::Error,
    },

    #[error("malformed audio descriptor `{descriptor}`")]
    BadAudioDescriptor { descriptor: String },

    #[error("no suitable video stream found")]
    NoVideoStream,

    #[error("no suitable audio stream found")]
    NoAudioStream,
}

impl PickError {
    pub fn parse(reason: impl Into<String>) -> Self {
        Self::Parse {
            reason: reason.into(),
        }
    }

    pub fn invalid_url(input: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidUrl {
            input: input.into(),
            reason: reason.into(),
        }
    }
}
