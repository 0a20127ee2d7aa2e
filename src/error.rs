use tokio::sync::mpsc::error::SendError;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Malformed frame: {0}")]
    BadFormat(String),

    #[error("Checksum mismatch: frame carries {expected:#010x}, body hashes to {actual:#010x}")]
    IntegrityViolation { expected: u32, actual: u32 },

    #[error("Frame body of {size} bytes exceeds the limit of {max} bytes")]
    FrameTooLarge { size: usize, max: usize },

    #[error("The channel is closed")]
    ChannelClosed,

    #[error("The channel has already been started")]
    ChannelAlreadyStarted,

    #[error("Channel task join error: {0}")]
    TaskJoin(#[from] tokio::task::JoinError),

    #[error("Compressor failure: {0}")]
    Compression(#[source] std::io::Error),

    #[error("Invalid configuration value for '{key}': {reason}")]
    Config { key: String, reason: String },

    #[error("Couldn't parse configuration sheet: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO Error: {0}")]
    IOError(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn bad_format(reason: impl Into<String>) -> Self {
        Error::BadFormat(reason.into())
    }

    /// Whether this error must tear down the channel that produced it.
    pub fn is_fatal_to_channel(&self) -> bool {
        matches!(
            self,
            Error::BadFormat(_)
                | Error::IntegrityViolation { .. }
                | Error::FrameTooLarge { .. }
                | Error::Compression(_)
                | Error::ChannelClosed
                | Error::IOError(_)
        )
    }
}

impl<T> From<SendError<T>> for Error {
    fn from(_: SendError<T>) -> Self {
        Error::ChannelClosed
    }
}
