//! Error types for mss-transmux.

use crate::descriptor::MediaType;
use thiserror::Error;

/// Result type for mss-transmux operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Stable error codes surfaced through the error sink.
///
/// Codes 200/201 match the error constants used by Smooth Streaming
/// players, so downstream retry logic can distinguish live-timeline
/// failures from generic container corruption.
pub mod codes {
    /// A live fragment is missing its tfrf live-timeline box.
    pub const MISSING_LIVE_TIMELINE_DATA: u32 = 200;
    /// The representation names a codec outside the supported allowlist.
    pub const UNSUPPORTED_CODEC: u32 = 201;
    /// The fragment buffer is corrupt or truncated.
    pub const MALFORMED_CONTAINER: u32 = 202;
    /// The processing call itself violated the caller contract.
    pub const INVALID_CALL_ARGUMENTS: u32 = 203;
}

/// Error type for mss-transmux operations.
#[derive(Debug, Error)]
pub enum Error {
    /// The fragment-processing call is missing its request or response.
    #[error("e parameter is missing or malformed")]
    InvalidCallArguments,

    /// Corrupt or truncated box structure. Fatal to the fragment, not the
    /// session.
    #[error("Malformed container: {0}")]
    MalformedContainer(String),

    /// A live media segment lacks the mandatory tfrf box.
    #[error("Missing tfrf in live media segment")]
    MissingLiveTimelineData,

    /// The codec identifier is not in the supported allowlist. Fatal to the
    /// representation until its descriptor changes.
    #[error("Unsupported codec")]
    UnsupportedCodec {
        codecs: String,
        media_type: MediaType,
    },
}

impl Error {
    /// Create a malformed container error.
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedContainer(msg.into())
    }

    /// Stable numeric code for the error-sink contract.
    pub fn code(&self) -> u32 {
        match self {
            Self::InvalidCallArguments => codes::INVALID_CALL_ARGUMENTS,
            Self::MalformedContainer(_) => codes::MALFORMED_CONTAINER,
            Self::MissingLiveTimelineData => codes::MISSING_LIVE_TIMELINE_DATA,
            Self::UnsupportedCodec { .. } => codes::UNSUPPORTED_CODEC,
        }
    }
}
