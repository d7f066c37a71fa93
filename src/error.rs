//! Error types shared by every texture-producing call

use crate::config::ConfigError;

/// Misuse of the API. Always fatal to the current call, never retried.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UsageError {
    #[error("loader destroyed")]
    Destroyed,

    #[error("slice {slice} of mip level {level} is already set")]
    SliceAlreadySet { level: u32, slice: u32 },

    #[error("slice {slice} of mip level {level} was never set")]
    MissingSlice { level: u32, slice: u32 },

    #[error("slice {slice} of mip level {level} ends at byte {end}, past the {len}-byte buffer")]
    SliceOutOfBounds {
        level: u32,
        slice: u32,
        end: usize,
        len: usize,
    },

    #[error("no loader registered for MIME type '{mime}' and no wildcard loader")]
    NoLoader { mime: String },
}

/// A worker response that cannot be matched to its request.
///
/// Only ever logged; the response is dropped and the pool keeps running.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("response for unknown correlation id {0}")]
    UnknownCorrelationId(u64),
}

/// GPU resource creation or queue submission failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DeviceError {
    #[error("no GPU adapter available: {0}")]
    NoAdapter(String),

    #[error("failed to create device: {0}")]
    RequestDevice(String),

    #[error("{operation} failed: {message}")]
    Validation { operation: &'static str, message: String },

    #[error("format {0} has no native mapping on this device")]
    UnsupportedFormat(String),
}

/// Error returned by every public texture call
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    #[error(transparent)]
    Usage(#[from] UsageError),

    #[error("transcode failed: {0}")]
    Transcode(String),

    #[error(transparent)]
    Device(#[from] DeviceError),

    #[error("image decode failed: {0}")]
    Decode(String),

    #[error("failed to fetch {url}: {message}")]
    Fetch { url: String, message: String },

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TextureError {
    pub fn transcode(message: impl Into<String>) -> Self {
        TextureError::Transcode(message.into())
    }

    /// True when the error came from operating on a destroyed client or pool.
    pub fn is_destroyed(&self) -> bool {
        matches!(self, TextureError::Usage(UsageError::Destroyed))
    }
}

impl From<image::ImageError> for TextureError {
    fn from(err: image::ImageError) -> Self {
        TextureError::Decode(err.to_string())
    }
}
