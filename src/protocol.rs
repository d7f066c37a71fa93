//! Messages exchanged between the pool and its transcoding workers
//!
//! Every message is self-contained. Buffers move by value, so the sender
//! gives up access to them once a message is sent.

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::data::TextureData;
use crate::error::TextureError;
use crate::format::TextureFormat;

/// Unique per pool, monotonically increasing from 1
pub type CorrelationId = u64;

/// Where the worker reads the encoded texture from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TranscodeSource {
    Url(String),
    Buffer(Vec<u8>),
}

impl TranscodeSource {
    /// Short description for logs
    pub fn describe(&self) -> String {
        match self {
            TranscodeSource::Url(url) => url.clone(),
            TranscodeSource::Buffer(bytes) => format!("<{} byte buffer>", bytes.len()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeRequest {
    pub id: CorrelationId,
    pub source: TranscodeSource,
    pub supported_formats: Vec<TextureFormat>,
    pub unpack_mipmaps: bool,
    /// File extension hint, without the dot
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extension: Option<String>,
}

/// Location of one (level, slice) inside the response buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MipLevelDescriptor {
    pub level: u32,
    #[serde(default)]
    pub slice: u32,
    pub byte_offset: usize,
    pub byte_length: usize,
    pub width: u32,
    pub height: u32,
}

/// Successful transcode payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodedTexture {
    pub format: TextureFormat,
    pub width: u32,
    pub height: u32,
    #[serde(default = "one")]
    pub depth: u32,
    #[serde(default)]
    pub cube: bool,
    pub buffer: Vec<u8>,
    pub levels: Vec<MipLevelDescriptor>,
}

fn one() -> u32 {
    1
}

impl TranscodedTexture {
    /// Build the [`TextureData`] this payload describes without copying the buffer.
    pub fn into_texture_data(self) -> Result<TextureData, TextureError> {
        let buffer = Bytes::from(self.buffer);
        let mut data = TextureData::new(self.format, self.width, self.height)
            .with_depth(self.depth)
            .with_cube(self.cube);

        for descriptor in &self.levels {
            let level = data.level_mut(descriptor.level);
            level.set_size(descriptor.width, descriptor.height);
            level.set_slice(
                descriptor.slice,
                &buffer,
                descriptor.byte_offset,
                descriptor.byte_length,
            )?;
        }

        Ok(data)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", untagged)]
pub enum TranscodeOutcome {
    Transcoded(TranscodedTexture),
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranscodeResponse {
    pub id: CorrelationId,
    #[serde(flatten)]
    pub outcome: TranscodeOutcome,
}

impl TranscodeResponse {
    pub fn transcoded(id: CorrelationId, texture: TranscodedTexture) -> Self {
        Self {
            id,
            outcome: TranscodeOutcome::Transcoded(texture),
        }
    }

    pub fn failed(id: CorrelationId, error: impl Into<String>) -> Self {
        Self {
            id,
            outcome: TranscodeOutcome::Failed {
                error: error.into(),
            },
        }
    }
}
