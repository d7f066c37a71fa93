//! Codec traits run inside transcoding workers

use crate::format::TextureFormat;
use crate::protocol::TranscodedTexture;

/// Fully read transcode input handed to a [`Transcoder`]
#[derive(Debug, Clone, Copy)]
pub struct TranscodeInput<'a> {
    pub bytes: &'a [u8],
    pub supported_formats: &'a [TextureFormat],
    pub unpack_mipmaps: bool,
    pub extension: Option<&'a str>,
}

/// Converts an encoded container into GPU-ready levels.
///
/// One instance lives on each worker thread and is reused for every request
/// that worker handles.
pub trait Transcoder: Send {
    fn transcode(&self, input: TranscodeInput<'_>) -> Result<TranscodedTexture, String>;
}

/// Creates the per-worker [`Transcoder`] on first use
pub trait TranscoderFactory: Send + Sync + 'static {
    fn create(&self) -> Result<Box<dyn Transcoder>, String>;
}

impl<F> TranscoderFactory for F
where
    F: Fn() -> Result<Box<dyn Transcoder>, String> + Send + Sync + 'static,
{
    fn create(&self) -> Result<Box<dyn Transcoder>, String> {
        self()
    }
}

/// Which supercompressed payload a [`SupercompressedCodec`] is asked to decode
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupercompressedContainer {
    /// `.basis` file
    Basis,
    /// KTX2 with BasisLZ/ETC1S or UASTC payload
    Ktx2,
}

/// Decoder for Basis Universal payloads (ETC1S and UASTC).
///
/// No implementation is linked by default; install one with
/// [`ContainerTranscoder::with_codec`](super::ContainerTranscoder::with_codec).
pub trait SupercompressedCodec: Send + Sync {
    /// Decode `bytes` into `target`, producing every level when `unpack_mipmaps` is set.
    fn transcode(
        &self,
        container: SupercompressedContainer,
        bytes: &[u8],
        target: TextureFormat,
        unpack_mipmaps: bool,
    ) -> Result<TranscodedTexture, String>;
}
