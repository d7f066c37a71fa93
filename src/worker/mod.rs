//! Background transcoding: worker pool, codec seam and built-in containers

mod codec;
mod container;
mod pool;

pub use codec::{
    SupercompressedCodec, SupercompressedContainer, TranscodeInput, Transcoder, TranscoderFactory,
};
pub use container::{ContainerKind, ContainerTranscoder};
pub use pool::{TranscodeOptions, TranscodeTicket, WorkerPool};
