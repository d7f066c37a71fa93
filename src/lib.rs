//! mipforge - GPU texture loading
//!
//! Loads images and compressed textures (DDS, KTX2, Basis) into GPU
//! textures. Format negotiation picks what the device can sample, a small
//! worker pool transcodes containers off the caller's thread, and missing
//! mip levels are rendered on the GPU.

pub mod client;
pub mod config;
pub mod data;
pub mod error;
pub mod fetch;
pub mod format;
pub mod gpu;
pub mod loader;
pub mod mipmap;
pub mod protocol;
pub mod worker;

pub use client::{GpuTexture, TextureClient, TextureOptions};
pub use config::{DeviceConfig, LoaderConfig};
pub use data::{Slice, TextureData, TextureLevel};
pub use error::{DeviceError, TextureError, TransportError, UsageError};
pub use format::{ColorSpace, TextureFormat};
