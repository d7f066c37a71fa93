//! GPU device abstraction
//!
//! The client and the mipmap generator talk to the GPU only through
//! [`GpuDevice`]. [`WgpuDevice`] is the production implementation.

mod wgpu_device;

#[cfg(test)]
pub(crate) mod recording;

pub use wgpu_device::{list_gpus, GpuInfo, WgpuBlitPipeline, WgpuDevice};

use crate::error::DeviceError;
use crate::format::TextureFormat;

/// Description of a texture to create
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextureSpec {
    pub label: Option<String>,
    pub width: u32,
    pub height: u32,
    /// Array layers or cube faces
    pub layers: u32,
    pub mip_level_count: u32,
    pub format: TextureFormat,
    /// Whether levels can be rendered into
    pub render_target: bool,
}

impl TextureSpec {
    /// Size of `level`, never below 1x1
    pub fn level_size(&self, level: u32) -> (u32, u32) {
        (
            self.width.checked_shr(level).unwrap_or(0).max(1),
            self.height.checked_shr(level).unwrap_or(0).max(1),
        )
    }
}

/// Destination of a [`GpuDevice::write_texture`] upload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureRegion {
    pub mip_level: u32,
    pub layer: u32,
    /// Upload extent, already rounded up to whole blocks
    pub width: u32,
    pub height: u32,
}

/// One step of a mip chain
#[derive(Debug)]
pub enum MipCommand<'a, T> {
    /// Render `source_level` of `source` into `target_level` of `target`
    /// through the blit pipeline.
    Blit {
        source: &'a T,
        source_level: u32,
        source_layer: u32,
        target: &'a T,
        target_level: u32,
        target_layer: u32,
    },
    /// Copy a whole level between textures of the same format
    Copy {
        source: &'a T,
        source_level: u32,
        source_layer: u32,
        target: &'a T,
        target_level: u32,
        target_layer: u32,
        width: u32,
        height: u32,
    },
}

/// Operations the loader needs from a GPU
///
/// Implementations report failures as [`DeviceError`] instead of panicking or
/// deferring them to a device-lost callback.
pub trait GpuDevice: Send + Sync + 'static {
    type Texture: Send + Sync;
    type BlitPipeline: Send + Sync;

    /// Formats this device can sample
    fn supported_formats(&self) -> Vec<TextureFormat>;

    fn create_texture(&self, spec: &TextureSpec) -> Result<Self::Texture, DeviceError>;

    /// Upload `data` into one (mip level, layer) of `texture`.
    fn write_texture(
        &self,
        texture: &Self::Texture,
        region: TextureRegion,
        data: &[u8],
        bytes_per_row: u32,
        rows: u32,
    ) -> Result<(), DeviceError>;

    /// Build the render pipeline that downsamples into `format`.
    fn create_blit_pipeline(&self, format: TextureFormat) -> Result<Self::BlitPipeline, DeviceError>;

    /// Record `commands` in order into one submission.
    fn submit_mip_chain(
        &self,
        pipeline: &Self::BlitPipeline,
        commands: &[MipCommand<'_, Self::Texture>],
    ) -> Result<(), DeviceError>;
}
