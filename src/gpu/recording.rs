//! In-memory [`GpuDevice`] that records every call

use parking_lot::Mutex;

use super::{GpuDevice, MipCommand, TextureRegion, TextureSpec};
use crate::error::DeviceError;
use crate::format::TextureFormat;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedTexture {
    pub id: usize,
    pub spec: TextureSpec,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedWrite {
    pub texture: usize,
    pub region: TextureRegion,
    pub bytes: Vec<u8>,
    pub bytes_per_row: u32,
    pub rows: u32,
}

/// Mip command with texture ids in place of references
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordedCommand {
    Blit {
        source: usize,
        source_level: u32,
        source_layer: u32,
        target: usize,
        target_level: u32,
        target_layer: u32,
    },
    Copy {
        source: usize,
        source_level: u32,
        target: usize,
        target_level: u32,
        target_layer: u32,
        width: u32,
        height: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordingTexture {
    pub id: usize,
}

pub struct RecordingPipeline {
    pub format: TextureFormat,
}

#[derive(Default)]
struct Calls {
    textures: Vec<RecordedTexture>,
    writes: Vec<RecordedWrite>,
    pipelines: Vec<TextureFormat>,
    submissions: Vec<Vec<RecordedCommand>>,
}

pub struct RecordingDevice {
    supported: Vec<TextureFormat>,
    calls: Mutex<Calls>,
}

impl RecordingDevice {
    pub fn new(supported: Vec<TextureFormat>) -> Self {
        Self {
            supported,
            calls: Mutex::new(Calls::default()),
        }
    }

    /// Device that only samples uncompressed formats
    pub fn uncompressed() -> Self {
        Self::new(TextureFormat::all().filter(|f| !f.is_compressed()).collect())
    }

    pub fn textures(&self) -> Vec<RecordedTexture> {
        self.calls.lock().textures.clone()
    }

    pub fn writes(&self) -> Vec<RecordedWrite> {
        self.calls.lock().writes.clone()
    }

    pub fn pipelines(&self) -> Vec<TextureFormat> {
        self.calls.lock().pipelines.clone()
    }

    pub fn submissions(&self) -> Vec<Vec<RecordedCommand>> {
        self.calls.lock().submissions.clone()
    }

    /// True while nothing has touched the device
    pub fn untouched(&self) -> bool {
        let calls = self.calls.lock();
        calls.textures.is_empty() && calls.writes.is_empty() && calls.submissions.is_empty()
    }
}

impl GpuDevice for RecordingDevice {
    type Texture = RecordingTexture;
    type BlitPipeline = RecordingPipeline;

    fn supported_formats(&self) -> Vec<TextureFormat> {
        self.supported.clone()
    }

    fn create_texture(&self, spec: &TextureSpec) -> Result<RecordingTexture, DeviceError> {
        if spec.width == 0 || spec.height == 0 {
            return Err(DeviceError::Validation {
                operation: "create_texture",
                message: "zero-sized texture".to_string(),
            });
        }
        let mut calls = self.calls.lock();
        let id = calls.textures.len();
        calls.textures.push(RecordedTexture {
            id,
            spec: spec.clone(),
        });
        Ok(RecordingTexture { id })
    }

    fn write_texture(
        &self,
        texture: &RecordingTexture,
        region: TextureRegion,
        data: &[u8],
        bytes_per_row: u32,
        rows: u32,
    ) -> Result<(), DeviceError> {
        self.calls.lock().writes.push(RecordedWrite {
            texture: texture.id,
            region,
            bytes: data.to_vec(),
            bytes_per_row,
            rows,
        });
        Ok(())
    }

    fn create_blit_pipeline(&self, format: TextureFormat) -> Result<RecordingPipeline, DeviceError> {
        if format.is_compressed() {
            return Err(DeviceError::UnsupportedFormat(format.to_string()));
        }
        self.calls.lock().pipelines.push(format);
        Ok(RecordingPipeline { format })
    }

    fn submit_mip_chain(
        &self,
        _pipeline: &RecordingPipeline,
        commands: &[MipCommand<'_, RecordingTexture>],
    ) -> Result<(), DeviceError> {
        let recorded = commands
            .iter()
            .map(|command| match *command {
                MipCommand::Blit {
                    source,
                    source_level,
                    source_layer,
                    target,
                    target_level,
                    target_layer,
                } => RecordedCommand::Blit {
                    source: source.id,
                    source_level,
                    source_layer,
                    target: target.id,
                    target_level,
                    target_layer,
                },
                MipCommand::Copy {
                    source,
                    source_level,
                    target,
                    target_level,
                    target_layer,
                    width,
                    height,
                    ..
                } => RecordedCommand::Copy {
                    source: source.id,
                    source_level,
                    target: target.id,
                    target_level,
                    target_layer,
                    width,
                    height,
                },
            })
            .collect();
        self.calls.lock().submissions.push(recorded);
        Ok(())
    }
}
