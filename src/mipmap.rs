//! Mip chain generation on the GPU
//!
//! Each level is rendered from the one above it with a linear-filtered blit.
//! Textures that cannot be rendered into get their chain rendered into a
//! scratch texture first and copied back level by level.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::error::DeviceError;
use crate::format::TextureFormat;
use crate::gpu::{GpuDevice, MipCommand, TextureSpec};

type PipelineSlot<P> = Arc<Mutex<Option<Arc<P>>>>;

/// Generates mip levels and caches one blit pipeline per output format
pub struct MipmapGenerator<D: GpuDevice> {
    device: Arc<D>,
    pipelines: Mutex<HashMap<TextureFormat, PipelineSlot<D::BlitPipeline>>>,
}

impl<D: GpuDevice> MipmapGenerator<D> {
    pub fn new(device: Arc<D>) -> Self {
        Self {
            device,
            pipelines: Mutex::new(HashMap::new()),
        }
    }

    /// Number of pipelines built so far
    pub fn cached_pipelines(&self) -> usize {
        self.pipelines
            .lock()
            .values()
            .filter(|slot| slot.lock().is_some())
            .count()
    }

    /// Blit pipeline for `format`, built on first use.
    ///
    /// Callers racing on the same format wait on that format's slot; other
    /// formats are not blocked. A failed build is not cached.
    fn pipeline(&self, format: TextureFormat) -> Result<Arc<D::BlitPipeline>, DeviceError> {
        let slot = Arc::clone(self.pipelines.lock().entry(format).or_default());

        let mut guard = slot.lock();
        if let Some(pipeline) = guard.as_ref() {
            return Ok(Arc::clone(pipeline));
        }

        let pipeline = Arc::new(self.device.create_blit_pipeline(format)?);
        info!("Built mip blit pipeline for {}", format);
        *guard = Some(Arc::clone(&pipeline));
        Ok(pipeline)
    }

    /// Fill levels `1..spec.mip_level_count` of every layer of `texture`
    /// from level 0.
    pub fn generate(&self, texture: &D::Texture, spec: &TextureSpec) -> Result<(), DeviceError> {
        let levels = spec.mip_level_count;
        if levels <= 1 {
            return Ok(());
        }
        if !spec.format.can_generate_mipmaps() {
            return Err(DeviceError::UnsupportedFormat(spec.format.to_string()));
        }

        let pipeline = self.pipeline(spec.format)?;
        let layers = spec.layers.max(1);

        if spec.render_target {
            debug!(
                "Generating {} levels in place for {}x{} {} ({} layers)",
                levels, spec.width, spec.height, spec.format, layers
            );
            let mut commands = Vec::with_capacity(((levels - 1) * layers) as usize);
            for layer in 0..layers {
                for level in 1..levels {
                    commands.push(MipCommand::Blit {
                        source: texture,
                        source_level: level - 1,
                        source_layer: layer,
                        target: texture,
                        target_level: level,
                        target_layer: layer,
                    });
                }
            }
            return self.device.submit_mip_chain(&pipeline, &commands);
        }

        let (half_width, half_height) = spec.level_size(1);
        let scratch_spec = TextureSpec {
            label: Some("mip scratch".to_string()),
            width: half_width,
            height: half_height,
            layers: 1,
            mip_level_count: levels - 1,
            format: spec.format,
            render_target: true,
        };
        debug!(
            "Generating {} levels through a {}x{} scratch texture for {} ({} layers)",
            levels, half_width, half_height, spec.format, layers
        );
        let scratch = self.device.create_texture(&scratch_spec)?;

        // The scratch texture is reused for every layer; commands run in order.
        let mut commands = Vec::with_capacity(((levels - 1) * 2 * layers) as usize);
        for layer in 0..layers {
            commands.push(MipCommand::Blit {
                source: texture,
                source_level: 0,
                source_layer: layer,
                target: &scratch,
                target_level: 0,
                target_layer: 0,
            });
            for level in 1..levels - 1 {
                commands.push(MipCommand::Blit {
                    source: &scratch,
                    source_level: level - 1,
                    source_layer: 0,
                    target: &scratch,
                    target_level: level,
                    target_layer: 0,
                });
            }
            for level in 0..levels - 1 {
                let (width, height) = spec.level_size(level + 1);
                commands.push(MipCommand::Copy {
                    source: &scratch,
                    source_level: level,
                    source_layer: 0,
                    target: texture,
                    target_level: level + 1,
                    target_layer: layer,
                    width,
                    height,
                });
            }
        }

        self.device.submit_mip_chain(&pipeline, &commands)
    }
}
