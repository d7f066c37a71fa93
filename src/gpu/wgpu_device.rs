//! wgpu implementation of [`GpuDevice`]

use std::borrow::Cow;

use tracing::{debug, info};
use wgpu::{Backends, Extent3d, Features, Instance, TextureUsages, TextureViewDimension};

use super::{GpuDevice, MipCommand, TextureRegion, TextureSpec};
use crate::config::DeviceConfig;
use crate::error::DeviceError;
use crate::format::TextureFormat;

/// Full-screen triangle that samples the previous level
const BLIT_SHADER: &str = r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) uv: vec2<f32>,
};

@vertex
fn vs_main(@builtin(vertex_index) index: u32) -> VertexOutput {
    let uv = vec2<f32>(f32((index << 1u) & 2u), f32(index & 2u));
    var out: VertexOutput;
    out.position = vec4<f32>(uv * vec2<f32>(2.0, -2.0) + vec2<f32>(-1.0, 1.0), 0.0, 1.0);
    out.uv = uv;
    return out;
}

@group(0) @binding(0) var source: texture_2d<f32>;
@group(0) @binding(1) var source_sampler: sampler;

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return textureSample(source, source_sampler, in.uv);
}
"#;

const COMPRESSION_FEATURES: Features = Features::TEXTURE_COMPRESSION_BC
    .union(Features::TEXTURE_COMPRESSION_ETC2)
    .union(Features::TEXTURE_COMPRESSION_ASTC);

/// GPU information for display/selection
#[derive(Debug, Clone)]
pub struct GpuInfo {
    pub name: String,
    pub backend: String,
    pub device_type: String,
    pub adapter_index: usize,
}

impl std::fmt::Display for GpuInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}, {})", self.name, self.backend, self.device_type)
    }
}

impl GpuInfo {
    fn from_adapter(adapter_index: usize, adapter: &wgpu::Adapter) -> Self {
        let info = adapter.get_info();
        Self {
            name: info.name,
            backend: format!("{:?}", info.backend),
            device_type: format!("{:?}", info.device_type),
            adapter_index,
        }
    }
}

/// Blit pipeline for one output format
pub struct WgpuBlitPipeline {
    pipeline: wgpu::RenderPipeline,
    format: TextureFormat,
}

impl WgpuBlitPipeline {
    pub fn format(&self) -> TextureFormat {
        self.format
    }
}

/// wgpu device and queue with the shared blit resources
pub struct WgpuDevice {
    device: wgpu::Device,
    queue: wgpu::Queue,
    features: Features,
    shader: wgpu::ShaderModule,
    bind_group_layout: wgpu::BindGroupLayout,
    pipeline_layout: wgpu::PipelineLayout,
    sampler: wgpu::Sampler,
    pub gpu_info: GpuInfo,
}

impl WgpuDevice {
    /// Open the best adapter, or the one `config.gpu_index` names.
    pub fn new(config: &DeviceConfig) -> Result<Self, DeviceError> {
        pollster::block_on(Self::new_async(config))
    }

    async fn new_async(config: &DeviceConfig) -> Result<Self, DeviceError> {
        info!("Initializing GPU device...");

        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends: config.backends,
            ..Default::default()
        });

        let adapters = instance.enumerate_adapters(config.backends).await;
        if adapters.is_empty() {
            return Err(DeviceError::NoAdapter("no GPU found on this system".to_string()));
        }

        for (i, adapter) in adapters.iter().enumerate() {
            let info = adapter.get_info();
            info!(
                "GPU {}: {} ({:?}, {:?})",
                i, info.name, info.backend, info.device_type
            );
        }

        let (adapter_index, adapter) = match config.gpu_index {
            Some(idx) => {
                let adapter = adapters.get(idx).ok_or_else(|| {
                    DeviceError::NoAdapter(format!(
                        "GPU index {} out of range (found {} GPUs)",
                        idx,
                        adapters.len()
                    ))
                })?;
                (idx, adapter)
            }
            // Prefer discrete GPUs, then Vulkan
            None => adapters
                .iter()
                .enumerate()
                .max_by_key(|(_, a)| {
                    let info = a.get_info();
                    adapter_score(info.device_type, info.backend)
                })
                .ok_or_else(|| DeviceError::NoAdapter("no GPU found on this system".to_string()))?,
        };

        let gpu_info = GpuInfo::from_adapter(adapter_index, adapter);
        info!("Selected GPU: {}", gpu_info);

        let features = adapter.features() & COMPRESSION_FEATURES;
        debug!("Requesting compression features: {:?}", features);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("mipforge device"),
                required_features: features,
                required_limits: wgpu::Limits::default(),
                ..Default::default()
            })
            .await
            .map_err(|e| DeviceError::RequestDevice(e.to_string()))?;

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("mip blit shader"),
            source: wgpu::ShaderSource::Wgsl(Cow::Borrowed(BLIT_SHADER)),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("mip blit bind group layout"),
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Texture {
                        sample_type: wgpu::TextureSampleType::Float { filterable: true },
                        view_dimension: TextureViewDimension::D2,
                        multisampled: false,
                    },
                    count: None,
                },
                wgpu::BindGroupLayoutEntry {
                    binding: 1,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("mip blit pipeline layout"),
            bind_group_layouts: &[&bind_group_layout],
            immediate_size: 0,
        });

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("mip blit sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            ..Default::default()
        });

        info!("GPU device initialized successfully");

        Ok(Self {
            device,
            queue,
            features,
            shader,
            bind_group_layout,
            pipeline_layout,
            sampler,
            gpu_info,
        })
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn info(&self) -> &GpuInfo {
        &self.gpu_info
    }

    /// Run `f` inside a validation error scope.
    fn scoped<T>(&self, operation: &'static str, f: impl FnOnce() -> T) -> Result<T, DeviceError> {
        let scope = self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let value = f();
        match pollster::block_on(scope.pop()) {
            Some(error) => Err(DeviceError::Validation {
                operation,
                message: error.to_string(),
            }),
            None => Ok(value),
        }
    }

    fn level_view(texture: &wgpu::Texture, level: u32, layer: u32) -> wgpu::TextureView {
        texture.create_view(&wgpu::TextureViewDescriptor {
            label: Some("mip level view"),
            dimension: Some(TextureViewDimension::D2),
            base_mip_level: level,
            mip_level_count: Some(1),
            base_array_layer: layer,
            array_layer_count: Some(1),
            ..Default::default()
        })
    }
}

fn adapter_score(device_type: wgpu::DeviceType, backend: wgpu::Backend) -> i32 {
    let mut score = 0;
    if device_type == wgpu::DeviceType::DiscreteGpu {
        score += 100;
    }
    if backend == wgpu::Backend::Vulkan {
        score += 10;
    }
    score
}

impl GpuDevice for WgpuDevice {
    type Texture = wgpu::Texture;
    type BlitPipeline = WgpuBlitPipeline;

    fn supported_formats(&self) -> Vec<TextureFormat> {
        TextureFormat::supported_with(self.features)
    }

    fn create_texture(&self, spec: &TextureSpec) -> Result<wgpu::Texture, DeviceError> {
        let mut usage = TextureUsages::TEXTURE_BINDING | TextureUsages::COPY_DST | TextureUsages::COPY_SRC;
        if spec.render_target {
            usage |= TextureUsages::RENDER_ATTACHMENT;
        }

        self.scoped("create_texture", || {
            self.device.create_texture(&wgpu::TextureDescriptor {
                label: spec.label.as_deref(),
                size: Extent3d {
                    width: spec.width,
                    height: spec.height,
                    depth_or_array_layers: spec.layers.max(1),
                },
                mip_level_count: spec.mip_level_count.max(1),
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: spec.format.native(),
                usage,
                view_formats: &[],
            })
        })
    }

    fn write_texture(
        &self,
        texture: &wgpu::Texture,
        region: TextureRegion,
        data: &[u8],
        bytes_per_row: u32,
        rows: u32,
    ) -> Result<(), DeviceError> {
        self.scoped("write_texture", || {
            self.queue.write_texture(
                wgpu::TexelCopyTextureInfo {
                    texture,
                    mip_level: region.mip_level,
                    origin: wgpu::Origin3d {
                        x: 0,
                        y: 0,
                        z: region.layer,
                    },
                    aspect: wgpu::TextureAspect::All,
                },
                data,
                wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(rows),
                },
                Extent3d {
                    width: region.width,
                    height: region.height,
                    depth_or_array_layers: 1,
                },
            )
        })
    }

    fn create_blit_pipeline(&self, format: TextureFormat) -> Result<WgpuBlitPipeline, DeviceError> {
        if format.is_compressed() {
            return Err(DeviceError::UnsupportedFormat(format.to_string()));
        }

        debug!("Compiling blit pipeline for {}", format);
        let pipeline = self.scoped("create_blit_pipeline", || {
            self.device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
                label: Some("mip blit pipeline"),
                layout: Some(&self.pipeline_layout),
                vertex: wgpu::VertexState {
                    module: &self.shader,
                    entry_point: Some("vs_main"),
                    compilation_options: Default::default(),
                    buffers: &[],
                },
                primitive: wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: wgpu::MultisampleState::default(),
                fragment: Some(wgpu::FragmentState {
                    module: &self.shader,
                    entry_point: Some("fs_main"),
                    compilation_options: Default::default(),
                    targets: &[Some(wgpu::ColorTargetState {
                        format: format.native(),
                        blend: None,
                        write_mask: wgpu::ColorWrites::ALL,
                    })],
                }),
                multiview_mask: None,
                cache: None,
            })
        })?;

        Ok(WgpuBlitPipeline { pipeline, format })
    }

    fn submit_mip_chain(
        &self,
        pipeline: &WgpuBlitPipeline,
        commands: &[MipCommand<'_, wgpu::Texture>],
    ) -> Result<(), DeviceError> {
        self.scoped("submit_mip_chain", || {
            let mut encoder = self
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("mip chain encoder"),
                });

            for command in commands {
                match *command {
                    MipCommand::Blit {
                        source,
                        source_level,
                        source_layer,
                        target,
                        target_level,
                        target_layer,
                    } => {
                        let source_view = Self::level_view(source, source_level, source_layer);
                        let target_view = Self::level_view(target, target_level, target_layer);
                        let bind_group = self.device.create_bind_group(&wgpu::BindGroupDescriptor {
                            label: Some("mip blit bind group"),
                            layout: &self.bind_group_layout,
                            entries: &[
                                wgpu::BindGroupEntry {
                                    binding: 0,
                                    resource: wgpu::BindingResource::TextureView(&source_view),
                                },
                                wgpu::BindGroupEntry {
                                    binding: 1,
                                    resource: wgpu::BindingResource::Sampler(&self.sampler),
                                },
                            ],
                        });

                        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                            label: Some("mip blit pass"),
                            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                                view: &target_view,
                                depth_slice: None,
                                resolve_target: None,
                                ops: wgpu::Operations {
                                    load: wgpu::LoadOp::Clear(wgpu::Color::TRANSPARENT),
                                    store: wgpu::StoreOp::Store,
                                },
                            })],
                            depth_stencil_attachment: None,
                            timestamp_writes: None,
                            occlusion_query_set: None,
                            multiview_mask: None,
                        });
                        pass.set_pipeline(&pipeline.pipeline);
                        pass.set_bind_group(0, &bind_group, &[]);
                        pass.draw(0..3, 0..1);
                    }
                    MipCommand::Copy {
                        source,
                        source_level,
                        source_layer,
                        target,
                        target_level,
                        target_layer,
                        width,
                        height,
                    } => {
                        encoder.copy_texture_to_texture(
                            wgpu::TexelCopyTextureInfo {
                                texture: source,
                                mip_level: source_level,
                                origin: wgpu::Origin3d {
                                    x: 0,
                                    y: 0,
                                    z: source_layer,
                                },
                                aspect: wgpu::TextureAspect::All,
                            },
                            wgpu::TexelCopyTextureInfo {
                                texture: target,
                                mip_level: target_level,
                                origin: wgpu::Origin3d {
                                    x: 0,
                                    y: 0,
                                    z: target_layer,
                                },
                                aspect: wgpu::TextureAspect::All,
                            },
                            Extent3d {
                                width,
                                height,
                                depth_or_array_layers: 1,
                            },
                        );
                    }
                }
            }

            self.queue.submit(std::iter::once(encoder.finish()));
        })
    }
}

/// List available GPUs
pub fn list_gpus(backends: Backends) -> Vec<GpuInfo> {
    pollster::block_on(async {
        let instance = Instance::new(&wgpu::InstanceDescriptor {
            backends,
            ..Default::default()
        });

        instance
            .enumerate_adapters(backends)
            .await
            .iter()
            .enumerate()
            .map(|(idx, adapter)| GpuInfo::from_adapter(idx, adapter))
            .collect()
    })
}
