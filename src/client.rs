//! Public entry point: turns URLs, buffers, bitmaps and colors into GPU textures

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use image::RgbaImage;
use rand::Rng;
use tracing::{debug, info};

use crate::config::{DeviceConfig, LoaderConfig};
use crate::data::TextureData;
use crate::error::{DeviceError, TextureError, UsageError};
use crate::fetch::extension_of;
use crate::format::{apply_color_space, negotiate, ColorSpace, TextureFormat, BASELINE_FORMAT};
use crate::gpu::{GpuDevice, TextureRegion, TextureSpec, WgpuDevice};
use crate::loader::{
    mime_for_buffer, mime_for_url, ImageLoader, LazyPool, LoadContext, LoadedTexture,
    LoaderRegistry, LoaderStrategy, MimeType, TranscodeLoader,
};
use crate::mipmap::MipmapGenerator;
use crate::worker::{ContainerTranscoder, TranscoderFactory};

/// Per-call options
#[derive(Debug, Clone)]
pub struct TextureOptions {
    /// Fill the mip chain when the source supplies only level 0
    pub generate_mipmaps: bool,
    pub color_space: ColorSpace,
    /// Declared MIME type; overrides sniffing
    pub mime_type: Option<String>,
    /// Filename hint for buffers, also used as the texture label
    pub filename: Option<String>,
    /// Create the texture as a render target. Mip levels are then rendered
    /// in place instead of through a scratch texture.
    pub render_target: bool,
}

impl Default for TextureOptions {
    fn default() -> Self {
        Self {
            generate_mipmaps: true,
            color_space: ColorSpace::Default,
            mime_type: None,
            filename: None,
            render_target: false,
        }
    }
}

impl TextureOptions {
    pub fn without_mipmaps(mut self) -> Self {
        self.generate_mipmaps = false;
        self
    }

    pub fn with_color_space(mut self, color_space: ColorSpace) -> Self {
        self.color_space = color_space;
        self
    }

    pub fn with_mime_type(mut self, mime_type: impl Into<String>) -> Self {
        self.mime_type = Some(mime_type.into());
        self
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = Some(filename.into());
        self
    }
}

/// A texture on the GPU plus what was uploaded into it
#[derive(Debug)]
pub struct GpuTexture<T> {
    pub texture: T,
    pub width: u32,
    pub height: u32,
    /// Array layers or cube faces
    pub depth: u32,
    pub mip_level_count: u32,
    pub format: TextureFormat,
}

/// Loads textures onto one device
pub struct TextureClient<D: GpuDevice = WgpuDevice> {
    device: Arc<D>,
    supported: Vec<TextureFormat>,
    registry: LoaderRegistry,
    pool: Arc<LazyPool>,
    mipmaps: MipmapGenerator<D>,
    destroyed: AtomicBool,
}

impl TextureClient<WgpuDevice> {
    /// Open a wgpu device and build a client on it.
    pub fn with_wgpu(device_config: &DeviceConfig, config: LoaderConfig) -> Result<Self, TextureError> {
        let device = WgpuDevice::new(device_config)?;
        Self::new(Arc::new(device), config)
    }
}

impl<D: GpuDevice> TextureClient<D> {
    /// Client using the built-in container transcoder
    pub fn new(device: Arc<D>, config: LoaderConfig) -> Result<Self, TextureError> {
        Self::with_transcoder(device, config, Arc::new(ContainerTranscoder::new()))
    }

    /// Client whose workers transcode with `factory`
    pub fn with_transcoder(
        device: Arc<D>,
        config: LoaderConfig,
        factory: Arc<dyn TranscoderFactory>,
    ) -> Result<Self, TextureError> {
        config.validate()?;

        let supported = device.supported_formats();
        debug!("Device samples {} formats", supported.len());

        let pool = Arc::new(LazyPool::new(config.clone(), factory));
        let registry = default_registry(&config, &pool);

        Ok(Self {
            mipmaps: MipmapGenerator::new(Arc::clone(&device)),
            device,
            supported,
            registry,
            pool,
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn device(&self) -> &Arc<D> {
        &self.device
    }

    /// Formats the device can sample, as reported at construction
    pub fn supported_formats(&self) -> &[TextureFormat] {
        &self.supported
    }

    pub fn mipmap_generator(&self) -> &MipmapGenerator<D> {
        &self.mipmaps
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn ensure_live(&self) -> Result<(), TextureError> {
        if self.is_destroyed() {
            return Err(UsageError::Destroyed.into());
        }
        Ok(())
    }

    fn context(&self, options: &TextureOptions, extension: Option<String>) -> LoadContext {
        LoadContext {
            supported_formats: self.supported.clone(),
            unpack_mipmaps: options.generate_mipmaps,
            extension,
        }
    }

    /// Load a texture from a remote URL or a local path.
    pub async fn from_url(
        &self,
        url: &str,
        options: &TextureOptions,
    ) -> Result<GpuTexture<D::Texture>, TextureError> {
        self.ensure_live()?;

        let mime = mime_for_url(url, options.mime_type.as_deref());
        debug!("Loading {} as {}", url, mime);
        let strategy = self.registry.resolve(&mime)?;
        let context = self.context(options, extension_of(url));
        let loaded = strategy.load_from_url(url, &context).await?;

        self.upload(loaded, options)
    }

    /// Load a texture from encoded bytes.
    pub async fn from_buffer(
        &self,
        bytes: Vec<u8>,
        options: &TextureOptions,
    ) -> Result<GpuTexture<D::Texture>, TextureError> {
        self.ensure_live()?;

        let filename = options.filename.as_deref();
        let mime = mime_for_buffer(&bytes, options.mime_type.as_deref(), filename);
        debug!("Loading {}-byte buffer as {}", bytes.len(), mime);
        let strategy = self.registry.resolve(&mime)?;
        let context = self.context(options, filename.and_then(extension_of));
        let loaded = strategy.load_from_buffer(bytes, &context).await?;

        self.upload(loaded, options)
    }

    fn upload(
        &self,
        loaded: LoadedTexture,
        options: &TextureOptions,
    ) -> Result<GpuTexture<D::Texture>, TextureError> {
        match loaded {
            LoadedTexture::Data(data) => self.from_texture_data(data, options),
            LoadedTexture::Bitmap(image) => self.from_bitmap(image, options),
        }
    }

    /// Upload a decoded RGBA8 image.
    pub fn from_bitmap(
        &self,
        image: RgbaImage,
        options: &TextureOptions,
    ) -> Result<GpuTexture<D::Texture>, TextureError> {
        let (width, height) = image.dimensions();
        let data = TextureData::from_single_slice(
            TextureFormat::Rgba8Unorm,
            width,
            height,
            Bytes::from(image.into_raw()),
        )?;
        self.from_texture_data(data, options)
    }

    /// Create a GPU texture from assembled levels and slices.
    ///
    /// Every slice is checked before the device is touched.
    pub fn from_texture_data(
        &self,
        data: TextureData,
        options: &TextureOptions,
    ) -> Result<GpuTexture<D::Texture>, TextureError> {
        self.ensure_live()?;
        data.validate()?;

        let format = apply_color_space(data.format(), options.color_space);
        if !self.supported.contains(&format) {
            return Err(DeviceError::UnsupportedFormat(format.to_string()).into());
        }

        let layout = data.layout(options.generate_mipmaps);
        let spec = TextureSpec {
            label: options.filename.clone(),
            width: layout.width,
            height: layout.height,
            layers: layout.layers,
            mip_level_count: layout.mip_level_count,
            format,
            render_target: options.render_target,
        };
        let texture = self.device.create_texture(&spec)?;

        let block = format.block();
        for level in data.levels() {
            let bytes_per_row = format.row_pitch(level.width());
            let rows = format.block_rows(level.height());
            let region_size = format.level_size(level.width(), level.height());

            for (layer, slice) in level.slices() {
                let region = TextureRegion {
                    mip_level: level.index(),
                    layer,
                    width: level.width().div_ceil(block.block_width) * block.block_width,
                    height: rows * block.block_height,
                };
                self.device.write_texture(
                    &texture,
                    region,
                    &slice.bytes()[..region_size],
                    bytes_per_row,
                    rows,
                )?;
            }
        }

        if layout.generate_mipmaps {
            self.mipmaps.generate(&texture, &spec)?;
        }

        debug!(
            "Created {}x{} {} texture with {} levels, {} layers",
            spec.width, spec.height, format, spec.mip_level_count, spec.layers
        );
        Ok(GpuTexture {
            texture,
            width: spec.width,
            height: spec.height,
            depth: spec.layers,
            mip_level_count: spec.mip_level_count,
            format,
        })
    }

    /// 1x1 texture of a solid color. Channels are in `0.0..=1.0`.
    ///
    /// Formats the device cannot sample, and formats with no 8-bit texel
    /// encoding, fall back to `rgba8unorm`.
    pub fn from_color(
        &self,
        r: f32,
        g: f32,
        b: f32,
        a: f32,
        format: TextureFormat,
    ) -> Result<GpuTexture<D::Texture>, TextureError> {
        self.ensure_live()?;

        let format = match negotiate(format, &self.supported) {
            f if color_texel(f, [0; 4]).is_some() => f,
            _ => BASELINE_FORMAT,
        };
        let rgba = [r, g, b, a].map(|c| (c.clamp(0.0, 1.0) * 255.0).round() as u8);
        let texel = color_texel(format, rgba).unwrap_or(rgba.to_vec());

        let data = TextureData::from_single_slice(format, 1, 1, Bytes::from(texel))?;
        self.from_texture_data(data, &TextureOptions::default().without_mipmaps())
    }

    /// Random opaque RGBA8 texture with a full mip chain
    pub fn from_noise(&self, width: u32, height: u32) -> Result<GpuTexture<D::Texture>, TextureError> {
        self.ensure_live()?;

        let width = width.max(1);
        let height = height.max(1);
        let mut rng = rand::thread_rng();
        let mut pixels = vec![0u8; width as usize * height as usize * 4];
        for texel in pixels.chunks_exact_mut(4) {
            rng.fill(&mut texel[..3]);
            texel[3] = u8::MAX;
        }

        let data =
            TextureData::from_single_slice(TextureFormat::Rgba8Unorm, width, height, Bytes::from(pixels))?;
        self.from_texture_data(data, &TextureOptions::default())
    }

    /// Stop the worker pool and refuse all further calls.
    ///
    /// Transcodes still in flight fail with the destroyed error.
    pub fn destroy(&self) {
        if self.destroyed.swap(true, Ordering::AcqRel) {
            return;
        }
        let rejected = self.pool.destroy();
        info!("Texture client destroyed ({} pending requests rejected)", rejected);
    }
}

/// Bytes of one texel of `format` for an RGBA8 color, for formats with
/// 8-bit channels.
fn color_texel(format: TextureFormat, [r, g, b, a]: [u8; 4]) -> Option<Vec<u8>> {
    match format {
        TextureFormat::R8Unorm => Some(vec![r]),
        TextureFormat::Rg8Unorm => Some(vec![r, g]),
        TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => Some(vec![r, g, b, a]),
        TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => Some(vec![b, g, r, a]),
        _ => None,
    }
}

fn default_registry(config: &LoaderConfig, pool: &Arc<LazyPool>) -> LoaderRegistry {
    let timeout = config.http_timeout;
    let pool = Arc::clone(pool);

    LoaderRegistry::builder()
        .register(
            "image",
            &[
                MimeType::Png,
                MimeType::Jpeg,
                MimeType::Webp,
                MimeType::Gif,
                MimeType::Bmp,
            ],
            move || Arc::new(ImageLoader::new(timeout)) as Arc<dyn LoaderStrategy>,
        )
        .register(
            "transcode",
            &[MimeType::Basis, MimeType::Ktx2, MimeType::Dds],
            move || Arc::new(TranscodeLoader::new(Arc::clone(&pool))) as Arc<dyn LoaderStrategy>,
        )
        .fallback_to(&MimeType::Png)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::recording::{RecordedCommand, RecordingDevice};
    use ddsfile::{AlphaMode, D3D10ResourceDimension, Dds, DxgiFormat, NewDxgiParams};
    use image::{ImageFormat, Rgba};
    use std::io::Cursor;

    fn client(supported: Vec<TextureFormat>) -> (Arc<RecordingDevice>, TextureClient<RecordingDevice>) {
        let device = Arc::new(RecordingDevice::new(supported));
        let client = TextureClient::new(Arc::clone(&device), LoaderConfig::default().with_max_workers(2))
            .unwrap();
        (device, client)
    }

    fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let image = RgbaImage::from_pixel(width, height, Rgba([1, 2, 3, 4]));
        let mut out = Cursor::new(Vec::new());
        image.write_to(&mut out, ImageFormat::Png).unwrap();
        out.into_inner()
    }

    fn dds_bytes(format: DxgiFormat, width: u32, height: u32, levels: u32) -> Vec<u8> {
        let dds = Dds::new_dxgi(NewDxgiParams {
            height,
            width,
            depth: None,
            format,
            mipmap_levels: Some(levels),
            array_layers: None,
            caps2: None,
            is_cubemap: false,
            resource_dimension: D3D10ResourceDimension::Texture2D,
            alpha_mode: AlphaMode::Straight,
        })
        .unwrap();
        let mut out = Vec::new();
        dds.write(&mut out).unwrap();
        out
    }

    #[test]
    fn test_duplicate_slice_fails_before_gpu() {
        let (device, _client) = client(vec![TextureFormat::Rgba8Unorm]);

        let buffer = Bytes::from(vec![0u8; 32]);
        let mut data = TextureData::new(TextureFormat::Rgba8Unorm, 2, 2);
        data.set_slice(0, 0, &buffer, 0, 16).unwrap();
        let err = data.set_slice(0, 0, &buffer, 16, 16).unwrap_err();

        assert_eq!(err, UsageError::SliceAlreadySet { level: 0, slice: 0 });
        assert!(device.untouched());
    }

    #[test]
    fn test_missing_slice_fails_before_gpu() {
        let (device, client) = client(vec![TextureFormat::Rgba8Unorm]);

        let buffer = Bytes::from(vec![0u8; 16]);
        let mut data = TextureData::new(TextureFormat::Rgba8Unorm, 2, 2).with_depth(2);
        data.set_slice(0, 0, &buffer, 0, 16).unwrap();

        let err = client
            .from_texture_data(data, &TextureOptions::default())
            .unwrap_err();
        assert!(matches!(
            err,
            TextureError::Usage(UsageError::MissingSlice { level: 0, slice: 1 })
        ));
        assert!(device.untouched());
    }

    #[test]
    fn test_from_color_falls_back_to_rgba8() {
        let (device, client) = client(vec![TextureFormat::Rgba8Unorm]);

        let texture = client
            .from_color(1.0, 0.0, 0.5, 1.0, TextureFormat::Bc7RgbaUnorm)
            .unwrap();
        assert_eq!(texture.format, TextureFormat::Rgba8Unorm);
        assert_eq!((texture.width, texture.height, texture.mip_level_count), (1, 1, 1));

        let writes = device.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].bytes, vec![255, 0, 128, 255]);
    }

    #[test]
    fn test_from_color_bgra_order() {
        let (device, client) = client(vec![TextureFormat::Rgba8Unorm, TextureFormat::Bgra8Unorm]);

        let texture = client
            .from_color(1.0, 0.0, 0.0, 1.0, TextureFormat::Bgra8Unorm)
            .unwrap();
        assert_eq!(texture.format, TextureFormat::Bgra8Unorm);
        assert_eq!(device.writes()[0].bytes, vec![0, 0, 255, 255]);
    }

    #[test]
    fn test_from_noise_generates_chain() {
        let (device, client) = client(vec![TextureFormat::Rgba8Unorm]);

        let texture = client.from_noise(16, 8).unwrap();
        assert_eq!(texture.mip_level_count, 5);

        let writes = device.writes();
        assert_eq!(writes.len(), 1);
        assert_eq!(writes[0].bytes.len(), 16 * 8 * 4);
        assert_eq!(writes[0].bytes_per_row, 64);
        assert!(writes[0].bytes.chunks(4).all(|t| t[3] == 255));

        let copies = device.submissions()[0]
            .iter()
            .filter(|c| matches!(c, RecordedCommand::Copy { .. }))
            .count();
        assert_eq!(copies, 4);
    }

    #[test]
    fn test_render_target_option_generates_in_place() {
        let (device, client) = client(vec![TextureFormat::Rgba8Unorm]);

        let image = RgbaImage::from_pixel(8, 8, Rgba([0, 0, 0, 255]));
        let options = TextureOptions {
            render_target: true,
            ..TextureOptions::default()
        };
        client.from_bitmap(image, &options).unwrap();

        assert_eq!(device.textures().len(), 1);
        assert!(device.textures()[0].spec.render_target);
        assert!(device.submissions()[0]
            .iter()
            .all(|c| matches!(c, RecordedCommand::Blit { .. })));
    }

    #[test]
    fn test_compressed_data_uploads_whole_blocks() {
        let (device, client) = client(TextureFormat::all().collect());

        // 10x5 BC7: 3x2 blocks at level 0, 2x1 blocks at level 1
        let buffer = Bytes::from(vec![9u8; 96 + 32]);
        let mut data = TextureData::new(TextureFormat::Bc7RgbaUnorm, 10, 5);
        data.set_slice(0, 0, &buffer, 0, 96).unwrap();
        data.set_slice(1, 0, &buffer, 96, 32).unwrap();

        let texture = client
            .from_texture_data(data, &TextureOptions::default())
            .unwrap();
        assert_eq!((texture.width, texture.height), (12, 8));
        assert_eq!(texture.mip_level_count, 2);

        let writes = device.writes();
        assert_eq!(writes.len(), 2);
        assert_eq!((writes[0].bytes_per_row, writes[0].rows), (48, 2));
        assert_eq!((writes[0].region.width, writes[0].region.height), (12, 8));
        assert_eq!((writes[1].bytes_per_row, writes[1].rows), (32, 1));
        assert_eq!((writes[1].region.width, writes[1].region.height), (8, 4));
        assert!(device.submissions().is_empty());
    }

    #[test]
    fn test_compressed_base_level_keeps_single_level() {
        let (device, client) = client(TextureFormat::all().collect());

        // 64x64 BC7 is 16x16 blocks of 16 bytes
        let data = TextureData::from_single_slice(
            TextureFormat::Bc7RgbaUnorm,
            64,
            64,
            Bytes::from(vec![0u8; 16 * 16 * 16]),
        )
        .unwrap();
        let texture = client
            .from_texture_data(data, &TextureOptions::default())
            .unwrap();

        assert_eq!(texture.mip_level_count, 1);
        assert_eq!(device.textures()[0].spec.mip_level_count, 1);
        assert!(device.pipelines().is_empty());
        assert!(device.submissions().is_empty());
    }

    #[test]
    fn test_compressed_supplied_chain_uploads_every_level() {
        let (device, client) = client(TextureFormat::all().collect());

        let mut data = TextureData::new(TextureFormat::Bc7RgbaUnorm, 64, 64);
        let mut sizes = Vec::new();
        for level in 0..7 {
            let size = TextureFormat::Bc7RgbaUnorm.level_size(64 >> level, 64 >> level);
            let buffer = Bytes::from(vec![level as u8; size]);
            data.set_slice(level, 0, &buffer, 0, size).unwrap();
            sizes.push(size);
        }

        let texture = client
            .from_texture_data(data, &TextureOptions::default())
            .unwrap();
        assert_eq!(texture.mip_level_count, 7);

        let writes = device.writes();
        assert_eq!(writes.len(), 7);
        let last = &writes[6];
        assert_eq!(last.region.mip_level, 6);
        assert_eq!((last.region.width, last.region.height), (4, 4));
        assert_eq!(last.bytes.len(), 16);
        assert!(device.submissions().is_empty());
    }

    #[test]
    fn test_unsupported_data_format_is_device_error() {
        let (device, client) = client(vec![TextureFormat::Rgba8Unorm]);

        let data =
            TextureData::from_single_slice(TextureFormat::Bc1RgbaUnorm, 4, 4, Bytes::from(vec![0u8; 8]))
                .unwrap();
        let err = client
            .from_texture_data(data, &TextureOptions::default())
            .unwrap_err();
        assert!(matches!(err, TextureError::Device(DeviceError::UnsupportedFormat(_))));
        assert!(device.untouched());
    }

    #[tokio::test]
    async fn test_from_buffer_decodes_png() {
        let (device, client) = client(vec![TextureFormat::Rgba8Unorm]);

        let texture = client
            .from_buffer(png_bytes(3, 2), &TextureOptions::default())
            .await
            .unwrap();
        assert_eq!((texture.width, texture.height), (3, 2));
        assert_eq!(texture.mip_level_count, 2);
        assert_eq!(device.writes()[0].bytes[..4], [1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_from_url_reads_local_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("grass.png");
        std::fs::write(&path, png_bytes(4, 4)).unwrap();

        let (_device, client) = client(vec![TextureFormat::Rgba8Unorm]);
        let texture = client
            .from_url(path.to_str().unwrap(), &TextureOptions::default().without_mipmaps())
            .await
            .unwrap();
        assert_eq!(texture.mip_level_count, 1);
    }

    #[tokio::test]
    async fn test_from_buffer_transcodes_dds_with_srgb() {
        let (device, client) =
            client(vec![TextureFormat::Rgba8Unorm, TextureFormat::Rgba8UnormSrgb]);

        let options = TextureOptions::default().with_color_space(ColorSpace::Srgb);
        let texture = client
            .from_buffer(dds_bytes(DxgiFormat::R8G8B8A8_UNorm, 8, 8, 4), &options)
            .await
            .unwrap();

        assert_eq!(texture.format, TextureFormat::Rgba8UnormSrgb);
        assert_eq!(texture.mip_level_count, 4);
        assert_eq!(device.writes().len(), 4);
        assert!(device.submissions().is_empty());
    }

    #[tokio::test]
    async fn test_compressed_dds_without_support_is_transcode_error() {
        let (device, client) = client(vec![TextureFormat::Rgba8Unorm]);

        let err = client
            .from_buffer(
                dds_bytes(DxgiFormat::BC7_UNorm, 8, 8, 1),
                &TextureOptions::default(),
            )
            .await
            .unwrap_err();
        assert!(matches!(err, TextureError::Transcode(ref m) if m.contains("no supported transcode target")));
        assert!(device.untouched());
    }

    #[tokio::test]
    async fn test_destroyed_client_refuses_calls() {
        let (device, client) = client(vec![TextureFormat::Rgba8Unorm]);
        client.destroy();
        client.destroy();

        assert!(client.from_noise(4, 4).unwrap_err().is_destroyed());
        assert!(client
            .from_color(0.0, 0.0, 0.0, 1.0, TextureFormat::Rgba8Unorm)
            .unwrap_err()
            .is_destroyed());
        let err = client
            .from_buffer(png_bytes(2, 2), &TextureOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "loader destroyed");
        assert!(device.untouched());
    }

    #[test]
    #[ignore] // Requires GPU
    fn test_wgpu_client_from_noise() {
        let client = TextureClient::with_wgpu(&DeviceConfig::default(), LoaderConfig::default())
            .expect("Failed to open GPU");
        let texture = client.from_noise(64, 64).unwrap();
        assert_eq!(texture.mip_level_count, 7);
        assert_eq!(client.mipmap_generator().cached_pipelines(), 1);
    }
}
