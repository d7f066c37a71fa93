//! Built-in transcoder for DDS, KTX2 and Basis containers
//!
//! Block-compressed payloads are passed through when the device can sample
//! them. Uncompressed payloads in formats the device lacks are expanded to
//! RGBA8. Basis Universal payloads go through a [`SupercompressedCodec`]
//! after a target is chosen from the device's supported list.

use std::io::{Cursor, Read};
use std::sync::Arc;

use ddsfile::{Caps2, D3DFormat, Dds, DxgiFormat, MiscFlag};
use ktx2::{ColorModel, Format, SupercompressionScheme};
use tracing::debug;

use super::codec::{
    SupercompressedCodec, SupercompressedContainer, TranscodeInput, Transcoder, TranscoderFactory,
};
use crate::format::{mip_chain_length, select_transcode_target, TextureFormat, BASELINE_FORMAT};
use crate::protocol::{MipLevelDescriptor, TranscodedTexture};

const DDS_MAGIC: &[u8] = b"DDS ";
const KTX2_MAGIC: [u8; 12] = [
    0xAB, 0x4B, 0x54, 0x58, 0x20, 0x32, 0x30, 0xBB, 0x0D, 0x0A, 0x1A, 0x0A,
];
const BASIS_MAGIC: &[u8] = b"sB";

/// `cBASISHeaderFlagHasAlphaSlices` in the .basis file header flags
const BASIS_FLAG_HAS_ALPHA: u16 = 0x4;
const BASIS_FLAGS_OFFSET: usize = 21;

/// KTX2 DFD channel ids that carry alpha
const ETC1S_CHANNEL_AAA: u8 = 15;
const UASTC_CHANNEL_RGBA: u8 = 3;
const UASTC_CHANNEL_RRRG: u8 = 5;

/// Container kinds the built-in transcoder understands
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerKind {
    Dds,
    Ktx2,
    Basis,
}

impl ContainerKind {
    /// Detect from magic bytes, falling back to the file extension.
    pub fn detect(bytes: &[u8], extension: Option<&str>) -> Option<Self> {
        if bytes.starts_with(DDS_MAGIC) {
            return Some(ContainerKind::Dds);
        }
        if bytes.starts_with(&KTX2_MAGIC) {
            return Some(ContainerKind::Ktx2);
        }
        if bytes.starts_with(BASIS_MAGIC) {
            return Some(ContainerKind::Basis);
        }

        match extension.map(|e| e.trim_start_matches('.').to_ascii_lowercase()).as_deref() {
            Some("dds") => Some(ContainerKind::Dds),
            Some("ktx2") => Some(ContainerKind::Ktx2),
            Some("basis") => Some(ContainerKind::Basis),
            _ => None,
        }
    }
}

/// Transcoder for the container formats handled in-process
#[derive(Clone, Default)]
pub struct ContainerTranscoder {
    codec: Option<Arc<dyn SupercompressedCodec>>,
}

impl ContainerTranscoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `codec` for Basis Universal payloads
    pub fn with_codec(mut self, codec: Arc<dyn SupercompressedCodec>) -> Self {
        self.codec = Some(codec);
        self
    }

    fn supercompressed(
        &self,
        container: SupercompressedContainer,
        input: &TranscodeInput<'_>,
        has_alpha: bool,
    ) -> Result<TranscodedTexture, String> {
        let target = select_transcode_target(has_alpha, input.supported_formats);
        debug!(
            "{:?} payload (alpha: {}) targets {}",
            container, has_alpha, target
        );

        let codec = self.codec.as_ref().ok_or_else(|| {
            format!(
                "{:?} payload needs a Basis Universal codec and none is installed",
                container
            )
        })?;
        codec.transcode(container, input.bytes, target, input.unpack_mipmaps)
    }

    fn transcode_dds(&self, input: &TranscodeInput<'_>) -> Result<TranscodedTexture, String> {
        let dds = Dds::read(Cursor::new(input.bytes)).map_err(|e| format!("invalid DDS: {}", e))?;

        let format = dds_format(&dds)?;
        if dds.get_depth() > 1 {
            return Err("volume DDS textures are not supported".to_string());
        }

        let cube = dds.header.caps2.contains(Caps2::CUBEMAP)
            || dds
                .header10
                .as_ref()
                .is_some_and(|h| h.misc_flag.contains(MiscFlag::TEXTURECUBE));
        let mut layers = dds.get_num_array_layers().max(1);
        if cube && dds.header10.is_some() {
            layers *= 6;
        }

        let width = dds.get_width();
        let height = dds.get_height();
        let stored_levels = dds.get_num_mipmap_levels().max(1);
        check_level_count(stored_levels, width, height)?;
        let emitted_levels = if input.unpack_mipmaps { stored_levels } else { 1 };

        // Each layer stores its whole mip chain before the next layer starts.
        let mut levels = Vec::new();
        let mut offset = 0usize;
        for slice in 0..layers {
            for level in 0..stored_levels {
                let w = width.checked_shr(level).unwrap_or(0).max(1);
                let h = height.checked_shr(level).unwrap_or(0).max(1);
                let length = format.level_size(w, h);
                let end = offset
                    .checked_add(length)
                    .ok_or_else(|| "DDS layout overflows the address space".to_string())?;
                if level < emitted_levels {
                    levels.push(MipLevelDescriptor {
                        level,
                        slice,
                        byte_offset: offset,
                        byte_length: length,
                        width: w,
                        height: h,
                    });
                }
                offset = end;
            }
        }

        if offset > dds.data.len() {
            return Err(format!(
                "DDS data holds {} bytes, layout needs {}",
                dds.data.len(),
                offset
            ));
        }

        Ok(TranscodedTexture {
            format,
            width,
            height,
            depth: layers,
            cube,
            buffer: dds.data,
            levels,
        })
    }

    fn transcode_ktx2(&self, input: &TranscodeInput<'_>) -> Result<TranscodedTexture, String> {
        let reader = ktx2::Reader::new(input.bytes).map_err(|e| format!("invalid KTX2: {:?}", e))?;
        let header = reader.header();

        let basis_payload = header.supercompression_scheme == Some(SupercompressionScheme::BasisLZ)
            || header.format.is_none();
        if basis_payload {
            let has_alpha = ktx2_has_alpha(&reader);
            return self.supercompressed(SupercompressedContainer::Ktx2, input, has_alpha);
        }

        let format = header
            .format
            .and_then(ktx2_format)
            .ok_or_else(|| format!("unsupported KTX2 format {:?}", header.format))?;
        if header.pixel_depth > 1 {
            return Err("volume KTX2 textures are not supported".to_string());
        }

        check_level_count(reader.levels().len() as u32, header.pixel_width, header.pixel_height.max(1))?;

        let faces = header.face_count.max(1);
        let layers = header.layer_count.max(1) * faces;
        let width = header.pixel_width;
        let height = header.pixel_height.max(1);
        let emitted_levels = if input.unpack_mipmaps {
            reader.levels().len()
        } else {
            1
        };

        let mut buffer = Vec::new();
        let mut levels = Vec::new();
        for (index, level) in reader.levels().take(emitted_levels).enumerate() {
            let index = index as u32;
            let bytes = match header.supercompression_scheme {
                None => level.data.to_vec(),
                Some(SupercompressionScheme::ZLIB) => {
                    let mut inflated = Vec::with_capacity(level.uncompressed_byte_length as usize);
                    flate2::read::ZlibDecoder::new(level.data)
                        .read_to_end(&mut inflated)
                        .map_err(|e| format!("failed to inflate KTX2 level {}: {}", index, e))?;
                    inflated
                }
                Some(other) => {
                    return Err(format!("KTX2 supercompression {:?} is not supported", other));
                }
            };

            let w = width.checked_shr(index).unwrap_or(0).max(1);
            let h = height.checked_shr(index).unwrap_or(0).max(1);
            let slice_size = format.level_size(w, h);
            let needed = slice_size
                .checked_mul(layers as usize)
                .ok_or_else(|| format!("KTX2 level {} size overflows", index))?;
            if bytes.len() < needed {
                return Err(format!(
                    "KTX2 level {} holds {} bytes, {} slices need {}",
                    index,
                    bytes.len(),
                    layers,
                    needed
                ));
            }

            let base = buffer.len();
            for slice in 0..layers {
                levels.push(MipLevelDescriptor {
                    level: index,
                    slice,
                    byte_offset: base + slice as usize * slice_size,
                    byte_length: slice_size,
                    width: w,
                    height: h,
                });
            }
            buffer.extend_from_slice(&bytes);
        }

        Ok(TranscodedTexture {
            format,
            width,
            height,
            depth: layers,
            cube: faces == 6,
            buffer,
            levels,
        })
    }
}

impl Transcoder for ContainerTranscoder {
    fn transcode(&self, input: TranscodeInput<'_>) -> Result<TranscodedTexture, String> {
        let kind = ContainerKind::detect(input.bytes, input.extension)
            .ok_or_else(|| "unrecognized texture container".to_string())?;

        let texture = match kind {
            ContainerKind::Dds => self.transcode_dds(&input)?,
            ContainerKind::Ktx2 => self.transcode_ktx2(&input)?,
            ContainerKind::Basis => {
                let has_alpha = basis_has_alpha(input.bytes);
                self.supercompressed(SupercompressedContainer::Basis, &input, has_alpha)?
            }
        };

        fit_to_device(texture, input.supported_formats)
    }
}

impl TranscoderFactory for ContainerTranscoder {
    fn create(&self) -> Result<Box<dyn Transcoder>, String> {
        Ok(Box::new(self.clone()))
    }
}

/// A container may not store more levels than a full chain for its size.
fn check_level_count(levels: u32, width: u32, height: u32) -> Result<(), String> {
    let full = mip_chain_length(width, height);
    if levels > full {
        return Err(format!(
            "{} mip levels declared for a {}x{} texture, at most {} possible",
            levels, width, height, full
        ));
    }
    Ok(())
}

/// Keep `texture` if the device samples its format, otherwise expand it to RGBA8.
fn fit_to_device(
    texture: TranscodedTexture,
    supported: &[TextureFormat],
) -> Result<TranscodedTexture, String> {
    if supported.contains(&texture.format) {
        return Ok(texture);
    }

    let target = match texture.format {
        TextureFormat::Bgra8UnormSrgb | TextureFormat::Rgba8UnormSrgb => {
            TextureFormat::Rgba8UnormSrgb
        }
        _ => BASELINE_FORMAT,
    };
    if texture.format.is_compressed() || !supported.contains(&target) {
        return Err(format!(
            "no supported transcode target for {} on this device",
            texture.format
        ));
    }

    debug!("Expanding {} to {}", texture.format, target);
    let mut buffer = Vec::new();
    let mut levels = Vec::with_capacity(texture.levels.len());
    for descriptor in &texture.levels {
        let end = descriptor.byte_offset + descriptor.byte_length;
        let source = texture
            .buffer
            .get(descriptor.byte_offset..end)
            .ok_or_else(|| format!("level {} runs past the payload", descriptor.level))?;
        let expanded = expand_to_rgba8(texture.format, source)
            .ok_or_else(|| format!("cannot expand {} to {}", texture.format, target))?;

        levels.push(MipLevelDescriptor {
            byte_offset: buffer.len(),
            byte_length: expanded.len(),
            ..*descriptor
        });
        buffer.extend_from_slice(&expanded);
    }

    Ok(TranscodedTexture {
        format: target,
        buffer,
        levels,
        ..texture
    })
}

fn expand_to_rgba8(format: TextureFormat, source: &[u8]) -> Option<Vec<u8>> {
    let out = match format {
        TextureFormat::Rgba8Unorm | TextureFormat::Rgba8UnormSrgb => source.to_vec(),
        TextureFormat::Bgra8Unorm | TextureFormat::Bgra8UnormSrgb => source
            .chunks_exact(4)
            .flat_map(|p| [p[2], p[1], p[0], p[3]])
            .collect(),
        TextureFormat::Rg8Unorm => source
            .chunks_exact(2)
            .flat_map(|p| [p[0], p[1], 0, 255])
            .collect(),
        TextureFormat::R8Unorm => source.iter().flat_map(|&r| [r, r, r, 255]).collect(),
        _ => return None,
    };
    Some(out)
}

fn dds_format(dds: &Dds) -> Result<TextureFormat, String> {
    if let Some(dxgi) = dds.get_dxgi_format() {
        let format = match dxgi {
            DxgiFormat::R8_UNorm => TextureFormat::R8Unorm,
            DxgiFormat::R8G8_UNorm => TextureFormat::Rg8Unorm,
            DxgiFormat::R8G8B8A8_UNorm => TextureFormat::Rgba8Unorm,
            DxgiFormat::R8G8B8A8_UNorm_sRGB => TextureFormat::Rgba8UnormSrgb,
            DxgiFormat::B8G8R8A8_UNorm => TextureFormat::Bgra8Unorm,
            DxgiFormat::B8G8R8A8_UNorm_sRGB => TextureFormat::Bgra8UnormSrgb,
            DxgiFormat::R16G16B16A16_Float => TextureFormat::Rgba16Float,
            DxgiFormat::BC1_UNorm => TextureFormat::Bc1RgbaUnorm,
            DxgiFormat::BC1_UNorm_sRGB => TextureFormat::Bc1RgbaUnormSrgb,
            DxgiFormat::BC3_UNorm => TextureFormat::Bc3RgbaUnorm,
            DxgiFormat::BC3_UNorm_sRGB => TextureFormat::Bc3RgbaUnormSrgb,
            DxgiFormat::BC4_UNorm => TextureFormat::Bc4RUnorm,
            DxgiFormat::BC5_UNorm => TextureFormat::Bc5RgUnorm,
            DxgiFormat::BC6H_UF16 => TextureFormat::Bc6hRgbUfloat,
            DxgiFormat::BC7_UNorm => TextureFormat::Bc7RgbaUnorm,
            DxgiFormat::BC7_UNorm_sRGB => TextureFormat::Bc7RgbaUnormSrgb,
            other => return Err(format!("unsupported DXGI format {:?}", other)),
        };
        return Ok(format);
    }

    match dds.get_d3d_format() {
        Some(D3DFormat::DXT1) => Ok(TextureFormat::Bc1RgbaUnorm),
        Some(D3DFormat::DXT5) => Ok(TextureFormat::Bc3RgbaUnorm),
        Some(D3DFormat::A8R8G8B8) => Ok(TextureFormat::Bgra8Unorm),
        Some(D3DFormat::A8B8G8R8) => Ok(TextureFormat::Rgba8Unorm),
        Some(D3DFormat::L8) => Ok(TextureFormat::R8Unorm),
        Some(D3DFormat::A16B16G16R16F) => Ok(TextureFormat::Rgba16Float),
        other => Err(format!("unsupported DDS format {:?}", other)),
    }
}

fn ktx2_format(format: Format) -> Option<TextureFormat> {
    let mapped = match format {
        Format::R8_UNORM => TextureFormat::R8Unorm,
        Format::R8G8_UNORM => TextureFormat::Rg8Unorm,
        Format::R8G8B8A8_UNORM => TextureFormat::Rgba8Unorm,
        Format::R8G8B8A8_SRGB => TextureFormat::Rgba8UnormSrgb,
        Format::B8G8R8A8_UNORM => TextureFormat::Bgra8Unorm,
        Format::B8G8R8A8_SRGB => TextureFormat::Bgra8UnormSrgb,
        Format::R16G16B16A16_SFLOAT => TextureFormat::Rgba16Float,
        Format::BC1_RGBA_UNORM_BLOCK => TextureFormat::Bc1RgbaUnorm,
        Format::BC1_RGBA_SRGB_BLOCK => TextureFormat::Bc1RgbaUnormSrgb,
        Format::BC3_UNORM_BLOCK => TextureFormat::Bc3RgbaUnorm,
        Format::BC3_SRGB_BLOCK => TextureFormat::Bc3RgbaUnormSrgb,
        Format::BC4_UNORM_BLOCK => TextureFormat::Bc4RUnorm,
        Format::BC5_UNORM_BLOCK => TextureFormat::Bc5RgUnorm,
        Format::BC6H_UFLOAT_BLOCK => TextureFormat::Bc6hRgbUfloat,
        Format::BC7_UNORM_BLOCK => TextureFormat::Bc7RgbaUnorm,
        Format::BC7_SRGB_BLOCK => TextureFormat::Bc7RgbaUnormSrgb,
        Format::ETC2_R8G8B8_UNORM_BLOCK => TextureFormat::Etc2Rgb8Unorm,
        Format::ETC2_R8G8B8_SRGB_BLOCK => TextureFormat::Etc2Rgb8UnormSrgb,
        Format::ETC2_R8G8B8A8_UNORM_BLOCK => TextureFormat::Etc2Rgba8Unorm,
        Format::ETC2_R8G8B8A8_SRGB_BLOCK => TextureFormat::Etc2Rgba8UnormSrgb,
        Format::EAC_R11_UNORM_BLOCK => TextureFormat::EacR11Unorm,
        Format::EAC_R11G11_UNORM_BLOCK => TextureFormat::EacRg11Unorm,
        Format::ASTC_4x4_UNORM_BLOCK => TextureFormat::Astc4x4Unorm,
        Format::ASTC_4x4_SRGB_BLOCK => TextureFormat::Astc4x4UnormSrgb,
        _ => return None,
    };
    Some(mapped)
}

/// Alpha presence declared by a KTX2 data format descriptor
fn ktx2_has_alpha<D: AsRef<[u8]>>(reader: &ktx2::Reader<D>) -> bool {
    reader.dfd_blocks().any(|block| {
        let Ok(basic) = ktx2::DfdBlockBasic::parse(block.data) else {
            return false;
        };
        let uastc = basic.header.color_model == Some(ColorModel::UASTC);
        basic.sample_information().any(|sample| {
            sample.channel_type == ETC1S_CHANNEL_AAA
                || (uastc
                    && matches!(sample.channel_type, UASTC_CHANNEL_RGBA | UASTC_CHANNEL_RRRG))
        })
    })
}

fn basis_has_alpha(bytes: &[u8]) -> bool {
    bytes
        .get(BASIS_FLAGS_OFFSET..BASIS_FLAGS_OFFSET + 2)
        .map(|f| u16::from_le_bytes([f[0], f[1]]) & BASIS_FLAG_HAS_ALPHA != 0)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ddsfile::{AlphaMode, D3D10ResourceDimension, NewDxgiParams};
    use parking_lot::Mutex;

    fn dds_bytes(format: DxgiFormat, width: u32, height: u32, mips: u32, fill: &[u8]) -> Vec<u8> {
        let mut dds = Dds::new_dxgi(NewDxgiParams {
            height,
            width,
            depth: None,
            format,
            mipmap_levels: Some(mips),
            array_layers: None,
            caps2: None,
            is_cubemap: false,
            resource_dimension: D3D10ResourceDimension::Texture2D,
            alpha_mode: AlphaMode::Straight,
        })
        .unwrap();
        for (i, byte) in dds.data.iter_mut().enumerate() {
            *byte = fill[i % fill.len()];
        }
        let mut out = Vec::new();
        dds.write(&mut out).unwrap();
        out
    }

    /// Minimal uncompressed KTX2 file with an empty DFD
    fn ktx2_bytes(vk_format: u32, scheme: u32, width: u32, height: u32, levels: &[Vec<u8>]) -> Vec<u8> {
        let index_len = levels.len() * 24;
        let dfd_offset = 80 + index_len;
        let mut data_offset = dfd_offset + 4;

        let mut out = Vec::new();
        out.extend_from_slice(&KTX2_MAGIC);
        for value in [vk_format, 0, width, height, 0, 0, 1, levels.len() as u32, scheme] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        for value in [dfd_offset as u32, 4, 0, 0] {
            out.extend_from_slice(&value.to_le_bytes());
        }
        out.extend_from_slice(&0u64.to_le_bytes());
        out.extend_from_slice(&0u64.to_le_bytes());
        for level in levels {
            out.extend_from_slice(&(data_offset as u64).to_le_bytes());
            out.extend_from_slice(&(level.len() as u64).to_le_bytes());
            out.extend_from_slice(&(level.len() as u64).to_le_bytes());
            data_offset += level.len();
        }
        out.extend_from_slice(&4u32.to_le_bytes());
        for level in levels {
            out.extend_from_slice(level);
        }
        out
    }

    fn input<'a>(bytes: &'a [u8], supported: &'a [TextureFormat]) -> TranscodeInput<'a> {
        TranscodeInput {
            bytes,
            supported_formats: supported,
            unpack_mipmaps: true,
            extension: None,
        }
    }

    #[derive(Default)]
    struct RecordingCodec {
        targets: Mutex<Vec<(SupercompressedContainer, TextureFormat)>>,
    }

    impl SupercompressedCodec for RecordingCodec {
        fn transcode(
            &self,
            container: SupercompressedContainer,
            _bytes: &[u8],
            target: TextureFormat,
            _unpack_mipmaps: bool,
        ) -> Result<TranscodedTexture, String> {
            self.targets.lock().push((container, target));
            Ok(TranscodedTexture {
                format: target,
                width: 4,
                height: 4,
                depth: 1,
                cube: false,
                buffer: vec![0; 64],
                levels: vec![MipLevelDescriptor {
                    level: 0,
                    slice: 0,
                    byte_offset: 0,
                    byte_length: 64,
                    width: 4,
                    height: 4,
                }],
            })
        }
    }

    #[test]
    fn test_detect_container() {
        assert_eq!(ContainerKind::detect(b"DDS \0\0\0\0", None), Some(ContainerKind::Dds));
        assert_eq!(ContainerKind::detect(&KTX2_MAGIC, None), Some(ContainerKind::Ktx2));
        assert_eq!(ContainerKind::detect(b"sB\x13\x00", None), Some(ContainerKind::Basis));
        assert_eq!(ContainerKind::detect(b"????", Some(".KTX2")), Some(ContainerKind::Ktx2));
        assert_eq!(ContainerKind::detect(b"????", Some("png")), None);
    }

    #[test]
    fn test_dds_rgba_passes_through_with_mips() {
        let bytes = dds_bytes(DxgiFormat::R8G8B8A8_UNorm, 4, 4, 3, &[1, 2, 3, 4]);
        let out = ContainerTranscoder::new()
            .transcode(input(&bytes, &[TextureFormat::Rgba8Unorm]))
            .unwrap();

        assert_eq!(out.format, TextureFormat::Rgba8Unorm);
        assert_eq!(out.levels.len(), 3);
        assert_eq!(out.levels[1].byte_offset, 64);
        assert_eq!((out.levels[2].width, out.levels[2].height), (1, 1));
        assert_eq!(out.levels[2].byte_length, 4);
        assert!(out.into_texture_data().unwrap().validate().is_ok());
    }

    /// Overwrite the header's mip count (bytes 28..32 after the magic)
    fn with_dds_mip_count(mut bytes: Vec<u8>, count: u32) -> Vec<u8> {
        bytes[28..32].copy_from_slice(&count.to_le_bytes());
        bytes
    }

    #[test]
    fn test_dds_level_count_beyond_full_chain_is_rejected() {
        let bytes = with_dds_mip_count(dds_bytes(DxgiFormat::R8G8B8A8_UNorm, 4, 4, 2, &[0]), 40);
        let err = ContainerTranscoder::new()
            .transcode(input(&bytes, &[TextureFormat::Rgba8Unorm]))
            .unwrap_err();
        assert!(err.contains("40 mip levels"), "{}", err);
    }

    #[test]
    fn test_level_count_limit() {
        assert!(check_level_count(3, 4, 4).is_ok());
        assert!(check_level_count(4, 4, 4).is_err());
        assert!(check_level_count(9, 257, 100).is_ok());
    }

    #[test]
    fn test_dds_without_unpack_keeps_base_level() {
        let bytes = dds_bytes(DxgiFormat::R8G8B8A8_UNorm, 4, 4, 3, &[0]);
        let mut request = input(&bytes, &[TextureFormat::Rgba8Unorm]);
        request.unpack_mipmaps = false;

        let out = ContainerTranscoder::new().transcode(request).unwrap();
        assert_eq!(out.levels.len(), 1);
    }

    #[test]
    fn test_dds_bgra_expanded_for_rgba_only_device() {
        let bytes = dds_bytes(DxgiFormat::B8G8R8A8_UNorm, 2, 2, 1, &[10, 20, 30, 40]);
        let out = ContainerTranscoder::new()
            .transcode(input(&bytes, &[TextureFormat::Rgba8Unorm]))
            .unwrap();

        assert_eq!(out.format, TextureFormat::Rgba8Unorm);
        assert_eq!(&out.buffer[..4], &[30, 20, 10, 40]);
    }

    #[test]
    fn test_dds_bc7_needs_device_support() {
        let bytes = dds_bytes(DxgiFormat::BC7_UNorm, 8, 8, 1, &[0x55]);

        let err = ContainerTranscoder::new()
            .transcode(input(&bytes, &[TextureFormat::Rgba8Unorm]))
            .unwrap_err();
        assert!(err.contains("no supported transcode target"), "{}", err);

        let supported = [TextureFormat::Rgba8Unorm, TextureFormat::Bc7RgbaUnorm];
        let out = ContainerTranscoder::new().transcode(input(&bytes, &supported)).unwrap();
        assert_eq!(out.format, TextureFormat::Bc7RgbaUnorm);
        assert_eq!(out.levels[0].byte_length, 4 * 16);
    }

    #[test]
    fn test_ktx2_levels_are_read_in_order() {
        let levels = vec![vec![1u8; 16], vec![2u8; 4]];
        let bytes = ktx2_bytes(37, 0, 2, 2, &levels);

        let out = ContainerTranscoder::new()
            .transcode(input(&bytes, &[TextureFormat::Rgba8Unorm]))
            .unwrap();
        assert_eq!(out.format, TextureFormat::Rgba8Unorm);
        assert_eq!(out.levels.len(), 2);
        assert_eq!(out.levels[1].byte_offset, 16);
        assert_eq!(&out.buffer[16..], &[2, 2, 2, 2]);
    }

    #[test]
    fn test_ktx2_zlib_levels_are_inflated() {
        use flate2::write::ZlibEncoder;
        use flate2::Compression;
        use std::io::Write;

        let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(&[9u8; 16]).unwrap();
        let compressed = encoder.finish().unwrap();
        let bytes = ktx2_bytes(37, 3, 2, 2, &[compressed]);

        let out = ContainerTranscoder::new()
            .transcode(input(&bytes, &[TextureFormat::Rgba8Unorm]))
            .unwrap();
        assert_eq!(out.buffer, vec![9u8; 16]);
    }

    #[test]
    fn test_basis_without_codec_fails() {
        let mut bytes = b"sB".to_vec();
        bytes.resize(64, 0);
        let err = ContainerTranscoder::new()
            .transcode(input(&bytes, &[TextureFormat::Rgba8Unorm]))
            .unwrap_err();
        assert!(err.contains("codec"), "{}", err);
    }

    #[test]
    fn test_basis_alpha_flag_selects_target() {
        let codec = Arc::new(RecordingCodec::default());
        let transcoder = ContainerTranscoder::new().with_codec(codec.clone());
        let supported = [
            TextureFormat::Rgba8Unorm,
            TextureFormat::Etc2Rgb8Unorm,
            TextureFormat::Etc2Rgba8Unorm,
        ];

        let mut opaque = b"sB".to_vec();
        opaque.resize(64, 0);
        let mut alpha = opaque.clone();
        alpha[BASIS_FLAGS_OFFSET] = BASIS_FLAG_HAS_ALPHA as u8;

        transcoder.transcode(input(&opaque, &supported)).unwrap();
        transcoder.transcode(input(&alpha, &supported)).unwrap();

        let targets = codec.targets.lock().clone();
        assert_eq!(
            targets,
            vec![
                (SupercompressedContainer::Basis, TextureFormat::Etc2Rgb8Unorm),
                (SupercompressedContainer::Basis, TextureFormat::Etc2Rgba8Unorm),
            ]
        );
    }

    #[test]
    fn test_basislz_ktx2_goes_through_codec() {
        let codec = Arc::new(RecordingCodec::default());
        let transcoder = ContainerTranscoder::new().with_codec(codec.clone());
        let bytes = ktx2_bytes(0, 1, 4, 4, &[vec![0u8; 8]]);

        let out = transcoder.transcode(input(&bytes, &[TextureFormat::Rgba8Unorm])).unwrap();
        assert_eq!(out.format, TextureFormat::Rgba8Unorm);
        assert_eq!(
            codec.targets.lock()[0],
            (SupercompressedContainer::Ktx2, TextureFormat::Rgba8Unorm)
        );
    }
}
