//! Canonical texture format registry
//!
//! Every format the loader can produce is described once in a static table:
//! its canonical (WebGPU-spelled) name, block layout, whether mipmaps can be
//! rendered for it, and its native wgpu mapping. Negotiation against a
//! device's supported list lives in [`negotiate`].

mod negotiate;

pub use negotiate::{
    apply_color_space, mip_chain_length, negotiate, select_transcode_target, ColorSpace,
    ALPHA_PREFERENCE, BASELINE_FORMAT, OPAQUE_PREFERENCE,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use wgpu::{AstcBlock, AstcChannel, Features};

/// Loader-internal texture format identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "&'static str")]
pub enum TextureFormat {
    R8Unorm,
    Rg8Unorm,
    Rgba8Unorm,
    Rgba8UnormSrgb,
    Bgra8Unorm,
    Bgra8UnormSrgb,
    Rgba16Float,
    Bc1RgbaUnorm,
    Bc1RgbaUnormSrgb,
    Bc3RgbaUnorm,
    Bc3RgbaUnormSrgb,
    Bc4RUnorm,
    Bc5RgUnorm,
    Bc6hRgbUfloat,
    Bc7RgbaUnorm,
    Bc7RgbaUnormSrgb,
    Etc2Rgb8Unorm,
    Etc2Rgb8UnormSrgb,
    Etc2Rgba8Unorm,
    Etc2Rgba8UnormSrgb,
    EacR11Unorm,
    EacRg11Unorm,
    Astc4x4Unorm,
    Astc4x4UnormSrgb,
}

/// Block layout of a compressed format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompressedBlock {
    pub block_bytes: u32,
    pub block_width: u32,
    pub block_height: u32,
}

/// Static description of one canonical format
#[derive(Debug, Clone, Copy)]
pub struct TextureFormatDescriptor {
    pub format: TextureFormat,
    pub name: &'static str,
    /// `None` for uncompressed formats
    pub compressed: Option<CompressedBlock>,
    /// Bytes per texel for uncompressed formats, 0 otherwise
    pub texel_bytes: u32,
    pub can_generate_mipmaps: bool,
    pub has_alpha: bool,
    pub native: wgpu::TextureFormat,
    /// Device feature needed to sample the format
    pub required_features: Features,
}

impl TextureFormatDescriptor {
    /// Block layout, treating uncompressed formats as 1x1 blocks.
    pub fn block(&self) -> CompressedBlock {
        self.compressed.unwrap_or(CompressedBlock {
            block_bytes: self.texel_bytes,
            block_width: 1,
            block_height: 1,
        })
    }
}

const fn raw(
    format: TextureFormat,
    name: &'static str,
    texel_bytes: u32,
    has_alpha: bool,
    native: wgpu::TextureFormat,
) -> TextureFormatDescriptor {
    TextureFormatDescriptor {
        format,
        name,
        compressed: None,
        texel_bytes,
        can_generate_mipmaps: true,
        has_alpha,
        native,
        required_features: Features::empty(),
    }
}

const fn block(
    format: TextureFormat,
    name: &'static str,
    block_bytes: u32,
    has_alpha: bool,
    native: wgpu::TextureFormat,
    required_features: Features,
) -> TextureFormatDescriptor {
    TextureFormatDescriptor {
        format,
        name,
        compressed: Some(CompressedBlock {
            block_bytes,
            block_width: 4,
            block_height: 4,
        }),
        texel_bytes: 0,
        can_generate_mipmaps: false,
        has_alpha,
        native,
        required_features,
    }
}

const BC: Features = Features::TEXTURE_COMPRESSION_BC;
const ETC2: Features = Features::TEXTURE_COMPRESSION_ETC2;
const ASTC: Features = Features::TEXTURE_COMPRESSION_ASTC;

use wgpu::TextureFormat as Native;
use TextureFormat as F;

/// Format table, in `TextureFormat` declaration order.
static FORMATS: [TextureFormatDescriptor; 24] = [
    raw(F::R8Unorm, "r8unorm", 1, false, Native::R8Unorm),
    raw(F::Rg8Unorm, "rg8unorm", 2, false, Native::Rg8Unorm),
    raw(F::Rgba8Unorm, "rgba8unorm", 4, true, Native::Rgba8Unorm),
    raw(F::Rgba8UnormSrgb, "rgba8unorm-srgb", 4, true, Native::Rgba8UnormSrgb),
    raw(F::Bgra8Unorm, "bgra8unorm", 4, true, Native::Bgra8Unorm),
    raw(F::Bgra8UnormSrgb, "bgra8unorm-srgb", 4, true, Native::Bgra8UnormSrgb),
    raw(F::Rgba16Float, "rgba16float", 8, true, Native::Rgba16Float),
    block(F::Bc1RgbaUnorm, "bc1-rgba-unorm", 8, true, Native::Bc1RgbaUnorm, BC),
    block(F::Bc1RgbaUnormSrgb, "bc1-rgba-unorm-srgb", 8, true, Native::Bc1RgbaUnormSrgb, BC),
    block(F::Bc3RgbaUnorm, "bc3-rgba-unorm", 16, true, Native::Bc3RgbaUnorm, BC),
    block(F::Bc3RgbaUnormSrgb, "bc3-rgba-unorm-srgb", 16, true, Native::Bc3RgbaUnormSrgb, BC),
    block(F::Bc4RUnorm, "bc4-r-unorm", 8, false, Native::Bc4RUnorm, BC),
    block(F::Bc5RgUnorm, "bc5-rg-unorm", 16, false, Native::Bc5RgUnorm, BC),
    block(F::Bc6hRgbUfloat, "bc6h-rgb-ufloat", 16, false, Native::Bc6hRgbUfloat, BC),
    block(F::Bc7RgbaUnorm, "bc7-rgba-unorm", 16, true, Native::Bc7RgbaUnorm, BC),
    block(F::Bc7RgbaUnormSrgb, "bc7-rgba-unorm-srgb", 16, true, Native::Bc7RgbaUnormSrgb, BC),
    block(F::Etc2Rgb8Unorm, "etc2-rgb8unorm", 8, false, Native::Etc2Rgb8Unorm, ETC2),
    block(F::Etc2Rgb8UnormSrgb, "etc2-rgb8unorm-srgb", 8, false, Native::Etc2Rgb8UnormSrgb, ETC2),
    block(F::Etc2Rgba8Unorm, "etc2-rgba8unorm", 16, true, Native::Etc2Rgba8Unorm, ETC2),
    block(F::Etc2Rgba8UnormSrgb, "etc2-rgba8unorm-srgb", 16, true, Native::Etc2Rgba8UnormSrgb, ETC2),
    block(F::EacR11Unorm, "eac-r11unorm", 8, false, Native::EacR11Unorm, ETC2),
    block(F::EacRg11Unorm, "eac-rg11unorm", 16, false, Native::EacRg11Unorm, ETC2),
    block(
        F::Astc4x4Unorm,
        "astc-4x4-unorm",
        16,
        true,
        Native::Astc { block: AstcBlock::B4x4, channel: AstcChannel::Unorm },
        ASTC,
    ),
    block(
        F::Astc4x4UnormSrgb,
        "astc-4x4-unorm-srgb",
        16,
        true,
        Native::Astc { block: AstcBlock::B4x4, channel: AstcChannel::UnormSrgb },
        ASTC,
    ),
];

impl TextureFormat {
    /// All canonical formats, in table order
    pub fn all() -> impl Iterator<Item = TextureFormat> {
        FORMATS.iter().map(|d| d.format)
    }

    pub fn descriptor(self) -> &'static TextureFormatDescriptor {
        &FORMATS[self as usize]
    }

    /// Canonical name, e.g. `bc7-rgba-unorm-srgb`
    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    /// Look up a format by its canonical name (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim();
        FORMATS
            .iter()
            .find(|d| d.name.eq_ignore_ascii_case(name))
            .map(|d| d.format)
    }

    pub fn is_compressed(self) -> bool {
        self.descriptor().compressed.is_some()
    }

    pub fn can_generate_mipmaps(self) -> bool {
        self.descriptor().can_generate_mipmaps
    }

    pub fn has_alpha(self) -> bool {
        self.descriptor().has_alpha
    }

    pub fn native(self) -> wgpu::TextureFormat {
        self.descriptor().native
    }

    pub fn block(self) -> CompressedBlock {
        self.descriptor().block()
    }

    /// Bytes per row of blocks for a level `width` texels wide.
    pub fn row_pitch(self, width: u32) -> u32 {
        let block = self.block();
        width.div_ceil(block.block_width) * block.block_bytes
    }

    /// Number of block rows for a level `height` texels tall.
    pub fn block_rows(self, height: u32) -> u32 {
        height.div_ceil(self.block().block_height)
    }

    /// Tightly packed byte size of one slice of a `width` x `height` level.
    pub fn level_size(self, width: u32, height: u32) -> usize {
        self.row_pitch(width) as usize * self.block_rows(height) as usize
    }

    /// Formats whose required features are all present in `features`.
    pub fn supported_with(features: Features) -> Vec<TextureFormat> {
        FORMATS
            .iter()
            .filter(|d| features.contains(d.required_features))
            .map(|d| d.format)
            .collect()
    }
}

impl fmt::Display for TextureFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl From<TextureFormat> for &'static str {
    fn from(format: TextureFormat) -> Self {
        format.name()
    }
}

impl TryFrom<String> for TextureFormat {
    type Error = String;

    fn try_from(name: String) -> Result<Self, Self::Error> {
        TextureFormat::from_name(&name).ok_or_else(|| format!("unknown texture format '{}'", name))
    }
}
