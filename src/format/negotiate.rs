//! Format negotiation against a device's supported list

use super::TextureFormat;
use serde::{Deserialize, Serialize};

/// Uncompressed format every device can sample.
pub const BASELINE_FORMAT: TextureFormat = TextureFormat::Rgba8Unorm;

/// Transcode targets for sources with alpha, best first.
pub const ALPHA_PREFERENCE: &[TextureFormat] = &[
    TextureFormat::Astc4x4Unorm,
    TextureFormat::Bc7RgbaUnorm,
    TextureFormat::Bc3RgbaUnorm,
    TextureFormat::Etc2Rgba8Unorm,
];

/// Transcode targets for opaque sources, best first.
pub const OPAQUE_PREFERENCE: &[TextureFormat] = &[
    TextureFormat::Astc4x4Unorm,
    TextureFormat::Bc7RgbaUnorm,
    TextureFormat::Etc2Rgb8Unorm,
    TextureFormat::Bc1RgbaUnorm,
];

/// Linear/sRGB pairs
const COLOR_SPACE_PAIRS: &[(TextureFormat, TextureFormat)] = &[
    (TextureFormat::Rgba8Unorm, TextureFormat::Rgba8UnormSrgb),
    (TextureFormat::Bgra8Unorm, TextureFormat::Bgra8UnormSrgb),
    (TextureFormat::Bc1RgbaUnorm, TextureFormat::Bc1RgbaUnormSrgb),
    (TextureFormat::Bc3RgbaUnorm, TextureFormat::Bc3RgbaUnormSrgb),
    (TextureFormat::Bc7RgbaUnorm, TextureFormat::Bc7RgbaUnormSrgb),
    (TextureFormat::Etc2Rgb8Unorm, TextureFormat::Etc2Rgb8UnormSrgb),
    (TextureFormat::Etc2Rgba8Unorm, TextureFormat::Etc2Rgba8UnormSrgb),
    (TextureFormat::Astc4x4Unorm, TextureFormat::Astc4x4UnormSrgb),
];

/// Requested color space of a texture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorSpace {
    /// Keep whatever the source declares
    #[default]
    Default,
    Srgb,
    Linear,
}

/// Best representable format for `requested` on a device supporting `supported`.
pub fn negotiate(requested: TextureFormat, supported: &[TextureFormat]) -> TextureFormat {
    if supported.contains(&requested) {
        requested
    } else {
        BASELINE_FORMAT
    }
}

/// Pick the transcode target for a container that declares alpha presence.
///
/// Falls back to the raw baseline only when no compressed candidate is
/// supported.
pub fn select_transcode_target(has_alpha: bool, supported: &[TextureFormat]) -> TextureFormat {
    let preference = if has_alpha {
        ALPHA_PREFERENCE
    } else {
        OPAQUE_PREFERENCE
    };

    preference
        .iter()
        .copied()
        .find(|candidate| supported.contains(candidate))
        .unwrap_or(BASELINE_FORMAT)
}

/// Map `format` to its sRGB or linear twin. Unpaired formats pass through.
pub fn apply_color_space(format: TextureFormat, space: ColorSpace) -> TextureFormat {
    match space {
        ColorSpace::Default => format,
        ColorSpace::Srgb => COLOR_SPACE_PAIRS
            .iter()
            .find(|(linear, _)| *linear == format)
            .map(|(_, srgb)| *srgb)
            .unwrap_or(format),
        ColorSpace::Linear => COLOR_SPACE_PAIRS
            .iter()
            .find(|(_, srgb)| *srgb == format)
            .map(|(linear, _)| *linear)
            .unwrap_or(format),
    }
}

/// Number of levels in a full mip chain: `floor(log2(max(w, h))) + 1`.
pub fn mip_chain_length(width: u32, height: u32) -> u32 {
    let largest = width.max(height).max(1);
    u32::BITS - largest.leading_zeros()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supported_format_is_kept() {
        for format in TextureFormat::all() {
            let supported = [TextureFormat::Rgba8Unorm, format];
            assert_eq!(negotiate(format, &supported), format);
        }
    }

    #[test]
    fn test_unsupported_format_falls_back_to_baseline() {
        let supported = [TextureFormat::Rgba8Unorm, TextureFormat::Bc1RgbaUnorm];
        for format in TextureFormat::all().filter(|f| !supported.contains(f)) {
            assert_eq!(negotiate(format, &supported), BASELINE_FORMAT);
        }
    }

    #[test]
    fn test_opaque_on_raw_only_device_selects_baseline() {
        let supported = [TextureFormat::Rgba8Unorm];
        assert_eq!(select_transcode_target(false, &supported), TextureFormat::Rgba8Unorm);
        assert_eq!(select_transcode_target(true, &supported), TextureFormat::Rgba8Unorm);
    }

    #[test]
    fn test_alpha_and_opaque_preferences_differ() {
        let supported = [
            TextureFormat::Rgba8Unorm,
            TextureFormat::Etc2Rgb8Unorm,
            TextureFormat::Etc2Rgba8Unorm,
            TextureFormat::Bc1RgbaUnorm,
        ];
        assert_eq!(select_transcode_target(false, &supported), TextureFormat::Etc2Rgb8Unorm);
        assert_eq!(select_transcode_target(true, &supported), TextureFormat::Etc2Rgba8Unorm);
    }

    #[test]
    fn test_highest_quality_wins() {
        let supported = TextureFormat::supported_with(
            wgpu::Features::TEXTURE_COMPRESSION_BC | wgpu::Features::TEXTURE_COMPRESSION_ASTC,
        );
        assert_eq!(select_transcode_target(true, &supported), TextureFormat::Astc4x4Unorm);
    }

    #[test]
    fn test_color_space_pairs_are_bidirectional() {
        assert_eq!(
            apply_color_space(TextureFormat::Bc7RgbaUnorm, ColorSpace::Srgb),
            TextureFormat::Bc7RgbaUnormSrgb
        );
        assert_eq!(
            apply_color_space(TextureFormat::Bc7RgbaUnormSrgb, ColorSpace::Linear),
            TextureFormat::Bc7RgbaUnorm
        );
        assert_eq!(
            apply_color_space(TextureFormat::Rgba8UnormSrgb, ColorSpace::Srgb),
            TextureFormat::Rgba8UnormSrgb
        );
        assert_eq!(
            apply_color_space(TextureFormat::Bc4RUnorm, ColorSpace::Srgb),
            TextureFormat::Bc4RUnorm
        );
        assert_eq!(
            apply_color_space(TextureFormat::Bc1RgbaUnormSrgb, ColorSpace::Default),
            TextureFormat::Bc1RgbaUnormSrgb
        );
    }

    #[test]
    fn test_mip_chain_length() {
        assert_eq!(mip_chain_length(257, 100), 9);
        assert_eq!(mip_chain_length(64, 64), 7);
        assert_eq!(mip_chain_length(1, 1), 1);
        assert_eq!(mip_chain_length(4096, 16), 13);
        assert_eq!(mip_chain_length(0, 0), 1);

        for size in 1..2048u32 {
            let expected = (size as f32).log2().floor() as u32 + 1;
            assert_eq!(mip_chain_length(size, 1), expected, "size {}", size);
        }
    }
}
