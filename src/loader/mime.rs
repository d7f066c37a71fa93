//! MIME type keys for loader dispatch

use std::fmt;

/// Enumerated MIME key a loader strategy is registered under
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MimeType {
    Png,
    Jpeg,
    Webp,
    Gif,
    Bmp,
    Basis,
    Ktx2,
    Dds,
    Other(String),
}

impl MimeType {
    /// Parse a declared MIME type. Unknown types are kept as [`MimeType::Other`].
    pub fn parse(mime: &str) -> Self {
        let mime = mime.trim().to_ascii_lowercase();
        match mime.as_str() {
            "image/png" => MimeType::Png,
            "image/jpeg" | "image/jpg" => MimeType::Jpeg,
            "image/webp" => MimeType::Webp,
            "image/gif" => MimeType::Gif,
            "image/bmp" | "image/x-ms-bmp" => MimeType::Bmp,
            "image/basis" => MimeType::Basis,
            "image/ktx2" => MimeType::Ktx2,
            "image/vnd-ms.dds" | "image/vnd.ms-dds" | "image/x-dds" => MimeType::Dds,
            _ => MimeType::Other(mime),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            MimeType::Png => "image/png",
            MimeType::Jpeg => "image/jpeg",
            MimeType::Webp => "image/webp",
            MimeType::Gif => "image/gif",
            MimeType::Bmp => "image/bmp",
            MimeType::Basis => "image/basis",
            MimeType::Ktx2 => "image/ktx2",
            MimeType::Dds => "image/vnd-ms.dds",
            MimeType::Other(mime) => mime,
        }
    }

    /// Detect from magic bytes
    pub fn sniff(bytes: &[u8]) -> Option<Self> {
        if bytes.starts_with(&[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A]) {
            return Some(MimeType::Png);
        }
        if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
            return Some(MimeType::Jpeg);
        }
        if bytes.starts_with(b"RIFF") && bytes.len() >= 12 && &bytes[8..12] == b"WEBP" {
            return Some(MimeType::Webp);
        }
        if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
            return Some(MimeType::Gif);
        }
        if bytes.starts_with(b"BM") && bytes.len() >= 14 {
            return Some(MimeType::Bmp);
        }
        if bytes.starts_with(b"DDS ") {
            return Some(MimeType::Dds);
        }
        if bytes.starts_with(&[0xAB, 0x4B, 0x54, 0x58, 0x20, 0x32, 0x30, 0xBB]) {
            return Some(MimeType::Ktx2);
        }
        if bytes.starts_with(b"sB") {
            return Some(MimeType::Basis);
        }
        None
    }

    pub fn from_extension(extension: &str) -> Option<Self> {
        match extension.trim_start_matches('.').to_ascii_lowercase().as_str() {
            "png" => Some(MimeType::Png),
            "jpg" | "jpeg" => Some(MimeType::Jpeg),
            "webp" => Some(MimeType::Webp),
            "gif" => Some(MimeType::Gif),
            "bmp" => Some(MimeType::Bmp),
            "basis" => Some(MimeType::Basis),
            "ktx2" => Some(MimeType::Ktx2),
            "dds" => Some(MimeType::Dds),
            _ => None,
        }
    }

    /// Compressed-texture containers handled by the worker pool
    pub fn is_container(&self) -> bool {
        matches!(self, MimeType::Basis | MimeType::Ktx2 | MimeType::Dds)
    }
}

impl fmt::Display for MimeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
