//! In-memory texture data, independent of any GPU API
//!
//! A [`TextureData`] is an ordered list of mip levels; each level holds one
//! [`Slice`] per depth layer, array layer or cube face. Slices are zero-copy
//! views into a shared backing buffer.

use bytes::Bytes;
use tracing::debug;

use crate::error::{TextureError, UsageError};
use crate::format::{mip_chain_length, TextureFormat};

/// One depth/array/face element of a mip level
#[derive(Debug, Clone)]
pub struct Slice {
    data: Bytes,
    byte_offset: usize,
}

impl Slice {
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Offset of this view inside the buffer it was cut from
    pub fn byte_offset(&self) -> usize {
        self.byte_offset
    }

    pub fn byte_length(&self) -> usize {
        self.data.len()
    }
}

/// A single mip level
#[derive(Debug, Clone)]
pub struct TextureLevel {
    index: u32,
    width: u32,
    height: u32,
    slices: Vec<Option<Slice>>,
}

impl TextureLevel {
    fn new(index: u32, width: u32, height: u32) -> Self {
        Self {
            index,
            width,
            height,
            slices: Vec::new(),
        }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Override the default `base >> index` dimensions
    pub fn set_size(&mut self, width: u32, height: u32) {
        self.width = width.max(1);
        self.height = height.max(1);
    }

    /// Bind `slice` to `byte_length` bytes of `buffer` starting at `byte_offset`.
    ///
    /// A slice index can be set once per level.
    pub fn set_slice(
        &mut self,
        slice: u32,
        buffer: &Bytes,
        byte_offset: usize,
        byte_length: usize,
    ) -> Result<(), UsageError> {
        let index = slice as usize;
        if matches!(self.slices.get(index), Some(Some(_))) {
            return Err(UsageError::SliceAlreadySet {
                level: self.index,
                slice,
            });
        }

        let end = byte_offset.saturating_add(byte_length);
        if end > buffer.len() {
            return Err(UsageError::SliceOutOfBounds {
                level: self.index,
                slice,
                end,
                len: buffer.len(),
            });
        }

        if self.slices.len() <= index {
            self.slices.resize(index + 1, None);
        }
        self.slices[index] = Some(Slice {
            data: buffer.slice(byte_offset..end),
            byte_offset,
        });
        Ok(())
    }

    pub fn slice(&self, slice: u32) -> Option<&Slice> {
        self.slices.get(slice as usize).and_then(Option::as_ref)
    }

    /// Highest slice index set plus one
    pub fn slice_count(&self) -> u32 {
        self.slices.len() as u32
    }

    /// Set slices with their index, in index order
    pub fn slices(&self) -> impl Iterator<Item = (u32, &Slice)> {
        self.slices
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|s| (i as u32, s)))
    }
}

/// Size and level count of the GPU texture a [`TextureData`] becomes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureLayout {
    /// Width rounded up to the format's block width
    pub width: u32,
    /// Height rounded up to the format's block height
    pub height: u32,
    pub layers: u32,
    pub mip_level_count: u32,
    /// Levels beyond the supplied ones that must be generated
    pub generate_mipmaps: bool,
}

/// Decoded or transcoded texture contents
#[derive(Debug, Clone)]
pub struct TextureData {
    format: TextureFormat,
    width: u32,
    height: u32,
    depth: u32,
    cube: bool,
    levels: Vec<TextureLevel>,
}

impl TextureData {
    pub fn new(format: TextureFormat, width: u32, height: u32) -> Self {
        Self {
            format,
            width: width.max(1),
            height: height.max(1),
            depth: 1,
            cube: false,
            levels: Vec::new(),
        }
    }

    pub fn with_depth(mut self, depth: u32) -> Self {
        self.depth = depth.max(1);
        self
    }

    pub fn with_cube(mut self, cube: bool) -> Self {
        self.cube = cube;
        self
    }

    /// Single-level texture whose one slice is the whole `buffer`
    pub fn from_single_slice(
        format: TextureFormat,
        width: u32,
        height: u32,
        buffer: Bytes,
    ) -> Result<Self, UsageError> {
        let mut data = Self::new(format, width, height);
        let len = buffer.len();
        data.level_mut(0).set_slice(0, &buffer, 0, len)?;
        Ok(data)
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn set_format(&mut self, format: TextureFormat) {
        self.format = format;
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn is_cube(&self) -> bool {
        self.cube
    }

    /// Level `index`, creating it (and any missing levels before it) on first access.
    pub fn level_mut(&mut self, index: u32) -> &mut TextureLevel {
        while self.levels.len() <= index as usize {
            let n = self.levels.len() as u32;
            let width = self.width.checked_shr(n).unwrap_or(0).max(1);
            let height = self.height.checked_shr(n).unwrap_or(0).max(1);
            self.levels.push(TextureLevel::new(n, width, height));
        }
        &mut self.levels[index as usize]
    }

    pub fn level(&self, index: u32) -> Option<&TextureLevel> {
        self.levels.get(index as usize)
    }

    pub fn levels(&self) -> &[TextureLevel] {
        &self.levels
    }

    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }

    /// Shorthand for `level_mut(level).set_slice(...)`
    pub fn set_slice(
        &mut self,
        level: u32,
        slice: u32,
        buffer: &Bytes,
        byte_offset: usize,
        byte_length: usize,
    ) -> Result<(), UsageError> {
        self.level_mut(level)
            .set_slice(slice, buffer, byte_offset, byte_length)
    }

    /// Number of layers the GPU texture needs
    pub fn layer_count(&self) -> u32 {
        self.levels
            .iter()
            .map(TextureLevel::slice_count)
            .max()
            .unwrap_or(0)
            .max(self.depth)
    }

    /// Descriptor of the GPU texture this data uploads into.
    pub fn layout(&self, generate_mipmaps: bool) -> TextureLayout {
        let block = self.format.block();
        let width = self.width.div_ceil(block.block_width) * block.block_width;
        let height = self.height.div_ceil(block.block_height) * block.block_height;
        let supplied = self.level_count();

        let (mip_level_count, generate) = if supplied > 1 {
            (supplied, false)
        } else if generate_mipmaps && self.format.can_generate_mipmaps() {
            let full = mip_chain_length(self.width, self.height);
            (full, full > 1)
        } else {
            (1, false)
        };

        TextureLayout {
            width,
            height,
            layers: self.layer_count(),
            mip_level_count,
            generate_mipmaps: generate,
        }
    }

    /// Check that every level has all of its slices, each large enough to
    /// upload. Runs before any GPU call is made.
    pub fn validate(&self) -> Result<(), TextureError> {
        if self.levels.is_empty() {
            return Err(TextureError::transcode("texture data has no levels"));
        }

        let layers = self.layer_count();
        for level in &self.levels {
            for slice in 0..layers {
                let Some(data) = level.slice(slice) else {
                    return Err(UsageError::MissingSlice {
                        level: level.index,
                        slice,
                    }
                    .into());
                };

                let needed = self.format.level_size(level.width, level.height);
                if data.byte_length() < needed {
                    return Err(TextureError::transcode(format!(
                        "level {} slice {} holds {} bytes, {} {}x{} needs {}",
                        level.index,
                        slice,
                        data.byte_length(),
                        self.format,
                        level.width,
                        level.height,
                        needed
                    )));
                }
            }
        }

        debug!(
            "Validated {} {}x{} with {} levels, {} layers",
            self.format,
            self.width,
            self.height,
            self.levels.len(),
            layers
        );
        Ok(())
    }
}
