//! Loader dispatch by MIME type
//!
//! A [`LoaderRegistry`] maps each [`MimeType`] to a [`LoaderStrategy`].
//! Strategies are created on first use and then shared by every MIME type
//! registered to them.

mod decode;
mod mime;
mod transcode;

pub use decode::ImageLoader;
pub use mime::MimeType;
pub use transcode::{LazyPool, TranscodeLoader};

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use futures::future::BoxFuture;
use image::RgbaImage;
use tracing::debug;

use crate::data::TextureData;
use crate::error::{TextureError, UsageError};
use crate::fetch::extension_of;
use crate::format::TextureFormat;

/// What a strategy produced
#[derive(Debug)]
pub enum LoadedTexture {
    /// Transcoded levels ready for upload
    Data(TextureData),
    /// Decoded image, uploaded as RGBA8
    Bitmap(RgbaImage),
}

/// Per-call parameters handed to a strategy
#[derive(Debug, Clone, Default)]
pub struct LoadContext {
    pub supported_formats: Vec<TextureFormat>,
    /// Ask transcoders for every stored mip level
    pub unpack_mipmaps: bool,
    /// Extension hint without the dot
    pub extension: Option<String>,
}

pub trait LoaderStrategy: Send + Sync {
    fn load_from_url<'a>(
        &'a self,
        url: &'a str,
        context: &'a LoadContext,
    ) -> BoxFuture<'a, Result<LoadedTexture, TextureError>>;

    fn load_from_buffer<'a>(
        &'a self,
        bytes: Vec<u8>,
        context: &'a LoadContext,
    ) -> BoxFuture<'a, Result<LoadedTexture, TextureError>>;
}

type StrategyFactory = Box<dyn Fn() -> Arc<dyn LoaderStrategy> + Send + Sync>;

struct StrategySlot {
    name: &'static str,
    factory: StrategyFactory,
    instance: OnceLock<Arc<dyn LoaderStrategy>>,
}

impl StrategySlot {
    fn get(&self) -> Arc<dyn LoaderStrategy> {
        Arc::clone(self.instance.get_or_init(|| {
            debug!("Instantiating {} loader", self.name);
            (self.factory)()
        }))
    }
}

/// Fixed MIME type to strategy mapping
pub struct LoaderRegistry {
    slots: Vec<StrategySlot>,
    by_mime: HashMap<MimeType, usize>,
    wildcard: Option<usize>,
}

impl LoaderRegistry {
    pub fn builder() -> LoaderRegistryBuilder {
        LoaderRegistryBuilder {
            registry: LoaderRegistry {
                slots: Vec::new(),
                by_mime: HashMap::new(),
                wildcard: None,
            },
        }
    }

    /// Strategy for `mime`, falling back to the wildcard strategy.
    pub fn resolve(&self, mime: &MimeType) -> Result<Arc<dyn LoaderStrategy>, UsageError> {
        let slot = self
            .by_mime
            .get(mime)
            .copied()
            .or(self.wildcard)
            .ok_or_else(|| UsageError::NoLoader {
                mime: mime.to_string(),
            })?;
        Ok(self.slots[slot].get())
    }

    /// Number of strategies created so far
    pub fn instantiated(&self) -> usize {
        self.slots
            .iter()
            .filter(|slot| slot.instance.get().is_some())
            .count()
    }
}

pub struct LoaderRegistryBuilder {
    registry: LoaderRegistry,
}

impl LoaderRegistryBuilder {
    fn push<F>(&mut self, name: &'static str, factory: F) -> usize
    where
        F: Fn() -> Arc<dyn LoaderStrategy> + Send + Sync + 'static,
    {
        self.registry.slots.push(StrategySlot {
            name,
            factory: Box::new(factory),
            instance: OnceLock::new(),
        });
        self.registry.slots.len() - 1
    }

    /// Register one strategy for every type in `mimes`.
    pub fn register<F>(mut self, name: &'static str, mimes: &[MimeType], factory: F) -> Self
    where
        F: Fn() -> Arc<dyn LoaderStrategy> + Send + Sync + 'static,
    {
        let slot = self.push(name, factory);
        for mime in mimes {
            self.registry.by_mime.insert(mime.clone(), slot);
        }
        self
    }

    /// Strategy used for types with no explicit mapping
    pub fn wildcard<F>(mut self, name: &'static str, factory: F) -> Self
    where
        F: Fn() -> Arc<dyn LoaderStrategy> + Send + Sync + 'static,
    {
        let slot = self.push(name, factory);
        self.registry.wildcard = Some(slot);
        self
    }

    /// Send unmapped types to the strategy already registered for `mime`.
    pub fn fallback_to(mut self, mime: &MimeType) -> Self {
        self.registry.wildcard = self.registry.by_mime.get(mime).copied();
        self
    }

    pub fn build(self) -> LoaderRegistry {
        self.registry
    }
}

/// MIME type for a URL: declared type wins, then the extension.
pub fn mime_for_url(url: &str, declared: Option<&str>) -> MimeType {
    if let Some(declared) = declared {
        return MimeType::parse(declared);
    }
    extension_of(url)
        .and_then(|ext| MimeType::from_extension(&ext))
        .unwrap_or_else(|| MimeType::Other("application/octet-stream".to_string()))
}

/// MIME type for a buffer: declared type wins, then magic bytes, then the
/// filename hint.
pub fn mime_for_buffer(bytes: &[u8], declared: Option<&str>, filename: Option<&str>) -> MimeType {
    if let Some(declared) = declared {
        return MimeType::parse(declared);
    }
    MimeType::sniff(bytes)
        .or_else(|| {
            filename
                .and_then(extension_of)
                .and_then(|ext| MimeType::from_extension(&ext))
        })
        .unwrap_or_else(|| MimeType::Other("application/octet-stream".to_string()))
}
