//! Ordinary image decoding (PNG, JPEG, WebP, GIF, BMP)

use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use image::RgbaImage;
use tracing::{debug, warn};

use super::{LoadContext, LoadedTexture, LoaderStrategy};
use crate::error::TextureError;
use crate::fetch;

/// Decodes images with the `image` crate on tokio's blocking pool
pub struct ImageLoader {
    client: reqwest::Client,
}

impl ImageLoader {
    pub fn new(http_timeout: Duration) -> Self {
        let client = match reqwest::Client::builder().timeout(http_timeout).build() {
            Ok(client) => client,
            Err(e) => {
                warn!("HTTP client with {:?} timeout unavailable, using defaults: {}", http_timeout, e);
                reqwest::Client::new()
            }
        };
        Self { client }
    }

    async fn decode(bytes: Vec<u8>) -> Result<RgbaImage, TextureError> {
        tokio::task::spawn_blocking(move || -> Result<RgbaImage, TextureError> {
            let image = image::load_from_memory(&bytes)?;
            debug!("Decoded {}x{} image", image.width(), image.height());
            Ok(image.to_rgba8())
        })
        .await
        .map_err(|e| TextureError::Decode(format!("decode task failed: {}", e)))?
    }
}

impl LoaderStrategy for ImageLoader {
    fn load_from_url<'a>(
        &'a self,
        url: &'a str,
        _context: &'a LoadContext,
    ) -> BoxFuture<'a, Result<LoadedTexture, TextureError>> {
        async move {
            let bytes = fetch::fetch(&self.client, url).await?;
            Self::decode(bytes).await.map(LoadedTexture::Bitmap)
        }
        .boxed()
    }

    fn load_from_buffer<'a>(
        &'a self,
        bytes: Vec<u8>,
        _context: &'a LoadContext,
    ) -> BoxFuture<'a, Result<LoadedTexture, TextureError>> {
        async move { Self::decode(bytes).await.map(LoadedTexture::Bitmap) }.boxed()
    }
}
