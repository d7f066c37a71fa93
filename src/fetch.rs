//! Source byte retrieval for URLs and local paths
//!
//! `http://` and `https://` go through reqwest; `file://` URLs and plain
//! paths are read from disk.

use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::error::TextureError;

pub fn is_remote(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

fn local_path(url: &str) -> PathBuf {
    PathBuf::from(url.strip_prefix("file://").unwrap_or(url))
}

/// Lowercased file extension of a URL or path, ignoring query and fragment.
pub fn extension_of(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let name = path.rsplit('/').next().unwrap_or(path);
    Path::new(name)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
}

fn fetch_error(url: &str, message: impl ToString) -> TextureError {
    TextureError::Fetch {
        url: url.to_string(),
        message: message.to_string(),
    }
}

/// Fetch `url` from the async side of the loader.
pub async fn fetch(client: &reqwest::Client, url: &str) -> Result<Vec<u8>, TextureError> {
    if !is_remote(url) {
        return tokio::fs::read(local_path(url))
            .await
            .map_err(|e| fetch_error(url, e));
    }

    let response = client
        .get(url)
        .send()
        .await
        .map_err(|e| fetch_error(url, e))?;

    if !response.status().is_success() {
        return Err(fetch_error(url, format!("HTTP {}", response.status())));
    }

    let bytes = response.bytes().await.map_err(|e| fetch_error(url, e))?;
    debug!("Fetched {} ({} bytes)", url, bytes.len());
    Ok(bytes.to_vec())
}

/// Blocking HTTP client, created on first remote fetch of a worker thread
pub struct BlockingFetcher {
    timeout: Duration,
    client: Option<reqwest::blocking::Client>,
}

impl BlockingFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            client: None,
        }
    }

    /// Fetch `url` from a worker thread.
    pub fn fetch(&mut self, url: &str) -> Result<Vec<u8>, TextureError> {
        if !is_remote(url) {
            return std::fs::read(local_path(url)).map_err(|e| fetch_error(url, e));
        }

        let client = match self.client.take() {
            Some(client) => client,
            None => reqwest::blocking::Client::builder()
                .timeout(self.timeout)
                .build()
                .map_err(|e| fetch_error(url, e))?,
        };
        let client = self.client.insert(client);

        let response = client.get(url).send().map_err(|e| fetch_error(url, e))?;
        if !response.status().is_success() {
            return Err(fetch_error(url, format!("HTTP {}", response.status())));
        }

        let bytes = response.bytes().map_err(|e| fetch_error(url, e))?;
        debug!("Fetched {} ({} bytes)", url, bytes.len());
        Ok(bytes.to_vec())
    }
}
