//! Compressed-container loading through the worker pool

use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;
use tracing::debug;

use super::{LoadContext, LoadedTexture, LoaderStrategy};
use crate::config::LoaderConfig;
use crate::error::{TextureError, UsageError};
use crate::protocol::TranscodeSource;
use crate::worker::{TranscodeOptions, TranscoderFactory, WorkerPool};

/// Worker pool created on the first transcode request
///
/// Shared between the transcode strategy and its owner, which destroys it.
pub struct LazyPool {
    config: LoaderConfig,
    factory: Arc<dyn TranscoderFactory>,
    state: Mutex<LazyState>,
}

enum LazyState {
    Idle,
    Running(Arc<WorkerPool>),
    Destroyed,
}

impl LazyPool {
    pub fn new(config: LoaderConfig, factory: Arc<dyn TranscoderFactory>) -> Self {
        Self {
            config,
            factory,
            state: Mutex::new(LazyState::Idle),
        }
    }

    pub fn get(&self) -> Result<Arc<WorkerPool>, TextureError> {
        let mut state = self.state.lock();
        match &*state {
            LazyState::Running(pool) => return Ok(Arc::clone(pool)),
            LazyState::Destroyed => return Err(UsageError::Destroyed.into()),
            LazyState::Idle => {}
        }

        let pool = Arc::new(WorkerPool::new(self.config.clone(), Arc::clone(&self.factory))?);
        *state = LazyState::Running(Arc::clone(&pool));
        Ok(pool)
    }

    /// The pool, if one has been started
    pub fn current(&self) -> Option<Arc<WorkerPool>> {
        match &*self.state.lock() {
            LazyState::Running(pool) => Some(Arc::clone(pool)),
            _ => None,
        }
    }

    /// Destroy the pool (if started) and refuse to start another.
    /// Returns the number of pending requests rejected.
    pub fn destroy(&self) -> usize {
        let previous = std::mem::replace(&mut *self.state.lock(), LazyState::Destroyed);
        match previous {
            LazyState::Running(pool) => pool.destroy(),
            _ => 0,
        }
    }
}

/// Strategy for Basis, KTX2 and DDS containers
pub struct TranscodeLoader {
    pool: Arc<LazyPool>,
}

impl TranscodeLoader {
    pub fn new(pool: Arc<LazyPool>) -> Self {
        Self { pool }
    }

    async fn run(
        &self,
        source: TranscodeSource,
        context: &LoadContext,
    ) -> Result<LoadedTexture, TextureError> {
        let options = TranscodeOptions {
            supported_formats: context.supported_formats.clone(),
            unpack_mipmaps: context.unpack_mipmaps,
            extension: context.extension.clone(),
        };

        let ticket = self.pool.get()?.submit(source, options)?;
        debug!("Waiting on transcode request {}", ticket.id());
        ticket.wait().await.map(LoadedTexture::Data)
    }
}

impl LoaderStrategy for TranscodeLoader {
    fn load_from_url<'a>(
        &'a self,
        url: &'a str,
        context: &'a LoadContext,
    ) -> BoxFuture<'a, Result<LoadedTexture, TextureError>> {
        self.run(TranscodeSource::Url(url.to_string()), context).boxed()
    }

    fn load_from_buffer<'a>(
        &'a self,
        bytes: Vec<u8>,
        context: &'a LoadContext,
    ) -> BoxFuture<'a, Result<LoadedTexture, TextureError>> {
        self.run(TranscodeSource::Buffer(bytes), context).boxed()
    }
}
