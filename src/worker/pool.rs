//! Transcoding worker pool
//!
//! Workers are named OS threads fed through channels. Every request gets a
//! fresh correlation id and is recorded in the pending table before it is
//! sent; responses are matched back to their caller by id alone, so they may
//! arrive in any order.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::codec::{TranscodeInput, Transcoder, TranscoderFactory};
use crate::config::LoaderConfig;
use crate::data::TextureData;
use crate::error::{TextureError, TransportError, UsageError};
use crate::fetch::BlockingFetcher;
use crate::format::TextureFormat;
use crate::protocol::{
    CorrelationId, TranscodeOutcome, TranscodeRequest, TranscodeResponse, TranscodeSource,
};

type Responder = oneshot::Sender<Result<TextureData, TextureError>>;

/// Per-request options forwarded to the worker
#[derive(Debug, Clone, Default)]
pub struct TranscodeOptions {
    pub supported_formats: Vec<TextureFormat>,
    pub unpack_mipmaps: bool,
    pub extension: Option<String>,
}

struct PendingRequest {
    source: String,
    options: TranscodeOptions,
    responder: Responder,
}

/// State shared between the pool and its worker threads
struct Shared {
    pending: Mutex<HashMap<CorrelationId, PendingRequest>>,
    outstanding: AtomicUsize,
}

impl Shared {
    /// Route a worker response to the caller waiting on its id.
    fn complete(&self, response: TranscodeResponse) {
        let _ = self
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));

        let Some(pending) = self.pending.lock().remove(&response.id) else {
            warn!("Dropping response: {}", TransportError::UnknownCorrelationId(response.id));
            return;
        };

        let result = match response.outcome {
            TranscodeOutcome::Transcoded(texture) => texture.into_texture_data(),
            TranscodeOutcome::Failed { error } => {
                debug!("Transcode of {} failed: {}", pending.source, error);
                Err(TextureError::Transcode(error))
            }
        };

        if let Ok(data) = &result {
            debug!(
                "Request {} resolved: {} {}x{}, {} levels (unpack: {})",
                response.id,
                data.format(),
                data.width(),
                data.height(),
                data.level_count(),
                pending.options.unpack_mipmaps
            );
        }

        // The caller may have stopped waiting
        let _ = pending.responder.send(result);
    }
}

struct WorkerHandle {
    index: usize,
    sender: mpsc::Sender<TranscodeRequest>,
}

struct PoolState {
    workers: Vec<WorkerHandle>,
    cursor: usize,
    destroyed: bool,
}

/// Pending result of a submitted request
pub struct TranscodeTicket {
    id: CorrelationId,
    receiver: oneshot::Receiver<Result<TextureData, TextureError>>,
}

impl TranscodeTicket {
    pub fn id(&self) -> CorrelationId {
        self.id
    }

    pub async fn wait(self) -> Result<TextureData, TextureError> {
        self.receiver
            .await
            .unwrap_or_else(|_| Err(UsageError::Destroyed.into()))
    }
}

/// Elastic pool of transcoding workers
///
/// Starts with one worker and grows up to `max_workers` when every worker
/// already has a request in flight. Never shrinks.
pub struct WorkerPool {
    config: LoaderConfig,
    factory: Arc<dyn TranscoderFactory>,
    state: Mutex<PoolState>,
    shared: Arc<Shared>,
    next_id: AtomicU64,
}

impl WorkerPool {
    pub fn new(config: LoaderConfig, factory: Arc<dyn TranscoderFactory>) -> Result<Self, TextureError> {
        config.validate()?;

        let pool = Self {
            config,
            factory,
            state: Mutex::new(PoolState {
                workers: Vec::new(),
                cursor: 0,
                destroyed: false,
            }),
            shared: Arc::new(Shared {
                pending: Mutex::new(HashMap::new()),
                outstanding: AtomicUsize::new(0),
            }),
            next_id: AtomicU64::new(1),
        };

        {
            let mut state = pool.state.lock();
            pool.spawn_worker(&mut state)?;
        }

        info!(
            "Transcoding pool started (max {} workers)",
            pool.config.max_workers
        );
        Ok(pool)
    }

    /// Dispatch a request to a worker. The returned ticket resolves when the
    /// worker responds or the pool is destroyed.
    pub fn submit(
        &self,
        source: TranscodeSource,
        options: TranscodeOptions,
    ) -> Result<TranscodeTicket, TextureError> {
        let mut state = self.state.lock();
        if state.destroyed {
            return Err(UsageError::Destroyed.into());
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (responder, receiver) = oneshot::channel();
        let description = source.describe();
        self.shared.pending.lock().insert(
            id,
            PendingRequest {
                source: description.clone(),
                options: options.clone(),
                responder,
            },
        );

        let worker = match self.select_worker(&mut state) {
            Ok(worker) => worker,
            Err(e) => {
                self.abandon(id);
                return Err(e);
            }
        };

        let request = TranscodeRequest {
            id,
            source,
            supported_formats: options.supported_formats,
            unpack_mipmaps: options.unpack_mipmaps,
            extension: options.extension,
        };

        debug!(
            "Dispatching request {} ({}) to worker {}",
            id, description, state.workers[worker].index
        );
        if state.workers[worker].sender.send(request).is_err() {
            self.abandon(id);
            return Err(TextureError::transcode(format!(
                "worker {} is no longer running",
                state.workers[worker].index
            )));
        }

        Ok(TranscodeTicket { id, receiver })
    }

    /// Counts the new request as outstanding and picks the worker for it,
    /// spawning one when every existing worker is busy.
    fn select_worker(&self, state: &mut PoolState) -> Result<usize, TextureError> {
        let in_flight = self.shared.outstanding.fetch_add(1, Ordering::SeqCst);
        let size = state.workers.len();

        if in_flight >= size && size < self.config.max_workers {
            return self.spawn_worker(state);
        }

        let index = state.cursor % size;
        state.cursor = state.cursor.wrapping_add(1);
        Ok(index)
    }

    /// Undo the bookkeeping of a request that never reached a worker.
    fn abandon(&self, id: CorrelationId) {
        self.shared.pending.lock().remove(&id);
        let _ = self
            .shared
            .outstanding
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
    }

    fn spawn_worker(&self, state: &mut PoolState) -> Result<usize, TextureError> {
        let index = state.workers.len();
        let (sender, receiver) = mpsc::channel();
        let factory = Arc::clone(&self.factory);
        let shared = Arc::clone(&self.shared);
        let timeout = self.config.http_timeout;

        thread::Builder::new()
            .name(format!("{}-{}", self.config.worker_thread_prefix, index))
            .spawn(move || run_worker(index, receiver, factory, shared, timeout))
            .map_err(|e| TextureError::transcode(format!("failed to spawn worker: {}", e)))?;

        state.workers.push(WorkerHandle { index, sender });
        info!("Spawned transcoding worker {} (pool size {})", index, index + 1);
        Ok(index)
    }

    /// Close every worker channel and reject all pending requests.
    ///
    /// Returns the number of requests rejected. Only the first call has any
    /// effect.
    pub fn destroy(&self) -> usize {
        let mut state = self.state.lock();
        if state.destroyed {
            return 0;
        }
        state.destroyed = true;
        let workers = std::mem::take(&mut state.workers);
        drop(state);

        let pending: Vec<_> = self.shared.pending.lock().drain().collect();
        let rejected = pending.len();
        for (_, request) in pending {
            let _ = request.responder.send(Err(UsageError::Destroyed.into()));
        }
        self.shared.outstanding.store(0, Ordering::SeqCst);

        info!(
            "Transcoding pool destroyed: {} workers stopped, {} pending requests rejected",
            workers.len(),
            rejected
        );
        rejected
    }

    pub fn is_destroyed(&self) -> bool {
        self.state.lock().destroyed
    }

    pub fn worker_count(&self) -> usize {
        self.state.lock().workers.len()
    }

    /// Requests dispatched and not yet answered
    pub fn outstanding(&self) -> usize {
        self.shared.outstanding.load(Ordering::SeqCst)
    }

    pub fn pending_count(&self) -> usize {
        self.shared.pending.lock().len()
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.destroy();
    }
}

fn run_worker(
    index: usize,
    receiver: mpsc::Receiver<TranscodeRequest>,
    factory: Arc<dyn TranscoderFactory>,
    shared: Arc<Shared>,
    http_timeout: Duration,
) {
    // Created on the first request; an init failure is kept and reported
    // for every request this worker handles.
    let mut transcoder: Option<Result<Box<dyn Transcoder>, String>> = None;
    let mut fetcher = BlockingFetcher::new(http_timeout);

    while let Ok(request) = receiver.recv() {
        let id = request.id;
        let codec = transcoder.get_or_insert_with(|| {
            debug!("Worker {} initializing codec", index);
            panic::catch_unwind(AssertUnwindSafe(|| factory.create()))
                .unwrap_or_else(|payload| Err(panic_message("codec initialization", payload)))
        });

        let response = match codec {
            Ok(codec) => {
                let codec = &**codec;
                let fetcher = &mut fetcher;
                panic::catch_unwind(AssertUnwindSafe(move || handle_request(codec, fetcher, request)))
                    .unwrap_or_else(|payload| {
                        let message = panic_message("transcode", payload);
                        warn!("Worker {} recovered from panic on request {}: {}", index, id, message);
                        TranscodeResponse::failed(id, message)
                    })
            }
            Err(error) => TranscodeResponse::failed(id, error.clone()),
        };
        shared.complete(response);
    }

    debug!("Worker {} exiting", index);
}

fn panic_message(stage: &str, payload: Box<dyn Any + Send>) -> String {
    let detail = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string());
    format!("{} panicked: {}", stage, detail)
}

fn handle_request(
    transcoder: &dyn Transcoder,
    fetcher: &mut BlockingFetcher,
    request: TranscodeRequest,
) -> TranscodeResponse {
    let id = request.id;
    let bytes = match request.source {
        TranscodeSource::Buffer(bytes) => bytes,
        TranscodeSource::Url(url) => match fetcher.fetch(&url) {
            Ok(bytes) => bytes,
            Err(e) => return TranscodeResponse::failed(id, e.to_string()),
        },
    };

    let input = TranscodeInput {
        bytes: &bytes,
        supported_formats: &request.supported_formats,
        unpack_mipmaps: request.unpack_mipmaps,
        extension: request.extension.as_deref(),
    };

    match transcoder.transcode(input) {
        Ok(texture) => TranscodeResponse::transcoded(id, texture),
        Err(error) => TranscodeResponse::failed(id, error),
    }
}
