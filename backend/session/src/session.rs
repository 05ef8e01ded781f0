//! Model Session: owns one loaded processor + model pair and its lifecycle.
//!
//! State machine: `Unloaded -> Loading -> Ready | Failed`, and
//! `Ready | Failed -> Loading` on a new load request. At most one
//! acquisition runs at a time. Concurrent `load` calls for the same model
//! join the in-flight attempt and receive its outcome; a load for a
//! different model queues behind the current one.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use logging::{EventLogger, ExtractionEvent};
use serde::Serialize;
use tokio::sync::{Mutex, broadcast};
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, info, warn};
use visionex_core::{
    AccelerationProbe, ExtractError, ImageData, LoadError, ModelLoadOptions, NO_ANSWER_FALLBACK,
    Processor, VisionModel, VisionRuntime, extract_answer, format_chat_prompt,
};
use visionex_storage::ModelCacheRegistry;

use crate::progress::{LoadProgress, ProgressTracker};

/// Upper bound on generated tokens per answer.
pub const DEFAULT_MAX_NEW_TOKENS: u32 = 256;

const PROGRESS_BUFFER: usize = 128;

const UNSUPPORTED_MESSAGE: &str = "Hardware-accelerated inference is not supported in this \
    environment. Use a host with a supported GPU runtime.";
const NO_ADAPTER_MESSAGE: &str =
    "Hardware acceleration is supported, but no compatible adapter was found.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SessionStatus {
    Unloaded,
    Loading,
    Ready,
    Failed,
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::Loading => "loading",
            Self::Ready => "ready",
            Self::Failed => "failed",
        };
        f.write_str(s)
    }
}

/// Point-in-time view of the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub status: SessionStatus,
    pub model_id: Option<String>,
    pub progress_percent: u8,
    pub last_error: Option<LoadError>,
}

#[derive(Debug, Clone)]
pub struct SessionOptions {
    pub load: ModelLoadOptions,
    pub max_new_tokens: u32,
}

impl Default for SessionOptions {
    fn default() -> Self {
        let dtype = BTreeMap::from([
            ("embed_tokens".to_string(), "fp16".to_string()),
            ("vision_encoder".to_string(), "q4".to_string()),
            ("decoder_model_merged".to_string(), "q4".to_string()),
        ]);
        Self {
            load: ModelLoadOptions { dtype, device: "gpu".to_string() },
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
        }
    }
}

struct LoadedModel {
    processor: Arc<dyn Processor>,
    model: Arc<dyn VisionModel>,
}

struct SessionState {
    status: SessionStatus,
    model_id: Option<String>,
    last_error: Option<LoadError>,
    loaded: Option<Arc<LoadedModel>>,
}

type SharedLoad = Shared<BoxFuture<'static, Result<(), LoadError>>>;

struct InFlight {
    generation: u64,
    model_id: String,
    future: SharedLoad,
}

struct SessionInner {
    runtime: Arc<dyn VisionRuntime>,
    probe: Arc<dyn AccelerationProbe>,
    cache: ModelCacheRegistry,
    options: SessionOptions,
    state: RwLock<SessionState>,
    progress: Arc<AtomicU8>,
    progress_tx: broadcast::Sender<LoadProgress>,
    // Pending loads in start order; at most one per model id.
    inflight: Mutex<Vec<InFlight>>,
    next_generation: AtomicU64,
    // The runtime gives no guarantee about concurrent generate calls.
    generate_lock: Mutex<()>,
}

/// Cheap to clone; clones share the same underlying session.
#[derive(Clone)]
pub struct ModelSession {
    inner: Arc<SessionInner>,
}

impl ModelSession {
    pub fn new(
        runtime: Arc<dyn VisionRuntime>,
        probe: Arc<dyn AccelerationProbe>,
        cache: ModelCacheRegistry,
        options: SessionOptions,
    ) -> Self {
        let (progress_tx, _) = broadcast::channel(PROGRESS_BUFFER);
        Self {
            inner: Arc::new(SessionInner {
                runtime,
                probe,
                cache,
                options,
                state: RwLock::new(SessionState {
                    status: SessionStatus::Unloaded,
                    model_id: None,
                    last_error: None,
                    loaded: None,
                }),
                progress: Arc::new(AtomicU8::new(0)),
                progress_tx,
                inflight: Mutex::new(Vec::new()),
                next_generation: AtomicU64::new(0),
                generate_lock: Mutex::new(()),
            }),
        }
    }

    /// Whether `model_id` has been fully loaded before, in any session.
    pub fn is_cached(&self, model_id: &str) -> bool {
        self.inner.cache.is_cached(model_id)
    }

    pub fn status(&self) -> SessionStatus {
        self.inner.read_state().status
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        let state = self.inner.read_state();
        SessionSnapshot {
            status: state.status,
            model_id: state.model_id.clone(),
            progress_percent: self.inner.progress.load(Ordering::Relaxed),
            last_error: state.last_error.clone(),
        }
    }

    /// Receive progress for loads started after this call.
    pub fn subscribe_progress(&self) -> broadcast::Receiver<LoadProgress> {
        self.inner.progress_tx.subscribe()
    }

    /// Same as [`subscribe_progress`](Self::subscribe_progress) as a stream.
    /// Updates missed by a slow consumer are skipped.
    pub fn progress_stream(&self) -> impl Stream<Item = LoadProgress> + Send + 'static {
        BroadcastStream::new(self.subscribe_progress()).filter_map(|item| item.ok())
    }

    /// Load `model_id`, coalescing with an in-flight or queued load of the
    /// same model. A load for a model with no pending attempt queues behind
    /// the most recent one.
    pub async fn load(&self, model_id: &str) -> Result<(), LoadError> {
        let future = {
            let mut pending = self.inner.inflight.lock().await;
            if let Some(existing) = pending.iter().find(|f| f.model_id == model_id) {
                debug!(model_id, "Joining pending model load");
                existing.future.clone()
            } else {
                let previous = pending.last().map(|f| f.future.clone());
                let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
                let inner = Arc::clone(&self.inner);
                let id = model_id.to_string();
                let future = async move {
                    if let Some(previous) = previous {
                        let _ = previous.await;
                    }
                    let outcome = inner.acquire(&id).await;
                    inner.finish_flight(generation).await;
                    outcome
                }
                .boxed()
                .shared();
                pending.push(InFlight {
                    generation,
                    model_id: model_id.to_string(),
                    future: future.clone(),
                });
                future
            }
        };
        future.await
    }

    /// Ask one question about `image`. Requires a ready session.
    ///
    /// Returns [`NO_ANSWER_FALLBACK`] when the model's output has no
    /// assistant reply instead of failing.
    pub async fn extract(&self, image: &ImageData, prompt: &str) -> Result<String, ExtractError> {
        let loaded = self.inner.ready_model().ok_or(ExtractError::NotReady)?;
        let _turn = self.inner.generate_lock.lock().await;
        debug!(prompt, ?image, "Extracting data");

        let formatted = format_chat_prompt(prompt);
        let decoded = async {
            let inputs = loaded.processor.prepare(image, &formatted).await?;
            let tokens = loaded
                .model
                .generate(inputs, self.inner.options.max_new_tokens)
                .await?;
            loaded.processor.decode(&tokens)
        }
        .await
        .map_err(|e| {
            warn!(error = %e, "Extraction failed");
            ExtractError::failure(format!("{e:#}"))
        })?;

        let answer = extract_answer(&decoded).unwrap_or(NO_ANSWER_FALLBACK);
        debug!(answer, "Extraction result");
        Ok(answer.to_string())
    }
}

impl SessionInner {
    fn read_state(&self) -> std::sync::RwLockReadGuard<'_, SessionState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_state(&self) -> std::sync::RwLockWriteGuard<'_, SessionState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn ready_model(&self) -> Option<Arc<LoadedModel>> {
        let state = self.read_state();
        match state.status {
            SessionStatus::Ready => state.loaded.clone(),
            _ => None,
        }
    }

    async fn finish_flight(&self, generation: u64) {
        self.inflight.lock().await.retain(|f| f.generation != generation);
    }

    async fn acquire(&self, model_id: &str) -> Result<(), LoadError> {
        {
            let mut state = self.write_state();
            state.status = SessionStatus::Loading;
            state.model_id = Some(model_id.to_string());
            state.last_error = None;
            state.loaded = None;
        }
        let started = Instant::now();
        let tracker = ProgressTracker::new(model_id, self.progress.clone(), self.progress_tx.clone());
        EventLogger::log_event(model_id, ExtractionEvent::ModelLoadStarted {
            model_id: model_id.to_string(),
        });

        let outcome = match self.check_environment().await {
            Ok(()) => self.fetch(model_id, &tracker).await,
            Err(e) => Err(e),
        };

        match outcome {
            Ok(loaded) => {
                tracker.complete();
                if let Err(e) = self.cache.mark_cached(model_id) {
                    warn!(model_id, error = %e, "Failed to persist model cache flag");
                }
                {
                    let mut state = self.write_state();
                    state.status = SessionStatus::Ready;
                    state.loaded = Some(Arc::new(loaded));
                }
                let elapsed_ms = started.elapsed().as_millis() as u64;
                info!(model_id, elapsed_ms, "Model and processor loaded");
                EventLogger::log_event(model_id, ExtractionEvent::ModelLoaded {
                    model_id: model_id.to_string(),
                    elapsed_ms,
                });
                Ok(())
            }
            Err(err) => {
                {
                    let mut state = self.write_state();
                    state.status = SessionStatus::Failed;
                    state.last_error = Some(err.clone());
                }
                EventLogger::log_event(model_id, ExtractionEvent::ModelLoadFailed {
                    model_id: model_id.to_string(),
                    error_msg: err.to_string(),
                });
                Err(err)
            }
        }
    }

    async fn check_environment(&self) -> Result<(), LoadError> {
        if !self.probe.has_acceleration_support() {
            return Err(LoadError::UnsupportedEnvironment(UNSUPPORTED_MESSAGE.to_string()));
        }
        match self.probe.request_adapter().await {
            Some(adapter) => {
                info!(adapter = %adapter.name, description = %adapter.description, "Acceleration adapter available");
                Ok(())
            }
            None => Err(LoadError::UnsupportedEnvironment(NO_ADAPTER_MESSAGE.to_string())),
        }
    }

    async fn fetch(
        &self,
        model_id: &str,
        tracker: &Arc<ProgressTracker>,
    ) -> Result<LoadedModel, LoadError> {
        let fetched = async {
            info!(model_id, "Loading processor");
            let processor = self.runtime.load_processor(model_id, tracker.sink()).await?;
            info!(model_id, device = %self.options.load.device, "Loading model");
            let model = self
                .runtime
                .load_model(model_id, &self.options.load, tracker.sink())
                .await?;
            anyhow::Ok(LoadedModel { processor, model })
        }
        .await;
        fetched.map_err(|e| {
            warn!(model_id, error = %e, "Error loading model");
            LoadError::failure(format!("{e:#}"))
        })
    }
}
