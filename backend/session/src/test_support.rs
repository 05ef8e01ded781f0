//! Scripted runtime and probe for deterministic session tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Result, bail};
use async_trait::async_trait;
use visionex_core::{
    AccelerationProbe, AdapterInfo, ImageData, ModelInputs, ModelLoadOptions, Processor,
    ProgressSink, RuntimeProgress, TokenSequence, VisionModel, VisionRuntime, prompt,
};
use visionex_storage::{InMemoryKvStore, ModelCacheRegistry};

use crate::session::{ModelSession, SessionOptions};

#[derive(Clone, Copy)]
pub enum Answer {
    /// A well-formed reply.
    Text(&'static str),
    /// Model output with no assistant marker.
    Raw(&'static str),
    Fail(&'static str),
}

#[derive(Default)]
pub struct ScriptedRuntime {
    answers: HashMap<String, Answer>,
    load_delay: Option<Duration>,
    fail_first_loads: usize,
    progress_steps: Vec<f64>,
    processor_loads: AtomicUsize,
    model_loads: AtomicUsize,
    calls: Arc<CallLog>,
}

/// What the scripted runtime and its models were asked to do.
#[derive(Default)]
struct CallLog {
    loads: Mutex<Vec<String>>,
    token_limits: Mutex<Vec<u32>>,
    active_generates: AtomicUsize,
    peak_generates: AtomicUsize,
}

impl ScriptedRuntime {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, prompt: &str, answer: Answer) -> Self {
        self.answers.insert(prompt.to_string(), answer);
        self
    }

    pub fn load_delay(mut self, delay: Duration) -> Self {
        self.load_delay = Some(delay);
        self
    }

    pub fn fail_first_loads(mut self, n: usize) -> Self {
        self.fail_first_loads = n;
        self
    }

    pub fn progress_steps(mut self, steps: Vec<f64>) -> Self {
        self.progress_steps = steps;
        self
    }

    pub fn processor_loads(&self) -> usize {
        self.processor_loads.load(Ordering::SeqCst)
    }

    pub fn model_loads(&self) -> usize {
        self.model_loads.load(Ordering::SeqCst)
    }

    /// `processor:<id>` / `model:<id>` in call order.
    pub fn load_calls(&self) -> Vec<String> {
        self.calls.loads.lock().unwrap().clone()
    }

    /// Ids of model loads that ran to completion, in order.
    pub fn loaded_models(&self) -> Vec<String> {
        self.load_calls()
            .iter()
            .filter_map(|call| call.strip_prefix("model:").map(str::to_string))
            .collect()
    }

    /// `max_new_tokens` of every generate call.
    pub fn token_limits(&self) -> Vec<u32> {
        self.calls.token_limits.lock().unwrap().clone()
    }

    pub fn peak_concurrent_generates(&self) -> usize {
        self.calls.peak_generates.load(Ordering::SeqCst)
    }
}

struct ScriptedProcessor;

#[async_trait]
impl Processor for ScriptedProcessor {
    async fn prepare(&self, image: &ImageData, prompt: &str) -> Result<ModelInputs> {
        Ok(ModelInputs {
            prompt: prompt.to_string(),
            images: vec![image.clone()],
        })
    }

    fn decode(&self, tokens: &TokenSequence) -> Result<String> {
        Ok(tokens.0.concat())
    }
}

struct ScriptedModel {
    answers: HashMap<String, Answer>,
    calls: Arc<CallLog>,
}

#[async_trait]
impl VisionModel for ScriptedModel {
    async fn generate(&self, inputs: ModelInputs, max_new_tokens: u32) -> Result<TokenSequence> {
        self.calls.token_limits.lock().unwrap().push(max_new_tokens);
        let active = self.calls.active_generates.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls.peak_generates.fetch_max(active, Ordering::SeqCst);
        for _ in 0..3 {
            tokio::task::yield_now().await;
        }
        self.calls.active_generates.fetch_sub(1, Ordering::SeqCst);

        let answer = self
            .answers
            .iter()
            .find(|(question, _)| inputs.prompt.contains(&format!("\n{question}{}", prompt::ASSISTANT_MARKER)))
            .map(|(_, answer)| *answer)
            .unwrap_or(Answer::Text("unscripted"));
        match answer {
            Answer::Text(text) => Ok(TokenSequence(vec![inputs.prompt, text.to_string()])),
            Answer::Raw(text) => Ok(TokenSequence(vec![text.to_string()])),
            Answer::Fail(message) => bail!("{message}"),
        }
    }
}

#[async_trait]
impl VisionRuntime for ScriptedRuntime {
    async fn load_processor(&self, model_id: &str, progress: ProgressSink) -> Result<Arc<dyn Processor>> {
        self.processor_loads.fetch_add(1, Ordering::SeqCst);
        self.calls.loads.lock().unwrap().push(format!("processor:{model_id}"));
        progress(RuntimeProgress::Initiate { file: "preprocessor_config.json".into() });
        Ok(Arc::new(ScriptedProcessor))
    }

    async fn load_model(
        &self,
        model_id: &str,
        _options: &ModelLoadOptions,
        progress: ProgressSink,
    ) -> Result<Arc<dyn VisionModel>> {
        let attempt = self.model_loads.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.load_delay {
            tokio::time::sleep(delay).await;
        }
        for step in &self.progress_steps {
            progress(RuntimeProgress::Progress {
                file: "model.onnx".into(),
                progress: *step,
            });
        }
        if attempt < self.fail_first_loads {
            bail!("connection reset while fetching weights");
        }
        self.calls.loads.lock().unwrap().push(format!("model:{model_id}"));
        progress(RuntimeProgress::Ready);
        Ok(Arc::new(ScriptedModel {
            answers: self.answers.clone(),
            calls: Arc::clone(&self.calls),
        }))
    }
}

pub struct FakeProbe {
    supported: bool,
    adapter: bool,
}

impl FakeProbe {
    pub fn supported() -> Self {
        Self { supported: true, adapter: true }
    }

    pub fn unsupported() -> Self {
        Self { supported: false, adapter: false }
    }

    pub fn no_adapter() -> Self {
        Self { supported: true, adapter: false }
    }
}

#[async_trait]
impl AccelerationProbe for FakeProbe {
    fn has_acceleration_support(&self) -> bool {
        self.supported
    }

    async fn request_adapter(&self) -> Option<AdapterInfo> {
        self.adapter.then(|| AdapterInfo {
            name: "fake".into(),
            description: "scripted test adapter".into(),
        })
    }
}

/// A session over the given fakes with a fresh in-memory cache.
pub fn session_with(
    runtime: ScriptedRuntime,
    probe: FakeProbe,
) -> (ModelSession, Arc<ScriptedRuntime>) {
    let runtime = Arc::new(runtime);
    let cache = ModelCacheRegistry::new(Arc::new(InMemoryKvStore::new()));
    let session = ModelSession::new(runtime.clone(), Arc::new(probe), cache, SessionOptions::default());
    (session, runtime)
}
