//! Load progress: raw runtime notifications in, de-duplicated percentages out.

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::broadcast;
use tracing::trace;
use visionex_core::{ProgressSink, RuntimeProgress};

/// One progress update published to subscribers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LoadProgress {
    pub model_id: String,
    pub percent: u8,
}

/// Per-load filter. Emitted percentages are strictly increasing, so repeats
/// and regressions (a second file restarting at 0%) are dropped.
pub(crate) struct ProgressTracker {
    model_id: String,
    last: Mutex<Option<u8>>,
    current: Arc<AtomicU8>,
    tx: broadcast::Sender<LoadProgress>,
}

impl ProgressTracker {
    pub(crate) fn new(
        model_id: impl Into<String>,
        current: Arc<AtomicU8>,
        tx: broadcast::Sender<LoadProgress>,
    ) -> Arc<Self> {
        current.store(0, Ordering::Relaxed);
        Arc::new(Self {
            model_id: model_id.into(),
            last: Mutex::new(None),
            current,
            tx,
        })
    }

    /// Wrap this tracker as the callback handed to the runtime.
    pub(crate) fn sink(self: &Arc<Self>) -> ProgressSink {
        let tracker = Arc::clone(self);
        Arc::new(move |event| tracker.observe(event))
    }

    pub(crate) fn observe(&self, event: RuntimeProgress) {
        if let RuntimeProgress::Progress { file, progress } = event {
            if !progress.is_finite() {
                return;
            }
            trace!(file = %file, progress, "Runtime progress");
            self.emit(progress.round().clamp(0.0, 100.0) as u8);
        }
    }

    pub(crate) fn complete(&self) {
        self.emit(100);
    }

    fn emit(&self, percent: u8) {
        let mut last = self.last.lock().unwrap_or_else(PoisonError::into_inner);
        if last.is_some_and(|prev| percent <= prev) {
            return;
        }
        *last = Some(percent);
        self.current.store(percent, Ordering::Relaxed);
        // No subscribers is fine.
        let _ = self.tx.send(LoadProgress {
            model_id: self.model_id.clone(),
            percent,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn progress(file: &str, progress: f64) -> RuntimeProgress {
        RuntimeProgress::Progress { file: file.into(), progress }
    }

    fn drain(rx: &mut broadcast::Receiver<LoadProgress>) -> Vec<u8> {
        let mut seen = Vec::new();
        while let Ok(p) = rx.try_recv() {
            seen.push(p.percent);
        }
        seen
    }

    #[test]
    fn dedupes_and_stays_monotonic() {
        let (tx, mut rx) = broadcast::channel(64);
        let current = Arc::new(AtomicU8::new(0));
        let tracker = ProgressTracker::new("m", current.clone(), tx);
        let sink = tracker.sink();

        sink(RuntimeProgress::Initiate { file: "processor.json".into() });
        sink(progress("a", 0.2));
        sink(progress("a", 10.4));
        sink(progress("a", 10.49));
        sink(progress("a", 55.5));
        sink(progress("b", 3.0));
        sink(progress("b", f64::NAN));
        sink(progress("b", 250.0));
        sink(RuntimeProgress::Done { file: "b".into() });
        tracker.complete();

        assert_eq!(drain(&mut rx), vec![0, 10, 56, 100]);
        assert_eq!(current.load(Ordering::Relaxed), 100);
    }

    #[test]
    fn new_tracker_resets_current() {
        let (tx, _rx) = broadcast::channel(4);
        let current = Arc::new(AtomicU8::new(77));
        let _tracker = ProgressTracker::new("m", current.clone(), tx);
        assert_eq!(current.load(Ordering::Relaxed), 0);
    }
}
