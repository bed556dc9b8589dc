use crate::types::{Notice, ProbeResult};
use std::sync::Arc;
use tokio::sync::Mutex;

/// Live display hook. Called while the sink lock is held, so keep it quick.
pub trait ScanObserver: Send + Sync {
    fn on_line(&self, line: &str);

    fn on_notice(&self, _notice: &Notice) {}
}

/// Observer that drops everything; used when results are only read back via `snapshot`.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullObserver;

impl ScanObserver for NullObserver {
    fn on_line(&self, _line: &str) {}
}

/// Ordered, thread-safe collector of formatted result lines.
///
/// Appending to the retained list and forwarding to the observer happen under one lock,
/// so the snapshot and the live display always agree on line order.
#[derive(Clone)]
pub struct ResultSink {
    lines: Arc<Mutex<Vec<String>>>,
    observer: Arc<dyn ScanObserver>,
}

impl ResultSink {
    pub fn new(observer: Arc<dyn ScanObserver>) -> Self {
        Self {
            lines: Arc::new(Mutex::new(Vec::new())),
            observer,
        }
    }

    pub async fn emit(&self, result: &ProbeResult) {
        let line = result.to_line();
        let mut guard = self.lines.lock().await;
        self.observer.on_line(&line);
        guard.push(line);
    }

    /// Lifecycle notices go to the observer only; they are not part of the exported lines.
    pub async fn notice(&self, notice: Notice) {
        let _guard = self.lines.lock().await;
        self.observer.on_notice(&notice);
    }

    pub async fn snapshot(&self) -> Vec<String> {
        self.lines.lock().await.clone()
    }

    pub async fn clear(&self) {
        self.lines.lock().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.lines.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.lines.lock().await.is_empty()
    }
}

impl Default for ResultSink {
    fn default() -> Self {
        Self::new(Arc::new(NullObserver))
    }
}
