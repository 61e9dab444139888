//! 记录状态目录快照的传输引擎桩

use async_trait::async_trait;
use sftpsync_lib::error::EngineError;
use sftpsync_lib::transfer::{TransferEngine, TransferRequest};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// 每次传输时统计状态目录中处于 downloading 的记录数
pub struct StubEngine {
    status_dir: PathBuf,
    delay: Duration,
    failing: HashSet<String>,
    calls: AtomicUsize,
    max_downloading: AtomicUsize,
}

impl StubEngine {
    pub fn new(status_dir: impl Into<PathBuf>, delay: Duration) -> Self {
        Self {
            status_dir: status_dir.into(),
            delay,
            failing: HashSet::new(),
            calls: AtomicUsize::new(0),
            max_downloading: AtomicUsize::new(0),
        }
    }

    pub fn failing_on(mut self, source: &str) -> Self {
        self.failing.insert(source.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn max_downloading(&self) -> usize {
        self.max_downloading.load(Ordering::SeqCst)
    }

    fn count_downloading(&self) -> usize {
        let Ok(entries) = std::fs::read_dir(&self.status_dir) else {
            return 0;
        };
        entries
            .filter_map(Result::ok)
            .filter(|e| e.path().extension().is_some_and(|ext| ext == "json"))
            .filter_map(|e| std::fs::read(e.path()).ok())
            .filter_map(|data| serde_json::from_slice::<serde_json::Value>(&data).ok())
            .filter(|v| v["status"] == "downloading")
            .count()
    }
}

#[async_trait]
impl TransferEngine for StubEngine {
    async fn transfer(&self, request: &TransferRequest) -> Result<(), EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);

        let downloading = self.count_downloading();
        self.max_downloading.fetch_max(downloading, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        if self.failing.contains(&request.source) {
            return Err(EngineError::Exit {
                verb: request.op.verb().to_string(),
                status: "exit status: 3".to_string(),
                stderr: "directory not found".to_string(),
            });
        }
        Ok(())
    }

    async fn obscure(&self, password: &str) -> Result<String, EngineError> {
        Ok(format!("obscured-{}", password.len()))
    }

    async fn list(&self, _remote: &str, _config_path: &Path) -> Result<Vec<String>, EngineError> {
        Ok(Vec::new())
    }

    fn name(&self) -> &str {
        "stub"
    }
}
