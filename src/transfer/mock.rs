//! 测试用引擎：记录每次调用、统计并发数，可按源路径模拟失败或 panic

use super::{TransferEngine, TransferRequest};
use crate::error::EngineError;
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

/// 调用时看到的临时配置
#[derive(Debug, Clone)]
pub(crate) struct ConfigSeen {
    pub path: PathBuf,
    pub content: String,
}

#[derive(Default)]
pub(crate) struct MockEngine {
    calls: Mutex<Vec<TransferRequest>>,
    configs: Mutex<Vec<ConfigSeen>>,
    failing_sources: HashSet<String>,
    panicking_sources: HashSet<String>,
    delay: Duration,
    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    pub fn failing_for(source: &str) -> Self {
        Self {
            failing_sources: HashSet::from([source.to_string()]),
            ..Self::default()
        }
    }

    pub fn panicking_for(source: &str) -> Self {
        Self {
            panicking_sources: HashSet::from([source.to_string()]),
            ..Self::default()
        }
    }

    pub fn obscured(password: &str) -> String {
        password.chars().rev().collect()
    }

    pub fn calls(&self) -> Vec<TransferRequest> {
        self.calls.lock().unwrap().clone()
    }

    pub fn configs_seen(&self) -> Vec<ConfigSeen> {
        self.configs.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TransferEngine for MockEngine {
    async fn transfer(&self, request: &TransferRequest) -> Result<(), EngineError> {
        request.validate()?;

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        self.calls.lock().unwrap().push(request.clone());
        if let Ok(content) = std::fs::read_to_string(&request.config_path) {
            self.configs.lock().unwrap().push(ConfigSeen {
                path: request.config_path.clone(),
                content,
            });
        }

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.panicking_sources.contains(&request.source) {
            panic!("engine crashed on {}", request.source);
        }

        if self.failing_sources.contains(&request.source) {
            return Err(EngineError::Exit {
                verb: request.op.verb().to_string(),
                status: "exit status: 1".to_string(),
                stderr: "directory not found".to_string(),
            });
        }
        Ok(())
    }

    async fn obscure(&self, password: &str) -> Result<String, EngineError> {
        Ok(Self::obscured(password))
    }

    async fn list(&self, remote: &str, _config_path: &Path) -> Result<Vec<String>, EngineError> {
        Ok(vec![format!("{}/a.txt", remote), format!("{}/b/", remote)])
    }

    fn name(&self) -> &str {
        "mock"
    }
}
