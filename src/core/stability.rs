//! 文件稳定性检测 - 判断文件是否已写入完成
//!
//! 两次采样文件大小，间隔一个固定时间窗口，大小不变即视为稳定。
//! 这是启发式判断：写入方恰好暂停一个窗口后再继续写入的情况无法识别。

use std::path::Path;
use std::time::Duration;
use tracing::debug;

/// 文件稳定性检测器
#[derive(Debug, Clone)]
pub struct StabilityDetector {
    interval: Duration,
}

impl StabilityDetector {
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// 文件在两次采样时都存在且大小一致时返回 true，任何 stat 失败都视为不稳定
    pub async fn is_stable(&self, path: &Path) -> bool {
        let Some(before) = sample_size(path).await else {
            return false;
        };

        tokio::time::sleep(self.interval).await;

        let Some(after) = sample_size(path).await else {
            return false;
        };

        before == after
    }
}

async fn sample_size(path: &Path) -> Option<u64> {
    match tokio::fs::metadata(path).await {
        Ok(metadata) => Some(metadata.len()),
        Err(e) => {
            debug!("获取文件信息失败 {}: {}", path.display(), e);
            None
        }
    }
}
