//! 正在处理的路径集合
//!
//! 同一路径同时只允许一个处理任务。`claim` 返回的守卫在离开作用域时移除路径，
//! 处理成功、失败、跳过或 panic 都会释放。

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

#[derive(Debug, Clone, Default)]
pub struct InFlight {
    paths: Arc<Mutex<HashSet<PathBuf>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// 登记路径，已在处理中时返回 None
    pub fn claim(&self, path: &Path) -> Option<InFlightGuard> {
        if !self.lock().insert(path.to_path_buf()) {
            return None;
        }
        Some(InFlightGuard {
            set: self.clone(),
            path: path.to_path_buf(),
        })
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.lock().contains(path)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    // 集合操作不会在持锁时 panic，中毒后继续使用内部数据
    fn lock(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.paths.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// 路径占用守卫
#[derive(Debug)]
pub struct InFlightGuard {
    set: InFlight,
    path: PathBuf,
}

impl InFlightGuard {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.set.lock().remove(&self.path);
    }
}
