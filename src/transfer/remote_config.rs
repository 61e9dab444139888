//! 临时远程配置 - 为每个任务生成独立的 rclone 配置文件，任务结束即删除

use super::TransferEngine;
use crate::error::{EngineError, SetupError};
use scopeguard::ScopeGuard;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

/// 生成的配置中远程的名称
pub const REMOTE_NAME: &str = "sftp";

/// 拼接 `sftp:<path>` 形式的远程地址
pub fn remote_path(path: &str) -> String {
    format!("{}:{}", REMOTE_NAME, path)
}

/// SFTP 服务器地址
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SftpRemote {
    pub host: String,
    pub port: u16,
}

impl SftpRemote {
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// 认证信息，原样交给引擎，密码与私钥至少提供一个
#[derive(Clone)]
pub struct Credentials {
    user: String,
    password: Option<String>,
    key_file: Option<PathBuf>,
}

impl Credentials {
    pub fn new(
        user: impl Into<String>,
        password: Option<String>,
        key_file: Option<PathBuf>,
    ) -> Result<Self, SetupError> {
        let user = user.into();
        if user.trim().is_empty() {
            return Err(SetupError::MissingUser);
        }

        // 空字符串等同于未设置（环境变量常见情况）
        let password = password.filter(|p| !p.is_empty());
        let key_file = key_file.filter(|k| !k.as_os_str().is_empty());
        if password.is_none() && key_file.is_none() {
            return Err(SetupError::MissingCredentials);
        }

        Ok(Self {
            user,
            password,
            key_file,
        })
    }
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("key_file", &self.key_file)
            .finish()
    }
}

/// 生成配置文件内容，密码经引擎混淆后写入
pub async fn render(
    engine: &dyn TransferEngine,
    remote: &SftpRemote,
    credentials: &Credentials,
) -> Result<String, EngineError> {
    let mut content = format!(
        "[{}]\ntype = sftp\nhost = {}\nuser = {}\nport = {}\n",
        REMOTE_NAME, remote.host, credentials.user, remote.port
    );

    if let Some(password) = &credentials.password {
        let obscured = engine.obscure(password).await?;
        content.push_str(&format!("pass = {}\n", obscured));
    }

    if let Some(key_file) = &credentials.key_file {
        content.push_str(&format!("key_file = {}\n", key_file.display()));
    }

    Ok(content)
}

/// 作用域内有效的临时配置文件，离开作用域（包括出错、future 被丢弃、panic 展开）时删除
pub struct ScopedConfig {
    path: ScopeGuard<PathBuf, fn(PathBuf)>,
}

impl ScopedConfig {
    /// 在 `dir` 下创建 `rclone_<trace_id>.conf`
    pub async fn create(
        engine: &dyn TransferEngine,
        remote: &SftpRemote,
        credentials: &Credentials,
        dir: &Path,
        trace_id: &str,
    ) -> Result<Self, EngineError> {
        let content = render(engine, remote, credentials).await?;

        // 先建立守卫再写入，写到一半失败也会清理
        let path = scopeguard::guard(
            dir.join(format!("rclone_{}.conf", trace_id)),
            remove_config as fn(PathBuf),
        );

        write_private(&path, content.as_bytes())
            .await
            .map_err(|source| EngineError::ConfigWrite {
                path: path.to_path_buf(),
                source,
            })?;

        debug!("已生成临时配置: {}", path.display());
        Ok(Self { path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// 以 0600 权限写入（配置中包含凭据）
async fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = tokio::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    options.mode(0o600);

    let mut file = options.open(path).await?;
    file.write_all(data).await?;
    file.flush().await
}

fn remove_config(path: PathBuf) {
    match std::fs::remove_file(&path) {
        Ok(()) => debug!("已删除临时配置: {}", path.display()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!("删除临时配置失败 {}: {}", path.display(), e),
    }
}
