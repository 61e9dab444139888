//! 子命令实现

pub mod download;
pub mod status;
pub mod transfer;
pub mod watch;

use crate::error::SetupError;
use crate::transfer::{Credentials, SftpRemote};
use crate::AppState;
use clap::Args;
use std::path::PathBuf;

/// SFTP 连接参数，未指定的项使用配置文件中的值
#[derive(Debug, Clone, Default, Args)]
pub struct ConnectionArgs {
    /// SFTP 用户名
    #[arg(long, env = "SFTP_USERNAME")]
    pub user: Option<String>,

    /// SFTP 密码
    #[arg(long, env = "SFTP_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// 私钥路径
    #[arg(long, env = "SFTP_CERT_PATH")]
    pub key_file: Option<PathBuf>,

    /// 服务器地址
    #[arg(long)]
    pub host: Option<String>,

    /// 服务器端口
    #[arg(long)]
    pub port: Option<u16>,
}

impl ConnectionArgs {
    pub fn credentials(&self) -> Result<Credentials, SetupError> {
        Credentials::new(
            self.user.clone().unwrap_or_default(),
            self.password.clone(),
            self.key_file.clone(),
        )
    }

    pub fn remote(&self, state: &AppState) -> SftpRemote {
        let mut remote = state.sftp_remote();
        if let Some(host) = &self.host {
            remote.host = host.clone();
        }
        if let Some(port) = self.port {
            remote.port = port;
        }
        remote
    }
}

/// 创建目录，失败视为启动错误
pub(crate) fn ensure_dir(path: &std::path::Path) -> Result<(), SetupError> {
    std::fs::create_dir_all(path).map_err(|source| SetupError::CreateDir {
        path: path.to_path_buf(),
        source,
    })
}
