//! 下载完成后的概要日志

use crate::core::task::TaskStatus;
use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

const KB: u64 = 1024;
const MB: u64 = 1024 * KB;
const GB: u64 = 1024 * MB;

/// 文件列表中路径的最大显示宽度
const MAX_PATH_WIDTH: usize = 80;

/// 下载目录中的单个文件
#[derive(Debug, Clone)]
pub struct SummaryEntry {
    pub path: String,
    pub size: u64,
    pub modified: DateTime<Utc>,
}

/// 格式化文件大小
pub fn format_size(size: u64) -> String {
    if size > GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size > MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size > KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} B", size)
    }
}

/// 递归收集目录下的文件（按相对路径排序）
pub fn collect_entries(root: &Path) -> Vec<SummaryEntry> {
    let mut entries: Vec<SummaryEntry> = WalkDir::new(root)
        .follow_links(false)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter_map(|entry| {
            let metadata = entry.metadata().ok()?;
            if metadata.is_dir() {
                return None;
            }

            let relative = entry.path().strip_prefix(root).ok()?;
            let relative = if relative.as_os_str().is_empty() {
                // root 本身就是文件
                entry.file_name().to_string_lossy().into_owned()
            } else {
                relative.to_string_lossy().replace('\\', "/")
            };

            Some(SummaryEntry {
                path: relative,
                size: metadata.len(),
                modified: metadata.modified().ok()?.into(),
            })
        })
        .collect();

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    entries
}

/// 生成概要内容
pub fn render(task: &TaskStatus, entries: &[SummaryEntry], completed_at: DateTime<Utc>) -> String {
    let total_size: u64 = entries.iter().map(|e| e.size).sum();

    let details: Vec<String> = entries
        .iter()
        .map(|entry| {
            let path: String = entry.path.chars().take(MAX_PATH_WIDTH).collect();
            format!(
                "- {:<80}  Size: {:<20}  Modified: {}",
                path,
                format_size(entry.size),
                entry.modified.to_rfc3339()
            )
        })
        .collect();

    let mut content = String::new();
    content.push_str("Download Summary\n===============\n\n");
    content.push_str(&format!("Trace ID: {}\n", task.trace_id));
    content.push_str(&format!("Completed at: {}\n", completed_at.to_rfc3339()));
    content.push_str(&format!("Source: {}\n", task.source));
    content.push_str(&format!("Destination: {}\n", task.destination));
    content.push_str(&format!("Total Size: {}\n", format_size(total_size)));
    content.push_str(&format!("Total Files: {}\n\n", entries.len()));
    content.push_str("File Details\n============\n\n");
    content.push_str(&details.join("\n\n"));
    content
}

/// 写入 `<log_path>/download_<trace_id>.log`，返回文件路径
pub async fn write_summary(task: &TaskStatus) -> io::Result<PathBuf> {
    let root = PathBuf::from(&task.destination);

    // 使用 spawn_blocking 避免阻塞 async runtime
    let entries = tokio::task::spawn_blocking(move || collect_entries(&root))
        .await
        .map_err(io::Error::other)?;

    let content = render(task, &entries, Utc::now());
    let path = task
        .log_path
        .join(format!("download_{}.log", task.trace_id));
    tokio::fs::write(&path, content).await?;

    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn formats_sizes_like_the_download_log() {
        assert_eq!(format_size(0), "0 B");
        assert_eq!(format_size(1024), "1024 B");
        assert_eq!(format_size(1536), "1.50 KB");
        assert_eq!(format_size(5 * MB + MB / 2), "5.50 MB");
        assert_eq!(format_size(3 * GB), "3.00 GB");
    }

    #[test]
    fn collects_nested_files_only() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(tmp.path().join("sub/deeper")).unwrap();
        std::fs::write(tmp.path().join("a.txt"), b"hello").unwrap();
        std::fs::write(tmp.path().join("sub/deeper/b.bin"), vec![0u8; 2048]).unwrap();

        let entries = collect_entries(tmp.path());
        let paths: Vec<_> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(paths, vec!["a.txt", "sub/deeper/b.bin"]);
        assert_eq!(entries[1].size, 2048);
    }

    #[test]
    fn missing_destination_yields_empty_summary() {
        let tmp = tempfile::tempdir().unwrap();
        let entries = collect_entries(&tmp.path().join("missing"));
        assert!(entries.is_empty());

        let task = TaskStatus::new("id", "sftp:/x", "/nowhere", tmp.path());
        let content = render(&task, &entries, Utc::now());
        assert!(content.contains("Total Files: 0"));
        assert!(content.contains("Total Size: 0 B"));
    }

    #[tokio::test]
    async fn writes_summary_next_to_engine_log() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("dest");
        let logs = tmp.path().join("logs");
        std::fs::create_dir_all(&dest).unwrap();
        std::fs::create_dir_all(&logs).unwrap();
        std::fs::write(dest.join("report.csv"), vec![b'x'; 3000]).unwrap();

        let task = TaskStatus::new("trace-9", "sftp:/reports", dest.to_str().unwrap(), &logs);
        let path = write_summary(&task).await.unwrap();

        assert_eq!(path, logs.join("download_trace-9.log"));
        let content = std::fs::read_to_string(path).unwrap();
        assert!(content.starts_with("Download Summary"));
        assert!(content.contains("Source: sftp:/reports"));
        assert!(content.contains("- report.csv"));
        assert!(content.contains("2.93 KB"));
    }
}
