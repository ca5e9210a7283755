use async_trait::async_trait;
use filetime::FileTime;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use walkdir::WalkDir;

/// 本地目录中的一个普通文件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// 相对于根目录的路径，统一使用 `/`
    pub path: String,
    /// 最后修改时间（整秒）
    pub modified_time: u64,
}

/// 本地文件系统访问接口
#[async_trait]
pub trait LocalFs: Send + Sync {
    /// 路径是否为已存在的目录
    async fn is_dir(&self, path: &Path) -> bool;

    /// 递归列出 root 下的所有普通文件
    async fn list_files(&self, root: &Path) -> io::Result<Vec<LocalFile>>;

    /// 读取整个文件
    async fn read(&self, path: &Path) -> io::Result<Vec<u8>>;

    /// 写入整个文件（父目录需已存在）
    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()>;

    /// 创建目录（含所有父目录）
    async fn create_dir_all(&self, path: &Path) -> io::Result<()>;

    /// 设置访问时间和修改时间
    async fn set_modified_time(&self, path: &Path, secs: u64) -> io::Result<()>;

    /// 删除文件
    async fn remove_file(&self, path: &Path) -> io::Result<()>;
}

/// 规范化路径分隔符（统一使用 /）
fn normalize_path(path: &Path) -> Option<String> {
    let mut parts = Vec::new();
    for component in path.components() {
        parts.push(component.as_os_str().to_str()?);
    }
    Some(parts.join("/"))
}

/// 操作系统文件系统
#[derive(Debug, Default, Clone, Copy)]
pub struct OsFs;

#[async_trait]
impl LocalFs for OsFs {
    async fn is_dir(&self, path: &Path) -> bool {
        fs::metadata(path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false)
    }

    async fn list_files(&self, root: &Path) -> io::Result<Vec<LocalFile>> {
        let base = root.to_path_buf();

        // 使用 spawn_blocking 避免阻塞 async runtime
        tokio::task::spawn_blocking(move || walk_files(&base))
            .await
            .map_err(io::Error::other)?
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        fs::read(path).await
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        // 使用临时文件写入，然后原子重命名
        let temp_path = partial_path(path);
        fs::write(&temp_path, data).await?;
        fs::rename(&temp_path, path).await
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        fs::create_dir_all(path).await
    }

    async fn set_modified_time(&self, path: &Path, secs: u64) -> io::Result<()> {
        let time = FileTime::from_unix_time(i64::try_from(secs).unwrap_or(i64::MAX), 0);
        let path = path.to_path_buf();
        tokio::task::spawn_blocking(move || filetime::set_file_times(&path, time, time))
            .await
            .map_err(io::Error::other)?
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        fs::remove_file(path).await
    }
}

fn walk_files(base: &Path) -> io::Result<Vec<LocalFile>> {
    let mut files = Vec::new();

    for entry in WalkDir::new(base).follow_links(false) {
        let entry = entry.map_err(io::Error::from)?;
        if !entry.file_type().is_file() {
            continue;
        }

        if is_partial_file(entry.path()) {
            tracing::debug!("跳过未完成的临时文件: {}", entry.path().display());
            continue;
        }

        let Some(path) = entry
            .path()
            .strip_prefix(base)
            .ok()
            .and_then(normalize_path)
        else {
            tracing::warn!("跳过无法表示为 UTF-8 的路径: {:?}", entry.path());
            continue;
        };

        let modified_time = entry
            .metadata()
            .map_err(io::Error::from)?
            .modified()?
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);

        files.push(LocalFile {
            path,
            modified_time,
        });
    }

    Ok(files)
}

/// 下载过程中使用的临时文件名
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.partial", name))
}

/// 是否为中断写入后残留的临时文件（`.name.partial`）
pub fn is_partial_file(path: &Path) -> bool {
    const SUFFIX: &str = ".partial";
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.len() > SUFFIX.len() + 1 && n.starts_with('.') && n.ends_with(SUFFIX))
}
