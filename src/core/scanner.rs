use super::ignore::IgnoreFilter;
use super::inventory::{Inventory, MANIFEST_FILE};
use crate::error::{Result, SyncError};
use crate::storage::LocalFs;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// 本地目录扫描器，生成本地清单
pub struct LocalScanner {
    fs: Arc<dyn LocalFs>,
}

impl LocalScanner {
    pub fn new(fs: Arc<dyn LocalFs>) -> Self {
        Self { fs }
    }

    /// 扫描本地根目录；根目录不存在属于配置错误
    pub async fn scan(&self, root: &Path) -> Result<Inventory> {
        if !self.fs.is_dir(root).await {
            return Err(SyncError::LocalRootMissing(root.to_path_buf()));
        }

        let filter = IgnoreFilter::load(self.fs.as_ref(), root).await?;
        self.scan_filtered(root, &filter).await
    }

    /// 使用已加载的忽略规则扫描，调用方负责检查根目录
    pub(crate) async fn scan_filtered(
        &self,
        root: &Path,
        filter: &IgnoreFilter,
    ) -> Result<Inventory> {
        info!("开始扫描本地目录: {}", root.display());

        let files = self
            .fs
            .list_files(root)
            .await
            .map_err(|e| SyncError::io(root, e))?;

        let mut inventory = Inventory::new();
        let mut excluded_count = 0;

        for file in files {
            if file.path == MANIFEST_FILE {
                debug!("跳过清单文件: {}", file.path);
                continue;
            }

            if filter.is_ignored(&file.path) {
                excluded_count += 1;
                continue;
            }

            inventory.insert(file.path, file.modified_time);
        }

        info!(
            "扫描完成: {} 个文件, {} 个被排除",
            inventory.len(),
            excluded_count
        );

        Ok(inventory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryFs, OsFs};

    #[tokio::test]
    async fn test_scan_applies_ignore_file() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert_file("/root/ignore.txt", b"^tmp/\n", 1);
        fs.insert_file("/root/tmp/x.txt", b"x", 10);
        fs.insert_file("/root/keep/y.txt", b"y", 20);

        let inventory = LocalScanner::new(fs).scan(Path::new("/root")).await.unwrap();
        assert_eq!(inventory.get("keep/y.txt"), Some(20));
        assert!(!inventory.contains("tmp/x.txt"));
        // ignore.txt 本身不被排除
        assert!(inventory.contains("ignore.txt"));
    }

    #[tokio::test]
    async fn test_scan_skips_root_manifest_only() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert_file("/root/manifest.txt", b"a.txt\t1\n", 1);
        fs.insert_file("/root/sub/manifest.txt", b"", 5);
        fs.insert_file("/root/a.txt", b"a", 100);

        let inventory = LocalScanner::new(fs).scan(Path::new("/root")).await.unwrap();
        let paths: Vec<_> = inventory.paths().map(String::as_str).collect();
        assert_eq!(paths, vec!["a.txt", "sub/manifest.txt"]);
    }

    #[tokio::test]
    async fn test_scan_missing_root_is_error() {
        let fs = Arc::new(MemoryFs::new());
        let err = LocalScanner::new(fs)
            .scan(Path::new("/nowhere"))
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::LocalRootMissing(_)));
    }

    #[tokio::test]
    async fn test_scan_real_directory() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("docs")).unwrap();
        std::fs::write(dir.path().join("docs/readme.md"), b"hi").unwrap();
        std::fs::write(dir.path().join("manifest.txt"), b"").unwrap();
        filetime::set_file_mtime(
            dir.path().join("docs/readme.md"),
            filetime::FileTime::from_unix_time(1_500_000_000, 999_000_000),
        )
        .unwrap();

        let inventory = LocalScanner::new(Arc::new(OsFs))
            .scan(dir.path())
            .await
            .unwrap();
        assert_eq!(inventory.len(), 1);
        assert_eq!(inventory.get("docs/readme.md"), Some(1_500_000_000));
    }

    #[tokio::test]
    async fn test_interrupted_write_leftovers_are_not_inventoried() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), b"a").unwrap();
        std::fs::write(dir.path().join(".a.txt.partial"), b"half").unwrap();
        std::fs::write(dir.path().join(".manifest.txt.partial"), b"a.txt\t1\n").unwrap();

        let inventory = LocalScanner::new(Arc::new(OsFs))
            .scan(dir.path())
            .await
            .unwrap();
        let paths: Vec<_> = inventory.paths().map(String::as_str).collect();
        assert_eq!(paths, vec!["a.txt"]);
    }
}
