use super::comparator::{compare_inventories, SyncPlan};
use super::ignore::IgnoreFilter;
use super::inventory::Inventory;
use super::location::RemoteLocation;
use super::manifest::ManifestStore;
use super::scanner::LocalScanner;
use super::transfer::{TransferExecutor, TransferStats, DEFAULT_CHECKPOINT_INTERVAL};
use crate::error::{Result, SyncError};
use crate::storage::{LocalFs, ObjectStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::info;

/// 同步方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// 本地 -> 远程
    Push,
    /// 远程 -> 本地
    Pull,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Push => write!(f, "push"),
            Direction::Pull => write!(f, "pull"),
        }
    }
}

/// 同步配置
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// 推送时每成功传输多少个文件保存一次远程清单，0 表示只在结束时保存
    pub checkpoint_interval: usize,
    /// 推送时是否在本地根目录留一份 manifest.txt
    pub keep_local_manifest: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
            keep_local_manifest: true,
        }
    }
}

/// 同步报告
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncReport {
    pub direction: Direction,
    pub remote: String,
    pub source_files: usize,
    pub dest_files: usize,
    pub unchanged: usize,
    #[serde(flatten)]
    pub stats: TransferStats,
    pub duration_ms: u64,
}

/// 两份清单及其差异
#[derive(Debug, Clone)]
pub struct Analysis {
    pub source: Inventory,
    pub dest: Inventory,
    pub plan: SyncPlan,
}

/// 同步引擎：加载清单 -> 比较 -> 执行传输 -> 执行删除 -> 保存清单
pub struct SyncEngine {
    store: Arc<dyn ObjectStore>,
    fs: Arc<dyn LocalFs>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn ObjectStore>, fs: Arc<dyn LocalFs>) -> Self {
        Self {
            store,
            fs,
            config: SyncConfig::default(),
        }
    }

    pub fn with_config(
        store: Arc<dyn ObjectStore>,
        fs: Arc<dyn LocalFs>,
        config: SyncConfig,
    ) -> Self {
        Self { store, fs, config }
    }

    fn manifests(&self, location: &RemoteLocation) -> ManifestStore {
        ManifestStore::new(self.store.clone(), self.fs.clone(), location.clone())
    }

    /// 加载两侧清单并计算差异，不做任何修改
    pub async fn analyze(
        &self,
        direction: Direction,
        local_root: &Path,
        location: &RemoteLocation,
    ) -> Result<Analysis> {
        self.load_and_compare(direction, local_root, &self.manifests(location))
            .await
    }

    async fn load_and_compare(
        &self,
        direction: Direction,
        local_root: &Path,
        manifests: &ManifestStore,
    ) -> Result<Analysis> {
        // 在访问远程之前报告配置错误
        if !self.fs.is_dir(local_root).await {
            return Err(SyncError::LocalRootMissing(local_root.to_path_buf()));
        }
        let filter = IgnoreFilter::load(self.fs.as_ref(), local_root).await?;

        let remote = manifests.load().await?;
        let local = LocalScanner::new(self.fs.clone())
            .scan_filtered(local_root, &filter)
            .await?;

        let (source, dest) = match direction {
            Direction::Push => (local, remote),
            Direction::Pull => (remote, local),
        };
        let plan = compare_inventories(&source, &dest);

        info!(
            "比较完成: {} 个传输, {} 个删除, {} 个未变化",
            plan.to_transfer.len(),
            plan.to_delete.len(),
            plan.unchanged
        );

        Ok(Analysis { source, dest, plan })
    }

    /// 按方向同步本地目录与远程前缀
    pub async fn reconcile(
        &self,
        direction: Direction,
        local_root: &Path,
        location: &RemoteLocation,
    ) -> Result<SyncReport> {
        let started = Instant::now();
        info!(
            "开始同步 ({}): {} <-> {} [{}]",
            direction,
            local_root.display(),
            location,
            self.store.name()
        );

        let mut manifests = self.manifests(location);
        if direction == Direction::Push && self.config.keep_local_manifest {
            manifests = manifests.with_local_copy(local_root);
        }

        let Analysis {
            mut source,
            mut dest,
            plan,
        } = self.load_and_compare(direction, local_root, &manifests).await?;
        let source_files = source.len();
        let dest_files = dest.len();

        let executor = TransferExecutor::new(self.store.clone(), self.fs.clone(), &manifests)
            .with_checkpoint_interval(self.config.checkpoint_interval);

        let stats = match direction {
            Direction::Push => {
                executor
                    .push(local_root, &plan, &mut source, &mut dest)
                    .await?
            }
            Direction::Pull => executor.pull(local_root, &plan, &source, &mut dest).await?,
        };

        info!(
            "同步完成 ({}): 传输 {}, 删除 {}, 跳过 {}",
            direction, stats.transferred, stats.deleted, stats.skipped
        );

        Ok(SyncReport {
            direction,
            remote: location.to_string(),
            source_files,
            dest_files,
            unchanged: plan.unchanged,
            stats,
            duration_ms: started.elapsed().as_millis() as u64,
        })
    }

    /// 丢弃现有清单文档，根据对象列表重新生成并上传
    pub async fn rebuild_remote_inventory(&self, location: &RemoteLocation) -> Result<Inventory> {
        info!("重建远程清单: {}", location);
        let manifests = self.manifests(location);
        let inventory = manifests.reconstruct().await?;
        manifests.save(&inventory).await?;
        Ok(inventory)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{
        MemoryFs, MemoryStore, ObjectInfo, ObjectMeta, PutOptions, MODIFIED_TIME_KEY,
    };
    use async_trait::async_trait;
    use std::collections::BTreeSet;

    /// 任何调用都失败的远程存储
    struct OfflineStore;

    #[async_trait]
    impl ObjectStore for OfflineStore {
        async fn list_objects(&self, _prefix: &str) -> anyhow::Result<Vec<ObjectInfo>> {
            anyhow::bail!("offline")
        }

        async fn stat(&self, _key: &str) -> anyhow::Result<Option<ObjectMeta>> {
            anyhow::bail!("offline")
        }

        async fn read(&self, _key: &str) -> anyhow::Result<Vec<u8>> {
            anyhow::bail!("offline")
        }

        async fn write(
            &self,
            _key: &str,
            _data: Vec<u8>,
            _options: PutOptions,
        ) -> anyhow::Result<()> {
            anyhow::bail!("offline")
        }

        async fn delete(&self, _key: &str) -> anyhow::Result<()> {
            anyhow::bail!("offline")
        }

        fn name(&self) -> &str {
            "offline"
        }
    }

    struct Harness {
        store: Arc<MemoryStore>,
        fs: Arc<MemoryFs>,
        engine: SyncEngine,
        location: RemoteLocation,
    }

    fn harness() -> Harness {
        let store = Arc::new(MemoryStore::new("bucket"));
        let fs = Arc::new(MemoryFs::new());
        fs.add_dir("/local");
        let engine = SyncEngine::new(store.clone(), fs.clone());
        Harness {
            store,
            fs,
            engine,
            location: RemoteLocation::new("bucket", "site"),
        }
    }

    fn set(paths: &[&str]) -> BTreeSet<String> {
        paths.iter().map(|p| p.to_string()).collect()
    }

    fn root() -> &'static Path {
        Path::new("/local")
    }

    #[tokio::test]
    async fn test_push_into_empty_remote() {
        let h = harness();
        h.fs.insert_file("/local/a.txt", b"a", 100);
        h.fs.insert_file("/local/b.txt", b"b", 200);

        let analysis = h.engine.analyze(Direction::Push, root(), &h.location).await.unwrap();
        assert_eq!(analysis.plan.to_transfer, set(&["a.txt", "b.txt"]));
        assert!(analysis.plan.to_delete.is_empty());

        let report = h.engine.reconcile(Direction::Push, root(), &h.location).await.unwrap();
        assert_eq!(report.stats.transferred, 2);

        let manifest = h.store.object("site/manifest.txt").unwrap();
        assert_eq!(manifest.data, b"a.txt\t100\nb.txt\t200\n");
        // 本地副本
        assert_eq!(
            h.fs.contents("/local/manifest.txt"),
            Some(b"a.txt\t100\nb.txt\t200\n".to_vec())
        );
    }

    #[tokio::test]
    async fn test_push_skips_equal_and_deletes_extra() {
        let h = harness();
        h.store.insert_object("site/manifest.txt", b"a.txt\t100\nc.txt\t300\n", 1, &[]);
        h.store.insert_object("site/a.txt", b"a", 1, &[]);
        h.store.insert_object("site/c.txt", b"c", 1, &[]);
        h.fs.insert_file("/local/a.txt", b"a", 100);
        h.fs.insert_file("/local/b.txt", b"b", 200);

        let analysis = h.engine.analyze(Direction::Push, root(), &h.location).await.unwrap();
        assert_eq!(analysis.plan.to_transfer, set(&["b.txt"]));
        assert_eq!(analysis.plan.to_delete, set(&["c.txt"]));

        let report = h.engine.reconcile(Direction::Push, root(), &h.location).await.unwrap();
        assert_eq!(report.stats.transferred, 1);
        assert_eq!(report.stats.deleted, 1);
        assert_eq!(report.unchanged, 1);
        assert!(h.store.object("site/c.txt").is_none());
        assert_eq!(
            h.store.object("site/manifest.txt").unwrap().data,
            b"a.txt\t100\nb.txt\t200\n"
        );
    }

    #[tokio::test]
    async fn test_second_push_is_noop() {
        let h = harness();
        h.fs.insert_file("/local/a.txt", b"a", 100);
        h.fs.insert_file("/local/dir/b.txt", b"b", 200);

        h.engine.reconcile(Direction::Push, root(), &h.location).await.unwrap();
        let analysis = h.engine.analyze(Direction::Push, root(), &h.location).await.unwrap();
        assert!(analysis.plan.is_empty());

        let report = h.engine.reconcile(Direction::Push, root(), &h.location).await.unwrap();
        assert_eq!(report.stats.transferred, 0);
        assert_eq!(report.stats.deleted, 0);
    }

    #[tokio::test]
    async fn test_interrupted_push_resumes_from_checkpoint() {
        let h = harness();
        for i in 0..250u64 {
            h.fs.insert_file(format!("/local/f{:03}.txt", i), b"x", 5000 + i);
        }

        // 150 次上传 + 1 次检查点后写入失败
        h.store.fail_writes_after(Some(151));
        let err = h
            .engine
            .reconcile(Direction::Push, root(), &h.location)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::Store(_)));

        let checkpointed = ManifestStore::new(h.store.clone(), h.fs.clone(), h.location.clone())
            .load()
            .await
            .unwrap();
        assert_eq!(checkpointed.len(), 100);

        h.store.fail_writes_after(None);
        let report = h.engine.reconcile(Direction::Push, root(), &h.location).await.unwrap();
        // 101..150 被重复传输
        assert_eq!(report.stats.transferred, 150);

        let final_inventory = h.engine.analyze(Direction::Push, root(), &h.location).await.unwrap();
        assert!(final_inventory.plan.is_empty());
        assert_eq!(final_inventory.dest.len(), 250);
    }

    #[tokio::test]
    async fn test_pull_round_trip_is_stable() {
        let h = harness();
        h.store.insert_object("site/docs/a.md", b"# a", 999, &[(MODIFIED_TIME_KEY, "100")]);
        h.store.insert_object("site/b.bin", b"bb", 200, &[]);
        h.fs.insert_file("/local/old.txt", b"o", 1);

        let report = h.engine.reconcile(Direction::Pull, root(), &h.location).await.unwrap();
        assert_eq!(report.stats.transferred, 2);
        assert_eq!(report.stats.deleted, 1);
        assert_eq!(h.fs.modified_time("/local/docs/a.md"), Some(100));
        assert_eq!(h.fs.modified_time("/local/b.bin"), Some(200));
        assert!(h.fs.contents("/local/old.txt").is_none());
        // 拉取不会写入本地清单副本
        assert!(h.fs.contents("/local/manifest.txt").is_none());

        let again = h.engine.analyze(Direction::Pull, root(), &h.location).await.unwrap();
        assert!(again.plan.is_empty());
    }

    #[tokio::test]
    async fn test_missing_local_root_is_fatal_before_remote_work() {
        let h = harness();
        let err = h
            .engine
            .reconcile(Direction::Push, Path::new("/absent"), &h.location)
            .await
            .unwrap_err();
        assert!(matches!(err, SyncError::LocalRootMissing(_)));
        assert_eq!(h.store.write_count(), 0);
    }

    #[tokio::test]
    async fn test_invalid_ignore_pattern_fails_before_remote_access() {
        let fs = Arc::new(MemoryFs::new());
        fs.insert_file("/local/ignore.txt", b"(unclosed\n", 1);
        fs.insert_file("/local/a.txt", b"a", 10);
        let engine = SyncEngine::new(Arc::new(OfflineStore), fs);
        let location = RemoteLocation::new("bucket", "site");

        for direction in [Direction::Push, Direction::Pull] {
            let err = engine
                .reconcile(direction, Path::new("/local"), &location)
                .await
                .unwrap_err();
            assert!(
                matches!(err, SyncError::InvalidIgnorePattern { .. }),
                "{direction}: {err:?}"
            );
        }
    }

    #[tokio::test]
    async fn test_rebuild_discards_existing_document() {
        let h = harness();
        h.store.insert_object("site/manifest.txt", b"stale.txt\t1\n", 1, &[]);
        h.store.insert_object("site/live.txt", b"l", 77, &[(MODIFIED_TIME_KEY, "55")]);

        let inventory = h.engine.rebuild_remote_inventory(&h.location).await.unwrap();
        assert_eq!(inventory.get("live.txt"), Some(55));
        assert!(!inventory.contains("stale.txt"));
        assert_eq!(
            h.store.object("site/manifest.txt").unwrap().data,
            b"live.txt\t55\n"
        );
        assert!(h.fs.contents("/local/manifest.txt").is_none());
        assert_eq!(h.store.keys(), vec!["site/live.txt", "site/manifest.txt"]);
    }
}
