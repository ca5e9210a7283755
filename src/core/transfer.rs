//! 执行同步计划：上传/下载、删除以及推送过程中的清单检查点

use super::comparator::SyncPlan;
use super::inventory::{local_path, Inventory};
use super::manifest::ManifestStore;
use crate::error::{Result, SyncError};
use crate::storage::{LocalFs, ObjectStore, PutOptions};
use serde::Serialize;
use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 默认检查点间隔（成功传输的文件数）
pub const DEFAULT_CHECKPOINT_INTERVAL: usize = 100;

/// 执行统计
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferStats {
    pub transferred: usize,
    pub deleted: usize,
    /// 因本地文件消失或路径越界而跳过的文件
    pub skipped: usize,
    pub checkpoints: usize,
    pub bytes_transferred: u64,
}

/// 传输执行器，按路径顺序逐个处理
pub struct TransferExecutor<'a> {
    store: Arc<dyn ObjectStore>,
    fs: Arc<dyn LocalFs>,
    manifests: &'a ManifestStore,
    checkpoint_interval: usize,
}

impl<'a> TransferExecutor<'a> {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        fs: Arc<dyn LocalFs>,
        manifests: &'a ManifestStore,
    ) -> Self {
        Self {
            store,
            fs,
            manifests,
            checkpoint_interval: DEFAULT_CHECKPOINT_INTERVAL,
        }
    }

    /// 0 表示只在结束时保存清单
    pub fn with_checkpoint_interval(mut self, interval: usize) -> Self {
        self.checkpoint_interval = interval;
        self
    }

    /// 推送：本地为源，远程为目标。`remote` 随传输成功原地更新，并周期性保存
    pub async fn push(
        &self,
        root: &Path,
        plan: &SyncPlan,
        local: &mut Inventory,
        remote: &mut Inventory,
    ) -> Result<TransferStats> {
        let location = self.manifests.location();
        let mut stats = TransferStats::default();
        let mut since_checkpoint = 0;
        let mut vanished = BTreeSet::new();

        for path in &plan.to_transfer {
            let Some(modified_time) = local.get(path) else {
                continue;
            };

            let file = root.join(path);
            let data = match self.fs.read(&file).await {
                Ok(data) => data,
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    warn!("本地文件已消失，跳过: {}", path);
                    local.remove(path);
                    if remote.contains(path) {
                        vanished.insert(path.clone());
                    }
                    stats.skipped += 1;
                    continue;
                }
                Err(e) => return Err(SyncError::io(file, e)),
            };

            info!("上传 {}", path);
            let size = data.len() as u64;
            self.store
                .write(
                    &location.key(path),
                    data,
                    PutOptions::for_file(path, modified_time),
                )
                .await?;

            remote.insert(path.clone(), modified_time);
            stats.transferred += 1;
            stats.bytes_transferred += size;
            since_checkpoint += 1;

            if self.checkpoint_interval > 0 && since_checkpoint == self.checkpoint_interval {
                self.manifests.save(remote).await?;
                stats.checkpoints += 1;
                since_checkpoint = 0;
                debug!("检查点: 已保存 {} 个文件的清单", remote.len());
            }
        }

        for path in plan.to_delete.iter().chain(vanished.iter()) {
            info!("删除 {}", path);
            self.store.delete(&location.key(path)).await?;
            remote.remove(path);
            stats.deleted += 1;
        }

        self.manifests.save(remote).await?;
        Ok(stats)
    }

    /// 拉取：远程为源，本地为目标。本地文件系统随时可重新扫描，因此没有检查点
    pub async fn pull(
        &self,
        root: &Path,
        plan: &SyncPlan,
        remote: &Inventory,
        local: &mut Inventory,
    ) -> Result<TransferStats> {
        let location = self.manifests.location();
        let mut stats = TransferStats::default();

        for path in &plan.to_transfer {
            let Some(modified_time) = remote.get(path) else {
                continue;
            };
            let Some(file) = local_path(root, path) else {
                warn!("路径越出本地目录，跳过: {}", path);
                stats.skipped += 1;
                continue;
            };

            if let Some(parent) = file.parent() {
                self.fs
                    .create_dir_all(parent)
                    .await
                    .map_err(|e| SyncError::io(parent, e))?;
            }

            info!("下载 {}", path);
            let data = self.store.read(&location.key(path)).await?;
            let size = data.len() as u64;
            self.fs
                .write(&file, &data)
                .await
                .map_err(|e| SyncError::io(&file, e))?;
            self.fs
                .set_modified_time(&file, modified_time)
                .await
                .map_err(|e| SyncError::io(&file, e))?;

            local.insert(path.clone(), modified_time);
            stats.transferred += 1;
            stats.bytes_transferred += size;
        }

        for path in &plan.to_delete {
            // 本地清单来自扫描，路径总在根目录内
            let Some(file) = local_path(root, path) else {
                continue;
            };

            info!("删除 {}", path);
            match self.fs.remove_file(&file).await {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    debug!("文件已不存在: {}", path);
                }
                Err(e) => return Err(SyncError::io(file, e)),
            }
            local.remove(path);
            stats.deleted += 1;
        }

        Ok(stats)
    }
}
