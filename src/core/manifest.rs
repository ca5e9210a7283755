//! 远程清单的读取、重建与保存

use super::inventory::{Inventory, MANIFEST_FILE};
use super::location::RemoteLocation;
use crate::error::{Result, SyncError};
use crate::storage::{LocalFs, ObjectStore, PutOptions};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// 读取清单文档的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestLoad {
    Found(Inventory),
    /// 文档不存在
    Missing,
    /// 文档存在但无法读取或解析
    Unreadable(String),
}

/// 远程清单存储
pub struct ManifestStore {
    store: Arc<dyn ObjectStore>,
    fs: Arc<dyn LocalFs>,
    location: RemoteLocation,
    /// 保存时同时写入的本地副本所在目录
    local_copy: Option<PathBuf>,
}

impl ManifestStore {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        fs: Arc<dyn LocalFs>,
        location: RemoteLocation,
    ) -> Self {
        Self {
            store,
            fs,
            location,
            local_copy: None,
        }
    }

    /// 保存时在 dir 下留一份 manifest.txt
    pub fn with_local_copy(mut self, dir: impl Into<PathBuf>) -> Self {
        self.local_copy = Some(dir.into());
        self
    }

    pub fn location(&self) -> &RemoteLocation {
        &self.location
    }

    /// 读取清单文档，不做回退
    pub async fn fetch(&self) -> ManifestLoad {
        let key = self.location.manifest_key();

        match self.store.stat(&key).await {
            Ok(Some(_)) => {}
            Ok(None) => return ManifestLoad::Missing,
            Err(e) => return ManifestLoad::Unreadable(format!("{:#}", e)),
        }

        let data = match self.store.read(&key).await {
            Ok(data) => data,
            Err(e) => return ManifestLoad::Unreadable(format!("{:#}", e)),
        };

        let text = match String::from_utf8(data) {
            Ok(text) => text,
            Err(e) => return ManifestLoad::Unreadable(e.to_string()),
        };

        match Inventory::parse_manifest(&text) {
            Ok(inventory) => ManifestLoad::Found(inventory),
            Err(e) => ManifestLoad::Unreadable(e.to_string()),
        }
    }

    /// 加载远程清单；文档缺失或损坏时从对象列表重建
    pub async fn load(&self) -> Result<Inventory> {
        match self.fetch().await {
            ManifestLoad::Found(inventory) => {
                info!(
                    "从 {} 加载清单: {} 个文件",
                    self.location.manifest_key(),
                    inventory.len()
                );
                Ok(inventory)
            }
            ManifestLoad::Missing => {
                info!(
                    "{} 中没有 {}，根据对象列表重建清单",
                    self.location, MANIFEST_FILE
                );
                self.reconstruct().await
            }
            ManifestLoad::Unreadable(reason) => {
                info!("清单无法读取 ({})，根据对象列表重建清单", reason);
                self.reconstruct().await
            }
        }
    }

    /// 列出前缀下的所有对象并读取每个对象的时间戳
    pub async fn reconstruct(&self) -> Result<Inventory> {
        let prefix = self.location.prefix.as_str();
        let manifest_key = self.location.manifest_key();
        let objects = self.store.list_objects(prefix).await?;
        debug!("list_objects 返回 {} 个条目", objects.len());

        let mut inventory = Inventory::new();

        for object in objects {
            if object.is_dir || object.key == manifest_key || object.key == prefix {
                continue;
            }

            let Some(relative) = self.location.relative(&object.key) else {
                continue;
            };

            let modified_time = match self.store.stat(&object.key).await? {
                Some(meta) => meta.sync_timestamp(&object.key),
                None => {
                    warn!("对象在列表后消失: {}", object.key);
                    continue;
                }
            };

            inventory.insert(relative, modified_time);
        }

        info!("重建清单完成: {} 个文件", inventory.len());
        Ok(inventory)
    }

    /// 序列化并上传清单，文档自身的修改时间取当前时间
    pub async fn save(&self, inventory: &Inventory) -> Result<()> {
        let document = inventory.to_manifest();

        if let Some(dir) = &self.local_copy {
            let path = dir.join(MANIFEST_FILE);
            self.fs
                .write(&path, document.as_bytes())
                .await
                .map_err(|e| SyncError::io(path, e))?;
        }

        let now = chrono::Utc::now().timestamp().max(0) as u64;
        self.store
            .write(
                &self.location.manifest_key(),
                document.into_bytes(),
                PutOptions::for_file(MANIFEST_FILE, now),
            )
            .await?;

        debug!("已保存清单: {} 个文件", inventory.len());
        Ok(())
    }
}
