//! 内存实现
//!
//! 主要用于测试：语义与真实存储一致，但所有数据都保存在内存中。

use super::{LocalFile, LocalFs, ObjectInfo, ObjectMeta, ObjectStore, PutOptions, Visibility};
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// 内存中保存的对象
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub meta: ObjectMeta,
    pub visibility: Visibility,
}

#[derive(Default)]
struct MemoryStoreInner {
    objects: BTreeMap<String, StoredObject>,
    writes: usize,
    /// 成功写入达到该次数后，后续写入全部失败
    fail_writes_after: Option<usize>,
}

/// 内存对象存储
pub struct MemoryStore {
    name: String,
    inner: Mutex<MemoryStoreInner>,
}

impl MemoryStore {
    pub fn new(bucket: &str) -> Self {
        Self {
            name: format!("memory://{}", bucket),
            inner: Mutex::new(MemoryStoreInner::default()),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryStoreInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 直接放入一个对象（不计入写入次数）
    pub fn insert_object(
        &self,
        key: &str,
        data: &[u8],
        last_modified: i64,
        user_metadata: &[(&str, &str)],
    ) {
        let meta = ObjectMeta {
            size: data.len() as u64,
            last_modified: Some(last_modified),
            content_type: None,
            user_metadata: user_metadata
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        self.lock().objects.insert(
            key.to_string(),
            StoredObject {
                data: data.to_vec(),
                meta,
                visibility: Visibility::Private,
            },
        );
    }

    pub fn object(&self, key: &str) -> Option<StoredObject> {
        self.lock().objects.get(key).cloned()
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().objects.keys().cloned().collect()
    }

    /// 成功写入的次数
    pub fn write_count(&self) -> usize {
        self.lock().writes
    }

    /// 在累计 `count` 次成功写入之后让写入失败；`None` 取消故障
    pub fn fail_writes_after(&self, count: Option<usize>) {
        self.lock().fail_writes_after = count;
    }
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        Ok(self
            .lock()
            .objects
            .iter()
            .filter(|(key, _)| key.starts_with(prefix))
            .map(|(key, obj)| ObjectInfo {
                key: key.clone(),
                size: obj.meta.size,
                last_modified: obj.meta.last_modified,
                is_dir: key.ends_with('/'),
            })
            .collect())
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>> {
        Ok(self.lock().objects.get(key).map(|o| o.meta.clone()))
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        self.lock()
            .objects
            .get(key)
            .map(|o| o.data.clone())
            .ok_or_else(|| anyhow::anyhow!("object not found: {}", key))
    }

    async fn write(&self, key: &str, data: Vec<u8>, options: PutOptions) -> Result<()> {
        let mut inner = self.lock();
        if let Some(limit) = inner.fail_writes_after {
            if inner.writes >= limit {
                anyhow::bail!("injected write failure: {}", key);
            }
        }

        let meta = ObjectMeta {
            size: data.len() as u64,
            last_modified: Some(chrono::Utc::now().timestamp()),
            content_type: Some(options.content_type),
            user_metadata: options.user_metadata,
        };
        inner.objects.insert(
            key.to_string(),
            StoredObject {
                data,
                meta,
                visibility: options.visibility,
            },
        );
        inner.writes += 1;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.lock().objects.remove(key);
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[derive(Debug, Clone)]
struct MemoryFile {
    data: Vec<u8>,
    modified_time: u64,
}

#[derive(Default)]
struct MemoryFsInner {
    dirs: BTreeSet<PathBuf>,
    files: BTreeMap<PathBuf, MemoryFile>,
}

/// 内存文件系统
#[derive(Default)]
pub struct MemoryFs {
    inner: Mutex<MemoryFsInner>,
}

impl MemoryFs {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MemoryFsInner> {
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// 放入一个文件，并自动创建父目录
    pub fn insert_file(&self, path: impl AsRef<Path>, data: &[u8], modified_time: u64) {
        let path = path.as_ref().to_path_buf();
        let mut inner = self.lock();
        add_ancestors(&mut inner.dirs, &path);
        inner.files.insert(
            path,
            MemoryFile {
                data: data.to_vec(),
                modified_time,
            },
        );
    }

    pub fn add_dir(&self, path: impl AsRef<Path>) {
        let mut inner = self.lock();
        let path = path.as_ref().to_path_buf();
        add_ancestors(&mut inner.dirs, &path);
        inner.dirs.insert(path);
    }

    pub fn contents(&self, path: impl AsRef<Path>) -> Option<Vec<u8>> {
        self.lock().files.get(path.as_ref()).map(|f| f.data.clone())
    }

    pub fn modified_time(&self, path: impl AsRef<Path>) -> Option<u64> {
        self.lock()
            .files
            .get(path.as_ref())
            .map(|f| f.modified_time)
    }

    pub fn remove(&self, path: impl AsRef<Path>) {
        self.lock().files.remove(path.as_ref());
    }
}

fn add_ancestors(dirs: &mut BTreeSet<PathBuf>, path: &Path) {
    for ancestor in path.ancestors().skip(1) {
        if ancestor.as_os_str().is_empty() {
            break;
        }
        dirs.insert(ancestor.to_path_buf());
    }
}

fn not_found(path: &Path) -> io::Error {
    io::Error::new(
        io::ErrorKind::NotFound,
        format!("no such file: {}", path.display()),
    )
}

#[async_trait]
impl LocalFs for MemoryFs {
    async fn is_dir(&self, path: &Path) -> bool {
        self.lock().dirs.contains(path)
    }

    async fn list_files(&self, root: &Path) -> io::Result<Vec<LocalFile>> {
        let inner = self.lock();
        if !inner.dirs.contains(root) {
            return Err(not_found(root));
        }

        Ok(inner
            .files
            .iter()
            .filter_map(|(path, file)| {
                let relative = path.strip_prefix(root).ok()?;
                let parts: Option<Vec<&str>> =
                    relative.components().map(|c| c.as_os_str().to_str()).collect();
                Some(LocalFile {
                    path: parts?.join("/"),
                    modified_time: file.modified_time,
                })
            })
            .collect())
    }

    async fn read(&self, path: &Path) -> io::Result<Vec<u8>> {
        self.lock()
            .files
            .get(path)
            .map(|f| f.data.clone())
            .ok_or_else(|| not_found(path))
    }

    async fn write(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let mut inner = self.lock();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !inner.dirs.contains(parent) {
                return Err(not_found(parent));
            }
        }
        inner.files.insert(
            path.to_path_buf(),
            MemoryFile {
                data: data.to_vec(),
                modified_time: chrono::Utc::now().timestamp().max(0) as u64,
            },
        );
        Ok(())
    }

    async fn create_dir_all(&self, path: &Path) -> io::Result<()> {
        self.add_dir(path);
        Ok(())
    }

    async fn set_modified_time(&self, path: &Path, secs: u64) -> io::Result<()> {
        let mut inner = self.lock();
        let file = inner.files.get_mut(path).ok_or_else(|| not_found(path))?;
        file.modified_time = secs;
        Ok(())
    }

    async fn remove_file(&self, path: &Path) -> io::Result<()> {
        self.lock()
            .files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| not_found(path))
    }
}
