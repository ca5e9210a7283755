//! 文件清单：相对路径 -> 修改时间（整秒）

use crate::error::ManifestParseError;
use serde::{Deserialize, Serialize};
use std::collections::btree_map::{self, BTreeMap};
use std::path::{Component, Path, PathBuf};

/// 保留的清单文件名，自身永远不出现在清单中
pub const MANIFEST_FILE: &str = "manifest.txt";

/// 一侧的文件清单，按路径字典序排列
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Inventory {
    entries: BTreeMap<String, u64>,
}

impl Inventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: &str) -> Option<u64> {
        self.entries.get(path).copied()
    }

    pub fn contains(&self, path: &str) -> bool {
        self.entries.contains_key(path)
    }

    pub fn insert(&mut self, path: impl Into<String>, modified_time: u64) -> Option<u64> {
        self.entries.insert(path.into(), modified_time)
    }

    pub fn remove(&mut self, path: &str) -> Option<u64> {
        self.entries.remove(path)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, u64> {
        self.entries.iter()
    }

    pub fn paths(&self) -> btree_map::Keys<'_, String, u64> {
        self.entries.keys()
    }

    /// 序列化为清单文档：每行 `path<TAB>timestamp`，按路径排序，以换行结尾
    pub fn to_manifest(&self) -> String {
        let mut out = String::new();
        for (path, modified_time) in &self.entries {
            out.push_str(path);
            out.push('\t');
            out.push_str(&modified_time.to_string());
            out.push('\n');
        }
        out
    }

    /// 解析清单文档，容忍 CRLF 与空行
    pub fn parse_manifest(text: &str) -> Result<Self, ManifestParseError> {
        let mut inventory = Self::new();

        for (index, raw) in text.lines().enumerate() {
            let line_no = index + 1;
            let line = raw.trim_end_matches('\r');
            if line.trim().is_empty() {
                continue;
            }

            let (path, value) = line
                .rsplit_once('\t')
                .ok_or(ManifestParseError::MissingSeparator { line: line_no })?;
            if path.is_empty() {
                return Err(ManifestParseError::EmptyPath { line: line_no });
            }
            let modified_time = value.trim().parse::<u64>().map_err(|_| {
                ManifestParseError::InvalidTimestamp {
                    line: line_no,
                    value: value.to_string(),
                }
            })?;

            inventory.insert(path, modified_time);
        }

        Ok(inventory)
    }
}

impl FromIterator<(String, u64)> for Inventory {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a Inventory {
    type Item = (&'a String, &'a u64);
    type IntoIter = btree_map::Iter<'a, String, u64>;

    fn into_iter(self) -> Self::IntoIter {
        self.entries.iter()
    }
}

/// 将清单中的相对路径解析为本地路径；包含 `..`、绝对路径等越界成分时返回 None
pub fn local_path(root: &Path, relative: &str) -> Option<PathBuf> {
    let mut resolved = root.to_path_buf();
    for component in Path::new(relative).components() {
        match component {
            Component::Normal(part) => resolved.push(part),
            Component::CurDir => {}
            _ => return None,
        }
    }
    (resolved != root).then_some(resolved)
}
