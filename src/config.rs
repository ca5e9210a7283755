//! 应用配置模块

use crate::core::{SyncConfig, DEFAULT_CHECKPOINT_INTERVAL};
use crate::error::{Result, SyncError};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// 配置文件名
pub const CONFIG_FILE: &str = "config.json";

/// 默认配置目录
pub fn config_dir() -> PathBuf {
    dirs::config_dir()
        .map(|p| p.join("s3sync"))
        .unwrap_or_else(|| PathBuf::from(".s3sync"))
}

/// 读取 config.json 中的某一节；文件或节不存在、格式错误时返回默认值
pub(crate) fn load_section<T: DeserializeOwned + Default>(config_dir: &Path, section: &str) -> T {
    let config_file = config_dir.join(CONFIG_FILE);
    fs::read_to_string(&config_file)
        .ok()
        .and_then(|content| serde_json::from_str::<serde_json::Value>(&content).ok())
        .and_then(|config| config.get(section).cloned())
        .and_then(|value| match serde_json::from_value::<T>(value) {
            Ok(v) => Some(v),
            Err(e) => {
                tracing::warn!("配置节 {} 无效，使用默认值: {}", section, e);
                None
            }
        })
        .unwrap_or_default()
}

/// S3 连接配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_key: Option<String>,
}

fn default_region() -> String {
    "us-east-1".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            region: default_region(),
            endpoint: None,
            access_key: None,
            secret_key: None,
        }
    }
}

impl StoreConfig {
    /// 从配置文件加载 S3 配置
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "s3")
    }

    /// 读取两行格式的密钥文件：第一行 access key，第二行 secret key
    pub fn apply_keys_file(&mut self, path: &Path) -> Result<()> {
        let content = fs::read_to_string(path).map_err(|e| SyncError::io(path, e))?;
        let mut lines = content.lines().map(str::trim);

        match (lines.next(), lines.next()) {
            (Some(access), Some(secret)) if !access.is_empty() && !secret.is_empty() => {
                self.access_key = Some(access.to_string());
                self.secret_key = Some(secret.to_string());
                Ok(())
            }
            _ => Err(SyncError::Config(format!(
                "key file {} must contain the access key and secret key on two lines",
                path.display()
            ))),
        }
    }

    /// 按 命令行/环境变量 > 密钥文件 > config.json 的顺序合并
    pub fn merge_overrides(&mut self, overrides: StoreOverrides) -> Result<()> {
        if let Some(path) = &overrides.keys_file {
            self.apply_keys_file(path)?;
        }
        if let Some(region) = overrides.region {
            self.region = region;
        }
        if overrides.endpoint.is_some() {
            self.endpoint = overrides.endpoint;
        }
        if overrides.access_key.is_some() {
            self.access_key = overrides.access_key;
        }
        if overrides.secret_key.is_some() {
            self.secret_key = overrides.secret_key;
        }
        Ok(())
    }

    /// 检查凭证是否齐全
    pub fn validate(&self) -> Result<()> {
        if self.access_key.is_none() || self.secret_key.is_none() {
            return Err(SyncError::Config(
                "missing S3 credentials (set accessKey/secretKey, AWS_ACCESS_KEY_ID/AWS_SECRET_ACCESS_KEY, or --keys-file)"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

/// 命令行或环境变量给出的 S3 配置，优先级高于密钥文件和 config.json
#[derive(Debug, Clone, Default)]
pub struct StoreOverrides {
    pub region: Option<String>,
    pub endpoint: Option<String>,
    pub access_key: Option<String>,
    pub secret_key: Option<String>,
    pub keys_file: Option<PathBuf>,
}

/// 同步行为配置
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncSettings {
    #[serde(default = "default_checkpoint_interval")]
    pub checkpoint_interval: usize,
    #[serde(default = "default_keep_local_manifest")]
    pub keep_local_manifest: bool,
}

fn default_checkpoint_interval() -> usize {
    DEFAULT_CHECKPOINT_INTERVAL
}

fn default_keep_local_manifest() -> bool {
    true
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            checkpoint_interval: default_checkpoint_interval(),
            keep_local_manifest: default_keep_local_manifest(),
        }
    }
}

impl SyncSettings {
    pub fn load(config_dir: &Path) -> Self {
        load_section(config_dir, "sync")
    }
}

impl From<SyncSettings> for SyncConfig {
    fn from(settings: SyncSettings) -> Self {
        SyncConfig {
            checkpoint_interval: settings.checkpoint_interval,
            keep_local_manifest: settings.keep_local_manifest,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_config_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let store = StoreConfig::load(dir.path());
        assert_eq!(store.region, "us-east-1");
        assert!(store.validate().is_err());
        assert_eq!(SyncSettings::load(dir.path()).checkpoint_interval, 100);
    }

    #[test]
    fn test_sections_are_read() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{
                "s3": { "region": "eu-west-1", "accessKey": "AK", "secretKey": "SK" },
                "sync": { "checkpointInterval": 25 }
            }"#,
        )
        .unwrap();

        let store = StoreConfig::load(dir.path());
        assert_eq!(store.region, "eu-west-1");
        assert_eq!(store.access_key.as_deref(), Some("AK"));
        assert!(store.validate().is_ok());

        let settings = SyncSettings::load(dir.path());
        assert_eq!(settings.checkpoint_interval, 25);
        assert!(settings.keep_local_manifest);
    }

    #[test]
    fn test_keys_file() {
        let dir = tempfile::tempdir().unwrap();
        let keys = dir.path().join("keys.txt");
        fs::write(&keys, "AKIA123\n  secret/abc  \n").unwrap();

        let mut store = StoreConfig::default();
        store.apply_keys_file(&keys).unwrap();
        assert_eq!(store.access_key.as_deref(), Some("AKIA123"));
        assert_eq!(store.secret_key.as_deref(), Some("secret/abc"));

        fs::write(&keys, "only-one-line\n").unwrap();
        assert!(matches!(
            store.apply_keys_file(&keys),
            Err(SyncError::Config(_))
        ));
    }

    #[test]
    fn test_override_precedence() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{ "s3": { "region": "eu-west-1", "endpoint": "http://json", "accessKey": "JSON_AK", "secretKey": "JSON_SK" } }"#,
        )
        .unwrap();
        let keys = dir.path().join("keys.txt");
        fs::write(&keys, "FILE_AK\nFILE_SK\n").unwrap();

        let mut store = StoreConfig::load(dir.path());
        store
            .merge_overrides(StoreOverrides {
                access_key: Some("FLAG_AK".to_string()),
                keys_file: Some(keys),
                ..Default::default()
            })
            .unwrap();

        // 命令行覆盖密钥文件，密钥文件覆盖 config.json
        assert_eq!(store.access_key.as_deref(), Some("FLAG_AK"));
        assert_eq!(store.secret_key.as_deref(), Some("FILE_SK"));
        // 未覆盖的字段保留 config.json 的值
        assert_eq!(store.region, "eu-west-1");
        assert_eq!(store.endpoint.as_deref(), Some("http://json"));

        store
            .merge_overrides(StoreOverrides {
                region: Some("ap-south-1".to_string()),
                endpoint: Some("http://flag".to_string()),
                ..Default::default()
            })
            .unwrap();
        assert_eq!(store.region, "ap-south-1");
        assert_eq!(store.endpoint.as_deref(), Some("http://flag"));
        assert_eq!(store.access_key.as_deref(), Some("FLAG_AK"));
    }

    #[test]
    fn test_missing_keys_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StoreConfig::default();
        let err = store
            .merge_overrides(StoreOverrides {
                keys_file: Some(dir.path().join("absent.txt")),
                ..Default::default()
            })
            .unwrap_err();
        assert!(matches!(err, SyncError::Io { .. }));
    }
}
