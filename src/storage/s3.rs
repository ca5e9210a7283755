use super::{
    ObjectInfo, ObjectMeta, ObjectStore, PutOptions, Visibility, IO_TIMEOUT_SECS, OP_TIMEOUT_SECS,
};
use crate::config::StoreConfig;
use anyhow::Result;
use async_trait::async_trait;
use aws_sdk_s3::config::timeout::TimeoutConfig;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::ObjectCannedAcl;
use futures::TryStreamExt;
use opendal::{layers::TimeoutLayer, Metakey, Operator};
use std::time::Duration;

/// S3 存储，键为桶内的完整对象键
///
/// 列表、读取、删除走 opendal；上传走 aws-sdk-s3，因为 opendal 无法为单个对象设置 ACL
pub struct S3Storage {
    operator: Operator,
    client: aws_sdk_s3::Client,
    bucket: String,
    name: String,
}

impl S3Storage {
    pub fn new(bucket: &str, config: &StoreConfig) -> Result<Self> {
        use opendal::services::S3;

        let access_key = config
            .access_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("S3 storage requires accessKey"))?;
        let secret_key = config
            .secret_key
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("S3 storage requires secretKey"))?;

        let mut builder = S3::default()
            .bucket(bucket)
            .region(&config.region)
            .access_key_id(access_key)
            .secret_access_key(secret_key)
            .root("/");

        let mut client_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(config.region.clone()))
            .credentials_provider(Credentials::new(access_key, secret_key, None, None, "s3sync"))
            .timeout_config(
                TimeoutConfig::builder()
                    .operation_timeout(Duration::from_secs(IO_TIMEOUT_SECS))
                    .build(),
            );

        if let Some(ref ep) = config.endpoint {
            builder = builder.endpoint(ep);
            // 自定义端点（MinIO 等）通常只支持路径风格
            client_config = client_config.endpoint_url(ep).force_path_style(true);
        }

        // 添加超时层
        let operator = Operator::new(builder)?
            .layer(
                TimeoutLayer::default()
                    .with_timeout(Duration::from_secs(OP_TIMEOUT_SECS))
                    .with_io_timeout(Duration::from_secs(IO_TIMEOUT_SECS)),
            )
            .finish();

        tracing::info!("初始化S3存储: bucket={}, region={}", bucket, config.region);

        Ok(Self {
            operator,
            client: aws_sdk_s3::Client::from_conf(client_config.build()),
            bucket: bucket.to_string(),
            name: format!("s3://{}", bucket),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Storage {
    async fn list_objects(&self, prefix: &str) -> Result<Vec<ObjectInfo>> {
        let mut objects = Vec::new();
        let path = if prefix.is_empty() { "/" } else { prefix };

        let mut lister = self
            .operator
            .lister_with(path)
            .recursive(true)
            .metakey(Metakey::ContentLength | Metakey::LastModified | Metakey::Mode)
            .await?;

        while let Some(entry) = lister.try_next().await? {
            let key = entry.path().trim_start_matches('/').to_string();
            let meta = entry.metadata();

            objects.push(ObjectInfo {
                key,
                size: meta.content_length(),
                last_modified: meta.last_modified().map(|t| t.timestamp()),
                is_dir: meta.is_dir(),
            });
        }

        Ok(objects)
    }

    async fn stat(&self, key: &str) -> Result<Option<ObjectMeta>> {
        match self.operator.stat(key).await {
            Ok(meta) => Ok(Some(ObjectMeta {
                size: meta.content_length(),
                last_modified: meta.last_modified().map(|t| t.timestamp()),
                content_type: meta.content_type().map(str::to_string),
                user_metadata: meta.user_metadata().cloned().unwrap_or_default(),
            })),
            Err(e) if e.kind() == opendal::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn read(&self, key: &str) -> Result<Vec<u8>> {
        let data = self.operator.read(key).await?;
        Ok(data.to_vec())
    }

    async fn write(&self, key: &str, data: Vec<u8>, options: PutOptions) -> Result<()> {
        let size = data.len();
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(data))
            .content_type(options.content_type)
            .set_metadata(Some(options.user_metadata))
            .acl(canned_acl(options.visibility))
            .send()
            .await
            .map_err(|e| anyhow::anyhow!("上传 {} 失败: {}", key, DisplayErrorContext(&e)))?;

        tracing::trace!("已上传 {} ({} 字节, {:?})", key, size, options.visibility);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<()> {
        // S3 删除不存在的文件不会报错
        self.operator.delete(key).await?;
        Ok(())
    }

    fn name(&self) -> &str {
        &self.name
    }
}

fn canned_acl(visibility: Visibility) -> ObjectCannedAcl {
    match visibility {
        Visibility::Private => ObjectCannedAcl::Private,
        Visibility::PublicRead => ObjectCannedAcl::PublicRead,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials() -> StoreConfig {
        StoreConfig {
            access_key: Some("AK".to_string()),
            secret_key: Some("SK".to_string()),
            ..StoreConfig::default()
        }
    }

    #[test]
    fn test_visibility_maps_to_canned_acl() {
        assert_eq!(canned_acl(Visibility::PublicRead), ObjectCannedAcl::PublicRead);
        assert_eq!(canned_acl(Visibility::Private), ObjectCannedAcl::Private);
        assert_eq!(canned_acl(Visibility::PublicRead).as_str(), "public-read");
    }

    #[tokio::test]
    async fn test_new_requires_credentials() {
        let err = S3Storage::new("bucket", &StoreConfig::default()).err().unwrap();
        assert!(err.to_string().contains("accessKey"));
    }

    #[tokio::test]
    async fn test_new_with_custom_endpoint() {
        let mut config = credentials();
        config.endpoint = Some("http://127.0.0.1:9000".to_string());

        let storage = S3Storage::new("bucket", &config).unwrap();
        assert_eq!(storage.name(), "s3://bucket");
        assert_eq!(storage.bucket, "bucket");
    }
}
