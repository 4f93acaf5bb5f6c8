//! S3 progress mirror.

use async_trait::async_trait;
use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_s3::operation::get_object::GetObjectError;
use aws_sdk_s3::operation::put_object::PutObjectError;
use aws_sdk_s3::primitives::ByteStream;
use tracing::debug;

use super::config::S3Config;
use super::error::RemoteError;
use super::traits::{RemoteBackend, RemoteDocument, VersionToken};

/// Progress document stored as a single S3 object.
///
/// The object's ETag is the version token. Writes are unconditional
/// overwrites; the expected version is ignored.
#[derive(Debug, Clone)]
pub struct S3Backend {
    client: aws_sdk_s3::Client,
    bucket: String,
}

impl S3Backend {
    pub async fn new(config: &S3Config) -> Result<Self, RemoteError> {
        if config.bucket.trim().is_empty() {
            return Err(RemoteError::NotConfigured(
                "S3 bucket name is required".to_string(),
            ));
        }

        let shared = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        let mut builder =
            aws_sdk_s3::config::Builder::from(&shared).region(Region::new(config.region.clone()));

        match (&config.access_key_id, &config.secret_access_key) {
            (Some(key_id), Some(secret)) => {
                builder = builder.credentials_provider(Credentials::new(
                    key_id.clone(),
                    secret.clone(),
                    None,
                    None,
                    "harvest-config",
                ));
            }
            (None, None) => {}
            _ => {
                return Err(RemoteError::NotConfigured(
                    "S3 access_key_id and secret_access_key must be set together".to_string(),
                ))
            }
        }

        if let Some(url) = &config.endpoint_url {
            builder = builder.endpoint_url(url);
        }
        if config
            .force_path_style
            .unwrap_or(config.endpoint_url.is_some())
        {
            builder = builder.force_path_style(true);
        }

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(builder.build()),
            bucket: config.bucket.clone(),
        })
    }
}

#[async_trait]
impl RemoteBackend for S3Backend {
    fn name(&self) -> &str {
        "s3"
    }

    async fn fetch(&self, key: &str) -> Result<Option<RemoteDocument>, RemoteError> {
        debug!("S3 get_object: bucket={}, key={}", self.bucket, key);

        let out = match self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(out) => out,
            Err(SdkError::ServiceError(se)) if se.err().is_no_such_key() => return Ok(None),
            Err(err) => return Err(map_get_err(err)),
        };

        let version = VersionToken(out.e_tag().unwrap_or_default().to_string());
        let bytes = out
            .body
            .collect()
            .await
            .map_err(|e| RemoteError::Unavailable(format!("s3 body read failed: {}", e)))?;

        Ok(Some(RemoteDocument {
            body: bytes.into_bytes().to_vec(),
            version,
        }))
    }

    async fn write(
        &self,
        key: &str,
        body: &[u8],
        _expected: Option<&VersionToken>,
    ) -> Result<VersionToken, RemoteError> {
        debug!(
            "S3 put_object: bucket={}, key={}, bytes={}",
            self.bucket,
            key,
            body.len()
        );

        let out = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type("application/json")
            .body(ByteStream::from(body.to_vec()))
            .send()
            .await
            .map_err(map_put_err)?;

        Ok(VersionToken(out.e_tag().unwrap_or_default().to_string()))
    }
}

fn map_get_err(err: SdkError<GetObjectError>) -> RemoteError {
    match err {
        SdkError::ServiceError(ref se) => RemoteError::Api {
            status: se.raw().status().as_u16(),
            message: se.err().message().unwrap_or("get_object failed").to_string(),
        },
        other => RemoteError::Unavailable(format!("s3 get_object failed: {:?}", other)),
    }
}

fn map_put_err(err: SdkError<PutObjectError>) -> RemoteError {
    match err {
        SdkError::ServiceError(ref se) => RemoteError::Api {
            status: se.raw().status().as_u16(),
            message: se.err().message().unwrap_or("put_object failed").to_string(),
        },
        other => RemoteError::Unavailable(format!("s3 put_object failed: {:?}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(bucket: &str) -> S3Config {
        S3Config {
            bucket: bucket.to_string(),
            region: "ap-south-1".to_string(),
            access_key_id: None,
            secret_access_key: None,
            endpoint_url: Some("http://127.0.0.1:9000".to_string()),
            force_path_style: None,
        }
    }

    #[tokio::test]
    async fn test_rejects_empty_bucket() {
        let err = S3Backend::new(&config("  ")).await.unwrap_err();
        assert!(matches!(err, RemoteError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_rejects_half_credentials() {
        let mut cfg = config("igr");
        cfg.access_key_id = Some("AKIA".to_string());
        let err = S3Backend::new(&cfg).await.unwrap_err();
        assert!(matches!(err, RemoteError::NotConfigured(_)));
    }

    #[tokio::test]
    async fn test_builds_with_static_credentials() {
        let mut cfg = config("igr");
        cfg.access_key_id = Some("AKIA".to_string());
        cfg.secret_access_key = Some("secret".to_string());
        let backend = S3Backend::new(&cfg).await.unwrap();
        assert_eq!(backend.name(), "s3");
    }
}
