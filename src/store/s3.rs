//! An S3-compatible bucket, usually with a CDN in front.

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::config::{BehaviorVersion, Credentials, Region};
use aws_sdk_s3::primitives::ByteStream;
use tracing::*;

use super::ObjectStore;
use crate::config::StoreConfig;

pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    cdn_id: Option<String>,
    cdn_token: Option<String>,
    http: reqwest::Client,
}

impl S3Store {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let credentials = Credentials::new(
            &config.access_key_id,
            &config.secret_access_key,
            None,
            None,
            "blockpatch",
        );
        let s3_config = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            // S3-compatible endpoints don't care, but the SDK insists.
            .region(Region::new("us-east-1"))
            .endpoint_url(&config.endpoint)
            .credentials_provider(credentials)
            .force_path_style(true)
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket,
            cdn_id: config.cdn_id,
            cdn_token: config.cdn_token,
            http: reqwest::Client::new(),
        })
    }
}

#[async_trait]
impl ObjectStore for S3Store {
    async fn put(&self, key: &str, bytes: &[u8]) -> Result<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(ByteStream::from(bytes.to_vec()))
            .send()
            .await
            .with_context(|| format!("Couldn't upload {key}"))?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let object = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Couldn't fetch {key}"))?;
        let bytes = object
            .body
            .collect()
            .await
            .with_context(|| format!("Couldn't read {key}"))?;
        Ok(bytes.into_bytes().to_vec())
    }

    async fn list(&self, prefix: &str) -> Result<Vec<String>> {
        let mut keys = Vec::new();
        let mut continuation: Option<String> = None;
        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix);
            if let Some(token) = continuation.take() {
                request = request.continuation_token(token);
            }
            let response = request
                .send()
                .await
                .with_context(|| format!("Couldn't list {prefix}"))?;

            for object in response.contents() {
                if let Some(key) = object.key() {
                    keys.push(key.to_owned());
                }
            }

            if response.is_truncated() == Some(true) {
                continuation = response.next_continuation_token().map(str::to_owned);
            } else {
                break;
            }
        }
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .with_context(|| format!("Couldn't delete {key}"))?;
        Ok(())
    }

    async fn purge_cache(&self, key: &str) -> Result<()> {
        let (Some(cdn_id), Some(token)) = (&self.cdn_id, &self.cdn_token) else {
            warn!("No CDN configured, skipping cache purge for {key}");
            return Ok(());
        };

        // DigitalOcean-style CDN endpoint purge; other CDNs are fronted
        // by their own tooling.
        let url = format!("https://api.digitalocean.com/v2/cdn/endpoints/{cdn_id}/cache");
        let response = self
            .http
            .delete(&url)
            .bearer_auth(token)
            .json(&serde_json::json!({ "files": [key] }))
            .send()
            .await
            .with_context(|| format!("Couldn't purge CDN cache for {key}"))?;

        anyhow::ensure!(
            response.status().is_success(),
            "CDN purge for {key} failed: {}",
            response.status()
        );
        info!("Purged CDN cache for {key}");
        Ok(())
    }
}
