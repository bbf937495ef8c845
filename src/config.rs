//! Environment-driven object store configuration.
//!
//! Credentials come from the environment (the usual deployment story for
//! CI publishing jobs) but are read once, here, and passed around as a
//! value. Missing credentials disable upload; local operations never
//! look at any of this.

use std::env;

use tracing::*;

pub const ENV_ACCESS_KEY_ID: &str = "BLOCKPATCH_ACCESS_KEY_ID";
pub const ENV_SECRET_ACCESS_KEY: &str = "BLOCKPATCH_SECRET_ACCESS_KEY";
pub const ENV_ENDPOINT: &str = "BLOCKPATCH_S3_ENDPOINT";
pub const ENV_BUCKET: &str = "BLOCKPATCH_S3_BUCKET";
pub const ENV_CDN_ID: &str = "BLOCKPATCH_CDN_ID";
pub const ENV_CDN_TOKEN: &str = "BLOCKPATCH_CDN_TOKEN";

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub endpoint: String,
    pub bucket: String,
    /// CDN endpoint in front of the bucket, if any; used only to purge
    /// the changelog after upload.
    pub cdn_id: Option<String>,
    pub cdn_token: Option<String>,
}

impl StoreConfig {
    /// Reads the configuration from the environment, or `None` if any
    /// required variable is missing.
    pub fn from_env() -> Option<Self> {
        let required = |name: &str| match env::var(name) {
            Ok(v) if !v.is_empty() => Some(v),
            _ => {
                debug!("{name} not set");
                None
            }
        };
        let optional = |name: &str| env::var(name).ok().filter(|v| !v.is_empty());

        Some(Self {
            access_key_id: required(ENV_ACCESS_KEY_ID)?,
            secret_access_key: required(ENV_SECRET_ACCESS_KEY)?,
            endpoint: required(ENV_ENDPOINT)?,
            bucket: required(ENV_BUCKET)?,
            cdn_id: optional(ENV_CDN_ID),
            cdn_token: optional(ENV_CDN_TOKEN),
        })
    }
}
