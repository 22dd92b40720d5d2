//! Process configuration, read from environment variables.

use std::{net::SocketAddr, path::PathBuf};

use crate::commands::Settings;

const DEV_JWT_SECRET: &str = "dev-secret";

#[derive(Clone, Debug)]
pub struct Config {
    /// `BIND_ADDR`, defaults to `0.0.0.0:8080`
    pub bind_addr: SocketAddr,
    /// `JWT_SECRET`, shared secret for member access tokens
    pub jwt_secret: String,
    /// `BLOB_BUCKET`, bucket receiving product images
    pub blob_bucket: String,
    /// `BLOB_ROOT`, local directory backing the blob store
    pub blob_root: PathBuf,
    /// `BLOB_BASE_URL`, public URL prefix of stored objects, by default the `/static` mount of
    /// `BLOB_ROOT` on this server
    pub blob_base_url: String,
    /// `MAX_PURCHASE_ATTEMPTS`, transaction attempts before reporting a conflict
    pub max_purchase_attempts: u32,
}

impl Default for Config {
    fn default() -> Self {
        let settings = Settings::default();
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            jwt_secret: DEV_JWT_SECRET.to_string(),
            blob_bucket: settings.image_bucket,
            blob_root: PathBuf::from("blobs"),
            blob_base_url: "http://localhost:8080/static".to_string(),
            max_purchase_attempts: settings.max_transaction_attempts,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: &'static str, value: String },
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from `lookup`, falling back to defaults for missing keys
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let defaults = Config::default();

        let bind_addr = match lookup("BIND_ADDR") {
            Some(value) => value
                .parse()
                .map_err(|_| ConfigError::InvalidValue {
                    key: "BIND_ADDR",
                    value,
                })?,
            None => defaults.bind_addr,
        };
        let max_purchase_attempts = match lookup("MAX_PURCHASE_ATTEMPTS") {
            Some(value) => match value.parse::<u32>() {
                Ok(attempts) if attempts > 0 => attempts,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "MAX_PURCHASE_ATTEMPTS",
                        value,
                    })
                }
            },
            None => defaults.max_purchase_attempts,
        };
        let jwt_secret = lookup("JWT_SECRET").unwrap_or_else(|| {
            tracing::warn!("JWT_SECRET not set; using insecure dev default");
            defaults.jwt_secret
        });

        Ok(Self {
            bind_addr,
            jwt_secret,
            blob_bucket: lookup("BLOB_BUCKET").unwrap_or(defaults.blob_bucket),
            blob_root: lookup("BLOB_ROOT")
                .map(PathBuf::from)
                .unwrap_or(defaults.blob_root),
            blob_base_url: lookup("BLOB_BASE_URL").unwrap_or(defaults.blob_base_url),
            max_purchase_attempts,
        })
    }

    /// Settings for the command layer
    pub fn settings(&self) -> Settings {
        Settings {
            image_bucket: self.blob_bucket.clone(),
            max_transaction_attempts: self.max_purchase_attempts,
        }
    }
}
