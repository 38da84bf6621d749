//! Configuration management for Quire Server

use serde::Deserialize;
use std::env;

/// Default upload limit for block attachments and covers (25 MiB)
pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub identity: IdentityConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Externally visible base URL, used for share links and local blob URLs
    pub public_base_url: String,
    pub max_upload_bytes: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    /// Root directory for the local provider
    pub root: String,
    pub endpoint: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub region: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageProvider {
    Local,
    Minio,
    R2,
    S3,
    B2,
}

impl StorageProvider {
    pub fn is_s3_compatible(self) -> bool {
        !matches!(self, StorageProvider::Local)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IdentityConfig {
    /// Request header carrying the caller's principal id
    pub header: String,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3000,
                public_base_url: "http://localhost:3000".to_string(),
                max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            },
            storage: StorageConfig {
                provider: StorageProvider::Local,
                root: "./data/blobs".to_string(),
                endpoint: "http://localhost:9000".to_string(),
                bucket: "quire".to_string(),
                access_key: String::new(),
                secret_key: String::new(),
                region: Some("us-east-1".to_string()),
            },
            database: DatabaseConfig {
                url: "sqlite:./quire.db".to_string(),
            },
            identity: IdentityConfig {
                header: "x-user-id".to_string(),
            },
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self, env::VarError> {
        let defaults = Config::default();

        let provider = parse_provider(
            &env::var("STORAGE_PROVIDER").unwrap_or_else(|_| "local".to_string()),
        );

        // Credentials are only mandatory for S3-compatible providers
        let (endpoint, bucket, access_key, secret_key) = if provider.is_s3_compatible() {
            (
                env::var("S3_ENDPOINT")?,
                env::var("S3_BUCKET")?,
                env::var("S3_ACCESS_KEY")?,
                env::var("S3_SECRET_KEY")?,
            )
        } else {
            (
                defaults.storage.endpoint,
                defaults.storage.bucket,
                defaults.storage.access_key,
                defaults.storage.secret_key,
            )
        };

        let port = env::var("SERVER_PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .unwrap_or(3000);

        Ok(Config {
            server: ServerConfig {
                host: env::var("SERVER_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port,
                public_base_url: env::var("PUBLIC_BASE_URL")
                    .map(|url| url.trim_end_matches('/').to_string())
                    .unwrap_or_else(|_| format!("http://localhost:{}", port)),
                max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                    .ok()
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(DEFAULT_MAX_UPLOAD_BYTES),
            },
            storage: StorageConfig {
                provider,
                root: env::var("STORAGE_ROOT").unwrap_or(defaults.storage.root),
                endpoint,
                bucket,
                access_key,
                secret_key,
                region: env::var("S3_REGION").ok().or(defaults.storage.region),
            },
            database: DatabaseConfig {
                url: env::var("DATABASE_URL").unwrap_or(defaults.database.url),
            },
            identity: IdentityConfig {
                header: env::var("IDENTITY_HEADER")
                    .map(|h| h.to_ascii_lowercase())
                    .unwrap_or(defaults.identity.header),
            },
        })
    }
}

fn parse_provider(value: &str) -> StorageProvider {
    match value.to_ascii_lowercase().as_str() {
        "minio" => StorageProvider::Minio,
        "r2" => StorageProvider::R2,
        "s3" => StorageProvider::S3,
        "b2" => StorageProvider::B2,
        _ => StorageProvider::Local,
    }
}
