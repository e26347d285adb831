//! Backend configuration
//!
//! Backend selection is a closed tagged union resolved once, at construction
//! time, into a handle implementing the shared contract. Credential and
//! endpoint resolution for the cloud SDK happens inside the chosen backend.

use serde::{Deserialize, Serialize};

/// Default object-listing page cap
pub const DEFAULT_MAX_KEYS: i32 = 1000;
/// Default prefix delimiter for object storage listings
pub const DEFAULT_DELIMITER: &str = "/";
/// Default chunk size for offset-addressed multipart writes: 10 MiB
pub const DEFAULT_CHUNK_SIZE: u64 = 10 * 1024 * 1024;

/// Selects and parameterizes one concrete backend
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StoreConfig {
    /// Local/block filesystem
    Block(BlockConfig),
    /// S3-compatible object storage reached through the normal endpoint
    /// resolution chain
    S3(S3Config),
    /// S3-compatible object storage behind a static host address
    /// (MinIO-style); requires static credentials
    Minio(MinioConfig),
}

/// Local backend options
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockConfig {
    /// Byte offset multiplier for multipart chunk writes;
    /// [`DEFAULT_CHUNK_SIZE`] when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_size: Option<u64>,
}

/// S3-compatible backend options
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct S3Config {
    pub region: String,
    pub bucket: String,
    /// Listing delimiter; [`DEFAULT_DELIMITER`] when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delimiter: Option<String>,
    /// Listing page cap; [`DEFAULT_MAX_KEYS`] when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_keys: Option<i32>,
    /// Alternate endpoint URL; implies path-style addressing
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    pub credentials: Credentials,
}

/// MinIO-style configuration: plain S3 options plus a static host address
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinioConfig {
    #[serde(flatten)]
    pub s3: S3Config,
    pub host_address: String,
}

/// Credential shapes accepted by the object-storage backends
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Credentials {
    /// Static access/secret key pair
    Static {
        access_key: String,
        secret_key: String,
    },
    /// Ambient credentials; an empty profile invokes the default chain
    Attached { profile: Option<String> },
    /// Assumed role; currently rejected at construction
    Role { arn: String },
}
