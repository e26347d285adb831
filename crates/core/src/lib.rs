//! ofs-core: the shared contract for the ofs storage abstraction layer
//!
//! This crate provides everything backend-agnostic:
//! - The `FileStore` trait every backend implements
//! - Location/source/listing value types and the multipart session types
//! - The error taxonomy with a distinguished not-found kind
//! - Byte range expression parsing
//! - Retry with exponential backoff and jitter
//! - HMAC URL signing and verification
//! - Backend configuration as a closed tagged union
//!
//! This crate is independent of any specific storage SDK, allowing for easy
//! testing and additional backends.

pub mod config;
pub mod count;
pub mod error;
pub mod path;
pub mod range;
pub mod retry;
pub mod sign;
pub mod traits;
pub mod types;

pub use config::{
    BlockConfig, Credentials, DEFAULT_CHUNK_SIZE, DEFAULT_DELIMITER, DEFAULT_MAX_KEYS, MinioConfig,
    S3Config, StoreConfig,
};
pub use count::{CountInput, count};
pub use error::{Error, Result};
pub use path::PathParts;
pub use range::ByteRange;
pub use retry::{RetryBuilder, RetryConfig, is_retryable_error, retry_with_backoff};
pub use sign::{presign_url, verify_url};
pub use traits::{FileStore, ObjectBody, WalkEntry, WalkVisitor};
pub use types::{
    CompletedUpload, CopyObjectInput, DeleteObjectsInput, ErrorPolicy, FileOperationOutput,
    GetObjectInput, ListDirInput, ListEntry, Location, ObjectInfo, ObjectSource, ProgressEvent,
    ProgressFn, PutObjectInput, UploadChunk, UploadResult, WalkInput,
};
