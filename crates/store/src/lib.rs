//! ofs: one file API over heterogeneous storage backends
//!
//! Callers describe the backend once with a [`StoreConfig`] and receive a
//! [`FileStore`] handle; everything after that is backend-agnostic. The
//! local/block backend lives in `ofs-block`, the S3-compatible backend in
//! `ofs-s3`, and the shared contract plus utilities (retry, URL signing,
//! byte ranges, counting) in `ofs-core`.
//!
//! ```no_run
//! use ofs::{BlockConfig, FileStore, Location, StoreConfig, new_file_store};
//!
//! # async fn example() -> ofs::Result<()> {
//! let store = new_file_store(StoreConfig::Block(BlockConfig::default())).await?;
//! let info = store.get_object_info(&Location::new("/data/input.tif")).await?;
//! println!("{} bytes", info.size);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

pub use ofs_block::BlockStore;
pub use ofs_core::{
    BlockConfig, ByteRange, CompletedUpload, CopyObjectInput, CountInput, Credentials,
    DeleteObjectsInput, Error, ErrorPolicy, FileOperationOutput, FileStore, GetObjectInput,
    ListDirInput, ListEntry, Location, MinioConfig, ObjectBody, ObjectInfo, ObjectSource,
    PathParts, ProgressEvent, ProgressFn, PutObjectInput, Result, RetryBuilder, RetryConfig,
    S3Config, StoreConfig, UploadChunk, UploadResult, WalkEntry, WalkInput, WalkVisitor, count,
    is_retryable_error, presign_url, retry_with_backoff, verify_url,
};
pub use ofs_s3::S3Store;

/// Construct the backend selected by the configuration and return it behind
/// the shared contract.
///
/// Invalid or missing credentials for the chosen kind fail here, at
/// construction time.
pub async fn new_file_store(config: StoreConfig) -> Result<Arc<dyn FileStore>> {
    match config {
        StoreConfig::Block(block) => Ok(Arc::new(BlockStore::new(block))),
        StoreConfig::S3(s3) => Ok(Arc::new(S3Store::connect(s3).await?)),
        StoreConfig::Minio(minio) => Ok(Arc::new(S3Store::connect_minio(minio).await?)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;

    #[tokio::test]
    async fn test_factory_builds_block_store() {
        let store = new_file_store(StoreConfig::Block(BlockConfig::default()))
            .await
            .unwrap();
        assert_eq!(store.resource_name(), "");
    }

    #[tokio::test]
    async fn test_block_store_round_trip_through_contract() {
        let dir = tempfile::tempdir().unwrap();
        let store = new_file_store(StoreConfig::Block(BlockConfig::default()))
            .await
            .unwrap();

        let dest = dir.path().join("hello.txt").to_string_lossy().into_owned();
        let output = store
            .put_object(PutObjectInput {
                source: ObjectSource::Data(Bytes::from_static(b"hello ofs")),
                dest: Location::new(&dest),
                multipart: false,
                part_size: None,
            })
            .await
            .unwrap();
        assert!(!output.etag.is_empty());

        let info = store.get_object_info(&Location::new(&dest)).await.unwrap();
        assert_eq!(info.size, 9);
        assert!(!info.is_dir);

        let total = count(CountInput {
            store: store.as_ref(),
            dir: Location::new(dir.path().to_string_lossy()),
            pattern: None,
        })
        .await
        .unwrap();
        // the walk visits the root directory and the file
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_factory_rejects_unsupported_credentials() {
        let err = new_file_store(StoreConfig::S3(S3Config {
            region: "us-east-1".to_string(),
            bucket: "data".to_string(),
            delimiter: None,
            max_keys: None,
            endpoint: None,
            credentials: Credentials::Role {
                arn: "arn:aws:iam::123456789012:role/reader".to_string(),
            },
        }))
        .await
        .err()
        .unwrap();
        assert!(matches!(err, Error::Config(_)));
    }
}
