//! ofs-s3: S3-compatible object storage backend
//!
//! Wraps aws-sdk-s3 and implements the FileStore contract from ofs-core,
//! reconciling object-API semantics (paginated listings, multipart uploads,
//! server-side part copies, bulk deletes) with the shared file contract.

mod client;

pub use client::S3Store;
