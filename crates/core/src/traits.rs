//! The shared backend contract
//!
//! Every backend presents the same capability set: paginated listing,
//! metadata lookup, ranged reads, single-shot and multipart writes, copy,
//! recursive delete and a visitor-driven walk. Callers hold a
//! `dyn FileStore` and stay backend-agnostic.

use async_trait::async_trait;
use tokio::io::AsyncRead;

use crate::error::{Error, Result};
use crate::types::{
    CompletedUpload, CopyObjectInput, DeleteObjectsInput, FileOperationOutput, GetObjectInput,
    ListDirInput, ListEntry, Location, ObjectInfo, PutObjectInput, UploadChunk, UploadResult,
    WalkInput,
};

/// A readable byte stream returned from `get_object`.
///
/// The caller owns the stream and is responsible for reading it to the end
/// or dropping it.
pub type ObjectBody = Box<dyn AsyncRead + Send + Unpin>;

/// One object visited during a walk
#[derive(Debug, Clone)]
pub struct WalkEntry {
    /// Backend path of the entry, rooted with a leading slash
    pub path: String,
    pub info: ObjectInfo,
}

/// Visitor callback invoked for each object identified by a walk.
///
/// How a visitor error is handled is governed by the walk input's
/// [`ErrorPolicy`](crate::types::ErrorPolicy).
pub type WalkVisitor<'a> = &'a mut (dyn FnMut(&WalkEntry) -> Result<()> + Send);

/// The capability contract implemented by every storage backend
#[async_trait]
pub trait FileStore: Send + Sync {
    /// Request a slice of resources at a store directory, paginated and
    /// optionally filtered. Ordinals in the result are page-local.
    async fn list_dir(&self, input: ListDirInput) -> Result<Vec<ListEntry>>;

    /// Metadata lookup. A missing path fails with the distinguished
    /// not-found kind so callers can implement existence checks.
    async fn get_object_info(&self, path: &Location) -> Result<ObjectInfo>;

    /// Open a resource for reading, optionally restricted to a byte range
    async fn get_object(&self, input: GetObjectInput) -> Result<ObjectBody>;

    /// A backend-identifying label: empty for the local backend, the bucket
    /// name for object storage. Used by copy operations that must reference
    /// their own location.
    fn resource_name(&self) -> String;

    /// Put (upload) an object from any source, single-shot or multipart
    async fn put_object(&self, input: PutObjectInput) -> Result<FileOperationOutput>;

    /// Copy an object within this store
    async fn copy_object(&self, input: CopyObjectInput) -> Result<()>;

    /// Start a multipart upload session for the destination, returning the
    /// opaque session id the caller must supply to every subsequent call
    async fn initialize_object_upload(&self, dest: &Location) -> Result<UploadResult>;

    /// Write one chunk of an open upload session
    async fn write_chunk(&self, chunk: UploadChunk) -> Result<UploadResult>;

    /// Complete a multipart upload session. Chunk identifiers must be in
    /// chunk order.
    async fn complete_object_upload(&self, input: CompletedUpload) -> Result<FileOperationOutput>;

    /// Delete the given paths, recursively where a path resolves to a
    /// directory or prefix. Continues past individual failures (subject to
    /// the input's error policy) and returns the per-item errors; an empty
    /// vector means everything was deleted.
    async fn delete_objects(&self, input: DeleteObjectsInput) -> Vec<Error>;

    /// Walk the store from a starting path, invoking the visitor for each
    /// object found
    async fn walk(&self, input: WalkInput, visitor: WalkVisitor<'_>) -> Result<()>;
}
