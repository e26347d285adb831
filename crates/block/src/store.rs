//! Block filesystem implementation of the `FileStore` contract

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use md5::{Digest, Md5};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

use ofs_core::error::{Error, Result};
use ofs_core::range::ByteRange;
use ofs_core::traits::{FileStore, ObjectBody, WalkEntry, WalkVisitor};
use ofs_core::types::{
    CompletedUpload, CopyObjectInput, DeleteObjectsInput, ErrorPolicy, FileOperationOutput,
    GetObjectInput, ListDirInput, ListEntry, Location, ObjectInfo, ProgressEvent, PutObjectInput,
    UploadChunk, UploadResult, WalkInput,
};
use ofs_core::{BlockConfig, DEFAULT_CHUNK_SIZE};

/// Local/block filesystem backend.
///
/// Multipart chunk writes are serialized per destination path: the lock is
/// registered when a session is initialized and held for the duration of
/// each chunk write, so concurrent writers to one destination cannot
/// interleave positioned writes.
pub struct BlockStore {
    chunk_size: u64,
    locks: Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>,
}

impl BlockStore {
    pub fn new(config: BlockConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.unwrap_or(DEFAULT_CHUNK_SIZE),
            locks: Mutex::new(HashMap::new()),
        }
    }

    fn chunk_lock(&self, path: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut registry = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        registry
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone()
    }

    fn release_chunk_lock(&self, path: &str) {
        let mut registry = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        registry.remove(path);
    }
}

fn map_io_err(err: std::io::Error, path: &str) -> Error {
    if err.kind() == std::io::ErrorKind::NotFound {
        Error::NotFound(path.to_string())
    } else {
        Error::Io(err)
    }
}

fn info_from_metadata(name: &str, meta: &std::fs::Metadata) -> ObjectInfo {
    ObjectInfo {
        name: name.to_string(),
        size: meta.len() as i64,
        modified: meta
            .modified()
            .ok()
            .and_then(|t| jiff::Timestamp::try_from(t).ok()),
        is_dir: meta.is_dir(),
        etag: None,
    }
}

fn extension_of(name: &str) -> String {
    Path::new(name)
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default()
}

fn base_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string())
}

/// Hash a file's full contents, reading from the start
async fn file_md5(file: &mut fs::File) -> Result<String> {
    file.seek(SeekFrom::Start(0)).await?;
    let mut hasher = Md5::new();
    let mut buf = vec![0u8; 64 * 1024];
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }
    Ok(hex::encode(hasher.finalize()))
}

fn cancelled(token: &Option<tokio_util::sync::CancellationToken>) -> bool {
    token.as_ref().is_some_and(|t| t.is_cancelled())
}

#[async_trait]
impl FileStore for BlockStore {
    /// List a directory using native enumeration. Page, size and filter are
    /// not honored here: the filesystem listing is returned whole, sorted by
    /// name.
    async fn list_dir(&self, input: ListDirInput) -> Result<Vec<ListEntry>> {
        let dir = &input.path.path;
        let mut read_dir = fs::read_dir(dir).await.map_err(|e| map_io_err(e, dir))?;

        let mut entries = Vec::new();
        while let Some(entry) = read_dir.next_entry().await.map_err(Error::Io)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            let meta = entry.metadata().await.map_err(Error::Io)?;
            entries.push((name, meta));
        }
        entries.sort_by(|a, b| a.0.cmp(&b.0));

        Ok(entries
            .into_iter()
            .enumerate()
            .map(|(id, (name, meta))| ListEntry {
                id,
                kind: extension_of(&name),
                size: meta.len().to_string(),
                path: dir.clone(),
                is_dir: meta.is_dir(),
                modified: meta
                    .modified()
                    .ok()
                    .and_then(|t| jiff::Timestamp::try_from(t).ok()),
                modified_by: String::new(),
                name,
            })
            .collect())
    }

    async fn get_object_info(&self, path: &Location) -> Result<ObjectInfo> {
        let meta = fs::metadata(&path.path)
            .await
            .map_err(|e| map_io_err(e, &path.path))?;
        Ok(info_from_metadata(&base_name(&path.path), &meta))
    }

    /// Open a file for reading. A ranged read loads exactly `end - start`
    /// bytes at the requested offset into a fresh buffer and returns a
    /// reader over that buffer.
    async fn get_object(&self, input: GetObjectInput) -> Result<ObjectBody> {
        let path = &input.path.path;
        let mut file = fs::File::open(path).await.map_err(|e| map_io_err(e, path))?;

        let Some(expr) = &input.range else {
            return Ok(Box::new(file));
        };

        let range = ByteRange::parse(expr)?;
        let size = file.metadata().await.map_err(Error::Io)?.len();
        if range.end > size {
            return Err(Error::InvalidRange(format!(
                "range end {} exceeds object size {size}",
                range.end
            )));
        }

        let mut buf = vec![0u8; (range.end - range.start) as usize];
        file.seek(SeekFrom::Start(range.start)).await?;
        file.read_exact(&mut buf).await?;
        Ok(Box::new(std::io::Cursor::new(buf)))
    }

    fn resource_name(&self) -> String {
        String::new()
    }

    /// Write an object from any source. An explicitly empty buffer source is
    /// a directory-creation shortcut: the destination's parent is created and
    /// nothing is written. The returned ETag is the MD5 of the written file,
    /// computed by re-reading it.
    async fn put_object(&self, input: PutObjectInput) -> Result<FileOperationOutput> {
        let dest = &input.dest.path;

        if input.source.is_empty_data() {
            if let Some(parent) = Path::new(dest).parent() {
                fs::create_dir_all(parent).await.map_err(Error::Io)?;
            }
            return Ok(FileOperationOutput::default());
        }

        let (mut reader, _) = input.source.into_reader().await?;

        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(dest)
            .await
            .map_err(|e| map_io_err(e, dest))?;

        tokio::io::copy(&mut reader, &mut file)
            .await
            .map_err(Error::Io)?;
        file.flush().await.map_err(Error::Io)?;

        let etag = file_md5(&mut file).await?;
        Ok(FileOperationOutput { etag })
    }

    async fn copy_object(&self, input: CopyObjectInput) -> Result<()> {
        if cancelled(&input.cancel) {
            return Err(Error::Cancelled);
        }
        fs::copy(&input.src.path, &input.dest.path)
            .await
            .map_err(|e| map_io_err(e, &input.src.path))?;
        Ok(())
    }

    /// Delete each path, recursively for directories, continuing through the
    /// remaining paths after an individual failure (subject to the error
    /// policy). One progress event fires per path.
    async fn delete_objects(&self, input: DeleteObjectsInput) -> Vec<Error> {
        let mut errs = Vec::new();
        let paths = input.paths.resolved();
        let total = paths.len() as i64;

        for (index, path) in paths.iter().enumerate() {
            if cancelled(&input.cancel) {
                errs.push(Error::Cancelled);
                break;
            }

            let result = match fs::metadata(path).await {
                Ok(meta) if meta.is_dir() => fs::remove_dir_all(path).await,
                Ok(_) => fs::remove_file(path).await,
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                let err = map_io_err(e, path);
                tracing::warn!(path = %path, error = %err, "delete failed");
                errs.push(err);
                if input.policy == ErrorPolicy::Abort {
                    break;
                }
            }

            if let Some(progress) = &input.progress {
                progress(ProgressEvent {
                    index,
                    max: total,
                    value: path.clone(),
                });
            }
        }
        errs
    }

    /// Create (truncate) the destination and hand back a fresh opaque
    /// session id. The per-path chunk lock is registered here.
    async fn initialize_object_upload(&self, dest: &Location) -> Result<UploadResult> {
        if let Some(parent) = Path::new(&dest.path).parent() {
            fs::create_dir_all(parent).await.map_err(Error::Io)?;
        }
        fs::File::create(&dest.path)
            .await
            .map_err(|e| map_io_err(e, &dest.path))?;

        self.chunk_lock(&dest.path);

        Ok(UploadResult {
            id: uuid::Uuid::new_v4().to_string(),
            write_size: 0,
            is_complete: false,
        })
    }

    /// Positioned write of one chunk at `chunk_id * chunk_size`, serialized
    /// against other chunk writes to the same destination.
    async fn write_chunk(&self, chunk: UploadChunk) -> Result<UploadResult> {
        let dest = &chunk.dest.path;
        let lock = self.chunk_lock(dest);
        let _guard = lock.lock().await;

        let mut file = fs::OpenOptions::new()
            .write(true)
            .create(true)
            .open(dest)
            .await
            .map_err(|e| map_io_err(e, dest))?;

        let offset = chunk.chunk_id as u64 * self.chunk_size;
        file.seek(SeekFrom::Start(offset)).await?;
        file.write_all(&chunk.data).await.map_err(Error::Io)?;
        file.flush().await.map_err(Error::Io)?;

        Ok(UploadResult {
            id: String::new(),
            write_size: chunk.data.len(),
            is_complete: false,
        })
    }

    /// Chunk writes are already durable, so completion only verifies the
    /// assembled file: its MD5 is computed and returned as the ETag, and the
    /// session's chunk lock is released.
    async fn complete_object_upload(&self, input: CompletedUpload) -> Result<FileOperationOutput> {
        let dest = &input.dest.path;
        let lock = self.chunk_lock(dest);
        let etag = {
            let _guard = lock.lock().await;
            let mut file = fs::File::open(dest).await.map_err(|e| map_io_err(e, dest))?;
            file_md5(&mut file).await?
        };
        self.release_chunk_lock(dest);
        Ok(FileOperationOutput { etag })
    }

    /// Depth-first traversal visiting directories and files in lexical
    /// order, starting at (and including) the given path.
    async fn walk(&self, input: WalkInput, visitor: WalkVisitor<'_>) -> Result<()> {
        let root = input.path.path.clone();
        fs::metadata(&root).await.map_err(|e| map_io_err(e, &root))?;

        let mut stack = vec![root];
        let mut index = 0usize;

        while let Some(path) = stack.pop() {
            if cancelled(&input.cancel) {
                return Err(Error::Cancelled);
            }

            let meta = match fs::metadata(&path).await {
                Ok(m) => m,
                Err(e) => {
                    let err = map_io_err(e, &path);
                    match input.policy {
                        ErrorPolicy::Abort => return Err(err),
                        ErrorPolicy::Continue => {
                            tracing::warn!(path = %path, error = %err, "walk stat error");
                            continue;
                        }
                    }
                }
            };

            let entry = WalkEntry {
                info: info_from_metadata(&base_name(&path), &meta),
                path: path.clone(),
            };
            if let Err(e) = visitor(&entry) {
                match input.policy {
                    ErrorPolicy::Abort => return Err(e),
                    ErrorPolicy::Continue => {
                        tracing::warn!(path = %entry.path, error = %e, "walk visitor error")
                    }
                }
            }
            if let Some(progress) = &input.progress {
                progress(ProgressEvent {
                    index,
                    max: -1,
                    value: entry.path.clone(),
                });
            }
            index += 1;

            if meta.is_dir() {
                let mut read_dir = fs::read_dir(&path).await.map_err(Error::Io)?;
                let mut children = Vec::new();
                while let Some(child) = read_dir.next_entry().await.map_err(Error::Io)? {
                    children.push(child.path().to_string_lossy().into_owned());
                }
                children.sort();
                // reversed so the stack pops in lexical order
                for child in children.into_iter().rev() {
                    stack.push(child);
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use ofs_core::types::ObjectSource;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn store() -> BlockStore {
        BlockStore::new(BlockConfig::default())
    }

    fn small_chunk_store(chunk_size: u64) -> BlockStore {
        BlockStore::new(BlockConfig {
            chunk_size: Some(chunk_size),
        })
    }

    async fn read_all(mut body: ObjectBody) -> Vec<u8> {
        let mut out = Vec::new();
        body.read_to_end(&mut out).await.unwrap();
        out
    }

    #[tokio::test]
    async fn test_get_object_info_missing_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.txt").to_string_lossy().into_owned();
        let err = store()
            .get_object_info(&Location::new(missing))
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_put_sources_produce_identical_content_and_etag() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();
        let payload = b"the same logical payload".to_vec();

        let src_file = dir.path().join("src.bin");
        tokio::fs::write(&src_file, &payload).await.unwrap();

        let from_data = dir.path().join("from_data.bin");
        let out_data = store
            .put_object(PutObjectInput {
                source: ObjectSource::Data(Bytes::from(payload.clone())),
                dest: Location::new(from_data.to_string_lossy()),
                multipart: false,
                part_size: None,
            })
            .await
            .unwrap();

        let from_file = dir.path().join("from_file.bin");
        let out_file = store
            .put_object(PutObjectInput {
                source: ObjectSource::File(Location::new(src_file.to_string_lossy())),
                dest: Location::new(from_file.to_string_lossy()),
                multipart: false,
                part_size: None,
            })
            .await
            .unwrap();

        let from_reader = dir.path().join("from_reader.bin");
        let out_reader = store
            .put_object(PutObjectInput {
                source: ObjectSource::Reader {
                    reader: Box::new(std::io::Cursor::new(payload.clone())),
                    content_length: Some(payload.len() as i64),
                },
                dest: Location::new(from_reader.to_string_lossy()),
                multipart: false,
                part_size: None,
            })
            .await
            .unwrap();

        assert_eq!(out_data.etag, out_file.etag);
        assert_eq!(out_data.etag, out_reader.etag);
        assert!(!out_data.etag.is_empty());

        for path in [&from_data, &from_file, &from_reader] {
            assert_eq!(tokio::fs::read(path).await.unwrap(), payload);
        }
    }

    #[tokio::test]
    async fn test_put_empty_data_creates_parent_directory() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("deep/nested/marker.txt");
        let out = store()
            .put_object(PutObjectInput {
                source: ObjectSource::Data(Bytes::new()),
                dest: Location::new(dest.to_string_lossy()),
                multipart: false,
                part_size: None,
            })
            .await
            .unwrap();

        assert!(out.etag.is_empty());
        assert!(dest.parent().unwrap().is_dir());
        assert!(!dest.exists(), "the empty-source shortcut must not write");
    }

    #[tokio::test]
    async fn test_range_read_exact_window() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("range.bin");
        tokio::fs::write(&path, b"0123456789").await.unwrap();

        let body = store()
            .get_object(GetObjectInput {
                path: Location::new(path.to_string_lossy()),
                range: Some("bytes=2-6".to_string()),
            })
            .await
            .unwrap();

        // end - start bytes at the start offset
        assert_eq!(read_all(body).await, b"2345");
    }

    #[tokio::test]
    async fn test_range_read_rejects_out_of_bounds_and_malformed() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("range.bin");
        tokio::fs::write(&path, b"0123456789").await.unwrap();
        let location = Location::new(path.to_string_lossy());

        let err = store()
            .get_object(GetObjectInput {
                path: location.clone(),
                range: Some("bytes=0-999".to_string()),
            })
            .await
            .err().unwrap();
        assert!(matches!(err, Error::InvalidRange(_)));

        let err = store()
            .get_object(GetObjectInput {
                path: location,
                range: Some("0-5".to_string()),
            })
            .await
            .err().unwrap();
        assert!(matches!(err, Error::InvalidRange(_)));
    }

    #[tokio::test]
    async fn test_copy_object() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("src.txt");
        let dest = dir.path().join("dest.txt");
        tokio::fs::write(&src, b"copy me").await.unwrap();

        store()
            .copy_object(CopyObjectInput {
                src: Location::new(src.to_string_lossy()),
                dest: Location::new(dest.to_string_lossy()),
                progress: None,
                cancel: None,
            })
            .await
            .unwrap();

        assert_eq!(tokio::fs::read(&dest).await.unwrap(), b"copy me");
    }

    #[tokio::test]
    async fn test_delete_objects_recursive_with_progress() {
        let dir = tempfile::tempdir().unwrap();
        let tree = dir.path().join("tree");
        tokio::fs::create_dir_all(tree.join("inner")).await.unwrap();
        tokio::fs::write(tree.join("inner/a.txt"), b"a").await.unwrap();
        let single = dir.path().join("single.txt");
        tokio::fs::write(&single, b"b").await.unwrap();

        let events = Arc::new(AtomicUsize::new(0));
        let events_clone = events.clone();

        let errs = store()
            .delete_objects(DeleteObjectsInput {
                paths: Location::many(vec![
                    tree.to_string_lossy().into_owned(),
                    single.to_string_lossy().into_owned(),
                ]),
                progress: Some(Box::new(move |_| {
                    events_clone.fetch_add(1, Ordering::SeqCst);
                })),
                policy: ErrorPolicy::Continue,
                cancel: None,
            })
            .await;

        assert!(errs.is_empty(), "unexpected errors: {errs:?}");
        assert!(!tree.exists());
        assert!(!single.exists());
        assert_eq!(events.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_delete_continues_past_missing_path() {
        let dir = tempfile::tempdir().unwrap();
        let present = dir.path().join("present.txt");
        tokio::fs::write(&present, b"x").await.unwrap();

        let errs = store()
            .delete_objects(DeleteObjectsInput {
                paths: Location::many(vec![
                    dir.path().join("absent.txt").to_string_lossy().into_owned(),
                    present.to_string_lossy().into_owned(),
                ]),
                progress: None,
                policy: ErrorPolicy::Continue,
                cancel: None,
            })
            .await;

        assert_eq!(errs.len(), 1);
        assert!(errs[0].is_not_found());
        assert!(!present.exists(), "later paths must still be deleted");
    }

    #[tokio::test]
    async fn test_write_chunk_offsets_follow_chunk_size() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("chunked.bin");
        let dest_loc = Location::new(dest.to_string_lossy());
        let store = small_chunk_store(4);

        let session = store.initialize_object_upload(&dest_loc).await.unwrap();
        assert!(!session.id.is_empty());

        // written out of order on purpose
        for (chunk_id, data) in [(1, &b"BBBB"[..]), (0, &b"AAAA"[..]), (2, &b"CC"[..])] {
            let result = store
                .write_chunk(UploadChunk {
                    dest: dest_loc.clone(),
                    chunk_id,
                    upload_id: session.id.clone(),
                    data: Bytes::from_static(data),
                })
                .await
                .unwrap();
            assert_eq!(result.write_size, data.len());
        }

        let out = store
            .complete_object_upload(CompletedUpload {
                dest: dest_loc,
                upload_id: session.id,
                chunk_etags: vec![String::new(); 3],
            })
            .await
            .unwrap();

        let written = tokio::fs::read(&dest).await.unwrap();
        assert_eq!(written, b"AAAABBBBCC");
        assert_eq!(out.etag, hex::encode(Md5::digest(b"AAAABBBBCC")));
    }

    #[tokio::test]
    async fn test_walk_visits_everything_lexically() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("walk");
        tokio::fs::create_dir_all(root.join("sub")).await.unwrap();
        tokio::fs::write(root.join("a.txt"), b"a").await.unwrap();
        tokio::fs::write(root.join("sub/b.txt"), b"b").await.unwrap();

        let mut seen = Vec::new();
        store()
            .walk(
                WalkInput {
                    path: Location::new(root.to_string_lossy()),
                    ..Default::default()
                },
                &mut |entry| {
                    seen.push(entry.info.name.clone());
                    Ok(())
                },
            )
            .await
            .unwrap();

        assert_eq!(seen, vec!["walk", "a.txt", "sub", "b.txt"]);
    }

    #[tokio::test]
    async fn test_walk_missing_root_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let err = store()
            .walk(
                WalkInput {
                    path: Location::new(dir.path().join("gone").to_string_lossy()),
                    ..Default::default()
                },
                &mut |_| Ok(()),
            )
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_walk_abort_policy_stops_on_visitor_error() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("walk");
        tokio::fs::create_dir_all(&root).await.unwrap();
        tokio::fs::write(root.join("a.txt"), b"a").await.unwrap();
        tokio::fs::write(root.join("b.txt"), b"b").await.unwrap();

        let mut visits = 0;
        let err = store()
            .walk(
                WalkInput {
                    path: Location::new(root.to_string_lossy()),
                    policy: ErrorPolicy::Abort,
                    ..Default::default()
                },
                &mut |_| {
                    visits += 1;
                    Err(Error::General("visitor refused".to_string()))
                },
            )
            .await
            .unwrap_err();

        assert!(matches!(err, Error::General(_)));
        assert_eq!(visits, 1);
    }

    #[tokio::test]
    async fn test_list_dir_sorted_with_ordinals() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("b.txt"), b"bb").await.unwrap();
        tokio::fs::write(dir.path().join("a.txt"), b"a").await.unwrap();
        tokio::fs::create_dir(dir.path().join("sub")).await.unwrap();

        let entries = store()
            .list_dir(ListDirInput {
                path: Location::new(dir.path().to_string_lossy()),
                ..Default::default()
            })
            .await
            .unwrap();

        let names: Vec<&str> = entries.iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["a.txt", "b.txt", "sub"]);
        assert_eq!(
            entries.iter().map(|e| e.id).collect::<Vec<_>>(),
            vec![0, 1, 2]
        );
        assert_eq!(entries[0].kind, ".txt");
        assert_eq!(entries[0].size, "1");
        assert!(entries[2].is_dir);
    }
}
