//! Value types for the file store contract
//!
//! These are pure data carriers: locations, byte sources, listing entries and
//! the multipart upload session types. They are constructed per call and
//! discarded when the call returns.

use bytes::Bytes;
use jiff::Timestamp;
use serde::{Deserialize, Serialize};
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::error::{Error, Result};

/// A single path or an array of paths describing one resource.
///
/// The array form exists for multi-file resources such as geospatial
/// shapefile sets. When both fields are empty the location is "nil".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<String>,
}

impl Location {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            paths: Vec::new(),
        }
    }

    pub fn many(paths: Vec<String>) -> Self {
        Self {
            path: String::new(),
            paths,
        }
    }

    /// True when neither the single path nor the path array is set
    pub fn is_nil(&self) -> bool {
        self.path.is_empty() && self.paths.is_empty()
    }

    /// The effective list of paths: the array when present, otherwise the
    /// single path, otherwise nothing.
    pub fn resolved(&self) -> Vec<String> {
        if !self.paths.is_empty() {
            self.paths.clone()
        } else if !self.path.is_empty() {
            vec![self.path.clone()]
        } else {
            Vec::new()
        }
    }
}

/// The origin of bytes for a write.
///
/// Exactly one source kind is supplied by construction. The declared length
/// is derived automatically for in-memory buffers and must be provided by the
/// caller for raw readers when it is known.
pub enum ObjectSource {
    /// An in-memory buffer. An explicitly empty buffer has a special meaning
    /// on the local backend: "ensure the parent directory exists".
    Data(Bytes),
    /// A file on the local filesystem to read from
    File(Location),
    /// An open reader with an optional declared content length
    Reader {
        reader: Box<dyn AsyncRead + Send + Unpin>,
        content_length: Option<i64>,
    },
}

impl std::fmt::Debug for ObjectSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ObjectSource::Data(d) => f.debug_tuple("Data").field(&d.len()).finish(),
            ObjectSource::File(l) => f.debug_tuple("File").field(l).finish(),
            ObjectSource::Reader { content_length, .. } => f
                .debug_struct("Reader")
                .field("content_length", content_length)
                .finish(),
        }
    }
}

impl ObjectSource {
    /// The declared length of the source, when already known
    pub fn content_length(&self) -> Option<i64> {
        match self {
            ObjectSource::Data(d) => Some(d.len() as i64),
            ObjectSource::File(_) => None,
            ObjectSource::Reader { content_length, .. } => *content_length,
        }
    }

    /// True for an explicitly empty in-memory buffer
    pub fn is_empty_data(&self) -> bool {
        matches!(self, ObjectSource::Data(d) if d.is_empty())
    }

    /// Consume the source and produce a reader plus the content length when
    /// it can be determined.
    pub async fn into_reader(self) -> Result<(Box<dyn AsyncRead + Send + Unpin>, Option<i64>)> {
        match self {
            ObjectSource::Data(data) => {
                let len = data.len() as i64;
                Ok((Box::new(std::io::Cursor::new(data)), Some(len)))
            }
            ObjectSource::File(loc) => {
                if loc.path.is_empty() {
                    return Err(Error::InvalidInput(
                        "object source file location is empty".to_string(),
                    ));
                }
                let file = tokio::fs::File::open(&loc.path).await.map_err(|e| {
                    if e.kind() == std::io::ErrorKind::NotFound {
                        Error::NotFound(loc.path.clone())
                    } else {
                        Error::Io(e)
                    }
                })?;
                let len = file.metadata().await.map(|m| m.len() as i64).ok();
                Ok((Box::new(file), len))
            }
            ObjectSource::Reader {
                reader,
                content_length,
            } => Ok((reader, content_length)),
        }
    }
}

/// Result of a write operation.
///
/// The ETag is a content hash for local writes and the backend-assigned token
/// for remote writes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileOperationOutput {
    #[serde(rename = "etag")]
    pub etag: String,
}

/// Object metadata as reported by a backend.
///
/// On object storage an entry with no retrievable attributes is reported as a
/// traversable prefix (`is_dir == true`) rather than an error.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
    pub size: i64,
    pub modified: Option<Timestamp>,
    pub is_dir: bool,
    pub etag: Option<String>,
}

impl ObjectInfo {
    pub fn file(name: impl Into<String>, size: i64) -> Self {
        Self {
            name: name.into(),
            size,
            ..Default::default()
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_dir: true,
            ..Default::default()
        }
    }
}

/// One entry returned from a directory or prefix listing.
///
/// The `id` is an ordinal unique within a single listing call only; it is not
/// stable across calls. The serialized names are a wire contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListEntry {
    pub id: usize,
    #[serde(rename = "fileName")]
    pub name: String,
    pub size: String,
    #[serde(rename = "filePath")]
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(rename = "isdir")]
    pub is_dir: bool,
    pub modified: Option<Timestamp>,
    #[serde(rename = "modifiedBy")]
    pub modified_by: String,
}

/// One chunk being written into a multipart upload session
#[derive(Debug, Clone)]
pub struct UploadChunk {
    /// Path of the object being uploaded into
    pub dest: Location,
    /// Zero-based chunk index; offset-addressable backends write this chunk
    /// at `chunk_id * chunk_size`
    pub chunk_id: i32,
    /// Session identifier returned by `initialize_object_upload`
    pub upload_id: String,
    pub data: Bytes,
}

/// Completion input for a multipart upload session.
///
/// `chunk_etags` must be supplied in chunk order.
#[derive(Debug, Clone, Default)]
pub struct CompletedUpload {
    pub dest: Location,
    pub upload_id: String,
    pub chunk_etags: Vec<String>,
}

/// Result of an individual multipart call
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UploadResult {
    /// Session id on initialize; chunk identifier (part ETag) on write
    pub id: String,
    #[serde(rename = "size")]
    pub write_size: usize,
    #[serde(rename = "isComplete")]
    pub is_complete: bool,
}

/// A progress notification from a long-running walk, delete or copy.
///
/// Purely observational; progress never gates control flow.
#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub index: usize,
    /// Total count when known, -1 otherwise
    pub max: i64,
    /// An opaque description of what was processed, typically a path
    pub value: String,
}

/// Callback for progress emission
pub type ProgressFn = Box<dyn Fn(ProgressEvent) + Send + Sync>;

/// What to do when a sub-operation of a multi-object call fails
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ErrorPolicy {
    /// Stop at the first failure
    Abort,
    /// Log the failure and keep going
    #[default]
    Continue,
}

/// Input for paginated, filtered directory listing
#[derive(Debug, Clone, Default)]
pub struct ListDirInput {
    pub path: Location,
    /// Zero-based page index, honored by paginating backends
    pub page: i32,
    /// Requested entry count; 0 means backend default
    pub size: i32,
    /// Substring filter; empty means unfiltered
    pub filter: String,
}

/// Input for a read, optionally restricted to a byte range.
///
/// The range uses the textual `unit=start-end` form (rfc9110 single range);
/// multiple ranges in one request are not supported.
#[derive(Debug, Clone, Default)]
pub struct GetObjectInput {
    pub path: Location,
    pub range: Option<String>,
}

/// Input for a single-shot or multipart write
#[derive(Debug)]
pub struct PutObjectInput {
    pub source: ObjectSource,
    pub dest: Location,
    /// Choose a managed multipart upload over a direct single-request write
    pub multipart: bool,
    /// Part size for multipart writes; backend default when absent
    pub part_size: Option<usize>,
}

/// Input for a copy within one store
#[derive(Default)]
pub struct CopyObjectInput {
    pub src: Location,
    pub dest: Location,
    pub progress: Option<ProgressFn>,
    pub cancel: Option<CancellationToken>,
}

/// Input for a possibly-recursive delete
#[derive(Default)]
pub struct DeleteObjectsInput {
    pub paths: Location,
    pub progress: Option<ProgressFn>,
    pub policy: ErrorPolicy,
    pub cancel: Option<CancellationToken>,
}

/// Input for a full-depth traversal
#[derive(Default)]
pub struct WalkInput {
    pub path: Location,
    pub progress: Option<ProgressFn>,
    pub policy: ErrorPolicy,
    pub cancel: Option<CancellationToken>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_location_nil_and_resolution() {
        assert!(Location::default().is_nil());
        assert!(!Location::new("/a").is_nil());

        let single = Location::new("/a/b");
        assert_eq!(single.resolved(), vec!["/a/b".to_string()]);

        let multi = Location::many(vec!["/a".to_string(), "/b".to_string()]);
        assert_eq!(multi.resolved().len(), 2);

        // The array wins when both are set
        let both = Location {
            path: "/single".to_string(),
            paths: vec!["/x".to_string()],
        };
        assert_eq!(both.resolved(), vec!["/x".to_string()]);
    }

    #[test]
    fn test_object_source_content_length() {
        let data = ObjectSource::Data(Bytes::from_static(b"hello"));
        assert_eq!(data.content_length(), Some(5));
        assert!(!data.is_empty_data());

        let empty = ObjectSource::Data(Bytes::new());
        assert!(empty.is_empty_data());
        assert_eq!(empty.content_length(), Some(0));

        let reader = ObjectSource::Reader {
            reader: Box::new(std::io::Cursor::new(Vec::new())),
            content_length: Some(42),
        };
        assert_eq!(reader.content_length(), Some(42));
    }

    #[tokio::test]
    async fn test_object_source_missing_file_is_not_found() {
        let source = ObjectSource::File(Location::new("/definitely/not/here"));
        let err = source.into_reader().await.err().unwrap();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_list_entry_wire_names() {
        let entry = ListEntry {
            id: 3,
            name: "report.txt".to_string(),
            size: "128".to_string(),
            path: "/docs".to_string(),
            kind: ".txt".to_string(),
            is_dir: false,
            modified: None,
            modified_by: String::new(),
        };
        let value = serde_json::to_value(&entry).unwrap();
        let obj = value.as_object().unwrap();
        for key in [
            "id",
            "fileName",
            "size",
            "filePath",
            "type",
            "isdir",
            "modified",
            "modifiedBy",
        ] {
            assert!(obj.contains_key(key), "missing serialized field {key}");
        }
        assert_eq!(obj["fileName"], "report.txt");
        assert_eq!(obj["isdir"], false);
    }

    #[test]
    fn test_upload_result_wire_names() {
        let result = UploadResult {
            id: "abc".to_string(),
            write_size: 10,
            is_complete: false,
        };
        let value = serde_json::to_value(&result).unwrap();
        let obj = value.as_object().unwrap();
        assert!(obj.contains_key("id"));
        assert!(obj.contains_key("size"));
        assert!(obj.contains_key("isComplete"));
    }
}
