//! S3 store implementation
//!
//! Wraps aws-sdk-s3 and implements the FileStore trait from ofs-core. The
//! backend emulates local-filesystem semantics the object API does not have
//! natively: recursive deletes expand prefixes through a walk, large copies
//! split into ranged part-copy requests, and reads pass byte ranges through.

use std::collections::VecDeque;

use async_trait::async_trait;
use aws_sdk_s3::error::SdkError;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    CommonPrefix, CompletedMultipartUpload, CompletedPart, Delete, Object, ObjectAttributes,
    ObjectCannedAcl, ObjectIdentifier,
};
use futures::stream::{BoxStream, StreamExt, TryStreamExt};
use jiff::Timestamp;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use ofs_core::error::{Error, Result};
use ofs_core::traits::{FileStore, ObjectBody, WalkEntry, WalkVisitor};
use ofs_core::types::{
    CompletedUpload, CopyObjectInput, DeleteObjectsInput, ErrorPolicy, FileOperationOutput,
    GetObjectInput, ListDirInput, ListEntry, Location, ObjectInfo, ObjectSource, ProgressEvent,
    PutObjectInput, UploadChunk, UploadResult, WalkInput,
};
use ofs_core::{Credentials, DEFAULT_DELIMITER, DEFAULT_MAX_KEYS, MinioConfig, S3Config};

/// Part size for server-side multipart copies: 5 MiB
const COPY_CHUNK_SIZE: i64 = 5 * 1024 * 1024;
/// Objects at or above this size are copied with ranged part copies instead
/// of a single server-side copy request
const MAX_SINGLE_COPY_SIZE: i64 = 5_000 * 1024 * 1024;
/// Default part size for managed multipart uploads: 10 MiB
const DEFAULT_PART_SIZE: usize = 10 * 1024 * 1024;
/// S3 rejects non-final parts smaller than 5 MiB
const MIN_PART_SIZE: usize = 5 * 1024 * 1024;
/// Bulk-delete requests carry at most this many keys
const MAX_DELETE_BATCH: usize = 1000;

/// S3-compatible store wrapper
pub struct S3Store {
    client: aws_sdk_s3::Client,
    bucket: String,
    delimiter: String,
    max_keys: i32,
}

impl S3Store {
    /// Create a store over an S3-compatible endpoint from its configuration
    pub async fn connect(config: S3Config) -> Result<Self> {
        let force_path_style = config.endpoint.is_some();
        Self::build(config, force_path_style).await
    }

    /// Create a store over a MinIO-style static host address. Requires
    /// static credentials.
    pub async fn connect_minio(config: MinioConfig) -> Result<Self> {
        if !matches!(config.s3.credentials, Credentials::Static { .. }) {
            return Err(Error::Config(
                "MinIO configuration requires static credentials".to_string(),
            ));
        }
        let mut s3 = config.s3;
        s3.endpoint = Some(config.host_address);
        Self::build(s3, true).await
    }

    async fn build(config: S3Config, force_path_style: bool) -> Result<Self> {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        match &config.credentials {
            Credentials::Static {
                access_key,
                secret_key,
            } => {
                let credentials = aws_credential_types::Credentials::new(
                    access_key.clone(),
                    secret_key.clone(),
                    None, // session token
                    None, // expiry
                    "ofs-static-credentials",
                );
                loader = loader.credentials_provider(credentials);
            }
            Credentials::Attached { profile } => {
                // an empty profile invokes the default credential chain
                if let Some(profile) = profile {
                    loader = loader.profile_name(profile);
                }
            }
            Credentials::Role { .. } => {
                return Err(Error::Config("assumed roles are not supported".to_string()));
            }
        }

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(force_path_style)
            .build();

        Ok(Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket,
            delimiter: config
                .delimiter
                .unwrap_or_else(|| DEFAULT_DELIMITER.to_string()),
            max_keys: config.max_keys.unwrap_or(DEFAULT_MAX_KEYS),
        })
    }

    /// Get the underlying aws-sdk-s3 client
    pub fn inner(&self) -> &aws_sdk_s3::Client {
        &self.client
    }

    /// Format AWS SDK error into a detailed error message
    fn format_sdk_error<E: std::fmt::Display>(error: &SdkError<E>) -> String {
        match error {
            SdkError::ServiceError(service_err) => {
                let err = service_err.err();
                let meta = service_err.raw();
                let mut msg = format!("Service error: {}", err);
                if let Some(code) = meta.headers().get("x-amz-error-code")
                    && let Ok(code_str) = std::str::from_utf8(code.as_bytes())
                {
                    msg.push_str(&format!(" (code: {})", code_str));
                }
                msg
            }
            SdkError::ConstructionFailure(err) => {
                format!("Request construction failed: {:?}", err)
            }
            SdkError::TimeoutError(_) => "Request timeout".to_string(),
            SdkError::DispatchFailure(err) => {
                format!("Network dispatch error: {:?}", err)
            }
            SdkError::ResponseError(err) => {
                format!("Response error: {:?}", err)
            }
            _ => error.to_string(),
        }
    }

    fn not_found_or_network<E: std::fmt::Display>(error: SdkError<E>, path: &str) -> Error {
        let err_str = Self::format_sdk_error(&error);
        if err_str.contains("NoSuchKey") || err_str.contains("NotFound") {
            Error::NotFound(path.to_string())
        } else {
            Error::Network(err_str)
        }
    }

    fn session_or_network<E: std::fmt::Display>(error: SdkError<E>) -> Error {
        let err_str = Self::format_sdk_error(&error);
        if err_str.contains("NoSuchUpload") {
            Error::Session(err_str)
        } else {
            Error::Network(err_str)
        }
    }

    /// Fetch exactly the n-th unfiltered page through the SDK paginator
    async fn get_page(
        &self,
        input: &ListDirInput,
        prefix: &str,
    ) -> Result<(Vec<CommonPrefix>, Vec<Object>)> {
        let max_keys = if input.size > 0 {
            input.size
        } else {
            self.max_keys
        };
        let mut paginator = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(prefix)
            .delimiter(&self.delimiter)
            .max_keys(max_keys)
            .into_paginator()
            .send();

        let mut current_page = 0;
        while let Some(page) = paginator.next().await {
            let page = page.map_err(|e| Error::Network(Self::format_sdk_error(&e)))?;
            if current_page == input.page {
                return Ok((page.common_prefixes().to_vec(), page.contents().to_vec()));
            }
            current_page += 1;
        }
        Ok((Vec::new(), Vec::new()))
    }

    /// Accumulate pages until the requested count is satisfied or the
    /// backend reports no further continuation token, filtering entries by
    /// substring when a filter is present.
    async fn get_all_up_to_max(
        &self,
        input: &ListDirInput,
        prefix: &str,
    ) -> Result<(Vec<CommonPrefix>, Vec<Object>)> {
        let per_page = if input.size > 0 && input.size < DEFAULT_MAX_KEYS {
            input.size
        } else {
            self.max_keys
        };

        let mut prefixes = Vec::new();
        let mut objects = Vec::new();
        let mut token: Option<String> = None;
        let mut matched: i32 = 0;

        loop {
            let mut request = self
                .client
                .list_objects_v2()
                .bucket(&self.bucket)
                .prefix(prefix)
                .delimiter(&self.delimiter)
                .max_keys(per_page);
            if let Some(token) = &token {
                request = request.continuation_token(token);
            }

            let response = request.send().await.map_err(|e| {
                tracing::warn!("failed to list objects in the bucket");
                Error::Network(Self::format_sdk_error(&e))
            })?;

            if input.filter.is_empty() {
                prefixes.extend(response.common_prefixes().iter().cloned());
                objects.extend(response.contents().iter().cloned());
            } else {
                for common_prefix in response.common_prefixes() {
                    if matched >= input.size {
                        break;
                    }
                    if common_prefix
                        .prefix()
                        .unwrap_or_default()
                        .contains(&input.filter)
                    {
                        prefixes.push(common_prefix.clone());
                        matched += 1;
                    }
                }
                for object in response.contents() {
                    if matched >= input.size {
                        break;
                    }
                    if object.key().unwrap_or_default().contains(&input.filter) {
                        objects.push(object.clone());
                        matched += 1;
                    }
                }
            }

            let collected = (prefixes.len() + objects.len()) as i32;
            if response.next_continuation_token().is_none() || input.size <= collected {
                break;
            }
            token = response.next_continuation_token().map(str::to_string);
        }
        Ok((prefixes, objects))
    }

    /// Stream every object below a prefix across as many pages as the
    /// backend reports as truncated.
    ///
    /// `advance_token` exists for the recursive-delete path: a delete flushes
    /// the keys it just listed, so re-listing from the start is what keeps
    /// the enumeration complete. It is threaded explicitly so concurrent
    /// operations on one store handle cannot interfere.
    fn walk_stream(&self, prefix: String, advance_token: bool) -> BoxStream<'_, Result<WalkEntry>> {
        struct PageState {
            prefix: String,
            token: Option<String>,
            pending: VecDeque<WalkEntry>,
            done: bool,
        }

        let state = PageState {
            prefix,
            token: None,
            pending: VecDeque::new(),
            done: false,
        };

        futures::stream::try_unfold(state, move |mut state| async move {
            loop {
                if let Some(entry) = state.pending.pop_front() {
                    return Ok(Some((entry, state)));
                }
                if state.done {
                    return Ok(None);
                }

                let mut request = self
                    .client
                    .list_objects_v2()
                    .bucket(&self.bucket)
                    .prefix(&state.prefix)
                    .delimiter("")
                    .max_keys(self.max_keys);
                if let Some(token) = &state.token {
                    request = request.continuation_token(token);
                }

                let response = request
                    .send()
                    .await
                    .map_err(|e| Error::Network(Self::format_sdk_error(&e)))?;

                for object in response.contents() {
                    state.pending.push_back(walk_entry_from(object));
                }
                if advance_token {
                    state.token = response.next_continuation_token().map(str::to_string);
                }
                state.done = !response.is_truncated().unwrap_or(false);
            }
        })
        .boxed()
    }

    /// Expand a prefix into individual keys through the walk, flushing the
    /// delete buffer whenever it reaches the batch cap.
    async fn expand_prefix(
        &self,
        path: &str,
        buffer: &mut Vec<String>,
        errs: &mut Vec<Error>,
        input: &DeleteObjectsInput,
    ) -> Result<()> {
        let mut stream = self.walk_stream(key_of(path), false);
        while let Some(entry) = stream.try_next().await? {
            if cancelled(&input.cancel) {
                return Err(Error::Cancelled);
            }
            buffer.push(entry.info.name.clone());
            if buffer.len() >= MAX_DELETE_BATCH {
                errs.extend(self.flush_deletes(buffer).await);
            }
        }
        Ok(())
    }

    /// Issue one bulk-delete request for everything buffered, at most
    /// [`MAX_DELETE_BATCH`] keys, returning per-key failures
    async fn flush_deletes(&self, buffer: &mut Vec<String>) -> Vec<Error> {
        if buffer.is_empty() {
            return Vec::new();
        }

        let keys = std::mem::take(buffer);
        let mut identifiers = Vec::with_capacity(keys.len());
        for key in keys {
            match ObjectIdentifier::builder().key(key).build() {
                Ok(identifier) => identifiers.push(identifier),
                Err(e) => return vec![Error::General(e.to_string())],
            }
        }
        let delete = match Delete::builder().set_objects(Some(identifiers)).build() {
            Ok(delete) => delete,
            Err(e) => return vec![Error::General(e.to_string())],
        };

        match self
            .client
            .delete_objects()
            .bucket(&self.bucket)
            .delete(delete)
            .send()
            .await
        {
            Err(e) => vec![Error::Network(Self::format_sdk_error(&e))],
            Ok(response) => response
                .errors()
                .iter()
                .map(|e| {
                    Error::General(format!(
                        "{}: {}: {}",
                        e.key().unwrap_or("unknown"),
                        e.code().unwrap_or("unknown"),
                        e.message().unwrap_or("unknown delete error")
                    ))
                })
                .collect(),
        }
    }

    async fn put_single(&self, key: &str, source: ObjectSource) -> Result<FileOperationOutput> {
        let (body, content_length) = match source {
            ObjectSource::Data(data) => {
                let len = data.len() as i64;
                (ByteStream::from(data), Some(len))
            }
            ObjectSource::File(location) => {
                let body = ByteStream::from_path(&location.path).await.map_err(|e| {
                    Error::InvalidInput(format!("unable to read source file: {e}"))
                })?;
                (body, None)
            }
            ObjectSource::Reader {
                mut reader,
                content_length,
            } => {
                let mut data = Vec::new();
                reader.read_to_end(&mut data).await.map_err(Error::Io)?;
                let len = data.len() as i64;
                (ByteStream::from(data), Some(content_length.unwrap_or(len)))
            }
        };

        let mut request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .body(body);
        if let Some(len) = content_length {
            request = request.content_length(len);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Network(Self::format_sdk_error(&e)))?;

        Ok(FileOperationOutput {
            etag: trim_etag(response.e_tag()),
        })
    }

    /// Managed multipart upload: read the source in part-size chunks and
    /// upload each as a numbered part, completing with the ordered part
    /// list. The session is aborted (best effort) if any part fails.
    async fn put_multipart(
        &self,
        key: &str,
        source: ObjectSource,
        part_size: Option<usize>,
    ) -> Result<FileOperationOutput> {
        let part_size = part_size.unwrap_or(DEFAULT_PART_SIZE).max(MIN_PART_SIZE);
        let (mut reader, _) = source.into_reader().await?;

        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| Error::Network(Self::format_sdk_error(&e)))?;
        let upload_id = create
            .upload_id()
            .ok_or_else(|| Error::Session("no upload id in create response".to_string()))?
            .to_string();

        let mut parts = Vec::new();
        let mut part_number: i32 = 1;
        loop {
            let chunk = read_chunk(reader.as_mut(), part_size)
                .await
                .map_err(Error::Io)?;
            if chunk.is_empty() {
                break;
            }

            let result = self
                .client
                .upload_part()
                .bucket(&self.bucket)
                .key(key)
                .upload_id(&upload_id)
                .part_number(part_number)
                .content_length(chunk.len() as i64)
                .body(ByteStream::from(chunk))
                .send()
                .await;

            match result {
                Ok(response) => {
                    parts.push(
                        CompletedPart::builder()
                            .e_tag(trim_etag(response.e_tag()))
                            .part_number(part_number)
                            .build(),
                    );
                }
                Err(e) => {
                    self.abort_upload(key, &upload_id).await;
                    return Err(Error::Network(format!(
                        "error uploading part {part_number}: {}",
                        Self::format_sdk_error(&e)
                    )));
                }
            }
            part_number += 1;
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        let response = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(Self::session_or_network)?;

        Ok(FileOperationOutput {
            etag: trim_etag(response.e_tag()),
        })
    }

    /// Chunked server-side copy for objects too large for a single copy
    /// request: one part-copy per source range, completed in part order
    async fn copy_parts(&self, input: &CopyObjectInput, size: i64) -> Result<()> {
        let source = format!(
            "{}/{}",
            self.resource_name(),
            key_of(&input.src.path)
        );
        let dest = key_of(&input.dest.path);

        let create = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(&dest)
            .send()
            .await
            .map_err(|e| Error::Network(Self::format_sdk_error(&e)))?;
        let upload_id = create
            .upload_id()
            .ok_or_else(|| Error::Session("no upload id found in start upload request".to_string()))?
            .to_string();

        let ranges = copy_ranges(size, COPY_CHUNK_SIZE);
        let total = ranges.len();
        tracing::debug!(parts = total, dest = %dest, "starting multipart copy");

        let mut parts = Vec::with_capacity(total);
        for (index, (start, end)) in ranges.into_iter().enumerate() {
            if cancelled(&input.cancel) {
                self.abort_upload(&dest, &upload_id).await;
                return Err(Error::Cancelled);
            }

            let part_number = (index + 1) as i32;
            let result = self
                .client
                .upload_part_copy()
                .bucket(&self.bucket)
                .copy_source(&source)
                .copy_source_range(format!("bytes={start}-{end}"))
                .key(&dest)
                .part_number(part_number)
                .upload_id(&upload_id)
                .send()
                .await;

            match result {
                Ok(response) => {
                    let etag = response
                        .copy_part_result()
                        .and_then(|r| r.e_tag())
                        .unwrap_or_default()
                        .trim_matches('"')
                        .to_string();
                    parts.push(
                        CompletedPart::builder()
                            .e_tag(etag)
                            .part_number(part_number)
                            .build(),
                    );
                }
                Err(e) => {
                    tracing::warn!(part = part_number, "aborting multipart copy after part failure");
                    self.abort_upload(&dest, &upload_id).await;
                    return Err(Error::Network(format!(
                        "error copying part {part_number}: {}",
                        Self::format_sdk_error(&e)
                    )));
                }
            }

            if let Some(progress) = &input.progress {
                progress(ProgressEvent {
                    index,
                    max: total as i64,
                    value: dest.clone(),
                });
            }
        }

        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(parts))
            .build();
        self.client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(&dest)
            .upload_id(&upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(|e| Error::Network(format!("error completing copy: {}", Self::format_sdk_error(&e))))?;
        Ok(())
    }

    /// Best-effort abort of a multipart session; failures are logged only
    async fn abort_upload(&self, key: &str, upload_id: &str) {
        if let Err(e) = self
            .client
            .abort_multipart_upload()
            .bucket(&self.bucket)
            .key(key)
            .upload_id(upload_id)
            .send()
            .await
        {
            tracing::warn!(key = %key, error = %Self::format_sdk_error(&e), "failed to abort multipart upload");
        }
    }

    /// Issue a time-limited presigned read URL for the object
    pub async fn get_presigned_url(&self, path: &Location, days: u32) -> Result<String> {
        let config = aws_sdk_s3::presigning::PresigningConfig::builder()
            .expires_in(std::time::Duration::from_secs(86_400 * days as u64))
            .build()
            .map_err(|e| Error::InvalidInput(format!("presign config: {e}")))?;

        let request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key_of(&path.path))
            .presigned(config)
            .await
            .map_err(|e| Error::Network(format!("presign: {}", Self::format_sdk_error(&e))))?;

        Ok(request.uri().to_string())
    }

    /// Apply a public-read ACL to the object and return its canonical URL
    pub async fn set_object_public(&self, path: &Location) -> Result<String> {
        let key = key_of(&path.path);
        self.client
            .put_object_acl()
            .bucket(&self.bucket)
            .key(&key)
            .acl(ObjectCannedAcl::PublicRead)
            .send()
            .await
            .map_err(|e| Error::Network(Self::format_sdk_error(&e)))?;

        Ok(format!("https://{}.s3.amazonaws.com/{}", self.bucket, key))
    }
}

#[async_trait]
impl FileStore for S3Store {
    /// List a prefix. Unfiltered requests within the page cap fetch exactly
    /// the requested page; filtered or oversized requests accumulate pages
    /// until satisfied. Prefixes come first, then objects, each with a
    /// sequential page-local ordinal.
    async fn list_dir(&self, input: ListDirInput) -> Result<Vec<ListEntry>> {
        let prefix = key_of(&input.path.path);

        let (prefixes, objects) = if input.filter.is_empty() && input.size <= DEFAULT_MAX_KEYS {
            self.get_page(&input, &prefix).await?
        } else {
            self.get_all_up_to_max(&input, &prefix).await?
        };

        let mut result = Vec::with_capacity(prefixes.len() + objects.len());
        let mut id = 0;
        for common_prefix in &prefixes {
            let full = common_prefix.prefix().unwrap_or_default();
            result.push(ListEntry {
                id,
                name: base_name(full).to_string(),
                size: String::new(),
                path: full.to_string(),
                kind: String::new(),
                is_dir: true,
                modified: None,
                modified_by: String::new(),
            });
            id += 1;
        }
        for object in &objects {
            let key = object.key().unwrap_or_default();
            result.push(ListEntry {
                id,
                name: base_name(key).to_string(),
                size: object.size().unwrap_or(0).to_string(),
                path: parent_of(key),
                kind: extension_of(key),
                is_dir: false,
                modified: object.last_modified().and_then(to_timestamp),
                modified_by: String::new(),
            });
            id += 1;
        }
        Ok(result)
    }

    /// Metadata-only lookup. A key that exists yields its attributes; a key
    /// with no retrievable attributes is reported as a traversable prefix
    /// rather than an error; a missing key is the distinguished not-found
    /// kind.
    async fn get_object_info(&self, path: &Location) -> Result<ObjectInfo> {
        let key = key_of(&path.path);
        let response = self
            .client
            .get_object_attributes()
            .bucket(&self.bucket)
            .key(&key)
            .object_attributes(ObjectAttributes::Etag)
            .object_attributes(ObjectAttributes::ObjectSize)
            .send()
            .await
            .map_err(|e| Self::not_found_or_network(e, &path.path))?;

        let is_dir = response.object_size().is_none() && response.e_tag().is_none();
        Ok(ObjectInfo {
            name: key,
            size: response.object_size().unwrap_or(0),
            modified: response.last_modified().and_then(to_timestamp),
            is_dir,
            etag: response.e_tag().map(|t| t.trim_matches('"').to_string()),
        })
    }

    /// Ranged reads pass the raw range expression straight through to the
    /// backend.
    async fn get_object(&self, input: GetObjectInput) -> Result<ObjectBody> {
        let mut request = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key_of(&input.path.path));
        if let Some(range) = &input.range {
            request = request.range(range);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Self::not_found_or_network(e, &input.path.path))?;
        Ok(Box::new(response.body.into_async_read()))
    }

    fn resource_name(&self) -> String {
        self.bucket.clone()
    }

    async fn put_object(&self, input: PutObjectInput) -> Result<FileOperationOutput> {
        let key = key_of(&input.dest.path);
        if input.multipart {
            self.put_multipart(&key, input.source, input.part_size).await
        } else {
            self.put_single(&key, input.source).await
        }
    }

    /// Server-side copy below the large-object threshold, chunked multipart
    /// copy above it
    async fn copy_object(&self, input: CopyObjectInput) -> Result<()> {
        let info = self.get_object_info(&input.src).await?;

        if info.size < MAX_SINGLE_COPY_SIZE {
            let source = format!("{}/{}", self.resource_name(), key_of(&input.src.path));
            self.client
                .copy_object()
                .bucket(&self.bucket)
                .copy_source(source)
                .key(key_of(&input.dest.path))
                .send()
                .await
                .map_err(|e| Self::not_found_or_network(e, &input.src.path))?;
            Ok(())
        } else {
            self.copy_parts(&input, info.size).await
        }
    }

    async fn initialize_object_upload(&self, dest: &Location) -> Result<UploadResult> {
        let response = self
            .client
            .create_multipart_upload()
            .bucket(&self.bucket)
            .key(key_of(&dest.path))
            .send()
            .await
            .map_err(|e| Error::Network(Self::format_sdk_error(&e)))?;

        Ok(UploadResult {
            id: response
                .upload_id()
                .ok_or_else(|| Error::Session("no upload id in create response".to_string()))?
                .to_string(),
            write_size: 0,
            is_complete: false,
        })
    }

    /// Upload one chunk as a part. Parts are 1-to-n on the wire while chunk
    /// ids are zero-based.
    async fn write_chunk(&self, chunk: UploadChunk) -> Result<UploadResult> {
        let part_number = chunk.chunk_id + 1;
        let write_size = chunk.data.len();
        let response = self
            .client
            .upload_part()
            .bucket(&self.bucket)
            .key(key_of(&chunk.dest.path))
            .upload_id(&chunk.upload_id)
            .part_number(part_number)
            .content_length(write_size as i64)
            .body(ByteStream::from(chunk.data))
            .send()
            .await
            .map_err(Self::session_or_network)?;

        Ok(UploadResult {
            id: trim_etag(response.e_tag()),
            write_size,
            is_complete: false,
        })
    }

    async fn complete_object_upload(&self, input: CompletedUpload) -> Result<FileOperationOutput> {
        let completed = CompletedMultipartUpload::builder()
            .set_parts(Some(completed_parts(&input.chunk_etags)))
            .build();

        let response = self
            .client
            .complete_multipart_upload()
            .bucket(&self.bucket)
            .key(key_of(&input.dest.path))
            .upload_id(&input.upload_id)
            .multipart_upload(completed)
            .send()
            .await
            .map_err(Self::session_or_network)?;

        Ok(FileOperationOutput {
            etag: trim_etag(response.e_tag()),
        })
    }

    /// Delete the given paths. Each path is probed: plain objects are
    /// buffered directly, prefixes (and paths whose probe reports not-found)
    /// are expanded through the walk into individual keys. The buffer is
    /// flushed in batches of at most 1000 keys and at the end of each
    /// top-level path.
    async fn delete_objects(&self, input: DeleteObjectsInput) -> Vec<Error> {
        let mut errs = Vec::new();
        let mut buffer: Vec<String> = Vec::new();
        let paths = input.paths.resolved();
        let total = paths.len() as i64;

        for (index, path) in paths.iter().enumerate() {
            if cancelled(&input.cancel) {
                errs.push(Error::Cancelled);
                break;
            }

            match self.get_object_info(&Location::new(path.clone())).await {
                Ok(info) if !info.is_dir => buffer.push(key_of(path)),
                Ok(_) | Err(Error::NotFound(_)) => {
                    // a not-found probe may still be a bare prefix; expanding
                    // an absent path yields nothing and skips it
                    if let Err(e) = self.expand_prefix(path, &mut buffer, &mut errs, &input).await
                    {
                        errs.push(e);
                        if input.policy == ErrorPolicy::Abort {
                            break;
                        }
                    }
                }
                Err(e) => {
                    tracing::warn!(path = %path, error = %e, "error getting delete object info");
                    errs.push(e);
                    if input.policy == ErrorPolicy::Abort {
                        break;
                    }
                    continue;
                }
            }

            errs.extend(self.flush_deletes(&mut buffer).await);

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

    /// Full-depth enumeration below the path, across every truncated page
    async fn walk(&self, input: WalkInput, visitor: WalkVisitor<'_>) -> Result<()> {
        let mut stream = self.walk_stream(key_of(&input.path.path), true);
        let mut index = 0usize;

        while let Some(entry) = stream.try_next().await? {
            if cancelled(&input.cancel) {
                return Err(Error::Cancelled);
            }
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
        }
        Ok(())
    }
}

fn key_of(path: &str) -> String {
    path.trim_start_matches('/').to_string()
}

fn base_name(key: &str) -> &str {
    let trimmed = key.trim_end_matches('/');
    trimmed.rsplit('/').next().unwrap_or(trimmed)
}

fn parent_of(key: &str) -> String {
    match key.rsplit_once('/') {
        Some((dir, _)) => dir.to_string(),
        None => ".".to_string(),
    }
}

fn extension_of(key: &str) -> String {
    let name = base_name(key);
    name.rfind('.')
        .map(|i| name[i..].to_string())
        .unwrap_or_default()
}

fn trim_etag(etag: Option<&str>) -> String {
    etag.unwrap_or_default().trim_matches('"').to_string()
}

fn to_timestamp(dt: &aws_smithy_types::DateTime) -> Option<Timestamp> {
    Timestamp::from_second(dt.secs()).ok()
}

fn cancelled(token: &Option<CancellationToken>) -> bool {
    token.as_ref().is_some_and(|t| t.is_cancelled())
}

fn walk_entry_from(object: &Object) -> WalkEntry {
    let key = object.key().unwrap_or_default();
    WalkEntry {
        path: format!("/{key}"),
        info: ObjectInfo {
            name: key.to_string(),
            size: object.size().unwrap_or(0),
            modified: object.last_modified().and_then(to_timestamp),
            is_dir: false,
            etag: object.e_tag().map(|t| t.trim_matches('"').to_string()),
        },
    }
}

/// Ordered completion list for a caller-driven upload session; wire part
/// numbers are 1-based and ascending
fn completed_parts(chunk_etags: &[String]) -> Vec<CompletedPart> {
    chunk_etags
        .iter()
        .enumerate()
        .map(|(index, etag)| {
            CompletedPart::builder()
                .e_tag(etag)
                .part_number((index + 1) as i32)
                .build()
        })
        .collect()
}

/// Split an object of `size` bytes into inclusive `(start, end)` copy
/// ranges of at most `chunk` bytes, the last clipped to the remaining count
fn copy_ranges(size: i64, chunk: i64) -> Vec<(i64, i64)> {
    let mut ranges = Vec::new();
    let mut start = 0;
    while start < size {
        let end = (start + chunk - 1).min(size - 1);
        ranges.push((start, end));
        start += chunk;
    }
    ranges
}

async fn read_chunk(
    reader: &mut (dyn AsyncRead + Send + Unpin),
    cap: usize,
) -> std::io::Result<Vec<u8>> {
    let mut buf = vec![0u8; cap];
    let mut filled = 0;
    while filled < cap {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}
