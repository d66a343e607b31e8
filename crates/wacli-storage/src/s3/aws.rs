//! [`ObjectBucket`] backed by `aws-sdk-s3`.
//!
//! The SDK is async; the bucket owns a Tokio runtime with one worker and
//! blocks on it from the calling thread. The worker drives the connection
//! while a caller reads a body through `SyncIoBridge`, which only parks on
//! the runtime handle. Uploads go through [`MultipartWriter`].

use std::future::Future;
use std::io::{self, Read, Write};
use std::sync::Arc;

use aws_sdk_s3::config::{Credentials, Region};
use aws_sdk_s3::error::DisplayErrorContext;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{
    BucketLocationConstraint, CompletedMultipartUpload, CompletedPart, CreateBucketConfiguration,
};
use aws_sdk_s3::Client;
use tokio::runtime::Runtime;
use tokio_util::io::SyncIoBridge;
use tracing::{debug, info, warn};

use wacli_types::{ResourceError, ResourceResult, ResourceSink};

use super::bucket::ObjectBucket;
use super::S3Settings;

/// Size of one multipart upload part. Objects smaller than this are sent
/// with a single `PutObject`.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

fn transport<E: std::error::Error>(context: &str, err: E) -> ResourceError {
    ResourceError::Transport(format!("{context}: {}", DisplayErrorContext(err)))
}

/// S3 bucket reached through the AWS SDK.
pub struct AwsBucket {
    client: Client,
    bucket: String,
    region: String,
    runtime: Arc<Runtime>,
}

impl AwsBucket {
    /// Build a client from `settings`. No request is made.
    pub fn connect(settings: &S3Settings) -> ResourceResult<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("wacli-s3")
            .enable_all()
            .build()?;

        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(Region::new(settings.region.clone()));
        if let Some(url) = &settings.endpoint_url {
            loader = loader.endpoint_url(url);
        }
        if let Some(creds) = &settings.credentials {
            loader = loader.credentials_provider(Credentials::new(
                creds.access_key.clone(),
                creds.secret_key.clone(),
                None,
                None,
                "wacli",
            ));
        }
        let sdk_config = runtime.block_on(loader.load());
        let s3_config = aws_sdk_s3::config::Builder::from(&sdk_config)
            .force_path_style(settings.endpoint_url.is_some())
            .build();

        info!(bucket = %settings.bucket_name, region = %settings.region, "configured S3 client");
        Ok(Self {
            client: Client::from_conf(s3_config),
            bucket: settings.bucket_name.clone(),
            region: settings.region.clone(),
            runtime: Arc::new(runtime),
        })
    }

    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }
}

impl ObjectBucket for AwsBucket {
    fn name(&self) -> &str {
        &self.bucket
    }

    fn exists(&self) -> ResourceResult<bool> {
        match self.block_on(self.client.head_bucket().bucket(&self.bucket).send()) {
            Ok(_) => Ok(true),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(false),
            Err(e) => Err(transport("HeadBucket", e)),
        }
    }

    fn create(&self) -> ResourceResult<()> {
        let mut request = self.client.create_bucket().bucket(&self.bucket);
        // us-east-1 rejects an explicit location constraint.
        if self.region != "us-east-1" {
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                    .build(),
            );
        }
        self.block_on(request.send())
            .map_err(|e| transport("CreateBucket", e))?;
        info!(bucket = %self.bucket, "created bucket");
        Ok(())
    }

    fn head(&self, key: &str) -> ResourceResult<Option<u64>> {
        match self.block_on(self.client.head_object().bucket(&self.bucket).key(key).send()) {
            Ok(resp) => Ok(Some(resp.content_length().unwrap_or(0).max(0) as u64)),
            Err(e) if e.as_service_error().is_some_and(|se| se.is_not_found()) => Ok(None),
            Err(e) => Err(transport("HeadObject", e)),
        }
    }

    fn get(&self, key: &str) -> ResourceResult<Box<dyn Read + Send>> {
        let resp = match self.block_on(self.client.get_object().bucket(&self.bucket).key(key).send()) {
            Ok(resp) => resp,
            Err(e) if e.as_service_error().is_some_and(|se| se.is_no_such_key()) => {
                return Err(ResourceError::NotFound(key.to_string()))
            }
            Err(e) => return Err(transport("GetObject", e)),
        };
        let reader = Box::pin(resp.body.into_async_read());
        Ok(Box::new(SyncIoBridge::new_with_handle(
            reader,
            self.runtime.handle().clone(),
        )))
    }

    fn put(&self, key: &str) -> ResourceResult<Box<dyn ResourceSink>> {
        Ok(Box::new(MultipartWriter {
            client: self.client.clone(),
            bucket: self.bucket.clone(),
            key: key.to_string(),
            runtime: self.runtime.clone(),
            buffer: Vec::new(),
            upload_id: None,
            parts: Vec::new(),
        }))
    }

    fn list_keys(&self, prefix: &str) -> ResourceResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;
        loop {
            let mut request = self.client.list_objects_v2().bucket(&self.bucket).prefix(prefix);
            if let Some(t) = token.take() {
                request = request.continuation_token(t);
            }
            let resp = self
                .block_on(request.send())
                .map_err(|e| transport("ListObjectsV2", e))?;
            keys.extend(resp.contents().iter().filter_map(|o| o.key().map(str::to_string)));
            match resp.next_continuation_token() {
                Some(t) => token = Some(t.to_string()),
                None => break,
            }
        }
        keys.sort();
        Ok(keys)
    }
}

/// Upload sink buffering at most one part in memory.
///
/// Dropping a writer without `finish` aborts any multipart upload it
/// started, so no parts are left behind in the bucket.
pub struct MultipartWriter {
    client: Client,
    bucket: String,
    key: String,
    runtime: Arc<Runtime>,
    buffer: Vec<u8>,
    upload_id: Option<String>,
    parts: Vec<CompletedPart>,
}

fn io_error<E: std::error::Error>(context: &str, err: E) -> io::Error {
    io::Error::other(format!("{context}: {}", DisplayErrorContext(err)))
}

impl MultipartWriter {
    fn upload_id(&mut self) -> io::Result<String> {
        if let Some(id) = &self.upload_id {
            return Ok(id.clone());
        }
        let resp = self
            .runtime
            .block_on(
                self.client
                    .create_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .send(),
            )
            .map_err(|e| io_error("CreateMultipartUpload", e))?;
        let id = resp
            .upload_id()
            .ok_or_else(|| io::Error::other("CreateMultipartUpload returned no upload id"))?
            .to_string();
        self.upload_id = Some(id.clone());
        Ok(id)
    }

    fn upload_part(&mut self, data: Vec<u8>) -> io::Result<()> {
        let upload_id = self.upload_id()?;
        let part_number = self.parts.len() as i32 + 1;
        let resp = self
            .runtime
            .block_on(
                self.client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .body(ByteStream::from(data))
                    .send(),
            )
            .map_err(|e| io_error("UploadPart", e))?;
        self.parts.push(
            CompletedPart::builder()
                .set_e_tag(resp.e_tag().map(str::to_string))
                .part_number(part_number)
                .build(),
        );
        debug!(key = %self.key, part = part_number, "uploaded part");
        Ok(())
    }
}

impl Write for MultipartWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        while self.buffer.len() >= PART_SIZE {
            let part = self.buffer.drain(..PART_SIZE).collect();
            self.upload_part(part)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl ResourceSink for MultipartWriter {
    fn finish(mut self: Box<Self>) -> io::Result<()> {
        if self.upload_id.is_none() {
            let body = ByteStream::from(std::mem::take(&mut self.buffer));
            self.runtime
                .block_on(
                    self.client
                        .put_object()
                        .bucket(&self.bucket)
                        .key(&self.key)
                        .body(body)
                        .send(),
                )
                .map_err(|e| io_error("PutObject", e))?;
            return Ok(());
        }

        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.upload_part(rest)?;
        }
        let upload_id = self.upload_id()?;
        let parts = std::mem::take(&mut self.parts);
        let count = parts.len();
        self.runtime
            .block_on(
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(&self.key)
                    .upload_id(upload_id)
                    .multipart_upload(CompletedMultipartUpload::builder().set_parts(Some(parts)).build())
                    .send(),
            )
            .map_err(|e| io_error("CompleteMultipartUpload", e))?;
        self.upload_id = None;
        debug!(key = %self.key, parts = count, "completed multipart upload");
        Ok(())
    }
}

impl Drop for MultipartWriter {
    fn drop(&mut self) {
        let Some(upload_id) = self.upload_id.take() else {
            return;
        };
        let aborted = self.runtime.block_on(
            self.client
                .abort_multipart_upload()
                .bucket(&self.bucket)
                .key(&self.key)
                .upload_id(upload_id)
                .send(),
        );
        match aborted {
            Ok(_) => warn!(key = %self.key, parts = self.parts.len(), "aborted unfinished multipart upload"),
            Err(e) => warn!(
                key = %self.key,
                error = %DisplayErrorContext(e),
                "could not abort multipart upload"
            ),
        }
    }
}
