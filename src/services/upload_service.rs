//! Uploads to presigned blob storage URLs.
//!
//! Large artifacts go through [`MultipartUploader`]: the file is hashed
//! first, a session is negotiated with the server, every part is PUT to its
//! own presigned URL in ascending order and the session is completed with
//! the collected ETags. Small archives use [`upload_single`].

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::{
    Body, Method,
    header::{CONTENT_LENGTH, CONTENT_TYPE, ETAG},
};
use serde_json::Value;
use std::{io::ErrorKind, path::Path};
use tokio::{
    fs::File,
    io::{AsyncRead, AsyncReadExt},
};
use tokio_util::io::ReaderStream;
use tracing::{debug, error, info};

use crate::{
    errors::{ClientError, ClientResult},
    models::multipart::{CompletedPart, CreateUploadResponse, normalize_etag},
    services::{
        checksum::{ChecksumAlgorithm, file_digest},
        transport::Transport,
    },
};

const OCTET_STREAM: &str = "application/octet-stream";
const CONTENT_MD5: &str = "Content-MD5";

/// Server side of a multipart upload: session creation and completion.
#[async_trait]
pub trait MultipartTarget: Send + Sync {
    /// Short label for logs, e.g. `krec for robot r-1`.
    fn describe(&self) -> String;

    async fn create_upload(&self, file_size: u64, part_size: u64) -> ClientResult<CreateUploadResponse>;

    async fn complete_upload(
        &self,
        resource_id: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> ClientResult<Value>;
}

/// Outcome of a finished multipart upload.
#[derive(Debug, Clone)]
pub struct UploadReceipt {
    pub resource_id: String,
    pub upload_id: String,
    /// SHA-256 of the whole file, hex.
    pub checksum: String,
    pub file_size: u64,
    pub parts: Vec<CompletedPart>,
    /// Body of the completion response.
    pub response: Value,
}

pub struct MultipartUploader {
    transport: Transport,
    part_size: u64,
}

impl MultipartUploader {
    pub fn new(transport: Transport, part_size: u64) -> Self {
        Self {
            transport,
            part_size,
        }
    }

    pub fn part_size(&self) -> u64 {
        self.part_size
    }

    /// Upload `path` in parts. Any failure aborts the whole upload.
    pub async fn upload(&self, target: &dyn MultipartTarget, path: &Path) -> ClientResult<UploadReceipt> {
        if self.part_size == 0 {
            return Err(ClientError::InvalidInput("part size must be positive".into()));
        }

        let (checksum, file_size) = file_digest(path, ChecksumAlgorithm::Sha256).await?;
        if file_size == 0 {
            return Err(ClientError::InvalidInput(format!("{} is empty", path.display())));
        }
        info!(
            destination = %target.describe(),
            file = %path.display(),
            bytes = file_size,
            sha256 = %checksum,
            "starting multipart upload"
        );

        let created = target.create_upload(file_size, self.part_size).await?;
        let session = &created.upload_details;
        let parts = session.ordered_parts(file_size)?;
        let total = parts.len();
        info!(
            resource_id = %created.resource_id,
            upload_id = %session.upload_id,
            parts = total,
            "initialized upload session"
        );

        let mut file = File::open(path).await?;
        let mut completed = Vec::with_capacity(total);
        let mut offset = 0u64;
        for (part_number, url) in parts {
            match self
                .upload_part(&mut file, session.part_size, part_number, url)
                .await
            {
                Ok((part, len)) => {
                    info!(part_number, total, "uploaded part");
                    completed.push(part);
                    offset += len;
                }
                Err(source) => {
                    error!(
                        upload_id = %session.upload_id,
                        resource_id = %created.resource_id,
                        part_number,
                        offset,
                        error = %source,
                        "part upload failed; retry from this part to resume"
                    );
                    return Err(ClientError::UploadPart {
                        upload_id: session.upload_id.clone(),
                        part_number,
                        offset,
                        source: Box::new(source),
                    });
                }
            }
        }

        if offset != file_size || !read_part(&mut file, 1).await?.is_empty() {
            return Err(ClientError::InvalidInput(format!(
                "{} changed size during upload",
                path.display()
            )));
        }

        let response = match target
            .complete_upload(&created.resource_id, &session.upload_id, &completed)
            .await
        {
            Ok(response) => response,
            Err(err) => {
                error!(
                    upload_id = %session.upload_id,
                    resource_id = %created.resource_id,
                    parts = completed.len(),
                    error = %err,
                    "completing upload failed; all parts were sent"
                );
                return Err(err);
            }
        };

        info!(resource_id = %created.resource_id, "upload complete");
        Ok(UploadReceipt {
            resource_id: created.resource_id.clone(),
            upload_id: session.upload_id.clone(),
            checksum,
            file_size,
            parts: completed,
            response,
        })
    }

    /// Read the next part from `file` and PUT it. Returns the receipt and
    /// the number of bytes sent.
    async fn upload_part(
        &self,
        file: &mut File,
        part_size: u64,
        part_number: u32,
        url: &str,
    ) -> ClientResult<(CompletedPart, u64)> {
        let chunk = read_part(file, part_size).await?;
        if chunk.is_empty() {
            return Err(ClientError::InvalidInput(format!(
                "file ended before part {part_number}; was it modified during upload?"
            )));
        }
        let len = chunk.len() as u64;
        debug!(part_number, bytes = len, "uploading part");
        let part = self.put_part(part_number, url, chunk).await?;
        Ok((part, len))
    }

    async fn put_part(&self, part_number: u32, url: &str, chunk: Vec<u8>) -> ClientResult<CompletedPart> {
        let md5 = general_purpose::STANDARD.encode(md5::compute(&chunk).0);
        let builder = self
            .transport
            .transfer(Method::PUT, url)
            .await?
            .header(CONTENT_LENGTH, chunk.len())
            .header(CONTENT_TYPE, OCTET_STREAM)
            .header(CONTENT_MD5, &md5)
            .body(chunk);
        let response = self.transport.execute(&Method::PUT, builder).await?;

        let etag = response
            .headers()
            .get(ETAG)
            .and_then(|value| value.to_str().ok())
            .map(normalize_etag)
            .filter(|etag| !etag.is_empty())
            .ok_or_else(|| {
                ClientError::MalformedResponse(format!("part {part_number} response has no ETag"))
            })?;

        Ok(CompletedPart {
            part_number,
            etag,
            checksum: Some(md5),
        })
    }
}

/// Read up to `limit` bytes; shorter only at end of input.
async fn read_part<R: AsyncRead + Unpin>(reader: &mut R, limit: u64) -> ClientResult<Vec<u8>> {
    let mut buf = Vec::with_capacity(limit.min(16 * 1024 * 1024) as usize);
    reader.take(limit).read_to_end(&mut buf).await?;
    Ok(buf)
}

/// Stream a whole file to one presigned URL.
pub async fn upload_single(
    transport: &Transport,
    url: &str,
    path: &Path,
    content_type: &str,
) -> ClientResult<()> {
    let file = File::open(path).await.map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            ClientError::FileNotFound(path.to_path_buf())
        } else {
            ClientError::Io(err)
        }
    })?;
    let size = file.metadata().await?.len();

    info!(file = %path.display(), bytes = size, "uploading file");
    let builder = transport
        .transfer(Method::PUT, url)
        .await?
        .header(CONTENT_LENGTH, size)
        .header(CONTENT_TYPE, content_type)
        .body(Body::wrap_stream(ReaderStream::new(file)));
    transport.execute(&Method::PUT, builder).await?;
    info!(file = %path.display(), "upload finished");
    Ok(())
}
