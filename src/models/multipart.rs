//! Represents multipart upload sessions and parts.

use serde::{Deserialize, Serialize};

use crate::errors::{ClientError, ClientResult};

/// Server response to a "create upload" call.
///
/// K-Rec sessions identify the resource as `krec_id`, kernel image sessions
/// as `artifact_id`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct CreateUploadResponse {
    #[serde(alias = "krec_id", alias = "artifact_id")]
    pub resource_id: String,

    pub upload_details: UploadSession,
}

/// A multipart upload session, negotiated before uploading large files in parts.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadSession {
    /// Opaque upload ID issued by blob storage.
    pub upload_id: String,

    /// Total size in bytes declared when the session was created.
    #[serde(default)]
    pub file_size: Option<u64>,

    /// Size of every part but the last.
    pub part_size: u64,

    /// One presigned URL per part, numbered from 1.
    pub presigned_urls: Vec<PresignedPart>,
}

/// A presigned PUT target for a single part.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PresignedPart {
    /// Part number (1-based). Positional when the server omits it.
    #[serde(default)]
    pub part_number: Option<u32>,

    pub url: String,
}

/// Receipt for one uploaded part, sent back in the completion call.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct CompletedPart {
    /// Part number (1-based).
    pub part_number: u32,

    /// ETag returned by blob storage, quotes stripped.
    pub etag: String,

    /// Base64 MD5 of the part body, as sent in `Content-MD5`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub checksum: Option<String>,
}

/// Request passed to the server's "create upload" endpoint.
#[derive(Serialize, Clone, Debug)]
pub struct CreateUploadRequest {
    pub name: String,
    pub file_size: u64,
    pub part_size: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl UploadSession {
    /// Number of parts a file of `file_size` bytes splits into.
    pub fn expected_parts(file_size: u64, part_size: u64) -> u64 {
        file_size.div_ceil(part_size)
    }

    /// Check the session against the local file and return the presigned
    /// URLs keyed by their part numbers, in ascending order.
    pub fn ordered_parts(&self, file_size: u64) -> ClientResult<Vec<(u32, &str)>> {
        if self.part_size == 0 {
            return Err(ClientError::MalformedResponse(format!(
                "upload {} declares a part size of zero",
                self.upload_id
            )));
        }
        if let Some(declared) = self.file_size {
            if declared != file_size {
                return Err(ClientError::MalformedResponse(format!(
                    "upload {} declares {declared} bytes but the file has {file_size}",
                    self.upload_id
                )));
            }
        }

        let expected = Self::expected_parts(file_size, self.part_size);
        if self.presigned_urls.len() as u64 != expected {
            return Err(ClientError::MalformedResponse(format!(
                "upload {} has {} presigned URLs, expected {expected} for {file_size} bytes at {} bytes per part",
                self.upload_id,
                self.presigned_urls.len(),
                self.part_size
            )));
        }

        let mut parts: Vec<(u32, &str)> = self
            .presigned_urls
            .iter()
            .enumerate()
            .map(|(idx, part)| {
                (
                    part.part_number.unwrap_or(idx as u32 + 1),
                    part.url.as_str(),
                )
            })
            .collect();
        parts.sort_by_key(|(number, _)| *number);

        for (idx, (number, _)) in parts.iter().enumerate() {
            if *number != idx as u32 + 1 {
                return Err(ClientError::MalformedResponse(format!(
                    "upload {} has non-contiguous part numbers (found {number} at position {})",
                    self.upload_id,
                    idx + 1
                )));
            }
        }

        Ok(parts)
    }
}

/// Strip the surrounding quotes blob storage puts on ETags.
pub fn normalize_etag(raw: &str) -> String {
    raw.trim().trim_matches('"').to_string()
}
