//! Artifact metadata as reported by the store API.

use serde::{Deserialize, Serialize};

/// Download locations for an artifact.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ArtifactUrls {
    #[serde(default)]
    pub small: Option<String>,
    pub large: String,
    #[serde(default)]
    pub expires_at: Option<i64>,
}

/// Response of `GET /artifacts/info/{id}`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ArtifactInfo {
    pub artifact_id: String,
    #[serde(default)]
    pub listing_id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub artifact_type: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub timestamp: Option<i64>,
    pub urls: ArtifactUrls,
    /// SHA-256 of the large file, when the server tracks one.
    #[serde(default)]
    pub checksum: Option<String>,
}

/// Response of `POST /artifacts/presigned/{listing}`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct PresignedUpload {
    pub artifact_id: String,
    pub upload_url: String,
}

/// Response of the multipart form upload endpoint.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UploadArtifactResponse {
    pub artifacts: Vec<ArtifactInfo>,
}

/// Response of `GET /krecs/download/{id}`.
///
/// Fields are optional on the wire; the download path rejects a response
/// missing `url` or `filename`.
#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct KRecInfo {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub filename: Option<String>,
    #[serde(default)]
    pub checksum: Option<String>,
}
