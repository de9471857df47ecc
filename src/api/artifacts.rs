use async_trait::async_trait;
use serde_json::{Value, json};
use std::{path::Path, sync::Arc};

use crate::{
    errors::ClientResult,
    models::{
        artifact::{ArtifactInfo, PresignedUpload, UploadArtifactResponse},
        multipart::{CompletedPart, CreateUploadRequest, CreateUploadResponse},
    },
    services::{
        transport::{ApiClient, ApiRequest},
        upload_service::MultipartTarget,
    },
};

/// Listing artifacts: URDF archives and kernel images.
#[derive(Clone)]
pub struct ArtifactsApi {
    client: Arc<ApiClient>,
}

impl ArtifactsApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn info(&self, artifact_id: &str) -> ClientResult<ArtifactInfo> {
        self.client
            .request_as(ApiRequest::get("/artifacts/info").segment(artifact_id))
            .await
    }

    /// Reserve an artifact and get a presigned URL for a single-shot PUT.
    pub async fn presigned_upload(
        &self,
        listing_id: &str,
        filename: &str,
        checksum: Option<&str>,
    ) -> ClientResult<PresignedUpload> {
        let req = ApiRequest::post("/artifacts/presigned").segment(listing_id)
            .query("filename", filename)
            .query_opt("checksum", checksum);
        self.client.request_as(req).await
    }

    /// Upload a small archive through the API itself as a multipart form.
    pub async fn upload_form(&self, listing_id: &str, path: &Path) -> ClientResult<UploadArtifactResponse> {
        let req = ApiRequest::post("/artifacts/upload").segment(listing_id)
            .file("files", path, "application/gzip");
        self.client.request_as(req).await
    }

    pub async fn create_multipart(
        &self,
        listing_id: &str,
        request: &CreateUploadRequest,
    ) -> ClientResult<CreateUploadResponse> {
        let req = ApiRequest::post("/artifacts/multipart").segment(listing_id).json(request)?;
        self.client.request_as(req).await
    }

    pub async fn complete_multipart(
        &self,
        artifact_id: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> ClientResult<Value> {
        let body = json!({
            "artifact_id": artifact_id,
            "upload_id": upload_id,
            "parts": parts,
        });
        let req = ApiRequest::post("/artifacts/multipart")
            .segment(artifact_id)
            .segment("complete")
            .json(&body)?;
        self.client.request(req).await
    }
}

/// Multipart session for a kernel image under a listing.
pub struct KernelImageTarget {
    pub api: ArtifactsApi,
    pub listing_id: String,
    pub filename: String,
}

#[async_trait]
impl MultipartTarget for KernelImageTarget {
    fn describe(&self) -> String {
        format!("kernel image {} for listing {}", self.filename, self.listing_id)
    }

    async fn create_upload(&self, file_size: u64, part_size: u64) -> ClientResult<CreateUploadResponse> {
        let request = CreateUploadRequest {
            name: self.filename.clone(),
            file_size,
            part_size,
            description: None,
        };
        self.api.create_multipart(&self.listing_id, &request).await
    }

    async fn complete_upload(
        &self,
        resource_id: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> ClientResult<Value> {
        self.api.complete_multipart(resource_id, upload_id, parts).await
    }
}
