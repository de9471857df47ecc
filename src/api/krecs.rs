use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Value, json};
use std::sync::Arc;

use crate::{
    errors::ClientResult,
    models::{
        artifact::KRecInfo,
        multipart::{CompletedPart, CreateUploadResponse},
    },
    services::{
        transport::{ApiClient, ApiRequest},
        upload_service::MultipartTarget,
    },
};

/// Body of `POST /krecs/upload`.
#[derive(Serialize, Clone, Debug)]
pub struct UploadKRecRequest {
    pub robot_id: String,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub file_size: u64,
    pub part_size: u64,
}

/// Recorded robot telemetry clips.
#[derive(Clone)]
pub struct KRecsApi {
    client: Arc<ApiClient>,
}

impl KRecsApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn create_upload(&self, request: &UploadKRecRequest) -> ClientResult<CreateUploadResponse> {
        self.client
            .request_as(ApiRequest::post("/krecs/upload").json(request)?)
            .await
    }

    pub async fn complete_upload(
        &self,
        krec_id: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> ClientResult<Value> {
        let body = json!({
            "krec_id": krec_id,
            "upload_id": upload_id,
            "parts": parts,
        });
        self.client
            .request(ApiRequest::post("/krecs").segment(krec_id).segment("complete").json(&body)?)
            .await
    }

    pub async fn download_info(&self, krec_id: &str) -> ClientResult<KRecInfo> {
        self.client
            .request_as(ApiRequest::get("/krecs/download").segment(krec_id))
            .await
    }
}

/// Multipart session for one K-Rec file attached to a robot.
pub struct KRecTarget {
    pub api: KRecsApi,
    pub robot_id: String,
    pub name: String,
    pub description: Option<String>,
}

#[async_trait]
impl MultipartTarget for KRecTarget {
    fn describe(&self) -> String {
        format!("krec {} for robot {}", self.name, self.robot_id)
    }

    async fn create_upload(&self, file_size: u64, part_size: u64) -> ClientResult<CreateUploadResponse> {
        let request = UploadKRecRequest {
            robot_id: self.robot_id.clone(),
            name: self.name.clone(),
            description: self.description.clone(),
            file_size,
            part_size,
        };
        self.api.create_upload(&request).await
    }

    async fn complete_upload(
        &self,
        resource_id: &str,
        upload_id: &str,
        parts: &[CompletedPart],
    ) -> ClientResult<Value> {
        self.api.complete_upload(resource_id, upload_id, parts).await
    }
}
