use std::sync::Arc;

use crate::{
    errors::{ClientError, ClientResult},
    models::robot::{RobotClass, RobotUrdfDownload, RobotUrdfUploadSlot},
    services::transport::{ApiClient, ApiRequest},
};

/// Robot classes and their shared URDF archives.
#[derive(Clone)]
pub struct RobotClassesApi {
    client: Arc<ApiClient>,
}

impl RobotClassesApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ClientResult<Vec<RobotClass>> {
        self.client.request_as(ApiRequest::get("/robots/")).await
    }

    pub async fn create(&self, name: &str, description: Option<&str>) -> ClientResult<RobotClass> {
        let req = ApiRequest::put("/robots").segment(name).query_opt("description", description);
        self.client.request_as(req).await
    }

    /// Rename and/or re-describe a class. At least one change is required.
    pub async fn update(
        &self,
        name: &str,
        new_name: Option<&str>,
        new_description: Option<&str>,
    ) -> ClientResult<RobotClass> {
        if new_name.is_none() && new_description.is_none() {
            return Err(ClientError::InvalidInput("no parameters to update".into()));
        }
        let req = ApiRequest::post("/robots").segment(name)
            .query_opt("new_class_name", new_name)
            .query_opt("new_description", new_description);
        self.client.request_as(req).await
    }

    pub async fn delete(&self, name: &str) -> ClientResult<()> {
        self.client
            .request(ApiRequest::delete("/robots").segment(name))
            .await?;
        Ok(())
    }

    /// Presigned PUT slot for a class's URDF archive.
    pub async fn urdf_upload_slot(
        &self,
        name: &str,
        filename: &str,
        content_type: &str,
    ) -> ClientResult<RobotUrdfUploadSlot> {
        let req = ApiRequest::put("/robots/urdf").segment(name)
            .query("filename", filename)
            .query("content_type", content_type);
        self.client.request_as(req).await
    }

    pub async fn urdf_download_info(&self, name: &str) -> ClientResult<RobotUrdfDownload> {
        self.client
            .request_as(ApiRequest::get("/robots/urdf").segment(name))
            .await
    }
}
