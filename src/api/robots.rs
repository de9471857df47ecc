use std::sync::Arc;

use crate::{
    errors::ClientResult,
    models::robot::{AddRobotRequest, Robot},
    services::transport::{ApiClient, ApiRequest},
};

/// Individual robots registered by users.
#[derive(Clone)]
pub struct RobotsApi {
    client: Arc<ApiClient>,
}

impl RobotsApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    pub async fn list(&self) -> ClientResult<Vec<Robot>> {
        self.client.request_as(ApiRequest::get("/robot/")).await
    }

    /// Robots owned by `user` (`"me"` for the caller).
    pub async fn list_for_user(&self, user: &str) -> ClientResult<Vec<Robot>> {
        self.client
            .request_as(ApiRequest::get("/robot/user").segment(user))
            .await
    }

    pub async fn add(&self, name: &str, class_name: &str, description: Option<&str>) -> ClientResult<Robot> {
        let body = AddRobotRequest {
            class_name: class_name.to_string(),
            description: description.map(str::to_string),
        };
        self.client
            .request_as(ApiRequest::put("/robot").segment(name).json(&body)?)
            .await
    }

    pub async fn by_id(&self, id: &str) -> ClientResult<Robot> {
        self.client
            .request_as(ApiRequest::get("/robot/id").segment(id))
            .await
    }

    pub async fn by_name(&self, name: &str) -> ClientResult<Robot> {
        self.client
            .request_as(ApiRequest::get("/robot/name").segment(name))
            .await
    }
}
