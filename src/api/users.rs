use std::sync::Arc;

use crate::{
    errors::ClientResult,
    models::user::Profile,
    services::transport::{ApiClient, ApiRequest},
};

#[derive(Clone)]
pub struct UsersApi {
    client: Arc<ApiClient>,
}

impl UsersApi {
    pub fn new(client: Arc<ApiClient>) -> Self {
        Self { client }
    }

    /// The authenticated user's profile.
    pub async fn profile(&self) -> ClientResult<Profile> {
        self.client.request_as(ApiRequest::get("/auth/profile")).await
    }
}
