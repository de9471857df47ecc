use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct UserPublic {
    pub id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
}

/// Response of `GET /auth/profile`.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Profile {
    pub email: String,
    #[serde(default)]
    pub email_verified: bool,
    pub user: UserPublic,
}
