//! Robots and robot classes.

use serde::{Deserialize, Serialize};

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct Robot {
    pub id: String,
    #[serde(default)]
    pub robot_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub class_name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RobotClass {
    pub id: String,
    pub class_name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub user_id: Option<String>,
}

/// Body of `PUT /robot/{name}`.
#[derive(Serialize, Clone, Debug)]
pub struct AddRobotRequest {
    pub class_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Presigned slot for a robot-class URDF archive.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RobotUrdfUploadSlot {
    pub url: String,
    pub filename: String,
    pub content_type: String,
}

/// Download location and quoted MD5 of a robot-class URDF archive.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct RobotUrdfDownload {
    pub url: String,
    pub md5_hash: String,
}
