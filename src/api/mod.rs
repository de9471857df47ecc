//! Endpoint groups. Each wraps a shared [`ApiClient`](crate::services::transport::ApiClient).

pub mod artifacts;
pub mod krecs;
pub mod robot_classes;
pub mod robots;
pub mod users;

pub use artifacts::{ArtifactsApi, KernelImageTarget};
pub use krecs::{KRecTarget, KRecsApi};
pub use robot_classes::RobotClassesApi;
pub use robots::RobotsApi;
pub use users::UsersApi;
