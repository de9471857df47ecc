//! Client library for the robot asset store.
//!
//! [`Store`] wires everything together: OAuth login with an on-disk token
//! cache, an authenticated request client, multipart uploads to presigned
//! URLs and a checksum-verified local artifact cache.

pub mod api;
pub mod auth;
pub mod cli;
pub mod config;
pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod services;
pub mod store;

pub use config::AppConfig;
pub use errors::{ClientError, ClientResult, ErrorCategory};
pub use store::Store;
