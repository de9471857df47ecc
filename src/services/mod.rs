//! Client-side services: transport, transfers, the artifact cache and the
//! per-kind workflows built on top of them.

pub mod archive;
pub mod cache_service;
pub mod checksum;
pub mod kernel_service;
pub mod krec_service;
pub mod robot_class_service;
pub mod transport;
pub mod upload_service;
pub mod urdf_service;
