//! Wire types for the store API.
//!
//! Every entity serializes with `serde`. Optional server fields default to
//! `None` so older and newer API versions both deserialize.

pub mod artifact;
pub mod auth;
pub mod multipart;
pub mod robot;
pub mod user;
