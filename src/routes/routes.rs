//! Defines routes for the local OAuth redirect listener.
//!
//! - `GET /callback` serves the fragment-forwarding page
//! - `GET /token` captures the forwarded access token

use crate::handlers::callback_handlers::{CallbackState, callback_page, capture_token};
use axum::{Router, routing::get};

/// Build the callback router with its capture slot attached.
pub fn callback_routes(state: CallbackState) -> Router {
    Router::new()
        .route("/callback", get(callback_page))
        .route("/token", get(capture_token))
        .with_state(state)
}
