//! Handlers for the local OAuth redirect listener.
//!
//! - GET /callback -> static page that lifts the token out of the URL fragment
//! - GET /token    -> receives the forwarded token as query parameters

use crate::{errors::CallbackError, models::auth::CapturedToken};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    response::{Html, IntoResponse},
};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Slot the `/token` handler fills and the login flow polls.
#[derive(Clone, Default)]
pub struct CallbackState {
    pub captured: Arc<Mutex<Option<CapturedToken>>>,
}

impl CallbackState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the captured token, leaving the slot empty.
    pub async fn take(&self) -> Option<CapturedToken> {
        self.captured.lock().await.take()
    }
}

/// `GET /callback`
///
/// The identity provider redirects here with the token in the fragment,
/// which browsers never send to the server. The page script re-submits it
/// to `/token` as query parameters.
pub async fn callback_page() -> impl IntoResponse {
    Html(CALLBACK_PAGE)
}

/// `GET /token`
pub async fn capture_token(
    State(state): State<CallbackState>,
    Query(params): Query<CapturedToken>,
) -> Result<impl IntoResponse, CallbackError> {
    let has_token = params
        .access_token
        .as_deref()
        .is_some_and(|token| !token.is_empty());
    if !has_token {
        warn!("callback reached /token without an access token");
        return Err(CallbackError::bad_request("missing access_token parameter"));
    }

    debug!(
        token_type = params.token_type.as_deref().unwrap_or("unknown"),
        expires_in = params.expires_in.as_deref().unwrap_or("unknown"),
        "captured access token from browser redirect"
    );
    *state.captured.lock().await = Some(params);

    Ok((StatusCode::OK, "OK"))
}

const CALLBACK_PAGE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Authentication successful</title>
    <style>
        body { font-family: -apple-system, BlinkMacSystemFont, sans-serif; display: flex;
               justify-content: center; align-items: center; min-height: 100vh; margin: 0;
               background: #f5f5f5; color: #333; }
        .card { background: white; padding: 2rem; border-radius: 8px;
                box-shadow: 0 2px 4px rgba(0,0,0,0.1); max-width: 520px; width: 90%; }
        #status { color: #6c757d; }
    </style>
</head>
<body>
    <div class="card">
        <h1>Authentication successful</h1>
        <p id="status">Handing the token to the command line...</p>
    </div>
    <script>
        const params = new URLSearchParams(window.location.hash.substring(1));
        const status = document.getElementById('status');
        const accessToken = params.get('access_token');
        if (accessToken) {
            const tokenUrl = new URL(window.location.href);
            tokenUrl.pathname = '/token';
            tokenUrl.hash = '';
            for (const key of ['access_token', 'token_type', 'id_token', 'state', 'expires_in']) {
                const value = params.get(key);
                if (value !== null) {
                    tokenUrl.searchParams.set(key, value);
                }
            }
            fetch(tokenUrl.toString())
                .then(() => { status.textContent = 'You can close this window now.'; })
                .catch(() => { status.textContent = 'Could not reach the command line. Please try again.'; });
        } else {
            status.textContent = 'No access token was returned by the identity provider.';
        }
    </script>
</body>
</html>
"#;
