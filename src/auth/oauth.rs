//! OAuth2 implicit-grant login through the user's browser.
//!
//! IDLE -> DISCOVERING -> AWAITING_REDIRECT -> CAPTURED -> DONE, or
//! AWAITING_REDIRECT -> TIMED_OUT when no callback arrives in time. A flow
//! never retries; callers run it again.

use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::URL_SAFE_NO_PAD};
use std::{
    io,
    net::Ipv4Addr,
    sync::Arc,
    time::Duration,
};
use tokio::{
    net::TcpListener,
    sync::{oneshot, watch},
    task::JoinHandle,
    time::{Instant, sleep},
};
use tracing::{debug, info, warn};
use url::Url;

use crate::{
    auth::{
        browser::BrowserLauncher,
        discovery::Discovery,
        token::{BearerToken, TokenFlow},
    },
    config::AppConfig,
    errors::{ClientError, ClientResult},
    handlers::callback_handlers::CallbackState,
    models::auth::CapturedToken,
    routes::routes::callback_routes,
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);
const SCOPES: &str = "openid profile email";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
    Idle,
    Discovering,
    AwaitingRedirect,
    Captured,
    Done,
    TimedOut,
}

/// Per-attempt anti-forgery values.
#[derive(Debug, Clone)]
pub struct OAuthSession {
    pub state: String,
    pub nonce: String,
}

impl OAuthSession {
    pub fn new() -> Self {
        Self {
            state: random_token(),
            nonce: random_token(),
        }
    }

    pub fn authorization_url(
        &self,
        endpoint: &str,
        client_id: &str,
        redirect_uri: &str,
    ) -> ClientResult<Url> {
        Ok(Url::parse_with_params(
            endpoint,
            &[
                ("response_type", "token"),
                ("redirect_uri", redirect_uri),
                ("state", self.state.as_str()),
                ("nonce", self.nonce.as_str()),
                ("scope", SCOPES),
                ("client_id", client_id),
            ],
        )?)
    }

    /// The captured token, if the redirect carried this session's state.
    pub fn accept(&self, captured: CapturedToken) -> ClientResult<BearerToken> {
        if captured.state.as_deref() != Some(self.state.as_str()) {
            return Err(ClientError::Credential(
                "login callback state does not match this session".into(),
            ));
        }
        captured
            .access_token
            .filter(|token| !token.is_empty())
            .map(BearerToken::new)
            .ok_or_else(|| ClientError::Credential("login callback carried no access token".into()))
    }
}

impl Default for OAuthSession {
    fn default() -> Self {
        Self::new()
    }
}

/// 32 bytes from the thread-local CSPRNG, URL-safe base64.
fn random_token() -> String {
    URL_SAFE_NO_PAD.encode(rand::random::<[u8; 32]>())
}

/// Local HTTP listener for the redirect, torn down on drop.
pub struct CallbackListener {
    port: u16,
    state: CallbackState,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl CallbackListener {
    /// Bind `127.0.0.1:port`. Port 0 picks a free port.
    pub async fn bind(port: u16) -> ClientResult<Self> {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, port))
            .await
            .map_err(|source| {
                if source.kind() == io::ErrorKind::AddrInUse {
                    ClientError::PortInUse { port, source }
                } else {
                    ClientError::Io(source)
                }
            })?;
        let port = listener.local_addr()?.port();

        let state = CallbackState::new();
        let app = callback_routes(state.clone());
        let (shutdown, signal) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            let server = axum::serve(listener, app).with_graceful_shutdown(async {
                let _ = signal.await;
            });
            if let Err(err) = server.await {
                warn!(error = %err, "callback listener stopped with an error");
            }
        });
        debug!(port, "callback listener bound");

        Ok(Self {
            port,
            state,
            shutdown: Some(shutdown),
            task,
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://localhost:{}/callback", self.port)
    }

    /// Poll for a token carrying `expected_state` until `timeout` elapses.
    ///
    /// Captures with any other state are dropped and waiting continues.
    pub async fn wait_for_token(
        &self,
        timeout: Duration,
        expected_state: &str,
    ) -> ClientResult<CapturedToken> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(captured) = self.state.take().await {
                if captured.state.as_deref() == Some(expected_state) {
                    return Ok(captured);
                }
                warn!("ignoring login callback from another session");
                continue;
            }
            if Instant::now() >= deadline {
                return Err(ClientError::Timeout(timeout.as_secs()));
            }
            sleep(POLL_INTERVAL).await;
        }
    }
}

impl Drop for CallbackListener {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
        self.task.abort();
        debug!(port = self.port, "callback listener released");
    }
}

/// The browser-driven implicit grant.
pub struct OidcFlow {
    cfg: Arc<AppConfig>,
    discovery: Arc<Discovery>,
    browser: Arc<dyn BrowserLauncher>,
    state: watch::Sender<FlowState>,
}

impl OidcFlow {
    pub fn new(cfg: Arc<AppConfig>, discovery: Arc<Discovery>, browser: Arc<dyn BrowserLauncher>) -> Self {
        Self {
            cfg,
            discovery,
            browser,
            state: watch::Sender::new(FlowState::Idle),
        }
    }

    /// State of the most recent run.
    pub fn state(&self) -> FlowState {
        *self.state.borrow()
    }

    fn transition(&self, next: FlowState) {
        let previous = self.state.send_replace(next);
        debug!(from = ?previous, to = ?next, "login flow transition");
    }

    async fn login(&self) -> ClientResult<BearerToken> {
        self.transition(FlowState::Idle);
        if !self.browser.is_available() {
            return Err(ClientError::Headless);
        }

        self.transition(FlowState::Discovering);
        let client_id = self.discovery.info().await?.client_id.clone();
        let endpoint = self.discovery.metadata().await?.authorization_endpoint.clone();

        let session = OAuthSession::new();
        let listener = CallbackListener::bind(self.cfg.oauth_port).await?;
        let auth_url = session.authorization_url(&endpoint, &client_id, &listener.redirect_uri())?;

        self.transition(FlowState::AwaitingRedirect);
        info!("opening browser to log in");
        if let Err(err) = self.browser.open(auth_url.as_str()) {
            warn!(error = %err, "could not open a browser; visit this URL to log in: {auth_url}");
        }

        let captured = match listener
            .wait_for_token(self.cfg.oauth_timeout, &session.state)
            .await {
            Ok(captured) => captured,
            Err(err) => {
                if matches!(err, ClientError::Timeout(_)) {
                    self.transition(FlowState::TimedOut);
                }
                return Err(err);
            }
        };
        drop(listener);

        self.transition(FlowState::Captured);
        let token = session.accept(captured)?;
        self.transition(FlowState::Done);
        info!("logged in");
        Ok(token)
    }
}

#[async_trait]
impl TokenFlow for OidcFlow {
    async fn run(&self) -> ClientResult<BearerToken> {
        self.login().await
    }
}
