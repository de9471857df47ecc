#![allow(dead_code)]

use async_trait::async_trait;
use axum::Router;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use robostore::{
    AppConfig, ClientResult, Store,
    auth::{BearerToken, TokenCache, TokenFlow, TokenVerifier},
    services::transport::Transport,
};
use serde_json::{Value, json};
use std::{
    path::Path,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};
use tokio::net::TcpListener;

pub const TEST_KEY_PEM: &[u8] = include_bytes!("../fixtures/test_rsa_key.pem");
pub const TEST_JWKS: &str = include_str!("../fixtures/jwks.json");
pub const TEST_KID: &str = "test-key-1";

/// Serve `app` on an ephemeral local port and return its base URL.
pub async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

/// Like [`serve`], for routers that need to know their own base URL.
pub async fn serve_with(build: impl FnOnce(String) -> Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let base = format!("http://{}", listener.local_addr().unwrap());
    let app = build(base.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    base
}

pub fn jwks() -> Value {
    serde_json::from_str(TEST_JWKS).unwrap()
}

/// RS256 token signed with the fixture key, expiring `exp_offset` seconds from now.
pub fn mint_token(exp_offset: i64) -> String {
    mint_token_with_kid(TEST_KID, exp_offset)
}

/// Like [`mint_token`], with an arbitrary key id in the header.
pub fn mint_token_with_kid(kid: &str, exp_offset: i64) -> String {
    let header = Header {
        alg: Algorithm::RS256,
        kid: Some(kid.to_string()),
        ..Header::default()
    };
    let claims = json!({
        "sub": "user-1",
        "exp": chrono::Utc::now().timestamp() + exp_offset,
    });
    encode(&header, &claims, &EncodingKey::from_rsa_pem(TEST_KEY_PEM).unwrap()).unwrap()
}

pub fn config(api_root: &str, dir: &Path) -> AppConfig {
    let mut cfg = AppConfig::new(api_root, dir);
    cfg.request_timeout = Duration::from_secs(10);
    cfg.transfer_timeout = Duration::from_secs(30);
    cfg
}

/// A login flow that hands out a fixed token and counts how often it ran.
pub struct CountingFlow {
    pub token: String,
    pub delay: Duration,
    pub runs: AtomicUsize,
}

impl CountingFlow {
    pub fn new(token: impl Into<String>) -> Self {
        Self {
            token: token.into(),
            delay: Duration::ZERO,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TokenFlow for CountingFlow {
    async fn run(&self) -> ClientResult<BearerToken> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(self.delay).await;
        Ok(BearerToken::new(self.token.clone()))
    }
}

pub struct NeverExpires;

#[async_trait]
impl TokenVerifier for NeverExpires {
    async fn is_token_expired(&self, _token: &str) -> ClientResult<bool> {
        Ok(false)
    }
}

/// A store that authenticates with a fixed bearer token and never logs in.
pub fn store(cfg: AppConfig) -> Store {
    let cfg = Arc::new(cfg);
    let tokens = Arc::new(TokenCache::new(
        cfg.clone(),
        Arc::new(CountingFlow::new("test-token")),
        Arc::new(NeverExpires),
    ));
    Store::with_tokens(cfg.clone(), Transport::new(cfg), tokens)
}

/// Gzipped tarball holding the given `(path, contents)` entries.
pub fn tarball(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    let mut builder = tar::Builder::new(encoder);
    for (path, contents) in entries {
        let mut header = tar::Header::new_gnu();
        header.set_size(contents.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *contents).unwrap();
    }
    builder.into_inner().unwrap().finish().unwrap()
}

pub fn sha256_hex(bytes: &[u8]) -> String {
    use sha2::{Digest, Sha256};
    hex::encode(Sha256::digest(bytes))
}

pub fn hits(counter: &AtomicUsize) -> usize {
    counter.load(Ordering::SeqCst)
}
