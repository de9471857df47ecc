//! Bearer token acquisition, caching and expiry checks.
//!
//! `TokenCache::get_bearer_token` is single-flight: concurrent callers in one
//! process share one in-flight acquisition, and a successful result is kept
//! for the rest of the process. A failed acquisition is forgotten so the
//! next call starts over.

use async_trait::async_trait;
use futures::{
    FutureExt,
    future::{BoxFuture, Shared},
};
use jsonwebtoken::{
    Algorithm, DecodingKey, Validation, decode, decode_header,
    errors::ErrorKind,
    jwk::{Jwk, JwkSet},
};
use serde::Deserialize;
use std::{collections::HashMap, fmt, io, path::Path, sync::Arc};
use tokio::{fs, sync::Mutex};
use tracing::{debug, info, warn};

use crate::{
    auth::discovery::Discovery,
    config::AppConfig,
    errors::{ClientError, ClientResult},
    services::cache_service::write_private,
};

pub const TOKEN_FILE: &str = "bearer_token.txt";

/// A signed access token. Only ever replaced wholesale.
#[derive(Clone, PartialEq, Eq)]
pub struct BearerToken(String);

impl BearerToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BearerToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BearerToken(<redacted>)")
    }
}

/// Interactive acquisition of a fresh token.
#[async_trait]
pub trait TokenFlow: Send + Sync {
    async fn run(&self) -> ClientResult<BearerToken>;
}

/// Expiry check for a cached token.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    /// `Ok(true)` when the token's `exp` is in the past. Validation failures
    /// other than expiry are errors.
    async fn is_token_expired(&self, token: &str) -> ClientResult<bool>;
}

#[derive(Debug, Deserialize)]
struct ExpiryClaims {
    exp: i64,
}

/// Verifies RS256 signatures against the provider's JWKS.
pub struct JwksVerifier {
    discovery: Arc<Discovery>,
}

impl JwksVerifier {
    pub fn new(discovery: Arc<Discovery>) -> Self {
        Self { discovery }
    }
}

#[async_trait]
impl TokenVerifier for JwksVerifier {
    async fn is_token_expired(&self, token: &str) -> ClientResult<bool> {
        let header = decode_header(token)?;
        let kid = header.kid.as_deref();
        let jwk = match select_key(&*self.discovery.jwks().await?, kid) {
            Some(jwk) => jwk,
            None => {
                warn!(
                    kid = kid.unwrap_or("<none>"),
                    "token signed by an unknown key; fetching signing keys again"
                );
                select_key(&*self.discovery.refresh_jwks().await?, kid).ok_or_else(|| {
                    ClientError::Credential(format!(
                        "no signing key matches key id {}",
                        kid.unwrap_or("<none>")
                    ))
                })?
            }
        };
        let key = DecodingKey::from_jwk(&jwk)?;

        let mut validation = Validation::new(Algorithm::RS256);
        validation.validate_aud = false;
        validation.leeway = 0;

        match decode::<ExpiryClaims>(token, &key, &validation) {
            Ok(data) => Ok(data.claims.exp < chrono::Utc::now().timestamp()),
            Err(err) if matches!(err.kind(), ErrorKind::ExpiredSignature) => Ok(true),
            Err(err) => Err(err.into()),
        }
    }
}

fn select_key(jwks: &JwkSet, kid: Option<&str>) -> Option<Jwk> {
    match kid {
        Some(kid) => jwks.find(kid),
        None => jwks.keys.first(),
    }
    .cloned()
}

type SharedAcquisition = Shared<BoxFuture<'static, Result<BearerToken, Arc<ClientError>>>>;

/// Process-wide owner of the bearer token.
pub struct TokenCache {
    cfg: Arc<AppConfig>,
    flow: Arc<dyn TokenFlow>,
    verifier: Arc<dyn TokenVerifier>,
    inflight: Mutex<HashMap<bool, SharedAcquisition>>,
}

impl TokenCache {
    pub fn new(cfg: Arc<AppConfig>, flow: Arc<dyn TokenFlow>, verifier: Arc<dyn TokenVerifier>) -> Self {
        Self {
            cfg,
            flow,
            verifier,
            inflight: Mutex::new(HashMap::new()),
        }
    }

    /// A valid token from the cache file, or from a new login.
    ///
    /// With `use_cache` unset the token file is neither read nor written.
    pub async fn get_bearer_token(&self, use_cache: bool) -> ClientResult<BearerToken> {
        let acquisition = {
            let mut slots = self.inflight.lock().await;
            slots
                .entry(use_cache)
                .or_insert_with(|| {
                    acquire(
                        self.cfg.clone(),
                        self.flow.clone(),
                        self.verifier.clone(),
                        use_cache,
                    )
                    .boxed()
                    .shared()
                })
                .clone()
        };

        match acquisition.clone().await {
            Ok(token) => Ok(token),
            Err(err) => {
                let mut slots = self.inflight.lock().await;
                if slots.get(&use_cache).is_some_and(|slot| slot.ptr_eq(&acquisition)) {
                    slots.remove(&use_cache);
                }
                drop(acquisition);
                Err(ClientError::from_shared(err))
            }
        }
    }

    /// Forget the memoized token so the next call re-validates or logs in.
    pub async fn invalidate(&self) {
        self.inflight.lock().await.clear();
    }
}

async fn acquire(
    cfg: Arc<AppConfig>,
    flow: Arc<dyn TokenFlow>,
    verifier: Arc<dyn TokenVerifier>,
    use_cache: bool,
) -> Result<BearerToken, Arc<ClientError>> {
    let path = cfg.auth_dir().join(TOKEN_FILE);

    if use_cache {
        if let Some(token) = read_cached(&path).await.map_err(Arc::new)? {
            if !verifier.is_token_expired(token.as_str()).await.map_err(Arc::new)? {
                debug!(path = %path.display(), "using cached bearer token");
                return Ok(token);
            }
            info!("cached bearer token has expired; logging in again");
        }
    }

    let token = flow.run().await.map_err(Arc::new)?;
    if use_cache {
        persist(&path, &token).await.map_err(Arc::new)?;
    }
    Ok(token)
}

async fn read_cached(path: &Path) -> ClientResult<Option<BearerToken>> {
    match fs::read_to_string(path).await {
        Ok(raw) => {
            let token = raw.trim();
            if token.is_empty() {
                warn!(path = %path.display(), "ignoring empty token file");
                Ok(None)
            } else {
                Ok(Some(BearerToken::new(token)))
            }
        }
        Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(err) => Err(err.into()),
    }
}

async fn persist(path: &Path, token: &BearerToken) -> ClientResult<()> {
    write_private(path, token.as_str().as_bytes()).await?;
    debug!(path = %path.display(), "saved bearer token");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFlow {
        runs: AtomicUsize,
    }

    #[async_trait]
    impl TokenFlow for CountingFlow {
        async fn run(&self) -> ClientResult<BearerToken> {
            let n = self.runs.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(BearerToken::new(format!("token-{n}")))
        }
    }

    struct NeverExpired;

    #[async_trait]
    impl TokenVerifier for NeverExpired {
        async fn is_token_expired(&self, _token: &str) -> ClientResult<bool> {
            Ok(false)
        }
    }

    #[test]
    fn debug_output_hides_token() {
        let token = BearerToken::new("secret.jwt.value");
        assert!(!format!("{token:?}").contains("secret"));
    }

    #[tokio::test]
    async fn cached_file_is_used_and_flow_skipped() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = Arc::new(AppConfig::new("http://127.0.0.1:1", tmp.path()));
        std::fs::create_dir_all(cfg.auth_dir()).unwrap();
        std::fs::write(cfg.auth_dir().join(TOKEN_FILE), "cached-token\n").unwrap();

        let flow = Arc::new(CountingFlow { runs: AtomicUsize::new(0) });
        let cache = TokenCache::new(cfg, flow.clone(), Arc::new(NeverExpired));

        let token = cache.get_bearer_token(true).await.unwrap();
        assert_eq!(token.as_str(), "cached-token");
        assert_eq!(flow.runs.load(Ordering::SeqCst), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn new_token_is_saved_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = Arc::new(AppConfig::new("http://127.0.0.1:1", tmp.path()));
        let flow = Arc::new(CountingFlow { runs: AtomicUsize::new(0) });
        let cache = TokenCache::new(cfg.clone(), flow, Arc::new(NeverExpired));

        let token = cache.get_bearer_token(true).await.unwrap();
        let path = cfg.auth_dir().join(TOKEN_FILE);
        assert_eq!(std::fs::read_to_string(&path).unwrap(), token.as_str());
        let mode = std::fs::metadata(&path).unwrap().permissions().mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[tokio::test]
    async fn invalidate_forces_a_new_acquisition() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = Arc::new(AppConfig::new("http://127.0.0.1:1", tmp.path()));
        let flow = Arc::new(CountingFlow { runs: AtomicUsize::new(0) });
        let cache = TokenCache::new(cfg, flow.clone(), Arc::new(NeverExpired));

        assert_eq!(cache.get_bearer_token(false).await.unwrap().as_str(), "token-0");
        assert_eq!(cache.get_bearer_token(false).await.unwrap().as_str(), "token-0");
        cache.invalidate().await;
        assert_eq!(cache.get_bearer_token(false).await.unwrap().as_str(), "token-1");
        assert_eq!(flow.runs.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn uncached_mode_never_touches_disk() {
        let tmp = tempfile::TempDir::new().unwrap();
        let cfg = Arc::new(AppConfig::new("http://127.0.0.1:1", tmp.path()));
        let flow = Arc::new(CountingFlow { runs: AtomicUsize::new(0) });
        let cache = TokenCache::new(cfg.clone(), flow, Arc::new(NeverExpired));

        cache.get_bearer_token(false).await.unwrap();
        assert!(!cfg.auth_dir().join(TOKEN_FILE).exists());
    }
}
