//! OpenID Connect discovery with read-through disk caches.
//!
//! Each document is fetched at most once per process and, unless caching is
//! disabled, once per config directory: `auth/oidc_info.json`,
//! `auth/oidc_metadata.json` and `auth/jwks.json` never expire. The key set
//! is the exception: [`Discovery::refresh_jwks`] replaces it when a token
//! names a key it does not hold.

use jsonwebtoken::jwk::JwkSet;
use std::{path::PathBuf, sync::Arc};
use tokio::sync::{OnceCell, RwLock};
use tracing::info;
use url::Url;

use crate::{
    config::AppConfig,
    errors::ClientResult,
    models::auth::{OidcInfo, OidcMetadata},
    services::{
        cache_service::{read_through, write_json_atomic},
        transport::Transport,
    },
};

const INFO_FILE: &str = "oidc_info.json";
const METADATA_FILE: &str = "oidc_metadata.json";
const JWKS_FILE: &str = "jwks.json";

pub struct Discovery {
    cfg: Arc<AppConfig>,
    transport: Transport,
    info: OnceCell<OidcInfo>,
    metadata: OnceCell<OidcMetadata>,
    jwks: RwLock<Option<Arc<JwkSet>>>,
}

impl Discovery {
    pub fn new(cfg: Arc<AppConfig>, transport: Transport) -> Self {
        Self {
            cfg,
            transport,
            info: OnceCell::new(),
            metadata: OnceCell::new(),
            jwks: RwLock::new(None),
        }
    }

    fn cache_path(&self, name: &str) -> PathBuf {
        self.cfg.auth_dir().join(name)
    }

    /// Identity provider authority and client id, from `GET /auth/oicd`.
    pub async fn info(&self) -> ClientResult<&OidcInfo> {
        self.info
            .get_or_try_init(|| async {
                read_through(&self.cache_path(INFO_FILE), self.cfg.use_cache, || async {
                    self.transport.get_json(self.transport.url("/auth/oicd")?).await
                })
                .await
            })
            .await
    }

    /// The provider's `.well-known/openid-configuration`.
    pub async fn metadata(&self) -> ClientResult<&OidcMetadata> {
        self.metadata
            .get_or_try_init(|| async {
                let path = self.cache_path(METADATA_FILE);
                read_through(&path, self.cfg.use_cache, || async {
                    let info = self.info().await?;
                    let url = well_known(&info.authority, "openid-configuration")?;
                    let metadata: OidcMetadata = self.transport.get_json(url).await?;
                    info!(path = %path.display(), "fetched OpenID Connect metadata");
                    Ok(metadata)
                })
                .await
            })
            .await
    }

    /// Signing keys, from the metadata's `jwks_uri` or the authority's
    /// default location.
    pub async fn jwks(&self) -> ClientResult<Arc<JwkSet>> {
        {
            let current = self.jwks.read().await;
            if let Some(jwks) = current.as_ref() {
                return Ok(jwks.clone());
            }
        }

        let mut slot = self.jwks.write().await;
        if let Some(jwks) = slot.as_ref() {
            return Ok(jwks.clone());
        }
        let jwks = read_through(&self.cache_path(JWKS_FILE), self.cfg.use_cache, || {
            self.fetch_jwks()
        })
        .await?;
        let jwks = Arc::new(jwks);
        *slot = Some(jwks.clone());
        Ok(jwks)
    }

    /// Fetch the key set again, bypassing both caches, and replace them.
    pub async fn refresh_jwks(&self) -> ClientResult<Arc<JwkSet>> {
        let mut slot = self.jwks.write().await;
        let jwks = self.fetch_jwks().await?;
        if self.cfg.use_cache {
            write_json_atomic(&self.cache_path(JWKS_FILE), &jwks).await?;
        }
        info!(keys = jwks.keys.len(), "refreshed signing keys");
        let jwks = Arc::new(jwks);
        *slot = Some(jwks.clone());
        Ok(jwks)
    }

    async fn fetch_jwks(&self) -> ClientResult<JwkSet> {
        let metadata = self.metadata().await?;
        let url = match &metadata.jwks_uri {
            Some(uri) => Url::parse(uri)?,
            None => well_known(&self.info().await?.authority, "jwks.json")?,
        };
        self.transport.get_json(url).await
    }
}

fn well_known(authority: &str, document: &str) -> ClientResult<Url> {
    Ok(Url::parse(&format!(
        "{}/.well-known/{document}",
        authority.trim_end_matches('/')
    ))?)
}
