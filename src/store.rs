//! src/store.rs
//!
//! Store: the composition root. Endpoint groups and workflows handed out
//! here share one transport and one token cache.

use std::sync::Arc;

use crate::{
    api::{ArtifactsApi, KRecsApi, RobotClassesApi, RobotsApi, UsersApi},
    auth::{BearerToken, BrowserLauncher, Discovery, JwksVerifier, OidcFlow, SystemBrowser, TokenCache},
    config::AppConfig,
    errors::ClientResult,
    services::{
        cache_service::ArtifactCache,
        kernel_service::KernelService,
        krec_service::KRecService,
        robot_class_service::RobotClassService,
        transport::{ApiClient, Transport},
        upload_service::MultipartUploader,
        urdf_service::UrdfService,
    },
};

#[derive(Clone)]
pub struct Store {
    cfg: Arc<AppConfig>,
    client: Arc<ApiClient>,
    cache: ArtifactCache,
    uploader: Arc<MultipartUploader>,
}

impl Store {
    /// Wire a store that logs in through the system browser when needed.
    pub fn new(cfg: AppConfig) -> Self {
        Self::with_browser(cfg, Arc::new(SystemBrowser))
    }

    pub fn with_browser(cfg: AppConfig, browser: Arc<dyn BrowserLauncher>) -> Self {
        let cfg = Arc::new(cfg);
        let transport = Transport::new(cfg.clone());
        let discovery = Arc::new(Discovery::new(cfg.clone(), transport.clone()));
        let flow = Arc::new(OidcFlow::new(cfg.clone(), discovery.clone(), browser));
        let verifier = Arc::new(JwksVerifier::new(discovery));
        let tokens = Arc::new(TokenCache::new(cfg.clone(), flow, verifier));
        Self::with_tokens(cfg, transport, tokens)
    }

    /// Wire a store around an existing token cache.
    pub fn with_tokens(cfg: Arc<AppConfig>, transport: Transport, tokens: Arc<TokenCache>) -> Self {
        let cache = ArtifactCache::new(cfg.clone(), transport.clone());
        let uploader = Arc::new(MultipartUploader::new(transport.clone(), cfg.part_size));
        let client = Arc::new(ApiClient::new(transport, tokens));
        Self {
            cfg,
            client,
            cache,
            uploader,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.cfg
    }

    pub fn client(&self) -> &Arc<ApiClient> {
        &self.client
    }

    pub fn cache(&self) -> &ArtifactCache {
        &self.cache
    }

    pub fn uploader(&self) -> &Arc<MultipartUploader> {
        &self.uploader
    }

    /// A valid bearer token, logging in if the cached one is missing or expired.
    pub async fn bearer_token(&self) -> ClientResult<BearerToken> {
        self.client.tokens().get_bearer_token(self.cfg.use_cache).await
    }

    pub fn users(&self) -> UsersApi {
        UsersApi::new(self.client.clone())
    }

    pub fn robots(&self) -> RobotsApi {
        RobotsApi::new(self.client.clone())
    }

    pub fn robot_classes(&self) -> RobotClassService {
        RobotClassService::new(
            RobotClassesApi::new(self.client.clone()),
            self.cache.clone(),
            self.client.transport().clone(),
        )
    }

    pub fn artifacts(&self) -> ArtifactsApi {
        ArtifactsApi::new(self.client.clone())
    }

    pub fn krecs(&self) -> KRecService {
        KRecService::new(
            KRecsApi::new(self.client.clone()),
            self.cache.clone(),
            self.uploader.clone(),
        )
    }

    pub fn urdfs(&self) -> UrdfService {
        UrdfService::new(
            self.artifacts(),
            self.cache.clone(),
            self.client.transport().clone(),
        )
    }

    pub fn kernels(&self) -> KernelService {
        KernelService::new(self.artifacts(), self.cache.clone(), self.uploader.clone())
    }
}
