//! Outbound HTTP: connection pools, credential attachment and uniform
//! failure reporting.
//!
//! Two pools exist per process, one anonymous and one authenticated, each
//! built lazily on first use. Presigned blob transfers ride the anonymous
//! pool with the longer transfer timeout.

use reqwest::{
    Method, RequestBuilder, Response,
    header::{AUTHORIZATION, HeaderMap, HeaderName, HeaderValue},
    multipart::{Form, Part},
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::sync::OnceCell;
use tracing::{debug, error};
use url::Url;

use crate::{
    auth::token::TokenCache,
    config::{API_KEY_HEADER, AppConfig},
    errors::{ClientError, ClientResult, status_hint},
};

const MAX_LOGGED_BODY: usize = 2048;

/// Anonymous transport shared by discovery, the authenticated client and
/// blob transfers.
#[derive(Clone)]
pub struct Transport {
    cfg: Arc<AppConfig>,
    anonymous: Arc<OnceCell<reqwest::Client>>,
}

impl Transport {
    pub fn new(cfg: Arc<AppConfig>) -> Self {
        Self {
            cfg,
            anonymous: Arc::new(OnceCell::new()),
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.cfg
    }

    /// Resolve an API path against the configured root, keeping any path
    /// prefix the root carries.
    pub fn url(&self, path: &str) -> ClientResult<Url> {
        let root = self.cfg.api_root.trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{root}/{path}"))?)
    }

    /// [`Transport::url`] followed by caller-supplied segments, each
    /// percent-encoded so `/`, `?` and `#` stay inside their segment.
    pub fn url_with_segments(&self, path: &str, segments: &[String]) -> ClientResult<Url> {
        let mut url = self.url(path)?;
        if !segments.is_empty() {
            url.path_segments_mut()
                .map_err(|()| ClientError::InvalidInput("API root cannot take path segments".into()))?
                .pop_if_empty()
                .extend(segments);
        }
        Ok(url)
    }

    pub async fn anonymous(&self) -> ClientResult<&reqwest::Client> {
        self.anonymous
            .get_or_try_init(|| async {
                debug!("creating anonymous HTTP pool");
                build_client(self.cfg.request_timeout, HeaderMap::new())
            })
            .await
    }

    /// GET a JSON document from an absolute URL without credentials.
    pub async fn get_json<T: DeserializeOwned>(&self, url: Url) -> ClientResult<T> {
        let client = self.anonymous().await?;
        let response = client.get(url).send().await?;
        let value = read_json(&Method::GET, response).await?;
        decode(value)
    }

    /// Start a request against a presigned blob URL with the transfer timeout.
    pub async fn transfer(&self, method: Method, url: &str) -> ClientResult<RequestBuilder> {
        let url = Url::parse(url)?;
        let client = self.anonymous().await?;
        Ok(client.request(method, url).timeout(self.cfg.transfer_timeout))
    }

    /// Send a prepared request and fail on a non-2xx status.
    pub async fn execute(&self, method: &Method, builder: RequestBuilder) -> ClientResult<Response> {
        let response = builder.send().await?;
        check_response(method, response).await
    }
}

fn build_client(timeout: Duration, headers: HeaderMap) -> ClientResult<reqwest::Client> {
    Ok(reqwest::Client::builder()
        .timeout(timeout)
        .default_headers(headers)
        .user_agent(concat!("robostore/", env!("CARGO_PKG_VERSION")))
        .build()?)
}

/// A file attached to a multipart form request.
#[derive(Debug, Clone)]
pub struct FormFile {
    pub field: String,
    pub path: PathBuf,
    pub content_type: String,
}

/// One call against the store API.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    segments: Vec<String>,
    query: Vec<(String, String)>,
    json: Option<Value>,
    file: Option<FormFile>,
    auth: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            segments: Vec::new(),
            query: Vec::new(),
            json: None,
            file: None,
            auth: true,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Append one path segment. Ids and names go here rather than into the
    /// path string so they are escaped.
    pub fn segment(mut self, segment: impl Into<String>) -> Self {
        self.segments.push(segment.into());
        self
    }

    pub fn query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.query.push((key.to_string(), value.into()));
        self
    }

    pub fn query_opt(self, key: &str, value: Option<impl Into<String>>) -> Self {
        match value {
            Some(value) => self.query(key, value),
            None => self,
        }
    }

    pub fn json<T: Serialize>(mut self, body: &T) -> ClientResult<Self> {
        self.json = Some(serde_json::to_value(body)?);
        Ok(self)
    }

    pub fn file(mut self, field: &str, path: &Path, content_type: &str) -> Self {
        self.file = Some(FormFile {
            field: field.to_string(),
            path: path.to_path_buf(),
            content_type: content_type.to_string(),
        });
        self
    }

    /// Send without credentials.
    pub fn anonymous(mut self) -> Self {
        self.auth = false;
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

/// Authenticated request client.
///
/// Credentials are attached once, when the authenticated pool is built: the
/// API key header when `ROBOSTORE_API_KEY` is set, otherwise a bearer token
/// from the [`TokenCache`]. Failed requests are reported and returned, never
/// retried.
pub struct ApiClient {
    transport: Transport,
    tokens: Arc<TokenCache>,
    authenticated: OnceCell<reqwest::Client>,
}

impl ApiClient {
    pub fn new(transport: Transport, tokens: Arc<TokenCache>) -> Self {
        Self {
            transport,
            tokens,
            authenticated: OnceCell::new(),
        }
    }

    pub fn config(&self) -> &AppConfig {
        self.transport.config()
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    pub fn tokens(&self) -> &Arc<TokenCache> {
        &self.tokens
    }

    async fn authenticated(&self) -> ClientResult<&reqwest::Client> {
        self.authenticated
            .get_or_try_init(|| async {
                let cfg = self.transport.config();
                let mut headers = HeaderMap::new();
                match &cfg.api_key {
                    Some(key) => {
                        debug!("attaching API key header");
                        let mut value = HeaderValue::from_str(key).map_err(|_| {
                            ClientError::InvalidInput("API key contains invalid characters".into())
                        })?;
                        value.set_sensitive(true);
                        headers.insert(HeaderName::from_static(API_KEY_HEADER), value);
                    }
                    None => {
                        let token = self.tokens.get_bearer_token(cfg.use_cache).await?;
                        let mut value = HeaderValue::from_str(&format!("Bearer {}", token.as_str()))
                            .map_err(|_| {
                                ClientError::Credential("bearer token contains invalid characters".into())
                            })?;
                        value.set_sensitive(true);
                        headers.insert(AUTHORIZATION, value);
                    }
                }
                build_client(cfg.request_timeout, headers)
            })
            .await
    }

    /// Issue a request and return the decoded JSON body (`Null` when empty).
    pub async fn request(&self, req: ApiRequest) -> ClientResult<Value> {
        let url = self.transport.url_with_segments(&req.path, &req.segments)?;
        let client = if req.auth {
            self.authenticated().await?
        } else {
            self.transport.anonymous().await?
        };

        debug!(method = %req.method, url = %url, auth = req.auth, "sending request");
        let mut builder = client.request(req.method.clone(), url);
        if !req.query.is_empty() {
            builder = builder.query(&req.query);
        }
        if let Some(body) = &req.json {
            builder = builder.json(body);
        }
        if let Some(file) = &req.file {
            builder = builder.multipart(form_for(file).await?);
        }

        let response = builder.send().await?;
        read_json(&req.method, response).await
    }

    /// Issue a request and decode the body into `T`.
    pub async fn request_as<T: DeserializeOwned>(&self, req: ApiRequest) -> ClientResult<T> {
        decode(self.request(req).await?)
    }
}

async fn form_for(file: &FormFile) -> ClientResult<Form> {
    let bytes = tokio::fs::read(&file.path).await.map_err(|err| {
        if err.kind() == std::io::ErrorKind::NotFound {
            ClientError::FileNotFound(file.path.clone())
        } else {
            ClientError::Io(err)
        }
    })?;
    let name = file
        .path
        .file_name()
        .and_then(|name| name.to_str())
        .unwrap_or("upload")
        .to_string();
    let part = Part::bytes(bytes)
        .file_name(name)
        .mime_str(&file.content_type)?;
    Ok(Form::new().part(file.field.clone(), part))
}

fn decode<T: DeserializeOwned>(value: Value) -> ClientResult<T> {
    serde_json::from_value(value).map_err(|err| ClientError::MalformedResponse(err.to_string()))
}

async fn read_json(method: &Method, response: Response) -> ClientResult<Value> {
    let response = check_response(method, response).await?;
    let bytes = response.bytes().await?;
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(Value::Null);
    }
    serde_json::from_slice(&bytes).map_err(|err| ClientError::MalformedResponse(err.to_string()))
}

/// Pass 2xx responses through; report and convert anything else.
pub async fn check_response(method: &Method, response: Response) -> ClientResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let url = loggable_url(response.url());
    let body = response.text().await.unwrap_or_default();
    report_failure(method, &url, status.as_u16(), &body);

    Err(ClientError::Http {
        method: method.to_string(),
        url,
        status: status.as_u16(),
        body,
    })
}

/// Presigned URLs carry signatures in the query string; keep them out of logs.
fn loggable_url(url: &Url) -> String {
    let mut url = url.clone();
    url.set_query(None);
    url.to_string()
}

fn report_failure(method: &Method, url: &str, status: u16, body: &str) {
    error!(%method, url, status, "request failed");
    match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(fields)) => {
            for (key, value) in fields {
                error!(status, "  {key}: {value}");
            }
        }
        _ if !body.trim().is_empty() => {
            let shown: String = body.chars().take(MAX_LOGGED_BODY).collect();
            error!(status, "  body: {shown}");
        }
        _ => {}
    }
    if let Some(hint) = status_hint(status) {
        error!(status, "hint: {hint}");
    }
}
