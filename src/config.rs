use clap::Args;
use std::{env, path::PathBuf, time::Duration};

use crate::errors::{ClientError, ClientResult};

pub const API_ROOT_ENV: &str = "ROBOSTORE_API_ROOT";
pub const CONFIG_DIR_ENV: &str = "ROBOSTORE_CONFIG_DIR";
pub const API_KEY_ENV: &str = "ROBOSTORE_API_KEY";
pub const VERBOSE_ERRORS_ENV: &str = "ROBOSTORE_VERBOSE_ERRORS";

pub const DEFAULT_API_ROOT: &str = "https://api.robostore.dev";
pub const API_KEYS_URL: &str = "https://robostore.dev/keys";

/// Header carrying a static API key; bypasses OAuth entirely.
pub const API_KEY_HEADER: &str = "x-robostore-api-key";

pub const DEFAULT_OAUTH_PORT: u16 = 16821;
pub const DEFAULT_PART_SIZE: u64 = 5 * 1024 * 1024;
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_TRANSFER_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_OAUTH_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Centralized client configuration.
/// Built once at startup from defaults, environment variables and CLI flags.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub api_root: String,
    pub config_dir: PathBuf,
    pub api_key: Option<String>,
    pub verbose_errors: bool,
    pub use_cache: bool,
    pub request_timeout: Duration,
    pub transfer_timeout: Duration,
    pub refresh_interval: Duration,
    pub part_size: u64,
    pub oauth_port: u16,
    pub oauth_timeout: Duration,
}

/// Global flags shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct GlobalArgs {
    /// Root URL of the store API (overrides ROBOSTORE_API_ROOT)
    #[arg(long, global = true)]
    pub api_root: Option<String>,

    /// Directory for cached credentials and artifacts (overrides ROBOSTORE_CONFIG_DIR)
    #[arg(long, global = true)]
    pub config_dir: Option<PathBuf>,

    /// Timeout in seconds for large uploads and downloads
    #[arg(long, global = true)]
    pub transfer_timeout: Option<u64>,

    /// Ignore and do not write the on-disk token and discovery caches
    #[arg(long, global = true)]
    pub no_cache: bool,
}

impl AppConfig {
    /// Defaults for the given API root and config directory, ignoring the environment.
    pub fn new(api_root: impl Into<String>, config_dir: impl Into<PathBuf>) -> Self {
        Self {
            api_root: api_root.into(),
            config_dir: config_dir.into(),
            api_key: None,
            verbose_errors: false,
            use_cache: true,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            transfer_timeout: DEFAULT_TRANSFER_TIMEOUT,
            refresh_interval: DEFAULT_REFRESH_INTERVAL,
            part_size: DEFAULT_PART_SIZE,
            oauth_port: DEFAULT_OAUTH_PORT,
            oauth_timeout: DEFAULT_OAUTH_TIMEOUT,
        }
    }

    /// Configuration from environment variables only.
    pub fn from_env() -> ClientResult<Self> {
        Self::from_env_and_args(&GlobalArgs::default())
    }

    /// Merge environment variables with already-parsed CLI flags (flags win).
    pub fn from_env_and_args(args: &GlobalArgs) -> ClientResult<Self> {
        // --- Environment fallback ---
        let env_root = env::var(API_ROOT_ENV).unwrap_or_else(|_| DEFAULT_API_ROOT.into());
        let env_dir = match env::var(CONFIG_DIR_ENV) {
            Ok(value) => expand_home(&value)?,
            Err(env::VarError::NotPresent) => default_config_dir()?,
            Err(err) => {
                return Err(ClientError::InvalidInput(format!(
                    "reading {CONFIG_DIR_ENV}: {err}"
                )));
            }
        };
        let api_key = env::var(API_KEY_ENV).ok().filter(|key| !key.trim().is_empty());
        let verbose_errors = env::var(VERBOSE_ERRORS_ENV)
            .map(|value| parse_flag(&value))
            .unwrap_or(false);

        // --- Merge ---
        let mut cfg = Self::new(args.api_root.clone().unwrap_or(env_root), env_dir);
        if let Some(dir) = &args.config_dir {
            cfg.config_dir = dir.clone();
        }
        if let Some(secs) = args.transfer_timeout {
            cfg.transfer_timeout = Duration::from_secs(secs);
        }
        cfg.api_key = api_key;
        cfg.verbose_errors = verbose_errors;
        cfg.use_cache = !args.no_cache;

        Ok(cfg)
    }

    /// Directory holding the OIDC caches and the bearer token.
    pub fn auth_dir(&self) -> PathBuf {
        self.config_dir.join("auth")
    }

    /// Root of the per-artifact cache directories.
    pub fn cache_dir(&self) -> PathBuf {
        self.config_dir.join("cache")
    }

    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.api_key = Some(key.into());
        self
    }

    /// The configured API key, for callers that cannot fall back to a login.
    pub fn require_api_key(&self) -> ClientResult<&str> {
        self.api_key.as_deref().ok_or(ClientError::MissingApiKey)
    }
}

fn default_config_dir() -> ClientResult<PathBuf> {
    dirs::home_dir()
        .map(|home| home.join(".robostore"))
        .ok_or_else(|| ClientError::InvalidInput("could not determine home directory".into()))
}

fn expand_home(raw: &str) -> ClientResult<PathBuf> {
    match raw.strip_prefix("~/") {
        Some(rest) => Ok(dirs::home_dir()
            .ok_or_else(|| ClientError::InvalidInput("could not determine home directory".into()))?
            .join(rest)),
        None => Ok(PathBuf::from(raw)),
    }
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
