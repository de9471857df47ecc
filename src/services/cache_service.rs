//! src/services/cache_service.rs
//!
//! ArtifactCache: content-addressed downloads beneath
//! `config_dir/cache/{artifact_id}/`. Every download streams into a temp
//! file while hashing, is verified against the server-declared checksum and
//! only then renamed into place, so a failed attempt never leaves a partial
//! file where a later call would trust it.

use futures::StreamExt;
use reqwest::Method;
use serde::{Serialize, de::DeserializeOwned};
use std::{
    future::Future,
    io::{self, ErrorKind},
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};
use tokio::{
    fs::{self, File},
    io::AsyncWriteExt,
};
use tracing::{debug, error, info, warn};
use url::Url;
use uuid::Uuid;

use crate::{
    config::AppConfig,
    errors::{ClientError, ClientResult},
    services::{
        archive::{extract_dir_name, extract_tarball},
        checksum::{Checksum, ChecksumAlgorithm, ChecksumSidecar, Hasher, file_digest},
        transport::Transport,
    },
};

/// Server response body cached next to the artifact.
pub const RESPONSE_FILE: &str = "response.json";
/// Checksum sidecar written next to a download and inside its extraction.
pub const CHECKSUM_FILE: &str = ".checksum.json";
/// Sidecar used by time-refreshed downloads.
pub const INFO_FILE: &str = "info.json";

const MAX_ID_LEN: usize = 256;

/// Where to fetch an artifact from and what its bytes must hash to.
#[derive(Debug, Clone)]
pub struct DownloadSource {
    pub url: String,
    pub filename: String,
    pub checksum: Option<Checksum>,
}

impl DownloadSource {
    /// Take the destination filename from the last path segment of `url`.
    pub fn from_url(url: &str, checksum: Option<Checksum>) -> ClientResult<Self> {
        let parsed = Url::parse(url)?;
        let filename = parsed
            .path_segments()
            .and_then(|mut segments| segments.next_back())
            .filter(|name| !name.is_empty())
            .ok_or_else(|| {
                ClientError::MalformedResponse(format!("download URL has no file name: {}", parsed.path()))
            })?
            .to_string();
        Ok(Self {
            url: url.to_string(),
            filename,
            checksum,
        })
    }

    pub fn with_filename(mut self, filename: impl Into<String>) -> Self {
        self.filename = filename.into();
        self
    }
}

#[derive(Clone)]
pub struct ArtifactCache {
    cfg: Arc<AppConfig>,
    transport: Transport,
}

impl ArtifactCache {
    pub fn new(cfg: Arc<AppConfig>, transport: Transport) -> Self {
        Self { cfg, transport }
    }

    /// Root directory holding one subdirectory per artifact.
    pub fn root(&self) -> PathBuf {
        self.cfg.cache_dir()
    }

    /// Cache directory for one artifact. Does not create it.
    pub fn artifact_dir(&self, id: &str) -> ClientResult<PathBuf> {
        ensure_id_safe(id)?;
        Ok(self.root().join(id))
    }

    /// Artifact metadata, served from `response.json` when present.
    ///
    /// There is no expiry: metadata is treated as immutable per id.
    pub async fn fetch_info<T, F, Fut>(&self, id: &str, fetch: F) -> ClientResult<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<T>>,
    {
        let dir = self.artifact_dir(id)?;
        read_through(&dir.join(RESPONSE_FILE), true, fetch).await
    }

    /// Download an artifact into its cache directory.
    ///
    /// An existing destination file is returned as-is without re-hashing.
    pub async fn download(&self, id: &str, source: &DownloadSource) -> ClientResult<PathBuf> {
        ensure_filename_safe(&source.filename)?;
        let dir = self.artifact_dir(id)?;
        fs::create_dir_all(&dir).await?;
        let dest = dir.join(&source.filename);

        if fs::try_exists(&dest).await? {
            info!(artifact_id = id, path = %dest.display(), "artifact already cached");
            return Ok(dest);
        }

        info!(artifact_id = id, path = %dest.display(), "downloading artifact");
        let actual = self.fetch_to(&source.url, &dest, source.checksum.as_ref()).await?;
        if let Some(expected) = &source.checksum {
            let sidecar = ChecksumSidecar::new(&source.filename, expected.clone());
            write_json_atomic(&dir.join(CHECKSUM_FILE), &sidecar).await?;
        } else {
            debug!(artifact_id = id, digest = %actual, "no checksum declared for artifact");
        }
        Ok(dest)
    }

    /// Download, then extract into the directory named by [`extract_dir_name`].
    ///
    /// With `cache` set, an extraction whose sidecar matches the archive's
    /// checksum is reused. Without it the extraction is always rebuilt and
    /// an already-downloaded archive is re-verified before reuse.
    pub async fn download_and_extract(
        &self,
        id: &str,
        source: &DownloadSource,
        cache: bool,
    ) -> ClientResult<PathBuf> {
        ensure_filename_safe(&source.filename)?;
        let dir = self.artifact_dir(id)?;
        let archive = dir.join(&source.filename);
        let extract_dir = dir.join(extract_dir_name(&source.filename));

        if !cache {
            remove_dir_if_exists(&extract_dir).await?;
            if let Some(expected) = &source.checksum {
                if fs::try_exists(&archive).await? {
                    let (actual, _) = file_digest(&archive, expected.algorithm).await?;
                    if expected.matches(&actual) {
                        debug!(artifact_id = id, "cached archive verified");
                    } else {
                        warn!(
                            artifact_id = id,
                            expected = %expected.value,
                            actual = %actual,
                            "cached archive is corrupt; downloading again"
                        );
                        fs::remove_file(&archive).await?;
                    }
                }
            }
        }

        let archive = self.download(id, source).await?;
        let digest = match &source.checksum {
            Some(expected) => expected.clone(),
            None => Checksum::sha256(&file_digest(&archive, ChecksumAlgorithm::Sha256).await?.0),
        };

        let sidecar_path = extract_dir.join(CHECKSUM_FILE);
        if cache {
            if let Some(existing) = read_sidecar(&sidecar_path).await {
                if existing.checksum == digest {
                    info!(artifact_id = id, path = %extract_dir.display(), "artifact already extracted");
                    return Ok(extract_dir);
                }
                debug!(artifact_id = id, "extracted copy is out of date");
            }
        }

        extract_tarball(&archive, &extract_dir).await?;
        write_json_atomic(&sidecar_path, &ChecksumSidecar::new(&source.filename, digest)).await?;
        Ok(extract_dir)
    }

    /// Download with a time-based staleness policy layered over the
    /// checksum check.
    ///
    /// A cached file younger than the refresh interval is returned without
    /// any network call. Otherwise `resolve` asks the server for the current
    /// source; if its checksum matches the recorded one the file's mtime is
    /// refreshed instead of downloading again.
    pub async fn download_fresh<F, Fut>(
        &self,
        key: &str,
        filename: &str,
        cache: bool,
        resolve: F,
    ) -> ClientResult<PathBuf>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = ClientResult<DownloadSource>>,
    {
        ensure_filename_safe(filename)?;
        let dir = self.artifact_dir(key)?;
        let dest = dir.join(filename);
        let exists = fs::try_exists(&dest).await?;

        if cache && exists && !self.is_stale(&dest).await? {
            debug!(key, path = %dest.display(), "cached file is fresh");
            return Ok(dest);
        }

        let source = resolve().await?;
        fs::create_dir_all(&dir).await?;
        let info_path = dir.join(INFO_FILE);

        if exists {
            if let (Some(recorded), Some(expected)) = (read_sidecar(&info_path).await, &source.checksum) {
                if recorded.checksum == *expected {
                    touch(&dest).await?;
                    info!(key, path = %dest.display(), "remote file unchanged; refreshed cache timestamp");
                    return Ok(dest);
                }
            }
        }

        info!(key, path = %dest.display(), "downloading file");
        self.fetch_to(&source.url, &dest, source.checksum.as_ref()).await?;
        if let Some(expected) = source.checksum {
            write_json_atomic(&info_path, &ChecksumSidecar::new(filename, expected)).await?;
        }
        Ok(dest)
    }

    /// True once the file's mtime is older than the refresh interval.
    pub async fn is_stale(&self, path: &Path) -> ClientResult<bool> {
        let modified = fs::metadata(path).await?.modified()?;
        Ok(match SystemTime::now().duration_since(modified) {
            Ok(age) => age > self.cfg.refresh_interval,
            Err(_) => false,
        })
    }

    /// Delete one artifact's cache directory, or all of them for `"all"`.
    ///
    /// A missing directory is logged and otherwise ignored.
    pub async fn remove_local(&self, id: &str) -> ClientResult<()> {
        let (dir, all) = if id.eq_ignore_ascii_case("all") {
            (self.root(), true)
        } else {
            (self.artifact_dir(id)?, false)
        };

        match fs::remove_dir_all(&dir).await {
            Ok(()) if all => info!(path = %dir.display(), "removed all local caches"),
            Ok(()) => info!(artifact_id = id, path = %dir.display(), "removed local cache"),
            Err(err) if err.kind() == ErrorKind::NotFound && all => {
                error!(path = %dir.display(), "no local caches found")
            }
            Err(err) if err.kind() == ErrorKind::NotFound => {
                error!(artifact_id = id, "no local cache found for artifact")
            }
            Err(err) => {
                error!(path = %dir.display(), error = %err, "failed to remove local cache");
                return Err(err.into());
            }
        }
        Ok(())
    }

    /// Stream `url` to `dest` through a temp file, verifying on the way.
    /// Returns the hex digest of what was written.
    async fn fetch_to(&self, url: &str, dest: &Path, expected: Option<&Checksum>) -> ClientResult<String> {
        let parent = dest.parent().map(Path::to_path_buf).ok_or_else(|| {
            ClientError::Io(io::Error::other("download path missing parent directory"))
        })?;
        fs::create_dir_all(&parent).await?;

        let builder = self.transport.transfer(Method::GET, url).await?;
        let response = self.transport.execute(&Method::GET, builder).await?;

        let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
        let algorithm = expected.map_or(ChecksumAlgorithm::Sha256, |c| c.algorithm);
        let actual = match stream_to_file(response, &tmp_path, Hasher::new(algorithm)).await {
            Ok(actual) => actual,
            Err(err) => {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err);
            }
        };

        if let Some(expected) = expected {
            if !expected.matches(&actual) {
                let _ = fs::remove_file(&tmp_path).await;
                error!(
                    path = %dest.display(),
                    expected = %expected.value,
                    actual = %actual,
                    "checksum mismatch; discarded download"
                );
                return Err(ClientError::ChecksumMismatch {
                    path: dest.to_path_buf(),
                    expected: expected.value.clone(),
                    actual,
                });
            }
        }

        if let Err(err) = fs::rename(&tmp_path, dest).await {
            if err.kind() == ErrorKind::AlreadyExists {
                fs::remove_file(dest).await?;
                fs::rename(&tmp_path, dest).await?;
            } else {
                let _ = fs::remove_file(&tmp_path).await;
                return Err(err.into());
            }
        }

        info!(path = %dest.display(), "download complete");
        Ok(actual)
    }
}

async fn stream_to_file(response: reqwest::Response, path: &Path, mut hasher: Hasher) -> ClientResult<String> {
    let mut file = File::create(path).await?;
    let mut stream = response.bytes_stream();
    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        hasher.update(&chunk);
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    file.sync_all().await?;
    Ok(hasher.finalize())
}

/// Reject ids that could escape the cache root.
fn ensure_id_safe(id: &str) -> ClientResult<()> {
    let invalid = |reason: &str| Err(ClientError::InvalidInput(format!("invalid artifact id `{id}`: {reason}")));
    if id.is_empty() {
        return invalid("empty");
    }
    if id.len() > MAX_ID_LEN {
        return invalid("too long");
    }
    if id == "." || id.contains("..") || id.contains('/') || id.contains('\\') {
        return invalid("contains path separators");
    }
    if id.bytes().any(|b| b.is_ascii_control()) {
        return invalid("contains control characters");
    }
    Ok(())
}

fn ensure_filename_safe(name: &str) -> ClientResult<()> {
    if name.is_empty() || name == "." || name.contains("..") || name.contains('/') || name.contains('\\') {
        return Err(ClientError::MalformedResponse(format!("unsafe file name `{name}`")));
    }
    Ok(())
}

async fn remove_dir_if_exists(dir: &Path) -> ClientResult<()> {
    match fs::remove_dir_all(dir).await {
        Ok(()) => {
            debug!(path = %dir.display(), "removed extracted directory");
            Ok(())
        }
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
        Err(err) => Err(err.into()),
    }
}

async fn read_sidecar(path: &Path) -> Option<ChecksumSidecar> {
    let bytes = fs::read(path).await.ok()?;
    match serde_json::from_slice(&bytes) {
        Ok(sidecar) => Some(sidecar),
        Err(err) => {
            warn!(path = %path.display(), error = %err, "ignoring unreadable checksum sidecar");
            None
        }
    }
}

async fn touch(path: &Path) -> ClientResult<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        std::fs::OpenOptions::new()
            .write(true)
            .open(&path)?
            .set_modified(SystemTime::now())
    })
    .await
    .map_err(|err| ClientError::Io(io::Error::other(err)))??;
    Ok(())
}

/// Return the cached JSON at `path`, or fetch, persist and return it.
pub(crate) async fn read_through<T, F, Fut>(path: &Path, use_cache: bool, fetch: F) -> ClientResult<T>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce() -> Fut,
    Fut: Future<Output = ClientResult<T>>,
{
    if use_cache {
        match fs::read(path).await {
            Ok(bytes) => match serde_json::from_slice(&bytes) {
                Ok(value) => {
                    debug!(path = %path.display(), "served from disk cache");
                    return Ok(value);
                }
                Err(err) => warn!(path = %path.display(), error = %err, "cache file unreadable; refetching"),
            },
            Err(err) if err.kind() == ErrorKind::NotFound => {}
            Err(err) => return Err(err.into()),
        }
    }

    let value = fetch().await?;
    if use_cache {
        write_json_atomic(path, &value).await?;
    }
    Ok(value)
}

/// Replace `path` with `bytes` via a temp file and rename.
pub(crate) async fn write_atomic(path: &Path, bytes: &[u8]) -> ClientResult<()> {
    replace_file(path, bytes, false).await
}

/// Like [`write_atomic`], but the file is owner-only (0600 on Unix) from the
/// moment it is created.
pub(crate) async fn write_private(path: &Path, bytes: &[u8]) -> ClientResult<()> {
    replace_file(path, bytes, true).await
}

async fn replace_file(path: &Path, bytes: &[u8], private: bool) -> ClientResult<()> {
    let parent = path.parent().map(Path::to_path_buf).ok_or_else(|| {
        ClientError::Io(io::Error::other("cache path missing parent directory"))
    })?;
    fs::create_dir_all(&parent).await?;
    let tmp_path = parent.join(format!(".tmp-{}", Uuid::new_v4()));
    if let Err(err) = write_new(&tmp_path, bytes, private).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }
    if let Err(err) = fs::rename(&tmp_path, path).await {
        let _ = fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }
    Ok(())
}

async fn write_new(path: &Path, bytes: &[u8], private: bool) -> io::Result<()> {
    let mut options = fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        if private {
            options.mode(0o600);
        }
    }
    #[cfg(not(unix))]
    let _ = private;

    let mut file = options.open(path).await?;
    file.write_all(bytes).await?;
    file.sync_all().await
}

pub(crate) async fn write_json_atomic<T: Serialize>(path: &Path, value: &T) -> ClientResult<()> {
    let bytes = serde_json::to_vec_pretty(value)?;
    write_atomic(path, &bytes).await
}
