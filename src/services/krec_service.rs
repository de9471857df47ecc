//! K-Rec telemetry recordings attached to robots.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};

use crate::{
    api::{KRecTarget, KRecsApi},
    errors::{ClientError, ClientResult},
    models::artifact::KRecInfo,
    services::{
        cache_service::{ArtifactCache, DownloadSource},
        checksum::Checksum,
        upload_service::{MultipartUploader, UploadReceipt},
    },
};

const KREC_EXTENSION: &str = "krec";

#[derive(Clone)]
pub struct KRecService {
    krecs: KRecsApi,
    cache: ArtifactCache,
    uploader: Arc<MultipartUploader>,
}

impl KRecService {
    pub fn new(krecs: KRecsApi, cache: ArtifactCache, uploader: Arc<MultipartUploader>) -> Self {
        Self { krecs, cache, uploader }
    }

    pub async fn info(&self, krec_id: &str) -> ClientResult<KRecInfo> {
        self.cache
            .fetch_info(krec_id, || self.krecs.download_info(krec_id))
            .await
    }

    pub async fn download(&self, krec_id: &str) -> ClientResult<PathBuf> {
        let info = self.info(krec_id).await?;
        let (Some(url), Some(filename)) = (info.url.as_deref(), info.filename.as_deref()) else {
            return Err(ClientError::MalformedResponse(format!(
                "K-Rec {krec_id} response is missing `url` or `filename`"
            )));
        };
        let source = DownloadSource {
            url: url.to_string(),
            filename: filename.to_string(),
            checksum: info.checksum.as_deref().map(Checksum::sha256),
        };
        let path = self.cache.download(krec_id, &source).await?;
        info!(krec_id, path = %path.display(), "K-Rec ready");
        Ok(path)
    }

    pub async fn remove_local(&self, krec_id: &str) -> ClientResult<()> {
        self.cache.remove_local(krec_id).await
    }

    /// Upload a recording for `robot_id`. The file name becomes the K-Rec name.
    pub async fn upload(
        &self,
        robot_id: &str,
        path: &Path,
        description: Option<&str>,
    ) -> ClientResult<UploadReceipt> {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .ok_or_else(|| ClientError::InvalidInput(format!("{} has no file name", path.display())))?;
        let is_krec = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case(KREC_EXTENSION));
        if !is_krec {
            warn!(file = %path.display(), "file extension is not .krec; is this a valid K-Rec file?");
        }

        let target = KRecTarget {
            api: self.krecs.clone(),
            robot_id: robot_id.to_string(),
            name: name.to_string(),
            description: description.map(str::to_string),
        };
        let receipt = self.uploader.upload(&target, path).await?;
        info!(robot_id, krec_id = %receipt.resource_id, "uploaded K-Rec");
        Ok(receipt)
    }
}
