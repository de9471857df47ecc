//! Kernel images: raw `.img` disk images attached to listings.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};
use tokio::fs;
use tracing::{debug, info};

use crate::{
    api::{ArtifactsApi, KernelImageTarget},
    errors::{ClientError, ClientResult},
    models::artifact::ArtifactInfo,
    services::{
        cache_service::{ArtifactCache, DownloadSource},
        checksum::Checksum,
        upload_service::MultipartUploader,
    },
};

const IMAGE_SUFFIX: &str = ".img";

#[derive(Clone)]
pub struct KernelService {
    artifacts: ArtifactsApi,
    cache: ArtifactCache,
    uploader: Arc<MultipartUploader>,
}

impl KernelService {
    pub fn new(artifacts: ArtifactsApi, cache: ArtifactCache, uploader: Arc<MultipartUploader>) -> Self {
        Self {
            artifacts,
            cache,
            uploader,
        }
    }

    pub async fn info(&self, artifact_id: &str) -> ClientResult<ArtifactInfo> {
        self.cache
            .fetch_info(artifact_id, || self.artifacts.info(artifact_id))
            .await
    }

    /// Download the image. Without `cache` a previously downloaded copy is
    /// discarded first.
    pub async fn download(&self, artifact_id: &str, cache: bool) -> ClientResult<PathBuf> {
        let info = self.info(artifact_id).await?;
        let checksum = info.checksum.as_deref().map(Checksum::sha256);
        let source = DownloadSource::from_url(&info.urls.large, checksum)?;
        let filename = image_filename(&source.filename);
        if !cache {
            let existing = self.cache.artifact_dir(artifact_id)?.join(&filename);
            match fs::remove_file(&existing).await {
                Ok(()) => debug!(artifact_id, path = %existing.display(), "discarded cached image"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => return Err(err.into()),
            }
        }
        let path = self.cache.download(artifact_id, &source.with_filename(filename)).await?;
        info!(artifact_id, path = %path.display(), "kernel image ready");
        Ok(path)
    }

    pub async fn remove_local(&self, artifact_id: &str) -> ClientResult<()> {
        self.cache.remove_local(artifact_id).await
    }

    /// Upload `image` to `listing_id` through a multipart session.
    pub async fn upload(&self, listing_id: &str, image: &Path) -> ClientResult<ArtifactInfo> {
        let filename = image
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| name.to_ascii_lowercase().ends_with(IMAGE_SUFFIX))
            .ok_or_else(|| {
                ClientError::InvalidInput(format!(
                    "invalid file type for {}; must be one of: {IMAGE_SUFFIX}",
                    image.display()
                ))
            })?;

        let target = KernelImageTarget {
            api: self.artifacts.clone(),
            listing_id: listing_id.to_string(),
            filename: filename.to_string(),
        };
        let receipt = self.uploader.upload(&target, image).await?;

        let uploaded = self.artifacts.info(&receipt.resource_id).await?;
        info!(listing_id, artifact_id = %uploaded.artifact_id, "uploaded kernel image");
        Ok(uploaded)
    }
}

fn image_filename(name: &str) -> String {
    if name.ends_with(IMAGE_SUFFIX) {
        name.to_string()
    } else {
        format!("{name}{IMAGE_SUFFIX}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_suffix_is_appended_once() {
        assert_eq!(image_filename("kernel-6.1"), "kernel-6.1.img");
        assert_eq!(image_filename("kernel.img"), "kernel.img");
    }
}
