//! src/services/urdf_service.rs
//!
//! URDF artifacts attached to listings: download and unpack, inspect,
//! evict, and publish a robot description directory as `robot.tgz`.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::{
    api::ArtifactsApi,
    errors::ClientResult,
    models::artifact::ArtifactInfo,
    services::{
        archive::create_tarball,
        cache_service::{ArtifactCache, DownloadSource},
        checksum::{Checksum, ChecksumAlgorithm, file_digest},
        transport::Transport,
        upload_service::upload_single,
    },
};

pub const URDF_ARCHIVE: &str = "robot.tgz";
const URDF_CONTENT_TYPE: &str = "application/gzip";

#[derive(Clone)]
pub struct UrdfService {
    artifacts: ArtifactsApi,
    cache: ArtifactCache,
    transport: Transport,
}

impl UrdfService {
    pub fn new(artifacts: ArtifactsApi, cache: ArtifactCache, transport: Transport) -> Self {
        Self {
            artifacts,
            cache,
            transport,
        }
    }

    pub async fn info(&self, artifact_id: &str) -> ClientResult<ArtifactInfo> {
        self.cache
            .fetch_info(artifact_id, || self.artifacts.info(artifact_id))
            .await
    }

    /// Download the artifact's archive and return the extracted directory.
    pub async fn download(&self, artifact_id: &str, cache: bool) -> ClientResult<PathBuf> {
        let info = self.info(artifact_id).await?;
        let checksum = info.checksum.as_deref().map(Checksum::sha256);
        let source = DownloadSource::from_url(&info.urls.large, checksum)?;
        let dir = self.cache.download_and_extract(artifact_id, &source, cache).await?;
        info!(artifact_id, path = %dir.display(), "URDF ready");
        Ok(dir)
    }

    pub async fn remove_local(&self, artifact_id: &str) -> ClientResult<()> {
        self.cache.remove_local(artifact_id).await
    }

    /// Pack `root` and publish it as a new URDF artifact on `listing_id`.
    pub async fn upload(&self, listing_id: &str, root: &Path) -> ClientResult<ArtifactInfo> {
        let tarball = self.cache.artifact_dir(listing_id)?.join(URDF_ARCHIVE);
        let summary = create_tarball(root, &tarball).await?;
        let (sha256, size) = file_digest(&summary.path, ChecksumAlgorithm::Sha256).await?;
        info!(
            listing_id,
            files = summary.added,
            skipped = summary.skipped,
            bytes = size,
            sha256 = %sha256,
            "packed URDF archive"
        );

        let slot = self
            .artifacts
            .presigned_upload(listing_id, URDF_ARCHIVE, Some(&sha256))
            .await?;
        upload_single(&self.transport, &slot.upload_url, &summary.path, URDF_CONTENT_TYPE).await?;

        let uploaded = self.artifacts.info(&slot.artifact_id).await?;
        info!(listing_id, artifact_id = %uploaded.artifact_id, "uploaded URDF artifact");
        Ok(uploaded)
    }
}
