//! URDF archives shared by every robot of a class.
//!
//! Downloads follow the time-based refresh policy of
//! [`ArtifactCache::download_fresh`], verified by the MD5 the server reports.

use std::path::{Path, PathBuf};
use tracing::info;

use crate::{
    api::RobotClassesApi,
    errors::{ClientError, ClientResult},
    services::{
        cache_service::{ArtifactCache, DownloadSource},
        checksum::Checksum,
        transport::Transport,
        upload_service::upload_single,
    },
};

const CLASS_ARCHIVE: &str = "robot.tgz";
const CLASS_ARCHIVE_SUFFIX: &str = ".tgz";
const CLASS_CONTENT_TYPE: &str = "application/x-compressed-tar";

#[derive(Clone)]
pub struct RobotClassService {
    classes: RobotClassesApi,
    cache: ArtifactCache,
    transport: Transport,
}

impl RobotClassService {
    pub fn new(classes: RobotClassesApi, cache: ArtifactCache, transport: Transport) -> Self {
        Self {
            classes,
            cache,
            transport,
        }
    }

    pub fn api(&self) -> &RobotClassesApi {
        &self.classes
    }

    /// Replace the class's URDF archive with `archive` (a `.tgz`).
    pub async fn upload_urdf(&self, class_name: &str, archive: &Path) -> ClientResult<()> {
        let filename = archive
            .file_name()
            .and_then(|name| name.to_str())
            .filter(|name| name.to_ascii_lowercase().ends_with(CLASS_ARCHIVE_SUFFIX))
            .ok_or_else(|| {
                ClientError::InvalidInput(format!(
                    "{} must be a {CLASS_ARCHIVE_SUFFIX} archive",
                    archive.display()
                ))
            })?;
        if !tokio::fs::try_exists(archive).await? {
            return Err(ClientError::FileNotFound(archive.to_path_buf()));
        }

        let slot = self
            .classes
            .urdf_upload_slot(class_name, filename, CLASS_CONTENT_TYPE)
            .await?;
        upload_single(&self.transport, &slot.url, archive, &slot.content_type).await?;
        info!(class_name, filename = %slot.filename, "uploaded robot class URDF");
        Ok(())
    }

    /// Path to the class's cached `robot.tgz`, refreshed when stale.
    pub async fn download_urdf(&self, class_name: &str, cache: bool) -> ClientResult<PathBuf> {
        self.cache
            .download_fresh(class_name, CLASS_ARCHIVE, cache, || async {
                let info = self.classes.urdf_download_info(class_name).await?;
                Ok(DownloadSource {
                    url: info.url,
                    filename: CLASS_ARCHIVE.to_string(),
                    checksum: Some(Checksum::md5(&info.md5_hash)),
                })
            })
            .await
    }
}
