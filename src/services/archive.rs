//! Gzipped tarball packing and unpacking for robot description archives.
//!
//! Both directions are blocking and run under `spawn_blocking`.

use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use std::{
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::errors::{ClientError, ClientResult};

/// File types accepted into an uploaded robot description archive.
pub const ALLOWED_SUFFIXES: [&str; 9] = [
    "urdf", "mjcf", "xml", "stl", "obj", "dae", "png", "jpg", "jpeg",
];

#[derive(Debug)]
pub struct TarballSummary {
    pub path: PathBuf,
    pub added: usize,
    pub skipped: usize,
}

fn is_allowed(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.to_ascii_lowercase())
        .is_some_and(|ext| ALLOWED_SUFFIXES.contains(&ext.as_str()))
}

/// Pack every allowed file under `root` into a gzipped tarball at `output`.
pub async fn create_tarball(root: &Path, output: &Path) -> ClientResult<TarballSummary> {
    let root = root.to_path_buf();
    let output = output.to_path_buf();
    tokio::task::spawn_blocking(move || create_tarball_blocking(&root, &output))
        .await
        .map_err(|err| ClientError::Io(io::Error::other(err)))?
}

fn create_tarball_blocking(root: &Path, output: &Path) -> ClientResult<TarballSummary> {
    if !root.is_dir() {
        return Err(ClientError::FileNotFound(root.to_path_buf()));
    }
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }

    let mut files = Vec::new();
    collect_files(root, &mut files)?;
    files.sort();

    let encoder = GzEncoder::new(File::create(output)?, Compression::default());
    let mut builder = tar::Builder::new(encoder);
    let (mut added, mut skipped) = (0, 0);
    for file in files {
        if !is_allowed(&file) {
            warn!(file = %file.display(), "skipping file with unsupported extension");
            skipped += 1;
            continue;
        }
        let name = file
            .strip_prefix(root)
            .map_err(|_| ClientError::InvalidInput(format!("{} escapes {}", file.display(), root.display())))?;
        builder.append_path_with_name(&file, name)?;
        debug!(file = %name.display(), "added to tarball");
        added += 1;
    }
    builder.into_inner()?.finish()?;

    if added == 0 {
        let _ = fs::remove_file(output);
        return Err(ClientError::InvalidInput(format!(
            "no robot description files found under {}",
            root.display()
        )));
    }

    info!(tarball = %output.display(), added, skipped, "created tarball");
    Ok(TarballSummary {
        path: output.to_path_buf(),
        added,
        skipped,
    })
}

fn collect_files(dir: &Path, out: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if entry.file_type()?.is_dir() {
            collect_files(&path, out)?;
        } else {
            out.push(path);
        }
    }
    Ok(())
}

/// Extract a gzipped tarball into `dest`, replacing it atomically.
pub async fn extract_tarball(archive: &Path, dest: &Path) -> ClientResult<()> {
    let archive = archive.to_path_buf();
    let dest = dest.to_path_buf();
    tokio::task::spawn_blocking(move || extract_tarball_blocking(&archive, &dest))
        .await
        .map_err(|err| ClientError::Io(io::Error::other(err)))?
}

fn extract_tarball_blocking(archive: &Path, dest: &Path) -> ClientResult<()> {
    let parent = dest
        .parent()
        .ok_or_else(|| ClientError::InvalidInput(format!("{} has no parent", dest.display())))?;
    fs::create_dir_all(parent)?;
    let staging = parent.join(format!(".tmp-{}", Uuid::new_v4()));

    let unpacked = File::open(archive).and_then(|file| {
        fs::create_dir_all(&staging)?;
        tar::Archive::new(GzDecoder::new(file)).unpack(&staging)
    });
    if let Err(err) = unpacked {
        let _ = fs::remove_dir_all(&staging);
        return Err(ClientError::Io(err));
    }

    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    if let Err(err) = fs::rename(&staging, dest) {
        let _ = fs::remove_dir_all(&staging);
        return Err(ClientError::Io(err));
    }

    info!(archive = %archive.display(), dest = %dest.display(), "extracted archive");
    Ok(())
}

/// Directory name an archive extracts into (`robot.tgz` -> `robot`).
///
/// The archive itself sits next to that directory, so a name without an
/// extension gets a `.d` suffix instead of colliding with it.
pub fn extract_dir_name(filename: &str) -> String {
    let stem = [".tar.gz", ".tgz", ".tar"]
        .iter()
        .find_map(|suffix| filename.strip_suffix(suffix).filter(|stem| !stem.is_empty()))
        .or_else(|| Path::new(filename).file_stem().and_then(|stem| stem.to_str()))
        .unwrap_or(filename);
    if stem.is_empty() || stem == filename {
        format!("{filename}.d")
    } else {
        stem.to_string()
    }
}
