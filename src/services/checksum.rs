//! Streaming content checksums (MD5 or SHA-256, depending on endpoint family).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::{io::ErrorKind, path::Path};
use tokio::{fs::File, io::AsyncReadExt};

use crate::errors::{ClientError, ClientResult};

const READ_BUFFER_SIZE: usize = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChecksumAlgorithm {
    Md5,
    Sha256,
}

/// An expected or recorded digest, stored as lowercase hex.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checksum {
    pub algorithm: ChecksumAlgorithm,
    pub value: String,
}

impl Checksum {
    pub fn md5(raw: &str) -> Self {
        Self {
            algorithm: ChecksumAlgorithm::Md5,
            value: normalize(raw),
        }
    }

    pub fn sha256(raw: &str) -> Self {
        Self {
            algorithm: ChecksumAlgorithm::Sha256,
            value: normalize(raw),
        }
    }

    pub fn matches(&self, actual_hex: &str) -> bool {
        self.value == normalize(actual_hex)
    }
}

/// Servers sometimes report MD5s quoted like ETags.
pub fn normalize(raw: &str) -> String {
    raw.trim().trim_matches('"').to_ascii_lowercase()
}

/// Incremental hasher over either supported algorithm.
pub enum Hasher {
    Md5(md5::Context),
    Sha256(Sha256),
}

impl Hasher {
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Md5 => Hasher::Md5(md5::Context::new()),
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(Sha256::new()),
        }
    }

    pub fn update(&mut self, chunk: &[u8]) {
        match self {
            Hasher::Md5(ctx) => ctx.consume(chunk),
            Hasher::Sha256(ctx) => ctx.update(chunk),
        }
    }

    /// Lowercase hex digest.
    pub fn finalize(self) -> String {
        match self {
            Hasher::Md5(ctx) => format!("{:x}", ctx.compute()),
            Hasher::Sha256(ctx) => hex::encode(ctx.finalize()),
        }
    }
}

/// Digest and size of a file, read in fixed-size chunks.
pub async fn file_digest(path: &Path, algorithm: ChecksumAlgorithm) -> ClientResult<(String, u64)> {
    let mut file = File::open(path).await.map_err(|err| {
        if err.kind() == ErrorKind::NotFound {
            ClientError::FileNotFound(path.to_path_buf())
        } else {
            ClientError::Io(err)
        }
    })?;

    let mut hasher = Hasher::new(algorithm);
    let mut buf = vec![0u8; READ_BUFFER_SIZE];
    let mut size = 0u64;
    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        size += n as u64;
    }

    Ok((hasher.finalize(), size))
}

/// Sidecar recording the checksum a cached file was verified against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChecksumSidecar {
    pub file: String,
    pub checksum: Checksum,
    pub verified_at: DateTime<Utc>,
}

impl ChecksumSidecar {
    pub fn new(file: impl Into<String>, checksum: Checksum) -> Self {
        Self {
            file: file.into(),
            checksum,
            verified_at: Utc::now(),
        }
    }
}
