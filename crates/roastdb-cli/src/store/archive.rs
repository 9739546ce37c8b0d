//! Directory-backed [`RawResponseStore`]: one JSON document per payload
//! under `<root>/<source_id>/`, named by fetch time, status and content
//! digest.

use std::path::{Path, PathBuf};

use roastdb_core::{ArchiveError, ArchiveMetadata, ArchiveStatus, Platform, RawResponseStore};
use serde::Serialize;
use sha2::{Digest, Sha256};

#[derive(Serialize)]
struct ArchiveDocument<'a> {
    source_id: &'a str,
    platform: Platform,
    status: ArchiveStatus,
    sha256: &'a str,
    metadata: &'a ArchiveMetadata,
    payload: &'a serde_json::Value,
}

pub struct FsRawResponseStore {
    root: PathBuf,
}

impl FsRawResponseStore {
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }
}

/// Hex SHA-256 of the payload's compact JSON encoding.
fn payload_digest(payload: &serde_json::Value) -> Result<String, ArchiveError> {
    let bytes = serde_json::to_vec(payload)?;
    Ok(format!("{:x}", Sha256::digest(&bytes)))
}

/// Keeps ids usable as a single path component.
fn path_component(source_id: &str) -> String {
    source_id
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

impl RawResponseStore for FsRawResponseStore {
    async fn store(
        &self,
        source_id: &str,
        platform: Platform,
        payload: &serde_json::Value,
        metadata: &ArchiveMetadata,
        status: ArchiveStatus,
    ) -> Result<(), ArchiveError> {
        let digest = payload_digest(payload)?;
        let dir = self.root.join(path_component(source_id));
        tokio::fs::create_dir_all(&dir).await?;

        let file_name = format!(
            "{}-{status}-{}.json",
            metadata.fetched_at.format("%Y%m%dT%H%M%S%.3fZ"),
            &digest[..12]
        );
        let document = ArchiveDocument {
            source_id,
            platform,
            status,
            sha256: &digest,
            metadata,
            payload,
        };
        tokio::fs::write(dir.join(&file_name), serde_json::to_vec_pretty(&document)?).await?;
        tracing::debug!(source = source_id, file = %file_name, %status, "raw payload archived");
        Ok(())
    }
}
