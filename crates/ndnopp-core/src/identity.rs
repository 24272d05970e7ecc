//! Installation identity — the UUID this device advertises to its peers.

use std::path::{Path, PathBuf};

use crate::types::PeerId;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("failed to read {0}: {1}")]
    ReadFailed(PathBuf, std::io::Error),
    #[error("failed to write {0}: {1}")]
    WriteFailed(PathBuf, std::io::Error),
    #[error("{0} does not hold a UUID: {1}")]
    Malformed(PathBuf, uuid::Error),
}

/// Load the installation UUID, generating and persisting one on first run.
pub fn load_or_create(path: &Path) -> Result<PeerId, IdentityError> {
    match std::fs::read_to_string(path) {
        Ok(text) => {
            let id = uuid::Uuid::parse_str(text.trim())
                .map_err(|e| IdentityError::Malformed(path.to_path_buf(), e))?;
            Ok(PeerId::from(id))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            let id = uuid::Uuid::new_v4();
            if let Some(parent) = path.parent() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| IdentityError::WriteFailed(path.to_path_buf(), e))?;
            }
            std::fs::write(path, id.to_string())
                .map_err(|e| IdentityError::WriteFailed(path.to_path_buf(), e))?;
            Ok(PeerId::from(id))
        }
        Err(e) => Err(IdentityError::ReadFailed(path.to_path_buf(), e)),
    }
}
