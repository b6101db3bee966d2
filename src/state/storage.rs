// File system operations for session data
use sha2::{Digest, Sha256};
use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to get app data directory")]
    NoAppDataDir,
}

pub type StorageResult<T> = Result<T, StorageError>;

/// Get the app data directory for gazeline
pub fn get_app_data_dir() -> StorageResult<PathBuf> {
    let data_dir = dirs::data_dir().ok_or(StorageError::NoAppDataDir)?;
    let app_dir = data_dir.join("gazeline");
    fs::create_dir_all(&app_dir)?;
    Ok(app_dir)
}

/// Get the directory for a session, below `base` or the app data directory
pub fn get_session_dir(base: Option<&Path>, session_id: &Uuid) -> StorageResult<PathBuf> {
    let base = match base {
        Some(base) => base.to_path_buf(),
        None => get_app_data_dir()?,
    };
    let session_dir = base.join("sessions").join(session_id.to_string());
    fs::create_dir_all(&session_dir)?;
    Ok(session_dir)
}

/// SHA256 of a file, read in chunks
pub fn hash_file(path: &Path) -> StorageResult<String> {
    let mut file = fs::File::open(path)?;
    let mut hasher = Sha256::new();
    let mut buffer = [0u8; 64 * 1024];
    loop {
        let read = file.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hex::encode(hasher.finalize()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_hash_file() {
        let temp_dir = TempDir::new().unwrap();
        let session_id = Uuid::new_v4();
        let dir = get_session_dir(Some(temp_dir.path()), &session_id).unwrap();
        assert!(dir.ends_with(session_id.to_string()));

        let path = dir.join("samples.tsv");
        fs::write(&path, b"hello world").unwrap();
        assert_eq!(
            hash_file(&path).unwrap(),
            "b94d27b9934d3e08a52e52d7da7dabfac484efe37a5380ee9088f7ace2efcde9"
        );
    }
}
