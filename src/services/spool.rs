use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Process-local temporary storage for submitted images, one file per job
/// keyed by job id. The async submission path spools the upload here because
/// the request body does not outlive the request; the worker deletes the
/// file when the job reaches a terminal state.
pub struct ImageSpool {
    dir: PathBuf,
}

#[derive(Debug, thiserror::Error)]
pub enum SpoolError {
    #[error("spool I/O failed for {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl ImageSpool {
    /// Create the spool, defaulting to a subdirectory of the OS temp dir.
    pub fn new(dir: Option<PathBuf>) -> Result<Self, SpoolError> {
        let dir = dir.unwrap_or_else(|| std::env::temp_dir().join("receipt-extract-spool"));
        std::fs::create_dir_all(&dir).map_err(|source| SpoolError::Io {
            path: dir.clone(),
            source,
        })?;
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Persist an uploaded image under the job id; returns the spool path.
    pub async fn store(&self, job_id: Uuid, bytes: &[u8]) -> Result<PathBuf, SpoolError> {
        let path = self.dir.join(format!("{job_id}.img"));
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| SpoolError::Io {
                path: path.clone(),
                source,
            })?;
        Ok(path)
    }

    pub async fn load(&self, path: &Path) -> Result<Vec<u8>, SpoolError> {
        tokio::fs::read(path).await.map_err(|source| SpoolError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    pub async fn remove(&self, path: &Path) -> Result<(), SpoolError> {
        tokio::fs::remove_file(path)
            .await
            .map_err(|source| SpoolError::Io {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_store_load_remove_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let spool = ImageSpool::new(Some(dir.path().join("spool"))).unwrap();

        let job_id = Uuid::new_v4();
        let path = spool.store(job_id, b"image bytes").await.unwrap();
        assert!(path.exists());
        assert!(path.file_name().unwrap().to_str().unwrap().starts_with(&job_id.to_string()));

        let bytes = spool.load(&path).await.unwrap();
        assert_eq!(bytes, b"image bytes");

        spool.remove(&path).await.unwrap();
        assert!(!path.exists());
    }

    #[tokio::test]
    async fn test_remove_missing_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let spool = ImageSpool::new(Some(dir.path().to_path_buf())).unwrap();
        let missing = dir.path().join("missing.img");
        assert!(spool.remove(&missing).await.is_err());
    }
}
