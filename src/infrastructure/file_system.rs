use crate::core::interfaces::FileSystemService;
use crate::utils::{BundlerError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

pub struct TokioFileSystemService;

#[async_trait::async_trait]
impl FileSystemService for TokioFileSystemService {
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).await.map_err(BundlerError::Io)
    }

    async fn read_file(&self, path: &Path) -> Result<String> {
        fs::read_to_string(path).await.map_err(BundlerError::Io)
    }

    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.create_directory(parent).await?;
        }

        let temp = temp_sibling(path);
        fs::write(&temp, contents).await.map_err(BundlerError::Io)?;
        if let Err(err) = fs::rename(&temp, path).await {
            let _ = fs::remove_file(&temp).await;
            return Err(BundlerError::Io(err));
        }
        Ok(())
    }

    async fn create_directory(&self, path: &Path) -> Result<()> {
        fs::create_dir_all(path).await.map_err(BundlerError::Io)
    }

    fn file_exists(&self, path: &Path) -> bool {
        path.is_file()
    }
}

fn temp_sibling(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{}.{}.tmp", name, std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_write_atomic_creates_parents_and_replaces() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();
        let target = temp_dir.path().join("nested/out/bundle.js");

        fs_service.write_atomic(&target, b"first").await.unwrap();
        fs_service.write_atomic(&target, b"second").await.unwrap();

        assert_eq!(fs_service.read_file(&target).await.unwrap(), "second");
        assert!(fs_service.file_exists(&target));

        let leftovers: Vec<_> = std::fs::read_dir(target.parent().unwrap())
            .unwrap()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[tokio::test]
    async fn test_read_bytes_missing_file() {
        let fs_service = TokioFileSystemService;
        let temp_dir = tempdir().unwrap();

        let result = fs_service.read_bytes(&temp_dir.path().join("nope.bin")).await;
        assert!(matches!(result, Err(BundlerError::Io(_))));
    }
}
