use crate::core::config::BuildConfig;
use crate::core::models::TransformedAsset;
use crate::infrastructure::ProjectConfig;
use crate::utils::{Result, TransformError};
use async_trait::async_trait;
use std::path::Path;

/// File system operations interface
#[async_trait]
pub trait FileSystemService: Send + Sync {
    async fn read_bytes(&self, path: &Path) -> Result<Vec<u8>>;
    async fn read_file(&self, path: &Path) -> Result<String>;
    /// Write through a temporary sibling and rename, so readers never see partial files
    async fn write_atomic(&self, path: &Path, contents: &[u8]) -> Result<()>;
    async fn create_directory(&self, path: &Path) -> Result<()>;
    fn file_exists(&self, path: &Path) -> bool;
}

/// Everything a transformer may look at for one file
pub struct TransformContext<'a> {
    pub file_path: &'a Path,
    pub bytes: &'a [u8],
    pub project: &'a ProjectConfig,
    pub config: &'a BuildConfig,
}

/// Per-type transform capability registered in the transformer registry
pub trait AssetTransformer: Send + Sync {
    fn name(&self) -> &'static str;

    fn transform(&self, ctx: &TransformContext<'_>) -> std::result::Result<TransformedAsset, TransformError>;
}
