use std::path::PathBuf;
use thiserror::Error;

/// A specifier could not be mapped to a file on disk.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ResolutionError {
    #[error("Cannot resolve '{specifier}' from {}", from.display())]
    NotFound { specifier: String, from: PathBuf },

    #[error("Resolution cycle for '{specifier}' from {}: {}", from.display(), chain.join(" -> "))]
    Cycle {
        specifier: String,
        from: PathBuf,
        chain: Vec<String>,
    },

    #[error("Invalid package manifest {}: {message}", path.display())]
    InvalidManifest { path: PathBuf, message: String },
}

/// Malformed or unsupported source in a single asset.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{}: {message}", file_path.display())]
pub struct TransformError {
    pub file_path: PathBuf,
    pub message: String,
}

impl TransformError {
    pub fn new(file_path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self {
            file_path: file_path.into(),
            message: message.into(),
        }
    }
}

/// Bundler or project configuration that cannot be used.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error("Cannot read {}: {message}", path.display())]
    Unreadable { path: PathBuf, message: String },

    #[error("Malformed {}: {message}", path.display())]
    Malformed { path: PathBuf, message: String },

    #[error("Circular `extends` chain at {}", path.display())]
    ExtendsCycle { path: PathBuf },

    #[error("Invalid option: {0}")]
    Invalid(String),
}

/// A failure attached to one asset of the graph.
#[derive(Error, Debug)]
#[error("{}: {cause}", file_path.display())]
pub struct AssetError {
    pub file_path: PathBuf,
    pub asset_id: Option<String>,
    pub cause: Box<BundlerError>,
}

#[derive(Error, Debug)]
pub enum BuildError {
    #[error("Entry '{entry}' failed: {cause}")]
    Entry {
        entry: String,
        cause: Box<BundlerError>,
    },

    #[error("Build failed with {} error(s)", .0.len())]
    Failed(Vec<AssetError>),

    #[error("Resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("Build cancelled")]
    Cancelled,

    #[error("Internal task failure: {0}")]
    Task(String),
}

#[derive(Error, Debug)]
pub enum BundlerError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Resolution error: {0}")]
    Resolution(#[from] ResolutionError),

    #[error("Transform error: {0}")]
    Transform(#[from] TransformError),

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("{0}")]
    Build(#[from] BuildError),

    #[error("Source map error: {0}")]
    SourceMap(String),
}

impl BundlerError {
    pub fn source_map(message: impl Into<String>) -> Self {
        Self::SourceMap(message.into())
    }

    /// Whether the run must stop immediately instead of collecting the error
    pub fn is_fatal(&self) -> bool {
        matches!(self, BundlerError::Config(_) | BundlerError::Build(_))
    }

    /// Render the error and, for aggregated failures, every collected error
    pub fn format_detailed(&self) -> String {
        match self {
            BundlerError::Build(BuildError::Failed(errors)) => {
                let mut output = format!("❌ Build failed with {} error(s):", errors.len());
                for error in errors {
                    output.push_str(&format!("\n  • {}", error));
                    if let Some(id) = &error.asset_id {
                        output.push_str(&format!(" [asset {}]", id));
                    }
                }
                output
            }
            BundlerError::Build(BuildError::Entry { entry, cause }) => {
                format!("❌ Entry '{}' failed\n  • {}", entry, cause.format_detailed())
            }
            other => format!("❌ {}", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, BundlerError>;

impl From<tokio::task::JoinError> for BundlerError {
    fn from(err: tokio::task::JoinError) -> Self {
        BundlerError::Build(BuildError::Task(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failed_build_lists_every_error() {
        let errors = vec![
            AssetError {
                file_path: PathBuf::from("/p/a.ts"),
                asset_id: Some("abc".to_string()),
                cause: Box::new(TransformError::new("/p/a.ts", "Unexpected token").into()),
            },
            AssetError {
                file_path: PathBuf::from("/p/b.ts"),
                asset_id: None,
                cause: Box::new(
                    ResolutionError::NotFound {
                        specifier: "./missing".to_string(),
                        from: PathBuf::from("/p/b.ts"),
                    }
                    .into(),
                ),
            },
        ];

        let detailed = BundlerError::from(BuildError::Failed(errors)).format_detailed();
        assert!(detailed.contains("2 error(s)"));
        assert!(detailed.contains("Unexpected token"));
        assert!(detailed.contains("./missing"));
        assert!(detailed.contains("[asset abc]"));
    }

    #[test]
    fn test_fatal_classification() {
        assert!(BundlerError::from(ConfigError::Invalid("x".into())).is_fatal());
        assert!(BundlerError::from(BuildError::Cancelled).is_fatal());
        assert!(!BundlerError::from(TransformError::new("/a.ts", "bad")).is_fatal());
    }
}
