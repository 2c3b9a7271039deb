use crate::core::config::{absolutize, BuildConfig};
use crate::core::graph::{AssetGraph, AssetGraphBuilder, CancellationFlag};
use crate::core::interfaces::FileSystemService;
use crate::core::models::{BuildReport, OutputArtifact};
use crate::core::splitter::{BundleSet, BundleSplitter};
use crate::infrastructure::{Packager, TokioFileSystemService, TransformerRegistry};
use crate::utils::{BuildError, ConfigError, Logger, Result, Timer};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Everything one bundling run produced
#[derive(Debug)]
pub struct BuildOutput {
    pub graph: AssetGraph,
    pub bundles: BundleSet,
    pub artifacts: Vec<OutputArtifact>,
    pub report: BuildReport,
    pub build_time: Duration,
}

/// Main build service: graph, split, package, then write.
pub struct Bundler {
    config: Arc<BuildConfig>,
    registry: Arc<TransformerRegistry>,
    fs_service: Arc<dyn FileSystemService>,
    cancel: CancellationFlag,
}

impl Bundler {
    pub fn new(mut config: BuildConfig) -> Self {
        config.root = absolutize(&config.root);
        let mode = config.mode();
        config
            .env
            .entry("NODE_ENV".to_string())
            .or_insert_with(|| mode.to_string());

        Self {
            config: Arc::new(config),
            registry: Arc::new(TransformerRegistry::with_defaults()),
            fs_service: Arc::new(TokioFileSystemService),
            cancel: CancellationFlag::new(),
        }
    }

    pub fn with_registry(mut self, registry: TransformerRegistry) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_file_system(mut self, fs_service: Arc<dyn FileSystemService>) -> Self {
        self.fs_service = fs_service;
        self
    }

    pub fn config(&self) -> &BuildConfig {
        &self.config
    }

    /// Handle for aborting a running `bundle` call from another task
    pub fn cancellation(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    /// Build, split and package in memory, then write every artifact.
    ///
    /// Nothing is written unless the whole run succeeded.
    pub async fn bundle(&self, entries: &[String]) -> Result<BuildOutput> {
        let output = self.build(entries).await?;
        self.write(&output.artifacts).await?;

        for artifact in &output.artifacts {
            let name = artifact
                .path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            Logger::bundle_emitted(&name, artifact.size());
        }
        Logger::build_complete(
            output.report.total_assets,
            output.bundles.len(),
            output.build_time,
            &self.config.out_dir_path().display().to_string(),
        );
        Ok(output)
    }

    /// The whole pipeline without touching the output directory
    pub async fn build(&self, entries: &[String]) -> Result<BuildOutput> {
        let start = Instant::now();
        self.config.validate()?;
        if entries.is_empty() {
            return Err(ConfigError::Invalid("at least one entry is required".into()).into());
        }

        Logger::build_start(
            entries,
            &self.config.out_dir_path().display().to_string(),
            self.config.mode(),
        );

        let graph = AssetGraphBuilder::new(self.config.clone(), self.registry.clone())
            .with_file_system(self.fs_service.clone())
            .with_cancellation(self.cancel.clone())
            .build(entries)
            .await?;

        let bundles = {
            let _timer = Timer::start("Splitting bundles");
            BundleSplitter::new(&self.config).split(&graph)
        };

        let artifacts = Packager::new(&graph, &bundles, &self.config).package_all()?;
        if self.cancel.is_cancelled() {
            return Err(BuildError::Cancelled.into());
        }

        let report = BuildReport {
            total_assets: graph.len(),
            bundles: bundles.report(&graph, &self.config.root),
            warnings: graph.errors().iter().map(|error| error.to_string()).collect(),
        };

        Ok(BuildOutput {
            graph,
            bundles,
            artifacts,
            report,
            build_time: start.elapsed(),
        })
    }

    async fn write(&self, artifacts: &[OutputArtifact]) -> Result<()> {
        let _timer = Timer::start("Writing artifacts");
        self.fs_service
            .create_directory(&self.config.out_dir_path())
            .await?;
        for artifact in artifacts {
            self.fs_service
                .write_atomic(&artifact.path, &artifact.contents)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::BundlerError;
    use std::fs;
    use std::path::Path;
    use tempfile::tempdir;

    fn write(root: &Path, name: &str, contents: &str) {
        let path = root.join(name);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[tokio::test]
    async fn test_bundle_writes_artifacts() {
        let temp_dir = tempdir().unwrap();
        write(temp_dir.path(), "index.ts", "import { a } from './a';\nexport const b: number = a + 1;\n");
        write(temp_dir.path(), "a.ts", "export const a = 1;\n");

        let bundler = Bundler::new(BuildConfig::new(temp_dir.path()));
        let output = bundler.bundle(&["index.ts".to_string()]).await.unwrap();

        assert_eq!(output.report.total_assets, 2);
        assert_eq!(output.report.bundles.len(), 1);
        assert_eq!(output.report.bundles[0].name, "index.js");
        assert!(output.report.bundles[0].child_bundles.is_empty());
        assert!(temp_dir.path().join("dist/index.js").is_file());
    }

    #[tokio::test]
    async fn test_failed_entry_writes_nothing() {
        let temp_dir = tempdir().unwrap();
        write(temp_dir.path(), "index.ts", "export const = ;\n");

        let bundler = Bundler::new(BuildConfig::new(temp_dir.path()));
        let err = bundler.bundle(&["index.ts".to_string()]).await.unwrap_err();

        assert!(matches!(err, BundlerError::Build(BuildError::Entry { .. })));
        assert!(!temp_dir.path().join("dist").exists());
    }

    #[tokio::test]
    async fn test_failed_run_keeps_previous_output() {
        let temp_dir = tempdir().unwrap();
        write(temp_dir.path(), "index.ts", "import './broken';\nexport const ok = 1;\n");
        write(temp_dir.path(), "broken.ts", "export const ok = 1;\n");

        let bundler = Bundler::new(BuildConfig::new(temp_dir.path()));
        bundler.bundle(&["index.ts".to_string()]).await.unwrap();
        let previous = fs::read(temp_dir.path().join("dist/index.js")).unwrap();

        write(temp_dir.path(), "broken.ts", "export const = ;\n");
        let err = bundler.bundle(&["index.ts".to_string()]).await.unwrap_err();
        assert!(matches!(err, BundlerError::Build(BuildError::Failed(_))));
        assert_eq!(fs::read(temp_dir.path().join("dist/index.js")).unwrap(), previous);
    }

    #[tokio::test]
    async fn test_tolerated_errors_become_warnings() {
        let temp_dir = tempdir().unwrap();
        write(temp_dir.path(), "index.ts", "import './missing';\nexport const ok = 1;\n");

        let mut config = BuildConfig::new(temp_dir.path());
        config.tolerate_asset_errors = true;
        let output = Bundler::new(config)
            .build(&["index.ts".to_string()])
            .await
            .unwrap();

        assert_eq!(output.report.warnings.len(), 1);
        assert!(output.report.warnings[0].contains("./missing"));
    }

    #[test]
    fn test_node_env_defaults_to_mode() {
        let mut config = BuildConfig::new("/p");
        config.production = true;
        let bundler = Bundler::new(config);
        assert_eq!(bundler.config().env.get("NODE_ENV").map(String::as_str), Some("production"));

        let mut config = BuildConfig::new("/p");
        config.env.insert("NODE_ENV".into(), "test".into());
        let bundler = Bundler::new(config);
        assert_eq!(bundler.config().env.get("NODE_ENV").map(String::as_str), Some("test"));
    }

    #[tokio::test]
    async fn test_no_entries_is_config_error() {
        let temp_dir = tempdir().unwrap();
        let err = Bundler::new(BuildConfig::new(temp_dir.path()))
            .build(&[])
            .await
            .unwrap_err();
        assert!(matches!(err, BundlerError::Config(_)));
    }
}
