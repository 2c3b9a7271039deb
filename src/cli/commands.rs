use crate::core::config::{absolutize, BuildConfig};
use crate::core::graph::URL_PREFIX;
use crate::core::services::Bundler;
use crate::infrastructure::{ProjectConfigLoader, Resolution, Resolver};
use crate::utils::{BuildUI, CliOverrides, ConfigLoader, EnvVarsManager, Logger, Result};
use clap::{Parser, Subcommand};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "typack")]
#[command(version)]
#[command(about = "typack - bundle TypeScript, JSX, JSON and raw assets into deployable scripts")]
pub struct Cli {
    /// Debug logging (RUST_LOG overrides)
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Bundle one or more entries
    Build {
        /// Entry files, relative to the root
        #[arg(required = true)]
        entries: Vec<String>,
        /// Root directory
        #[arg(short, long, default_value = ".")]
        root: String,
        /// Output directory
        #[arg(short, long)]
        out_dir: Option<String>,
        /// Prefix of emitted file URLs
        #[arg(long)]
        public_url: Option<String>,
        /// Minify and emit source maps
        #[arg(long)]
        production: bool,
        /// Disable minification
        #[arg(long)]
        no_minify: bool,
        /// Emit source maps
        #[arg(long, conflicts_with = "no_source_maps")]
        source_maps: bool,
        /// Never emit source maps
        #[arg(long)]
        no_source_maps: bool,
        /// Resolution order, e.g. `.ts,.js`
        #[arg(long, value_delimiter = ',')]
        extensions: Option<Vec<String>>,
        /// Expose entry exports as this global
        #[arg(long = "global")]
        global_name: Option<String>,
        /// Report failing non-entry assets as warnings
        #[arg(long)]
        tolerate_errors: bool,
        /// Print the bundle report as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print the file a specifier resolves to
    Resolve {
        specifier: String,
        /// Requesting file
        #[arg(long)]
        from: String,
        /// Root directory
        #[arg(short, long, default_value = ".")]
        root: String,
    },
}

pub struct CliHandler;

impl CliHandler {
    pub fn new() -> Self {
        Self
    }

    pub async fn run(&self) -> Result<()> {
        let cli = Cli::parse();
        Logger::init(cli.verbose);

        match cli.command {
            Commands::Build {
                entries,
                root,
                out_dir,
                public_url,
                production,
                no_minify,
                source_maps,
                no_source_maps,
                extensions,
                global_name,
                tolerate_errors,
                json,
            } => {
                let overrides = CliOverrides {
                    out_dir,
                    public_url,
                    production: production.then_some(true),
                    source_maps: flag_pair(source_maps, no_source_maps),
                    minify: no_minify.then_some(false),
                    extensions,
                    global_name,
                    tolerate_asset_errors: tolerate_errors.then_some(true),
                };
                self.handle_build_command(&root, entries, overrides, json).await
            }
            Commands::Resolve { specifier, from, root } => {
                self.handle_resolve_command(&root, &specifier, &from)
            }
        }
    }

    async fn handle_build_command(
        &self,
        root: &str,
        entries: Vec<String>,
        overrides: CliOverrides,
        json: bool,
    ) -> Result<()> {
        let config = load_config(root, overrides)?;
        if !json {
            BuildUI::show_banner(config.mode());
        }

        let bundler = Bundler::new(config);
        let output = bundler.bundle(&entries).await?;

        if json {
            let rendered = serde_json::to_string_pretty(&output.report)
                .map_err(|e| crate::utils::BuildError::Task(e.to_string()))?;
            println!("{}", rendered);
            return Ok(());
        }

        let sizes: HashMap<String, usize> = output
            .artifacts
            .iter()
            .filter_map(|artifact| {
                let name = artifact.path.file_name()?.to_string_lossy().into_owned();
                Some((name, artifact.size()))
            })
            .collect();
        let out_dir = bundler
            .config()
            .out_dir
            .to_string_lossy()
            .trim_end_matches('/')
            .to_string();
        BuildUI::show_completion(
            &output.report,
            &out_dir,
            |name| sizes.get(name).copied(),
            output.build_time,
        );
        Ok(())
    }

    fn handle_resolve_command(&self, root: &str, specifier: &str, from: &str) -> Result<()> {
        let config = Arc::new(load_config(root, CliOverrides::default())?);
        let resolver = Resolver::new(config, Arc::new(ProjectConfigLoader::new()));

        let specifier = specifier.strip_prefix(URL_PREFIX).unwrap_or(specifier);
        match resolver.resolve(specifier, &absolutize(Path::new(from)))? {
            Resolution::File(path) => println!("{}", path.display()),
            Resolution::External(name) => println!("external: {}", name),
        }
        Ok(())
    }
}

impl Default for CliHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Defaults, then typack.config.json, then CLI flags, plus the env snapshot
fn load_config(root: &str, overrides: CliOverrides) -> Result<BuildConfig> {
    let root = absolutize(&PathBuf::from(root));
    let file_config = ConfigLoader::load_from_file(&root)?;
    let mut config = ConfigLoader::merge_with_cli(file_config, root, overrides);

    config.env = EnvVarsManager::load(&config.root, config.mode())?.into_snapshot();
    config.validate()?;
    Ok(config)
}

fn flag_pair(enable: bool, disable: bool) -> Option<bool> {
    match (enable, disable) {
        (true, _) => Some(true),
        (_, true) => Some(false),
        _ => None,
    }
}
