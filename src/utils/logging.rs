use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

pub struct Logger;

impl Logger {
    /// Install the global subscriber; `RUST_LOG` overrides the default filter
    pub fn init(verbose: bool) {
        let default = if verbose { "typack=debug" } else { "typack=info" };
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init();
    }

    pub fn build_start(entries: &[String], out_dir: &str, mode: &str) {
        info!("📦 typack - {} build", mode);
        info!("📁 Entries: {}", entries.join(", "));
        info!("📂 Output: {}", out_dir);
    }

    pub fn asset_transformed(path: &str, transformer: &str) {
        debug!("⚡ Transformed: {} ({})", path, transformer);
    }

    pub fn asset_failed(path: &str, message: &str) {
        warn!("⚠️  {}: {}", path, message);
    }

    pub fn bundle_emitted(name: &str, size: usize) {
        info!("  • {} ({} bytes)", name, size);
    }

    pub fn build_complete(assets: usize, bundles: usize, build_time: Duration, out_dir: &str) {
        info!("📊 {} assets in {} bundles", assets, bundles);
        info!("✅ Built in {:.2?} → {}", build_time, out_dir);
    }

    pub fn info(msg: &str) {
        info!("{}", msg);
    }

    pub fn debug(msg: &str) {
        debug!("{}", msg);
    }

    pub fn warn(msg: &str) {
        warn!("⚠️  {}", msg);
    }

    pub fn error(msg: &str) {
        error!("❌ {}", msg);
    }
}

/// Logs the duration of a phase when dropped
pub struct Timer {
    start: Instant,
    name: String,
}

impl Timer {
    pub fn start(name: &str) -> Self {
        debug!("⏱️  Starting: {}", name);
        Self {
            start: Instant::now(),
            name: name.to_string(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        debug!("⏱️  Completed: {} in {:.2?}", self.name, self.elapsed());
    }
}
