// typack - asset-graph bundler
// Layered like the binary: core domain, infrastructure adapters, shared utilities, CLI

pub mod cli;
pub mod core;
pub mod infrastructure;
pub mod utils;

pub use crate::core::{BuildConfig, BuildOutput, Bundler};
pub use crate::utils::{BundlerError, Result};
