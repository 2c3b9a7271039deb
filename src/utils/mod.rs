// Shared utilities module
pub mod config_loader;
pub mod env_vars;
pub mod errors;
pub mod hashing;
pub mod logging;
pub mod ui;

pub use config_loader::*;
pub use env_vars::*;
pub use errors::*;
pub use logging::*;
pub use ui::*;
