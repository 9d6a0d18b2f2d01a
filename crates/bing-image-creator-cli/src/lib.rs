//! bing-image-creator CLI: draw images from a prompt on the command line.

pub mod commands;
pub mod config;

pub use commands::IframeMode;
pub use config::{load_config, load_config_at, resolve_config_path, ConfigOverrides};
