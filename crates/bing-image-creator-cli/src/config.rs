//! Configuration loading and resolution.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use bing_image_creator::CreatorConfig;

const LOCAL_CONFIG: &str = ".bing-image-creator.json";

/// Resolve the config file path.
///
/// Explicit path, then `BIC_CONFIG`, then `./.bing-image-creator.json`, then
/// the per-user config dir. Returns `None` when nothing exists.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var("BIC_CONFIG") {
        if !env_path.is_empty() {
            return Some(PathBuf::from(env_path));
        }
    }

    let cwd_config = PathBuf::from(LOCAL_CONFIG);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    resolve_default_config_path().filter(|p| p.exists())
}

fn resolve_default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("bing-image-creator").join("config.json"))
}

/// Resolve and load the config file (if any), then apply `BIC_*`
/// environment overrides.
pub fn load_config(explicit: Option<&str>) -> Result<CreatorConfig> {
    load_config_at(resolve_config_path(explicit).as_deref())
}

/// Load `path` (defaults when `None`), then apply `BIC_*` overrides.
///
/// Runs before logging is set up, so callers report the path themselves.
pub fn load_config_at(path: Option<&Path>) -> Result<CreatorConfig> {
    let base = match path {
        Some(path) => CreatorConfig::from_file(path)
            .with_context(|| format!("Cannot read config file at '{}'", path.display()))?,
        None => CreatorConfig::default(),
    };
    Ok(base.with_env_overrides())
}

/// Command-line overrides, applied last.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub proxy: Option<String>,
    pub user_token: Option<String>,
    pub cookies: Option<String>,
    pub host: Option<String>,
    pub user_agent: Option<String>,
    pub forwarded_for: Option<String>,
    pub debug: bool,
}

impl ConfigOverrides {
    pub fn apply(self, mut config: CreatorConfig) -> CreatorConfig {
        if self.proxy.is_some() {
            config.proxy = self.proxy;
        }
        if self.user_token.is_some() {
            config.user_token = self.user_token;
        }
        if self.cookies.is_some() {
            config.cookies = self.cookies;
        }
        if self.host.is_some() {
            config.host = self.host;
        }
        if self.user_agent.is_some() {
            config.user_agent = self.user_agent;
        }
        if self.forwarded_for.is_some() {
            config.forwarded_for = self.forwarded_for;
        }
        config.debug |= self.debug;
        config
    }
}
