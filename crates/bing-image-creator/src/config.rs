//! Client configuration.
//!
//! Every field is optional. Empty strings are treated the same as absent
//! values, because front ends commonly default text settings to `""`.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::CreatorResult;

pub const DEFAULT_HOST: &str = "https://www.bing.com";
pub const DEFAULT_API_PATH: &str = "/images/create?partner=sydney&re=1&showselective=1&sude=1";
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/113.0.0.0 Safari/537.36 Edg/113.0.1774.35";

/// Starting values and step sizes for the telemetry query parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub kseed_base: u64,
    pub kseed_increment: u64,
    pub inst_suffix: u32,
    pub inst_suffix_increment: u32,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            kseed_base: 6500,
            kseed_increment: 500,
            inst_suffix: 0,
            inst_suffix_increment: 1,
        }
    }
}

/// Everything a client instance needs to know about its environment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreatorConfig {
    /// Proxy address, e.g. `http://127.0.0.1:7890`.
    pub proxy: Option<String>,
    /// Value of the `_U` session cookie.
    pub user_token: Option<String>,
    /// Full cookie string. Wins over `user_token` when both are set.
    pub cookies: Option<String>,
    /// Host override, e.g. `https://cn.bing.com`.
    pub host: Option<String>,
    pub api_path: Option<String>,
    pub user_agent: Option<String>,
    /// Bare IPv4 address or `a.b.c.d/mask` range for `x-forwarded-for`.
    pub forwarded_for: Option<String>,
    pub debug: bool,
    pub enable_telemetry: bool,
    /// Send the `SFX` instrumentation suffix.
    pub enable_suffix: bool,
    pub telemetry: TelemetryConfig,
    pub request_timeout_secs: u64,
    /// Upper bound on a single polling run. `None` polls until cancelled.
    pub max_wait_secs: Option<u64>,
}

impl Default for CreatorConfig {
    fn default() -> Self {
        Self {
            proxy: None,
            user_token: None,
            cookies: None,
            host: None,
            api_path: None,
            user_agent: None,
            forwarded_for: None,
            debug: false,
            enable_telemetry: true,
            enable_suffix: true,
            telemetry: TelemetryConfig::default(),
            request_timeout_secs: 30,
            max_wait_secs: None,
        }
    }
}

impl CreatorConfig {
    /// Load a JSON config file.
    pub fn from_file(path: &Path) -> CreatorResult<Self> {
        let raw = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&raw)?)
    }

    /// Apply `BIC_*` environment variables on top of the current values.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|key| std::env::var(key).ok())
    }

    /// Same as [`with_env_overrides`](Self::with_env_overrides) with an
    /// explicit lookup, so callers can layer any key/value source.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let text = |key: &str| lookup(key).and_then(non_empty);
        if let Some(v) = text("BIC_PROXY") {
            self.proxy = Some(v);
        }
        if let Some(v) = text("BIC_USER_TOKEN") {
            self.user_token = Some(v);
        }
        if let Some(v) = text("BIC_COOKIES") {
            self.cookies = Some(v);
        }
        if let Some(v) = text("BIC_HOST") {
            self.host = Some(v);
        }
        if let Some(v) = text("BIC_USER_AGENT") {
            self.user_agent = Some(v);
        }
        if let Some(v) = text("BIC_FORWARDED_FOR") {
            self.forwarded_for = Some(v);
        }
        if let Some(v) = text("BIC_DEBUG") {
            self.debug = matches!(v.as_str(), "1" | "true" | "yes");
        }
        self
    }

    pub fn host(&self) -> &str {
        setting(&self.host).unwrap_or(DEFAULT_HOST)
    }

    pub fn api_path(&self) -> &str {
        setting(&self.api_path).unwrap_or(DEFAULT_API_PATH)
    }

    pub fn user_agent(&self) -> &str {
        setting(&self.user_agent).unwrap_or(DEFAULT_USER_AGENT)
    }

    pub fn proxy(&self) -> Option<&str> {
        setting(&self.proxy)
    }

    pub fn cookies(&self) -> Option<&str> {
        setting(&self.cookies)
    }

    pub fn user_token(&self) -> Option<&str> {
        setting(&self.user_token)
    }

    pub fn forwarded_for(&self) -> Option<&str> {
        setting(&self.forwarded_for)
    }
}

fn setting(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|s| !s.is_empty())
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
