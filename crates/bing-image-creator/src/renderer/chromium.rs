//! Headless Chromium via chromiumoxide, carrying the client's identity.
//!
//! The content page only shows images to a signed-in session, so the
//! browser is launched with the profile's user agent and proxy, and every
//! tab receives the profile's cookies before it navigates anywhere.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::CookieParam;
use chromiumoxide::page::Page;
use futures::StreamExt;
use tokio::task::JoinHandle;

use super::{NavigationResult, RenderContext, Renderer};
use crate::profile::RequestProfile;

const HEADLESS_ARGS: [&str; 5] = [
    "--headless=new",
    "--disable-gpu",
    "--no-sandbox",
    "--disable-dev-shm-usage",
    "--disable-extensions",
];

const SYSTEM_BROWSERS: [&str; 4] = ["google-chrome", "chromium", "chromium-browser", "msedge"];

/// Locate a Chromium-family executable.
///
/// `BIC_CHROMIUM_PATH`, then a Chrome for Testing build unpacked under the
/// user cache dir, then `PATH`, then the stock macOS install.
pub fn find_chromium() -> Option<PathBuf> {
    env_browser()
        .or_else(cached_browser)
        .or_else(|| {
            SYSTEM_BROWSERS
                .iter()
                .find_map(|name| which::which(name).ok())
        })
        .or_else(macos_browser)
}

fn env_browser() -> Option<PathBuf> {
    std::env::var_os("BIC_CHROMIUM_PATH")
        .map(PathBuf::from)
        .filter(|path| path.exists())
}

fn cached_browser() -> Option<PathBuf> {
    let root = dirs::cache_dir()?.join("bing-image-creator").join("chromium");
    let relative: &[&str] = if cfg!(target_os = "macos") {
        &[
            "chrome-mac-arm64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
            "chrome-mac-x64/Google Chrome for Testing.app/Contents/MacOS/Google Chrome for Testing",
        ]
    } else if cfg!(target_os = "windows") {
        &["chrome-win64/chrome.exe"]
    } else {
        &["chrome-linux64/chrome", "chrome"]
    };
    relative
        .iter()
        .map(|rel| root.join(rel))
        .find(|path| path.exists())
}

fn macos_browser() -> Option<PathBuf> {
    let path = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
    (cfg!(target_os = "macos") && path.exists()).then_some(path)
}

/// Split a `Cookie` header into name/value pairs. Fragments without `=`
/// are dropped.
pub fn parse_cookie_header(header: &str) -> Vec<(String, String)> {
    header
        .split(';')
        .filter_map(|pair| {
            let (name, value) = pair.split_once('=')?;
            let name = name.trim();
            (!name.is_empty()).then(|| (name.to_string(), value.trim().to_string()))
        })
        .collect()
}

fn session_cookies(profile: &RequestProfile) -> Result<Vec<CookieParam>> {
    let Some(header) = profile.cookie_header.as_deref() else {
        return Ok(Vec::new());
    };
    parse_cookie_header(header)
        .into_iter()
        .map(|(name, value)| {
            CookieParam::builder()
                .name(name)
                .value(value)
                .url(profile.host.clone())
                .build()
                .map_err(|e| anyhow!("invalid session cookie: {e}"))
        })
        .collect()
}

/// One headless browser shared by every tab it opens.
pub struct ChromiumRenderer {
    browser: Browser,
    cookies: Vec<CookieParam>,
    open_tabs: Arc<AtomicUsize>,
    events: JoinHandle<()>,
}

impl ChromiumRenderer {
    /// Launch a browser that looks like `profile` to the endpoint.
    pub async fn launch(profile: &RequestProfile) -> Result<Self> {
        let executable = find_chromium()
            .context("no Chromium found; install Chrome or set BIC_CHROMIUM_PATH")?;
        tracing::debug!("launching {}", executable.display());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(executable)
            .args(HEADLESS_ARGS)
            .arg(format!("--user-agent={}", profile.user_agent));
        if let Some(proxy) = &profile.proxy {
            builder = builder.arg(format!("--proxy-server={proxy}"));
        }
        let config = builder
            .build()
            .map_err(|e| anyhow!("invalid browser config: {e}"))?;

        let cookies = session_cookies(profile)?;
        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;
        let events = tokio::spawn(async move { while handler.next().await.is_some() {} });

        Ok(Self {
            browser,
            cookies,
            open_tabs: Arc::new(AtomicUsize::new(0)),
            events,
        })
    }
}

impl Drop for ChromiumRenderer {
    fn drop(&mut self) {
        self.events.abort();
    }
}

#[async_trait]
impl Renderer for ChromiumRenderer {
    async fn new_context(&self) -> Result<Box<dyn RenderContext>> {
        let page = self
            .browser
            .new_page("about:blank")
            .await
            .context("cannot open a tab")?;
        if !self.cookies.is_empty() {
            page.set_cookies(self.cookies.clone())
                .await
                .context("cannot install session cookies")?;
        }

        self.open_tabs.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(ChromiumTab {
            page,
            open_tabs: Arc::clone(&self.open_tabs),
            closed: false,
        }))
    }

    fn active_contexts(&self) -> usize {
        self.open_tabs.load(Ordering::SeqCst)
    }
}

/// A tab dropped without `close` (e.g. a cancelled render) is closed in
/// the background.
struct ChromiumTab {
    page: Page,
    open_tabs: Arc<AtomicUsize>,
    closed: bool,
}

impl Drop for ChromiumTab {
    fn drop(&mut self) {
        self.open_tabs.fetch_sub(1, Ordering::SeqCst);
        if self.closed {
            return;
        }
        if let Ok(runtime) = tokio::runtime::Handle::try_current() {
            let page = self.page.clone();
            runtime.spawn(async move {
                if let Err(e) = page.close().await {
                    tracing::debug!("closing abandoned tab: {e}");
                }
            });
        }
    }
}

#[async_trait]
impl RenderContext for ChromiumTab {
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult> {
        let started = tokio::time::Instant::now();
        tokio::time::timeout(Duration::from_millis(timeout_ms), self.page.goto(url))
            .await
            .map_err(|_| anyhow!("content page did not load within {timeout_ms}ms"))?
            .with_context(|| format!("cannot load {url}"))?;

        let final_url = self
            .page
            .url()
            .await
            .ok()
            .flatten()
            .map(|u| u.to_string())
            .unwrap_or_else(|| url.to_string());
        Ok(NavigationResult {
            final_url,
            load_time_ms: started.elapsed().as_millis() as u64,
        })
    }

    async fn execute_js(&self, script: &str) -> Result<serde_json::Value> {
        self.page
            .evaluate(script)
            .await
            .context("script failed in content page")?
            .into_value()
            .context("script returned a non-JSON value")
    }

    async fn close(mut self: Box<Self>) -> Result<()> {
        self.closed = true;
        if let Err(e) = self.page.clone().close().await {
            tracing::debug!("closing tab: {e}");
        }
        Ok(())
    }
}
