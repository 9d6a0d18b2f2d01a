//! Browser rendering for pages that only show their images after scripts run.
//!
//! Defines the `Renderer` and `RenderContext` traits that abstract over the
//! browser engine (currently Chromium via chromiumoxide), plus the one
//! operation the generator needs from it: wait for generated image tags and
//! read their `src` attributes.

pub mod chromium;

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::fragment::IMAGE_SELECTOR;

/// How long to wait for images by default. Generation routinely takes
/// several minutes.
pub const DEFAULT_RENDER_WAIT: Duration = Duration::from_secs(300);

/// How often to check the DOM while waiting.
const DOM_CHECK_INTERVAL: Duration = Duration::from_millis(500);

/// Where a tab ended up after loading the content page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationResult {
    /// URL after redirects, e.g. the sign-in page for a stale session.
    pub final_url: String,
    pub load_time_ms: u64,
}

/// Something that can open tabs on the content page.
#[async_trait]
pub trait Renderer: Send + Sync {
    /// Open a blank tab carrying the session.
    async fn new_context(&self) -> Result<Box<dyn RenderContext>>;
    /// Tabs opened and not yet closed.
    fn active_contexts(&self) -> usize;
}

/// One tab.
#[async_trait]
pub trait RenderContext: Send + Sync {
    /// Load `url`, failing after `timeout_ms`.
    async fn navigate(&mut self, url: &str, timeout_ms: u64) -> Result<NavigationResult>;
    /// Evaluate `script` in the page and return its JSON value.
    async fn execute_js(&self, script: &str) -> Result<serde_json::Value>;
    async fn close(self: Box<Self>) -> Result<()>;
}

/// Load `url`, wait until at least one generated image is in the DOM, and
/// return every image `src` in document order.
pub async fn collect_image_urls(
    renderer: &dyn Renderer,
    url: &str,
    wait: Duration,
) -> Result<Vec<String>> {
    let mut ctx = renderer.new_context().await?;
    let result = wait_and_collect(ctx.as_mut(), url, wait).await;
    ctx.close().await?;
    result
}

async fn wait_and_collect(
    ctx: &mut dyn RenderContext,
    url: &str,
    wait: Duration,
) -> Result<Vec<String>> {
    let started = Instant::now();
    let nav = ctx.navigate(url, wait.as_millis() as u64).await?;
    tracing::debug!("rendered {} in {}ms", nav.final_url, nav.load_time_ms);

    let count_script = format!("document.querySelectorAll('{IMAGE_SELECTOR}').length");
    loop {
        let count = ctx.execute_js(&count_script).await?.as_u64().unwrap_or(0);
        if count > 0 {
            break;
        }
        if started.elapsed() >= wait {
            bail!("no generated images appeared within {}s", wait.as_secs());
        }
        tokio::time::sleep(DOM_CHECK_INTERVAL).await;
    }

    let collect_script = format!(
        "Array.from(document.querySelectorAll('{IMAGE_SELECTOR}')).map(img => img.getAttribute('src'))"
    );
    let value = ctx.execute_js(&collect_script).await?;
    let srcs: Vec<Option<String>> = serde_json::from_value(value)?;
    Ok(srcs.into_iter().flatten().collect())
}
