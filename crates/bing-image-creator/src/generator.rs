//! `generate(prompt) -> images`: the interface command front ends consume.
//!
//! Two extraction strategies share one output contract, an ordered list of
//! image URLs. They are not assumed to agree with each other.

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use uuid::Uuid;

use crate::client::ImageCreatorClient;
use crate::error::{CreatorError, CreatorResult};
use crate::fragment;
use crate::progress::{ProgressContext, ProgressObserver};
use crate::renderer::{self, Renderer, DEFAULT_RENDER_WAIT};

/// Where image URLs come from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExtractionStrategy {
    /// Poll the result endpoint and read `img` tags from its HTML.
    #[default]
    Polling,
    /// Load the content page in a browser and read the rendered DOM.
    Browser,
}

impl FromStr for ExtractionStrategy {
    type Err = CreatorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "polling" => Ok(Self::Polling),
            "browser" => Ok(Self::Browser),
            other => Err(CreatorError::Config(format!(
                "unknown extraction strategy '{other}' (expected polling or browser)"
            ))),
        }
    }
}

pub struct ImageGenerator {
    client: Arc<ImageCreatorClient>,
    renderer: Option<Arc<dyn Renderer>>,
    strategy: ExtractionStrategy,
    render_wait: Duration,
}

impl ImageGenerator {
    /// Generator using the polling strategy.
    pub fn new(client: Arc<ImageCreatorClient>) -> Self {
        Self {
            client,
            renderer: None,
            strategy: ExtractionStrategy::Polling,
            render_wait: DEFAULT_RENDER_WAIT,
        }
    }

    /// Switch to the browser strategy.
    pub fn with_renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self.strategy = ExtractionStrategy::Browser;
        self
    }

    pub fn with_render_wait(mut self, wait: Duration) -> Self {
        self.render_wait = wait;
        self
    }

    pub fn strategy(&self) -> ExtractionStrategy {
        self.strategy
    }

    /// Full-size image URLs for `prompt`, sizing parameters removed.
    pub async fn image_urls<P>(&self, prompt: &str, progress: &mut P) -> CreatorResult<Vec<String>>
    where
        P: ProgressObserver + ?Sized,
    {
        let request_id = Uuid::new_v4().to_string();
        tracing::info!(
            "generating images for request {request_id} via {:?}",
            self.strategy
        );

        let raw = match (self.strategy, &self.renderer) {
            (ExtractionStrategy::Browser, Some(renderer)) => {
                let submission = self.client.submit(prompt, Some(&request_id)).await?;
                self.render_image_urls(renderer.as_ref(), &submission.content_url, progress)
                    .await?
            }
            (ExtractionStrategy::Browser, None) => {
                return Err(CreatorError::Config(
                    "browser strategy selected without a renderer".into(),
                ))
            }
            (ExtractionStrategy::Polling, _) => {
                self.client
                    .image_list(prompt, Some(&request_id), false, progress)
                    .await?
            }
        };

        let mut urls = Vec::with_capacity(raw.len());
        for url in raw {
            urls.push(fragment::clean_image_url(&url)?);
        }
        Ok(urls)
    }

    /// Wait for the browser to show the images, reporting progress at the
    /// polling cadence. Cancelling drops the render, which closes its tab.
    async fn render_image_urls<P>(
        &self,
        renderer: &dyn Renderer,
        content_url: &str,
        progress: &mut P,
    ) -> CreatorResult<Vec<String>>
    where
        P: ProgressObserver + ?Sized,
    {
        let context = ProgressContext {
            content_iframe: None,
            polling_started_at: Some(Utc::now()),
        };
        let render = renderer::collect_image_urls(renderer, content_url, self.render_wait);
        tokio::pin!(render);

        let period = self.client.poll_interval();
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        loop {
            tokio::select! {
                result = &mut render => {
                    return result.map_err(|e| CreatorError::Render(format!("{e:#}")));
                }
                _ = ticker.tick() => {
                    if progress.on_progress(&context) {
                        tracing::info!("browser render cancelled");
                        return Err(CreatorError::Cancelled);
                    }
                }
            }
        }
    }

    /// Generate and download every image for `prompt`, in page order.
    pub async fn generate<P>(&self, prompt: &str, progress: &mut P) -> CreatorResult<Vec<Vec<u8>>>
    where
        P: ProgressObserver + ?Sized,
    {
        let urls = self.image_urls(prompt, progress).await?;
        let transport = self.client.transport();
        let mut images = Vec::with_capacity(urls.len());
        for url in &urls {
            tracing::debug!("downloading {url}");
            images.push(transport.fetch_bytes(url).await?);
        }
        tracing::info!("downloaded {} image(s)", images.len());
        Ok(images)
    }
}
