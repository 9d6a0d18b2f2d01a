//! Subcommand implementations.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use bing_image_creator::fragment::parse_inline_generative_image;
use bing_image_creator::{
    ChromiumRenderer, CreatorConfig, CreatorError, ExtractionStrategy, ImageCreatorClient,
    ImageGenerator, ProgressContext,
};
use indicatif::{ProgressBar, ProgressStyle};
use uuid::Uuid;

/// Which fragment `iframe` prints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum IframeMode {
    /// Content page only, rendered client-side.
    Csr,
    /// Server-rendered page with results filled in.
    Ssr,
    /// Raw result fragment.
    Lite,
}

/// Prompt text, unwrapping a `![prompt](#generative_image)` marker.
pub fn normalize_prompt(raw: &str) -> String {
    parse_inline_generative_image(raw).unwrap_or_else(|| raw.trim().to_string())
}

/// File name for the `index`-th image of a batch.
pub fn image_file_name(prefix: &str, index: usize) -> String {
    format!("{prefix}-{}.jpg", index + 1)
}

/// Run `work` until it finishes or `interrupt` fires. An interrupt drops
/// `work` and reports [`CreatorError::Cancelled`].
pub async fn run_until<T, W, S>(work: W, interrupt: S) -> Result<T>
where
    W: Future<Output = Result<T>>,
    S: Future<Output = std::io::Result<()>>,
{
    tokio::select! {
        result = work => result,
        signal = interrupt => {
            signal.context("cannot listen for Ctrl-C")?;
            Err(CreatorError::Cancelled.into())
        }
    }
}

async fn until_ctrl_c<T>(work: impl Future<Output = Result<T>>) -> Result<T> {
    run_until(work, tokio::signal::ctrl_c()).await
}

/// Spinner updated every time the client reports progress.
struct Watcher {
    spinner: ProgressBar,
}

impl Watcher {
    fn start(message: &str) -> Self {
        let spinner = ProgressBar::new_spinner();
        spinner.set_style(
            ProgressStyle::with_template("{spinner} {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );
        spinner.enable_steady_tick(Duration::from_millis(120));
        spinner.set_message(message.to_string());
        Self { spinner }
    }

    fn observer(&self) -> impl FnMut(&ProgressContext) -> bool + Send + '_ {
        move |ctx: &ProgressContext| {
            if let Some(started) = ctx.polling_started_at {
                let waited = chrono::Utc::now() - started;
                self.spinner
                    .set_message(format!("rendering... {}s", waited.num_seconds()));
            }
            false
        }
    }

    fn finish(&self) {
        self.spinner.finish_and_clear();
    }
}

fn build_client(config: &CreatorConfig, timeout: Option<u64>) -> Result<ImageCreatorClient> {
    let client = ImageCreatorClient::new(config).context("failed to build client")?;
    Ok(match timeout {
        Some(secs) => client.with_max_wait(Some(Duration::from_secs(secs))),
        None => client,
    })
}

/// `draw <prompt>`: generate and save images.
pub async fn draw(
    config: &CreatorConfig,
    prompt: &str,
    out_dir: &Path,
    strategy: ExtractionStrategy,
    timeout: Option<u64>,
) -> Result<Vec<PathBuf>> {
    let prompt = normalize_prompt(prompt);
    anyhow::ensure!(!prompt.is_empty(), "a prompt is required");

    let client = Arc::new(build_client(config, timeout)?);
    let mut generator = ImageGenerator::new(Arc::clone(&client));
    if strategy == ExtractionStrategy::Browser {
        let renderer = ChromiumRenderer::launch(client.profile()).await?;
        tracing::info!("Chromium renderer initialized");
        generator = generator.with_renderer(Arc::new(renderer));
        if let Some(secs) = timeout {
            generator = generator.with_render_wait(Duration::from_secs(secs));
        }
    }

    let watcher = Watcher::start(&format!("submitting \"{prompt}\""));
    let mut observer = watcher.observer();
    let result = until_ctrl_c(async {
        generator
            .generate(&prompt, &mut observer)
            .await
            .map_err(anyhow::Error::from)
    })
    .await;
    watcher.finish();
    let images = result?;

    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("cannot create output dir '{}'", out_dir.display()))?;
    let prefix = chrono::Local::now().format("%Y%m%d-%H%M%S").to_string();
    let mut written = Vec::with_capacity(images.len());
    for (i, bytes) in images.iter().enumerate() {
        let path = out_dir.join(image_file_name(&prefix, i));
        std::fs::write(&path, bytes)
            .with_context(|| format!("cannot write '{}'", path.display()))?;
        written.push(path);
    }
    Ok(written)
}

/// `iframe <prompt>`: print one of the embeddable fragments.
pub async fn iframe(
    config: &CreatorConfig,
    prompt: &str,
    mode: IframeMode,
    timeout: Option<u64>,
) -> Result<String> {
    let prompt = normalize_prompt(prompt);
    anyhow::ensure!(!prompt.is_empty(), "a prompt is required");

    let client = build_client(config, timeout)?;
    let request_id = Uuid::new_v4().to_string();

    if mode == IframeMode::Csr {
        return until_ctrl_c(async {
            client
                .image_iframe_csr(&prompt, Some(&request_id))
                .await
                .map_err(anyhow::Error::from)
        })
        .await;
    }

    let watcher = Watcher::start("submitting");
    let mut observer = watcher.observer();
    let result = until_ctrl_c(async {
        let html = match mode {
            IframeMode::Ssr => {
                client
                    .image_iframe_ssr(&prompt, Some(&request_id), &mut observer)
                    .await
            }
            _ => {
                client
                    .image_iframe_ssr_lite(&prompt, Some(&request_id), &mut observer)
                    .await
            }
        };
        html.map_err(anyhow::Error::from)
    })
    .await;
    watcher.finish();
    result
}
