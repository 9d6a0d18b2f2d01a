//! Bing Image Creator: protocol client for the unofficial image generation
//! endpoint: submit a prompt, poll until rendering finishes, extract images.

pub mod client;
pub mod config;
pub mod error;
pub mod fragment;
pub mod generator;
pub mod iframe;
pub mod profile;
pub mod progress;
pub mod renderer;
pub mod telemetry;
pub mod transport;

pub use client::{GenerationSubmission, ImageCreatorClient, POLL_INTERVAL};
pub use config::{CreatorConfig, TelemetryConfig};
pub use error::{CreatorError, CreatorResult};
pub use generator::{ExtractionStrategy, ImageGenerator};
pub use iframe::IframeSource;
pub use profile::RequestProfile;
pub use progress::{NoProgress, ProgressContext, ProgressObserver};
pub use renderer::chromium::ChromiumRenderer;
pub use renderer::Renderer;
pub use telemetry::TelemetrySequencer;
pub use transport::{HttpResponse, ReqwestTransport, Transport};
