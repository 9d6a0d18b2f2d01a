//! The generation/polling protocol client.
//!
//! A generation is a short, stateful conversation with the endpoint:
//!
//! 1. **Submit**: GET the create page with the prompt and telemetry query.
//!    The page embeds a polling URL in `div#gir[data-c]`, or an error
//!    container when the request was refused.
//! 2. **Poll**: GET the polling URL once a second until the body no longer
//!    carries the `errorMessage` marker. The observer may cancel between
//!    attempts, and an optional deadline bounds the whole run.
//! 3. **Assemble**: extract image URLs or build an iframe fragment.
//!
//! Each client owns its own profile, transport and telemetry counters, so
//! independent clients never interfere. Concurrent submissions through one
//! client serialize on the telemetry lock only.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::Mutex;

use crate::config::CreatorConfig;
use crate::error::{CreatorError, CreatorResult};
use crate::fragment;
use crate::iframe::{self, IframeSource};
use crate::profile::RequestProfile;
use crate::progress::{ProgressContext, ProgressObserver};
use crate::telemetry::TelemetrySequencer;
use crate::transport::{ReqwestTransport, Transport};

/// Delay between polling attempts.
pub const POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Everything the endpoint told us about one submitted prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationSubmission {
    /// Final URL of the create page.
    pub content_url: String,
    /// Absolute URL to poll for the result.
    pub polling_url: String,
    /// Body of the create page.
    pub content_html: String,
    pub prompt: String,
    pub request_id: String,
}

/// Stateful client for one profile.
pub struct ImageCreatorClient {
    profile: RequestProfile,
    transport: Arc<dyn Transport>,
    telemetry: Mutex<TelemetrySequencer>,
    enable_telemetry: bool,
    poll_interval: Duration,
    max_wait: Option<Duration>,
}

impl ImageCreatorClient {
    /// Build a client with the default reqwest transport.
    pub fn new(config: &CreatorConfig) -> CreatorResult<Self> {
        let profile = RequestProfile::from_config(config);
        let transport = ReqwestTransport::new(
            &profile,
            Duration::from_secs(config.request_timeout_secs),
        )?;
        Ok(Self::with_transport(config, profile, Arc::new(transport)))
    }

    /// Build a client around an existing profile and transport.
    pub fn with_transport(
        config: &CreatorConfig,
        profile: RequestProfile,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            profile,
            transport,
            telemetry: Mutex::new(TelemetrySequencer::new(
                &config.telemetry,
                config.enable_suffix,
            )),
            enable_telemetry: config.enable_telemetry,
            poll_interval: POLL_INTERVAL,
            max_wait: config.max_wait_secs.map(Duration::from_secs),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    /// How often progress is reported while waiting on the endpoint.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    pub fn with_max_wait(mut self, max_wait: Option<Duration>) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn profile(&self) -> &RequestProfile {
        &self.profile
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Submission URL for `prompt`. Advances the telemetry counters when
    /// telemetry is enabled.
    pub async fn submission_url(&self, prompt: &str, request_id: Option<&str>) -> String {
        let telemetry = if self.enable_telemetry {
            self.telemetry.lock().await.next_query()
        } else {
            String::new()
        };
        let mut url = format!(
            "{}{}&q={}",
            self.profile.api_url(),
            telemetry,
            urlencoding::encode(prompt)
        );
        if let Some(id) = request_id.filter(|id| !id.is_empty()) {
            url.push_str("&iframeid=");
            url.push_str(id);
        }
        url
    }

    /// Register `prompt` with the endpoint and locate its polling URL.
    pub async fn submit(
        &self,
        prompt: &str,
        request_id: Option<&str>,
    ) -> CreatorResult<GenerationSubmission> {
        let url = self.submission_url(prompt, request_id).await;
        tracing::debug!("image creation request: {url}");

        let response = self.transport.issue_request(&url, &self.profile).await?;
        tracing::debug!(
            "image creation response: status={}, url={}",
            response.status,
            response.final_url
        );
        if response.status != 200 {
            return Err(CreatorError::HttpStatus {
                status: response.status,
            });
        }

        let Some(polling_path) = fragment::extract_polling_url(&response.body) else {
            return Err(match fragment::extract_error_message(&response.body) {
                Some(message) => CreatorError::Remote { message },
                None => CreatorError::MissingPollingUrl,
            });
        };

        Ok(GenerationSubmission {
            content_url: response.final_url,
            polling_url: format!("{}{}", self.profile.host, polling_path),
            content_html: response.body,
            prompt: prompt.to_string(),
            request_id: request_id.unwrap_or_default().to_string(),
        })
    }

    /// Poll until the result is ready, honouring the client's deadline.
    pub async fn poll<P>(&self, polling_url: &str, progress: &mut P) -> CreatorResult<String>
    where
        P: ProgressObserver + ?Sized,
    {
        self.poll_with_deadline(polling_url, progress, self.max_wait)
            .await
    }

    /// Poll until the result is ready, the observer cancels, or `max_wait`
    /// elapses.
    pub async fn poll_with_deadline<P>(
        &self,
        polling_url: &str,
        progress: &mut P,
        max_wait: Option<Duration>,
    ) -> CreatorResult<String>
    where
        P: ProgressObserver + ?Sized,
    {
        match max_wait {
            None => self.poll_loop(polling_url, progress).await,
            Some(limit) => tokio::time::timeout(limit, self.poll_loop(polling_url, progress))
                .await
                .unwrap_or(Err(CreatorError::Timeout { waited: limit })),
        }
    }

    async fn poll_loop<P>(&self, polling_url: &str, progress: &mut P) -> CreatorResult<String>
    where
        P: ProgressObserver + ?Sized,
    {
        let context = ProgressContext {
            content_iframe: None,
            polling_started_at: Some(Utc::now()),
        };
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            tracing::debug!("polling the image request (attempt {attempts}): {polling_url}");

            let response = self
                .transport
                .issue_request(polling_url, &self.profile)
                .await?;
            if response.status != 200 {
                return Err(CreatorError::HttpStatus {
                    status: response.status,
                });
            }

            if fragment::is_polling_complete(&response.body) {
                tracing::info!("image request completed after {attempts} attempt(s)");
                return Ok(response.body);
            }

            if progress.on_progress(&context) {
                tracing::info!("image request cancelled after {attempts} attempt(s)");
                return Err(CreatorError::Cancelled);
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    /// Submit, poll, and return the generated image URLs in page order.
    pub async fn image_list<P>(
        &self,
        prompt: &str,
        request_id: Option<&str>,
        remove_size_limit: bool,
        progress: &mut P,
    ) -> CreatorResult<Vec<String>>
    where
        P: ProgressObserver + ?Sized,
    {
        let submission = self.submit(prompt, request_id).await?;
        let result_html = self.poll(&submission.polling_url, progress).await?;
        tracing::debug!("image creation result: {result_html}");
        Ok(fragment::extract_image_urls(&result_html, remove_size_limit))
    }

    /// Content page wrapped for client-side rendering. Does not poll.
    pub async fn image_iframe_csr(
        &self,
        prompt: &str,
        request_id: Option<&str>,
    ) -> CreatorResult<String> {
        let submission = self.submit(prompt, request_id).await?;
        Ok(iframe::create_image_iframe(
            &self.profile.host,
            IframeSource::Url(&submission.content_url),
        ))
    }

    /// Fully server-rendered fragment. The observer sees the content iframe
    /// before polling starts and may cancel right there.
    pub async fn image_iframe_ssr<P>(
        &self,
        prompt: &str,
        request_id: Option<&str>,
        progress: &mut P,
    ) -> CreatorResult<String>
    where
        P: ProgressObserver + ?Sized,
    {
        let submission = self.submit(prompt, request_id).await?;
        let early = ProgressContext {
            content_iframe: Some(iframe::create_image_iframe(
                &self.profile.host,
                IframeSource::Url(&submission.content_url),
            )),
            polling_started_at: None,
        };
        if progress.on_progress(&early) {
            return Err(CreatorError::Cancelled);
        }

        let result_html = self.poll(&submission.polling_url, progress).await?;
        Ok(iframe::render_image_iframe(
            &self.profile.host,
            &submission.content_html,
            &result_html,
        ))
    }

    /// Just the raw polling result, inlined.
    pub async fn image_iframe_ssr_lite<P>(
        &self,
        prompt: &str,
        request_id: Option<&str>,
        progress: &mut P,
    ) -> CreatorResult<String>
    where
        P: ProgressObserver + ?Sized,
    {
        let submission = self.submit(prompt, request_id).await?;
        let result_html = self.poll(&submission.polling_url, progress).await?;
        Ok(iframe::create_image_iframe(
            &self.profile.host,
            IframeSource::Document(&result_html),
        ))
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::transport::HttpResponse;
    use async_trait::async_trait;
    use std::collections::VecDeque;
    use std::sync::Mutex as StdMutex;

    /// Transport that replays canned responses and records requested URLs.
    #[derive(Default)]
    pub struct ScriptedTransport {
        responses: StdMutex<VecDeque<(u16, String)>>,
        pub calls: StdMutex<Vec<String>>,
        pub images: StdMutex<Vec<(String, Vec<u8>)>>,
    }

    impl ScriptedTransport {
        pub fn new(responses: Vec<(u16, &str)>) -> Self {
            Self {
                responses: StdMutex::new(
                    responses
                        .into_iter()
                        .map(|(s, b)| (s, b.to_string()))
                        .collect(),
                ),
                ..Default::default()
            }
        }

        pub fn with_image(self, url: &str, bytes: &[u8]) -> Self {
            self.images
                .lock()
                .unwrap()
                .push((url.to_string(), bytes.to_vec()));
            self
        }

        pub fn call_count(&self) -> usize {
            self.calls.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn issue_request(
            &self,
            url: &str,
            _profile: &RequestProfile,
        ) -> CreatorResult<HttpResponse> {
            self.calls.lock().unwrap().push(url.to_string());
            let (status, body) = self
                .responses
                .lock()
                .unwrap()
                .pop_front()
                .expect("no scripted response left");
            Ok(HttpResponse {
                final_url: url.to_string(),
                status,
                body,
            })
        }

        async fn fetch_bytes(&self, url: &str) -> CreatorResult<Vec<u8>> {
            self.calls.lock().unwrap().push(url.to_string());
            self.images
                .lock()
                .unwrap()
                .iter()
                .find(|(u, _)| u == url)
                .map(|(_, b)| b.clone())
                .ok_or(CreatorError::HttpStatus { status: 404 })
        }
    }

    pub const SUBMIT_OK: &str = r#"<html><div id="giloader"><div>loading</div></div><div id="gir" data-c="/images/create/async/results/1-abc?q=a+cat&amp;IG=F00" data-mc="/x"></div><div id="giric"></div></html>"#;

    pub const RESULT_OK: &str = r#"<div class="img_cont"><img class="mimg" src="https://tse1.mm.bing.net/th/id/A?w=270&amp;h=270&amp;c=6"/><img class="mimg" src="https://tse2.mm.bing.net/th/id/B?w=270&amp;h=270&amp;c=6"/></div>"#;

    pub const PENDING: &str = r#"{"errorMessage":"Pending"}"#;

    pub fn client(transport: Arc<ScriptedTransport>) -> ImageCreatorClient {
        let config = CreatorConfig {
            user_token: Some("token".into()),
            ..Default::default()
        };
        let profile = RequestProfile::from_config(&config);
        ImageCreatorClient::with_transport(&config, profile, transport)
    }
}
