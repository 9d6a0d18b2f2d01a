//! Request-issuing capability.
//!
//! The client never reaches for a global HTTP function; it holds a
//! `Transport` and every call goes through it. `ReqwestTransport` is the
//! production implementation, tests substitute their own.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::{CreatorError, CreatorResult};
use crate::profile::RequestProfile;

/// Response to a single GET.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// URL after redirects.
    pub final_url: String,
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

#[async_trait]
pub trait Transport: Send + Sync {
    /// GET `url` shaped by `profile`. Non-2xx statuses are returned, not
    /// turned into errors.
    async fn issue_request(&self, url: &str, profile: &RequestProfile)
        -> CreatorResult<HttpResponse>;

    /// GET `url` and return the raw body. Fails on any non-success status.
    async fn fetch_bytes(&self, url: &str) -> CreatorResult<Vec<u8>>;
}

/// reqwest-backed transport. The proxy is part of the client, so one
/// transport serves one profile.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(profile: &RequestProfile, timeout: Duration) -> CreatorResult<Self> {
        let mut builder = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(5))
            .user_agent(profile.user_agent.clone());

        if let Some(proxy) = &profile.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| CreatorError::Config(format!("invalid proxy '{proxy}': {e}")))?;
            builder = builder.proxy(proxy);
        }

        Ok(Self {
            client: builder.build()?,
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn issue_request(
        &self,
        url: &str,
        profile: &RequestProfile,
    ) -> CreatorResult<HttpResponse> {
        let mut request = self.client.get(url);
        for (name, value) in profile.headers() {
            request = request.header(name, value);
        }

        let r = request.send().await?;
        let status = r.status().as_u16();
        let final_url = r.url().to_string();
        let body = r.text().await?;

        Ok(HttpResponse {
            final_url,
            status,
            body,
        })
    }

    async fn fetch_bytes(&self, url: &str) -> CreatorResult<Vec<u8>> {
        let r = self.client.get(url).send().await?;
        let status = r.status().as_u16();
        if !r.status().is_success() {
            return Err(CreatorError::HttpStatus { status });
        }
        Ok(r.bytes().await?.to_vec())
    }
}
