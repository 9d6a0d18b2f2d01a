//! Outgoing request shaping: headers, cookies, proxy and a synthetic
//! forwarded address.

use std::net::Ipv4Addr;

use rand::Rng;

use crate::config::CreatorConfig;

/// Referer the endpoint expects from the chat surface.
const REFERER: &str = "https://www.bing.com/search?q=Bing+AI&showconv=1&FORM=hpcodx";

/// Immutable request shape shared by every call a client makes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestProfile {
    pub host: String,
    pub api_path: String,
    pub user_agent: String,
    pub forwarded_ip: Option<String>,
    pub cookie_header: Option<String>,
    pub proxy: Option<String>,
}

impl RequestProfile {
    /// Build a profile, drawing the forwarded address from the thread RNG.
    pub fn from_config(config: &CreatorConfig) -> Self {
        Self::from_config_with_rng(config, &mut rand::thread_rng())
    }

    pub fn from_config_with_rng<R: Rng + ?Sized>(config: &CreatorConfig, rng: &mut R) -> Self {
        let cookie_header = match (config.cookies(), config.user_token()) {
            (Some(cookies), _) => Some(cookies.to_string()),
            (None, Some(token)) => Some(format!("_U={token}")),
            (None, None) => None,
        };
        if cookie_header.is_none() {
            tracing::warn!("no cookies or user token configured; requests will be anonymous");
        }

        let forwarded_ip = config.forwarded_for().and_then(|spec| {
            let ip = forwarded_ip_with_rng(spec, rng);
            if ip.is_none() {
                tracing::warn!("ignoring malformed forwarded address: {spec}");
            }
            ip.map(|ip| ip.to_string())
        });

        Self {
            host: config.host().trim_end_matches('/').to_string(),
            api_path: config.api_path().to_string(),
            user_agent: config.user_agent().to_string(),
            forwarded_ip,
            cookie_header,
            proxy: config.proxy().map(str::to_string),
        }
    }

    /// `{host}{api_path}`, the base of every submission URL.
    pub fn api_url(&self) -> String {
        format!("{}{}", self.host, self.api_path)
    }

    /// The browser-like header set sent with every request.
    pub fn headers(&self) -> Vec<(&'static str, String)> {
        let mut headers = vec![
            (
                "accept",
                "text/html,application/xhtml+xml,application/xml;q=0.9,image/webp,image/apng,*/*;q=0.8,application/signed-exchange;v=b3;q=0.7".to_string(),
            ),
            ("accept-language", "en-US,en;q=0.9".to_string()),
            ("cache-control", "no-cache".to_string()),
            (
                "sec-ch-ua",
                r#""Microsoft Edge";v="113", "Chromium";v="113", "Not-A.Brand";v="24""#.to_string(),
            ),
            ("sec-ch-ua-arch", r#""x86""#.to_string()),
            ("sec-ch-ua-bitness", r#""64""#.to_string()),
            ("sec-ch-ua-full-version", r#""113.0.1774.35""#.to_string()),
            (
                "sec-ch-ua-full-version-list",
                r#""Microsoft Edge";v="113.0.1774.35", "Chromium";v="113.0.5672.63", "Not-A.Brand";v="24.0.0.0""#.to_string(),
            ),
            ("sec-ch-ua-mobile", "?0".to_string()),
            ("sec-ch-ua-model", r#""""#.to_string()),
            ("sec-ch-ua-platform", r#""Windows""#.to_string()),
            ("sec-ch-ua-platform-version", r#""11.0.0""#.to_string()),
            ("sec-fetch-dest", "iframe".to_string()),
            ("sec-fetch-mode", "navigate".to_string()),
            ("sec-fetch-site", "same-origin".to_string()),
            ("pragma", "no-cache".to_string()),
            ("referer", REFERER.to_string()),
            ("referrer-policy", "origin-when-cross-origin".to_string()),
            ("upgrade-insecure-requests", "1".to_string()),
            ("user-agent", self.user_agent.clone()),
            ("x-edge-shopping-flag", "1".to_string()),
        ];
        if let Some(cookie) = &self.cookie_header {
            headers.push(("cookie", cookie.clone()));
        }
        // Requests from some regions are rejected without it.
        if let Some(ip) = &self.forwarded_ip {
            headers.push(("x-forwarded-for", ip.clone()));
        }
        headers
    }
}

/// Parse a forwarded-address spec: either `a.b.c.d` (returned as-is) or
/// `a.b.c.d/mask`, in which case a random address inside the range is drawn.
///
/// Returns `None` for anything malformed.
pub fn forwarded_ip_with_rng<R: Rng + ?Sized>(spec: &str, rng: &mut R) -> Option<Ipv4Addr> {
    let spec = spec.trim();
    let Some((addr, mask)) = spec.split_once('/') else {
        return spec.parse().ok();
    };

    let base: Ipv4Addr = addr.parse().ok()?;
    let mask: u32 = mask.parse().ok().filter(|m| *m <= 32)?;

    // Usable addresses: 2^(32-mask) - 1, offsets drawn from [0, count).
    let count = (1u64 << (32 - mask)) - 1;
    let offset = if count == 0 {
        0
    } else {
        rng.gen_range(0..count)
    };

    let network_mask = if mask == 0 { 0 } else { u32::MAX << (32 - mask) };
    let network = u32::from(base) & network_mask;
    Some(add_with_carry(Ipv4Addr::from(network), offset))
}

/// Add `offset` to the last octet, carrying overflow into the octets above.
fn add_with_carry(base: Ipv4Addr, offset: u64) -> Ipv4Addr {
    let [a, b, c, d] = base.octets().map(u64::from);
    let d = d + offset;
    let c = c + d / 256;
    let b = b + c / 256;
    let a = a + b / 256;
    Ipv4Addr::new((a % 256) as u8, (b % 256) as u8, (c % 256) as u8, (d % 256) as u8)
}
