//! Embeddable iframe fragments built from submission and polling results.
//!
//! Heavily tied to the endpoint's current page layout (`giloader`, `giric`).

use std::sync::OnceLock;

use regex::Regex;

use crate::fragment::remove_html_tag_lite;

const IFRAME_STYLE: &str = "position:relative;overflow:hidden;width:475px;height:520px;\
    border:none;outline:none;padding:0px;margin:0px;display:flex;align-self:flex-start;\
    border-radius:12px;box-shadow:0px 0.3px 0.9px rgba(0, 0, 0, 0.12), \
    0px 1.6px 3.6px rgba(0, 0, 0, 0.16);z-index: 1;";

/// What the iframe should show.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IframeSource<'a> {
    /// Load a URL via `src`.
    Url(&'a str),
    /// Inline a document via `srcdoc`.
    Document(&'a str),
}

fn result_container_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<div([^>]*)id="giric"([^>]*)>"#).expect("result container regex is valid")
    })
}

/// Wrap `source` in the fixed-style iframe.
pub fn create_image_iframe(host: &str, source: IframeSource<'_>) -> String {
    let attr = match source {
        IframeSource::Url(url) => format!(r#"src="{url}""#),
        IframeSource::Document(html) => format!("srcdoc='{}'", rewrite_html(host, html)),
    };
    format!(r#"<iframe role="presentation" style="{IFRAME_STYLE}" {attr} />"#)
}

/// Make `html` safe inside a single-quoted attribute and point root-relative
/// URLs at `host`.
pub fn rewrite_html(host: &str, html: &str) -> String {
    html.replace('\'', "&#39;")
        .replace("=\"/", &format!("=\"{host}/"))
}

/// Produce the finished page without client-side scripts: drop the loader,
/// force the result container visible and fill it with `result_html`.
pub fn render_image_iframe(host: &str, container_html: &str, result_html: &str) -> String {
    let html = remove_html_tag_lite(container_html, "div", "giloader");
    let html = fill_result_container(&html, result_html);
    create_image_iframe(host, IframeSource::Document(&html))
}

fn fill_result_container(html: &str, result_html: &str) -> String {
    let Some(caps) = result_container_re().captures(html) else {
        return html.to_string();
    };
    let (Some(whole), Some(before), Some(after)) = (caps.get(0), caps.get(1), caps.get(2)) else {
        return html.to_string();
    };

    let opening = if before.as_str().contains(" style=\"") || after.as_str().contains(" style=\"")
    {
        whole.as_str().to_string()
    } else {
        format!(
            r#"<div{}id="giric"{} style="display: block;">"#,
            before.as_str(),
            after.as_str()
        )
    };

    // Content runs to the first closing div after the container opens.
    let content_start = whole.end();
    let content_end = html[content_start..]
        .find("</div>")
        .map(|i| content_start + i)
        .unwrap_or(content_start);

    format!(
        "{}{}{}{}",
        &html[..whole.start()],
        opening,
        result_html,
        &html[content_end..]
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOST: &str = "https://www.bing.com";

    #[test]
    fn test_url_iframe() {
        let iframe = create_image_iframe(HOST, IframeSource::Url("https://www.bing.com/images/create?q=x"));
        assert!(iframe.starts_with(r#"<iframe role="presentation""#));
        assert!(iframe.contains(r#"src="https://www.bing.com/images/create?q=x""#));
        assert!(!iframe.contains("srcdoc"));
    }

    #[test]
    fn test_document_iframe_escapes_and_rewrites() {
        let iframe = create_image_iframe(
            HOST,
            IframeSource::Document(r#"<img src="/th/id/A" alt='x'>"#),
        );
        assert!(iframe.contains(r#"srcdoc='<img src="https://www.bing.com/th/id/A" alt=&#39;x&#39;>'"#));
    }

    #[test]
    fn test_render_strips_loader_and_fills_container() {
        let container = concat!(
            r#"<body><div id="giloader" class="l"><div class="spin"></div></div>"#,
            r#"<div class="c" id="giric"><span>old</span></div></body>"#
        );
        let rendered = render_image_iframe(HOST, container, r#"<img class="mimg" src="/a">"#);
        assert!(!rendered.contains("giloader"));
        assert!(!rendered.contains("old"));
        assert!(rendered.contains(
            r#"<div class="c" id="giric" style="display: block;"><img class="mimg" src="https://www.bing.com/a"></div>"#
        ));
    }

    #[test]
    fn test_render_keeps_existing_style() {
        let container = r#"<div id="giric" style="display: none;"></div>"#;
        let rendered = render_image_iframe(HOST, container, "done");
        assert!(rendered.contains(r#"<div id="giric" style="display: none;">done</div>"#));
    }

    #[test]
    fn test_render_without_container_only_wraps() {
        let rendered = render_image_iframe(HOST, "<p>page</p>", "done");
        assert!(rendered.contains("srcdoc='<p>page</p>'"));
    }
}
