//! Narrow text extraction over the HTML fragments the endpoint returns.
//!
//! The endpoint never returns structured data, so every markup assumption
//! the client makes lives here. When the upstream markup drifts, this is the
//! only module that should need to change.

use std::sync::OnceLock;

use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

/// Substring that marks a polling response as not finished yet.
pub const POLLING_ERROR_MARKER: &str = "errorMessage";

/// CSS selector for generated image tags in a result fragment.
pub const IMAGE_SELECTOR: &str = "img.mimg";

/// Query parameters that only control thumbnail sizing.
const SIZE_PARAMS: [&str; 5] = ["w", "h", "c", "r", "o"];

fn entity_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"&[a-z]+;").expect("entity regex is valid"))
}

fn polling_url_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<div id="gir" data-c="([^"]*)""#).expect("polling url regex is valid")
    })
}

fn error_container_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"<div class="gil_err_mt">(.*?)</div>"#).expect("error container regex is valid")
    })
}

fn inline_image_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"!\[(.*?)\]\(#generative_image\)").expect("inline image regex is valid")
    })
}

/// Decode `&amp;`, `&lt;`, `&gt;`, `&quot;` and `&nbsp;`. Anything else that
/// looks like an entity is left alone.
pub fn decode_html_lite(html: &str) -> String {
    entity_re()
        .replace_all(html, |caps: &regex::Captures<'_>| {
            match &caps[0] {
                "&amp;" => "&",
                "&lt;" => "<",
                "&gt;" => ">",
                "&quot;" => "\"",
                "&nbsp;" => "\u{A0}",
                other => other,
            }
            .to_string()
        })
        .into_owned()
}

/// Remove the `<tag ... id="tag_id" ...>` element and everything up to its
/// matching close tag. Nested elements with the same tag name are counted.
///
/// Returns the input unchanged when no such element exists. If the element
/// is never closed only its opening tag is removed.
pub fn remove_html_tag_lite(html: &str, tag: &str, tag_id: &str) -> String {
    let pattern = format!(
        r#"<{}(?:\s[^>]*)?\sid="{}"[^>]*>"#,
        regex::escape(tag),
        regex::escape(tag_id)
    );
    let Ok(open_re) = Regex::new(&pattern) else {
        return html.to_string();
    };
    let Some(open) = open_re.find(html) else {
        return html.to_string();
    };

    if open.as_str().ends_with("/>") {
        return format!("{}{}", &html[..open.start()], &html[open.end()..]);
    }

    let close = format!("</{tag}>");
    let mut depth = 0usize;
    let mut cursor = open.end();
    let mut end = open.end();

    while let Some(rel) = html[cursor..].find('<') {
        let at = cursor + rel;
        let rest = &html[at..];
        if rest.starts_with(&close) {
            cursor = at + close.len();
            if depth == 0 {
                end = cursor;
                break;
            }
            depth -= 1;
        } else if opens_tag(rest, tag) {
            depth += 1;
            cursor = at + 1 + tag.len();
        } else {
            cursor = at + 1;
        }
    }

    format!("{}{}", &html[..open.start()], &html[end..])
}

/// `rest` starts with a non-self-closing `<tag>` or `<tag ...>`.
fn opens_tag(rest: &str, tag: &str) -> bool {
    let Some(after) = rest.strip_prefix('<').and_then(|r| r.strip_prefix(tag)) else {
        return false;
    };
    if !matches!(after.chars().next(), Some(c) if c == '>' || c == '/' || c.is_whitespace()) {
        return false;
    }
    match after.find('>') {
        Some(gt) => !after[..gt].ends_with('/'),
        None => false,
    }
}

/// Relative polling URL from the submission page, entity-decoded.
pub fn extract_polling_url(html: &str) -> Option<String> {
    polling_url_re()
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| decode_html_lite(m.as_str()))
        .filter(|url| !url.is_empty())
}

/// Text of the endpoint's error container, verbatim.
pub fn extract_error_message(html: &str) -> Option<String> {
    error_container_re()
        .captures(html)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// True when a polling body is a finished result.
pub fn is_polling_complete(body: &str) -> bool {
    !body.is_empty() && !body.contains(POLLING_ERROR_MARKER)
}

/// `src` of every generated image in `result_html`, in document order.
/// Duplicates are kept.
pub fn extract_image_urls(result_html: &str, remove_size_limit: bool) -> Vec<String> {
    let Ok(selector) = Selector::parse(IMAGE_SELECTOR) else {
        return Vec::new();
    };
    let document = Html::parse_fragment(result_html);
    document
        .select(&selector)
        .filter_map(|img| img.value().attr("src"))
        .map(|src| {
            if remove_size_limit {
                strip_size_limit(src).to_string()
            } else {
                src.to_string()
            }
        })
        .collect()
}

/// Drop the `?w=...` thumbnail suffix.
pub fn strip_size_limit(url: &str) -> &str {
    url.split("?w=").next().unwrap_or(url)
}

/// Remove thumbnail sizing parameters, keeping any others.
pub fn clean_image_url(raw: &str) -> Result<String, url::ParseError> {
    let mut url = Url::parse(raw)?;
    let kept: Vec<(String, String)> = url
        .query_pairs()
        .filter(|(k, _)| !SIZE_PARAMS.contains(&k.as_ref()))
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();
    if kept.is_empty() {
        url.set_query(None);
    } else {
        url.query_pairs_mut().clear().extend_pairs(kept);
    }
    Ok(url.to_string())
}

/// Prompt inside a `![prompt](#generative_image)` chat marker, if present.
pub fn parse_inline_generative_image(message: &str) -> Option<String> {
    inline_image_re()
        .captures(message)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}
