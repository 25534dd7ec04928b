//! Render request extraction and option parsing

use crate::http::HttpRequest;
use crate::{CaptureOptions, Error, ImageFormat, Result};
use serde_json::{json, Value};

pub const DEFAULT_VIEWPORT_WIDTH: u32 = 800;
pub const MAX_VIEWPORT_WIDTH: u32 = 16_384;
pub const DEFAULT_QUALITY: u32 = 80;

/// One screenshot job, scoped to a single HTTP call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderRequest {
    /// Document to render; never empty after trimming
    pub html: String,
    pub viewport_width: u32,
    /// WebP quality in [1, 100]
    pub quality: u32,
    pub full_page: bool,
}

impl RenderRequest {
    /// Extract and validate a render request.
    ///
    /// Fails with [`Error::BadInput`] when no usable HTML is present. The
    /// query options never fail: bad values fall back to defaults or are
    /// clamped.
    pub fn from_http(req: &HttpRequest) -> Result<Self> {
        let html = extract_html(&req.content_type(), &req.body).ok_or(Error::BadInput)?;
        if html.trim().is_empty() {
            return Err(Error::BadInput);
        }

        Ok(Self {
            html,
            viewport_width: parse_width(req.query_param("width")),
            quality: parse_quality(req.query_param("quality")),
            full_page: parse_full_page(req.query_param("fullPage")),
        })
    }

    pub fn capture_options(&self) -> CaptureOptions {
        CaptureOptions {
            format: ImageFormat::Webp,
            quality: self.quality,
            full_page: self.full_page,
        }
    }
}

/// Resolve the HTML payload according to the request content type.
///
/// Returns `None` when the body holds no text usable as HTML (a JSON body
/// without a string `html` field, or a non-UTF-8 body of unknown type).
pub fn extract_html(content_type: &str, body: &[u8]) -> Option<String> {
    let content_type = content_type.to_ascii_lowercase();

    if content_type.contains("application/json") {
        let value: Value = serde_json::from_slice(body).ok()?;
        return value.get("html")?.as_str().map(str::to_string);
    }

    if content_type.contains("text/html") || content_type.contains("text/plain") {
        return Some(String::from_utf8_lossy(body).into_owned());
    }

    // Unknown or missing content type: a JSON object must carry the HTML in
    // its `html` field, anything else is taken as raw text.
    match serde_json::from_slice::<Value>(body) {
        Ok(Value::Object(map)) => map
            .get("html")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
        _ => std::str::from_utf8(body).ok().map(str::to_string),
    }
}

/// Integer prefix of `s` after leading whitespace, with optional sign:
/// `"640px"` is 640, `" -5"` is -5, `"abc"` is `None`.
pub fn parse_int_prefix(s: &str) -> Option<i64> {
    let s = s.trim_start();
    let (negative, digits) = match s.as_bytes().first() {
        Some(b'-') => (true, &s[1..]),
        Some(b'+') => (false, &s[1..]),
        _ => (false, s),
    };

    let digits: &str = {
        let end = digits
            .find(|c: char| !c.is_ascii_digit())
            .unwrap_or(digits.len());
        &digits[..end]
    };
    if digits.is_empty() {
        return None;
    }

    let magnitude = digits
        .bytes()
        .fold(0i64, |acc, d| acc.saturating_mul(10).saturating_add(i64::from(d - b'0')));
    Some(if negative { -magnitude } else { magnitude })
}

/// Viewport width; non-numeric, zero and negative values use the default.
pub fn parse_width(raw: Option<&str>) -> u32 {
    match raw.and_then(parse_int_prefix) {
        Some(n) if n > 0 => n.min(i64::from(MAX_VIEWPORT_WIDTH)) as u32,
        _ => DEFAULT_VIEWPORT_WIDTH,
    }
}

/// WebP quality clamped to [1, 100]; non-numeric and zero use the default.
pub fn parse_quality(raw: Option<&str>) -> u32 {
    match raw.and_then(parse_int_prefix) {
        Some(0) | None => DEFAULT_QUALITY,
        Some(n) => n.clamp(1, 100) as u32,
    }
}

/// Full-page capture unless the literal `"false"` was given.
pub fn parse_full_page(raw: Option<&str>) -> bool {
    raw != Some("false")
}

/// Example request shape echoed to clients on bad input.
pub fn usage() -> Value {
    json!({
        "method": "POST",
        "headers": { "Content-Type": "application/json" },
        "body": { "html": "<your HTML string here>" },
        "queryParams": {
            "width": "viewport width in px (default: 800)",
            "quality": "webp quality 1-100 (default: 80)",
            "fullPage": "true/false (default: true)"
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_body_uses_html_field() {
        assert_eq!(
            extract_html("application/json", br#"{"html":"<p>hi</p>"}"#).as_deref(),
            Some("<p>hi</p>")
        );
        assert_eq!(extract_html("application/json; charset=utf-8", br#"{"html":42}"#), None);
        assert_eq!(extract_html("application/json", br#"{"other":"x"}"#), None);
        assert_eq!(extract_html("application/json", b"not json"), None);
    }

    #[test]
    fn text_bodies_are_verbatim() {
        assert_eq!(extract_html("text/html", b"<b>x</b>").as_deref(), Some("<b>x</b>"));
        assert_eq!(extract_html("Text/Plain", b"plain").as_deref(), Some("plain"));
        // Invalid UTF-8 is still turned into text
        let lossy = extract_html("text/html", &[b'<', 0xff, b'>']).unwrap();
        assert!(lossy.starts_with('<') && lossy.ends_with('>'));
    }

    #[test]
    fn unknown_content_type_falls_back() {
        assert_eq!(extract_html("", br#"{"html":"<i>a</i>"}"#).as_deref(), Some("<i>a</i>"));
        assert_eq!(extract_html("application/octet-stream", b"<p>raw</p>").as_deref(), Some("<p>raw</p>"));
        // A structured body without usable html is rejected, not passed through
        assert_eq!(extract_html("", br#"{"html":""}"#), None);
        assert_eq!(extract_html("", br#"{"page":1}"#), None);
        assert_eq!(extract_html("", &[0xff, 0xfe]), None);
    }

    #[test]
    fn int_prefix_follows_lenient_parsing() {
        assert_eq!(parse_int_prefix("640"), Some(640));
        assert_eq!(parse_int_prefix("640px"), Some(640));
        assert_eq!(parse_int_prefix("  12"), Some(12));
        assert_eq!(parse_int_prefix("-5"), Some(-5));
        assert_eq!(parse_int_prefix("+7"), Some(7));
        assert_eq!(parse_int_prefix("1.9"), Some(1));
        assert_eq!(parse_int_prefix("abc"), None);
        assert_eq!(parse_int_prefix("-"), None);
        assert_eq!(parse_int_prefix(""), None);
        assert_eq!(parse_int_prefix("99999999999999999999999"), Some(i64::MAX));
    }

    #[test]
    fn width_defaults_and_bounds() {
        assert_eq!(parse_width(None), 800);
        assert_eq!(parse_width(Some("1280")), 1280);
        assert_eq!(parse_width(Some("wide")), 800);
        assert_eq!(parse_width(Some("0")), 800);
        assert_eq!(parse_width(Some("-100")), 800);
        assert_eq!(parse_width(Some("100000")), MAX_VIEWPORT_WIDTH);
    }

    #[test]
    fn quality_is_clamped() {
        assert_eq!(parse_quality(None), 80);
        assert_eq!(parse_quality(Some("150")), 100);
        assert_eq!(parse_quality(Some("-5")), 1);
        assert_eq!(parse_quality(Some("high")), 80);
        assert_eq!(parse_quality(Some("0")), 80);
        assert_eq!(parse_quality(Some("55")), 55);
    }

    #[test]
    fn full_page_only_disabled_by_literal_false() {
        assert!(parse_full_page(None));
        assert!(parse_full_page(Some("true")));
        assert!(parse_full_page(Some("False")));
        assert!(parse_full_page(Some("0")));
        assert!(!parse_full_page(Some("false")));
    }

    #[test]
    fn whitespace_html_is_bad_input() {
        let req = HttpRequest::new("POST", "/screenshot")
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"html":"   \n "}"#);
        assert!(matches!(RenderRequest::from_http(&req), Err(Error::BadInput)));
    }

    #[test]
    fn from_http_collects_options() {
        let req = HttpRequest::new("POST", "/screenshot?width=1024&quality=150&fullPage=false")
            .with_header("Content-Type", "text/html")
            .with_body("<p>x</p>");
        let render = RenderRequest::from_http(&req).unwrap();
        assert_eq!(
            render,
            RenderRequest {
                html: "<p>x</p>".into(),
                viewport_width: 1024,
                quality: 100,
                full_page: false,
            }
        );
        let capture = render.capture_options();
        assert_eq!(capture.format, ImageFormat::Webp);
        assert!(!capture.full_page);
    }

    #[test]
    fn usage_lists_query_options() {
        let usage = usage();
        for key in ["width", "quality", "fullPage"] {
            assert!(usage["queryParams"].get(key).is_some(), "missing {key}");
        }
    }
}
