//! Transport-neutral HTTP request and response types
//!
//! The handler works on these plain values so it can be driven by the
//! tiny_http binding in [`crate::server`] or directly from tests.

use crate::{Error, ImageFormat};
use serde::Serialize;

/// Headers attached to every response, errors included.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// An incoming request
#[derive(Debug, Clone, Default)]
pub struct HttpRequest {
    /// Upper-case method name
    pub method: String,
    /// Path without the query string
    pub path: String,
    /// Decoded query parameters in arrival order
    pub query: Vec<(String, String)>,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl HttpRequest {
    /// Build a request from a method and a request target (`/path?query`).
    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = match target.split_once('?') {
            Some((path, query)) => (path, parse_query(query)),
            None => (target, Vec::new()),
        };
        Self {
            method: method.to_ascii_uppercase(),
            path: path.to_string(),
            query,
            headers: Vec::new(),
            body: Vec::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// First header named `name` (case-insensitive).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// First query parameter named `name`.
    pub fn query_param(&self, name: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
    }

    /// Lower-cased `Content-Type`, empty when absent.
    pub fn content_type(&self) -> String {
        self.header("content-type")
            .unwrap_or_default()
            .to_ascii_lowercase()
    }
}

fn parse_query(query: &str) -> Vec<(String, String)> {
    url::form_urlencoded::parse(query.as_bytes())
        .into_owned()
        .collect()
}

/// An outgoing response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

#[derive(Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    usage: Option<serde_json::Value>,
}

impl HttpResponse {
    /// A response with no body; only the CORS headers are set.
    pub fn empty(status: u16) -> Self {
        let mut resp = Self {
            status,
            headers: Vec::new(),
            body: Vec::new(),
        };
        for (name, value) in CORS_HEADERS {
            resp.set_header(name, value);
        }
        resp
    }

    /// Serialize `body` as the JSON payload.
    pub fn json<T: Serialize>(status: u16, body: &T) -> Self {
        // Serializing our own error structs cannot fail; fall back to an empty object anyway.
        let bytes = serde_json::to_vec(body).unwrap_or_else(|_| b"{}".to_vec());
        let mut resp = Self::empty(status);
        resp.set_header("Content-Type", "application/json");
        resp.body = bytes;
        resp
    }

    /// A successful image response that must never be cached.
    pub fn image(bytes: Vec<u8>, format: ImageFormat) -> Self {
        let mut resp = Self::empty(200);
        resp.set_header("Content-Type", format.mime_type());
        resp.set_header("Content-Length", &bytes.len().to_string());
        resp.set_header("Cache-Control", "no-store");
        resp.body = bytes;
        resp
    }

    /// Map an error to the JSON shape clients see: `error`, plus `usage` for
    /// bad input or `message` carrying the underlying failure.
    pub fn from_error(err: &Error) -> Self {
        let body = match err {
            Error::BadInput => ErrorBody {
                error: "Missing or empty HTML content",
                message: None,
                usage: Some(crate::request::usage()),
            },
            Error::MethodNotAllowed => ErrorBody {
                error: "Method not allowed. Use POST.",
                message: None,
                usage: None,
            },
            Error::NotFound => ErrorBody {
                error: "Not found",
                message: None,
                usage: None,
            },
            Error::PayloadTooLarge(_) => ErrorBody {
                error: "Request body too large",
                message: Some(err.to_string()),
                usage: None,
            },
            _ => ErrorBody {
                error: "Failed to generate screenshot",
                message: Some(err.to_string()),
                usage: None,
            },
        };
        Self::json(err.status_code(), &body)
    }

    /// Replace any existing header of the same name.
    pub fn set_header(&mut self, name: &str, value: &str) {
        self.headers.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        self.headers.push((name.to_string(), value.to_string()));
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Parse the body as JSON (used by tests and logging).
    pub fn json_body(&self) -> Option<serde_json::Value> {
        serde_json::from_slice(&self.body).ok()
    }
}
