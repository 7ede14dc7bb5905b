use std::io::Read;

use http::Method;
use may_minihttp::Request;
use tracing::{debug, info, warn};

/// Parsed HTTP request data handed to the request context.
///
/// The body is kept as raw bytes; decoding happens lazily in the context,
/// which knows the matched route and its schemas.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequest {
    pub method: Method,
    /// Full URL as received (path plus query string).
    pub url: String,
    /// Path component only.
    pub path: String,
    /// Headers with lowercase names, in wire order.
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl ParsedRequest {
    pub fn new(method: Method, url: &str, headers: Vec<(String, String)>, body: Vec<u8>) -> Self {
        let path = url.split('?').next().unwrap_or("/").to_string();
        Self {
            method,
            url: url.to_string(),
            path,
            headers,
            body,
        }
    }

    /// First header with this name; lookup is lowercase.
    pub fn header(&self, name: &str) -> Option<&str> {
        let name = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, v)| v.as_str())
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    /// Everything after the first `?`, or `None` when the URL has none.
    pub fn query_string(&self) -> Option<&str> {
        self.url.split_once('?').map(|(_, qs)| qs)
    }
}

/// Extract method, URL, headers and body from a `may_minihttp::Request`.
pub fn parse_request(req: Request) -> ParsedRequest {
    let method = match Method::from_bytes(req.method().as_bytes()) {
        Ok(m) => m,
        Err(_) => {
            warn!(method = %req.method(), "unrecognized HTTP method, treating as GET");
            Method::GET
        }
    };
    let url = req.path().to_string();

    let headers: Vec<(String, String)> = req
        .headers()
        .iter()
        .map(|h| {
            (
                h.name.to_ascii_lowercase(),
                String::from_utf8_lossy(h.value).to_string(),
            )
        })
        .collect();

    debug!(
        header_count = headers.len(),
        size_bytes = headers.iter().map(|(k, v)| k.len() + v.len()).sum::<usize>(),
        "headers extracted"
    );

    let mut body = Vec::new();
    if let Err(e) = req.body().read_to_end(&mut body) {
        warn!(error = %e, "request body read failed, continuing with empty body");
        body.clear();
    }

    let parsed = ParsedRequest::new(method, &url, headers, body);
    info!(
        method = %parsed.method,
        path = %parsed.path,
        body_bytes = parsed.body.len(),
        "request parsed"
    );
    parsed
}
