//! Response flushing: writes accumulated [`ResponseParts`] to the transport
//! exactly once.

use chrono::Utc;
use may_minihttp::Response;

use crate::context::ResponseParts;

const VERSION_HEADER: &str = concat!("X-Powered-By: Pagoda/", env!("CARGO_PKG_VERSION"));

pub fn status_reason(status: u16) -> &'static str {
    match status {
        200 => "OK",
        201 => "Created",
        204 => "No Content",
        301 => "Moved Permanently",
        302 => "Found",
        303 => "See Other",
        307 => "Temporary Redirect",
        400 => "Bad Request",
        401 => "Unauthorized",
        403 => "Forbidden",
        404 => "Not Found",
        418 => "I'm a teapot",
        500 => "Internal Server Error",
        502 => "Bad Gateway",
        _ => "OK",
    }
}

/// Current time in the RFC 7231 IMF-fixdate format (`Date` header).
fn http_date() -> String {
    Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

// may_minihttp takes `&'static str` headers, so dynamic values are leaked.
// Response headers are small and bounded per request.
fn push_header(res: &mut Response, name: &str, value: &str) {
    let header = format!("{name}: {value}").into_boxed_str();
    res.header(Box::leak(header));
}

/// Write status line, headers and body to the transport.
///
/// Always emits `Connection: keep-alive`, `Date` and the framework version
/// header; `Set-Cookie` once per staged cookie; wildcard CORS headers when
/// `cors` is enabled.
pub fn flush(res: &mut Response, parts: ResponseParts, cors: bool) {
    let status = parts.status_code();
    res.status_code(status as usize, status_reason(status));

    if let Some(ct) = &parts.content_type {
        push_header(res, "Content-Type", ct);
    }
    for (name, value) in &parts.headers {
        push_header(res, name, value);
    }
    for cookie in &parts.cookies {
        push_header(res, "Set-Cookie", cookie);
    }

    res.header("Connection: keep-alive");
    push_header(res, "Date", &http_date());
    res.header(VERSION_HEADER);

    if cors {
        res.header("Access-Control-Allow-Origin: *");
        res.header("Access-Control-Allow-Methods: *");
        res.header("Access-Control-Allow-Headers: *");
    }

    res.body_vec(parts.body);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_reason() {
        assert_eq!(status_reason(200), "OK");
        assert_eq!(status_reason(302), "Found");
        assert_eq!(status_reason(404), "Not Found");
        assert_eq!(status_reason(500), "Internal Server Error");
        assert_eq!(status_reason(299), "OK");
    }

    #[test]
    fn test_http_date_shape() {
        let date = http_date();
        assert!(date.ends_with(" GMT"));
        // "Mon, 01 Jan 2024 00:00:00 GMT"
        assert_eq!(date.len(), 29);
    }

    #[test]
    fn test_version_header_carries_crate_version() {
        assert!(VERSION_HEADER.starts_with("X-Powered-By: Pagoda/"));
    }
}
