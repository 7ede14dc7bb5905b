//! Per-request context: the uniform API handlers and middleware see.
//!
//! A [`RequestContext`] wraps the parsed transport request and owns the
//! outgoing response state (status, headers, content type, staged cookies)
//! until it is flushed by the response sender. Response state accumulates
//! across middleware and handler calls and is committed exactly once; the
//! already-sent guard turns a second send into a `SEND_ERROR` instead of a
//! double write.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde_json::Value;
use smallvec::SmallVec;

use crate::app::AppState;
use crate::error::Error;
use crate::payload::{decode, Payload};
use crate::schema::{record_from_pairs, ValidationSchemas};
use crate::server::request::ParsedRequest;

/// Maximum inline response headers before heap allocation.
pub const MAX_INLINE_HEADERS: usize = 8;

/// Stack-allocated header storage for staged response headers.
pub type HeaderVec = SmallVec<[(String, String); MAX_INLINE_HEADERS]>;

/// Resolved-route information the dispatcher binds onto the context before
/// invoking a handler. Validation of params/querystring/body consults it.
#[derive(Debug, Clone, Default)]
pub struct RouteBinding {
    /// The matched route key.
    pub key: String,
    /// Whether the route came from a parametrized table.
    pub parametrized: bool,
    /// Declared names for the positional params after the key.
    pub param_names: Vec<String>,
    /// The route's validation schemas.
    pub validation: ValidationSchemas,
}

/// Accumulated response state, flushed once by the response sender.
#[derive(Debug, Clone, Default)]
pub struct ResponseParts {
    pub status: Option<u16>,
    pub content_type: Option<String>,
    pub headers: HeaderVec,
    /// Staged `Set-Cookie` values, one header each.
    pub cookies: SmallVec<[String; 4]>,
    pub body: Vec<u8>,
    /// Set by the first successful send; guards against double writes.
    pub committed: bool,
}

impl ResponseParts {
    /// Effective status code (default 200).
    pub fn status_code(&self) -> u16 {
        self.status.unwrap_or(200)
    }
}

/// The augmented per-request object.
pub struct RequestContext {
    raw: ParsedRequest,
    state: Arc<AppState>,
    binding: Option<RouteBinding>,
    response: ResponseParts,
}

impl RequestContext {
    pub fn new(raw: ParsedRequest, state: Arc<AppState>) -> Self {
        Self {
            raw,
            state,
            binding: None,
            response: ResponseParts::default(),
        }
    }

    pub fn method(&self) -> &http::Method {
        &self.raw.method
    }

    /// Path component of the URL, without the query string.
    pub fn path(&self) -> &str {
        &self.raw.path
    }

    /// Full URL as received (path plus query string).
    pub fn url(&self) -> &str {
        &self.raw.url
    }

    /// Request header by name (lowercase lookup).
    pub fn header(&self, name: &str) -> Option<&str> {
        self.raw.header(name)
    }

    /// All request headers as a validation record.
    pub(crate) fn header_record(&self) -> Value {
        record_from_pairs(
            self.raw
                .headers
                .iter()
                .map(|(k, v)| (k.as_str(), v.as_str())),
        )
    }

    /// The process-wide dependency-injection value, loaded once at startup.
    pub fn container(&self) -> &Value {
        &self.state.container
    }

    pub(crate) fn bind_route(&mut self, binding: RouteBinding) {
        self.binding = Some(binding);
    }

    // ---- request data -----------------------------------------------------

    /// Path segments, dropping the empty leading segment: `/a/b/c` →
    /// `["a", "b", "c"]`.
    ///
    /// When the resolved route is parametrized and declares a `params`
    /// schema, the trailing segments (after the route key) are zipped with
    /// the route's declared param names and validated first.
    pub fn params(&self) -> Result<Vec<String>, Error> {
        let segments: Vec<String> = self
            .raw
            .path
            .split('/')
            .skip(1)
            .map(str::to_string)
            .collect();

        if let Some(binding) = &self.binding {
            if binding.parametrized {
                if let Some(schema) = &binding.validation.params {
                    let key_segments = binding.key.split('/').skip(1).count();
                    let trailing = segments.get(key_segments..).unwrap_or(&[]);
                    let record = record_from_pairs(
                        binding
                            .param_names
                            .iter()
                            .zip(trailing.iter())
                            .map(|(name, seg)| (name.as_str(), seg.as_str())),
                    );
                    schema.validate(&record)?;
                }
            }
        }
        Ok(segments)
    }

    /// Query string parsed into key/value pairs (split on `&` and `=`).
    ///
    /// Fails with `BAD_REQUEST` when the URL carries no query string. When
    /// the resolved route declares a `querystring` schema it is validated
    /// before returning.
    pub fn query(&self) -> Result<BTreeMap<String, String>, Error> {
        let qs = self
            .raw
            .query_string()
            .ok_or_else(|| Error::bad_request("query string not found"))?;
        let map: BTreeMap<String, String> = qs
            .split('&')
            .filter(|seg| !seg.is_empty())
            .map(|seg| match seg.split_once('=') {
                Some((k, v)) => (k.to_string(), v.to_string()),
                None => (seg.to_string(), String::new()),
            })
            .collect();

        if let Some(schema) = self
            .binding
            .as_ref()
            .and_then(|b| b.validation.querystring.as_ref())
        {
            let record =
                record_from_pairs(map.iter().map(|(k, v)| (k.as_str(), v.as_str())));
            schema.validate(&record)?;
        }
        Ok(map)
    }

    /// Single query value by name. Same failure modes as [`query`].
    ///
    /// [`query`]: RequestContext::query
    pub fn query_value(&self, name: &str) -> Result<Option<String>, Error> {
        Ok(self.query()?.get(name).cloned())
    }

    /// Decode the request body according to its content type.
    ///
    /// JSON bodies are additionally validated against the route's `body`
    /// schema when one is declared.
    pub fn payload(&self) -> Result<Payload, Error> {
        let payload = decode(self.raw.content_type(), &self.raw.body)?;
        if let Payload::Json(value) = &payload {
            if let Some(schema) = self
                .binding
                .as_ref()
                .and_then(|b| b.validation.body.as_ref())
            {
                schema.validate(value)?;
            }
        }
        Ok(payload)
    }

    // ---- cookies ----------------------------------------------------------

    /// All cookies from the raw `Cookie` header, in header order.
    pub fn cookies(&self) -> Vec<(String, String)> {
        self.raw
            .header("cookie")
            .map(|raw| {
                raw.split(';')
                    .filter_map(|pair| {
                        let mut parts = pair.trim().splitn(2, '=');
                        let name = parts.next()?.trim().to_string();
                        let value = parts.next().unwrap_or("").trim().to_string();
                        Some((name, value))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Cookie value by name: linear scan of the raw `Cookie` header,
    /// case-sensitive match, empty string when absent.
    pub fn cookie(&self, name: &str) -> String {
        self.cookies()
            .into_iter()
            .find(|(n, _)| n == name)
            .map(|(_, v)| v)
            .unwrap_or_default()
    }

    /// Stage a `Set-Cookie` header. Chainable.
    pub fn set_cookie(&mut self, cookie: &str) -> &mut Self {
        self.response.cookies.push(cookie.to_string());
        self
    }

    /// Stage deletion of a cookie by expiring it. Chainable.
    pub fn clear_cookie(&mut self, name: &str) -> &mut Self {
        self.response.cookies.push(format!(
            "{name}=; Max-Age=0; Expires=Thu, 01 Jan 1970 00:00:00 GMT"
        ));
        self
    }

    // ---- response staging -------------------------------------------------

    /// Stage the response content type; last write wins. Chainable.
    pub fn content_type(&mut self, ct: &str) -> &mut Self {
        self.response.content_type = Some(ct.to_string());
        self
    }

    /// Stage the response status; last write wins. Chainable.
    pub fn status(&mut self, code: u16) -> &mut Self {
        self.response.status = Some(code);
        self
    }

    /// Stage an arbitrary response header.
    pub fn set_header(&mut self, name: &str, value: &str) -> &mut Self {
        self.response
            .headers
            .retain(|(n, _)| !n.eq_ignore_ascii_case(name));
        self.response
            .headers
            .push((name.to_string(), value.to_string()));
        self
    }

    // ---- send family ------------------------------------------------------

    /// The terminal write. Serializes `payload` and commits the response:
    ///
    /// - `None` → the literal text `undefined`
    /// - `String` → passed through
    /// - `Array`/`Object` → JSON text
    /// - `Number`/`Bool`/`Null` → string form
    ///
    /// Status resolves from a previously staged [`status`] call (default
    /// 200). A second send on the same context fails with `SEND_ERROR`.
    ///
    /// [`status`]: RequestContext::status
    pub fn send(&mut self, payload: Option<Value>) -> Result<(), Error> {
        self.send_with(payload, None, &[])
    }

    /// [`send`] with an explicit status and extra headers.
    ///
    /// [`send`]: RequestContext::send
    pub fn send_with(
        &mut self,
        payload: Option<Value>,
        status: Option<u16>,
        headers: &[(String, String)],
    ) -> Result<(), Error> {
        let body = serialize_payload(payload)?;
        self.commit(body, status, headers)
    }

    /// Binary pass-through send, used for static files and proxied bodies.
    pub fn send_bytes(&mut self, body: Vec<u8>) -> Result<(), Error> {
        self.commit(body, None, &[])
    }

    /// `send` with the content type forced to `application/json`.
    pub fn json(&mut self, payload: Value) -> Result<(), Error> {
        self.content_type("application/json");
        self.send(Some(payload))
    }

    /// Redirect: `Location` header plus status (default 302), no body
    /// serialization.
    pub fn redirect(&mut self, url: &str, status: Option<u16>) -> Result<(), Error> {
        self.set_header("Location", url);
        self.commit(Vec::new(), Some(status.unwrap_or(302)), &[])
    }

    /// Proxy the request to `url` with the same method and stream the
    /// upstream body back as this response. The upstream status and content
    /// type are forwarded.
    pub fn proxy(&mut self, url: &str) -> Result<(), Error> {
        let client = reqwest::blocking::Client::new();
        let resp = client
            .request(self.raw.method.clone(), url)
            .send()
            .map_err(|e| Error::internal(format!("proxy request failed: {e}")))?;
        let status = resp.status().as_u16();
        let upstream_ct = resp
            .headers()
            .get(http::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = resp
            .bytes()
            .map_err(|e| Error::internal(format!("proxy body read failed: {e}")))?
            .to_vec();

        if let Some(ct) = upstream_ct {
            self.content_type(&ct);
        }
        self.commit(body, Some(status), &[])
    }

    /// Render a template by name with `{{key}}` substitution and send it
    /// as HTML.
    pub fn view(&mut self, template: &str, vars: Option<&Value>) -> Result<(), Error> {
        let html = self
            .state
            .templates
            .render(template, vars.unwrap_or(&Value::Null))?;
        self.content_type("text/html");
        self.send(Some(Value::String(html)))
    }

    fn commit(
        &mut self,
        body: Vec<u8>,
        status: Option<u16>,
        headers: &[(String, String)],
    ) -> Result<(), Error> {
        if self.response.committed {
            return Err(Error::send("response already sent"));
        }
        if let Some(code) = status {
            self.response.status = Some(code);
        }
        for (name, value) in headers {
            self.response.headers.push((name.clone(), value.clone()));
        }
        self.response.body = body;
        self.response.committed = true;
        Ok(())
    }

    /// Whether a send-family method has committed the response.
    pub fn is_sent(&self) -> bool {
        self.response.committed
    }

    /// Take the accumulated response state for flushing.
    pub fn into_parts(self) -> ResponseParts {
        self.response
    }

    /// Inspect the staged response (primarily for tests).
    pub fn parts(&self) -> &ResponseParts {
        &self.response
    }
}

fn serialize_payload(payload: Option<Value>) -> Result<Vec<u8>, Error> {
    Ok(match payload {
        None => b"undefined".to_vec(),
        Some(Value::String(s)) => s.into_bytes(),
        Some(v @ Value::Array(_)) | Some(v @ Value::Object(_)) => serde_json::to_vec(&v)
            .map_err(|e| Error::send(format!("payload serialization failed: {e}")))?,
        Some(Value::Number(n)) => n.to_string().into_bytes(),
        Some(Value::Bool(b)) => b.to_string().into_bytes(),
        Some(Value::Null) => b"null".to_vec(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{FieldKind, FieldRule, Schema};
    use http::Method;
    use serde_json::json;

    fn ctx(method: Method, url: &str) -> RequestContext {
        let raw = ParsedRequest::new(method, url, Vec::new(), Vec::new());
        RequestContext::new(raw, Arc::new(AppState::default()))
    }

    fn ctx_with_headers(url: &str, headers: Vec<(String, String)>) -> RequestContext {
        let raw = ParsedRequest::new(Method::GET, url, headers, Vec::new());
        RequestContext::new(raw, Arc::new(AppState::default()))
    }

    #[test]
    fn test_params_splits_path() {
        let ctx = ctx(Method::GET, "/a/b/c");
        assert_eq!(ctx.params().unwrap(), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_params_validates_against_schema() {
        let mut ctx = ctx(Method::GET, "/users/not-a-number");
        ctx.bind_route(RouteBinding {
            key: "/users".to_string(),
            parametrized: true,
            param_names: vec!["id".to_string()],
            validation: ValidationSchemas {
                params: Some(Schema::new().field("id", FieldRule::required(FieldKind::Number))),
                ..Default::default()
            },
        });
        let err = ctx.params().unwrap_err();
        assert!(err.to_string().starts_with("VALIDATION_ERROR"));

        let mut ctx = ctx_with_headers("/users/42", Vec::new());
        ctx.bind_route(RouteBinding {
            key: "/users".to_string(),
            parametrized: true,
            param_names: vec!["id".to_string()],
            validation: ValidationSchemas {
                params: Some(Schema::new().field("id", FieldRule::required(FieldKind::Number))),
                ..Default::default()
            },
        });
        assert_eq!(ctx.params().unwrap(), vec!["users", "42"]);
    }

    #[test]
    fn test_query_parses_pairs() {
        let ctx = ctx(Method::GET, "/p?x=1&y=2");
        let q = ctx.query().unwrap();
        assert_eq!(q.get("x").map(String::as_str), Some("1"));
        assert_eq!(q.get("y").map(String::as_str), Some("2"));
        assert_eq!(ctx.query_value("x").unwrap().as_deref(), Some("1"));
    }

    #[test]
    fn test_query_without_querystring_fails() {
        let ctx = ctx(Method::GET, "/p");
        let err = ctx.query().unwrap_err();
        assert!(err.to_string().starts_with("BAD_REQUEST"));
    }

    #[test]
    fn test_cookie_scan_is_case_sensitive() {
        let ctx = ctx_with_headers(
            "/",
            vec![("cookie".to_string(), "session=abc; Theme=dark".to_string())],
        );
        assert_eq!(ctx.cookie("session"), "abc");
        assert_eq!(ctx.cookie("Theme"), "dark");
        assert_eq!(ctx.cookie("theme"), "");
        assert_eq!(ctx.cookie("missing"), "");
    }

    #[test]
    fn test_send_serialization_rules() {
        let mut c = ctx(Method::GET, "/");
        c.send(None).unwrap();
        assert_eq!(c.parts().body, b"undefined");

        let mut c = ctx(Method::GET, "/");
        c.send(Some(json!([1, 2, 3]))).unwrap();
        assert_eq!(c.parts().body, b"[1,2,3]");

        let mut c = ctx(Method::GET, "/");
        c.send(Some(json!(42))).unwrap();
        assert_eq!(c.parts().body, b"42");

        let mut c = ctx(Method::GET, "/");
        c.send(Some(json!("raw text"))).unwrap();
        assert_eq!(c.parts().body, b"raw text");
    }

    #[test]
    fn test_double_send_is_guarded() {
        let mut c = ctx(Method::GET, "/");
        c.send(Some(json!("one"))).unwrap();
        let err = c.send(Some(json!("two"))).unwrap_err();
        assert!(err.to_string().starts_with("SEND_ERROR"));
        assert_eq!(c.parts().body, b"one");
    }

    #[test]
    fn test_status_last_write_wins() {
        let mut c = ctx(Method::GET, "/");
        c.status(201).status(202);
        c.send(Some(json!("ok"))).unwrap();
        assert_eq!(c.parts().status_code(), 202);
    }

    #[test]
    fn test_redirect_sets_location_and_status() {
        let mut c = ctx(Method::GET, "/old");
        c.redirect("/new", None).unwrap();
        assert_eq!(c.parts().status_code(), 302);
        assert!(c
            .parts()
            .headers
            .iter()
            .any(|(n, v)| n == "Location" && v == "/new"));
    }

    #[test]
    fn test_set_cookie_chains_and_stages() {
        let mut c = ctx(Method::GET, "/");
        c.set_cookie("a=1").set_cookie("b=2").clear_cookie("old");
        assert_eq!(c.parts().cookies.len(), 3);
        assert!(c.parts().cookies[2].starts_with("old=;"));
    }

    #[test]
    fn test_view_renders_template() {
        let mut state = AppState::default();
        state.templates.insert("hello", "<h1>{{name}}</h1>");
        let raw = ParsedRequest::new(Method::GET, "/hello", Vec::new(), Vec::new());
        let mut c = RequestContext::new(raw, Arc::new(state));
        c.view("hello", Some(&json!({ "name": "World" }))).unwrap();
        assert_eq!(c.parts().body, b"<h1>World</h1>");
        assert_eq!(c.parts().content_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn test_json_payload_validated_against_body_schema() {
        let raw = ParsedRequest::new(
            Method::POST,
            "/items",
            vec![("content-type".to_string(), "application/json".to_string())],
            br#"{"a":1}"#.to_vec(),
        );
        let mut c = RequestContext::new(raw, Arc::new(AppState::default()));
        c.bind_route(RouteBinding {
            key: "/items".to_string(),
            parametrized: false,
            param_names: Vec::new(),
            validation: ValidationSchemas {
                body: Some(Schema::new().field("a", FieldRule::required(FieldKind::Number))),
                ..Default::default()
            },
        });
        assert!(c.payload().is_ok());

        let raw = ParsedRequest::new(
            Method::POST,
            "/items",
            vec![("content-type".to_string(), "application/json".to_string())],
            br#"{"a":1}"#.to_vec(),
        );
        let mut c = RequestContext::new(raw, Arc::new(AppState::default()));
        c.bind_route(RouteBinding {
            key: "/items".to_string(),
            parametrized: false,
            param_names: Vec::new(),
            validation: ValidationSchemas {
                body: Some(Schema::new().field("b", FieldRule::required(FieldKind::Number))),
                ..Default::default()
            },
        });
        let err = c.payload().unwrap_err();
        assert!(err.to_string().starts_with("VALIDATION_ERROR"));
    }
}
