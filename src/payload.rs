//! Request payload decoding.
//!
//! The decoder is a pure dispatch on the `Content-Type` header: the raw body
//! bytes become exactly one [`Payload`] variant, which is carried through the
//! pipeline so downstream code (schema validation, handlers) always operates
//! on a concrete shape instead of an opaque value.

use serde_json::Value;

use crate::error::Error;

/// Decoded request body, tagged by origin content type.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    /// Plain or unknown content type, decoded as UTF-8 text (lossy).
    Text(String),
    /// Raw bytes, for callers that opt out of decoding.
    Bytes(Vec<u8>),
    /// `application/json` body.
    Json(Value),
    /// `application/x-www-form-urlencoded` fields, in body order.
    Form(Vec<FormField>),
    /// `multipart/form-data` parts, in body order.
    Multipart(Vec<MultipartPart>),
}

impl Payload {
    /// The JSON value, when this payload is JSON.
    pub fn as_json(&self) -> Option<&Value> {
        match self {
            Payload::Json(v) => Some(v),
            _ => None,
        }
    }
}

/// A single urlencoded form field.
///
/// A `key=value` pair decodes both sides; a bare segment without `=` keeps
/// the raw segment as the name and its JSON interpretation as the value.
#[derive(Debug, Clone, PartialEq)]
pub struct FormField {
    pub name: String,
    pub value: Value,
}

/// A single multipart part. File parts carry the client-supplied filename;
/// plain fields do not.
#[derive(Debug, Clone, PartialEq)]
pub struct MultipartPart {
    pub name: String,
    pub value: String,
    pub filename: Option<String>,
}

/// Decode a request body according to its content type.
///
/// - `multipart/form-data` → [`Payload::Multipart`], `MULTIPART_ERROR` on
///   malformed boundary or framing
/// - `application/x-www-form-urlencoded` → [`Payload::Form`] (always a
///   sequence; empty body → empty sequence)
/// - `application/json` → [`Payload::Json`], `PARSE_ERROR` on invalid JSON
/// - anything else or absent → [`Payload::Text`]
pub fn decode(content_type: Option<&str>, body: &[u8]) -> Result<Payload, Error> {
    let ct = content_type.unwrap_or("").trim();
    if ct.starts_with("multipart/form-data") {
        let boundary = boundary_from(ct)?;
        return Ok(Payload::Multipart(parse_multipart(body, &boundary)?));
    }
    if ct.starts_with("application/x-www-form-urlencoded") {
        return Ok(Payload::Form(parse_urlencoded(body)));
    }
    if ct.starts_with("application/json") {
        let value: Value = serde_json::from_slice(body)
            .map_err(|e| Error::parse(format!("invalid JSON body: {e}")))?;
        return Ok(Payload::Json(value));
    }
    Ok(Payload::Text(String::from_utf8_lossy(body).into_owned()))
}

fn boundary_from(content_type: &str) -> Result<String, Error> {
    let boundary = content_type
        .split(';')
        .map(str::trim)
        .find_map(|part| part.strip_prefix("boundary="))
        .map(|b| b.trim_matches('"'))
        .filter(|b| !b.is_empty())
        .ok_or_else(|| Error::multipart("missing boundary parameter"))?;
    Ok(boundary.to_string())
}

/// Parse `application/x-www-form-urlencoded` bytes into an ordered field
/// sequence. Both sides of a `key=value` pair are percent-decoded; a segment
/// without `=` is interpreted as a raw JSON value.
pub fn parse_urlencoded(body: &[u8]) -> Vec<FormField> {
    let text = String::from_utf8_lossy(body);
    text.split('&')
        .filter(|seg| !seg.is_empty())
        .map(|seg| match seg.split_once('=') {
            Some((k, v)) => FormField {
                name: percent_decode(k),
                value: Value::String(percent_decode(v)),
            },
            None => {
                let decoded = percent_decode(seg);
                let value = serde_json::from_str(&decoded)
                    .unwrap_or_else(|_| Value::String(decoded.clone()));
                FormField {
                    name: decoded,
                    value,
                }
            }
        })
        .collect()
}

fn percent_decode(s: &str) -> String {
    let plus_normalized = s.replace('+', " ");
    urlencoding::decode(&plus_normalized)
        .map(|c| c.into_owned())
        .unwrap_or_else(|_| plus_normalized)
}

/// Parse a `multipart/form-data` body into its parts.
///
/// Each part's `Content-Disposition` header supplies the field name and, for
/// file parts, the filename. Part bodies are decoded as text; binary uploads
/// come through lossily, which matches the store-as-text contract.
pub fn parse_multipart(body: &[u8], boundary: &str) -> Result<Vec<MultipartPart>, Error> {
    let text = String::from_utf8_lossy(body);
    let delimiter = format!("--{boundary}");
    if !text.contains(&delimiter) {
        return Err(Error::multipart(format!(
            "boundary `{boundary}` not found in body"
        )));
    }

    let mut parts = Vec::new();
    for raw in text.split(&delimiter) {
        let raw = raw.trim_start_matches("\r\n");
        // Final delimiter leaves a trailing "--" segment; the preamble is empty.
        if raw.is_empty() || raw.starts_with("--") {
            continue;
        }
        let (header_block, value) = raw
            .split_once("\r\n\r\n")
            .or_else(|| raw.split_once("\n\n"))
            .ok_or_else(|| Error::multipart("part missing header/body separator"))?;

        let disposition = header_block
            .lines()
            .find(|l| l.to_ascii_lowercase().starts_with("content-disposition:"))
            .ok_or_else(|| Error::multipart("part missing Content-Disposition"))?;

        let name = disposition_param(disposition, "name")
            .ok_or_else(|| Error::multipart("part missing field name"))?;
        let filename = disposition_param(disposition, "filename");

        let value = value
            .strip_suffix("\r\n")
            .or_else(|| value.strip_suffix('\n'))
            .unwrap_or(value);

        parts.push(MultipartPart {
            name,
            value: value.to_string(),
            filename,
        });
    }
    Ok(parts)
}

fn disposition_param(header: &str, param: &str) -> Option<String> {
    header.split(';').map(str::trim).find_map(|piece| {
        let rest = piece.strip_prefix(param)?.trim_start();
        let rest = rest.strip_prefix('=')?.trim();
        Some(rest.trim_matches('"').to_string())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_body() {
        let p = decode(Some("application/json"), br#"{"a":1}"#).unwrap();
        assert_eq!(p.as_json(), Some(&json!({"a": 1})));
    }

    #[test]
    fn test_invalid_json_is_parse_error() {
        let err = decode(Some("application/json"), b"{nope").unwrap_err();
        assert!(err.to_string().starts_with("PARSE_ERROR"));
    }

    #[test]
    fn test_absent_content_type_is_text() {
        let p = decode(None, b"hello").unwrap();
        assert_eq!(p, Payload::Text("hello".to_string()));
    }

    #[test]
    fn test_urlencoded_pairs() {
        let fields = parse_urlencoded(b"name=foo%20bar&count=2");
        assert_eq!(fields.len(), 2);
        assert_eq!(fields[0].name, "name");
        assert_eq!(fields[0].value, json!("foo bar"));
        assert_eq!(fields[1].value, json!("2"));
    }

    #[test]
    fn test_urlencoded_bare_segment_parses_as_json() {
        let fields = parse_urlencoded(b"42");
        assert_eq!(fields.len(), 1);
        assert_eq!(fields[0].value, json!(42));
    }

    #[test]
    fn test_urlencoded_empty_body_is_empty_sequence() {
        assert!(parse_urlencoded(b"").is_empty());
    }

    #[test]
    fn test_multipart_text_and_file_fields() {
        let body = concat!(
            "--XBOUND\r\n",
            "Content-Disposition: form-data; name=\"name\"\r\n",
            "\r\n",
            "foo\r\n",
            "--XBOUND\r\n",
            "Content-Disposition: form-data; name=\"upload\"; filename=\"notes.txt\"\r\n",
            "Content-Type: text/plain\r\n",
            "\r\n",
            "line one\r\n",
            "--XBOUND--\r\n",
        );
        let p = decode(Some("multipart/form-data; boundary=XBOUND"), body.as_bytes()).unwrap();
        let parts = match p {
            Payload::Multipart(parts) => parts,
            other => panic!("expected multipart, got {other:?}"),
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "name");
        assert_eq!(parts[0].value, "foo");
        assert_eq!(parts[0].filename, None);
        assert_eq!(parts[1].name, "upload");
        assert_eq!(parts[1].value, "line one");
        assert_eq!(parts[1].filename.as_deref(), Some("notes.txt"));
    }

    #[test]
    fn test_multipart_missing_boundary_param() {
        let err = decode(Some("multipart/form-data"), b"whatever").unwrap_err();
        assert!(err.to_string().starts_with("MULTIPART_ERROR"));
    }

    #[test]
    fn test_multipart_wrong_boundary() {
        let err = parse_multipart(b"--OTHER\r\n", "XBOUND").unwrap_err();
        assert!(err.to_string().starts_with("MULTIPART_ERROR"));
    }
}
