//! Static file and template stores.
//!
//! Both stores are populated once at startup from a directory tree and are
//! read-only during request handling. Template rendering is literal
//! `{{key}}` placeholder replacement, not a template language.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use serde_json::Value;

use crate::error::Error;

/// In-memory static file store keyed by URL path (`/css/site.css`).
#[derive(Debug, Clone, Default)]
pub struct StaticStore {
    files: HashMap<String, Vec<u8>>,
}

impl StaticStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file under `dir` recursively. Keys are the paths relative
    /// to `dir`, with a leading slash.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let mut store = Self::new();
        store.load_dir(dir.as_ref(), dir.as_ref())?;
        tracing::info!(files = store.files.len(), "static file store loaded");
        Ok(store)
    }

    fn load_dir(&mut self, base: &Path, dir: &Path) -> io::Result<()> {
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.is_dir() {
                self.load_dir(base, &path)?;
            } else {
                let rel: PathBuf = path.strip_prefix(base).unwrap_or(&path).to_path_buf();
                let key = format!("/{}", rel.to_string_lossy().replace('\\', "/"));
                self.files.insert(key, fs::read(&path)?);
            }
        }
        Ok(())
    }

    /// Insert a file directly, for programmatic setup and tests.
    pub fn insert(&mut self, path: &str, content: Vec<u8>) {
        let key = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };
        self.files.insert(key, content);
    }

    pub fn get(&self, path: &str) -> Option<&[u8]> {
        self.files.get(path).map(Vec::as_slice)
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Content type inferred from the file extension. Unknown extensions
    /// return `None` and the file is sent without a content-type override.
    pub fn content_type_for(path: &str) -> Option<&'static str> {
        if path.ends_with("favicon.ico") {
            return Some("image/x-icon");
        }
        let ext = path.rsplit('.').next()?;
        match ext {
            "svg" => Some("image/svg+xml"),
            "png" => Some("image/png"),
            "jpeg" => Some("image/jpeg"),
            "css" => Some("text/css"),
            "html" => Some("text/html"),
            "json" => Some("application/json"),
            _ => None,
        }
    }
}

/// Template store keyed by file stem (`layout.html` → `layout`).
#[derive(Debug, Clone, Default)]
pub struct TemplateStore {
    templates: HashMap<String, String>,
}

impl TemplateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load every file directly under `dir` as a template.
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> io::Result<Self> {
        let mut store = Self::new();
        for entry in fs::read_dir(dir)? {
            let entry = entry?;
            let path = entry.path();
            if !path.is_file() {
                continue;
            }
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_default();
            store.templates.insert(name, fs::read_to_string(&path)?);
        }
        tracing::info!(templates = store.templates.len(), "template store loaded");
        Ok(store)
    }

    pub fn insert(&mut self, name: &str, text: &str) {
        self.templates.insert(name.to_string(), text.to_string());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.templates.get(name).map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Render a template by replacing every `{{key}}` with the matching
    /// value from `vars`. Replacement is a literal substring pass: not
    /// recursive, no escaping, unmatched placeholders are left in place.
    pub fn render(&self, name: &str, vars: &Value) -> Result<String, Error> {
        let source = self
            .get(name)
            .ok_or_else(|| Error::not_found(format!("template `{name}` not found")))?;
        Ok(substitute(source, vars))
    }
}

/// Literal `{{key}}` substitution over `text`.
pub fn substitute(text: &str, vars: &Value) -> String {
    let mut out = text.to_string();
    if let Some(map) = vars.as_object() {
        for (key, value) in map {
            let placeholder = format!("{{{{{key}}}}}");
            let replacement = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            out = out.replace(&placeholder, &replacement);
        }
    }
    out
}
