//! Application assembly: the frozen per-process state and the builder that
//! produces it.
//!
//! An external loader (or plain code) registers handlers through [`App`];
//! [`App::serve`] freezes everything into an [`AppState`] behind an `Arc` and
//! hands it to the transport. Nothing mutates the state after that point, so
//! request handling never takes a lock.

use std::path::Path;
use std::sync::Arc;

use serde_json::Value;

use crate::config::AppConfig;
use crate::middleware::Middleware;
use crate::routes::{Controller, Page, Renderer, RouteTables};
use crate::server::{AppService, HttpServer, ServerHandle};
use crate::static_files::{StaticStore, TemplateStore};

/// Everything a request needs, immutable after startup.
pub struct AppState {
    pub tables: RouteTables,
    /// Middleware in registration order.
    pub middlewares: Vec<Arc<dyn Middleware>>,
    pub statics: StaticStore,
    pub templates: TemplateStore,
    /// Opaque page renderer; required only when pages are registered.
    pub renderer: Option<Arc<dyn Renderer>>,
    /// Process-wide dependency-injection value, `Null` when unconfigured.
    pub container: Value,
    /// Emit wildcard CORS headers on every response.
    pub cors: bool,
    /// Text served at `/` when no static `index.html` exists.
    pub banner: String,
}

impl Default for AppState {
    fn default() -> Self {
        Self {
            tables: RouteTables::new(),
            middlewares: Vec::new(),
            statics: StaticStore::new(),
            templates: TemplateStore::new(),
            renderer: None,
            container: Value::Null,
            cors: false,
            banner: format!("Pagoda v{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Builder assembling an application before it starts serving.
///
/// Every filesystem-backed step (`static_dir`, `templates_dir`,
/// `container_file`) is non-fatal: a missing or unreadable path is logged and
/// startup continues with that store empty. Handler registration errors
/// (duplicate keys) are programming mistakes and do fail startup.
pub struct App {
    config: AppConfig,
    state: AppState,
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}

impl App {
    pub fn new() -> Self {
        Self::with_config(AppConfig::default())
    }

    /// Build from an explicit config; directory and container paths named in
    /// it are loaded immediately, each step non-fatal.
    pub fn with_config(config: AppConfig) -> Self {
        let mut app = Self {
            state: AppState {
                cors: config.cors,
                ..AppState::default()
            },
            config,
        };
        if let Some(dir) = app.config.static_dir.clone() {
            app = app.static_dir(&dir);
        }
        if let Some(dir) = app.config.templates_dir.clone() {
            app = app.templates_dir(&dir);
        }
        if let Some(path) = app.config.container.clone() {
            app = app.container_file(&path);
        }
        app
    }

    /// Build from a YAML config file, falling back to defaults when the file
    /// is missing or invalid.
    pub fn from_config_file<P: AsRef<Path>>(path: P) -> Self {
        Self::with_config(AppConfig::load_or_default(path))
    }

    // ---- registration -----------------------------------------------------

    pub fn controller(
        mut self,
        key: &str,
        controller: Arc<dyn Controller>,
    ) -> anyhow::Result<Self> {
        self.state.tables.register_controller(key, controller)?;
        Ok(self)
    }

    pub fn parametrized_controller(
        mut self,
        key: &str,
        controller: Arc<dyn Controller>,
    ) -> anyhow::Result<Self> {
        self.state
            .tables
            .register_parametrized_controller(key, controller)?;
        Ok(self)
    }

    pub fn page(mut self, key: &str, page: Arc<dyn Page>) -> anyhow::Result<Self> {
        self.state.tables.register_page(key, page)?;
        Ok(self)
    }

    pub fn parametrized_page(mut self, key: &str, page: Arc<dyn Page>) -> anyhow::Result<Self> {
        self.state.tables.register_parametrized_page(key, page)?;
        Ok(self)
    }

    /// Append a middleware; the chain runs in registration order.
    pub fn middleware(mut self, middleware: Arc<dyn Middleware>) -> Self {
        tracing::info!(key = middleware.key(), "middleware registered");
        self.state.middlewares.push(middleware);
        self
    }

    pub fn renderer(mut self, renderer: Arc<dyn Renderer>) -> Self {
        self.state.renderer = Some(renderer);
        self
    }

    // ---- filesystem-backed state (non-fatal) ------------------------------

    pub fn static_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        match StaticStore::from_dir(dir.as_ref()) {
            Ok(store) => self.state.statics = store,
            Err(e) => tracing::warn!(
                dir = %dir.as_ref().display(),
                error = %e,
                "static dir not loaded"
            ),
        }
        self
    }

    pub fn templates_dir<P: AsRef<Path>>(mut self, dir: P) -> Self {
        match TemplateStore::from_dir(dir.as_ref()) {
            Ok(store) => self.state.templates = store,
            Err(e) => tracing::warn!(
                dir = %dir.as_ref().display(),
                error = %e,
                "templates dir not loaded"
            ),
        }
        self
    }

    /// Load the container value from a YAML or JSON file.
    pub fn container_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        let loaded = std::fs::read_to_string(path.as_ref())
            .map_err(anyhow::Error::from)
            .and_then(|text| serde_yaml::from_str::<Value>(&text).map_err(Into::into));
        match loaded {
            Ok(value) => self.state.container = value,
            Err(e) => tracing::warn!(
                path = %path.as_ref().display(),
                error = %e,
                "container not loaded"
            ),
        }
        self
    }

    pub fn container(mut self, value: Value) -> Self {
        self.state.container = value;
        self
    }

    pub fn cors(mut self, enabled: bool) -> Self {
        self.state.cors = enabled;
        self
    }

    // ---- assembly ---------------------------------------------------------

    /// Freeze the state and build the transport service without binding a
    /// socket. This is the seam tests drive requests through.
    pub fn into_service(self) -> AppService {
        let state = Arc::new(self.state);
        if state.tables.is_empty() {
            tracing::warn!("no handlers registered, only static files will be served");
        }
        AppService::new(state)
    }

    /// Freeze the state, bind the configured address and start accepting
    /// connections. Bind failure is fatal; everything before it was not.
    pub fn serve(self) -> anyhow::Result<ServerHandle> {
        let addr = self.config.addr();
        let banner = self.state.banner.clone();
        let service = self.into_service();
        let handle = HttpServer(service).start(&addr)?;
        tracing::info!(%addr, %banner, "server started");
        Ok(handle)
    }
}
