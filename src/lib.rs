//! # Pagoda
//!
//! **Pagoda** is a convention-driven HTTP application framework for Rust,
//! built on the `may` coroutine runtime.
//!
//! ## Overview
//!
//! A Pagoda application is assembled from handler units — controllers (API
//! endpoints), pages (rendered components), and middleware — registered into
//! immutable route tables at startup. The framework owns the request-handling
//! pipeline: it parses the incoming request, runs the middleware chain,
//! resolves exactly one terminal handler, augments the request with a uniform
//! context API, and writes the response exactly once.
//!
//! Route discovery from a project's file layout is the job of an external
//! loader; this crate exposes the registration surface the loader (or plain
//! code) drives.
//!
//! ## Architecture
//!
//! - **[`schema`]** - Declarative field schemas validating headers, params,
//!   query strings and JSON bodies
//! - **[`payload`]** - Content-type driven body decoding into a tagged union
//! - **[`context`]** - The per-request object handlers see: request data,
//!   cookies, and the send family of response methods
//! - **[`routes`]** - The four route tables and the `Controller`/`Page`/
//!   `Renderer` registration traits
//! - **[`dispatcher`]** - Terminal-on-first-match handler resolution
//! - **[`middleware`]** - The chain runner with explicit continuations
//! - **[`static_files`]** - In-memory static file and template stores
//! - **[`server`]** - Transport glue over `may_minihttp`: request parsing,
//!   the per-request error boundary, response flushing
//! - **[`app`]** - The builder that freezes everything into shared state
//! - **[`config`]** - Optional YAML startup configuration
//! - **[`telemetry`]** - Tracing subscriber setup (plain or JSON output)
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//! use pagoda::{App, FnController};
//! use serde_json::json;
//!
//! # fn main() -> anyhow::Result<()> {
//! let handle = App::new()
//!     .controller(
//!         "/hello",
//!         Arc::new(FnController::new(|ctx| ctx.json(json!({ "hello": "world" })))),
//!     )?
//!     .serve()?;
//! handle.join().ok();
//! # Ok(())
//! # }
//! ```
//!
//! ## Request Handling
//!
//! Every request flows through the same pipeline: parse → middleware chain →
//! route resolution (exact controllers, parametrized controllers, exact
//! pages, parametrized pages, static files, in that order) → response flush.
//! Resolution is terminal on first match, and an exact match always beats a
//! parametrized one. Errors anywhere in the pipeline propagate to a single
//! boundary that maps them to an HTTP status and the JSON envelope
//! `{"error": true, "message": "..."}`.
//!
//! ## Runtime Considerations
//!
//! Pagoda uses the `may` coroutine runtime, not tokio. Each connection runs
//! in a lightweight coroutine; handlers are plain blocking functions and
//! outbound calls (such as [`RequestContext::proxy`]) use blocking clients.
//! Route tables, stores and the container value are frozen behind an `Arc`
//! before the server starts, so request handling never takes a lock.
//!
//! [`RequestContext::proxy`]: context::RequestContext::proxy

pub mod app;
pub mod config;
pub mod context;
pub mod dispatcher;
pub mod error;
pub mod middleware;
pub mod payload;
pub mod routes;
pub mod schema;
pub mod server;
pub mod static_files;
pub mod telemetry;

pub use app::{App, AppState};
pub use config::AppConfig;
pub use context::{RequestContext, ResponseParts};
pub use error::{Error, ErrorKind};
pub use middleware::{FnMiddleware, Middleware, MiddlewareOptions, Next};
pub use payload::Payload;
pub use routes::{
    ComponentPage, Controller, FnController, HandlerOptions, Page, PageOptions, Renderer,
};
pub use schema::{FieldKind, FieldRule, Schema, ValidationSchemas};
pub use server::{AppService, HttpServer, ParsedRequest, ServerHandle};
pub use telemetry::{init_tracing, LogFormat};
