//! The per-request boundary: transport glue, dispatch, error mapping.
//!
//! `AppService` is the single place an [`Error`] becomes an HTTP response:
//! `NotFound` → 404, `Validation`/`BadRequest`/`Parse`/`Multipart` → 400,
//! everything else → 500, with the JSON envelope
//! `{"error": true, "message": "<text>"}`. Handler panics are caught here and
//! reported as internal errors instead of killing the connection coroutine.

use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Instant;

use may_minihttp::{HttpService, Request, Response};
use tracing::{error, info, warn};

use super::request::{parse_request, ParsedRequest};
use super::response::flush;
use crate::app::AppState;
use crate::context::{RequestContext, ResponseParts};
use crate::dispatcher::Dispatcher;
use crate::error::Error;

/// The transport-facing service over the frozen application state.
#[derive(Clone)]
pub struct AppService {
    state: Arc<AppState>,
    dispatcher: Dispatcher,
}

impl AppService {
    pub fn new(state: Arc<AppState>) -> Self {
        Self {
            dispatcher: Dispatcher::new(Arc::clone(&state)),
            state,
        }
    }

    pub fn state(&self) -> &Arc<AppState> {
        &self.state
    }

    /// Run one request through the pipeline and return the response parts.
    ///
    /// This is the transport-free seam: tests drive requests through it
    /// without binding a socket.
    pub fn process(&self, raw: ParsedRequest) -> ResponseParts {
        let method = raw.method.clone();
        let url = raw.url.clone();
        let start = Instant::now();

        let mut ctx = RequestContext::new(raw, Arc::clone(&self.state));
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.dispatcher.dispatch(&mut ctx)))
            .unwrap_or_else(|payload| {
                Err(Error::internal(format!(
                    "handler panicked: {}",
                    panic_message(&*payload)
                )))
            });

        let parts = match outcome {
            Ok(()) => {
                if !ctx.is_sent() {
                    warn!(%method, %url, "handler finished without sending a response");
                }
                ctx.into_parts()
            }
            Err(e) => {
                error!(%method, %url, status = e.status(), error = %e, "request failed");
                error_parts(&e)
            }
        };

        info!(
            %method,
            %url,
            status = parts.status_code(),
            latency_ms = start.elapsed().as_millis() as u64,
            "request handled"
        );
        parts
    }
}

fn error_parts(error: &Error) -> ResponseParts {
    ResponseParts {
        status: Some(error.status()),
        content_type: Some("application/json".to_string()),
        body: error.envelope().to_string().into_bytes(),
        committed: true,
        ..Default::default()
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}

impl HttpService for AppService {
    fn call(&mut self, req: Request, res: &mut Response) -> io::Result<()> {
        let raw = parse_request(req);
        let cors = self.state.cors;
        let parts = self.process(raw);
        flush(res, parts, cors);
        Ok(())
    }
}
