//! Middleware and the chain runner.
//!
//! When at least one middleware is registered, every request passes through
//! the whole chain before routing; there is no per-route scoping. Middleware
//! run in registration order (the loader enumerates files, so that order is
//! file order). Each middleware receives the context and an explicit
//! continuation; routing runs once after the entire chain has continued.

use std::sync::Arc;

use http::Method;

use crate::context::RequestContext;
use crate::error::Error;
use crate::schema::Schema;

/// Constraints a middleware module may declare.
#[derive(Debug, Clone, Default)]
pub struct MiddlewareOptions {
    /// Allowed HTTP methods; empty means all.
    pub methods: Vec<Method>,
    /// Header schema validated before the middleware runs.
    pub headers: Option<Schema>,
}

/// Explicit continuation handed to each middleware.
///
/// A middleware either continues the chain (`proceed`), fails it (`fail`),
/// or does neither, in which case it is expected to have sent a response
/// itself and routing is skipped.
#[derive(Debug, Default)]
pub struct Next {
    outcome: Option<Result<(), Error>>,
}

impl Next {
    pub fn new() -> Self {
        Self::default()
    }

    /// Continue to the next middleware (and eventually routing).
    pub fn proceed(&mut self) {
        self.outcome = Some(Ok(()));
    }

    /// Abort the chain with an error.
    pub fn fail(&mut self, error: Error) {
        self.outcome = Some(Err(error));
    }

    fn take(self) -> Option<Result<(), Error>> {
        self.outcome
    }
}

/// A middleware unit: a keyed function of the context and a continuation.
pub trait Middleware: Send + Sync {
    /// Identifying key (the loader uses the source filename). Errors raised
    /// through the continuation are annotated with this key when unlabeled.
    fn key(&self) -> &str;

    fn options(&self) -> Option<&MiddlewareOptions> {
        None
    }

    fn call(&self, ctx: &mut RequestContext, next: &mut Next) -> Result<(), Error>;
}

/// Adapter so closures register as middleware.
pub struct FnMiddleware<F> {
    key: String,
    func: F,
    options: Option<MiddlewareOptions>,
}

impl<F> FnMiddleware<F>
where
    F: Fn(&mut RequestContext, &mut Next) -> Result<(), Error> + Send + Sync,
{
    pub fn new(key: &str, func: F) -> Self {
        Self {
            key: key.to_string(),
            func,
            options: None,
        }
    }

    pub fn with_options(key: &str, func: F, options: MiddlewareOptions) -> Self {
        Self {
            key: key.to_string(),
            func,
            options: Some(options),
        }
    }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: Fn(&mut RequestContext, &mut Next) -> Result<(), Error> + Send + Sync,
{
    fn key(&self) -> &str {
        &self.key
    }

    fn options(&self) -> Option<&MiddlewareOptions> {
        self.options.as_ref()
    }

    fn call(&self, ctx: &mut RequestContext, next: &mut Next) -> Result<(), Error> {
        (self.func)(ctx, next)
    }
}

/// Result of running the whole chain.
#[derive(Debug, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Every middleware continued; routing should run.
    Continue,
    /// A middleware finished the response itself; skip routing.
    Halt,
}

/// Run every registered middleware in order against this request.
///
/// Per middleware: the method constraint is checked first (`NOT_FOUND` on
/// mismatch), then the header schema (`VALIDATION_ERROR` on mismatch);
/// either failure aborts the chain. A continuation invoked with an error
/// propagates it, annotated with the middleware's key when the message does
/// not already carry it.
pub fn run_chain(
    middlewares: &[Arc<dyn Middleware>],
    ctx: &mut RequestContext,
) -> Result<ChainOutcome, Error> {
    for mw in middlewares {
        if let Some(options) = mw.options() {
            if !options.methods.is_empty() && !options.methods.contains(ctx.method()) {
                return Err(Error::not_found(format!(
                    "{}: method {} not allowed",
                    mw.key(),
                    ctx.method()
                )));
            }
            if let Some(schema) = &options.headers {
                schema.validate(&ctx.header_record()).map_err(|e| {
                    Error::new(e.kind, format!("{}: {}", mw.key(), e.message))
                })?;
            }
        }

        tracing::debug!(middleware = mw.key(), "middleware invoked");
        let mut next = Next::new();
        mw.call(ctx, &mut next)?;
        match next.take() {
            Some(Ok(())) => {}
            Some(Err(e)) => {
                let message = if e.message.contains(mw.key()) {
                    e.message
                } else {
                    format!("{}: {}", mw.key(), e.message)
                };
                return Err(Error::new(e.kind, message));
            }
            // Continuation never invoked: the middleware owned the response.
            None => return Ok(ChainOutcome::Halt),
        }
    }
    Ok(ChainOutcome::Continue)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::AppState;
    use crate::schema::{FieldKind, FieldRule};
    use crate::server::request::ParsedRequest;
    use serde_json::json;

    fn ctx(method: Method, headers: Vec<(String, String)>) -> RequestContext {
        let raw = ParsedRequest::new(method, "/x", headers, Vec::new());
        RequestContext::new(raw, Arc::new(AppState::default()))
    }

    fn passthrough(key: &str) -> Arc<dyn Middleware> {
        Arc::new(FnMiddleware::new(key, |_ctx, next| {
            next.proceed();
            Ok(())
        }))
    }

    #[test]
    fn test_chain_continues_when_all_proceed() {
        let chain = vec![passthrough("a.rs"), passthrough("b.rs")];
        let mut ctx = ctx(Method::GET, Vec::new());
        assert_eq!(run_chain(&chain, &mut ctx).unwrap(), ChainOutcome::Continue);
    }

    #[test]
    fn test_continuation_error_aborts_and_is_annotated() {
        let failing: Arc<dyn Middleware> = Arc::new(FnMiddleware::new("auth.rs", |_ctx, next| {
            next.fail(Error::validation("token expired"));
            Ok(())
        }));
        let chain = vec![passthrough("a.rs"), failing, passthrough("b.rs")];
        let mut ctx = ctx(Method::GET, Vec::new());
        let err = run_chain(&chain, &mut ctx).unwrap_err();
        assert!(err.to_string().contains("auth.rs"));
        assert!(err.to_string().contains("token expired"));
    }

    #[test]
    fn test_method_constraint_violation_is_not_found() {
        let restricted: Arc<dyn Middleware> = Arc::new(FnMiddleware::with_options(
            "post_only.rs",
            |_ctx, next| {
                next.proceed();
                Ok(())
            },
            MiddlewareOptions {
                methods: vec![Method::POST],
                ..Default::default()
            },
        ));
        let mut ctx = ctx(Method::GET, Vec::new());
        let err = run_chain(&[restricted], &mut ctx).unwrap_err();
        assert!(err.to_string().starts_with("NOT_FOUND"));
    }

    #[test]
    fn test_header_schema_violation_aborts_chain() {
        let restricted: Arc<dyn Middleware> = Arc::new(FnMiddleware::with_options(
            "api_key.rs",
            |_ctx, next| {
                next.proceed();
                Ok(())
            },
            MiddlewareOptions {
                methods: Vec::new(),
                headers: Some(
                    Schema::new().field("x-api-key", FieldRule::required(FieldKind::String)),
                ),
            },
        ));
        let mut ctx = ctx(Method::GET, Vec::new());
        let err = run_chain(&[restricted.clone()], &mut ctx).unwrap_err();
        assert!(err.to_string().starts_with("VALIDATION_ERROR"));

        let mut ctx = ctx2_with_key();
        assert_eq!(
            run_chain(&[restricted], &mut ctx).unwrap(),
            ChainOutcome::Continue
        );
    }

    fn ctx2_with_key() -> RequestContext {
        ctx(
            Method::GET,
            vec![("x-api-key".to_string(), "secret".to_string())],
        )
    }

    #[test]
    fn test_middleware_owning_response_halts_chain() {
        let responder: Arc<dyn Middleware> = Arc::new(FnMiddleware::new("teapot.rs", |ctx, _next| {
            ctx.status(418);
            ctx.send(Some(json!("short-circuit")))
        }));
        let chain = vec![responder, passthrough("never.rs")];
        let mut ctx = ctx(Method::GET, Vec::new());
        assert_eq!(run_chain(&chain, &mut ctx).unwrap(), ChainOutcome::Halt);
        assert!(ctx.is_sent());
    }
}
