//! Request dispatch: resolves and invokes exactly one terminal handler.
//!
//! Resolution order, terminal on first match:
//!
//! 1. `/` → static `index.html` if present, else the root banner
//! 2. middleware chain (when any middleware is registered)
//! 3. exact-match controller
//! 4. parametrized controller (substring match, first registered wins)
//! 5. exact-match page
//! 6. parametrized page
//! 7. static file
//! 8. `NOT_FOUND`
//!
//! Exact matches are always attempted before parametrized ones, so a
//! parametrized key can never shadow an exact route. Method and header
//! validation run before a controller is invoked; failures propagate to the
//! per-request error boundary and are never swallowed here.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::app::AppState;
use crate::context::{RequestContext, RouteBinding};
use crate::error::Error;
use crate::middleware::{run_chain, ChainOutcome};
use crate::routes::{Controller, HandlerOptions, Page};
use crate::static_files::StaticStore;

/// Dispatcher over the immutable route tables.
///
/// Cheap to clone; every request shares the same frozen [`AppState`].
#[derive(Clone)]
pub struct Dispatcher {
    state: Arc<AppState>,
}

impl Dispatcher {
    pub fn new(state: Arc<AppState>) -> Self {
        Self { state }
    }

    /// Resolve and invoke the terminal handler for this request.
    pub fn dispatch(&self, ctx: &mut RequestContext) -> Result<(), Error> {
        if ctx.path() == "/" {
            return self.serve_root(ctx);
        }

        if !self.state.middlewares.is_empty() {
            match run_chain(&self.state.middlewares, ctx)? {
                ChainOutcome::Halt => return Ok(()),
                ChainOutcome::Continue => {}
            }
        }

        self.route(ctx)
    }

    /// Steps 3-8: the routing resolution proper.
    fn route(&self, ctx: &mut RequestContext) -> Result<(), Error> {
        let path = ctx.path().to_string();

        if let Some(controller) = self.state.tables.controller(&path) {
            tracing::debug!(route = %path, table = "controllers", "route matched");
            let controller = Arc::clone(controller);
            return self.invoke_controller(ctx, &path, false, &controller);
        }

        if let Some((key, controller)) = self.state.tables.parametrized_controller(&path) {
            tracing::debug!(route = %key, table = "parametrized_controllers", "route matched");
            let key = key.to_string();
            let controller = Arc::clone(controller);
            return self.invoke_controller(ctx, &key, true, &controller);
        }

        if let Some(page) = self.state.tables.page(&path) {
            tracing::debug!(route = %path, table = "pages", "route matched");
            let page = Arc::clone(page);
            return self.render_page(ctx, &path, false, &page);
        }

        if let Some((key, page)) = self.state.tables.parametrized_page(&path) {
            tracing::debug!(route = %key, table = "parametrized_pages", "route matched");
            let key = key.to_string();
            let page = Arc::clone(page);
            return self.render_page(ctx, &key, true, &page);
        }

        if let Some(bytes) = self.state.statics.get(&path) {
            tracing::debug!(route = %path, table = "static", "route matched");
            let bytes = bytes.to_vec();
            if let Some(ct) = StaticStore::content_type_for(&path) {
                ctx.content_type(ct);
            }
            return ctx.send_bytes(bytes);
        }

        Err(Error::not_found(format!(
            "no handler for {} {}",
            ctx.method(),
            path
        )))
    }

    fn serve_root(&self, ctx: &mut RequestContext) -> Result<(), Error> {
        if let Some(index) = self.state.statics.get("/index.html") {
            let index = index.to_vec();
            ctx.content_type("text/html");
            return ctx.send_bytes(index);
        }
        let banner = self.state.banner.clone();
        ctx.send(Some(Value::String(banner)))
    }

    fn invoke_controller(
        &self,
        ctx: &mut RequestContext,
        key: &str,
        parametrized: bool,
        controller: &Arc<dyn Controller>,
    ) -> Result<(), Error> {
        let options = controller.options();
        self.validate_options(ctx, key, options)?;
        ctx.bind_route(binding_for(key, parametrized, options));

        tracing::info!(
            method = %ctx.method(),
            route = %key,
            "controller invoked"
        );
        controller.invoke(ctx)
    }

    fn validate_options(
        &self,
        ctx: &RequestContext,
        key: &str,
        options: Option<&HandlerOptions>,
    ) -> Result<(), Error> {
        let Some(options) = options else {
            return Ok(());
        };
        if !options.allows(ctx.method()) {
            return Err(Error::not_found(format!(
                "method {} not allowed for {key}",
                ctx.method()
            )));
        }
        if let Some(schema) = &options.validation.headers {
            schema.validate(&ctx.header_record())?;
        }
        Ok(())
    }

    fn render_page(
        &self,
        ctx: &mut RequestContext,
        key: &str,
        parametrized: bool,
        page: &Arc<dyn Page>,
    ) -> Result<(), Error> {
        let options = page.options();
        ctx.bind_route(binding_for(
            key,
            parametrized,
            options.map(|o| &o.handler),
        ));

        let renderer = self
            .state
            .renderer
            .as_ref()
            .ok_or_else(|| Error::internal("no renderer configured for pages"))?;

        let props = page.props(ctx)?;
        let html = renderer.render(page.component(), &props)?;

        let html = match options.and_then(|o| o.template.as_deref()) {
            Some(template) => {
                let title = options
                    .and_then(|o| o.title.as_deref())
                    .unwrap_or(page.component());
                self.state
                    .templates
                    .render(template, &json!({ "title": title, "content": html }))?
            }
            None => html,
        };

        tracing::info!(route = %key, component = page.component(), "page rendered");
        ctx.content_type("text/html");
        ctx.send(Some(Value::String(html)))
    }
}

fn binding_for(
    key: &str,
    parametrized: bool,
    options: Option<&HandlerOptions>,
) -> RouteBinding {
    RouteBinding {
        key: key.to_string(),
        parametrized,
        param_names: options.map(|o| o.params.clone()).unwrap_or_default(),
        validation: options.map(|o| o.validation.clone()).unwrap_or_default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::routes::{ComponentPage, FnController, PageOptions};
    use crate::server::request::ParsedRequest;
    use http::Method;

    fn request(method: Method, url: &str) -> ParsedRequest {
        ParsedRequest::new(method, url, Vec::new(), Vec::new())
    }

    fn dispatch_to(state: AppState, method: Method, url: &str) -> (Result<(), Error>, RequestContext) {
        let state = Arc::new(state);
        let mut ctx = RequestContext::new(request(method, url), Arc::clone(&state));
        let result = Dispatcher::new(state).dispatch(&mut ctx);
        (result, ctx)
    }

    #[test]
    fn test_root_banner_without_index() {
        let (result, ctx) = dispatch_to(AppState::default(), Method::GET, "/");
        result.unwrap();
        let body = String::from_utf8(ctx.parts().body.clone()).unwrap();
        assert!(body.contains("Pagoda"));
    }

    #[test]
    fn test_root_prefers_index_html() {
        let mut state = AppState::default();
        state
            .statics
            .insert("/index.html", b"<html>home</html>".to_vec());
        let (result, ctx) = dispatch_to(state, Method::GET, "/");
        result.unwrap();
        assert_eq!(ctx.parts().body, b"<html>home</html>");
        assert_eq!(ctx.parts().content_type.as_deref(), Some("text/html"));
    }

    #[test]
    fn test_exact_controller_beats_parametrized() {
        let mut state = AppState::default();
        state
            .tables
            .register_parametrized_controller(
                "/users",
                Arc::new(FnController::new(|ctx: &mut RequestContext| {
                    ctx.send(Some(json!("parametrized")))
                })),
            )
            .unwrap();
        state
            .tables
            .register_controller(
                "/users/me",
                Arc::new(FnController::new(|ctx: &mut RequestContext| {
                    ctx.send(Some(json!("exact")))
                })),
            )
            .unwrap();
        let (result, ctx) = dispatch_to(state, Method::GET, "/users/me");
        result.unwrap();
        assert_eq!(ctx.parts().body, b"exact");
    }

    #[test]
    fn test_no_match_is_not_found() {
        let (result, _ctx) = dispatch_to(AppState::default(), Method::GET, "/missing");
        let err = result.unwrap_err();
        assert_eq!(err.status(), 404);
    }

    #[test]
    fn test_method_mismatch_is_not_found() {
        let mut state = AppState::default();
        state
            .tables
            .register_controller(
                "/items",
                Arc::new(FnController::with_options(
                    |ctx: &mut RequestContext| ctx.send(Some(json!("ok"))),
                    HandlerOptions {
                        methods: vec![Method::POST],
                        ..Default::default()
                    },
                )),
            )
            .unwrap();
        let (result, _ctx) = dispatch_to(state, Method::GET, "/items");
        let err = result.unwrap_err();
        assert!(err.to_string().starts_with("NOT_FOUND"));
    }

    #[test]
    fn test_page_renders_through_template() {
        let mut state = AppState::default();
        state.renderer = Some(Arc::new(|component: &str, props: &Value| {
            Ok(format!("<{}>{}</{}>", component, props["word"], component))
        }));
        state
            .templates
            .insert("layout", "<title>{{title}}</title>{{content}}");
        state
            .tables
            .register_page(
                "/about",
                Arc::new(
                    ComponentPage::with_props("section", json!({ "word": "hi" })).options(
                        PageOptions {
                            template: Some("layout".to_string()),
                            title: Some("About".to_string()),
                            ..Default::default()
                        },
                    ),
                ),
            )
            .unwrap();
        let (result, ctx) = dispatch_to(state, Method::GET, "/about");
        result.unwrap();
        let body = String::from_utf8(ctx.parts().body.clone()).unwrap();
        assert_eq!(body, "<title>About</title><section>\"hi\"</section>");
    }

    #[test]
    fn test_static_file_served_with_inferred_type() {
        let mut state = AppState::default();
        state
            .statics
            .insert("/css/site.css", b"body{}".to_vec());
        let (result, ctx) = dispatch_to(state, Method::GET, "/css/site.css");
        result.unwrap();
        assert_eq!(ctx.parts().body, b"body{}");
        assert_eq!(ctx.parts().content_type.as_deref(), Some("text/css"));
    }

    #[test]
    fn test_unknown_extension_has_no_content_type() {
        let mut state = AppState::default();
        state.statics.insert("/app.wasm", vec![0, 1, 2]);
        let (result, ctx) = dispatch_to(state, Method::GET, "/app.wasm");
        result.unwrap();
        assert_eq!(ctx.parts().content_type, None);
    }
}
