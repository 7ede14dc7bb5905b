//! Route tables and the handler registration surface.
//!
//! The external loader (file-system crawler, out of scope here) discovers
//! handler units and registers each one through the traits in this module.
//! The tables are populated once at startup and frozen; request handling
//! only ever reads them.
//!
//! Four tables exist: exact-match controllers, parametrized controllers,
//! exact-match pages, parametrized pages. Exact tables key by full path;
//! parametrized tables are an ordered list matched by substring inclusion,
//! first registered entry wins.

use std::collections::HashMap;
use std::sync::Arc;

use http::Method;
use serde_json::Value;

use crate::context::RequestContext;
use crate::error::Error;
use crate::schema::ValidationSchemas;

/// Options a controller or page module may declare alongside its handler.
#[derive(Debug, Clone, Default)]
pub struct HandlerOptions {
    /// Allowed HTTP methods; empty means all methods are accepted.
    pub methods: Vec<Method>,
    /// Optional URL prefix prepended to the route key at registration.
    pub prefix: Option<String>,
    /// Ordered names for the positional parameters carried by the path
    /// segments after a parametrized route's key.
    pub params: Vec<String>,
    /// Schemas validating headers, params, querystring and body.
    pub validation: ValidationSchemas,
}

impl HandlerOptions {
    /// Whether `method` is allowed by this handler.
    pub fn allows(&self, method: &Method) -> bool {
        self.methods.is_empty() || self.methods.contains(method)
    }
}

/// A non-rendering handler unit (API endpoint).
///
/// The default invocation function receives the request context and is
/// expected to finish by calling one of its send-family methods.
pub trait Controller: Send + Sync {
    fn options(&self) -> Option<&HandlerOptions> {
        None
    }

    fn invoke(&self, ctx: &mut RequestContext) -> Result<(), Error>;
}

/// Adapter so plain functions and closures register as controllers.
pub struct FnController<F> {
    func: F,
    options: Option<HandlerOptions>,
}

impl<F> FnController<F>
where
    F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync,
{
    pub fn new(func: F) -> Self {
        Self {
            func,
            options: None,
        }
    }

    pub fn with_options(func: F, options: HandlerOptions) -> Self {
        Self {
            func,
            options: Some(options),
        }
    }
}

impl<F> Controller for FnController<F>
where
    F: Fn(&mut RequestContext) -> Result<(), Error> + Send + Sync,
{
    fn options(&self) -> Option<&HandlerOptions> {
        self.options.as_ref()
    }

    fn invoke(&self, ctx: &mut RequestContext) -> Result<(), Error> {
        (self.func)(ctx)
    }
}

/// Render options a page module may declare.
#[derive(Debug, Clone, Default)]
pub struct PageOptions {
    /// Handler options shared with controllers (methods, prefix, schemas).
    pub handler: HandlerOptions,
    /// Template (by name in the template store) the rendered component is
    /// inserted into as `{{content}}`; absent means the component HTML is
    /// sent as-is.
    pub template: Option<String>,
    /// Title passed to the template as `{{title}}`.
    pub title: Option<String>,
}

/// A rendering handler unit. The component is rendered by the opaque
/// [`Renderer`] with the props this page produces for the request.
pub trait Page: Send + Sync {
    fn options(&self) -> Option<&PageOptions> {
        None
    }

    /// Name of the component handed to the renderer.
    fn component(&self) -> &str;

    /// Props for this request. Static pages return a constant value;
    /// dynamic pages compute one from the request.
    fn props(&self, _ctx: &RequestContext) -> Result<Value, Error> {
        Ok(Value::Null)
    }
}

/// A page backed by a component name and either static props or a props
/// function of the request.
pub struct ComponentPage {
    component: String,
    props: PropsSource,
    options: Option<PageOptions>,
}

enum PropsSource {
    Static(Value),
    Dynamic(Box<dyn Fn(&RequestContext) -> Result<Value, Error> + Send + Sync>),
}

impl ComponentPage {
    pub fn with_props(component: &str, props: Value) -> Self {
        Self {
            component: component.to_string(),
            props: PropsSource::Static(props),
            options: None,
        }
    }

    pub fn with_props_fn<F>(component: &str, props: F) -> Self
    where
        F: Fn(&RequestContext) -> Result<Value, Error> + Send + Sync + 'static,
    {
        Self {
            component: component.to_string(),
            props: PropsSource::Dynamic(Box::new(props)),
            options: None,
        }
    }

    pub fn options(mut self, options: PageOptions) -> Self {
        self.options = Some(options);
        self
    }
}

impl Page for ComponentPage {
    fn options(&self) -> Option<&PageOptions> {
        self.options.as_ref()
    }

    fn component(&self) -> &str {
        &self.component
    }

    fn props(&self, ctx: &RequestContext) -> Result<Value, Error> {
        match &self.props {
            PropsSource::Static(v) => Ok(v.clone()),
            PropsSource::Dynamic(f) => f(ctx),
        }
    }
}

/// Renders a page component with props into HTML.
///
/// The actual rendering engine is an external collaborator; the framework
/// treats it as an opaque function.
pub trait Renderer: Send + Sync {
    fn render(&self, component: &str, props: &Value) -> Result<String, Error>;
}

impl<F> Renderer for F
where
    F: Fn(&str, &Value) -> Result<String, Error> + Send + Sync,
{
    fn render(&self, component: &str, props: &Value) -> Result<String, Error> {
        self(component, props)
    }
}

/// The four route tables, frozen after startup.
#[derive(Default)]
pub struct RouteTables {
    controllers: HashMap<String, Arc<dyn Controller>>,
    parametrized_controllers: Vec<(String, Arc<dyn Controller>)>,
    pages: HashMap<String, Arc<dyn Page>>,
    parametrized_pages: Vec<(String, Arc<dyn Page>)>,
}

impl RouteTables {
    pub fn new() -> Self {
        Self::default()
    }

    /// Normalize a route key: apply the options prefix, ensure a leading
    /// slash, strip a trailing slash (except for the root).
    fn route_key(key: &str, prefix: Option<&str>) -> String {
        let mut full = String::new();
        if let Some(p) = prefix {
            full.push_str(p.trim_end_matches('/'));
        }
        if !key.starts_with('/') {
            full.push('/');
        }
        full.push_str(key);
        let trimmed = full.trim_end_matches('/');
        if trimmed.is_empty() {
            "/".to_string()
        } else {
            trimmed.to_string()
        }
    }

    /// Register an exact-match controller. Each key maps to at most one
    /// entry per table; duplicates are rejected.
    pub fn register_controller(
        &mut self,
        key: &str,
        controller: Arc<dyn Controller>,
    ) -> Result<(), Error> {
        let key = Self::route_key(key, controller.options().and_then(|o| o.prefix.as_deref()));
        if self.controllers.contains_key(&key) {
            return Err(Error::internal(format!(
                "controller already registered for `{key}`"
            )));
        }
        tracing::info!(route = %key, table = "controllers", "handler registered");
        self.controllers.insert(key, controller);
        Ok(())
    }

    /// Register a parametrized controller, matched by substring inclusion
    /// in registration order.
    pub fn register_parametrized_controller(
        &mut self,
        key: &str,
        controller: Arc<dyn Controller>,
    ) -> Result<(), Error> {
        let key = Self::route_key(key, controller.options().and_then(|o| o.prefix.as_deref()));
        if self.parametrized_controllers.iter().any(|(k, _)| *k == key) {
            return Err(Error::internal(format!(
                "parametrized controller already registered for `{key}`"
            )));
        }
        tracing::info!(route = %key, table = "parametrized_controllers", "handler registered");
        self.parametrized_controllers.push((key, controller));
        Ok(())
    }

    /// Register an exact-match page.
    pub fn register_page(&mut self, key: &str, page: Arc<dyn Page>) -> Result<(), Error> {
        let key = Self::route_key(
            key,
            page.options().and_then(|o| o.handler.prefix.as_deref()),
        );
        if self.pages.contains_key(&key) {
            return Err(Error::internal(format!("page already registered for `{key}`")));
        }
        tracing::info!(route = %key, table = "pages", "handler registered");
        self.pages.insert(key, page);
        Ok(())
    }

    /// Register a parametrized page.
    pub fn register_parametrized_page(
        &mut self,
        key: &str,
        page: Arc<dyn Page>,
    ) -> Result<(), Error> {
        let key = Self::route_key(
            key,
            page.options().and_then(|o| o.handler.prefix.as_deref()),
        );
        if self.parametrized_pages.iter().any(|(k, _)| *k == key) {
            return Err(Error::internal(format!(
                "parametrized page already registered for `{key}`"
            )));
        }
        tracing::info!(route = %key, table = "parametrized_pages", "handler registered");
        self.parametrized_pages.push((key, page));
        Ok(())
    }

    pub fn controller(&self, path: &str) -> Option<&Arc<dyn Controller>> {
        self.controllers.get(path)
    }

    /// First parametrized controller whose key is contained in `path`,
    /// in registration order. Overlapping keys are ambiguous by design;
    /// first match wins.
    pub fn parametrized_controller(&self, path: &str) -> Option<(&str, &Arc<dyn Controller>)> {
        self.parametrized_controllers
            .iter()
            .find(|(key, _)| path.contains(key.as_str()))
            .map(|(key, c)| (key.as_str(), c))
    }

    pub fn page(&self, path: &str) -> Option<&Arc<dyn Page>> {
        self.pages.get(path)
    }

    pub fn parametrized_page(&self, path: &str) -> Option<(&str, &Arc<dyn Page>)> {
        self.parametrized_pages
            .iter()
            .find(|(key, _)| path.contains(key.as_str()))
            .map(|(key, p)| (key.as_str(), p))
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
            && self.parametrized_controllers.is_empty()
            && self.pages.is_empty()
            && self.parametrized_pages.is_empty()
    }
}
