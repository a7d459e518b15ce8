//! Request dispatch.
//!
//! `WebApplication::process_request` drives one request through the whole
//! lifecycle:
//!
//! 1. `pre_system` and `cache_override` hooks (a handled cache override
//!    displays the response and stops)
//! 2. URI detection and routing
//! 3. `pre_controller`, controller creation, `post_controller_constructor`
//! 4. module `before_controller_action`, controller `before_action_run`,
//!    the action, `after_action_run`, module `after_controller_action`
//! 5. benchmark mark, `post_controller`, output display, `post_system`
//!
//! Unknown controllers and actions go to the configured 404 override
//! route. When there is none the request fails with `NotFound`; when the
//! override itself cannot be dispatched the failure is fatal.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, error, info};

use crate::config::AppConfig;
use crate::db::{ConnectionRegistry, DbError};

use super::benchmark::Benchmark;
use super::controller::{ActionContext, Controller};
use super::hooks::{HookBus, HookPoint};
use super::module::{Components, Module, ModuleHooks};
use super::request::Request;
use super::response::{Output, Response};
use super::route::Route;
use super::router::Router;
use super::uri::{RouteError, Uri};
use super::url::UrlManager;

/// Dispatch error types
#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("404 Page Not Found --> {route}")]
    NotFound { route: String },

    #[error("The 404 override route '{route}' could not be dispatched")]
    OverrideFailed { route: String },

    #[error(transparent)]
    Route(#[from] RouteError),

    #[error(transparent)]
    Db(#[from] DbError),

    #[error("Component '{0}' is not registered")]
    MissingComponent(String),

    #[error("{0}")]
    Internal(String),
}

impl DispatchError {
    pub fn status_code(&self) -> u16 {
        match self {
            DispatchError::NotFound { .. } => 404,
            DispatchError::Route(RouteError::DisallowedCharacters(_)) => 400,
            _ => 500,
        }
    }

    /// Stable key for localized error messages.
    pub fn message_key(&self) -> &'static str {
        match self {
            DispatchError::NotFound { .. } => "page_not_found",
            DispatchError::OverrideFailed { .. } => "override_404_failed",
            DispatchError::Route(e) => e.message_key(),
            DispatchError::Db(e) => e.message_key(),
            DispatchError::MissingComponent(_) => "component_missing",
            DispatchError::Internal(_) => "internal_error",
        }
    }
}

/// Per-request state threaded through controller runs.
struct RequestState<'r> {
    request: &'r Request,
    uri: &'r Uri,
    response: &'r mut Response,
    benchmark: &'r mut Benchmark,
}

pub struct WebApplication {
    config: Arc<AppConfig>,
    router: Router,
    urls: UrlManager,
    root: Module,
    components: Components,
    hooks: HookBus,
    search_modules: Vec<String>,
}

impl std::fmt::Debug for WebApplication {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WebApplication")
            .field("root", &self.root)
            .field("router", &self.router)
            .field("components", &self.components)
            .field("hooks", &self.hooks)
            .field("search_modules", &self.search_modules)
            .finish()
    }
}

impl WebApplication {
    /// Build an application; route rules and the URI whitelist are
    /// compiled here so bad configuration fails at startup.
    pub fn new(config: AppConfig, root: Module) -> Result<Self, DispatchError> {
        let router = Router::new(config.routes())?;
        Uri::new(config.uri().clone())?;
        let urls = UrlManager::new(config.uri().clone());
        let config = Arc::new(config);
        let components = Components::new().with_config(Arc::clone(&config));
        Ok(Self {
            config,
            router,
            urls,
            root,
            components,
            hooks: HookBus::new(),
            search_modules: Vec::new(),
        })
    }

    pub fn with_db(mut self, registry: Arc<ConnectionRegistry>) -> Self {
        self.components = self.components.with_db(registry);
        self
    }

    pub fn with_components(mut self, components: Components) -> Self {
        self.components = components.with_config(Arc::clone(&self.config));
        self
    }

    /// Modules searched, in order, for controllers the root lacks.
    pub fn with_search_modules(mut self, ids: &[&str]) -> Self {
        self.search_modules = ids.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn hooks_mut(&mut self) -> &mut HookBus {
        &mut self.hooks
    }

    pub fn components(&self) -> &Components {
        &self.components
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn urls(&self) -> &UrlManager {
        &self.urls
    }

    pub fn root(&self) -> &Module {
        &self.root
    }

    pub fn create_url(&self, route: &str, params: &[(&str, &str)]) -> String {
        self.urls.create_url(route, params, None)
    }

    /// Turn routed segments into a route. A first segment naming a
    /// module makes the route module-qualified.
    pub fn resolve_route(&self, segments: &[String]) -> Option<Route> {
        let first = segments.first()?;
        match self.root.get_module(first) {
            Some(module) => Some(Route::in_module(first, &segments[1..], module.default_controller())),
            None => Route::from_segments(segments),
        }
    }

    /// Locate and instantiate the controller for `route`, together with
    /// the module that owns it.
    pub fn create_controller(&self, route: &Route) -> Option<(Box<dyn Controller>, &Module)> {
        if let Some(id) = &route.module {
            let module = self.root.get_module(id)?;
            return module
                .create_controller(&route.controller)
                .map(|controller| (controller, module));
        }

        if let Some(controller) = self.root.create_controller(&route.controller) {
            return Some((controller, &self.root));
        }

        self.search_modules
            .iter()
            .filter_map(|id| self.root.get_module(id))
            .find_map(|module| {
                module.create_controller(&route.controller).map(|controller| {
                    debug!(
                        category = "dispatch",
                        controller = %route.controller,
                        module = %module.id(),
                        "controller found on module search path"
                    );
                    (controller, module)
                })
            })
    }

    /// Dispatch `request`, rendering failures as error pages.
    pub fn run(&self, request: &Request, output: &mut dyn Output) -> Response {
        match self.process_request(request, output) {
            Ok(response) => response,
            Err(e) => {
                let status = e.status_code();
                if status >= 500 {
                    error!(category = "dispatch", error = %e, "request failed");
                } else {
                    info!(category = "dispatch", error = %e, status, "request rejected");
                }
                let mut response = Response::new();
                response.set_status(status);
                response.append(&e.to_string());
                output.display(&response);
                response
            }
        }
    }

    pub fn process_request(
        &self,
        request: &Request,
        output: &mut dyn Output,
    ) -> Result<Response, DispatchError> {
        let mut benchmark = Benchmark::new();
        benchmark.mark("total_execution_time_start");
        let mut response = Response::new();

        self.hooks.call(HookPoint::PreSystem, None, &mut response);
        if self.hooks.call(HookPoint::CacheOverride, None, &mut response) {
            debug!(category = "dispatch", "response served by cache override");
            output.display(&response);
            return Ok(response);
        }

        let mut uri = Uri::detect(self.config.uri().clone(), request)?;
        self.router.resolve(&mut uri, request)?;
        benchmark.mark("loading_time:_base_classes_end");

        let route = self
            .resolve_route(uri.rsegment_array())
            .ok_or_else(|| DispatchError::NotFound {
                route: uri.ruri_string(),
            })?;

        self.hooks.call(HookPoint::PreController, Some(&route), &mut response);
        let mut state = RequestState {
            request,
            uri: &uri,
            response: &mut response,
            benchmark: &mut benchmark,
        };
        self.run_controller(&route, &mut state, true)?;

        self.hooks.call(HookPoint::PostController, Some(&route), &mut response);
        if !self.hooks.call(HookPoint::DisplayOverride, Some(&route), &mut response) {
            output.display(&response);
        }
        self.hooks.call(HookPoint::PostSystem, Some(&route), &mut response);

        benchmark.mark("total_execution_time_end");
        if let Some(elapsed) = benchmark.elapsed_time("total_execution_time_start", Some("total_execution_time_end")) {
            debug!(category = "dispatch", route = %route, elapsed_ms = elapsed.as_millis() as u64, "request complete");
        }
        Ok(response)
    }

    fn run_controller(
        &self,
        route: &Route,
        state: &mut RequestState<'_>,
        allow_override: bool,
    ) -> Result<(), DispatchError> {
        let method = route.action_method();
        match self.create_controller(route) {
            Some((controller, module)) if controller.has_action(&method) => {
                self.run_action(controller, module, route, state)
            }
            found => {
                let attempted = route.to_string();
                if found.is_some() {
                    debug!(category = "dispatch", route = %attempted, method = %method, "controller has no such action");
                }
                match self.router.override_404() {
                    Some(target) if allow_override => self.run_override(target, route, state),
                    _ => Err(DispatchError::NotFound { route: attempted }),
                }
            }
        }
    }

    fn run_override(
        &self,
        target: &str,
        original: &Route,
        state: &mut RequestState<'_>,
    ) -> Result<(), DispatchError> {
        info!(category = "dispatch", route = %original, target = %target, "404 override applied");
        let segments: Vec<String> = target
            .split('/')
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();
        let mut route = self
            .resolve_route(&segments)
            .ok_or_else(|| DispatchError::OverrideFailed {
                route: target.to_string(),
            })?;
        if route.params.is_empty() {
            route.params = original.params.clone();
        }

        match self.run_controller(&route, state, false) {
            Err(DispatchError::NotFound { .. }) => Err(DispatchError::OverrideFailed {
                route: target.to_string(),
            }),
            other => other,
        }
    }

    fn run_action(
        &self,
        mut controller: Box<dyn Controller>,
        module: &Module,
        route: &Route,
        state: &mut RequestState<'_>,
    ) -> Result<(), DispatchError> {
        self.hooks
            .call(HookPoint::PostControllerConstructor, Some(route), state.response);

        let mut chain: Vec<&dyn ModuleHooks> = vec![self.root.hooks()];
        if !std::ptr::eq(module, &self.root) {
            chain.push(module.hooks());
        }

        if !chain
            .iter()
            .all(|hooks| hooks.before_controller_action(controller.as_ref(), &route.action))
        {
            debug!(category = "dispatch", route = %route, "action vetoed by before_controller_action");
            return Ok(());
        }

        let method = route.action_method();
        {
            let mut ctx = ActionContext {
                route,
                request: state.request,
                uri: state.uri,
                urls: &self.urls,
                components: &self.components,
                response: &mut *state.response,
            };
            if controller.before_action_run(&route.action, &mut ctx) {
                controller.run_action(&method, &mut ctx)?;
                controller.after_action_run(&route.action, &mut ctx);
            }
        }

        for hooks in chain.iter().rev() {
            hooks.after_controller_action(controller.as_ref(), &route.action);
        }
        state.benchmark.mark(&format!(
            "controller_execution_time_( {} / {} )_end",
            route.controller_class(),
            method
        ));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConfigFile, RoutesConfig};
    use crate::web::controller::ActionTable;
    use crate::web::response::BufferedOutput;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    fn push(log: &Log, event: &str) {
        log.lock().unwrap().push(event.to_string());
    }

    struct SiteController {
        actions: ActionTable<Self>,
        log: Log,
    }

    impl SiteController {
        fn new(log: Log) -> Self {
            Self {
                actions: ActionTable::new()
                    .action("index", Self::index)
                    .action("hello", Self::hello)
                    .action("missing", Self::missing),
                log,
            }
        }

        fn index(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
            push(&self.log, "action");
            ctx.render("home");
            Ok(())
        }

        fn hello(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
            let name = ctx.param(0).unwrap_or("world").to_string();
            ctx.render(&format!("hello {}", name));
            Ok(())
        }

        fn missing(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
            ctx.response.set_status(404);
            ctx.render(&format!("custom 404 for {}", ctx.param(0).unwrap_or("-")));
            Ok(())
        }
    }

    impl Controller for SiteController {
        fn id(&self) -> &str {
            "site"
        }

        fn has_action(&self, method: &str) -> bool {
            self.actions.contains(method)
        }

        fn run_action(&mut self, method: &str, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
            let action = self.actions.resolve(method, ctx.route)?;
            action(self, ctx)
        }

        fn before_action_run(&mut self, _action: &str, _ctx: &mut ActionContext<'_>) -> bool {
            push(&self.log, "before_action_run");
            true
        }

        fn after_action_run(&mut self, _action: &str, _ctx: &mut ActionContext<'_>) {
            push(&self.log, "after_action_run");
        }
    }

    struct UserController {
        actions: ActionTable<Self>,
    }

    impl UserController {
        fn new() -> Self {
            Self {
                actions: ActionTable::new().action("edit", Self::edit),
            }
        }

        fn edit(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
            let id = ctx.param(0).unwrap_or("0").to_string();
            ctx.render(&format!("editing {} in {}", id, ctx.route));
            Ok(())
        }
    }

    impl Controller for UserController {
        fn id(&self) -> &str {
            "user"
        }

        fn has_action(&self, method: &str) -> bool {
            self.actions.contains(method)
        }

        fn run_action(&mut self, method: &str, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
            let action = self.actions.resolve(method, ctx.route)?;
            action(self, ctx)
        }
    }

    struct Recording {
        log: Log,
        allow: bool,
    }

    impl ModuleHooks for Recording {
        fn before_controller_action(&self, _controller: &dyn Controller, _action: &str) -> bool {
            push(&self.log, "before_controller_action");
            self.allow
        }

        fn after_controller_action(&self, _controller: &dyn Controller, _action: &str) {
            push(&self.log, "after_controller_action");
        }
    }

    struct RecordingOutput {
        log: Log,
        inner: BufferedOutput,
    }

    impl Output for RecordingOutput {
        fn display(&mut self, response: &Response) {
            push(&self.log, "display");
            self.inner.display(response);
        }
    }

    fn app_with(routes: RoutesConfig, log: &Log, allow: bool) -> WebApplication {
        let config = AppConfig::from_file(ConfigFile {
            routes,
            ..ConfigFile::default()
        });
        let site_log = Arc::clone(log);
        let root = Module::new("app")
            .with_hooks(Recording {
                log: Arc::clone(log),
                allow,
            })
            .with_controller("site", move || Box::new(SiteController::new(Arc::clone(&site_log))))
            .with_module(
                Module::new("admin")
                    .with_default_controller("user")
                    .with_controller("user", || Box::new(UserController::new())),
            )
            .with_module(Module::new("legacy").with_controller("account", || Box::new(UserController::new())));
        WebApplication::new(config, root).unwrap()
    }

    fn app(log: &Log) -> WebApplication {
        app_with(RoutesConfig::default(), log, true)
    }

    fn output(log: &Log) -> RecordingOutput {
        RecordingOutput {
            log: Arc::clone(log),
            inner: BufferedOutput::new(),
        }
    }

    #[test]
    fn test_dispatches_controller_action_with_params() {
        let log = Log::default();
        let app = app(&log);
        let mut out = output(&log);
        let response = app.process_request(&Request::web("/site/hello/joe"), &mut out).unwrap();
        assert_eq!(response.status, 200);
        assert_eq!(response.body, "hello joe");
        assert_eq!(out.inner.displayed.len(), 1);
    }

    #[test]
    fn test_empty_uri_uses_default_controller() {
        let log = Log::default();
        let app = app(&log);
        let mut out = output(&log);
        let response = app.process_request(&Request::web("/"), &mut out).unwrap();
        assert_eq!(response.body, "home");
    }

    #[test]
    fn test_lifecycle_order() {
        let log = Log::default();
        let mut app = app(&log);
        for (point, name) in [
            (HookPoint::PreController, "pre_controller"),
            (HookPoint::PostController, "post_controller"),
            (HookPoint::PostSystem, "post_system"),
        ] {
            let hook_log = Arc::clone(&log);
            app.hooks_mut().register(point, move |_| {
                push(&hook_log, name);
                false
            });
        }

        let mut out = output(&log);
        app.process_request(&Request::web("/site/index"), &mut out).unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            [
                "pre_controller",
                "before_controller_action",
                "before_action_run",
                "action",
                "after_action_run",
                "after_controller_action",
                "post_controller",
                "display",
                "post_system",
            ]
        );
    }

    #[test]
    fn test_before_controller_action_can_veto() {
        let log = Log::default();
        let app = app_with(RoutesConfig::default(), &log, false);
        let mut out = output(&log);
        let response = app.process_request(&Request::web("/site/index"), &mut out).unwrap();
        assert_eq!(response.body, "");
        assert!(!log.lock().unwrap().iter().any(|e| e == "action"));
    }

    #[test]
    fn test_unknown_controller_is_not_found() {
        let log = Log::default();
        let app = app(&log);
        let mut out = output(&log);
        let err = app.process_request(&Request::web("/nope"), &mut out).unwrap_err();
        assert!(matches!(err, DispatchError::NotFound { ref route } if route == "nope/index"));
        assert_eq!(err.status_code(), 404);

        let response = app.run(&Request::web("/site/absent"), &mut out);
        assert_eq!(response.status, 404);
        assert!(response.body.contains("site/absent"));
    }

    #[test]
    fn test_missing_action_uses_404_override() {
        let log = Log::default();
        let routes = RoutesConfig {
            override_404: "site/missing".into(),
            ..RoutesConfig::default()
        };
        let app = app_with(routes, &log, true);
        let mut out = output(&log);
        let response = app.process_request(&Request::web("/site/absent/x"), &mut out).unwrap();
        assert_eq!(response.status, 404);
        assert_eq!(response.body, "custom 404 for x");
    }

    #[test]
    fn test_broken_404_override_is_fatal() {
        let log = Log::default();
        let routes = RoutesConfig {
            override_404: "errors/gone".into(),
            ..RoutesConfig::default()
        };
        let app = app_with(routes, &log, true);
        let mut out = output(&log);
        let err = app.process_request(&Request::web("/nope"), &mut out).unwrap_err();
        assert!(matches!(err, DispatchError::OverrideFailed { ref route } if route == "errors/gone"));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_module_route() {
        let log = Log::default();
        let app = app(&log);
        let mut out = output(&log);
        let response = app.process_request(&Request::web("/admin/user/edit/7"), &mut out).unwrap();
        assert_eq!(response.body, "editing 7 in admin/user/edit");

        let route = app.resolve_route(&["admin".to_string()]).unwrap();
        assert_eq!(route.to_string(), "admin/user/index");
    }

    #[test]
    fn test_module_search_path_fallback() {
        let log = Log::default();
        let app = app(&log).with_search_modules(&["legacy"]);
        let mut out = output(&log);
        let response = app.process_request(&Request::web("/account/edit/3"), &mut out).unwrap();
        assert_eq!(response.body, "editing 3 in account/edit");

        let without = self::app(&log);
        assert!(without.process_request(&Request::web("/account/edit/3"), &mut out).is_err());
    }

    #[test]
    fn test_cache_override_short_circuits() {
        let log = Log::default();
        let mut app = app(&log);
        app.hooks_mut().register(HookPoint::CacheOverride, |ctx| {
            ctx.response.append("cached page");
            true
        });
        let mut out = output(&log);
        let response = app.process_request(&Request::web("/site/index"), &mut out).unwrap();
        assert_eq!(response.body, "cached page");
        assert_eq!(*log.lock().unwrap(), ["display"]);
    }

    #[test]
    fn test_display_override_skips_output() {
        let log = Log::default();
        let mut app = app(&log);
        app.hooks_mut().register(HookPoint::DisplayOverride, |_| true);
        let mut out = output(&log);
        app.process_request(&Request::web("/site/hello"), &mut out).unwrap();
        assert!(out.inner.displayed.is_empty());
    }

    #[test]
    fn test_disallowed_characters_are_a_bad_request() {
        let log = Log::default();
        let app = app(&log);
        let mut out = output(&log);
        let response = app.run(&Request::web("/site/<script>"), &mut out);
        assert_eq!(response.status, 400);
    }

    #[test]
    fn test_missing_db_component() {
        let log = Log::default();
        let app = app(&log);
        let err = app.components().db().unwrap_err();
        assert_eq!(err.message_key(), "component_missing");
        assert!(app.components().config().is_some());
    }
}
