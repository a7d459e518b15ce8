//! Controllers and actions.
//!
//! Actions are looked up by method name (`actionView`) in an
//! `ActionTable` the controller builds once. A missing action is a plain
//! `false` from `has_action`.

use std::collections::BTreeMap;

use crate::db::{ActiveRecordConnection, ConnectionRegistry, Queryable};

use super::application::DispatchError;
use super::module::Components;
use super::request::Request;
use super::response::Response;
use super::route::{action_method, Route};
use super::uri::{Assoc, Uri};
use super::url::UrlManager;

/// Everything an action can touch while it runs.
pub struct ActionContext<'a> {
    pub route: &'a Route,
    pub request: &'a Request,
    pub uri: &'a Uri,
    pub urls: &'a UrlManager,
    pub components: &'a Components,
    pub response: &'a mut Response,
}

impl ActionContext<'_> {
    /// Positional parameter `n` (0-based) after controller and action.
    pub fn param(&self, n: usize) -> Option<&str> {
        self.route.params.get(n).map(String::as_str)
    }

    /// Parameters given as `name/value` pairs after the action.
    pub fn named_params(&self) -> Assoc {
        let offset = if self.route.module.is_some() { 4 } else { 3 };
        self.uri.ruri_to_assoc(offset, &[])
    }

    pub fn render(&mut self, text: &str) {
        self.response.append(text);
    }

    pub fn db(&self) -> Result<&ConnectionRegistry, DispatchError> {
        self.components.db()
    }

    /// Checkout an active-record connection on the default group. Cached
    /// reads are filed under `controller+action`.
    pub fn active_record(&self) -> Result<ActiveRecordConnection, DispatchError> {
        let mut conn = self.db()?.default_active_record()?;
        conn.connection()
            .set_cache_uri(&format!("{}+{}", self.route.controller, self.route.action));
        Ok(conn)
    }
}

pub type ActionFn<C> = fn(&mut C, &mut ActionContext<'_>) -> Result<(), DispatchError>;

/// Method name to action function.
pub struct ActionTable<C> {
    actions: BTreeMap<String, ActionFn<C>>,
}

impl<C> Default for ActionTable<C> {
    fn default() -> Self {
        Self {
            actions: BTreeMap::new(),
        }
    }
}

impl<C> ActionTable<C> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register action `id` under the method name `action` + ucfirst(id).
    pub fn action(mut self, id: &str, f: ActionFn<C>) -> Self {
        self.actions.insert(action_method(id), f);
        self
    }

    pub fn contains(&self, method: &str) -> bool {
        self.actions.contains_key(method)
    }

    pub fn get(&self, method: &str) -> Option<ActionFn<C>> {
        self.actions.get(method).copied()
    }

    pub fn methods(&self) -> impl Iterator<Item = &str> {
        self.actions.keys().map(String::as_str)
    }

    /// The action behind `method`, or a 404 for `route`.
    pub fn resolve(&self, method: &str, route: &Route) -> Result<ActionFn<C>, DispatchError> {
        self.get(method).ok_or_else(|| DispatchError::NotFound {
            route: route.to_string(),
        })
    }
}

pub trait Controller: Send {
    fn id(&self) -> &str;

    fn has_action(&self, method: &str) -> bool;

    /// Run the action behind `method`; only called after `has_action`.
    fn run_action(&mut self, method: &str, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError>;

    /// Return `false` to skip the action.
    fn before_action_run(&mut self, _action: &str, _ctx: &mut ActionContext<'_>) -> bool {
        true
    }

    fn after_action_run(&mut self, _action: &str, _ctx: &mut ActionContext<'_>) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UriConfig;

    struct Greeter {
        greeted: usize,
    }

    impl Greeter {
        fn hello(&mut self, ctx: &mut ActionContext<'_>) -> Result<(), DispatchError> {
            self.greeted += 1;
            let name = ctx.param(0).unwrap_or("world").to_string();
            ctx.render(&format!("hello {}", name));
            Ok(())
        }
    }

    #[test]
    fn test_action_table_dispatch() {
        let table = ActionTable::new().action("hello", Greeter::hello);
        assert!(table.contains("actionHello"));
        assert!(!table.contains("actionMissing"));
        assert_eq!(table.methods().collect::<Vec<_>>(), ["actionHello"]);

        let mut route = Route::new("greeter", "hello");
        route.params.push("joe".into());
        let mut uri = Uri::from_path(UriConfig::default(), "greeter/hello/joe").unwrap();
        uri.set_rsegments(uri.segment_array().to_vec());
        let urls = UrlManager::new(UriConfig::default());
        let components = Components::new();
        let request = Request::new();
        let mut response = Response::new();
        let mut ctx = ActionContext {
            route: &route,
            request: &request,
            uri: &uri,
            urls: &urls,
            components: &components,
            response: &mut response,
        };

        let mut greeter = Greeter { greeted: 0 };
        let action = table.resolve("actionHello", &route).unwrap();
        action(&mut greeter, &mut ctx).unwrap();
        let err = table.resolve("actionNope", &route).unwrap_err();
        assert_eq!(err.status_code(), 404);
        assert_eq!(greeter.greeted, 1);
        assert_eq!(response.body, "hello joe");
    }

    #[test]
    fn test_named_params() {
        let route = Route::new("user", "search");
        let mut uri = Uri::from_path(UriConfig::default(), "user/search/name/joe/age").unwrap();
        uri.set_rsegments(uri.segment_array().to_vec());
        let urls = UrlManager::new(UriConfig::default());
        let components = Components::new();
        let request = Request::new();
        let mut response = Response::new();
        let ctx = ActionContext {
            route: &route,
            request: &request,
            uri: &uri,
            urls: &urls,
            components: &components,
            response: &mut response,
        };
        let named = ctx.named_params();
        assert_eq!(named["name"].as_deref(), Some("joe"));
        assert_eq!(named["age"], None);
        assert!(ctx.db().is_err());
    }
}
