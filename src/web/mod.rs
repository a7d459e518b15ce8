//! Routing and dispatch.
//!
//! - `request`: the incoming request data
//! - `uri`: URI detection, filtering and segment access
//! - `router`: rewrite rules producing the routed segments
//! - `url`: URL creation in path or query-string format
//! - `route`, `controller`, `module`: what a request resolves to
//! - `hooks`, `benchmark`, `response`: lifecycle plumbing
//! - `application`: the dispatcher tying it together

pub mod application;
pub mod benchmark;
pub mod controller;
pub mod hooks;
pub mod module;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod uri;
pub mod url;

pub use application::{DispatchError, WebApplication};
pub use benchmark::Benchmark;
pub use controller::{ActionContext, ActionFn, ActionTable, Controller};
pub use hooks::{HookBus, HookContext, HookPoint};
pub use module::{Components, Module, ModuleHooks, NoHooks};
pub use request::Request;
pub use response::{BufferedOutput, Output, Response};
pub use route::{action_method, controller_class, ucfirst, Route};
pub use router::{RouteRule, Router};
pub use uri::{Assoc, RouteError, SlashSide, Uri, UriProtocol};
pub use url::{UrlFormat, UrlManager};
