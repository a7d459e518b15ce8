//! Modules and the component container.
//!
//! A `Module` owns controller factories, nested modules and the hooks run
//! around every action it dispatches. The application itself is the root
//! module. `Components` replaces property-bag lookups with typed entries
//! registered at startup.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::AppConfig;
use crate::db::ConnectionRegistry;

use super::application::DispatchError;
use super::controller::Controller;

/// Typed service container shared by every controller.
#[derive(Default, Clone)]
pub struct Components {
    db: Option<Arc<ConnectionRegistry>>,
    config: Option<Arc<AppConfig>>,
    extra: HashMap<String, Arc<dyn Any + Send + Sync>>,
}

impl std::fmt::Debug for Components {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut ids: Vec<_> = self.extra.keys().collect();
        ids.sort();
        f.debug_struct("Components")
            .field("db", &self.db.is_some())
            .field("config", &self.config.is_some())
            .field("extra", &ids)
            .finish()
    }
}

impl Components {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_db(mut self, registry: Arc<ConnectionRegistry>) -> Self {
        self.db = Some(registry);
        self
    }

    pub fn with_config(mut self, config: Arc<AppConfig>) -> Self {
        self.config = Some(config);
        self
    }

    /// Register an application-specific component under `id`.
    pub fn register<T: Any + Send + Sync>(&mut self, id: &str, component: Arc<T>) {
        self.extra.insert(id.to_string(), component);
    }

    /// `None` when `id` is missing or holds another type.
    pub fn get<T: Any + Send + Sync>(&self, id: &str) -> Option<Arc<T>> {
        self.extra
            .get(id)
            .cloned()
            .and_then(|c| c.downcast::<T>().ok())
    }

    pub fn require<T: Any + Send + Sync>(&self, id: &str) -> Result<Arc<T>, DispatchError> {
        self.get(id)
            .ok_or_else(|| DispatchError::MissingComponent(id.to_string()))
    }

    pub fn db(&self) -> Result<&ConnectionRegistry, DispatchError> {
        self.db
            .as_deref()
            .ok_or_else(|| DispatchError::MissingComponent("db".to_string()))
    }

    pub fn config(&self) -> Option<&AppConfig> {
        self.config.as_deref()
    }
}

/// Hooks a module runs around each of its actions.
pub trait ModuleHooks: Send + Sync {
    /// Return `false` to skip the action.
    fn before_controller_action(&self, _controller: &dyn Controller, _action: &str) -> bool {
        true
    }

    fn after_controller_action(&self, _controller: &dyn Controller, _action: &str) {}
}

/// Hooks that do nothing.
#[derive(Debug, Default)]
pub struct NoHooks;

impl ModuleHooks for NoHooks {}

pub type ControllerFactory = Box<dyn Fn() -> Box<dyn Controller> + Send + Sync>;

pub struct Module {
    id: String,
    default_controller: String,
    controllers: HashMap<String, ControllerFactory>,
    modules: HashMap<String, Module>,
    hooks: Box<dyn ModuleHooks>,
}

impl std::fmt::Debug for Module {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut controllers: Vec<_> = self.controllers.keys().collect();
        controllers.sort();
        f.debug_struct("Module")
            .field("id", &self.id)
            .field("default_controller", &self.default_controller)
            .field("controllers", &controllers)
            .field("modules", &self.modules)
            .finish()
    }
}

impl Module {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            default_controller: "default".to_string(),
            controllers: HashMap::new(),
            modules: HashMap::new(),
            hooks: Box::new(NoHooks),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn default_controller(&self) -> &str {
        &self.default_controller
    }

    pub fn with_default_controller(mut self, id: &str) -> Self {
        self.default_controller = id.to_string();
        self
    }

    pub fn with_hooks(mut self, hooks: impl ModuleHooks + 'static) -> Self {
        self.hooks = Box::new(hooks);
        self
    }

    pub fn with_controller<F>(mut self, id: &str, factory: F) -> Self
    where
        F: Fn() -> Box<dyn Controller> + Send + Sync + 'static,
    {
        self.add_controller(id, factory);
        self
    }

    pub fn add_controller<F>(&mut self, id: &str, factory: F)
    where
        F: Fn() -> Box<dyn Controller> + Send + Sync + 'static,
    {
        self.controllers.insert(id.to_string(), Box::new(factory));
    }

    pub fn with_module(mut self, module: Module) -> Self {
        self.modules.insert(module.id.clone(), module);
        self
    }

    pub fn has_module(&self, id: &str) -> bool {
        self.modules.contains_key(id)
    }

    pub fn get_module(&self, id: &str) -> Option<&Module> {
        self.modules.get(id)
    }

    pub fn has_controller(&self, id: &str) -> bool {
        self.controllers.contains_key(id)
    }

    /// Instantiate controller `id`, if this module has one.
    pub fn create_controller(&self, id: &str) -> Option<Box<dyn Controller>> {
        self.controllers.get(id).map(|factory| factory())
    }

    pub fn hooks(&self) -> &dyn ModuleHooks {
        self.hooks.as_ref()
    }
}
