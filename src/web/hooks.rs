//! Lifecycle hooks.
//!
//! Callbacks are registered per `HookPoint` and run in registration order.
//! A bus shared by concurrent requests tracks dispatch per thread: a hook
//! that triggers another hook point on the same thread is a no-op rather
//! than a recursion, while other requests keep running their hooks.

use std::cell::RefCell;
use std::collections::HashMap;

use serde::Serialize;
use tracing::debug;

use super::response::Response;
use super::route::Route;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HookPoint {
    PreSystem,
    /// Returning `true` means the response was served from a cache and the
    /// request ends here.
    CacheOverride,
    PreController,
    PostControllerConstructor,
    PostController,
    /// Returning `true` replaces the normal `Output::display`.
    DisplayOverride,
    PostSystem,
}

/// What a hook sees.
pub struct HookContext<'a> {
    pub point: HookPoint,
    pub route: Option<&'a Route>,
    pub response: &'a mut Response,
    pub bus: &'a HookBus,
}

pub type Hook = Box<dyn Fn(&mut HookContext<'_>) -> bool + Send + Sync>;

pub struct HookBus {
    enabled: bool,
    hooks: HashMap<HookPoint, Vec<Hook>>,
}

thread_local! {
    /// Addresses of the buses dispatching on this thread.
    static DISPATCHING: RefCell<Vec<usize>> = const { RefCell::new(Vec::new()) };
}

impl Default for HookBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for HookBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let counts: HashMap<_, _> = self.hooks.iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("HookBus")
            .field("enabled", &self.enabled)
            .field("hooks", &counts)
            .finish()
    }
}

/// Clears this thread's dispatching mark even if a hook panics.
struct DispatchGuard(usize);

impl DispatchGuard {
    /// `None` when the bus is already dispatching on this thread.
    fn enter(bus: usize) -> Option<Self> {
        DISPATCHING.with(|active| {
            let mut active = active.borrow_mut();
            if active.contains(&bus) {
                return None;
            }
            active.push(bus);
            Some(Self(bus))
        })
    }
}

impl Drop for DispatchGuard {
    fn drop(&mut self) {
        DISPATCHING.with(|active| active.borrow_mut().retain(|&bus| bus != self.0));
    }
}

impl HookBus {
    pub fn new() -> Self {
        Self {
            enabled: true,
            hooks: HashMap::new(),
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn register<F>(&mut self, point: HookPoint, hook: F)
    where
        F: Fn(&mut HookContext<'_>) -> bool + Send + Sync + 'static,
    {
        self.hooks.entry(point).or_default().push(Box::new(hook));
    }

    pub fn has_hooks(&self, point: HookPoint) -> bool {
        self.enabled && self.hooks.get(&point).is_some_and(|h| !h.is_empty())
    }

    /// Whether a hook of this bus is running on the current thread.
    pub fn is_dispatching(&self) -> bool {
        let bus = self.address();
        DISPATCHING.with(|active| active.borrow().contains(&bus))
    }

    fn address(&self) -> usize {
        self as *const Self as usize
    }

    /// Run every hook registered for `point`.
    ///
    /// Returns `true` when at least one hook reported that it handled the
    /// point. Nested calls made while a hook runs return `false` untouched.
    pub fn call(&self, point: HookPoint, route: Option<&Route>, response: &mut Response) -> bool {
        if !self.has_hooks(point) {
            return false;
        }
        let Some(_guard) = DispatchGuard::enter(self.address()) else {
            debug!(category = "hooks", point = ?point, "hook re-entrancy suppressed");
            return false;
        };

        let mut handled = false;
        let mut ctx = HookContext {
            point,
            route,
            response,
            bus: self,
        };
        for hook in self.hooks.get(&point).into_iter().flatten() {
            handled |= hook(&mut ctx);
        }
        debug!(category = "hooks", point = ?point, handled, "hooks called");
        handled
    }
}
