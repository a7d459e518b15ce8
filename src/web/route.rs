//! Resolved routes and the naming convention for controllers and actions.

use std::fmt;

use serde::Serialize;

pub const DEFAULT_ACTION: &str = "index";

/// Upper-case the first character.
pub fn ucfirst(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// `user` -> `UserController`
pub fn controller_class(id: &str) -> String {
    format!("{}Controller", ucfirst(id))
}

/// `view` -> `actionView`
pub fn action_method(id: &str) -> String {
    format!("action{}", ucfirst(id))
}

/// A request target: optional module, controller, action and the
/// positional parameters that followed them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Route {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub module: Option<String>,
    pub controller: String,
    pub action: String,
    pub params: Vec<String>,
}

impl Route {
    pub fn new(controller: &str, action: &str) -> Self {
        Self {
            module: None,
            controller: controller.to_string(),
            action: action.to_string(),
            params: Vec::new(),
        }
    }

    /// `controller[/action[/params...]]`, the action defaulting to `index`.
    pub fn from_segments(segments: &[String]) -> Option<Self> {
        let (controller, rest) = segments.split_first()?;
        let action = rest.first().map_or(DEFAULT_ACTION, String::as_str);
        Some(Self {
            module: None,
            controller: controller.clone(),
            action: action.to_string(),
            params: rest.iter().skip(1).cloned().collect(),
        })
    }

    /// `module[/controller[/action[/params...]]]`.
    pub fn in_module(module: &str, segments: &[String], default_controller: &str) -> Self {
        let mut route = Self::from_segments(segments)
            .unwrap_or_else(|| Self::new(default_controller, DEFAULT_ACTION));
        route.module = Some(module.to_string());
        route
    }

    pub fn controller_class(&self) -> String {
        controller_class(&self.controller)
    }

    pub fn action_method(&self) -> String {
        action_method(&self.action)
    }
}

impl fmt::Display for Route {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(module) = &self.module {
            write!(f, "{}/", module)?;
        }
        write!(f, "{}/{}", self.controller, self.action)
    }
}
