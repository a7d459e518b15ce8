//! Output formatting tests for route command.

#[cfg(test)]
mod tests {
    use super::super::execute::RouteResult;
    use crate::web::uri::Assoc;
    use rstest::{fixture, rstest};

    const VIEW_TABLE: &str = "\
Route: /user/view/id/5/tab

  uri:        user/view/id/5/tab
  routed:     user/view/id/5/tab
  controller: user (UserController)
  action:     view (actionView)
  params:     id, 5, tab

Named params (2):
  id = 5
  tab (no value)";

    const DEFAULT_TABLE: &str = "\
Route: /

  uri:        (empty)
  routed:     site
  controller: site (SiteController)
  action:     index (actionIndex)";

    fn strings(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[fixture]
    fn view_result() -> RouteResult {
        let mut named = Assoc::new();
        named.insert("id".to_string(), Some("5".to_string()));
        named.insert("tab".to_string(), None);
        RouteResult {
            path: "/user/view/id/5/tab".to_string(),
            uri_string: "user/view/id/5/tab".to_string(),
            segments: strings(&["user", "view", "id", "5", "tab"]),
            rsegments: strings(&["user", "view", "id", "5", "tab"]),
            controller: "user".to_string(),
            action: "view".to_string(),
            controller_class: "UserController".to_string(),
            action_method: "actionView".to_string(),
            params: strings(&["id", "5", "tab"]),
            named,
        }
    }

    #[fixture]
    fn default_result() -> RouteResult {
        RouteResult {
            path: "/".to_string(),
            uri_string: String::new(),
            segments: Vec::new(),
            rsegments: strings(&["site"]),
            controller: "site".to_string(),
            action: "index".to_string(),
            controller_class: "SiteController".to_string(),
            action_method: "actionIndex".to_string(),
            params: Vec::new(),
            named: Assoc::new(),
        }
    }

    crate::output_format_tests! {
        view_result: RouteResult {
            table test_to_table_with_params => VIEW_TABLE;
            json test_format_json => {
                "controller_class": "UserController",
                "action_method": "actionView",
                "named": serde_json::json!({"id": "5", "tab": null}),
            };
            toon test_format_toon => ["controller: user", "action_method: actionView"];
        }
    }

    crate::output_format_tests! {
        default_result: RouteResult {
            table test_to_table_default_route => DEFAULT_TABLE;
        }
    }
}
