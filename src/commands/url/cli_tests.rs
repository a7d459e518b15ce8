//! CLI parsing tests for url command using the test DSL.

#[cfg(test)]
mod tests {
    use crate::cli::Args;
    use crate::commands::url::UrlStyle;
    use clap::Parser;
    use rstest::rstest;

    crate::cli_reject_test! {
        test_url_requires_route: ["url"] mentions "<ROUTE>"
    }

    crate::cli_parse_test! {
        test_url_defaults: Url ["url", "user/view"] => {
            route: "user/view",
            params: Vec::<(String, String)>::new(),
            anchor: None::<String>,
            base_url: None::<String>,
            style: None::<UrlStyle>,
        }
    }

    crate::cli_parse_test! {
        test_url_params_keep_order: Url ["url", "user/view", "-p", "z=1", "--param", "a=2"] => {
            params: vec![("z".to_string(), "1".to_string()), ("a".to_string(), "2".to_string())],
        }
    }

    crate::cli_parse_test! {
        test_url_style_and_anchor: Url ["url", "user/view", "--style", "get", "--anchor", "top"] => {
            style: Some(UrlStyle::Get),
            anchor: Some("top".to_string()),
        }
    }

    crate::cli_reject_test! {
        test_url_unknown_style: ["url", "user/view", "--style", "pretty"]
    }
}
