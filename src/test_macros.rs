//! Declarative macros for CLI parsing and output formatting tests.
//!
//! Each macro expands to one or more `#[rstest]` functions. Argument lists
//! start at the subcommand name; the binary name is added by the macro.
//! The calling module must have `crate::cli::Args`, `clap::Parser` and
//! `rstest::rstest` in scope.

/// Parse an argument list and return the subcommand struct for `$variant`.
///
/// Panics with the clap error, or with the command that was parsed instead.
#[macro_export]
macro_rules! parse_command {
    ($variant:ident, [$($arg:expr),* $(,)?]) => {
        match Args::try_parse_from(["mvc_core" $(, $arg)*]).map(|args| args.command) {
            Ok($crate::commands::Command::$variant(cmd)) => cmd,
            #[allow(unreachable_patterns)]
            Ok(other) => panic!("parsed as {:?}", other),
            Err(e) => panic!("{}", e),
        }
    };
}

/// A command line that must parse, with expected field values.
///
/// # Example
///
/// ```ignore
/// cli_parse_test! {
///     test_dsn_defaults: Dsn ["dsn", "sqlite::memory:"] => {
///         dsn: "sqlite::memory:",
///         show_password: false,
///     }
/// }
/// ```
#[macro_export]
macro_rules! cli_parse_test {
    (
        $test_name:ident: $variant:ident [$($arg:literal),+ $(,)?] => {
            $($field:ident : $expected:expr),+ $(,)?
        }
    ) => {
        #[rstest]
        fn $test_name() {
            let cmd = $crate::parse_command!($variant, [$($arg),+]);
            $(
                assert_eq!(cmd.$field, $expected, concat!("field `", stringify!($field), "`"));
            )+
        }
    };
}

/// A command line that must be rejected. With `mentions`, the error text
/// must contain the given string (an argument placeholder such as `<PATH>`).
#[macro_export]
macro_rules! cli_reject_test {
    ($test_name:ident: [$($arg:literal),+ $(,)?] $(mentions $needle:literal)?) => {
        #[rstest]
        fn $test_name() {
            let err = match Args::try_parse_from(["mvc_core" $(, $arg)+]) {
                Ok(args) => panic!("expected a parse error, got {:?}", args.command),
                Err(e) => e.to_string(),
            };
            $(
                assert!(err.contains($needle), "error should mention {}: {}", $needle, err);
            )?
            let _ = err;
        }
    };
}

/// Default and bounds of a `--limit` option.
///
/// Generates `test_limit_default` and a `test_limit_bounds` case table
/// (0 and max+1 rejected, 1 and max accepted).
#[macro_export]
macro_rules! cli_limit_tests {
    (
        $variant:ident [$($arg:literal),+ $(,)?],
        $field:ident: { default: $default:expr, max: $max:expr $(,)? } $(,)?
    ) => {
        #[rstest]
        fn test_limit_default() {
            let cmd = $crate::parse_command!($variant, [$($arg),+]);
            assert_eq!(cmd.$field, $default);
        }

        #[rstest]
        #[case(0, false)]
        #[case(1, true)]
        #[case($max, true)]
        #[case($max + 1, false)]
        fn test_limit_bounds(#[case] limit: u32, #[case] accepted: bool) {
            let limit = limit.to_string();
            let parsed = Args::try_parse_from(["mvc_core" $(, $arg)+, "--limit", limit.as_str()]);
            assert_eq!(parsed.is_ok(), accepted, "--limit {}", limit);
        }
    };
}

/// Formatting expectations for an rstest fixture.
///
/// Every section is optional:
/// - `table`: exact `to_table()` text
/// - `json`: top-level fields of the parsed JSON output
/// - `toon`: substrings of the toon output
///
/// # Example
///
/// ```ignore
/// output_format_tests! {
///     write_result: QueryResult {
///         table test_write_table => WRITE_TABLE;
///         json test_write_json => { "affected_rows": 4 };
///     }
/// }
/// ```
#[macro_export]
macro_rules! output_format_tests {
    (
        $fixture:ident: $fixture_type:ty {
            $(table $table_test:ident => $table:expr;)?
            $(json $json_test:ident => { $($key:literal : $value:expr),+ $(,)? };)?
            $(toon $toon_test:ident => [$($needle:literal),+ $(,)?];)?
        }
    ) => {
        $(
            #[rstest]
            fn $table_test($fixture: $fixture_type) {
                use $crate::output::Outputable;
                assert_eq!($fixture.to_table(), $table);
            }
        )?

        $(
            #[rstest]
            fn $json_test($fixture: $fixture_type) {
                use $crate::output::{OutputFormat, Outputable};
                let parsed: serde_json::Value =
                    serde_json::from_str(&$fixture.format(OutputFormat::Json))
                        .expect("output should be valid JSON");
                $(
                    assert_eq!(parsed[$key], $value, concat!("JSON field `", $key, "`"));
                )+
            }
        )?

        $(
            #[rstest]
            fn $toon_test($fixture: $fixture_type) {
                use $crate::output::{OutputFormat, Outputable};
                let output = $fixture.format(OutputFormat::Toon);
                $(
                    assert!(output.contains($needle), "toon output lacks {:?}:\n{}", $needle, output);
                )+
            }
        )?
    };
}
