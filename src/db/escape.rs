//! String escaping utilities for SQL literals and identifiers.

/// Escape a string for use inside a SQL literal delimited by `quote_char`.
///
/// SQL doubles the delimiter instead of backslash-escaping it. NUL bytes are
/// dropped since neither postgres nor sqlite accept them inside text.
pub fn escape_string_for_quote(s: &str, quote_char: char) -> String {
    let mut result = String::with_capacity(s.len() + 2);
    for c in s.chars() {
        match c {
            '\0' => {}
            c if c == quote_char => {
                result.push(c);
                result.push(c);
            }
            c => result.push(c),
        }
    }
    result
}

/// Escape a string for a single-quoted SQL literal.
#[inline]
pub fn escape_string(s: &str) -> String {
    escape_string_for_quote(s, '\'')
}

/// Escape LIKE wildcards with `escape_char`.
///
/// Runs as a single pass over the input, so the escape character is
/// prefixed exactly once for every occurrence of itself, `%` and `_`. A
/// sequential replace (`%`, then `_`, then the escape char) would escape
/// the prefixes it just inserted.
pub fn escape_like_wildcards(s: &str, escape_char: char) -> String {
    let mut result = String::with_capacity(s.len() * 2);
    for c in s.chars() {
        if c == escape_char || c == '%' || c == '_' {
            result.push(escape_char);
        }
        result.push(c);
    }
    result
}

/// Wrap an identifier in `quote_char`, doubling embedded quotes.
pub fn quote_identifier(ident: &str, quote_char: char) -> String {
    format!(
        "{q}{}{q}",
        escape_string_for_quote(ident, quote_char),
        q = quote_char
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn test_escape_string_basic() {
        assert_eq!(escape_string("hello"), "hello");
    }

    #[rstest]
    fn test_escape_string_with_quotes() {
        assert_eq!(escape_string("O'Reilly"), "O''Reilly");
    }

    #[rstest]
    fn test_escape_string_drops_nul() {
        assert_eq!(escape_string("a\0b"), "ab");
    }

    #[rstest]
    #[case("50%", "50!%")]
    #[case("a_b", "a!_b")]
    #[case("wow!", "wow!!")]
    #[case("!%", "!!!%")]
    #[case("plain", "plain")]
    fn test_escape_like_wildcards(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(escape_like_wildcards(input, '!'), expected);
    }

    #[rstest]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("user", '"'), "\"user\"");
        assert_eq!(quote_identifier("we\"ird", '"'), "\"we\"\"ird\"");
    }
}
