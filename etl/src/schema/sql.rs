//! Rendering of identifiers and literals in warehouse statements.

use std::borrow::Cow;

/// Returns `identifier` ready to be embedded in a statement.
///
/// Plain identifiers are emitted as is and resolve case-insensitively. Anything else is
/// double-quoted, doubling embedded quotes.
pub fn quote_identifier(identifier: &str) -> Cow<'_, str> {
    if is_plain_identifier(identifier) {
        Cow::Borrowed(identifier)
    } else {
        Cow::Owned(format!("\"{}\"", identifier.replace('"', "\"\"")))
    }
}

/// Returns whether `left` and `right` resolve to the same warehouse column.
pub fn same_identifier(left: &str, right: &str) -> bool {
    left == right
        || (left.eq_ignore_ascii_case(right)
            && is_plain_identifier(left)
            && is_plain_identifier(right))
}

fn is_plain_identifier(identifier: &str) -> bool {
    let mut chars = identifier.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {
            chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
        }
        _ => false,
    }
}

/// Returns `value` as a single-quoted string literal.
///
/// Single quotes are doubled and backslashes escaped, since both target dialects treat a
/// backslash inside a literal as an escape character.
pub fn quote_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('\'');
    for c in value.chars() {
        match c {
            '\'' => quoted.push_str("''"),
            '\\' => quoted.push_str("\\\\"),
            c => quoted.push(c),
        }
    }
    quoted.push('\'');
    quoted
}

/// Renders an untyped default value.
///
/// Numeric values are emitted unquoted, everything else as a string literal.
pub fn render_literal(value: &str) -> String {
    if is_numeric_literal(value) {
        value.to_owned()
    } else {
        quote_string(value)
    }
}

fn is_numeric_literal(value: &str) -> bool {
    !value.is_empty()
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || matches!(b, b'+' | b'-' | b'.' | b'e' | b'E'))
        && value.parse::<f64>().is_ok_and(f64::is_finite)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plain_identifiers_are_not_quoted() {
        assert_eq!(quote_identifier("orders"), "orders");
        assert_eq!(quote_identifier("_tmp$1"), "_tmp$1");
    }

    #[test]
    fn other_identifiers_are_quoted() {
        assert_eq!(quote_identifier("order items"), "\"order items\"");
        assert_eq!(quote_identifier("1st"), "\"1st\"");
        assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
    }

    #[test]
    fn numeric_defaults_are_unquoted() {
        assert_eq!(render_literal("0"), "0");
        assert_eq!(render_literal("-1.5"), "-1.5");
        assert_eq!(render_literal("1e3"), "1e3");
    }

    #[test]
    fn non_numeric_defaults_are_quoted_and_escaped() {
        assert_eq!(render_literal("abc"), "'abc'");
        assert_eq!(render_literal("inf"), "'inf'");
        assert_eq!(render_literal("NaN"), "'NaN'");
        assert_eq!(render_literal(""), "''");
        assert_eq!(render_literal("it's"), "'it''s'");
        assert_eq!(render_literal("a\\'; DROP TABLE t; --"), "'a\\\\''; DROP TABLE t; --'");
    }
}
