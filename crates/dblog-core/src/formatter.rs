//! Best-effort SQL pretty-printing for log lines.
//!
//! Tokenization is whitespace-only; this is not a SQL parser. A keyword
//! inside a string literal or a quoted identifier gets a line break like any
//! other keyword. The output is meant for humans reading logs.
//!
//! ```
//! use dblog_core::formatter::{format_query_with_args, Args};
//! use dblog_core::Value;
//!
//! let args = [Value::from(1)];
//! let out = format_query_with_args("SELECT id FROM users WHERE id = $1", Some(Args::Positional(&args)));
//! assert!(out.ends_with("Args:\n      [1]"));
//! ```

use std::any::Any;
use std::collections::HashSet;
use std::fmt::Write;

use once_cell::sync::Lazy;

use crate::value::{NamedValue, Value};

/// Header line opening every formatted script.
pub const SCRIPT_HEADER: &str = "Script:";

/// Header line opening the argument block.
pub const ARGS_HEADER: &str = "Args:";

/// Indentation placed before every keyword that starts a new line.
pub const KEYWORD_INDENT: &str = "        ";

/// Indentation of the bracketed argument line.
pub const ARGS_INDENT: &str = "      ";

/// Rendered in place of arguments whose container shape is not recognized.
pub const UNKNOWN_ARGS_PLACEHOLDER: &str = "#unknown_value";

// Both cases are stored so lookups are a single exact-token probe.
static KEYWORDS: Lazy<HashSet<String>> = Lazy::new(|| {
    [
        "SELECT", "FROM", "INSERT", "WHERE", "GROUP", "ORDER", "LIMIT", "VALUES", "UPDATE", "SET",
        "DELETE", "LEFT", "RIGHT", "INNER", "OUTER", "FULL", "JOIN", "ON", "USING", "HAVING",
        "DISTINCT", "AS", "CASE", "WHEN", "THEN", "ELSE", "END", "UNION", "INTERSECT", "EXCEPT",
        "ALL", "CREATE", "ALTER", "DROP", "TRUNCATE", "WITH", "RETURNING", "OFFSET",
    ]
    .iter()
    .flat_map(|kw| [kw.to_string(), kw.to_lowercase()])
    .collect()
});

/// Returns true if `token` is exactly one of the line-breaking keywords.
pub fn is_keyword(token: &str) -> bool {
    KEYWORDS.contains(token)
}

/// Argument list accepted by [`format_query_with_args`].
#[derive(Debug, Clone, Copy)]
pub enum Args<'a> {
    /// Ordered positional values.
    Positional(&'a [Value]),
    /// Ordered named values; only the values are rendered.
    Named(&'a [NamedValue]),
    /// A container of some other shape.
    Unrecognized,
}

impl<'a> Args<'a> {
    /// Classify a type-erased argument container.
    ///
    /// `Vec<Value>` and `Vec<NamedValue>` are recognized; anything else
    /// becomes `Unrecognized`.
    pub fn from_any(args: &'a dyn Any) -> Self {
        if let Some(values) = args.downcast_ref::<Vec<Value>>() {
            Args::Positional(values)
        } else if let Some(named) = args.downcast_ref::<Vec<NamedValue>>() {
            Args::Named(named)
        } else {
            Args::Unrecognized
        }
    }
}

impl<'a> From<&'a [Value]> for Args<'a> {
    fn from(values: &'a [Value]) -> Self {
        Args::Positional(values)
    }
}

impl<'a> From<&'a [NamedValue]> for Args<'a> {
    fn from(named: &'a [NamedValue]) -> Self {
        Args::Named(named)
    }
}

/// Format a query so each clause keyword starts its own indented line.
pub fn format_query(sql: &str) -> String {
    let mut out = String::with_capacity(SCRIPT_HEADER.len() + sql.len() * 2);
    out.push_str(SCRIPT_HEADER);

    for token in sql.split_whitespace() {
        if is_keyword(token) {
            out.push('\n');
            out.push_str(KEYWORD_INDENT);
        } else {
            out.push(' ');
        }
        out.push_str(token);
    }

    out
}

/// Format a query followed by its arguments.
///
/// `None` means no argument list at all and yields exactly
/// [`format_query`]'s output.
pub fn format_query_with_args(sql: &str, args: Option<Args<'_>>) -> String {
    let mut out = format_query(sql);

    let Some(args) = args else {
        return out;
    };

    out.push('\n');
    out.push_str(ARGS_HEADER);
    out.push('\n');
    out.push_str(ARGS_INDENT);
    out.push('[');

    match args {
        Args::Positional(values) => write_joined(&mut out, values.iter()),
        Args::Named(named) => write_joined(&mut out, named.iter().map(|n| &n.value)),
        Args::Unrecognized => out.push_str(UNKNOWN_ARGS_PLACEHOLDER),
    }

    out.push(']');
    out
}

fn write_joined<'v>(out: &mut String, values: impl Iterator<Item = &'v Value>) {
    for (i, value) in values.enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        // Writing into a String cannot fail.
        let _ = write!(out, "{}", value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SELECT_BY_ID: &str = "SELECT id FROM users WHERE id = $1";

    #[test]
    fn test_format_query_breaks_before_keywords() {
        assert_eq!(
            format_query(SELECT_BY_ID),
            "Script:\n        SELECT id\n        FROM users\n        WHERE id = $1"
        );
    }

    #[test]
    fn test_format_query_is_deterministic() {
        let sql = "select a, b from t left join u on t.id = u.id order by a limit 10";
        assert_eq!(format_query(sql), format_query(sql));
    }

    #[test]
    fn test_lowercase_keywords_match() {
        assert_eq!(
            format_query("select id from users"),
            "Script:\n        select id\n        from users"
        );
    }

    #[test]
    fn test_mixed_case_keyword_does_not_match() {
        assert_eq!(format_query("Select id"), "Script: Select id");
    }

    #[test]
    fn test_substring_does_not_match() {
        // "orders" and "selection" contain keywords but are not keywords.
        assert_eq!(
            format_query("SELECT selection FROM orders"),
            "Script:\n        SELECT selection\n        FROM orders"
        );
    }

    #[test]
    fn test_whitespace_is_normalized() {
        assert_eq!(
            format_query("  SELECT\tid\n\n FROM   users  "),
            "Script:\n        SELECT id\n        FROM users"
        );
    }

    #[test]
    fn test_empty_query() {
        assert_eq!(format_query(""), "Script:");
        assert_eq!(format_query("   "), "Script:");
    }

    #[test]
    fn test_closing_paren_never_starts_a_line() {
        let out = format_query("INSERT INTO users (name, email) VALUES ($1, $2) RETURNING id");
        assert!(out.lines().all(|line| !line.trim_start().starts_with(')')));
        assert_eq!(
            out,
            "Script:\n        INSERT INTO users (name, email)\n        VALUES ($1, $2)\n        RETURNING id"
        );
    }

    #[test]
    fn test_malformed_sql_rendered_as_is() {
        assert_eq!(format_query("FROM FROM ((("), "Script:\n        FROM\n        FROM (((");
    }

    #[test]
    fn test_with_args_none_equals_format_query() {
        assert_eq!(
            format_query_with_args(SELECT_BY_ID, None),
            format_query(SELECT_BY_ID)
        );
        assert!(!format_query_with_args(SELECT_BY_ID, None).contains(ARGS_HEADER));
    }

    #[test]
    fn test_positional_and_named_render_the_same() {
        let positional = [Value::from(1)];
        let named = [NamedValue::named("x", 1, 1)];

        let a = format_query_with_args(SELECT_BY_ID, Some(Args::Positional(&positional)));
        let b = format_query_with_args(SELECT_BY_ID, Some(Args::Named(&named)));

        assert!(a.ends_with("\nArgs:\n      [1]"));
        assert_eq!(a, b);
    }

    #[test]
    fn test_multiple_args_comma_separated_in_order() {
        let args = [Value::from("Bill Doe"), Value::from("b.example@example.com")];
        let out = format_query_with_args(
            "INSERT INTO users (name, email) VALUES ($1, $2)",
            Some(Args::Positional(&args)),
        );
        assert!(out.ends_with("Args:\n      [Bill Doe, b.example@example.com]"));
    }

    #[test]
    fn test_empty_arg_list_renders_empty_brackets() {
        let out = format_query_with_args("SELECT 1", Some(Args::Positional(&[])));
        assert!(out.ends_with("Args:\n      []"));
    }

    #[test]
    fn test_unrecognized_args_render_placeholder() {
        let out = format_query_with_args("SELECT 1", Some(Args::Unrecognized));
        assert!(out.ends_with("Args:\n      [#unknown_value]"));
    }

    #[test]
    fn test_from_any_classifies_containers() {
        let positional: Vec<Value> = vec![Value::from(7)];
        let named: Vec<NamedValue> = vec![NamedValue::named("n", 1, 8)];
        let other: Vec<i32> = vec![1, 2];

        assert!(matches!(Args::from_any(&positional), Args::Positional(v) if v.len() == 1));
        assert!(matches!(Args::from_any(&named), Args::Named(v) if v.len() == 1));
        assert!(matches!(Args::from_any(&other), Args::Unrecognized));
    }

    #[test]
    fn test_from_any_unrecognized_does_not_fail() {
        let weird = std::collections::HashMap::<String, i32>::new();
        let out = format_query_with_args("SELECT 1", Some(Args::from_any(&weird)));
        assert!(out.contains(UNKNOWN_ARGS_PLACEHOLDER));
    }

    #[test]
    fn test_is_keyword() {
        assert!(is_keyword("RETURNING"));
        assert!(is_keyword("offset"));
        assert!(!is_keyword("Offset"));
        assert!(!is_keyword("INTO"));
    }
}
