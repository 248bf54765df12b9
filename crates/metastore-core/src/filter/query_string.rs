//! The lightweight query-string grammar (`spec.md` §4.A).
//!
//! `status:active owner:"data-team@apphub.dev" version>=2` parses into an
//! `and` group of conditions. Tokens are whitespace-separated, with
//! single- or double-quoted strings preserving embedded spaces and
//! backslash escapes. Fields outside the recognised column set are
//! implicitly addressed under `metadata.`.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::columns;
use super::{Condition, FilterError, FilterNode, GroupOperator, Operator};

/// Operators in priority order: longest / most specific match wins.
const OPERATORS: &[(&str, Operator)] = &[
    ("!=", Operator::Neq),
    (">=", Operator::Gte),
    ("<=", Operator::Lte),
    (">", Operator::Gt),
    ("<", Operator::Lt),
    (":", Operator::Eq),
    ("=", Operator::Eq),
];

static FIELD_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_.-]+$").unwrap());
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^-?\d+(?:\.\d+)?$").unwrap());

/// Parse a whole query string into a filter tree.
pub fn parse_query_string(input: &str) -> Result<FilterNode, FilterError> {
    let tokens = tokenize(input)?;
    let conditions = tokens
        .iter()
        .map(|t| parse_token(t).map(FilterNode::Condition))
        .collect::<Result<Vec<_>, _>>()?;

    match conditions.len() {
        0 => Ok(FilterNode::Group {
            operator: GroupOperator::And,
            filters: vec![],
        }),
        1 => Ok(conditions.into_iter().next().unwrap()),
        _ => Ok(FilterNode::Group {
            operator: GroupOperator::And,
            filters: conditions,
        }),
    }
}

/// Split whitespace-separated tokens, keeping quoted spans (which may
/// contain whitespace) intact.
fn tokenize(input: &str) -> Result<Vec<String>, FilterError> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut chars = input.chars().peekable();
    let mut in_quote: Option<char> = None;
    let mut has_content = false;

    while let Some(c) = chars.next() {
        if let Some(q) = in_quote {
            if c == '\\' {
                if let Some(&next) = chars.peek() {
                    current.push(next);
                    chars.next();
                    continue;
                }
                return Err(FilterError::UnterminatedQuote);
            }
            if c == q {
                in_quote = None;
                continue;
            }
            current.push(c);
            continue;
        }

        match c {
            '"' | '\'' => {
                in_quote = Some(c);
                has_content = true;
            }
            c if c.is_whitespace() => {
                if has_content {
                    tokens.push(std::mem::take(&mut current));
                    has_content = false;
                }
            }
            _ => {
                current.push(c);
                has_content = true;
            }
        }
    }

    if in_quote.is_some() {
        return Err(FilterError::UnterminatedQuote);
    }
    if has_content {
        tokens.push(current);
    }
    Ok(tokens)
}

/// Find the earliest, highest-priority operator occurring outside any
/// quoted span within a single (already-dequoted at the token level)
/// token, splitting it into `(field, operator, raw_value)`.
fn split_operator(token: &str) -> Result<(&str, Operator, &str), FilterError> {
    let bytes = token.as_bytes();
    let mut in_quote: Option<u8> = None;
    let mut i = 0usize;
    while i < bytes.len() {
        let b = bytes[i];
        if let Some(q) = in_quote {
            if b == q {
                in_quote = None;
            }
            i += 1;
            continue;
        }
        if b == b'"' || b == b'\'' {
            in_quote = Some(b);
            i += 1;
            continue;
        }
        for (op_str, op) in OPERATORS {
            if token[i..].starts_with(op_str) {
                let field = &token[..i];
                let value = &token[i + op_str.len()..];
                return Ok((field, *op, value));
            }
        }
        i += 1;
    }
    Err(FilterError::NoOperatorInToken(token.to_string()))
}

fn dequote_value(raw: &str) -> Result<String, FilterError> {
    let mut out = String::new();
    let mut chars = raw.chars().peekable();
    let mut in_quote: Option<char> = None;
    while let Some(c) = chars.next() {
        if let Some(q) = in_quote {
            if c == '\\' {
                if let Some(&next) = chars.peek() {
                    out.push(next);
                    chars.next();
                    continue;
                }
                return Err(FilterError::UnterminatedQuote);
            }
            if c == q {
                in_quote = None;
                continue;
            }
            out.push(c);
            continue;
        }
        match c {
            '"' | '\'' => in_quote = Some(c),
            '\\' => {
                if let Some(&next) = chars.peek() {
                    out.push(next);
                    chars.next();
                }
            }
            other => out.push(other),
        }
    }
    if in_quote.is_some() {
        return Err(FilterError::UnterminatedQuote);
    }
    Ok(out)
}

fn coerce_value(raw: &str) -> Value {
    if raw == "null" {
        Value::Null
    } else if raw == "true" {
        Value::Bool(true)
    } else if raw == "false" {
        Value::Bool(false)
    } else if NUMBER_RE.is_match(raw) {
        serde_json::from_str::<serde_json::Number>(raw)
            .map(Value::Number)
            .unwrap_or_else(|_| Value::String(raw.to_string()))
    } else {
        Value::String(raw.to_string())
    }
}

fn parse_token(token: &str) -> Result<Condition, FilterError> {
    let (field_raw, operator, value_raw) = split_operator(token)?;
    let field_raw = field_raw.trim();
    if field_raw.is_empty() || !FIELD_RE.is_match(field_raw) {
        return Err(FilterError::Malformed(format!(
            "invalid field name {field_raw:?}"
        )));
    }
    let field = if columns::is_recognized(field_raw) || field_raw.starts_with("metadata.") {
        field_raw.to_string()
    } else {
        format!("metadata.{field_raw}")
    };
    let value_str = dequote_value(value_raw)?;
    let value = coerce_value(&value_str);

    Ok(Condition {
        field,
        operator,
        value: Some(value),
        values: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn single_token_parses_to_condition() {
        let node = parse_query_string("status:active").unwrap();
        match node {
            FilterNode::Condition(c) => {
                assert_eq!(c.field, "metadata.status");
                assert_eq!(c.operator, Operator::Eq);
                assert_eq!(c.value, Some(json!("active")));
            }
            other => panic!("expected condition, got {other:?}"),
        }
    }

    #[test]
    fn multiple_tokens_combine_with_and() {
        let node = parse_query_string(r#"namespace:analytics owner:"data team""#).unwrap();
        match node {
            FilterNode::Group { operator, filters } => {
                assert_eq!(operator, GroupOperator::And);
                assert_eq!(filters.len(), 2);
            }
            other => panic!("expected group, got {other:?}"),
        }
    }

    #[test]
    fn quoted_values_preserve_spaces_and_escapes() {
        let node = parse_query_string(r#"owner:"a\"b c""#).unwrap();
        match node {
            FilterNode::Condition(c) => assert_eq!(c.value, Some(json!("a\"b c"))),
            other => panic!("expected condition, got {other:?}"),
        }
    }

    #[test]
    fn recognized_columns_are_not_prefixed() {
        let node = parse_query_string("namespace:analytics").unwrap();
        match node {
            FilterNode::Condition(c) => assert_eq!(c.field, "namespace"),
            other => panic!("expected condition, got {other:?}"),
        }
    }

    #[test]
    fn numeric_and_boolean_values_are_coerced() {
        let node = parse_query_string("version>=2").unwrap();
        match node {
            FilterNode::Condition(c) => {
                assert_eq!(c.operator, Operator::Gte);
                assert_eq!(c.value, Some(json!(2)));
            }
            other => panic!("expected condition, got {other:?}"),
        }
    }

    #[test]
    fn longest_operator_wins_over_prefix() {
        let node = parse_query_string("version!=2").unwrap();
        match node {
            FilterNode::Condition(c) => assert_eq!(c.operator, Operator::Neq),
            other => panic!("expected condition, got {other:?}"),
        }
    }

    #[test]
    fn unterminated_quote_is_rejected() {
        let err = parse_query_string(r#"owner:"unterminated"#).unwrap_err();
        assert_eq!(err, FilterError::UnterminatedQuote);
    }

    #[test]
    fn missing_operator_is_rejected() {
        let err = parse_query_string("justafield").unwrap_err();
        assert!(matches!(err, FilterError::NoOperatorInToken(_)));
    }
}
