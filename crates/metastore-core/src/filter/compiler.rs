//! SQL emission (`spec.md` §4.A).
//!
//! Walks a [`FilterNode`] and produces a [`CompiledFilter`]: an ordered
//! list of raw SQL fragments interleaved with typed bind values. Callers
//! replay the parts into a `sqlx::QueryBuilder`, pushing every [`SqlValue`]
//! through `push_bind` — user-supplied values never reach the SQL text,
//! which is the property asserted in `spec.md` §8 item 6.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

use super::columns;
use super::{Condition, FilterError, FilterNode, GroupOperator, Operator};
use crate::models::record::Record;

static PATH_SEGMENT_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// A value bound into the emitted SQL via a placeholder, never
/// interpolated into the text.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlValue {
    Text(String),
    Int(i64),
    Float(f64),
    Bool(bool),
    Json(Value),
    TextArray(Vec<String>),
}

/// One piece of the compiled WHERE clause: either static SQL text or a
/// value to be bound at that position.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlPart {
    Raw(String),
    Bind(SqlValue),
}

/// The compiled form of a filter tree, ready to be replayed into a
/// query builder.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompiledFilter {
    pub parts: Vec<SqlPart>,
}

impl CompiledFilter {
    /// Number of bind placeholders this fragment will consume.
    pub fn bind_count(&self) -> usize {
        self.parts
            .iter()
            .filter(|p| matches!(p, SqlPart::Bind(_)))
            .count()
    }

    /// The concatenation of all raw SQL text, for tests/logging only —
    /// never executed directly against a connection.
    pub fn sql_text(&self) -> String {
        self.parts
            .iter()
            .map(|p| match p {
                SqlPart::Raw(s) => s.clone(),
                SqlPart::Bind(_) => "$".to_string(),
            })
            .collect()
    }
}

struct Ctx {
    parts: Vec<SqlPart>,
    alias_counter: usize,
}

impl Ctx {
    fn raw(&mut self, s: impl Into<String>) {
        self.parts.push(SqlPart::Raw(s.into()));
    }

    fn bind(&mut self, v: SqlValue) {
        self.parts.push(SqlPart::Bind(v));
    }

    fn next_alias(&mut self) -> String {
        self.alias_counter += 1;
        format!("elem_{}", self.alias_counter)
    }
}

/// Compile a filter tree into parameterised SQL.
pub fn compile(node: &FilterNode) -> Result<CompiledFilter, FilterError> {
    let mut ctx = Ctx {
        parts: Vec::new(),
        alias_counter: 0,
    };
    compile_node(node, &mut ctx)?;
    Ok(CompiledFilter { parts: ctx.parts })
}

fn compile_node(node: &FilterNode, ctx: &mut Ctx) -> Result<(), FilterError> {
    match node {
        FilterNode::Condition(c) => compile_condition(c, ctx),
        FilterNode::Not { filter } => {
            ctx.raw("NOT (");
            compile_node(filter, ctx)?;
            ctx.raw(")");
            Ok(())
        }
        FilterNode::Group { operator, filters } => {
            let sep = match operator {
                GroupOperator::And => " AND ",
                GroupOperator::Or => " OR ",
            };
            ctx.raw("(");
            for (i, f) in filters.iter().enumerate() {
                if i > 0 {
                    ctx.raw(sep);
                }
                compile_node(f, ctx)?;
            }
            ctx.raw(")");
            Ok(())
        }
    }
}

fn compile_condition(c: &Condition, ctx: &mut Ctx) -> Result<(), FilterError> {
    if let Some(col) = columns::sql_column(&c.field) {
        compile_scalar(col, &c.field, c, ctx)
    } else if let Some(path) = c.field.strip_prefix("metadata.") {
        let segments = validate_path(path)?;
        compile_json_path(&segments, c, ctx)
    } else {
        Err(FilterError::UnknownField(c.field.clone()))
    }
}

fn validate_path(path: &str) -> Result<Vec<String>, FilterError> {
    path.split('.')
        .map(|seg| {
            if seg.is_empty() || !PATH_SEGMENT_RE.is_match(seg) {
                Err(FilterError::InvalidPathSegment(seg.to_string()))
            } else {
                Ok(seg.to_string())
            }
        })
        .collect()
}

fn require_value<'a>(c: &'a Condition) -> Result<&'a Value, FilterError> {
    c.value.as_ref().ok_or_else(|| FilterError::MissingValue {
        field: c.field.clone(),
        expected: "a value",
    })
}

fn require_between_values(c: &Condition) -> Result<(&Value, &Value), FilterError> {
    match c.values.as_deref() {
        Some([a, b]) => Ok((a, b)),
        _ => Err(FilterError::MissingValue {
            field: c.field.clone(),
            expected: "exactly two values",
        }),
    }
}

fn unsupported(field: &str, operator: Operator) -> FilterError {
    FilterError::UnsupportedOperator {
        field: field.to_string(),
        operator: operator.as_str().to_string(),
    }
}

fn scalar_bind(field: &str, value: &Value) -> SqlValue {
    match field {
        "version" => value
            .as_i64()
            .map(SqlValue::Int)
            .unwrap_or_else(|| SqlValue::Text(value_to_text(value))),
        "tags" => SqlValue::TextArray(
            value
                .as_array()
                .map(|a| a.iter().map(value_to_text).collect())
                .unwrap_or_else(|| vec![value_to_text(value)]),
        ),
        _ => SqlValue::Text(value_to_text(value)),
    }
}

fn value_to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn is_timestamp_column(field: &str) -> bool {
    matches!(field, "createdAt" | "updatedAt" | "deletedAt")
}

fn compile_scalar(col: &str, field: &str, c: &Condition, ctx: &mut Ctx) -> Result<(), FilterError> {
    let cast = if is_timestamp_column(field) {
        "::timestamptz"
    } else {
        ""
    };
    match c.operator {
        Operator::Eq => {
            let value = require_value(c)?;
            ctx.raw(format!("{col} = "));
            ctx.bind(scalar_bind(field, value));
            ctx.raw(cast);
        }
        Operator::Neq => {
            let value = require_value(c)?;
            ctx.raw(format!("{col} IS DISTINCT FROM "));
            ctx.bind(scalar_bind(field, value));
            ctx.raw(cast);
        }
        Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
            let value = require_value(c)?;
            let op = match c.operator {
                Operator::Lt => "<",
                Operator::Lte => "<=",
                Operator::Gt => ">",
                Operator::Gte => ">=",
                _ => unreachable!(),
            };
            ctx.raw(format!("{col} {op} "));
            ctx.bind(scalar_bind(field, value));
            ctx.raw(cast);
        }
        Operator::Between => {
            let (a, b) = require_between_values(c)?;
            ctx.raw(format!("{col} BETWEEN "));
            ctx.bind(scalar_bind(field, a));
            ctx.raw(cast);
            ctx.raw(" AND ");
            ctx.bind(scalar_bind(field, b));
            ctx.raw(cast);
        }
        Operator::Contains => {
            if !columns::is_array_column(field) {
                return Err(unsupported(field, c.operator));
            }
            let value = require_value(c)?;
            ctx.raw(format!("{col} @> "));
            ctx.bind(scalar_bind(field, value));
        }
        Operator::ArrayContains => {
            if !columns::is_array_column(field) {
                return Err(unsupported(field, c.operator));
            }
            let values: Vec<String> = match (&c.values, &c.value) {
                (Some(vs), _) => vs.iter().map(value_to_text).collect(),
                (None, Some(v)) => vec![value_to_text(v)],
                _ => {
                    return Err(FilterError::MissingValue {
                        field: field.to_string(),
                        expected: "a value",
                    })
                }
            };
            ctx.raw(format!("{col} && "));
            ctx.bind(SqlValue::TextArray(values));
        }
        Operator::HasKey => return Err(unsupported(field, c.operator)),
        Operator::Exists => {
            ctx.raw(format!("{col} IS NOT NULL"));
        }
    }
    Ok(())
}

fn compile_json_path(segments: &[String], c: &Condition, ctx: &mut Ctx) -> Result<(), FilterError> {
    let path = SqlValue::TextArray(segments.to_vec());
    match c.operator {
        Operator::Eq => {
            let value = require_value(c)?;
            ctx.raw("metadata #> ");
            ctx.bind(path);
            ctx.raw(" = ");
            ctx.bind(SqlValue::Json(value.clone()));
        }
        Operator::Neq => {
            let value = require_value(c)?;
            ctx.raw("metadata #> ");
            ctx.bind(path);
            ctx.raw(" IS DISTINCT FROM ");
            ctx.bind(SqlValue::Json(value.clone()));
        }
        Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
            let value = require_value(c)?;
            let op = match c.operator {
                Operator::Lt => "<",
                Operator::Lte => "<=",
                Operator::Gt => ">",
                Operator::Gte => ">=",
                _ => unreachable!(),
            };
            ctx.raw("metadata #>> ");
            ctx.bind(path);
            ctx.raw(format!(" {op} "));
            ctx.bind(SqlValue::Text(value_to_text(value)));
        }
        Operator::Between => {
            let (a, b) = require_between_values(c)?;
            ctx.raw("metadata #>> ");
            ctx.bind(path.clone());
            ctx.raw(" BETWEEN ");
            ctx.bind(SqlValue::Text(value_to_text(a)));
            ctx.raw(" AND ");
            ctx.bind(SqlValue::Text(value_to_text(b)));
        }
        Operator::Contains => {
            let value = require_value(c)?;
            ctx.raw("metadata #> ");
            ctx.bind(path);
            ctx.raw(" @> ");
            ctx.bind(SqlValue::Json(value.clone()));
        }
        Operator::ArrayContains => {
            let value = require_value(c)?;
            let alias = ctx.next_alias();
            ctx.raw(format!("EXISTS (SELECT 1 FROM jsonb_array_elements(metadata #> "));
            ctx.bind(path);
            ctx.raw(format!(") {alias} WHERE {alias}.value @> "));
            ctx.bind(SqlValue::Json(value.clone()));
            ctx.raw(")");
        }
        Operator::HasKey => {
            let value = require_value(c)?;
            let key = value
                .as_str()
                .ok_or_else(|| FilterError::Malformed("has_key value must be a string".to_string()))?;
            ctx.raw("(metadata #> ");
            ctx.bind(path);
            ctx.raw(") ? ");
            ctx.bind(SqlValue::Text(key.to_string()));
        }
        Operator::Exists => {
            ctx.raw("metadata #> ");
            ctx.bind(path);
            ctx.raw(" IS NOT NULL");
        }
    }
    Ok(())
}

/// Evaluate a filter tree directly against a record, without going
/// through SQL — used by [`crate::db::memory::InMemoryStore`], which has
/// no query engine to hand the compiled form to.
pub fn evaluate(node: &FilterNode, record: &Record) -> Result<bool, FilterError> {
    match node {
        FilterNode::Condition(c) => evaluate_condition(c, record),
        FilterNode::Not { filter } => Ok(!evaluate(filter, record)?),
        FilterNode::Group { operator, filters } => {
            let mut results = filters.iter().map(|f| evaluate(f, record));
            match operator {
                GroupOperator::And => results.try_fold(true, |acc, r| Ok(acc && r?)),
                GroupOperator::Or => results.try_fold(false, |acc, r| Ok(acc || r?)),
            }
        }
    }
}

fn evaluate_condition(c: &Condition, record: &Record) -> Result<bool, FilterError> {
    if let Some(_col) = columns::sql_column(&c.field) {
        evaluate_scalar(&c.field, c, record)
    } else if let Some(path) = c.field.strip_prefix("metadata.") {
        let segments = validate_path(path)?;
        let target = walk_path(&record.metadata, &segments);
        evaluate_json(target, c)
    } else {
        Err(FilterError::UnknownField(c.field.clone()))
    }
}

fn field_value(field: &str, record: &Record) -> Value {
    match field {
        "namespace" => Value::String(record.namespace.clone()),
        "key" => Value::String(record.key.clone()),
        "owner" => record.owner.clone().map(Value::String).unwrap_or(Value::Null),
        "schemaHash" => record.schema_hash.clone().map(Value::String).unwrap_or(Value::Null),
        "version" => Value::from(record.version),
        "createdAt" => Value::String(record.created_at.to_rfc3339()),
        "updatedAt" => Value::String(record.updated_at.to_rfc3339()),
        "deletedAt" => record.deleted_at.map(|d| Value::String(d.to_rfc3339())).unwrap_or(Value::Null),
        "createdBy" => record.created_by.clone().map(Value::String).unwrap_or(Value::Null),
        "updatedBy" => record.updated_by.clone().map(Value::String).unwrap_or(Value::Null),
        "tags" => Value::Array(record.tags.iter().cloned().map(Value::String).collect()),
        _ => Value::Null,
    }
}

fn evaluate_scalar(field: &str, c: &Condition, record: &Record) -> Result<bool, FilterError> {
    let current = field_value(field, record);
    match c.operator {
        Operator::Eq => Ok(current == *require_value(c)?),
        Operator::Neq => Ok(current != *require_value(c)?),
        Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
            let value = require_value(c)?;
            Ok(compare_ordering(&current, value)
                .map(|ord| matches_ordering(c.operator, ord))
                .unwrap_or(false))
        }
        Operator::Between => {
            let (a, b) = require_between_values(c)?;
            Ok(compare_ordering(&current, a).map(|o| o.is_ge()).unwrap_or(false)
                && compare_ordering(&current, b).map(|o| o.is_le()).unwrap_or(false))
        }
        Operator::Contains => {
            if !columns::is_array_column(field) {
                return Err(unsupported(field, c.operator));
            }
            let value = require_value(c)?;
            let needle = value_to_text(value);
            Ok(record.tags.iter().any(|t| t == &needle))
        }
        Operator::ArrayContains => {
            if !columns::is_array_column(field) {
                return Err(unsupported(field, c.operator));
            }
            let needles: Vec<String> = match (&c.values, &c.value) {
                (Some(vs), _) => vs.iter().map(value_to_text).collect(),
                (None, Some(v)) => vec![value_to_text(v)],
                _ => {
                    return Err(FilterError::MissingValue {
                        field: field.to_string(),
                        expected: "a value",
                    })
                }
            };
            Ok(needles.iter().any(|n| record.tags.iter().any(|t| t == n)))
        }
        Operator::HasKey => Err(unsupported(field, c.operator)),
        Operator::Exists => Ok(!current.is_null()),
    }
}

fn walk_path<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |current, segment| current.get(segment))
}

fn evaluate_json(target: Option<&Value>, c: &Condition) -> Result<bool, FilterError> {
    match c.operator {
        Operator::Eq => Ok(target == Some(require_value(c)?)),
        Operator::Neq => Ok(target != Some(require_value(c)?)),
        Operator::Lt | Operator::Lte | Operator::Gt | Operator::Gte => {
            let value = require_value(c)?;
            Ok(target
                .and_then(|t| compare_ordering(t, value))
                .map(|ord| matches_ordering(c.operator, ord))
                .unwrap_or(false))
        }
        Operator::Between => {
            let (a, b) = require_between_values(c)?;
            Ok(target.map(|t| {
                compare_ordering(t, a).map(|o| o.is_ge()).unwrap_or(false)
                    && compare_ordering(t, b).map(|o| o.is_le()).unwrap_or(false)
            })
            .unwrap_or(false))
        }
        Operator::Contains => {
            let value = require_value(c)?;
            Ok(match target {
                Some(Value::Array(items)) => items.contains(value),
                Some(Value::Object(_)) => target == Some(value),
                _ => false,
            })
        }
        Operator::ArrayContains => {
            let value = require_value(c)?;
            Ok(match target {
                Some(Value::Array(items)) => items.contains(value),
                _ => false,
            })
        }
        Operator::HasKey => {
            let value = require_value(c)?;
            let key = value
                .as_str()
                .ok_or_else(|| FilterError::Malformed("has_key value must be a string".to_string()))?;
            Ok(matches!(target, Some(Value::Object(obj)) if obj.contains_key(key)))
        }
        Operator::Exists => Ok(target.is_some() && target != Some(&Value::Null)),
    }
}

fn compare_ordering(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(a), Some(b)) = (a.as_f64(), b.as_f64()) {
        return a.partial_cmp(&b);
    }
    if let (Some(a), Some(b)) = (a.as_str(), b.as_str()) {
        return Some(a.cmp(b));
    }
    None
}

fn matches_ordering(operator: Operator, ord: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match operator {
        Operator::Lt => ord == Less,
        Operator::Lte => ord != Greater,
        Operator::Gt => ord == Greater,
        Operator::Gte => ord != Less,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::parse::parse_filter;
    use serde_json::json;

    fn bind_only_parts(compiled: &CompiledFilter) -> usize {
        compiled.bind_count()
    }

    #[test]
    fn scalar_eq_binds_value_not_literal() {
        let node = parse_filter(&json!({"field": "namespace", "operator": "eq", "value": "analytics"})).unwrap();
        let compiled = compile(&node).unwrap();
        assert_eq!(bind_only_parts(&compiled), 1);
        assert!(!compiled.sql_text().contains("analytics"));
        assert!(compiled.sql_text().contains("namespace ="));
    }

    #[test]
    fn json_path_eq_binds_path_and_value_separately() {
        let node = parse_filter(&json!({
            "field": "metadata.status",
            "operator": "eq",
            "value": "paused"
        }))
        .unwrap();
        let compiled = compile(&node).unwrap();
        assert_eq!(bind_only_parts(&compiled), 2);
        assert!(compiled.sql_text().contains("metadata #>"));
    }

    #[test]
    fn rejects_invalid_path_segment() {
        let node = parse_filter(&json!({
            "field": "metadata.bad segment",
            "operator": "exists"
        }))
        .unwrap();
        let err = compile(&node).unwrap_err();
        assert!(matches!(err, FilterError::InvalidPathSegment(_)));
    }

    #[test]
    fn has_key_rejected_on_scalar_column() {
        let node = parse_filter(&json!({"field": "owner", "operator": "has_key", "value": "x"})).unwrap();
        let err = compile(&node).unwrap_err();
        assert!(matches!(err, FilterError::UnsupportedOperator { .. }));
    }

    #[test]
    fn contains_on_tags_uses_array_containment() {
        let node = parse_filter(&json!({"field": "tags", "operator": "contains", "value": "beta"})).unwrap();
        let compiled = compile(&node).unwrap();
        assert!(compiled.sql_text().contains("tags @>"));
    }

    #[test]
    fn group_and_not_compile_recursively() {
        let node = parse_filter(&json!({
            "type": "not",
            "filter": {
                "type": "group",
                "operator": "or",
                "filters": [
                    {"field": "owner", "operator": "exists"},
                    {"field": "metadata.status", "operator": "eq", "value": "paused"}
                ]
            }
        }))
        .unwrap();
        let compiled = compile(&node).unwrap();
        let text = compiled.sql_text();
        assert!(text.starts_with("NOT (("));
        assert_eq!(bind_only_parts(&compiled), 2);
    }

    #[test]
    fn between_requires_exactly_two_values_at_compile_time() {
        let node = FilterNode::condition("version", Operator::Between, None);
        let err = compile(&node).unwrap_err();
        assert!(matches!(err, FilterError::MissingValue { .. }));
    }
}
