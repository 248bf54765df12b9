//! Structured filter parser.
//!
//! Accepts a JSON-like node and yields the canonical [`FilterNode`],
//! rejecting unknown operators, empty groups and trees deeper than
//! [`MAX_FILTER_DEPTH`]. A condition whose field has no explicit `type`
//! is inferred as `condition`; the legacy shorthand `{not: …}` coerces to
//! the `not` variant (`spec.md` §4.A).

use serde_json::Value;

use super::{Condition, FilterError, FilterNode, GroupOperator, Operator, MAX_FILTER_DEPTH};

/// Parse a structured filter payload into the canonical tree.
pub fn parse_filter(value: &Value) -> Result<FilterNode, FilterError> {
    parse_at_depth(value, 1)
}

fn parse_at_depth(value: &Value, depth: usize) -> Result<FilterNode, FilterError> {
    if depth > MAX_FILTER_DEPTH {
        return Err(FilterError::TooDeep);
    }
    let obj = value
        .as_object()
        .ok_or_else(|| FilterError::Malformed("filter node must be a JSON object".to_string()))?;

    if let Some(legacy_not) = obj.get("not") {
        if obj.get("type").is_none() {
            let inner = parse_at_depth(legacy_not, depth + 1)?;
            return Ok(FilterNode::Not {
                filter: Box::new(inner),
            });
        }
    }

    let node_type = obj
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or("condition");

    match node_type {
        "condition" => parse_condition(obj).map(FilterNode::Condition),
        "group" => parse_group(obj, depth),
        "not" => {
            let inner_value = obj
                .get("filter")
                .ok_or_else(|| FilterError::Malformed("not requires a \"filter\" field".to_string()))?;
            let inner = parse_at_depth(inner_value, depth + 1)?;
            Ok(FilterNode::Not {
                filter: Box::new(inner),
            })
        }
        other => Err(FilterError::Malformed(format!("unknown filter node type {other:?}"))),
    }
}

fn parse_condition(obj: &serde_json::Map<String, Value>) -> Result<Condition, FilterError> {
    let field = obj
        .get("field")
        .and_then(Value::as_str)
        .ok_or_else(|| FilterError::Malformed("condition requires a \"field\" string".to_string()))?
        .to_string();
    let operator_raw = obj
        .get("operator")
        .and_then(Value::as_str)
        .ok_or_else(|| FilterError::Malformed("condition requires an \"operator\" string".to_string()))?;
    let operator = Operator::parse(operator_raw)
        .ok_or_else(|| FilterError::UnknownOperator(operator_raw.to_string()))?;
    let value = obj.get("value").cloned();
    let values = obj
        .get("values")
        .map(|v| {
            v.as_array()
                .cloned()
                .ok_or_else(|| FilterError::Malformed("\"values\" must be an array".to_string()))
        })
        .transpose()?;

    match operator {
        Operator::Between if values.as_ref().map(Vec::len) != Some(2) => {
            return Err(FilterError::MissingValue {
                field,
                expected: "exactly two values",
            })
        }
        Operator::Exists => {}
        op if op.takes_single_value() && value.is_none() && values.is_none() => {
            return Err(FilterError::MissingValue {
                field,
                expected: "a value",
            })
        }
        _ => {}
    }

    Ok(Condition {
        field,
        operator,
        value,
        values,
    })
}

fn parse_group(obj: &serde_json::Map<String, Value>, depth: usize) -> Result<FilterNode, FilterError> {
    let operator_raw = obj
        .get("operator")
        .and_then(Value::as_str)
        .ok_or_else(|| FilterError::Malformed("group requires an \"operator\" of \"and\" or \"or\"".to_string()))?;
    let operator = match operator_raw {
        "and" => GroupOperator::And,
        "or" => GroupOperator::Or,
        other => return Err(FilterError::Malformed(format!("unknown group operator {other:?}"))),
    };
    let filters_raw = obj
        .get("filters")
        .and_then(Value::as_array)
        .ok_or_else(|| FilterError::Malformed("group requires a \"filters\" array".to_string()))?;
    if filters_raw.is_empty() {
        return Err(FilterError::EmptyGroup);
    }
    let filters = filters_raw
        .iter()
        .map(|f| parse_at_depth(f, depth + 1))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(FilterNode::Group { operator, filters })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn infers_condition_when_type_absent() {
        let node = parse_filter(&json!({"field": "metadata.status", "operator": "eq", "value": "paused"})).unwrap();
        assert!(matches!(node, FilterNode::Condition(_)));
    }

    #[test]
    fn coerces_legacy_not_shorthand() {
        let node = parse_filter(&json!({"not": {"field": "owner", "operator": "exists"}})).unwrap();
        assert!(matches!(node, FilterNode::Not { .. }));
    }

    #[test]
    fn rejects_unknown_operator() {
        let err = parse_filter(&json!({"field": "owner", "operator": "frobnicate"})).unwrap_err();
        assert!(matches!(err, FilterError::UnknownOperator(_)));
    }

    #[test]
    fn rejects_empty_group() {
        let err = parse_filter(&json!({"type": "group", "operator": "and", "filters": []})).unwrap_err();
        assert_eq!(err, FilterError::EmptyGroup);
    }

    #[test]
    fn rejects_depth_beyond_eight() {
        let mut node = json!({"field": "owner", "operator": "exists"});
        for _ in 0..9 {
            node = json!({"type": "not", "filter": node});
        }
        let err = parse_filter(&node).unwrap_err();
        assert_eq!(err, FilterError::TooDeep);
    }

    #[test]
    fn between_requires_two_values() {
        let err = parse_filter(&json!({
            "field": "version",
            "operator": "between",
            "values": [1]
        }))
        .unwrap_err();
        assert!(matches!(err, FilterError::MissingValue { .. }));
    }
}
