//! Filter model & query compiler (`spec.md` §4.A).
//!
//! The filter tree is a closed sum type by design (`spec.md` §9): a
//! condition, a boolean group, or a negation. [`parse`] turns loosely
//! structured JSON into this canonical form; [`query_string`] turns the
//! whitespace-token DSL into the same form; [`compiler`] walks it to
//! produce parameterised SQL.

pub mod columns;
pub mod compiler;
pub mod parse;
pub mod query_string;
pub mod search;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Maximum nesting depth for a filter tree (`spec.md` §3).
pub const MAX_FILTER_DEPTH: usize = 8;

/// Errors raised while parsing or compiling a filter.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("bad_request: unknown filter operator {0:?}")]
    UnknownOperator(String),

    #[error("bad_request: filter group must have at least one filter")]
    EmptyGroup,

    #[error("bad_request: filter tree exceeds maximum depth of {MAX_FILTER_DEPTH}")]
    TooDeep,

    #[error("bad_request: condition on field {field:?} requires {expected}")]
    MissingValue { field: String, expected: &'static str },

    #[error("bad_request: field {0:?} is not searchable")]
    UnknownField(String),

    #[error("bad_request: invalid JSON path segment {0:?}")]
    InvalidPathSegment(String),

    #[error("bad_request: operator {operator:?} is not supported on column {field:?}")]
    UnsupportedOperator { field: String, operator: String },

    #[error("bad_request: {0}")]
    Malformed(String),

    #[error("bad_request: unterminated quoted string in query")]
    UnterminatedQuote,

    #[error("bad_request: token {0:?} has no recognised comparison operator")]
    NoOperatorInToken(String),
}

/// Comparison operator recognised by the filter tree (`spec.md` §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Operator {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
    Between,
    Contains,
    HasKey,
    ArrayContains,
    Exists,
}

impl Operator {
    pub fn parse(raw: &str) -> Option<Self> {
        Some(match raw {
            "eq" => Operator::Eq,
            "neq" => Operator::Neq,
            "lt" => Operator::Lt,
            "lte" => Operator::Lte,
            "gt" => Operator::Gt,
            "gte" => Operator::Gte,
            "between" => Operator::Between,
            "contains" => Operator::Contains,
            "has_key" => Operator::HasKey,
            "array_contains" => Operator::ArrayContains,
            "exists" => Operator::Exists,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Eq => "eq",
            Operator::Neq => "neq",
            Operator::Lt => "lt",
            Operator::Lte => "lte",
            Operator::Gt => "gt",
            Operator::Gte => "gte",
            Operator::Between => "between",
            Operator::Contains => "contains",
            Operator::HasKey => "has_key",
            Operator::ArrayContains => "array_contains",
            Operator::Exists => "exists",
        }
    }

    /// Operators that compare with a single value rather than a list.
    pub fn takes_single_value(self) -> bool {
        !matches!(self, Operator::Between | Operator::Exists)
    }
}

/// Boolean combinator for a filter group.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum GroupOperator {
    And,
    Or,
}

/// A single leaf comparison.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Condition {
    pub field: String,
    pub operator: Operator,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<Value>>,
}

/// The canonical, tagged filter tree (`spec.md` §3, §9).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum FilterNode {
    Condition(Condition),
    Group {
        operator: GroupOperator,
        filters: Vec<FilterNode>,
    },
    Not {
        filter: Box<FilterNode>,
    },
}

impl FilterNode {
    pub fn condition(field: impl Into<String>, operator: Operator, value: Option<Value>) -> Self {
        FilterNode::Condition(Condition {
            field: field.into(),
            operator,
            value,
            values: None,
        })
    }

    /// Depth of the tree, with a single condition counted as depth 1.
    pub fn depth(&self) -> usize {
        match self {
            FilterNode::Condition(_) => 1,
            FilterNode::Not { filter } => 1 + filter.depth(),
            FilterNode::Group { filters, .. } => {
                1 + filters.iter().map(FilterNode::depth).max().unwrap_or(0)
            }
        }
    }
}

pub use compiler::{compile, evaluate, CompiledFilter, SqlPart, SqlValue};
pub use search::{Pagination, Projection, SearchRequest, SortField, SortOrder};
