//! Search request shape: pagination, sort and projection (`spec.md` §4.A).

use serde::{Deserialize, Serialize};

use super::{columns, FilterError, FilterNode, GroupOperator};

pub const DEFAULT_PAGE_SIZE: u32 = 50;
pub const MAX_PAGE_SIZE: u32 = 500;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl Default for SortOrder {
    fn default() -> Self {
        SortOrder::Asc
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SortField {
    pub field: String,
    #[serde(default)]
    pub order: SortOrder,
}

impl SortField {
    pub fn validate(&self) -> Result<(), FilterError> {
        if !columns::is_sortable(&self.field) {
            return Err(FilterError::UnsupportedOperator {
                field: self.field.clone(),
                operator: "sort".to_string(),
            });
        }
        Ok(())
    }
}

/// Explicit field projection. `None` means "all fields"; `summary: true`
/// on [`SearchRequest`] merges in [`columns::DEFAULT_SUMMARY_FIELDS`]
/// when no explicit projection was given.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Projection {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Vec<String>>,
}

impl Projection {
    pub fn resolve(&self, summary: bool) -> Option<Vec<String>> {
        match &self.fields {
            Some(fields) => Some(fields.clone()),
            None if summary => Some(
                columns::DEFAULT_SUMMARY_FIELDS
                    .iter()
                    .map(|s| s.to_string())
                    .collect(),
            ),
            None => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Pagination {
    #[serde(default)]
    pub cursor: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_PAGE_SIZE
}

impl Default for Pagination {
    fn default() -> Self {
        Pagination {
            cursor: None,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

impl Pagination {
    pub fn clamped_limit(&self) -> u32 {
        self.limit.clamp(1, MAX_PAGE_SIZE)
    }
}

/// The decoded, canonical search request the record service passes to
/// the store layer.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchRequest {
    pub namespace: String,
    #[serde(default)]
    pub filter: Option<FilterNode>,
    #[serde(default)]
    pub sort: Vec<SortField>,
    #[serde(default)]
    pub pagination: Pagination,
    #[serde(default)]
    pub projection: Projection,
    #[serde(default)]
    pub summary: bool,
    #[serde(default)]
    pub include_deleted: bool,
}

impl SearchRequest {
    pub fn validate(&self) -> Result<(), FilterError> {
        if let Some(filter) = &self.filter {
            if filter.depth() > super::MAX_FILTER_DEPTH {
                return Err(FilterError::TooDeep);
            }
            validate_tree(filter)?;
        }
        for sort in &self.sort {
            sort.validate()?;
        }
        Ok(())
    }

    pub fn resolved_projection(&self) -> Option<Vec<String>> {
        self.projection.resolve(self.summary)
    }
}

fn validate_tree(node: &FilterNode) -> Result<(), FilterError> {
    match node {
        FilterNode::Condition(_) => {
            super::compile(node)?;
            Ok(())
        }
        FilterNode::Not { filter } => validate_tree(filter),
        FilterNode::Group { operator: _, filters } => {
            if filters.is_empty() {
                return Err(FilterError::EmptyGroup);
            }
            filters.iter().try_for_each(validate_tree)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filter::{Condition, Operator};
    use serde_json::json;

    fn cond(field: &str) -> FilterNode {
        FilterNode::Condition(Condition {
            field: field.to_string(),
            operator: Operator::Exists,
            value: None,
            values: None,
        })
    }

    #[test]
    fn pagination_limit_is_clamped() {
        let p = Pagination {
            cursor: None,
            limit: 10_000,
        };
        assert_eq!(p.clamped_limit(), MAX_PAGE_SIZE);
        let p = Pagination { cursor: None, limit: 0 };
        assert_eq!(p.clamped_limit(), 1);
    }

    #[test]
    fn summary_merges_default_fields_when_no_projection() {
        let req = SearchRequest {
            namespace: "analytics".into(),
            filter: None,
            sort: vec![],
            pagination: Pagination::default(),
            projection: Projection::default(),
            summary: true,
            include_deleted: false,
        };
        let fields = req.resolved_projection().unwrap();
        assert!(fields.contains(&"namespace".to_string()));
    }

    #[test]
    fn explicit_projection_wins_over_summary() {
        let req = SearchRequest {
            namespace: "analytics".into(),
            filter: None,
            sort: vec![],
            pagination: Pagination::default(),
            projection: Projection {
                fields: Some(vec!["key".to_string()]),
            },
            summary: true,
            include_deleted: false,
        };
        assert_eq!(req.resolved_projection(), Some(vec!["key".to_string()]));
    }

    #[test]
    fn unsortable_field_rejected() {
        let sort = SortField {
            field: "metadata.status".to_string(),
            order: SortOrder::Asc,
        };
        assert!(sort.validate().is_err());
    }

    #[test]
    fn empty_group_in_request_is_rejected() {
        let req = SearchRequest {
            namespace: "analytics".into(),
            filter: Some(FilterNode::Group {
                operator: GroupOperator::And,
                filters: vec![],
            }),
            sort: vec![],
            pagination: Pagination::default(),
            projection: Projection::default(),
            summary: false,
            include_deleted: false,
        };
        assert!(req.validate().is_err());
    }

    #[test]
    fn valid_request_passes() {
        let req = SearchRequest {
            namespace: "analytics".into(),
            filter: Some(cond("owner")),
            sort: vec![SortField {
                field: "updatedAt".to_string(),
                order: SortOrder::Desc,
            }],
            pagination: Pagination::default(),
            projection: Projection::default(),
            summary: false,
            include_deleted: false,
        };
        assert!(req.validate().is_ok());
        let _ = json!({});
    }
}
