//! The fixed set of scalar columns the compiler recognises (`spec.md`
//! §4.A). Anything else is addressed as a `metadata.`-prefixed JSON path.

/// API-facing field name -> SQL column name.
pub const RECOGNIZED_COLUMNS: &[(&str, &str)] = &[
    ("namespace", "namespace"),
    ("key", "record_key"),
    ("owner", "owner"),
    ("schemaHash", "schema_hash"),
    ("version", "version"),
    ("createdAt", "created_at"),
    ("updatedAt", "updated_at"),
    ("deletedAt", "deleted_at"),
    ("createdBy", "created_by"),
    ("updatedBy", "updated_by"),
    ("tags", "tags"),
];

pub fn sql_column(field: &str) -> Option<&'static str> {
    RECOGNIZED_COLUMNS
        .iter()
        .find(|(api, _)| *api == field)
        .map(|(_, sql)| *sql)
}

pub fn is_recognized(field: &str) -> bool {
    RECOGNIZED_COLUMNS.iter().any(|(api, _)| *api == field)
}

/// Columns whose SQL type is an array (only `tags` today).
pub fn is_array_column(field: &str) -> bool {
    field == "tags"
}

/// Columns usable in ORDER BY (every scalar column is sortable).
pub fn is_sortable(field: &str) -> bool {
    is_recognized(field) && field != "tags"
}

/// The default projection merged in for `summary: true` search requests
/// (`spec.md` §4.A).
pub const DEFAULT_SUMMARY_FIELDS: &[&str] = &[
    "namespace",
    "key",
    "version",
    "updatedAt",
    "owner",
    "schemaHash",
    "tags",
    "deletedAt",
];
