//! Loads the `APPHUB_METASTORE_TOKENS[_PATH]` token set into a
//! [`metastore_core::models::token::TokenRecord`] list at startup and on
//! `POST /admin/tokens/reload`.

use anyhow::{Context, Result};
use metastore_core::models::token::TokenRecord;

/// Resolve the configured token source: an inline JSON array takes
/// precedence over a file path, mirroring `Settings`'s own precedence for
/// the paired env vars.
pub fn load(tokens_json: Option<&str>, tokens_path: Option<&str>) -> Result<Vec<TokenRecord>> {
    if let Some(raw) = tokens_json {
        return serde_json::from_str(raw).context("APPHUB_METASTORE_TOKENS is not a valid token array");
    }
    if let Some(path) = tokens_path {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read token file {path:?}"))?;
        return serde_json::from_str(&raw)
            .with_context(|| format!("{path:?} is not a valid token array"));
    }
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_source_yields_empty_set() {
        assert!(load(None, None).unwrap().is_empty());
    }

    #[test]
    fn inline_json_takes_precedence_over_path() {
        let raw = r#"[{"token":"t","subject":"svc","scopes":["metastore:read"],"namespaces":"*"}]"#;
        let records = load(Some(raw), Some("/nonexistent/path.json")).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].subject, "svc");
    }

    #[test]
    fn malformed_json_is_rejected() {
        assert!(load(Some("not json"), None).is_err());
    }
}
