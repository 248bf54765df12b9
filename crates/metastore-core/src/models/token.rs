//! Token identity model (`spec.md` §3).
//!
//! Token identity is process-wide state loaded at startup and reloadable
//! via `POST /admin/tokens/reload`. It is never persisted by this crate;
//! callers load it from the `APPHUB_METASTORE_TOKENS[_PATH]` environment
//! configuration (`spec.md` §6) and hand it to `services::TokenIndex`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Scopes a token identity can carry.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    Read,
    Write,
    Delete,
    Admin,
}

impl Scope {
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Read => "metastore:read",
            Scope::Write => "metastore:write",
            Scope::Delete => "metastore:delete",
            Scope::Admin => "metastore:admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "metastore:read" => Some(Scope::Read),
            "metastore:write" => Some(Scope::Write),
            "metastore:delete" => Some(Scope::Delete),
            "metastore:admin" => Some(Scope::Admin),
            _ => None,
        }
    }
}

/// The kind of principal a token represents.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    User,
    Service,
}

/// Which namespaces a token may act against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NamespaceScope {
    All,
    Allowed(HashSet<String>),
}

impl NamespaceScope {
    pub fn allows(&self, namespace: &str) -> bool {
        match self {
            NamespaceScope::All => true,
            NamespaceScope::Allowed(set) => set.contains(&namespace.to_lowercase()),
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, NamespaceScope::Allowed(set) if set.is_empty())
    }
}

/// A raw token record as loaded from the `APPHUB_METASTORE_TOKENS[_PATH]`
/// JSON array: `{token, subject, scopes, namespaces, kind}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenRecord {
    pub token: String,
    pub subject: String,
    pub scopes: Vec<String>,
    /// `"*"` or an explicit list of namespaces.
    pub namespaces: TokenNamespaces,
    #[serde(default = "default_kind")]
    pub kind: TokenKind,
}

fn default_kind() -> TokenKind {
    TokenKind::User
}

/// Deserialises either the literal string `"*"` or a JSON array of
/// namespace strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TokenNamespaces {
    Wildcard(WildcardMarker),
    List(Vec<String>),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct WildcardMarker;

impl TryFrom<String> for WildcardMarker {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        if value == "*" {
            Ok(WildcardMarker)
        } else {
            Err(format!("expected \"*\", got {value:?}"))
        }
    }
}

impl From<WildcardMarker> for String {
    fn from(_: WildcardMarker) -> Self {
        "*".to_string()
    }
}

/// A resolved token identity used for authorization checks.
#[derive(Debug, Clone)]
pub struct Identity {
    pub subject: String,
    pub kind: TokenKind,
    pub scopes: HashSet<Scope>,
    pub namespaces: NamespaceScope,
}

impl Identity {
    /// The synthetic identity used when `APPHUB_AUTH_DISABLED` is set
    /// (`spec.md` §6).
    pub fn local_dev() -> Self {
        Identity {
            subject: "local-dev".to_string(),
            kind: TokenKind::Service,
            scopes: [Scope::Read, Scope::Write, Scope::Delete, Scope::Admin]
                .into_iter()
                .collect(),
            namespaces: NamespaceScope::All,
        }
    }

    /// `metastore:admin` implies all scopes (`spec.md` §3).
    pub fn has_scope(&self, scope: Scope) -> bool {
        self.scopes.contains(&Scope::Admin) || self.scopes.contains(&scope)
    }

    pub fn can_access_namespace(&self, namespace: &str) -> bool {
        self.namespaces.allows(namespace)
    }

    pub fn from_record(record: &TokenRecord) -> Self {
        let scopes = record
            .scopes
            .iter()
            .filter_map(|s| Scope::parse(s))
            .collect();
        let namespaces = match &record.namespaces {
            TokenNamespaces::Wildcard(_) => NamespaceScope::All,
            TokenNamespaces::List(list) => {
                NamespaceScope::Allowed(list.iter().map(|s| s.to_lowercase()).collect())
            }
        };
        Identity {
            subject: record.subject.clone(),
            kind: record.kind,
            scopes,
            namespaces,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_implies_all_scopes() {
        let identity = Identity {
            subject: "svc".into(),
            kind: TokenKind::Service,
            scopes: [Scope::Admin].into_iter().collect(),
            namespaces: NamespaceScope::All,
        };
        assert!(identity.has_scope(Scope::Delete));
        assert!(identity.has_scope(Scope::Write));
    }

    #[test]
    fn namespace_scope_matches_lowercased() {
        let scope = NamespaceScope::Allowed(["analytics".into()].into_iter().collect());
        assert!(scope.allows("analytics"));
        assert!(!scope.allows("operations"));
    }

    #[test]
    fn parses_wildcard_or_list() {
        let raw = r#"{"token":"t","subject":"s","scopes":["metastore:read"],"namespaces":"*"}"#;
        let record: TokenRecord = serde_json::from_str(raw).unwrap();
        assert!(matches!(record.namespaces, TokenNamespaces::Wildcard(_)));

        let raw2 = r#"{"token":"t","subject":"s","scopes":["metastore:read"],"namespaces":["a","b"]}"#;
        let record2: TokenRecord = serde_json::from_str(raw2).unwrap();
        assert!(matches!(record2.namespaces, TokenNamespaces::List(_)));
    }
}
