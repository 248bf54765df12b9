//! Token index (`spec.md` §5 — "replaced atomically on reload; readers
//! never block").

use std::collections::HashMap;
use std::sync::Arc;

use arc_swap::ArcSwap;

use crate::models::token::{Identity, TokenRecord};

/// Looks up a bearer token against the currently loaded set of
/// [`TokenRecord`]s. `reload` swaps the whole map in one atomic store, so
/// concurrent lookups never observe a partially-updated index and never
/// take a lock to read.
pub struct TokenIndex {
    identities: ArcSwap<HashMap<String, Identity>>,
}

impl TokenIndex {
    pub fn new(records: Vec<TokenRecord>) -> Self {
        TokenIndex {
            identities: ArcSwap::from_pointee(build_map(records)),
        }
    }

    pub fn empty() -> Self {
        TokenIndex {
            identities: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn reload(&self, records: Vec<TokenRecord>) {
        self.identities.store(Arc::new(build_map(records)));
    }

    pub fn lookup(&self, token: &str) -> Option<Identity> {
        self.identities.load().get(token).cloned()
    }

    pub fn len(&self) -> usize {
        self.identities.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn build_map(records: Vec<TokenRecord>) -> HashMap<String, Identity> {
    records
        .iter()
        .map(|record| (record.token.clone(), Identity::from_record(record)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::token::TokenNamespaces;

    fn record(token: &str, subject: &str) -> TokenRecord {
        TokenRecord {
            token: token.to_string(),
            subject: subject.to_string(),
            scopes: vec!["metastore:read".to_string()],
            namespaces: TokenNamespaces::List(vec!["analytics".to_string()]),
            kind: crate::models::token::TokenKind::User,
        }
    }

    #[test]
    fn looks_up_loaded_tokens() {
        let index = TokenIndex::new(vec![record("tok-a", "alice")]);
        let identity = index.lookup("tok-a").unwrap();
        assert_eq!(identity.subject, "alice");
        assert!(index.lookup("tok-b").is_none());
    }

    #[test]
    fn reload_replaces_the_whole_set() {
        let index = TokenIndex::new(vec![record("tok-a", "alice")]);
        index.reload(vec![record("tok-b", "bob")]);
        assert!(index.lookup("tok-a").is_none());
        assert_eq!(index.lookup("tok-b").unwrap().subject, "bob");
    }

    #[test]
    fn empty_index_has_no_identities() {
        let index = TokenIndex::empty();
        assert!(index.is_empty());
        assert!(index.lookup("anything").is_none());
    }
}
