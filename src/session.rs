//! Per-session state owned by the interactive front end
//!
//! Favourite flags live here, not in the history store: a question is saved
//! at most once per session, no matter how often the save action fires.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;

/// Stable session key for a question.
pub fn fav_key(question: &str) -> String {
    format!("fav_ind__{}", hex::encode(Sha256::digest(question.as_bytes())))
}

/// A query that passed validation, kept for follow-up questions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidatedQuery {
    pub question: String,
    pub sql: String,
}

#[derive(Debug, Clone, Default)]
pub struct SessionState {
    favorites: HashMap<String, bool>,
    last_query: Option<ValidatedQuery>,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_favorite(&self, question: &str) -> bool {
        self.favorites.get(&fav_key(question)).copied().unwrap_or(false)
    }

    /// Set the flag. Returns `false` when it was already set.
    pub fn mark_favorite(&mut self, question: &str) -> bool {
        let flag = self.favorites.entry(fav_key(question)).or_insert(false);
        if *flag {
            return false;
        }
        *flag = true;
        true
    }

    pub fn set_last_query(&mut self, question: impl Into<String>, sql: impl Into<String>) {
        self.last_query = Some(ValidatedQuery {
            question: question.into(),
            sql: sql.into(),
        });
    }

    pub fn last_query(&self) -> Option<&ValidatedQuery> {
        self.last_query.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fav_key_is_stable_and_distinct() {
        assert_eq!(fav_key("a"), fav_key("a"));
        assert_ne!(fav_key("a"), fav_key("b"));
        assert!(fav_key("a").starts_with("fav_ind__"));
    }

    #[test]
    fn test_mark_favorite_once() {
        let mut session = SessionState::new();
        assert!(!session.is_favorite("Top customers?"));
        assert!(session.mark_favorite("Top customers?"));
        assert!(!session.mark_favorite("Top customers?"));
        assert!(session.is_favorite("Top customers?"));
        assert!(!session.is_favorite("Other question?"));
    }
}
