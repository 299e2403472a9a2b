//! Token and tag catalogue
//!
//! Every data source key and compiled rule is registered here as a token so
//! that both can be discovered by exact name, substring or tag.

use crate::error::{EvalError, EvalResult};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// A token with its tags
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenEntry {
    pub token: String,
    pub tags: Vec<String>,
}

/// Catalogue of tokens and their tags
#[derive(Debug, Default)]
pub struct TokenRegistry {
    entries: RwLock<IndexMap<String, BTreeSet<String>>>,
}

fn matches_partial(candidate: &str, partial: &str) -> bool {
    candidate
        .to_lowercase()
        .contains(&partial.trim().to_lowercase())
}

impl TokenRegistry {
    /// Create an empty catalogue
    pub fn new() -> Self {
        Self::default()
    }

    /// Save a token, replacing any tags it already had
    pub fn save_token<I, S>(&self, token: impl Into<String>, tags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let tags = tags.into_iter().map(Into::into).collect();
        self.entries.write().insert(token.into(), tags);
    }

    /// Remove a token together with its tag associations
    pub fn delete_token(&self, token: &str) -> bool {
        self.entries.write().shift_remove(token).is_some()
    }

    /// Exact lookup
    pub fn get_token(&self, token: &str) -> Option<TokenEntry> {
        self.entries.read().get(token).map(|tags| TokenEntry {
            token: token.to_string(),
            tags: tags.iter().cloned().collect(),
        })
    }

    /// Whether `token` is catalogued
    pub fn contains(&self, token: &str) -> bool {
        self.entries.read().contains_key(token)
    }

    /// Tokens containing `partial`, case-insensitively, sorted
    pub fn get_tokens(&self, partial: &str) -> Vec<String> {
        let mut tokens: Vec<String> = self
            .entries
            .read()
            .keys()
            .filter(|token| matches_partial(token, partial))
            .cloned()
            .collect();
        tokens.sort();
        tokens
    }

    /// Distinct tags containing `partial`, case-insensitively, sorted
    pub fn get_tags(&self, partial: &str) -> Vec<String> {
        let entries = self.entries.read();
        let tags: BTreeSet<&String> = entries
            .values()
            .flatten()
            .filter(|tag| matches_partial(tag, partial))
            .collect();
        tags.into_iter().cloned().collect()
    }

    /// Tags of one token
    pub fn tags_of(&self, token: &str) -> Option<Vec<String>> {
        self.entries
            .read()
            .get(token)
            .map(|tags| tags.iter().cloned().collect())
    }

    /// Tags shared by every listed token
    pub fn get_tags_by_tokens<S: AsRef<str>>(&self, tokens: &[S]) -> Vec<String> {
        let entries = self.entries.read();
        let mut sets = tokens.iter().map(|t| entries.get(t.as_ref()));
        let Some(first) = sets.next() else {
            return Vec::new();
        };
        let mut shared: BTreeSet<String> = first.cloned().unwrap_or_default();
        for tags in sets {
            match tags {
                Some(tags) => shared.retain(|tag| tags.contains(tag)),
                None => shared.clear(),
            }
        }
        shared.into_iter().collect()
    }

    /// Tokens carrying every listed tag, sorted
    pub fn get_tokens_by_tags<S: AsRef<str>>(&self, tags: &[S]) -> Vec<String> {
        if tags.is_empty() {
            return Vec::new();
        }
        let mut tokens: Vec<String> = self
            .entries
            .read()
            .iter()
            .filter(|(_, token_tags)| tags.iter().all(|tag| token_tags.contains(tag.as_ref())))
            .map(|(token, _)| token.clone())
            .collect();
        tokens.sort();
        tokens
    }

    /// Tokens carrying exactly `tag`, sorted
    pub fn get_tokens_by_tag(&self, tag: &str) -> Vec<String> {
        self.get_tokens_by_tags(&[tag])
    }

    /// Attach a tag to an existing token
    pub fn add_tag(&self, token: &str, tag: impl Into<String>) -> EvalResult<()> {
        let mut entries = self.entries.write();
        let tags = entries
            .get_mut(token)
            .ok_or_else(|| EvalError::unknown_key(token))?;
        tags.insert(tag.into());
        Ok(())
    }

    /// Detach a tag; returns whether it was present
    pub fn remove_tag(&self, token: &str, tag: &str) -> EvalResult<bool> {
        let mut entries = self.entries.write();
        let tags = entries
            .get_mut(token)
            .ok_or_else(|| EvalError::unknown_key(token))?;
        Ok(tags.remove(tag))
    }

    /// Every token, in registration order
    pub fn all_tokens(&self) -> Vec<String> {
        self.entries.read().keys().cloned().collect()
    }

    /// Every token with its tags, in registration order
    pub fn entries(&self) -> Vec<TokenEntry> {
        self.entries
            .read()
            .iter()
            .map(|(token, tags)| TokenEntry {
                token: token.clone(),
                tags: tags.iter().cloned().collect(),
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn catalogue() -> TokenRegistry {
        let registry = TokenRegistry::new();
        registry.save_token("AGE", ["person", "demographic"]);
        registry.save_token("PAGE", ["paging"]);
        registry.save_token("MAGE", ["person"]);
        registry.save_token("AGED", ["demographic"]);
        registry
    }

    #[test]
    fn test_partial_token_match() {
        let registry = catalogue();
        assert_eq!(
            registry.get_tokens("AGE"),
            vec!["AGE", "AGED", "MAGE", "PAGE"]
        );
        assert_eq!(registry.get_tokens("age").len(), 4);
        assert!(registry.get_tokens("XYZ").is_empty());
    }

    #[test]
    fn test_partial_match_on_empty_catalogue() {
        let registry = TokenRegistry::new();
        assert!(registry.get_tokens("AGE").is_empty());
        assert!(registry.get_tags("person").is_empty());
    }

    #[test]
    fn test_partial_tag_match() {
        let registry = catalogue();
        assert_eq!(registry.get_tags("PER"), vec!["person"]);
        assert_eq!(
            registry.get_tags(""),
            vec!["demographic", "paging", "person"]
        );
    }

    #[test]
    fn test_delete_removes_tags() {
        let registry = catalogue();
        assert!(registry.delete_token("PAGE"));
        assert!(registry.get_token("PAGE").is_none());
        assert!(registry.get_tags("paging").is_empty());
        assert!(!registry.delete_token("PAGE"));
    }

    #[test]
    fn test_intersections() {
        let registry = catalogue();
        assert_eq!(
            registry.get_tags_by_tokens(&["AGE", "MAGE"]),
            vec!["person"]
        );
        assert!(registry.get_tags_by_tokens(&["AGE", "UNKNOWN"]).is_empty());
        assert_eq!(
            registry.get_tokens_by_tags(&["person", "demographic"]),
            vec!["AGE"]
        );
        assert_eq!(registry.get_tokens_by_tag("person"), vec!["AGE", "MAGE"]);
        assert!(registry.get_tokens_by_tag("pers").is_empty());
    }

    #[test]
    fn test_tag_editing() {
        let registry = catalogue();
        registry.add_tag("PAGE", "person").unwrap();
        assert_eq!(
            registry.get_tokens_by_tag("person"),
            vec!["AGE", "MAGE", "PAGE"]
        );
        assert!(registry.remove_tag("PAGE", "person").unwrap());
        assert!(!registry.remove_tag("PAGE", "person").unwrap());
        assert!(matches!(
            registry.add_tag("NOPE", "x"),
            Err(EvalError::UnknownKey { .. })
        ));
    }

    #[test]
    fn test_save_replaces_tags() {
        let registry = catalogue();
        registry.save_token("AGE", ["computed"]);
        assert_eq!(
            registry.get_token("AGE"),
            Some(TokenEntry {
                token: "AGE".to_string(),
                tags: vec!["computed".to_string()],
            })
        );
        assert_eq!(registry.len(), 4);
    }
}
