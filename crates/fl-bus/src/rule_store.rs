//! Rule storage seam of the background process

use std::sync::Mutex;

use async_trait::async_trait;

use fl_core::types::FilterMetadata;

use crate::error::BusError;

/// Where the background persists user rules and allowlisted domains.
#[async_trait]
pub trait RuleStore: Send + Sync {
    async fn add_user_rule(&self, rule_text: &str) -> Result<(), BusError>;

    async fn remove_user_rule(&self, rule_text: &str) -> Result<(), BusError>;

    async fn add_allowlist_domain(&self, domain: &str) -> Result<(), BusError>;

    async fn remove_allowlist_domain(&self, domain: &str) -> Result<(), BusError>;

    async fn filters_metadata(&self) -> Vec<FilterMetadata>;
}

/// In-memory rule store.
#[derive(Debug, Default)]
pub struct MemoryRuleStore {
    user_rules: Mutex<Vec<String>>,
    allowlist: Mutex<Vec<String>>,
    metadata: Vec<FilterMetadata>,
}

impl MemoryRuleStore {
    pub fn new(metadata: Vec<FilterMetadata>) -> Self {
        Self {
            metadata,
            ..Default::default()
        }
    }

    pub fn user_rules(&self) -> Vec<String> {
        self.user_rules
            .lock()
            .map(|rules| rules.clone())
            .unwrap_or_default()
    }

    pub fn allowlist(&self) -> Vec<String> {
        self.allowlist
            .lock()
            .map(|domains| domains.clone())
            .unwrap_or_default()
    }
}

fn add_unique(list: &Mutex<Vec<String>>, value: &str) -> Result<(), BusError> {
    let mut list = list
        .lock()
        .map_err(|e| BusError::RuleStore(e.to_string()))?;
    if !list.iter().any(|known| known == value) {
        list.push(value.to_string());
    }
    Ok(())
}

fn remove_all(list: &Mutex<Vec<String>>, value: &str) -> Result<(), BusError> {
    let mut list = list
        .lock()
        .map_err(|e| BusError::RuleStore(e.to_string()))?;
    list.retain(|known| known != value);
    Ok(())
}

#[async_trait]
impl RuleStore for MemoryRuleStore {
    async fn add_user_rule(&self, rule_text: &str) -> Result<(), BusError> {
        add_unique(&self.user_rules, rule_text)
    }

    async fn remove_user_rule(&self, rule_text: &str) -> Result<(), BusError> {
        remove_all(&self.user_rules, rule_text)
    }

    async fn add_allowlist_domain(&self, domain: &str) -> Result<(), BusError> {
        add_unique(&self.allowlist, domain)
    }

    async fn remove_allowlist_domain(&self, domain: &str) -> Result<(), BusError> {
        remove_all(&self.allowlist, domain)
    }

    async fn filters_metadata(&self) -> Vec<FilterMetadata> {
        self.metadata.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_user_rules() {
        let store = MemoryRuleStore::default();
        store.add_user_rule("||ads.net^").await.unwrap();
        store.add_user_rule("||ads.net^").await.unwrap();
        store.add_user_rule("@@||cdn.net^").await.unwrap();
        assert_eq!(store.user_rules(), vec!["||ads.net^", "@@||cdn.net^"]);

        store.remove_user_rule("||ads.net^").await.unwrap();
        assert_eq!(store.user_rules(), vec!["@@||cdn.net^"]);
    }

    #[tokio::test]
    async fn test_allowlist() {
        let store = MemoryRuleStore::default();
        store.add_allowlist_domain("example.org").await.unwrap();
        assert_eq!(store.allowlist(), vec!["example.org"]);
        store.remove_allowlist_domain("example.org").await.unwrap();
        assert!(store.allowlist().is_empty());
    }
}
