// JSON-file rule store.
//
// The file holds a JSON array of rules. It is re-read on every fetch, so
// edits are picked up at the next cache refresh without a restart.

use crate::core::moderation::{ModerationRule, RuleStore, StoreError};
use async_trait::async_trait;
use std::path::PathBuf;

pub struct JsonRuleStore {
    path: PathBuf,
}

impl JsonRuleStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Overwrite the file with `rules`.
    pub async fn save_rules(&self, rules: &[ModerationRule]) -> Result<(), StoreError> {
        let json = serde_json::to_string_pretty(rules)?;
        tokio::fs::write(&self.path, json).await?;
        Ok(())
    }
}

#[async_trait]
impl RuleStore for JsonRuleStore {
    async fn list_active_rules(&self) -> Result<Vec<ModerationRule>, StoreError> {
        let raw = tokio::fs::read_to_string(&self.path).await?;
        let rules: Vec<ModerationRule> = serde_json::from_str(&raw)?;
        Ok(rules.into_iter().filter(|rule| rule.is_active).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::{
        evaluate_content, ActionTaken, CompiledRule, RuleAction, RuleType, Severity,
    };
    use std::collections::BTreeSet;
    use std::io::Write;
    use std::sync::Arc;
    use tempfile::{tempdir, NamedTempFile};

    #[tokio::test]
    async fn test_round_trips_and_filters_inactive() {
        let tmp = NamedTempFile::new().unwrap();
        let store = JsonRuleStore::new(tmp.path());

        let active = ModerationRule {
            id: "r1".to_string(),
            rule_type: RuleType::SpamPattern,
            pattern: "[!?]{6,}".to_string(),
            severity: Severity::Low,
            action: RuleAction::Flag,
            replacement_text: None,
            context: BTreeSet::from(["chat".to_string()]),
            is_active: true,
        };
        let inactive = ModerationRule {
            id: "r2".to_string(),
            is_active: false,
            ..active.clone()
        };

        store.save_rules(&[active.clone(), inactive]).await.unwrap();
        let loaded = store.list_active_rules().await.unwrap();
        assert_eq!(loaded, vec![active]);
    }

    #[tokio::test]
    async fn test_missing_file_is_an_error() {
        let dir = tempdir().unwrap();
        let store = JsonRuleStore::new(dir.path().join("missing.json"));
        assert!(matches!(
            store.list_active_rules().await,
            Err(StoreError::Io(_))
        ));
    }

    #[tokio::test]
    async fn test_malformed_file_is_an_error() {
        let mut tmp = NamedTempFile::new().unwrap();
        tmp.write_all(b"{ not json").unwrap();

        let store = JsonRuleStore::new(tmp.path());
        assert!(matches!(
            store.list_active_rules().await,
            Err(StoreError::Serialization(_))
        ));
    }

    #[tokio::test]
    async fn test_bundled_rules_all_compile() {
        let store = JsonRuleStore::new(concat!(
            env!("CARGO_MANIFEST_DIR"),
            "/data/moderation_rules.json"
        ));
        let rules: Vec<Arc<CompiledRule>> = store
            .list_active_rules()
            .await
            .unwrap()
            .into_iter()
            .map(|rule| Arc::new(CompiledRule::new(rule)))
            .collect();

        assert!(!rules.is_empty());
        for rule in &rules {
            assert!(
                rule.compile_error().is_none(),
                "rule {} does not compile: {:?}",
                rule.rule().id,
                rule.compile_error()
            );
        }

        let spam = evaluate_content("first!!!!!!!!", &rules);
        assert_eq!(spam.action_taken, ActionTaken::Flagged);
        assert!(spam.is_allowed);
    }
}
