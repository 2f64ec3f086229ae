// Moderation domain models - data structures for the content filtering engine.
//
// These are pure domain types with no storage or transport dependencies.
// Rule type, severity and action are closed enums so the resolver can match
// on them exhaustively.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

/// Masking token used by `replace` rules that carry no replacement text.
pub const DEFAULT_REPLACEMENT: &str = "***";

/// How a rule's pattern was authored. All four are evaluated as regular expressions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleType {
    BannedWord,
    BannedPhrase,
    RegexPattern,
    SpamPattern,
}

/// Severity tier of a rule. Each tier maps to a fixed weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Numeric weight added to a pass's score when a rule of this tier matches.
    pub const fn weight(self) -> u32 {
        match self {
            Severity::Low => 1,
            Severity::Medium => 5,
            Severity::High => 10,
            Severity::Critical => 20,
        }
    }
}

/// Side effect requested by a rule when it matches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Flag,
    Block,
    ShadowBan,
    Replace,
}

/// A stored moderation rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModerationRule {
    pub id: String,
    pub rule_type: RuleType,
    pub pattern: String,
    pub severity: Severity,
    pub action: RuleAction,
    /// Only used by `replace` rules; empty or missing means [`DEFAULT_REPLACEMENT`].
    #[serde(default)]
    pub replacement_text: Option<String>,
    /// Applicability tags such as "chat" or "username". Empty applies everywhere.
    #[serde(default)]
    pub context: BTreeSet<String>,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl ModerationRule {
    /// Text substituted for each occurrence when this rule rewrites content.
    pub fn replacement(&self) -> &str {
        match self.replacement_text.as_deref() {
            Some(text) if !text.is_empty() => text,
            _ => DEFAULT_REPLACEMENT,
        }
    }

    /// A rule applies to a context if it has no tags or carries that tag.
    pub fn applies_to(&self, context: &str) -> bool {
        self.context.is_empty() || self.context.contains(context)
    }
}

/// A rule that matched during a pass, in evaluation order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchedRule {
    pub rule_id: String,
    pub rule_type: RuleType,
    pub severity: Severity,
    pub action: RuleAction,
}

impl From<&ModerationRule> for MatchedRule {
    fn from(rule: &ModerationRule) -> Self {
        Self {
            rule_id: rule.id.clone(),
            rule_type: rule.rule_type,
            severity: rule.severity,
            action: rule.action,
        }
    }
}

/// Final verdict of a filtering pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionTaken {
    Allowed,
    Flagged,
    Modified,
    Blocked,
}

impl fmt::Display for ActionTaken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ActionTaken::Allowed => write!(f, "allowed"),
            ActionTaken::Flagged => write!(f, "flagged"),
            ActionTaken::Modified => write!(f, "modified"),
            ActionTaken::Blocked => write!(f, "blocked"),
        }
    }
}

/// Result of filtering one piece of content. Produced fresh per call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationResult {
    pub is_allowed: bool,
    pub filtered_content: String,
    pub matched_rules: Vec<MatchedRule>,
    pub severity_score: u32,
    pub requires_manual_review: bool,
    pub action_taken: ActionTaken,
}

impl ModerationResult {
    /// Result for content that matched nothing.
    pub fn allowed(content: &str) -> Self {
        Self {
            is_allowed: true,
            filtered_content: content.to_string(),
            matched_rules: Vec::new(),
            severity_score: 0,
            requires_manual_review: false,
            action_taken: ActionTaken::Allowed,
        }
    }

    pub fn has_violations(&self) -> bool {
        !self.matched_rules.is_empty()
    }
}

/// Persistent per-user moderation state. Created lazily on first violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserModerationStatus {
    pub user_id: String,
    pub is_banned: bool,
    pub banned_until: Option<DateTime<Utc>>,
    pub is_shadow_banned: bool,
    pub violation_count: u32,
    pub warning_count: u32,
    pub last_violation_at: Option<DateTime<Utc>>,
}

impl UserModerationStatus {
    /// A row for a user with no history.
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            is_banned: false,
            banned_until: None,
            is_shadow_banned: false,
            violation_count: 0,
            warning_count: 0,
            last_violation_at: None,
        }
    }

    /// Whether the ban is in force at `now`. An expired `banned_until` lifts it.
    pub fn is_banned_at(&self, now: DateTime<Utc>) -> bool {
        self.is_banned && self.banned_until.map_or(true, |until| until > now)
    }
}

/// A stored status together with the version used for compare-and-swap writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedStatus {
    pub status: UserModerationStatus,
    pub version: u64,
}

/// Answer to "may this user post right now?".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PostingStatus {
    pub can_post: bool,
    pub is_banned: bool,
    pub is_shadow_banned: bool,
}

impl PostingStatus {
    /// Default for users without a status row, or when the status store is down.
    pub const fn open() -> Self {
        Self {
            can_post: true,
            is_banned: false,
            is_shadow_banned: false,
        }
    }
}

/// Audit record for one filtering pass that matched at least one rule.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModerationLogEntry {
    pub id: String,
    pub user_id: String,
    pub context: String,
    pub original_content: String,
    pub filtered_content: String,
    pub matched_rule_ids: Vec<String>,
    pub action_taken: ActionTaken,
    pub severity_score: u32,
    pub created_at: DateTime<Utc>,
}

impl ModerationLogEntry {
    /// Audit record for one pass over `original`.
    pub fn for_decision(
        original: &str,
        result: &ModerationResult,
        context: &str,
        user_id: &str,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            user_id: user_id.to_string(),
            context: context.to_string(),
            original_content: original.to_string(),
            filtered_content: result.filtered_content.clone(),
            matched_rule_ids: result
                .matched_rules
                .iter()
                .map(|m| m.rule_id.clone())
                .collect(),
            action_taken: result.action_taken,
            severity_score: result.severity_score,
            created_at: at,
        }
    }
}

/// Kind of content a user report points at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    ChatMessage,
    Comment,
    Username,
}

/// Review state of a flagged-content report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportStatus {
    Pending,
    Reviewed,
    Dismissed,
    Actioned,
}

/// A user-submitted report of content the rules did not catch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlaggedContentReport {
    pub id: String,
    pub content_type: ContentType,
    pub content_id: String,
    pub reported_user_id: String,
    pub reporter_user_id: String,
    pub content_text: String,
    pub reason: String,
    pub severity: Severity,
    pub status: ReportStatus,
    pub created_at: DateTime<Utc>,
}

/// Input for filing a report.
#[derive(Debug, Clone)]
pub struct NewContentReport {
    pub content_type: ContentType,
    pub content_id: String,
    pub content_text: String,
    pub reported_user_id: String,
    pub reporter_user_id: String,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn rule_with_context(tags: &[&str]) -> ModerationRule {
        ModerationRule {
            id: "r1".to_string(),
            rule_type: RuleType::BannedWord,
            pattern: "x".to_string(),
            severity: Severity::Low,
            action: RuleAction::Flag,
            replacement_text: None,
            context: tags.iter().map(|t| t.to_string()).collect(),
            is_active: true,
        }
    }

    #[test]
    fn test_severity_weights() {
        assert_eq!(Severity::Low.weight(), 1);
        assert_eq!(Severity::Medium.weight(), 5);
        assert_eq!(Severity::High.weight(), 10);
        assert_eq!(Severity::Critical.weight(), 20);
    }

    #[test]
    fn test_rule_context_applicability() {
        let everywhere = rule_with_context(&[]);
        assert!(everywhere.applies_to("chat"));
        assert!(everywhere.applies_to("username"));

        let chat_only = rule_with_context(&["chat"]);
        assert!(chat_only.applies_to("chat"));
        assert!(!chat_only.applies_to("username"));
    }

    #[test]
    fn test_replacement_defaults_to_mask() {
        let mut rule = rule_with_context(&[]);
        assert_eq!(rule.replacement(), "***");

        rule.replacement_text = Some(String::new());
        assert_eq!(rule.replacement(), "***");

        rule.replacement_text = Some("[removed]".to_string());
        assert_eq!(rule.replacement(), "[removed]");
    }

    #[test]
    fn test_ban_expiry() {
        let now = Utc::now();
        let mut status = UserModerationStatus::new("u1");
        assert!(!status.is_banned_at(now));

        status.is_banned = true;
        assert!(status.is_banned_at(now), "ban without end date is permanent");

        status.banned_until = Some(now + Duration::hours(1));
        assert!(status.is_banned_at(now));

        status.banned_until = Some(now - Duration::seconds(1));
        assert!(!status.is_banned_at(now), "expired ban no longer applies");
    }

    #[test]
    fn test_rule_deserializes_from_snake_case() {
        let json = r#"{
            "id": "r-1",
            "rule_type": "banned_phrase",
            "pattern": "buy followers",
            "severity": "critical",
            "action": "shadow_ban"
        }"#;

        let rule: ModerationRule = serde_json::from_str(json).unwrap();
        assert_eq!(rule.rule_type, RuleType::BannedPhrase);
        assert_eq!(rule.severity, Severity::Critical);
        assert_eq!(rule.action, RuleAction::ShadowBan);
        assert!(rule.is_active);
        assert!(rule.context.is_empty());
    }
}
