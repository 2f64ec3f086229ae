// Rule matching - evaluates one piece of text against one rule.
//
// Every rule type is compiled as a case-insensitive regular expression.
// A pattern that fails to compile never aborts a pass: the error is kept
// next to the rule and the rule simply never matches.

use super::moderation_models::{ModerationRule, RuleAction};
use regex::{NoExpand, Regex, RegexBuilder};
use std::borrow::Cow;
use thiserror::Error;

/// A stored rule whose pattern is not a valid regular expression.
#[derive(Debug, Clone, Error)]
#[error("Rule {rule_id} has an invalid pattern: {source}")]
pub struct RuleCompilationError {
    pub rule_id: String,
    #[source]
    pub source: regex::Error,
}

/// Outcome of matching text against a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchOutcome {
    pub matched: bool,
    /// The text with every occurrence replaced. Only set for matching `replace` rules.
    pub rewritten: Option<String>,
}

impl MatchOutcome {
    fn no_match() -> Self {
        Self {
            matched: false,
            rewritten: None,
        }
    }
}

/// A rule paired with its compiled pattern (or the reason it would not compile).
#[derive(Debug, Clone)]
pub struct CompiledRule {
    rule: ModerationRule,
    pattern: Result<Regex, RuleCompilationError>,
}

impl CompiledRule {
    pub fn new(rule: ModerationRule) -> Self {
        let pattern = RegexBuilder::new(&rule.pattern)
            .case_insensitive(true)
            .build()
            .map_err(|source| RuleCompilationError {
                rule_id: rule.id.clone(),
                source,
            });

        Self { rule, pattern }
    }

    pub fn rule(&self) -> &ModerationRule {
        &self.rule
    }

    pub fn compile_error(&self) -> Option<&RuleCompilationError> {
        self.pattern.as_ref().err()
    }

    /// Does the pattern occur anywhere in `text`?
    pub fn is_match(&self, text: &str) -> Result<bool, RuleCompilationError> {
        match &self.pattern {
            Ok(regex) => Ok(regex.is_match(text)),
            Err(e) => Err(e.clone()),
        }
    }

    /// Replace every occurrence in `text` with the rule's replacement, taken literally.
    pub fn rewrite<'t>(&self, text: &'t str) -> Cow<'t, str> {
        match &self.pattern {
            Ok(regex) => regex.replace_all(text, NoExpand(self.rule.replacement())),
            Err(_) => Cow::Borrowed(text),
        }
    }

    /// Match `text` and, for `replace` rules, produce the rewritten text.
    pub fn evaluate(&self, text: &str) -> Result<MatchOutcome, RuleCompilationError> {
        if !self.is_match(text)? {
            return Ok(MatchOutcome::no_match());
        }

        let rewritten = match self.rule.action {
            RuleAction::Replace => Some(self.rewrite(text).into_owned()),
            RuleAction::Flag | RuleAction::Block | RuleAction::ShadowBan => None,
        };

        Ok(MatchOutcome {
            matched: true,
            rewritten,
        })
    }
}

/// One-off match of `text` against an uncompiled rule.
///
/// The filtering pass uses pre-compiled rules from the cache instead.
pub fn match_rule(text: &str, rule: &ModerationRule) -> Result<MatchOutcome, RuleCompilationError> {
    CompiledRule::new(rule.clone()).evaluate(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::moderation::moderation_models::{RuleType, Severity};
    use std::collections::BTreeSet;

    fn rule(pattern: &str, action: RuleAction, replacement: Option<&str>) -> ModerationRule {
        ModerationRule {
            id: "rule-1".to_string(),
            rule_type: RuleType::RegexPattern,
            pattern: pattern.to_string(),
            severity: Severity::Low,
            action,
            replacement_text: replacement.map(str::to_string),
            context: BTreeSet::new(),
            is_active: true,
        }
    }

    #[test]
    fn test_match_is_case_insensitive() {
        let outcome = match_rule("Total SPAM here", &rule(r"\bspam\b", RuleAction::Flag, None))
            .unwrap();
        assert!(outcome.matched);
        assert_eq!(outcome.rewritten, None);
    }

    #[test]
    fn test_no_match() {
        let outcome =
            match_rule("spammer", &rule(r"\bspam\b", RuleAction::Block, None)).unwrap();
        assert!(!outcome.matched);
        assert_eq!(outcome.rewritten, None);
    }

    #[test]
    fn test_replace_rewrites_every_occurrence() {
        let outcome = match_rule(
            "darn, DARN it",
            &rule(r"\bdarn\b", RuleAction::Replace, Some("***")),
        )
        .unwrap();
        assert!(outcome.matched);
        assert_eq!(outcome.rewritten.as_deref(), Some("***, *** it"));
    }

    #[test]
    fn test_replace_uses_default_mask() {
        let outcome =
            match_rule("oh heck", &rule("heck", RuleAction::Replace, Some(""))).unwrap();
        assert_eq!(outcome.rewritten.as_deref(), Some("oh ***"));
    }

    #[test]
    fn test_replacement_is_literal() {
        let outcome = match_rule(
            "price: 100",
            &rule(r"(\d+)", RuleAction::Replace, Some("$1 coins")),
        )
        .unwrap();
        assert_eq!(outcome.rewritten.as_deref(), Some("price: $1 coins"));
    }

    #[test]
    fn test_invalid_pattern_reports_rule_id() {
        let compiled = CompiledRule::new(rule("(unclosed", RuleAction::Block, None));
        assert!(compiled.compile_error().is_some());

        let err = compiled.evaluate("anything").unwrap_err();
        assert_eq!(err.rule_id, "rule-1");
        assert_eq!(compiled.rewrite("anything"), "anything");
    }
}
