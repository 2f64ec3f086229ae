// Filtering pass - runs every applicable rule over one piece of content and
// resolves the final verdict.
//
// Pure computation over the rule snapshot: no I/O, no shared mutable state,
// safe to run for many messages in parallel.
//
// Verdict precedence (highest wins): blocked > modified > flagged > allowed.

use super::moderation_models::{ActionTaken, MatchedRule, ModerationResult, RuleAction};
use super::rule_matcher::CompiledRule;
use super::severity::SeverityAccumulator;
use std::sync::Arc;

/// Collects matches during a pass and turns them into a [`ModerationResult`].
#[derive(Debug)]
pub struct ActionResolver<'a> {
    original: &'a str,
    filtered: String,
    matched_rules: Vec<MatchedRule>,
    score: SeverityAccumulator,
    should_block: bool,
    should_flag: bool,
    modified: bool,
}

impl<'a> ActionResolver<'a> {
    pub fn new(original: &'a str) -> Self {
        Self {
            original,
            filtered: original.to_string(),
            matched_rules: Vec::new(),
            score: SeverityAccumulator::new(),
            should_block: false,
            should_flag: false,
            modified: false,
        }
    }

    /// Record that `rule` matched the original content.
    pub fn record_match(&mut self, rule: &CompiledRule) {
        let stored = rule.rule();
        self.matched_rules.push(MatchedRule::from(stored));
        self.score.add(stored.severity);

        match stored.action {
            RuleAction::Block => self.should_block = true,
            RuleAction::Flag | RuleAction::ShadowBan => self.should_flag = true,
            RuleAction::Replace => {
                // Later replace rules see earlier substitutions.
                let rewritten = rule.rewrite(&self.filtered).into_owned();
                self.filtered = rewritten;
                self.modified = true;
            }
        }
    }

    pub fn resolve(self) -> ModerationResult {
        let requires_manual_review = self.should_flag || self.score.reaches_review_threshold();

        let (action_taken, is_allowed, filtered_content) = if self.should_block {
            // Blocked content never carries a partial redaction.
            (ActionTaken::Blocked, false, self.original.to_string())
        } else if self.modified {
            (ActionTaken::Modified, true, self.filtered)
        } else if self.should_flag {
            (ActionTaken::Flagged, true, self.original.to_string())
        } else {
            (ActionTaken::Allowed, true, self.original.to_string())
        };

        ModerationResult {
            is_allowed,
            filtered_content,
            matched_rules: self.matched_rules,
            severity_score: self.score.total(),
            requires_manual_review,
            action_taken,
        }
    }
}

/// Run one filtering pass of `content` against `rules`, in order.
pub fn evaluate_content(content: &str, rules: &[Arc<CompiledRule>]) -> ModerationResult {
    if content.trim().is_empty() {
        return ModerationResult::allowed(content);
    }

    let mut resolver = ActionResolver::new(content);
    for rule in rules {
        match rule.is_match(content) {
            Ok(true) => resolver.record_match(rule),
            Ok(false) => {}
            Err(e) => {
                tracing::warn!(rule_id = %e.rule_id, error = %e.source, "Skipping rule with invalid pattern");
            }
        }
    }

    resolver.resolve()
}
