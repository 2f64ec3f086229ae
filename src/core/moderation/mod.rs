// Core moderation module - the content filtering engine.
// Same layering as the rest of core: models, store ports, then services.

pub mod action_resolver;
pub mod clock;
pub mod content_reporter;
pub mod moderation_config;
pub mod moderation_logger;
pub mod moderation_models;
pub mod moderation_service;
pub mod moderation_store;
pub mod rule_cache;
pub mod rule_matcher;
pub mod severity;
pub mod user_status;

pub use action_resolver::{evaluate_content, ActionResolver};
pub use clock::{Clock, ManualClock, SystemClock};
pub use content_reporter::ContentReporter;
pub use moderation_config::ModerationConfig;
pub use moderation_logger::ModerationLogger;
pub use moderation_models::*;
pub use moderation_service::{ModerationService, ModerationStores};
pub use moderation_store::{
    ModerationError, ModerationLogSink, ReportQueue, RuleStore, StoreError, UserStatusStore,
};
pub use rule_cache::{RuleCache, RuleSnapshot};
pub use rule_matcher::{match_rule, CompiledRule, MatchOutcome, RuleCompilationError};
pub use severity::{SeverityAccumulator, MANUAL_REVIEW_THRESHOLD};
pub use user_status::UserStatusTracker;
