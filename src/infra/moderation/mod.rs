// Implementations of the moderation store ports.

pub mod in_memory;
pub mod json_rule_store;
pub mod sqlite_store;

pub use in_memory::{
    InMemoryLogSink, InMemoryReportQueue, InMemoryRuleStore, InMemoryUserStatusStore,
};
pub use json_rule_store::JsonRuleStore;
pub use sqlite_store::{SqliteLogSink, SqliteReportQueue, SqliteUserStatusStore};
