// Content moderation engine for live-stream chat, comments and usernames.
//
// **Architecture Overview:**
// - `core/` = Business logic (rule cache, filtering pass, user status, reports)
// - `infra/` = Implementations of core traits (in-memory stores, JSON rule file, SQLite state)
//
// The engine never touches the network or the UI. Callers invoke it per
// message and enforce the verdict themselves.

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with several mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
pub mod core;
#[path = "infra/infra_layer.rs"]
pub mod infra;
