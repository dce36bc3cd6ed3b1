// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "moderation/sqlite_violation_store.rs"]
pub mod moderation;
