// Discord layer - commands and event handlers.

use std::sync::Arc;

use crate::core::moderation::ModerationService;
use crate::infra::moderation::SqliteViolationStore;

#[path = "moderation/mod.rs"]
pub mod moderation;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

/// Runtime knobs for the Discord shell, read once at startup.
#[derive(Debug, Clone, Default)]
pub struct BotSettings {
    /// Only moderate this guild when set; events from others are ignored.
    pub guild_id: Option<u64>,
    /// Extra channel that receives moderation log embeds, alongside the
    /// channel the violation happened in.
    pub mod_log_channel: Option<u64>,
}

/// Data that's shared across all commands and event handlers.
pub struct Data {
    pub moderation: Arc<ModerationService<SqliteViolationStore>>,
    pub settings: BotSettings,
}
