// Moderation domain models - data structures for the violation engine.
//
// These are pure domain types with no Discord dependencies.
// The Discord layer converts these into Discord-specific actions.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Which rule an inbound message (or username) violated.
///
/// Each category keeps its own durable counter and its own punishment
/// ladder: a user warned for links still starts at tier 1 the first time
/// they trip the mention rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ViolationCategory {
    AbusiveLanguage,
    DisallowedLink,
    MassMention,
    Spam,
}

impl ViolationCategory {
    pub const ALL: [ViolationCategory; 4] = [
        ViolationCategory::AbusiveLanguage,
        ViolationCategory::DisallowedLink,
        ViolationCategory::MassMention,
        ViolationCategory::Spam,
    ];
}

impl std::fmt::Display for ViolationCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ViolationCategory::AbusiveLanguage => write!(f, "Abusive Language"),
            ViolationCategory::DisallowedLink => write!(f, "Disallowed Link"),
            ViolationCategory::MassMention => write!(f, "Mass Mention"),
            ViolationCategory::Spam => write!(f, "Spam"),
        }
    }
}

/// Outcome of classifying one message: at most one verdict per message.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub category: ViolationCategory,
    /// Human-readable description of what tripped the rule.
    pub detail: String,
    /// Set only by the spam path, which already knows the post-trip
    /// violation count. Every other category lets the store compute
    /// count + 1.
    pub explicit_count: Option<u32>,
}

/// Metadata persisted alongside a counter bump.
#[derive(Debug, Clone)]
pub struct ViolationMeta {
    pub display_name: String,
    pub detail: String,
    /// Raw content of the offending message.
    pub content: String,
}

/// Durable per-user violation state, one counter per category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViolationRecord {
    pub user_id: u64,
    pub display_name: String,
    pub abusive_count: u32,
    pub link_count: u32,
    pub mention_count: u32,
    pub spam_count: u32,
    pub last_category: Option<ViolationCategory>,
    pub last_detail: Option<String>,
    pub last_content: Option<String>,
    /// Assigned by the store at write time.
    pub last_at: Option<DateTime<Utc>>,
}

impl ViolationRecord {
    pub fn count(&self, category: ViolationCategory) -> u32 {
        match category {
            ViolationCategory::AbusiveLanguage => self.abusive_count,
            ViolationCategory::DisallowedLink => self.link_count,
            ViolationCategory::MassMention => self.mention_count,
            ViolationCategory::Spam => self.spam_count,
        }
    }
}

/// What a punishment tier does to the offender.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PunishmentKind {
    Warn,
    Mute { duration: Duration },
    Ban,
}

/// One rung of a category's punishment ladder.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunishmentTier {
    pub kind: PunishmentKind,
    /// Sent to the offender in a DM. Placeholders like `{limit}` are
    /// substituted at send time.
    pub dm_template: String,
    /// Posted publicly. `{user}` is substituted at send time.
    pub channel_template: String,
}

/// Three escalating tiers: warn, then mute, then ban.
///
/// Counts past the top of the ladder keep mapping to the ban tier until a
/// reset, so a re-offending user whose ban failed gets banned again, not
/// warned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunishmentLadder {
    tiers: [PunishmentTier; 3],
}

impl PunishmentLadder {
    pub fn new(tiers: [PunishmentTier; 3]) -> Self {
        Self { tiers }
    }

    /// Tier for an updated violation count: 1-based, clamped to 3.
    pub fn tier_for(&self, count: u32) -> (u8, &PunishmentTier) {
        let tier = count.clamp(1, 3);
        (tier as u8, &self.tiers[(tier - 1) as usize])
    }

    fn validate(&self, name: &str) -> Result<(), String> {
        for (i, tier) in self.tiers.iter().enumerate() {
            if tier.dm_template.trim().is_empty() || tier.channel_template.trim().is_empty() {
                return Err(format!("{name} ladder tier {} has an empty template", i + 1));
            }
            if let PunishmentKind::Mute { duration } = tier.kind {
                if duration.is_zero() {
                    return Err(format!(
                        "{name} ladder tier {} has a zero mute duration",
                        i + 1
                    ));
                }
            }
        }
        Ok(())
    }
}

/// The four ladders, one per violation category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PunishmentLadders {
    pub abusive: PunishmentLadder,
    pub links: PunishmentLadder,
    pub mentions: PunishmentLadder,
    pub spam: PunishmentLadder,
}

impl PunishmentLadders {
    pub fn ladder(&self, category: ViolationCategory) -> &PunishmentLadder {
        match category {
            ViolationCategory::AbusiveLanguage => &self.abusive,
            ViolationCategory::DisallowedLink => &self.links,
            ViolationCategory::MassMention => &self.mentions,
            ViolationCategory::Spam => &self.spam,
        }
    }

    /// Checked once at startup; a ladder that fails here never runs.
    pub fn validate(&self) -> Result<(), String> {
        self.abusive.validate("abusive-language")?;
        self.links.validate("link")?;
        self.mentions.validate("mention")?;
        self.spam.validate("spam")?;
        Ok(())
    }
}

const DEFAULT_MUTE: Duration = Duration::from_secs(5 * 60);

fn three_tier(
    warn_dm: &str,
    warn_channel: &str,
    mute_dm: &str,
    mute_channel: &str,
    ban_dm: &str,
    ban_channel: &str,
) -> PunishmentLadder {
    PunishmentLadder::new([
        PunishmentTier {
            kind: PunishmentKind::Warn,
            dm_template: warn_dm.to_string(),
            channel_template: warn_channel.to_string(),
        },
        PunishmentTier {
            kind: PunishmentKind::Mute {
                duration: DEFAULT_MUTE,
            },
            dm_template: mute_dm.to_string(),
            channel_template: mute_channel.to_string(),
        },
        PunishmentTier {
            kind: PunishmentKind::Ban,
            dm_template: ban_dm.to_string(),
            channel_template: ban_channel.to_string(),
        },
    ])
}

impl Default for PunishmentLadders {
    fn default() -> Self {
        Self {
            abusive: three_tier(
                "⚠️ **First Warning**\nYour message violated server rules.\nNext offense: 5-minute mute",
                "{user} received a warning (1/3)",
                "🔇 **You have been muted for 5 minutes**\nReason: Repeated violations",
                "🔇 {user} muted for 5 minutes (2/3)",
                "🚫 **You have been banned**\nReason: Multiple rule violations",
                "🚫 {user} banned (violations cleared)",
            ),
            links: three_tier(
                "⚠️ **Link Warning**\nSending links is not allowed in this server.\nNext offense: 5-minute mute",
                "{user} received a warning for sending links (1/3)",
                "🔇 **You have been muted for 5 minutes**\nReason: Repeated link sharing",
                "🔇 {user} muted for 5 minutes for sending links (2/3)",
                "🚫 **You have been banned**\nReason: Multiple link sharing violations",
                "🚫 {user} banned for repeated link sharing (violations cleared)",
            ),
            mentions: three_tier(
                "⚠️ **Mention Warning**\nYou mentioned too many users in one message (max {limit} allowed).\nNext offense: 5-minute mute",
                "{user} received a warning for mass mentions (1/3)",
                "🔇 **You have been muted for 5 minutes**\nReason: Repeated mass mentions",
                "🔇 {user} muted for 5 minutes for mass mentions (2/3)",
                "🚫 **You have been banned**\nReason: Multiple mass mention violations",
                "🚫 {user} banned for repeated mass mentions (violations cleared)",
            ),
            spam: three_tier(
                "⚠️ **Spam Warning**\nPlease stop spamming messages.\nNext offense: 5-minute mute",
                "{user} received a warning for spamming (1/3)",
                "🔇 **You have been muted for 5 minutes**\nReason: Repeated spamming",
                "🔇 {user} muted for 5 minutes for spamming (2/3)",
                "🚫 **You have been banned**\nReason: Multiple spamming violations",
                "🚫 {user} banned for repeated spamming (violations cleared)",
            ),
        }
    }
}

/// Render a message template against an explicit parameter map.
/// Unknown placeholders are left in place; templates are never mutated.
pub fn render_template(template: &str, params: &[(&str, String)]) -> String {
    let mut out = template.to_string();
    for (key, value) in params {
        out = out.replace(&format!("{{{key}}}"), value);
    }
    out
}

/// Tunables for the rule evaluators. Loaded once at startup, immutable
/// afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModerationConfig {
    /// Messages inside the window before the next one counts as spam.
    pub spam_threshold: u32,
    /// Sliding window for spam detection, in milliseconds.
    pub spam_window_ms: u64,
    /// Maximum distinct users a single message may mention.
    pub mention_limit: u32,
    /// Hostnames links are allowed to point at.
    pub allowed_domains: Vec<String>,
    /// Check usernames of joining members against the lexicon.
    pub username_check_enabled: bool,
    /// Kick members whose username fails the check.
    pub auto_kick_on_bad_username: bool,
    /// DM sent to a member whose username fails the check.
    pub username_warning: String,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            spam_threshold: 5,      // 5 messages...
            spam_window_ms: 10_000, // ...in 10 seconds
            mention_limit: 2,
            allowed_domains: vec!["discord.com".to_string(), "discord.gg".to_string()],
            username_check_enabled: true,
            auto_kick_on_bad_username: true,
            username_warning: "Your username violates our server rules. \
                               Please change your Discord username and rejoin."
                .to_string(),
        }
    }
}
