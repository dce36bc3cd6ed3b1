// Discord-specific violation handling - translates engine verdicts into
// Discord actions (delete, DM, timeout, ban) and mod-log embeds.

use std::collections::HashSet;

use crate::core::moderation::{Enforcement, PunishmentKind};
use crate::discord::{Data, Error};
use chrono::Utc;
use poise::serenity_prelude::{self as serenity, Mentionable};

/// Banning also removes the offender's last day of messages.
const BAN_DELETE_MESSAGE_DAYS: u8 = 1;

/// Run one message through the moderation engine.
///
/// Returns `true` if a violation was detected and handled. Engine and
/// platform failures are logged here rather than propagated - one bad
/// message must never stall the event stream.
pub async fn handle_message(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    data: &Data,
) -> Result<bool, Error> {
    if msg.author.bot {
        return Ok(false);
    }

    // Only guild messages, and only the configured guild when one is set.
    let guild_id = match msg.guild_id {
        Some(id) => id,
        None => return Ok(false),
    };
    if let Some(expected) = data.settings.guild_id {
        if guild_id.get() != expected {
            return Ok(false);
        }
    }

    // Administrators are exempt from every rule.
    if is_admin(ctx, guild_id, msg.author.id).await {
        return Ok(false);
    }

    // Mentioning the same user twice counts once.
    let distinct_mentions = msg
        .mentions
        .iter()
        .map(|user| user.id)
        .collect::<HashSet<_>>()
        .len() as u32;

    let enforcement = match data
        .moderation
        .process_message(
            msg.author.id.get(),
            &msg.author.name,
            &msg.content,
            distinct_mentions,
            Utc::now(),
        )
        .await
    {
        Ok(Some(enforcement)) => enforcement,
        Ok(None) => return Ok(false),
        Err(e) => {
            // A store hiccup costs one counter bump, not the event loop.
            tracing::error!("moderation engine error for user {}: {e}", msg.author.id);
            return Ok(false);
        }
    };

    tracing::info!(
        user_id = msg.author.id.get(),
        category = %enforcement.category,
        count = enforcement.count,
        tier = enforcement.tier,
        "violation detected"
    );

    apply_enforcement(ctx, msg, guild_id, data, &enforcement).await;
    Ok(true)
}

/// Execute a punishment plan: delete the message, notify the user, apply
/// the platform action, then post the public log entry.
///
/// The counter was already committed by the engine; nothing here rolls it
/// back, including a failed mute or ban.
async fn apply_enforcement(
    ctx: &serenity::Context,
    msg: &serenity::Message,
    guild_id: serenity::GuildId,
    data: &Data,
    enforcement: &Enforcement,
) {
    // Remove the offending message first; failure is non-fatal.
    if let Err(e) = msg.delete(&ctx.http).await {
        tracing::warn!("failed to delete offending message {}: {e}", msg.id);
    }

    // Best-effort DM. Undelivered is a tolerated outcome (closed DMs);
    // fall back to a public nudge so the user still sees something.
    if !send_dm(ctx, &msg.author, &enforcement.dm_text).await {
        tracing::debug!("DM to {} undelivered, using channel fallback", msg.author.id);
        let nudge = format!(
            "{}, please enable DMs to receive moderation notices",
            msg.author.mention()
        );
        if let Err(e) = msg.channel_id.say(&ctx.http, nudge).await {
            tracing::warn!("DM fallback message failed: {e}");
        }
    }

    let reason = format!(
        "Automod: {} violations ({})",
        enforcement.count, enforcement.category
    );

    let action_result = match enforcement.kind {
        PunishmentKind::Warn => Ok(()),
        PunishmentKind::Mute { duration } => {
            let until: serenity::Timestamp =
                (Utc::now() + chrono::Duration::seconds(duration.as_secs() as i64)).into();
            guild_id
                .edit_member(
                    &ctx.http,
                    msg.author.id,
                    serenity::EditMember::new().disable_communication_until_datetime(until),
                )
                .await
                .map(|_| ())
        }
        PunishmentKind::Ban => {
            guild_id
                .ban_with_reason(&ctx.http, msg.author.id, BAN_DELETE_MESSAGE_DAYS, &reason)
                .await
        }
    };

    match action_result {
        Ok(()) => {
            if enforcement.clears_history() {
                // A ban wipes every category's history plus the spam window.
                match data.moderation.clear_user(msg.author.id.get()).await {
                    Ok(()) => {
                        tracing::info!("cleared all violations for {}", msg.author.name);
                    }
                    Err(e) => {
                        tracing::error!(
                            "failed to clear violation history for {}: {e}",
                            msg.author.id
                        );
                    }
                }
            }
            post_log_embed(ctx, msg.channel_id, data, enforcement).await;
        }
        Err(e) => {
            // The action failed but the counter commit stands; report it
            // where moderators can see it.
            tracing::error!(
                "failed to {} {}: {e}",
                action_name(&enforcement.kind),
                msg.author.id
            );
            let embed = serenity::CreateEmbed::new().color(0xFF0000).description(format!(
                "❌ Failed to {} {}: {e}",
                action_name(&enforcement.kind),
                msg.author.name
            ));
            if let Err(e) = msg
                .channel_id
                .send_message(&ctx.http, serenity::CreateMessage::new().embed(embed))
                .await
            {
                tracing::warn!("failed to post action-failure embed: {e}");
            }
        }
    }
}

/// Post the public moderation log embed to the violation's channel and,
/// when configured, to the dedicated mod-log channel.
async fn post_log_embed(
    ctx: &serenity::Context,
    channel_id: serenity::ChannelId,
    data: &Data,
    enforcement: &Enforcement,
) {
    let color = match enforcement.kind {
        PunishmentKind::Ban => 0xFF0000,
        _ => 0xFFA500,
    };
    let embed = serenity::CreateEmbed::new()
        .color(color)
        .description(enforcement.channel_text.clone())
        .field(
            "Violation Details",
            format!(
                "Type: {}\nCount: {}/3\n{}",
                enforcement.category, enforcement.count, enforcement.detail
            ),
            false,
        );

    let build = || {
        serenity::CreateMessage::new()
            .embed(embed.clone())
            .allowed_mentions(serenity::CreateAllowedMentions::new())
    };

    if let Err(e) = channel_id.send_message(&ctx.http, build()).await {
        tracing::warn!("failed to post moderation log in {channel_id}: {e}");
    }

    if let Some(log_channel) = data.settings.mod_log_channel {
        let log_channel = serenity::ChannelId::new(log_channel);
        if log_channel != channel_id {
            if let Err(e) = log_channel.send_message(&ctx.http, build()).await {
                tracing::warn!("failed to post moderation log in {log_channel}: {e}");
            }
        }
    }
}

/// Send a DM; `false` means undelivered.
async fn send_dm(ctx: &serenity::Context, user: &serenity::User, text: &str) -> bool {
    user.direct_message(&ctx.http, serenity::CreateMessage::new().content(text))
        .await
        .is_ok()
}

fn action_name(kind: &PunishmentKind) -> &'static str {
    match kind {
        PunishmentKind::Warn => "warn",
        PunishmentKind::Mute { .. } => "mute",
        PunishmentKind::Ban => "ban",
    }
}

/// Administrators are exempt from moderation.
async fn is_admin(
    ctx: &serenity::Context,
    guild_id: serenity::GuildId,
    user_id: serenity::UserId,
) -> bool {
    if let Ok(member) = guild_id.member(ctx, user_id).await {
        return member
            .permissions(ctx)
            .map(|p| p.administrator())
            .unwrap_or(false);
    }
    false
}
