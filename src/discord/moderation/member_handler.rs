// Username screening for joining members.

use crate::discord::{Data, Error};
use poise::serenity_prelude as serenity;

/// Check a joining member's username against the lexicon and act on it.
pub async fn handle_member_join(
    ctx: &serenity::Context,
    member: &serenity::Member,
    data: &Data,
) -> Result<(), Error> {
    if member.user.bot {
        return Ok(());
    }
    if let Some(expected) = data.settings.guild_id {
        if member.guild_id.get() != expected {
            return Ok(());
        }
    }
    if member
        .permissions(ctx)
        .map(|p| p.administrator())
        .unwrap_or(false)
    {
        return Ok(());
    }
    if !data.moderation.username_violates(&member.user.name) {
        return Ok(());
    }

    tracing::info!(
        user_id = member.user.id.get(),
        username = %member.user.name,
        "username violation on join"
    );

    let config = data.moderation.config();

    // Best-effort DM with rename instructions; closed DMs are tolerated.
    let dm_embed = serenity::CreateEmbed::new()
        .color(0xFF0000)
        .title("Username Violation")
        .description("Your username contains prohibited content.")
        .field("Current Username", member.user.name.clone(), false)
        .field(
            "How to fix",
            "Change your Discord username in User Settings > Edit Profile",
            false,
        );
    let dm = serenity::CreateMessage::new()
        .content(config.username_warning.clone())
        .embed(dm_embed);
    if member.user.direct_message(&ctx.http, dm).await.is_err() {
        tracing::debug!("username-violation DM to {} undelivered", member.user.id);
    }

    if let Some(log_channel) = data.settings.mod_log_channel {
        let action = if config.auto_kick_on_bad_username {
            "Kicked"
        } else {
            "Warning sent"
        };
        let log = serenity::CreateEmbed::new()
            .color(0xFFA500)
            .title("Username Violation Detected")
            .description("Blocked user with inappropriate username")
            .field(
                "User",
                format!("{} ({})", member.user.name, member.user.id),
                false,
            )
            .field("Action", action, false)
            .timestamp(serenity::Timestamp::now());
        if let Err(e) = serenity::ChannelId::new(log_channel)
            .send_message(&ctx.http, serenity::CreateMessage::new().embed(log))
            .await
        {
            tracing::warn!("failed to post username-violation log: {e}");
        }
    }

    if config.auto_kick_on_bad_username {
        if let Err(e) = member
            .kick_with_reason(&ctx.http, "Automatic kick: username violation")
            .await
        {
            tracing::error!("failed to kick {} for username violation: {e}", member.user.id);
        }
    }

    Ok(())
}
