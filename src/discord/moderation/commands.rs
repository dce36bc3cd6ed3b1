// Administrative moderation slash commands.

use crate::core::moderation::ViolationCategory;
use crate::discord::{Context, Error};
use poise::serenity_prelude as serenity;

/// Lift a ban and reset the member's violation history.
#[poise::command(slash_command, guild_only, required_permissions = "BAN_MEMBERS")]
pub async fn unban(
    ctx: Context<'_>,
    #[description = "User ID (or mention) to unban"] user_id: String,
) -> Result<(), Error> {
    let guild_id = ctx.guild_id().ok_or("Must be used in a server")?;

    let user_id = match parse_user_id(&user_id) {
        Some(id) => id,
        None => {
            ctx.say("❌ Please provide a valid user ID.").await?;
            return Ok(());
        }
    };
    let target = serenity::UserId::new(user_id);

    // "Not banned" is an answer, not a failure - check before acting.
    let bans = guild_id.bans(ctx.http(), None, None).await?;
    if !bans.iter().any(|ban| ban.user.id == target) {
        ctx.say("❌ User is not banned.").await?;
        return Ok(());
    }

    guild_id.unban(ctx.http(), target).await?;

    // Fresh start: durable counters zeroed, spam window cleared - the same
    // cleanup the ban path runs, in reverse context.
    if let Err(e) = ctx.data().moderation.clear_user(user_id).await {
        tracing::error!("unban reset failed for {user_id}: {e}");
        ctx.say("⚠️ User unbanned, but resetting their violation record failed.")
            .await?;
        return Ok(());
    }

    let embed = serenity::CreateEmbed::new().color(0x00FF00).description(format!(
        "✅ Successfully unbanned <@{user_id}> with fresh start (violations reset to 0)"
    ));
    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Show a member's violation counters.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_MESSAGES")]
pub async fn infractions(
    ctx: Context<'_>,
    #[description = "User to inspect"] user: serenity::User,
) -> Result<(), Error> {
    let record = ctx
        .data()
        .moderation
        .record(user.id.get())
        .await
        .map_err(|e| Error::from(e.to_string()))?;

    let Some(record) = record else {
        ctx.say(format!("{} has a clean record.", user.name)).await?;
        return Ok(());
    };

    let mut embed = serenity::CreateEmbed::new()
        .title(format!("Infractions for {}", user.name))
        .color(0xFFA500);
    for category in ViolationCategory::ALL {
        embed = embed.field(category.to_string(), record.count(category).to_string(), true);
    }

    if let (Some(category), Some(at)) = (record.last_category, record.last_at) {
        embed = embed.field(
            "Last Violation",
            format!("{} at {}", category, at.format("%Y-%m-%d %H:%M UTC")),
            false,
        );
    }

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Digits of a raw ID, with mention decorations (`<@...>`) stripped.
fn parse_user_id(raw: &str) -> Option<u64> {
    raw.trim()
        .trim_matches(|c| matches!(c, '<' | '@' | '!' | '>'))
        .parse()
        .ok()
}
