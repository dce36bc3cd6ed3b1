// This is the entry point of the moderation bot.
//
// **Architecture Overview:**
// - `core/` = Business logic (platform-agnostic)
// - `infra/` = Implementations of core traits (databases)
// - `discord/` = Discord-specific adapters (commands, events)
//
// This file's job is to:
// 1. Load configuration and the term lexicon
// 2. Initialize services (dependency injection)
// 3. Set up the Discord framework
// 4. Register commands and event handlers

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use std::sync::Arc;

use crate::core::moderation::{Lexicon, ModerationConfig, ModerationService, PunishmentLadders};
use crate::discord::moderation::{commands, member_handler, message_handler};
use crate::discord::{BotSettings, Data, Error};
use crate::infra::moderation::SqliteViolationStore;
use chrono::Utc;
use poise::serenity_prelude as serenity;

/// Event handler for non-command Discord events.
/// Errors stay inside each arm: one bad event must not stall the stream.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Message { new_message } => {
            if let Err(e) = message_handler::handle_message(ctx, new_message, data).await {
                tracing::error!("message handler error: {e}");
            }
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if let Err(e) = member_handler::handle_member_join(ctx, new_member, data).await {
                tracing::error!("member join handler error: {e}");
            }
        }
        _ => {}
    }

    Ok(())
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

/// Moderation tunables: code defaults with env-var overrides.
fn load_moderation_config() -> ModerationConfig {
    let mut config = ModerationConfig::default();
    if let Some(v) = env_parse("SPAM_THRESHOLD") {
        config.spam_threshold = v;
    }
    if let Some(v) = env_parse("SPAM_WINDOW_MS") {
        config.spam_window_ms = v;
    }
    if let Some(v) = env_parse("MENTION_LIMIT") {
        config.mention_limit = v;
    }
    if let Ok(domains) = std::env::var("ALLOWED_DOMAINS") {
        config.allowed_domains = domains
            .split(',')
            .map(|domain| domain.trim().to_string())
            .filter(|domain| !domain.is_empty())
            .collect();
    }
    if let Some(v) = env_parse("USERNAME_CHECK_ENABLED") {
        config.username_check_enabled = v;
    }
    if let Some(v) = env_parse("AUTO_KICK_ON_BAD_USERNAME") {
        config.auto_kick_on_bad_username = v;
    }
    config
}

#[tokio::main]
async fn main() {
    // Initialize logging so we can see what's happening
    tracing_subscriber::fmt::init();

    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    let token = std::env::var("DISCORD_TOKEN").expect(
        "Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.",
    );

    // Keep the runtime database in a dedicated folder so the repo root stays tidy.
    let data_dir = "data";
    std::fs::create_dir_all(data_dir).expect("Failed to create data directory for SQLite files");
    let db_path = format!("{}/violations.db", data_dir);

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Create our services with their dependencies.
    // This is the "composition root" where we wire everything together.

    let pool = sqlx::sqlite::SqlitePoolOptions::new()
        .connect(&format!("sqlite://{}?mode=rwc", db_path))
        .await
        .expect("Failed to connect to violations DB");
    let store = SqliteViolationStore::new(pool);
    store.migrate().await.expect("Failed to migrate violations DB");

    // A missing or unreadable word list aborts startup.
    let lexicon_path =
        std::env::var("LEXICON_PATH").unwrap_or_else(|_| "abusive-words.txt".to_string());
    let lexicon = Lexicon::from_file(&lexicon_path).expect("Failed to load the abusive-word lexicon");
    tracing::info!("loaded {} lexicon terms from {}", lexicon.len(), lexicon_path);

    let config = load_moderation_config();
    let moderation = Arc::new(
        ModerationService::new(config, lexicon, PunishmentLadders::default(), store)
            .expect("Invalid punishment ladder configuration"),
    );

    let settings = BotSettings {
        guild_id: env_parse("GUILD_ID"),
        mod_log_channel: env_parse("MOD_LOG_CHANNEL"),
    };
    if settings.guild_id.is_none() {
        tracing::warn!("GUILD_ID not set; moderating every guild the bot is in");
    }

    let data = Data {
        moderation: Arc::clone(&moderation),
        settings,
    };

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================
    // Configure the poise framework with our commands and settings.

    let intents = serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT // Required to read message content
        | serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS;

    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: vec![commands::unban(), commands::infractions()],
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            ..Default::default()
        })
        .setup(|ctx, _ready, framework| {
            Box::pin(async move {
                println!("🛡️ Moderation bot is starting up...");

                // Register slash commands globally (can take up to an hour
                // to propagate; use register_in_guild for faster dev cycles).
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                println!("✅ Commands registered!");

                // Background sweep that evicts idle spam windows, keeping
                // per-user ephemeral state bounded.
                let sweeper = Arc::clone(&moderation);
                let period =
                    std::time::Duration::from_millis(sweeper.config().spam_window_ms.max(1_000));
                tokio::spawn(async move {
                    loop {
                        tokio::time::sleep(period).await;
                        let evicted = sweeper.evict_idle_windows(Utc::now());
                        if evicted > 0 {
                            tracing::debug!("evicted {evicted} idle spam windows");
                        }
                    }
                });

                println!("🚀 Bot is ready!");
                Ok(data)
            })
        })
        .build();

    let mut client = serenity::ClientBuilder::new(token, intents)
        .framework(framework)
        .await
        .expect("Error creating client");

    client.start().await.expect("Error running bot");
}
