// Entry point of the GW2 Tools bot.
//
// - `core/` = business logic (platform-agnostic)
// - `infra/` = implementations of core traits (JSON files, SQLite, HTTP)
// - `discord/` = Discord adapters (commands, components, dispatchers)
//
// This file loads settings, wires the services together, sets up the poise
// framework and starts the background loops.

#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

use crate::core::accounts::AccountService;
use crate::core::audit::AuditService;
use crate::core::builds::BuildService;
use crate::core::comps::CompService;
use crate::core::config::ConfigService;
use crate::core::rss::RssService;
use crate::core::settings::Settings;
use crate::core::update_notes::UpdateNotesService;
use crate::discord::audit::events as audit_events;
use crate::discord::commands::presence;
use crate::discord::comps::{interactions, SerenityCompPoster};
use crate::discord::feeds::dispatcher;
use crate::discord::{Data, Error};
use crate::infra::accounts::SqliteApiKeyStore;
use crate::infra::audit::SqliteAuditStore;
use crate::infra::feeds::HttpFeedFetcher;
use crate::infra::guild_store::JsonGuildStore;
use crate::infra::gw2::Gw2ApiClient;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

const RSS_INTERVAL: Duration = Duration::from_secs(10 * 60);
const UPDATE_NOTES_INTERVAL: Duration = Duration::from_secs(15 * 60);
const COMP_INTERVAL: Duration = Duration::from_secs(60);
const GW2_AUDIT_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Event handler for non-command Discord events.
async fn event_handler(
    ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::InteractionCreate {
            interaction: serenity::Interaction::Component(component),
        } => {
            if let Err(e) = interactions::handle_component(ctx, data, component).await {
                tracing::error!(custom_id = %component.data.custom_id, error = %e, "Error handling component interaction");
            }
        }
        serenity::FullEvent::GuildMemberAddition { new_member } => {
            if let Err(e) = audit_events::handle_member_join(ctx, data, new_member).await {
                tracing::error!("Error handling member join audit: {}", e);
            }
        }
        serenity::FullEvent::GuildMemberRemoval {
            guild_id,
            user,
            member_data_if_available,
        } => {
            if let Err(e) = audit_events::handle_member_remove(
                ctx,
                data,
                *guild_id,
                user,
                member_data_if_available.as_ref(),
            )
            .await
            {
                tracing::error!("Error handling member remove audit: {}", e);
            }
        }
        serenity::FullEvent::MessageDelete {
            channel_id,
            deleted_message_id,
            guild_id,
        } => {
            if let Err(e) = audit_events::handle_message_delete(
                ctx,
                data,
                *channel_id,
                *deleted_message_id,
                *guild_id,
            )
            .await
            {
                tracing::error!("Error handling message delete audit: {}", e);
            }
        }
        _ => {}
    }

    Ok(())
}

/// Storage and platform failures land here; member-facing errors were already
/// answered by the command.
async fn on_error(error: poise::FrameworkError<'_, Data, Error>) {
    match error {
        poise::FrameworkError::Command { error, ctx, .. } => {
            tracing::error!(
                command = %ctx.command().qualified_name,
                guild_id = ctx.guild_id().map(|g| g.get()),
                error = %error,
                "Command failed"
            );
            let reply = poise::CreateReply::default()
                .content("❌ Something went wrong. Please try again later.")
                .ephemeral(true);
            if let Err(e) = ctx.send(reply).await {
                tracing::warn!("Failed to send error reply: {}", e);
            }
        }
        // The check already told the member why.
        poise::FrameworkError::CommandCheckFailed { error: None, .. } => {}
        other => {
            if let Err(e) = poise::builtins::on_error(other).await {
                tracing::error!("Error while handling error: {}", e);
            }
        }
    }
}

fn cached_guild_ids(cache: &serenity::Cache) -> Vec<u64> {
    cache.guilds().iter().map(|g| g.get()).collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let settings = Settings::from_env()?;
    std::fs::create_dir_all(&settings.data_dir)
        .with_context(|| format!("Failed to create data directory {}", settings.data_dir.display()))?;
    tracing::info!(
        data_dir = %settings.data_dir.display(),
        production = settings.production,
        "Starting GW2 Tools bot"
    );

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // Every JSON file belongs to exactly one service, so each service gets its
    // own store.

    let data_dir = settings.data_dir.clone();
    let config_service = Arc::new(ConfigService::new(JsonGuildStore::new(&data_dir)));
    let build_service = Arc::new(BuildService::new(JsonGuildStore::new(&data_dir)));
    let rss_service = Arc::new(RssService::new(
        HttpFeedFetcher::new().context("Failed to create RSS HTTP client")?,
        JsonGuildStore::new(&data_dir),
    ));
    let update_notes_service = Arc::new(UpdateNotesService::new(
        HttpFeedFetcher::new().context("Failed to create update notes HTTP client")?,
        JsonGuildStore::new(&data_dir),
    ));
    let audit_service = Arc::new(AuditService::new(
        Gw2ApiClient::new().context("Failed to create GW2 API client")?,
        SqliteAuditStore::new(&data_dir),
    ));
    let key_store = SqliteApiKeyStore::new(&data_dir.join("api_keys.sqlite"))
        .await
        .context("Failed to open API key database")?;
    let account_service = Arc::new(AccountService::new(
        Gw2ApiClient::new().context("Failed to create GW2 API client")?,
        key_store,
    ));

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILDS
        | serenity::GatewayIntents::GUILD_MEMBERS
        | serenity::GatewayIntents::GUILD_MESSAGES
        | serenity::GatewayIntents::MESSAGE_CONTENT; // Deleted message content for the audit log

    let production = settings.production;
    let framework = poise::Framework::builder()
        .options(poise::FrameworkOptions {
            commands: discord::commands::all(),
            event_handler: |ctx, event, framework, data| {
                Box::pin(event_handler(ctx, event, framework, data))
            },
            on_error: |error| Box::pin(on_error(error)),
            ..Default::default()
        })
        .setup(move |ctx, _ready, framework| {
            Box::pin(async move {
                poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                tracing::info!("Commands registered");
                presence::on_ready(ctx);

                // Signup posts go through the client's HTTP handle.
                let comp_service = Arc::new(CompService::new(
                    JsonGuildStore::new(&data_dir),
                    SerenityCompPoster::new(ctx.http.clone()),
                ));

                let data = Data {
                    production,
                    config: config_service,
                    builds: build_service,
                    rss: rss_service,
                    update_notes: update_notes_service,
                    comps: comp_service,
                    audit: audit_service,
                    accounts: account_service,
                };

                spawn_rss_loop(ctx, &data);
                spawn_update_notes_loop(ctx, &data);
                spawn_comp_loop(ctx, &data);
                spawn_gw2_audit_loop(ctx, &data);

                tracing::info!("Bot is ready");
                Ok(data)
            })
        })
        .build();

    // Deleted messages are reported from the cache.
    let mut cache_settings = serenity::cache::Settings::default();
    cache_settings.max_messages = 10000;

    let mut client = serenity::ClientBuilder::new(settings.discord_token, intents)
        .framework(framework)
        .cache_settings(cache_settings)
        .await
        .context("Error creating client")?;

    client.start().await.context("Error running bot")?;
    Ok(())
}

fn spawn_rss_loop(ctx: &serenity::Context, data: &Data) {
    let rss = Arc::clone(&data.rss);
    let http = ctx.http.clone();
    let cache = ctx.cache.clone();
    tokio::spawn(async move {
        loop {
            tracing::debug!("Starting RSS poll");
            let posts = rss.poll(&cached_guild_ids(&cache)).await;
            if !posts.is_empty() {
                tracing::info!(count = posts.len(), "Posting new RSS entries");
                dispatcher::send_feed_posts(&http, posts).await;
            }
            tokio::time::sleep(RSS_INTERVAL).await;
        }
    });
}

fn spawn_update_notes_loop(ctx: &serenity::Context, data: &Data) {
    let update_notes = Arc::clone(&data.update_notes);
    let config = Arc::clone(&data.config);
    let http = ctx.http.clone();
    let cache = ctx.cache.clone();
    tokio::spawn(async move {
        loop {
            let mut targets = Vec::new();
            for guild_id in cached_guild_ids(&cache) {
                match config.get_config(guild_id).await {
                    Ok(guild_config) => {
                        if let Some(channel_id) = guild_config.update_notes_channel_id {
                            targets.push((guild_id, channel_id));
                        }
                    }
                    Err(e) => tracing::warn!(guild_id, error = %e, "Failed to load guild config"),
                }
            }
            if !targets.is_empty() {
                let posts = update_notes.poll(&targets).await;
                if !posts.is_empty() {
                    tracing::info!(count = posts.len(), "Posting game update notes");
                    dispatcher::send_update_notes(&http, posts).await;
                }
            }
            tokio::time::sleep(UPDATE_NOTES_INTERVAL).await;
        }
    });
}

fn spawn_comp_loop(ctx: &serenity::Context, data: &Data) {
    let comps = Arc::clone(&data.comps);
    let cache = ctx.cache.clone();
    tokio::spawn(async move {
        loop {
            let reports = comps.tick(&cached_guild_ids(&cache), chrono::Utc::now()).await;
            for report in reports {
                if let Some(failure) = report.failure {
                    tracing::warn!(
                        guild_id = report.guild_id,
                        schedule_id = report.schedule_id,
                        failure = %failure,
                        "Scheduled composition was not posted"
                    );
                }
            }
            tokio::time::sleep(COMP_INTERVAL).await;
        }
    });
}

fn spawn_gw2_audit_loop(ctx: &serenity::Context, data: &Data) {
    let audit = Arc::clone(&data.audit);
    let config = Arc::clone(&data.config);
    let cache = ctx.cache.clone();
    tokio::spawn(async move {
        loop {
            for guild_id in cached_guild_ids(&cache) {
                let guild_config = match config.get_config(guild_id).await {
                    Ok(guild_config) => guild_config,
                    Err(e) => {
                        tracing::warn!(guild_id, error = %e, "Failed to load guild config");
                        continue;
                    }
                };
                let Some(gw2_guild_id) = guild_config.audit_gw2_guild_id.as_deref() else {
                    continue;
                };
                if guild_config.audit_gw2_api_keys.is_empty() {
                    continue;
                }
                match audit
                    .sync_gw2_log(guild_id, gw2_guild_id, &guild_config.audit_gw2_api_keys)
                    .await
                {
                    Ok(0) => {}
                    Ok(count) => tracing::info!(guild_id, count, "Synced GW2 guild log"),
                    Err(e) => tracing::warn!(guild_id, error = %e, "GW2 guild log sync failed"),
                }
            }
            tokio::time::sleep(GW2_AUDIT_INTERVAL).await;
        }
    });
}
