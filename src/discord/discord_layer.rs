// Discord layer - commands, component handlers and background dispatchers.
//
// Everything here translates between serenity/poise types and the core
// services: extract primitives, call the core, format the result.

#[path = "commands/command_catalog.rs"]
pub mod commands;

#[path = "audit/mod.rs"]
pub mod audit;

#[path = "builds/mod.rs"]
pub mod builds;

#[path = "comps/mod.rs"]
pub mod comps;

#[path = "feeds/mod.rs"]
pub mod feeds;

use crate::core::accounts::AccountService;
use crate::core::audit::AuditService;
use crate::core::builds::BuildService;
use crate::core::comps::CompService;
use crate::core::config::ConfigService;
use crate::core::rss::RssService;
use crate::core::update_notes::UpdateNotesService;
use crate::infra::accounts::SqliteApiKeyStore;
use crate::infra::audit::SqliteAuditStore;
use crate::infra::feeds::HttpFeedFetcher;
use crate::infra::guild_store::JsonGuildStore;
use crate::infra::gw2::Gw2ApiClient;
use std::sync::Arc;

pub type Error = Box<dyn std::error::Error + Send + Sync>;
pub type Context<'a> = poise::Context<'a, Data, Error>;

pub type Comps = CompService<JsonGuildStore, comps::SerenityCompPoster>;

/// Shared state handed to every command and event handler.
pub struct Data {
    /// When false the manual test/force commands are available.
    pub production: bool,
    pub config: Arc<ConfigService<JsonGuildStore>>,
    pub builds: Arc<BuildService<JsonGuildStore>>,
    pub rss: Arc<RssService<HttpFeedFetcher, JsonGuildStore>>,
    pub update_notes: Arc<UpdateNotesService<HttpFeedFetcher, JsonGuildStore>>,
    pub comps: Arc<Comps>,
    pub audit: Arc<AuditService<Gw2ApiClient, SqliteAuditStore>>,
    pub accounts: Arc<AccountService<Gw2ApiClient, SqliteApiKeyStore>>,
}
