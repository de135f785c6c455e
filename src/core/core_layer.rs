// The core module contains all business logic.
// Each feature gets its own submodule; none of them know about Discord.

#[path = "accounts/mod.rs"]
pub mod accounts;

#[path = "audit/mod.rs"]
pub mod audit;

#[path = "builds/mod.rs"]
pub mod builds;

#[path = "comps/mod.rs"]
pub mod comps;

#[path = "config/mod.rs"]
pub mod config;

#[path = "feeds/mod.rs"]
pub mod feeds;

#[path = "gw2/mod.rs"]
pub mod gw2;

#[path = "professions/professions.rs"]
pub mod professions;

#[path = "rss/mod.rs"]
pub mod rss;

#[path = "settings/settings.rs"]
pub mod settings;

#[path = "store/mod.rs"]
pub mod store;

#[path = "timezones/timezone_service.rs"]
pub mod timezones;

#[path = "update_notes/mod.rs"]
pub mod update_notes;
