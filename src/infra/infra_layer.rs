// The infra module contains implementations of core traits.
// Each feature implementation goes in its own submodule.

#[path = "guild_store/mod.rs"]
pub mod guild_store;

#[path = "accounts/mod.rs"]
pub mod accounts;

#[path = "audit/mod.rs"]
pub mod audit;

#[path = "feeds/mod.rs"]
pub mod feeds;

#[path = "gw2/mod.rs"]
pub mod gw2;
