pub mod config_models;
pub mod config_service;
pub mod config_store;

pub use config_models::GuildConfig;
pub use config_service::{ConfigError, ConfigService};
pub use config_store::GuildConfigStore;
