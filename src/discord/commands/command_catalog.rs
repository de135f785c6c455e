// Discord commands module.
// Each feature gets its own command file.

pub mod apikey;
pub mod audit;
pub mod builds;
pub mod comp;
pub mod config;
pub mod guard;
pub mod help;
pub mod presence;
pub mod rss;
pub mod update_notes;

use crate::discord::{Data, Error};

/// Every slash command the bot registers.
pub fn all() -> Vec<poise::Command<Data, Error>> {
    vec![
        config::config(),
        comp::comp(),
        builds::builds(),
        rss::rss(),
        audit::audit(),
        apikey::apikey(),
        update_notes::update_notes(),
        help::help(),
    ]
}
