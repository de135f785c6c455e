pub mod guild_locks;
pub mod store_error;

pub use guild_locks::GuildLocks;
pub use store_error::StoreError;
