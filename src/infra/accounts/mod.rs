pub mod sqlite_api_key_store;

pub use sqlite_api_key_store::SqliteApiKeyStore;
