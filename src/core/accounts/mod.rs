pub mod account_models;
pub mod account_service;
pub mod account_store;

pub use account_models::{ApiKeyRecord, KeySummary};
pub use account_service::{AccountError, AccountService};
pub use account_store::ApiKeyStore;
