pub mod gw2_api_client;

pub use gw2_api_client::Gw2ApiClient;
