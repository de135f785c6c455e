pub mod rss_models;
pub mod rss_service;
pub mod rss_store;

pub use rss_models::{FeedPost, FeedSubscription};
pub use rss_service::{RssError, RssService};
pub use rss_store::RssStore;
