pub mod http_feed_fetcher;

pub use http_feed_fetcher::HttpFeedFetcher;
