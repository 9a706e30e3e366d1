mod fetcher;
mod mirror;
mod sanitizer;
mod wordpress;

pub use fetcher::{FetchError, HttpFetcher};
pub use mirror::{spawn_refresh_timer, NewsMirror};
