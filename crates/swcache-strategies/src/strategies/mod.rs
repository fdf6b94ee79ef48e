//! Built-in caching strategies

mod cache_first;
mod network_first;
mod stale_while_revalidate;

pub use cache_first::{CacheFirst, CacheOnly};
pub use network_first::{NetworkFirst, NetworkOnly};
pub use stale_while_revalidate::StaleWhileRevalidate;
