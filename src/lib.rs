// src/lib.rs
// Public library surface for integration tests (and potential reuse).

pub mod api;
pub mod config;
pub mod entry;
pub mod injector;
pub mod parser;
pub mod store;
pub mod telemetry;

// ---- Re-exports for stable public API ----
pub use crate::api::router;
pub use crate::config::NewsConfig;
pub use crate::entry::{Entry, RawEntry};
pub use crate::injector::NewsInjector;
pub use crate::parser::{FeedParser, NewsFeedParser};
pub use crate::store::{FeedStore, JsonFileStore, MemoryStore};
