// Client-side core of the chat application
pub mod models;
pub mod error;
pub mod api;  // Remote API consumed by the client
pub mod backend;  // In-memory implementation of the remote API
pub mod aggregator;
pub mod search;
pub mod config;

// Re-export main types for convenience
pub use models::*;
pub use error::{ClientError, Result};
pub use api::{ChatApi, GroupChatFeed, GroupChatSnapshot};
pub use aggregator::{GroupChatSummaryAggregator, LookupPolicy, SummarySlot, SummaryView};
pub use search::{IncrementalSearchController, Notice, RelationAction, SearchView};
pub use config::ClientConfig;
