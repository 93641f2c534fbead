// Error types for the chat client core

use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    /// Network or server error on a remote call
    #[error("Remote call {call} failed: {reason}")]
    Remote { call: &'static str, reason: String },

    #[error("Remote call {call} timed out after {after:?}")]
    Timeout { call: &'static str, after: Duration },

    #[error("Not found: {0}")]
    NotFound(String),

    /// A per-chat lookup that never produced a summary
    #[error("Lookup for chat {chat_id} gave up after {attempts} attempts: {reason}")]
    IncompleteAggregation {
        chat_id: String,
        attempts: u32,
        reason: String,
    },

    /// A result that belongs to a session that has since been reset
    #[error("Stale result discarded")]
    StaleResult,

    #[error("Subscription closed: {0}")]
    SubscriptionClosed(String),
}

impl ClientError {
    pub fn remote(call: &'static str, reason: impl ToString) -> Self {
        ClientError::Remote {
            call,
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
