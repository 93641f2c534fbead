// Remote data API consumed by the chat client
//
// Everything the client knows about users, friend requests and group chats
// comes through this trait. Every method is a suspension point.

use async_trait::async_trait;
use std::collections::BTreeMap;
use tokio::sync::watch;

use crate::error::Result;
use crate::models::{GroupChatMembership, LastMessage, UserInfo, UserRecord};

/// Full mapping of group-chat records keyed by chat id.
/// `None` means the remote side has no group chats at all.
pub type GroupChatSnapshot = Option<BTreeMap<String, GroupChatMembership>>;

/// Receiving end of a group-chat subscription. Holds only the newest
/// snapshot; the feed is closed once the sending side is dropped.
pub type GroupChatFeed = watch::Receiver<GroupChatSnapshot>;

#[async_trait]
pub trait ChatApi: Send + Sync {
    async fn get_user_info(&self, user_id: &str) -> Result<UserInfo>;

    async fn search_users(&self, term: &str) -> Result<Vec<UserRecord>>;

    async fn send_friend_request(&self, self_id: &str, other_id: &str) -> Result<()>;

    async fn cancel_friend_request(&self, self_id: &str, other_id: &str) -> Result<()>;

    async fn accept_friend_request(&self, self_id: &str, sender_id: &str) -> Result<()>;

    async fn remove_friend(&self, self_id: &str, other_id: &str) -> Result<()>;

    /// `None` when the chat has no messages yet
    async fn get_last_message(&self, chat_id: &str) -> Result<Option<LastMessage>>;

    /// Deliver the current group-chat mapping now and again on every change.
    /// The feed's current value is the mapping at subscription time.
    async fn subscribe_group_chats(&self, user_id: &str) -> Result<GroupChatFeed>;
}
