// Common test utilities for integration tests
// A scripted ChatApi whose latency and failures are set per test

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, Once};
use std::time::Duration;

use async_trait::async_trait;
use log::LevelFilter;
use tokio::sync::watch;

use chatdeck::{
    ChatApi, ClientError, GroupChatFeed, GroupChatMembership, GroupChatSnapshot, LastMessage,
    RelationshipSets, Result, UserInfo, UserRecord,
};

static INIT_LOGGER: Once = Once::new();

/// Set up the logger for the tests
pub fn setup_logging() {
    INIT_LOGGER.call_once(|| {
        let _ = env_logger::Builder::new()
            .filter_level(LevelFilter::Debug)
            .is_test(true)
            .try_init();
    });
}

pub fn user(first_name: &str, last_name: &str) -> UserInfo {
    UserInfo {
        first_name: first_name.to_string(),
        last_name: last_name.to_string(),
        picture: format!("{}.png", first_name.to_lowercase()),
        relations: RelationshipSets::default(),
    }
}

pub fn chat(id: &str, name: Option<&str>, members: &[&str]) -> GroupChatMembership {
    GroupChatMembership {
        id: id.to_string(),
        name: name.map(|n| n.to_string()),
        members: members.iter().map(|m| m.to_string()).collect(),
    }
}

pub fn snapshot(chats: Vec<GroupChatMembership>) -> GroupChatSnapshot {
    Some(chats.into_iter().map(|c| (c.id.clone(), c)).collect())
}

pub fn message(sender_id: &str, content: &str, timestamp: u64) -> LastMessage {
    LastMessage {
        sender_id: sender_id.to_string(),
        content: content.to_string(),
        timestamp,
    }
}

#[derive(Default)]
pub struct ScriptedApi {
    pub users: BTreeMap<String, UserInfo>,
    pub last_messages: HashMap<String, LastMessage>,
    /// Latency of get_last_message per chat
    pub message_delays: HashMap<String, Duration>,
    /// Remaining get_last_message failures per chat
    pub message_failures: Mutex<HashMap<String, u32>>,
    /// Chats whose get_last_message never resolves
    pub hanging_chats: HashSet<String>,
    pub search_delay: Duration,
    pub fail_search: bool,
    pub fail_relations: bool,
    pub feed: Mutex<Option<GroupChatFeed>>,

    pub search_calls: Mutex<Vec<String>>,
    pub message_calls: AtomicUsize,
    pub user_info_calls: AtomicUsize,
    pub relation_calls: Mutex<Vec<(String, String, String)>>,
}

impl ScriptedApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_user(mut self, id: &str, info: UserInfo) -> Self {
        self.users.insert(id.to_string(), info);
        self
    }

    pub fn with_last_message(mut self, chat_id: &str, message: LastMessage) -> Self {
        self.last_messages.insert(chat_id.to_string(), message);
        self
    }

    pub fn with_message_delay(mut self, chat_id: &str, delay: Duration) -> Self {
        self.message_delays.insert(chat_id.to_string(), delay);
        self
    }

    pub fn with_message_failures(self, chat_id: &str, count: u32) -> Self {
        self.message_failures
            .lock()
            .unwrap()
            .insert(chat_id.to_string(), count);
        self
    }

    pub fn with_hanging_chat(mut self, chat_id: &str) -> Self {
        self.hanging_chats.insert(chat_id.to_string());
        self
    }

    /// Script a group chat feed whose current value is `initial`
    pub fn with_feed(self, initial: GroupChatSnapshot) -> (Self, watch::Sender<GroupChatSnapshot>) {
        let (tx, rx) = watch::channel(initial);
        *self.feed.lock().unwrap() = Some(rx);
        (self, tx)
    }

    pub fn searches(&self) -> Vec<String> {
        self.search_calls.lock().unwrap().clone()
    }

    pub fn relations(&self) -> Vec<(String, String, String)> {
        self.relation_calls.lock().unwrap().clone()
    }

    pub fn message_calls(&self) -> usize {
        self.message_calls.load(Ordering::SeqCst)
    }

    pub fn user_info_calls(&self) -> usize {
        self.user_info_calls.load(Ordering::SeqCst)
    }

    fn relation(&self, call: &str, self_id: &str, other_id: &str) -> Result<()> {
        self.relation_calls.lock().unwrap().push((
            call.to_string(),
            self_id.to_string(),
            other_id.to_string(),
        ));
        if self.fail_relations {
            return Err(ClientError::remote("relation", "server unavailable"));
        }
        Ok(())
    }
}

#[async_trait]
impl ChatApi for ScriptedApi {
    async fn get_user_info(&self, user_id: &str) -> Result<UserInfo> {
        self.user_info_calls.fetch_add(1, Ordering::SeqCst);
        self.users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("user {}", user_id)))
    }

    async fn search_users(&self, term: &str) -> Result<Vec<UserRecord>> {
        self.search_calls.lock().unwrap().push(term.to_string());
        if !self.search_delay.is_zero() {
            tokio::time::sleep(self.search_delay).await;
        }
        if self.fail_search {
            return Err(ClientError::remote("search_users", "server unavailable"));
        }
        let needle = term.to_lowercase();
        Ok(self
            .users
            .iter()
            .filter(|(_, info)| info.full_name().to_lowercase().contains(&needle))
            .map(|(id, info)| UserRecord {
                id: id.clone(),
                first_name: info.first_name.clone(),
                last_name: info.last_name.clone(),
                picture: info.picture.clone(),
            })
            .collect())
    }

    async fn send_friend_request(&self, self_id: &str, other_id: &str) -> Result<()> {
        self.relation("send", self_id, other_id)
    }

    async fn cancel_friend_request(&self, self_id: &str, other_id: &str) -> Result<()> {
        self.relation("cancel", self_id, other_id)
    }

    async fn accept_friend_request(&self, self_id: &str, sender_id: &str) -> Result<()> {
        self.relation("accept", self_id, sender_id)
    }

    async fn remove_friend(&self, self_id: &str, other_id: &str) -> Result<()> {
        self.relation("unfriend", self_id, other_id)
    }

    async fn get_last_message(&self, chat_id: &str) -> Result<Option<LastMessage>> {
        self.message_calls.fetch_add(1, Ordering::SeqCst);
        if self.hanging_chats.contains(chat_id) {
            return std::future::pending().await;
        }
        if let Some(delay) = self.message_delays.get(chat_id) {
            tokio::time::sleep(*delay).await;
        }
        {
            let mut failures = self.message_failures.lock().unwrap();
            if let Some(remaining) = failures.get_mut(chat_id) {
                if *remaining > 0 {
                    *remaining -= 1;
                    return Err(ClientError::remote("get_last_message", "connection reset"));
                }
            }
        }
        Ok(self.last_messages.get(chat_id).cloned())
    }

    async fn subscribe_group_chats(&self, _user_id: &str) -> Result<GroupChatFeed> {
        self.feed
            .lock()
            .unwrap()
            .take()
            .ok_or_else(|| ClientError::SubscriptionClosed("no feed scripted".to_string()))
    }
}
