// In-memory chat backend
// Holds users, relations, group chats and messages, and pushes group-chat
// changes to every subscriber. Used by the demo binary and by tests.

use anyhow::Context;
use async_trait::async_trait;
use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{watch, Mutex as TokioMutex};
use uuid::Uuid;

use crate::api::{ChatApi, GroupChatFeed, GroupChatSnapshot};
use crate::error::{ClientError, Result};
use crate::models::{direct_chat_id, GroupChatMembership, LastMessage, UserInfo, UserRecord};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: String,
    pub sender_id: String,
    pub content: String,
    pub timestamp: u64,
}

/// Everything the backend knows, in its fixture (JSON) shape.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Directory {
    #[serde(default)]
    pub users: BTreeMap<String, UserInfo>,
    #[serde(default)]
    pub group_chats: BTreeMap<String, GroupChatMembership>,
    #[serde(default)]
    pub messages: HashMap<String, Vec<StoredMessage>>,
}

impl Directory {
    fn snapshot(&self) -> GroupChatSnapshot {
        if self.group_chats.is_empty() {
            None
        } else {
            Some(self.group_chats.clone())
        }
    }

    fn user_mut(&mut self, user_id: &str) -> Result<&mut UserInfo> {
        self.users
            .get_mut(user_id)
            .ok_or_else(|| ClientError::NotFound(format!("user {}", user_id)))
    }

    fn require_users(&self, ids: &[&str]) -> Result<()> {
        for id in ids {
            if !self.users.contains_key(*id) {
                return Err(ClientError::NotFound(format!("user {}", id)));
            }
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct MemoryApi {
    directory: Arc<TokioMutex<Directory>>,
    /// Newest group chat snapshot; every subscriber holds a receiver
    updates: Arc<watch::Sender<GroupChatSnapshot>>,
}

impl MemoryApi {
    pub fn from_directory(directory: Directory) -> Self {
        let (updates, _) = watch::channel(directory.snapshot());
        Self {
            directory: Arc::new(TokioMutex::new(directory)),
            updates: Arc::new(updates),
        }
    }

    /// Load a JSON fixture shaped like [`Directory`]
    pub fn from_fixture(path: &Path) -> anyhow::Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read fixture {}", path.display()))?;
        let directory: Directory = serde_json::from_str(&contents)
            .with_context(|| format!("Invalid fixture {}", path.display()))?;
        info!(
            "Loaded fixture {} with {} users and {} group chats",
            path.display(),
            directory.users.len(),
            directory.group_chats.len()
        );
        Ok(Self::from_directory(directory))
    }

    pub async fn add_user(&self, user_id: &str, first_name: &str, last_name: &str, picture: &str) {
        let mut directory = self.directory.lock().await;
        directory.users.insert(
            user_id.to_string(),
            UserInfo {
                first_name: first_name.to_string(),
                last_name: last_name.to_string(),
                picture: picture.to_string(),
                relations: Default::default(),
            },
        );
    }

    pub async fn create_group_chat(&self, chat_id: &str, name: Option<&str>, members: &[&str]) -> Result<()> {
        {
            let mut directory = self.directory.lock().await;
            directory.require_users(members)?;
            directory.group_chats.insert(
                chat_id.to_string(),
                GroupChatMembership {
                    id: chat_id.to_string(),
                    name: name.map(|n| n.to_string()),
                    members: members.iter().map(|m| m.to_string()).collect(),
                },
            );
        }
        info!("Created group chat {} with {} members", chat_id, members.len());
        self.broadcast().await;
        Ok(())
    }

    /// Append a message to a chat the sender belongs to
    pub async fn send_message(&self, chat_id: &str, sender_id: &str, content: &str) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        {
            let mut directory = self.directory.lock().await;
            let chat = directory
                .group_chats
                .get(chat_id)
                .ok_or_else(|| ClientError::NotFound(format!("group chat {}", chat_id)))?;
            if !chat.has_member(sender_id) {
                return Err(ClientError::remote(
                    "send_message",
                    format!("{} is not a member of {}", sender_id, chat_id),
                ));
            }
            directory
                .messages
                .entry(chat_id.to_string())
                .or_default()
                .push(StoredMessage {
                    id: id.clone(),
                    sender_id: sender_id.to_string(),
                    content: content.to_string(),
                    timestamp: chrono::Utc::now().timestamp() as u64,
                });
        }
        debug!("Stored message {} in chat {}", id, chat_id);
        self.broadcast().await;
        Ok(id)
    }

    async fn broadcast(&self) {
        let directory = self.directory.lock().await;
        // Published under the directory lock so snapshots cannot go out of order
        self.updates.send_replace(directory.snapshot());
        debug!("Group chat update for {} subscribers", self.updates.receiver_count());
    }
}

#[async_trait]
impl ChatApi for MemoryApi {
    async fn get_user_info(&self, user_id: &str) -> Result<UserInfo> {
        let directory = self.directory.lock().await;
        directory
            .users
            .get(user_id)
            .cloned()
            .ok_or_else(|| ClientError::NotFound(format!("user {}", user_id)))
    }

    async fn search_users(&self, term: &str) -> Result<Vec<UserRecord>> {
        let needle = term.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let directory = self.directory.lock().await;
        let found: Vec<UserRecord> = directory
            .users
            .iter()
            .filter(|(id, info)| {
                id.to_lowercase().contains(&needle) || info.full_name().to_lowercase().contains(&needle)
            })
            .map(|(id, info)| UserRecord {
                id: id.clone(),
                first_name: info.first_name.clone(),
                last_name: info.last_name.clone(),
                picture: info.picture.clone(),
            })
            .collect();
        debug!("Search for '{}' matched {} users", term, found.len());
        Ok(found)
    }

    async fn send_friend_request(&self, self_id: &str, other_id: &str) -> Result<()> {
        let mut directory = self.directory.lock().await;
        directory.require_users(&[self_id, other_id])?;
        if self_id == other_id {
            return Err(ClientError::remote("send_friend_request", "cannot befriend yourself"));
        }
        directory.user_mut(self_id)?.relations.sent_requests.insert(other_id.to_string());
        directory.user_mut(other_id)?.relations.received_requests.insert(self_id.to_string());
        info!("Friend request {} -> {}", self_id, other_id);
        Ok(())
    }

    async fn cancel_friend_request(&self, self_id: &str, other_id: &str) -> Result<()> {
        let mut directory = self.directory.lock().await;
        directory.require_users(&[self_id, other_id])?;
        directory.user_mut(self_id)?.relations.sent_requests.remove(other_id);
        directory.user_mut(other_id)?.relations.received_requests.remove(self_id);
        info!("Friend request {} -> {} cancelled", self_id, other_id);
        Ok(())
    }

    async fn accept_friend_request(&self, self_id: &str, sender_id: &str) -> Result<()> {
        let chat_created = {
            let mut directory = self.directory.lock().await;
            directory.require_users(&[self_id, sender_id])?;
            if !directory.user_mut(self_id)?.relations.received_requests.remove(sender_id) {
                return Err(ClientError::remote(
                    "accept_friend_request",
                    format!("no pending request from {}", sender_id),
                ));
            }
            directory.user_mut(self_id)?.relations.friends.insert(sender_id.to_string());
            let sender = directory.user_mut(sender_id)?;
            sender.relations.sent_requests.remove(self_id);
            sender.relations.friends.insert(self_id.to_string());

            let chat_id = direct_chat_id(self_id, sender_id);
            if directory.group_chats.contains_key(&chat_id) {
                false
            } else {
                directory.group_chats.insert(
                    chat_id.clone(),
                    GroupChatMembership {
                        id: chat_id,
                        name: None,
                        members: vec![sender_id.to_string(), self_id.to_string()],
                    },
                );
                true
            }
        };
        info!("{} accepted friend request from {}", self_id, sender_id);
        if chat_created {
            self.broadcast().await;
        }
        Ok(())
    }

    async fn remove_friend(&self, self_id: &str, other_id: &str) -> Result<()> {
        let mut directory = self.directory.lock().await;
        directory.require_users(&[self_id, other_id])?;
        directory.user_mut(self_id)?.relations.friends.remove(other_id);
        directory.user_mut(other_id)?.relations.friends.remove(self_id);
        info!("{} removed friend {}", self_id, other_id);
        Ok(())
    }

    async fn get_last_message(&self, chat_id: &str) -> Result<Option<LastMessage>> {
        let directory = self.directory.lock().await;
        if !directory.group_chats.contains_key(chat_id) {
            return Err(ClientError::NotFound(format!("group chat {}", chat_id)));
        }
        Ok(directory
            .messages
            .get(chat_id)
            .and_then(|messages| messages.last())
            .map(|m| LastMessage {
                sender_id: m.sender_id.clone(),
                content: m.content.clone(),
                timestamp: m.timestamp,
            }))
    }

    async fn subscribe_group_chats(&self, user_id: &str) -> Result<GroupChatFeed> {
        let feed = self.updates.subscribe();
        info!("{} subscribed to group chat updates", user_id);
        Ok(feed)
    }
}
