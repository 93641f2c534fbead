use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// A group-chat record as delivered by the group-chat subscription.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupChatMembership {
    pub id: String,
    /// Only set for chats with more than two members
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub members: Vec<String>,
}

impl GroupChatMembership {
    pub fn has_member(&self, user_id: &str) -> bool {
        self.members.iter().any(|m| m == user_id)
    }

    pub fn kind(&self) -> ChatKind {
        if self.members.len() == 2 {
            ChatKind::Direct
        } else {
            ChatKind::Group
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChatKind {
    Direct, // Exactly two members
    Group,
}

/// Most recent message of a chat
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LastMessage {
    pub sender_id: String,
    pub content: String,
    pub timestamp: u64,
}

/// One entry of the conversation list shown on the main page.
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSummary {
    pub id: String,
    pub kind: ChatKind,
    pub display_name: String,
    pub last_sender_id: Option<String>,
    /// Only set for group chats
    pub last_sender_name: Option<String>,
    pub content: String,
    pub timestamp: Option<u64>,
}

/// A user record as returned by the user search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub picture: String,
}

impl UserRecord {
    pub fn full_name(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }
}

/// The current user's pending and established relations, keyed by user id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RelationshipSets {
    #[serde(default)]
    pub sent_requests: HashSet<String>,
    #[serde(default)]
    pub received_requests: HashSet<String>,
    #[serde(default)]
    pub friends: HashSet<String>,
}

impl RelationshipSets {
    /// Classify `user_id` relative to `self_id`.
    ///
    /// Precedence is fixed: self, then an outgoing request, then an incoming
    /// request, then an existing friendship.
    pub fn classify(&self, self_id: &str, user_id: &str) -> RelationshipState {
        if user_id == self_id {
            RelationshipState::SelfUser
        } else if self.sent_requests.contains(user_id) {
            RelationshipState::Cancel
        } else if self.received_requests.contains(user_id) {
            RelationshipState::Accept
        } else if self.friends.contains(user_id) {
            RelationshipState::Friend
        } else {
            RelationshipState::Add
        }
    }
}

/// Full user info, including the relationship sets of that user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserInfo {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub picture: String,
    #[serde(flatten)]
    pub relations: RelationshipSets,
}

impl UserInfo {
    pub fn full_name(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }
}

/// Which action the search dialog offers for a user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RelationshipState {
    SelfUser, // The searching user
    Add,      // No relation yet
    Cancel,   // We already sent a request
    Accept,   // They sent us a request
    Friend,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UserSearchResult {
    pub user_id: String,
    pub first_name: String,
    pub last_name: String,
    pub picture: String,
    pub relationship: RelationshipState,
    pub is_self: bool,
}

impl UserSearchResult {
    pub fn classify(user: UserRecord, self_id: &str, relations: &RelationshipSets) -> Self {
        let relationship = relations.classify(self_id, &user.id);
        UserSearchResult {
            is_self: relationship == RelationshipState::SelfUser,
            relationship,
            user_id: user.id,
            first_name: user.first_name,
            last_name: user.last_name,
            picture: user.picture,
        }
    }

    pub fn full_name(&self) -> String {
        full_name(&self.first_name, &self.last_name)
    }
}

/// The conversation currently opened in the chat form
#[derive(Debug, Clone, PartialEq)]
pub struct ChatSelection {
    pub chat_id: String,
    pub name: String,
    pub picture: String,
}

pub fn full_name(first_name: &str, last_name: &str) -> String {
    format!("{} {}", first_name, last_name)
}

/// Id of the direct chat between two users: both ids in lexicographic order, joined by `-`.
pub fn direct_chat_id(a: &str, b: &str) -> String {
    if a < b {
        format!("{}-{}", a, b)
    } else {
        format!("{}-{}", b, a)
    }
}
