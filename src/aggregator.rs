// Group chat summary aggregation
// Turns the raw group-chat records of a subscription event into the
// conversation list of the main page. Each chat needs two dependent remote
// lookups; the list is published once, after every chat has a terminal slot.

use futures::stream::FuturesUnordered;
use futures_util::StreamExt;
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

use crate::api::{ChatApi, GroupChatSnapshot};
use crate::error::{ClientError, Result};
use crate::models::{ChatKind, ChatSummary, GroupChatMembership};

const UNTITLED_GROUP: &str = "Untitled group";

/// Bounds for a single chat's lookup chain
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LookupPolicy {
    pub lookup_timeout: Duration,
    pub max_attempts: u32,
    pub retry_backoff: Duration,
}

impl Default for LookupPolicy {
    fn default() -> Self {
        LookupPolicy {
            lookup_timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

impl LookupPolicy {
    /// Delay after the given failed attempt
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.retry_backoff.saturating_mul(attempt)
    }
}

/// Terminal outcome for one chat
#[derive(Debug, Clone, PartialEq)]
pub enum SummarySlot {
    Ready(ChatSummary),
    Failed { chat_id: String, reason: String },
}

impl SummarySlot {
    pub fn chat_id(&self) -> &str {
        match self {
            SummarySlot::Ready(summary) => &summary.id,
            SummarySlot::Failed { chat_id, .. } => chat_id,
        }
    }

    pub fn summary(&self) -> Option<&ChatSummary> {
        match self {
            SummarySlot::Ready(summary) => Some(summary),
            SummarySlot::Failed { .. } => None,
        }
    }
}

/// What the conversation list renders
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryView {
    pub loading: bool,
    pub slots: Vec<SummarySlot>,
    /// Number of publishes so far
    pub revision: u64,
    /// Set when the group chat subscription itself could not be established
    pub error: Option<String>,
}

impl Default for SummaryView {
    fn default() -> Self {
        SummaryView {
            loading: true,
            slots: Vec::new(),
            revision: 0,
            error: None,
        }
    }
}

pub struct GroupChatSummaryAggregator {
    api: Arc<dyn ChatApi>,
    current_user_id: String,
    policy: LookupPolicy,
    view_tx: watch::Sender<SummaryView>,
}

impl GroupChatSummaryAggregator {
    pub fn new(
        api: Arc<dyn ChatApi>,
        current_user_id: &str,
        policy: LookupPolicy,
    ) -> (Self, watch::Receiver<SummaryView>) {
        let (view_tx, view_rx) = watch::channel(SummaryView::default());
        (
            Self {
                api,
                current_user_id: current_user_id.to_string(),
                policy,
                view_tx,
            },
            view_rx,
        )
    }

    pub fn view(&self) -> watch::Receiver<SummaryView> {
        self.view_tx.subscribe()
    }

    /// Subscribe to group chat changes and aggregate the current snapshot.
    ///
    /// Snapshots arriving while a run is in flight are coalesced: the run still
    /// publishes, then one more run starts on the newest snapshot. Returns once
    /// the feed closes.
    pub async fn run(self) -> Result<()> {
        let mut feed = match self.api.subscribe_group_chats(&self.current_user_id).await {
            Ok(feed) => feed,
            Err(e) => {
                error!("Could not watch group chats for {}: {}", self.current_user_id, e);
                self.view_tx.send_modify(|view| {
                    view.slots.clear();
                    view.loading = false;
                    view.error = Some(e.to_string());
                    view.revision += 1;
                });
                return Err(e);
            }
        };
        info!("Watching group chats for {}", self.current_user_id);

        let mut snapshot = feed.borrow_and_update().clone();
        loop {
            self.aggregate(snapshot).await;
            // Only the newest value is kept, so updates sent during the run collapse into one
            if feed.changed().await.is_err() {
                break;
            }
            snapshot = feed.borrow_and_update().clone();
            debug!("Group chat snapshot changed for {}", self.current_user_id);
        }

        info!("Group chat feed closed for {}", self.current_user_id);
        Ok(())
    }

    /// Aggregate one snapshot and publish the result exactly once.
    pub async fn aggregate(&self, snapshot: GroupChatSnapshot) -> Vec<SummarySlot> {
        let belong: Vec<GroupChatMembership> = snapshot
            .map(|chats| {
                chats
                    .into_values()
                    .filter(|chat| chat.has_member(&self.current_user_id))
                    .collect()
            })
            .unwrap_or_default();

        if belong.is_empty() {
            info!("{} belongs to no group chats", self.current_user_id);
            self.publish(Vec::new());
            return Vec::new();
        }

        let total = belong.len();
        debug!("Aggregating {} group chats for {}", total, self.current_user_id);

        let mut in_flight: FuturesUnordered<_> = belong
            .into_iter()
            .map(|chat| self.summarize_with_retry(chat))
            .collect();

        // Completion order, not subscription order
        let mut slots = Vec::with_capacity(total);
        while let Some(slot) = in_flight.next().await {
            debug!("Chat {} settled ({}/{})", slot.chat_id(), slots.len() + 1, total);
            slots.push(slot);
        }

        let failed = slots.iter().filter(|s| s.summary().is_none()).count();
        if failed > 0 {
            warn!("{} of {} chat summaries could not be loaded", failed, total);
        }

        self.publish(slots.clone());
        slots
    }

    fn publish(&self, slots: Vec<SummarySlot>) {
        self.view_tx.send_modify(|view| {
            view.slots = slots;
            view.loading = false;
            view.error = None;
            view.revision += 1;
        });
    }

    async fn summarize_with_retry(&self, chat: GroupChatMembership) -> SummarySlot {
        let mut last_error = String::new();

        for attempt in 1..=self.policy.max_attempts {
            match tokio::time::timeout(self.policy.lookup_timeout, self.summarize(&chat)).await {
                Ok(Ok(summary)) => return SummarySlot::Ready(summary),
                Ok(Err(e)) => {
                    warn!("Lookup for chat {} failed (attempt {}): {}", chat.id, attempt, e);
                    last_error = e.to_string();
                }
                Err(_) => {
                    let e = ClientError::Timeout {
                        call: "chat summary",
                        after: self.policy.lookup_timeout,
                    };
                    warn!("Lookup for chat {} failed (attempt {}): {}", chat.id, attempt, e);
                    last_error = e.to_string();
                }
            }

            if attempt < self.policy.max_attempts {
                tokio::time::sleep(self.policy.backoff(attempt)).await;
            }
        }

        let reason = ClientError::IncompleteAggregation {
            chat_id: chat.id.clone(),
            attempts: self.policy.max_attempts,
            reason: last_error,
        }
        .to_string();
        SummarySlot::Failed {
            chat_id: chat.id,
            reason,
        }
    }

    // Last message first, then the user whose name labels the entry
    async fn summarize(&self, chat: &GroupChatMembership) -> Result<ChatSummary> {
        let last = self.api.get_last_message(&chat.id).await?;
        let kind = chat.kind();

        let (display_name, last_sender_name) = match kind {
            ChatKind::Direct => {
                let other = chat
                    .members
                    .iter()
                    .find(|m| **m != self.current_user_id)
                    .unwrap_or(&self.current_user_id);
                let info = self.api.get_user_info(other).await?;
                (info.full_name(), None)
            }
            ChatKind::Group => {
                let sender_name = match &last {
                    Some(message) => Some(self.api.get_user_info(&message.sender_id).await?.full_name()),
                    None => None,
                };
                let name = chat.name.clone().unwrap_or_else(|| UNTITLED_GROUP.to_string());
                (name, sender_name)
            }
        };

        Ok(match last {
            Some(message) => ChatSummary {
                id: chat.id.clone(),
                kind,
                display_name,
                last_sender_id: Some(message.sender_id),
                last_sender_name,
                content: message.content,
                timestamp: Some(message.timestamp),
            },
            None => ChatSummary {
                id: chat.id.clone(),
                kind,
                display_name,
                last_sender_id: None,
                last_sender_name: None,
                content: String::new(),
                timestamp: None,
            },
        })
    }
}
