// Friend search dialog controller
// Debounces query changes, runs at most one remote search per settled input
// and classifies each hit against the current user's relations.

use log::{debug, error, info, warn};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::api::ChatApi;
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::models::{direct_chat_id, ChatSelection, UserSearchResult};

const NOTICE_CAPACITY: usize = 32;

/// State rendered by the search dialog
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchView {
    pub open: bool,
    pub query: String,
    pub results: Vec<UserSearchResult>,
    pub not_found: bool,
    pub loading: bool,
    /// Set when the last search failed
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationAction {
    SendRequest,
    CancelRequest,
    AcceptRequest,
    Unfriend,
}

impl fmt::Display for RelationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RelationAction::SendRequest => "send friend request",
            RelationAction::CancelRequest => "cancel friend request",
            RelationAction::AcceptRequest => "accept friend request",
            RelationAction::Unfriend => "unfriend",
        };
        f.write_str(label)
    }
}

/// A failed relationship action, reported to the user without blocking anything
#[derive(Debug, Clone, PartialEq)]
pub struct Notice {
    pub action: RelationAction,
    pub user_id: String,
    pub reason: String,
}

struct Control {
    // Bumped on open, close and every query change
    generation: u64,
    pending: Option<JoinHandle<()>>,
}

struct Shared {
    api: Arc<dyn ChatApi>,
    current_user_id: String,
    debounce: Duration,
    lookup_timeout: Duration,
    view_tx: watch::Sender<SearchView>,
    control: Mutex<Control>,
    notice_tx: mpsc::Sender<Notice>,
}

#[derive(Clone)]
pub struct IncrementalSearchController {
    shared: Arc<Shared>,
}

impl IncrementalSearchController {
    pub fn new(
        api: Arc<dyn ChatApi>,
        current_user_id: &str,
        config: &ClientConfig,
    ) -> (Self, mpsc::Receiver<Notice>) {
        let (view_tx, _) = watch::channel(SearchView::default());
        let (notice_tx, notice_rx) = mpsc::channel(NOTICE_CAPACITY);

        let shared = Shared {
            api,
            current_user_id: current_user_id.to_string(),
            debounce: config.debounce(),
            lookup_timeout: config.lookup_timeout(),
            view_tx,
            control: Mutex::new(Control {
                generation: 0,
                pending: None,
            }),
            notice_tx,
        };
        (Self { shared: Arc::new(shared) }, notice_rx)
    }

    pub fn view(&self) -> watch::Receiver<SearchView> {
        self.shared.view_tx.subscribe()
    }

    pub fn on_open(&self) {
        let mut control = self.shared.control();
        control.generation += 1;
        self.shared.view_tx.send_modify(|view| view.open = true);
    }

    /// Reset the dialog. Anything still in flight is cancelled or discarded.
    pub fn on_close(&self) {
        let mut control = self.shared.control();
        control.generation += 1;
        if let Some(pending) = control.pending.take() {
            pending.abort();
        }
        self.shared.view_tx.send_replace(SearchView::default());
        debug!("Search dialog closed (generation {})", control.generation);
    }

    /// Record the new text right away and (re)schedule the lookup after the quiet interval.
    /// Must be called from within a tokio runtime.
    pub fn on_query_change(&self, text: &str) {
        let mut control = self.shared.control();
        control.generation += 1;
        if let Some(pending) = control.pending.take() {
            pending.abort();
        }
        let token = control.generation;

        self.shared.view_tx.send_modify(|view| {
            view.query = text.to_string();
            view.results.clear();
            view.not_found = false;
            view.loading = false;
            view.error = None;
        });

        let shared = Arc::clone(&self.shared);
        let text = text.to_string();
        control.pending = Some(tokio::spawn(async move {
            tokio::time::sleep(shared.debounce).await;
            shared.lookup(token, text).await;
        }));
    }

    pub fn add_friend(&self, user_id: &str) -> JoinHandle<()> {
        self.relation(RelationAction::SendRequest, user_id)
    }

    pub fn cancel_request(&self, user_id: &str) -> JoinHandle<()> {
        self.relation(RelationAction::CancelRequest, user_id)
    }

    pub fn accept_request(&self, sender_id: &str) -> JoinHandle<()> {
        self.relation(RelationAction::AcceptRequest, sender_id)
    }

    pub fn unfriend(&self, user_id: &str) -> JoinHandle<()> {
        self.relation(RelationAction::Unfriend, user_id)
    }

    /// Open the direct chat with a search hit and close the dialog
    pub fn select_user(&self, user: &UserSearchResult) -> ChatSelection {
        let selection = ChatSelection {
            chat_id: direct_chat_id(&self.shared.current_user_id, &user.user_id),
            name: user.full_name(),
            picture: user.picture.clone(),
        };
        info!("Opening chat {} with {}", selection.chat_id, user.user_id);
        self.on_close();
        selection
    }

    // Fire and forget: the rendered list is not touched, failures become notices
    fn relation(&self, action: RelationAction, user_id: &str) -> JoinHandle<()> {
        let shared = Arc::clone(&self.shared);
        let user_id = user_id.to_string();

        tokio::spawn(async move {
            let self_id = shared.current_user_id.as_str();
            let api = &shared.api;
            let call = async {
                match action {
                    RelationAction::SendRequest => api.send_friend_request(self_id, &user_id).await,
                    RelationAction::CancelRequest => api.cancel_friend_request(self_id, &user_id).await,
                    RelationAction::AcceptRequest => api.accept_friend_request(self_id, &user_id).await,
                    RelationAction::Unfriend => api.remove_friend(self_id, &user_id).await,
                }
            };

            let result = match tokio::time::timeout(shared.lookup_timeout, call).await {
                Ok(result) => result,
                Err(_) => Err(ClientError::Timeout {
                    call: "relationship action",
                    after: shared.lookup_timeout,
                }),
            };

            match result {
                Ok(()) => info!("{} for {} succeeded", action, user_id),
                Err(e) => {
                    error!("Failed to {} for {}: {}", action, user_id, e);
                    let notice = Notice {
                        action,
                        user_id: user_id.clone(),
                        reason: e.to_string(),
                    };
                    // Don't block on a full or dropped notice channel
                    if let Err(e) = shared.notice_tx.try_send(notice) {
                        warn!("Failed to deliver notice: {}", e);
                    }
                }
            }
        })
    }
}

impl Shared {
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Apply `update` only while `token` is still the current generation.
    fn publish(&self, token: u64, update: impl FnOnce(&mut SearchView)) -> Result<()> {
        let control = self.control();
        if control.generation != token {
            return Err(ClientError::StaleResult);
        }
        self.view_tx.send_modify(update);
        Ok(())
    }

    async fn lookup(&self, token: u64, text: String) {
        if text.is_empty() {
            let cleared = self.publish(token, |view| {
                view.results.clear();
                view.not_found = false;
                view.loading = false;
            });
            if cleared.is_err() {
                debug!("Discarding stale clear for empty query");
            }
            return;
        }

        if self.publish(token, |view| view.loading = true).is_err() {
            debug!("Search for '{}' superseded before it started", text);
            return;
        }

        let outcome = match tokio::time::timeout(self.lookup_timeout, self.search(&text)).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Timeout {
                call: "search",
                after: self.lookup_timeout,
            }),
        };

        let published = match outcome {
            Ok(results) => {
                info!("Search for '{}' returned {} users", text, results.len());
                self.publish(token, move |view| {
                    view.not_found = results.is_empty();
                    view.results = results;
                    view.loading = false;
                })
            }
            Err(e) => {
                error!("Search for '{}' failed: {}", text, e);
                let reason = e.to_string();
                self.publish(token, move |view| {
                    view.results.clear();
                    view.not_found = false;
                    view.loading = false;
                    view.error = Some(reason);
                })
            }
        };

        if let Err(e) = published {
            debug!("Discarding result for '{}': {}", text, e);
        }
    }

    async fn search(&self, term: &str) -> Result<Vec<UserSearchResult>> {
        let users = self.api.search_users(term).await?;
        let me = self.api.get_user_info(&self.current_user_id).await?;
        Ok(users
            .into_iter()
            .map(|user| UserSearchResult::classify(user, &self.current_user_id, &me.relations))
            .collect())
    }
}
