use std::sync::Arc;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

use shared::domain::{ConversationKey, MessageId};
use shared::error::{ApiError, ApiException};
use shared::protocol::{Message, ReactionsPatch};

use crate::timeline::{MessageWindow, PAGE_SIZE};

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("no active conversation")]
    NoConversation,
    #[error("page fetch failed: {0}")]
    Fetch(#[from] anyhow::Error),
}

/// Backward-paged history source. One page per call, ascending by time,
/// at most `limit` messages; `before` is the cursor of the oldest message
/// already loaded.
#[async_trait]
pub trait HistoryClient: Send + Sync {
    async fn fetch_page(
        &self,
        conversation: &ConversationKey,
        limit: u32,
        before: Option<&MessageId>,
    ) -> Result<Vec<Message>>;
}

#[derive(Serialize)]
struct ReactionBody {
    emoji: String,
}

#[derive(Serialize)]
struct DirectMessagesQuery<'a> {
    #[serde(rename = "userId")]
    user_id: &'a str,
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    before: Option<&'a str>,
}

#[derive(Serialize)]
struct ChannelMessagesQuery<'a> {
    limit: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    before: Option<&'a str>,
}

/// Promotes a non-success response into an error, preserving the server's
/// structured error body when it sends one.
async fn check_status(response: reqwest::Response) -> Result<reqwest::Response> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status();
    match response.json::<ApiError>().await {
        Ok(body) => Err(ApiException::new(body.code, body.message).into()),
        Err(_) => Err(anyhow!("request failed with status {status}")),
    }
}

/// REST history client. Talks to the documented message endpoints with a
/// bearer token; errors surface as the caller's query-error state.
pub struct RestHistoryClient {
    http: reqwest::Client,
    base_url: String,
    auth_token: String,
}

impl RestHistoryClient {
    pub fn new(base_url: impl Into<String>, auth_token: impl Into<String>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            auth_token: auth_token.into(),
        }
    }

    fn messages_url(&self, conversation: &ConversationKey) -> String {
        match conversation {
            ConversationKey::Direct { .. } => format!("{}/messages", self.base_url),
            ConversationKey::Channel {
                server_id,
                channel_id,
            } => format!(
                "{}/servers/{}/channels/{}/messages",
                self.base_url, server_id, channel_id
            ),
        }
    }

    pub async fn add_reaction(
        &self,
        conversation: &ConversationKey,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<ReactionsPatch> {
        let response = self
            .http
            .post(format!(
                "{}/{}/reactions",
                self.messages_url(conversation),
                message_id
            ))
            .bearer_auth(&self.auth_token)
            .json(&ReactionBody {
                emoji: emoji.to_string(),
            })
            .send()
            .await?;
        let patch = check_status(response).await?.json().await?;
        Ok(patch)
    }

    pub async fn remove_reaction(
        &self,
        conversation: &ConversationKey,
        message_id: &MessageId,
        emoji: &str,
    ) -> Result<ReactionsPatch> {
        let response = self
            .http
            .delete(format!(
                "{}/{}/reactions",
                self.messages_url(conversation),
                message_id
            ))
            .bearer_auth(&self.auth_token)
            .query(&[("emoji", emoji)])
            .send()
            .await?;
        let patch = check_status(response).await?.json().await?;
        Ok(patch)
    }
}

#[async_trait]
impl HistoryClient for RestHistoryClient {
    async fn fetch_page(
        &self,
        conversation: &ConversationKey,
        limit: u32,
        before: Option<&MessageId>,
    ) -> Result<Vec<Message>> {
        let before = before.map(|id| id.as_str());
        let request = self
            .http
            .get(self.messages_url(conversation))
            .bearer_auth(&self.auth_token);
        let request = match conversation {
            ConversationKey::Direct { user_id } => request.query(&DirectMessagesQuery {
                user_id: user_id.as_str(),
                limit,
                before,
            }),
            ConversationKey::Channel { .. } => {
                request.query(&ChannelMessagesQuery { limit, before })
            }
        };
        let response = request.send().await?;
        let page = check_status(response).await?.json().await?;
        Ok(page)
    }
}

struct FeedState {
    conversation: Option<ConversationKey>,
    generation: u64,
    window: MessageWindow,
    loading_older: bool,
}

/// The message window of the active conversation, fed from both halves:
/// history pages fetched backward through a [`HistoryClient`] and live
/// messages appended by gateway events. Switching the conversation bumps a
/// generation counter; page results that come back for a stale generation
/// are discarded instead of being spliced into the new conversation.
pub struct ConversationFeed {
    client: Arc<dyn HistoryClient>,
    inner: Mutex<FeedState>,
}

impl ConversationFeed {
    pub fn new(client: Arc<dyn HistoryClient>) -> Self {
        Self {
            client,
            inner: Mutex::new(FeedState {
                conversation: None,
                generation: 0,
                window: MessageWindow::new(),
                loading_older: false,
            }),
        }
    }

    /// Makes `key` the active conversation, resetting the window. A no-op
    /// when `key` is already active.
    pub async fn set_conversation(&self, key: ConversationKey) {
        let mut state = self.inner.lock().await;
        if state.conversation.as_ref() == Some(&key) {
            return;
        }
        state.conversation = Some(key);
        state.generation += 1;
        state.window = MessageWindow::new();
        state.loading_older = false;
    }

    /// Fetches the newest window (no cursor).
    pub async fn load_newest(&self) -> Result<(), FeedError> {
        let (key, generation) = {
            let state = self.inner.lock().await;
            let key = state.conversation.clone().ok_or(FeedError::NoConversation)?;
            (key, state.generation)
        };
        let page = self.client.fetch_page(&key, PAGE_SIZE, None).await?;
        let mut state = self.inner.lock().await;
        if state.generation != generation {
            debug!("history: dropping stale page for a switched conversation");
            return Ok(());
        }
        state.window.push_page(page);
        Ok(())
    }

    /// Fetches the next older page behind the current cursor. Suppressed
    /// while a previous older-page fetch is outstanding, and once the
    /// backward walk is exhausted. A failed fetch leaves the loaded pages
    /// untouched.
    pub async fn load_older(&self) -> Result<(), FeedError> {
        let (key, generation, cursor) = {
            let mut state = self.inner.lock().await;
            let key = state.conversation.clone().ok_or(FeedError::NoConversation)?;
            if state.loading_older {
                debug!("history: older-page fetch already in flight");
                return Ok(());
            }
            if !state.window.has_more() {
                return Ok(());
            }
            let cursor = state.window.oldest_id().cloned();
            state.loading_older = true;
            (key, state.generation, cursor)
        };

        let fetched = self.client.fetch_page(&key, PAGE_SIZE, cursor.as_ref()).await;

        let mut state = self.inner.lock().await;
        if state.generation != generation {
            debug!("history: dropping stale page for a switched conversation");
            return Ok(());
        }
        state.loading_older = false;
        state.window.push_page(fetched?);
        Ok(())
    }

    /// Appends a message delivered by the gateway, if it belongs to the
    /// active conversation.
    pub async fn append_live(&self, conversation: &ConversationKey, message: Message) {
        let mut state = self.inner.lock().await;
        if state.conversation.as_ref() != Some(conversation) {
            return;
        }
        state.window.append_live(message);
    }

    pub async fn apply_reaction_patch(&self, message_id: &MessageId, patch: &ReactionsPatch) {
        let mut state = self.inner.lock().await;
        state.window.patch_reactions(message_id, &patch.reactions);
    }

    /// The flattened chronological view of the active conversation.
    pub async fn snapshot(&self) -> Vec<Message> {
        self.inner.lock().await.window.flattened()
    }

    pub async fn has_more(&self) -> bool {
        self.inner.lock().await.window.has_more()
    }

    pub async fn is_loading_older(&self) -> bool {
        self.inner.lock().await.loading_older
    }
}

#[cfg(test)]
#[path = "tests/history_tests.rs"]
mod tests;
