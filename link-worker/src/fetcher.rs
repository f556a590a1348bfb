use std::sync::Arc;

use async_trait::async_trait;
use link_common::telegram::{MessagingClient, Update};
use tracing::debug;

use crate::error::FetchError;
use crate::events::{Event, Fetcher};

/// Polls Telegram for updates, remembering the offset of the next unseen one.
/// The offset lives as long as the fetcher: a restart picks up whatever Telegram still holds.
pub struct TelegramFetcher<C> {
    client: Arc<C>,
    offset: i64,
}

impl<C: MessagingClient> TelegramFetcher<C> {
    pub fn new(client: Arc<C>) -> Self {
        Self { client, offset: 0 }
    }

    /// The id of the next update we will ask for.
    pub fn offset(&self) -> i64 {
        self.offset
    }
}

#[async_trait]
impl<C: MessagingClient> Fetcher for TelegramFetcher<C> {
    async fn fetch(&mut self, limit: usize) -> Result<Vec<Event>, FetchError> {
        let updates = self.client.updates(self.offset, limit).await?;

        if let Some(last) = updates.last() {
            self.offset = last.id + 1;
            debug!(offset = self.offset, count = updates.len(), "fetched updates");
        }

        Ok(updates.into_iter().map(event).collect())
    }
}

fn event(update: Update) -> Event {
    match update.message {
        Some(message) => {
            // Not every Telegram user has a username, and channel posts have no sender.
            let username = match message.from {
                Some(user) => user.username.unwrap_or_else(|| user.id.to_string()),
                None => message.chat.id.to_string(),
            };

            Event::message(
                message.text.as_deref().unwrap_or_default(),
                message.chat.id,
                &username,
            )
        }
        None => Event::unknown(),
    }
}
