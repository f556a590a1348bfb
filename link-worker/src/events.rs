use async_trait::async_trait;

use crate::error::{FetchError, ProcessError};

/// An inbound item from the messaging platform, stripped of platform details.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Event {
    pub text: String,
    pub kind: EventKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventKind {
    /// Anything we do not act on: edits, channel joins, callbacks...
    Unknown,
    Message(MessageMeta),
}

/// Where a message came from and who it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageMeta {
    pub chat_id: i64,
    pub username: String,
}

impl Event {
    pub fn unknown() -> Self {
        Self {
            text: String::new(),
            kind: EventKind::Unknown,
        }
    }

    pub fn message(text: &str, chat_id: i64, username: &str) -> Self {
        Self {
            text: text.to_owned(),
            kind: EventKind::Message(MessageMeta {
                chat_id,
                username: username.to_owned(),
            }),
        }
    }
}

/// Source of events. Implementations keep track of what was already handed out.
#[async_trait]
pub trait Fetcher: Send {
    async fn fetch(&mut self, limit: usize) -> Result<Vec<Event>, FetchError>;
}

#[async_trait]
pub trait Processor: Send + Sync {
    async fn process(&self, event: Event) -> Result<(), ProcessError>;
}
