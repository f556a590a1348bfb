use std::time;

use link_common::{store::StoreError, telegram::TelegramError};
use thiserror::Error;

/// Errors pulling a batch of events from the messaging platform.
#[derive(Error, Debug)]
pub enum FetchError {
    #[error("failed to get updates: {0}")]
    UpdatesError(#[from] TelegramError),
}

impl FetchError {
    /// Fatal errors will not go away by retrying, like a rejected bot token.
    pub fn is_fatal(&self) -> bool {
        match self {
            FetchError::UpdatesError(error) => error.is_unauthorized(),
        }
    }
}

/// Errors handling a single event. None of these stop the consumer.
#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("event type is unknown")]
    UnknownEventType,
    #[error("store operation failed: {0}")]
    StoreError(#[from] StoreError),
    #[error("failed to send message: {0}")]
    SendError(#[from] TelegramError),
    #[error("timed out after {0:?} while processing event")]
    TimeoutError(time::Duration),
}

/// Enumeration of errors that stop the consumer.
#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error("fetching events failed and cannot be retried: {0}")]
    FatalFetchError(FetchError),
}
