use std::sync::Arc;
use std::time;

use async_trait::async_trait;
use link_common::store::{Link, LinkRepository, StoreError};
use link_common::telegram::MessagingClient;
use tracing::{error, info, warn, Instrument};

use crate::commands::{
    Command, MSG_HELLO, MSG_HELP, MSG_LINK_EXISTS, MSG_LINK_SAVED, MSG_NO_SAVED_LINKS,
    MSG_UNKNOWN_COMMAND,
};
use crate::error::ProcessError;
use crate::events::{Event, EventKind, MessageMeta, Processor};

/// Runs chat commands against the link store and answers in the chat they came from.
///
/// Expected outcomes, like a duplicate link or an empty list, are answered in the chat and
/// reported as success. Only failures of the store or of Telegram itself come back as errors.
pub struct TelegramProcessor<C, R> {
    client: Arc<C>,
    store: Arc<R>,
    /// Upper bound for the store side of handling one event. The reply is bounded by the
    /// client's own request timeout instead, so a link popped from the store is always sent.
    timeout: time::Duration,
}

/// What to answer once the store has been dealt with.
enum Reply {
    Text(String),
    /// A link that is already gone from the store.
    Popped(Link),
}

impl<C: MessagingClient, R: LinkRepository> TelegramProcessor<C, R> {
    pub fn new(client: Arc<C>, store: Arc<R>, timeout: time::Duration) -> Self {
        Self {
            client,
            store,
            timeout,
        }
    }

    async fn process_message(&self, text: &str, meta: &MessageMeta) -> Result<(), ProcessError> {
        let command = Command::parse(text);

        metrics::counter!("link_worker_commands_total", &[("command", command_label(&command))])
            .increment(1);

        let reply = tokio::time::timeout(self.timeout, self.reply(command, meta))
            .await
            .map_err(|_| ProcessError::TimeoutError(self.timeout))??;

        match reply {
            Reply::Text(text) => self.send(meta.chat_id, &text).await,
            Reply::Popped(link) => {
                if let Err(e) = self.send(meta.chat_id, &link.url).await {
                    error!(url = %link.url, id = link.id, "popped link could not be sent");
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    async fn reply(&self, command: Command, meta: &MessageMeta) -> Result<Reply, ProcessError> {
        let text = match command {
            Command::AddLink(url) => return self.save_link(&url, meta).await,
            Command::Random => return self.pop_random(meta).await,
            Command::Help => MSG_HELP.to_owned(),
            Command::Start => format!("{MSG_HELLO}{MSG_HELP}"),
            Command::Unknown => MSG_UNKNOWN_COMMAND.to_owned(),
        };

        Ok(Reply::Text(text))
    }

    async fn save_link(&self, url: &str, meta: &MessageMeta) -> Result<Reply, ProcessError> {
        match self.store.save_link(url, &meta.username).await {
            Ok(id) => {
                info!(url, id, "link saved");
                Ok(Reply::Text(format!("{MSG_LINK_SAVED}{id}")))
            }
            Err(StoreError::AlreadyExists) => {
                warn!(url, "link already exists");
                Ok(Reply::Text(MSG_LINK_EXISTS.to_owned()))
            }
            Err(e) => {
                error!("failed to save link: {}", e);
                Err(e.into())
            }
        }
    }

    async fn pop_random(&self, meta: &MessageMeta) -> Result<Reply, ProcessError> {
        match self.store.random_link(&meta.username).await {
            Ok(link) => Ok(Reply::Popped(link)),
            Err(StoreError::EmptyTable) => {
                warn!("no saved links");
                Ok(Reply::Text(MSG_NO_SAVED_LINKS.to_owned()))
            }
            Err(e) => {
                error!("failed to get random link: {}", e);
                Err(e.into())
            }
        }
    }

    async fn send(&self, chat_id: i64, text: &str) -> Result<(), ProcessError> {
        self.client.send_message(chat_id, text).await.map_err(|e| {
            error!("failed to send message: {}", e);
            ProcessError::from(e)
        })
    }
}

#[async_trait]
impl<C: MessagingClient, R: LinkRepository> Processor for TelegramProcessor<C, R> {
    async fn process(&self, event: Event) -> Result<(), ProcessError> {
        let meta = match event.kind {
            EventKind::Message(meta) => meta,
            EventKind::Unknown => return Err(ProcessError::UnknownEventType),
        };

        let span = tracing::info_span!("message", chat_id = meta.chat_id, username = %meta.username);

        self.process_message(&event.text, &meta)
            .instrument(span)
            .await
    }
}

fn command_label(command: &Command) -> &'static str {
    match command {
        Command::AddLink(_) => "add_link",
        Command::Random => "random",
        Command::Help => "help",
        Command::Start => "start",
        Command::Unknown => "unknown",
    }
}
