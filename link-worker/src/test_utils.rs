//! In-memory stand-ins for Telegram, the link store and the consumer seams.
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time;

use async_trait::async_trait;
use link_common::store::{Link, LinkRepository, StoreError, StoreResult};
use link_common::telegram::{Chat, IncomingMessage, MessagingClient, TelegramError, Update, User};
use tokio_util::sync::CancellationToken;

use crate::error::{FetchError, ProcessError};
use crate::events::{Event, EventKind, Fetcher, Processor};

/// A message update from `username` (or an anonymous user with id `9000 + chat_id`).
pub fn message_update(id: i64, chat_id: i64, username: Option<&str>, text: &str) -> Update {
    Update {
        id,
        message: Some(IncomingMessage {
            chat: Chat { id: chat_id },
            from: Some(User {
                id: 9000 + chat_id,
                username: username.map(str::to_owned),
            }),
            text: Some(text.to_owned()),
        }),
    }
}

type SendFailure = Box<dyn Fn() -> TelegramError + Send + Sync>;

#[derive(Default)]
pub struct FakeMessagingClient {
    updates: Mutex<VecDeque<Result<Vec<Update>, TelegramError>>>,
    requested_offsets: Mutex<Vec<(i64, usize)>>,
    sent: Mutex<Vec<(i64, String)>>,
    send_failure: Mutex<Option<SendFailure>>,
    send_delay: Mutex<Option<time::Duration>>,
}

impl FakeMessagingClient {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_updates(&self, updates: Vec<Update>) {
        self.updates.lock().unwrap().push_back(Ok(updates));
    }

    pub fn push_updates_error(&self, error: TelegramError) {
        self.updates.lock().unwrap().push_back(Err(error));
    }

    pub fn fail_sends_with(&self, failure: impl Fn() -> TelegramError + Send + Sync + 'static) {
        *self.send_failure.lock().unwrap() = Some(Box::new(failure));
    }

    pub fn delay_sends_by(&self, delay: time::Duration) {
        *self.send_delay.lock().unwrap() = Some(delay);
    }

    pub fn requested_offsets(&self) -> Vec<(i64, usize)> {
        self.requested_offsets.lock().unwrap().clone()
    }

    pub fn sent(&self) -> Vec<(i64, String)> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_texts(&self, chat_id: i64) -> Vec<String> {
        self.sent()
            .into_iter()
            .filter(|(id, _)| *id == chat_id)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl MessagingClient for FakeMessagingClient {
    async fn updates(&self, offset: i64, limit: usize) -> Result<Vec<Update>, TelegramError> {
        self.requested_offsets.lock().unwrap().push((offset, limit));
        self.updates
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(Vec::new()))
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        let delay = *self.send_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(failure) = self.send_failure.lock().unwrap().as_ref() {
            return Err(failure());
        }
        self.sent.lock().unwrap().push((chat_id, text.to_owned()));
        Ok(())
    }
}

#[derive(Default)]
pub struct FakeLinkStore {
    links: Mutex<Vec<Link>>,
    next_id: Mutex<i64>,
    fail: Mutex<bool>,
    delay: Mutex<Option<time::Duration>>,
}

impl FakeLinkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn links(&self) -> Vec<Link> {
        self.links.lock().unwrap().clone()
    }

    /// Every operation fails as if the database had gone away.
    pub fn fail_with_query_errors(&self) {
        *self.fail.lock().unwrap() = true;
    }

    pub fn delay_by(&self, delay: time::Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    async fn before_query(&self, command: &str) -> StoreResult<()> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if *self.fail.lock().unwrap() {
            return Err(StoreError::QueryError {
                command: command.to_owned(),
                error: sqlx::Error::PoolTimedOut,
            });
        }
        Ok(())
    }
}

#[async_trait]
impl LinkRepository for FakeLinkStore {
    async fn save_link(&self, url: &str, username: &str) -> StoreResult<i64> {
        self.before_query("INSERT").await?;

        let mut links = self.links.lock().unwrap();
        if links.iter().any(|link| link.url == url) {
            return Err(StoreError::AlreadyExists);
        }

        let mut next_id = self.next_id.lock().unwrap();
        *next_id += 1;
        links.push(Link {
            id: *next_id,
            url: url.to_owned(),
            username: username.to_owned(),
        });
        Ok(*next_id)
    }

    async fn random_link(&self, username: &str) -> StoreResult<Link> {
        self.before_query("DELETE").await?;

        let mut links = self.links.lock().unwrap();
        let position = links
            .iter()
            .position(|link| link.username == username)
            .ok_or(StoreError::EmptyTable)?;
        Ok(links.remove(position))
    }

    async fn exists(&self, url: &str) -> StoreResult<i64> {
        self.before_query("SELECT").await?;

        self.links
            .lock()
            .unwrap()
            .iter()
            .find(|link| link.url == url)
            .map(|link| link.id)
            .ok_or(StoreError::NotFound)
    }
}

/// Shared record of when a `FakeFetcher` was called.
#[derive(Clone, Default)]
pub struct FetchLog(Arc<Mutex<Vec<tokio::time::Instant>>>);

impl FetchLog {
    pub fn fetched_at(&self) -> Vec<tokio::time::Instant> {
        self.0.lock().unwrap().clone()
    }
}

/// Plays back a script of fetch results. Once the script runs out it requests shutdown
/// and keeps returning empty batches.
pub struct FakeFetcher {
    script: Mutex<VecDeque<Result<Vec<Event>, FetchError>>>,
    shutdown: Option<CancellationToken>,
    log: FetchLog,
}

impl FakeFetcher {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self {
            script: Default::default(),
            shutdown: Some(shutdown),
            log: Default::default(),
        }
    }

    /// Never requests shutdown, always returns empty batches.
    pub fn endless() -> Self {
        Self {
            script: Default::default(),
            shutdown: None,
            log: Default::default(),
        }
    }

    pub fn then_events(self, events: Vec<Event>) -> Self {
        self.script.lock().unwrap().push_back(Ok(events));
        self
    }

    pub fn then_error(self, error: FetchError) -> Self {
        self.script.lock().unwrap().push_back(Err(error));
        self
    }

    pub fn log(&self) -> FetchLog {
        self.log.clone()
    }
}

#[async_trait]
impl Fetcher for FakeFetcher {
    async fn fetch(&mut self, _limit: usize) -> Result<Vec<Event>, FetchError> {
        self.log.0.lock().unwrap().push(tokio::time::Instant::now());

        let next = self.script.lock().unwrap().pop_front();
        match next {
            Some(result) => result,
            None => {
                if let Some(shutdown) = &self.shutdown {
                    shutdown.cancel();
                }
                Ok(Vec::new())
            }
        }
    }
}

/// Records every event it is given, fails on unknown events and on configured texts.
#[derive(Clone, Default)]
pub struct FakeProcessor {
    seen: Arc<Mutex<Vec<String>>>,
    failing_texts: Arc<Vec<String>>,
    /// Requests shutdown while handling the event with this text.
    cancel_on: Option<(String, CancellationToken)>,
}

impl FakeProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing_on(self, text: &str) -> Self {
        let mut failing_texts = (*self.failing_texts).clone();
        failing_texts.push(text.to_owned());
        Self {
            failing_texts: Arc::new(failing_texts),
            ..self
        }
    }

    pub fn cancelling_on(self, text: &str, shutdown: CancellationToken) -> Self {
        Self {
            cancel_on: Some((text.to_owned(), shutdown)),
            ..self
        }
    }

    pub fn seen_texts(&self) -> Vec<String> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl Processor for FakeProcessor {
    async fn process(&self, event: Event) -> Result<(), ProcessError> {
        if let Some((text, shutdown)) = &self.cancel_on {
            if *text == event.text {
                shutdown.cancel();
                tokio::time::sleep(time::Duration::from_millis(50)).await;
            }
        }

        self.seen.lock().unwrap().push(event.text.clone());

        if event.kind == EventKind::Unknown {
            return Err(ProcessError::UnknownEventType);
        }
        if self.failing_texts.contains(&event.text) {
            return Err(ProcessError::StoreError(StoreError::QueryError {
                command: "INSERT".to_owned(),
                error: sqlx::Error::PoolTimedOut,
            }));
        }
        Ok(())
    }
}
