//! A thin client for the two Telegram Bot API methods the bot relies on.
use std::time;

use async_trait::async_trait;
use reqwest::Url;
use serde::{de::DeserializeOwned, de::IgnoredAny, Deserialize};
use thiserror::Error;

const GET_UPDATES_METHOD: &str = "getUpdates";
const SEND_MESSAGE_METHOD: &str = "sendMessage";

/// Enumeration of errors for calls to the Telegram Bot API.
/// Request URLs embed the bot token, so no variant ever carries one.
#[derive(Error, Debug)]
pub enum TelegramError {
    #[error("invalid telegram api url: {0}")]
    ParseUrlError(#[from] url::ParseError),
    #[error("failed to construct http client: {0}")]
    ClientBuildError(reqwest::Error),
    #[error("{method} request failed with: {error}")]
    NetworkError {
        method: &'static str,
        error: reqwest::Error,
    },
    #[error("failed to decode {method} response: {reason}")]
    DecodeError {
        method: &'static str,
        reason: String,
    },
    #[error("{method} was rejected with code {code}: {description}")]
    ApiError {
        method: &'static str,
        code: i64,
        description: String,
    },
}

impl TelegramError {
    /// Whether the API refused the bot credential. Telegram answers 401 for a revoked token
    /// and 404 for a token that never existed.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, TelegramError::ApiError { code: 401 | 404, .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Update {
    #[serde(rename = "update_id")]
    pub id: i64,
    pub message: Option<IncomingMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IncomingMessage {
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct User {
    pub id: i64,
    pub username: Option<String>,
}

/// Every Bot API response is wrapped in this envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    error_code: Option<i64>,
    description: Option<String>,
}

impl<T> ApiResponse<T> {
    fn into_result(self, method: &'static str) -> Result<T, TelegramError> {
        if !self.ok {
            return Err(TelegramError::ApiError {
                method,
                code: self.error_code.unwrap_or_default(),
                description: self.description.unwrap_or_default(),
            });
        }

        self.result.ok_or_else(|| TelegramError::DecodeError {
            method,
            reason: "response has no result".to_owned(),
        })
    }
}

#[async_trait]
pub trait MessagingClient: Send + Sync {
    /// Fetch updates with an id of at least `offset`, oldest first, no more than `limit` of them.
    async fn updates(&self, offset: i64, limit: usize) -> Result<Vec<Update>, TelegramError>;

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError>;
}

#[derive(Clone)]
pub struct TelegramClient {
    /// Base for every method call, ends in `/bot<token>/`.
    base_url: Url,
    client: reqwest::Client,
}

impl TelegramClient {
    pub fn new(
        api_url: &str,
        token: &str,
        request_timeout: time::Duration,
    ) -> Result<Self, TelegramError> {
        let base_url = Url::parse(&format!("{}/bot{}/", api_url.trim_end_matches('/'), token))?;

        let client = reqwest::Client::builder()
            .user_agent("link-worker")
            .timeout(request_timeout)
            .build()
            .map_err(|error| TelegramError::ClientBuildError(error.without_url()))?;

        Ok(Self { base_url, client })
    }

    async fn do_request<T: DeserializeOwned>(
        &self,
        method: &'static str,
        query: &[(&str, String)],
    ) -> Result<T, TelegramError> {
        let now = tokio::time::Instant::now();
        let result = self.call(method, query).await;

        let outcome = match &result {
            Ok(_) => "ok",
            Err(TelegramError::NetworkError { .. }) => "network_error",
            Err(TelegramError::DecodeError { .. }) => "decode_error",
            Err(TelegramError::ApiError { .. }) => "api_error",
            Err(_) => "client_error",
        };
        let labels = [("method", method), ("outcome", outcome)];
        metrics::counter!("telegram_requests_total", &labels).increment(1);
        metrics::histogram!("telegram_request_duration_seconds", &labels)
            .record(now.elapsed().as_secs_f64());

        result
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &'static str,
        query: &[(&str, String)],
    ) -> Result<T, TelegramError> {
        let url = self.base_url.join(method)?;

        let network_error = |error: reqwest::Error| TelegramError::NetworkError {
            method,
            error: error.without_url(),
        };

        let body = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(network_error)?
            .bytes()
            .await
            .map_err(network_error)?;

        let response: ApiResponse<T> =
            serde_json::from_slice(&body).map_err(|error| TelegramError::DecodeError {
                method,
                reason: error.to_string(),
            })?;

        response.into_result(method)
    }
}

#[async_trait]
impl MessagingClient for TelegramClient {
    async fn updates(&self, offset: i64, limit: usize) -> Result<Vec<Update>, TelegramError> {
        self.do_request(
            GET_UPDATES_METHOD,
            &[("offset", offset.to_string()), ("limit", limit.to_string())],
        )
        .await
    }

    async fn send_message(&self, chat_id: i64, text: &str) -> Result<(), TelegramError> {
        // The sent message is echoed back, we have no use for it.
        self.do_request::<IgnoredAny>(
            SEND_MESSAGE_METHOD,
            &[("chat_id", chat_id.to_string()), ("text", text.to_owned())],
        )
        .await
        .map(|_| ())
    }
}
