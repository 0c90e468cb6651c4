//! Execution context handed to every handler invocation.
//!
//! A [`Context`] is built fresh for each invocation. It owns the invocation's
//! [`Logger`], a snapshot of the environment, the clock, the event sender and
//! the cancellation token that aborts late work once the invocation is over.
//!
//! # Example
//!
//! ```rust,ignore
//! use hostbed_core::{Context, OutgoingEvent};
//!
//! async fn handle(ctx: Arc<Context>) -> anyhow::Result<()> {
//!     ctx.log().info("handling");
//!     let region = ctx.env("REGION").unwrap_or("local");
//!     ctx.emit_data("greeting", "sent", "anonymous", &json!({ "region": region })).await?;
//!     Ok(())
//! }
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio_util::sync::CancellationToken;

use crate::error::{EmitError, EmitResult};
use crate::http::ClientInfo;
use crate::log::{LogTransport, Logger};
use crate::registry::{HandlerConfig, Metadata};

/// Supplies the current time.
pub type NowFn = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

/// An event a handler wants to send.
///
/// The payload is already encoded as JSON text, exactly as it would be put on
/// the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingEvent {
    pub topic: String,
    pub event_type: String,
    pub subject: String,
    pub data: Option<String>,
    pub message_id: Option<String>,
}

impl OutgoingEvent {
    /// Creates an event without payload.
    pub fn new(
        topic: impl Into<String>,
        event_type: impl Into<String>,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            topic: topic.into(),
            event_type: event_type.into(),
            subject: subject.into(),
            data: None,
            message_id: None,
        }
    }

    /// Encodes `data` as the payload.
    pub fn with_data<T: Serialize + ?Sized>(mut self, data: &T) -> EmitResult<Self> {
        self.data = Some(serde_json::to_string(data)?);
        Ok(self)
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

/// Delivers events emitted by handlers.
#[async_trait]
pub trait EventSender: Send + Sync {
    /// Sends one event. Implementations must not deliver the event once
    /// `cancellation` has fired.
    async fn send_event(
        &self,
        event: OutgoingEvent,
        cancellation: &CancellationToken,
    ) -> EmitResult<()>;
}

/// Sender used when nothing was configured; rejects every event.
struct NoSender;

#[async_trait]
impl EventSender for NoSender {
    async fn send_event(&self, _event: OutgoingEvent, _: &CancellationToken) -> EmitResult<()> {
        Err(EmitError::Rejected("no event sender configured".into()))
    }
}

/// The per-invocation context.
pub struct Context {
    client: ClientInfo,
    log: Logger,
    sender: Arc<dyn EventSender>,
    config: HandlerConfig,
    meta: Option<Metadata>,
    env: HashMap<String, String>,
    now: NowFn,
    cancellation: CancellationToken,
}

impl Context {
    /// Starts building a context.
    pub fn builder() -> ContextBuilder {
        ContextBuilder::default()
    }

    /// The invocation's logger.
    pub fn log(&self) -> &Logger {
        &self.log
    }

    /// Looks up an environment variable.
    pub fn env(&self, key: &str) -> Option<&str> {
        self.env.get(key).map(String::as_str)
    }

    /// The whole environment snapshot.
    pub fn environment(&self) -> &HashMap<String, String> {
        &self.env
    }

    /// The current time as this invocation sees it.
    pub fn now(&self) -> DateTime<Utc> {
        (self.now)()
    }

    pub fn client(&self) -> &ClientInfo {
        &self.client
    }

    pub fn config(&self) -> &HandlerConfig {
        &self.config
    }

    pub fn meta(&self) -> Option<&Metadata> {
        self.meta.as_ref()
    }

    /// Fires when the invocation is over or was aborted.
    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    /// Sends an event without payload.
    pub async fn emit(&self, topic: &str, event_type: &str, subject: &str) -> EmitResult<()> {
        self.send(OutgoingEvent::new(topic, event_type, subject))
            .await
    }

    /// Sends an event with a JSON payload.
    pub async fn emit_data<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        event_type: &str,
        subject: &str,
        data: &T,
    ) -> EmitResult<()> {
        self.send(OutgoingEvent::new(topic, event_type, subject).with_data(data)?)
            .await
    }

    /// Sends a fully built event.
    pub async fn send(&self, event: OutgoingEvent) -> EmitResult<()> {
        self.sender.send_event(event, &self.cancellation).await
    }

    /// Flushes buffered log entries to the transports.
    pub async fn flush(&self) {
        self.log.flush().await;
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("client", &self.client)
            .field("config", &self.config)
            .field("meta", &self.meta)
            .field("log", &self.log)
            .field("cancelled", &self.cancellation.is_cancelled())
            .finish_non_exhaustive()
    }
}

/// Builder for [`Context`].
#[derive(Default)]
pub struct ContextBuilder {
    client: ClientInfo,
    transports: Vec<Arc<dyn LogTransport>>,
    sender: Option<Arc<dyn EventSender>>,
    config: HandlerConfig,
    meta: Option<Metadata>,
    env: HashMap<String, String>,
    now: Option<NowFn>,
    cancellation: Option<CancellationToken>,
}

impl ContextBuilder {
    pub fn client(mut self, client: ClientInfo) -> Self {
        self.client = client;
        self
    }

    /// Adds a destination for the logger's flushed entries.
    pub fn transport(mut self, transport: Arc<dyn LogTransport>) -> Self {
        self.transports.push(transport);
        self
    }

    pub fn sender(mut self, sender: Arc<dyn EventSender>) -> Self {
        self.sender = Some(sender);
        self
    }

    pub fn config(mut self, config: HandlerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn meta(mut self, meta: Option<Metadata>) -> Self {
        self.meta = meta;
        self
    }

    pub fn env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    /// Overrides the clock; defaults to the system clock.
    pub fn now(mut self, now: NowFn) -> Self {
        self.now = Some(now);
        self
    }

    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    pub fn build(self) -> Context {
        let now = self.now.unwrap_or_else(|| Arc::new(Utc::now) as NowFn);
        Context {
            client: self.client,
            log: Logger::new(self.transports, Arc::clone(&now)),
            sender: self.sender.unwrap_or_else(|| Arc::new(NoSender)),
            config: self.config,
            meta: self.meta,
            env: self.env,
            now,
            cancellation: self.cancellation.unwrap_or_default(),
        }
    }
}
