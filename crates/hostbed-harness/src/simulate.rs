//! Simulated deliveries: HTTP requests, published events and clock strikes.
//!
//! Every matching handler gets a fresh invocation context from
//! [`TestContext::mock_context`], a `Found handler` trace entry, the host's
//! dispatch entry point and finally a flush into the test's log sink.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use hostbed_core::bearer::{BearerTokenOptions, TokenSigner, create_bearer_token};
use hostbed_core::{
    ClientInfo, EventEnvelope, HttpHandler, LogLevel, Method, Request, RequestBody, RequestUrl,
    TimerTrigger, execute_request, handle_event, trigger_timer,
};
use serde::Serialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::capture::json_roundtrip;
use crate::context::TestContext;
use crate::error::{HarnessError, HarnessResult};
use crate::resolver::compile_path_pattern;

// =============================================================================
// Request / Response
// =============================================================================

/// A request to simulate.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestOptions {
    pub method: Method,
    /// Relative to the service root; must not start with `/`.
    pub uri: String,
    pub headers: BTreeMap<String, String>,
    pub body: RequestBody,
}

impl RequestOptions {
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            ..Default::default()
        }
    }

    pub fn get(uri: impl Into<String>) -> Self {
        Self::new(Method::Get, uri)
    }

    pub fn post(uri: impl Into<String>) -> Self {
        Self::new(Method::Post, uri)
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers
            .insert(name.into().to_ascii_lowercase(), value.into());
        self
    }

    /// Sends `body` as JSON.
    pub fn json(mut self, body: Value) -> Self {
        self.body = RequestBody::Json(body);
        self
    }

    /// Sends `body` verbatim.
    pub fn text(mut self, body: impl Into<String>) -> Self {
        self.body = RequestBody::Text(body.into());
        self
    }
}

/// The response a simulated caller receives.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    /// The parsed JSON body, if there was one.
    pub body: Option<Value>,
}

impl HttpResponse {
    fn empty(status: u16) -> Self {
        Self {
            status,
            headers: BTreeMap::new(),
            body: None,
        }
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(&name.to_ascii_lowercase())
            .map(String::as_str)
    }
}

/// Default registered claims of test bearer tokens.
pub fn test_bearer_options() -> BearerTokenOptions {
    BearerTokenOptions {
        issuer: Some("https://hostbed.example.com/oauth/".to_string()),
        audience: vec!["https://hostbed.example.com/".to_string()],
        subject: None,
        expires_in: std::time::Duration::from_secs(60),
    }
}

fn describe_http(handler: &HttpHandler) -> Value {
    json!({
        "pathPattern": handler.path_pattern,
        "pathRegExp": compile_path_pattern(&handler.path_pattern)
            .map(|re| re.as_str().to_string())
            .ok(),
        "method": handler.method,
    })
}

// =============================================================================
// Dispatch
// =============================================================================

impl TestContext {
    /// Adds an `authorization: Bearer` header signed with the environment's
    /// private key.
    pub fn with_bearer(
        &self,
        signer: &dyn TokenSigner,
        claims: Value,
        options: RequestOptions,
    ) -> HarnessResult<RequestOptions> {
        let token = create_bearer_token(
            &self.environment(),
            signer,
            &claims,
            &test_bearer_options(),
        )
        .map_err(HarnessError::Bearer)?;
        Ok(options.header("authorization", format!("Bearer {token}")))
    }

    /// Delivers an HTTP request to the one handler it matches.
    ///
    /// No match answers 404 and more than one match answers 500; both log
    /// their diagnostics at error level. Handler failures are turned into
    /// responses by the host.
    pub async fn request(&self, options: RequestOptions) -> HarnessResult<HttpResponse> {
        if options.uri.starts_with('/') {
            return Err(HarnessError::InvalidUri(options.uri));
        }
        let url = RequestUrl::local(&options.uri).map_err(|source| HarnessError::Url {
            uri: options.uri.clone(),
            source,
        })?;
        let harness = self.harness().clone();
        let registry = harness.registry();
        let matching = harness
            .resolver()
            .resolve_http(registry, options.method, &options.uri);

        let client = ClientInfo::from_headers(&options.headers);
        let first = matching.first().copied();
        let ctx = self.mock_context(
            client,
            first.map(|h| &h.config),
            first.and_then(|h| h.meta.as_ref()),
        );

        let handler = match matching.as_slice() {
            [handler] => *handler,
            [] | [_, _, ..] => {
                let status = if matching.is_empty() { 404 } else { 500 };
                if status == 500 {
                    let matching: Vec<_> = matching.iter().map(|h| describe_http(h)).collect();
                    ctx.log().log(
                        LogLevel::Error,
                        "Multiple matching handlers.",
                        None,
                        Some(json!({ "matchingHandlers": matching })),
                    );
                }
                let handlers: Vec<_> = registry.http_handlers().iter().map(describe_http).collect();
                ctx.log().log(
                    LogLevel::Error,
                    "Request END",
                    None,
                    Some(json!({ "handlers": handlers, "response": { "status": status } })),
                );
                ctx.flush().await;
                debug!(uri = %options.uri, status, "Request not dispatched");
                return Ok(HttpResponse::empty(status));
            }
        };

        ctx.log().log(
            LogLevel::Trace,
            "Found handler",
            None,
            Some(json!({ "handler": describe_http(handler) })),
        );

        let mut headers = options.headers;
        if matches!(options.body, RequestBody::Json(_)) {
            headers
                .entry("content-type".to_string())
                .or_insert_with(|| "application/json".to_string());
        }
        let request = Request::new(options.method, url, headers, options.body);

        let response = execute_request(Arc::clone(&ctx), handler, request).await;
        ctx.flush().await;

        let body = match response.body.as_deref() {
            Some(text) if !text.is_empty() => Some(serde_json::from_str(text).map_err(|source| {
                HarnessError::ResponseBody {
                    body: text.to_string(),
                    source,
                }
            })?),
            _ => None,
        };
        Ok(HttpResponse {
            status: response.status,
            headers: response.headers,
            body,
        })
    }

    /// Publishes an event to every handler of `topic` and `event_type`.
    ///
    /// `data` goes through a JSON round trip once; `null` means no payload.
    /// Returns whether every handler succeeded, which is also the case when
    /// there are none.
    pub async fn emit<T: Serialize>(
        &self,
        topic: &str,
        event_type: &str,
        subject: &str,
        data: T,
    ) -> HarnessResult<bool> {
        self.publish(topic, event_type, subject, &data, None).await
    }

    /// Like [`emit`](Self::emit) with a message id.
    pub async fn emit_with_message_id<T: Serialize>(
        &self,
        topic: &str,
        event_type: &str,
        subject: &str,
        data: T,
        message_id: &str,
    ) -> HarnessResult<bool> {
        self.publish(topic, event_type, subject, &data, Some(message_id))
            .await
    }

    async fn publish<T: Serialize + ?Sized>(
        &self,
        topic: &str,
        event_type: &str,
        subject: &str,
        data: &T,
        message_id: Option<&str>,
    ) -> HarnessResult<bool> {
        let timestamp = self.now();
        let event = match json_roundtrip(data)? {
            Value::Null => None,
            value => Some(Arc::new(value)),
        };

        let harness = self.harness().clone();
        let matching = harness
            .resolver()
            .resolve_events(harness.registry(), topic, event_type);
        debug!(topic, event_type, handlers = matching.len(), "Publishing event");

        let runs = matching.into_iter().map(|handler| {
            let ctx = self.mock_context(
                ClientInfo::default(),
                Some(&handler.config),
                handler.meta.as_ref(),
            );
            let envelope = EventEnvelope {
                subject: subject.to_string(),
                event: event.clone(),
                timestamp,
                message_id: message_id.map(str::to_string),
            };
            async move {
                ctx.log().log(
                    LogLevel::Trace,
                    "Found handler",
                    None,
                    Some(json!({ "handler": { "topic": topic, "type": event_type } })),
                );
                let ok = handle_event(Arc::clone(&ctx), handler, envelope).await;
                ctx.flush().await;
                ok
            }
        });
        Ok(join_all(runs).await.into_iter().all(|ok| ok))
    }

    /// Fires every timer handler whose schedule is due at `instant`.
    pub async fn clock_strikes(&self, instant: DateTime<Utc>) {
        let harness = self.harness().clone();
        let resolution = harness.resolver().resolve_timers(harness.registry(), instant);

        if !resolution.invalid.is_empty() {
            let ctx = self.mock_context(ClientInfo::default(), None, None);
            for (handler, reason) in &resolution.invalid {
                let err = anyhow::anyhow!("{reason}");
                ctx.log().log(
                    LogLevel::Error,
                    "Invalid schedule",
                    Some(&err),
                    Some(json!({ "handler": { "schedule": handler.schedule } })),
                );
            }
            ctx.flush().await;
        }

        let runs = resolution.due.into_iter().map(|handler| {
            let ctx = self.mock_context(
                ClientInfo::default(),
                Some(&handler.config),
                handler.meta.as_ref(),
            );
            async move {
                ctx.log().log(
                    LogLevel::Trace,
                    "Found handler",
                    None,
                    Some(json!({ "handler": { "schedule": handler.schedule } })),
                );
                let trigger = TimerTrigger {
                    trigger_time: instant,
                };
                trigger_timer(Arc::clone(&ctx), handler, trigger).await;
                ctx.flush().await;
            }
        });
        join_all(runs).await;
    }
}
