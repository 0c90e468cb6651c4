//! A small service exercised by the end-to-end tests.

#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::{Arc, LazyLock};

use anyhow::Context as _;
use chrono::{SecondsFormat, Timelike};
use hostbed_core::LogLevel;
use hostbed_core::bearer::{BearerTokenOptions, TokenSigner, TokenVerifier, test_keys};
use hostbed_core::prelude::*;
use hostbed_harness::{Harness, HarnessConfig};
use serde_json::Value;

// =============================================================================
// Handlers
// =============================================================================

async fn greeting(ctx: Arc<Context>, req: Request) -> anyhow::Result<Response> {
    ctx.log().info("here");
    let who = req.url.search_param("who");
    ctx.emit_data(
        "greeting",
        "sent",
        "anonymous",
        &json!({ "message": "hello", "who": who }),
    )
    .await?;
    Ok(Response::json(&json!({
        "now": ctx.now().to_rfc3339_opts(SecondsFormat::Millis, true),
        "step": req.url.path_step_at(1),
        "message": format!("Hello, {}!", who.as_deref().unwrap_or("World")),
    }))?)
}

async fn echo(_: Arc<Context>, req: Request) -> anyhow::Result<Response> {
    let mut response = Response::ok().with_header("x-in-response-to", req.url.href());
    if let Some(Value::String(now)) = object_spreadable(req.body.as_json()).get("now") {
        let time = chrono::DateTime::parse_from_rfc3339(now)?;
        response = response.with_header("time", time.timestamp_millis().to_string());
    }
    Ok(match req.body.to_wire() {
        Some(body) => response.with_body(body),
        None => response,
    })
}

async fn check(_: Arc<Context>, req: Request) -> anyhow::Result<Response> {
    let key = req.url.search_param("key").ok_or_else(HttpError::unauthorized)?;
    if key != "🤫" {
        return Err(HttpError::forbidden().into());
    }
    if req.url.search_param("q").is_none() {
        return Err(HttpError::bad_request(Some("No query provided.")).into());
    }
    Ok(Response::json(&json!({ "items": [] }))?)
}

async fn authorized(ctx: Arc<Context>, req: Request) -> anyhow::Result<Response> {
    let claims = get_bearer(&ctx, &req, &FakeJwt)?;
    if object_spreadable(Some(&claims)).get("sub") != Some(&json!("🤫")) {
        return Err(HttpError::forbidden().into());
    }
    if req.url.search_param("q").is_none() {
        return Err(HttpError::bad_request(Some("None query provided.")).into());
    }
    Ok(Response::json(&json!({ "items": [] }))?)
}

async fn stuff_happened(ctx: Arc<Context>, envelope: EventEnvelope) -> anyhow::Result<()> {
    let Some(Value::String(_)) = object_spreadable(envelope.event.as_deref()).get("what") else {
        anyhow::bail!("Unexpected event data.");
    };
    anyhow::ensure!(envelope.subject.len() >= 4, "Unsupported subject");
    ctx.log().info("So it did");
    Ok(())
}

async fn tick_tock(ctx: Arc<Context>, trigger: TimerTrigger) -> anyhow::Result<()> {
    ctx.emit("", "", "").await?;
    if trigger.trigger_time.hour() % 2 == 1 {
        ctx.log().info("Tock");
    } else {
        ctx.log().info("Tick");
    }
    Ok(())
}

async fn late_emitter(ctx: Arc<Context>, _: EventEnvelope) -> anyhow::Result<()> {
    ctx.cancellation().cancelled().await;
    ctx.emit("late", "emitted", "never").await?;
    Ok(())
}

pub fn registry() -> Registry {
    Registry::new()
        .get("greeting/*", greeting)
        .post("echo/*", echo)
        .get("check", check)
        .get("authorized", authorized)
        .get("twice/*", check)
        .get("*/overlap", check)
        .on("stuff", "happened", stuff_happened)
        .on("slow", "happened", late_emitter)
        .set_interval("0 */1 * * *", tick_tock)
}

pub static HARNESS: LazyLock<Harness> = LazyLock::new(|| {
    Harness::with_config(
        registry(),
        HarnessConfig {
            results_dir: PathBuf::from(env!("CARGO_TARGET_TMPDIR")).join("results"),
            service_name: Some("hostbed-example".to_string()),
            ..Default::default()
        },
    )
});

pub fn at(text: &str) -> chrono::DateTime<chrono::Utc> {
    chrono::DateTime::parse_from_rfc3339(text)
        .unwrap()
        .with_timezone(&chrono::Utc)
}

pub fn messages(t: &hostbed_harness::TestContext, level: LogLevel) -> Vec<String> {
    t.logged_entries()
        .into_iter()
        .filter(|e| e.level == level)
        .map(|e| e.message)
        .collect()
}

// =============================================================================
// Token seam
// =============================================================================

/// Stand-in for a real JWT implementation: the token carries its claims in
/// clear text and only the test key pair is accepted.
pub struct FakeJwt;

impl TokenSigner for FakeJwt {
    fn sign(
        &self,
        claims: &Value,
        private_key_pem: &str,
        options: &BearerTokenOptions,
    ) -> anyhow::Result<String> {
        anyhow::ensure!(private_key_pem.contains(test_keys::PRIVATE_KEY), "unknown signing key");
        let mut claims = claims.clone();
        if let Some(fields) = claims.as_object_mut() {
            if let Some(issuer) = &options.issuer {
                fields.insert("iss".into(), json!(issuer));
            }
            fields.insert("aud".into(), json!(options.audience));
            fields.insert("exp".into(), json!(options.expires_in.as_secs()));
        }
        Ok(format!("fake.{claims}"))
    }
}

impl TokenVerifier for FakeJwt {
    fn verify(&self, token: &str, public_key_pem: &str) -> anyhow::Result<Value> {
        anyhow::ensure!(public_key_pem.contains(test_keys::PUBLIC_KEY), "unknown verification key");
        let claims = token.strip_prefix("fake.").context("malformed token")?;
        Ok(serde_json::from_str(claims)?)
    }
}
