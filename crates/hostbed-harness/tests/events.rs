mod common;

use std::sync::{Arc, LazyLock};

use chrono::{DateTime, Utc};
use common::{HARNESS, at, messages};
use hostbed_core::prelude::*;
use hostbed_core::{HandlerConfig, LogLevel};
use hostbed_harness::{Harness, HarnessConfig, HarnessResult};
use serde::Serialize;
use tokio::sync::Barrier;

static BOTH_RUNNING: LazyLock<Barrier> = LazyLock::new(|| Barrier::new(2));

async fn wait_for_sibling(ctx: Arc<Context>, _: EventEnvelope) -> anyhow::Result<()> {
    BOTH_RUNNING.wait().await;
    ctx.log().info("met");
    Ok(())
}

async fn inspect(ctx: Arc<Context>, envelope: EventEnvelope) -> anyhow::Result<()> {
    ctx.log().log(
        LogLevel::Info,
        "received",
        None,
        Some(json!({
            "event": envelope.event.as_deref(),
            "messageId": envelope.message_id,
            "timestamp": envelope.timestamp,
        })),
    );
    Ok(())
}

async fn stall(ctx: Arc<Context>, _: EventEnvelope) -> anyhow::Result<()> {
    ctx.cancellation().cancelled().await;
    Ok(())
}

fn local_harness(dir: &tempfile::TempDir) -> Harness {
    Harness::with_config(
        Registry::new()
            .on("order", "placed", wait_for_sibling)
            .on("order", "placed", wait_for_sibling)
            .on("order", "inspected", inspect)
            .on_with(
                "order",
                "stalled",
                HandlerConfig::with_timeout(std::time::Duration::from_secs(2)),
                stall,
            ),
        HarnessConfig {
            results_dir: dir.path().join("results"),
            env_file: dir.path().join("env.txt"),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn stuff_happened_rejects_bad_payloads() -> HarnessResult<()> {
    let t = HARNESS.begin()?;

    let ok = t
        .allow_error_logs(|| t.emit("stuff", "happened", "1", json!({ "what": "x" })))
        .await?;
    assert!(!ok);
    assert_eq!(messages(&t, LogLevel::Error), ["Event END"]);
    assert!(messages(&t, LogLevel::Info).is_empty());

    t.clear_logged_entries();
    let ok = t
        .allow_error_logs(|| t.emit("stuff", "happened", "long enough", json!({ "what": 3 })))
        .await?;
    assert!(!ok);
    assert_eq!(messages(&t, LogLevel::Error), ["Event END"]);
    assert!(messages(&t, LogLevel::Info).is_empty());
    t.finish()
}

#[tokio::test]
async fn stuff_happened_so_it_did() -> HarnessResult<()> {
    let t = HARNESS.begin()?;
    let ok = t
        .emit("stuff", "happened", "long enough", json!({ "what": "it" }))
        .await?;
    assert!(ok);
    assert_eq!(messages(&t, LogLevel::Info), ["So it did"]);
    assert_eq!(messages(&t, LogLevel::Debug), ["Event END"]);
    t.finish()
}

#[tokio::test]
async fn missing_payload_reaches_handler_as_none() -> HarnessResult<()> {
    let t = HARNESS.begin()?;
    let ok = t
        .allow_error_logs(|| t.emit("stuff", "happened", "long enough", ()))
        .await?;
    assert!(!ok);

    let end = t
        .logged_entries()
        .into_iter()
        .find(|e| e.message == "Event END")
        .unwrap();
    assert!(end.error.unwrap().contains("Unexpected event data."));
    t.finish()
}

#[tokio::test]
async fn nobody_listening_is_success() -> HarnessResult<()> {
    let t = HARNESS.begin()?;
    assert!(t.emit("nobody", "listens", "s", json!({})).await?);
    assert!(t.logged_entries().is_empty());
    t.finish()
}

#[tokio::test]
async fn handlers_of_one_event_run_concurrently() -> HarnessResult<()> {
    let dir = tempfile::tempdir().unwrap();
    let t = local_harness(&dir).begin()?;

    assert!(t.emit("order", "placed", "o-1", json!({})).await?);
    assert_eq!(messages(&t, LogLevel::Info), ["met", "met"]);
    assert_eq!(messages(&t, LogLevel::Trace), ["Found handler", "Found handler"]);
    t.finish()
}

#[derive(Serialize)]
struct Placed {
    at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    coupon: Option<String>,
    items: Vec<u32>,
}

#[tokio::test]
async fn payload_arrives_as_plain_json() -> HarnessResult<()> {
    let dir = tempfile::tempdir().unwrap();
    let t = local_harness(&dir).begin()?;
    t.freeze_time(at("2024-09-20T20:20:00Z"));

    let placed = Placed {
        at: at("2024-09-20T19:00:00Z"),
        coupon: None,
        items: vec![1, 2],
    };
    assert!(
        t.emit_with_message_id("order", "inspected", "o-1", &placed, "m-1")
            .await?
    );

    let entry = t
        .logged_entries()
        .into_iter()
        .find(|e| e.message == "received")
        .unwrap();
    assert_eq!(
        entry.data.unwrap(),
        json!({
            "event": { "at": "2024-09-20T19:00:00Z", "items": [1, 2] },
            "messageId": "m-1",
            "timestamp": "2024-09-20T20:20:00Z",
        })
    );
    t.finish()
}

#[tokio::test(start_paused = true)]
async fn stalled_handler_times_out() -> HarnessResult<()> {
    let dir = tempfile::tempdir().unwrap();
    let t = local_harness(&dir).begin()?;

    let ok = t
        .allow_error_logs(|| t.emit("order", "stalled", "o-1", json!({})))
        .await?;
    assert!(!ok);

    let end = t
        .logged_entries()
        .into_iter()
        .find(|e| e.message == "Event END")
        .unwrap();
    assert_eq!(end.level, LogLevel::Error);
    assert!(end.error.unwrap().contains("timed out"));
    t.finish()
}

#[tokio::test]
async fn cancelled_handler_cannot_emit() -> HarnessResult<()> {
    let t = HARNESS.begin()?;

    let (ok, ()) = t
        .allow_error_logs(|| async {
            tokio::join!(t.emit("slow", "happened", "s", json!({})), async {
                tokio::task::yield_now().await;
                t.cancel_in_flight();
            })
        })
        .await;
    assert!(!ok?);
    assert!(t.emitted().is_empty());
    assert_eq!(messages(&t, LogLevel::Error), ["Event END"]);
    t.finish()
}
