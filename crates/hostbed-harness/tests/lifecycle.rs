mod common;

use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use common::{HARNESS, at};
use hostbed_core::prelude::*;
use hostbed_harness::{
    Harness, HarnessConfig, HarnessError, HarnessResult, RequestOptions, TestContext,
};
use serde_json::Value;

async fn boom(ctx: Arc<Context>, _: Request) -> anyhow::Result<Response> {
    ctx.log().debug("about to fail");
    anyhow::bail!("kaboom")
}

fn local_harness(dir: &tempfile::TempDir) -> Harness {
    Harness::with_config(
        Registry::new().get("boom", boom),
        HarnessConfig {
            results_dir: dir.path().join("results"),
            env_file: dir.path().join("env.txt"),
            ..Default::default()
        },
    )
}

fn artifacts(dir: &tempfile::TempDir) -> Vec<std::path::PathBuf> {
    match std::fs::read_dir(dir.path().join("results")) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => Vec::new(),
    }
}

#[tokio::test]
async fn unexpected_error_fails_the_test() {
    let dir = tempfile::tempdir().unwrap();
    let t = local_harness(&dir).begin_titled("noisy request").unwrap();

    let response = t.request(RequestOptions::get("boom")).await.unwrap();
    assert_eq!(response.status, 500);

    let err = t.finish().unwrap_err();
    assert!(matches!(err, HarnessError::PolicyViolation { ref title } if title == "noisy request"));

    let files = artifacts(&dir);
    assert_eq!(files.len(), 1);
    let name = files[0].file_name().unwrap().to_string_lossy().into_owned();
    assert!(name.starts_with("log-") && name.ends_with("Z.json"));

    let records: Vec<Value> =
        serde_json::from_str(&std::fs::read_to_string(&files[0]).unwrap()).unwrap();
    let messages: Vec<_> = records.iter().map(|r| r["message"].as_str().unwrap()).collect();
    assert_eq!(messages, ["Found handler", "about to fail", "Request END"]);
    assert!(records.iter().all(|r| r["timeOffset"].is_f64()));
}

#[tokio::test]
async fn allowed_error_leaves_no_artifact() -> HarnessResult<()> {
    let dir = tempfile::tempdir().unwrap();
    let t = local_harness(&dir).begin()?;

    let response = t
        .allow_error_logs(|| t.request(RequestOptions::get("boom")))
        .await?;
    assert_eq!(response.status, 500);
    t.finish()?;
    assert!(artifacts(&dir).is_empty());
    Ok(())
}

#[test]
fn failing_test_dumps_its_log() {
    let dir = tempfile::tempdir().unwrap();
    let harness = local_harness(&dir);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap();

    let outcome = std::panic::catch_unwind(AssertUnwindSafe(|| {
        let t = harness.begin().unwrap();
        runtime.block_on(async {
            let ctx = t.mock_context(Default::default(), None, None);
            ctx.log().info("progress");
            ctx.flush().await;
        });
        panic!("assertion failed");
    }));

    assert!(outcome.is_err());
    assert!(!TestContext::is_active());
    assert_eq!(artifacts(&dir).len(), 1);
}

#[test]
fn one_test_context_at_a_time() {
    let t = HARNESS.begin().unwrap();
    assert!(matches!(HARNESS.begin(), Err(HarnessError::ContextExists)));
    assert!(TestContext::current().is_ok());
    t.finish().unwrap();
    assert!(matches!(TestContext::current(), Err(HarnessError::NoActiveTest)));
}

#[tokio::test]
async fn frozen_clock_reaches_handlers() -> HarnessResult<()> {
    let t = HARNESS.begin()?;

    t.freeze_time(at("2030-01-01T00:00:00Z"));
    let body = t.request(RequestOptions::get("greeting/a")).await?.body.unwrap();
    assert_eq!(body["now"], "2030-01-01T00:00:00.000Z");
    assert_eq!(t.logged_entries()[0].timestamp, at("2030-01-01T00:00:00Z"));
    t.finish()
}

#[tokio::test]
async fn shifted_clock_keeps_running() -> HarnessResult<()> {
    let t = HARNESS.begin()?;

    t.time_shift(TimeDelta::days(1));
    let drift = t.now() - Utc::now();
    assert!(drift > TimeDelta::hours(23) && drift <= TimeDelta::days(1));

    t.time_shift_to(at("2024-09-20T20:20:00Z"));
    let first = t.now();
    assert!(first >= at("2024-09-20T20:20:00Z"));
    assert!(first - at("2024-09-20T20:20:00Z") < TimeDelta::seconds(5));
    t.finish()
}

#[tokio::test]
async fn state_does_not_leak_between_tests() -> HarnessResult<()> {
    let t = HARNESS.begin()?;
    t.set_environment([("ONLY_HERE", "1")]);
    t.request(RequestOptions::get("greeting/a")).await?;
    assert!(!t.emitted().is_empty());
    t.finish()?;

    let t = HARNESS.begin()?;
    assert!(t.emitted().is_empty());
    assert!(t.logged_entries().is_empty());
    assert!(!t.environment().contains_key("ONLY_HERE"));
    assert!(!t.sink().failed());
    t.finish()
}
