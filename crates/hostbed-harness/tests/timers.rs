mod common;

use std::sync::Arc;

use common::{HARNESS, at, messages};
use hostbed_core::prelude::*;
use hostbed_core::LogLevel;
use hostbed_harness::{EmittedEvent, Harness, HarnessConfig, HarnessResult};

async fn noted(ctx: Arc<Context>, trigger: TimerTrigger) -> anyhow::Result<()> {
    ctx.log().info(trigger.trigger_time.to_rfc3339());
    Ok(())
}

fn local_harness(dir: &tempfile::TempDir, schedule: &str) -> Harness {
    Harness::with_config(
        Registry::new().set_interval(schedule, noted),
        HarnessConfig {
            results_dir: dir.path().join("results"),
            env_file: dir.path().join("env.txt"),
            ..Default::default()
        },
    )
}

#[tokio::test]
async fn tick_on_even_hours() -> HarnessResult<()> {
    let t = HARNESS.begin()?;
    t.clock_strikes(at("2024-09-20T20:00:00Z")).await;

    assert_eq!(messages(&t, LogLevel::Info), ["Tick"]);
    assert_eq!(
        t.emitted(),
        [EmittedEvent {
            topic: String::new(),
            event_type: String::new(),
            subject: String::new(),
            data: None,
            message_id: None,
        }]
    );
    t.finish()
}

#[tokio::test]
async fn tock_on_odd_hours() -> HarnessResult<()> {
    let t = HARNESS.begin()?;
    t.clock_strikes(at("2024-09-20T21:00:00Z")).await;
    assert_eq!(messages(&t, LogLevel::Info), ["Tock"]);
    assert_eq!(messages(&t, LogLevel::Debug), ["Timer END"]);
    t.finish()
}

#[tokio::test]
async fn off_schedule_does_nothing() -> HarnessResult<()> {
    let t = HARNESS.begin()?;
    t.clock_strikes(at("2024-09-20T21:01:00Z")).await;
    t.clock_strikes(at("2024-09-20T21:00:00.001Z")).await;
    assert!(t.logged_entries().is_empty());
    assert!(t.emitted().is_empty());
    t.finish()
}

#[tokio::test]
async fn six_field_schedules_have_seconds() -> HarnessResult<()> {
    let dir = tempfile::tempdir().unwrap();
    let t = local_harness(&dir, "30 15 10 * * *").begin()?;

    t.clock_strikes(at("2024-09-20T10:15:00Z")).await;
    t.clock_strikes(at("2024-09-20T10:15:30Z")).await;
    assert_eq!(
        messages(&t, LogLevel::Info),
        ["2024-09-20T10:15:30+00:00"]
    );
    t.finish()
}

#[tokio::test]
async fn weekday_schedule_skips_the_weekend() -> HarnessResult<()> {
    let dir = tempfile::tempdir().unwrap();
    let t = local_harness(&dir, "0 9 * * 1-5").begin()?;

    t.clock_strikes(at("2024-09-22T09:00:00Z")).await;
    t.clock_strikes(at("2024-09-23T09:00:00Z")).await;
    t.clock_strikes(at("2024-09-23T10:00:00Z")).await;
    assert_eq!(
        messages(&t, LogLevel::Info),
        ["2024-09-23T09:00:00+00:00"]
    );
    t.finish()
}

#[tokio::test]
async fn sunday_is_zero_or_seven() -> HarnessResult<()> {
    let dir = tempfile::tempdir().unwrap();
    let t = local_harness(&dir, "30 8 * * 0").begin()?;
    t.clock_strikes(at("2024-09-22T08:30:00Z")).await;
    t.clock_strikes(at("2024-09-23T08:30:00Z")).await;
    assert_eq!(messages(&t, LogLevel::Info), ["2024-09-22T08:30:00+00:00"]);
    t.finish()?;

    let t = local_harness(&dir, "30 8 * * 7").begin()?;
    t.clock_strikes(at("2024-09-29T08:30:00Z")).await;
    assert_eq!(messages(&t, LogLevel::Info), ["2024-09-29T08:30:00+00:00"]);
    t.finish()
}

#[tokio::test]
async fn monthly_schedule_fires_on_its_day() -> HarnessResult<()> {
    let dir = tempfile::tempdir().unwrap();
    let t = local_harness(&dir, "0 0 1 10 *").begin()?;

    t.clock_strikes(at("2024-09-01T00:00:00Z")).await;
    t.clock_strikes(at("2024-10-01T00:00:00Z")).await;
    assert_eq!(messages(&t, LogLevel::Info), ["2024-10-01T00:00:00+00:00"]);
    t.finish()
}

#[tokio::test]
async fn invalid_schedule_is_logged() -> HarnessResult<()> {
    let dir = tempfile::tempdir().unwrap();
    let t = local_harness(&dir, "every hour").begin()?;

    t.allow_error_logs(|| t.clock_strikes(at("2024-09-20T20:00:00Z")))
        .await;

    let entries = t.logged_entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].level, LogLevel::Error);
    assert_eq!(entries[0].message, "Invalid schedule");
    assert_eq!(entries[0].data.as_ref().unwrap()["handler"]["schedule"], "every hour");
    t.finish()
}

#[tokio::test]
async fn invalid_schedule_fails_unallowed() {
    let dir = tempfile::tempdir().unwrap();
    let t = local_harness(&dir, "every hour").begin().unwrap();
    t.clock_strikes(at("2024-09-20T20:00:00Z")).await;
    assert!(t.finish().is_err());
}
