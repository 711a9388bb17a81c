//! End-to-end pipeline scenarios against an in-memory SQLite store.
//!
//! Each test plays the part of the surrounding metadata system's triggers
//! by appending rows to the change-log table directly, then observes what
//! reaches the registered subscribers.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use sqlx::sqlite::{SqlitePool, SqlitePoolOptions};
use tokio::time::Instant;

use tablecast::testing::mocks::{FailingSubscriber, RecordingSubscriber};
use tablecast::{
    CaptureConfig, ChangeEvent, ChangeOp, ComponentStatus, Registration, Scheduler, SourceTable,
};

async fn memory_pool() -> SqlitePool {
    // A single connection so every statement sees the same in-memory db.
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await
        .expect("in-memory pool")
}

fn fast_config() -> CaptureConfig {
    CaptureConfig::new()
        .with_poll_interval_ms(5)
        .with_dispatch_interval_ms(5)
}

fn scheduler_with(pool: SqlitePool, config: CaptureConfig) -> Scheduler {
    Scheduler::builder()
        .pool(pool)
        .config(config)
        .build()
        .expect("build scheduler")
}

/// Append one change-log row the way a trigger would
async fn insert_change(
    pool: &SqlitePool,
    table: &str,
    operation: &str,
    before: Option<&str>,
    after: Option<&str>,
) {
    sqlx::query(
        "INSERT INTO __cdc_log (timestamp, tablename, operation, before, after, created_at)
         VALUES (?, ?, ?, ?, ?, ?)",
    )
    .bind("2026-07-01 12:00:00.123456789")
    .bind(table)
    .bind(operation)
    .bind(before)
    .bind(after)
    .bind("2026-07-01 12:00:00")
    .execute(pool)
    .await
    .expect("insert change row");
}

async fn count_log_rows(pool: &SqlitePool) -> i64 {
    sqlx::query_scalar::<_, i64>("SELECT COUNT(*) FROM __cdc_log")
        .fetch_one(pool)
        .await
        .expect("count change rows")
}

/// Poll `condition` until it holds or the timeout expires
async fn wait_until<F, Fut>(what: &str, mut condition: F)
where
    F: FnMut() -> Fut,
    Fut: Future<Output = bool>,
{
    let deadline = Instant::now() + Duration::from_secs(10);
    while Instant::now() < deadline {
        if condition().await {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("timed out waiting for {what}");
}

async fn wait_for_empty_log(pool: &SqlitePool) {
    wait_until("the change log to drain", || async {
        count_log_rows(pool).await == 0
    })
    .await;
}

#[tokio::test]
async fn single_insert_reaches_single_subscriber() {
    let pool = memory_pool().await;
    let mut scheduler = scheduler_with(pool.clone(), fast_config());

    let recorder = Arc::new(RecordingSubscriber::new());
    scheduler
        .register(
            Registration::new("schema-cache", "1.0.0")
                .subscribe(SourceTable::Tables)
                .with_instance(recorder.clone()),
        )
        .expect("register");

    scheduler.start().await.expect("start");
    insert_change(&pool, "tables", "INSERT", None, Some(r#"{"id":10,"name":"t"}"#)).await;

    wait_until("the event to reach the subscriber", || async {
        !recorder.is_empty()
    })
    .await;

    let seen = recorder.seen();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0].id(), 1);
    assert_eq!(seen[0].op(), ChangeOp::Insert);
    let ChangeEvent::Table(inner) = &seen[0] else {
        panic!("expected a tables event");
    };
    assert_eq!(inner.data.id, 10);
    assert_eq!(inner.data.name, "t");

    wait_for_empty_log(&pool).await;
    assert!(scheduler.stats().processed_events >= 1);
    scheduler.stop().await;

    // Delivered exactly once.
    assert_eq!(recorder.event_ids(), vec![1]);
}

#[tokio::test]
async fn fan_out_delivers_to_every_subscriber_once() {
    let pool = memory_pool().await;
    let mut scheduler = scheduler_with(pool.clone(), fast_config());

    let first = Arc::new(RecordingSubscriber::new());
    let second = Arc::new(RecordingSubscriber::new());
    for (name, recorder) in [("s1", &first), ("s2", &second)] {
        scheduler
            .register(
                Registration::new(name, "1.0.0")
                    .subscribe(SourceTable::Tables)
                    .with_instance(recorder.clone()),
            )
            .expect("register");
    }

    scheduler.start().await.expect("start");
    insert_change(&pool, "tables", "INSERT", None, Some(r#"{"id":1,"name":"a"}"#)).await;

    wait_until("both subscribers to see the event", || async {
        !first.is_empty() && !second.is_empty()
    })
    .await;
    scheduler.stop().await;

    assert_eq!(first.event_ids(), vec![1]);
    assert_eq!(second.event_ids(), vec![1]);
}

#[tokio::test]
async fn unmonitored_table_rows_are_swept() {
    let pool = memory_pool().await;
    let mut scheduler = scheduler_with(pool.clone(), fast_config());

    let recorder = Arc::new(RecordingSubscriber::new());
    scheduler
        .register(
            Registration::new("schema-cache", "1.0.0")
                .subscribe(SourceTable::Tables)
                .with_instance(recorder.clone()),
        )
        .expect("register");

    scheduler.start().await.expect("start");
    insert_change(&pool, "tables", "INSERT", None, Some(r#"{"id":1,"name":"a"}"#)).await;
    insert_change(&pool, "other", "INSERT", None, Some(r#"{"id":2}"#)).await;

    wait_for_empty_log(&pool).await;
    wait_until("the monitored event to arrive", || async {
        !recorder.is_empty()
    })
    .await;
    scheduler.stop().await;

    // The monitored row was delivered, the unmonitored one only swept.
    assert_eq!(recorder.event_ids(), vec![1]);
}

#[tokio::test]
async fn poison_payload_does_not_stall_the_pipeline() {
    let pool = memory_pool().await;
    let mut scheduler = scheduler_with(pool.clone(), fast_config());

    let recorder = Arc::new(RecordingSubscriber::new());
    scheduler
        .register(
            Registration::new("schema-cache", "1.0.0")
                .subscribe(SourceTable::Tables)
                .with_instance(recorder.clone()),
        )
        .expect("register");

    scheduler.start().await.expect("start");
    insert_change(&pool, "tables", "INSERT", None, Some("{not json")).await;
    insert_change(&pool, "tables", "INSERT", None, Some(r#"{"id":2,"name":"b"}"#)).await;

    wait_until("the valid event to arrive", || async { !recorder.is_empty() }).await;
    wait_for_empty_log(&pool).await;
    scheduler.stop().await;

    assert_eq!(recorder.event_ids(), vec![2]);
}

#[tokio::test]
async fn faulty_subscriber_is_marked_and_pipeline_continues() {
    let pool = memory_pool().await;
    let mut scheduler = scheduler_with(pool.clone(), fast_config());

    let failing = Arc::new(FailingSubscriber::new());
    scheduler
        .register(
            Registration::new("faulty", "1.0.0")
                .subscribe(SourceTable::Tables)
                .with_instance(failing.clone()),
        )
        .expect("register");

    scheduler.start().await.expect("start");
    insert_change(&pool, "tables", "INSERT", None, Some(r#"{"id":1,"name":"a"}"#)).await;

    wait_until("the first delivery attempt", || async {
        failing.attempt_count() >= 1
    })
    .await;
    wait_until("the event to be marked processed", || async {
        scheduler.stats().processed_events >= 1
    })
    .await;

    // The failure is recorded on the subscriber, not on the pipeline.
    let descriptor = scheduler.descriptor("faulty").expect("descriptor");
    assert_eq!(descriptor.status, ComponentStatus::Error);
    assert!(scheduler.is_running());

    // A second insert still flows, and is still offered to the faulty
    // subscriber: error status does not remove it from the inverse index.
    insert_change(&pool, "tables", "INSERT", None, Some(r#"{"id":2,"name":"b"}"#)).await;
    wait_until("the second delivery attempt", || async {
        failing.attempt_count() >= 2
    })
    .await;
    wait_until("the second event to be marked processed", || async {
        scheduler.stats().processed_events >= 2
    })
    .await;

    // Failed deliveries never restore the status; only set_status does.
    scheduler.set_status("faulty", ComponentStatus::Active).expect("set_status");
    assert_eq!(
        scheduler.descriptor("faulty").expect("descriptor").status,
        ComponentStatus::Active
    );

    scheduler.stop().await;
}

#[tokio::test]
async fn per_table_delivery_order_is_id_ascending() {
    let pool = memory_pool().await;
    let mut scheduler = scheduler_with(pool.clone(), fast_config());

    let recorder = Arc::new(RecordingSubscriber::new());
    scheduler
        .register(
            Registration::new("schema-cache", "1.0.0")
                .subscribe(SourceTable::Tables)
                .subscribe(SourceTable::TableFiles)
                .with_instance(recorder.clone()),
        )
        .expect("register");

    scheduler.start().await.expect("start");
    for i in 0..20 {
        let table = if i % 2 == 0 { "tables" } else { "table_files" };
        let after = format!(r#"{{"id":{i},"name":"t{i}"}}"#);
        insert_change(&pool, table, "INSERT", None, Some(&after)).await;
    }

    wait_until("all events to arrive", || async { recorder.len() == 20 }).await;
    scheduler.stop().await;

    // Strictly increasing ids per source table; cross-table interleaving
    // is unconstrained.
    for table in [SourceTable::Tables, SourceTable::TableFiles] {
        let ids: Vec<i64> = recorder
            .seen()
            .iter()
            .filter(|e| e.table() == table)
            .map(ChangeEvent::id)
            .collect();
        assert_eq!(ids.len(), 10);
        assert!(ids.windows(2).all(|w| w[0] < w[1]), "{table} ids not ascending: {ids:?}");
    }
}

#[tokio::test]
async fn shutdown_leaves_unconsumed_rows_for_restart() {
    let pool = memory_pool().await;
    // A long poll interval so stop() lands before the first tick.
    let mut scheduler = scheduler_with(
        pool.clone(),
        CaptureConfig::new()
            .with_poll_interval_ms(60_000)
            .with_dispatch_interval_ms(5),
    );

    let recorder = Arc::new(RecordingSubscriber::new());
    scheduler
        .register(
            Registration::new("schema-cache", "1.0.0")
                .subscribe(SourceTable::Tables)
                .with_instance(recorder.clone()),
        )
        .expect("register");

    scheduler.ensure_schema().await.expect("schema");
    for i in 0..1000 {
        let after = format!(r#"{{"id":{i},"name":"t{i}"}}"#);
        insert_change(&pool, "tables", "INSERT", None, Some(&after)).await;
    }

    scheduler.start().await.expect("start");
    tokio::time::sleep(Duration::from_millis(10)).await;
    scheduler.stop().await;

    // stop() returned only after the loops exited; nothing is in flight.
    assert!(!scheduler.is_running());
    let delivered_at_stop = recorder.len();
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(recorder.len(), delivered_at_stop);

    // The unconsumed rows survived for a future restart.
    let remaining = count_log_rows(&pool).await;
    assert!(remaining > 0, "expected unconsumed change-log rows");

    // A restart with a fast poll interval drains the backlog.
    scheduler.set_poll_interval_ms(5);
    scheduler.start().await.expect("restart");
    wait_until("the backlog to drain after restart", || async {
        recorder.len() == 1000
    })
    .await;
    scheduler.stop().await;

    assert_eq!(count_log_rows(&pool).await, 0);
    let ids = recorder.event_ids();
    assert!(ids.windows(2).all(|w| w[0] < w[1]));
}

#[tokio::test]
async fn batch_size_one_still_progresses() {
    let pool = memory_pool().await;
    let mut scheduler = scheduler_with(pool.clone(), fast_config().with_batch_size(1));

    let recorder = Arc::new(RecordingSubscriber::new());
    scheduler
        .register(
            Registration::new("schema-cache", "1.0.0")
                .subscribe(SourceTable::Tables)
                .with_instance(recorder.clone()),
        )
        .expect("register");

    scheduler.start().await.expect("start");
    for i in 0..3 {
        let after = format!(r#"{{"id":{i},"name":"t{i}"}}"#);
        insert_change(&pool, "tables", "INSERT", None, Some(&after)).await;
    }

    wait_until("all events despite batch_size = 1", || async {
        recorder.len() == 3
    })
    .await;
    scheduler.stop().await;

    assert_eq!(recorder.event_ids(), vec![1, 2, 3]);
}

#[tokio::test]
async fn delete_with_missing_before_image_is_dropped_and_swept() {
    let pool = memory_pool().await;
    let mut scheduler = scheduler_with(pool.clone(), fast_config());

    let recorder = Arc::new(RecordingSubscriber::new());
    scheduler
        .register(
            Registration::new("schema-cache", "1.0.0")
                .subscribe(SourceTable::Tables)
                .with_instance(recorder.clone()),
        )
        .expect("register");

    scheduler.start().await.expect("start");
    insert_change(&pool, "tables", "DELETE", None, None).await;
    insert_change(&pool, "tables", "INSERT", None, Some(r#"{"id":2,"name":"b"}"#)).await;

    wait_for_empty_log(&pool).await;
    wait_until("the valid event to arrive", || async { !recorder.is_empty() }).await;
    scheduler.stop().await;

    assert_eq!(recorder.event_ids(), vec![2]);
}
