mod common;

use chrono::Duration;
use std::sync::Arc;
use tokio::sync::Notify;

use skinmarket_backend::models::platform::Platform;
use skinmarket_backend::services::reconciler::PassOutcome;

use crate::common::{harness, product_names, ScriptedSource, Step, JOB, START_TS};

#[tokio::test]
async fn test_full_pass_writes_every_page_and_resets_cursor() {
    let names = product_names(250);
    let h = harness(names.clone(), &["key-a", "key-b", "key-c"], ScriptedSource::new(&[]));

    let report = h.reconciler.run().await.unwrap();

    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.pages_total, 3);
    assert_eq!(report.pages_done, 3);
    assert_eq!(report.pages_skipped, 0);
    // BUFF and STEAM quote for every product
    assert_eq!(report.records_written, 500);
    assert_eq!(h.store.snapshot(Platform::Buff).len(), 250);
    assert_eq!(h.store.snapshot(Platform::Steam).len(), 250);
    assert!(h.store.snapshot(Platform::Youpin).is_empty());
    assert_eq!(h.keys.cursor(JOB), 0);

    let page_sizes: Vec<usize> = h.source.calls().iter().map(|c| c.names.len()).collect();
    assert_eq!(page_sizes, vec![100, 100, 50]);
}

#[tokio::test]
async fn test_spare_keys_rotate_without_cooldown() {
    let h = harness(product_names(300), &["key-a", "key-b", "key-c"], ScriptedSource::new(&[]));

    h.reconciler.run().await.unwrap();

    let used: Vec<String> = h.source.calls().into_iter().map(|c| c.api_key).collect();
    assert_eq!(used, vec!["key-a", "key-b", "key-c"]);
    for key in ["key-a", "key-b", "key-c"] {
        assert_eq!(h.keys.credential(key).unwrap().last_used, None);
    }
}

#[tokio::test]
async fn test_pass_resumes_from_cursor_after_keys_run_out() {
    let names = product_names(250);
    let h = harness(names.clone(), &["solo"], ScriptedSource::new(&[]));

    let first = h.reconciler.run().await.unwrap();
    assert_eq!(first.outcome, PassOutcome::KeysExhausted { at_page: 1 });
    assert_eq!(first.pages_done, 1);
    assert_eq!(h.keys.cursor(JOB), 1);
    assert!(h.keys.credential("solo").unwrap().last_used.is_some());

    // Cooldown is strict: exactly 60s idle is not enough
    h.clock.advance(Duration::seconds(60));
    let blocked = h.reconciler.run().await.unwrap();
    assert_eq!(blocked.outcome, PassOutcome::KeysExhausted { at_page: 1 });
    assert_eq!(blocked.pages_done, 0);

    h.clock.advance(Duration::seconds(1));
    let second = h.reconciler.run().await.unwrap();
    assert_eq!(second.start_page, 1);
    assert_eq!(second.outcome, PassOutcome::KeysExhausted { at_page: 2 });
    assert_eq!(h.keys.cursor(JOB), 2);

    h.clock.advance(Duration::seconds(61));
    let third = h.reconciler.run().await.unwrap();
    assert_eq!(third.start_page, 2);
    assert_eq!(third.outcome, PassOutcome::Completed);
    assert_eq!(h.keys.cursor(JOB), 0);

    // Every product fetched exactly once, in catalog order
    let fetched: Vec<String> = h
        .source
        .calls()
        .into_iter()
        .flat_map(|c| c.names)
        .collect();
    assert_eq!(fetched, names);
}

#[tokio::test]
async fn test_out_of_range_cursor_starts_from_first_page() {
    let h = harness(product_names(150), &["key-a", "key-b"], ScriptedSource::new(&[]));
    h.keys.set_cursor(JOB, 7);

    let report = h.reconciler.run().await.unwrap();

    assert_eq!(report.start_page, 0);
    assert_eq!(report.pages_done, 2);
    assert_eq!(report.outcome, PassOutcome::Completed);
}

#[tokio::test]
async fn test_repeated_pass_is_idempotent() {
    let h = harness(product_names(120), &["key-a", "key-b"], ScriptedSource::new(&[]));

    h.reconciler.run().await.unwrap();
    let buff = h.store.snapshot(Platform::Buff);
    let steam = h.store.snapshot(Platform::Steam);

    h.reconciler.run().await.unwrap();

    assert_eq!(h.store.snapshot(Platform::Buff), buff);
    assert_eq!(h.store.snapshot(Platform::Steam), steam);
    assert_eq!(buff.len(), 120);
}

#[tokio::test]
async fn test_rate_limited_page_is_skipped_and_key_cooled() {
    let names = product_names(300);
    let h = harness(
        names.clone(),
        &["key-a", "key-b"],
        ScriptedSource::new(&[Step::Quotes, Step::RateLimited, Step::Quotes]),
    );

    let report = h.reconciler.run().await.unwrap();

    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.pages_done, 2);
    assert_eq!(report.pages_skipped, 1);
    assert_eq!(report.records_written, 400);
    assert_eq!(h.keys.cursor(JOB), 0);

    let throttled = h.keys.credential("key-b").unwrap();
    assert!(throttled.last_used.is_some());
    assert_eq!(throttled.fail_count, 0);

    // Only key-a was left eligible for the last page
    let used: Vec<String> = h.source.calls().into_iter().map(|c| c.api_key).collect();
    assert_eq!(used, vec!["key-a", "key-b", "key-a"]);

    assert!(h.store.get(Platform::Buff, &names[0]).is_some());
    assert!(h.store.get(Platform::Buff, &names[150]).is_none());
    assert!(h.store.get(Platform::Buff, &names[250]).is_some());
}

#[tokio::test]
async fn test_first_page_failure_aborts_full_scan() {
    let h = harness(product_names(300), &["solo"], ScriptedSource::new(&[Step::ServerError]));

    let report = h.reconciler.run().await.unwrap();

    assert!(matches!(report.outcome, PassOutcome::Aborted { at_page: 0, .. }));
    assert_eq!(report.pages_done, 0);
    assert_eq!(h.keys.cursor(JOB), 0);
    assert_eq!(h.keys.credential("solo").unwrap().fail_count, 1);
    assert!(h.store.snapshot(Platform::Buff).is_empty());
    assert_eq!(h.source.calls().len(), 1);
}

#[tokio::test]
async fn test_failing_resume_page_is_skipped_not_aborted() {
    let names = product_names(300);
    let h = harness(
        names.clone(),
        &["key-a", "key-b", "key-c"],
        ScriptedSource::new(&[Step::ServerError]),
    );
    h.keys.set_cursor(JOB, 1);

    let report = h.reconciler.run().await.unwrap();

    assert_eq!(report.start_page, 1);
    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.pages_skipped, 1);
    assert_eq!(report.pages_done, 1);
    assert_eq!(h.keys.cursor(JOB), 0);
    assert_eq!(h.keys.credential("key-a").unwrap().fail_count, 1);

    let calls = h.source.calls();
    assert_eq!(calls.len(), 2);
    assert_eq!(calls[1].names, names[200..].to_vec());
    assert!(h.store.get(Platform::Buff, &names[150]).is_none());
    assert!(h.store.get(Platform::Buff, &names[250]).is_some());
}

#[tokio::test]
async fn test_key_store_error_saves_cursor_at_failing_page() {
    let h = harness(
        product_names(300),
        &["key-a", "key-b", "key-c"],
        ScriptedSource::new(&[Step::Quotes, Step::ServerError]),
    );
    h.keys.fail_key_writes();

    let result = h.reconciler.run().await;

    assert!(result.is_err());
    assert_eq!(h.keys.cursor(JOB), 1);
    assert_eq!(h.source.calls().len(), 2);
}

#[tokio::test]
async fn test_later_page_failure_is_skipped() {
    let h = harness(
        product_names(300),
        &["key-a", "key-b", "key-c"],
        ScriptedSource::new(&[Step::Quotes, Step::ServerError, Step::Quotes]),
    );

    let report = h.reconciler.run().await.unwrap();

    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.pages_skipped, 1);
    assert_eq!(report.pages_done, 2);
    assert_eq!(h.keys.credential("key-b").unwrap().fail_count, 1);
}

#[tokio::test]
async fn test_rate_limited_first_page_does_not_abort() {
    let h = harness(
        product_names(200),
        &["key-a", "key-b"],
        ScriptedSource::new(&[Step::RateLimited]),
    );

    let report = h.reconciler.run().await.unwrap();

    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.pages_skipped, 1);
    assert_eq!(report.pages_done, 1);
}

#[tokio::test]
async fn test_deadlocked_upsert_is_retried() {
    let names = product_names(50);
    let h = harness(names.clone(), &["solo"], ScriptedSource::new(&[]));
    h.store.fail_next_upserts(2);

    let report = h.reconciler.run().await.unwrap();

    assert_eq!(report.records_written, 100);
    // Two failed BUFF attempts, the BUFF retry that landed, then STEAM
    assert_eq!(h.store.upsert_calls(), 4);
    assert!(h.store.get(Platform::Buff, &names[0]).is_some());
}

#[tokio::test]
async fn test_upsert_gives_up_after_three_attempts() {
    let names = product_names(50);
    let h = harness(names.clone(), &["solo"], ScriptedSource::new(&[]));
    h.store.fail_next_upserts(3);

    let report = h.reconciler.run().await.unwrap();

    assert_eq!(report.outcome, PassOutcome::Completed);
    assert_eq!(report.records_written, 50);
    assert!(h.store.get(Platform::Buff, &names[0]).is_none());
    assert!(h.store.get(Platform::Steam, &names[0]).is_some());
}

#[tokio::test]
async fn test_turnover_tracks_half_day_windows_across_passes() {
    let names = product_names(1);
    let h = harness(names.clone(), &["key-a", "key-b"], ScriptedSource::new(&[]));

    h.source.observe(START_TS, 120);
    h.reconciler.run().await.unwrap();
    let first = h.store.get(Platform::Buff, &names[0]).unwrap();
    assert_eq!(first.before_count, 120);
    assert_eq!(first.turn_over, 120);
    assert_eq!(first.link, "https://buff.163.com/goods/900000");

    h.source.observe(START_TS + 600, 95);
    h.reconciler.run().await.unwrap();
    let within = h.store.get(Platform::Buff, &names[0]).unwrap();
    assert_eq!(within.sell_count, 95);
    assert_eq!(within.before_count, 120);
    assert_eq!(within.turn_over, 120);

    h.source.observe(START_TS + 43_200, 70);
    h.reconciler.run().await.unwrap();
    let rolled = h.store.get(Platform::Buff, &names[0]).unwrap();
    assert_eq!(rolled.before_time, START_TS + 43_200);
    assert_eq!(rolled.before_count, 70);
    assert_eq!(rolled.turn_over, 50);
}

#[tokio::test]
async fn test_quotes_without_update_time_are_stamped_with_clock() {
    let names = product_names(1);
    let h = harness(names.clone(), &["key-a", "key-b"], ScriptedSource::new(&[]));

    h.source.observe(0, 120);
    h.reconciler.run().await.unwrap();
    let first = h.store.get(Platform::Buff, &names[0]).unwrap();
    assert_eq!(first.update_time, START_TS);
    assert_eq!(first.before_time, START_TS);
    assert_eq!(first.turn_over, 120);

    h.clock.advance(Duration::seconds(600));
    h.source.observe(0, 95);
    h.reconciler.run().await.unwrap();
    let later = h.store.get(Platform::Buff, &names[0]).unwrap();
    assert_eq!(later.update_time, START_TS + 600);
    assert_eq!(later.before_count, 120);
    assert_eq!(later.turn_over, 120);
}

#[tokio::test]
async fn test_steam_link_uses_encoded_hash_name() {
    let h = harness(
        vec!["AK-47 | Redline (Field-Tested)".to_string()],
        &["solo"],
        ScriptedSource::new(&[]),
    );

    h.reconciler.run().await.unwrap();

    let steam = h
        .store
        .get(Platform::Steam, "AK-47 | Redline (Field-Tested)")
        .unwrap();
    assert!(steam.link.starts_with("https://steamcommunity.com/market/listings/730/AK-47%20"));
    assert!(steam.link.ends_with("Redline%20(Field-Tested)"));
    assert!(!steam.link.contains(' '));
    assert_eq!(steam.platform_item_id, "");
}

#[tokio::test]
async fn test_overlapping_pass_reports_already_running() {
    let entered = Arc::new(Notify::new());
    let release = Arc::new(Notify::new());
    let h = harness(
        product_names(10),
        &["solo"],
        ScriptedSource::gated(entered.clone(), release.clone()),
    );
    let reconciler = Arc::new(h.reconciler);

    let background = {
        let reconciler = reconciler.clone();
        tokio::spawn(async move { reconciler.run().await })
    };
    entered.notified().await;

    let overlapping = reconciler.run().await.unwrap();
    assert_eq!(overlapping.outcome, PassOutcome::AlreadyRunning);

    release.notify_one();
    let finished = background.await.unwrap().unwrap();
    assert_eq!(finished.outcome, PassOutcome::Completed);
    assert_eq!(h.source.calls().len(), 1);
}
