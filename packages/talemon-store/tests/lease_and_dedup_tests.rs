//! Exercises the state store against a real Postgres: lease exclusivity
//! under concurrent claims (P1), snapshot dedup under a racing insert (P2),
//! monitor completeness on every commit path (P3), and zombie reclamation.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use talemon_store::{capture, Page, PageMonitor, PageSnapshot, PageStatus};
use talemon_testsupport::{pg_pool, unique_url};

async fn seed(pool: &sqlx::PgPool, label: &str) -> Page {
    Page::seed(&unique_url(label), 3600, pool)
        .await
        .expect("seed page")
}

#[tokio::test]
async fn claim_batch_only_returns_due_pending_rows() {
    let pool = pg_pool().await;
    let due = seed(&pool, "due").await;
    let paused = seed(&pool, "paused").await;
    Page::pause(paused.id, &pool).await.unwrap();
    let not_due = seed(&pool, "not-due").await;
    sqlx::query("UPDATE pages SET next_schedule_at = NOW() + INTERVAL '1 hour' WHERE id = $1")
        .bind(not_due.id)
        .execute(&pool)
        .await
        .unwrap();

    let claimed = Page::claim_batch(&pool, 100, |_| true).await.unwrap();
    let claimed_ids: HashSet<i64> = claimed.iter().map(|p| p.id).collect();

    assert!(claimed_ids.contains(&due.id));
    assert!(!claimed_ids.contains(&paused.id));
    assert!(!claimed_ids.contains(&not_due.id));

    let reloaded = Page::find_by_id(due.id, &pool).await.unwrap().unwrap();
    assert_eq!(reloaded.status, PageStatus::Processing);
    assert!(reloaded.heartbeat_at.is_some());
}

/// P1 — lease uniqueness. Several concurrent claimers contend for the same
/// batch of due pages; `FOR UPDATE SKIP LOCKED` must ensure each page is
/// claimed by at most one of them.
#[tokio::test]
async fn concurrent_claims_never_double_claim_a_page() {
    let pool = pg_pool().await;
    let mut expected = HashSet::new();
    for i in 0..20 {
        let page = seed(&pool, &format!("contend-{i}")).await;
        expected.insert(page.id);
    }

    let claimers: Vec<_> = (0..5)
        .map(|_| {
            let pool = pool.clone();
            tokio::spawn(async move { Page::claim_batch(&pool, 20, |_| true).await.unwrap() })
        })
        .collect();

    let mut all_claimed = Vec::new();
    for claimer in claimers {
        all_claimed.extend(claimer.await.unwrap());
    }

    let claimed_ids: Vec<i64> = all_claimed
        .iter()
        .map(|p| p.id)
        .filter(|id| expected.contains(id))
        .collect();
    let unique_claimed: HashSet<i64> = claimed_ids.iter().copied().collect();

    assert_eq!(
        claimed_ids.len(),
        unique_claimed.len(),
        "a page was claimed by more than one concurrent claimer"
    );
    assert_eq!(unique_claimed.len(), expected.len());
}

#[tokio::test]
async fn zombie_reclamation_resets_stale_leases() {
    let pool = pg_pool().await;
    let page = seed(&pool, "zombie").await;

    sqlx::query(
        "UPDATE pages SET status = 'processing', heartbeat_at = NOW() - INTERVAL '10 minutes' WHERE id = $1",
    )
    .bind(page.id)
    .execute(&pool)
    .await
    .unwrap();

    let reclaimed = Page::reclaim_zombies(300, &pool).await.unwrap();
    assert!(reclaimed >= 1);

    let reloaded = Page::find_by_id(page.id, &pool).await.unwrap().unwrap();
    assert_eq!(reloaded.status, PageStatus::Pending);
    assert!(reloaded.heartbeat_at.is_none());
}

#[tokio::test]
async fn zombie_reclamation_leaves_fresh_leases_alone() {
    let pool = pg_pool().await;
    let page = seed(&pool, "fresh-lease").await;
    sqlx::query("UPDATE pages SET status = 'processing', heartbeat_at = NOW() WHERE id = $1")
        .bind(page.id)
        .execute(&pool)
        .await
        .unwrap();

    Page::reclaim_zombies(300, &pool).await.unwrap();

    let reloaded = Page::find_by_id(page.id, &pool).await.unwrap().unwrap();
    assert_eq!(reloaded.status, PageStatus::Processing);
    assert!(reloaded.heartbeat_at.is_some());
}

/// P2 — snapshot dedup. Two racing commits for the same `(page_id,
/// clean_hash)` (the clock-skew-during-reclamation scenario from §4.3) must
/// collapse to one row.
#[tokio::test]
async fn concurrent_record_change_with_same_clean_hash_collapses_to_one_row() {
    let pool = pg_pool().await;
    let page = seed(&pool, "racing-commit").await;
    let ts = Utc::now();

    let attempts: Vec<_> = (0..5)
        .map(|i| {
            let pool = pool.clone();
            let interval = page.check_interval.clone();
            tokio::spawn(async move {
                capture::record_change(
                    &pool,
                    page.id,
                    interval,
                    ts + chrono::Duration::milliseconds(i as i64),
                    &format!("data/racing/{i}"),
                    "content-hash-value",
                    "clean-hash-value",
                    "hasher-v1",
                )
                .await
            })
        })
        .collect();

    for attempt in attempts {
        attempt.await.unwrap().expect("record_change must not error on conflict");
    }

    let snapshots = PageSnapshot::list_for_page(page.id, &pool).await.unwrap();
    assert_eq!(snapshots.len(), 1);
    assert_eq!(snapshots[0].clean_hash, "clean-hash-value");
}

/// P3 — every completed attempt (unchanged, changed, or HTTP-gate failure)
/// leaves exactly one `PageMonitor` row.
#[tokio::test]
async fn every_commit_path_writes_exactly_one_monitor_row() {
    let pool = pg_pool().await;

    let unchanged_page = seed(&pool, "monitor-unchanged").await;
    capture::record_unchanged(
        &pool,
        unchanged_page.id,
        unchanged_page.check_interval.clone(),
        "content-hash",
        "clean-hash",
        "hasher-v1",
    )
    .await
    .unwrap();
    let monitors = PageMonitor::list_for_page(unchanged_page.id, &pool).await.unwrap();
    assert_eq!(monitors.len(), 1);
    assert!(!monitors[0].change_detected);

    let changed_page = seed(&pool, "monitor-changed").await;
    capture::record_change(
        &pool,
        changed_page.id,
        changed_page.check_interval.clone(),
        Utc::now(),
        "data/changed/0",
        "content-hash",
        "clean-hash",
        "hasher-v1",
    )
    .await
    .unwrap();
    let monitors = PageMonitor::list_for_page(changed_page.id, &pool).await.unwrap();
    assert_eq!(monitors.len(), 1);
    assert!(monitors[0].change_detected);

    let failed_page = seed(&pool, "monitor-gate-failure").await;
    capture::record_http_gate_failure(
        &pool,
        failed_page.id,
        failed_page.check_interval.clone(),
        Some(503),
        Some("service unavailable"),
    )
    .await
    .unwrap();
    let monitors = PageMonitor::list_for_page(failed_page.id, &pool).await.unwrap();
    assert_eq!(monitors.len(), 1);
    assert!(!monitors[0].change_detected);
    assert_eq!(monitors[0].http_status, Some(503));
    assert!(monitors[0].content_hash.is_none());
}

#[tokio::test]
async fn record_change_releases_the_lease_and_advances_schedule() {
    let pool = pg_pool().await;
    let page = seed(&pool, "release-lease").await;
    Page::claim_batch(&pool, 100, |_| true).await.unwrap();

    capture::record_change(
        &pool,
        page.id,
        page.check_interval.clone(),
        Utc::now(),
        "data/release/0",
        "content-hash",
        "clean-hash",
        "hasher-v1",
    )
    .await
    .unwrap();

    let reloaded = Page::find_by_id(page.id, &pool).await.unwrap().unwrap();
    assert_eq!(reloaded.status, PageStatus::Pending);
    assert!(reloaded.heartbeat_at.is_none());
    assert_eq!(reloaded.last_clean_hash.as_deref(), Some("clean-hash"));
    assert!(reloaded.next_schedule_at > Utc::now() - Duration::from_secs(1));
}
