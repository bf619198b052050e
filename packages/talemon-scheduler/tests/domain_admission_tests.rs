//! Domain admission (§4.2 step 3) against a real Postgres: rows over a
//! domain's rate budget are skipped for the tick and remain `PENDING` for a
//! later one, while reclamation and dispatch still work end to end.

use talemon_core::{RateLimitConfig, SchedulerConfig};
use talemon_scheduler::Scheduler;
use talemon_store::{Page, PageStatus};
use talemon_testsupport::pg_pool;

/// Seed `count` pages that all resolve to the same domain, so the limiter's
/// per-domain budget applies across every one of them.
async fn seed_same_domain(pool: &sqlx::PgPool, label: &str, count: usize) -> Vec<Page> {
    let mut pages = Vec::with_capacity(count);
    for i in 0..count {
        let url = format!("https://{label}.example.test/{i}");
        pages.push(Page::seed(&url, 3600, pool).await.unwrap());
    }
    pages
}

#[tokio::test]
async fn over_budget_candidates_stay_pending_for_the_next_tick() {
    let pool = pg_pool().await;
    let pages = seed_same_domain(&pool, "ratelimited", 5).await;

    let scheduler = Scheduler::new(
        pool.clone(),
        SchedulerConfig {
            batch_size: 100,
            ..Default::default()
        },
        RateLimitConfig {
            requests: 2,
            window_secs: 60,
        },
    );

    let claimed = scheduler.claim_ready().await.unwrap();
    let claimed_ids: std::collections::HashSet<i64> =
        claimed.iter().map(|p| p.id).collect();
    let seeded_ids: std::collections::HashSet<i64> = pages.iter().map(|p| p.id).collect();
    let admitted_from_seed = claimed_ids.intersection(&seeded_ids).count();

    assert_eq!(admitted_from_seed, 2, "only the rate-limit budget should be admitted");

    for page in &pages {
        let reloaded = Page::find_by_id(page.id, &pool).await.unwrap().unwrap();
        assert!(matches!(
            reloaded.status,
            PageStatus::Processing | PageStatus::Pending
        ));
    }

    let still_pending = pages
        .iter()
        .filter(|p| !claimed_ids.contains(&p.id))
        .count();
    assert_eq!(still_pending, 3, "rejected candidates remain pending, not lost");
}

#[tokio::test]
async fn reclaimer_tick_is_idempotent_across_repeated_calls() {
    let pool = pg_pool().await;
    let page = Page::seed("https://idempotent-reclaim.example.test/a", 3600, &pool)
        .await
        .unwrap();
    sqlx::query(
        "UPDATE pages SET status = 'processing', heartbeat_at = NOW() - INTERVAL '10 minutes' WHERE id = $1",
    )
    .bind(page.id)
    .execute(&pool)
    .await
    .unwrap();

    let scheduler = Scheduler::new(
        pool.clone(),
        SchedulerConfig::default(),
        RateLimitConfig::default(),
    );

    let first = scheduler.reclaim_zombies().await.unwrap();
    let second = scheduler.reclaim_zombies().await.unwrap();

    assert!(first >= 1);
    assert_eq!(second, 0, "a second tick must not re-reclaim an already-pending page");
}
