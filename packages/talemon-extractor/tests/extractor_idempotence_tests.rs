//! Extractor exactly-once behavior (§8 scenario 6, P7) against a real
//! Postgres and an in-memory object store.

use bytes::Bytes;
use chrono::Utc;
use talemon_core::ExtractorConfig;
use talemon_extractor::{ExtractorLoop, PassthroughExtractor};
use talemon_objectstore::CaptureArtifacts;
use talemon_store::{capture, Page, PageInfo};
use talemon_testsupport::{in_memory_objectstore, pg_pool, unique_url};

async fn seed_snapshot(pool: &sqlx::PgPool, label: &str) -> (i64, String) {
    let page = Page::seed(&unique_url(label), 3600, pool).await.unwrap();
    let snapshot = capture::record_change(
        pool,
        page.id,
        page.check_interval.clone(),
        Utc::now(),
        &format!("data/{label}/capture"),
        "content-hash",
        "clean-hash",
        "hasher-v1",
    )
    .await
    .unwrap();
    (snapshot.id, snapshot.oss_path)
}

#[tokio::test]
async fn two_concurrent_ticks_write_exactly_one_page_info() {
    let pool = pg_pool().await;
    let objectstore = in_memory_objectstore();
    let (snapshot_id, oss_path) = seed_snapshot(&pool, "concurrent-extract").await;

    objectstore
        .put_capture(
            &oss_path,
            &CaptureArtifacts {
                dom_html: Bytes::from_static(b"<html></html>"),
                source_html: Bytes::from_static(b"<html>raw</html>"),
                mhtml: Bytes::from_static(b"mhtml-bytes"),
                screenshot: Bytes::from_static(b"png-bytes"),
            },
        )
        .await
        .unwrap();

    let config = ExtractorConfig {
        batch_size: 50,
        poll_interval_secs: 1,
        version: "v1".to_string(),
    };
    let loop_a = ExtractorLoop::new(
        pool.clone(),
        objectstore.clone(),
        PassthroughExtractor::new("v1"),
        config.clone(),
    );
    let loop_b = ExtractorLoop::new(
        pool.clone(),
        objectstore.clone(),
        PassthroughExtractor::new("v1"),
        config,
    );

    let (a, b) = tokio::join!(loop_a.tick(), loop_b.tick());
    a.unwrap();
    b.unwrap();

    let infos = PageInfo::list_for_snapshot(snapshot_id, &pool).await.unwrap();
    assert_eq!(infos.len(), 1);
    assert_eq!(infos[0].extractor_version, "v1");
}

/// P7 — running the extractor repeatedly over the same snapshot set yields
/// the same `PageInfo` set.
#[tokio::test]
async fn repeated_ticks_are_idempotent() {
    let pool = pg_pool().await;
    let objectstore = in_memory_objectstore();
    let (snapshot_id, oss_path) = seed_snapshot(&pool, "repeated-extract").await;

    objectstore
        .put_capture(
            &oss_path,
            &CaptureArtifacts {
                dom_html: Bytes::from_static(b"<html></html>"),
                source_html: Bytes::from_static(b"<html>raw</html>"),
                mhtml: Bytes::from_static(b"mhtml-bytes"),
                screenshot: Bytes::from_static(b"png-bytes"),
            },
        )
        .await
        .unwrap();

    let config = ExtractorConfig {
        batch_size: 50,
        poll_interval_secs: 1,
        version: "v1".to_string(),
    };

    for _ in 0..3 {
        let loop_ = ExtractorLoop::new(
            pool.clone(),
            objectstore.clone(),
            PassthroughExtractor::new("v1"),
            config.clone(),
        );
        loop_.tick().await.unwrap();
    }

    let infos = PageInfo::list_for_snapshot(snapshot_id, &pool).await.unwrap();
    assert_eq!(infos.len(), 1);
}

#[tokio::test]
async fn distinct_extractor_versions_each_get_their_own_page_info_row() {
    let pool = pg_pool().await;
    let objectstore = in_memory_objectstore();
    let (snapshot_id, oss_path) = seed_snapshot(&pool, "multi-version").await;

    objectstore
        .put_capture(
            &oss_path,
            &CaptureArtifacts {
                dom_html: Bytes::from_static(b"<html></html>"),
                source_html: Bytes::from_static(b"<html>raw</html>"),
                mhtml: Bytes::from_static(b"mhtml-bytes"),
                screenshot: Bytes::from_static(b"png-bytes"),
            },
        )
        .await
        .unwrap();

    for version in ["v1", "v2"] {
        let config = ExtractorConfig {
            batch_size: 50,
            poll_interval_secs: 1,
            version: version.to_string(),
        };
        let loop_ = ExtractorLoop::new(
            pool.clone(),
            objectstore.clone(),
            PassthroughExtractor::new(version),
            config,
        );
        loop_.tick().await.unwrap();
    }

    let infos = PageInfo::list_for_snapshot(snapshot_id, &pool).await.unwrap();
    assert_eq!(infos.len(), 2);
}
