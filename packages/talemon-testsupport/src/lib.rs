//! Shared integration-test harness: a disposable, migrated Postgres
//! container plus an in-memory object store, in the shape the distilled
//! spec's testable properties (change detection, lease reclamation,
//! extractor idempotence) actually need to exercise `FOR UPDATE SKIP
//! LOCKED` and unique-constraint behavior against a real database rather
//! than a mock.
//!
//! Not a production crate — `dev-dependency` only, unpublished.

use std::sync::Arc;

use sqlx::PgPool;
use testcontainers::runners::AsyncRunner;
use testcontainers::{ContainerAsync, ImageExt};
use testcontainers_modules::postgres::Postgres;
use tokio::sync::OnceCell;

struct SharedPg {
    _container: ContainerAsync<Postgres>,
    url: String,
}

static SHARED: OnceCell<SharedPg> = OnceCell::const_new();

async fn shared() -> &'static SharedPg {
    SHARED
        .get_or_init(|| async {
            let container = Postgres::default()
                .with_tag("16-alpine")
                .start()
                .await
                .expect("failed to start postgres test container");
            let host = container.get_host().await.expect("container host");
            let port = container
                .get_host_port_ipv4(5432)
                .await
                .expect("container port");
            let url = format!("postgres://postgres:postgres@{host}:{port}/postgres");

            let pool = PgPool::connect(&url)
                .await
                .expect("connect to test postgres");
            talemon_store::migrate(&pool)
                .await
                .expect("run migrations against test postgres");
            pool.close().await;

            SharedPg {
                _container: container,
                url,
            }
        })
        .await
}

/// A fresh connection pool against the shared, migrated Postgres test
/// container. The container and schema are started once per test binary and
/// reused by every test in it; callers give each seeded `Page` a unique URL
/// (see [`unique_url`]) so parallel test functions never collide on the
/// `pages.url`/`pages.hash` unique keys.
pub async fn pg_pool() -> PgPool {
    let infra = shared().await;
    PgPool::connect(&infra.url)
        .await
        .expect("connect to test postgres")
}

/// A syntactically valid, collision-free URL for a test page.
pub fn unique_url(label: &str) -> String {
    format!("https://{label}-{}.example.test/page", uuid::Uuid::new_v4())
}

/// An empty in-memory object store, for tests that need a real
/// `ObjectStore` without a filesystem or network dependency.
pub fn in_memory_objectstore() -> talemon_objectstore::ObjectStore {
    talemon_objectstore::ObjectStore::new(Arc::new(object_store::memory::InMemory::new()), "data")
}
