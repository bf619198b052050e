//! Structured logging setup shared by the `scheduler`, `worker`, and
//! `extractor` subcommands. No `println!`/`eprintln!` anywhere downstream —
//! every SC tick, WK attempt, and EX tick logs through `tracing`.

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Install a `tracing-subscriber` fmt layer honoring `RUST_LOG`, defaulting
/// to `info` for this crate family and `warn` for dependencies.
pub fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,talemon=debug".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
