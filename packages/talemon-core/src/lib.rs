//! Ambient stack shared by the scheduler, worker, extractor, and CLI
//! binaries: typed configuration and logging setup. Carries no pipeline
//! logic of its own — that lives in `talemon-scheduler`/`talemon-worker`/
//! `talemon-extractor`.

mod config;
mod logging;

pub use config::{
    Config, ConfigError, ExtractorConfig, RateLimitConfig, SchedulerConfig, WorkerConfig,
};
pub use logging::init_tracing;
