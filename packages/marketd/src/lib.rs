// marketd - market data freshness scheduler
//
// Keeps derived market data (end-of-day bars, fundamentals, filings, news,
// AI summaries, timelines, technical signals) fresh for a shared, cross-user
// registry of tracked tickers. A watcher translates stale per-component
// timestamps into prioritized jobs, a bounded worker pool dispatches them to
// collector services, and an event hub broadcasts every state transition.

pub mod common;
pub mod config;
pub mod kernel;

pub use config::SchedulerConfig;
