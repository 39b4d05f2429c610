//! Persistent, priority-driven job scheduling.
//!
//! Two control loops cooperate around a durable queue: the [`Watcher`]
//! turns stale freshness timestamps into work items, and a pool of
//! [`Processor`] workers drains them into collector calls, while the
//! [`EventHub`] fans every job transition out to subscribers.

pub mod events;
pub mod hub;
pub mod job;
pub mod manager;
pub mod memory;
pub mod postgres;
pub mod queue;
pub mod testing;
pub mod watcher;
pub mod worker;

pub use events::{JobEvent, JobEventKind};
pub use hub::{EventHub, Subscription};
pub use job::{Job, JobStatus, JobType, NEW_STOCK_PRIORITY};
pub use manager::SchedulerManager;
pub use memory::MemoryJobQueue;
pub use postgres::PostgresJobQueue;
pub use queue::JobQueue;
pub use watcher::Watcher;
pub use worker::{DispatchError, Processor};
