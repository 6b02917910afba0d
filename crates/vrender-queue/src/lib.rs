//! In-memory job store and fair render queue.
//!
//! This crate provides:
//! - The authoritative job table (create/get/update/sweep)
//! - Fair scheduling across users with global and per-user ceilings
//! - A background retention sweeper

pub mod config;
pub mod error;
pub mod fair_queue;
pub mod metrics;
pub mod store;
pub mod sweeper;

pub use config::QueueConfig;
pub use error::{QueueError, QueueResult};
pub use fair_queue::{FairQueue, QueueStats, QueuedJob};
pub use store::{JobStore, StatusCounts};
pub use sweeper::JobSweeper;
