//! Shared data models for the render coordinator.
//!
//! This crate provides Serde-serializable types for:
//! - Render jobs, their identifiers and lifecycle states
//! - The render specification payload and its duration normalisation
//! - Usage records written to the cost ledger

pub mod job;
pub mod render;
pub mod usage;

// Re-export common types
pub use job::{Job, JobId, JobStatus, JobUpdate, TransitionError};
pub use render::{
    NormalizedTiming, Overlay, PlatformConfig, RenderSpec, TimeWindow, TrackItem,
    MAX_RENDER_DURATION_MS,
};
pub use usage::UsageRecord;
