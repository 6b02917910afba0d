//! Queue and job lifecycle metrics.
//!
//! Recorded through the `metrics` facade; they are no-ops until a recorder
//! is installed by the binary.

use metrics::{counter, gauge, histogram};

/// Metric names as constants for consistency.
pub mod names {
    pub const QUEUE_LENGTH: &str = "vrender_queue_length";
    pub const JOBS_ACTIVE: &str = "vrender_jobs_active";
    pub const JOBS_SUBMITTED_TOTAL: &str = "vrender_jobs_submitted_total";
    pub const JOBS_COMPLETED_TOTAL: &str = "vrender_jobs_completed_total";
    pub const JOBS_FAILED_TOTAL: &str = "vrender_jobs_failed_total";
    pub const JOBS_CANCELLED_TOTAL: &str = "vrender_jobs_cancelled_total";
    pub const JOBS_REJECTED_TOTAL: &str = "vrender_jobs_rejected_total";
    pub const JOBS_SWEPT_TOTAL: &str = "vrender_jobs_swept_total";
    pub const RENDER_DURATION_SECONDS: &str = "vrender_render_duration_seconds";
}

/// Update waiting/active gauges.
pub fn set_queue_gauges(pending: usize, active: usize) {
    gauge!(names::QUEUE_LENGTH).set(pending as f64);
    gauge!(names::JOBS_ACTIVE).set(active as f64);
}

pub fn record_job_submitted() {
    counter!(names::JOBS_SUBMITTED_TOTAL).increment(1);
}

/// Record a completed render and how long it ran.
pub fn record_job_completed(duration_secs: f64) {
    counter!(names::JOBS_COMPLETED_TOTAL).increment(1);
    histogram!(names::RENDER_DURATION_SECONDS, "outcome" => "completed").record(duration_secs);
}

/// Record a failed render, labelled by failure category.
pub fn record_job_failed(category: &str, duration_secs: f64) {
    let labels = [("category", category.to_string())];
    counter!(names::JOBS_FAILED_TOTAL, &labels).increment(1);
    histogram!(names::RENDER_DURATION_SECONDS, "outcome" => "failed").record(duration_secs);
}

pub fn record_job_cancelled() {
    counter!(names::JOBS_CANCELLED_TOTAL).increment(1);
}

/// Record a submission refused because the queue was full.
pub fn record_job_rejected() {
    counter!(names::JOBS_REJECTED_TOTAL).increment(1);
}

pub fn record_jobs_swept(count: usize) {
    counter!(names::JOBS_SWEPT_TOTAL).increment(count as u64);
}
