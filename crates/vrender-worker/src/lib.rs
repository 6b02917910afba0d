//! Render execution for the coordinator.
//!
//! This crate provides:
//! - The render invoker that shells out to the Remotion Lambda CLI
//! - Output parsing and failure classification
//! - The usage ledger sink
//! - The job executor service object used by the HTTP layer

pub mod classify;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod invoker;
pub mod ledger;
pub mod logging;
pub mod output;

pub use classify::{classify_failure, ClassifiedFailure, FailureCategory};
pub use command::{CommandOutput, RenderCommand};
pub use config::WorkerConfig;
pub use error::{WorkerError, WorkerResult};
pub use executor::{JobExecutor, QueuePosition, QueueSnapshot};
pub use invoker::{ProgressSink, RenderInvoker, RenderOutcome, RenderRunner};
pub use ledger::{ledger_from_config, HttpUsageLedger, LogOnlyLedger, UsageLedger};
pub use logging::JobLogger;
