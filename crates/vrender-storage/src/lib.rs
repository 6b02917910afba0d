//! Artifact storage for rendered videos.
//!
//! This crate provides:
//! - Parsing of S3 result URLs reported by the renderer
//! - Byte download of finished artifacts
//! - An in-memory store for tests and local runs

pub mod client;
pub mod error;
pub mod location;

pub use client::{ArtifactStore, MemoryArtifactStore, S3ArtifactStore, S3Config};
pub use error::{StorageError, StorageResult};
pub use location::ArtifactLocation;
