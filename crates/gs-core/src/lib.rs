//! Core types, configuration, and the converter contract for gs-hotload.
//!
//! This crate provides the foundational types shared across the workspace:
//!
//! - Configuration structures ([`Config`] and its sections)
//! - Error types for configuration and conversion failures
//! - The renderer-ready [`Asset`] and its five typed buffers
//! - Import job bookkeeping ([`ImportJob`], [`JobState`], [`JobReport`])
//! - The [`Converter`] trait, the opaque boundary that turns a point-cloud
//!   interchange file into an [`Asset`]
//!
//! # Crate Dependencies
//!
//! ```text
//! gs-cli ──► gs-pipeline ──► gs-watcher ──► gs-core
//!        └─► gs-ply ────────────────────────►
//! ```

#![deny(clippy::all)]
#![warn(missing_docs)]

pub mod config;
pub mod convert;
pub mod error;
pub mod types;

pub use config::{Config, ImportConfig, StabilityConfig, StoreConfig, WatchConfig};
pub use convert::Converter;
pub use error::{ConfigError, ConvertError};
pub use types::{
    Asset, AssetBuffers, AssetHeader, Bounds, Buffer, BufferKind, CameraInfo, ColorFormat,
    FailureReason, ImportJob, JobOutcome, JobReport, JobState, ShFormat, VectorFormat,
};
