//! Domain types shared across the workspace.

mod asset;
mod job;

pub use asset::{
    Asset, AssetBuffers, AssetHeader, Bounds, Buffer, BufferKind, CameraInfo, ColorFormat,
    ShFormat, VectorFormat,
};
pub use job::{FailureReason, ImportJob, JobOutcome, JobReport, JobState};
