//! High-level facade over the Kurral workspace: connect to a store, capture
//! agent runs, replay artifacts, and compare them.

mod client;
pub mod error;

pub use client::{ArtifactHandle, Client};
pub use error::{Error, Result};

// The working vocabulary, re-exported so embedders need one dependency.
pub use kurral_engine::{ReplayOverrides, ReplayResult};
pub use kurral_runtime::{CaptureHandle, CaptureOptions, CaptureOutcome};
pub use kurral_types::{Artifact, ModelConfig, ReplayLevel, ToolCall};
