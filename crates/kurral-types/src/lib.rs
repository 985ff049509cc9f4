mod artifact;
mod config;
mod graph;
mod mcp;
mod prompt;
mod report;
mod stream;
mod tool;
mod usage;

pub mod canonical;
pub mod error;
pub mod timestamp;

pub use artifact::{Artifact, OpenArtifact, TimeEnvironment, SCHEMA_MAJOR, SCHEMA_VERSION};
pub use config::{LlmParameters, ModelConfig};
pub use error::{Error, Result};
pub use graph::{GraphVersion, ToolSpec, ToolVersion};
pub use mcp::{CapturedMcpCall, McpEvent};
pub use prompt::{PromptMessage, ResolvedPrompt};
pub use report::{DeterminismReport, ReplayLevel};
pub use stream::{
    build_stream_outputs, reconstruct_stream, validate_stream_map, OutputStream, StreamEntry,
    STREAM_MAP_LIMIT,
};
pub use tool::{EffectType, ToolCall, ToolStatus};
pub use usage::TokenUsage;
