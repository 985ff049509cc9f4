pub mod adapters;
pub mod capture;
pub mod config;
pub mod effects;
pub mod enrich;
pub mod error;
pub mod events;

pub use adapters::{adapter_for, AnthropicAdapter, DefaultAdapter, ModelAdapter, OpenAiAdapter};
pub use capture::{CaptureOptions, CaptureOutcome, CapturePipeline};
pub use config::{Config, StorageChoice};
pub use effects::{
    effects, intercept_scope, interception_active, replay_effects, HostEffects, InterceptGuard,
    Mailer, RealEffects, ReplayEffects, WriteMode,
};
pub use enrich::{merge_artifacts, spawn_enrichment, HARD_DEADLINE, SETTLE_DELAY};
pub use error::{Error, Result};
pub use events::{CaptureHandle, CaptureState, EventSink, ToolToken};
