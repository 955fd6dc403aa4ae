//! Per-session TTS streaming orchestration for lingcast.
//!
//! One orchestrator per session owns a bounded FIFO of committed
//! segments and a single worker that synthesises them strictly in
//! order: route resolution and entitlement assertion at admission,
//! chunk fan-out scoped to the segment's language, usage recording on
//! completion, and failure confinement to the segment that failed.

pub mod orchestrator;
pub mod usage;

pub use orchestrator::{
    OrchestratorConfig, OrchestratorManager, ProviderSet, SpeechOrchestrator,
};
pub use usage::{MemoryUsageSink, UsageError, UsageEvent, UsageSink, usage_key};
