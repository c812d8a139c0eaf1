mod orchestrator;
mod runtime;
mod shutdown;
mod source;
mod state;
mod types;


pub use orchestrator::OwlwatchOrchestrator;
pub use source::{JsonLinesSampleSource, SampleSource, StaticSampleSource};
pub use types::{Component, ComponentState, CycleReport, ShutdownReason};
