//! Event sink system for observability.
//!
//! The poll loop and the stage orchestrator report their progress as typed
//! [`PipelineEvent`]s. Sinks are handed to each component explicitly; there is
//! no process-wide sink, so independent runs never share one by accident.

mod event;
mod sink;

pub use event::PipelineEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
