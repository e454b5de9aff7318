//! Progress reporting for long-running planner runs.
//!
//! Events are delivered synchronously at fixed checkpoints: per geocoded
//! address, per network load, per routed candidate and per aggregated route.
//! Nothing is buffered.

use std::fmt;

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Geocoding,
    LoadingNetwork,
    Routing,
    Aggregating,
    Persisting,
    Done,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Geocoding => "geocoding",
            Stage::LoadingNetwork => "loading network",
            Stage::Routing => "routing",
            Stage::Aggregating => "aggregating",
            Stage::Persisting => "persisting",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// A structured progress update.
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub stage: Stage,
    /// 1-based position within the stage, 0 when not counted
    pub current: usize,
    pub total: usize,
    pub message: String,
}

impl ProgressEvent {
    pub fn new(stage: Stage, current: usize, total: usize, message: impl Into<String>) -> Self {
        Self {
            stage,
            current,
            total,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProgressEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total > 0 {
            write!(f, "[{} {}/{}] {}", self.stage, self.current, self.total, self.message)
        } else {
            write!(f, "[{}] {}", self.stage, self.message)
        }
    }
}

/// Receiver of progress events.
///
/// Implemented for any `FnMut(&ProgressEvent)` closure.
pub trait ProgressSink {
    fn report(&mut self, event: &ProgressEvent);
}

impl<F> ProgressSink for F
where
    F: FnMut(&ProgressEvent),
{
    fn report(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// Sink that drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&mut self, _event: &ProgressEvent) {}
}
