//! Typed engine notifications
//!
//! Everything the engine tells the outside world flows through one
//! [`EngineEvent`] channel: structural changes to step lists, environment
//! and build-state changes, per-step progress, output text, diagnostics,
//! and queue completion. The sink is injected wherever something emits;
//! there is no global signal bus. A closed receiver is tolerated - the
//! engine keeps working when nobody listens.

use tokio::sync::mpsc;

use crate::core::ids::{ConfigUid, ListUid, ProjectUid, StepUid};
use crate::core::task::{OutputEvent, Task};

/// A notification from the engine
#[derive(Debug, Clone)]
pub enum EngineEvent {
    /// A step was inserted into a list
    StepInserted { list: ListUid, pos: usize },

    /// A step was removed from a list
    StepRemoved { list: ListUid, pos: usize },

    /// A step moved within a list
    StepMoved { list: ListUid, from: usize, to: usize },

    /// A build configuration's effective environment changed
    EnvironmentChanged { config: ConfigUid },

    /// A project started or stopped building
    BuildStateChanged { project: ProjectUid },

    /// A queued step is now running
    StepStarted { step: StepUid, name: String },

    /// Per-step progress within the current batch
    Progress {
        finished: usize,
        total: usize,
        message: String,
    },

    /// Output text produced by a step or by the engine
    Output(OutputEvent),

    /// A diagnostic entry
    Task(Task),

    /// The queue drained; fires exactly once per started batch
    QueueFinished { success: bool },
}

/// Sending half of the engine event channel
///
/// Cheap to clone; sending never fails the engine, a dropped receiver just
/// discards the event.
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<EngineEvent>,
}

impl EventSink {
    /// Create a sink plus the receiver the presentation layer consumes
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    pub fn send(&self, event: EngineEvent) {
        let _ = self.tx.send(event);
    }

    pub fn output(&self, event: OutputEvent) {
        self.send(EngineEvent::Output(event));
    }

    pub fn task(&self, task: Task) {
        self.send(EngineEvent::Task(task));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::task::{OutputFormat, Severity};

    #[test]
    fn test_events_arrive_in_order() {
        let (sink, mut rx) = EventSink::channel();
        sink.task(Task::error("first"));
        sink.output(OutputEvent::line("second", OutputFormat::Stdout));

        match rx.try_recv().unwrap() {
            EngineEvent::Task(task) => assert_eq!(task.severity, Severity::Error),
            other => panic!("unexpected event: {other:?}"),
        }
        match rx.try_recv().unwrap() {
            EngineEvent::Output(out) => assert_eq!(out.text, "second"),
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn test_send_with_dropped_receiver_is_silent() {
        let (sink, rx) = EventSink::channel();
        drop(rx);
        sink.task(Task::warning("nobody listens"));
    }
}
