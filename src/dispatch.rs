//! Event filter and command dispatcher.
//!
//! Every entry read from the ledger streams goes through this decision tree:
//! decode, eligibility (active actor, no error markers), addressing (command
//! present and this app named in `apps`), then the handler. The outcome is
//! reported back to the processing loop so acknowledgment always happens
//! exactly once after classification, regardless of how dispatch went.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::{AyayeError, Result};
use crate::event::{Event, EventKind, OutboundAct};
use crate::queue::StreamEntry;
use crate::registry::Registry;

/// The fixed interface an app exposes to the processing loop.
#[async_trait]
pub trait App: Send + Sync {
    /// The app's stable short name, matched against `what.apps`.
    fn who(&self) -> &str;

    /// The command names this app recognizes.
    fn command_names(&self) -> &[&'static str];

    /// Handle a recognized command, optionally producing an outbound act.
    async fn handle(
        &self,
        command: &str,
        kind: EventKind,
        event: &Event,
    ) -> Result<Option<OutboundAct>>;
}

/// Why an event was skipped without reaching a handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Actor absent or not currently active
    Inactive,
    /// Upstream error markers set
    Errored,
    /// No command, or this app not in `what.apps`
    Unaddressed,
    /// Addressed here but the command name is not recognized; a no-op for
    /// forward compatibility with commands introduced by later versions
    UnknownCommand,
}

impl SkipReason {
    /// Stable label used on the skip counter.
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Inactive => "inactive",
            Self::Errored => "errored",
            Self::Unaddressed => "unaddressed",
            Self::UnknownCommand => "unknown_command",
        }
    }
}

/// Outcome of dispatching one entry. Whatever the variant, the entry gets
/// acknowledged exactly once by the loop.
#[derive(Debug)]
pub enum Dispatch {
    /// A handler ran to completion; `outbound` is the act to append, if any.
    Handled { outbound: Option<OutboundAct> },
    /// The event never reached a handler.
    Skipped(SkipReason),
    /// The payload could not be decoded; poison entry.
    Poison(AyayeError),
    /// A handler ran and failed; not redelivered.
    HandlerFailed(AyayeError),
}

/// Applies the filtering/dispatch decision tree to decoded entries.
pub struct Dispatcher {
    app: Arc<dyn App>,
    registry: Arc<dyn Registry>,
}

impl Dispatcher {
    pub fn new(app: Arc<dyn App>, registry: Arc<dyn Registry>) -> Self {
        Self { app, registry }
    }

    /// Decode and classify one entry, invoking the matching handler when the
    /// event is eligible and addressed here.
    ///
    /// Transport errors (the activity lookup, a fatal handler failure)
    /// propagate; everything else folds into the returned [`Dispatch`].
    pub async fn dispatch(&self, kind: EventKind, entry: &StreamEntry) -> Result<Dispatch> {
        let payload = entry.fields.get(kind.field_key()).map(String::as_str);
        let event = match payload.map(Event::decode) {
            Some(Ok(event)) => event,
            Some(Err(source)) => {
                return Ok(Dispatch::Poison(AyayeError::Decode {
                    stream: entry.stream.clone(),
                    entry_id: entry.id.clone(),
                    source,
                }))
            }
            None => {
                // Classified as fact/act but the field vanished; treat the
                // entry as poison rather than crash.
                return Ok(Dispatch::Poison(AyayeError::Decode {
                    stream: entry.stream.clone(),
                    entry_id: entry.id.clone(),
                    source: serde_json::from_str::<Event>("").unwrap_err(),
                }));
            }
        };

        tracing::info!(kind = %kind, entity_id = ?event.entity_id, command = ?event.what.command, "Event read");

        let Some(entity_id) = event.entity_id.as_deref() else {
            return Ok(Dispatch::Skipped(SkipReason::Inactive));
        };
        if !self.registry.is_active(entity_id).await? {
            return Ok(Dispatch::Skipped(SkipReason::Inactive));
        }
        if event.what.has_error() {
            return Ok(Dispatch::Skipped(SkipReason::Errored));
        }
        if !event.what.is_command_for(self.app.who()) {
            return Ok(Dispatch::Skipped(SkipReason::Unaddressed));
        }

        // is_command_for guarantees the command is present
        let command = event.what.command.clone().unwrap_or_default();
        if !self.app.command_names().contains(&command.as_str()) {
            return Ok(Dispatch::Skipped(SkipReason::UnknownCommand));
        }

        match self.app.handle(&command, kind, &event).await {
            Ok(outbound) => Ok(Dispatch::Handled { outbound }),
            Err(e) if e.is_fatal() => Err(e),
            Err(e) => Ok(Dispatch::HandlerFailed(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{entry_with, MockRegistry};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct RecordingApp {
        handled: AtomicUsize,
    }

    impl RecordingApp {
        fn new() -> Self {
            Self {
                handled: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl App for RecordingApp {
        fn who(&self) -> &str {
            "ayaye"
        }

        fn command_names(&self) -> &[&'static str] {
            &["ask"]
        }

        async fn handle(
            &self,
            _command: &str,
            _kind: EventKind,
            _event: &Event,
        ) -> Result<Option<OutboundAct>> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            Ok(None)
        }
    }

    fn dispatcher(active: &[&str]) -> (Arc<RecordingApp>, Dispatcher) {
        let app = Arc::new(RecordingApp::new());
        let registry = Arc::new(MockRegistry::with_active(active));
        (app.clone(), Dispatcher::new(app, registry))
    }

    #[tokio::test]
    async fn dispatches_addressed_command_from_active_actor() {
        let (app, dispatcher) = dispatcher(&["e1"]);
        let entry = entry_with(
            "fact",
            r#"{"entity_id": "e1", "what": {"command": "ask", "apps": ["ayaye"], "values": {"question": "2+2?"}}}"#,
        );

        let outcome = dispatcher.dispatch(EventKind::Fact, &entry).await.unwrap();
        assert!(matches!(outcome, Dispatch::Handled { .. }));
        assert_eq!(app.handled.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn error_flagged_events_never_reach_a_handler() {
        let (app, dispatcher) = dispatcher(&["e1"]);
        for what in [
            r#"{"command": "ask", "apps": ["ayaye"], "error": "upstream"}"#,
            r#"{"command": "ask", "apps": ["ayaye"], "errors": ["boom"]}"#,
        ] {
            let entry = entry_with("fact", &format!(r#"{{"entity_id": "e1", "what": {what}}}"#));
            let outcome = dispatcher.dispatch(EventKind::Fact, &entry).await.unwrap();
            assert!(matches!(
                outcome,
                Dispatch::Skipped(SkipReason::Errored)
            ));
        }
        assert_eq!(app.handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unaddressed_commands_are_skipped() {
        let (app, dispatcher) = dispatcher(&["e1"]);
        let entry = entry_with(
            "fact",
            r#"{"entity_id": "e1", "what": {"command": "ask", "apps": ["scribe"]}}"#,
        );

        let outcome = dispatcher.dispatch(EventKind::Fact, &entry).await.unwrap();
        assert!(matches!(
            outcome,
            Dispatch::Skipped(SkipReason::Unaddressed)
        ));
        assert_eq!(app.handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn inactive_actor_is_skipped_even_when_addressed() {
        let (app, dispatcher) = dispatcher(&[]);
        let entry = entry_with(
            "fact",
            r#"{"entity_id": "e1", "what": {"command": "ask", "apps": ["ayaye"]}}"#,
        );

        let outcome = dispatcher.dispatch(EventKind::Fact, &entry).await.unwrap();
        assert!(matches!(outcome, Dispatch::Skipped(SkipReason::Inactive)));
        assert_eq!(app.handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn unknown_command_is_a_silent_no_op() {
        let (app, dispatcher) = dispatcher(&["e1"]);
        let entry = entry_with(
            "fact",
            r#"{"entity_id": "e1", "what": {"command": "summon", "apps": ["ayaye"]}}"#,
        );

        let outcome = dispatcher.dispatch(EventKind::Fact, &entry).await.unwrap();
        assert!(matches!(
            outcome,
            Dispatch::Skipped(SkipReason::UnknownCommand)
        ));
        assert_eq!(app.handled.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn malformed_payload_is_poison() {
        let (_, dispatcher) = dispatcher(&["e1"]);
        let entry = entry_with("fact", "{not json");

        let outcome = dispatcher.dispatch(EventKind::Fact, &entry).await.unwrap();
        match outcome {
            Dispatch::Poison(error) => assert_eq!(error.kind(), "decode"),
            other => panic!("expected poison, got {other:?}"),
        }
    }
}
