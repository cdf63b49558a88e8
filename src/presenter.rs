//! Streaming presenter
//!
//! One presenter exists per turn. It relays model fragments to a live UI
//! surface in arrival order and enforces the per-turn lifecycle: the surface
//! shows a placeholder until the first fragment, then accumulates text, then
//! is finalized exactly once (or marked failed). Terminal states accept no
//! further updates.

use crate::store::StoredMessage;
use tokio::sync::broadcast;

/// Shown on the surface before the first fragment arrives.
pub const PLACEHOLDER: &str = "…";

/// Events delivered to UI clients.
#[derive(Debug, Clone)]
pub enum UiEvent {
    /// Sent once per SSE connection, carrying the full history so far.
    Init {
        session_id: String,
        messages: Vec<StoredMessage>,
    },
    /// A new in-progress assistant message was created.
    MessageStarted {
        message_id: String,
        placeholder: String,
    },
    /// Incremental text for the in-progress message.
    Fragment { message_id: String, delta: String },
    /// The in-progress message was committed; no further updates follow.
    MessageCompleted { message: StoredMessage },
    /// The turn failed; the surface shows a failure state instead of the
    /// placeholder or partial text.
    TurnFailed {
        message_id: String,
        kind: String,
        message: String,
    },
}

/// The UI side of a turn: create, append, finalize, fail.
pub trait UiTransport: Send {
    fn message_started(&self, message_id: &str, placeholder: &str);
    fn fragment(&self, message_id: &str, delta: &str);
    fn message_completed(&self, message: &StoredMessage);
    fn turn_failed(&self, message_id: &str, kind: &str, message: &str);
}

/// Production transport: fan events out to SSE subscribers.
///
/// Send failures mean nobody is connected, which is fine; history is
/// replayed via `Init` when a client attaches.
pub struct BroadcastTransport {
    tx: broadcast::Sender<UiEvent>,
}

impl BroadcastTransport {
    pub fn new(tx: broadcast::Sender<UiEvent>) -> Self {
        Self { tx }
    }
}

impl UiTransport for BroadcastTransport {
    fn message_started(&self, message_id: &str, placeholder: &str) {
        let _ = self.tx.send(UiEvent::MessageStarted {
            message_id: message_id.to_string(),
            placeholder: placeholder.to_string(),
        });
    }

    fn fragment(&self, message_id: &str, delta: &str) {
        let _ = self.tx.send(UiEvent::Fragment {
            message_id: message_id.to_string(),
            delta: delta.to_string(),
        });
    }

    fn message_completed(&self, message: &StoredMessage) {
        let _ = self.tx.send(UiEvent::MessageCompleted {
            message: message.clone(),
        });
    }

    fn turn_failed(&self, message_id: &str, kind: &str, message: &str) {
        let _ = self.tx.send(UiEvent::TurnFailed {
            message_id: message_id.to_string(),
            kind: kind.to_string(),
            message: message.to_string(),
        });
    }
}

/// Lifecycle of one turn's surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    /// Surface created, placeholder showing, no fragment yet.
    Idle,
    /// At least one fragment relayed.
    Streaming,
    /// Finalized with the committed message.
    Complete,
    /// Failed visibly.
    Failed,
}

impl TurnState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TurnState::Complete | TurnState::Failed)
    }
}

/// Per-turn presenter. Holds nothing beyond the current turn's accumulated
/// text and the surface it drives.
pub struct TurnPresenter<T: UiTransport> {
    transport: T,
    message_id: String,
    state: TurnState,
    text: String,
}

impl<T: UiTransport> TurnPresenter<T> {
    /// Create the surface (with placeholder) and return the presenter.
    pub fn begin(transport: T) -> Self {
        let message_id = uuid::Uuid::new_v4().to_string();
        transport.message_started(&message_id, PLACEHOLDER);
        Self {
            transport,
            message_id,
            state: TurnState::Idle,
            text: String::new(),
        }
    }

    #[allow(dead_code)] // Accessor for API completeness
    pub fn message_id(&self) -> &str {
        &self.message_id
    }

    pub fn state(&self) -> TurnState {
        self.state
    }

    /// Text accumulated so far, in fragment arrival order.
    pub fn text(&self) -> &str {
        &self.text
    }

    /// Relay one fragment. Ignored after a terminal state.
    pub fn fragment(&mut self, delta: &str) {
        if self.state.is_terminal() {
            tracing::warn!(state = ?self.state, "Dropping fragment after terminal state");
            return;
        }
        self.state = TurnState::Streaming;
        self.text.push_str(delta);
        self.transport.fragment(&self.message_id, delta);
    }

    /// Finalize the surface with the committed message.
    pub fn complete(&mut self, message: &StoredMessage) {
        if self.state.is_terminal() {
            tracing::warn!(state = ?self.state, "Ignoring completion after terminal state");
            return;
        }
        debug_assert_eq!(message.content, self.text);
        self.state = TurnState::Complete;
        self.transport.message_completed(message);
    }

    /// Mark the surface failed. The UI replaces the placeholder or partial
    /// text with a visible failure state.
    pub fn fail(&mut self, kind: &str, message: &str) {
        if self.state.is_terminal() {
            tracing::warn!(state = ?self.state, "Ignoring failure after terminal state");
            return;
        }
        self.state = TurnState::Failed;
        self.transport.turn_failed(&self.message_id, kind, message);
    }
}

#[cfg(test)]
pub mod testing {
    //! Recording transport for presenter and turn tests.

    use super::UiTransport;
    use crate::store::StoredMessage;
    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    pub enum SurfaceOp {
        Started { placeholder: String },
        Fragment { delta: String },
        Completed { content: String },
        Failed { kind: String },
    }

    /// Transport that records every operation, for assertions.
    #[derive(Clone, Default)]
    pub struct RecordingTransport {
        ops: Arc<Mutex<Vec<SurfaceOp>>>,
    }

    impl RecordingTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn ops(&self) -> Vec<SurfaceOp> {
            self.ops.lock().unwrap().clone()
        }
    }

    impl UiTransport for RecordingTransport {
        fn message_started(&self, _message_id: &str, placeholder: &str) {
            self.ops.lock().unwrap().push(SurfaceOp::Started {
                placeholder: placeholder.to_string(),
            });
        }

        fn fragment(&self, _message_id: &str, delta: &str) {
            self.ops.lock().unwrap().push(SurfaceOp::Fragment {
                delta: delta.to_string(),
            });
        }

        fn message_completed(&self, message: &StoredMessage) {
            self.ops.lock().unwrap().push(SurfaceOp::Completed {
                content: message.content.clone(),
            });
        }

        fn turn_failed(&self, _message_id: &str, kind: &str, _message: &str) {
            self.ops.lock().unwrap().push(SurfaceOp::Failed {
                kind: kind.to_string(),
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::{RecordingTransport, SurfaceOp};
    use super::*;
    use crate::llm::Role;
    use chrono::Utc;

    fn assistant_message(content: &str) -> StoredMessage {
        StoredMessage {
            id: "m1".to_string(),
            role: Role::Assistant,
            content: content.to_string(),
            seq: 1,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn placeholder_shown_before_first_fragment() {
        let transport = RecordingTransport::new();
        let presenter = TurnPresenter::begin(transport.clone());

        assert_eq!(presenter.state(), TurnState::Idle);
        assert_eq!(
            transport.ops(),
            vec![SurfaceOp::Started {
                placeholder: PLACEHOLDER.to_string()
            }]
        );
    }

    #[test]
    fn fragments_accumulate_in_order() {
        let transport = RecordingTransport::new();
        let mut presenter = TurnPresenter::begin(transport.clone());

        presenter.fragment("Hel");
        presenter.fragment("lo!");
        assert_eq!(presenter.state(), TurnState::Streaming);
        assert_eq!(presenter.text(), "Hello!");

        presenter.complete(&assistant_message("Hello!"));
        assert_eq!(presenter.state(), TurnState::Complete);

        assert_eq!(
            transport.ops(),
            vec![
                SurfaceOp::Started {
                    placeholder: PLACEHOLDER.to_string()
                },
                SurfaceOp::Fragment {
                    delta: "Hel".to_string()
                },
                SurfaceOp::Fragment {
                    delta: "lo!".to_string()
                },
                SurfaceOp::Completed {
                    content: "Hello!".to_string()
                },
            ]
        );
    }

    #[test]
    fn empty_response_completes_from_idle() {
        let transport = RecordingTransport::new();
        let mut presenter = TurnPresenter::begin(transport.clone());

        presenter.complete(&assistant_message(""));
        assert_eq!(presenter.state(), TurnState::Complete);
    }

    #[test]
    fn failure_is_visible_from_idle_and_streaming() {
        let transport = RecordingTransport::new();
        let mut presenter = TurnPresenter::begin(transport.clone());
        presenter.fail("network", "connection reset");
        assert_eq!(presenter.state(), TurnState::Failed);

        let transport = RecordingTransport::new();
        let mut presenter = TurnPresenter::begin(transport.clone());
        presenter.fragment("partial");
        presenter.fail("rate_limit", "quota exceeded");
        assert_eq!(presenter.state(), TurnState::Failed);
        assert_eq!(
            transport.ops().last(),
            Some(&SurfaceOp::Failed {
                kind: "rate_limit".to_string()
            })
        );
    }

    #[test]
    fn terminal_states_accept_no_updates() {
        let transport = RecordingTransport::new();
        let mut presenter = TurnPresenter::begin(transport.clone());
        presenter.fragment("done");
        presenter.complete(&assistant_message("done"));

        let ops_before = transport.ops();
        presenter.fragment("late");
        presenter.fail("network", "late failure");
        assert_eq!(presenter.state(), TurnState::Complete);
        assert_eq!(presenter.text(), "done");
        assert_eq!(transport.ops(), ops_before);

        let transport = RecordingTransport::new();
        let mut presenter = TurnPresenter::begin(transport.clone());
        presenter.fail("auth", "rejected");
        let ops_before = transport.ops();
        presenter.fragment("late");
        assert_eq!(presenter.state(), TurnState::Failed);
        assert_eq!(transport.ops(), ops_before);
    }
}

#[cfg(test)]
mod proptests {
    use super::testing::{RecordingTransport, SurfaceOp};
    use super::*;
    use proptest::prelude::*;

    proptest! {
        /// The relayed fragments, concatenated, always equal the
        /// accumulated text, with nothing dropped, duplicated, or
        /// reordered.
        #[test]
        fn relayed_fragments_concatenate_exactly(fragments in proptest::collection::vec(".{0,12}", 0..24)) {
            let transport = RecordingTransport::new();
            let mut presenter = TurnPresenter::begin(transport.clone());

            for fragment in &fragments {
                presenter.fragment(fragment);
            }

            let relayed: String = transport
                .ops()
                .iter()
                .filter_map(|op| match op {
                    SurfaceOp::Fragment { delta } => Some(delta.as_str()),
                    _ => None,
                })
                .collect();

            prop_assert_eq!(&relayed, &fragments.concat());
            prop_assert_eq!(presenter.text(), relayed.as_str());
        }

        /// Once terminal, a presenter stays terminal and its surface
        /// receives no further operations, whatever arrives afterwards.
        #[test]
        fn terminal_states_are_absorbing(
            prefix in proptest::collection::vec(".{0,8}", 0..8),
            fail_first in any::<bool>(),
            suffix in proptest::collection::vec(".{0,8}", 0..8),
        ) {
            let transport = RecordingTransport::new();
            let mut presenter = TurnPresenter::begin(transport.clone());

            for fragment in &prefix {
                presenter.fragment(fragment);
            }

            if fail_first {
                presenter.fail("network", "boom");
            } else {
                let message = crate::store::StoredMessage {
                    id: "m".to_string(),
                    role: crate::llm::Role::Assistant,
                    content: prefix.concat(),
                    seq: 0,
                    created_at: chrono::Utc::now(),
                };
                presenter.complete(&message);
            }

            let terminal_state = presenter.state();
            let ops_at_terminal = transport.ops();

            for fragment in &suffix {
                presenter.fragment(fragment);
            }
            presenter.fail("network", "late");

            prop_assert!(terminal_state.is_terminal());
            prop_assert_eq!(presenter.state(), terminal_state);
            prop_assert_eq!(transport.ops(), ops_at_terminal);
        }
    }
}
