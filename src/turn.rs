//! Turn processor
//!
//! Runs exactly one orchestration step per user message: extend the session
//! history with the user text, stream a completion over the full history,
//! relay fragments to the UI in arrival order, and commit the turn only when
//! the stream ends cleanly. A failed or cancelled turn commits nothing.

use crate::llm::{ChatMessage, ChatModel, LlmError, StreamEvent};
use crate::presenter::{BroadcastTransport, TurnPresenter, UiEvent, UiTransport};
use crate::store::{Session, SessionStore, StoredMessage};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

/// How a turn can fail. None of these commit anything to history.
#[derive(Debug, Error)]
pub enum TurnError {
    #[error("model completion failed: {0}")]
    Model(#[from] LlmError),
    #[error("turn cancelled")]
    Cancelled,
    #[error("model stream ended without a terminator")]
    Interrupted,
    #[error("a turn is already in flight for this session")]
    Busy,
}

/// Per-session fan-out channel and in-flight turn control.
struct SessionHandle {
    broadcast_tx: broadcast::Sender<UiEvent>,
    cancel: CancellationToken,
}

/// Orchestrates turns across all sessions.
///
/// Holds the only shared mutable resources: the session store and the
/// per-session broadcast channels. One task is spawned per incoming UI
/// message; turns on the same session serialize on the session's gate,
/// turns on different sessions interleave freely.
pub struct TurnProcessor {
    store: SessionStore,
    model: Arc<dyn ChatModel>,
    handles: RwLock<HashMap<String, SessionHandle>>,
}

impl TurnProcessor {
    pub fn new(store: SessionStore, model: Arc<dyn ChatModel>) -> Self {
        Self {
            store,
            model,
            handles: RwLock::new(HashMap::new()),
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Subscribe to a session's UI events.
    pub async fn subscribe(&self, session_id: &str) -> broadcast::Receiver<UiEvent> {
        self.sender(session_id).await.subscribe()
    }

    /// Cancel the in-flight turn, if any. Returns whether the session had
    /// ever started a turn.
    pub async fn cancel_turn(&self, session_id: &str) -> bool {
        match self.handles.read().await.get(session_id) {
            Some(handle) => {
                handle.cancel.cancel();
                true
            }
            None => false,
        }
    }

    /// Start one turn for `session_id`, spawned as its own task.
    ///
    /// Rejects with [`TurnError::Busy`] when a turn is already in flight for
    /// the session; the gate inside `run_turn` still serializes as a
    /// backstop against racing callers.
    pub async fn spawn_turn(&self, session_id: &str, text: String) -> Result<(), TurnError> {
        let session = self.store.session(session_id).await;
        if session.turn_in_flight() {
            return Err(TurnError::Busy);
        }

        let cancel = CancellationToken::new();
        let tx = {
            let mut handles = self.handles.write().await;
            let handle = handles
                .entry(session_id.to_string())
                .or_insert_with(new_handle);
            handle.cancel = cancel.clone();
            handle.broadcast_tx.clone()
        };

        let model = Arc::clone(&self.model);
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            let presenter = TurnPresenter::begin(BroadcastTransport::new(tx));
            match run_turn(&session, model.as_ref(), &text, presenter, cancel).await {
                Ok((user, assistant)) => {
                    tracing::info!(
                        session_id = %session_id,
                        user_seq = user.seq,
                        assistant_seq = assistant.seq,
                        chars = assistant.content.len(),
                        "Turn committed"
                    );
                }
                Err(e) => {
                    tracing::warn!(session_id = %session_id, error = %e, "Turn abandoned");
                }
            }
        });

        Ok(())
    }

    async fn sender(&self, session_id: &str) -> broadcast::Sender<UiEvent> {
        if let Some(handle) = self.handles.read().await.get(session_id) {
            return handle.broadcast_tx.clone();
        }

        let mut handles = self.handles.write().await;
        handles
            .entry(session_id.to_string())
            .or_insert_with(new_handle)
            .broadcast_tx
            .clone()
    }
}

fn new_handle() -> SessionHandle {
    let (broadcast_tx, _) = broadcast::channel(128);
    SessionHandle {
        broadcast_tx,
        cancel: CancellationToken::new(),
    }
}

/// Drive one turn to completion.
///
/// The user message is not committed up front: history is extended with the
/// user and assistant messages together, only after the stream's explicit
/// end-of-stream. Any earlier exit leaves history exactly as it was.
async fn run_turn<T: UiTransport>(
    session: &Session,
    model: &dyn ChatModel,
    user_text: &str,
    mut presenter: TurnPresenter<T>,
    cancel: CancellationToken,
) -> Result<(StoredMessage, StoredMessage), TurnError> {
    let _gate = session.begin_turn().await;

    let mut context = session.context().await;
    context.push(ChatMessage::user(user_text));

    let mut stream = match model.stream_chat(&context).await {
        Ok(stream) => stream,
        Err(e) => {
            presenter.fail(e.kind.label(), &e.message);
            return Err(TurnError::Model(e));
        }
    };

    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                presenter.fail("cancelled", "Turn cancelled");
                return Err(TurnError::Cancelled);
            }
            event = stream.recv() => match event {
                Some(StreamEvent::Delta(delta)) => presenter.fragment(&delta),
                Some(StreamEvent::Done) => break,
                Some(StreamEvent::Error(e)) => {
                    presenter.fail(e.kind.label(), &e.message);
                    return Err(TurnError::Model(e));
                }
                None => {
                    presenter.fail("network", "Model stream ended unexpectedly");
                    return Err(TurnError::Interrupted);
                }
            }
        }
    }

    let (user, assistant) = session.commit_turn(user_text, presenter.text()).await;
    presenter.complete(&assistant);
    Ok((user, assistant))
}
