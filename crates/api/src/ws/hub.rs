use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use shellgate_core::config::RendezvousConfig;
use shellgate_core::execution::{BufferedOutput, OutputLine, OutputSink};
use shellgate_core::types::SessionId;
use tokio::sync::mpsc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Event pushed from an invocation to its attached websocket.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubEvent {
    /// The rendered (redacted) command.
    Script(String),
    Output(OutputLine),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("Session not found")]
    NotFound,
    #[error("Session already has a listener")]
    AlreadyAttached,
    #[error("Session id is already in use")]
    SessionInUse,
    #[error("Session id was already used by a finished invocation")]
    SessionSpent,
}

/// How long a finished session's id stays unusable.
const SPENT_ID_RETENTION: Duration = Duration::from_secs(10 * 60);

enum SlotState {
    /// Registered by the invocation, nobody listening yet.
    Waiting,
    Attached(mpsc::UnboundedSender<HubEvent>),
    /// The listener went away; output is buffered from here on.
    Detached,
    /// Nobody attached within the window; output is buffered and late
    /// listeners are turned away.
    Closed,
    Completed,
}

/// Channel state for one session, owned by a single mutex.
struct Slot {
    state: Mutex<SlotState>,
}

#[derive(Default)]
struct Registry {
    sessions: RwLock<HashMap<SessionId, Arc<Slot>>>,
    /// Ids of completed sessions and when they completed.
    spent: Mutex<HashMap<SessionId, std::time::Instant>>,
}

/// Pairs invocations that stream output with the websocket that listens.
///
/// Either side may arrive first; each waits a bounded time for the other.
/// A session id serves exactly one invocation: it stays unusable for a
/// while after that invocation completes.
pub struct ConnectionHub {
    registry: Arc<Registry>,
    rendezvous: RendezvousConfig,
}

impl ConnectionHub {
    pub fn new(rendezvous: RendezvousConfig) -> Self {
        Self {
            registry: Arc::new(Registry::default()),
            rendezvous,
        }
    }

    /// Register a slot for an invocation that wants to stream output.
    pub fn open(&self, session_id: SessionId) -> Result<SessionHandle, HubError> {
        // Lock order: `spent`, then `sessions`.
        let mut spent = self.registry.spent.lock();
        spent.retain(|_, completed| completed.elapsed() < SPENT_ID_RETENTION);
        if spent.contains_key(&session_id) {
            return Err(HubError::SessionSpent);
        }

        let slot = Arc::new(Slot {
            state: Mutex::new(SlotState::Waiting),
        });

        let mut sessions = self.registry.sessions.write();
        if sessions.contains_key(&session_id) {
            return Err(HubError::SessionInUse);
        }
        sessions.insert(session_id, Arc::clone(&slot));
        tracing::debug!(%session_id, "Session opened");

        Ok(SessionHandle {
            session_id,
            slot,
            registry: Arc::clone(&self.registry),
            rendezvous: self.rendezvous,
        })
    }

    /// Attach a listener to `session_id`, waiting for the invocation to
    /// register it if necessary.
    pub async fn attach(&self, session_id: SessionId) -> Result<Attachment, HubError> {
        let deadline = Instant::now() + self.rendezvous.attach_timeout;

        let slot = loop {
            let registered = self.registry.sessions.read().get(&session_id).cloned();
            if let Some(slot) = registered {
                break slot;
            }
            if Instant::now() >= deadline {
                return Err(HubError::NotFound);
            }
            tokio::time::sleep(self.rendezvous.poll_interval).await;
        };

        let mut state = slot.state.lock();
        match &*state {
            SlotState::Waiting => {}
            SlotState::Closed | SlotState::Completed => return Err(HubError::NotFound),
            SlotState::Attached(_) | SlotState::Detached => return Err(HubError::AlreadyAttached),
        }
        let (tx, rx) = mpsc::unbounded_channel();
        *state = SlotState::Attached(tx);
        drop(state);
        tracing::debug!(%session_id, "Listener attached");

        Ok(Attachment {
            session_id,
            rx,
            slot,
        })
    }

    /// Detach every listener so its connection closes.
    ///
    /// Running invocations keep going and buffer their remaining output.
    pub fn shutdown_all(&self) {
        let sessions = self.registry.sessions.read();
        let mut closed = 0;
        for slot in sessions.values() {
            let mut state = slot.state.lock();
            if matches!(*state, SlotState::Attached(_)) {
                *state = SlotState::Detached;
                closed += 1;
            }
        }
        tracing::info!(count = closed, "Closed all session listeners");
    }

    pub fn session_count(&self) -> usize {
        self.registry.sessions.read().len()
    }
}

/// The invocation's side of a session.
///
/// Dropping the handle completes the session: the listener's stream ends
/// and the id is retired.
pub struct SessionHandle {
    session_id: SessionId,
    slot: Arc<Slot>,
    registry: Arc<Registry>,
    rendezvous: RendezvousConfig,
}

impl SessionHandle {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Wait until a listener attaches, the attach window elapses, or
    /// `cancel` fires. Returns whether a listener is attached.
    ///
    /// Once this returns `false` the session is closed to listeners and
    /// every further line is buffered.
    pub async fn wait_for_attach(&self, cancel: &CancellationToken) -> bool {
        let deadline = Instant::now() + self.rendezvous.attach_timeout;
        loop {
            match &*self.slot.state.lock() {
                SlotState::Waiting => {}
                SlotState::Attached(_) => return true,
                // A listener came and went.
                _ => return false,
            }
            if Instant::now() >= deadline {
                tracing::debug!(session_id = %self.session_id, "No listener attached in time");
                return self.close_if_waiting();
            }
            tokio::select! {
                _ = cancel.cancelled() => return self.close_if_waiting(),
                _ = tokio::time::sleep(self.rendezvous.poll_interval) => {}
            }
        }
    }

    /// Close a still-waiting slot. Returns whether a listener got in first.
    fn close_if_waiting(&self) -> bool {
        let mut state = self.slot.state.lock();
        match &*state {
            SlotState::Attached(_) => true,
            SlotState::Waiting => {
                *state = SlotState::Closed;
                false
            }
            _ => false,
        }
    }

    pub fn is_attached(&self) -> bool {
        matches!(*self.slot.state.lock(), SlotState::Attached(_))
    }

    /// Deliver `event` live. Hands the event back when nobody is listening.
    pub fn push(&self, event: HubEvent) -> Result<(), HubEvent> {
        let mut state = self.slot.state.lock();
        let SlotState::Attached(tx) = &*state else {
            return Err(event);
        };
        match tx.send(event) {
            Ok(()) => Ok(()),
            Err(mpsc::error::SendError(event)) => {
                tracing::debug!(session_id = %self.session_id, "Listener disconnected");
                *state = SlotState::Detached;
                Err(event)
            }
        }
    }
}

impl Drop for SessionHandle {
    fn drop(&mut self) {
        *self.slot.state.lock() = SlotState::Completed;
        let mut spent = self.registry.spent.lock();
        spent.insert(self.session_id, std::time::Instant::now());
        self.registry.sessions.write().remove(&self.session_id);
        drop(spent);
        tracing::debug!(session_id = %self.session_id, "Session completed");
    }
}

/// The websocket's side of a session.
pub struct Attachment {
    session_id: SessionId,
    rx: mpsc::UnboundedReceiver<HubEvent>,
    slot: Arc<Slot>,
}

impl Attachment {
    pub fn session_id(&self) -> SessionId {
        self.session_id
    }

    /// Next event, or `None` once the invocation completed or the hub
    /// detached this listener.
    pub async fn recv(&mut self) -> Option<HubEvent> {
        self.rx.recv().await
    }
}

impl Drop for Attachment {
    fn drop(&mut self) {
        let mut state = self.slot.state.lock();
        if matches!(*state, SlotState::Attached(_)) {
            *state = SlotState::Detached;
        }
    }
}

/// Output sink that streams to a session and buffers whatever cannot be
/// delivered live.
pub struct SessionSink<'a> {
    handle: &'a SessionHandle,
    fallback: BufferedOutput,
}

impl<'a> SessionSink<'a> {
    pub fn new(handle: &'a SessionHandle) -> Self {
        Self {
            handle,
            fallback: BufferedOutput::new(),
        }
    }

    /// Lines that were not delivered live.
    pub fn into_buffered(self) -> Vec<OutputLine> {
        self.fallback.into_lines()
    }
}

impl OutputSink for SessionSink<'_> {
    fn push(&mut self, line: OutputLine) {
        if let Err(HubEvent::Output(line)) = self.handle.push(HubEvent::Output(line)) {
            self.fallback.push(line);
        }
    }
}
