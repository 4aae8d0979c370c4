//! Agent contract and runtime loops
//!
//! Every agent owns an inbound queue, an outgoing channel the bus subscribes
//! to, and a small context store for cross-cycle scratch state. Starting an
//! agent launches two cooperative tasks: a message-processing loop and a
//! background-task loop. Both observe the running flag at their iteration
//! boundary; faults are contained inside the loop and never terminate it.

use crate::error::AgentError;
use crate::messages::Envelope;
use crate::records::{AgentKind, AgentStatus, Timestamp};
use chrono::Utc;
use log::{debug, error, warn};
use serde_json::Value;
use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;

/// How long the message loop blocks on the inbox before re-checking the
/// running flag.
const INBOX_POLL: Duration = Duration::from_secs(1);

/// Pause between background cycles on success
const BACKGROUND_PAUSE: Duration = Duration::from_secs(1);

/// Pause between background cycles after a failure
const BACKGROUND_BACKOFF: Duration = Duration::from_secs(5);

/// Contract every concrete agent implements
///
/// `process_message` is the pure request/response reaction; `background_task`
/// performs one unit of periodic autonomous work and is expected to self-pace
/// internally when it needs a longer cycle than the runtime's default pause.
pub trait Agent: Send + Sync {
    /// Shared runtime state owned by the agent
    fn core(&self) -> &AgentCore;

    /// React to one envelope; an optional response is routed back via the bus
    fn process_message<'a>(
        &'a self,
        envelope: Envelope,
    ) -> Pin<Box<dyn Future<Output = Option<Envelope>> + Send + 'a>>;

    /// One unit of periodic autonomous work
    fn background_task<'a>(
        &'a self,
    ) -> Pin<Box<dyn Future<Output = Result<(), AgentError>> + Send + 'a>>;
}

/// State every agent owns: identity, queues, counters, and context store
pub struct AgentCore {
    agent_id: String,
    kind: AgentKind,
    running: AtomicBool,
    inbox_tx: mpsc::UnboundedSender<Envelope>,
    inbox_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    outgoing_tx: mpsc::UnboundedSender<Envelope>,
    outgoing_rx: Mutex<Option<mpsc::UnboundedReceiver<Envelope>>>,
    context: Mutex<HashMap<String, Value>>,
    messages_processed: AtomicU64,
    queue_depth: AtomicUsize,
    subscribers: AtomicUsize,
    started_at: Timestamp,
    last_activity: Mutex<Timestamp>,
}

impl AgentCore {
    pub fn new(agent_id: impl Into<String>, kind: AgentKind) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let (outgoing_tx, outgoing_rx) = mpsc::unbounded_channel();
        let now = Utc::now();
        Self {
            agent_id: agent_id.into(),
            kind,
            running: AtomicBool::new(false),
            inbox_tx,
            inbox_rx: Mutex::new(Some(inbox_rx)),
            outgoing_tx,
            outgoing_rx: Mutex::new(Some(outgoing_rx)),
            context: Mutex::new(HashMap::new()),
            messages_processed: AtomicU64::new(0),
            queue_depth: AtomicUsize::new(0),
            subscribers: AtomicUsize::new(0),
            started_at: now,
            last_activity: Mutex::new(now),
        }
    }

    pub fn id(&self) -> &str {
        &self.agent_id
    }

    pub fn kind(&self) -> AgentKind {
        self.kind
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Signal both loops to exit at their next iteration boundary
    pub fn stop(&self) {
        self.running.store(false, Ordering::SeqCst);
        debug!("[{}] stop requested", self.agent_id);
    }

    /// Enqueue an envelope for the message loop; called by the bus
    pub fn deliver(&self, envelope: Envelope) {
        if self.inbox_tx.send(envelope).is_ok() {
            self.queue_depth.fetch_add(1, Ordering::SeqCst);
        } else {
            warn!("[{}] inbox closed, dropping envelope", self.agent_id);
        }
    }

    /// Emit an envelope on the outgoing channel (toward the bus)
    pub fn emit(&self, envelope: Envelope) -> Result<(), AgentError> {
        self.touch();
        self.outgoing_tx
            .send(envelope)
            .map_err(|e| AgentError::Delivery(e.to_string()))
    }

    /// Store a value in the agent's context memory
    pub fn update_context(&self, key: impl Into<String>, value: Value) {
        self.context.lock().unwrap().insert(key.into(), value);
    }

    /// Fetch a value from the agent's context memory
    pub fn get_context(&self, key: &str) -> Option<Value> {
        self.context.lock().unwrap().get(key).cloned()
    }

    /// Drop all context memory
    pub fn clear_context(&self) {
        self.context.lock().unwrap().clear();
    }

    /// Runtime snapshot for status queries and the API layer
    pub fn status(&self) -> AgentStatus {
        let now = Utc::now();
        AgentStatus {
            agent_id: self.agent_id.clone(),
            agent_type: self.kind,
            is_running: self.is_running(),
            messages_processed: self.messages_processed.load(Ordering::SeqCst),
            uptime_seconds: (now - self.started_at).num_milliseconds() as f64 / 1000.0,
            last_activity: *self.last_activity.lock().unwrap(),
            queue_size: self.queue_depth.load(Ordering::SeqCst),
            subscribers: self.subscribers.load(Ordering::SeqCst),
            context_items: self.context.lock().unwrap().len(),
        }
    }

    /// Take the inbox receiver; only the message loop may consume it
    pub(crate) fn take_inbox(&self) -> Option<mpsc::UnboundedReceiver<Envelope>> {
        self.inbox_rx.lock().unwrap().take()
    }

    /// Take the outgoing receiver; the bus consumes it on registration
    pub(crate) fn take_outgoing(&self) -> Option<mpsc::UnboundedReceiver<Envelope>> {
        self.outgoing_rx.lock().unwrap().take()
    }

    /// Record that the bus (or another consumer) subscribed to this agent
    pub(crate) fn add_subscriber(&self) {
        self.subscribers.fetch_add(1, Ordering::SeqCst);
    }

    fn touch(&self) {
        *self.last_activity.lock().unwrap() = Utc::now();
    }

    fn note_dequeued(&self) {
        // Saturating: deliveries and dequeues race benignly around zero
        let _ = self
            .queue_depth
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |d| d.checked_sub(1));
    }

    fn note_processed(&self) {
        self.messages_processed.fetch_add(1, Ordering::SeqCst);
        self.touch();
    }

    /// Flip the running flag on; returns false when already running
    fn mark_started(&self) -> bool {
        !self.running.swap(true, Ordering::SeqCst)
    }
}

/// Handles to an agent's two runtime tasks
///
/// Keeping the join handles makes loop exits (and panics) observable instead
/// of fire-and-forget.
pub struct AgentTasks {
    pub message_loop: Option<JoinHandle<()>>,
    pub background: Option<JoinHandle<()>>,
}

impl AgentTasks {
    fn inactive() -> Self {
        Self {
            message_loop: None,
            background: None,
        }
    }

    /// True when both loops were actually launched
    pub fn is_active(&self) -> bool {
        self.message_loop.is_some() && self.background.is_some()
    }

    /// Abort both tasks without waiting for the loops to observe stop
    pub fn abort(&self) {
        if let Some(handle) = &self.message_loop {
            handle.abort();
        }
        if let Some(handle) = &self.background {
            handle.abort();
        }
    }

    /// Wait for both loops to exit
    pub async fn join(self) {
        if let Some(handle) = self.message_loop {
            let _ = handle.await;
        }
        if let Some(handle) = self.background {
            let _ = handle.await;
        }
    }
}

/// Start an agent's message and background loops
///
/// Idempotent: starting a running agent logs a warning and launches nothing.
/// Returns immediately; the loops run as independent tasks until the agent's
/// running flag is cleared.
pub fn spawn_agent(agent: Arc<dyn Agent>) -> AgentTasks {
    let core = agent.core();
    if !core.mark_started() {
        warn!("Agent {} is already running", core.id());
        return AgentTasks::inactive();
    }

    let Some(inbox) = core.take_inbox() else {
        warn!(
            "Agent {} has no inbox receiver; it was started before",
            core.id()
        );
        core.running.store(false, Ordering::SeqCst);
        return AgentTasks::inactive();
    };

    debug!("Starting agent: {}", core.id());

    let message_loop = tokio::spawn(message_loop(Arc::clone(&agent), inbox));
    let background = tokio::spawn(background_loop(agent));

    AgentTasks {
        message_loop: Some(message_loop),
        background: Some(background),
    }
}

/// Process inbound envelopes strictly in arrival order
async fn message_loop(agent: Arc<dyn Agent>, mut inbox: mpsc::UnboundedReceiver<Envelope>) {
    let agent_id = agent.core().id().to_string();

    while agent.core().is_running() {
        match timeout(INBOX_POLL, inbox.recv()).await {
            // No message within the poll window; re-check the running flag
            Err(_) => continue,
            // All senders dropped; nothing further can arrive
            Ok(None) => break,
            Ok(Some(envelope)) => {
                let core = agent.core();
                core.note_dequeued();
                debug!(
                    "[{}] processing {:?} message {} from {}",
                    agent_id,
                    envelope.kind(),
                    envelope.id,
                    envelope.sender
                );

                let response = agent.process_message(envelope).await;
                core.note_processed();

                if let Some(response) = response {
                    if let Err(e) = core.emit(response) {
                        error!("[{}] failed to forward response: {}", agent_id, e);
                    }
                }
            }
        }
    }

    debug!("[{}] message loop exited", agent_id);
}

/// Drive the agent's background work with fixed backoff on failure
async fn background_loop(agent: Arc<dyn Agent>) {
    let agent_id = agent.core().id().to_string();

    while agent.core().is_running() {
        match agent.background_task().await {
            Ok(()) => tokio::time::sleep(BACKGROUND_PAUSE).await,
            Err(e) => {
                error!("[{}] background task failed: {}", agent_id, e);
                tokio::time::sleep(BACKGROUND_BACKOFF).await;
            }
        }
    }

    debug!("[{}] background loop exited", agent_id);
}
