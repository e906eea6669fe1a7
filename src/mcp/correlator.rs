// mcp/correlator -- waiter registry keyed by normalized request id
//! Matches inbound responses to the callers waiting for them.
//!
//! All state lives behind one mutex. Whoever removes a waiter's entry first
//! (a resolving response, the waiter's own timeout, connection close, or the
//! caller dropping its handle) decides the outcome; the loser finds the entry
//! gone. A resolver pushes the response into the waiter's channel *before*
//! releasing the lock, so a timeout that lost the race always finds the
//! response already buffered.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tokio::time::Instant;

use super::error::McpError;
use super::id::{normalize_identifier, IdKey};
use super::protocol::{parse_frame, Inbound, ResponseEnvelope};

/// Why a waiter finished without a response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WaitFailure {
    TimedOut,
    Closed(String),
}

impl fmt::Display for WaitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WaitFailure::TimedOut => write!(f, "timed out"),
            WaitFailure::Closed(reason) => write!(f, "connection closed: {reason}"),
        }
    }
}

type Delivery = Result<ResponseEnvelope, WaitFailure>;

struct Pending {
    ticket: u64,
    tx: oneshot::Sender<Delivery>,
}

#[derive(Default)]
struct Waiters {
    pending: HashMap<IdKey, Pending>,
    /// Set once the connection ends; later registrations are refused.
    closed: Option<String>,
}

type Shared = Arc<Mutex<Waiters>>;

fn lock(shared: &Shared) -> MutexGuard<'_, Waiters> {
    shared.lock().unwrap_or_else(|p| p.into_inner())
}

// ── Correlator ──────────────────────────────────────────────────────────────

pub struct Correlator {
    waiters: Shared,
    next_ticket: AtomicU64,
    dropped: AtomicU64,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            waiters: Arc::new(Mutex::new(Waiters::default())),
            next_ticket: AtomicU64::new(1),
            dropped: AtomicU64::new(0),
        }
    }

    /// Register a waiter for `key` that expires at `deadline`.
    pub fn register(&self, key: IdKey, deadline: Instant) -> Result<Waiter, McpError> {
        let (tx, rx) = oneshot::channel();
        let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);

        let mut waiters = lock(&self.waiters);
        if waiters.closed.is_some() {
            return Err(McpError::Closed);
        }
        if waiters.pending.contains_key(&key) {
            return Err(McpError::DuplicateIdentifier(key.to_string()));
        }
        waiters.pending.insert(key.clone(), Pending { ticket, tx });
        drop(waiters);

        Ok(Waiter {
            key,
            ticket,
            deadline,
            rx,
            waiters: Arc::clone(&self.waiters),
        })
    }

    /// Route one response to its waiter. Returns `false` when nobody is
    /// waiting for it; the envelope is then dropped and counted.
    pub fn dispatch(&self, envelope: ResponseEnvelope) -> bool {
        let Some(key) = normalize_identifier(&envelope.id) else {
            self.drop_unmatched(&envelope, "unusable id");
            return false;
        };
        self.resolve(&key, envelope)
    }

    /// Deliver `response` to the waiter registered under `key`, exactly once.
    pub fn resolve(&self, key: &IdKey, response: ResponseEnvelope) -> bool {
        let mut waiters = lock(&self.waiters);
        match waiters.pending.remove(key) {
            Some(pending) => {
                // Receiver may already be gone if the caller was cancelled.
                let _ = pending.tx.send(Ok(response));
                true
            }
            None => {
                drop(waiters);
                self.drop_unmatched(&response, "no waiter");
                false
            }
        }
    }

    /// Parse one inbound text frame and dispatch it if it is a response.
    pub fn dispatch_frame(&self, frame: &str) {
        match parse_frame(frame) {
            Ok(Inbound::Response(envelope)) => {
                self.dispatch(envelope);
            }
            Ok(Inbound::ServerMessage { method }) => {
                tracing::debug!(method = %method, "MCP: ignoring server-initiated message");
            }
            Err(reason) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("MCP: dropping malformed frame: {}", reason);
            }
        }
    }

    /// Fail every pending waiter and refuse further registrations.
    pub fn close(&self, reason: &str) {
        let drained: Vec<Pending> = {
            let mut waiters = lock(&self.waiters);
            if waiters.closed.is_none() {
                waiters.closed = Some(reason.to_string());
            }
            waiters.pending.drain().map(|(_, p)| p).collect()
        };
        if !drained.is_empty() {
            tracing::warn!(
                "MCP: connection closed ({}), failing {} pending request(s)",
                reason,
                drained.len()
            );
        }
        for pending in drained {
            let _ = pending.tx.send(Err(WaitFailure::Closed(reason.to_string())));
        }
    }

    pub fn is_closed(&self) -> bool {
        lock(&self.waiters).closed.is_some()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.waiters).pending.len()
    }

    /// Responses that arrived with no matching waiter, plus unparsable frames.
    pub fn dropped_responses(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    fn drop_unmatched(&self, envelope: &ResponseEnvelope, why: &str) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        tracing::warn!(id = %envelope.id, "MCP: dropping response ({})", why);
    }
}

// ── Waiter ──────────────────────────────────────────────────────────────────

/// Handle for one outstanding request. Dropping it unregisters the request.
pub struct Waiter {
    key: IdKey,
    ticket: u64,
    deadline: Instant,
    rx: oneshot::Receiver<Delivery>,
    waiters: Shared,
}

impl Waiter {
    pub fn key(&self) -> &IdKey {
        &self.key
    }

    /// Wait for the response or the deadline, whichever comes first.
    pub async fn wait(mut self) -> Result<ResponseEnvelope, WaitFailure> {
        let delivered = tokio::select! {
            delivered = &mut self.rx => Some(delivered),
            _ = tokio::time::sleep_until(self.deadline) => None,
        };

        match delivered {
            Some(Ok(delivery)) => delivery,
            // Sender dropped without a delivery; only happens if the
            // correlator itself went away.
            Some(Err(_)) => Err(WaitFailure::Closed("correlator dropped".to_string())),
            None => {
                if self.unregister() {
                    return Err(WaitFailure::TimedOut);
                }
                // Lost the race: the entry was taken under the lock, so the
                // delivery is already in the channel.
                self.rx.try_recv().unwrap_or(Err(WaitFailure::TimedOut))
            }
        }
    }

    /// Remove this waiter's own entry. `true` if it was still registered.
    fn unregister(&self) -> bool {
        let mut waiters = lock(&self.waiters);
        match waiters.pending.get(&self.key) {
            Some(p) if p.ticket == self.ticket => {
                waiters.pending.remove(&self.key);
                true
            }
            _ => false,
        }
    }
}

impl Drop for Waiter {
    fn drop(&mut self) {
        self.unregister();
    }
}
