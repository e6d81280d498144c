//! One-shot "next matching message" registrations.

use crate::error::WaitForError;
use parking_lot::Mutex;
use qqbot_core::{Matcher, MessageEvent, Scope};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tracing::debug;

/// What a registration waits for.
///
/// Each scope may pin an identity; scopes without a filter accept any
/// identity.
#[derive(Debug, Clone)]
pub struct WaitKey {
    filters: BTreeMap<Scope, String>,
    matcher: Matcher,
}

impl WaitKey {
    /// Wait for any message matching `matcher`.
    pub fn new(matcher: impl Into<Matcher>) -> Self {
        Self {
            filters: BTreeMap::new(),
            matcher: matcher.into(),
        }
    }

    /// Require the message's identity in `scope` to equal `identity`.
    pub fn with_filter(mut self, scope: Scope, identity: impl Into<String>) -> Self {
        if scope.has_identity() {
            self.filters.insert(scope, identity.into());
        }
        self
    }

    /// Pin each of `scopes` to the identity `origin` has there.
    ///
    /// Scopes where `origin` has no identity stay unfiltered; see
    /// [`WaitKey::unfiltered`].
    pub fn scoped_to(mut self, scopes: &[Scope], origin: &MessageEvent) -> Self {
        for scope in scopes {
            match origin.identity(*scope) {
                Some(identity) => self = self.with_filter(*scope, identity),
                None if scope.has_identity() => {
                    debug!("Wait-for scope {} left open: origin has no identity there", scope);
                }
                None => {}
            }
        }
        self
    }

    /// Identity filters in force.
    pub fn filters(&self) -> &BTreeMap<Scope, String> {
        &self.filters
    }

    /// Identity-bearing scopes among `scopes` that carry no filter.
    pub fn unfiltered(&self, scopes: &[Scope]) -> Vec<Scope> {
        scopes
            .iter()
            .copied()
            .filter(|scope| scope.has_identity() && !self.filters.contains_key(scope))
            .collect()
    }

    /// Whether `event` satisfies every filter and the matcher.
    pub fn matches(&self, event: &MessageEvent) -> bool {
        self.filters
            .iter()
            .all(|(scope, identity)| event.identity(*scope) == Some(identity.as_str()))
            && self.matcher.matches(&event.content)
    }
}

#[derive(Debug)]
struct Pending {
    id: u64,
    key: WaitKey,
    short_circuit: bool,
    slot: oneshot::Sender<MessageEvent>,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    pending: Vec<Pending>,
}

/// Result of offering a message to the table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FillOutcome {
    /// Registrations filled and removed.
    pub filled: usize,

    /// Whether any filled registration claims the message.
    pub short_circuit: bool,
}

/// Pending wait-for registrations, in registration order.
#[derive(Debug, Clone, Default)]
pub struct WaitForTable {
    inner: Arc<Mutex<Inner>>,
}

impl WaitForTable {
    /// Create an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a registration. When `short_circuit` is set, a message that fills
    /// it is not offered to commands or the fallback handler.
    pub fn register(&self, key: WaitKey, short_circuit: bool) -> WaitRegistration {
        let (tx, rx) = oneshot::channel();
        let mut inner = self.inner.lock();
        inner.next_id += 1;
        let id = inner.next_id;
        inner.pending.push(Pending {
            id,
            key,
            short_circuit,
            slot: tx,
        });

        WaitRegistration {
            id,
            slot: rx,
            table: self.clone(),
        }
    }

    /// Fill and remove every registration `event` satisfies.
    pub fn fill(&self, event: &MessageEvent) -> FillOutcome {
        let matched: Vec<Pending> = {
            let mut inner = self.inner.lock();
            if inner.pending.is_empty() {
                return FillOutcome::default();
            }
            let (matched, kept): (Vec<Pending>, Vec<Pending>) = std::mem::take(&mut inner.pending)
                .into_iter()
                .partition(|p| p.key.matches(event));
            inner.pending = kept;
            matched
        };

        let mut outcome = FillOutcome::default();
        for pending in matched {
            outcome.filled += 1;
            outcome.short_circuit |= pending.short_circuit;
            if pending.slot.send(event.clone()).is_err() {
                debug!("Wait-for {} was abandoned before it was filled", pending.id);
            }
        }
        outcome
    }

    /// Remove a still-pending registration.
    pub fn remove(&self, id: u64) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.pending.len();
        inner.pending.retain(|p| p.id != id);
        inner.pending.len() != before
    }

    /// Drop every registration; their waiters see `NotFound`.
    pub fn clear(&self) {
        self.inner.lock().pending.clear();
    }

    /// Number of pending registrations.
    pub fn len(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Whether nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle to one registration. Dropping it withdraws the registration.
#[derive(Debug)]
pub struct WaitRegistration {
    id: u64,
    slot: oneshot::Receiver<MessageEvent>,
    table: WaitForTable,
}

impl WaitRegistration {
    /// Registration id.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait up to `timeout` for the matching message.
    pub async fn wait(mut self, timeout: Duration) -> Result<MessageEvent, WaitForError> {
        match tokio::time::timeout(timeout, &mut self.slot).await {
            Ok(Ok(event)) => Ok(event),
            Ok(Err(_)) => Err(WaitForError::NotFound),
            Err(_) => {
                if self.table.remove(self.id) {
                    return Err(WaitForError::Timeout(timeout));
                }
                // Filled between the deadline and the removal
                match self.slot.try_recv() {
                    Ok(event) => Ok(event),
                    Err(_) => Err(WaitForError::NotFound),
                }
            }
        }
    }
}

impl Drop for WaitRegistration {
    fn drop(&mut self) {
        self.table.remove(self.id);
    }
}
