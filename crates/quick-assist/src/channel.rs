//! The sync channel capability: publish an event into one session's feed,
//! receive everyone else's. Two backing implementations exist — the hosted
//! realtime hub and the local-storage polling loop — selected once at
//! session establishment and never mixed within one session.

use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use records::{ParticipantId, SharedSession, SyncEvent};

use crate::Result;

#[async_trait]
pub trait SyncChannel: Send + Sync {
    /// Append one event to the session's feed. Steady-state delivery
    /// failures are swallowed by implementations; the protocol self-heals
    /// on the next publish.
    async fn publish(&self, event: SyncEvent) -> Result<()>;

    /// Start receiving the session's events, excluding self-originated
    /// ones, for as long as the subscription lives. The sequence is lazy,
    /// unbounded, and not restartable.
    async fn subscribe(&self) -> Result<Subscription>;
}

/// A live subscription. Dropping it, or calling [`Subscription::unsubscribe`],
/// releases the backing task or timer; unsubscribing twice is a no-op.
pub struct Subscription {
    events: mpsc::UnboundedReceiver<SyncEvent>,
    feeder: Option<JoinHandle<()>>,
}

impl Subscription {
    pub(crate) fn new(events: mpsc::UnboundedReceiver<SyncEvent>, feeder: JoinHandle<()>) -> Self {
        Self {
            events,
            feeder: Some(feeder),
        }
    }

    pub async fn next(&mut self) -> Option<SyncEvent> {
        self.events.recv().await
    }

    pub fn unsubscribe(&mut self) {
        if let Some(feeder) = self.feeder.take() {
            feeder.abort();
            self.events.close();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}

/// Chooses the concrete channel for a session. Injected into the
/// orchestrator so transport selection happens exactly once, at
/// establishment time, never per call.
pub trait ChannelProvider: Send + Sync {
    fn channel(&self, session: &SharedSession, local: ParticipantId) -> Arc<dyn SyncChannel>;
}
