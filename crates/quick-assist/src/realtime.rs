//! Realtime-backed sync channel: publishes insert into the record store's
//! event log and fan out through a per-session broadcast hub, the same hub
//! the relay server mounts behind its WebSocket endpoint.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tracing::{debug, warn};

use records::{ParticipantId, RecordStore, SharedSession, SharedSessionId, SyncEvent};

use crate::{AssistConfig, ChannelProvider, Result, Subscription, SyncChannel};

const TOPIC_CAPACITY: usize = 256;

/// Per-session broadcast topics. Publish order is the order the hub applies
/// sends, which is what subscribers observe.
pub struct EventHub {
    topics: RwLock<HashMap<SharedSessionId, broadcast::Sender<SyncEvent>>>,
}

impl EventHub {
    pub fn new() -> Self {
        Self {
            topics: RwLock::new(HashMap::new()),
        }
    }

    pub async fn sender(&self, session_id: SharedSessionId) -> broadcast::Sender<SyncEvent> {
        let mut topics = self.topics.write().await;
        topics
            .entry(session_id)
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .clone()
    }

    pub async fn subscribe(&self, session_id: SharedSessionId) -> broadcast::Receiver<SyncEvent> {
        self.sender(session_id).await.subscribe()
    }

    pub async fn drop_topic(&self, session_id: SharedSessionId) {
        self.topics.write().await.remove(&session_id);
    }
}

impl Default for EventHub {
    fn default() -> Self {
        Self::new()
    }
}

pub struct RealtimeChannel {
    hub: Arc<EventHub>,
    store: Arc<RecordStore>,
    session_id: SharedSessionId,
    local: ParticipantId,
    log_cap: usize,
}

impl RealtimeChannel {
    pub fn new(
        hub: Arc<EventHub>,
        store: Arc<RecordStore>,
        session_id: SharedSessionId,
        local: ParticipantId,
        log_cap: usize,
    ) -> Self {
        Self {
            hub,
            store,
            session_id,
            local,
            log_cap,
        }
    }
}

#[async_trait]
impl SyncChannel for RealtimeChannel {
    async fn publish(&self, event: SyncEvent) -> Result<()> {
        self.store.append_sync_event(event.clone(), self.log_cap);
        let sender = self.hub.sender(self.session_id).await;
        // No receivers yet is not a failure; the log already has the event.
        let _ = sender.send(event);
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let mut rx = self.hub.subscribe(self.session_id).await;
        let local = self.local;
        let (tx, events) = mpsc::unbounded_channel();

        let feeder = tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(event) => {
                        if event.origin == local {
                            continue;
                        }
                        if tx.send(event).is_err() {
                            break;
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        // Dropped events are superseded by later ones; keep
                        // consuming and let the feed self-heal.
                        warn!(skipped, "realtime subscriber lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
            debug!("realtime feed closed");
        });

        Ok(Subscription::new(events, feeder))
    }
}

/// Provider wiring sessions to the hosted realtime hub.
pub struct RealtimeProvider {
    hub: Arc<EventHub>,
    store: Arc<RecordStore>,
    config: AssistConfig,
}

impl RealtimeProvider {
    pub fn new(hub: Arc<EventHub>, store: Arc<RecordStore>, config: AssistConfig) -> Self {
        Self { hub, store, config }
    }
}

impl ChannelProvider for RealtimeProvider {
    fn channel(&self, session: &SharedSession, local: ParticipantId) -> Arc<dyn SyncChannel> {
        Arc::new(RealtimeChannel::new(
            self.hub.clone(),
            self.store.clone(),
            session.id,
            local,
            self.config.event_log_cap,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use records::SyncPayload;

    fn edit(code: &str) -> SyncPayload {
        SyncPayload::Edit {
            code: code.to_string(),
            language: "javascript".to_string(),
        }
    }

    #[tokio::test]
    async fn events_reach_other_subscribers_but_never_echo() {
        let hub = Arc::new(EventHub::new());
        let store = Arc::new(RecordStore::in_memory());
        let session_id = SharedSessionId::new();
        let host = ParticipantId::new();
        let guest = ParticipantId::new();

        let host_chan = RealtimeChannel::new(hub.clone(), store.clone(), session_id, host, 50);
        let guest_chan = RealtimeChannel::new(hub, store, session_id, guest, 50);

        let mut host_sub = host_chan.subscribe().await.unwrap();
        let mut guest_sub = guest_chan.subscribe().await.unwrap();

        host_chan
            .publish(SyncEvent::new(session_id, host, edit("let x = 1;")))
            .await
            .unwrap();

        let received = tokio::time::timeout(std::time::Duration::from_millis(200), guest_sub.next())
            .await
            .expect("guest should receive the event")
            .unwrap();
        assert_eq!(received.origin, host);

        // The host's own subscription stays silent.
        let echo = tokio::time::timeout(std::time::Duration::from_millis(100), host_sub.next()).await;
        assert!(echo.is_err(), "self-originated event must be filtered");
    }

    #[tokio::test]
    async fn double_unsubscribe_is_a_no_op() {
        let hub = Arc::new(EventHub::new());
        let store = Arc::new(RecordStore::in_memory());
        let channel = RealtimeChannel::new(
            hub,
            store,
            SharedSessionId::new(),
            ParticipantId::new(),
            50,
        );

        let mut sub = channel.subscribe().await.unwrap();
        sub.unsubscribe();
        sub.unsubscribe();
    }
}
