//! Polling-backed sync channel: a manual re-implementation of push
//! delivery over shared local storage, used when no backend is reachable.
//! Publish appends to a session-scoped bounded log; receive is a periodic
//! read that forwards unseen foreign events and advances a per-consumer
//! cursor. The poll interval is the staleness bound of this degraded mode;
//! callers only ever see the [`SyncChannel`] interface.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

use records::{EventId, LocalStore, ParticipantId, SharedSession, SharedSessionId, SyncEvent};

use crate::{AssistConfig, ChannelProvider, Result, Subscription, SyncChannel};

pub struct PollingChannel {
    store: Arc<LocalStore>,
    session_id: SharedSessionId,
    local: ParticipantId,
    interval: Duration,
    log_cap: usize,
}

impl PollingChannel {
    pub fn new(
        store: Arc<LocalStore>,
        session_id: SharedSessionId,
        local: ParticipantId,
        interval: Duration,
        log_cap: usize,
    ) -> Self {
        Self {
            store,
            session_id,
            local,
            interval,
            log_cap,
        }
    }
}

#[async_trait]
impl SyncChannel for PollingChannel {
    async fn publish(&self, event: SyncEvent) -> Result<()> {
        self.store.append_event(event, self.log_cap);
        Ok(())
    }

    async fn subscribe(&self) -> Result<Subscription> {
        let store = self.store.clone();
        let session_id = self.session_id;
        let local = self.local;
        let interval = self.interval;
        let (tx, events) = mpsc::unbounded_channel();

        let feeder = tokio::spawn(async move {
            let mut cursor: Option<EventId> = None;
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                for event in store.events_after(session_id, cursor) {
                    // The cursor covers everything read, own events included,
                    // so an echo is never re-examined on a later tick.
                    cursor = Some(event.id);
                    if event.origin == local {
                        continue;
                    }
                    if tx.send(event).is_err() {
                        debug!("polling feed consumer dropped");
                        return;
                    }
                }
            }
        });

        Ok(Subscription::new(events, feeder))
    }
}

/// Provider for local-only deployments with no reachable backend.
pub struct PollingProvider {
    store: Arc<LocalStore>,
    config: AssistConfig,
}

impl PollingProvider {
    pub fn new(store: Arc<LocalStore>, config: AssistConfig) -> Self {
        Self { store, config }
    }
}

impl ChannelProvider for PollingProvider {
    fn channel(&self, session: &SharedSession, local: ParticipantId) -> Arc<dyn SyncChannel> {
        Arc::new(PollingChannel::new(
            self.store.clone(),
            session.id,
            local,
            self.config.poll_interval,
            self.config.event_log_cap,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use records::SyncPayload;
    use std::time::Duration;

    const FAST_POLL: Duration = Duration::from_millis(20);

    fn edit(code: &str) -> SyncPayload {
        SyncPayload::Edit {
            code: code.to_string(),
            language: "javascript".to_string(),
        }
    }

    #[tokio::test]
    async fn polling_delivers_foreign_events_in_log_order() {
        let store = Arc::new(LocalStore::in_memory());
        let session_id = SharedSessionId::new();
        let host = ParticipantId::new();
        let guest = ParticipantId::new();

        let host_chan = PollingChannel::new(store.clone(), session_id, host, FAST_POLL, 50);
        let guest_chan = PollingChannel::new(store, session_id, guest, FAST_POLL, 50);

        let mut sub = guest_chan.subscribe().await.unwrap();

        for version in ["a", "b", "c"] {
            host_chan
                .publish(SyncEvent::new(session_id, host, edit(version)))
                .await
                .unwrap();
        }

        for expected in ["a", "b", "c"] {
            let event = tokio::time::timeout(Duration::from_millis(500), sub.next())
                .await
                .expect("event should arrive within a few ticks")
                .unwrap();
            match event.payload {
                SyncPayload::Edit { ref code, .. } => assert_eq!(code, expected),
                ref other => panic!("unexpected payload {other:?}"),
            }
        }
    }

    #[tokio::test]
    async fn cap_overflow_never_loses_the_latest_event() {
        let store = Arc::new(LocalStore::in_memory());
        let session_id = SharedSessionId::new();
        let host = ParticipantId::new();
        let guest = ParticipantId::new();

        let host_chan = PollingChannel::new(store.clone(), session_id, host, FAST_POLL, 50);
        let guest_chan = PollingChannel::new(store, session_id, guest, FAST_POLL, 50);
        let mut sub = guest_chan.subscribe().await.unwrap();

        // 51 events against a 50-event retention cap: the cap drops the
        // oldest entry, never the newest.
        for i in 0..51 {
            host_chan
                .publish(SyncEvent::new(session_id, host, edit(&format!("v{i}"))))
                .await
                .unwrap();
        }

        let mut latest = None;
        while let Ok(Some(event)) =
            tokio::time::timeout(Duration::from_millis(200), sub.next()).await
        {
            latest = Some(event);
        }
        match latest.expect("subscriber saw events").payload {
            SyncPayload::Edit { ref code, .. } => assert_eq!(code, "v50"),
            ref other => panic!("unexpected payload {other:?}"),
        }
    }

    #[tokio::test]
    async fn own_events_are_skipped_but_advance_the_cursor() {
        let store = Arc::new(LocalStore::in_memory());
        let session_id = SharedSessionId::new();
        let me = ParticipantId::new();

        let chan = PollingChannel::new(store, session_id, me, FAST_POLL, 50);
        let mut sub = chan.subscribe().await.unwrap();

        chan.publish(SyncEvent::new(session_id, me, edit("mine")))
            .await
            .unwrap();

        let echo = tokio::time::timeout(Duration::from_millis(150), sub.next()).await;
        assert!(echo.is_err(), "own events must not come back");
    }
}
