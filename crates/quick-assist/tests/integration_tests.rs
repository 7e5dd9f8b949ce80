//! End-to-end scenarios over the collaboration subsystem: session
//! establishment, debounced propagation, echo suppression, permission
//! gating, and the polling fallback transport.

use quick_assist::*;
use records::{LocalStore, RecordStore};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn fast_config() -> AssistConfig {
    AssistConfig::default()
        .with_debounce(Duration::from_millis(60))
        .with_echo_guard(Duration::from_millis(120))
        .with_poll_interval(Duration::from_millis(20))
}

struct Rig {
    registry: Arc<SessionRegistry>,
    provider: Arc<dyn ChannelProvider>,
    config: AssistConfig,
}

impl Rig {
    fn realtime() -> Self {
        let config = fast_config();
        let store = Arc::new(RecordStore::in_memory());
        let registry = Arc::new(SessionRegistry::new(store.clone(), &config));
        let hub = Arc::new(EventHub::new());
        let provider = Arc::new(RealtimeProvider::new(hub, store, config.clone()));
        Self {
            registry,
            provider,
            config,
        }
    }

    fn polling() -> Self {
        let config = fast_config();
        let store = Arc::new(RecordStore::in_memory());
        let registry = Arc::new(SessionRegistry::new(store, &config));
        let local = Arc::new(LocalStore::in_memory());
        let provider = Arc::new(PollingProvider::new(local, config.clone()));
        Self {
            registry,
            provider,
            config,
        }
    }

    fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            ParticipantId::new(),
            self.registry.clone(),
            self.provider.clone(),
            self.config.clone(),
        )
    }
}

/// Counting handler remembering the last applied event.
struct Recorder {
    fired: AtomicUsize,
    last: parking_lot::Mutex<Option<SyncEvent>>,
}

impl Recorder {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            fired: AtomicUsize::new(0),
            last: parking_lot::Mutex::new(None),
        })
    }

    fn handler(self: Arc<Self>) -> RemoteHandler {
        Arc::new(move |event| {
            self.fired.fetch_add(1, Ordering::SeqCst);
            *self.last.lock() = Some(event);
        })
    }

    fn count(&self) -> usize {
        self.fired.load(Ordering::SeqCst)
    }

    fn last(&self) -> Option<SyncEvent> {
        self.last.lock().clone()
    }
}

async fn settle() {
    tokio::time::sleep(Duration::from_millis(250)).await;
}

#[tokio::test]
async fn host_and_guest_sync_end_to_end() {
    let rig = Rig::realtime();
    let host = rig.orchestrator();
    let guest = rig.orchestrator();

    let hosted = host
        .host(EditSessionId::new(), Permission::Edit)
        .await
        .unwrap();
    assert_eq!(hosted.share_code.len(), 6);
    assert_eq!(host.phase(), Phase::Hosting);

    // The guest types the code in lowercase and still lands in the same
    // session.
    let joined = guest.join(&hosted.share_code.to_lowercase()).await.unwrap();
    assert_eq!(joined.id, hosted.id);
    assert_eq!(guest.phase(), Phase::Guesting);

    let seen = Recorder::new();
    guest.on_remote(seen.clone().handler());

    // Two keystrokes inside one coalescing window: only the latest buffer
    // state goes out, and it arrives exactly once.
    host.notify_local_edit("let x=", "javascript");
    host.notify_local_edit("let x=1;", "javascript");
    settle().await;

    assert_eq!(seen.count(), 1, "debounced edit must arrive exactly once");
    let event = seen.last().unwrap();
    assert_eq!(event.origin, host.identity());
    match event.payload {
        SyncPayload::Edit { ref code, ref language } => {
            assert_eq!(code, "let x=1;");
            assert_eq!(language, "javascript");
        }
        ref other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn ended_sessions_are_not_joinable() {
    let rig = Rig::realtime();
    let host = rig.orchestrator();
    let hosted = host
        .host(EditSessionId::new(), Permission::Edit)
        .await
        .unwrap();

    host.end().unwrap();
    assert_eq!(host.phase(), Phase::Ended);

    let late = rig.orchestrator();
    let err = late.join(&hosted.share_code).await.unwrap_err();
    assert!(matches!(err, AssistError::NotFound(_)));
}

#[tokio::test]
async fn view_only_guests_receive_but_never_publish() {
    let rig = Rig::realtime();
    let host = rig.orchestrator();
    let guest = rig.orchestrator();

    let hosted = host
        .host(EditSessionId::new(), Permission::View)
        .await
        .unwrap();
    guest.join(&hosted.share_code).await.unwrap();

    let host_saw = Recorder::new();
    host.on_remote(host_saw.clone().handler());
    let guest_saw = Recorder::new();
    guest.on_remote(guest_saw.clone().handler());

    // The guest edits locally; the permission gate drops the publish
    // silently.
    guest.notify_local_edit("stolen edit", "javascript");
    settle().await;
    assert_eq!(host_saw.count(), 0, "view-only guest must not publish");

    // Downstream direction still works.
    host.notify_local_edit("let y = 2;", "javascript");
    settle().await;
    assert_eq!(guest_saw.count(), 1);
}

#[tokio::test]
async fn guests_with_edit_permission_publish_back() {
    let rig = Rig::realtime();
    let host = rig.orchestrator();
    let guest = rig.orchestrator();

    let hosted = host
        .host(EditSessionId::new(), Permission::Edit)
        .await
        .unwrap();
    guest.join(&hosted.share_code).await.unwrap();

    let host_saw = Recorder::new();
    host.on_remote(host_saw.clone().handler());

    guest.notify_local_edit("guest wrote this", "javascript");
    settle().await;

    assert_eq!(host_saw.count(), 1);
    assert_eq!(host_saw.last().unwrap().origin, guest.identity());
}

#[tokio::test]
async fn applied_remote_edits_are_not_rebroadcast() {
    let rig = Rig::realtime();
    let host = rig.orchestrator();
    let guest = Arc::new(rig.orchestrator());

    let hosted = host
        .host(EditSessionId::new(), Permission::Edit)
        .await
        .unwrap();
    guest.join(&hosted.share_code).await.unwrap();

    let host_saw = Recorder::new();
    host.on_remote(host_saw.clone().handler());

    // Wire the guest the way the shell does: applying a remote event sets
    // the editor, and the widget's buffer-changed observer fires right
    // back into the orchestrator. Without the echo guard this loops
    // forever between the two peers.
    let guest_editor = Arc::new(MemoryEditor::default());
    {
        let editor = guest_editor.clone();
        let observer = guest.clone();
        guest.on_remote(Arc::new(move |event| {
            if let SyncPayload::Edit { ref code, ref language } = event.payload {
                editor.set_value(code);
                observer.notify_local_edit(code, language);
            }
        }));
    }

    host.notify_local_edit("let x = 1;", "javascript");
    settle().await;
    settle().await;

    assert_eq!(guest_editor.value(), "let x = 1;");
    assert_eq!(
        host_saw.count(),
        0,
        "guest applying a remote edit must not publish it back"
    );
}

#[tokio::test]
async fn polling_transport_syncs_without_a_backend() {
    let rig = Rig::polling();
    let host = rig.orchestrator();
    let guest = rig.orchestrator();

    let hosted = host
        .host(EditSessionId::new(), Permission::Edit)
        .await
        .unwrap();
    guest.join(&hosted.share_code).await.unwrap();

    let seen = Recorder::new();
    guest.on_remote(seen.clone().handler());

    host.notify_local_edit("offline but synced", "python");
    settle().await;

    assert_eq!(seen.count(), 1);
    match seen.last().unwrap().payload {
        SyncPayload::Edit { ref code, .. } => assert_eq!(code, "offline but synced"),
        ref other => panic!("unexpected payload {other:?}"),
    }
}

#[tokio::test]
async fn cursor_events_flow_undebounced() {
    let rig = Rig::realtime();
    let host = rig.orchestrator();
    let guest = rig.orchestrator();

    let hosted = host
        .host(EditSessionId::new(), Permission::Edit)
        .await
        .unwrap();
    guest.join(&hosted.share_code).await.unwrap();

    let seen = Recorder::new();
    guest.on_remote(seen.clone().handler());

    host.notify_cursor(3, 14);
    tokio::time::sleep(Duration::from_millis(50)).await;

    assert_eq!(seen.count(), 1);
    assert!(matches!(
        seen.last().unwrap().payload,
        SyncPayload::Cursor { line: 3, column: 14 }
    ));
}

#[tokio::test]
async fn an_orchestrator_runs_one_session_at_a_time() {
    let rig = Rig::realtime();
    let host = rig.orchestrator();
    host.host(EditSessionId::new(), Permission::Edit)
        .await
        .unwrap();

    let err = host
        .host(EditSessionId::new(), Permission::Edit)
        .await
        .unwrap_err();
    assert!(matches!(err, AssistError::AlreadyActive));

    // Ended is terminal, not a return to idle.
    host.end().unwrap();
    let err = host.join("AB3K9Q").await.unwrap_err();
    assert!(matches!(err, AssistError::AlreadyActive));
}
