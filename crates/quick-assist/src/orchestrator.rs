//! Collaboration orchestrator: the stateful tie between identity, the
//! registry, and the sync channel. Tracks host/guest role and permission,
//! debounces outgoing edits, suppresses echoes of just-applied remote
//! changes, and exposes one callback-based surface to the editor shell.

use parking_lot::{Mutex, RwLock};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use records::{
    EditSessionId, ParticipantId, Permission, SharedSession, SyncEvent, SyncPayload,
};

use crate::{
    AssistConfig, AssistError, ChannelProvider, EditorSurface, Result, SessionRegistry,
    SyncChannel,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Host,
    Guest,
}

/// Lifecycle of one orchestrator: `Idle` until a session is established,
/// then `Hosting` or `Guesting`, then terminally `Ended`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Hosting,
    Guesting,
    Ended,
}

/// Invoked with every remote event applied to this side.
pub type RemoteHandler = Arc<dyn Fn(SyncEvent) + Send + Sync>;

struct Active {
    role: Role,
    session: SharedSession,
    channel: Arc<dyn SyncChannel>,
    receiver: JoinHandle<()>,
}

struct Inner {
    phase: Mutex<Phase>,
    active: Mutex<Option<Active>>,
    /// Echo guard: local change notifications before this instant are
    /// consequences of an applied remote event, not user edits.
    guard_until: Mutex<Option<Instant>>,
    publish_gen: AtomicU64,
    on_remote: RwLock<Option<RemoteHandler>>,
}

pub struct Orchestrator {
    identity: ParticipantId,
    registry: Arc<SessionRegistry>,
    channels: Arc<dyn ChannelProvider>,
    config: AssistConfig,
    inner: Arc<Inner>,
}

impl Orchestrator {
    pub fn new(
        identity: ParticipantId,
        registry: Arc<SessionRegistry>,
        channels: Arc<dyn ChannelProvider>,
        config: AssistConfig,
    ) -> Self {
        Self {
            identity,
            registry,
            channels,
            config,
            inner: Arc::new(Inner {
                phase: Mutex::new(Phase::Idle),
                active: Mutex::new(None),
                guard_until: Mutex::new(None),
                publish_gen: AtomicU64::new(0),
                on_remote: RwLock::new(None),
            }),
        }
    }

    pub fn identity(&self) -> ParticipantId {
        self.identity
    }

    pub fn phase(&self) -> Phase {
        *self.inner.phase.lock()
    }

    pub fn session(&self) -> Option<SharedSession> {
        self.inner.active.lock().as_ref().map(|a| a.session.clone())
    }

    pub fn role(&self) -> Option<Role> {
        self.inner.active.lock().as_ref().map(|a| a.role)
    }

    pub fn share_code(&self) -> Option<String> {
        self.inner
            .active
            .lock()
            .as_ref()
            .map(|a| a.session.share_code.clone())
    }

    /// Register the shell callback receiving applied remote events.
    pub fn on_remote(&self, handler: RemoteHandler) {
        *self.inner.on_remote.write() = Some(handler);
    }

    /// Convenience wiring: mirror remote buffer changes straight into an
    /// editor surface.
    pub fn mirror_to(&self, editor: Arc<dyn EditorSurface>) {
        self.on_remote(Arc::new(move |event| match event.payload {
            SyncPayload::Edit { ref code, .. }
            | SyncPayload::LanguageChange { ref code, .. } => editor.set_value(code),
            SyncPayload::Cursor { .. } => {}
        }));
    }

    /// Create a session for `owner` and start hosting it.
    pub async fn host(
        &self,
        owner: EditSessionId,
        permission: Permission,
    ) -> Result<SharedSession> {
        self.ensure_idle()?;
        let session = self.registry.create(owner, self.identity, permission)?;
        self.activate(Role::Host, session.clone()).await?;
        Ok(session)
    }

    /// Join the session behind `code` and start guesting it.
    pub async fn join(&self, code: &str) -> Result<SharedSession> {
        self.ensure_idle()?;
        let session = self.registry.join(code, self.identity)?;
        self.activate(Role::Guest, session.clone()).await?;
        Ok(session)
    }

    fn ensure_idle(&self) -> Result<()> {
        match *self.inner.phase.lock() {
            Phase::Idle => Ok(()),
            _ => Err(AssistError::AlreadyActive),
        }
    }

    async fn activate(&self, role: Role, session: SharedSession) -> Result<()> {
        let channel = self.channels.channel(&session, self.identity);
        let mut subscription = channel.subscribe().await?;

        let inner = self.inner.clone();
        let echo_guard = self.config.echo_guard;
        let receiver = tokio::spawn(async move {
            while let Some(event) = subscription.next().await {
                // Raise the guard before the handler touches the editor, so
                // the resulting buffer-changed notification is swallowed
                // instead of re-broadcast.
                *inner.guard_until.lock() = Some(Instant::now() + echo_guard);
                let handler = inner.on_remote.read().clone();
                if let Some(handler) = handler {
                    handler(event);
                }
            }
        });

        *self.inner.active.lock() = Some(Active {
            role,
            session,
            channel,
            receiver,
        });
        *self.inner.phase.lock() = match role {
            Role::Host => Phase::Hosting,
            Role::Guest => Phase::Guesting,
        };
        Ok(())
    }

    fn guard_raised(&self) -> bool {
        self.inner
            .guard_until
            .lock()
            .is_some_and(|until| Instant::now() < until)
    }

    /// May this side publish buffer-mutating events?
    fn may_publish(active: &Active) -> bool {
        active.role == Role::Host || active.session.permission == Permission::Edit
    }

    /// The shell's buffer-changed observer. Debounced: only the latest
    /// buffer state inside the coalescing window is published.
    pub fn notify_local_edit(&self, code: &str, language: &str) {
        let Some((channel, event)) = self.outgoing(
            SyncPayload::Edit {
                code: code.to_string(),
                language: language.to_string(),
            },
            true,
        ) else {
            return;
        };

        let generation = self.inner.publish_gen.fetch_add(1, Ordering::SeqCst) + 1;
        let inner = self.inner.clone();
        let delay = self.config.debounce;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            // A newer edit superseded this one inside the window.
            if inner.publish_gen.load(Ordering::SeqCst) != generation {
                return;
            }
            if let Err(err) = channel.publish(event).await {
                warn!(%err, "edit publish failed");
            }
        });
    }

    /// Language switches republish the full buffer immediately.
    pub fn notify_language_change(&self, code: &str, language: &str) {
        let Some((channel, event)) = self.outgoing(
            SyncPayload::LanguageChange {
                code: code.to_string(),
                language: language.to_string(),
            },
            true,
        ) else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = channel.publish(event).await {
                warn!(%err, "language publish failed");
            }
        });
    }

    /// Cursor movement is presence, not an edit: ungated and undebounced.
    pub fn notify_cursor(&self, line: u32, column: u32) {
        let Some((channel, event)) =
            self.outgoing(SyncPayload::Cursor { line, column }, false)
        else {
            return;
        };
        tokio::spawn(async move {
            if let Err(err) = channel.publish(event).await {
                warn!(%err, "cursor publish failed");
            }
        });
    }

    /// Common outgoing gate: requires an active session; buffer-mutating
    /// payloads additionally pass the permission check and the echo guard.
    fn outgoing(
        &self,
        payload: SyncPayload,
        mutates_buffer: bool,
    ) -> Option<(Arc<dyn SyncChannel>, SyncEvent)> {
        let active = self.inner.active.lock();
        let active = active.as_ref()?;

        if mutates_buffer {
            if !Self::may_publish(active) {
                // Dropped silently by design; view-only guests receive, never send.
                debug!("view-only guest edit dropped");
                return None;
            }
            if self.guard_raised() {
                debug!("echo-guarded local change suppressed");
                return None;
            }
        }

        let event = SyncEvent::new(active.session.id, self.identity, payload);
        Some((active.channel.clone(), event))
    }

    /// Terminal transition. Synchronously invalidates pending debounced
    /// publishes, releases the channel subscription, and — when hosting —
    /// deactivates the session in the registry.
    pub fn end(&self) -> Result<()> {
        let active = self.inner.active.lock().take();
        *self.inner.phase.lock() = Phase::Ended;
        self.inner.publish_gen.fetch_add(1, Ordering::SeqCst);

        if let Some(active) = active {
            // Aborting the receiver drops its subscription, which releases
            // the backing feed task or polling timer.
            active.receiver.abort();
            self.registry.end(active.session.id, active.role == Role::Host)?;
        }
        Ok(())
    }
}

impl Drop for Orchestrator {
    fn drop(&mut self) {
        if let Some(active) = self.inner.active.lock().take() {
            active.receiver.abort();
        }
    }
}
