//! Cross-window bridge: direct window-to-window messaging for the popup
//! flavor of collaboration, with a local-storage fallback for children
//! reached through a direct link instead of a popup call.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::{Arc, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info};

use records::{LocalStore, ParticipantId, SharedSession};

use crate::{
    AssistConfig, ChildPort, Result, SessionRegistry, WindowHandle, WindowMessage, WindowSystem,
};

const POPUP_FEATURES: &str = "width=1024,height=768";

fn window_name(code: &str) -> String {
    format!("assist-{code}")
}

fn slot_key(code: &str, language: &str) -> String {
    format!("assist.slot.{code}.{language}")
}

struct TrackedWindow {
    handle: Arc<dyn WindowHandle>,
    watcher: JoinHandle<()>,
}

struct HostInner {
    windows: Mutex<HashMap<String, TrackedWindow>>,
}

/// Opener side of the bridge. Tracks at most one live window per share
/// code and polls each handle for closure, releasing the reference once
/// the user closes the popup.
pub struct BridgeHost {
    system: Arc<dyn WindowSystem>,
    config: AssistConfig,
    inner: Arc<HostInner>,
}

impl BridgeHost {
    pub fn new(system: Arc<dyn WindowSystem>, config: AssistConfig) -> Self {
        Self {
            system,
            config,
            inner: Arc::new(HostInner {
                windows: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Open (or re-open) the assist window for `code`. Any prior window for
    /// the same code is told to close and its handle released first.
    pub fn open_window(&self, code: &str, url: &str) -> Result<Arc<dyn WindowHandle>> {
        let name = window_name(code);
        if let Some(prev) = self.inner.windows.lock().remove(code) {
            debug!(code, "closing previous assist window");
            prev.handle.post(WindowMessage::Close);
            prev.handle.close();
            prev.watcher.abort();
        }

        let handle = self.system.open(url, &name, POPUP_FEATURES)?;

        let watcher = {
            let handle = handle.clone();
            let inner = Arc::downgrade(&self.inner);
            let poll = self.config.window_poll;
            let code = code.to_string();
            tokio::spawn(async move {
                loop {
                    tokio::time::sleep(poll).await;
                    if handle.is_closed() {
                        if let Some(inner) = Weak::upgrade(&inner) {
                            inner.windows.lock().remove(&code);
                        }
                        info!(%code, "assist window closed");
                        break;
                    }
                }
            })
        };

        self.inner.windows.lock().insert(
            code.to_string(),
            TrackedWindow {
                handle: handle.clone(),
                watcher,
            },
        );
        Ok(handle)
    }

    pub fn is_open(&self, code: &str) -> bool {
        self.inner.windows.lock().contains_key(code)
    }

    fn post(&self, code: &str, message: WindowMessage) {
        if let Some(tracked) = self.inner.windows.lock().get(code) {
            tracked.handle.post(message);
        }
    }

    pub fn send_code(&self, code: &str, buffer: &str, language: &str) {
        self.post(
            code,
            WindowMessage::CodeUpdate {
                code: buffer.to_string(),
                language: language.to_string(),
            },
        );
    }

    pub fn send_language(&self, code: &str, language: &str) {
        self.post(
            code,
            WindowMessage::LanguageUpdate {
                language: language.to_string(),
            },
        );
    }

    /// Answer a child's `RequestCode` with the current buffer.
    pub fn respond_code(&self, code: &str, buffer: &str, language: &str) {
        self.post(
            code,
            WindowMessage::CodeResponse {
                code: buffer.to_string(),
                language: language.to_string(),
            },
        );
    }

    pub fn close_window(&self, code: &str) {
        if let Some(tracked) = self.inner.windows.lock().remove(code) {
            tracked.handle.post(WindowMessage::Close);
            tracked.handle.close();
            tracked.watcher.abort();
        }
    }
}

/// Callback invoked with `(buffer, language)` whenever the bridge applies
/// a change from the other side.
pub type ChangeHandler = Arc<dyn Fn(String, String) + Send + Sync>;

/// Child side of the bridge. With an opener it speaks the message pipe;
/// without one (direct link) it degrades to a session+language scoped
/// local-storage slot. Either way it keeps retrying a real registry join
/// and cancels the fallback once one succeeds.
pub struct BridgeChild {
    session_rx: watch::Receiver<Option<SharedSession>>,
    store: Arc<LocalStore>,
    slot: String,
    last_written: Arc<Mutex<Option<String>>>,
    tasks: Vec<JoinHandle<()>>,
}

impl BridgeChild {
    pub fn launch(
        port: Option<ChildPort>,
        registry: Arc<SessionRegistry>,
        store: Arc<LocalStore>,
        identity: ParticipantId,
        share_code: String,
        language: String,
        config: AssistConfig,
        on_change: ChangeHandler,
    ) -> Self {
        let (session_tx, session_rx) = watch::channel(None);
        let slot = slot_key(&share_code, &language);
        let last_written: Arc<Mutex<Option<String>>> = Arc::new(Mutex::new(None));
        let mut tasks = Vec::new();

        match port {
            Some(mut port) => {
                // Launched as a popup: announce readiness, ask for the
                // current buffer, then mirror whatever the opener posts.
                port.post(WindowMessage::Ready);
                port.post(WindowMessage::RequestCode);
                let on_change = on_change.clone();
                let store = store.clone();
                let slot = slot.clone();
                let mut last_code = String::new();
                tasks.push(tokio::spawn(async move {
                    while let Some(message) = port.recv().await {
                        match message {
                            WindowMessage::CodeUpdate { code, language: lang }
                            | WindowMessage::CodeResponse { code, language: lang } => {
                                last_code = code.clone();
                                store.set(&slot, &code);
                                on_change(code, lang);
                            }
                            WindowMessage::LanguageUpdate { language: lang } => {
                                on_change(last_code.clone(), lang);
                            }
                            WindowMessage::Close => {
                                debug!("opener closed the assist window");
                                break;
                            }
                            WindowMessage::Ready | WindowMessage::RequestCode => {}
                        }
                    }
                }));
            }
            None => {
                // Direct link: no opener to talk to. Poll the shared slot so
                // the window is at least locally usable while waiting for a
                // real session.
                let on_change = on_change.clone();
                let store = store.clone();
                let slot = slot.clone();
                let language = language.clone();
                let last_written = last_written.clone();
                let mut session_watch = session_rx.clone();
                let interval = config.poll_interval;
                tasks.push(tokio::spawn(async move {
                    let mut ticker = tokio::time::interval(interval);
                    loop {
                        tokio::select! {
                            _ = ticker.tick() => {
                                let Some(buffer) = store.get::<String>(&slot) else {
                                    continue;
                                };
                                let mut seen = last_written.lock();
                                if seen.as_deref() != Some(buffer.as_str()) {
                                    *seen = Some(buffer.clone());
                                    drop(seen);
                                    on_change(buffer, language.clone());
                                }
                            }
                            changed = session_watch.changed() => {
                                let connected =
                                    changed.is_ok() && session_watch.borrow().is_some();
                                if connected || changed.is_err() {
                                    debug!("local fallback sync cancelled");
                                    break;
                                }
                            }
                        }
                    }
                }));
            }
        }

        // Keep trying to establish a real session regardless of transport;
        // the fallback above stops itself once this lands.
        {
            let retry = config.join_retry;
            tasks.push(tokio::spawn(async move {
                loop {
                    match registry.join(&share_code, identity) {
                        Ok(session) => {
                            info!(code = %share_code, "bridge child joined real session");
                            let _ = session_tx.send(Some(session));
                            break;
                        }
                        Err(err) => {
                            debug!(code = %share_code, %err, "bridge join retry");
                            tokio::time::sleep(retry).await;
                        }
                    }
                }
            }));
        }

        Self {
            session_rx,
            store,
            slot,
            last_written,
            tasks,
        }
    }

    /// Watchable handle on the real session, `Some` once the retry loop
    /// lands.
    pub fn session_watch(&self) -> watch::Receiver<Option<SharedSession>> {
        self.session_rx.clone()
    }

    pub fn session(&self) -> Option<SharedSession> {
        self.session_rx.borrow().clone()
    }

    /// Write a locally made edit into the fallback slot.
    pub fn publish_local(&self, buffer: &str) {
        *self.last_written.lock() = Some(buffer.to_string());
        self.store.set(&self.slot, &buffer.to_string());
    }

    pub fn shutdown(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for BridgeChild {
    fn drop(&mut self) {
        self.shutdown();
    }
}
