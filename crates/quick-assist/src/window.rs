//! Window system seam for the popup flavor of collaboration: open a named
//! window, post typed messages to it, poll whether it was closed. The
//! in-process [`LocalWindows`] implementation models two windows of the
//! same browser instance and is what the bridge tests drive.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::{AssistError, Result};

/// Messages exchanged between an opener and its child window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum WindowMessage {
    /// Child announces it has loaded and is listening.
    Ready,
    /// Child asks the opener for the current buffer.
    RequestCode,
    CodeUpdate { code: String, language: String },
    LanguageUpdate { language: String },
    CodeResponse { code: String, language: String },
    Close,
}

pub trait WindowHandle: Send + Sync + std::fmt::Debug {
    fn name(&self) -> String;
    fn post(&self, message: WindowMessage);
    fn is_closed(&self) -> bool;
    fn close(&self);
}

pub trait WindowSystem: Send + Sync {
    /// Open a named window. Returns [`AssistError::PopupBlocked`] when the
    /// environment refuses, which callers surface as an actionable message.
    fn open(&self, url: &str, name: &str, features: &str) -> Result<Arc<dyn WindowHandle>>;
}

/// The child window's end of the message pipe.
pub struct ChildPort {
    name: String,
    from_opener: mpsc::UnboundedReceiver<WindowMessage>,
    to_opener: mpsc::UnboundedSender<(String, WindowMessage)>,
}

impl ChildPort {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn post(&self, message: WindowMessage) {
        let _ = self.to_opener.send((self.name.clone(), message));
    }

    pub async fn recv(&mut self) -> Option<WindowMessage> {
        self.from_opener.recv().await
    }
}

struct LocalWindowState {
    to_child: mpsc::UnboundedSender<WindowMessage>,
    closed: Arc<AtomicBool>,
}

/// In-process window system: both "windows" live in this process and talk
/// over channels, exactly like two tabs of one browser instance.
pub struct LocalWindows {
    to_opener: mpsc::UnboundedSender<(String, WindowMessage)>,
    windows: Mutex<HashMap<String, LocalWindowState>>,
    ports: Mutex<HashMap<String, ChildPort>>,
    block_popups: AtomicBool,
}

impl LocalWindows {
    /// Returns the system plus the opener-side inbox carrying
    /// `(window name, message)` pairs posted by children.
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<(String, WindowMessage)>) {
        let (to_opener, opener_inbox) = mpsc::unbounded_channel();
        (
            Arc::new(Self {
                to_opener,
                windows: Mutex::new(HashMap::new()),
                ports: Mutex::new(HashMap::new()),
                block_popups: AtomicBool::new(false),
            }),
            opener_inbox,
        )
    }

    /// Make subsequent `open` calls fail the way a popup blocker would.
    pub fn set_popup_blocked(&self, blocked: bool) {
        self.block_popups.store(blocked, Ordering::SeqCst);
    }

    /// The child page "loads": hand over its end of the pipe. One take per
    /// open.
    pub fn take_port(&self, name: &str) -> Option<ChildPort> {
        self.ports.lock().remove(name)
    }
}

#[derive(Debug)]
struct LocalWindowHandle {
    name: String,
    to_child: mpsc::UnboundedSender<WindowMessage>,
    closed: Arc<AtomicBool>,
}

impl WindowHandle for LocalWindowHandle {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn post(&self, message: WindowMessage) {
        if !self.is_closed() {
            let _ = self.to_child.send(message);
        }
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

impl WindowSystem for LocalWindows {
    fn open(&self, _url: &str, name: &str, _features: &str) -> Result<Arc<dyn WindowHandle>> {
        if self.block_popups.load(Ordering::SeqCst) {
            return Err(AssistError::PopupBlocked(name.to_string()));
        }

        let (to_child, from_opener) = mpsc::unbounded_channel();
        let closed = Arc::new(AtomicBool::new(false));

        self.windows.lock().insert(
            name.to_string(),
            LocalWindowState {
                to_child: to_child.clone(),
                closed: closed.clone(),
            },
        );
        self.ports.lock().insert(
            name.to_string(),
            ChildPort {
                name: name.to_string(),
                from_opener,
                to_opener: self.to_opener.clone(),
            },
        );

        Ok(Arc::new(LocalWindowHandle {
            name: name.to_string(),
            to_child,
            closed,
        }))
    }
}
