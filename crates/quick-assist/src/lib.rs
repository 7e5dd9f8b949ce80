//! Quick Assist: the collaboration and session-sync subsystem of the
//! editor shell. A host shares one buffer under a short code, a single
//! guest joins with view or edit rights, and whole-buffer edits propagate
//! last-writer-wins over one of three transports: the hosted realtime hub,
//! cross-window messaging, or local-storage polling.

use thiserror::Error;

mod bridge;
mod channel;
mod config;
mod editor;
mod identity;
mod orchestrator;
mod polling;
mod realtime;
mod registry;
pub mod share_code;
mod window;

pub use bridge::*;
pub use channel::*;
pub use config::*;
pub use editor::*;
pub use identity::*;
pub use orchestrator::*;
pub use polling::*;
pub use realtime::*;
pub use registry::*;
pub use window::*;

pub use records::{
    EditSessionId, EventId, ParticipantId, Permission, SharedSession, SharedSessionId, SyncEvent,
    SyncPayload,
};

#[derive(Debug, Error)]
pub enum AssistError {
    /// Join referenced a code with no live session behind it. Recoverable:
    /// the user retries with another code.
    #[error("no active session for code {0}")]
    NotFound(String),

    /// A different participant already holds the guest slot.
    #[error("guest slot already taken")]
    SlotTaken,

    /// The backing store is unreachable. Distinct from [`Self::NotFound`]
    /// so the shell can tell "invalid or expired code" from "connection
    /// problem".
    #[error("persistence failure: {0}")]
    Persistence(String),

    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// The window system refused to open a popup.
    #[error("popup blocked for window {0}")]
    PopupBlocked(String),

    #[error("transport failure: {0}")]
    Transport(String),

    /// A session is already being hosted or guested by this orchestrator.
    #[error("collaboration already active")]
    AlreadyActive,
}

impl From<records::StoreError> for AssistError {
    fn from(err: records::StoreError) -> Self {
        match err {
            records::StoreError::NotFound(what) => Self::NotFound(what),
            records::StoreError::Persistence(why) => Self::Persistence(why),
            records::StoreError::Conflict(_) => Self::SlotTaken,
        }
    }
}

pub type Result<T> = std::result::Result<T, AssistError>;
