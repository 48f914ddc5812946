//! Control-channel wire protocol.
//!
//! JSON-over-WebSocket, one object per text frame, tagged by `event`.
//! Inbound frames that do not match a known variant fail deserialization and
//! are rejected at the boundary.

use serde::{Deserialize, Serialize};

/// Operator -> server events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum OperatorEvent {
    /// Pointer click at page-relative coordinates.
    MouseClick { x: f64, y: f64 },

    /// Text typed into the currently focused element.
    Type { text: String },

    /// A single named key press (e.g. `Enter`, `Tab`).
    Key { key: String },

    /// Navigation request; scheme normalization happens in the router.
    Goto { url: String },

    /// Capture the authenticated session to the artifact file.
    Done {},
}

/// Server -> operator events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "camelCase")]
pub enum ServerEvent {
    /// One compressed frame of the current page, base64-encoded.
    Screenshot { data: String },

    /// Acknowledgment that the session artifact was written.
    Captured { success: bool },

    /// Unrecoverable failure; the channel closes right after this.
    Fatal { message: String },
}

/// A validated operator command, dispatched against the page owned by the
/// connection. Closed set: anything else is rejected at the boundary.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Click { x: f64, y: f64 },
    TypeText { text: String },
    KeyPress { key: String },
    Navigate { url: String },
    FinishCapture,
}

impl From<OperatorEvent> for Command {
    fn from(event: OperatorEvent) -> Self {
        match event {
            OperatorEvent::MouseClick { x, y } => Command::Click { x, y },
            OperatorEvent::Type { text } => Command::TypeText { text },
            OperatorEvent::Key { key } => Command::KeyPress { key },
            OperatorEvent::Goto { url } => Command::Navigate { url },
            OperatorEvent::Done {} => Command::FinishCapture,
        }
    }
}
