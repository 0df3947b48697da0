//! The mutation interface consumed by the replacement engine.
//!
//! A host is an externally owned text buffer reachable only through a small
//! set of asynchronous primitives. Concrete hosts implement [`MutationHost`];
//! which primitives a given host actually honors, and in which order the
//! engine should try them, is described separately by a
//! [`profile::StrategyProfile`] so no code branches on host identity strings.

use async_trait::async_trait;
use core_text::{HostIdentity, OffsetRange, TextSnapshot};
use std::fmt;
use thiserror::Error;

pub mod memory;
pub mod profile;

pub use profile::{Capabilities, ProfileError, ProfileRegistry, Strategy, StrategyProfile};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HostError {
    /// The host refused the operation.
    #[error("host rejected {primitive}: {reason}")]
    Rejected { primitive: Primitive, reason: String },
    #[error("host does not support {0}")]
    Unsupported(Primitive),
    #[error("host did not answer {0} in time")]
    Timeout(Primitive),
    /// The buffer is gone (window closed, element destroyed).
    #[error("host buffer unavailable")]
    Unavailable,
}

impl HostError {
    pub fn rejected(primitive: Primitive, reason: impl Into<String>) -> Self {
        HostError::Rejected {
            primitive,
            reason: reason.into(),
        }
    }
}

/// Individual host operations, used for error reporting and fault scripting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Focus,
    LocateElement,
    SelectRange,
    SetSelectedText,
    ReadCurrentText,
    SimulateKeystroke,
    InjectCharacters,
    ReadClipboard,
    WriteClipboard,
}

impl Primitive {
    pub const ALL: [Primitive; 9] = [
        Primitive::Focus,
        Primitive::LocateElement,
        Primitive::SelectRange,
        Primitive::SetSelectedText,
        Primitive::ReadCurrentText,
        Primitive::SimulateKeystroke,
        Primitive::InjectCharacters,
        Primitive::ReadClipboard,
        Primitive::WriteClipboard,
    ];

    /// Inverse of [`Primitive::as_str`].
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|p| p.as_str() == s)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Primitive::Focus => "focus",
            Primitive::LocateElement => "locate_element",
            Primitive::SelectRange => "select_range",
            Primitive::SetSelectedText => "set_selected_text",
            Primitive::ReadCurrentText => "read_current_text",
            Primitive::SimulateKeystroke => "simulate_keystroke",
            Primitive::InjectCharacters => "inject_characters",
            Primitive::ReadClipboard => "read_clipboard",
            Primitive::WriteClipboard => "write_clipboard",
        }
    }
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Synthetic key presses used by keystroke navigation. Arrow keys move by
/// one grapheme cluster, as they do in real text fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keystroke {
    /// Caret to the start of the buffer, selection cleared.
    DocumentStart,
    /// Caret one cluster right, selection cleared.
    Right,
    /// Extend the selection one cluster right.
    ShiftRight,
    /// Paste the clipboard over the selection.
    Paste,
}

/// Operations every host exposes. Offsets passed to [`select_range`] are in
/// the encoding the host's profile declares.
///
/// [`select_range`]: MutationHost::select_range
#[async_trait]
pub trait MutationHost: Send + Sync {
    fn identity(&self) -> HostIdentity;

    async fn focus(&self) -> Result<(), HostError>;

    /// Descend from the focused container to the editable child element.
    async fn locate_element(&self) -> Result<(), HostError> {
        Ok(())
    }

    async fn read_current_text(&self) -> Result<TextSnapshot, HostError>;
    async fn select_range(&self, range: OffsetRange) -> Result<(), HostError>;
    async fn set_selected_text(&self, text: &str) -> Result<(), HostError>;
    async fn simulate_keystroke(&self, key: Keystroke) -> Result<(), HostError>;
    async fn inject_characters(&self, text: &str) -> Result<(), HostError>;
    async fn read_clipboard(&self) -> Result<Option<String>, HostError>;
    async fn write_clipboard(&self, text: &str) -> Result<(), HostError>;
}
