//! In-memory host used by tests and the scenario runner.
//!
//! Behaves like a plain text field (caret, selection, clipboard) and can be
//! scripted to misbehave per primitive: fail outright, report success without
//! doing anything, do the work but report failure, or answer late.

use crate::{HostError, Keystroke, MutationHost, Primitive};
use async_trait::async_trait;
use core_text::{Encoding, HostIdentity, Offset, OffsetRange, TextSnapshot};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tracing::trace;

/// Scripted misbehaviour for one primitive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fault {
    /// Return this error without touching the buffer.
    Error(HostError),
    /// Report success, change nothing.
    NoEffect,
    /// Do the work, then report a rejection.
    FalseFailure,
    /// Sleep before doing the work normally.
    Delay(Duration),
}

#[derive(Debug, Clone)]
struct Script {
    fault: Fault,
    /// `None` repeats forever.
    remaining: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Gate {
    Apply,
    Skip,
    ApplyThenFail,
}

#[derive(Debug)]
struct State {
    text: String,
    encoding: Encoding,
    anchor: Option<usize>,
    caret: usize,
    clipboard: Option<String>,
    focused: bool,
    requires_focus: bool,
    detached: bool,
    scripts: HashMap<Primitive, Script>,
    calls: Vec<Primitive>,
}

impl State {
    fn selection(&self) -> (usize, usize) {
        match self.anchor {
            Some(a) => (a.min(self.caret), a.max(self.caret)),
            None => (self.caret, self.caret),
        }
    }

    fn scalar_len(&self) -> usize {
        self.text.chars().count()
    }

    fn byte_at(&self, scalar: usize) -> usize {
        self.text
            .char_indices()
            .nth(scalar)
            .map(|(b, _)| b)
            .unwrap_or(self.text.len())
    }

    fn splice(&mut self, start: usize, end: usize, with: &str) {
        let (b0, b1) = (self.byte_at(start), self.byte_at(end));
        self.text.replace_range(b0..b1, with);
        self.caret = start + with.chars().count();
        self.anchor = None;
    }

    fn replace_selection(&mut self, with: &str) {
        let (s, e) = self.selection();
        self.splice(s, e, with);
    }

    fn next_cluster(&self, from: usize) -> usize {
        let snap = TextSnapshot::new(HostIdentity::new("memory"), self.text.as_str());
        let index = snap.index();
        index
            .cluster_at_scalar(index.cluster_floor(from))
            .and_then(|c| index.scalar_at_cluster(c + 1))
            .unwrap_or(from)
    }
}

pub struct MemoryHost {
    identity: HostIdentity,
    state: Mutex<State>,
}

impl std::fmt::Debug for MemoryHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryHost")
            .field("identity", &self.identity)
            .finish()
    }
}

impl MemoryHost {
    /// `encoding` is how this host interprets offsets given to `select_range`.
    pub fn new(identity: impl AsRef<str>, text: impl Into<String>, encoding: Encoding) -> Self {
        Self {
            identity: HostIdentity::new(identity),
            state: Mutex::new(State {
                text: text.into(),
                encoding,
                anchor: None,
                caret: 0,
                clipboard: None,
                focused: false,
                requires_focus: false,
                detached: false,
                scripts: HashMap::new(),
                calls: Vec::new(),
            }),
        }
    }

    fn state(&self) -> Result<MutexGuard<'_, State>, HostError> {
        let st = self.state.lock().map_err(|_| HostError::Unavailable)?;
        if st.detached {
            return Err(HostError::Unavailable);
        }
        Ok(st)
    }

    fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> Option<R> {
        self.state.lock().ok().map(|mut st| f(&mut st))
    }

    pub fn text(&self) -> String {
        self.with_state(|s| s.text.clone()).unwrap_or_default()
    }

    pub fn clipboard(&self) -> Option<String> {
        self.with_state(|s| s.clipboard.clone()).flatten()
    }

    pub fn set_clipboard(&self, text: impl Into<String>) {
        let text = text.into();
        self.with_state(|s| s.clipboard = Some(text));
    }

    /// Current selection in scalars, `None` when collapsed.
    pub fn selection(&self) -> Option<(usize, usize)> {
        self.with_state(|s| s.anchor.map(|_| s.selection())).flatten()
    }

    /// Every primitive invoked so far, in order.
    pub fn calls(&self) -> Vec<Primitive> {
        self.with_state(|s| s.calls.clone()).unwrap_or_default()
    }

    pub fn count_calls(&self, primitive: Primitive) -> usize {
        self.calls().iter().filter(|p| **p == primitive).count()
    }

    /// Apply `fault` to the next call of `primitive` only.
    pub fn script_once(&self, primitive: Primitive, fault: Fault) {
        self.script(primitive, fault, Some(1));
    }

    /// Apply `fault` to every call of `primitive`.
    pub fn script_always(&self, primitive: Primitive, fault: Fault) {
        self.script(primitive, fault, None);
    }

    pub fn script(&self, primitive: Primitive, fault: Fault, times: Option<usize>) {
        self.with_state(|s| {
            s.scripts.insert(
                primitive,
                Script {
                    fault,
                    remaining: times,
                },
            )
        });
    }

    pub fn clear_scripts(&self) {
        self.with_state(|s| s.scripts.clear());
    }

    /// Selection requests fail until `focus` is called.
    pub fn set_requires_focus(&self, requires: bool) {
        self.with_state(|s| s.requires_focus = requires);
    }

    /// Focus moves elsewhere.
    pub fn blur(&self) {
        self.with_state(|s| s.focused = false);
    }

    /// The buffer disappears; every primitive answers `Unavailable`.
    pub fn detach(&self) {
        self.with_state(|s| s.detached = true);
    }

    /// Simulate the user editing the buffer (scalar offsets).
    pub fn edit_externally(&self, start: usize, end: usize, with: &str) {
        self.with_state(|s| {
            let len = s.scalar_len();
            let (start, end) = (start.min(len), end.min(len));
            let (caret, anchor) = (s.caret, s.anchor);
            s.splice(start.min(end), end.max(start), with);
            s.caret = caret.min(s.scalar_len());
            s.anchor = anchor.map(|a| a.min(s.scalar_len()));
        });
    }

    async fn gate(&self, primitive: Primitive) -> Result<Gate, HostError> {
        let fault = {
            let mut st = self.state()?;
            st.calls.push(primitive);
            let mut exhausted = false;
            let fault = st.scripts.get_mut(&primitive).map(|script| {
                if let Some(n) = script.remaining.as_mut() {
                    *n = n.saturating_sub(1);
                    exhausted = *n == 0;
                }
                script.fault.clone()
            });
            if exhausted {
                st.scripts.remove(&primitive);
            }
            fault
        };
        if fault.is_some() {
            trace!(target: "host", primitive = primitive.as_str(), "scripted_fault");
        }
        match fault {
            None => Ok(Gate::Apply),
            Some(Fault::Error(e)) => Err(e),
            Some(Fault::NoEffect) => Ok(Gate::Skip),
            Some(Fault::FalseFailure) => Ok(Gate::ApplyThenFail),
            Some(Fault::Delay(d)) => {
                tokio::time::sleep(d).await;
                Ok(Gate::Apply)
            }
        }
    }
}

fn finish(gate: Gate, primitive: Primitive) -> Result<(), HostError> {
    match gate {
        Gate::ApplyThenFail => Err(HostError::rejected(primitive, "reported failure")),
        _ => Ok(()),
    }
}

#[async_trait]
impl MutationHost for MemoryHost {
    fn identity(&self) -> HostIdentity {
        self.identity.clone()
    }

    async fn focus(&self) -> Result<(), HostError> {
        let gate = self.gate(Primitive::Focus).await?;
        if gate != Gate::Skip {
            self.state()?.focused = true;
        }
        finish(gate, Primitive::Focus)
    }

    async fn locate_element(&self) -> Result<(), HostError> {
        let gate = self.gate(Primitive::LocateElement).await?;
        finish(gate, Primitive::LocateElement)
    }

    async fn read_current_text(&self) -> Result<TextSnapshot, HostError> {
        self.gate(Primitive::ReadCurrentText).await?;
        let st = self.state()?;
        Ok(TextSnapshot::new(self.identity.clone(), st.text.as_str()))
    }

    async fn select_range(&self, range: OffsetRange) -> Result<(), HostError> {
        let p = Primitive::SelectRange;
        let gate = self.gate(p).await?;
        if gate == Gate::Skip {
            return Ok(());
        }
        let mut st = self.state()?;
        if st.requires_focus && !st.focused {
            return Err(HostError::rejected(p, "not focused"));
        }
        if range.encoding() != st.encoding {
            return Err(HostError::rejected(
                p,
                format!("expected {} offsets, got {}", st.encoding, range.encoding()),
            ));
        }
        let snap = TextSnapshot::new(self.identity.clone(), st.text.as_str());
        let scalar = snap
            .convert_range(range, Encoding::UnicodeScalar)
            .map_err(|e| HostError::rejected(p, e.to_string()))?;
        st.anchor = Some(scalar.start().value);
        st.caret = scalar.end().value;
        drop(st);
        finish(gate, p)
    }

    async fn set_selected_text(&self, text: &str) -> Result<(), HostError> {
        let p = Primitive::SetSelectedText;
        let gate = self.gate(p).await?;
        if gate != Gate::Skip {
            self.state()?.replace_selection(text);
        }
        finish(gate, p)
    }

    async fn simulate_keystroke(&self, key: Keystroke) -> Result<(), HostError> {
        let p = Primitive::SimulateKeystroke;
        let gate = self.gate(p).await?;
        if gate == Gate::Skip {
            return Ok(());
        }
        let mut st = self.state()?;
        match key {
            Keystroke::DocumentStart => {
                st.caret = 0;
                st.anchor = None;
            }
            Keystroke::Right => {
                let (_, end) = st.selection();
                st.caret = if st.anchor.is_some() {
                    end
                } else {
                    st.next_cluster(st.caret)
                };
                st.anchor = None;
            }
            Keystroke::ShiftRight => {
                if st.anchor.is_none() {
                    st.anchor = Some(st.caret);
                }
                st.caret = st.next_cluster(st.caret);
            }
            Keystroke::Paste => {
                let Some(clip) = st.clipboard.clone() else {
                    return Err(HostError::rejected(p, "clipboard empty"));
                };
                st.replace_selection(&clip);
            }
        }
        drop(st);
        finish(gate, p)
    }

    async fn inject_characters(&self, text: &str) -> Result<(), HostError> {
        let p = Primitive::InjectCharacters;
        let gate = self.gate(p).await?;
        if gate != Gate::Skip {
            self.state()?.replace_selection(text);
        }
        finish(gate, p)
    }

    async fn read_clipboard(&self) -> Result<Option<String>, HostError> {
        let gate = self.gate(Primitive::ReadClipboard).await?;
        if gate == Gate::Skip {
            return Ok(None);
        }
        Ok(self.state()?.clipboard.clone())
    }

    async fn write_clipboard(&self, text: &str) -> Result<(), HostError> {
        let p = Primitive::WriteClipboard;
        let gate = self.gate(p).await?;
        if gate != Gate::Skip {
            self.state()?.clipboard = Some(text.to_string());
        }
        finish(gate, p)
    }
}

impl MemoryHost {
    /// Offset in this host's encoding for a scalar position of the current text.
    pub fn host_offset(&self, scalar: usize) -> Option<Offset> {
        let (text, encoding) = self.with_state(|s| (s.text.clone(), s.encoding))?;
        TextSnapshot::new(self.identity.clone(), text)
            .convert(Offset::scalar(scalar), encoding)
            .ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn host(text: &str) -> MemoryHost {
        MemoryHost::new("memory", text, Encoding::UnicodeScalar)
    }

    #[tokio::test]
    async fn select_and_set_replaces_range() {
        let h = host("The qick fox");
        h.select_range(OffsetRange::scalar(4, 8).unwrap()).await.unwrap();
        h.set_selected_text("quick").await.unwrap();
        assert_eq!(h.text(), "The quick fox");
        assert_eq!(h.selection(), None);
    }

    #[tokio::test]
    async fn keystrokes_move_by_cluster() {
        let h = host("a🇯🇵b");
        h.simulate_keystroke(Keystroke::DocumentStart).await.unwrap();
        h.simulate_keystroke(Keystroke::Right).await.unwrap();
        h.simulate_keystroke(Keystroke::ShiftRight).await.unwrap();
        assert_eq!(h.selection(), Some((1, 3)));
        h.set_clipboard("!");
        h.simulate_keystroke(Keystroke::Paste).await.unwrap();
        assert_eq!(h.text(), "a!b");
    }

    #[tokio::test]
    async fn utf16_host_rejects_scalar_ranges() {
        let h = MemoryHost::new("web", "😀 hi", Encoding::Utf16Unit);
        let err = h.select_range(OffsetRange::scalar(2, 4).unwrap()).await.unwrap_err();
        assert!(matches!(err, HostError::Rejected { primitive: Primitive::SelectRange, .. }));
        let r = OffsetRange::from_values(3, 5, Encoding::Utf16Unit).unwrap();
        h.select_range(r).await.unwrap();
        assert_eq!(h.selection(), Some((2, 4)));
    }

    #[tokio::test]
    async fn scripted_faults_apply_then_expire() {
        let h = host("abc");
        h.script_once(Primitive::SetSelectedText, Fault::NoEffect);
        h.select_range(OffsetRange::scalar(0, 1).unwrap()).await.unwrap();
        h.set_selected_text("X").await.unwrap();
        assert_eq!(h.text(), "abc");
        h.set_selected_text("X").await.unwrap();
        assert_eq!(h.text(), "Xbc");

        h.script_always(Primitive::SelectRange, Fault::FalseFailure);
        assert!(h.select_range(OffsetRange::scalar(1, 2).unwrap()).await.is_err());
        assert_eq!(h.selection(), Some((1, 2)));
    }

    #[tokio::test]
    async fn focus_requirement_and_detach() {
        let h = host("abc");
        h.set_requires_focus(true);
        assert!(h.select_range(OffsetRange::scalar(0, 1).unwrap()).await.is_err());
        h.focus().await.unwrap();
        h.select_range(OffsetRange::scalar(0, 1).unwrap()).await.unwrap();
        h.detach();
        assert_eq!(h.read_current_text().await.unwrap_err(), HostError::Unavailable);
    }

    #[tokio::test(start_paused = true)]
    async fn delay_fault_sleeps_before_applying() {
        let h = host("abc");
        h.script_once(Primitive::InjectCharacters, Fault::Delay(Duration::from_secs(2)));
        let start = tokio::time::Instant::now();
        h.inject_characters("Z").await.unwrap();
        assert!(start.elapsed() >= Duration::from_secs(2));
        assert_eq!(h.text(), "Zabc");
    }
}
