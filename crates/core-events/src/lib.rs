//! Outbound notifications from a buffer session.
//!
//! Consumers are the analysis collaborator (to schedule its own incremental
//! re-analysis) and UI surfaces (to redraw underlines, close popovers). They
//! register a [`SessionObserver`]; observers must not block, since they run
//! on the session's serialized context.
//!
//! Channel policy: [`ChannelObserver`] forwards into a bounded mpsc channel
//! sized by [`EVENT_CHANNEL_CAP`] with `try_send`. A full or closed channel
//! drops the notification and bumps a failure counter; the session never
//! waits on a slow consumer.

use core_annotations::{Annotation, AnnotationId};
use core_host::Strategy;
use core_text::HostIdentity;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::{self, Receiver, Sender, error::TrySendError};
use tracing::{trace, warn};

pub const EVENT_CHANNEL_CAP: usize = 1024;

/// Terminal status of one replacement request as seen by observers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SettleStatus {
    /// Applied and confirmed by read-back.
    Committed,
    /// Applied; the host offers no read-back so success is assumed.
    UnverifiedSuccess,
    /// Nothing was applied.
    Failed { reason: String },
    /// Cancelled before any mutation was attempted.
    Cancelled,
    /// Finished after the buffer stopped being tracked; result ignored.
    Discarded,
}

impl SettleStatus {
    pub fn applied(&self) -> bool {
        matches!(self, SettleStatus::Committed | SettleStatus::UnverifiedSuccess)
    }
}

impl fmt::Display for SettleStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SettleStatus::Committed => f.write_str("committed"),
            SettleStatus::UnverifiedSuccess => f.write_str("unverified-success"),
            SettleStatus::Failed { reason } => write!(f, "failed: {reason}"),
            SettleStatus::Cancelled => f.write_str("cancelled"),
            SettleStatus::Discarded => f.write_str("discarded"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacementSettled {
    pub buffer: HostIdentity,
    pub annotation: AnnotationId,
    pub status: SettleStatus,
    /// Strategies attempted, in order.
    pub strategies: Vec<Strategy>,
}

/// Owned form of every notification, for channel delivery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionEvent {
    AnnotationsChanged {
        buffer: HostIdentity,
        annotations: Vec<Annotation>,
    },
    ReplacementApplied {
        buffer: HostIdentity,
        annotation: AnnotationId,
        applied_text: String,
    },
    ReplacementSettled(ReplacementSettled),
}

/// Hooks a session calls at well-defined points. All methods default to no-ops.
pub trait SessionObserver: Send + Sync + 'static {
    fn annotations_changed(&self, _buffer: &HostIdentity, _annotations: &[Annotation]) {}
    fn replacement_applied(&self, _buffer: &HostIdentity, _annotation: AnnotationId, _text: &str) {}
    fn replacement_settled(&self, _settled: &ReplacementSettled) {}
}

pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Delivery counters for one observer set.
#[derive(Debug, Default)]
pub struct EventTelemetry {
    /// One per observer per notification, of every kind.
    pub delivered: AtomicU64,
    pub send_failures: AtomicU64,
    pub settled: AtomicU64,
}

impl EventTelemetry {
    pub fn delivered(&self) -> u64 {
        self.delivered.load(Ordering::Relaxed)
    }
    pub fn send_failures(&self) -> u64 {
        self.send_failures.load(Ordering::Relaxed)
    }
    pub fn settled(&self) -> u64 {
        self.settled.load(Ordering::Relaxed)
    }
}

/// Forwards notifications into a bounded channel.
pub struct ChannelObserver {
    tx: Sender<SessionEvent>,
    telemetry: Arc<EventTelemetry>,
}

impl ChannelObserver {
    /// Observer plus the receiving end, using [`EVENT_CHANNEL_CAP`].
    pub fn channel() -> (Self, Receiver<SessionEvent>) {
        Self::with_capacity(EVENT_CHANNEL_CAP)
    }

    pub fn with_capacity(cap: usize) -> (Self, Receiver<SessionEvent>) {
        let (tx, rx) = mpsc::channel(cap.max(1));
        (
            Self {
                tx,
                telemetry: Arc::new(EventTelemetry::default()),
            },
            rx,
        )
    }

    pub fn telemetry(&self) -> Arc<EventTelemetry> {
        self.telemetry.clone()
    }

    fn forward(&self, event: SessionEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {
                self.telemetry.delivered.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.telemetry.send_failures.fetch_add(1, Ordering::Relaxed);
                let reason = match e {
                    TrySendError::Full(_) => "full",
                    TrySendError::Closed(_) => "closed",
                };
                warn!(target: "events", reason, "notification_dropped");
            }
        }
    }
}

impl SessionObserver for ChannelObserver {
    fn annotations_changed(&self, buffer: &HostIdentity, annotations: &[Annotation]) {
        self.forward(SessionEvent::AnnotationsChanged {
            buffer: buffer.clone(),
            annotations: annotations.to_vec(),
        });
    }

    fn replacement_applied(&self, buffer: &HostIdentity, annotation: AnnotationId, text: &str) {
        self.forward(SessionEvent::ReplacementApplied {
            buffer: buffer.clone(),
            annotation,
            applied_text: text.to_string(),
        });
    }

    fn replacement_settled(&self, settled: &ReplacementSettled) {
        self.forward(SessionEvent::ReplacementSettled(settled.clone()));
    }
}

type SettledCallback = Box<dyn Fn(&ReplacementSettled) + Send + Sync>;

/// Fan-out over registered observers and settle callbacks.
#[derive(Default)]
pub struct Observers {
    observers: Vec<Arc<dyn SessionObserver>>,
    settled_callbacks: Vec<SettledCallback>,
    telemetry: EventTelemetry,
}

impl fmt::Debug for Observers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Observers")
            .field("observers", &self.observers.len())
            .field("settled_callbacks", &self.settled_callbacks.len())
            .finish()
    }
}

impl Observers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, observer: Arc<dyn SessionObserver>) {
        self.observers.push(observer);
    }

    /// Run `callback` whenever a replacement reaches a terminal state.
    pub fn on_replacement_settled<F>(&mut self, callback: F)
    where
        F: Fn(&ReplacementSettled) + Send + Sync + 'static,
    {
        self.settled_callbacks.push(Box::new(callback));
    }

    pub fn telemetry(&self) -> &EventTelemetry {
        &self.telemetry
    }

    pub fn annotations_changed(&self, buffer: &HostIdentity, annotations: &[Annotation]) {
        trace!(target: "events", count = annotations.len(), "annotations_changed");
        for o in &self.observers {
            o.annotations_changed(buffer, annotations);
        }
        self.telemetry
            .delivered
            .fetch_add(self.observers.len() as u64, Ordering::Relaxed);
    }

    pub fn replacement_applied(&self, buffer: &HostIdentity, annotation: AnnotationId, text: &str) {
        trace!(target: "events", annotation = annotation.0, len = text.chars().count(), "replacement_applied");
        for o in &self.observers {
            o.replacement_applied(buffer, annotation, text);
        }
        self.telemetry
            .delivered
            .fetch_add(self.observers.len() as u64, Ordering::Relaxed);
    }

    pub fn replacement_settled(&self, settled: &ReplacementSettled) {
        trace!(target: "events", annotation = settled.annotation.0, status = %settled.status, "replacement_settled");
        self.telemetry.settled.fetch_add(1, Ordering::Relaxed);
        for o in &self.observers {
            o.replacement_settled(settled);
        }
        self.telemetry
            .delivered
            .fetch_add(self.observers.len() as u64, Ordering::Relaxed);
        for cb in &self.settled_callbacks {
            cb(settled);
        }
    }
}
