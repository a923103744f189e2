// src/provider/mod.rs
//! Positioning providers and the channel they report through
//!
//! A provider is anything that can be started with a [`ProviderSink`] and
//! later stopped. Providers run wherever they like (a tokio task, a platform
//! callback thread); the sink marshals every fix and error onto the
//! arbiter's single queue, tagged with the provider slot and subscription it
//! belongs to.

pub mod scripted;

use crate::{
    error::Result,
    fix::{Fix, Source},
    geo::GeoPoint,
};
use chrono::{DateTime, Utc};
use std::fmt;
use tokio::sync::mpsc::UnboundedSender;

pub use scripted::{Scenario, ScriptStep, ScriptedEvent, ScriptedProvider};

/// Errors a provider reports while running. They drive failover and are
/// never passed on to the location listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    /// Transient failure; retried indefinitely.
    Unavailable(String),
    /// Credential or permission failure.
    Unauthorized(String),
}

impl fmt::Display for ProviderError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderError::Unavailable(msg) => write!(f, "provider unavailable: {}", msg),
            ProviderError::Unauthorized(msg) => write!(f, "provider unauthorized: {}", msg),
        }
    }
}

impl std::error::Error for ProviderError {}

impl ProviderError {
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, ProviderError::Unauthorized(_))
    }
}

/// Something a provider reports.
#[derive(Debug, Clone, PartialEq)]
pub enum ProviderEvent {
    Fix(Fix),
    Error(ProviderError),
}

/// Messages processed by the arbiter, in arrival order.
#[derive(Debug)]
pub(crate) enum Message {
    Provider {
        source: Source,
        subscription: u64,
        event: ProviderEvent,
    },
    FailoverElapsed {
        ticket: u64,
    },
}

/// Handle given to a provider on `start`. Cheap to clone and safe to move
/// to other threads. Events sent after the subscription ended are dropped
/// by the arbiter.
#[derive(Debug, Clone)]
pub struct ProviderSink {
    tx: UnboundedSender<Message>,
    source: Source,
    subscription: u64,
}

impl ProviderSink {
    pub(crate) fn new(tx: UnboundedSender<Message>, source: Source, subscription: u64) -> Self {
        Self {
            tx,
            source,
            subscription,
        }
    }

    pub fn source(&self) -> Source {
        self.source
    }

    /// Reports a fix taken now. Returns false once the arbiter is gone.
    pub fn fix(&self, point: GeoPoint, accuracy_m: f64) -> bool {
        self.fix_at(point, accuracy_m, Utc::now())
    }

    pub fn fix_at(&self, point: GeoPoint, accuracy_m: f64, timestamp: DateTime<Utc>) -> bool {
        let fix = Fix::new(point, accuracy_m, self.source, timestamp);
        self.send(ProviderEvent::Fix(fix))
    }

    pub fn error(&self, error: ProviderError) -> bool {
        self.send(ProviderEvent::Error(error))
    }

    pub fn send(&self, event: ProviderEvent) -> bool {
        self.tx
            .send(Message::Provider {
                source: self.source,
                subscription: self.subscription,
                event,
            })
            .is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// A source of position fixes the arbiter can subscribe to.
pub trait PositionProvider: Send {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Begin delivering fixes and errors to `sink`. An error here is
    /// treated like [`ProviderError::Unavailable`].
    fn start(&mut self, sink: ProviderSink) -> Result<()>;

    /// Stop delivering. Must not block; anything already sent is discarded
    /// by the arbiter.
    fn stop(&mut self);
}

impl<P: PositionProvider + ?Sized> PositionProvider for Box<P> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn start(&mut self, sink: ProviderSink) -> Result<()> {
        (**self).start(sink)
    }

    fn stop(&mut self) {
        (**self).stop()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    #[test]
    fn test_sink_tags_source_and_subscription() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink = ProviderSink::new(tx, Source::Fallback, 7);
        assert!(sink.fix(GeoPoint::new(1.0, 2.0).unwrap(), 12.0));

        match rx.try_recv().unwrap() {
            Message::Provider { source, subscription, event: ProviderEvent::Fix(fix) } => {
                assert_eq!(source, Source::Fallback);
                assert_eq!(subscription, 7);
                assert_eq!(fix.source, Source::Fallback);
                assert_eq!(fix.accuracy_m, 12.0);
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_sink_reports_closed_queue() {
        let (tx, rx) = mpsc::unbounded_channel();
        let sink = ProviderSink::new(tx, Source::Primary, 1);
        drop(rx);
        assert!(sink.is_closed());
        assert!(!sink.error(ProviderError::Unavailable("gone".to_string())));
    }
}
