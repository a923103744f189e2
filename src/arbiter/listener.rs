// src/arbiter/listener.rs
//! Receiving side of the arbiter

use crate::fix::Fix;
use tokio::sync::mpsc::UnboundedSender;

/// Receives the arbiter's unified stream of fixes.
///
/// Provider errors never reach a listener; failover only shows up as a
/// change of source and accuracy.
pub trait LocationListener: Send {
    /// A fix from whichever provider is currently authoritative.
    fn on_fix_accepted(&mut self, fix: &Fix);

    /// Called once per start/stop cycle, right after the first accepted fix.
    fn on_first_fix(&mut self, _is_first_fix: bool) {}
}

/// Listener callbacks as values, for consumers that prefer a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ArbiterUpdate {
    FixAccepted(Fix),
    FirstFix(bool),
}

impl LocationListener for UnboundedSender<ArbiterUpdate> {
    fn on_fix_accepted(&mut self, fix: &Fix) {
        let _ = self.send(ArbiterUpdate::FixAccepted(fix.clone()));
    }

    fn on_first_fix(&mut self, is_first_fix: bool) {
        let _ = self.send(ArbiterUpdate::FirstFix(is_first_fix));
    }
}
