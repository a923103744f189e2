// src/arbiter/mod.rs
//! Location-source arbitration
//!
//! The [`Arbiter`] owns one primary and one fallback [`PositionProvider`]
//! and turns their fixes and errors into a single stream of accepted fixes
//! for one [`LocationListener`]:
//!
//! - `start()` subscribes the primary and arms the failover timer.
//! - A primary fix cancels the timer, stops the fallback if it runs and is
//!   forwarded.
//! - A primary error re-arms the timer if none is outstanding. When it
//!   expires without a primary fix the fallback provider is started.
//! - Repeated unauthorized errors drop the primary for the session and fail
//!   over immediately.
//! - `stop()` cancels everything; late events are discarded.
//!
//! All of this runs on whoever owns the arbiter. Providers and the timer only
//! ever talk to it through its queue, see [`Arbiter::dispatch_pending`],
//! [`Arbiter::process_next`] and [`ArbiterHandle`].

pub mod handle;
pub mod listener;
pub mod state;
pub mod timer;

pub use handle::ArbiterHandle;
pub use listener::{ArbiterUpdate, LocationListener};
pub use state::{ArbiterConfig, ArbiterState};
pub use timer::{FailoverTimer, TimerSink, TokioTimer};

use crate::{
    error::Result,
    fix::{Fix, Source},
    provider::{Message, PositionProvider, ProviderError, ProviderEvent, ProviderSink},
};
use state::FirstFix;
use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};
use tracing::{debug, error, info, warn};

struct Slot {
    provider: Box<dyn PositionProvider>,
    subscription: Option<u64>,
}

impl Slot {
    fn new(provider: Box<dyn PositionProvider>) -> Self {
        Self {
            provider,
            subscription: None,
        }
    }
}

/// Failover state machine between a primary and a fallback provider.
pub struct Arbiter {
    config: ArbiterConfig,
    primary: Slot,
    fallback: Slot,
    timer: Box<dyn FailoverTimer>,
    listener: Option<Box<dyn LocationListener>>,
    state: ArbiterState,
    first_fix: FirstFix,
    unauthorized_streak: u32,
    primary_disabled: bool,
    failover_ticket: Option<u64>,
    next_id: u64,
    tx: UnboundedSender<Message>,
    rx: UnboundedReceiver<Message>,
}

impl Arbiter {
    /// Creates an arbiter whose failover timer runs on the current tokio
    /// runtime. Fails when called outside a runtime.
    pub fn new<P, F>(config: ArbiterConfig, primary: P, fallback: F) -> Result<Self>
    where
        P: PositionProvider + 'static,
        F: PositionProvider + 'static,
    {
        Ok(Self::with_timer(config, primary, fallback, TokioTimer::new()?))
    }

    pub fn with_timer<P, F, T>(config: ArbiterConfig, primary: P, fallback: F, timer: T) -> Self
    where
        P: PositionProvider + 'static,
        F: PositionProvider + 'static,
        T: FailoverTimer + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            config,
            primary: Slot::new(Box::new(primary)),
            fallback: Slot::new(Box::new(fallback)),
            timer: Box::new(timer),
            listener: None,
            state: ArbiterState::Idle,
            first_fix: FirstFix::Pending,
            unauthorized_streak: 0,
            primary_disabled: false,
            failover_ticket: None,
            next_id: 0,
            tx,
            rx,
        }
    }

    pub fn state(&self) -> ArbiterState {
        self.state
    }

    pub fn config(&self) -> &ArbiterConfig {
        &self.config
    }

    /// True once repeated unauthorized errors dropped the primary provider
    /// for the current session.
    pub fn is_primary_disabled(&self) -> bool {
        self.primary_disabled
    }

    pub fn is_failover_scheduled(&self) -> bool {
        self.failover_ticket.is_some()
    }

    pub fn is_fallback_running(&self) -> bool {
        self.fallback.subscription.is_some()
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    /// Sets the listener unless one is already registered. Returns whether
    /// `listener` was taken.
    pub fn register_listener<L>(&mut self, listener: L) -> bool
    where
        L: LocationListener + 'static,
    {
        self.register_boxed_listener(Box::new(listener))
    }

    pub fn register_boxed_listener(&mut self, listener: Box<dyn LocationListener>) -> bool {
        if self.listener.is_some() {
            debug!("listener already registered, ignoring new one");
            return false;
        }
        self.listener = Some(listener);
        true
    }

    pub fn unregister_listener(&mut self) {
        self.listener = None;
    }

    /// Starts a new session. Does nothing while already running.
    pub fn start(&mut self) {
        if self.state.is_running() {
            debug!(state = %self.state, "start() while running, ignoring");
            return;
        }

        info!(
            primary = self.primary.provider.name(),
            fallback = self.fallback.provider.name(),
            "starting location updates"
        );
        self.first_fix = FirstFix::Pending;
        self.unauthorized_streak = 0;
        self.primary_disabled = false;
        self.transition(ArbiterState::AwaitingPrimary);

        self.subscribe(Source::Primary);
        self.schedule_failover();
    }

    /// Ends the session: cancels the failover timer, unsubscribes both
    /// providers and clears the listener. Nothing is forwarded afterwards.
    pub fn stop(&mut self) {
        info!(state = %self.state, "stopping location updates");
        self.cancel_failover();
        self.unsubscribe(Source::Primary);
        self.unsubscribe(Source::Fallback);
        self.listener = None;
        self.transition(ArbiterState::Stopped);

        let mut discarded = 0;
        while self.rx.try_recv().is_ok() {
            discarded += 1;
        }
        if discarded > 0 {
            debug!(discarded, "discarded queued provider events");
        }
    }

    /// Handles every message already queued, without waiting. Returns how
    /// many were processed.
    pub fn dispatch_pending(&mut self) -> usize {
        let mut processed = 0;
        while let Ok(message) = self.rx.try_recv() {
            self.handle(message);
            processed += 1;
        }
        processed
    }

    /// Waits for the next provider or timer message and handles it.
    pub async fn process_next(&mut self) {
        let message = self.next_message().await;
        self.handle(message);
    }

    pub(crate) async fn next_message(&mut self) -> Message {
        // The arbiter holds a sender itself, so the queue never closes.
        loop {
            if let Some(message) = self.rx.recv().await {
                return message;
            }
        }
    }

    pub(crate) fn handle(&mut self, message: Message) {
        match message {
            Message::Provider {
                source,
                subscription,
                event,
            } => {
                if self.slot(source).subscription != Some(subscription) {
                    debug!(%source, subscription, "dropping event from ended subscription");
                    return;
                }
                match (source, event) {
                    (Source::Primary, ProviderEvent::Fix(fix)) => self.on_primary_fix(fix),
                    (Source::Primary, ProviderEvent::Error(e)) => self.on_primary_error(e),
                    (Source::Fallback, ProviderEvent::Fix(fix)) => self.on_fallback_fix(fix),
                    (Source::Fallback, ProviderEvent::Error(e)) => {
                        warn!(provider = self.fallback.provider.name(), "{}", e);
                    }
                }
            }
            Message::FailoverElapsed { ticket } => {
                if self.failover_ticket != Some(ticket) {
                    debug!(ticket, "ignoring cancelled failover timer");
                    return;
                }
                self.failover_ticket = None;
                self.on_failover_elapsed();
            }
        }
    }

    fn on_primary_fix(&mut self, fix: Fix) {
        self.unauthorized_streak = 0;
        self.cancel_failover();
        if self.fallback.subscription.is_some() {
            info!("primary provider is back, stopping fallback");
            self.unsubscribe(Source::Fallback);
        }
        self.transition(ArbiterState::HasPrimaryFix);
        self.accept(fix);
    }

    fn on_primary_error(&mut self, error: ProviderError) {
        warn!(provider = self.primary.provider.name(), "{}", error);

        if error.is_unauthorized() {
            self.unauthorized_streak += 1;
        } else {
            self.unauthorized_streak = 0;
        }

        if self.state == ArbiterState::HasPrimaryFix {
            self.transition(ArbiterState::AwaitingPrimary);
        }

        let limit = self.config.unauthorized_limit;
        if limit > 0 && self.unauthorized_streak >= limit {
            warn!(
                provider = self.primary.provider.name(),
                errors = self.unauthorized_streak,
                "primary provider unauthorized, disabling it for this session"
            );
            self.primary_disabled = true;
            self.unsubscribe(Source::Primary);
            self.cancel_failover();
            self.activate_fallback();
            return;
        }

        if self.state != ArbiterState::FallbackActive {
            self.schedule_failover();
        }
    }

    fn on_fallback_fix(&mut self, fix: Fix) {
        if self.state == ArbiterState::FallbackActive {
            self.accept(fix);
        } else {
            debug!(state = %self.state, "ignoring fallback fix");
        }
    }

    fn on_failover_elapsed(&mut self) {
        if self.state == ArbiterState::AwaitingPrimary {
            self.activate_fallback();
        } else {
            debug!(state = %self.state, "failover timer elapsed, nothing to do");
        }
    }

    fn activate_fallback(&mut self) {
        if self.fallback.subscription.is_none() {
            info!(fallback = self.fallback.provider.name(), "falling back");
            if !self.subscribe(Source::Fallback) {
                // try again after another delay
                self.schedule_failover();
                return;
            }
        }
        self.transition(ArbiterState::FallbackActive);
    }

    fn accept(&mut self, fix: Fix) {
        debug!(
            source = %fix.source,
            lat = fix.point.latitude(),
            lon = fix.point.longitude(),
            accuracy_m = fix.accuracy_m,
            "fix accepted"
        );
        let first = self.first_fix.report();
        if let Some(listener) = self.listener.as_mut() {
            listener.on_fix_accepted(&fix);
            if first {
                listener.on_first_fix(true);
            }
        }
    }

    fn transition(&mut self, next: ArbiterState) {
        if self.state != next {
            info!(from = %self.state, to = %next, "arbiter state change");
            self.state = next;
        }
    }

    fn subscribe(&mut self, source: Source) -> bool {
        let subscription = self.next_id();
        let sink = ProviderSink::new(self.tx.clone(), source, subscription);
        let slot = self.slot_mut(source);
        match slot.provider.start(sink) {
            Ok(()) => {
                slot.subscription = Some(subscription);
                true
            }
            Err(e) => {
                error!(provider = slot.provider.name(), %source, "failed to start provider: {}", e);
                false
            }
        }
    }

    fn unsubscribe(&mut self, source: Source) {
        let slot = self.slot_mut(source);
        if slot.subscription.take().is_some() {
            debug!(provider = slot.provider.name(), %source, "stopping provider");
            slot.provider.stop();
        }
    }

    fn schedule_failover(&mut self) {
        if self.failover_ticket.is_some() {
            return;
        }
        let ticket = self.next_id();
        let delay = self.config.failover_delay();
        match self.timer.schedule(delay, TimerSink::new(self.tx.clone(), ticket)) {
            Ok(()) => {
                debug!(delay_ms = self.config.failover_delay_ms, "failover scheduled");
                self.failover_ticket = Some(ticket);
            }
            Err(e) => error!("failed to schedule failover: {}", e),
        }
    }

    fn cancel_failover(&mut self) {
        if self.failover_ticket.take().is_some() {
            self.timer.cancel();
        }
    }

    fn slot(&self, source: Source) -> &Slot {
        match source {
            Source::Primary => &self.primary,
            Source::Fallback => &self.fallback,
        }
    }

    fn slot_mut(&mut self, source: Source) -> &mut Slot {
        match source {
            Source::Primary => &mut self.primary,
            Source::Fallback => &mut self.fallback,
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

impl Drop for Arbiter {
    fn drop(&mut self) {
        self.cancel_failover();
        self.unsubscribe(Source::Primary);
        self.unsubscribe(Source::Fallback);
    }
}
