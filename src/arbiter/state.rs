// src/arbiter/state.rs
//! Arbiter states and tuning

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

pub const DEFAULT_FAILOVER_DELAY_MS: u64 = 5000;
pub const DEFAULT_UNAUTHORIZED_LIMIT: u32 = 2;

/// Where the arbiter is in its start/failover/stop cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ArbiterState {
    /// Never started.
    #[default]
    Idle,
    /// Subscribed to the primary provider, no primary fix yet (or the last
    /// one was followed by an error).
    AwaitingPrimary,
    /// The primary provider is delivering fixes.
    HasPrimaryFix,
    /// The fallback provider is running and its fixes are forwarded.
    FallbackActive,
    /// `stop()` was called. `start()` begins a new session.
    Stopped,
}

impl ArbiterState {
    /// True between `start()` and `stop()`.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            ArbiterState::AwaitingPrimary | ArbiterState::HasPrimaryFix | ArbiterState::FallbackActive
        )
    }
}

impl fmt::Display for ArbiterState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ArbiterState::Idle => "idle",
            ArbiterState::AwaitingPrimary => "awaiting primary",
            ArbiterState::HasPrimaryFix => "has primary fix",
            ArbiterState::FallbackActive => "fallback active",
            ArbiterState::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Whether the session's first accepted fix has been announced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) enum FirstFix {
    #[default]
    Pending,
    Reported,
}

impl FirstFix {
    /// Moves to `Reported`, returning true only on the first call.
    pub(crate) fn report(&mut self) -> bool {
        match self {
            FirstFix::Pending => {
                *self = FirstFix::Reported;
                true
            }
            FirstFix::Reported => false,
        }
    }
}

/// Failover tuning, passed to the arbiter at construction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArbiterConfig {
    /// How long the primary provider gets to produce a fix before the
    /// fallback provider is started.
    pub failover_delay_ms: u64,
    /// Consecutive unauthorized errors after which the primary provider is
    /// dropped for the rest of the session. 0 never drops it.
    pub unauthorized_limit: u32,
}

impl Default for ArbiterConfig {
    fn default() -> Self {
        Self {
            failover_delay_ms: DEFAULT_FAILOVER_DELAY_MS,
            unauthorized_limit: DEFAULT_UNAUTHORIZED_LIMIT,
        }
    }
}

impl ArbiterConfig {
    pub fn failover_delay(&self) -> Duration {
        Duration::from_millis(self.failover_delay_ms)
    }
}
