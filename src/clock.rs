//! Time sources for expiry checks.
//!
//! Credential stores compare expiry against a [`Clock`] instead of reading the
//! wall clock on every call. [`TickingClock`] caches one timestamp and refreshes
//! it from a background task, so a lookup costs a read lock.

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::time::{interval, MissedTickBehavior};
use tracing::debug;

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Reads the wall clock on every call.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock whose time is updated by a background task on a fixed period.
///
/// The task holds a weak reference and exits once the last `Arc` is dropped.
#[derive(Debug)]
pub struct TickingClock {
    now: RwLock<DateTime<Utc>>,
}

impl TickingClock {
    /// Starts the ticking task. Must be called inside a tokio runtime.
    pub fn start(period: Duration) -> Arc<Self> {
        let clock = Arc::new(Self {
            now: RwLock::new(Utc::now()),
        });
        let weak: Weak<Self> = Arc::downgrade(&clock);

        tokio::spawn(async move {
            let mut ticker = interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

            loop {
                ticker.tick().await;
                match weak.upgrade() {
                    Some(clock) => *clock.now.write() = Utc::now(),
                    None => {
                        debug!("Ticking clock dropped, stopping");
                        break;
                    }
                }
            }
        });

        clock
    }
}

impl Clock for TickingClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}

/// Manually driven clock for deterministic tests and simulations.
#[derive(Debug)]
pub struct ManualClock {
    now: RwLock<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: RwLock::new(start),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.write() = now;
    }

    pub fn advance(&self, by: chrono::Duration) {
        let mut now = self.now.write();
        *now += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read()
    }
}
