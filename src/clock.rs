//! Wall-clock time, injectable for tests
//!
//! Probe timestamps come from a `Clock`. Durations such as the start period
//! use `tokio::time::Instant` instead.
//! Production uses `SystemClock`; tests pin time with `FixedClock` or follow
//! tokio's paused clock with `TokioClock`.

use chrono::{DateTime, Utc};

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// `chrono::Utc::now()`
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Always reports the same instant
#[cfg(test)]
pub struct FixedClock(pub DateTime<Utc>);

#[cfg(test)]
impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// Wall time that advances with `tokio::time`, including paused time
#[cfg(test)]
pub struct TokioClock {
    base: DateTime<Utc>,
    origin: tokio::time::Instant,
}

#[cfg(test)]
impl TokioClock {
    pub fn new() -> Self {
        Self {
            base: Utc::now(),
            origin: tokio::time::Instant::now(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::expect_used)]
impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = chrono::Duration::from_std(self.origin.elapsed())
            .expect("test elapsed time fits chrono::Duration");
        self.base + elapsed
    }
}
