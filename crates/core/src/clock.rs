// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Clock abstraction for testable time handling.
//!
//! Everything that stamps a timestamp, measures a stall, or refills a token
//! bucket goes through [`Clock`] so tests can drive time deterministically.

use chrono::{DateTime, Utc};
use std::time::Instant;

/// A clock that provides monotonic and wall-clock time.
pub trait Clock: Clone + Send + Sync + 'static {
    fn now(&self) -> Instant;
    fn utc_now(&self) -> DateTime<Utc>;
}

/// Real system clock
#[derive(Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn utc_now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

#[cfg(any(test, feature = "test-support"))]
mod fake {
    use super::{Clock, DateTime, Instant, Utc};
    use chrono::Duration as ChronoDuration;
    use parking_lot::Mutex;
    use std::sync::Arc;
    use std::time::Duration;

    /// Fake clock for testing with controllable time.
    ///
    /// The monotonic instant and the wall clock advance together.
    #[derive(Clone)]
    pub struct FakeClock {
        inner: Arc<Mutex<FakeClockState>>,
    }

    struct FakeClockState {
        instant: Instant,
        wall: DateTime<Utc>,
    }

    impl FakeClock {
        pub fn new() -> Self {
            Self {
                inner: Arc::new(Mutex::new(FakeClockState {
                    instant: Instant::now(),
                    wall: DateTime::<Utc>::UNIX_EPOCH,
                })),
            }
        }

        /// Advance both clocks by the given duration.
        pub fn advance(&self, duration: Duration) {
            let mut state = self.inner.lock();
            state.instant += duration;
            state.wall += ChronoDuration::from_std(duration).unwrap_or(ChronoDuration::zero());
        }

        /// Set the wall clock to a specific time.
        pub fn set_wall(&self, wall: DateTime<Utc>) {
            self.inner.lock().wall = wall;
        }
    }

    impl Default for FakeClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> Instant {
            self.inner.lock().instant
        }

        fn utc_now(&self) -> DateTime<Utc> {
            self.inner.lock().wall
        }
    }
}

#[cfg(any(test, feature = "test-support"))]
pub use fake::FakeClock;

#[cfg(test)]
#[path = "clock_tests.rs"]
mod tests;
