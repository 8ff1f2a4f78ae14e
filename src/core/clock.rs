//! core::clock
//!
//! Time source for commit signatures.
//!
//! Operations that stamp commits take a [`Clock`] so tests can pin
//! timestamps; production code uses [`SystemClock`].

use chrono::Local;

use crate::core::types::Signature;

/// A source of the current time as `(epoch seconds, tz offset)`.
pub trait Clock {
    /// The current time and local timezone offset in `+HHMM`/`-HHMM`
    /// form.
    fn now(&self) -> (i64, String);

    /// Stamp an identity into a signature at the current time.
    fn signature(&self, name: &str, email: &str) -> Signature {
        let (timestamp, tz) = self.now();
        // Identity fields come from config and the tz from now(); both
        // uphold Signature's invariants.
        Signature::new(name, email, timestamp, tz).expect("clock produced a valid signature")
    }
}

/// Wall-clock time in the local timezone.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> (i64, String) {
        let now = Local::now();
        let offset = now.offset().local_minus_utc();
        let sign = if offset >= 0 { '+' } else { '-' };
        let offset = offset.abs();
        let tz = format!("{}{:02}{:02}", sign, offset / 3600, (offset % 3600) / 60);
        (now.timestamp(), tz)
    }
}

/// A clock pinned to a fixed instant, for tests.
#[derive(Debug, Clone)]
pub struct FixedClock {
    pub timestamp: i64,
    pub tz: String,
}

impl FixedClock {
    pub fn new(timestamp: i64, tz: impl Into<String>) -> Self {
        Self {
            timestamp,
            tz: tz.into(),
        }
    }
}

impl Clock for FixedClock {
    fn now(&self) -> (i64, String) {
        (self.timestamp, self.tz.clone())
    }
}
