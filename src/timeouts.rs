//! Timeout configuration for requests.
//!
//! A timeout is either a single bound on the whole transfer or a
//! `(connect, read)` pair. The transport has no separate read-phase
//! timeout, so a pair is applied as a connect-phase bound plus a total
//! bound of `connect + read`.
//!
//! ```
//! use veneer::Timeout;
//!
//! let t = Timeout::from((2.0, 5.0));
//! assert_eq!(t.connect_ms(), Some(2000));
//! assert_eq!(t.total_ms(), 7000);
//! ```

use std::time::Duration;

/// Request timeout, in one of the two supported shapes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Timeout {
    /// One bound for the whole transfer.
    Total(Duration),
    /// Separate connect and read bounds.
    Split { connect: Duration, read: Duration },
}

impl Default for Timeout {
    /// 30 seconds for the whole transfer.
    fn default() -> Self {
        Self::Total(Duration::from_secs(30))
    }
}

impl Timeout {
    /// Single bound from seconds. Negative or non-finite values become zero.
    pub fn secs(secs: f64) -> Self {
        Self::Total(secs_to_duration(secs))
    }

    /// `(connect, read)` pair from seconds.
    pub fn split(connect: f64, read: f64) -> Self {
        Self::Split {
            connect: secs_to_duration(connect),
            read: secs_to_duration(read),
        }
    }

    /// Connect-phase bound in milliseconds, for the pair form only.
    pub fn connect_ms(&self) -> Option<u64> {
        match self {
            Self::Total(_) => None,
            Self::Split { connect, .. } => Some(duration_ms(*connect)),
        }
    }

    /// Total bound in milliseconds, truncated.
    pub fn total_ms(&self) -> u64 {
        match self {
            Self::Total(total) => duration_ms(*total),
            Self::Split { connect, read } => duration_ms(connect.saturating_add(*read)),
        }
    }
}

impl From<Duration> for Timeout {
    fn from(total: Duration) -> Self {
        Self::Total(total)
    }
}

impl From<f64> for Timeout {
    fn from(secs: f64) -> Self {
        Self::secs(secs)
    }
}

impl From<u64> for Timeout {
    fn from(secs: u64) -> Self {
        Self::Total(Duration::from_secs(secs))
    }
}

impl From<(f64, f64)> for Timeout {
    fn from((connect, read): (f64, f64)) -> Self {
        Self::split(connect, read)
    }
}

impl From<(Duration, Duration)> for Timeout {
    fn from((connect, read): (Duration, Duration)) -> Self {
        Self::Split { connect, read }
    }
}

fn secs_to_duration(secs: f64) -> Duration {
    Duration::try_from_secs_f64(secs).unwrap_or(Duration::ZERO)
}

fn duration_ms(d: Duration) -> u64 {
    u64::try_from(d.as_millis()).unwrap_or(u64::MAX)
}
