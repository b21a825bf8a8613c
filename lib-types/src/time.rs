//! Second-resolution chain time.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, Sub};

/// Seconds since the UNIX epoch. All consensus timestamps are whole seconds;
/// sub-second precision would only invite nondeterminism between peers.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize,
)]
pub struct TimePointSec(pub u32);

impl TimePointSec {
    pub const fn new(secs: u32) -> Self {
        Self(secs)
    }

    pub const fn zero() -> Self {
        Self(0)
    }

    pub const fn secs(self) -> u32 {
        self.0
    }

    pub fn saturating_sub(self, other: TimePointSec) -> u32 {
        self.0.saturating_sub(other.0)
    }
}

impl Add<u32> for TimePointSec {
    type Output = TimePointSec;

    fn add(self, secs: u32) -> TimePointSec {
        TimePointSec(self.0 + secs)
    }
}

impl Sub<u32> for TimePointSec {
    type Output = TimePointSec;

    fn sub(self, secs: u32) -> TimePointSec {
        TimePointSec(self.0 - secs)
    }
}

impl fmt::Display for TimePointSec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}s", self.0)
    }
}
