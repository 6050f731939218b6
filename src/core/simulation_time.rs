//! A nanosecond-resolution simulated-time type.

use std::fmt;
use std::ops::{Add, AddAssign, Sub, SubAssign};
use std::time::Duration;

/// A point (or duration) in simulated time, counted in nanoseconds.
///
/// `SimulationTime::MAX` is used as the "no bound" sentinel throughout the
/// controller (an unset `endTime`, for instance).
#[derive(Copy, Clone, Eq, PartialEq, PartialOrd, Ord, Hash, Default)]
pub struct SimulationTime(u64);

impl SimulationTime {
    pub const ZERO: SimulationTime = SimulationTime(0);
    pub const MAX: SimulationTime = SimulationTime(u64::MAX);
    pub const NANOSECOND: SimulationTime = SimulationTime(1);
    pub const MICROSECOND: SimulationTime = SimulationTime(1_000);
    pub const MILLISECOND: SimulationTime = SimulationTime(1_000_000);
    pub const SECOND: SimulationTime = SimulationTime(1_000_000_000);

    pub const fn from_nanos(nanos: u64) -> Self {
        SimulationTime(nanos)
    }

    pub const fn from_micros(micros: u64) -> Self {
        SimulationTime(micros.saturating_mul(1_000))
    }

    pub const fn from_millis(millis: u64) -> Self {
        SimulationTime(millis.saturating_mul(1_000_000))
    }

    pub const fn from_secs(secs: u64) -> Self {
        SimulationTime(secs.saturating_mul(1_000_000_000))
    }

    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    pub const fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    pub const fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }

    pub const fn as_secs(self) -> u64 {
        self.0 / 1_000_000_000
    }

    pub const fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 1_000_000_000.0
    }

    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn checked_add(self, rhs: SimulationTime) -> Option<SimulationTime> {
        self.0.checked_add(rhs.0).map(SimulationTime)
    }

    pub fn checked_sub(self, rhs: SimulationTime) -> Option<SimulationTime> {
        self.0.checked_sub(rhs.0).map(SimulationTime)
    }

    pub fn saturating_add(self, rhs: SimulationTime) -> SimulationTime {
        SimulationTime(self.0.saturating_add(rhs.0))
    }

    pub fn saturating_sub(self, rhs: SimulationTime) -> SimulationTime {
        SimulationTime(self.0.saturating_sub(rhs.0))
    }

    pub fn min(self, other: SimulationTime) -> SimulationTime {
        SimulationTime(self.0.min(other.0))
    }

    pub fn max(self, other: SimulationTime) -> SimulationTime {
        SimulationTime(self.0.max(other.0))
    }
}

impl fmt::Debug for SimulationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

impl fmt::Display for SimulationTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}ns", self.0)
    }
}

impl Add for SimulationTime {
    type Output = SimulationTime;
    fn add(self, rhs: SimulationTime) -> SimulationTime {
        SimulationTime(self.0 + rhs.0)
    }
}

impl AddAssign for SimulationTime {
    fn add_assign(&mut self, rhs: SimulationTime) {
        self.0 += rhs.0;
    }
}

impl Sub for SimulationTime {
    type Output = SimulationTime;
    fn sub(self, rhs: SimulationTime) -> SimulationTime {
        SimulationTime(self.0 - rhs.0)
    }
}

impl SubAssign for SimulationTime {
    fn sub_assign(&mut self, rhs: SimulationTime) {
        self.0 -= rhs.0;
    }
}

impl TryFrom<Duration> for SimulationTime {
    type Error = anyhow::Error;

    fn try_from(d: Duration) -> Result<Self, Self::Error> {
        let nanos = d.as_nanos();
        if nanos > u64::MAX as u128 {
            anyhow::bail!("duration {d:?} is too large to represent as SimulationTime");
        }
        Ok(SimulationTime(nanos as u64))
    }
}

impl From<SimulationTime> for Duration {
    fn from(t: SimulationTime) -> Duration {
        Duration::from_nanos(t.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constructs_from_units() {
        assert_eq!(SimulationTime::from_millis(10).as_nanos(), 10_000_000);
        assert_eq!(SimulationTime::from_secs(1).as_millis(), 1_000);
    }

    #[test]
    fn arithmetic_is_exact() {
        let a = SimulationTime::from_millis(5);
        let b = SimulationTime::from_millis(10);
        assert_eq!(a + b, SimulationTime::from_millis(15));
        assert_eq!(b - a, SimulationTime::from_millis(5));
    }

    #[test]
    fn saturating_sub_floors_at_zero() {
        let a = SimulationTime::from_millis(5);
        let b = SimulationTime::from_millis(10);
        assert_eq!(a.saturating_sub(b), SimulationTime::ZERO);
    }

    #[test]
    fn duration_round_trips() {
        let t = SimulationTime::from_millis(250);
        let d: Duration = t.into();
        assert_eq!(d, Duration::from_millis(250));
        assert_eq!(SimulationTime::try_from(d).unwrap(), t);
    }

    #[test]
    fn max_is_the_no_bound_sentinel() {
        assert!(SimulationTime::MAX > SimulationTime::from_secs(1_000_000));
    }
}
