use core::fmt;
use core::time::Duration;

/// Direction and magnitude between two instants, reliably accounting for
/// clock sources that may wrap or otherwise not be strictly monotonic in
/// representation (e.g. a free-running hardware counter).
pub enum TimeDiff {
    Forward(Duration),
    Backward(Duration),
}

/// Monotonic time source. Implementations own whatever representation
/// fits their platform (a cycle counter, a millisecond tick, a `std::time::Instant`)
/// behind the opaque `TInstant` associated type.
pub trait Clock {
    type TInstant: Copy;

    fn current_instant(&self) -> Self::TInstant;

    /// Computes the signed difference `newer - older`.
    fn diff(&self, newer: Self::TInstant, older: Self::TInstant) -> TimeDiff;

    /// Nanoseconds since boot represented by `instant`.
    fn nanos(&self, instant: Self::TInstant) -> u64;

    /// Time elapsed since `earlier`, saturating at zero if the clock
    /// somehow reports `earlier` as being in the future.
    fn elapsed_since(&self, earlier: Self::TInstant) -> Duration {
        match self.diff(self.current_instant(), earlier) {
            TimeDiff::Forward(d) => d,
            TimeDiff::Backward(_) => Duration::ZERO,
        }
    }

    /// Wall-clock-style `MM:SS` formatting of an instant, used to prefix log
    /// lines the way the original firmware's `get_human_ts()` does.
    fn format_mm_ss(&self, instant: Self::TInstant) -> MmSs {
        let total_secs = self.nanos(instant) / 1_000_000_000;
        MmSs {
            minutes: ((total_secs / 60) % 60) as u8,
            seconds: (total_secs % 60) as u8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmSs {
    pub minutes: u8,
    pub seconds: u8,
}

impl fmt::Display for MmSs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.minutes, self.seconds)
    }
}

#[cfg(test)]
mod tests {
    extern crate std;

    use super::*;

    #[derive(Clone, Copy)]
    struct FakeInstant(u64);

    struct FakeClock {
        now_nanos: u64,
    }

    impl Clock for FakeClock {
        type TInstant = FakeInstant;

        fn current_instant(&self) -> Self::TInstant {
            FakeInstant(self.now_nanos)
        }

        fn diff(&self, newer: Self::TInstant, older: Self::TInstant) -> TimeDiff {
            if newer.0 >= older.0 {
                TimeDiff::Forward(Duration::from_nanos(newer.0 - older.0))
            } else {
                TimeDiff::Backward(Duration::from_nanos(older.0 - newer.0))
            }
        }

        fn nanos(&self, instant: Self::TInstant) -> u64 {
            instant.0
        }
    }

    #[test]
    fn elapsed_since_is_monotonic_forward() {
        let clock = FakeClock { now_nanos: 5_000_000_000 };
        let earlier = FakeInstant(1_000_000_000);
        assert_eq!(clock.elapsed_since(earlier), Duration::from_secs(4));
    }

    #[test]
    fn elapsed_since_saturates_at_zero_when_backward() {
        let clock = FakeClock { now_nanos: 1_000_000_000 };
        let future = FakeInstant(5_000_000_000);
        assert_eq!(clock.elapsed_since(future), Duration::ZERO);
    }

    #[test]
    fn format_mm_ss_wraps_past_an_hour() {
        let clock = FakeClock { now_nanos: 0 };
        let instant = FakeInstant(3_725 * 1_000_000_000); // 1h 2m 5s
        assert_eq!(clock.format_mm_ss(instant).to_string(), "02:05");
    }
}
