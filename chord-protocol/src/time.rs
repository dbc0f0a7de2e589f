use core::ops::{Add, AddAssign, Sub};

/// A point on a free-running 32-bit counter ticking at [`NOMINAL_TICK_RATE`].
///
/// The counter wraps roughly every 4.47 minutes; all comparisons between two
/// timestamps therefore go through [`Ticks::delta`], which reinterprets the
/// modular difference as a signed interval of up to ±2^31 ticks.
///
/// [`NOMINAL_TICK_RATE`]: crate::NOMINAL_TICK_RATE
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, derive_more::Display)]
#[display(fmt = "{_0}")]
pub struct Ticks(pub u32);

impl Ticks {
    /// Signed wraparound interval from `earlier` to `self`.
    pub fn delta(&self, earlier: Ticks) -> TickDelta {
        TickDelta(self.0.wrapping_sub(earlier.0) as i32)
    }

    pub fn add_ticks(&self, ticks: u32) -> Ticks {
        Ticks(self.0.wrapping_add(ticks))
    }
}

impl Add<TickDelta> for Ticks {
    type Output = Ticks;

    fn add(self, rhs: TickDelta) -> Ticks {
        Ticks(self.0.wrapping_add_signed(rhs.0))
    }
}

impl AddAssign<TickDelta> for Ticks {
    fn add_assign(&mut self, rhs: TickDelta) {
        *self = *self + rhs;
    }
}

/// A signed interval between two [`Ticks`] values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default, derive_more::Display)]
#[display(fmt = "{_0}")]
pub struct TickDelta(pub i32);

impl TickDelta {
    pub fn abs(&self) -> u32 {
        self.0.unsigned_abs()
    }
}

/// Unsigned Q32.32 fixed-point tick count.
///
/// The whole part lives in the same modular 2^32 tick space as [`Ticks`]; the
/// fraction provides sub-tick resolution. All arithmetic wraps, so a `Phase`
/// can hold both absolute (modular) timestamps and accumulated elapsed time.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default)]
pub struct Phase(u64);

impl Phase {
    pub const ZERO: Phase = Phase(0);
    pub const ONE: Phase = Phase(1 << 32);

    pub const fn from_ticks(ticks: Ticks) -> Phase {
        Phase((ticks.0 as u64) << 32)
    }

    pub const fn from_int(value: u32) -> Phase {
        Phase((value as u64) << 32)
    }

    pub const fn from_raw(raw: u64) -> Phase {
        Phase(raw)
    }

    pub const fn to_raw(self) -> u64 {
        self.0
    }

    /// Whole ticks, truncating the fraction.
    pub const fn whole(self) -> u32 {
        (self.0 >> 32) as u32
    }

    pub const fn whole_ticks(self) -> Ticks {
        Ticks(self.whole())
    }

    pub fn wrapping_add(self, rhs: Phase) -> Phase {
        Phase(self.0.wrapping_add(rhs.0))
    }

    pub fn wrapping_sub(self, rhs: Phase) -> Phase {
        Phase(self.0.wrapping_sub(rhs.0))
    }

    /// Modular difference reinterpreted as a signed Q32.32 interval.
    pub fn delta(self, other: Phase) -> PhaseDelta {
        PhaseDelta(self.0.wrapping_sub(other.0) as i64)
    }

    pub fn add_signed(self, delta: PhaseDelta) -> Phase {
        Phase(self.0.wrapping_add(delta.0 as u64))
    }

    /// Add a float increment expressed in raw Q32.32 units.
    ///
    /// The magnitude is truncated towards zero before the modular add, which
    /// keeps the result exact in the whole part no matter how large the
    /// accumulated phase already is.
    pub fn add_raw_f32(self, inc: f32) -> Phase {
        if inc >= 0.0 {
            Phase(self.0.wrapping_add(inc as u64))
        } else {
            Phase(self.0.wrapping_sub((-inc) as u64))
        }
    }

    /// Value in ticks as a float. Only meaningful for small intervals; the
    /// 24-bit mantissa cannot represent a large phase exactly.
    pub fn to_ticks_f32(self) -> f32 {
        self.0 as f32 / Phase::ONE.0 as f32
    }

    /// Round to the nearest multiple of `step`.
    pub fn round_to_multiple_of(self, step: Phase) -> Phase {
        Phase((self.0.wrapping_add(step.0 / 2)) / step.0 * step.0)
    }

    /// Exact division by an integer.
    pub const fn div_int(self, divisor: u32) -> Phase {
        Phase(self.0 / divisor as u64)
    }
}

impl Add<Phase> for Phase {
    type Output = Phase;

    fn add(self, rhs: Phase) -> Phase {
        self.wrapping_add(rhs)
    }
}

impl AddAssign<Phase> for Phase {
    fn add_assign(&mut self, rhs: Phase) {
        *self = *self + rhs;
    }
}

impl Sub<Phase> for Phase {
    type Output = Phase;

    fn sub(self, rhs: Phase) -> Phase {
        self.wrapping_sub(rhs)
    }
}

/// A signed Q32.32 interval between two [`Phase`] values.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct PhaseDelta(i64);

impl PhaseDelta {
    pub const fn from_raw(raw: i64) -> PhaseDelta {
        PhaseDelta(raw)
    }

    pub const fn to_raw(self) -> i64 {
        self.0
    }

    /// Interval in ticks as a float.
    pub fn to_ticks_f32(self) -> f32 {
        self.0 as f32 / Phase::ONE.0 as f32
    }

    pub const fn abs(self) -> PhaseDelta {
        PhaseDelta(self.0.abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_delta_is_signed_wraparound_difference() {
        assert_eq!(Ticks(100).delta(Ticks(40)), TickDelta(60));
        assert_eq!(Ticks(40).delta(Ticks(100)), TickDelta(-60));

        // across the wrap point
        assert_eq!(Ticks(5).delta(Ticks(u32::MAX - 4)), TickDelta(10));
        assert_eq!(Ticks(u32::MAX - 4).delta(Ticks(5)), TickDelta(-10));
    }

    #[test]
    fn tick_delta_round_trips_through_add() {
        let pairs = [
            (0u32, 0u32),
            (0, u32::MAX),
            (u32::MAX, 0),
            (0x8000_0000, 0x7fff_ffff),
            (12345, 0xfff0_0000),
        ];

        for (a, b) in pairs {
            let (a, b) = (Ticks(a), Ticks(b));
            assert_eq!(a + b.delta(a), b);
        }
    }

    #[test]
    fn phase_from_int_and_whole() {
        assert_eq!(Phase::from_int(7).to_raw(), 7u64 << 32);
        assert_eq!(Phase::from_int(7).whole(), 7);
        assert_eq!(Phase::from_ticks(Ticks(u32::MAX)).whole(), u32::MAX);
    }

    #[test]
    fn phase_whole_of_sum_within_one() {
        let cases = [
            (Phase::from_raw(0x1_8000_0000), Phase::from_raw(0x2_8000_0000)),
            (Phase::from_raw(0x1_0000_0000), Phase::from_raw(0x2_0000_0000)),
            (Phase::from_raw(0x0_ffff_ffff), Phase::from_raw(0x0_0000_0001)),
        ];

        for (x, y) in cases {
            let lo = x.whole() + y.whole();
            let sum = (x + y).whole();
            assert!(lo <= sum && sum <= lo + 1, "{x:?} + {y:?}");
        }
    }

    #[test]
    fn phase_wraps_in_the_whole_part() {
        let near_wrap = Phase::from_ticks(Ticks(u32::MAX));
        let advanced = near_wrap + Phase::from_int(10);
        assert_eq!(advanced.whole(), 9);
    }

    #[test]
    fn phase_delta_signs() {
        let a = Phase::from_int(100);
        let b = Phase::from_int(130);
        assert_eq!(b.delta(a).to_raw(), 30i64 << 32);
        assert_eq!(a.delta(b).to_raw(), -(30i64 << 32));
        assert_eq!(a.add_signed(b.delta(a)), b);
    }

    #[test]
    fn add_raw_f32_truncates_towards_zero() {
        let p = Phase::from_raw(1000);
        assert_eq!(p.add_raw_f32(10.9).to_raw(), 1010);
        assert_eq!(p.add_raw_f32(-10.9).to_raw(), 990);
        assert_eq!(p.add_raw_f32(0.0).to_raw(), 1000);
    }

    #[test]
    fn round_to_multiple_picks_nearest() {
        let step = Phase::from_raw(1000);
        assert_eq!(Phase::from_raw(1499).round_to_multiple_of(step).to_raw(), 1000);
        assert_eq!(Phase::from_raw(1500).round_to_multiple_of(step).to_raw(), 2000);
        assert_eq!(Phase::from_raw(2000).round_to_multiple_of(step).to_raw(), 2000);
    }
}
