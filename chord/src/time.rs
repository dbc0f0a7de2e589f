use std::array;
use std::sync::atomic::{AtomicU32, Ordering};

use nix::sys::time::TimeValLike;
use nix::time::ClockId;

use chord_core::capture::{CaptureChannel, CaptureTimer, MAX_CAPTURE_CHANNELS};
use chord_protocol::time::Ticks;
use chord_protocol::NOMINAL_TICK_RATE;

/// Host stand-in for the free-running 16MHz hardware counter: the raw
/// monotonic clock scaled to ticks. Wraps like the hardware counter does.
#[derive(Clone, Copy, Default)]
pub struct TickClock;

impl TickClock {
    pub fn now(&self) -> Ticks {
        let timespec = nix::time::clock_gettime(ClockId::CLOCK_MONOTONIC_RAW)
            .expect("clock_gettime(CLOCK_MONOTONIC_RAW) failed, are we on Linux?");

        let nanos = timespec.num_nanoseconds() as u128;
        let ticks = nanos * u128::from(NOMINAL_TICK_RATE) / 1_000_000_000;
        Ticks(ticks as u32)
    }
}

/// Software capture registers. Real hardware latches the counter through a
/// peripheral-interconnect route with zero CPU jitter; here the event
/// handler latches on entry, and the scheduling jitter this adds becomes
/// measurement noise the estimator absorbs.
pub struct SoftCaptureTimer {
    clock: TickClock,
    captures: [AtomicU32; MAX_CAPTURE_CHANNELS],
}

impl SoftCaptureTimer {
    pub fn new(clock: TickClock) -> SoftCaptureTimer {
        SoftCaptureTimer {
            clock,
            captures: array::from_fn(|_| AtomicU32::new(0)),
        }
    }

    /// Latch the current counter into a channel's capture register and
    /// return the captured value.
    pub fn latch(&self, channel: CaptureChannel) -> Ticks {
        let now = self.clock.now();
        self.captures[channel.index()].store(now.0, Ordering::Relaxed);
        now
    }
}

impl CaptureTimer for SoftCaptureTimer {
    fn read(&self, channel: CaptureChannel) -> Ticks {
        Ticks(self.captures[channel.index()].load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chord_core::capture::{CaptureRoute, Registry};

    #[test]
    fn clock_is_monotonic_over_short_spans() {
        let clock = TickClock;
        let a = clock.now();
        let b = clock.now();
        assert!(b.delta(a).0 >= 0);
    }

    #[test]
    fn latch_stores_the_captured_value() {
        let mut registry = Registry::new();
        let channel = registry.allocate(CaptureRoute::RadioPacketEnd).unwrap();

        let timer = SoftCaptureTimer::new(TickClock);
        let latched = timer.latch(channel);
        assert_eq!(timer.read(channel), latched);
    }
}
