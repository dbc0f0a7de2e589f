//! Pairing of beacon receptions with local capture timestamps, and the
//! resulting central-clock estimate.
//!
//! Every beacon reception latches the local counter at the radio end-of-packet
//! instant, the same instant the central latched its own counter for the
//! `sync_time` it sends in the *next* beacon. A payload with
//! `sync_seq == previous + 1` therefore proves that its `sync_time` and our
//! previously held capture timestamp both describe the previous beacon's end
//! event, and the pair becomes one estimator observation. Any sequence gap
//! discards the stale capture; the fresh one is always retained.

use chord_protocol::beacon::Beacon;
use chord_protocol::time::{Phase, Ticks};

use crate::sync::estimator::{EstimatorConfig, FreqEstimator, Status};

pub struct SyncTimer {
    est: FreqEstimator,
    /// Capture and payload sequence number of the last received beacon.
    last: Option<LastBeacon>,
}

#[derive(Debug, Clone, Copy)]
struct LastBeacon {
    seq: u8,
    capture: Ticks,
}

impl SyncTimer {
    pub fn new(config: &EstimatorConfig) -> SyncTimer {
        SyncTimer {
            est: FreqEstimator::new(config),
            last: None,
        }
    }

    pub fn status(&self) -> Status {
        self.est.status()
    }

    /// Process a received beacon together with the local counter captured at
    /// its end-of-packet event.
    pub fn receive_beacon(&mut self, beacon: &Beacon, capture: Ticks) {
        if let Some(last) = self.last {
            if beacon.sync_seq == last.seq.wrapping_add(1) {
                let _ = self.est.observe(
                    Phase::from_ticks(last.capture),
                    Phase::from_ticks(beacon.sync_time),
                    0,
                );
            }
        }

        self.last = Some(LastBeacon {
            seq: beacon.sync_seq,
            capture,
        });
    }

    /// Convert a local counter measurement to the corresponding central time.
    /// Returns `None` until the estimator holds a usable state.
    pub fn local_to_central(&self, time: Phase) -> Option<Phase> {
        if self.est.status() == Status::Reset {
            return None;
        }

        let theta = self.est.predict(time);
        Some(time.wrapping_sub(theta))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chord_protocol::beacon::Command;

    fn sync_beacon(sync_seq: u8, sync_time: u32) -> Beacon {
        Beacon {
            sync_seq,
            sync_time: Ticks(sync_time),
            cmd_seq: 0,
            cmd: Command::None,
        }
    }

    #[test]
    fn consecutive_beacons_produce_an_observation() {
        let mut timer = SyncTimer::new(&EstimatorConfig::default());

        // beacon S ends at local L / central C; we capture L now, the central
        // transmits C in beacon S+1
        let local = 0x4000_0000u32;
        let central = 0x1000_0000u32;
        let period = 1_600_000u32;

        timer.receive_beacon(&sync_beacon(0x10, central - period), Ticks(local));
        assert_eq!(timer.status(), Status::Reset);

        timer.receive_beacon(&sync_beacon(0x11, central), Ticks(local + period + 32));
        assert_eq!(timer.status(), Status::Converging);

        // theta latched to L - C, so L converts back to C exactly
        let out = timer.local_to_central(Phase::from_int(local)).unwrap();
        assert_eq!(out, Phase::from_int(central));
    }

    #[test]
    fn sequence_gap_discards_the_stale_pair() {
        let mut timer = SyncTimer::new(&EstimatorConfig::default());

        timer.receive_beacon(&sync_beacon(7, 1000), Ticks(5000));
        // seq 9 does not follow 7: no observation
        timer.receive_beacon(&sync_beacon(9, 2000), Ticks(6000));
        assert_eq!(timer.status(), Status::Reset);

        // but the fresh capture was retained, so seq 10 pairs with it
        timer.receive_beacon(&sync_beacon(10, 3000), Ticks(7000));
        assert_ne!(timer.status(), Status::Reset);
    }

    #[test]
    fn conversion_unavailable_before_first_pair() {
        let timer = SyncTimer::new(&EstimatorConfig::default());
        assert_eq!(timer.local_to_central(Phase::from_int(123)), None);
    }
}
