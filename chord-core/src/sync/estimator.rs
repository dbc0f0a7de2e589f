//! Two-state Kalman filter estimating the offset of one free-running counter
//! against another.
//!
//! State is `[theta, f]`: `theta` is the phase offset (local minus reference,
//! Q32.32 ticks) and `f` the fractional frequency error of the local counter.
//! Internally the float arithmetic runs in raw Q32.32 units, so `f` is stored
//! scaled by 2^32; [`EstimatorState::fractional_error`] undoes the scaling.
//!
//! Observations are pairs of timestamps of the same physical event in both
//! counter domains. Between observations the phase advances by
//! `dt * (f + k_u * input)`, where `input` is the trim step the caller
//! applied to its oscillator after the previous observation.

use chord_protocol::time::Phase;
use chord_protocol::{TickRate, NOMINAL_TICK_RATE};

#[derive(Debug, Clone, Copy)]
pub struct EstimatorConfig {
    /// Nominal frequency of the timer (ticks/sec).
    pub nominal_freq: TickRate,
    /// Fractional frequency change per unit of control input.
    pub k_u: f32,
    /// Phase variance per sec^2 (dimensionless).
    pub q_theta: f32,
    /// Frequency ratio variance per sec^2 (1/s^2).
    pub q_f: f32,
    /// Phase measurement variance (s^2).
    pub r: f32,
    /// Initial variance of both states.
    pub p0: f32,
    /// Normalized innovation magnitude beyond which an observation counts as
    /// an outlier.
    pub outlier_threshold: f32,
    /// Consecutive outliers that force a full reset.
    pub outlier_resync_count: u32,
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig {
            nominal_freq: NOMINAL_TICK_RATE,
            k_u: 0.0,
            q_theta: 0.0,
            q_f: 256.0,
            r: 390625.0,
            p0: 1e6,
            outlier_threshold: 20.0,
            outlier_resync_count: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    /// No usable state; the next observation reinitializes the filter.
    Reset,
    /// Initialized but no measurement correction has run yet.
    Converging,
    Converged,
}

/// Outcome of a single observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use]
pub enum Observation {
    /// The filter reinitialized from this observation.
    Init,
    /// Predict and correct both ran.
    Corrected,
    /// Innovation exceeded the outlier threshold; the correction step was
    /// skipped and the prediction kept.
    Outlier,
    /// Too many consecutive outliers; the filter reset itself.
    Resync,
}

#[derive(Debug, Clone, Copy)]
pub struct EstimatorState {
    pub status: Status,
    /// Phase offset, local minus reference.
    pub theta: Phase,
    /// Frequency error in raw units (ticks/tick scaled by 2^32).
    pub f: f32,
}

impl EstimatorState {
    /// Frequency error as a dimensionless fraction.
    pub fn fractional_error(&self) -> f32 {
        self.f / Phase::ONE.to_raw() as f32
    }
}

pub struct FreqEstimator {
    // parameters, scaled into raw tick units
    k_u: f32,
    q_theta: f32,
    q_f: f32,
    r: f32,
    outlier_threshold: f32,
    outlier_resync_count: u32,

    status: Status,
    theta: Phase,
    f: f32,
    last_time: Phase,
    p: [[f32; 2]; 2],
    outliers: u32,
}

impl FreqEstimator {
    pub fn new(config: &EstimatorConfig) -> FreqEstimator {
        let nominal_freq_2 = config.nominal_freq.0 as f32 * config.nominal_freq.0 as f32;

        FreqEstimator {
            // Scale input gain to match frequency units.
            k_u: config.k_u * Phase::ONE.to_raw() as f32,
            // Both numerator and denominator of q_theta need scaling, so they
            // cancel out.
            q_theta: config.q_theta,
            q_f: config.q_f / nominal_freq_2,
            r: config.r * nominal_freq_2,
            outlier_threshold: config.outlier_threshold,
            outlier_resync_count: config.outlier_resync_count,

            status: Status::Reset,
            theta: Phase::ZERO,
            f: 0.0,
            last_time: Phase::ZERO,
            p: [[config.p0, 0.0], [0.0, config.p0]],
            outliers: 0,
        }
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn state(&self) -> EstimatorState {
        EstimatorState {
            status: self.status,
            theta: self.theta,
            f: self.f,
        }
    }

    pub fn covariance(&self) -> [[f32; 2]; 2] {
        self.p
    }

    /// Predicted phase offset at local time `time`. Pure function of state.
    pub fn predict(&self, time: Phase) -> Phase {
        let dt = time.delta(self.last_time).to_ticks_f32();
        self.theta.add_raw_f32(dt * self.f)
    }

    /// Fold in one timestamp pair. `input` is the control step applied after
    /// the previous observation.
    pub fn observe(&mut self, local_time: Phase, ref_time: Phase, input: i16) -> Observation {
        let z = local_time.wrapping_sub(ref_time);

        if self.status == Status::Reset {
            self.theta = z;
            self.f = 0.0;
            self.last_time = local_time;
            self.outliers = 0;
            self.status = Status::Converging;
            return Observation::Init;
        }

        let dt = local_time.wrapping_sub(self.last_time).to_ticks_f32();
        self.last_time = local_time;

        let scaled_input = f32::from(input) * self.k_u;
        self.theta = self.theta.add_raw_f32(dt * (self.f + scaled_input));
        self.f += scaled_input;

        let dt_p11 = dt * self.p[1][1];
        self.p[0][0] += dt * (dt * self.q_theta + self.p[0][1] + self.p[1][0] + dt_p11);
        self.p[0][1] += dt_p11;
        self.p[1][0] += dt_p11;
        self.p[1][1] += dt * dt * self.q_f;

        let p00_r = self.p[0][0] + self.r;
        let theta_error = z.delta(self.theta).to_raw() as f32;

        if theta_error.abs() / p00_r.sqrt() > self.outlier_threshold {
            self.outliers += 1;
            if self.outliers >= self.outlier_resync_count {
                log::warn!("estimator: outlier run of {}, resetting", self.outliers);
                self.status = Status::Reset;
                return Observation::Resync;
            }
            return Observation::Outlier;
        }
        self.outliers = 0;

        let k0 = self.p[0][0] / p00_r;
        let k1 = self.p[1][0] / p00_r;

        self.theta = self.theta.add_raw_f32(k0 * theta_error);
        self.f += k1 * theta_error;

        // Order is important; the right-hand sides must only see covariance
        // values from the prediction step.
        self.p[1][1] -= self.p[0][1] * self.p[1][0] / p00_r;
        self.p[0][1] = self.r * self.p[0][1] / p00_r;
        self.p[0][0] = self.r * k0;
        self.p[1][0] = self.r * k1;

        self.status = Status::Converged;
        Observation::Corrected
    }
}
