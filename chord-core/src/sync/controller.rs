//! Proportional controller trimming the audio master clock towards a target
//! phase.

use chord_protocol::time::Phase;

use crate::sync::estimator::EstimatorState;

#[derive(Debug, Clone, Copy)]
pub struct ControllerConfig {
    /// Phase gain.
    pub k_theta: f32,
    /// Frequency gain.
    pub k_f: f32,
    /// Maximum control step per iteration.
    pub max_step: u16,
}

impl Default for ControllerConfig {
    fn default() -> Self {
        ControllerConfig {
            k_theta: 4.03747559e-11,
            k_f: 6.45996094e-05,
            max_step: 1000,
        }
    }
}

pub struct FreqController {
    config: ControllerConfig,
}

impl FreqController {
    pub fn new(config: &ControllerConfig) -> FreqController {
        FreqController { config: *config }
    }

    /// Control step driving the estimated phase towards `target_theta` and
    /// the frequency error towards zero. Saturates at `max_step`.
    pub fn update(&self, target_theta: Phase, state: &EstimatorState) -> i16 {
        let theta_error = target_theta.delta(state.theta).to_raw() as f32;
        let f_error = -state.f;
        let u = self.config.k_theta * theta_error + self.config.k_f * f_error;

        let max_step = self.config.max_step;
        if u > f32::from(max_step) {
            max_step as i16
        } else if u < -f32::from(max_step) {
            -(max_step as i16)
        } else {
            round_to_i16(u)
        }
    }
}

fn round_to_i16(value: f32) -> i16 {
    (value + if value > 0.0 { 0.5 } else { -0.5 }) as i16
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::estimator::Status;

    fn state(theta: Phase, f: f32) -> EstimatorState {
        EstimatorState {
            status: Status::Converged,
            theta,
            f,
        }
    }

    fn controller() -> FreqController {
        FreqController::new(&ControllerConfig::default())
    }

    #[test]
    fn zero_error_holds_the_clock() {
        let target = Phase::from_int(1234);
        let step = controller().update(target, &state(target, 0.0));
        assert_eq!(step, 0);
    }

    #[test]
    fn saturates_in_both_directions() {
        let ctlr = controller();
        let max = ControllerConfig::default().max_step as i16;

        // phase far behind the target
        let step = ctlr.update(Phase::from_int(1 << 30), &state(Phase::ZERO, 0.0));
        assert_eq!(step, max);

        // phase far ahead of the target
        let step = ctlr.update(Phase::ZERO, &state(Phase::from_int(1 << 30), 0.0));
        assert_eq!(step, -max);
    }

    #[test]
    fn step_sign_follows_the_error() {
        let ctlr = controller();

        // small positive phase error
        let step = ctlr.update(Phase::from_int(100), &state(Phase::ZERO, 0.0));
        assert!(step > 0);
        assert!(step <= 1000);

        // running fast: negative frequency correction
        let step = ctlr.update(Phase::ZERO, &state(Phase::ZERO, 1e5));
        assert!(step < 0);
    }

    #[test]
    fn rounds_half_away_from_zero() {
        assert_eq!(round_to_i16(2.5), 3);
        assert_eq!(round_to_i16(-2.5), -3);
        assert_eq!(round_to_i16(2.4), 2);
        assert_eq!(round_to_i16(-2.4), -2);
        assert_eq!(round_to_i16(0.0), 0);
    }
}
