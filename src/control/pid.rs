//! Position PID with feed-forward, run once per control period.

/// Loop gains, fixed at construction. `kf` is an open-loop term added on top
/// of the PID output to carry known static load (gravity on a lift).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct PidGains {
    pub kf: f64,
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
}

impl PidGains {
    pub const fn new(kf: f64, kp: f64, ki: f64, kd: f64) -> Self {
        Self { kf, kp, ki, kd }
    }
}

#[derive(Debug, Clone)]
pub struct Pid {
    gains: PidGains,
    integral: f64,
    prev_error: f64,
    output_min: f64,
    output_max: f64,
}

impl Pid {
    pub fn new(gains: PidGains) -> Self {
        Self {
            gains,
            integral: 0.0,
            prev_error: 0.0,
            output_min: -1.0,
            output_max: 1.0,
        }
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    /// Compute the output for the current error. `dt` is the control period
    /// in seconds and must be positive.
    pub fn update(&mut self, setpoint: f64, measurement: f64, dt: f64) -> f64 {
        let error = setpoint - measurement;

        let p = self.gains.kp * error;

        self.integral += error * dt;
        let i = self.gains.ki * self.integral;

        let derivative = if dt > 0.0 {
            (error - self.prev_error) / dt
        } else {
            0.0
        };
        let d = self.gains.kd * derivative;

        self.prev_error = error;

        let output = (self.gains.kf + p + i + d).clamp(self.output_min, self.output_max);

        // Anti-windup: stop integrating while saturated.
        if output >= self.output_max || output <= self.output_min {
            self.integral -= error * dt;
        }

        output
    }

    /// Clear accumulated state. Called on zeroing and on setpoint changes.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.prev_error = 0.0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn proportional_only() {
        let mut pid = Pid::new(PidGains::new(0.0, 0.1, 0.0, 0.0));
        let output = pid.update(5.0, 0.0, 0.02);
        assert_relative_eq!(output, 0.5, epsilon = 1e-12);
    }

    #[test]
    fn feed_forward_added_to_output() {
        let mut pid = Pid::new(PidGains::new(0.2, 0.1, 0.0, 0.0));
        let output = pid.update(1.0, 0.0, 0.02);
        assert_relative_eq!(output, 0.3, epsilon = 1e-12);
    }

    #[test]
    fn output_saturates_at_unit_range() {
        let mut pid = Pid::new(PidGains::new(0.0, 10.0, 0.0, 0.0));
        assert_relative_eq!(pid.update(100.0, 0.0, 0.02), 1.0);
        assert_relative_eq!(pid.update(-100.0, 0.0, 0.02), -1.0);
    }

    #[test]
    fn integral_does_not_wind_up_while_saturated() {
        let mut pid = Pid::new(PidGains::new(0.0, 1.0, 1.0, 0.0));
        for _ in 0..500 {
            pid.update(100.0, 0.0, 0.02);
        }
        pid.reset();
        // After reset the accumulated integral is gone: P + one step of I.
        let output = pid.update(0.5, 0.0, 0.02);
        assert_relative_eq!(output, 0.51, epsilon = 1e-12);
    }
}
