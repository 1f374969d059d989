use serde::{Deserialize, Serialize};

/// Simulation clock with periodic output, refinement and checkpoint triggers.
///
/// Every interval is converted to a whole number of steps, so a trigger fires on the
/// positive multiples of `max(1, round(interval / delta_t))`.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Time {
    timestep: u32,
    current: f64,
    end: f64,
    delta_t: f64,
    output_interval: f64,
    refinement_interval: f64,
    save_interval: f64,
}

impl Time {
    pub fn new(
        end: f64,
        delta_t: f64,
        output_interval: f64,
        refinement_interval: f64,
        save_interval: f64,
    ) -> Self {
        Time {
            timestep: 0,
            current: 0.0,
            end,
            delta_t,
            output_interval,
            refinement_interval,
            save_interval,
        }
    }

    pub fn from_params(params: &crate::Parameters) -> Self {
        Time::new(
            params.end_time,
            params.time_step,
            params.output_interval,
            params.refinement_interval,
            params.save_interval,
        )
    }

    pub fn current(&self) -> f64 {
        self.current
    }

    pub fn end(&self) -> f64 {
        self.end
    }

    pub fn delta_t(&self) -> f64 {
        self.delta_t
    }

    pub fn timestep(&self) -> u32 {
        self.timestep
    }

    pub fn increment(&mut self) {
        self.current += self.delta_t;
        self.timestep += 1;
    }

    /// Resumes the clock from a saved step.
    pub fn restore(&mut self, timestep: u32, current: f64) {
        self.timestep = timestep;
        self.current = current;
    }

    /// Returns true while there is at least one more step to take.
    pub fn running(&self) -> bool {
        self.end - self.current > 1e-12
    }

    pub fn time_to_output(&self) -> bool {
        self.fires(self.output_interval)
    }

    pub fn time_to_refine(&self) -> bool {
        self.fires(self.refinement_interval)
    }

    pub fn time_to_save(&self) -> bool {
        self.fires(self.save_interval)
    }

    fn fires(&self, interval: f64) -> bool {
        let delta = ((interval / self.delta_t).round() as u32).max(1);
        self.timestep >= delta && self.timestep % delta == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn triggers() {
        let mut time = Time::new(1.0, 0.1, 0.3, 0.2, 1.0);
        assert!(!time.time_to_output());
        let mut outputs = Vec::new();
        let mut refines = Vec::new();
        while time.running() {
            time.increment();
            if time.time_to_output() {
                outputs.push(time.timestep());
            }
            if time.time_to_refine() {
                refines.push(time.timestep());
            }
        }
        assert_eq!(time.timestep(), 10);
        assert_relative_eq!(time.current(), 1.0, epsilon = 1e-12);
        assert_eq!(outputs, vec![3, 6, 9]);
        assert_eq!(refines, vec![2, 4, 6, 8, 10]);
        assert!(time.time_to_save());
    }

    #[test]
    fn interval_below_step_fires_every_step() {
        let mut time = Time::new(1.0, 0.5, 0.1, 0.1, 0.1);
        time.increment();
        assert!(time.time_to_output());
        time.increment();
        assert!(time.time_to_save());
    }
}
