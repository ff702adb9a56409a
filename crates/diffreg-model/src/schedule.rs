//! Linear DDPM noise schedule.
//!
//! Step `t` runs from `0` to `steps - 1`; sampling walks it backwards from
//! `steps - 1` down to `0`.

use burn::prelude::*;
use diffreg_registration::RegistrationError;

/// Configuration for a linear β schedule.
#[derive(Config, Debug, PartialEq)]
pub struct NoiseScheduleConfig {
    /// β at the first step.
    #[config(default = "1e-4")]
    pub beta_start: f64,
    /// β at the last step.
    #[config(default = "2e-2")]
    pub beta_end: f64,
    /// Number of diffusion steps `T`.
    #[config(default = "8")]
    pub steps: usize,
}

impl NoiseScheduleConfig {
    /// Build the schedule, rejecting empty or out-of-range β ranges.
    pub fn init(&self) -> diffreg_registration::Result<NoiseSchedule> {
        if self.steps == 0 {
            return Err(RegistrationError::invalid_configuration(
                "noise schedule needs at least one step",
            ));
        }
        let valid = |b: f64| b > 0.0 && b < 1.0;
        if !valid(self.beta_start) || !valid(self.beta_end) || self.beta_start > self.beta_end {
            return Err(RegistrationError::invalid_configuration(format!(
                "beta range must satisfy 0 < start <= end < 1, got [{}, {}]",
                self.beta_start, self.beta_end
            )));
        }

        let betas: Vec<f64> = if self.steps == 1 {
            vec![self.beta_start]
        } else {
            let span = self.beta_end - self.beta_start;
            (0..self.steps)
                .map(|t| self.beta_start + span * t as f64 / (self.steps - 1) as f64)
                .collect()
        };

        let mut alpha_bars = Vec::with_capacity(betas.len());
        let mut running = 1.0;
        for beta in &betas {
            running *= 1.0 - beta;
            alpha_bars.push(running);
        }

        Ok(NoiseSchedule { betas, alpha_bars })
    }
}

/// Precomputed β, α and ᾱ for every step.
#[derive(Debug, Clone, PartialEq)]
pub struct NoiseSchedule {
    betas: Vec<f64>,
    alpha_bars: Vec<f64>,
}

impl NoiseSchedule {
    pub fn steps(&self) -> usize {
        self.betas.len()
    }

    pub fn beta(&self, t: usize) -> f64 {
        self.betas[t]
    }

    pub fn alpha(&self, t: usize) -> f64 {
        1.0 - self.betas[t]
    }

    /// Cumulative product of α up to and including `t`.
    pub fn alpha_bar(&self, t: usize) -> f64 {
        self.alpha_bars[t]
    }

    /// ᾱ of the step before `t`; 1 before the first step.
    pub fn alpha_bar_prev(&self, t: usize) -> f64 {
        if t == 0 {
            1.0
        } else {
            self.alpha_bars[t - 1]
        }
    }

    /// Variance of q(x_{t-1} | x_t, x_0). Zero at `t = 0`.
    pub fn posterior_variance(&self, t: usize) -> f64 {
        self.beta(t) * (1.0 - self.alpha_bar_prev(t)) / (1.0 - self.alpha_bar(t))
    }

    /// Coefficients `(a, b)` of the posterior mean `a * (x_t - b * eps)`.
    pub fn mean_coefficients(&self, t: usize) -> (f64, f64) {
        let a = 1.0 / self.alpha(t).sqrt();
        let b = self.beta(t) / (1.0 - self.alpha_bar(t)).sqrt();
        (a, b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_betas() {
        let schedule = NoiseScheduleConfig::new()
            .with_beta_start(0.1)
            .with_beta_end(0.3)
            .with_steps(3)
            .init()
            .unwrap();
        assert_eq!(schedule.steps(), 3);
        assert!((schedule.beta(1) - 0.2).abs() < 1e-12);
        assert!((schedule.alpha_bar(2) - 0.9 * 0.8 * 0.7).abs() < 1e-12);
    }

    #[test]
    fn test_alpha_bar_decreases() {
        let schedule = NoiseScheduleConfig::new().with_steps(50).init().unwrap();
        for t in 1..schedule.steps() {
            assert!(schedule.alpha_bar(t) < schedule.alpha_bar(t - 1));
        }
        assert_eq!(schedule.alpha_bar_prev(0), 1.0);
    }

    #[test]
    fn test_posterior_variance_vanishes_at_first_step() {
        let schedule = NoiseScheduleConfig::new().init().unwrap();
        assert_eq!(schedule.posterior_variance(0), 0.0);
        for t in 1..schedule.steps() {
            let var = schedule.posterior_variance(t);
            assert!(var > 0.0 && var < schedule.beta(t));
        }
    }

    #[test]
    fn test_single_step_schedule() {
        let schedule = NoiseScheduleConfig::new().with_steps(1).init().unwrap();
        assert_eq!(schedule.beta(0), 1e-4);
    }

    #[test]
    fn test_invalid_schedules_are_rejected() {
        assert!(NoiseScheduleConfig::new().with_steps(0).init().is_err());
        assert!(NoiseScheduleConfig::new().with_beta_start(0.0).init().is_err());
        assert!(NoiseScheduleConfig::new().with_beta_end(1.0).init().is_err());
        assert!(NoiseScheduleConfig::new()
            .with_beta_start(0.5)
            .with_beta_end(0.1)
            .init()
            .is_err());
    }
}
