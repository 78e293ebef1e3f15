use super::{AdaptationConfig, RateStrategy};

/// Percentage steps: back off by `decrease_fraction` below target,
/// speed up by `increase_fraction` at or above it.
#[derive(Debug, Clone, Default)]
pub struct Adaptive {
    pub backoffs: u32,
    pub speedups: u32,
}

impl Adaptive {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RateStrategy for Adaptive {
    fn adjust(&mut self, current: f64, success_rate: f64, config: &AdaptationConfig) -> f64 {
        if success_rate < config.success_target {
            self.backoffs += 1;
            current * (1.0 - config.decrease_fraction)
        } else if current < config.max_rate_per_minute {
            self.speedups += 1;
            current * (1.0 + config.increase_fraction)
        } else {
            current
        }
    }

    fn name(&self) -> &str { "adaptive" }

    fn clone_box(&self) -> Box<dyn RateStrategy> {
        Box::new(self.clone())
    }
}

/// Additive increase, multiplicative decrease.
#[derive(Debug, Clone)]
pub struct Aimd {
    beta: f64,
    last_was_backoff: bool,
}

impl Aimd {
    pub fn new() -> Self {
        Self {
            beta: 0.5,
            last_was_backoff: false,
        }
    }
}

impl Default for Aimd {
    fn default() -> Self {
        Self::new()
    }
}

impl RateStrategy for Aimd {
    fn adjust(&mut self, current: f64, success_rate: f64, config: &AdaptationConfig) -> f64 {
        if success_rate < config.success_target {
            // Consecutive backoffs use the gentler fraction
            let factor = if self.last_was_backoff { 1.0 - config.decrease_fraction } else { self.beta };
            self.last_was_backoff = true;
            current * factor
        } else {
            self.last_was_backoff = false;
            current + config.additive_step_per_minute
        }
    }

    fn name(&self) -> &str { "aimd" }

    fn clone_box(&self) -> Box<dyn RateStrategy> {
        Box::new(self.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn adaptive_steps_both_ways() {
        let config = AdaptationConfig::default();
        let mut s = Adaptive::new();
        assert!((s.adjust(100.0, 0.5, &config) - 90.0).abs() < 1e-9);
        assert!((s.adjust(100.0, 0.99, &config) - 110.0).abs() < 1e-9);
        assert_eq!(s.adjust(config.max_rate_per_minute, 1.0, &config), config.max_rate_per_minute);
        assert_eq!((s.backoffs, s.speedups), (1, 1));
    }

    #[test]
    fn target_is_inclusive() {
        let config = AdaptationConfig::default();
        let mut s = Adaptive::new();
        assert!(s.adjust(50.0, config.success_target, &config) > 50.0);
    }

    #[test]
    fn aimd_halves_then_steps() {
        let config = AdaptationConfig::default();
        let mut s = Aimd::new();
        assert_eq!(s.adjust(80.0, 0.1, &config), 40.0);
        assert!((s.adjust(40.0, 0.1, &config) - 36.0).abs() < 1e-9);
        assert_eq!(s.adjust(36.0, 1.0, &config), 38.0);
    }
}
