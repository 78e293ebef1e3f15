use super::{AdaptationConfig, RateStrategy};

/// Holds the rate where it started. Used when adaptation is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct Fixed;

impl RateStrategy for Fixed {
    fn adjust(&mut self, current: f64, _success_rate: f64, _config: &AdaptationConfig) -> f64 {
        current
    }

    fn name(&self) -> &str { "fixed" }

    fn clone_box(&self) -> Box<dyn RateStrategy> {
        Box::new(*self)
    }
}
