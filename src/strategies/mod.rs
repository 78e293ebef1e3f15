pub mod fixed;
pub mod adaptive;

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;

/// Rate adaptation knobs. Rates are requests per minute.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AdaptationConfig {
    pub interval_requests: u64,
    pub window_size: usize,
    pub success_target: f64,
    pub decrease_fraction: f64,
    pub increase_fraction: f64,
    pub additive_step_per_minute: f64,
    pub min_rate_per_minute: f64,
    pub max_rate_per_minute: f64,
}

impl Default for AdaptationConfig {
    fn default() -> Self {
        Self {
            interval_requests: 10,
            window_size: 20,
            success_target: 0.95,
            decrease_fraction: 0.10,
            increase_fraction: 0.10,
            additive_step_per_minute: 2.0,
            min_rate_per_minute: 6.0,
            max_rate_per_minute: 120.0,
        }
    }
}

impl AdaptationConfig {
    pub fn clamp(&self, rate: f64) -> f64 {
        rate.clamp(self.min_rate_per_minute, self.max_rate_per_minute)
    }
}

pub trait RateStrategy: Send + Sync + fmt::Debug {
    /// Returns the proposed new rate. The controller clamps it.
    fn adjust(&mut self, current: f64, success_rate: f64, config: &AdaptationConfig) -> f64;
    fn name(&self) -> &str;
    fn clone_box(&self) -> Box<dyn RateStrategy>;
}

impl Clone for Box<dyn RateStrategy> {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

/// Trailing window of request outcomes.
#[derive(Debug, Clone)]
pub struct RollingWindow {
    samples: VecDeque<bool>,
    capacity: usize,
    successes: usize,
}

impl RollingWindow {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            successes: 0,
        }
    }

    pub fn push(&mut self, success: bool) {
        if self.samples.len() == self.capacity {
            if let Some(true) = self.samples.pop_front() {
                self.successes -= 1;
            }
        }
        if success {
            self.successes += 1;
        }
        self.samples.push_back(success);
    }

    /// An empty window reports 1.0 so nothing backs off before data exists.
    pub fn success_rate(&self) -> f64 {
        if self.samples.is_empty() {
            1.0
        } else {
            self.successes as f64 / self.samples.len() as f64
        }
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RateChange {
    pub from: f64,
    pub to: f64,
    pub success_rate: f64,
}

/// Owns the current rate of one session and applies the strategy every
/// `interval_requests` outcomes. The rate never leaves `[min, max]`.
#[derive(Debug, Clone)]
pub struct RateController {
    strategy: Box<dyn RateStrategy>,
    config: AdaptationConfig,
    window: RollingWindow,
    rate: f64,
    observed: u64,
    adjustments: u32,
}

impl RateController {
    /// A non-finite initial rate starts at the floor.
    pub fn new(strategy: Box<dyn RateStrategy>, config: AdaptationConfig, initial_rate: f64) -> Self {
        let rate = if initial_rate.is_finite() {
            config.clamp(initial_rate)
        } else {
            config.min_rate_per_minute
        };
        Self {
            strategy,
            window: RollingWindow::new(config.window_size),
            config,
            rate,
            observed: 0,
            adjustments: 0,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn success_rate(&self) -> f64 {
        self.window.success_rate()
    }

    pub fn adjustments(&self) -> u32 {
        self.adjustments
    }

    pub fn strategy_name(&self) -> &str {
        self.strategy.name()
    }

    /// Base inter-request delay in seconds for the current rate.
    pub fn base_delay_secs(&self) -> f64 {
        60.0 / self.rate
    }

    pub fn observe(&mut self, success: bool) -> Option<RateChange> {
        self.window.push(success);
        self.observed += 1;

        let interval = self.config.interval_requests.max(1);
        if self.observed % interval != 0 {
            return None;
        }

        let success_rate = self.window.success_rate();
        let proposed = self.strategy.adjust(self.rate, success_rate, &self.config);
        let next = if proposed.is_finite() {
            self.config.clamp(proposed)
        } else {
            self.rate
        };

        if (next - self.rate).abs() < f64::EPSILON {
            return None;
        }

        let change = RateChange {
            from: self.rate,
            to: next,
            success_rate,
        };
        self.rate = next;
        self.adjustments += 1;
        Some(change)
    }
}

type StrategyFactory = Box<dyn Fn() -> Box<dyn RateStrategy> + Send + Sync>;

pub struct RateRegistry {
    strategies: HashMap<String, StrategyFactory>,
}

impl RateRegistry {
    pub fn new() -> Self {
        let mut registry = Self {
            strategies: HashMap::new(),
        };
        registry.register_builtin();
        registry
    }

    fn register_builtin(&mut self) {
        self.register("fixed", || Box::new(fixed::Fixed));
        self.register("adaptive", || Box::new(adaptive::Adaptive::new()));
        self.register("aimd", || Box::new(adaptive::Aimd::new()));
    }

    pub fn register<F>(&mut self, name: &str, factory: F)
    where
        F: Fn() -> Box<dyn RateStrategy> + Send + Sync + 'static,
    {
        self.strategies.insert(name.to_lowercase(), Box::new(factory));
    }

    pub fn create(&self, name: &str) -> Option<Box<dyn RateStrategy>> {
        self.strategies.get(&name.to_lowercase()).map(|factory| factory())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(&name.to_lowercase())
    }

    pub fn list(&self) -> Vec<String> {
        let mut names: Vec<String> = self.strategies.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn global() -> &'static RateRegistry {
        use std::sync::OnceLock;
        static REGISTRY: OnceLock<RateRegistry> = OnceLock::new();
        REGISTRY.get_or_init(RateRegistry::new)
    }
}

impl Default for RateRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn controller(name: &str, initial: f64) -> RateController {
        let strategy = RateRegistry::global().create(name).unwrap();
        RateController::new(strategy, AdaptationConfig::default(), initial)
    }

    #[test]
    fn window_evicts_oldest() {
        let mut window = RollingWindow::new(3);
        window.push(false);
        window.push(true);
        window.push(true);
        assert!((window.success_rate() - 2.0 / 3.0).abs() < 1e-12);
        window.push(true);
        assert_eq!(window.len(), 3);
        assert_eq!(window.success_rate(), 1.0);
    }

    #[test]
    fn empty_window_is_healthy() {
        assert_eq!(RollingWindow::new(5).success_rate(), 1.0);
    }

    #[test]
    fn registry_lists_builtins() {
        assert_eq!(RateRegistry::global().list(), vec!["adaptive", "aimd", "fixed"]);
        assert!(RateRegistry::global().create("ADAPTIVE").is_some());
        assert!(RateRegistry::global().create("nope").is_none());
    }

    #[test]
    fn adjusts_only_on_interval() {
        let mut ctl = controller("adaptive", 60.0);
        for _ in 0..9 {
            assert!(ctl.observe(false).is_none());
        }
        let change = ctl.observe(false).unwrap();
        assert_eq!(change.from, 60.0);
        assert!((change.to - 54.0).abs() < 1e-9);
        assert_eq!(ctl.adjustments(), 1);
    }

    #[test]
    fn one_in_three_failures_backs_off() {
        let mut ctl = controller("adaptive", 60.0);
        for i in 1..=100 {
            ctl.observe(i % 3 != 0);
        }
        assert!(ctl.rate() < 60.0);
        assert!(ctl.rate() >= AdaptationConfig::default().min_rate_per_minute);
    }

    #[test]
    fn fixed_never_moves() {
        let mut ctl = controller("fixed", 60.0);
        for i in 0..100 {
            assert!(ctl.observe(i % 2 == 0).is_none());
        }
        assert_eq!(ctl.rate(), 60.0);
    }

    #[test]
    fn initial_rate_is_clamped() {
        let ctl = controller("fixed", 10_000.0);
        assert_eq!(ctl.rate(), AdaptationConfig::default().max_rate_per_minute);
        assert!((ctl.base_delay_secs() - 0.5).abs() < 1e-12);
    }

    #[test]
    fn non_finite_initial_rate_starts_at_floor() {
        let floor = AdaptationConfig::default().min_rate_per_minute;
        for initial in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
            let ctl = controller("adaptive", initial);
            assert_eq!(ctl.rate(), floor);
            assert!(ctl.base_delay_secs().is_finite());
        }
    }

    proptest! {
        #[test]
        fn rate_stays_in_bounds(
            name in prop::sample::select(vec!["fixed", "adaptive", "aimd"]),
            initial in 1.0f64..500.0,
            outcomes in prop::collection::vec(any::<bool>(), 0..400),
        ) {
            let config = AdaptationConfig::default();
            let mut ctl = controller(name, initial);
            prop_assert!(ctl.rate() >= config.min_rate_per_minute);
            prop_assert!(ctl.rate() <= config.max_rate_per_minute);
            for ok in outcomes {
                ctl.observe(ok);
                prop_assert!(ctl.rate() >= config.min_rate_per_minute);
                prop_assert!(ctl.rate() <= config.max_rate_per_minute);
            }
        }
    }
}
