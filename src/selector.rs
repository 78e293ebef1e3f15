// Page selection: profile sequence first, weighted draw after.

use crate::error::ConfigError;
use crate::profile::{PageTarget, UserProfile};
use rand::Rng;
use rand::distributions::{Distribution, WeightedIndex};
use std::collections::{HashMap, HashSet};
use tracing::warn;

const WEIGHT_SUM_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone)]
pub struct WeightedPages {
    pages: Vec<PageTarget>,
    by_name: HashMap<String, usize>,
    dist: WeightedIndex<f64>,
    total_weight: f64,
}

impl WeightedPages {
    /// Weights are normalized against their sum. With `strict` set a sum
    /// other than 1.0 is rejected instead of being normalized.
    pub fn new(pages: Vec<PageTarget>, strict: bool) -> Result<Self, ConfigError> {
        if pages.is_empty() {
            return Err(ConfigError::Invalid("no page targets configured".into()));
        }

        let mut by_name = HashMap::with_capacity(pages.len());
        for (idx, page) in pages.iter().enumerate() {
            if !page.weight.is_finite() || page.weight < 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "page '{}' has invalid weight {}",
                    page.name, page.weight
                )));
            }
            if by_name.insert(page.name.clone(), idx).is_some() {
                return Err(ConfigError::Invalid(format!("duplicate page name '{}'", page.name)));
            }
        }

        let total_weight: f64 = pages.iter().map(|p| p.weight).sum();
        if total_weight <= 0.0 {
            return Err(ConfigError::Invalid("page weights sum to zero".into()));
        }

        if (total_weight - 1.0).abs() > WEIGHT_SUM_TOLERANCE {
            if strict {
                return Err(ConfigError::Invalid(format!(
                    "page weights sum to {:.4}, expected 1.0",
                    total_weight
                )));
            }
            warn!("Page weights sum to {:.4}, normalizing", total_weight);
        }

        let dist = WeightedIndex::new(pages.iter().map(|p| p.weight))
            .map_err(|e| ConfigError::Invalid(format!("page weights: {}", e)))?;

        Ok(Self {
            pages,
            by_name,
            dist,
            total_weight,
        })
    }

    pub fn pages(&self) -> &[PageTarget] {
        &self.pages
    }

    pub fn len(&self) -> usize {
        self.pages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pages.is_empty()
    }

    pub fn get(&self, idx: usize) -> &PageTarget {
        &self.pages[idx]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }

    pub fn normalized_weight(&self, idx: usize) -> f64 {
        self.pages[idx].weight / self.total_weight
    }

    /// Lower index wins exact ties, matching configuration order.
    pub fn draw<R: Rng + ?Sized>(&self, rng: &mut R) -> usize {
        self.dist.sample(rng)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub index: usize,
    pub from_sequence: bool,
    cursor: usize,
}

#[derive(Debug, Clone, Default)]
pub struct VisitHistory {
    visited: HashSet<usize>,
    sequence_cursor: usize,
}

impl VisitHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, selection: Selection) {
        self.visited.insert(selection.index);
        if selection.from_sequence {
            self.sequence_cursor = selection.cursor;
        }
    }

    pub fn has_visited(&self, idx: usize) -> bool {
        self.visited.contains(&idx)
    }
}

pub fn select_next_page<R: Rng + ?Sized>(
    profile: &UserProfile,
    history: &VisitHistory,
    pages: &WeightedPages,
    follow_sequence: bool,
    rng: &mut R,
) -> Selection {
    if follow_sequence {
        let remaining = profile
            .preferred_sequence
            .iter()
            .enumerate()
            .skip(history.sequence_cursor);

        for (pos, name) in remaining {
            if let Some(idx) = pages.index_of(name) {
                if !history.has_visited(idx) {
                    return Selection {
                        index: idx,
                        from_sequence: true,
                        cursor: pos + 1,
                    };
                }
            }
        }
    }

    Selection {
        index: pages.draw(rng),
        from_sequence: false,
        cursor: history.sequence_cursor,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn abc() -> WeightedPages {
        WeightedPages::new(
            vec![
                PageTarget::new("a", "/a", 0.5),
                PageTarget::new("b", "/b", 0.3),
                PageTarget::new("c", "/c", 0.2),
            ],
            false,
        )
        .unwrap()
    }

    fn run(profile: &UserProfile, pages: &WeightedPages, follow: bool, seed: u64, n: usize) -> Vec<usize> {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut history = VisitHistory::new();
        (0..n)
            .map(|_| {
                let sel = select_next_page(profile, &history, pages, follow, &mut rng);
                history.record(sel);
                sel.index
            })
            .collect()
    }

    #[test]
    fn empty_pages_rejected() {
        assert!(WeightedPages::new(vec![], false).is_err());
    }

    #[test]
    fn zero_weights_rejected() {
        let pages = vec![PageTarget::new("a", "/a", 0.0), PageTarget::new("b", "/b", 0.0)];
        let err = WeightedPages::new(pages, false).unwrap_err();
        assert!(err.to_string().contains("sum to zero"));
    }

    #[test]
    fn negative_weight_rejected() {
        let pages = vec![PageTarget::new("a", "/a", -1.0), PageTarget::new("b", "/b", 2.0)];
        assert!(WeightedPages::new(pages, false).is_err());
    }

    #[test]
    fn strict_rejects_unnormalized() {
        let pages = vec![PageTarget::new("a", "/a", 2.0), PageTarget::new("b", "/b", 2.0)];
        assert!(WeightedPages::new(pages.clone(), true).is_err());

        let lenient = WeightedPages::new(pages, false).unwrap();
        assert!((lenient.normalized_weight(0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn duplicate_names_rejected() {
        let pages = vec![PageTarget::new("a", "/a", 0.5), PageTarget::new("a", "/b", 0.5)];
        assert!(WeightedPages::new(pages, false).is_err());
    }

    #[test]
    fn sequence_then_weighted() {
        let pages = abc();
        let profile = UserProfile::new("reader").with_sequence(["c", "a"]);
        let picks = run(&profile, &pages, true, 1, 5);
        assert_eq!(&picks[..2], &[2, 0]);
    }

    #[test]
    fn sequence_skips_repeats_and_unknowns() {
        let pages = abc();
        let profile = UserProfile::new("reader").with_sequence(["b", "missing", "b", "c"]);
        let mut rng = StdRng::seed_from_u64(3);
        let mut history = VisitHistory::new();

        let first = select_next_page(&profile, &history, &pages, true, &mut rng);
        assert!(first.from_sequence);
        assert_eq!(first.index, 1);
        history.record(first);

        let second = select_next_page(&profile, &history, &pages, true, &mut rng);
        assert!(second.from_sequence);
        assert_eq!(second.index, 2);
        history.record(second);

        let third = select_next_page(&profile, &history, &pages, true, &mut rng);
        assert!(!third.from_sequence);
    }

    #[test]
    fn sequence_ignored_when_disabled() {
        let pages = abc();
        let profile = UserProfile::new("reader").with_sequence(["c", "c", "c"]);
        let mut rng = StdRng::seed_from_u64(9);
        let sel = select_next_page(&profile, &VisitHistory::new(), &pages, false, &mut rng);
        assert!(!sel.from_sequence);
    }

    #[test]
    fn weighted_distribution_converges() {
        let pages = abc();
        let profile = UserProfile::anonymous();
        let picks = run(&profile, &pages, false, 42, 10_000);

        let mut counts = [0usize; 3];
        for idx in picks {
            counts[idx] += 1;
        }
        for (idx, expected) in [0.5, 0.3, 0.2].iter().enumerate() {
            let share = counts[idx] as f64 / 10_000.0;
            assert!((share - expected).abs() < 0.03, "page {} share {}", idx, share);
        }
    }

    #[test]
    fn zero_weight_page_never_drawn() {
        let pages = WeightedPages::new(
            vec![PageTarget::new("a", "/a", 1.0), PageTarget::new("never", "/n", 0.0)],
            false,
        )
        .unwrap();
        let picks = run(&UserProfile::anonymous(), &pages, false, 5, 1_000);
        assert!(picks.iter().all(|&i| i == 0));
    }

    #[test]
    fn history_tracks_distinct_pages() {
        let pages = abc();
        let picks = run(&UserProfile::anonymous(), &pages, false, 8, 5_000);
        let mut history = VisitHistory::new();
        for &index in &picks {
            history.record(Selection { index, from_sequence: false, cursor: 0 });
        }
        assert_eq!(history.visited.len(), 3);
        assert!((0..3).all(|idx| history.has_visited(idx)));
        assert!(!history.has_visited(3));
    }

    proptest! {
        #[test]
        fn same_seed_same_sequence(seed in any::<u64>(), n in 1usize..200) {
            let pages = abc();
            let profile = UserProfile::new("p").with_sequence(["b", "c"]);
            prop_assert_eq!(
                run(&profile, &pages, true, seed, n),
                run(&profile, &pages, true, seed, n)
            );
        }
    }
}
