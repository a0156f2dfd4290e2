use std::collections::BTreeMap;

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;

use crate::extractor::NodeSet;
use crate::source::NodeId;

/// Share of a node set that is resolved, in percent, or `None` when the set
/// is small enough to resolve in full.
pub fn sample_percentage(len: usize) -> Option<usize> {
    match len {
        0..=2 => None,
        3..=10 => Some(50),
        11..=100 => Some(10),
        101..=1000 => Some(5),
        _ => Some(1),
    }
}

pub fn sample_size(len: usize, percentage: usize) -> usize {
    (len * percentage / 100).max(1)
}

/// Number of aggregates sampled at each percentage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SamplingStats {
    pub by_percentage: BTreeMap<usize, usize>,
}

impl SamplingStats {
    fn record(&mut self, percentage: usize) {
        *self.by_percentage.entry(percentage).or_insert(0) += 1;
    }

    pub fn total(&self) -> usize {
        self.by_percentage.values().sum()
    }
}

pub struct PositionSampler {
    rng: StdRng,
    enabled: bool,
    stats: SamplingStats,
}

impl PositionSampler {
    pub fn new(seed: u64, enabled: bool) -> Self {
        Self {
            rng: StdRng::seed_from_u64(seed),
            enabled,
            stats: SamplingStats::default(),
        }
    }

    /// Candidate node ids for one aggregate, in ascending id order.
    pub fn sample(&mut self, nodes: &NodeSet) -> Vec<NodeId> {
        let all: Vec<NodeId> = nodes.iter().copied().collect();
        if !self.enabled {
            return all;
        }
        let Some(percentage) = sample_percentage(all.len()) else {
            return all;
        };
        self.stats.record(percentage);

        let amount = sample_size(all.len(), percentage);
        let mut picked = index::sample(&mut self.rng, all.len(), amount).into_vec();
        picked.sort_unstable();
        picked.into_iter().filter_map(|idx| all.get(idx).copied()).collect()
    }

    pub fn stats(&self) -> &SamplingStats {
        &self.stats
    }

    pub fn into_stats(self) -> SamplingStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn nodes(count: i64) -> NodeSet {
        (1..=count).collect()
    }

    #[rstest]
    #[case(1, None)]
    #[case(2, None)]
    #[case(3, Some(50))]
    #[case(10, Some(50))]
    #[case(11, Some(10))]
    #[case(100, Some(10))]
    #[case(101, Some(5))]
    #[case(1000, Some(5))]
    #[case(1001, Some(1))]
    fn percentage_thresholds(#[case] len: usize, #[case] expected: Option<usize>) {
        assert_eq!(sample_percentage(len), expected);
    }

    #[rstest]
    #[case(3, 50, 1)]
    #[case(10, 50, 5)]
    #[case(15, 10, 1)]
    #[case(250, 5, 12)]
    #[case(1001, 1, 10)]
    #[case(5000, 1, 50)]
    fn sizes_round_down_with_floor_of_one(
        #[case] len: usize,
        #[case] percentage: usize,
        #[case] expected: usize,
    ) {
        assert_eq!(sample_size(len, percentage), expected);
    }

    #[test]
    fn small_sets_are_resolved_in_full() {
        let mut sampler = PositionSampler::new(0, true);
        assert_eq!(sampler.sample(&nodes(1)), vec![1]);
        assert_eq!(sampler.sample(&nodes(2)), vec![1, 2]);
        assert_eq!(sampler.stats().total(), 0);
    }

    #[test]
    fn large_sets_are_subsampled_from_members() {
        let mut sampler = PositionSampler::new(7, true);
        let members = nodes(1001);
        let picked = sampler.sample(&members);
        assert_eq!(picked.len(), 10);
        assert!(picked.windows(2).all(|pair| pair[0] < pair[1]));
        assert!(picked.iter().all(|id| members.contains(id)));
        assert_eq!(sampler.stats().by_percentage.get(&1), Some(&1));
    }

    #[test]
    fn same_seed_gives_same_sample() {
        let members = nodes(400);
        let first = PositionSampler::new(42, true).sample(&members);
        let second = PositionSampler::new(42, true).sample(&members);
        assert_eq!(first, second);
    }

    #[test]
    fn disabled_sampler_keeps_everything() {
        let mut sampler = PositionSampler::new(0, false);
        assert_eq!(sampler.sample(&nodes(50)).len(), 50);
        assert_eq!(sampler.into_stats(), SamplingStats::default());
    }
}
