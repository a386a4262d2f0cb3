//! Subset samplers for the consensus engine

use rand::Rng;
use rand::seq::index;

/// Draws subsets of measurement indices
pub(crate) trait Sampler {
    /// Replace `subset` with a fresh draw of distinct indices
    fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R, subset: &mut Vec<usize>);
}

/// Uniform draws without replacement
pub(crate) struct UniformSampler {
    total: usize,
    subset_size: usize,
}

impl UniformSampler {
    pub fn new(total: usize, subset_size: usize) -> Self {
        debug_assert!(subset_size <= total);
        Self { total, subset_size }
    }
}

impl Sampler for UniformSampler {
    fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R, subset: &mut Vec<usize>) {
        subset.clear();
        subset.extend(index::sample(rng, self.total, self.subset_size).into_iter());
    }
}

/// Progressive sampling (Chum and Matas, PROSAC)
///
/// Indices are ranked by quality score. Early draws come from the top of the
/// ranking; the pool grows towards the full set at the rate that matches the
/// expected number of uniform draws within `max_iterations`.
pub(crate) struct ProgressiveSampler {
    ranked: Vec<usize>,
    subset_size: usize,
    /// Current pool size
    pool: usize,
    /// Draws made so far
    draws: usize,
    /// Expected uniform draws from the current pool (`T_n`)
    expected: f64,
    /// Draw at which the pool grows next (`T'_n`)
    growth_draw: usize,
}

impl ProgressiveSampler {
    pub fn new(quality_scores: &[f64], subset_size: usize, max_iterations: usize) -> Self {
        let total = quality_scores.len();
        debug_assert!(subset_size <= total);

        let mut ranked: Vec<usize> = (0..total).collect();
        ranked.sort_by(|&a, &b| quality_scores[b].total_cmp(&quality_scores[a]));

        let mut expected = max_iterations as f64;
        for i in 0..subset_size {
            expected *= (subset_size - i) as f64 / (total - i) as f64;
        }

        Self {
            ranked,
            subset_size,
            pool: subset_size,
            draws: 0,
            expected,
            growth_draw: 1,
        }
    }
}

impl Sampler for ProgressiveSampler {
    fn draw<R: Rng + ?Sized>(&mut self, rng: &mut R, subset: &mut Vec<usize>) {
        let total = self.ranked.len();
        let m = self.subset_size;
        self.draws += 1;

        if self.draws > self.growth_draw && self.pool < total {
            let next = self.expected * (self.pool + 1) as f64 / (self.pool + 1 - m) as f64;
            self.growth_draw += (next - self.expected).ceil().max(1.0) as usize;
            self.expected = next;
            self.pool += 1;
        }

        subset.clear();
        if self.growth_draw < self.draws || self.pool == m {
            subset.extend(
                index::sample(rng, self.pool, m)
                    .into_iter()
                    .map(|i| self.ranked[i]),
            );
        } else {
            // The newest pool member plus m - 1 from the rest of the pool
            subset.extend(
                index::sample(rng, self.pool - 1, m - 1)
                    .into_iter()
                    .map(|i| self.ranked[i]),
            );
            subset.push(self.ranked[self.pool - 1]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    fn assert_distinct(subset: &[usize], total: usize) {
        let mut seen = vec![false; total];
        for &i in subset {
            assert!(i < total);
            assert!(!seen[i], "index {i} drawn twice");
            seen[i] = true;
        }
    }

    #[test]
    fn test_uniform_draws_are_distinct() {
        let mut rng = Pcg64::seed_from_u64(7);
        let mut sampler = UniformSampler::new(20, 13);
        let mut subset = Vec::new();

        for _ in 0..50 {
            sampler.draw(&mut rng, &mut subset);
            assert_eq!(subset.len(), 13);
            assert_distinct(&subset, 20);
        }
    }

    #[test]
    fn test_progressive_starts_with_best_scores() {
        let scores: Vec<f64> = (0..30).map(|i| i as f64).collect();
        let mut rng = Pcg64::seed_from_u64(11);
        let mut sampler = ProgressiveSampler::new(&scores, 5, 1000);
        let mut subset = Vec::new();

        sampler.draw(&mut rng, &mut subset);
        subset.sort_unstable();
        assert_eq!(subset, vec![25, 26, 27, 28, 29]);
    }

    #[test]
    fn test_progressive_pool_grows_to_all_samples() {
        let scores: Vec<f64> = (0..15).map(|i| (i % 4) as f64).collect();
        let mut rng = Pcg64::seed_from_u64(3);
        let mut sampler = ProgressiveSampler::new(&scores, 10, 200);
        let mut subset = Vec::new();

        for _ in 0..200 {
            sampler.draw(&mut rng, &mut subset);
            assert_eq!(subset.len(), 10);
            assert_distinct(&subset, 15);
        }
        assert_eq!(sampler.pool, 15);
    }
}
