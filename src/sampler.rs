use itertools::Itertools;

use crate::cdf::{uniform_sample_indices, weighted_sample_indices};
use crate::error::SampleJoinError;

#[cfg(test)]
use mockall::automock;

/// The sampling routine plugged into the estimator: draw m indices into the
/// sampling weight vector, with replacement, each index with probability
/// proportional to its weight. `cdf` is the estimator's memoized cdf over
/// exactly these weights; implementations that do not need it ignore it.
#[cfg_attr(test, automock)]
pub trait RangeSampler {
    fn sample<'a>(
        &self,
        m: usize,
        weights: &[f64],
        cdf: Option<&'a [f64]>,
    ) -> Result<Vec<usize>, SampleJoinError>;
}

/// Exact weighted sampling over the full population. O(n) to build the cdf when
/// no memoized one is passed in, O(log n) per draw afterwards.
pub struct ExactSampler<R: Fn() -> f64 = fn() -> f64> {
    random: R,
}

impl ExactSampler<fn() -> f64> {
    pub fn new() -> ExactSampler<fn() -> f64> {
        ExactSampler::with_random(|| rand::random())
    }
}

impl Default for ExactSampler<fn() -> f64> {
    fn default() -> Self {
        ExactSampler::new()
    }
}

impl<R: Fn() -> f64> ExactSampler<R> {
    pub fn with_random(random: R) -> ExactSampler<R> {
        ExactSampler { random }
    }
}

impl<R: Fn() -> f64> RangeSampler for ExactSampler<R> {
    fn sample<'a>(
        &self,
        m: usize,
        weights: &[f64],
        cdf: Option<&'a [f64]>,
    ) -> Result<Vec<usize>, SampleJoinError> {
        weighted_sample_indices(m, weights, cdf, &self.random)
    }
}

/// How the heuristic sampler sizes its uniform pilot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PilotHeuristic {
    /// k = m^2. O(1), ignores weight skew; duplicates become likely (and the
    /// two-stage sample biased) when the weights are heavily skewed.
    Simple,
    /// k = k_factor * m^2 * (w_max/w_min) / ln(1/sigma). O(n) for the min/max
    /// scan, sizes the pilot adaptively to the observed skew.
    Adaptive,
}

/// Heuristic two-stage weighted sampler (HWS): a uniform with-replacement pilot
/// of k indices first, then m weighted draws from the pilot under the original
/// weights. Avoids the exact sampler's O(n) cdf construction at the price of a
/// small bias/variance penalty. Refuses to run when the pilot would be larger
/// than the population; the caller must fall back to [`ExactSampler`] in that
/// regime.
pub struct HeuristicSampler<R: Fn() -> f64 = fn() -> f64> {
    sigma: f64,
    k_factor: f64,
    heuristic: PilotHeuristic,
    random: R,
}

impl HeuristicSampler<fn() -> f64> {
    /// `sigma` is the duplicate-avoidance confidence level in (0, 1), `k_factor`
    /// an additional pilot inflation constant. Both are only consulted by the
    /// adaptive heuristic.
    pub fn new(sigma: f64, k_factor: f64, heuristic: PilotHeuristic) -> HeuristicSampler<fn() -> f64> {
        HeuristicSampler::with_random(sigma, k_factor, heuristic, || rand::random())
    }
}

impl<R: Fn() -> f64> HeuristicSampler<R> {
    pub fn with_random(sigma: f64, k_factor: f64, heuristic: PilotHeuristic, random: R) -> HeuristicSampler<R> {
        assert!((0.0..1.0).contains(&sigma) && sigma > 0.0, "sigma must be in (0, 1)");
        HeuristicSampler { sigma, k_factor, heuristic, random }
    }

    /// The pilot size k for a target sample size m over the given weights.
    /// Not rounded down to the population size; a pilot larger than the
    /// population makes [`RangeSampler::sample`] fail.
    pub fn pilot_size(&self, weights: &[f64], m: usize) -> f64 {
        match self.heuristic {
            PilotHeuristic::Simple => (m * m) as f64,
            PilotHeuristic::Adaptive => {
                let (w_min, w_max) = match weights.iter().copied().minmax().into_option() {
                    Some(minmax) => minmax,
                    None => return f64::INFINITY,
                };
                let sigma_factor = 1.0 / (1.0 / self.sigma).ln();
                self.k_factor * sigma_factor * (m * m) as f64 * w_max / w_min
            }
        }
    }
}

impl<R: Fn() -> f64> RangeSampler for HeuristicSampler<R> {
    fn sample<'a>(
        &self,
        m: usize,
        weights: &[f64],
        _cdf: Option<&'a [f64]>,
    ) -> Result<Vec<usize>, SampleJoinError> {
        let k = self.pilot_size(weights, m).round();
        if !k.is_finite() || k > weights.len() as f64 {
            return Err(SampleJoinError::PilotLargerThanPopulation {
                pilot: k as usize,
                population: weights.len(),
            });
        }
        let pilot = uniform_sample_indices(k as usize, weights.len(), &self.random);
        let pilot_weights: Vec<f64> = pilot.iter().map(|&i| weights[i]).collect();
        let picks = weighted_sample_indices(m, &pilot_weights, None, &self.random)?;
        Ok(picks.into_iter().map(|i| pilot[i]).collect())
    }
}

#[cfg(test)]
mod test {
    // IMPORTANT: Make sure to seed every randomized component here
    //            to make sure the tests are deterministic.

    use std::cell::RefCell;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;
    use crate::cdf::cdf;

    fn random_from(seed: u64) -> impl Fn() -> f64 {
        let rng = RefCell::new(StdRng::seed_from_u64(seed));
        move || rng.borrow_mut().gen()
    }

    #[test]
    fn exact_sampler_returns_m_indices_in_range() {
        let weights: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let sampler = ExactSampler::with_random(random_from(1));
        let indices = sampler.sample(500, &weights, None).unwrap();
        assert_eq!(indices.len(), 500);
        assert!(indices.iter().all(|&i| i < 100));
    }

    #[test]
    fn exact_sampler_uses_the_memoized_cdf() {
        let weights: Vec<f64> = (1..=100).map(|i| i as f64).collect();
        let memoized = cdf(&weights);
        let without = ExactSampler::with_random(random_from(2)).sample(50, &weights, None).unwrap();
        let with = ExactSampler::with_random(random_from(2)).sample(50, &weights, Some(&memoized)).unwrap();
        assert_eq!(without, with);
    }

    #[test]
    fn exact_sampler_rejects_zero_weight_population() {
        let sampler = ExactSampler::with_random(random_from(3));
        assert_eq!(
            sampler.sample(10, &[0.0, 0.0], None),
            Err(SampleJoinError::ZeroWeightPopulation)
        );
    }

    #[test]
    fn simple_pilot_is_m_squared() {
        let sampler = HeuristicSampler::with_random(0.99, 1.0, PilotHeuristic::Simple, random_from(4));
        assert_eq!(sampler.pilot_size(&[1.0; 10], 7), 49.0);
    }

    #[test]
    fn adaptive_pilot_scales_with_skew() {
        let sampler = HeuristicSampler::with_random(0.99, 2.0, PilotHeuristic::Adaptive, random_from(5));
        let weights = [1.0, 5.0, 10.0];
        let expected = 2.0 * (1.0 / (1.0f64 / 0.99).ln()) * 9.0 * 10.0;
        assert!((sampler.pilot_size(&weights, 3) - expected).abs() < 1e-9);
        // Double the skew, double the pilot
        let skewed = [1.0, 5.0, 20.0];
        assert!((sampler.pilot_size(&skewed, 3) - 2.0 * expected).abs() < 1e-9);
    }

    #[test]
    fn oversized_pilot_is_rejected() {
        let weights = vec![1.0; 50];
        let sampler = HeuristicSampler::with_random(0.99, 1.0, PilotHeuristic::Simple, random_from(6));
        // k = 10^2 = 100 > 50
        assert_eq!(
            sampler.sample(10, &weights, None),
            Err(SampleJoinError::PilotLargerThanPopulation { pilot: 100, population: 50 })
        );
    }

    #[test]
    fn heuristic_sample_approximates_the_weighted_distribution() {
        // Low skew, large population relative to m*m: the two-stage sample
        // should track the target weights closely.
        let mut weights = vec![1.0; 10_000];
        for w in weights.iter_mut().skip(5_000) {
            *w = 2.0;
        }
        let sampler = HeuristicSampler::with_random(0.99, 1.0, PilotHeuristic::Simple, random_from(7));
        let mut heavy = 0usize;
        let mut total = 0usize;
        for _ in 0..200 {
            for i in sampler.sample(20, &weights, None).unwrap() {
                if i >= 5_000 {
                    heavy += 1;
                }
                total += 1;
            }
        }
        // Heavy half carries 2/3 of the weight mass
        let fraction = heavy as f64 / total as f64;
        assert!((fraction - 2.0 / 3.0).abs() < 0.05, "heavy fraction: {}", fraction);
    }

    #[test]
    fn heuristic_sample_maps_back_to_population_indices() {
        let weights: Vec<f64> = (1..=10_000).map(|i| 1.0 + (i % 3) as f64).collect();
        let sampler = HeuristicSampler::with_random(0.9, 1.0, PilotHeuristic::Adaptive, random_from(8));
        let indices = sampler.sample(10, &weights, None).unwrap();
        assert_eq!(indices.len(), 10);
        assert!(indices.iter().all(|&i| i < weights.len()));
    }

    #[test]
    #[should_panic(expected = "sigma must be in (0, 1)")]
    fn sigma_outside_unit_interval_is_rejected() {
        HeuristicSampler::with_random(1.5, 1.0, PilotHeuristic::Simple, random_from(9));
    }
}
