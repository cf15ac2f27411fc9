/*
    The generic sample-join estimator. Given per-relation weighting functions h1 and h2
    whose product defines the (non normalised) target output distribution over join
    results, it draws build-side tuples with probability proportional to
    h1(A, B) * (h2-weight of the matching probe stratum), resolves each drawn tuple
    against the stratified probe relation, and reduces the sample to a single
    Horvitz-Thompson style aggregate estimate: every retained filter-passing tuple
    contributes f(A, B, C) / (h1(A, B) * h2(C)), rescaled by the appropriate
    normalisation constant.

    The normalisation constant (sum of all build-side sampling weights) and the cdf
    over the sampling weight vector are O(n1) to compute, so both are memoized on the
    estimator and only recomputed when the caller asks for it. The caller must request
    a recompute whenever h1, h2, a filter or a relation changes; the memoized cdf is
    additionally dropped whenever the normalisation is recomputed and only rebuilt on
    request (heuristic samplers never need it).

    Selection filters are handled by oversampling: S_size = 100 + ceil(1.2 * m /
    filter_selectivity) tuples are drawn, the filters are applied, and the sample is
    trimmed from the tail until exactly m filter-passing tuples remain. If fewer than
    m survive, the selectivity estimate was too optimistic and the call fails instead
    of returning a biased estimate from an undersized sample.

    With filtered_estimator set, the estimate is rescaled by the filtered
    normalisation over m. The naive path rescales by the unfiltered normalisation
    over the full retained count instead; under a filter that is dependent on the
    output distribution this is not guaranteed to converge to the true aggregate. It
    is kept as a deliberately suboptimal baseline, not silently corrected.
 */

use std::hash::Hash;

use crate::cdf::cdf;
use crate::error::SampleJoinError;
use crate::sampler::RangeSampler;
use crate::stratify::{ProbeTuple, StratifiedRelation, StratumWeights};

/// A row of the build relation R1: join key plus payload B.
pub type BuildTuple<K> = (K, f64);

/// Slack absorbing the variance in how many drawn tuples survive the filter.
const OVERSAMPLING_FACTOR: f64 = 1.2;
const OVERSAMPLING_CONSTANT: usize = 100;

/// Everything that defines one estimation target: the output distribution
/// (h1 * h2), the aggregated function, the per-relation selection filters and
/// how the filter is corrected for.
///
/// The weighting functions must return non-negative finite values. Filters
/// return true for selected tuples. `filter_selectivity` must be positive; it
/// is the known or estimated fraction of join results surviving both filters
/// and only controls the oversampled draw size. Underestimating it wastes
/// draws, overestimating it risks an
/// [`SampleJoinError::InsufficientFilteredSample`] failure.
pub struct JoinQuery<H1, H2, F, P1, P2> {
    pub h1: H1,
    pub h2: H2,
    pub aggregate: F,
    pub r1_filter: P1,
    pub r2_filter: P2,
    /// Rescale by the filtered normalisation (statistically sound under any
    /// filter) instead of the naive unfiltered one.
    pub filtered_estimator: bool,
    pub filter_selectivity: f64,
}

/// An unfiltered query: both filters pass everything, selectivity 1.
pub fn unfiltered_query<K, H1, H2, F>(
    h1: H1,
    h2: H2,
    aggregate: F,
) -> JoinQuery<H1, H2, F, impl Fn(&K, f64) -> bool, impl Fn(&K, f64) -> bool>
where
    H1: Fn(&K, f64) -> f64,
    H2: Fn(f64) -> f64,
    F: Fn(&K, f64, f64) -> f64,
{
    JoinQuery {
        h1,
        h2,
        aggregate,
        r1_filter: |_: &K, _| true,
        r2_filter: |_: &K, _| true,
        filtered_estimator: false,
        filter_selectivity: 1.0,
    }
}

/// The scalar estimate plus the diagnostics tests and callers use to judge the
/// sampling configuration.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Estimate {
    pub value: f64,
    /// Build-side indices drawn before filtering (the oversampled S_size).
    pub drawn: usize,
    /// Sample length after trimming to exactly m filter-passing tuples.
    pub retained: usize,
}

// Memoized state of one (h1, h2, filters, R1, R2) configuration.
struct NormalizationCache {
    normalization: f64,
    filtered_normalization: f64,
    sample_weights: Vec<f64>,
    cdf: Option<Vec<f64>>,
}

/// Estimates aggregates over the equi-join of R1 and R2 without materializing the
/// join. R1 and R2 are borrowed read-only for the estimator's lifetime; all derived
/// state (stratification, normalisation cache) is owned by the estimator and
/// invalidated explicitly. `estimate` takes `&mut self`, so one estimator instance
/// cannot be shared across concurrent estimation calls.
pub struct SampleJoinEstimator<'r, K, R: Fn() -> f64 = fn() -> f64> {
    r1: &'r [BuildTuple<K>],
    stratified: StratifiedRelation<K>,
    cache: Option<NormalizationCache>,
    random: R,
}

impl<'r, K: Eq + Hash + Clone> SampleJoinEstimator<'r, K, fn() -> f64> {
    pub fn new(r1: &'r [BuildTuple<K>], r2: &[ProbeTuple<K>]) -> SampleJoinEstimator<'r, K, fn() -> f64> {
        SampleJoinEstimator::with_random(r1, r2, || rand::random())
    }
}

impl<'r, K: Eq + Hash + Clone, R: Fn() -> f64> SampleJoinEstimator<'r, K, R> {
    pub fn with_random(r1: &'r [BuildTuple<K>], r2: &[ProbeTuple<K>], random: R) -> SampleJoinEstimator<'r, K, R> {
        SampleJoinEstimator {
            r1,
            stratified: StratifiedRelation::build(r2),
            cache: None,
            random,
        }
    }

    /// Drop all memoized normalisation state. Equivalent to passing
    /// `recompute_normalization = true` on the next call.
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Memoized total weight of the full join under the current configuration,
    /// None before the first estimation call (or after `invalidate`).
    pub fn normalization(&self) -> Option<f64> {
        self.cache.as_ref().map(|c| c.normalization)
    }

    /// Memoized total weight of the filter-passing part of the join.
    pub fn filtered_normalization(&self) -> Option<f64> {
        self.cache.as_ref().map(|c| c.filtered_normalization)
    }

    pub fn has_cached_cdf(&self) -> bool {
        self.cache.as_ref().map_or(false, |c| c.cdf.is_some())
    }

    /// The stratified probe relation backing this estimator.
    pub fn stratified(&self) -> &StratifiedRelation<K> {
        &self.stratified
    }

    fn compute_normalization<H1, H2, F, P1, P2>(
        &self,
        query: &JoinQuery<H1, H2, F, P1, P2>,
        stratum_weights: &StratumWeights<K>,
    ) -> NormalizationCache
    where
        H1: Fn(&K, f64) -> f64,
        P1: Fn(&K, f64) -> bool,
    {
        let mut normalization = 0.0;
        let mut filtered_normalization = 0.0;
        let mut sample_weights = Vec::with_capacity(self.r1.len());
        for (key, b) in self.r1 {
            let h1_weight = (query.h1)(key, *b);
            let weight = h1_weight * stratum_weights.total(key);
            normalization += weight;
            sample_weights.push(weight);
            if (query.r1_filter)(key, *b) {
                filtered_normalization += h1_weight * stratum_weights.filtered(key);
            }
        }
        NormalizationCache {
            normalization,
            filtered_normalization,
            sample_weights,
            cdf: None,
        }
    }

    /// One complete estimation: stratum weighting, (requested) normalisation and cdf
    /// recomputation, oversampled draw through `sampler`, sample-join materialization,
    /// filtering, trimming to exactly m filter-passing tuples and the rescaled
    /// Horvitz-Thompson reduction. Runs to completion or fails; no partial results.
    pub fn estimate<H1, H2, F, P1, P2, S>(
        &mut self,
        query: &JoinQuery<H1, H2, F, P1, P2>,
        m: usize,
        sampler: &S,
        recompute_normalization: bool,
        recompute_cdf: bool,
    ) -> Result<Estimate, SampleJoinError>
    where
        H1: Fn(&K, f64) -> f64,
        H2: Fn(f64) -> f64,
        F: Fn(&K, f64, f64) -> f64,
        P1: Fn(&K, f64) -> bool,
        P2: Fn(&K, f64) -> bool,
        S: RangeSampler + ?Sized,
    {
        if m == 0 {
            return Err(SampleJoinError::ZeroSampleSize);
        }
        if query.filter_selectivity <= 0.0 || query.filter_selectivity.is_nan() {
            return Err(SampleJoinError::NonPositiveSelectivity);
        }

        let stratum_weights = self.stratified.weigh(&query.h2, &query.r2_filter);

        if recompute_normalization || self.cache.is_none() {
            self.cache = Some(self.compute_normalization(query, &stratum_weights));
        }
        if recompute_cdf {
            if let Some(cache) = self.cache.as_mut() {
                cache.cdf = Some(cdf(&cache.sample_weights));
            }
        }
        let cache = self.cache.as_ref().expect("normalization cache was just filled");

        // A degenerate normalisation makes the rescaled estimate undefined no matter
        // what is sampled; report it before drawing anything.
        if query.filtered_estimator && cache.filtered_normalization == 0.0 {
            return Err(SampleJoinError::DegenerateNormalization { filtered: true });
        }
        if !query.filtered_estimator && cache.normalization == 0.0 {
            return Err(SampleJoinError::DegenerateNormalization { filtered: false });
        }

        let s_size = OVERSAMPLING_CONSTANT
            + (OVERSAMPLING_FACTOR * m as f64 / query.filter_selectivity).ceil() as usize;
        let indices = sampler.sample(s_size, &cache.sample_weights, cache.cdf.as_deref())?;

        // Materialize the sample join: each drawn build tuple gets one uniform
        // partner from its stratum. Drawn keys always have a stratum because
        // unmatched keys carry sampling weight zero.
        let mut sample: Vec<(K, f64, f64)> = Vec::with_capacity(indices.len());
        for i in indices {
            let (key, b) = &self.r1[i];
            let c = self
                .stratified
                .sample_partner(key, &self.random)
                .expect("sampled build tuple has no matching stratum");
            sample.push((key.clone(), *b, c));
        }

        let passes = |key: &K, b: f64, c: f64| (query.r1_filter)(key, b) && (query.r2_filter)(key, c);
        let mut filtered_count = sample.iter().filter(|(key, b, c)| passes(key, *b, *c)).count();
        if filtered_count < m {
            return Err(SampleJoinError::InsufficientFilteredSample {
                required: m,
                achieved: filtered_count,
            });
        }
        // Trim from the tail until exactly m filter-passing tuples remain, so the
        // output sample size is constant regardless of the oversampling slack.
        while filtered_count > m {
            if let Some((key, b, c)) = sample.pop() {
                if passes(&key, b, c) {
                    filtered_count -= 1;
                }
            }
        }

        let mut estimate = 0.0;
        for (key, b, c) in &sample {
            if passes(key, *b, *c) {
                let weight = (query.h1)(key, *b) * (query.h2)(*c);
                estimate += (query.aggregate)(key, *b, *c) / weight;
            }
        }

        if query.filtered_estimator {
            estimate *= cache.filtered_normalization / m as f64;
        } else {
            // Valid without a filter, or when the filter is independent of the
            // output distribution; not guaranteed to converge otherwise.
            estimate *= cache.normalization / sample.len() as f64;
        }

        Ok(Estimate {
            value: estimate,
            drawn: s_size,
            retained: sample.len(),
        })
    }
}
