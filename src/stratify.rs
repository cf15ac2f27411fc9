use std::collections::HashMap;
use std::hash::Hash;

use crate::cdf::{cdf, resolve};

/// A row of the probe relation R2: join key plus payload C.
pub type ProbeTuple<K> = (K, f64);

/// The probe relation partitioned by join key. The strata partition R2 exactly:
/// every tuple lands in the stratum of its key and nowhere else, and the original
/// row order is preserved within each stratum. Building is O(n2).
///
/// The partition itself only depends on R2. Weighting a stratification under a
/// probe-side weighting function and selection filter is a separate, repeatable
/// step ([`StratifiedRelation::weigh`]), so one stratification can serve many
/// differently-weighted estimations.
pub struct StratifiedRelation<K> {
    strata: HashMap<K, Vec<f64>, ahash::RandomState>,
}

impl<K: Eq + Hash + Clone> StratifiedRelation<K> {
    pub fn build(r2: &[ProbeTuple<K>]) -> StratifiedRelation<K> {
        let mut strata: HashMap<K, Vec<f64>, ahash::RandomState> = HashMap::default();
        for (key, c) in r2 {
            strata.entry(key.clone()).or_default().push(*c);
        }
        StratifiedRelation { strata }
    }

    /// The payloads of all probe tuples sharing the given key, in relation order.
    pub fn stratum(&self, key: &K) -> Option<&[f64]> {
        self.strata.get(key).map(|s| s.as_slice())
    }

    pub fn num_keys(&self) -> usize {
        self.strata.len()
    }

    pub fn num_tuples(&self) -> usize {
        self.strata.values().map(|s| s.len()).sum()
    }

    /// Per-stratum weight sums under h2: the total weight, the weight restricted to
    /// tuples passing the probe-side filter, and a cdf over the stratum's weights
    /// for weighted partner draws. O(n2) across all strata, R2 is not mutated, so
    /// this can be called repeatedly with different h2 or filters.
    pub fn weigh<H2, P2>(&self, h2: &H2, r2_filter: &P2) -> StratumWeights<K>
    where
        H2: Fn(f64) -> f64,
        P2: Fn(&K, f64) -> bool,
    {
        let mut weights: HashMap<K, StratumWeight, ahash::RandomState> = HashMap::default();
        for (key, stratum) in &self.strata {
            let mut total = 0.0;
            let mut filtered = 0.0;
            let mut stratum_weights = Vec::with_capacity(stratum.len());
            for &c in stratum {
                let w = h2(c);
                total += w;
                if r2_filter(key, c) {
                    filtered += w;
                }
                stratum_weights.push(w);
            }
            weights.insert(
                key.clone(),
                StratumWeight {
                    total,
                    filtered,
                    cdf: cdf(&stratum_weights),
                },
            );
        }
        StratumWeights { weights }
    }

    /// One probe-side partner for a sampled build tuple, uniform within the matching
    /// stratum. Returns None for keys that never occur in the probe relation; the
    /// estimator never selects such build tuples because their sampling weight is zero.
    pub fn sample_partner<R: Fn() -> f64>(&self, key: &K, random: &R) -> Option<f64> {
        self.strata.get(key).map(|stratum| {
            let i = ((random() * stratum.len() as f64) as usize).min(stratum.len() - 1);
            stratum[i]
        })
    }

    /// Partner draw proportional to h2 within the stratum, resolved against the
    /// stratum cdf memoized in `weights`. Returns None when the key has no stratum
    /// or the stratum's total weight is zero.
    pub fn sample_partner_weighted<R: Fn() -> f64>(
        &self,
        key: &K,
        weights: &StratumWeights<K>,
        random: &R,
    ) -> Option<f64> {
        let stratum = self.strata.get(key)?;
        let stratum_weight = weights.get(key)?;
        if stratum_weight.total <= 0.0 {
            return None;
        }
        let i = resolve(&stratum_weight.cdf, random() * stratum_weight.total);
        Some(stratum[i])
    }
}

/// Summed h2-weights of one stratum. The filtered sum only counts tuples passing
/// the probe-side filter, so filtered <= total always holds. The cdf has one entry
/// per stratum tuple and ends at the total.
pub struct StratumWeight {
    pub total: f64,
    pub filtered: f64,
    pub cdf: Vec<f64>,
}

/// Per-key weight sums of a whole stratification, the probe-side half of the
/// global sampling weight vector: a build tuple's sampling weight is
/// h1(A, B) * total(A), zero when A has no stratum.
pub struct StratumWeights<K> {
    weights: HashMap<K, StratumWeight, ahash::RandomState>,
}

impl<K: Eq + Hash> StratumWeights<K> {
    pub fn get(&self, key: &K) -> Option<&StratumWeight> {
        self.weights.get(key)
    }

    /// Total h2-weight of the key's stratum, 0 if the key never joins.
    pub fn total(&self, key: &K) -> f64 {
        self.weights.get(key).map_or(0.0, |w| w.total)
    }

    /// Filtered h2-weight of the key's stratum, 0 if the key never joins.
    pub fn filtered(&self, key: &K) -> f64 {
        self.weights.get(key).map_or(0.0, |w| w.filtered)
    }
}

#[cfg(test)]
mod test {
    use std::cell::RefCell;

    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::*;

    fn probe_relation() -> Vec<ProbeTuple<u64>> {
        vec![(1, 10.0), (2, 20.0), (1, 11.0), (3, 30.0), (1, 12.0), (2, 21.0)]
    }

    #[test]
    fn strata_partition_the_relation() {
        let r2 = probe_relation();
        let stratified = StratifiedRelation::build(&r2);
        assert_eq!(stratified.num_keys(), 3);
        assert_eq!(stratified.num_tuples(), r2.len());
        assert_eq!(stratified.stratum(&1), Some(&[10.0, 11.0, 12.0][..]));
        assert_eq!(stratified.stratum(&2), Some(&[20.0, 21.0][..]));
        assert_eq!(stratified.stratum(&3), Some(&[30.0][..]));
        assert_eq!(stratified.stratum(&4), None);
    }

    #[test]
    fn weigh_sums_and_cdfs_per_stratum() {
        let stratified = StratifiedRelation::build(&probe_relation());
        let weights = stratified.weigh(&|c| c, &|_, _| true);
        assert_eq!(weights.total(&1), 33.0);
        assert_eq!(weights.total(&2), 41.0);
        assert_eq!(weights.total(&3), 30.0);
        assert_eq!(weights.total(&4), 0.0);
        let stratum_1 = weights.get(&1).unwrap();
        assert_eq!(stratum_1.cdf, vec![10.0, 21.0, 33.0]);
        assert_eq!(stratum_1.filtered, stratum_1.total);
    }

    #[test]
    fn filtered_weight_never_exceeds_total() {
        let stratified = StratifiedRelation::build(&probe_relation());
        let weights = stratified.weigh(&|c| c, &|_, c| c < 15.0);
        assert_eq!(weights.total(&1), 33.0);
        assert_eq!(weights.filtered(&1), 33.0);
        assert_eq!(weights.total(&2), 41.0);
        assert_eq!(weights.filtered(&2), 0.0);
        for key in [1u64, 2, 3] {
            let w = weights.get(&key).unwrap();
            assert!(w.filtered <= w.total);
            assert!((w.cdf.last().unwrap() - w.total).abs() < 1e-12);
        }
    }

    #[test]
    fn reweighing_does_not_mutate_the_stratification() {
        let stratified = StratifiedRelation::build(&probe_relation());
        let unit = stratified.weigh(&|_| 1.0, &|_, _| true);
        assert_eq!(unit.total(&1), 3.0);
        let linear = stratified.weigh(&|c| c, &|_, _| true);
        assert_eq!(linear.total(&1), 33.0);
        assert_eq!(stratified.stratum(&1), Some(&[10.0, 11.0, 12.0][..]));
    }

    #[test]
    fn uniform_partner_draws_cover_the_stratum() {
        let stratified = StratifiedRelation::build(&probe_relation());
        let rng = RefCell::new(StdRng::seed_from_u64(42));
        let random = || rng.borrow_mut().gen::<f64>();
        let mut counts = [0usize; 3];
        for _ in 0..30_000 {
            let c = stratified.sample_partner(&1, &random).unwrap();
            counts[(c - 10.0) as usize] += 1;
        }
        for count in counts {
            assert!((9_000..11_000).contains(&count), "partner drawn {} times", count);
        }
        assert_eq!(stratified.sample_partner(&99, &random), None);
    }

    #[test]
    fn weighted_partner_draws_follow_h2() {
        let r2 = vec![(1u64, 1.0), (1, 9.0)];
        let stratified = StratifiedRelation::build(&r2);
        let weights = stratified.weigh(&|c| c, &|_, _| true);
        let rng = RefCell::new(StdRng::seed_from_u64(4242));
        let random = || rng.borrow_mut().gen::<f64>();
        let mut heavy = 0;
        for _ in 0..50_000 {
            if stratified.sample_partner_weighted(&1, &weights, &random).unwrap() == 9.0 {
                heavy += 1;
            }
        }
        let fraction = heavy as f64 / 50_000.0;
        assert!((fraction - 0.9).abs() < 0.01, "fraction of heavy partner: {}", fraction);
    }

    #[test]
    fn weighted_partner_is_undefined_for_zero_weight_strata() {
        let r2 = vec![(1u64, 1.0)];
        let stratified = StratifiedRelation::build(&r2);
        let weights = stratified.weigh(&|_| 0.0, &|_, _| true);
        let rng = RefCell::new(StdRng::seed_from_u64(7));
        assert_eq!(
            stratified.sample_partner_weighted(&1, &weights, &|| rng.borrow_mut().gen()),
            None
        );
    }
}
