use std::hash::Hash;

use crate::estimator::BuildTuple;
use crate::stratify::{ProbeTuple, StratifiedRelation};

/// Exact aggregate over the (filtered) equi-join, plus the join sizes needed to
/// derive the true filter selectivity. Computed stratum by stratum without
/// materializing the join as a whole, O(n1 + n2 + |J|). Intended as the ground
/// truth the sampling estimators are verified against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExactAggregate {
    pub aggregate: f64,
    pub join_size: u64,
    pub filtered_join_size: u64,
}

impl ExactAggregate {
    /// Fraction of join results surviving the filters, 0 for an empty join.
    pub fn selectivity(&self) -> f64 {
        if self.join_size == 0 {
            0.0
        } else {
            self.filtered_join_size as f64 / self.join_size as f64
        }
    }
}

pub fn exact_join_aggregate<K, F, P1, P2>(
    r1: &[BuildTuple<K>],
    r2: &[ProbeTuple<K>],
    aggregate: &F,
    r1_filter: &P1,
    r2_filter: &P2,
) -> ExactAggregate
where
    K: Eq + Hash + Clone,
    F: Fn(&K, f64, f64) -> f64,
    P1: Fn(&K, f64) -> bool,
    P2: Fn(&K, f64) -> bool,
{
    let stratified = StratifiedRelation::build(r2);
    let mut result = ExactAggregate {
        aggregate: 0.0,
        join_size: 0,
        filtered_join_size: 0,
    };
    for (key, b) in r1 {
        let stratum = match stratified.stratum(key) {
            Some(stratum) => stratum,
            None => continue, // key does not join
        };
        result.join_size += stratum.len() as u64;
        if !r1_filter(key, *b) {
            continue;
        }
        for &c in stratum {
            if r2_filter(key, c) {
                result.aggregate += aggregate(key, *b, c);
                result.filtered_join_size += 1;
            }
        }
    }
    result
}
