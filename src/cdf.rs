use crate::error::SampleJoinError;

/// Cumulative sums over a weight sequence: c[i] = w[0] + ... + w[i].
/// Zero weights produce repeated values; index resolution against such a cdf
/// has to land strictly inside an index's weight span (see [`resolve`]) so
/// that zero-weight entries are never hit, not even by a draw of exactly 0.
pub fn cdf(weights: &[f64]) -> Vec<f64> {
    let mut cumulative = Vec::with_capacity(weights.len());
    let mut sum = 0.0;
    for w in weights {
        sum += w;
        cumulative.push(sum);
    }
    cumulative
}

/// Smallest index whose cdf value exceeds u, clamped to the last index. O(log k).
/// Index i covers the half-open span [c[i-1], c[i]), so a zero-weight entry has
/// an empty span and can never be returned for u in [0, total).
pub(crate) fn resolve(cdf: &[f64], u: f64) -> usize {
    cdf.partition_point(|&c| c <= u).min(cdf.len() - 1)
}

/// m independent with-replacement draws from [0, |weights|), each index drawn with
/// probability proportional to its weight. If the caller has a precomputed cdf over
/// exactly these weights it is used directly, otherwise one is built (O(|weights|));
/// every draw is then a binary search.
pub fn weighted_sample_indices<R: Fn() -> f64>(
    m: usize,
    weights: &[f64],
    precomputed_cdf: Option<&[f64]>,
    random: &R,
) -> Result<Vec<usize>, SampleJoinError> {
    let owned_cdf;
    let cdf = match precomputed_cdf {
        Some(c) => c,
        None => {
            owned_cdf = cdf(weights);
            &owned_cdf
        }
    };
    let total = cdf.last().copied().unwrap_or(0.0);
    if total <= 0.0 {
        return Err(SampleJoinError::ZeroWeightPopulation);
    }
    let mut result = Vec::with_capacity(m);
    for _ in 0..m {
        result.push(resolve(cdf, random() * total));
    }
    Ok(result)
}

/// m uniform with-replacement draws from [0, n). n must be positive.
pub fn uniform_sample_indices<R: Fn() -> f64>(m: usize, n: usize, random: &R) -> Vec<usize> {
    assert!(n > 0, "empty population");
    (0..m)
        .map(|_| ((random() * n as f64) as usize).min(n - 1))
        .collect()
}
