/*
    Streaming without-replacement samplers over the build relation, based on
    "Weighted random sampling with a reservoir" (Efraimidis and Spirakis, 2006).

    Both weighted variants assign item i the key U_i^(1/w[i]) with U_i uniform in
    [0,1) and keep the m largest keys. Alg-A draws one key per stream item. Alg-A
    with exponential jumps (A-ExpJ) instead skips whole runs of items that cannot
    beat the current reservoir minimum: the weight mass to skip is derived from
    ln(r)/ln(min_key), and the landing item's replacement key is drawn from its
    admissible sub-range (min_key^w, 1) rather than the full unit interval. Both
    produce the same sampling distribution; A-ExpJ draws far fewer random numbers
    when n is much larger than m.
 */

use crate::error::SampleJoinError;

/// One sampled item: its Efraimidis-Spirakis key and its index in the stream.
/// Keys induce a valid sampling order; callers that only need the sampled items
/// discard them.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ReservoirEntry {
    pub key: f64,
    pub index: usize,
}

// Fixed-size reservoir ordered by ascending key, so the eviction candidate is
// always at index 0.
struct Reservoir {
    entries: Vec<ReservoirEntry>,
}

impl Reservoir {
    fn seed(mut entries: Vec<ReservoirEntry>) -> Reservoir {
        entries.sort_by(|a, b| a.key.total_cmp(&b.key));
        Reservoir { entries }
    }

    fn min_key(&self) -> f64 {
        self.entries[0].key
    }

    // Evict the minimum and insert an entry whose key beats it, keeping the
    // ascending order. O(m) worst case per insertion.
    fn replace_min(&mut self, entry: ReservoirEntry) {
        let pos = self.entries.partition_point(|e| e.key < entry.key);
        self.entries.copy_within(1..pos, 0);
        self.entries[pos - 1] = entry;
    }
}

pub struct WeightedReservoirSampler<R: Fn() -> f64 = fn() -> f64> {
    random: R,
}

impl WeightedReservoirSampler<fn() -> f64> {
    pub fn new() -> WeightedReservoirSampler<fn() -> f64> {
        WeightedReservoirSampler::with_random(|| rand::random())
    }
}

impl Default for WeightedReservoirSampler<fn() -> f64> {
    fn default() -> Self {
        WeightedReservoirSampler::new()
    }
}

impl<R: Fn() -> f64> WeightedReservoirSampler<R> {
    pub fn with_random(random: R) -> WeightedReservoirSampler<R> {
        WeightedReservoirSampler { random }
    }

    fn key_for(&self, weight: f64) -> f64 {
        (self.random)().powf(1.0 / weight)
    }

    fn seed_reservoir(&self, weights: &[f64], m: usize) -> Reservoir {
        let entries = weights[..m]
            .iter()
            .enumerate()
            .map(|(index, &w)| ReservoirEntry { key: self.key_for(w), index })
            .collect();
        Reservoir::seed(entries)
    }

    /// Alg-A: a without-replacement weighted sample of size m over the weight
    /// stream, one key draw per item, single pass, O(n) time, O(m) space.
    /// Returns exactly m entries ordered by ascending key.
    pub fn sample(&self, weights: &[f64], m: usize) -> Result<Vec<ReservoirEntry>, SampleJoinError> {
        if m > weights.len() {
            return Err(SampleJoinError::SampleLargerThanPopulation { m, population: weights.len() });
        }
        if m == 0 {
            return Ok(Vec::new());
        }
        let mut reservoir = self.seed_reservoir(weights, m);
        for (index, &w) in weights.iter().enumerate().skip(m) {
            let key = self.key_for(w);
            if key > reservoir.min_key() {
                reservoir.replace_min(ReservoirEntry { key, index });
            }
        }
        Ok(reservoir.entries)
    }

    /// Alg-A with exponential jumps: same sampling distribution as [`Self::sample`],
    /// but the expected number of random draws is O(m log(n/m)) instead of O(n).
    pub fn sample_exp(&self, weights: &[f64], m: usize) -> Result<Vec<ReservoirEntry>, SampleJoinError> {
        if m > weights.len() {
            return Err(SampleJoinError::SampleLargerThanPopulation { m, population: weights.len() });
        }
        if m == 0 {
            return Ok(Vec::new());
        }
        let mut reservoir = self.seed_reservoir(weights, m);
        let n = weights.len();
        let mut i = m;
        while i < n {
            // Weight mass to consume before the next reservoir insertion
            let mut jump = (self.random)().ln() / reservoir.min_key().ln();
            while i < n && jump > weights[i] {
                jump -= weights[i];
                i += 1;
            }
            if i >= n {
                // No remaining item can cross the jump threshold
                break;
            }
            // Item i crosses the threshold. Its key must beat the current minimum,
            // so it is drawn uniformly from (min_key^w[i], 1) before the root.
            let low = reservoir.min_key().powf(weights[i]);
            let r2 = (self.random)() * (1.0 - low) + low;
            let key = r2.powf(1.0 / weights[i]);
            // Rounding can collapse the admissible range onto min_key itself,
            // in which case the landing item cannot evict anything.
            if key > reservoir.min_key() {
                reservoir.replace_min(ReservoirEntry { key, index: i });
            }
            i += 1;
        }
        Ok(reservoir.entries)
    }

    /// Unweighted reservoir sampling (Vitter's Alg-R): a without-replacement
    /// uniform sample of m indices over [0, n), single pass, O(m) space.
    pub fn sample_uniform(&self, n: usize, m: usize) -> Result<Vec<usize>, SampleJoinError> {
        if m > n {
            return Err(SampleJoinError::SampleLargerThanPopulation { m, population: n });
        }
        let mut result: Vec<usize> = (0..m).collect();
        for i in m..n {
            // P((self.random)() * i < m) = m/i: item i replaces a random slot
            if (self.random)() * (i as f64) < m as f64 {
                let slot = (((self.random)() * m as f64) as usize).min(m - 1);
                result[slot] = i;
            }
        }
        Ok(result)
    }
}
