/*
    Sample-join estimation: approximate aggregates (SUM-style) over the equi-join of a
    huge build relation R1 with a small probe relation R2, without ever materializing
    the join. The probe relation is stratified by join key once; build tuples are then
    drawn with probability proportional to h1(A, B) times the h2-weight of their
    stratum, resolved against a random stratum partner and reduced to a
    Horvitz-Thompson style estimate. With m samples the relative error shrinks like
    1/sqrt(m) under the documented independence/unbiasedness assumptions; the result
    is an estimate with bounded relative error, never an exact join.

    The sampling primitives are useful on their own: cdf-based exact weighted
    sampling, the heuristic two-stage (pilot) sampler for populations too large for
    an O(n) cdf pass, and the without-replacement weighted reservoir samplers from
    "Weighted random sampling with a reservoir" (Efraimidis and Spirakis, 2006),
    both the plain variant and the exponential-jump variant for very large streams.

    Everything randomized is generic over a source of uniform(0,1) draws so tests can
    inject seeded generators; everything is single-threaded and synchronous.
 */

pub mod cdf;
pub mod error;
pub mod estimator;
pub mod exact;
pub mod reservoir;
pub mod sampler;
pub mod stratify;

pub use error::SampleJoinError;
pub use estimator::{unfiltered_query, BuildTuple, Estimate, JoinQuery, SampleJoinEstimator};
pub use reservoir::WeightedReservoirSampler;
pub use sampler::{ExactSampler, HeuristicSampler, PilotHeuristic, RangeSampler};
pub use stratify::{ProbeTuple, StratifiedRelation, StratumWeights};
