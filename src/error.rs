use std::error::Error;
use std::fmt::{Display, Formatter};

/// Errors fall into three groups:
/// - configuration errors (`ZeroWeightPopulation`, `SampleLargerThanPopulation`,
///   `PilotLargerThanPopulation`, `ZeroSampleSize`, `NonPositiveSelectivity`):
///   caller mistakes, detected eagerly and never retried internally
/// - precondition violations (`InsufficientFilteredSample`): the oversampling slack was
///   too small for the actual filter selectivity
/// - numeric degeneracy (`DegenerateNormalization`): the corrected estimate is undefined,
///   reported distinctly from a valid zero estimate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleJoinError {
    ZeroWeightPopulation,
    SampleLargerThanPopulation { m: usize, population: usize },
    PilotLargerThanPopulation { pilot: usize, population: usize },
    ZeroSampleSize,
    NonPositiveSelectivity,
    InsufficientFilteredSample { required: usize, achieved: usize },
    DegenerateNormalization { filtered: bool },
}

impl Display for SampleJoinError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            SampleJoinError::ZeroWeightPopulation =>
                write!(f, "All sampling weights are zero, the distribution is undefined"),
            SampleJoinError::SampleLargerThanPopulation { m, population } =>
                write!(f, "Sample size {} exceeds population size {}", m, population),
            SampleJoinError::PilotLargerThanPopulation { pilot, population } =>
                write!(f, "Heuristic pilot size {} exceeds population size {}, use the exact sampler instead", pilot, population),
            SampleJoinError::ZeroSampleSize =>
                write!(f, "Requested sample size is zero"),
            SampleJoinError::NonPositiveSelectivity =>
                write!(f, "Filter selectivity must be positive for the oversampled draw size to be finite"),
            SampleJoinError::InsufficientFilteredSample { required, achieved } =>
                write!(f, "Only {} of the required {} oversampled tuples survived the filter, increase the oversampling slack or lower the selectivity estimate", achieved, required),
            SampleJoinError::DegenerateNormalization { filtered } =>
                write!(f, "The {}normalization constant is zero, the rescaled estimate is undefined", if *filtered { "filtered " } else { "" }),
        }
    }
}

impl Error for SampleJoinError {}
