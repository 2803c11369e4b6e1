use std::path::Path;

use tracing::info;

use crate::models::{AggregateResult, ModelId, ModelVerdict, UploadPair};
use crate::resolution::check_low_resolution;
use crate::verifier::{self, FaceVerifier};

/// One verdict per model, in the order given.
pub fn aggregate(
    verifier: &dyn FaceVerifier,
    first: &Path,
    second: &Path,
    models: &[ModelId],
) -> Vec<ModelVerdict> {
    models
        .iter()
        .map(|model| verifier::verify(verifier, first, second, *model))
        .collect()
}

/// Most frequent boolean among determined verdicts.
///
/// On an exact tie the value of the earliest determined verdict wins.
/// Returns `None` only if no verdict was determined.
pub fn majority(verdicts: &[ModelVerdict]) -> Option<bool> {
    // (value, count) in first-seen order
    let mut tally: Vec<(bool, usize)> = Vec::with_capacity(2);
    for vote in verdicts.iter().filter_map(ModelVerdict::verified) {
        match tally.iter_mut().find(|(value, _)| *value == vote) {
            Some((_, count)) => *count += 1,
            None => tally.push((vote, 1)),
        }
    }

    tally
        .into_iter()
        .fold(None, |best: Option<(bool, usize)>, (value, count)| match best {
            Some((_, best_count)) if best_count >= count => best,
            _ => Some((value, count)),
        })
        .map(|(value, _)| value)
}

/// Full comparison of a stored pair: model vote plus resolution check.
pub fn compare(
    verifier: &dyn FaceVerifier,
    pair: &UploadPair,
    models: &[ModelId],
    min_dimension: u32,
) -> AggregateResult {
    let verdicts = aggregate(verifier, &pair.first.path, &pair.second.path, models);
    let majority = majority(&verdicts);
    let low_resolution = check_low_resolution(&pair.first.path, &pair.second.path, min_dimension);

    info!(
        image1 = %pair.first.name,
        image2 = %pair.second.name,
        determined = verdicts.iter().filter(|v| v.verified().is_some()).count(),
        ?majority,
        low_resolution,
        "comparison finished"
    );

    AggregateResult {
        majority,
        low_resolution,
        image1: pair.first.name.clone(),
        image2: pair.second.name.clone(),
        verdicts,
    }
}
