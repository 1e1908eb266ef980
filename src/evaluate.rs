//! Tracker evaluation by normalized landmark error.
//!
//! For every testing sample the tracker predicts a shape from the sample's
//! rectangle. The Euclidean distance of each predicted landmark to its ground
//! truth is divided by the sample's reference distance, averaged over the
//! landmarks, and the per-sample values are averaged over the database.

use std::sync::atomic::{AtomicUsize, Ordering};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::normalizer::LandmarkDistanceNormalizer;
use crate::sample::{SampleData, TestingSample};
use crate::tracker::Tracker;
use crate::types::Shape;

/// What to do when a single sample cannot be scored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Exclude the sample from every aggregate and count it.
    #[default]
    SkipAndCount,
    /// Stop the run at the first failing sample (lowest index). Samples
    /// after a known failure are not predicted.
    Abort,
}

#[derive(Debug, Clone, Default)]
pub struct EvaluationOptions {
    pub failure_policy: FailurePolicy,
    /// Size of a dedicated worker pool; `None` uses the global rayon pool.
    pub threads: Option<usize>,
}

/// Outcome for one sample, in sample order.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SampleOutcome {
    Evaluated { normalized_distance: f64 },
    Failed { reason: String },
}

impl SampleOutcome {
    pub fn normalized_distance(&self) -> Option<f64> {
        match self {
            SampleOutcome::Evaluated {
                normalized_distance,
            } => Some(*normalized_distance),
            SampleOutcome::Failed { .. } => None,
        }
    }
}

/// Aggregate evaluation result.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestResult {
    /// Mean over evaluated samples of the mean normalized landmark error.
    pub mean_normalized_distance: f64,
    pub median_normalized_distance: f64,
    /// Mean normalized error of each landmark over evaluated samples.
    pub per_landmark: Vec<f64>,
    pub per_sample: Vec<SampleOutcome>,
    pub evaluated_count: usize,
    pub failure_count: usize,
}

/// Per-landmark normalized errors of a predicted shape.
///
/// Fails with `ShapeMismatch` when the shapes are not index aligned, with
/// `Prediction` when a predicted landmark is not finite, and with the
/// normalizer's errors when the reference distance is unusable.
pub fn normalized_landmark_errors(
    predicted: &Shape,
    ground_truth: &Shape,
    normalizer: &LandmarkDistanceNormalizer,
) -> Result<Vec<f64>> {
    if predicted.num_landmarks() != ground_truth.num_landmarks() {
        return Err(Error::ShapeMismatch {
            expected: ground_truth.num_landmarks(),
            actual: predicted.num_landmarks(),
        });
    }
    if let Some(i) = predicted.points.iter().position(|p| !p.is_finite()) {
        return Err(Error::Prediction(format!(
            "landmark {} is not finite: {:?}",
            i, predicted.points[i]
        )));
    }
    let reference = normalizer.reference_distance(ground_truth)?;
    Ok(predicted
        .points
        .iter()
        .zip(&ground_truth.points)
        .map(|(p, q)| p.distance(q) / reference)
        .collect())
}

/// Evaluate with default options (skip-and-count, global thread pool).
pub fn test_tracker<T: Tracker + ?Sized>(
    data: &SampleData,
    tracker: &T,
    normalizer: &LandmarkDistanceNormalizer,
) -> Result<TestResult> {
    evaluate(data, tracker, normalizer, &EvaluationOptions::default())
}

/// Run `tracker` on every testing sample of `data` and aggregate the
/// normalized errors.
///
/// Configuration problems (no samples, normalizer indices outside the
/// ground-truth shapes, a tracker built for another landmark count) are
/// reported before the tracker is invoked.
pub fn evaluate<T: Tracker + ?Sized>(
    data: &SampleData,
    tracker: &T,
    normalizer: &LandmarkDistanceNormalizer,
    options: &EvaluationOptions,
) -> Result<TestResult> {
    if data.samples.is_empty() {
        return Err(Error::EmptyDataset);
    }
    let num_landmarks = data.samples[0].target.num_landmarks();
    for sample in &data.samples {
        normalizer.validate(sample.target.num_landmarks())?;
    }
    if tracker.num_landmarks() != num_landmarks {
        return Err(Error::ShapeMismatch {
            expected: num_landmarks,
            actual: tracker.num_landmarks(),
        });
    }

    let mut outcomes = match options.threads {
        Some(threads) => {
            let pool = rayon::ThreadPoolBuilder::new()
                .num_threads(threads)
                .build()?;
            pool.install(|| score_samples(data, tracker, normalizer, options.failure_policy))
        }
        None => score_samples(data, tracker, normalizer, options.failure_policy),
    };

    if options.failure_policy == FailurePolicy::Abort {
        if let Some(index) = outcomes.iter().position(|o| matches!(o, Some(Err(_)))) {
            if let Some(Err(source)) = outcomes.swap_remove(index) {
                return Err(Error::SampleFailed {
                    index,
                    source: Box::new(source),
                });
            }
        }
    }

    // Only an aborting run leaves samples unscored, and it returned above.
    aggregate(outcomes.into_iter().flatten().collect(), num_landmarks)
}

/// Scores land in an index-ordered vector. Under `Abort`, a sample whose index
/// is past a failure already seen is left as `None`; every sample before the
/// lowest failing index is still scored, so that failure is always found.
fn score_samples<T: Tracker + ?Sized>(
    data: &SampleData,
    tracker: &T,
    normalizer: &LandmarkDistanceNormalizer,
    policy: FailurePolicy,
) -> Vec<Option<Result<Vec<f64>>>> {
    let first_failure = AtomicUsize::new(usize::MAX);
    data.samples
        .par_iter()
        .enumerate()
        .map(|(index, sample)| {
            if policy == FailurePolicy::Abort && index > first_failure.load(Ordering::Relaxed) {
                return None;
            }
            let scored = score_sample(data, sample, tracker, normalizer);
            if scored.is_err() {
                first_failure.fetch_min(index, Ordering::Relaxed);
            }
            Some(scored)
        })
        .collect()
}

fn score_sample<T: Tracker + ?Sized>(
    data: &SampleData,
    sample: &TestingSample,
    tracker: &T,
    normalizer: &LandmarkDistanceNormalizer,
) -> Result<Vec<f64>> {
    let predicted = tracker.predict(data.image(sample), &sample.rect)?;
    let errors = normalized_landmark_errors(&predicted, sample.target_in_image(), normalizer)?;
    debug!(
        sample = sample.input_idx,
        error = mean_sorted(errors.clone()),
        "scored sample"
    );
    Ok(errors)
}

fn aggregate(outcomes: Vec<Result<Vec<f64>>>, num_landmarks: usize) -> Result<TestResult> {
    let mut per_sample = Vec::with_capacity(outcomes.len());
    let mut sample_errors = Vec::with_capacity(outcomes.len());
    let mut landmark_columns: Vec<Vec<f64>> = vec![Vec::new(); num_landmarks];

    for (index, outcome) in outcomes.into_iter().enumerate() {
        match outcome {
            Ok(errors) => {
                let d = mean_sorted(errors.clone());
                for (column, e) in landmark_columns.iter_mut().zip(errors) {
                    column.push(e);
                }
                sample_errors.push(d);
                per_sample.push(SampleOutcome::Evaluated {
                    normalized_distance: d,
                });
            }
            Err(err) => {
                warn!(sample = index, error = %err, "skipping sample");
                per_sample.push(SampleOutcome::Failed {
                    reason: err.to_string(),
                });
            }
        }
    }

    let evaluated_count = sample_errors.len();
    let failure_count = per_sample.len() - evaluated_count;
    if evaluated_count == 0 {
        return Err(Error::NoSuccessfulSamples {
            failed: failure_count,
        });
    }

    let median_normalized_distance = median(&sample_errors);
    let mean_normalized_distance = mean_sorted(sample_errors);
    let per_landmark = landmark_columns.into_iter().map(mean_sorted).collect();

    info!(
        mean = mean_normalized_distance,
        evaluated = evaluated_count,
        failed = failure_count,
        "evaluation finished"
    );

    Ok(TestResult {
        mean_normalized_distance,
        median_normalized_distance,
        per_landmark,
        per_sample,
        evaluated_count,
        failure_count,
    })
}

/// Arithmetic mean summed in ascending order, so the result does not depend
/// on the order of `values`. NaN for an empty input.
fn mean_sorted(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.sort_by(f64::total_cmp);
    values.iter().sum::<f64>() / values.len() as f64
}

fn median(values: &[f64]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    if n == 0 {
        f64::NAN
    } else if n % 2 == 1 {
        sorted[n / 2]
    } else {
        (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
    }
}
