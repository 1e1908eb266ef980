//! # landmark-eval
//!
//! Evaluate cascaded facial landmark trackers against labeled databases.
//!
//! This crate provides:
//! - **Sample preparation**: labeled shapes moved into the unit frame of their
//!   initial rectangles, one testing sample per image
//! - **Distance normalization**: per-sample interocular reference distances,
//!   selected by the database's landmark convention (IMM or iBUG)
//! - **Evaluation**: per-landmark errors divided by the reference distance,
//!   averaged per sample and over the database, computed in parallel
//! - **Collaborators**: a cascaded regression tracker and importers for IMM
//!   `.asf` and iBUG `.pts` databases
//!
//! ## Evaluation Protocol
//!
//! 1. Import the database; its annotation files decide the convention
//! 2. Normalize shapes and create testing samples
//! 3. For each sample, predict a shape from the initial rectangle
//! 4. Divide each landmark's pixel error by the ground-truth interocular
//!    distance and average over landmarks
//! 5. Average over samples; failed samples are excluded and counted
//!
//! ## Quick Start
//!
//! ```rust
//! use landmark_eval::{
//!     test_tracker, BoundingBox, CascadeTrackerBuilder, GrayImage, InputData,
//!     LandmarkDistanceNormalizer, Point, RegressionTree, SampleData, Shape,
//!     SimilarityTransform2D, TreeEnsemble,
//! };
//!
//! // A 68-point mean shape on a grid inside the unit rectangle.
//! let mean = Shape::new(
//!     (0..68)
//!         .map(|i| Point::new((i % 9) as f32 / 10.0 - 0.4, (i / 9) as f32 / 10.0 - 0.4))
//!         .collect(),
//! );
//! let stage = TreeEnsemble::new(vec![RegressionTree::constant(Shape::zeros(68))], 68);
//! let tracker = CascadeTrackerBuilder::new()
//!     .mean_shape(mean.clone())
//!     .add_cascade_stage(stage)
//!     .build()?;
//!
//! // One sample whose ground truth is exactly the tracker's starting guess.
//! let rect = BoundingBox::new(20.0, 20.0, 100.0, 100.0);
//! let truth = SimilarityTransform2D::unit_to_rect(&rect).apply_shape(&mean);
//! let image = GrayImage::from_fn(160, 160, |x, y| ((x + y) % 256) as u8);
//! let mut data = SampleData::new(InputData::new(vec![image], vec![truth], vec![rect])?);
//! data.create_testing_samples()?;
//!
//! let normalizer = LandmarkDistanceNormalizer::interocular_ibug();
//! let result = test_tracker(&data, &tracker, &normalizer)?;
//! assert!(result.mean_normalized_distance < 1e-4);
//! # Ok::<(), landmark_eval::Error>(())
//! ```
//!
//! ## Custom Trackers
//!
//! Anything implementing [`Tracker`] can be evaluated:
//!
//! ```rust
//! use landmark_eval::{BoundingBox, GrayImage, Result, Shape, Tracker};
//!
//! struct MyTracker;
//!
//! impl Tracker for MyTracker {
//!     fn num_landmarks(&self) -> usize {
//!         68
//!     }
//!
//!     fn predict(&self, _image: &GrayImage, _rect: &BoundingBox) -> Result<Shape> {
//!         Ok(Shape::zeros(68))
//!     }
//! }
//! ```

mod error;
pub mod evaluate;
mod features;
pub mod io;
mod normalizer;
mod sample;
mod tracker;
mod tree;
mod types;

pub use error::{Error, Result};
pub use evaluate::{
    evaluate, normalized_landmark_errors, test_tracker, EvaluationOptions, FailurePolicy,
    SampleOutcome, TestResult,
};
pub use features::{find_similarity_transform, GrayImage, ImageAccess, SimilarityTransform2D};
pub use io::{import_database, Database};
pub use normalizer::{DatabaseType, LandmarkConvention, LandmarkDistanceNormalizer};
pub use sample::{InputData, SampleData, TestingSample};
pub use tracker::{CascadeTracker, CascadeTrackerBuilder, Tracker};
pub use tree::{RegressionTree, Split, TreeEnsemble};
pub use types::{BoundingBox, Point, Shape};
