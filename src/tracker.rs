use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::features::{find_similarity_transform, sample_bilinear, GrayImage, SimilarityTransform2D};
use crate::tree::{Split, TreeEnsemble};
use crate::types::{BoundingBox, Point, Shape};

/// Capability the evaluation engine needs from a landmark tracker.
///
/// Implementations must be deterministic and safe to share across threads;
/// the engine calls `predict` concurrently on one instance.
pub trait Tracker: Sync {
    /// Number of landmarks in every predicted shape.
    fn num_landmarks(&self) -> usize;

    /// Predict an image-space shape starting from the initial rectangle.
    fn predict(&self, image: &GrayImage, rect: &BoundingBox) -> Result<Shape>;
}

/// Cascaded regression tracker.
///
/// Works in the unit-rectangle frame: the mean shape is the starting
/// estimate, each cascade stage adds a delta predicted from shape-indexed
/// pixel differences, and the result is mapped into the image through the
/// rectangle's similarity transform.
///
/// ```ignore
/// let tracker = CascadeTracker::load("tracker.bin")?;
/// let shape = tracker.predict(&image, &BoundingBox::new(100.0, 80.0, 120.0, 120.0))?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeTracker {
    /// Mean shape in the unit-rectangle frame.
    mean_shape: Shape,
    cascade: Vec<TreeEnsemble>,
}

impl CascadeTracker {
    pub fn new(mean_shape: Shape, cascade: Vec<TreeEnsemble>) -> Result<Self> {
        let tracker = Self {
            mean_shape,
            cascade,
        };
        tracker.validate()?;
        Ok(tracker)
    }

    /// Load a tracker from a bincode file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::open(path)?;
        let mut reader = BufReader::new(file);
        let mut bytes = Vec::new();
        reader.read_to_end(&mut bytes)?;
        let tracker: Self = bincode::deserialize(&bytes)?;
        tracker.validate()?;
        Ok(tracker)
    }

    /// Save the tracker to a bincode file.
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        let bytes = bincode::serialize(self)?;
        writer.write_all(&bytes)?;
        writer.flush()?;
        Ok(())
    }

    pub fn mean_shape(&self) -> &Shape {
        &self.mean_shape
    }

    pub fn num_cascade_stages(&self) -> usize {
        self.cascade.len()
    }

    fn validate(&self) -> Result<()> {
        let n = self.mean_shape.num_landmarks();
        if n == 0 {
            return Err(Error::InvalidModel("Mean shape has no landmarks".into()));
        }
        if self.cascade.is_empty() {
            return Err(Error::InvalidModel(
                "Cascade must have at least one stage".into(),
            ));
        }
        self.cascade.iter().try_for_each(|stage| stage.validate(n))
    }
}

impl Tracker for CascadeTracker {
    fn num_landmarks(&self) -> usize {
        self.mean_shape.num_landmarks()
    }

    fn predict(&self, image: &GrayImage, rect: &BoundingBox) -> Result<Shape> {
        if image.is_empty() {
            return Err(Error::Prediction("image has no pixels".into()));
        }
        if !rect.is_valid() {
            return Err(Error::Prediction(format!(
                "invalid initial rectangle {:?}",
                rect
            )));
        }

        let shape_to_image = SimilarityTransform2D::unit_to_rect(rect);
        let mut current = self.mean_shape.clone();

        for stage in &self.cascade {
            // Offsets and deltas live in the mean-shape frame; carry them
            // along with the current estimate's pose.
            let mean_to_current = find_similarity_transform(&self.mean_shape, &current);

            let pixel = |landmark: u16, offset: Point| {
                let p = current[landmark as usize] + mean_to_current.apply_linear(offset);
                let q = shape_to_image.apply(p);
                sample_bilinear(image, q.x, q.y)
            };
            let intensity_difference =
                |split: &Split| pixel(split.landmark_a, split.offset_a) - pixel(split.landmark_b, split.offset_b);

            let delta = stage.predict(intensity_difference);
            for (p, d) in current.points.iter_mut().zip(&delta.points) {
                *p += mean_to_current.apply_linear(*d);
            }
        }

        let predicted = shape_to_image.apply_shape(&current);
        if predicted.points.iter().any(|p| !p.is_finite()) {
            return Err(Error::Prediction("non-finite landmark estimate".into()));
        }
        Ok(predicted)
    }
}

/// Builder for assembling a [`CascadeTracker`] stage by stage.
pub struct CascadeTrackerBuilder {
    mean_shape: Option<Shape>,
    cascade: Vec<TreeEnsemble>,
}

impl CascadeTrackerBuilder {
    pub fn new() -> Self {
        Self {
            mean_shape: None,
            cascade: Vec::new(),
        }
    }

    /// Set the mean shape (initial estimate) in the unit-rectangle frame.
    pub fn mean_shape(mut self, shape: Shape) -> Self {
        self.mean_shape = Some(shape);
        self
    }

    pub fn add_cascade_stage(mut self, ensemble: TreeEnsemble) -> Self {
        self.cascade.push(ensemble);
        self
    }

    pub fn build(self) -> Result<CascadeTracker> {
        let mean_shape = self
            .mean_shape
            .ok_or_else(|| Error::InvalidModel("Missing mean shape".into()))?;
        CascadeTracker::new(mean_shape, self.cascade)
    }
}

impl Default for CascadeTrackerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
