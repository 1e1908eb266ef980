//! Sample preparation.
//!
//! Imported shapes are moved into the unit frame of their rectangle before
//! testing samples are built, so every sample couples rectangle and shape the
//! same way regardless of image resolution.

use crate::error::{Error, Result};
use crate::features::{GrayImage, SimilarityTransform2D};
use crate::types::{BoundingBox, Shape};

/// Raw labeled data as produced by a database importer.
///
/// `images[i]`, `shapes[i]` and `rects[i]` describe sample `i`. Shapes are in
/// image coordinates until [`InputData::normalize_shapes`] runs; the imported
/// coordinates stay available through [`InputData::image_shapes`].
#[derive(Debug, Clone, Default)]
pub struct InputData {
    pub images: Vec<GrayImage>,
    pub shapes: Vec<Shape>,
    pub rects: Vec<BoundingBox>,
    image_shapes: Vec<Shape>,
    shape_to_image: Vec<SimilarityTransform2D>,
    normalized: bool,
}

impl InputData {
    pub fn new(images: Vec<GrayImage>, shapes: Vec<Shape>, rects: Vec<BoundingBox>) -> Result<Self> {
        if images.len() != shapes.len() || shapes.len() != rects.len() {
            return Err(Error::Database(format!(
                "{} images, {} shapes and {} rectangles do not line up",
                images.len(),
                shapes.len(),
                rects.len()
            )));
        }
        Ok(Self {
            images,
            shapes,
            rects,
            image_shapes: Vec::new(),
            shape_to_image: Vec::new(),
            normalized: false,
        })
    }

    pub fn len(&self) -> usize {
        self.shapes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shapes.is_empty()
    }

    pub fn is_normalized(&self) -> bool {
        self.normalized
    }

    /// Shapes exactly as imported, in image coordinates. Empty until shapes
    /// are normalized.
    pub fn image_shapes(&self) -> &[Shape] {
        &self.image_shapes
    }

    /// Transforms mapping each normalized shape back into its image. Empty
    /// until shapes are normalized.
    pub fn shape_to_image(&self) -> &[SimilarityTransform2D] {
        &self.shape_to_image
    }

    /// Replace every shape by its coordinates in the unit frame of its
    /// rectangle. A second call is a no-op.
    pub fn normalize_shapes(&mut self) -> Result<()> {
        if self.normalized {
            return Ok(());
        }

        let mut transforms = Vec::with_capacity(self.len());
        let mut shapes = Vec::with_capacity(self.len());
        for (i, (shape, rect)) in self.shapes.iter().zip(&self.rects).enumerate() {
            if !rect.is_valid() {
                return Err(Error::Database(format!(
                    "sample {} has an unusable rectangle {:?}",
                    i, rect
                )));
            }
            let to_image = SimilarityTransform2D::unit_to_rect(rect);
            let to_unit = to_image.inverse().ok_or_else(|| {
                Error::Database(format!("sample {} rectangle cannot be inverted", i))
            })?;
            shapes.push(to_unit.apply_shape(shape));
            transforms.push(to_image);
        }

        self.image_shapes = std::mem::replace(&mut self.shapes, shapes);
        self.shape_to_image = transforms;
        self.normalized = true;
        Ok(())
    }
}

/// A prepared evaluation unit.
#[derive(Debug, Clone, PartialEq)]
pub struct TestingSample {
    /// Index into [`InputData`].
    pub input_idx: usize,
    /// Initial estimate in the unit frame (the mean shape).
    pub estimate: Shape,
    /// Ground truth in the unit frame.
    pub target: Shape,
    /// Ground truth as imported, in image coordinates. Errors are measured
    /// against this copy, never against `target` mapped back.
    pub target_image: Shape,
    pub rect: BoundingBox,
    pub shape_to_image: SimilarityTransform2D,
}

impl TestingSample {
    pub fn target_in_image(&self) -> &Shape {
        &self.target_image
    }
}

/// Input data together with the samples derived from it.
#[derive(Debug, Clone)]
pub struct SampleData {
    pub input: InputData,
    pub samples: Vec<TestingSample>,
    pub mean_shape: Option<Shape>,
}

impl SampleData {
    pub fn new(input: InputData) -> Self {
        Self {
            input,
            samples: Vec::new(),
            mean_shape: None,
        }
    }

    /// Build one testing sample per input, starting from the mean shape.
    ///
    /// Normalizes the input first if needed. Running it on already prepared
    /// data leaves everything unchanged.
    pub fn create_testing_samples(&mut self) -> Result<()> {
        if self.mean_shape.is_some() && self.samples.len() == self.input.len() {
            return Ok(());
        }

        self.input.normalize_shapes()?;
        if self.input.is_empty() {
            self.samples.clear();
            return Ok(());
        }

        let mean = Shape::mean(&self.input.shapes).ok_or_else(|| {
            Error::Database("ground-truth shapes have differing landmark counts".into())
        })?;

        self.samples = (0..self.input.len())
            .map(|i| TestingSample {
                input_idx: i,
                estimate: mean.clone(),
                target: self.input.shapes[i].clone(),
                target_image: self.input.image_shapes[i].clone(),
                rect: self.input.rects[i],
                shape_to_image: self.input.shape_to_image[i],
            })
            .collect();
        self.mean_shape = Some(mean);
        Ok(())
    }

    pub fn image(&self, sample: &TestingSample) -> &GrayImage {
        &self.input.images[sample.input_idx]
    }
}
