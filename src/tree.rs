use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::types::{Point, Shape};

/// A split test comparing the intensities of two shape-indexed pixels.
///
/// Each pixel is placed at a landmark of the current shape estimate plus an
/// offset expressed in the mean-shape (unit rectangle) frame.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Split {
    pub landmark_a: u16,
    pub offset_a: Point,
    pub landmark_b: u16,
    pub offset_b: Point,
    /// Raw intensity difference threshold; `a - b > threshold` goes left.
    pub threshold: f32,
}

/// A complete binary regression tree stored in level order.
///
/// Split `i` has children `2i + 1` and `2i + 2`; indices past the last split
/// address `leaves[idx - splits.len()]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    pub splits: Vec<Split>,
    pub leaves: Vec<Shape>,
}

impl RegressionTree {
    pub fn new(splits: Vec<Split>, leaves: Vec<Shape>) -> Self {
        Self { splits, leaves }
    }

    /// A tree with no splits that always predicts `delta`.
    pub fn constant(delta: Shape) -> Self {
        Self {
            splits: Vec::new(),
            leaves: vec![delta],
        }
    }

    /// Walk the tree and return the reached leaf.
    ///
    /// `intensity_difference` evaluates a split's pixel pair on the image.
    pub fn predict<F>(&self, intensity_difference: F) -> &Shape
    where
        F: Fn(&Split) -> f32,
    {
        let num_splits = self.splits.len();
        let mut idx = 0usize;
        while idx < num_splits {
            let split = &self.splits[idx];
            idx = if intensity_difference(split) > split.threshold {
                2 * idx + 1
            } else {
                2 * idx + 2
            };
        }
        &self.leaves[idx - num_splits]
    }

    pub fn depth(&self) -> usize {
        // Level-order complete tree: leaves = 2^depth.
        self.leaves.len().trailing_zeros() as usize
    }

    pub(crate) fn validate(&self, num_landmarks: usize) -> Result<()> {
        let num_splits = self.splits.len();
        if self.leaves.len() != num_splits + 1 || !self.leaves.len().is_power_of_two() {
            return Err(Error::InvalidModel(format!(
                "Invalid tree: {} splits should have {} leaves in a complete tree, got {}",
                num_splits,
                num_splits + 1,
                self.leaves.len()
            )));
        }

        for split in &self.splits {
            for idx in [split.landmark_a, split.landmark_b] {
                if idx as usize >= num_landmarks {
                    return Err(Error::InvalidModel(format!(
                        "Split references landmark {} of {}",
                        idx, num_landmarks
                    )));
                }
            }
        }

        if let Some(leaf) = self
            .leaves
            .iter()
            .find(|leaf| leaf.num_landmarks() != num_landmarks)
        {
            return Err(Error::InvalidModel(format!(
                "Invalid leaf delta: {} landmarks, expected {}",
                leaf.num_landmarks(),
                num_landmarks
            )));
        }

        Ok(())
    }
}

/// One cascade stage: an additive ensemble of regression trees.
///
/// Leaf deltas are stored already scaled by the training shrinkage factor, so
/// the stage output is the plain sum over trees.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeEnsemble {
    pub trees: Vec<RegressionTree>,
    pub num_landmarks: usize,
}

impl TreeEnsemble {
    pub fn new(trees: Vec<RegressionTree>, num_landmarks: usize) -> Self {
        Self {
            trees,
            num_landmarks,
        }
    }

    pub fn predict<F>(&self, intensity_difference: F) -> Shape
    where
        F: Fn(&Split) -> f32,
    {
        let mut delta = Shape::zeros(self.num_landmarks);
        for tree in &self.trees {
            delta.add_delta(tree.predict(&intensity_difference));
        }
        delta
    }

    pub(crate) fn validate(&self, num_landmarks: usize) -> Result<()> {
        if self.num_landmarks != num_landmarks {
            return Err(Error::InvalidModel(format!(
                "Cascade stage predicts {} landmarks, model has {}",
                self.num_landmarks, num_landmarks
            )));
        }
        self.trees
            .iter()
            .try_for_each(|tree| tree.validate(num_landmarks))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn split(threshold: f32) -> Split {
        Split {
            landmark_a: 0,
            offset_a: Point::zero(),
            landmark_b: 0,
            offset_b: Point::zero(),
            threshold,
        }
    }

    fn leaf(x: f32) -> Shape {
        Shape::new(vec![Point::new(x, x)])
    }

    #[test]
    fn depth_one_traversal() {
        let tree = RegressionTree::new(vec![split(50.0)], vec![leaf(-0.1), leaf(0.1)]);

        assert_eq!(tree.predict(|_| 100.0)[0].x, -0.1);
        assert_eq!(tree.predict(|_| 30.0)[0].x, 0.1);
        // Equal to threshold goes right.
        assert_eq!(tree.predict(|_| 50.0)[0].x, 0.1);
        assert_eq!(tree.depth(), 1);
    }

    #[test]
    fn depth_two_traversal() {
        // Root splits at 0, left child at 10, right child at -10.
        let tree = RegressionTree::new(
            vec![split(0.0), split(10.0), split(-10.0)],
            vec![leaf(1.0), leaf(2.0), leaf(3.0), leaf(4.0)],
        );
        assert_eq!(tree.depth(), 2);

        let value = std::cell::Cell::new(0);
        let answers = [5.0f32, 20.0];
        let walk = |answers: [f32; 2]| {
            value.set(0);
            tree.predict(|_| {
                let i = value.get();
                value.set(i + 1);
                answers[i]
            })[0]
                .x
        };

        assert_eq!(walk(answers), 1.0); // left, left
        assert_eq!(walk([5.0, 0.0]), 2.0); // left, right
        assert_eq!(walk([-5.0, 0.0]), 3.0); // right, left
        assert_eq!(walk([-5.0, -20.0]), 4.0); // right, right
    }

    #[test]
    fn ensemble_sums_predictions() {
        let ensemble = TreeEnsemble::new(
            vec![
                RegressionTree::constant(Shape::new(vec![Point::new(0.1, 0.2)])),
                RegressionTree::constant(Shape::new(vec![Point::new(0.3, 0.4)])),
            ],
            1,
        );
        let delta = ensemble.predict(|_| 0.0);

        assert!((delta[0].x - 0.4).abs() < 1e-6);
        assert!((delta[0].y - 0.6).abs() < 1e-6);
    }

    #[test]
    fn validation_rejects_inconsistent_trees() {
        let missing_leaf = RegressionTree::new(vec![split(0.0)], vec![leaf(0.0)]);
        assert!(matches!(missing_leaf.validate(1), Err(Error::InvalidModel(_))));

        let mut bad_anchor = split(0.0);
        bad_anchor.landmark_b = 3;
        let tree = RegressionTree::new(vec![bad_anchor], vec![leaf(0.0), leaf(0.0)]);
        assert!(matches!(tree.validate(1), Err(Error::InvalidModel(_))));

        let wrong_leaf = RegressionTree::constant(Shape::zeros(2));
        assert!(matches!(wrong_leaf.validate(1), Err(Error::InvalidModel(_))));

        let ok = RegressionTree::new(vec![split(0.0)], vec![leaf(0.0), leaf(1.0)]);
        assert!(ok.validate(1).is_ok());
    }
}
