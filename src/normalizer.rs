//! Per-sample reference scales for comparable landmark errors.
//!
//! Raw pixel errors depend on face size and image resolution. Dividing them by
//! the ground-truth distance between two designated landmarks (the eyes)
//! makes results comparable across samples and databases. Which landmarks
//! those are depends on the annotation convention of the database, so the
//! normalizer is always derived from a [`DatabaseType`].

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::{Error, Result};
use crate::types::Shape;

/// Annotation conventions of the supported labeled databases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    /// IMM face database, 58 landmarks per face (`.asf` files).
    Imm,
    /// iBUG 300-W style markup, 68 landmarks per face (`.pts` files).
    Ibug,
}

/// Landmark layout of one database convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LandmarkConvention {
    pub name: &'static str,
    pub num_landmarks: usize,
    /// Landmarks whose ground-truth distance is the interocular reference.
    pub interocular: (usize, usize),
}

const IMM: LandmarkConvention = LandmarkConvention {
    name: "imm",
    num_landmarks: 58,
    interocular: (13, 21),
};

const IBUG: LandmarkConvention = LandmarkConvention {
    name: "ibug",
    num_landmarks: 68,
    interocular: (36, 45),
};

impl DatabaseType {
    pub const ALL: [DatabaseType; 2] = [DatabaseType::Imm, DatabaseType::Ibug];

    pub const fn convention(self) -> &'static LandmarkConvention {
        match self {
            DatabaseType::Imm => &IMM,
            DatabaseType::Ibug => &IBUG,
        }
    }

    pub fn name(self) -> &'static str {
        self.convention().name
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DatabaseType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let wanted = s.trim();
        DatabaseType::ALL
            .into_iter()
            .find(|t| t.name().eq_ignore_ascii_case(wanted))
            .ok_or_else(|| Error::UnknownConvention(s.to_string()))
    }
}

/// Computes the reference distance used to normalize landmark errors.
///
/// Only the named constructors are public, so every normalizer in use maps to
/// a documented convention.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LandmarkDistanceNormalizer {
    name: &'static str,
    a: usize,
    b: usize,
}

impl LandmarkDistanceNormalizer {
    pub(crate) const fn new(name: &'static str, a: usize, b: usize) -> Self {
        Self { name, a, b }
    }

    /// Interocular normalizer for the IMM 58-point markup.
    pub fn interocular_imm() -> Self {
        Self::for_database(DatabaseType::Imm)
    }

    /// Interocular normalizer for the iBUG 68-point markup.
    pub fn interocular_ibug() -> Self {
        Self::for_database(DatabaseType::Ibug)
    }

    pub fn for_database(kind: DatabaseType) -> Self {
        let convention = kind.convention();
        let (a, b) = convention.interocular;
        Self::new(convention.name, a, b)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn indices(&self) -> (usize, usize) {
        (self.a, self.b)
    }

    /// Check both indices against a landmark count.
    pub fn validate(&self, num_landmarks: usize) -> Result<()> {
        for index in [self.a, self.b] {
            if index >= num_landmarks {
                return Err(Error::InvalidIndex {
                    index,
                    num_landmarks,
                });
            }
        }
        Ok(())
    }

    /// Distance between the two designated landmarks of `shape`.
    ///
    /// Always strictly positive and finite on success.
    pub fn reference_distance(&self, shape: &Shape) -> Result<f64> {
        self.validate(shape.num_landmarks())?;
        let d = shape[self.a].distance(&shape[self.b]);
        if d > 0.0 && d.is_finite() {
            Ok(d)
        } else {
            Err(Error::DegenerateReference {
                a: self.a,
                b: self.b,
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Point;

    fn line_shape(n: usize) -> Shape {
        Shape::new((0..n).map(|i| Point::new(i as f32 * 2.0, 1.0)).collect())
    }

    #[test]
    fn conventions_are_total_and_distinct() {
        for kind in DatabaseType::ALL {
            let c = kind.convention();
            let (a, b) = c.interocular;
            assert!(a < c.num_landmarks && b < c.num_landmarks);
            assert_ne!(a, b);
            assert_eq!(LandmarkDistanceNormalizer::for_database(kind).indices(), (a, b));
        }
        assert_eq!(LandmarkDistanceNormalizer::interocular_imm().indices(), (13, 21));
        assert_eq!(LandmarkDistanceNormalizer::interocular_ibug().indices(), (36, 45));
    }

    #[test]
    fn parses_database_tags() {
        assert_eq!("imm".parse::<DatabaseType>().unwrap(), DatabaseType::Imm);
        assert_eq!(" IBUG ".parse::<DatabaseType>().unwrap(), DatabaseType::Ibug);
        assert!(matches!(
            "helen".parse::<DatabaseType>(),
            Err(Error::UnknownConvention(_))
        ));
        assert_eq!(DatabaseType::Ibug.to_string(), "ibug");
    }

    #[test]
    fn distance_between_designated_landmarks() {
        let mut shape = Shape::zeros(2);
        shape[1] = Point::new(10.0, 0.0);
        let n = LandmarkDistanceNormalizer::new("test", 0, 1);
        assert_eq!(n.reference_distance(&shape).unwrap(), 10.0);
    }

    #[test]
    fn positive_for_distinct_points() {
        let shape = line_shape(6);
        for a in 0..6 {
            for b in 0..6 {
                if a == b {
                    continue;
                }
                let d = LandmarkDistanceNormalizer::new("test", a, b)
                    .reference_distance(&shape)
                    .unwrap();
                assert!(d > 0.0);
            }
        }
    }

    #[test]
    fn symmetric_in_indices() {
        let shape = Shape::new(vec![
            Point::new(1.5, -2.0),
            Point::new(7.25, 3.0),
            Point::new(-4.0, 9.5),
        ]);
        for (a, b) in [(0, 1), (0, 2), (1, 2)] {
            let ab = LandmarkDistanceNormalizer::new("test", a, b).reference_distance(&shape);
            let ba = LandmarkDistanceNormalizer::new("test", b, a).reference_distance(&shape);
            assert_eq!(ab.unwrap(), ba.unwrap());
        }
    }

    #[test]
    fn coinciding_points_are_degenerate() {
        let mut shape = line_shape(4);
        shape[3] = shape[1];
        let n = LandmarkDistanceNormalizer::new("test", 1, 3);
        assert!(matches!(
            n.reference_distance(&shape),
            Err(Error::DegenerateReference { a: 1, b: 3 })
        ));

        // Same index on both sides is degenerate too.
        let same = LandmarkDistanceNormalizer::new("test", 2, 2);
        assert!(matches!(
            same.reference_distance(&shape),
            Err(Error::DegenerateReference { .. })
        ));
    }

    #[test]
    fn non_finite_points_are_degenerate() {
        let mut shape = line_shape(2);
        shape[1] = Point::new(f32::INFINITY, 0.0);
        let n = LandmarkDistanceNormalizer::new("test", 0, 1);
        assert!(matches!(
            n.reference_distance(&shape),
            Err(Error::DegenerateReference { .. })
        ));
    }

    #[test]
    fn out_of_range_index() {
        let shape = line_shape(40);
        let n = LandmarkDistanceNormalizer::interocular_ibug();
        assert!(matches!(
            n.reference_distance(&shape),
            Err(Error::InvalidIndex {
                index: 45,
                num_landmarks: 40
            })
        ));
        assert!(n.validate(68).is_ok());
    }
}
