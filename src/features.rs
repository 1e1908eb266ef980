use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::types::{BoundingBox, Point, Shape};

/// Trait for accessing pixel intensities from an image.
pub trait ImageAccess {
    /// Get the grayscale intensity at (x, y). Returns 0 for out-of-bounds pixels.
    /// Coordinates are in image space (not normalized).
    fn get_pixel(&self, x: i32, y: i32) -> u8;

    /// Image dimensions.
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// A simple grayscale image buffer implementing ImageAccess.
#[derive(Debug, Clone)]
pub struct GrayImage {
    data: Vec<u8>,
    width: u32,
    height: u32,
}

impl GrayImage {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self {
            data,
            width,
            height,
        }
    }

    pub fn from_fn<F>(width: u32, height: u32, f: F) -> Self
    where
        F: Fn(u32, u32) -> u8,
    {
        let mut data = Vec::with_capacity((width * height) as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { data, width, height }
    }

    /// Decode an image file and convert it to 8-bit luminance.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let img = image::open(path)?;
        Ok(Self::from(img.to_luma8()))
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl From<image::GrayImage> for GrayImage {
    fn from(img: image::GrayImage) -> Self {
        let (width, height) = img.dimensions();
        Self::new(img.into_raw(), width, height)
    }
}

impl ImageAccess for GrayImage {
    fn get_pixel(&self, x: i32, y: i32) -> u8 {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return 0;
        }
        self.data[(y as u32 * self.width + x as u32) as usize]
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }
}

/// Sample a pixel with bilinear interpolation for sub-pixel accuracy.
#[inline]
pub(crate) fn sample_bilinear<I: ImageAccess + ?Sized>(image: &I, x: f32, y: f32) -> f32 {
    let x0 = x.floor() as i32;
    let y0 = y.floor() as i32;
    let x1 = x0 + 1;
    let y1 = y0 + 1;

    let fx = x - x0 as f32;
    let fy = y - y0 as f32;

    let p00 = image.get_pixel(x0, y0) as f32;
    let p10 = image.get_pixel(x1, y0) as f32;
    let p01 = image.get_pixel(x0, y1) as f32;
    let p11 = image.get_pixel(x1, y1) as f32;

    let top = p00 * (1.0 - fx) + p10 * fx;
    let bottom = p01 * (1.0 - fx) + p11 * fx;
    top * (1.0 - fy) + bottom * fy
}

/// A 2D similarity transform (rotation, uniform scale, translation):
///
/// ```text
/// x' = a*x - b*y + tx
/// y' = b*x + a*y + ty
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SimilarityTransform2D {
    pub a: f32,
    pub b: f32,
    pub tx: f32,
    pub ty: f32,
}

impl SimilarityTransform2D {
    pub const fn identity() -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            tx: 0.0,
            ty: 0.0,
        }
    }

    /// Transform mapping the unit rectangle (corners at ±0.5, centred on the
    /// origin) onto `rect`.
    ///
    /// This is the least-squares similarity between the two sets of corners:
    /// no rotation, scale `(width + height) / 2`, translation to the centre.
    pub fn unit_to_rect(rect: &BoundingBox) -> Self {
        let c = rect.center();
        Self {
            a: (rect.width + rect.height) / 2.0,
            b: 0.0,
            tx: c.x,
            ty: c.y,
        }
    }

    pub fn scale(&self) -> f32 {
        (self.a * self.a + self.b * self.b).sqrt()
    }

    /// Apply rotation and scale only.
    pub fn apply_linear(&self, p: Point) -> Point {
        Point::new(self.a * p.x - self.b * p.y, self.b * p.x + self.a * p.y)
    }

    pub fn apply(&self, p: Point) -> Point {
        let q = self.apply_linear(p);
        Point::new(q.x + self.tx, q.y + self.ty)
    }

    pub fn apply_shape(&self, shape: &Shape) -> Shape {
        Shape::new(shape.points.iter().map(|p| self.apply(*p)).collect())
    }

    /// Inverse transform. `None` when the transform collapses the plane.
    pub fn inverse(&self) -> Option<Self> {
        let det = self.a * self.a + self.b * self.b;
        if !(det > 0.0) || !det.is_finite() {
            return None;
        }
        let a = self.a / det;
        let b = -self.b / det;
        // t' = -R' t
        let tx = -(a * self.tx - b * self.ty);
        let ty = -(b * self.tx + a * self.ty);
        Some(Self { a, b, tx, ty })
    }
}

impl Default for SimilarityTransform2D {
    fn default() -> Self {
        Self::identity()
    }
}

/// Least-squares similarity transform mapping `from` onto `to`.
///
/// Both shapes must have the same number of landmarks. Degenerate input
/// (fewer than two distinct points) yields a pure translation between the
/// centroids.
pub fn find_similarity_transform(from: &Shape, to: &Shape) -> SimilarityTransform2D {
    debug_assert_eq!(from.num_landmarks(), to.num_landmarks());

    let cf = from.centroid();
    let ct = to.centroid();

    let mut sxx = 0.0f64;
    let mut num_a = 0.0f64;
    let mut num_b = 0.0f64;
    for (p, q) in from.points.iter().zip(&to.points) {
        let (px, py) = ((p.x - cf.x) as f64, (p.y - cf.y) as f64);
        let (qx, qy) = ((q.x - ct.x) as f64, (q.y - ct.y) as f64);
        sxx += px * px + py * py;
        num_a += px * qx + py * qy;
        num_b += px * qy - py * qx;
    }

    let (a, b) = if sxx > f64::EPSILON {
        ((num_a / sxx) as f32, (num_b / sxx) as f32)
    } else {
        (1.0, 0.0)
    };

    let linear = SimilarityTransform2D { a, b, tx: 0.0, ty: 0.0 };
    let moved = linear.apply(cf);
    SimilarityTransform2D {
        a,
        b,
        tx: ct.x - moved.x,
        ty: ct.y - moved.y,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(p: Point, x: f32, y: f32) -> bool {
        (p.x - x).abs() < 1e-4 && (p.y - y).abs() < 1e-4
    }

    #[test]
    fn bilinear_interpolation() {
        // 2x2 image with known values
        let img = GrayImage::new(vec![0, 100, 200, 50], 2, 2);

        assert!((sample_bilinear(&img, 0.0, 0.0) - 0.0).abs() < 0.01);
        assert!((sample_bilinear(&img, 1.0, 0.0) - 100.0).abs() < 0.01);
        assert!((sample_bilinear(&img, 0.0, 1.0) - 200.0).abs() < 0.01);
        assert!((sample_bilinear(&img, 1.0, 1.0) - 50.0).abs() < 0.01);

        // (0+100+200+50)/4
        assert!((sample_bilinear(&img, 0.5, 0.5) - 87.5).abs() < 0.01);
        assert!((sample_bilinear(&img, 0.5, 0.0) - 50.0).abs() < 0.01);
    }

    #[test]
    fn gray_image_access() {
        let data = vec![
            0, 255, 0, //
            255, 0, 255, //
            0, 255, 0, //
        ];
        let img = GrayImage::new(data, 3, 3);

        assert_eq!(img.get_pixel(0, 0), 0);
        assert_eq!(img.get_pixel(1, 0), 255);
        assert_eq!(img.get_pixel(1, 1), 0);

        // Out of bounds returns 0
        assert_eq!(img.get_pixel(-1, 0), 0);
        assert_eq!(img.get_pixel(3, 0), 0);
    }

    #[test]
    fn gray_image_from_luma() {
        let luma = image::GrayImage::from_fn(4, 2, |x, y| image::Luma([(x + 10 * y) as u8]));
        let img = GrayImage::from(luma);
        assert_eq!((img.width(), img.height()), (4, 2));
        assert_eq!(img.get_pixel(3, 1), 13);
        assert!(!img.is_empty());
        assert!(GrayImage::new(Vec::new(), 0, 0).is_empty());
    }

    #[test]
    fn unit_rectangle_maps_to_rect() {
        let rect = BoundingBox::new(100.0, 50.0, 200.0, 200.0);
        let t = SimilarityTransform2D::unit_to_rect(&rect);

        assert!(approx(t.apply(Point::new(-0.5, -0.5)), 100.0, 50.0));
        assert!(approx(t.apply(Point::new(0.5, 0.5)), 300.0, 250.0));
        assert!(approx(t.apply(Point::zero()), 200.0, 150.0));
    }

    #[test]
    fn unit_rectangle_matches_least_squares_fit() {
        let rect = BoundingBox::new(10.0, 20.0, 60.0, 40.0);
        let unit = Shape::new(vec![
            Point::new(-0.5, -0.5),
            Point::new(0.5, -0.5),
            Point::new(0.5, 0.5),
            Point::new(-0.5, 0.5),
        ]);
        let corners = Shape::new(vec![
            Point::new(10.0, 20.0),
            Point::new(70.0, 20.0),
            Point::new(70.0, 60.0),
            Point::new(10.0, 60.0),
        ]);

        let fitted = find_similarity_transform(&unit, &corners);
        let direct = SimilarityTransform2D::unit_to_rect(&rect);
        assert!((fitted.a - direct.a).abs() < 1e-4);
        assert!(fitted.b.abs() < 1e-4);
        assert!((fitted.tx - direct.tx).abs() < 1e-4);
        assert!((fitted.ty - direct.ty).abs() < 1e-4);
    }

    #[test]
    fn recovers_rotation_and_scale() {
        let from = Shape::new(vec![
            Point::new(0.0, 0.0),
            Point::new(1.0, 0.0),
            Point::new(0.0, 1.0),
        ]);
        // 90 degree rotation, scale 2, shift (5, -3)
        let truth = SimilarityTransform2D {
            a: 0.0,
            b: 2.0,
            tx: 5.0,
            ty: -3.0,
        };
        let to = truth.apply_shape(&from);

        let t = find_similarity_transform(&from, &to);
        assert!((t.a - truth.a).abs() < 1e-4);
        assert!((t.b - truth.b).abs() < 1e-4);
        assert!((t.tx - truth.tx).abs() < 1e-4);
        assert!((t.ty - truth.ty).abs() < 1e-4);
        assert!((t.scale() - 2.0).abs() < 1e-4);
    }

    #[test]
    fn inverse_undoes_transform() {
        let t = SimilarityTransform2D {
            a: 0.6,
            b: 0.8,
            tx: 12.0,
            ty: -4.0,
        };
        let inv = t.inverse().unwrap();
        let p = Point::new(3.0, 7.0);
        let back = inv.apply(t.apply(p));
        assert!(approx(back, 3.0, 7.0));

        let collapsed = SimilarityTransform2D {
            a: 0.0,
            b: 0.0,
            tx: 1.0,
            ty: 1.0,
        };
        assert!(collapsed.inverse().is_none());
    }
}
