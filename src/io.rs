//! Importers for labeled landmark databases.
//!
//! Two layouts are understood:
//!
//! - IMM: one `.asf` file per image, relative coordinates, host image named
//!   inside the file.
//! - iBUG: one `.pts` file per image, absolute pixel coordinates, host image
//!   next to it with the same stem.
//!
//! A directory is classified by the annotation files it contains; anything
//! ambiguous or unrecognized is rejected instead of guessed.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::features::{GrayImage, ImageAccess};
use crate::normalizer::DatabaseType;
use crate::sample::InputData;
use crate::types::{BoundingBox, Point, Shape};

const IMAGE_EXTENSIONS: [&str; 3] = ["png", "jpg", "jpeg"];

/// A labeled database together with its landmark convention.
#[derive(Debug, Clone)]
pub struct Database {
    pub kind: DatabaseType,
    pub input: InputData,
}

/// Import every annotated image under `dir`.
///
/// Without `rectangles`, each initial rectangle is the bounding box of its
/// ground-truth shape. With it, rectangles are read from that file in sample
/// order.
pub fn import_database(dir: &Path, rectangles: Option<&Path>) -> Result<Database> {
    let kind = detect_database_type(dir)?;
    let annotations = annotation_files(dir, annotation_extension(kind))?;
    info!(
        database = %dir.display(),
        convention = %kind,
        files = annotations.len(),
        "importing database"
    );

    let expected = kind.convention().num_landmarks;
    let mut images = Vec::with_capacity(annotations.len());
    let mut shapes = Vec::with_capacity(annotations.len());

    for path in &annotations {
        let (image, shape) = match kind {
            DatabaseType::Imm => load_imm_sample(path)?,
            DatabaseType::Ibug => load_ibug_sample(path)?,
        };
        if shape.num_landmarks() != expected {
            return Err(Error::Database(format!(
                "{} has {} landmarks, {} databases use {}",
                path.display(),
                shape.num_landmarks(),
                kind,
                expected
            )));
        }
        debug!(file = %path.display(), "loaded sample");
        images.push(image);
        shapes.push(shape);
    }

    let rects = match rectangles {
        Some(path) => {
            let rects = load_rectangles(path)?;
            if rects.len() != shapes.len() {
                return Err(Error::Database(format!(
                    "{} lists {} rectangles for {} samples",
                    path.display(),
                    rects.len(),
                    shapes.len()
                )));
            }
            rects
        }
        None => shapes
            .iter()
            .map(|s| {
                BoundingBox::enclosing(&s.points)
                    .ok_or_else(|| Error::Database("shape without landmarks".into()))
            })
            .collect::<Result<Vec<_>>>()?,
    };

    Ok(Database {
        kind,
        input: InputData::new(images, shapes, rects)?,
    })
}

/// Classify a database directory by the annotation files it holds.
pub fn detect_database_type(dir: &Path) -> Result<DatabaseType> {
    let unsupported = |reason: &str| Error::UnsupportedDatabase {
        path: dir.to_path_buf(),
        reason: reason.to_string(),
    };

    if !dir.is_dir() {
        return Err(unsupported("not a directory"));
    }

    let mut found = Vec::new();
    for kind in DatabaseType::ALL {
        if !annotation_files(dir, annotation_extension(kind))?.is_empty() {
            found.push(kind);
        }
    }

    match found.as_slice() {
        [kind] => Ok(*kind),
        [] => Err(unsupported("no .asf or .pts annotation files found")),
        _ => Err(unsupported("mixes annotation formats")),
    }
}

fn annotation_extension(kind: DatabaseType) -> &'static str {
    match kind {
        DatabaseType::Imm => "asf",
        DatabaseType::Ibug => "pts",
    }
}

fn annotation_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if matches && path.is_file() {
            files.push(path);
        }
    }
    // Directory order is platform dependent; sample order must not be.
    files.sort();
    Ok(files)
}

/// Lines of a text annotation with `#` comments and blank lines removed.
fn data_lines(text: &str) -> impl Iterator<Item = &str> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
}

fn parse_f32(token: &str, path: &Path) -> Result<f32> {
    token.parse::<f32>().map_err(|_| {
        Error::Database(format!("{}: '{}' is not a number", path.display(), token))
    })
}

fn load_imm_sample(path: &Path) -> Result<(GrayImage, Shape)> {
    let text = fs::read_to_string(path)?;
    let (relative, host) = parse_asf(&text, path)?;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let image = GrayImage::open(dir.join(host))?;
    let (w, h) = (image.width() as f32, image.height() as f32);

    let shape = Shape::new(
        relative
            .points
            .iter()
            .map(|p| Point::new(p.x * w, p.y * h))
            .collect(),
    );
    Ok((image, shape))
}

/// Parse an IMM `.asf` file into relative coordinates and the host image name.
fn parse_asf<'a>(text: &'a str, path: &Path) -> Result<(Shape, &'a str)> {
    let invalid = |msg: String| Error::Database(format!("{}: {}", path.display(), msg));
    let mut lines = data_lines(text);

    let count_line = lines.next().ok_or_else(|| invalid("empty file".into()))?;
    let count: usize = count_line
        .parse()
        .map_err(|_| invalid(format!("bad point count '{}'", count_line)))?;

    let mut shape = Shape::with_capacity(count);
    for i in 0..count {
        let line = lines
            .next()
            .ok_or_else(|| invalid(format!("expected {} points, found {}", count, i)))?;
        // <path#> <type> <x rel> <y rel> <point#> <from> <to> ...
        let fields: Vec<&str> = line.split_whitespace().collect();
        if fields.len() < 4 {
            return Err(invalid(format!("malformed point line '{}'", line)));
        }
        shape
            .points
            .push(Point::new(parse_f32(fields[2], path)?, parse_f32(fields[3], path)?));
    }

    let host = lines
        .next()
        .ok_or_else(|| invalid("missing host image name".into()))?;
    Ok((shape, host))
}

fn load_ibug_sample(path: &Path) -> Result<(GrayImage, Shape)> {
    let text = fs::read_to_string(path)?;
    let shape = parse_pts(&text, path)?;

    let image_path = IMAGE_EXTENSIONS
        .iter()
        .map(|ext| path.with_extension(ext))
        .find(|p| p.is_file())
        .ok_or_else(|| {
            Error::Database(format!("no image found for {}", path.display()))
        })?;
    Ok((GrayImage::open(image_path)?, shape))
}

/// Parse an iBUG `.pts` file.
fn parse_pts(text: &str, path: &Path) -> Result<Shape> {
    let invalid = |msg: String| Error::Database(format!("{}: {}", path.display(), msg));

    let mut count = None;
    let mut lines = data_lines(text);
    for line in lines.by_ref() {
        if line == "{" {
            break;
        }
        if let Some(n) = line.strip_prefix("n_points:") {
            count = Some(
                n.trim()
                    .parse::<usize>()
                    .map_err(|_| invalid(format!("bad point count '{}'", n.trim())))?,
            );
        }
    }
    let count = count.ok_or_else(|| invalid("missing n_points header".into()))?;

    let mut shape = Shape::with_capacity(count);
    for line in lines {
        if line == "}" {
            break;
        }
        let mut fields = line.split_whitespace();
        let (Some(x), Some(y)) = (fields.next(), fields.next()) else {
            return Err(invalid(format!("malformed point line '{}'", line)));
        };
        shape.points.push(Point::new(parse_f32(x, path)?, parse_f32(y, path)?));
    }

    if shape.num_landmarks() != count {
        return Err(invalid(format!(
            "header announces {} points, found {}",
            count,
            shape.num_landmarks()
        )));
    }
    Ok(shape)
}

/// Read initial rectangles, one `x y width height` row per sample.
///
/// Fields may be separated by commas, whitespace, or both.
pub fn load_rectangles(path: &Path) -> Result<Vec<BoundingBox>> {
    let text = fs::read_to_string(path)?;
    data_lines(&text)
        .map(|line| {
            let fields: Vec<&str> = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|f| !f.is_empty())
                .collect();
            if fields.len() != 4 {
                return Err(Error::Database(format!(
                    "{}: expected 4 values per rectangle, got '{}'",
                    path.display(),
                    line
                )));
            }
            let v = fields
                .iter()
                .map(|f| parse_f32(f, path))
                .collect::<Result<Vec<_>>>()?;
            Ok(BoundingBox::new(v[0], v[1], v[2], v[3]))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const ASF: &str = "\
######################################################################
#
#    AAM Shape File
#
######################################################################

#
# number of model points
#
3

#
# model points
#
0	0	0.25	0.50	0	2	1	0.00	0.00	0.00
0	0	0.50	0.25	1	0	2	0.00	0.00	0.00
0	0	0.75	0.75	2	1	0	0.00	0.00	0.00

#
# host image
#
01-1m.jpg
";

    const PTS: &str = "version: 1
n_points:  3
{
446.000 91.000
449.459 119.344
450.957 150.614
}
";

    #[test]
    fn parses_asf() {
        let (shape, host) = parse_asf(ASF, Path::new("a.asf")).unwrap();
        assert_eq!(host, "01-1m.jpg");
        assert_eq!(shape.num_landmarks(), 3);
        assert_eq!(shape[1], Point::new(0.5, 0.25));
    }

    #[test]
    fn asf_with_missing_points_is_rejected() {
        let truncated = "3\n0 0 0.1 0.1 0 0 0\nimage.jpg\n";
        assert!(matches!(
            parse_asf(truncated, Path::new("a.asf")),
            Err(Error::Database(_))
        ));
    }

    #[test]
    fn parses_pts() {
        let shape = parse_pts(PTS, Path::new("a.pts")).unwrap();
        assert_eq!(shape.num_landmarks(), 3);
        assert_eq!(shape[0], Point::new(446.0, 91.0));
        assert!((shape[2].y - 150.614).abs() < 1e-3);
    }

    #[test]
    fn pts_count_mismatch_is_rejected() {
        let text = PTS.replace("n_points:  3", "n_points: 4");
        assert!(matches!(
            parse_pts(&text, Path::new("a.pts")),
            Err(Error::Database(_))
        ));
        assert!(parse_pts("{\n1 2\n}\n", Path::new("a.pts")).is_err());
    }

    #[test]
    fn reads_rectangles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rects.csv");
        fs::write(&path, "# x,y,w,h\n10,20,30,40\n\n1.5 2.5 3.5 4.5\n5, 6, 7, 8\n").unwrap();

        let rects = load_rectangles(&path).unwrap();
        assert_eq!(
            rects,
            vec![
                BoundingBox::new(10.0, 20.0, 30.0, 40.0),
                BoundingBox::new(1.5, 2.5, 3.5, 4.5),
                BoundingBox::new(5.0, 6.0, 7.0, 8.0),
            ]
        );

        fs::write(&path, "1,2,3\n").unwrap();
        assert!(matches!(load_rectangles(&path), Err(Error::Database(_))));
        fs::write(&path, "1,2,3,x\n").unwrap();
        assert!(matches!(load_rectangles(&path), Err(Error::Database(_))));
    }

    #[test]
    fn detection_requires_a_single_convention() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            detect_database_type(dir.path()),
            Err(Error::UnsupportedDatabase { .. })
        ));

        fs::write(dir.path().join("a.pts"), PTS).unwrap();
        assert_eq!(detect_database_type(dir.path()).unwrap(), DatabaseType::Ibug);

        fs::write(dir.path().join("b.asf"), ASF).unwrap();
        assert!(matches!(
            detect_database_type(dir.path()),
            Err(Error::UnsupportedDatabase { .. })
        ));

        assert!(matches!(
            detect_database_type(&dir.path().join("missing")),
            Err(Error::UnsupportedDatabase { .. })
        ));
    }
}
