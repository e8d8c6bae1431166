//! Page geometry: from a text-line mask to ordered line crops
//!
//! Stages run in this order on a page: rotation correction, contour
//! filtering, optional dewarping, reading-order sorting with band merging,
//! and per-line image extraction.

pub mod contour;
pub mod dewarp;
pub mod extraction;
pub mod ordering;
pub mod page;
pub mod rotation;

use imageproc::point::Point;
use serde::{Serialize, Serializer};

/// Axis-aligned box in pixel coordinates, inclusive of its first row/column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BBox {
    pub x: i32,
    pub y: i32,
    pub w: i32,
    pub h: i32,
}

impl BBox {
    /// Tight box around a point set, `None` when empty
    pub fn from_points(points: &[Point<i32>]) -> Option<Self> {
        let first = points.first()?;
        let (mut min_x, mut min_y, mut max_x, mut max_y) = (first.x, first.y, first.x, first.y);
        for p in points {
            min_x = min_x.min(p.x);
            min_y = min_y.min(p.y);
            max_x = max_x.max(p.x);
            max_y = max_y.max(p.y);
        }
        Some(Self {
            x: min_x,
            y: min_y,
            w: max_x - min_x + 1,
            h: max_y - min_y + 1,
        })
    }

    pub fn right(&self) -> i32 {
        self.x + self.w - 1
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.h - 1
    }

    pub fn center(&self) -> Point<i32> {
        Point::new(self.x + self.w / 2, self.y + self.h / 2)
    }

    pub fn contains(&self, p: Point<i32>) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Grow by `dx`/`dy` on each side, clipped to a `width` x `height` image
    pub fn expand_within(&self, dx: i32, dy: i32, width: u32, height: u32) -> Self {
        let x0 = (self.x - dx).max(0);
        let y0 = (self.y - dy).max(0);
        let x1 = (self.right() + dx).min(width as i32 - 1);
        let y1 = (self.bottom() + dy).min(height as i32 - 1);
        Self {
            x: x0,
            y: y0,
            w: (x1 - x0 + 1).max(1),
            h: (y1 - y0 + 1).max(1),
        }
    }
}

/// A text line on the corrected page
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Line {
    pub id: usize,
    #[serde(serialize_with = "serialize_points")]
    pub contour: Vec<Point<i32>>,
    pub bbox: BBox,
    #[serde(serialize_with = "serialize_point")]
    pub centroid: Point<i32>,
}

impl Line {
    /// Build a line from a contour, deriving its bbox and centroid
    pub fn from_contour(id: usize, contour: Vec<Point<i32>>) -> Option<Self> {
        let bbox = BBox::from_points(&contour)?;
        Some(Self {
            id,
            centroid: bbox.center(),
            contour,
            bbox,
        })
    }
}

fn serialize_point<S: Serializer>(point: &Point<i32>, serializer: S) -> Result<S::Ok, S::Error> {
    [point.x, point.y].serialize(serializer)
}

fn serialize_points<S: Serializer>(points: &[Point<i32>], serializer: S) -> Result<S::Ok, S::Error> {
    let pairs: Vec<[i32; 2]> = points.iter().map(|p| [p.x, p.y]).collect();
    pairs.serialize(serializer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bbox_from_points_is_inclusive() {
        let points = vec![Point::new(10, 20), Point::new(19, 20), Point::new(19, 24), Point::new(10, 24)];
        let bbox = BBox::from_points(&points).unwrap();
        assert_eq!(bbox, BBox { x: 10, y: 20, w: 10, h: 5 });
        assert_eq!(bbox.right(), 19);
        assert_eq!(bbox.bottom(), 24);
        assert!(points.iter().all(|p| bbox.contains(*p)));
    }

    #[test]
    fn test_line_centroid_is_bbox_centre() {
        let line = Line::from_contour(
            0,
            vec![Point::new(0, 0), Point::new(100, 0), Point::new(100, 20), Point::new(0, 20)],
        )
        .unwrap();
        assert_eq!(line.centroid, Point::new(50, 10));
        assert!(line.bbox.contains(line.centroid));
    }

    #[test]
    fn test_line_serializes_contour_as_pairs() {
        let line = Line::from_contour(3, vec![Point::new(1, 2), Point::new(3, 4)]).unwrap();
        let json = serde_json::to_value(&line).unwrap();
        assert_eq!(json["contour"], serde_json::json!([[1, 2], [3, 4]]));
        assert_eq!(json["centroid"], serde_json::json!([2, 3]));
        assert_eq!(json["id"], 3);
    }

    #[test]
    fn test_empty_contour_has_no_line() {
        assert!(Line::from_contour(0, Vec::new()).is_none());
    }

    #[test]
    fn test_expand_within_clips_to_image() {
        let bbox = BBox { x: 5, y: 5, w: 10, h: 10 };
        let grown = bbox.expand_within(10, 3, 20, 100);
        assert_eq!(grown, BBox { x: 0, y: 2, w: 20, h: 16 });
    }
}
