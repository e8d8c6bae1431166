//! Contour extraction and polygon measurements on binary masks

use image::{GrayImage, Luma};
use imageproc::contours::{find_contours, BorderType};
use imageproc::drawing::{draw_line_segment_mut, draw_polygon_mut};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;

/// Douglas-Peucker tolerance as a fraction of the contour's perimeter
const SIMPLIFY_EPSILON: f64 = 0.001;

/// Oriented rectangle of minimum area around a point set
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MinAreaRect {
    pub center: (f64, f64),
    pub width: f64,
    pub height: f64,
    /// Orientation of the rectangle's sides in degrees, within [0, 90)
    pub angle: f64,
}

/// Outer boundaries of the foreground regions of `mask`
pub fn outer_contours(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer)
        .map(|c| c.points)
        .collect()
}

/// Enclosed area of a closed polygon (shoelace formula)
pub fn contour_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice_area = 0i64;
    for (i, p) in points.iter().enumerate() {
        let q = points[(i + 1) % points.len()];
        twice_area += p.x as i64 * q.y as i64 - q.x as i64 * p.y as i64;
    }
    (twice_area as f64 / 2.0).abs()
}

fn cross(o: Point<i32>, a: Point<i32>, b: Point<i32>) -> i64 {
    (a.x - o.x) as i64 * (b.y - o.y) as i64 - (a.y - o.y) as i64 * (b.x - o.x) as i64
}

/// Convex hull of a point set (monotone chain)
pub fn convex_hull(points: &[Point<i32>]) -> Vec<Point<i32>> {
    let mut sorted: Vec<Point<i32>> = points.to_vec();
    sorted.sort_by(|a, b| (a.x, a.y).cmp(&(b.x, b.y)));
    sorted.dedup();

    if sorted.len() < 3 {
        return sorted;
    }

    let mut lower: Vec<Point<i32>> = Vec::with_capacity(sorted.len());
    for &p in &sorted {
        while lower.len() >= 2 && cross(lower[lower.len() - 2], lower[lower.len() - 1], p) <= 0 {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Point<i32>> = Vec::with_capacity(sorted.len());
    for &p in sorted.iter().rev() {
        while upper.len() >= 2 && cross(upper[upper.len() - 2], upper[upper.len() - 1], p) <= 0 {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Minimum-area rectangle via rotating calipers over the convex hull
pub fn min_area_rect(points: &[Point<i32>]) -> Option<MinAreaRect> {
    let hull = convex_hull(points);
    if hull.len() < 3 {
        return None;
    }

    let mut best: Option<(f64, MinAreaRect)> = None;
    let n = hull.len();

    for i in 0..n {
        let a = hull[i];
        let b = hull[(i + 1) % n];
        let (ex, ey) = ((b.x - a.x) as f64, (b.y - a.y) as f64);
        let length = (ex * ex + ey * ey).sqrt();
        if length < f64::EPSILON {
            continue;
        }
        let (nx, ny) = (ex / length, ey / length);
        let (px, py) = (-ny, nx);

        let (mut min_n, mut max_n) = (f64::MAX, f64::MIN);
        let (mut min_p, mut max_p) = (f64::MAX, f64::MIN);
        for q in &hull {
            let (dx, dy) = ((q.x - a.x) as f64, (q.y - a.y) as f64);
            let proj_n = dx * nx + dy * ny;
            let proj_p = dx * px + dy * py;
            min_n = min_n.min(proj_n);
            max_n = max_n.max(proj_n);
            min_p = min_p.min(proj_p);
            max_p = max_p.max(proj_p);
        }

        let (width, height) = (max_n - min_n, max_p - min_p);
        let area = width * height;
        if best.as_ref().map_or(true, |(best_area, _)| area < *best_area) {
            let (cn, cp) = ((min_n + max_n) / 2.0, (min_p + max_p) / 2.0);
            let center = (a.x as f64 + cn * nx + cp * px, a.y as f64 + cn * ny + cp * py);
            let angle = ny.atan2(nx).to_degrees().rem_euclid(90.0);
            best = Some((
                area,
                MinAreaRect {
                    center,
                    width,
                    height,
                    angle: if angle >= 90.0 - 1e-9 { 0.0 } else { angle },
                },
            ));
        }
    }

    best.map(|(_, rect)| rect)
}

/// Simplify a closed contour with Douglas-Peucker
pub fn simplify(contour: &[Point<i32>]) -> Vec<Point<i32>> {
    if contour.len() < 3 {
        return contour.to_vec();
    }
    let epsilon = SIMPLIFY_EPSILON * arc_length(contour, true);
    if !(epsilon > 0.0) {
        return contour.to_vec();
    }
    let mut simplified = approximate_polygon_dp(contour, epsilon, true);
    if simplified.len() > 1 && simplified.first() == simplified.last() {
        simplified.pop();
    }
    if simplified.len() < 3 {
        contour.to_vec()
    } else {
        simplified
    }
}

/// Fill the polygon `contour` with white on `mask`
pub fn fill_contour(mask: &mut GrayImage, contour: &[Point<i32>]) {
    let mut polygon: Vec<Point<i32>> = Vec::with_capacity(contour.len());
    for &p in contour {
        if polygon.last() != Some(&p) {
            polygon.push(p);
        }
    }
    while polygon.len() > 1 && polygon.first() == polygon.last() {
        polygon.pop();
    }

    if polygon.len() >= 3 {
        draw_polygon_mut(mask, &polygon, Luma([255u8]));
    }

    // Boundary pixels belong to the region
    for (i, p) in polygon.iter().enumerate() {
        let q = polygon[(i + 1) % polygon.len()];
        draw_line_segment_mut(
            mask,
            (p.x as f32, p.y as f32),
            (q.x as f32, q.y as f32),
            Luma([255u8]),
        );
    }
}
