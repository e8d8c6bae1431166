//! Reading order: grouping lines into horizontal bands and sorting them

use super::contour::{convex_hull, outer_contours};
use super::{BBox, Line};
use image::GrayImage;
use imageproc::point::Point;

/// Width of the vertical strips sampled to estimate the line threshold
const SLICE_WIDTH: u32 = 20;

/// Estimate the vertical tolerance that separates two lines
///
/// The mask's foreground box is cut into vertical strips. The strip crossing
/// the most line regions gives the threshold as the median centre height of
/// those regions divided by their count.
pub fn line_threshold(mask: &GrayImage) -> f64 {
    let Some(bounds) = foreground_bounds(mask) else {
        return 0.0;
    };

    let mut best: Option<Vec<i32>> = None;
    let mut x = bounds.x as u32;
    while x < (bounds.x + bounds.w) as u32 {
        let width = SLICE_WIDTH.min((bounds.x + bounds.w) as u32 - x);
        let strip =
            image::imageops::crop_imm(mask, x, bounds.y as u32, width, bounds.h as u32).to_image();
        let centres: Vec<i32> = outer_contours(&strip)
            .iter()
            .filter_map(|c| BBox::from_points(c))
            .map(|b| b.y + b.h / 2)
            .collect();

        if best.as_ref().map_or(true, |b| centres.len() > b.len()) {
            best = Some(centres);
        }
        x += SLICE_WIDTH;
    }

    match best {
        Some(centres) if !centres.is_empty() => (median(&centres) / centres.len() as f64).floor(),
        _ => 0.0,
    }
}

fn median(values: &[i32]) -> f64 {
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 0 {
        (sorted[mid - 1] as f64 + sorted[mid] as f64) / 2.0
    } else {
        sorted[mid] as f64
    }
}

/// Bounding box of all non-zero pixels
pub fn foreground_bounds(mask: &GrayImage) -> Option<BBox> {
    let points: Vec<Point<i32>> = mask
        .enumerate_pixels()
        .filter(|(_, _, p)| p.0[0] > 0)
        .map(|(x, y, _)| Point::new(x as i32, y as i32))
        .collect();
    BBox::from_points(&points)
}

/// Group lines into bands of similar height, top to bottom
///
/// Lines are visited by centroid y; a line joins the current band while it
/// stays within `threshold` of the band's mean y. Bands are sorted by mean
/// y, ties by leftmost x, and their members by x.
pub fn group_into_bands(lines: &[Line], threshold: f64) -> Vec<Vec<usize>> {
    let mut by_height: Vec<usize> = (0..lines.len()).collect();
    by_height.sort_by_key(|&i| (lines[i].centroid.y, lines[i].centroid.x));

    let mut bands: Vec<Vec<usize>> = Vec::new();
    let mut current: Vec<usize> = Vec::new();

    for idx in by_height {
        if !current.is_empty() {
            let band_mean = mean_y(lines, &current);
            if (band_mean - lines[idx].centroid.y as f64).abs() > threshold {
                bands.push(std::mem::take(&mut current));
            }
        }
        current.push(idx);
    }
    if !current.is_empty() {
        bands.push(current);
    }

    for band in &mut bands {
        band.sort_by_key(|&i| lines[i].centroid.x);
    }

    bands.sort_by(|a, b| {
        mean_y(lines, a)
            .total_cmp(&mean_y(lines, b))
            .then_with(|| min_x(lines, a).cmp(&min_x(lines, b)))
    });

    bands
}

fn mean_y(lines: &[Line], band: &[usize]) -> f64 {
    band.iter().map(|&i| lines[i].centroid.y as f64).sum::<f64>() / band.len() as f64
}

fn min_x(lines: &[Line], band: &[usize]) -> i32 {
    band.iter().map(|&i| lines[i].bbox.x).min().unwrap_or(i32::MAX)
}

/// Replace a band's fragments with one line around their convex hull
pub fn merge_band(members: &[&Line]) -> Option<Line> {
    let stacked: Vec<Point<i32>> = members
        .iter()
        .flat_map(|line| line.contour.iter().copied())
        .collect();
    Line::from_contour(0, convex_hull(&stacked))
}

/// Put lines in reading order, optionally merging each band into one line
/// Ids are reassigned to reflect the final order
pub fn order_lines(lines: Vec<Line>, threshold: f64, merge: bool) -> Vec<Line> {
    let bands = group_into_bands(&lines, threshold);
    tracing::debug!(
        "Grouped {} lines into {} bands (threshold {})",
        lines.len(),
        bands.len(),
        threshold
    );

    let mut ordered = Vec::with_capacity(lines.len());
    for band in &bands {
        if merge && band.len() > 1 {
            let members: Vec<&Line> = band.iter().map(|&i| &lines[i]).collect();
            if let Some(merged) = merge_band(&members) {
                ordered.push(merged);
                continue;
            }
        }
        ordered.extend(band.iter().map(|&i| lines[i].clone()));
    }

    for (id, line) in ordered.iter_mut().enumerate() {
        line.id = id;
    }
    ordered
}
