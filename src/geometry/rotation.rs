//! Page rotation estimated from the orientation of line regions

use super::contour::{contour_area, min_area_rect, outer_contours};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

/// Contours smaller than this fraction of the mask do not vote on the angle
const MIN_AREA_FRACTION: f64 = 0.001;

/// Estimate the skew of the text lines in `mask`, in degrees
///
/// Positive angles mean lines descend to the right. Only orientations within
/// `max_angle` of horizontal are considered.
pub fn estimate_angle(mask: &GrayImage, max_angle: f64) -> f64 {
    let min_area = MIN_AREA_FRACTION * mask.width() as f64 * mask.height() as f64;

    let mut low = Vec::new();
    let mut high = Vec::new();

    for contour in outer_contours(mask) {
        if contour_area(&contour) <= min_area {
            continue;
        }
        let Some(rect) = min_area_rect(&contour) else {
            continue;
        };
        let angle = rect.angle;
        if angle > 0.0 && angle < max_angle {
            low.push(angle);
        } else if angle > 90.0 - max_angle && angle < 90.0 {
            high.push(angle);
        }
    }

    dominant_angle(&low, &high)
}

/// Mean of the larger orientation set; high must strictly outnumber low
fn dominant_angle(low: &[f64], high: &[f64]) -> f64 {
    if low.is_empty() && high.is_empty() {
        return 0.0;
    }

    if high.len() > low.len() {
        -(90.0 - mean(high))
    } else {
        mean(low)
    }
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Rotate a page so lines skewed by `angle` become horizontal
pub fn rotate_page(page: &RgbImage, angle: f64) -> RgbImage {
    if angle == 0.0 {
        return page.clone();
    }
    rotate_about_center(
        page,
        -(angle.to_radians() as f32),
        Interpolation::Bilinear,
        Rgb([255, 255, 255]),
    )
}

/// Rotate a binary mask the same way as its page, keeping it binary
pub fn rotate_mask(mask: &GrayImage, angle: f64) -> GrayImage {
    if angle == 0.0 {
        return mask.clone();
    }
    rotate_about_center(mask, -(angle.to_radians() as f32), Interpolation::Nearest, Luma([0]))
}
