//! Line extraction for a whole page

use super::contour::{contour_area, outer_contours, simplify};
use super::dewarp::{dewarp_line_region, dewarp_page, CurvatureSurvey};
use super::extraction::LineExtractor;
use super::ordering::{line_threshold, order_lines};
use super::rotation::{estimate_angle, rotate_mask, rotate_page};
use super::{BBox, Line};
use crate::config::{OcrOptions, TpsMode};
use crate::error::OcrError;
use image::{GrayImage, RgbImage};
use imageproc::point::Point;

/// Contours below this area are noise
const MIN_CONTOUR_AREA: f64 = 10.0;

/// Lines narrower than this fraction of the page are dropped
const MIN_WIDTH_FRACTION: f64 = 0.01;

/// Lines must be taller than this many pixels
const MIN_LINE_HEIGHT: i32 = 10;

/// Corrected page with its lines in reading order
#[derive(Debug, Clone)]
pub struct PageLines {
    /// Page after rotation and, in global mode, dewarping
    pub page: RgbImage,
    /// Text-line mask aligned to `page`
    pub mask: GrayImage,
    pub angle: f64,
    pub lines: Vec<Line>,
    /// One crop per line; `None` when nothing could be cut
    pub images: Vec<Option<RgbImage>>,
    pub line_threshold: f64,
    pub tps_applied: bool,
    /// k-factor left after the last line
    pub k_factor: f64,
}

/// Contours that can be text lines
fn line_contours(mask: &GrayImage) -> Vec<Vec<Point<i32>>> {
    let min_width = MIN_WIDTH_FRACTION * mask.width() as f64;
    outer_contours(mask)
        .into_iter()
        .filter(|c| contour_area(c) >= MIN_CONTOUR_AREA)
        .filter(|c| {
            BBox::from_points(c)
                .map(|b| b.w as f64 > min_width && b.h > MIN_LINE_HEIGHT)
                .unwrap_or(false)
        })
        .collect()
}

/// Curvature of the merged lines; without one, lines are cut unwarped
fn survey_ordered_lines(lines: &[Line]) -> Option<CurvatureSurvey> {
    match CurvatureSurvey::of_lines(lines) {
        Ok(survey) => Some(survey),
        Err(e) => {
            tracing::warn!("Skipping local dewarping: {}", e);
            None
        }
    }
}

/// Turn a page and its text-line mask into ordered line crops
pub fn extract_page_lines(
    page: &RgbImage,
    mask: &GrayImage,
    options: &OcrOptions,
) -> Result<PageLines, OcrError> {
    if page.dimensions() != mask.dimensions() {
        return Err(OcrError::InvalidInput(format!(
            "mask {:?} does not match page {:?}",
            mask.dimensions(),
            page.dimensions()
        )));
    }

    let angle = estimate_angle(mask, options.max_angle);
    tracing::debug!("Estimated page rotation: {:.2} degrees", angle);
    let mut page = rotate_page(page, angle);
    let mut mask = rotate_mask(mask, angle);

    let mut contours = line_contours(&mask);
    if contours.is_empty() {
        return Err(OcrError::NoLines);
    }

    let mut tps_applied = false;
    if options.use_tps {
        let survey = CurvatureSurvey::of_contours(&contours)?;
        let fraction = survey.warped_fraction();
        tps_applied = fraction > 0.0 && fraction >= options.tps_threshold;
        tracing::debug!(
            "Warped line fraction {:.2} (threshold {:.2}), dewarping: {}",
            fraction,
            options.tps_threshold,
            tps_applied
        );

        if tps_applied && options.tps_mode == TpsMode::Global {
            if let Some(curvature) = survey.representative().and_then(|i| survey.warped(i)) {
                let (warped_page, warped_mask) = dewarp_page(&page, &mask, curvature)?;
                page = warped_page;
                mask = warped_mask;
                contours = line_contours(&mask);
                if contours.is_empty() {
                    return Err(OcrError::NoLines);
                }
            }
        }
    }

    let lines: Vec<Line> = contours
        .iter()
        .enumerate()
        .filter_map(|(id, c)| Line::from_contour(id, simplify(c)))
        .collect();

    let threshold = line_threshold(&mask);
    let lines = order_lines(lines, threshold, options.merge_lines);

    let mut extractor = LineExtractor::new(options.k_factor, options.bbox_tolerance);
    let local_survey = if tps_applied && options.tps_mode == TpsMode::Local {
        survey_ordered_lines(&lines)
    } else {
        None
    };

    let mut images = Vec::with_capacity(lines.len());
    for (idx, line) in lines.iter().enumerate() {
        let curvature = local_survey.as_ref().and_then(|s| s.warped(idx));
        let image = match curvature {
            Some(curvature) => {
                let region = dewarp_line_region(&page, line, curvature)?;
                extractor.extract_masked(&region.page, &region.line_mask, line.bbox.h)
            }
            None => extractor.extract(&page, line),
        };
        images.push(image);
    }

    Ok(PageLines {
        page,
        mask,
        angle,
        lines,
        images,
        line_threshold: threshold,
        tps_applied,
        k_factor: extractor.k_factor(),
    })
}
