//! Thin-plate-spline dewarping of curved text lines
//!
//! A line is sampled in five vertical slices. When the slice centres drift
//! further apart than the line is thick, the centres become control points
//! of a spline that maps a straight line onto the curved one. Resampling
//! the page through that spline straightens the line.

use super::contour::{contour_area, fill_contour, outer_contours};
use super::{BBox, Line};
use crate::error::OcrError;
use crate::preprocessing::apply_fixed;
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::point::Point;
use nalgebra::DMatrix;

/// Width of each vertical slice sampled along a line
pub const SLICE_WIDTH: i32 = 40;

/// Regularization of the spline fit
pub const TPS_ALPHA: f64 = 0.5;

/// Mask values at or above this level survive resampling
const MASK_LEVEL: u8 = 128;

/// Vertical drift of a line sampled at five positions
#[derive(Debug, Clone, PartialEq)]
pub struct LineCurvature {
    /// Slice centres on the curved line, (x, y)
    pub input_points: Vec<(f64, f64)>,
    /// Where those centres lie once the line is straight
    pub output_points: Vec<(f64, f64)>,
    /// Spread between the highest and lowest slice centre
    pub max_yd: f64,
    pub mean_height: f64,
}

impl LineCurvature {
    pub fn is_warped(&self) -> bool {
        self.max_yd > self.mean_height
    }
}

/// Sample a line contour and measure its curvature
///
/// Returns `None` when a slice holds no part of the line.
pub fn analyze_line(contour: &[Point<i32>]) -> Option<LineCurvature> {
    let bbox = BBox::from_points(contour)?;
    let mut local = GrayImage::new(bbox.w as u32, bbox.h as u32);
    let shifted: Vec<Point<i32>> = contour
        .iter()
        .map(|p| Point::new(p.x - bbox.x, p.y - bbox.y))
        .collect();
    fill_contour(&mut local, &shifted);

    let (w, sw) = (bbox.w, SLICE_WIDTH);
    let starts = [0, w / 4 - sw, w / 2, w / 2 + w / 4, w - sw];

    let mut centres = Vec::with_capacity(starts.len());
    let mut heights = Vec::with_capacity(starts.len());

    for start in starts {
        let start = start.clamp(0, w - 1);
        let end = (start + sw).min(w);
        let slice = image::imageops::crop_imm(&local, start as u32, 0, (end - start) as u32, bbox.h as u32)
            .to_image();

        let component = outer_contours(&slice)
            .into_iter()
            .max_by(|a, b| contour_area(a).total_cmp(&contour_area(b)))?;
        let part = BBox::from_points(&component)?;

        centres.push((
            (bbox.x + start + part.x) as f64 + part.w as f64 / 2.0,
            (bbox.y + part.y) as f64 + part.h as f64 / 2.0,
        ));
        heights.push(part.h as f64);
    }

    let ys: Vec<f64> = centres.iter().map(|c| c.1).collect();
    let max_y = ys.iter().copied().fold(f64::MIN, f64::max);
    let min_y = ys.iter().copied().fold(f64::MAX, f64::min);
    let target_y = ys.iter().sum::<f64>() / ys.len() as f64;

    Some(LineCurvature {
        output_points: centres.iter().map(|&(x, _)| (x, target_y)).collect(),
        input_points: centres,
        max_yd: max_y - min_y,
        mean_height: heights.iter().sum::<f64>() / heights.len() as f64,
    })
}

/// Curvature of every line on a page
#[derive(Debug, Clone)]
pub struct CurvatureSurvey {
    pub lines: Vec<Option<LineCurvature>>,
}

impl CurvatureSurvey {
    /// Measure each contour; unresolvable lines are treated as straight
    pub fn of_contours(contours: &[Vec<Point<i32>>]) -> Result<Self, OcrError> {
        let lines: Vec<Option<LineCurvature>> = contours.iter().map(|c| analyze_line(c)).collect();

        let failed = lines.iter().filter(|l| l.is_none()).count();
        if !lines.is_empty() && failed == lines.len() {
            return Err(OcrError::DegenerateGeometry(format!(
                "no slice control points resolvable on any of {} lines",
                lines.len()
            )));
        }
        if failed > 0 {
            tracing::warn!("{} of {} lines have no resolvable control points", failed, lines.len());
        }

        Ok(Self { lines })
    }

    pub fn of_lines(lines: &[Line]) -> Result<Self, OcrError> {
        let contours: Vec<Vec<Point<i32>>> = lines.iter().map(|l| l.contour.clone()).collect();
        Self::of_contours(&contours)
    }

    pub fn warped(&self, idx: usize) -> Option<&LineCurvature> {
        self.lines
            .get(idx)
            .and_then(|l| l.as_ref())
            .filter(|c| c.is_warped())
    }

    /// Share of lines that are curved
    pub fn warped_fraction(&self) -> f64 {
        if self.lines.is_empty() {
            return 0.0;
        }
        let warped = (0..self.lines.len()).filter(|&i| self.warped(i).is_some()).count();
        warped as f64 / self.lines.len() as f64
    }

    /// The curved line whose drift is closest to the page average
    pub fn representative(&self) -> Option<usize> {
        let drifts: Vec<f64> = (0..self.lines.len())
            .map(|i| self.warped(i).map_or(0.0, |c| c.max_yd))
            .collect();
        if drifts.is_empty() {
            return None;
        }
        let mean = drifts.iter().sum::<f64>() / drifts.len() as f64;

        drifts
            .iter()
            .enumerate()
            .filter(|(_, d)| **d > 0.0)
            .min_by(|(_, a), (_, b)| (mean - **a).abs().total_cmp(&(mean - **b).abs()))
            .map(|(i, _)| i)
    }
}

/// Thin-plate spline mapping source points onto target points
#[derive(Debug, Clone)]
pub struct ThinPlateSpline {
    sources: Vec<(f64, f64)>,
    /// One row per source point, then the affine part (1, x, y)
    weights: DMatrix<f64>,
}

fn radial_basis(dx: f64, dy: f64) -> f64 {
    let r2 = dx * dx + dy * dy;
    if r2 == 0.0 {
        0.0
    } else {
        r2 * r2.sqrt().ln()
    }
}

impl ThinPlateSpline {
    /// Fit a regularized spline with `alpha` added to the kernel diagonal
    pub fn fit(sources: &[(f64, f64)], targets: &[(f64, f64)], alpha: f64) -> Result<Self, OcrError> {
        if sources.len() != targets.len() || sources.len() < 3 {
            return Err(OcrError::DegenerateGeometry(format!(
                "spline needs matching control points, got {} and {}",
                sources.len(),
                targets.len()
            )));
        }

        let n = sources.len();
        let mut a = DMatrix::<f64>::zeros(n + 3, n + 3);
        let mut b = DMatrix::<f64>::zeros(n + 3, 2);

        for (i, &(xi, yi)) in sources.iter().enumerate() {
            for (j, &(xj, yj)) in sources.iter().enumerate() {
                a[(i, j)] = radial_basis(xi - xj, yi - yj);
            }
            a[(i, i)] += alpha;
            a[(i, n)] = 1.0;
            a[(i, n + 1)] = xi;
            a[(i, n + 2)] = yi;
            a[(n, i)] = 1.0;
            a[(n + 1, i)] = xi;
            a[(n + 2, i)] = yi;
            b[(i, 0)] = targets[i].0;
            b[(i, 1)] = targets[i].1;
        }

        let weights = a
            .lu()
            .solve(&b)
            .ok_or_else(|| OcrError::DegenerateGeometry("spline system is singular".to_string()))?;

        Ok(Self {
            sources: sources.to_vec(),
            weights,
        })
    }

    pub fn transform(&self, x: f64, y: f64) -> (f64, f64) {
        let n = self.sources.len();
        let w = &self.weights;
        let mut tx = w[(n, 0)] + w[(n + 1, 0)] * x + w[(n + 2, 0)] * y;
        let mut ty = w[(n, 1)] + w[(n + 1, 1)] * x + w[(n + 2, 1)] * y;
        for (i, &(sx, sy)) in self.sources.iter().enumerate() {
            let u = radial_basis(x - sx, y - sy);
            tx += w[(i, 0)] * u;
            ty += w[(i, 1)] * u;
        }
        (tx, ty)
    }
}

/// Spline that straightens `curvature` on a `width` x `height` image
///
/// It maps straight output coordinates to curved input coordinates. The
/// image corners are pinned to themselves.
pub fn straightening_spline(
    curvature: &LineCurvature,
    width: u32,
    height: u32,
) -> Result<ThinPlateSpline, OcrError> {
    let (right, bottom) = ((width.max(1) - 1) as f64, (height.max(1) - 1) as f64);
    let corners = [(0.0, 0.0), (right, 0.0), (0.0, bottom), (right, bottom)];

    let mut sources = curvature.output_points.clone();
    sources.extend_from_slice(&corners);
    let mut targets = curvature.input_points.clone();
    targets.extend_from_slice(&corners);

    ThinPlateSpline::fit(&sources, &targets, TPS_ALPHA)
}

/// Resampling of an image through a spline, one row at a time
pub struct WarpField<'a> {
    spline: &'a ThinPlateSpline,
    width: u32,
    height: u32,
}

impl<'a> WarpField<'a> {
    pub fn new(spline: &'a ThinPlateSpline, width: u32, height: u32) -> Self {
        Self {
            spline,
            width,
            height,
        }
    }

    /// Source coordinates of every pixel in output row `y`
    fn row_sources(&self, y: u32) -> Vec<(f64, f64)> {
        (0..self.width)
            .map(|x| self.spline.transform(x as f64, y as f64))
            .collect()
    }

    /// Resample a page; pixels mapped outside it become white
    pub fn apply_page(&self, page: &RgbImage) -> RgbImage {
        let mut out = RgbImage::new(self.width, self.height);
        for y in 0..self.height {
            for (x, (sx, sy)) in self.row_sources(y).into_iter().enumerate() {
                let mut pixel = [255u8; 3];
                for (c, value) in pixel.iter_mut().enumerate() {
                    if let Some(v) = bilinear(sx, sy, page.width(), page.height(), |px, py| {
                        page.get_pixel(px, py).0[c] as f64
                    }) {
                        *value = v.round().clamp(0.0, 255.0) as u8;
                    }
                }
                out.put_pixel(x as u32, y, Rgb(pixel));
            }
        }
        out
    }

    /// Resample a binary mask and re-binarize it
    pub fn apply_mask(&self, mask: &GrayImage) -> GrayImage {
        let mut resampled = GrayImage::new(self.width, self.height);
        for y in 0..self.height {
            for (x, (sx, sy)) in self.row_sources(y).into_iter().enumerate() {
                let v = bilinear(sx, sy, mask.width(), mask.height(), |px, py| {
                    mask.get_pixel(px, py).0[0] as f64
                })
                .unwrap_or(0.0);
                resampled.put_pixel(x as u32, y, Luma([v as u8]));
            }
        }
        apply_fixed(&resampled, MASK_LEVEL)
    }
}

fn bilinear(
    x: f64,
    y: f64,
    width: u32,
    height: u32,
    value: impl Fn(u32, u32) -> f64,
) -> Option<f64> {
    if width == 0 || height == 0 {
        return None;
    }
    if !(x >= 0.0 && y >= 0.0 && x <= (width - 1) as f64 && y <= (height - 1) as f64) {
        return None;
    }
    let (x0, y0) = (x.floor() as u32, y.floor() as u32);
    let (x1, y1) = ((x0 + 1).min(width - 1), (y0 + 1).min(height - 1));
    let (fx, fy) = (x - x0 as f64, y - y0 as f64);

    let top = value(x0, y0) * (1.0 - fx) + value(x1, y0) * fx;
    let bottom = value(x0, y1) * (1.0 - fx) + value(x1, y1) * fx;
    Some(top * (1.0 - fy) + bottom * fy)
}

/// Straighten a whole page and its mask with one line's curvature
pub fn dewarp_page(
    page: &RgbImage,
    mask: &GrayImage,
    curvature: &LineCurvature,
) -> Result<(RgbImage, GrayImage), OcrError> {
    let spline = straightening_spline(curvature, page.width(), page.height())?;
    let field = WarpField::new(&spline, page.width(), page.height());
    Ok((field.apply_page(page), field.apply_mask(mask)))
}

/// A straightened neighbourhood of one line
pub struct DewarpedRegion {
    pub page: RgbImage,
    /// Straightened mask of the line alone
    pub line_mask: GrayImage,
}

/// Straighten only the neighbourhood of `line`
pub fn dewarp_line_region(
    page: &RgbImage,
    line: &Line,
    curvature: &LineCurvature,
) -> Result<DewarpedRegion, OcrError> {
    let region = line
        .bbox
        .expand_within(SLICE_WIDTH, line.bbox.h, page.width(), page.height());
    let crop = image::imageops::crop_imm(page, region.x as u32, region.y as u32, region.w as u32, region.h as u32)
        .to_image();

    let mut line_mask = GrayImage::new(region.w as u32, region.h as u32);
    let shifted: Vec<Point<i32>> = line
        .contour
        .iter()
        .map(|p| Point::new(p.x - region.x, p.y - region.y))
        .collect();
    fill_contour(&mut line_mask, &shifted);

    let to_local = |pts: &[(f64, f64)]| -> Vec<(f64, f64)> {
        pts.iter()
            .map(|&(x, y)| (x - region.x as f64, y - region.y as f64))
            .collect()
    };
    let local = LineCurvature {
        input_points: to_local(&curvature.input_points),
        output_points: to_local(&curvature.output_points),
        ..curvature.clone()
    };

    let spline = straightening_spline(&local, crop.width(), crop.height())?;
    let field = WarpField::new(&spline, crop.width(), crop.height());

    Ok(DewarpedRegion {
        page: field.apply_page(&crop),
        line_mask: field.apply_mask(&line_mask),
    })
}
