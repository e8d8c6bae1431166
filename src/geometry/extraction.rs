//! Per-line image extraction with an adaptive dilation kernel
//!
//! A line's mask is dilated with a rectangle proportional to the line height
//! and used to cut the line out of the page. When the cut bleeds into the
//! neighbouring lines the kernel shrinks, and the smaller kernel is kept for
//! the lines that follow.

use super::contour::fill_contour;
use super::{BBox, Line};
use image::{GrayImage, Luma, Rgb, RgbImage};
use imageproc::point::Point;

/// Amount the dilation multiplier drops per retry
pub const K_STEP: f64 = 0.1;

/// Stateful extractor carrying the adapted k-factor across lines
#[derive(Debug, Clone)]
pub struct LineExtractor {
    k_factor: f64,
    tolerance: f64,
}

impl LineExtractor {
    pub fn new(k_factor: f64, bbox_tolerance: f64) -> Self {
        Self {
            k_factor,
            tolerance: bbox_tolerance,
        }
    }

    /// Current dilation multiplier
    pub fn k_factor(&self) -> f64 {
        self.k_factor
    }

    /// Cut `line` out of `page`
    pub fn extract(&mut self, page: &RgbImage, line: &Line) -> Option<RgbImage> {
        let (kw, kh) = kernel_size(line.bbox.h, self.k_factor);
        let region = line
            .bbox
            .expand_within(kw / 2 + 1, kh / 2 + 1, page.width(), page.height());

        let mut mask = GrayImage::new(region.w as u32, region.h as u32);
        let shifted: Vec<Point<i32>> = line
            .contour
            .iter()
            .map(|p| Point::new(p.x - region.x, p.y - region.y))
            .collect();
        fill_contour(&mut mask, &shifted);

        let crop = image::imageops::crop_imm(
            page,
            region.x as u32,
            region.y as u32,
            region.w as u32,
            region.h as u32,
        )
        .to_image();

        self.extract_masked(&crop, &mask, line.bbox.h)
    }

    /// Cut the region selected by `line_mask` out of `page`
    ///
    /// Both images must have the same size. The kernel shrinks by
    /// `K_STEP` until the cut is at most `bbox_tolerance` line heights tall.
    pub fn extract_masked(&mut self, page: &RgbImage, line_mask: &GrayImage, line_height: i32) -> Option<RgbImage> {
        let limit = self.tolerance * line_height as f64;
        let mut k = self.k_factor;

        loop {
            let crop = dilate_and_crop(page, line_mask, line_height, k);
            let height = crop.as_ref().map_or(0, |c| c.height()) as f64;

            if height <= limit || k <= K_STEP + f64::EPSILON {
                if k != self.k_factor {
                    tracing::debug!("Adapted k-factor from {:.1} to {:.1}", self.k_factor, k);
                }
                self.k_factor = k;
                return crop;
            }

            k = ((k - K_STEP) * 10.0).round() / 10.0;
        }
    }
}

/// Dilation kernel (width, height) for a line of height `h`
fn kernel_size(h: i32, k: f64) -> (i32, i32) {
    let width = (h as f64 * k) as i32;
    let height = (width as f64 * k) as i32;
    (width.max(1), height.max(1))
}

fn dilate_and_crop(page: &RgbImage, line_mask: &GrayImage, line_height: i32, k: f64) -> Option<RgbImage> {
    let (kw, kh) = kernel_size(line_height, k);
    let dilated = dilate_rect(line_mask, kw as u32, kh as u32);
    mask_and_crop(page, &dilated)
}

/// Binary dilation with a `kw` x `kh` rectangle anchored at its centre
pub fn dilate_rect(mask: &GrayImage, kw: u32, kh: u32) -> GrayImage {
    let horizontal = dilate_1d(mask, kw, true);
    dilate_1d(&horizontal, kh, false)
}

fn dilate_1d(mask: &GrayImage, size: u32, horizontal: bool) -> GrayImage {
    let (width, height) = mask.dimensions();
    if size <= 1 || width == 0 || height == 0 {
        return mask.clone();
    }

    let (len, lanes) = if horizontal { (width, height) } else { (height, width) };
    let anchor = (size / 2) as i64;
    let reach = size as i64 - 1 - anchor;
    let mut out = GrayImage::new(width, height);
    let mut prefix = vec![0u32; len as usize + 1];

    for lane in 0..lanes {
        let at = |i: u32| if horizontal { (i, lane) } else { (lane, i) };
        for i in 0..len {
            let (x, y) = at(i);
            prefix[i as usize + 1] = prefix[i as usize] + u32::from(mask.get_pixel(x, y).0[0] > 0);
        }
        for i in 0..len {
            // Source window that reaches position i
            let lo = (i as i64 - anchor).max(0) as usize;
            let hi = (i as i64 + reach).min(len as i64 - 1) as usize;
            if prefix[hi + 1] > prefix[lo] {
                let (x, y) = at(i);
                out.put_pixel(x, y, Luma([255]));
            }
        }
    }
    out
}

/// Keep page pixels under the mask and crop to the non-black area
pub fn mask_and_crop(page: &RgbImage, mask: &GrayImage) -> Option<RgbImage> {
    let mut masked = RgbImage::new(page.width(), page.height());
    let mut kept: Vec<Point<i32>> = Vec::new();

    for (x, y, pixel) in page.enumerate_pixels() {
        if mask.get_pixel(x, y).0[0] > 0 && pixel.0.iter().any(|&c| c > 0) {
            masked.put_pixel(x, y, *pixel);
            kept.push(Point::new(x as i32, y as i32));
        }
    }

    let bounds: BBox = BBox::from_points(&kept)?;
    Some(
        image::imageops::crop_imm(
            &masked,
            bounds.x as u32,
            bounds.y as u32,
            bounds.w as u32,
            bounds.h as u32,
        )
        .to_image(),
    )
}

/// White page with a black stroke under `line`, used by tests
#[cfg(test)]
pub(crate) fn page_with_line(width: u32, height: u32, line: &Line) -> RgbImage {
    let mut page = RgbImage::from_pixel(width, height, Rgb([255, 255, 255]));
    for y in line.bbox.y..=line.bbox.bottom() {
        for x in line.bbox.x..=line.bbox.right() {
            page.put_pixel(x as u32, y as u32, Rgb([0, 0, 0]));
        }
    }
    page
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rect_line(x: i32, y: i32, w: i32, h: i32) -> Line {
        Line::from_contour(
            0,
            vec![
                Point::new(x, y),
                Point::new(x + w - 1, y),
                Point::new(x + w - 1, y + h - 1),
                Point::new(x, y + h - 1),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_dilate_rect_grows_by_kernel() {
        let mut mask = GrayImage::new(50, 50);
        mask.put_pixel(25, 25, Luma([255]));
        let dilated = dilate_rect(&mask, 5, 3);

        let lit: Vec<(u32, u32)> = dilated
            .enumerate_pixels()
            .filter(|(_, _, p)| p.0[0] > 0)
            .map(|(x, y, _)| (x, y))
            .collect();
        assert_eq!(lit.len(), 15);
        assert!(dilated.get_pixel(23, 24).0[0] > 0);
        assert!(dilated.get_pixel(27, 26).0[0] > 0);
        assert_eq!(dilated.get_pixel(28, 25).0[0], 0);
    }

    #[test]
    fn test_mask_and_crop_blackens_outside_and_trims() {
        let page = RgbImage::from_pixel(20, 20, Rgb([200, 200, 200]));
        let mut mask = GrayImage::new(20, 20);
        for y in 5..8 {
            for x in 2..12 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        let crop = mask_and_crop(&page, &mask).unwrap();
        assert_eq!(crop.dimensions(), (10, 3));
        assert_eq!(crop.get_pixel(0, 0), &Rgb([200, 200, 200]));
    }

    #[test]
    fn test_empty_mask_gives_no_crop() {
        let page = RgbImage::from_pixel(20, 20, Rgb([200, 200, 200]));
        assert!(mask_and_crop(&page, &GrayImage::new(20, 20)).is_none());
    }

    #[test]
    fn test_k_factor_backs_off_and_persists() {
        let first = rect_line(50, 100, 200, 20);
        let second = rect_line(50, 200, 200, 20);
        let page = RgbImage::from_pixel(400, 320, Rgb([255, 255, 255]));
        let mut extractor = LineExtractor::new(1.7, 3.0);

        let crop = extractor.extract(&page, &first).unwrap();
        assert!((extractor.k_factor() - 1.4).abs() < 1e-9);
        assert!(crop.height() as f64 <= 3.0 * 20.0);
        assert_eq!(crop.height(), 58);

        extractor.extract(&page, &second).unwrap();
        assert!((extractor.k_factor() - 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_generous_tolerance_keeps_k() {
        let line = rect_line(50, 100, 200, 20);
        let page = page_with_line(400, 320, &line);
        let mut extractor = LineExtractor::new(1.2, 3.0);
        let crop = extractor.extract(&page, &line).unwrap();
        assert_eq!(extractor.k_factor(), 1.2);
        // kw = 24, kh = 28
        assert_eq!(crop.height(), 20 + 27);
        assert_eq!(crop.width(), 200 + 23);
    }
}
