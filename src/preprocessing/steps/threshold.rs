use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;

/// Adaptive Gaussian threshold parameters
/// A 51 px block corresponds to a Gaussian with sigma 8.0
const BLOCK_SIGMA: f32 = 8.0;
const OFFSET: i16 = 13;

/// Binarize a page or line image with an adaptive Gaussian threshold
/// Robust to uneven paper tone and bleed-through on woodblock prints
pub fn binarize(image: &GrayImage) -> GrayImage {
    adaptive_gaussian_threshold(image, BLOCK_SIGMA, OFFSET)
}

/// For each pixel, threshold = gaussian_mean - c
/// Pixels strictly above their threshold become white
fn adaptive_gaussian_threshold(img: &GrayImage, sigma: f32, c: i16) -> GrayImage {
    let (width, height) = img.dimensions();
    if width == 0 || height == 0 {
        return img.clone();
    }

    let local_mean = gaussian_blur_f32(img, sigma);

    GrayImage::from_fn(width, height, |x, y| {
        let threshold = local_mean.get_pixel(x, y).0[0] as i16 - c;
        let pixel = img.get_pixel(x, y).0[0] as i16;
        if pixel > threshold {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

/// Global threshold, used to re-binarize interpolated masks
pub fn apply_fixed(img: &GrayImage, level: u8) -> GrayImage {
    GrayImage::from_fn(img.width(), img.height(), |x, y| {
        if img.get_pixel(x, y).0[0] >= level {
            Luma([255u8])
        } else {
            Luma([0u8])
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binarize_produces_binary_output() {
        let img = GrayImage::from_fn(100, 100, |x, y| Luma([((x + y) % 256) as u8]));
        let result = binarize(&img);

        for pixel in result.pixels() {
            assert!(pixel.0[0] == 0 || pixel.0[0] == 255);
        }
    }

    #[test]
    fn test_binarize_keeps_dark_stroke_on_uneven_background() {
        // Background brightens from left to right, stroke stays darker than its surroundings
        let img = GrayImage::from_fn(200, 100, |x, y| {
            let paper = 150 + (x / 2) as u8;
            if (45..55).contains(&y) {
                Luma([paper - 100])
            } else {
                Luma([paper])
            }
        });

        let result = binarize(&img);

        assert_eq!(result.get_pixel(20, 50).0[0], 0);
        assert_eq!(result.get_pixel(180, 50).0[0], 0);
        assert_eq!(result.get_pixel(20, 10).0[0], 255);
        assert_eq!(result.get_pixel(180, 90).0[0], 255);
    }

    #[test]
    fn test_uniform_image_is_white() {
        let img = GrayImage::from_pixel(60, 60, Luma([200]));
        let result = binarize(&img);
        assert!(result.pixels().all(|p| p.0[0] == 255));
    }

    #[test]
    fn test_apply_fixed_splits_at_level() {
        let img = GrayImage::from_fn(4, 1, |x, _| Luma([[0, 127, 128, 255][x as usize]]));
        let result = apply_fixed(&img, 128);
        let values: Vec<u8> = result.pixels().map(|p| p.0[0]).collect();
        assert_eq!(values, vec![0, 0, 255, 255]);
    }
}
