use image::{GrayImage, RgbImage};

/// Convert a page or line crop to a single channel
/// This is the foundation for binarization and recognizer input
pub fn apply(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_grayscale_converts_color() {
        let mut img = RgbImage::new(10, 10);
        img.put_pixel(0, 0, Rgb([255, 0, 0])); // Red
        img.put_pixel(1, 0, Rgb([0, 255, 0])); // Green
        img.put_pixel(2, 0, Rgb([0, 0, 255])); // Blue

        let gray = apply(&img);

        // All pixels should have some value (within tolerance)
        assert!(gray.get_pixel(0, 0).0[0] > 0);
        assert!(gray.get_pixel(1, 0).0[0] > 0);
        assert!(gray.get_pixel(2, 0).0[0] > 0);
    }

    #[test]
    fn test_grayscale_preserves_dimensions() {
        let img = RgbImage::new(100, 50);
        let gray = apply(&img);
        assert_eq!(gray.width(), 100);
        assert_eq!(gray.height(), 50);
    }
}
