use super::resize::{to_height, to_width};
use image::imageops::replace;
use image::{GrayImage, ImageBuffer, Luma, Pixel};

/// Pad an image on the right and bottom so both sides are multiples of `tile`
/// Returns the padded image and the (x, y) pad amounts
pub fn pad_to_multiple<P>(
    image: &ImageBuffer<P, Vec<P::Subpixel>>,
    tile: u32,
    fill: P,
) -> (ImageBuffer<P, Vec<P::Subpixel>>, u32, u32)
where
    P: Pixel,
{
    let (width, height) = image.dimensions();
    let padded_width = width.div_ceil(tile) * tile;
    let padded_height = height.div_ceil(tile) * tile;
    let pad_x = padded_width - width;
    let pad_y = padded_height - height;

    if pad_x == 0 && pad_y == 0 {
        return (image.clone(), 0, 0);
    }

    let mut padded = ImageBuffer::from_pixel(padded_width, padded_height, fill);
    replace(&mut padded, image, 0, 0);

    (padded, pad_x, pad_y)
}

/// Fit a line image into a `width` x `height` box without distorting it
/// The short axis is centred and padded with white
pub fn fit_to_box(image: &GrayImage, width: u32, height: u32) -> GrayImage {
    let width_ratio = width as f64 / image.width() as f64;
    let height_ratio = height as f64 / image.height() as f64;

    let scaled = if width_ratio <= height_ratio {
        to_width(image, width)
    } else {
        to_height(image, height)
    };

    let mut canvas = GrayImage::from_pixel(width, height, Luma([255]));
    let offset_x = width.saturating_sub(scaled.width()) / 2;
    let offset_y = height.saturating_sub(scaled.height()) / 2;

    if scaled.width() > width || scaled.height() > height {
        // Rounding overshoot: squeeze to the exact box
        return image::imageops::resize(
            &scaled,
            width,
            height,
            image::imageops::FilterType::Triangle,
        );
    }

    replace(&mut canvas, &scaled, offset_x as i64, offset_y as i64);
    canvas
}

/// Prepend and append a white square as tall as the line
pub fn pad_square_margins(image: &GrayImage) -> GrayImage {
    let side = image.height();
    let mut canvas = GrayImage::from_pixel(image.width() + 2 * side, side, Luma([255]));
    replace(&mut canvas, image, side as i64, 0);
    canvas
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgb, RgbImage};

    #[test]
    fn test_pad_to_multiple_pads_with_fill() {
        let img = RgbImage::from_pixel(70, 130, Rgb([0, 0, 0]));
        let (padded, pad_x, pad_y) = pad_to_multiple(&img, 64, Rgb([255, 255, 255]));

        assert_eq!(padded.dimensions(), (128, 192));
        assert_eq!((pad_x, pad_y), (58, 62));
        assert_eq!(padded.get_pixel(69, 129), &Rgb([0, 0, 0]));
        assert_eq!(padded.get_pixel(70, 0), &Rgb([255, 255, 255]));
        assert_eq!(padded.get_pixel(0, 130), &Rgb([255, 255, 255]));
    }

    #[test]
    fn test_pad_to_multiple_noop_on_exact_size() {
        let img = GrayImage::new(128, 64);
        let (padded, pad_x, pad_y) = pad_to_multiple(&img, 64, Luma([255]));
        assert_eq!(padded.dimensions(), (128, 64));
        assert_eq!((pad_x, pad_y), (0, 0));
    }

    #[test]
    fn test_fit_to_box_pads_height_for_wide_lines() {
        let img = GrayImage::from_pixel(400, 20, Luma([0]));
        let fitted = fit_to_box(&img, 200, 40);

        assert_eq!(fitted.dimensions(), (200, 40));
        // 400x20 -> 200x10, centred vertically
        assert_eq!(fitted.get_pixel(100, 0).0[0], 255);
        assert_eq!(fitted.get_pixel(100, 20).0[0], 0);
        assert_eq!(fitted.get_pixel(100, 39).0[0], 255);
    }

    #[test]
    fn test_fit_to_box_pads_width_for_short_lines() {
        let img = GrayImage::from_pixel(20, 20, Luma([0]));
        let fitted = fit_to_box(&img, 200, 40);

        assert_eq!(fitted.dimensions(), (200, 40));
        assert_eq!(fitted.get_pixel(0, 20).0[0], 255);
        assert_eq!(fitted.get_pixel(100, 20).0[0], 0);
        assert_eq!(fitted.get_pixel(199, 20).0[0], 255);
    }

    #[test]
    fn test_pad_square_margins_adds_height_on_each_side() {
        let img = GrayImage::from_pixel(50, 10, Luma([0]));
        let padded = pad_square_margins(&img);
        assert_eq!(padded.dimensions(), (70, 10));
        assert_eq!(padded.get_pixel(5, 5).0[0], 255);
        assert_eq!(padded.get_pixel(35, 5).0[0], 0);
        assert_eq!(padded.get_pixel(65, 5).0[0], 255);
    }

    #[test]
    fn test_fit_to_box_keeps_content_exactly_at_box_size() {
        let img = GrayImage::from_pixel(100, 20, Luma([0]));
        let fitted = fit_to_box(&img, 100, 20);
        assert_eq!(fitted, img);
    }
}
