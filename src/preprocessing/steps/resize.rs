use image::{imageops::FilterType, ImageBuffer, Pixel};

/// Maximum length of a page's longer side fed to the segmenter
pub const MAX_PAGE_SIDE: u32 = 4096;

/// Resize a page to a size the segmentation model handles well
/// Clamps very large pages and scales up pages narrower than one tile
pub fn fit_page<P>(image: &ImageBuffer<P, Vec<P::Subpixel>>, min_side: u32) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    let (width, height) = image.dimensions();
    let (new_width, new_height) = target_dimensions(width, height, min_side);

    if (new_width, new_height) == (width, height) {
        return image.clone();
    }

    image::imageops::resize(image, new_width, new_height, FilterType::Triangle)
}

/// Scale an image so its width equals `target_width`
pub fn to_width<P>(image: &ImageBuffer<P, Vec<P::Subpixel>>, target_width: u32) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    let (width, height) = image.dimensions();
    let ratio = target_width as f64 / width as f64;
    let new_height = ((height as f64 * ratio) as u32).max(1);
    image::imageops::resize(image, target_width, new_height, FilterType::Triangle)
}

/// Scale an image so its height equals `target_height`
pub fn to_height<P>(image: &ImageBuffer<P, Vec<P::Subpixel>>, target_height: u32) -> ImageBuffer<P, Vec<P::Subpixel>>
where
    P: Pixel + 'static,
{
    let (width, height) = image.dimensions();
    let ratio = target_height as f64 / height as f64;
    let new_width = ((width as f64 * ratio) as u32).max(1);
    image::imageops::resize(image, new_width, target_height, FilterType::Triangle)
}

fn target_dimensions(width: u32, height: u32, min_side: u32) -> (u32, u32) {
    let longer = width.max(height) as f64;
    let shorter = width.min(height) as f64;

    let mut scale = 1.0_f64;
    if longer > MAX_PAGE_SIDE as f64 {
        scale = MAX_PAGE_SIDE as f64 / longer;
    }
    if shorter * scale < min_side as f64 {
        scale = min_side as f64 / shorter;
    }

    if scale == 1.0 {
        return (width, height);
    }

    let new_width = ((width as f64 * scale).round() as u32).max(1);
    let new_height = ((height as f64 * scale).round() as u32).max(1);
    (new_width, new_height)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::GrayImage;

    #[test]
    fn test_fit_page_upscales_short_side() {
        let img = GrayImage::new(800, 100);
        let result = fit_page(&img, 256);
        assert_eq!(result.height(), 256);
        assert_eq!(result.width(), 2048);
    }

    #[test]
    fn test_fit_page_limits_large_image() {
        let img = GrayImage::new(5000, 3000);
        let result = fit_page(&img, 512);
        assert_eq!(result.width(), MAX_PAGE_SIDE);
        assert!(result.height() <= MAX_PAGE_SIDE);
    }

    #[test]
    fn test_fit_page_keeps_suitable_image() {
        let img = GrayImage::new(1200, 900);
        let result = fit_page(&img, 512);
        assert_eq!(result.dimensions(), (1200, 900));
    }

    #[test]
    fn test_to_width_preserves_aspect() {
        let img = GrayImage::new(400, 100);
        let result = to_width(&img, 200);
        assert_eq!(result.dimensions(), (200, 50));
    }
}
