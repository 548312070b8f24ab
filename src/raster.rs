//! Raster access and ink-density queries.
//!
//! Only two stages look at pixels: anchor/direction scoring (ink density of
//! candidate windows) and Phase D (whitespace autocrop). Both go through
//! [`PageRaster`], so tests can substitute a synthetic painter for pdfium.
//!
//! Anchor scoring may probe hundreds of windows per page; rendering each
//! would dominate the run. [`InkMap`] renders the page once at preview
//! resolution and answers per-window ink ratios from an integral image in
//! O(1).

use image::GrayImage;

use crate::error::{ExtractError, Result};
use crate::geometry::Rect;

/// Resolution used for ink-density previews (1 px per pt).
pub const PREVIEW_DPI: f32 = 72.0;

/// Renders page regions at a caller-chosen resolution.
pub trait PageRaster {
    /// Render `clip` (page coordinates, points, top-left origin) of page
    /// `page` at `dpi` as grayscale. The image spans exactly the clip.
    fn render_gray(&self, page: usize, clip: Rect, dpi: f32) -> Result<GrayImage>;

    /// Color render used for the final PNGs and debug overlays. The default
    /// upgrades the grayscale render; the pdfium backend overrides it.
    fn render_color(&self, page: usize, clip: Rect, dpi: f32) -> Result<image::RgbImage> {
        Ok(image::DynamicImage::ImageLuma8(self.render_gray(page, clip, dpi)?).to_rgb8())
    }
}

/// Fraction of non-white pixels in an image.
pub fn ink_ratio(img: &GrayImage, white_th: u8) -> f32 {
    let total = (img.width() * img.height()) as f32;
    if total == 0.0 {
        return 0.0;
    }
    let inked = img.pixels().filter(|p| p.0[0] < white_th).count() as f32;
    inked / total
}

/// Integral image of thresholded ink over one full page preview.
#[derive(Clone)]
pub struct InkMap {
    /// (w+1) x (h+1) summed-area table of inked pixels.
    integral: Vec<u32>,
    width: usize,
    height: usize,
    /// Pixels per point.
    scale: f32,
}

impl InkMap {
    /// An ink map that reports zero everywhere; stands in when the preview
    /// render of a page failed.
    pub fn empty(page_rect: Rect) -> Self {
        let img = GrayImage::from_pixel(1, 1, image::Luma([255u8]));
        Self::build(&img, 250, page_rect)
    }

    /// Build from a full-page preview render. `page_rect` is the page bounds
    /// in points; the image must cover it entirely.
    pub fn build(img: &GrayImage, white_th: u8, page_rect: Rect) -> Self {
        let width = img.width() as usize;
        let height = img.height() as usize;
        let scale = width as f32 / page_rect.width().max(1.0);

        let mut integral = vec![0u32; (width + 1) * (height + 1)];
        for y in 0..height {
            let mut row_sum = 0u32;
            for x in 0..width {
                if img.get_pixel(x as u32, y as u32).0[0] < white_th {
                    row_sum += 1;
                }
                integral[(y + 1) * (width + 1) + (x + 1)] =
                    integral[y * (width + 1) + (x + 1)] + row_sum;
            }
        }

        InkMap {
            integral,
            width,
            height,
            scale,
        }
    }

    /// Ink ratio over `clip` in page points. Degenerate clips report 0.
    pub fn ink_ratio(&self, clip: &Rect) -> f32 {
        let x0 = ((clip.x0 * self.scale) as usize).min(self.width);
        let y0 = ((clip.y0 * self.scale) as usize).min(self.height);
        let x1 = ((clip.x1 * self.scale).ceil() as usize).min(self.width);
        let y1 = ((clip.y1 * self.scale).ceil() as usize).min(self.height);
        if x0 >= x1 || y0 >= y1 {
            return 0.0;
        }

        let w = self.width + 1;
        let sum = self.integral[y1 * w + x1] + self.integral[y0 * w + x0]
            - self.integral[y0 * w + x1]
            - self.integral[y1 * w + x0];
        sum as f32 / ((x1 - x0) * (y1 - y0)) as f32
    }
}

/// Build an [`InkMap`] for one page via its raster source.
pub fn ink_map_for_page(
    raster: &dyn PageRaster,
    page: usize,
    page_rect: Rect,
    white_th: u8,
) -> Result<InkMap> {
    let img = raster.render_gray(page, page_rect, PREVIEW_DPI)?;
    if img.width() == 0 || img.height() == 0 {
        return Err(ExtractError::render(page + 1, "empty preview render"));
    }
    Ok(InkMap::build(&img, white_th, page_rect))
}
