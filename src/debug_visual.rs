//! Stage-overlay debug renderer.
//!
//! With `--debug-visual`, each processed attachment gets a 96 dpi render of
//! its page with the pipeline's windows stroked on top: baseline, Phase A,
//! Phase B, Phase D, the final crop and the caption line. A `legend.txt`
//! mapping colors to stages is written once per run.

use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};
use tracing::warn;

use crate::error::Result;
use crate::geometry::Rect;
use crate::raster::PageRaster;

const OVERLAY_DPI: f32 = 96.0;
const STROKE_PX: u32 = 2;

/// One stroked window.
#[derive(Debug, Clone, Copy)]
pub struct StageRect {
    pub label: &'static str,
    pub rect: Rect,
    pub color: [u8; 3],
}

pub const BASELINE_COLOR: [u8; 3] = [66, 135, 245];
pub const PHASE_A_COLOR: [u8; 3] = [255, 165, 0];
pub const PHASE_B_COLOR: [u8; 3] = [148, 0, 211];
pub const PHASE_D_COLOR: [u8; 3] = [0, 160, 80];
pub const FINAL_COLOR: [u8; 3] = [220, 30, 30];
pub const CAPTION_COLOR: [u8; 3] = [120, 120, 120];

/// Render the overlay and return its path relative to the output directory.
/// Failures are reported and swallowed - debug output never fails a run.
pub fn save_overlay(
    raster: &dyn PageRaster,
    page_index: usize,
    page_rect: Rect,
    stages: &[StageRect],
    out_dir: &Path,
    kind: &str,
    ident: &str,
) -> Option<String> {
    match render_overlay(raster, page_index, page_rect, stages) {
        Ok(img) => {
            let debug_dir = out_dir.join("debug");
            if let Err(e) = fs::create_dir_all(&debug_dir) {
                warn!(error = %e, "cannot create debug directory");
                return None;
            }
            write_legend(&debug_dir, stages);
            let name = format!("page{}_{}_{}.png", page_index + 1, kind, ident);
            let path = debug_dir.join(&name);
            if let Err(e) = img.save(&path) {
                warn!(path = %path.display(), error = %e, "debug overlay save failed");
                return None;
            }
            Some(format!("debug/{name}"))
        }
        Err(e) => {
            warn!(page = page_index + 1, error = %e, "debug overlay render failed");
            None
        }
    }
}

fn render_overlay(
    raster: &dyn PageRaster,
    page_index: usize,
    page_rect: Rect,
    stages: &[StageRect],
) -> Result<RgbImage> {
    let mut img = raster.render_color(page_index, page_rect, OVERLAY_DPI)?;
    let scale = OVERLAY_DPI / 72.0;
    for stage in stages {
        stroke_rect(&mut img, &stage.rect, page_rect, scale, stage.color);
    }
    Ok(img)
}

fn stroke_rect(img: &mut RgbImage, rect: &Rect, page_rect: Rect, scale: f32, color: [u8; 3]) {
    let (w, h) = (img.width(), img.height());
    let x0 = (((rect.x0 - page_rect.x0) * scale) as u32).min(w.saturating_sub(1));
    let y0 = (((rect.y0 - page_rect.y0) * scale) as u32).min(h.saturating_sub(1));
    let x1 = (((rect.x1 - page_rect.x0) * scale) as u32).min(w.saturating_sub(1));
    let y1 = (((rect.y1 - page_rect.y0) * scale) as u32).min(h.saturating_sub(1));
    if x1 <= x0 || y1 <= y0 {
        return;
    }
    let px = Rgb(color);

    for x in x0..=x1 {
        for t in 0..STROKE_PX {
            let top = (y0 + t).min(h - 1);
            let bottom = y1.saturating_sub(t);
            img.put_pixel(x, top, px);
            img.put_pixel(x, bottom, px);
        }
    }
    for y in y0..=y1 {
        for t in 0..STROKE_PX {
            let left = (x0 + t).min(w - 1);
            let right = x1.saturating_sub(t);
            img.put_pixel(left, y, px);
            img.put_pixel(right, y, px);
        }
    }
}

/// Write the color legend once; later calls are no-ops.
fn write_legend(debug_dir: &Path, stages: &[StageRect]) {
    let path = debug_dir.join("legend.txt");
    if path.exists() {
        return;
    }
    let mut body = String::from("stage overlay colors (RGB)\n");
    for stage in stages {
        body.push_str(&format!(
            "{:<10} #{:02x}{:02x}{:02x}\n",
            stage.label, stage.color[0], stage.color[1], stage.color[2]
        ));
    }
    if let Err(e) = fs::write(&path, body) {
        warn!(error = %e, "legend write failed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use image::{GrayImage, Luma};
    use tempfile::tempdir;

    struct Blank;

    impl PageRaster for Blank {
        fn render_gray(&self, _page: usize, clip: Rect, dpi: f32) -> Result<GrayImage> {
            let scale = dpi / 72.0;
            Ok(GrayImage::from_pixel(
                (clip.width() * scale) as u32,
                (clip.height() * scale) as u32,
                Luma([255u8]),
            ))
        }
    }

    #[test]
    fn overlay_writes_png_and_legend() {
        let dir = tempdir().unwrap();
        let page_rect = Rect::new(0.0, 0.0, 612.0, 792.0);
        let stages = [
            StageRect {
                label: "baseline",
                rect: Rect::new(20.0, 100.0, 592.0, 440.0),
                color: BASELINE_COLOR,
            },
            StageRect {
                label: "final",
                rect: Rect::new(40.0, 120.0, 560.0, 420.0),
                color: FINAL_COLOR,
            },
        ];
        let rel =
            save_overlay(&Blank, 0, page_rect, &stages, dir.path(), "figure", "1").unwrap();
        assert_eq!(rel, "debug/page1_figure_1.png");
        assert!(dir.path().join(&rel).exists());
        let legend = std::fs::read_to_string(dir.path().join("debug/legend.txt")).unwrap();
        assert!(legend.contains("baseline"));
        assert!(legend.contains("final"));
    }

    #[test]
    fn overlay_pixels_are_stroked() {
        let dir = tempdir().unwrap();
        let page_rect = Rect::new(0.0, 0.0, 300.0, 300.0);
        let stages = [StageRect {
            label: "baseline",
            rect: Rect::new(30.0, 30.0, 270.0, 270.0),
            color: BASELINE_COLOR,
        }];
        let rel =
            save_overlay(&Blank, 0, page_rect, &stages, dir.path(), "figure", "2").unwrap();
        let img = image::open(dir.path().join(rel)).unwrap().to_rgb8();
        let scale = 96.0 / 72.0;
        let x = (30.0 * scale) as u32;
        let y = (150.0 * scale) as u32;
        assert_eq!(img.get_pixel(x, y).0, BASELINE_COLOR);
    }
}
