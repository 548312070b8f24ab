//! Phase D - whitespace autocrop with text masking.
//!
//! The only pixel-aware phase. The current window is rendered at the output
//! DPI; for figures, paragraph-shaped lines on the near 60% of the window
//! are masked to white so leftover body text cannot anchor the content
//! bbox. The tight non-white bbox (plus padding) becomes the new window,
//! under four protections: the far edge may shrink only a few pixels, body
//! text detected near the pre-crop far edge bounds the crop (the far edge
//! never extends past it), remaining paragraph lines hugging the far edge
//! are swept off afterwards, and an over-aggressive crop grows its near
//! edge back toward the caption.

use image::GrayImage;

use crate::geometry::Rect;
use crate::raster::PageRaster;

use super::{PhaseTrace, RefineContext};

/// Near fraction of the window whose paragraph lines are masked (figures).
const MASK_NEAR_FRAC: f32 = 0.6;
/// Mask only body-sized text.
const MASK_FONT_MAX: f32 = 14.0;
const MASK_WIDTH_RATIO: f32 = 0.5;
/// Post-autocrop far sweep: paragraph evidence thresholds.
const SWEEP_MIN_WIDTH_RATIO: f32 = 0.30;
const SWEEP_MIN_CHARS: usize = 15;
const SWEEP_LINES: f32 = 3.0;
/// Far-side text evidence: body text within this zone of the pre-crop
/// window's far edge caps how far the crop may reach.
const EVIDENCE_ZONE_PT: f32 = 40.0;
const EVIDENCE_MIN_WIDTH_RATIO: f32 = 0.30;
const EVIDENCE_MIN_CHARS: usize = 10;

/// Apply Phase D to `window`. A failed render keeps the pre-D window (the
/// caller records the warning); geometry failures never panic.
pub fn apply(ctx: &RefineContext, raster: &dyn PageRaster, window: Rect) -> (Rect, PhaseTrace) {
    if window.height() <= 1.0 || window.width() <= 1.0 {
        return (
            window,
            PhaseTrace::new("D", window, window, "degenerate window"),
        );
    }

    let dpi = ctx.cfg.dpi as f32;
    let scale = dpi / 72.0;

    let img = match raster.render_gray(ctx.page.index, window, dpi) {
        Ok(img) if img.width() > 0 && img.height() > 0 => img,
        Ok(_) => {
            return (
                window,
                PhaseTrace::new("D", window, window, "empty render; kept pre-D window"),
            )
        }
        Err(err) => {
            return (
                window,
                PhaseTrace::new("D", window, window, format!("render failed: {err}; kept pre-D window")),
            )
        }
    };

    let masks = if ctx.kind.is_table() {
        Vec::new()
    } else {
        text_masks_px(ctx, &window, scale)
    };

    let Some((l, t, r, b)) = content_bbox_px(
        &img,
        ctx.cfg.autocrop_white_th,
        ctx.cfg.autocrop_pad_px,
        &masks,
    ) else {
        return (
            window,
            PhaseTrace::new("D", window, window, "window is blank; kept pre-D window"),
        );
    };

    let mut cropped = Rect::new(
        window.x0 + l as f32 / scale,
        window.y0 + t as f32 / scale,
        window.x0 + r as f32 / scale,
        window.y0 + b as f32 / scale,
    )
    .clamp_to(&window);
    let mut notes: Vec<String> = vec![format!(
        "content bbox {}x{} px",
        r.saturating_sub(l),
        b.saturating_sub(t)
    )];

    // Far-edge guard: the edge away from the caption barely moves.
    let max_far_shrink = ctx.cfg.protect_far_edge_px as f32 / scale;
    match ctx.side {
        crate::anchor::Side::Above => {
            if cropped.y0 - window.y0 > max_far_shrink {
                cropped = Rect::new(cropped.x0, window.y0 + max_far_shrink, cropped.x1, cropped.y1);
                notes.push("far-edge guard".to_string());
            }
        }
        crate::anchor::Side::Below => {
            if window.y1 - cropped.y1 > max_far_shrink {
                cropped = Rect::new(cropped.x0, cropped.y0, cropped.x1, window.y1 - max_far_shrink);
                notes.push("far-edge guard".to_string());
            }
        }
    }

    // Monotonicity: body text detected near the pre-crop window's far edge
    // bounds the crop. Phase B may have grown the window into an adjacent
    // paragraph, and the masks only cover the near side, so the raw bbox
    // can bake that paragraph in; the far edge never extends past it.
    if let Some(far_limit) = far_text_evidence_limit(ctx, &window) {
        let limited = match ctx.side {
            crate::anchor::Side::Above if cropped.y0 < far_limit => Some(Rect::new(
                cropped.x0,
                far_limit.min(cropped.y1),
                cropped.x1,
                cropped.y1,
            )),
            crate::anchor::Side::Below if cropped.y1 > far_limit => Some(Rect::new(
                cropped.x0,
                cropped.y0,
                cropped.x1,
                far_limit.max(cropped.y0),
            )),
            _ => None,
        };
        if let Some(rect) = limited {
            cropped = rect;
            notes.push("far text evidence limit".to_string());
        }
    }

    // Post-autocrop sweep: paragraph lines hugging the far edge go, but the
    // edge never crosses the window midpoint.
    if let Some(swept) = far_text_sweep(ctx, &cropped) {
        cropped = swept;
        notes.push("far text sweep".to_string());
    }

    // Shrink limit: an over-aggressive crop grows its near edge back.
    let min_area = window.area() * (1.0 - ctx.cfg.autocrop_shrink_limit);
    let min_height_pt = ctx.cfg.autocrop_min_height_px as f32 / scale;
    if cropped.area() < min_area || cropped.height() < min_height_pt {
        let pad_pt = ctx.cfg.near_edge_pad_px as f32 / scale;
        let caption_boundary = match ctx.side {
            crate::anchor::Side::Above => ctx.caption_rect.y0 - ctx.cfg.caption_gap_pt,
            crate::anchor::Side::Below => ctx.caption_rect.y1 + ctx.cfg.caption_gap_pt,
        };
        cropped = match ctx.side {
            crate::anchor::Side::Above => {
                let y1 = (cropped.y1 + pad_pt).min(window.y1).min(caption_boundary);
                Rect::new(cropped.x0, cropped.y0, cropped.x1, y1.max(cropped.y1))
            }
            crate::anchor::Side::Below => {
                let y0 = (cropped.y0 - pad_pt).max(window.y0).max(caption_boundary);
                Rect::new(cropped.x0, y0.min(cropped.y0), cropped.x1, cropped.y1)
            }
        };
        notes.push("shrink limit; near edge padded back".to_string());
    }

    (cropped, PhaseTrace::new("D", window, cropped, notes.join("; ")))
}

/// Pixel-space masks for paragraph-shaped lines on the near side.
fn text_masks_px(ctx: &RefineContext, window: &Rect, scale: f32) -> Vec<(u32, u32, u32, u32)> {
    let near_band = match ctx.side {
        // Near side of an above-window is its bottom 60%.
        crate::anchor::Side::Above => Rect::new(
            window.x0,
            window.y1 - MASK_NEAR_FRAC * window.height(),
            window.x1,
            window.y1,
        ),
        crate::anchor::Side::Below => Rect::new(
            window.x0,
            window.y0,
            window.x1,
            window.y0 + MASK_NEAR_FRAC * window.height(),
        ),
    };

    let mut masks = Vec::new();
    for line in &ctx.page.lines {
        if line.text.trim().is_empty() || line.font_size > MASK_FONT_MAX {
            continue;
        }
        let inter = line.rect.intersect(window);
        if inter.is_empty() || !inter.intersects(&near_band) {
            continue;
        }
        if inter.width() / window.width().max(1.0) < MASK_WIDTH_RATIO {
            continue;
        }
        let l = ((inter.x0 - window.x0) * scale).max(0.0) as u32;
        let t = ((inter.y0 - window.y0) * scale).max(0.0) as u32;
        let r = ((inter.x1 - window.x0) * scale).max(0.0) as u32;
        let b = ((inter.y1 - window.y0) * scale).max(0.0) as u32;
        if r > l + 1 && b > t + 1 {
            masks.push((l, t, r, b));
        }
    }
    masks
}

/// Tight bbox of non-white, non-masked pixels, padded and clamped. `None`
/// when the window is entirely blank.
fn content_bbox_px(
    img: &GrayImage,
    white_th: u8,
    pad: u32,
    masks: &[(u32, u32, u32, u32)],
) -> Option<(u32, u32, u32, u32)> {
    let (w, h) = (img.width(), img.height());
    let masked = |x: u32, y: u32| {
        masks
            .iter()
            .any(|&(l, t, r, b)| x >= l && x < r && y >= t && y < b)
    };
    let inked = |x: u32, y: u32| img.get_pixel(x, y).0[0] < white_th && !masked(x, y);

    let mut top = None;
    let mut bottom = None;
    for y in 0..h {
        if (0..w).any(|x| inked(x, y)) {
            top.get_or_insert(y);
            bottom = Some(y);
        }
    }
    let (top, bottom) = (top?, bottom?);

    let mut left = None;
    let mut right = None;
    for x in 0..w {
        if (top..=bottom).any(|y| inked(x, y)) {
            left.get_or_insert(x);
            right = Some(x);
        }
    }
    let (left, right) = (left?, right?);

    Some((
        left.saturating_sub(pad),
        top.saturating_sub(pad),
        (right + 1 + pad).min(w),
        (bottom + 1 + pad).min(h),
    ))
}

/// Scan the fixed zone at the pre-crop window's far edge for body-text
/// evidence (wide, body-sized lines with real content). Returns the far
/// limit the crop must not extend past, or `None` without evidence.
fn far_text_evidence_limit(ctx: &RefineContext, window: &Rect) -> Option<f32> {
    let mut limit: Option<f32> = None;
    for line in &ctx.page.lines {
        let text = line.text.trim();
        if text.chars().count() < EVIDENCE_MIN_CHARS {
            continue;
        }
        if !(7.0..=16.0).contains(&line.font_size) {
            continue;
        }
        let inter = line.rect.intersect(window);
        if inter.is_empty()
            || inter.width() / window.width().max(1.0) < EVIDENCE_MIN_WIDTH_RATIO
        {
            continue;
        }
        match ctx.side {
            crate::anchor::Side::Above => {
                // Far edge is the top; evidence pushes the limit down.
                if line.rect.y0 - window.y0 < EVIDENCE_ZONE_PT {
                    let y = line.rect.y1 + ctx.cfg.text_trim_gap_pt;
                    limit = Some(limit.map_or(y, |l: f32| l.max(y)));
                }
            }
            crate::anchor::Side::Below => {
                if window.y1 - line.rect.y1 < EVIDENCE_ZONE_PT {
                    let y = line.rect.y0 - ctx.cfg.text_trim_gap_pt;
                    limit = Some(limit.map_or(y, |l: f32| l.min(y)));
                }
            }
        }
    }
    limit
}

/// Paragraph lines within three line-heights of the far edge pull the far
/// edge inward (never past the midpoint). Returns `None` when nothing moves.
fn far_text_sweep(ctx: &RefineContext, window: &Rect) -> Option<Rect> {
    let scan = SWEEP_LINES * ctx.line_h;
    let mid = window.center_y();

    let mut target: Option<f32> = None;
    for line in &ctx.page.lines {
        let text = line.text.trim();
        if text.chars().count() < SWEEP_MIN_CHARS {
            continue;
        }
        if !(7.0..=16.0).contains(&line.font_size) {
            continue;
        }
        let inter = line.rect.intersect(window);
        if inter.is_empty() || inter.width() / window.width().max(1.0) < SWEEP_MIN_WIDTH_RATIO {
            continue;
        }
        match ctx.side {
            crate::anchor::Side::Above => {
                // Far edge is the top.
                if line.rect.y0 - window.y0 < scan {
                    let y = line.rect.y1 + ctx.cfg.text_trim_gap_pt;
                    if y < mid {
                        target = Some(target.map_or(y, |t: f32| t.max(y)));
                    }
                }
            }
            crate::anchor::Side::Below => {
                if window.y1 - line.rect.y1 < scan {
                    let y = line.rect.y0 - ctx.cfg.text_trim_gap_pt;
                    if y > mid {
                        target = Some(target.map_or(y, |t: f32| t.min(y)));
                    }
                }
            }
        }
    }

    target.map(|y| match ctx.side {
        crate::anchor::Side::Above => Rect::new(window.x0, y, window.x1, window.y1),
        crate::anchor::Side::Below => Rect::new(window.x0, window.y0, window.x1, y),
    })
}
