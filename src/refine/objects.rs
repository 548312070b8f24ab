//! Phase B - object connected-component alignment.
//!
//! Collects drawing/image bounds that meaningfully intersect the window,
//! merges them into connected components, and snaps the near edge to the
//! component closest to the caption. Components stacked beside or above the
//! chosen one are folded in so multi-panel figures survive as a unit. When
//! an object sits flush against the far edge, the far edge grows outward in
//! steps to recover a half-cropped body.

use crate::geometry::{merge_rects, Rect};

use super::{PhaseTrace, RefineContext};

/// Minimum surviving window height.
const MIN_HEIGHT: f32 = 40.0;
/// An object within this distance of the far edge counts as flush.
const FLUSH_PT: f32 = 2.0;
/// Far-edge growth quantum and ceiling.
const GROW_STEP_PT: f32 = 60.0;
const GROW_MAX_PT: f32 = 200.0;
/// Overlap share (of the smaller extent) that folds a component into the
/// chosen one.
const UNION_OVERLAP: f32 = 0.6;

/// Apply Phase B to `window` (the Phase A output).
pub fn apply(ctx: &RefineContext, window: Rect) -> (Rect, PhaseTrace) {
    let area = window.area().max(1.0);
    let min_ratio = ctx.cfg.object_min_area_ratio(ctx.kind.is_table());

    let candidates: Vec<Rect> = ctx
        .page
        .object_rects()
        .filter_map(|r| {
            let inter = r.intersect(&window);
            (!inter.is_empty() && inter.area() / area >= min_ratio).then_some(inter)
        })
        .collect();

    if candidates.is_empty() {
        return (
            window,
            PhaseTrace::new("B", window, window, "no objects above area threshold"),
        );
    }

    let components = merge_rects(&candidates, ctx.cfg.object_merge_gap_pt);
    let chosen = match components.iter().min_by(|a, b| {
        let da = component_distance(ctx, a);
        let db = component_distance(ctx, b);
        // Nearest to the caption wins; larger area breaks ties.
        da.partial_cmp(&db)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then(
                b.area()
                    .partial_cmp(&a.area())
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
    }) {
        Some(c) => *c,
        None => return (window, PhaseTrace::new("B", window, window, "no components")),
    };

    // Fold in components aligned with the chosen one on either axis.
    let mut unioned = chosen;
    let mut folded = 0usize;
    for comp in &components {
        if *comp == chosen {
            continue;
        }
        let x_ratio = comp.x_overlap(&chosen) / comp.width().min(chosen.width()).max(1.0);
        let y_ratio = comp.y_overlap(&chosen) / comp.height().min(chosen.height()).max(1.0);
        if x_ratio >= UNION_OVERLAP || y_ratio >= UNION_OVERLAP {
            unioned = unioned.union(comp);
            folded += 1;
        }
    }

    let padded = unioned.expand(ctx.cfg.object_pad_pt);

    let mut result = window;
    if ctx.cfg.refine_near_edge_only {
        // Only the near edge moves; the far edge keeps Phase A's guarantee.
        // The near edge may also move back out toward the caption (a scan
        // window can land inside the object), but never across it.
        let caption_boundary = match ctx.side {
            crate::anchor::Side::Above => ctx.caption_rect.y0 - ctx.cfg.caption_gap_pt,
            crate::anchor::Side::Below => ctx.caption_rect.y1 + ctx.cfg.caption_gap_pt,
        };
        result = match ctx.side {
            crate::anchor::Side::Above => {
                let y1 = padded
                    .y1
                    .min(caption_boundary)
                    .max(window.y0 + MIN_HEIGHT);
                Rect::new(window.x0, window.y0, window.x1, y1)
            }
            crate::anchor::Side::Below => {
                let y0 = padded
                    .y0
                    .max(caption_boundary)
                    .min(window.y1 - MIN_HEIGHT);
                Rect::new(window.x0, y0, window.x1, window.y1)
            }
        };
    } else {
        let clipped = padded.intersect(&window);
        if clipped.height() >= MIN_HEIGHT {
            result = clipped;
        }
    }

    result = grow_far_edge(ctx, result);

    if result.height() < MIN_HEIGHT {
        return (
            window,
            PhaseTrace::new("B", window, window, "object alignment collapsed window; reverted"),
        );
    }

    let note = format!(
        "{} component(s), {} folded{}",
        components.len(),
        folded,
        if result != window { ", near edge aligned" } else { "" }
    );
    (result, PhaseTrace::new("B", window, result, note))
}

/// Distance from a component to the caption along the crop axis.
fn component_distance(ctx: &RefineContext, comp: &Rect) -> f32 {
    match ctx.side {
        crate::anchor::Side::Above => (ctx.caption_rect.y0 - comp.y1).max(0.0),
        crate::anchor::Side::Below => (comp.y0 - ctx.caption_rect.y1).max(0.0),
    }
}

/// Recover a half-cropped body: when an object is flush with the far edge
/// and extends beyond it, step the far edge outward (60 pt at a time, up to
/// 200 pt). Once the stepping covers the object, the edge settles on the
/// object boundary plus `object_pad`; an object too large for the cap gets
/// the full 200 pt.
fn grow_far_edge(ctx: &RefineContext, window: Rect) -> Rect {
    let far = ctx.far_edge(&window);

    let mut needed: f32 = 0.0;
    for obj in ctx.page.object_rects() {
        if obj.intersect(&window).is_empty() {
            continue;
        }
        let (touches, overhang) = match ctx.side {
            // Above-window far edge is the top: objects poking above it.
            crate::anchor::Side::Above => (obj.y0 - far <= FLUSH_PT, far - obj.y0),
            crate::anchor::Side::Below => (far - obj.y1 <= FLUSH_PT, obj.y1 - far),
        };
        if touches && overhang > 0.0 {
            needed = needed.max(overhang);
        }
    }
    if needed <= 0.0 {
        return window;
    }

    let growth = if needed <= GROW_MAX_PT {
        // Covered: settle on the object boundary plus padding, inside the
        // stepped extent.
        let steps = (needed / GROW_STEP_PT).ceil() * GROW_STEP_PT;
        (needed + ctx.cfg.object_pad_pt).min(steps)
    } else {
        GROW_MAX_PT
    };
    let grown = match ctx.side {
        crate::anchor::Side::Above => Rect::new(window.x0, far - growth, window.x1, window.y1),
        crate::anchor::Side::Below => Rect::new(window.x0, window.y0, window.x1, far + growth),
    };
    grown.clamp_to(&ctx.page.rect)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Side;
    use crate::caption::AttachmentKind;
    use crate::config::{ConfigBuilder, ExtractConfig};
    use crate::page::{DrawKind, DrawObject, PageContent};

    struct Fix {
        cfg: ExtractConfig,
        page: PageContent,
        caption: Rect,
    }

    fn fixture(objects: Vec<Rect>) -> Fix {
        let mut page = PageContent::new(0, Rect::new(0.0, 0.0, 612.0, 792.0));
        page.objects = objects
            .into_iter()
            .map(|rect| DrawObject {
                rect,
                kind: DrawKind::VectorPath,
            })
            .collect();
        Fix {
            cfg: ConfigBuilder::default().resolve(None),
            page,
            caption: Rect::new(72.0, 452.0, 400.0, 463.0),
        }
    }

    fn ctx<'a>(f: &'a Fix, side: Side) -> RefineContext<'a> {
        RefineContext {
            page: &f.page,
            cfg: &f.cfg,
            kind: AttachmentKind::Figure,
            caption_rect: f.caption,
            caption_text: "Figure 1: Overview.",
            side,
            line_h: 12.0,
            layout: None,
        }
    }

    #[test]
    fn near_edge_snaps_to_component() {
        // Drawing ends at y=360, window reaches down to 447: the gap between
        // the drawing and the caption is released.
        let f = fixture(vec![Rect::new(72.0, 100.0, 540.0, 360.0)]);
        let c = ctx(&f, Side::Above);
        let window = Rect::new(20.0, 95.0, 592.0, 447.0);
        let (out, trace) = apply(&c, window);
        assert!(trace.applied);
        assert!((out.y1 - 368.0).abs() < 1.0, "y1 = {}", out.y1); // 360 + pad 8
        assert_eq!(out.y0, window.y0);
    }

    #[test]
    fn side_by_side_subfigures_union() {
        let left = Rect::new(72.0, 120.0, 280.0, 440.0);
        let right = Rect::new(300.0, 120.0, 540.0, 440.0);
        let f = fixture(vec![left, right]);
        let c = ctx(&f, Side::Above);
        let window = Rect::new(20.0, 95.0, 592.0, 447.0);
        let (out, trace) = apply(&c, window);
        assert!(trace.note.contains("folded"), "note: {}", trace.note);
        // Both panels survive: near edge must not cut either at 440.
        assert!(out.y1 >= 440.0, "y1 = {}", out.y1);
    }

    #[test]
    fn tiny_specks_are_ignored() {
        let f = fixture(vec![Rect::new(300.0, 430.0, 305.0, 435.0)]);
        let c = ctx(&f, Side::Above);
        let window = Rect::new(20.0, 95.0, 592.0, 447.0);
        let (out, trace) = apply(&c, window);
        assert_eq!(out, window);
        assert!(trace.note.contains("area threshold"));
    }

    #[test]
    fn far_edge_grows_for_flush_object() {
        // Object extends 90 pt above the window's far (top) edge.
        let f = fixture(vec![Rect::new(72.0, 110.0, 540.0, 440.0)]);
        let c = ctx(&f, Side::Above);
        let window = Rect::new(20.0, 200.0, 592.0, 447.0);
        let (out, _) = apply(&c, window);
        // Recovered within the 120 pt stepped extent; the edge settles on
        // the object boundary plus padding: 110 - 8 = 102.
        assert!((out.y0 - 102.0).abs() < 1.0, "y0 = {}", out.y0);
    }

    #[test]
    fn far_edge_growth_capped_at_200() {
        let f = fixture(vec![Rect::new(72.0, 10.0, 540.0, 440.0)]);
        let c = ctx(&f, Side::Above);
        let window = Rect::new(20.0, 300.0, 592.0, 447.0);
        let (out, _) = apply(&c, window);
        assert!(out.y0 >= 100.0 - 1.0, "y0 = {}", out.y0); // 300 - 200 cap
    }

    #[test]
    fn below_side_moves_top_edge() {
        let mut f = fixture(vec![Rect::new(72.0, 200.0, 540.0, 500.0)]);
        f.caption = Rect::new(72.0, 100.0, 400.0, 111.0);
        let c = ctx(&f, Side::Below);
        let window = Rect::new(20.0, 116.0, 592.0, 560.0);
        let (out, _) = apply(&c, window);
        assert!((out.y0 - 192.0).abs() < 1.0, "y0 = {}", out.y0); // 200 - pad 8
        assert_eq!(out.y1, window.y1);
    }

    #[test]
    fn empty_page_is_noop() {
        let f = fixture(Vec::new());
        let c = ctx(&f, Side::Above);
        let window = Rect::new(20.0, 95.0, 592.0, 447.0);
        let (out, trace) = apply(&c, window);
        assert_eq!(out, window);
        assert!(!trace.applied);
    }
}
