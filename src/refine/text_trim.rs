//! Phase A - text trimming.
//!
//! Removes body text from the baseline window in three sweeps along the
//! near→far axis, plus one targeted heuristic:
//!
//! - **A1** near-adjacent: paragraph lines within `adjacent_th` of the near
//!   edge (at most 25% of the baseline height may go here).
//! - **exact-two-line**: a stranded pair of lines hugging the near edge
//!   (the classic "abstract tail + blank" artifact) is trimmed as a unit,
//!   unless the pair is the caption's own wrapped text.
//! - **A2** near-distant: a dense mid-band of paragraphs between
//!   `adjacent_th` and `far_text_th` from the caption.
//! - **A3** far-side: paragraphs (and, with a layout model, section titles)
//!   in the half away from the caption, with a bullet/long-line fallback.
//!
//! Phase A as a whole never removes more than 50% of the baseline height.

use crate::geometry::Rect;
use crate::page::TextLine;

use super::{PhaseTrace, RefineContext};

/// Paragraph width threshold relative to the window.
const PARA_WIDTH_RATIO: f32 = 0.5;
/// Body-text font range considered trimmable.
const FONT_MIN: f32 = 7.0;
const FONT_MAX: f32 = 16.0;
/// A1 may remove at most this share of the baseline height.
const A1_MAX_TRIM: f32 = 0.25;
/// Phase A in total may remove at most this share.
const TOTAL_MAX_TRIM: f32 = 0.50;
/// Minimum surviving window height.
const MIN_HEIGHT: f32 = 40.0;

/// Apply Phase A to `baseline`, returning the trimmed window and its trace.
pub fn apply(ctx: &RefineContext, baseline: Rect) -> (Rect, PhaseTrace) {
    if baseline.height() <= 1.0 || baseline.width() <= 1.0 {
        return (
            baseline,
            PhaseTrace::new("A", baseline, baseline, "degenerate window"),
        );
    }

    let mut notes: Vec<String> = Vec::new();
    let mut win = baseline;

    win = a1_near_adjacent(ctx, baseline, win, &mut notes);
    win = exact_two_line(ctx, baseline, win, &mut notes);
    win = a2_mid_band(ctx, baseline, win, &mut notes);
    win = a3_far_side(ctx, baseline, win, &mut notes);

    win = enforce_total_cap(ctx, baseline, win);
    if win.height() < MIN_HEIGHT {
        return (
            baseline,
            PhaseTrace::new("A", baseline, baseline, "trim collapsed window; reverted"),
        );
    }

    let note = if notes.is_empty() {
        "no trimmable text".to_string()
    } else {
        notes.join("; ")
    };
    (win, PhaseTrace::new("A", baseline, win, note))
}

fn paragraph_shaped(ctx: &RefineContext, line: &TextLine, win: &Rect) -> bool {
    let text = line.text.trim();
    if text.is_empty() {
        return false;
    }
    let inter = line.rect.intersect(win);
    if inter.is_empty() {
        return false;
    }
    let wide = inter.width() / win.width().max(1.0) >= PARA_WIDTH_RATIO;
    let body_font = (FONT_MIN..=FONT_MAX).contains(&line.font_size);
    wide && body_font && !ctx.is_caption_line(&line.rect, 10.0)
}

/// A1: paragraph lines glued to the caption side of the window.
fn a1_near_adjacent(
    ctx: &RefineContext,
    baseline: Rect,
    win: Rect,
    notes: &mut Vec<String>,
) -> Rect {
    let mut farthest: Option<f32> = None;
    let mut count = 0usize;
    for line in &ctx.page.lines {
        if !paragraph_shaped(ctx, line, &win) {
            continue;
        }
        let dist = ctx.caption_distance(&line.rect);
        if dist < 0.0 || dist > ctx.cfg.adjacent_th_pt {
            continue;
        }
        count += 1;
        let edge = past_line_near(ctx, &line.rect);
        farthest = Some(match farthest {
            Some(cur) => further_near(ctx, cur, edge),
            None => edge,
        });
    }

    let Some(target) = farthest else {
        return win;
    };

    let capped = cap_near_move(ctx, baseline, target, A1_MAX_TRIM);
    let out = ctx.with_near_edge(&win, capped);
    if out != win {
        notes.push(format!("A1 trimmed {count} adjacent line(s)"));
    }
    out
}

/// Exact-two-line: a pair of stranded lines within 3.5 line-heights of the
/// near edge whose stacked height matches two text lines.
fn exact_two_line(
    ctx: &RefineContext,
    baseline: Rect,
    win: Rect,
    notes: &mut Vec<String>,
) -> Rect {
    let band = 3.5 * ctx.line_h;
    let strip = match ctx.side {
        crate::anchor::Side::Above => {
            Rect::new(baseline.x0, (baseline.y1 - band).max(baseline.y0), baseline.x1, baseline.y1)
        }
        crate::anchor::Side::Below => {
            Rect::new(baseline.x0, baseline.y0, baseline.x1, (baseline.y0 + band).min(baseline.y1))
        }
    };

    let mut in_strip: Vec<Rect> = ctx
        .page
        .lines
        .iter()
        .filter(|l| {
            !l.text.trim().is_empty()
                && l.rect.intersects(&strip)
                && l.rect.height() < 1.5 * ctx.line_h
        })
        .map(|l| l.rect)
        .collect();
    if in_strip.is_empty() {
        return win;
    }
    in_strip.sort_by(|a, b| a.y0.partial_cmp(&b.y0).unwrap_or(std::cmp::Ordering::Equal));

    // Merge fragments sharing a visual row; tightly stacked lines may also
    // merge here, so the two-line shape is judged by total height below.
    let mut rows: Vec<Rect> = Vec::new();
    for rect in in_strip {
        match rows.last_mut() {
            Some(last) if rect.y0 - last.y1 < 0.8 * ctx.line_h => *last = last.union(&rect),
            _ => rows.push(rect),
        }
    }

    if rows.is_empty() || rows.len() > 3 {
        return win;
    }
    let total_h = rows[rows.len() - 1].y1 - rows[0].y0;
    let expected = 2.0 * ctx.line_h;
    if (total_h - expected).abs() / expected > 0.35 {
        return win;
    }
    if rows.iter().any(|r| ctx.is_caption_line(r, 10.0)) {
        return win;
    }

    let target = match ctx.side {
        crate::anchor::Side::Above => rows[0].y0 - ctx.cfg.text_trim_gap_pt,
        crate::anchor::Side::Below => rows[rows.len() - 1].y1 + ctx.cfg.text_trim_gap_pt,
    };
    let capped = cap_near_move(ctx, baseline, target, TOTAL_MAX_TRIM);
    let out = ctx.with_near_edge(&win, capped);
    if out != win {
        notes.push("exact-two-line unit trimmed".to_string());
    }
    out
}

/// A2: dense paragraph band between `adjacent_th` and `far_text_th` from the
/// caption, still on the near half of the baseline.
fn a2_mid_band(ctx: &RefineContext, baseline: Rect, win: Rect, notes: &mut Vec<String>) -> Rect {
    let near_depth = (0.5 * baseline.height()).max(40.0);
    let near_limit = match ctx.side {
        crate::anchor::Side::Above => baseline.y1 - near_depth,
        crate::anchor::Side::Below => baseline.y0 + near_depth,
    };

    let mut band: Vec<&TextLine> = Vec::new();
    for line in &ctx.page.lines {
        if !paragraph_shaped(ctx, line, &baseline) {
            continue;
        }
        let dist = ctx.caption_distance(&line.rect);
        if dist <= ctx.cfg.adjacent_th_pt || dist > ctx.cfg.far_text_th_pt {
            continue;
        }
        let in_near_half = match ctx.side {
            crate::anchor::Side::Above => line.rect.y0 >= near_limit,
            crate::anchor::Side::Below => line.rect.y1 <= near_limit,
        };
        if in_near_half {
            band.push(line);
        }
    }
    if band.is_empty() {
        return win;
    }

    let para_h: f32 = band.iter().map(|l| l.rect.height()).sum();
    let coverage = para_h / near_depth;
    if coverage < ctx.cfg.far_text_para_min_ratio {
        return win;
    }

    if !ctx.cfg.far_text_trim_aggressive {
        // Conservative: only a contiguous band (inter-line gaps < 20 pt).
        let mut sorted: Vec<Rect> = band.iter().map(|l| l.rect).collect();
        sorted.sort_by(|a, b| a.y0.partial_cmp(&b.y0).unwrap_or(std::cmp::Ordering::Equal));
        let contiguous = sorted.windows(2).all(|w| w[1].y0 - w[0].y1 < 20.0);
        if !contiguous {
            return win;
        }
    }

    let target = band
        .iter()
        .map(|l| past_line_near(ctx, &l.rect))
        .fold(ctx.near_edge(&baseline), |acc, e| further_near(ctx, acc, e));
    // The mid-band sweep may go deeper than A1 but never past 60%.
    let capped = cap_near_move(ctx, baseline, target, 0.60);
    let out = ctx.with_near_edge(&win, capped);
    if out != win {
        notes.push(format!(
            "A2 mid-band coverage {coverage:.2} trimmed {} line(s)",
            band.len()
        ));
    }
    out
}

/// A3: paragraphs on the far half, plus the bullet/long-line fallback and
/// the layout model's section-title veto.
fn a3_far_side(ctx: &RefineContext, baseline: Rect, win: Rect, notes: &mut Vec<String>) -> Rect {
    let mid = baseline.center_y();
    let in_far_half = |r: &Rect| match ctx.side {
        crate::anchor::Side::Above => r.y0 < mid,
        crate::anchor::Side::Below => r.y1 > mid,
    };
    let far_half_h = (0.5 * baseline.height()).max(1.0);

    let mut far_lines: Vec<Rect> = Vec::new();
    for line in &ctx.page.lines {
        if !paragraph_shaped(ctx, line, &baseline) {
            continue;
        }
        if ctx.caption_distance(&line.rect) > ctx.cfg.far_side_min_dist_pt
            && in_far_half(&line.rect)
        {
            far_lines.push(line.rect);
        }
    }

    let coverage: f32 = far_lines.iter().map(Rect::height).sum::<f32>() / far_half_h;
    if coverage >= ctx.cfg.far_side_para_min_ratio {
        let target = far_lines
            .iter()
            .map(|r| past_line_far(ctx, r))
            .fold(ctx.far_edge(&baseline), |acc, e| further_far(ctx, acc, e));
        let out = apply_far_move(ctx, baseline, win, target);
        if out != win {
            notes.push(format!("A3 far-side coverage {coverage:.2} trimmed"));
        }
        return out;
    }

    // Fallback: stray bullets, long lines, anything far enough out.
    let mut fallback: Vec<Rect> = Vec::new();
    for line in &ctx.page.lines {
        let text = line.text.trim();
        if text.is_empty() || ctx.is_caption_line(&line.rect, 10.0) {
            continue;
        }
        let inter = line.rect.intersect(&baseline);
        if inter.is_empty() || !in_far_half(&line.rect) {
            continue;
        }
        if !(FONT_MIN..=FONT_MAX).contains(&line.font_size) {
            continue;
        }
        let dist = ctx.caption_distance(&line.rect);
        let chars = text.chars().count();
        let bullet = text.starts_with('•')
            || text.starts_with('·')
            || text.starts_with('○')
            || text.starts_with("- ")
            || text.starts_with('–');
        let wide_enough = inter.width() / baseline.width().max(1.0) >= 0.10;

        let trim = if bullet || chars > 60 {
            dist > 15.0
        } else if chars > 30 {
            dist > 20.0
        } else {
            wide_enough && dist > 25.0
        };
        if trim {
            fallback.push(line.rect);
        }
    }

    // Section headings flagged by the layout model never belong in a crop.
    if let Some(layout) = ctx.layout {
        for title in &layout.title_blocks {
            if title.intersects(&baseline)
                && in_far_half(title)
                && ctx.caption_distance(title) > 15.0
            {
                fallback.push(*title);
            }
        }
    }

    if fallback.is_empty() {
        return win;
    }
    let target = fallback
        .iter()
        .map(|r| past_line_far(ctx, r))
        .fold(ctx.far_edge(&baseline), |acc, e| further_far(ctx, acc, e));
    let out = apply_far_move(ctx, baseline, win, target);
    if out != win {
        notes.push(format!("A3 fallback trimmed {} line(s)", fallback.len()));
    }
    out
}

// ── edge arithmetic ─────────────────────────────────────────────────────────

/// Near-edge position that excludes `line` (plus the trim gap).
fn past_line_near(ctx: &RefineContext, line: &Rect) -> f32 {
    match ctx.side {
        crate::anchor::Side::Above => line.y0 - ctx.cfg.text_trim_gap_pt,
        crate::anchor::Side::Below => line.y1 + ctx.cfg.text_trim_gap_pt,
    }
}

/// Far-edge position that excludes `line` (plus the trim gap).
fn past_line_far(ctx: &RefineContext, line: &Rect) -> f32 {
    match ctx.side {
        crate::anchor::Side::Above => line.y1 + ctx.cfg.text_trim_gap_pt,
        crate::anchor::Side::Below => line.y0 - ctx.cfg.text_trim_gap_pt,
    }
}

/// The more aggressive of two near-edge candidates.
fn further_near(ctx: &RefineContext, a: f32, b: f32) -> f32 {
    match ctx.side {
        crate::anchor::Side::Above => a.min(b),
        crate::anchor::Side::Below => a.max(b),
    }
}

/// The more aggressive of two far-edge candidates.
fn further_far(ctx: &RefineContext, a: f32, b: f32) -> f32 {
    match ctx.side {
        crate::anchor::Side::Above => a.max(b),
        crate::anchor::Side::Below => a.min(b),
    }
}

/// Clamp a near-edge move to remove at most `max_ratio` of the baseline.
fn cap_near_move(ctx: &RefineContext, baseline: Rect, target: f32, max_ratio: f32) -> f32 {
    let limit = baseline.height() * max_ratio;
    match ctx.side {
        crate::anchor::Side::Above => target.max(baseline.y1 - limit),
        crate::anchor::Side::Below => target.min(baseline.y0 + limit),
    }
}

/// Apply a far-edge move while honoring the total 50% contract.
fn apply_far_move(ctx: &RefineContext, baseline: Rect, win: Rect, target: f32) -> Rect {
    let moved = ctx.with_far_edge(&win, target);
    enforce_total_cap(ctx, baseline, moved)
}

/// Ensure the window retains at least half the baseline height, pulling the
/// far edge back first (the near edge cut text adjacent to the caption and
/// is the more trustworthy move).
fn enforce_total_cap(ctx: &RefineContext, baseline: Rect, win: Rect) -> Rect {
    let min_h = (baseline.height() * (1.0 - TOTAL_MAX_TRIM)).max(MIN_HEIGHT.min(baseline.height()));
    if win.height() >= min_h {
        return win;
    }
    let restored = match ctx.side {
        crate::anchor::Side::Above => Rect::new(win.x0, win.y1 - min_h, win.x1, win.y1),
        crate::anchor::Side::Below => Rect::new(win.x0, win.y0, win.x1, win.y0 + min_h),
    };
    restored.clamp_to(&baseline)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::anchor::Side;
    use crate::caption::AttachmentKind;
    use crate::config::{ConfigBuilder, ExtractConfig};
    use crate::page::{PageContent, TextLine};

    struct Fix {
        cfg: ExtractConfig,
        page: PageContent,
        caption: Rect,
    }

    fn fixture(lines: Vec<TextLine>) -> Fix {
        let mut page = PageContent::new(0, Rect::new(0.0, 0.0, 612.0, 792.0));
        page.lines = lines;
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

    fn para(text: &str, y: f32) -> TextLine {
        TextLine::synthetic(text, Rect::new(30.0, y, 560.0, y + 10.0), 10.0)
    }

    #[test]
    fn a1_trims_adjacent_paragraph_above_caption() {
        // Window above the caption; a body line sits right above the caption
        // (near edge = bottom of window).
        let f = fixture(vec![para(
            "trailing body paragraph line that hugs the caption area",
            436.0,
        )]);
        let c = ctx(&f, Side::Above);
        let baseline = Rect::new(20.0, 100.0, 592.0, 447.0);
        let (out, trace) = apply(&c, baseline);
        assert!(trace.applied);
        assert!(out.y1 <= 436.0, "near edge should exclude the line, y1={}", out.y1);
        assert_eq!(out.y0, baseline.y0);
    }

    #[test]
    fn a1_respects_quarter_cap() {
        // A wall of adjacent paragraphs cannot eat more than 25% at A1; the
        // A2 band may then take over but the total stays within 60%.
        let mut lines = Vec::new();
        for i in 0..10 {
            lines.push(para("adjacent paragraph text line", 440.0 - i as f32 * 12.0));
        }
        let f = fixture(lines);
        let c = ctx(&f, Side::Above);
        let baseline = Rect::new(20.0, 100.0, 592.0, 447.0);
        let (out, _) = apply(&c, baseline);
        assert!(out.height() >= baseline.height() * 0.40 - 1.0);
    }

    #[test]
    fn wrapped_caption_is_never_trimmed() {
        // Second line of the caption itself sits just below the window for a
        // below-side table; nothing should be trimmed.
        let mut f = fixture(vec![para(
            "Figure 1: Overview continued caption text wrapping on",
            466.0,
        )]);
        f.caption = Rect::new(72.0, 452.0, 400.0, 463.0);
        let c = ctx(&f, Side::Below);
        let baseline = Rect::new(20.0, 468.0, 592.0, 760.0);
        let (out, _trace) = apply(&c, baseline);
        assert_eq!(out, baseline);
    }

    #[test]
    fn exact_two_line_trims_abstract_tail() {
        // Two short stranded lines at the far-from-figure near edge.
        let f = fixture(vec![
            para("last abstract line one ends here", 100.0),
            para("and line two wraps up", 112.0),
        ]);
        let mut c = ctx(&f, Side::Below);
        c.caption_rect = Rect::new(72.0, 80.0, 400.0, 91.0);
        let baseline = Rect::new(20.0, 96.0, 592.0, 440.0);
        let (out, trace) = apply(&c, baseline);
        assert!(trace.applied, "trace: {}", trace.note);
        assert!(out.y0 >= 120.0, "tail not trimmed, y0={}", out.y0);
    }

    #[test]
    fn a2_trims_dense_mid_band() {
        // Paragraphs 40..140 pt below the caption (beyond adjacent_th=24),
        // figure content further down.
        let mut lines = Vec::new();
        for i in 0..10 {
            lines.push(para(
                "mid band body paragraph line with plenty of words",
                120.0 + i as f32 * 13.0,
            ));
        }
        let mut f = fixture(lines);
        f.caption = Rect::new(72.0, 60.0, 400.0, 71.0);
        let c = ctx(&f, Side::Below);
        let baseline = Rect::new(20.0, 76.0, 592.0, 600.0);
        let (out, trace) = apply(&c, baseline);
        assert!(trace.note.contains("A2"), "note: {}", trace.note);
        assert!(out.y0 > 220.0, "mid band kept, y0={}", out.y0);
    }

    #[test]
    fn a3_trims_far_side_paragraphs() {
        // Above-side window; body paragraphs occupy the far (top) half.
        let mut lines = Vec::new();
        for i in 0..8 {
            lines.push(para(
                "far side body paragraph occupying the top of the window",
                105.0 + i as f32 * 13.0,
            ));
        }
        let f = fixture(lines);
        let c = ctx(&f, Side::Above);
        let baseline = Rect::new(20.0, 100.0, 592.0, 447.0);
        let (out, trace) = apply(&c, baseline);
        assert!(trace.note.contains("A3"), "note: {}", trace.note);
        assert!(out.y0 > 200.0, "far paragraphs kept, y0={}", out.y0);
        // Total contract: at least half the baseline survives.
        assert!(out.height() >= 0.5 * baseline.height() - 1.0);
    }

    #[test]
    fn a3_fallback_removes_bullets() {
        let bullet = TextLine::synthetic(
            "• stray bullet item",
            Rect::new(80.0, 120.0, 260.0, 130.0),
            10.0,
        );
        let f = fixture(vec![bullet]);
        let c = ctx(&f, Side::Above);
        let baseline = Rect::new(20.0, 100.0, 592.0, 447.0);
        let (out, trace) = apply(&c, baseline);
        assert!(trace.note.contains("fallback"), "note: {}", trace.note);
        assert!(out.y0 >= 130.0);
    }

    #[test]
    fn clean_window_is_untouched() {
        let f = fixture(Vec::new());
        let c = ctx(&f, Side::Above);
        let baseline = Rect::new(20.0, 100.0, 592.0, 447.0);
        let (out, trace) = apply(&c, baseline);
        assert_eq!(out, baseline);
        assert!(!trace.applied);
    }
}
