//! Document-wide anchor direction voting.
//!
//! Before per-caption anchoring runs, a cheap preflight scores the V1
//! above/below window of every selected caption and accumulates the totals
//! per kind. A clear winner (beyond the configured margin) pins the scan
//! side for the whole document; otherwise the vote stays `auto` and each
//! caption decides for itself.

use tracing::debug;

use crate::anchor::{v1_side_score, v1_windows, AnchorContext, Side};
use crate::caption::{AttachmentKind, Caption};
use crate::config::{ExtractConfig, GlobalAnchorMode};
use crate::layout::DocumentLayout;
use crate::page::DocumentContent;
use crate::raster::InkMap;

/// Outcome of the vote for one attachment kind.
#[derive(Debug, Clone, Copy)]
pub struct DirectionVote {
    /// `Some(side)` pins the document; `None` means auto.
    pub side: Option<Side>,
    pub above_total: f32,
    pub below_total: f32,
    pub caption_count: usize,
}

impl DirectionVote {
    pub fn auto() -> Self {
        DirectionVote {
            side: None,
            above_total: 0.0,
            below_total: 0.0,
            caption_count: 0,
        }
    }
}

/// Run the vote for `kind` over every selected caption of that kind.
///
/// `ink_maps` is indexed by page. Captions on pages without an ink map (a
/// preview render failed) are skipped; the vote degrades toward `auto`.
pub fn global_direction_vote(
    doc: &DocumentContent,
    ink_maps: &[Option<InkMap>],
    captions: &[Caption],
    kind: AttachmentKind,
    cfg: &ExtractConfig,
    layout: Option<&DocumentLayout>,
) -> DirectionVote {
    if cfg.global_anchor == GlobalAnchorMode::Off {
        return DirectionVote::auto();
    }

    let mut above_total = 0.0;
    let mut below_total = 0.0;
    let mut caption_count = 0usize;

    for caption in captions.iter().filter(|c| c.kind == kind) {
        let Some(page) = doc.pages.get(caption.page) else {
            continue;
        };
        let Some(Some(ink)) = ink_maps.get(caption.page) else {
            continue;
        };

        let caption_rects: Vec<crate::geometry::Rect> = captions
            .iter()
            .filter(|c| c.page == caption.page)
            .map(|c| c.rect)
            .collect();

        let ctx = AnchorContext {
            page,
            ink,
            cfg,
            kind,
            captions_on_page: &caption_rects,
            layout: layout.and_then(|l| l.page(caption.page)),
        };

        let (above, below) = v1_windows(&ctx, &caption.rect);
        if above.height() > 1.0 {
            above_total += v1_side_score(&ctx, &above);
        }
        if below.height() > 1.0 {
            below_total += v1_side_score(&ctx, &below);
        }
        caption_count += 1;
    }

    let margin = cfg.global_anchor_margin(kind.is_table());
    let side = if caption_count == 0 || (above_total + below_total) < 1e-6 {
        None
    } else if below_total > above_total * (1.0 + margin) {
        Some(Side::Below)
    } else if above_total > below_total * (1.0 + margin) {
        Some(Side::Above)
    } else {
        None
    };

    debug!(
        kind = kind.as_str(),
        above = above_total,
        below = below_total,
        captions = caption_count,
        side = side.map(|s| s.as_str()).unwrap_or("auto"),
        "global anchor vote"
    );

    DirectionVote {
        side,
        above_total,
        below_total,
        caption_count,
    }
}

/// Resolve the side restriction for one caption: per-id force wins over the
/// global vote; `None` leaves the decision to the anchor selector.
pub fn resolve_side(
    cfg: &ExtractConfig,
    vote: &DirectionVote,
    ident_text: &str,
    is_table: bool,
) -> (Option<Side>, bool) {
    if let Some(forced) = cfg.forced_side(ident_text, is_table) {
        return (Some(forced), false);
    }
    match vote.side {
        Some(side) => (Some(side), true),
        None => (None, false),
    }
}
