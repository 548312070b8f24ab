//! Crop refinement pipeline.
//!
//! Each phase is a pure function `(Rect, &RefineContext) -> (Rect, PhaseTrace)`
//! composed left to right: A (text trim) → B (object alignment) → D
//! (whitespace autocrop). The acceptance gate then chooses between the fully
//! refined window, the A-only window, and the untouched baseline - a bad
//! refinement never silently overwrites a safe crop.

pub mod autocrop;
pub mod gate;
pub mod objects;
pub mod text_trim;

use serde::Serialize;

use crate::anchor::Side;
use crate::caption::AttachmentKind;
use crate::config::ExtractConfig;
use crate::geometry::Rect;
use crate::layout::PageLayout;
use crate::page::PageContent;

/// Immutable inputs shared by every refinement phase for one attachment.
pub struct RefineContext<'a> {
    pub page: &'a PageContent,
    pub cfg: &'a ExtractConfig,
    pub kind: AttachmentKind,
    pub caption_rect: Rect,
    pub caption_text: &'a str,
    pub side: Side,
    /// Typical document line height (probe output).
    pub line_h: f32,
    pub layout: Option<&'a PageLayout>,
}

impl<'a> RefineContext<'a> {
    /// Distance of a line from the caption along the crop axis; negative
    /// values mean the line sits on the caption's other side.
    pub fn caption_distance(&self, line: &Rect) -> f32 {
        match self.side {
            Side::Above => self.caption_rect.y0 - line.y1,
            Side::Below => line.y0 - self.caption_rect.y1,
        }
    }

    /// Move the near edge (the one touching the caption gap) away from the
    /// caption so it lands at `y`, respecting direction.
    pub fn with_near_edge(&self, win: &Rect, y: f32) -> Rect {
        match self.side {
            // Near edge of an above-window is its bottom.
            Side::Above => Rect::new(win.x0, win.y0, win.x1, y.min(win.y1).max(win.y0)),
            Side::Below => Rect::new(win.x0, y.max(win.y0).min(win.y1), win.x1, win.y1),
        }
    }

    /// Move the far edge (opposite the caption) so it lands at `y`.
    pub fn with_far_edge(&self, win: &Rect, y: f32) -> Rect {
        match self.side {
            Side::Above => Rect::new(win.x0, y.max(win.y0).min(win.y1), win.x1, win.y1),
            Side::Below => Rect::new(win.x0, win.y0, win.x1, y.min(win.y1).max(win.y0)),
        }
    }

    pub fn near_edge(&self, win: &Rect) -> f32 {
        match self.side {
            Side::Above => win.y1,
            Side::Below => win.y0,
        }
    }

    pub fn far_edge(&self, win: &Rect) -> f32 {
        match self.side {
            Side::Above => win.y0,
            Side::Below => win.y1,
        }
    }

    /// True when `line` belongs to the caption itself (overlaps it or sits
    /// within `tol` points with horizontal overlap). Protects multi-line
    /// captions from being trimmed as adjacent text.
    pub fn is_caption_line(&self, line: &Rect, tol: f32) -> bool {
        if line.intersects(&self.caption_rect) {
            return true;
        }
        let v_dist = (line.y0 - self.caption_rect.y1)
            .abs()
            .min((self.caption_rect.y0 - line.y1).abs());
        v_dist < tol && line.x_overlap(&self.caption_rect) > 0.0
    }
}

/// Record of one phase application.
#[derive(Debug, Clone, Serialize)]
pub struct PhaseTrace {
    pub phase: String,
    pub applied: bool,
    pub before: [f32; 4],
    pub after: [f32; 4],
    pub note: String,
}

impl PhaseTrace {
    pub fn new(phase: &str, before: Rect, after: Rect, note: impl Into<String>) -> Self {
        PhaseTrace {
            phase: phase.to_string(),
            applied: before != after,
            before: before.to_array(),
            after: after.to_array(),
            note: note.into(),
        }
    }
}

/// Which window the acceptance gate ultimately selected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Refined,
    AOnly,
    Baseline,
}
