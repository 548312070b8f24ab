//! Axis-aligned rectangles in PDF points.
//!
//! Origin is the top-left page corner, x grows right, y grows down. Every
//! stage of the pipeline works in this space; only Phase D converts to
//! pixels (`pt * dpi / 72`).

/// A rectangle `(x0, y0, x1, y1)` with `x0 <= x1` and `y0 <= y1`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self {
            x0: x0.min(x1),
            y0: y0.min(y1),
            x1: x0.max(x1),
            y1: y0.max(y1),
        }
    }

    pub const ZERO: Rect = Rect {
        x0: 0.0,
        y0: 0.0,
        x1: 0.0,
        y1: 0.0,
    };

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// A rect is empty when either side has collapsed.
    pub fn is_empty(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    pub fn center_y(&self) -> f32 {
        0.5 * (self.y0 + self.y1)
    }

    /// Intersection; collapses to a zero-area rect when disjoint.
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x0 = self.x0.max(other.x0);
        let y0 = self.y0.max(other.y0);
        let x1 = self.x1.min(other.x1);
        let y1 = self.y1.min(other.y1);
        if x0 >= x1 || y0 >= y1 {
            Rect {
                x0,
                y0,
                x1: x0,
                y1: y0,
            }
        } else {
            Rect { x0, y0, x1, y1 }
        }
    }

    pub fn intersects(&self, other: &Rect) -> bool {
        !self.intersect(other).is_empty()
    }

    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Grow (or shrink, with a negative pad) on all sides.
    pub fn expand(&self, pad: f32) -> Rect {
        Rect::new(self.x0 - pad, self.y0 - pad, self.x1 + pad, self.y1 + pad)
    }

    /// Clamp into `bounds`. Degenerate output collapses to the nearest edge
    /// of `bounds`; no negative-area rect is ever produced.
    pub fn clamp_to(&self, bounds: &Rect) -> Rect {
        let x0 = self.x0.clamp(bounds.x0, bounds.x1);
        let y0 = self.y0.clamp(bounds.y0, bounds.y1);
        let x1 = self.x1.clamp(bounds.x0, bounds.x1);
        let y1 = self.y1.clamp(bounds.y0, bounds.y1);
        Rect::new(x0, y0, x1, y1)
    }

    /// Containment with a tolerance in points.
    pub fn contains_rect(&self, other: &Rect, eps: f32) -> bool {
        other.x0 >= self.x0 - eps
            && other.y0 >= self.y0 - eps
            && other.x1 <= self.x1 + eps
            && other.y1 <= self.y1 + eps
    }

    /// Horizontal overlap length with `other` (0 when disjoint in x).
    pub fn x_overlap(&self, other: &Rect) -> f32 {
        (self.x1.min(other.x1) - self.x0.max(other.x0)).max(0.0)
    }

    /// Vertical overlap length with `other` (0 when disjoint in y).
    pub fn y_overlap(&self, other: &Rect) -> f32 {
        (self.y1.min(other.y1) - self.y0.max(other.y0)).max(0.0)
    }

    pub fn to_array(&self) -> [f32; 4] {
        [self.x0, self.y0, self.x1, self.y1]
    }
}

/// Merge rectangles whose gap-expanded forms intersect, iterating to a fixed
/// point. Used by Phase B to form connected object components.
pub fn merge_rects(rects: &[Rect], merge_gap: f32) -> Vec<Rect> {
    if rects.is_empty() {
        return Vec::new();
    }

    let mut expanded: Vec<Rect> = rects.iter().map(|r| r.expand(merge_gap)).collect();
    let mut changed = true;
    while changed {
        changed = false;
        let mut out: Vec<Rect> = Vec::with_capacity(expanded.len());
        for r in &expanded {
            let mut merged = false;
            for o in out.iter_mut() {
                if r.intersects(o) {
                    *o = o.union(r);
                    merged = true;
                    changed = true;
                    break;
                }
            }
            if !merged {
                out.push(*r);
            }
        }
        expanded = out;
    }

    // Undo the expansion so component bounds match the source objects.
    expanded.iter().map(|r| r.expand(-merge_gap)).collect()
}
