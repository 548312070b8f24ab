//! Acceptance gate with fallback.
//!
//! Refinement must not silently destroy a safe baseline: the gate compares
//! the refined window's metrics against the baseline's under tiered
//! thresholds. The more of the baseline's far half is body text, the more
//! shrinkage is legitimate, so thresholds relax with far-side paragraph
//! coverage. A failed gate retries with the A-only window; a failed A-only
//! falls all the way back to the baseline.
//!
//! Ink and coverage are compared as retained *mass* (density × area):
//! cropping pure whitespace raises density and must never count against the
//! refinement.

use serde::Serialize;

use crate::anchor::{component_count, object_coverage, paragraph_coverage, Side};
use crate::geometry::Rect;
use crate::layout::PageLayout;
use crate::page::PageContent;
use crate::raster::InkMap;

use super::StageOutcome;

/// Metrics of one candidate window.
#[derive(Debug, Clone, Copy, Serialize)]
pub struct WindowMetrics {
    pub height: f32,
    pub area: f32,
    pub ink_density: f32,
    pub object_coverage: f32,
    pub component_count: usize,
    pub text_line_count: usize,
}

/// Measure a window against its page snapshot and ink map.
pub fn measure(
    win: &Rect,
    page: &PageContent,
    ink: Option<&InkMap>,
    merge_gap: f32,
) -> WindowMetrics {
    let objects: Vec<Rect> = page.object_rects().collect();
    WindowMetrics {
        height: win.height(),
        area: win.area(),
        ink_density: ink.map(|m| m.ink_ratio(win)).unwrap_or(0.0),
        object_coverage: object_coverage(win, &objects),
        component_count: component_count(win, page, merge_gap),
        text_line_count: page.lines.iter().filter(|l| l.rect.intersects(win)).count(),
    }
}

/// Paragraph coverage over the far 50% of the baseline window.
pub fn far_coverage(
    baseline: &Rect,
    side: Side,
    page: &PageContent,
    layout: Option<&PageLayout>,
) -> f32 {
    let far_half = match side {
        Side::Above => Rect::new(baseline.x0, baseline.y0, baseline.x1, baseline.center_y()),
        Side::Below => Rect::new(baseline.x0, baseline.center_y(), baseline.x1, baseline.y1),
    };
    paragraph_coverage(&far_half, page, layout)
}

/// Minimum surviving ratios for the refined window, by far-coverage tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GateThresholds {
    pub height_ratio: f32,
    pub area_ratio: f32,
    pub ink_ratio: f32,
    pub coverage_ratio: f32,
}

/// Tier lookup. Monotone: higher far coverage never tightens a threshold.
pub fn thresholds_for(far_coverage: f32) -> GateThresholds {
    if far_coverage >= 0.60 {
        GateThresholds {
            height_ratio: 0.35,
            area_ratio: 0.25,
            ink_ratio: 0.70,
            coverage_ratio: 0.70,
        }
    } else if far_coverage >= 0.30 {
        GateThresholds {
            height_ratio: 0.45,
            area_ratio: 0.35,
            ink_ratio: 0.75,
            coverage_ratio: 0.75,
        }
    } else if far_coverage >= 0.18 {
        GateThresholds {
            height_ratio: 0.50,
            area_ratio: 0.40,
            ink_ratio: 0.80,
            coverage_ratio: 0.80,
        }
    } else {
        GateThresholds {
            height_ratio: 0.60,
            area_ratio: 0.55,
            ink_ratio: 0.90,
            coverage_ratio: 0.85,
        }
    }
}

/// A-only fallback bounds.
const A_ONLY_HEIGHT_RATIO: f32 = 0.60;
const A_ONLY_AREA_RATIO: f32 = 0.55;

/// The gate's verdict plus everything needed to explain it.
#[derive(Debug, Clone, Serialize)]
pub struct GateReport {
    pub outcome: StageOutcome,
    pub far_coverage: f32,
    pub thresholds: GateThresholds,
    pub height_ratio: f32,
    pub area_ratio: f32,
    pub ink_mass_ratio: f32,
    pub coverage_mass_ratio: f32,
    /// Why the refined window was rejected, when it was.
    pub reject_reason: Option<String>,
}

fn mass_ratio(refined_density: f32, refined_area: f32, base_density: f32, base_area: f32) -> f32 {
    let base_mass = base_density * base_area;
    if base_mass <= f32::EPSILON {
        return 1.0;
    }
    (refined_density * refined_area) / base_mass
}

/// Decide between refined / A-only / baseline.
pub fn decide(
    baseline: &WindowMetrics,
    a_only: &WindowMetrics,
    refined: &WindowMetrics,
    far_cov: f32,
) -> GateReport {
    let th = thresholds_for(far_cov);
    let height_ratio = refined.height / baseline.height.max(1.0);
    let area_ratio = refined.area / baseline.area.max(1.0);
    let ink_mass_ratio = mass_ratio(
        refined.ink_density,
        refined.area,
        baseline.ink_density,
        baseline.area,
    );
    let coverage_mass_ratio = mass_ratio(
        refined.object_coverage,
        refined.area,
        baseline.object_coverage,
        baseline.area,
    );

    let mut reject_reason = None;
    if height_ratio < th.height_ratio {
        reject_reason = Some(format!(
            "height ratio {height_ratio:.3} < {:.2}",
            th.height_ratio
        ));
    } else if area_ratio < th.area_ratio {
        reject_reason = Some(format!("area ratio {area_ratio:.3} < {:.2}", th.area_ratio));
    } else if ink_mass_ratio < th.ink_ratio {
        reject_reason = Some(format!(
            "ink mass ratio {ink_mass_ratio:.3} < {:.2}",
            th.ink_ratio
        ));
    } else if coverage_mass_ratio < th.coverage_ratio {
        reject_reason = Some(format!(
            "coverage mass ratio {coverage_mass_ratio:.3} < {:.2}",
            th.coverage_ratio
        ));
    } else if baseline.component_count >= 2 && refined.component_count < 2 {
        reject_reason = Some(format!(
            "components dropped {} -> {}",
            baseline.component_count, refined.component_count
        ));
    }

    let outcome = if reject_reason.is_none() {
        StageOutcome::Refined
    } else {
        let a_height = a_only.height / baseline.height.max(1.0);
        let a_area = a_only.area / baseline.area.max(1.0);
        if a_height >= A_ONLY_HEIGHT_RATIO && a_area >= A_ONLY_AREA_RATIO {
            StageOutcome::AOnly
        } else {
            StageOutcome::Baseline
        }
    };

    GateReport {
        outcome,
        far_coverage: far_cov,
        thresholds: th,
        height_ratio,
        area_ratio,
        ink_mass_ratio,
        coverage_mass_ratio,
        reject_reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics(height: f32, area: f32, ink: f32, cov: f32, comps: usize) -> WindowMetrics {
        WindowMetrics {
            height,
            area,
            ink_density: ink,
            object_coverage: cov,
            component_count: comps,
            text_line_count: 0,
        }
    }

    #[test]
    fn tier_thresholds_match_table() {
        assert_eq!(
            thresholds_for(0.65),
            GateThresholds {
                height_ratio: 0.35,
                area_ratio: 0.25,
                ink_ratio: 0.70,
                coverage_ratio: 0.70
            }
        );
        assert_eq!(thresholds_for(0.45).height_ratio, 0.45);
        assert_eq!(thresholds_for(0.20).height_ratio, 0.50);
        assert_eq!(thresholds_for(0.10).height_ratio, 0.60);
    }

    #[test]
    fn thresholds_are_monotone_in_far_coverage() {
        let samples = [0.0, 0.1, 0.18, 0.25, 0.30, 0.45, 0.60, 0.80, 1.0];
        for pair in samples.windows(2) {
            let lo = thresholds_for(pair[0]);
            let hi = thresholds_for(pair[1]);
            assert!(hi.height_ratio <= lo.height_ratio);
            assert!(hi.area_ratio <= lo.area_ratio);
            assert!(hi.ink_ratio <= lo.ink_ratio);
            assert!(hi.coverage_ratio <= lo.coverage_ratio);
        }
    }

    #[test]
    fn clean_refinement_passes() {
        let base = metrics(400.0, 200_000.0, 0.10, 0.50, 1);
        // Tighter crop that keeps the content: density rises, mass intact.
        let refined = metrics(300.0, 150_000.0, 0.133, 0.66, 1);
        let a_only = base;
        let report = decide(&base, &a_only, &refined, 0.10);
        assert_eq!(report.outcome, StageOutcome::Refined);
        assert!(report.reject_reason.is_none());
    }

    #[test]
    fn over_shrunk_refinement_falls_back_to_a_only() {
        let base = metrics(400.0, 200_000.0, 0.10, 0.50, 1);
        let refined = metrics(100.0, 40_000.0, 0.12, 0.55, 1);
        let a_only = metrics(300.0, 150_000.0, 0.11, 0.52, 1);
        let report = decide(&base, &a_only, &refined, 0.10);
        assert_eq!(report.outcome, StageOutcome::AOnly);
        assert!(report.reject_reason.unwrap().contains("height ratio"));
    }

    #[test]
    fn everything_bad_falls_back_to_baseline() {
        let base = metrics(400.0, 200_000.0, 0.10, 0.50, 1);
        let refined = metrics(90.0, 30_000.0, 0.05, 0.10, 1);
        let a_only = metrics(120.0, 50_000.0, 0.08, 0.30, 1);
        let report = decide(&base, &a_only, &refined, 0.10);
        assert_eq!(report.outcome, StageOutcome::Baseline);
    }

    #[test]
    fn high_far_coverage_tolerates_aggressive_crop() {
        let base = metrics(400.0, 200_000.0, 0.10, 0.50, 1);
        // 45% height retained: fails the <18% tier, passes the >=60% tier.
        let refined = metrics(180.0, 90_000.0, 0.21, 1.0, 1);
        let a_only = metrics(120.0, 50_000.0, 0.08, 0.30, 1);

        let strict = decide(&base, &a_only, &refined, 0.05);
        assert_ne!(strict.outcome, StageOutcome::Refined);

        let relaxed = decide(&base, &a_only, &refined, 0.65);
        assert_eq!(relaxed.outcome, StageOutcome::Refined);
    }

    #[test]
    fn component_loss_rejects_refinement() {
        let base = metrics(400.0, 200_000.0, 0.10, 0.50, 2);
        // Size-wise fine, but one of two sub-panels was cut away.
        let refined = metrics(320.0, 170_000.0, 0.115, 0.58, 1);
        let a_only = base;
        let report = decide(&base, &a_only, &refined, 0.10);
        assert_ne!(report.outcome, StageOutcome::Refined);
        assert!(report.reject_reason.unwrap().contains("components"));
    }

    #[test]
    fn whitespace_only_crop_is_not_penalized_for_density() {
        // Half the area removed, all of it blank: density doubles, mass 1.0.
        let base = metrics(400.0, 200_000.0, 0.10, 0.30, 1);
        let refined = metrics(320.0, 100_000.0, 0.20, 0.60, 1);
        let report = decide(&base, &base, &refined, 0.65);
        assert_eq!(report.outcome, StageOutcome::Refined);
        assert!((report.ink_mass_ratio - 1.0).abs() < 0.01);
    }

    #[test]
    fn zero_ink_baseline_does_not_divide_by_zero() {
        let base = metrics(400.0, 200_000.0, 0.0, 0.0, 0);
        let refined = metrics(300.0, 150_000.0, 0.0, 0.0, 0);
        let report = decide(&base, &base, &refined, 0.0);
        assert_eq!(report.outcome, StageOutcome::Refined);
    }
}
