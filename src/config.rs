//! Extraction configuration.
//!
//! Every recognized option resolves through the same priority chain:
//! built-in defaults → preset → adaptive defaults (from the line-metrics
//! probe) → environment (`FIGCROP_*`) → CLI. The resolved [`ExtractConfig`]
//! is immutable and passed by reference into every phase; phases never read
//! process state themselves.

use std::collections::BTreeSet;

use clap::ValueEnum;

use crate::metrics::LineMetrics;

/// Layout-model participation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LayoutDriven {
    Auto,
    On,
    Off,
}

/// Whole-document anchor-direction voting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GlobalAnchorMode {
    Auto,
    Off,
}

/// Anchor selector implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum AnchorMode {
    V1,
    V2,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Robust,
    None,
}

/// Resolved, immutable run configuration.
#[derive(Debug, Clone)]
pub struct ExtractConfig {
    pub dpi: u32,
    pub clip_height_pt: f32,
    pub margin_x_pt: f32,
    pub caption_gap_pt: f32,

    // V2 anchor scan
    pub scan_heights: Vec<f32>,
    pub scan_step_pt: f32,
    pub scan_dist_lambda: f32,
    pub caption_mid_guard_pt: f32,

    // Phase A
    pub text_trim: bool,
    pub adjacent_th_pt: f32,
    pub far_text_th_pt: f32,
    pub text_trim_gap_pt: f32,
    pub far_text_para_min_ratio: f32,
    pub far_text_trim_aggressive: bool,
    pub far_side_min_dist_pt: f32,
    pub far_side_para_min_ratio: f32,

    // Phase B
    pub object_pad_pt: f32,
    pub object_min_area_ratio_figure: f32,
    pub object_min_area_ratio_table: f32,
    pub object_merge_gap_pt: f32,
    pub refine_near_edge_only: bool,

    // Phase D
    pub autocrop: bool,
    pub autocrop_pad_px: u32,
    pub autocrop_white_th: u8,
    pub autocrop_shrink_limit: f32,
    pub autocrop_min_height_px: u32,
    pub protect_far_edge_px: u32,
    pub near_edge_pad_px: u32,

    // Detection & direction
    pub smart_caption_detection: bool,
    pub layout_driven: LayoutDriven,
    pub adaptive_line_height: bool,
    pub global_anchor: GlobalAnchorMode,
    pub global_anchor_margin_figure: f32,
    pub global_anchor_margin_table: f32,
    pub anchor_mode: AnchorMode,
    pub allow_continued: bool,

    // Forced directions, matched against `Ident::text()`
    pub force_above_ids: BTreeSet<String>,
    pub force_below_ids: BTreeSet<String>,
    pub force_table_above_ids: BTreeSet<String>,
    pub force_table_below_ids: BTreeSet<String>,

    // Output
    pub prune_images: bool,
    pub max_caption_words: usize,
    pub preset: Preset,
}

impl ExtractConfig {
    /// Phase B minimum component area ratio for the given attachment kind.
    pub fn object_min_area_ratio(&self, is_table: bool) -> f32 {
        if is_table {
            self.object_min_area_ratio_table
        } else {
            self.object_min_area_ratio_figure
        }
    }

    /// Global-anchor vote margin for the given attachment kind.
    pub fn global_anchor_margin(&self, is_table: bool) -> f32 {
        if is_table {
            self.global_anchor_margin_table
        } else {
            self.global_anchor_margin_figure
        }
    }

    /// Forced side for an identifier, if any.
    pub fn forced_side(&self, ident_text: &str, is_table: bool) -> Option<crate::anchor::Side> {
        use crate::anchor::Side;
        let (above, below) = if is_table {
            (&self.force_table_above_ids, &self.force_table_below_ids)
        } else {
            (&self.force_above_ids, &self.force_below_ids)
        };
        if above.contains(ident_text) {
            Some(Side::Above)
        } else if below.contains(ident_text) {
            Some(Side::Below)
        } else {
            None
        }
    }
}

/// A sparse layer of option values; `None` means "not set at this layer".
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub dpi: Option<u32>,
    pub clip_height_pt: Option<f32>,
    pub margin_x_pt: Option<f32>,
    pub caption_gap_pt: Option<f32>,
    pub scan_heights: Option<Vec<f32>>,
    pub scan_step_pt: Option<f32>,
    pub scan_dist_lambda: Option<f32>,
    pub caption_mid_guard_pt: Option<f32>,
    pub text_trim: Option<bool>,
    pub adjacent_th_pt: Option<f32>,
    pub far_text_th_pt: Option<f32>,
    pub far_side_min_dist_pt: Option<f32>,
    pub far_side_para_min_ratio: Option<f32>,
    pub object_pad_pt: Option<f32>,
    pub object_min_area_ratio: Option<f32>,
    pub object_merge_gap_pt: Option<f32>,
    pub refine_near_edge_only: Option<bool>,
    pub autocrop: Option<bool>,
    pub autocrop_pad_px: Option<u32>,
    pub autocrop_white_th: Option<u8>,
    pub autocrop_shrink_limit: Option<f32>,
    pub autocrop_min_height_px: Option<u32>,
    pub protect_far_edge_px: Option<u32>,
    pub near_edge_pad_px: Option<u32>,
    pub smart_caption_detection: Option<bool>,
    pub layout_driven: Option<LayoutDriven>,
    pub adaptive_line_height: Option<bool>,
    pub global_anchor: Option<GlobalAnchorMode>,
    pub global_anchor_margin: Option<f32>,
    pub anchor_mode: Option<AnchorMode>,
    pub allow_continued: Option<bool>,
    pub force_above_ids: Option<Vec<String>>,
    pub force_below_ids: Option<Vec<String>>,
    pub force_table_above_ids: Option<Vec<String>>,
    pub force_table_below_ids: Option<Vec<String>>,
    pub prune_images: Option<bool>,
    pub max_caption_words: Option<usize>,
    pub preset: Option<Preset>,
}

impl Overrides {
    /// Read the `FIGCROP_*` environment layer from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the environment layer through an arbitrary lookup (testable).
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Self {
        let f32_of = |key: &str| get(key).and_then(|v| v.trim().parse::<f32>().ok());
        let u32_of = |key: &str| get(key).and_then(|v| v.trim().parse::<u32>().ok());
        let bool_of = |key: &str| {
            get(key).and_then(|v| match v.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => Some(true),
                "0" | "false" | "no" | "off" => Some(false),
                _ => None,
            })
        };
        let list_of = |key: &str| get(key).map(|v| parse_comma_list(&v));

        Overrides {
            dpi: u32_of("FIGCROP_DPI"),
            clip_height_pt: f32_of("FIGCROP_CLIP_HEIGHT"),
            margin_x_pt: f32_of("FIGCROP_MARGIN_X"),
            caption_gap_pt: f32_of("FIGCROP_CAPTION_GAP"),
            scan_heights: get("FIGCROP_SCAN_HEIGHTS").map(|v| {
                parse_comma_list(&v)
                    .iter()
                    .filter_map(|s| s.parse::<f32>().ok())
                    .collect()
            }),
            scan_step_pt: f32_of("FIGCROP_SCAN_STEP"),
            scan_dist_lambda: f32_of("FIGCROP_SCAN_DIST_LAMBDA"),
            caption_mid_guard_pt: f32_of("FIGCROP_CAPTION_MID_GUARD"),
            text_trim: bool_of("FIGCROP_TEXT_TRIM"),
            adjacent_th_pt: f32_of("FIGCROP_ADJACENT_TH"),
            far_text_th_pt: f32_of("FIGCROP_FAR_TEXT_TH"),
            far_side_min_dist_pt: f32_of("FIGCROP_FAR_SIDE_MIN_DIST"),
            far_side_para_min_ratio: f32_of("FIGCROP_FAR_SIDE_PARA_MIN_RATIO"),
            object_pad_pt: f32_of("FIGCROP_OBJECT_PAD"),
            object_min_area_ratio: f32_of("FIGCROP_OBJECT_MIN_AREA_RATIO"),
            object_merge_gap_pt: f32_of("FIGCROP_OBJECT_MERGE_GAP"),
            refine_near_edge_only: bool_of("FIGCROP_REFINE_NEAR_EDGE_ONLY"),
            autocrop: bool_of("FIGCROP_AUTOCROP"),
            autocrop_pad_px: u32_of("FIGCROP_AUTOCROP_PAD_PX"),
            autocrop_white_th: get("FIGCROP_AUTOCROP_WHITE_TH")
                .and_then(|v| v.trim().parse::<u8>().ok()),
            autocrop_shrink_limit: f32_of("FIGCROP_AUTOCROP_SHRINK_LIMIT"),
            autocrop_min_height_px: u32_of("FIGCROP_AUTOCROP_MIN_HEIGHT_PX"),
            protect_far_edge_px: u32_of("FIGCROP_PROTECT_FAR_EDGE_PX"),
            near_edge_pad_px: u32_of("FIGCROP_NEAR_EDGE_PAD_PX"),
            smart_caption_detection: bool_of("FIGCROP_SMART_CAPTIONS"),
            layout_driven: get("FIGCROP_LAYOUT_DRIVEN").and_then(|v| {
                match v.trim().to_ascii_lowercase().as_str() {
                    "auto" => Some(LayoutDriven::Auto),
                    "on" => Some(LayoutDriven::On),
                    "off" => Some(LayoutDriven::Off),
                    _ => None,
                }
            }),
            adaptive_line_height: bool_of("FIGCROP_ADAPTIVE_LINE_HEIGHT"),
            global_anchor: get("FIGCROP_GLOBAL_ANCHOR").and_then(|v| {
                match v.trim().to_ascii_lowercase().as_str() {
                    "auto" => Some(GlobalAnchorMode::Auto),
                    "off" => Some(GlobalAnchorMode::Off),
                    _ => None,
                }
            }),
            global_anchor_margin: f32_of("FIGCROP_GLOBAL_ANCHOR_MARGIN"),
            anchor_mode: get("FIGCROP_ANCHOR_MODE").and_then(|v| {
                match v.trim().to_ascii_lowercase().as_str() {
                    "v1" => Some(AnchorMode::V1),
                    "v2" => Some(AnchorMode::V2),
                    _ => None,
                }
            }),
            allow_continued: bool_of("FIGCROP_ALLOW_CONTINUED"),
            force_above_ids: list_of("FIGCROP_FORCE_ABOVE"),
            force_below_ids: list_of("FIGCROP_FORCE_BELOW"),
            force_table_above_ids: list_of("FIGCROP_FORCE_TABLE_ABOVE"),
            force_table_below_ids: list_of("FIGCROP_FORCE_TABLE_BELOW"),
            prune_images: bool_of("FIGCROP_PRUNE_IMAGES"),
            max_caption_words: get("FIGCROP_MAX_CAPTION_WORDS")
                .and_then(|v| v.trim().parse::<usize>().ok()),
            preset: get("FIGCROP_PRESET").and_then(|v| {
                match v.trim().to_ascii_lowercase().as_str() {
                    "robust" => Some(Preset::Robust),
                    "none" => Some(Preset::None),
                    _ => None,
                }
            }),
        }
    }
}

/// Split a comma-separated id list, trimming blanks.
pub fn parse_comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Two sparse layers (env below cli) over the builtin/preset/adaptive base.
#[derive(Debug, Clone, Default)]
pub struct ConfigBuilder {
    pub env: Overrides,
    pub cli: Overrides,
}

macro_rules! pick {
    ($cli:expr, $env:expr, $field:ident, $default:expr) => {
        $cli.$field.clone().or($env.$field.clone()).unwrap_or($default)
    };
}

impl ConfigBuilder {
    /// Resolve the effective configuration. `metrics` supplies the adaptive
    /// defaults; pass `None` before the probe has run (or when
    /// `adaptive_line_height` is off) to fall back to compile-time values.
    pub fn resolve(&self, metrics: Option<&LineMetrics>) -> ExtractConfig {
        let cli = &self.cli;
        let env = &self.env;

        let preset = pick!(cli, env, preset, Preset::None);

        // Built-in defaults, optionally replaced by the preset layer.
        let (mut d_clip_h, mut d_margin_x, mut d_gap) = (650.0_f32, 20.0_f32, 5.0_f32);
        let (mut d_text_trim, mut d_autocrop) = (true, true);
        let (mut d_protect_far, mut d_near_pad) = (14_u32, 32_u32);
        if preset == Preset::Robust {
            d_clip_h = 520.0;
            d_margin_x = 26.0;
            d_gap = 6.0;
            d_text_trim = true;
            d_autocrop = true;
            d_protect_far = 18;
            d_near_pad = 32;
        }

        let adaptive_line_height = pick!(cli, env, adaptive_line_height, true);
        let line_h = metrics
            .filter(|_| adaptive_line_height)
            .map(LineMetrics::typical_line_height);

        // Adaptive defaults sit between preset and environment.
        let d_adjacent = line_h.map(|l| 2.0 * l).unwrap_or(24.0);
        let d_far_text = line_h.map(|l| 10.0 * l).unwrap_or(300.0);
        let d_trim_gap = line_h.map(|l| 0.5 * l).unwrap_or(6.0);
        let d_far_side_dist = line_h.map(|l| 8.0 * l).unwrap_or(100.0);

        let object_min_area_ratio = cli
            .object_min_area_ratio
            .or(env.object_min_area_ratio);
        let global_anchor_margin = cli.global_anchor_margin.or(env.global_anchor_margin);

        ExtractConfig {
            dpi: pick!(cli, env, dpi, 300),
            clip_height_pt: pick!(cli, env, clip_height_pt, d_clip_h),
            margin_x_pt: pick!(cli, env, margin_x_pt, d_margin_x),
            caption_gap_pt: pick!(cli, env, caption_gap_pt, d_gap),
            scan_heights: pick!(
                cli,
                env,
                scan_heights,
                vec![200.0, 300.0, 400.0, 500.0, 650.0]
            ),
            scan_step_pt: pick!(cli, env, scan_step_pt, 14.0),
            scan_dist_lambda: pick!(cli, env, scan_dist_lambda, 0.12),
            caption_mid_guard_pt: pick!(cli, env, caption_mid_guard_pt, 6.0),
            text_trim: pick!(cli, env, text_trim, d_text_trim),
            adjacent_th_pt: pick!(cli, env, adjacent_th_pt, d_adjacent),
            far_text_th_pt: pick!(cli, env, far_text_th_pt, d_far_text),
            text_trim_gap_pt: d_trim_gap,
            far_text_para_min_ratio: 0.30,
            far_text_trim_aggressive: true,
            far_side_min_dist_pt: pick!(cli, env, far_side_min_dist_pt, d_far_side_dist),
            far_side_para_min_ratio: pick!(cli, env, far_side_para_min_ratio, 0.20),
            object_pad_pt: pick!(cli, env, object_pad_pt, 8.0),
            object_min_area_ratio_figure: object_min_area_ratio.unwrap_or(0.012),
            object_min_area_ratio_table: object_min_area_ratio.unwrap_or(0.005),
            object_merge_gap_pt: pick!(cli, env, object_merge_gap_pt, 6.0),
            refine_near_edge_only: pick!(cli, env, refine_near_edge_only, true),
            autocrop: pick!(cli, env, autocrop, d_autocrop),
            autocrop_pad_px: pick!(cli, env, autocrop_pad_px, 30),
            autocrop_white_th: pick!(cli, env, autocrop_white_th, 250),
            autocrop_shrink_limit: pick!(cli, env, autocrop_shrink_limit, 0.30),
            autocrop_min_height_px: pick!(cli, env, autocrop_min_height_px, 80),
            protect_far_edge_px: pick!(cli, env, protect_far_edge_px, d_protect_far),
            near_edge_pad_px: pick!(cli, env, near_edge_pad_px, d_near_pad),
            smart_caption_detection: pick!(cli, env, smart_caption_detection, true),
            layout_driven: pick!(cli, env, layout_driven, LayoutDriven::On),
            adaptive_line_height,
            global_anchor: pick!(cli, env, global_anchor, GlobalAnchorMode::Auto),
            global_anchor_margin_figure: global_anchor_margin.unwrap_or(0.02),
            global_anchor_margin_table: global_anchor_margin.unwrap_or(0.03),
            anchor_mode: pick!(cli, env, anchor_mode, AnchorMode::V2),
            allow_continued: pick!(cli, env, allow_continued, false),
            force_above_ids: to_set(pick!(cli, env, force_above_ids, Vec::new())),
            force_below_ids: to_set(pick!(cli, env, force_below_ids, Vec::new())),
            force_table_above_ids: to_set(pick!(cli, env, force_table_above_ids, Vec::new())),
            force_table_below_ids: to_set(pick!(cli, env, force_table_below_ids, Vec::new())),
            prune_images: pick!(cli, env, prune_images, true),
            max_caption_words: pick!(cli, env, max_caption_words, 12),
            preset,
        }
    }
}

fn to_set(ids: Vec<String>) -> BTreeSet<String> {
    ids.into_iter().map(|s| s.to_ascii_uppercase()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env_of(pairs: &[(&str, &str)]) -> Overrides {
        let owned: Vec<(String, String)> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Overrides::from_lookup(move |key| {
            owned
                .iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v.clone())
        })
    }

    #[test]
    fn builtin_defaults() {
        let cfg = ConfigBuilder::default().resolve(None);
        assert_eq!(cfg.dpi, 300);
        assert_eq!(cfg.clip_height_pt, 650.0);
        assert_eq!(cfg.margin_x_pt, 20.0);
        assert_eq!(cfg.caption_gap_pt, 5.0);
        assert_eq!(cfg.adjacent_th_pt, 24.0);
        assert_eq!(cfg.far_text_th_pt, 300.0);
        assert_eq!(cfg.far_side_min_dist_pt, 100.0);
        assert_eq!(cfg.object_min_area_ratio(false), 0.012);
        assert_eq!(cfg.object_min_area_ratio(true), 0.005);
        assert_eq!(cfg.global_anchor_margin(false), 0.02);
        assert_eq!(cfg.global_anchor_margin(true), 0.03);
        assert_eq!(cfg.anchor_mode, AnchorMode::V2);
        assert!(cfg.prune_images);
        assert!(!cfg.allow_continued);
    }

    #[test]
    fn adaptive_defaults_derive_from_line_height() {
        let metrics = LineMetrics::with_line_height(14.0);
        let cfg = ConfigBuilder::default().resolve(Some(&metrics));
        assert_eq!(cfg.adjacent_th_pt, 28.0);
        assert_eq!(cfg.far_text_th_pt, 140.0);
        assert_eq!(cfg.text_trim_gap_pt, 7.0);
        assert_eq!(cfg.far_side_min_dist_pt, 112.0);
    }

    #[test]
    fn env_overrides_adaptive() {
        let builder = ConfigBuilder {
            env: env_of(&[("FIGCROP_ADJACENT_TH", "40")]),
            cli: Overrides::default(),
        };
        let metrics = LineMetrics::with_line_height(14.0);
        let cfg = builder.resolve(Some(&metrics));
        assert_eq!(cfg.adjacent_th_pt, 40.0);
        // Untouched adaptive value still derives from metrics.
        assert_eq!(cfg.far_text_th_pt, 140.0);
    }

    #[test]
    fn cli_overrides_env() {
        let builder = ConfigBuilder {
            env: env_of(&[("FIGCROP_DPI", "150")]),
            cli: Overrides {
                dpi: Some(600),
                ..Default::default()
            },
        };
        let cfg = builder.resolve(None);
        assert_eq!(cfg.dpi, 600);
    }

    #[test]
    fn env_bool_and_list_parsing() {
        let builder = ConfigBuilder {
            env: env_of(&[
                ("FIGCROP_TEXT_TRIM", "off"),
                ("FIGCROP_FORCE_BELOW", "4, s1 ,"),
            ]),
            cli: Overrides::default(),
        };
        let cfg = builder.resolve(None);
        assert!(!cfg.text_trim);
        assert!(cfg.force_below_ids.contains("4"));
        assert!(cfg.force_below_ids.contains("S1"));
        assert_eq!(cfg.force_below_ids.len(), 2);
    }

    #[test]
    fn robust_preset_changes_window_defaults_only_when_not_overridden() {
        let builder = ConfigBuilder {
            env: Overrides::default(),
            cli: Overrides {
                preset: Some(Preset::Robust),
                margin_x_pt: Some(30.0),
                ..Default::default()
            },
        };
        let cfg = builder.resolve(None);
        assert_eq!(cfg.clip_height_pt, 520.0);
        assert_eq!(cfg.margin_x_pt, 30.0); // CLI wins over preset
        assert_eq!(cfg.protect_far_edge_px, 18);
    }

    #[test]
    fn forced_side_lookup_per_kind() {
        let builder = ConfigBuilder {
            env: Overrides::default(),
            cli: Overrides {
                force_below_ids: Some(vec!["4".into()]),
                force_table_above_ids: Some(vec!["2".into()]),
                ..Default::default()
            },
        };
        let cfg = builder.resolve(None);
        use crate::anchor::Side;
        assert_eq!(cfg.forced_side("4", false), Some(Side::Below));
        assert_eq!(cfg.forced_side("4", true), None);
        assert_eq!(cfg.forced_side("2", true), Some(Side::Above));
    }
}
