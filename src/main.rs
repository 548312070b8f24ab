//! `figcrop` CLI - extract figure/table attachments from research PDFs.
//!
//! Produces cropped PNGs plus a traceable `index.json` so a downstream
//! summarizer receives a self-contained bundle.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use figcrop::config::{AnchorMode, GlobalAnchorMode, LayoutDriven, Preset};

mod cmd;

#[derive(Parser)]
#[command(name = "figcrop")]
#[command(about = "Extract figure/table attachments of research PDFs as cropped PNGs")]
#[command(version)]
struct Cli {
    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum DumpFormat {
    /// Human-readable text
    #[default]
    Text,
    /// JSON output
    Json,
}

#[derive(Subcommand)]
#[allow(clippy::large_enum_variant)]
enum Commands {
    /// Extract all figures and tables into an output directory
    Extract(ExtractArgs),

    /// List every caption candidate with its detection score
    Captions {
        /// PDF to scan
        pdf: PathBuf,

        /// Restrict to one attachment kind (figure, table)
        #[arg(short, long)]
        kind: Option<String>,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: DumpFormat,
    },

    /// Probe document line metrics and the layout model
    Metrics {
        /// PDF to probe
        pdf: PathBuf,

        /// Output format
        #[arg(short, long, default_value = "text")]
        format: DumpFormat,
    },
}

/// Arguments of the `extract` subcommand. Every tuning flag is optional;
/// unset flags fall through to `FIGCROP_*` environment variables, then the
/// adaptive defaults derived from the document, then the built-in defaults.
#[derive(Args)]
pub struct ExtractArgs {
    /// PDF to extract from
    pub pdf: PathBuf,

    /// Output directory (PNGs + index.json)
    #[arg(short, long, default_value = "figcrop_out")]
    pub out: PathBuf,

    /// Render resolution in DPI
    #[arg(long)]
    pub dpi: Option<u32>,

    /// Maximum crop window height in points
    #[arg(long)]
    pub clip_height: Option<f32>,

    /// Horizontal page margin excluded from windows (pt)
    #[arg(long)]
    pub margin_x: Option<f32>,

    /// Gap kept between the caption and the crop window (pt)
    #[arg(long)]
    pub caption_gap: Option<f32>,

    /// Comma-separated V2 scan heights (pt)
    #[arg(long)]
    pub scan_heights: Option<String>,

    /// V2 scan height refinement step (pt)
    #[arg(long)]
    pub scan_step: Option<f32>,

    /// Distance penalty weight in V2 window scoring
    #[arg(long)]
    pub scan_dist_lambda: Option<f32>,

    /// Guard band around the midpoint between stacked captions (pt)
    #[arg(long)]
    pub caption_mid_guard: Option<f32>,

    /// Enable/disable Phase A text trimming
    #[arg(long)]
    pub text_trim: Option<bool>,

    /// Near-adjacent trim threshold (pt); adaptive by default
    #[arg(long)]
    pub adjacent_th: Option<f32>,

    /// Mid-band trim reach (pt); adaptive by default
    #[arg(long)]
    pub far_text_th: Option<f32>,

    /// Minimum caption distance of far-side paragraphs (pt); adaptive
    #[arg(long)]
    pub far_side_min_dist: Option<f32>,

    /// Far-side paragraph coverage that triggers the A3 trim
    #[arg(long)]
    pub far_side_para_min_ratio: Option<f32>,

    /// Padding added around object components in Phase B (pt)
    #[arg(long)]
    pub object_pad: Option<f32>,

    /// Minimum object area ratio considered by Phase B
    #[arg(long)]
    pub object_min_area_ratio: Option<f32>,

    /// Gap merged when forming object components (pt)
    #[arg(long)]
    pub object_merge_gap: Option<f32>,

    /// Restrict Phase B to the caption-side edge
    #[arg(long)]
    pub refine_near_edge_only: Option<bool>,

    /// Enable/disable Phase D whitespace autocrop
    #[arg(long)]
    pub autocrop: Option<bool>,

    /// Autocrop padding around detected content (px)
    #[arg(long)]
    pub autocrop_pad_px: Option<u32>,

    /// White threshold for content detection (0-255)
    #[arg(long)]
    pub autocrop_white_th: Option<u8>,

    /// Maximum area share the autocrop may remove
    #[arg(long)]
    pub autocrop_shrink_limit: Option<f32>,

    /// Minimum autocrop result height (px)
    #[arg(long)]
    pub autocrop_min_height_px: Option<u32>,

    /// Maximum far-edge movement allowed to the autocrop (px)
    #[arg(long)]
    pub protect_far_edge_px: Option<u32>,

    /// Near-edge pad restored after an over-aggressive autocrop (px)
    #[arg(long)]
    pub near_edge_pad_px: Option<u32>,

    /// Enable/disable caption candidate scoring
    #[arg(long)]
    pub smart_captions: Option<bool>,

    /// Layout model participation
    #[arg(long, value_enum)]
    pub layout_driven: Option<LayoutDriven>,

    /// Derive trim thresholds from the document's line height
    #[arg(long)]
    pub adaptive_line_height: Option<bool>,

    /// Document-wide anchor direction voting
    #[arg(long, value_enum)]
    pub global_anchor: Option<GlobalAnchorMode>,

    /// Margin the vote must clear to pin a direction
    #[arg(long)]
    pub global_anchor_margin: Option<f32>,

    /// Anchor selector implementation
    #[arg(long, value_enum)]
    pub anchor_mode: Option<AnchorMode>,

    /// Emit one record per page for repeated captions
    #[arg(long)]
    pub allow_continued: Option<bool>,

    /// Figure ids forced to crop above the caption (comma-separated)
    #[arg(long)]
    pub force_above: Option<String>,

    /// Figure ids forced to crop below the caption (comma-separated)
    #[arg(long)]
    pub force_below: Option<String>,

    /// Table ids forced above (comma-separated)
    #[arg(long)]
    pub force_table_above: Option<String>,

    /// Table ids forced below (comma-separated)
    #[arg(long)]
    pub force_table_below: Option<String>,

    /// Delete unreferenced Figure_*/Table_* PNGs after indexing
    #[arg(long)]
    pub prune_images: Option<bool>,

    /// Maximum caption words used in filenames
    #[arg(long)]
    pub max_caption_words: Option<usize>,

    /// Parameter preset
    #[arg(long, value_enum)]
    pub preset: Option<Preset>,

    /// Write a CSV manifest mirroring the index
    #[arg(long)]
    pub manifest: Option<PathBuf>,

    /// Write layout_model.json next to the index
    #[arg(long)]
    pub layout_json: bool,

    /// Write run.log.jsonl next to the index
    #[arg(long)]
    pub run_log: bool,

    /// Write per-attachment stage overlays under debug/
    #[arg(long)]
    pub debug_visual: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let log_level = if cli.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .compact()
        .init();

    match cli.command {
        Commands::Extract(args) => cmd::cmd_extract(&args)?,
        Commands::Captions { pdf, kind, format } => {
            cmd::cmd_captions(&pdf, kind.as_deref(), format)?;
        }
        Commands::Metrics { pdf, format } => cmd::cmd_metrics(&pdf, format)?,
    }

    Ok(())
}
