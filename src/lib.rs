//! `figcrop` - figure/table attachment extraction for research PDFs.
//!
//! # Pipeline
//!
//! ```text
//! PDF → backend snapshot → line metrics → caption index/scoring
//!     → global direction vote → anchor selection (V1/V2)
//!     → refine A (text trim) → B (object align) → D (autocrop)
//!     → acceptance gate → PNG + index.json + prune
//! ```
//!
//! The core operates on [`page::DocumentContent`] snapshots and the
//! [`raster::PageRaster`] trait, so everything from caption scoring to the
//! acceptance gate runs (and is tested) without a PDF library; only
//! [`backend`] touches pdfium.
//!
//! # Example
//!
//! ```rust,no_run
//! use figcrop::config::ConfigBuilder;
//! use figcrop::extract::{run, RunOptions};
//! use figcrop::runlog::RunLog;
//!
//! fn main() -> anyhow::Result<()> {
//!     let builder = ConfigBuilder::default();
//!     let opts = RunOptions::new("out");
//!     let mut log = RunLog::new(None);
//!     let outcome = run("paper.pdf".as_ref(), &builder, &opts, &mut log)?;
//!     println!("extracted {} attachment(s)", outcome.records.len());
//!     Ok(())
//! }
//! ```

pub mod anchor;
pub mod backend;
pub mod caption;
pub mod config;
pub mod debug_visual;
pub mod direction;
pub mod error;
pub mod extract;
pub mod geometry;
pub mod ident;
pub mod layout;
pub mod metrics;
pub mod output;
pub mod page;
pub mod raster;
pub mod refine;
pub mod runlog;

pub use caption::AttachmentKind;
pub use config::{ConfigBuilder, ExtractConfig};
pub use error::ExtractError;
pub use extract::{run, RunOptions, RunOutcome};
pub use ident::Ident;

/// Version of figcrop, stamped into every index record.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
