//! Error taxonomy for the extraction core.
//!
//! Only two kinds are fatal and surface to the caller: [`ExtractError::Input`]
//! (the PDF cannot be processed at all) and [`ExtractError::IndexWrite`]
//! (the run did not commit). Everything else - rejected refinements,
//! uncertain captions, naming collisions, per-clip render failures - is
//! handled locally, recorded in the per-attachment trace and the run log,
//! and the run continues.

use std::path::PathBuf;

use thiserror::Error;

/// Fatal failure kinds of an extraction run.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// Unreadable, encrypted, zero-page or truncated input PDF.
    #[error("input error: {reason} ({path})", path = .path.display())]
    Input { path: PathBuf, reason: String },

    /// A pixmap request failed for a given clip. Fatal only when the final
    /// render of an attachment fails *and* no earlier stage can be rendered;
    /// refinement-internal render failures fall back to the pre-D stage.
    #[error("render error on page {page}: {reason}")]
    Render { page: usize, reason: String },

    /// The atomic rename of the index failed. The previous index (and its
    /// referenced files) are left untouched.
    #[error("index write error: {reason} ({path})", path = .path.display())]
    IndexWrite { path: PathBuf, reason: String },
}

impl ExtractError {
    pub fn input(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Input {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub fn render(page: usize, reason: impl Into<String>) -> Self {
        Self::Render {
            page,
            reason: reason.into(),
        }
    }

    pub fn index_write(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::IndexWrite {
            path: path.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T, E = ExtractError> = std::result::Result<T, E>;
