//! PDF backend adapter over pdfium.
//!
//! The only module that talks to pdfium. Opening a document validates it
//! (exists, loads, is not encrypted, has pages), then every page is reduced
//! once to a [`PageContent`] snapshot: text lines assembled from positioned
//! text objects, raster image bounds, and classified vector paths. All
//! coordinates are converted from pdfium's bottom-up space to the top-left
//! origin used everywhere else.
//!
//! Rendering goes through [`PageRaster`]: the page is rasterized at the
//! requested DPI and the clip cropped out of the full-page bitmap.

use std::path::{Path, PathBuf};

use image::{GrayImage, RgbImage};
use pdfium_render::prelude::*;
use tracing::{debug, warn};

use crate::error::{ExtractError, Result};
use crate::geometry::Rect;
use crate::page::{assemble_lines, classify_path, DocumentContent, DrawObject, PageContent, TextSpan};
use crate::raster::PageRaster;

/// Shared pdfium binding; create once per process.
pub struct Backend {
    pdfium: Pdfium,
}

impl Backend {
    /// Bind the system pdfium library, falling back to `./lib/`.
    pub fn init() -> Result<Self> {
        let bindings = Pdfium::bind_to_system_library()
            .or_else(|_| {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./lib/"))
            })
            .map_err(|e| {
                ExtractError::input(
                    PathBuf::new(),
                    format!("pdfium library not available: {e}"),
                )
            })?;
        Ok(Backend {
            pdfium: Pdfium::new(bindings),
        })
    }

    /// Open and validate a document.
    pub fn open<'a>(&'a self, path: &Path) -> Result<Document<'a>> {
        if !path.is_file() {
            return Err(ExtractError::input(path, "no such file"));
        }
        let doc = self
            .pdfium
            .load_pdf_from_file(path, None)
            .map_err(|e| {
                let detail = format!("{e:?}");
                if detail.contains("Password") {
                    ExtractError::input(path, "encrypted PDF; refusing to proceed")
                } else {
                    ExtractError::input(path, format!("cannot parse PDF: {e}"))
                }
            })?;
        if doc.pages().len() == 0 {
            return Err(ExtractError::input(path, "document has zero pages"));
        }
        Ok(Document {
            doc,
            path: path.to_path_buf(),
        })
    }
}

/// An open, validated document.
pub struct Document<'a> {
    doc: PdfDocument<'a>,
    path: PathBuf,
}

impl Document<'_> {
    pub fn page_count(&self) -> usize {
        self.doc.pages().len() as usize
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reduce every page to its content snapshot.
    pub fn snapshot(&self) -> Result<DocumentContent> {
        let pdf_name = self
            .path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let pdf_hash = crate::output::hash_pdf(&self.path).unwrap_or_default();

        let mut pages = Vec::with_capacity(self.page_count());
        for (index, page) in self.doc.pages().iter().enumerate() {
            pages.push(snapshot_page(index, &page));
        }

        Ok(DocumentContent {
            pdf_name,
            pdf_hash,
            pages,
        })
    }

    /// Render `clip` of `page` at `dpi` as a full-color image.
    fn render_clip(&self, page_index: usize, clip: Rect, dpi: f32) -> Result<RgbImage> {
        if clip.width() <= 0.0 || clip.height() <= 0.0 {
            return Err(ExtractError::render(page_index + 1, "degenerate clip"));
        }
        let page = self
            .doc
            .pages()
            .get(page_index as u16)
            .map_err(|e| ExtractError::render(page_index + 1, format!("page access: {e}")))?;

        let page_w = page.width().value;
        let page_h = page.height().value;
        let scale = dpi / 72.0;
        let target_w = (page_w * scale).round().max(1.0) as i32;
        let target_h = (page_h * scale).round().max(1.0) as i32;

        let config = PdfRenderConfig::new()
            .set_target_size(target_w, target_h)
            .rotate_if_landscape(PdfPageRenderRotation::None, false);
        let bitmap = page
            .render_with_config(&config)
            .map_err(|e| ExtractError::render(page_index + 1, format!("render: {e}")))?;
        let full = bitmap.as_image();

        let clip = clip.clamp_to(&Rect::new(0.0, 0.0, page_w, page_h));
        let x = (clip.x0 * scale).floor().max(0.0) as u32;
        let y = (clip.y0 * scale).floor().max(0.0) as u32;
        let w = ((clip.width() * scale).round() as u32)
            .max(1)
            .min(full.width().saturating_sub(x));
        let h = ((clip.height() * scale).round() as u32)
            .max(1)
            .min(full.height().saturating_sub(y));
        if w == 0 || h == 0 {
            return Err(ExtractError::render(page_index + 1, "clip outside page"));
        }
        Ok(full.crop_imm(x, y, w, h).to_rgb8())
    }
}

impl PageRaster for Document<'_> {
    fn render_gray(&self, page: usize, clip: Rect, dpi: f32) -> Result<GrayImage> {
        Ok(image::DynamicImage::ImageRgb8(self.render_clip(page, clip, dpi)?).to_luma8())
    }

    fn render_color(&self, page: usize, clip: Rect, dpi: f32) -> Result<RgbImage> {
        self.render_clip(page, clip, dpi)
    }
}

/// Font names that indicate a bold face (`Times-Bold`, `Helvetica-Black`…).
fn font_name_is_bold(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    lower.contains("bold") || lower.contains("black") || lower.contains("heavy")
}

fn snapshot_page(index: usize, page: &PdfPage) -> PageContent {
    let page_w = page.width().value;
    let page_h = page.height().value;
    let mut content = PageContent::new(index, Rect::new(0.0, 0.0, page_w, page_h));

    // pdfium reports bottom-up coordinates; flip to top-left origin.
    let to_rect = |b: &PdfQuadPoints| {
        Rect::new(
            b.left().value,
            page_h - b.top().value,
            b.right().value,
            page_h - b.bottom().value,
        )
    };

    let mut spans: Vec<TextSpan> = Vec::new();
    for object in page.objects().iter() {
        let Ok(bounds) = object.bounds() else {
            continue;
        };
        let rect = to_rect(&bounds);
        if rect.is_empty() {
            continue;
        }

        if let Some(text_object) = object.as_text_object() {
            let text = text_object.text();
            if text.trim().is_empty() {
                continue;
            }
            let nominal = text_object.unscaled_font_size().value;
            let font_size = if nominal > 1.0 { nominal } else { rect.height() };
            let font_name = text_object.font().name();
            spans.push(TextSpan {
                text,
                rect,
                font_size,
                bold: font_name_is_bold(&font_name),
                font_name,
            });
        } else if object.as_image_object().is_some() {
            content.objects.push(DrawObject {
                rect,
                kind: crate::page::DrawKind::Raster,
            });
        } else if object.as_path_object().is_some() {
            content.objects.push(DrawObject {
                rect,
                kind: classify_path(rect),
            });
        }
    }

    if spans.is_empty() && content.objects.is_empty() {
        warn!(page = index + 1, "page has no text objects and no drawings");
    }

    content.lines = assemble_lines(spans);
    debug!(
        page = index + 1,
        lines = content.lines.len(),
        objects = content.objects.len(),
        "page snapshot"
    );
    content
}
