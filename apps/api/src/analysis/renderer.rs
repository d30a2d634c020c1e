//! Document rendering — turns the first page of a résumé into a PNG.
//!
//! The orchestrator only depends on the `DocumentRenderer` contract. The default
//! implementation shells out to poppler's `pdftoppm`.

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

use crate::platform::Document;

#[derive(Debug, Error)]
pub enum RenderError {
    #[error("document is not a PDF")]
    NotPdf,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("renderer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    #[error("renderer produced an empty image")]
    Empty,
}

#[async_trait]
pub trait DocumentRenderer: Send + Sync {
    /// Rasterises page one of `document`.
    async fn render_first_page(&self, document: &Document) -> Result<Document, RenderError>;
}

/// `cv.pdf` → `cv.png`. Names without a `.pdf` suffix just gain `.png`.
pub fn image_name(document_name: &str) -> String {
    let stem = match document_name.len().checked_sub(4) {
        Some(cut)
            if document_name.is_char_boundary(cut)
                && document_name[cut..].eq_ignore_ascii_case(".pdf") =>
        {
            &document_name[..cut]
        }
        _ => document_name,
    };
    format!("{stem}.png")
}

pub struct PdftoppmRenderer {
    binary: String,
    dpi: u32,
}

impl PdftoppmRenderer {
    pub fn new(binary: String, dpi: u32) -> Self {
        Self { binary, dpi }
    }
}

#[async_trait]
impl DocumentRenderer for PdftoppmRenderer {
    async fn render_first_page(&self, document: &Document) -> Result<Document, RenderError> {
        if !document.is_pdf() {
            return Err(RenderError::NotPdf);
        }

        let workdir = tempfile::tempdir()?;
        let input = workdir.path().join("input.pdf");
        let output_stem = workdir.path().join("page");
        tokio::fs::write(&input, &document.bytes).await?;

        let output = Command::new(&self.binary)
            .arg("-png")
            .args(["-f", "1", "-l", "1"])
            .arg("-singlefile")
            .args(["-r", &self.dpi.to_string()])
            .arg(&input)
            .arg(&output_stem)
            .output()
            .await?;

        if !output.status.success() {
            return Err(RenderError::Failed {
                status: output.status.to_string(),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        let png = tokio::fs::read(output_stem.with_extension("png")).await?;
        if png.is_empty() {
            return Err(RenderError::Empty);
        }
        debug!(
            "Rendered page 1 of {} at {} dpi ({} bytes)",
            document.name,
            self.dpi,
            png.len()
        );

        Ok(Document::new(
            image_name(&document.name),
            "image/png",
            Bytes::from(png),
        ))
    }
}
