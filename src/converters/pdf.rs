//! PDF adapters backed by pdfium.
//!
//! pdfium is bound per call inside `spawn_blocking`; the library keeps
//! thread-local state and must never run on an async worker.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use image::ImageFormat;
use pdfium_render::prelude::*;
use tracing::{debug, info};

use super::ooxml::DocxBuilder;
use super::{contain, run_blocking, Converter};
use crate::error::ConverterError;

/// Bind the pdfium library.
///
/// Resolution order: the explicit `library` path, then `PDFIUM_LIB_PATH`
/// (a file, or a directory holding the platform library), then the system
/// library search path.
pub fn bind(library: Option<&Path>) -> Result<Pdfium, ConverterError> {
    let bindings = match library {
        Some(path) => Pdfium::bind_to_library(path),
        None => match std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from) {
            Some(path) if path.is_dir() => {
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&path))
            }
            Some(path) => Pdfium::bind_to_library(path),
            None => Pdfium::bind_to_system_library(),
        },
    }
    .map_err(|e| ConverterError::Pdf(format!("cannot bind pdfium: {e}")))?;
    Ok(Pdfium::new(bindings))
}

fn open<'a>(pdfium: &'a Pdfium, path: &Path) -> Result<PdfDocument<'a>, ConverterError> {
    pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ConverterError::Pdf(format!("cannot open '{}': {:?}", path.display(), e)))
}

/// Extracts the text layer into a Word document, one paragraph per line,
/// with a page break between source pages.
#[derive(Debug, Clone, Default)]
pub struct PdfToDocx {
    library: Option<PathBuf>,
}

impl PdfToDocx {
    pub fn new(library: Option<PathBuf>) -> Self {
        Self { library }
    }
}

fn pdf_to_docx_blocking(
    library: Option<&Path>,
    input: &Path,
    output: &Path,
) -> Result<(), ConverterError> {
    let pdfium = bind(library)?;
    let document = open(&pdfium, input)?;
    let pages = document.pages();
    info!("PDF loaded: {} pages", pages.len());

    let mut docx = DocxBuilder::new();
    for (index, page) in pages.iter().enumerate() {
        if index > 0 {
            docx.page_break();
        }
        let text = page
            .text()
            .map_err(|e| ConverterError::Pdf(format!("page {}: {:?}", index + 1, e)))?
            .all();
        for line in text.lines() {
            docx.paragraph(line.trim_end());
        }
    }
    docx.write(output)
}

#[async_trait]
impl Converter for PdfToDocx {
    fn name(&self) -> &'static str {
        "pdf_to_docx"
    }

    async fn convert(&self, input: &Path, output: &Path) -> bool {
        let library = self.library.clone();
        let (src, dst) = (input.to_path_buf(), output.to_path_buf());
        let result =
            run_blocking(move || pdf_to_docx_blocking(library.as_deref(), &src, &dst)).await;
        contain(self.name(), input, result)
    }
}

/// Renders the first page to PNG.
#[derive(Debug, Clone)]
pub struct PdfToImage {
    library: Option<PathBuf>,
    target_width: u32,
}

impl PdfToImage {
    pub fn new(library: Option<PathBuf>, target_width: u32) -> Self {
        Self {
            library,
            target_width,
        }
    }
}

fn pdf_to_png_blocking(
    library: Option<&Path>,
    target_width: u32,
    input: &Path,
    output: &Path,
) -> Result<(), ConverterError> {
    let pdfium = bind(library)?;
    let document = open(&pdfium, input)?;
    let pages = document.pages();
    if pages.len() == 0 {
        return Err(ConverterError::Pdf(format!(
            "'{}' has no pages",
            input.display()
        )));
    }
    let page = pages
        .get(0)
        .map_err(|e| ConverterError::Pdf(format!("page 1: {:?}", e)))?;

    let render_config = PdfRenderConfig::new()
        .set_target_width(target_width as i32)
        .set_maximum_height((target_width as i32).saturating_mul(4));
    let bitmap = page
        .render_with_config(&render_config)
        .map_err(|e| ConverterError::Pdf(format!("render page 1: {:?}", e)))?;

    let image = bitmap.as_image();
    debug!("Rendered page 1 → {}x{} px", image.width(), image.height());
    image.save_with_format(output, ImageFormat::Png)?;
    Ok(())
}

#[async_trait]
impl Converter for PdfToImage {
    fn name(&self) -> &'static str {
        "pdf_to_image"
    }

    async fn convert(&self, input: &Path, output: &Path) -> bool {
        let library = self.library.clone();
        let width = self.target_width;
        let (src, dst) = (input.to_path_buf(), output.to_path_buf());
        let result =
            run_blocking(move || pdf_to_png_blocking(library.as_deref(), width, &src, &dst)).await;
        contain(self.name(), input, result)
    }
}
