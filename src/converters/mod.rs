//! Converter adapters.
//!
//! Every conversion routine, in-process or out-of-process, is exposed
//! through the same [`Converter`] contract: given an input path and an
//! output path, write the output and report success. Adapter-internal
//! failures are [`ConverterError`]s; they are logged here, at the boundary,
//! and never cross it.
//!
//! | Module | Actions |
//! |--------|---------|
//! | [`office`] | `docx_to_pdf`, `docx_to_excel`, `docx_to_image`, `excel_to_pdf`, `excel_to_word` |
//! | [`pdf`] | `pdf_to_docx`, `pdf_to_image` |
//! | [`image`] | `image_to_pdf` |
//! | [`ocr`] | `image_to_word`, `image_to_excel` |

pub mod image;
pub mod ocr;
pub mod office;
pub mod ooxml;
pub mod pdf;
pub mod tool;

use std::path::Path;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::error::ConverterError;

pub use self::image::ImageToPdf;
pub use ocr::{ImageToExcel, ImageToWord, TesseractCli, TextRecognizer};
pub use office::OfficeConverter;
pub use pdf::{PdfToDocx, PdfToImage};

/// A conversion routine with a boolean outcome.
///
/// Implementations must not panic past this boundary and must leave
/// `output` either complete or absent-or-garbage; the caller only trusts
/// `output` when `true` is returned.
#[async_trait]
pub trait Converter: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Convert `input` into `output`.
    async fn convert(&self, input: &Path, output: &Path) -> bool;
}

/// Reduce an adapter result to the boolean contract, logging the failure.
pub(crate) fn contain(name: &str, input: &Path, result: Result<(), ConverterError>) -> bool {
    match result {
        Ok(()) => {
            debug!(converter = name, input = %input.display(), "Conversion succeeded");
            true
        }
        Err(e) => {
            warn!(converter = name, input = %input.display(), "Conversion failed: {}", e);
            false
        }
    }
}

/// Run CPU-bound library work off the async workers.
///
/// A panic inside `f` surfaces as [`ConverterError::TaskAborted`].
pub(crate) async fn run_blocking<F, T>(f: F) -> Result<T, ConverterError>
where
    F: FnOnce() -> Result<T, ConverterError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConverterError::TaskAborted(e.to_string()))?
}
