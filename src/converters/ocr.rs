//! OCR-backed adapters: image → Word and image → Excel.
//!
//! Text recognition sits behind [`TextRecognizer`] so the document-building
//! half can be exercised without an OCR engine installed. The production
//! recognizer shells out to the `tesseract` CLI.

use std::ffi::OsStr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use super::ooxml::{DocxBuilder, EmbeddedImage, XlsxBuilder};
use super::tool::{find_on_path, run_tool};
use super::{contain, run_blocking, Converter};
use crate::error::ConverterError;

const WORD_PLACEHOLDER: &str = "No text could be extracted from the image. Embedded image below:";
const EXCEL_PLACEHOLDER: &str = "No text extracted from image.";
const PICTURE_WIDTH_INCHES: f64 = 6.0;

/// Two or more whitespace characters, or a tab.
static COLUMN_SEPARATOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s{2,}|\t").unwrap());

/// Recognises the text in an image file.
#[async_trait]
pub trait TextRecognizer: Send + Sync {
    /// Fails fast with [`ConverterError::ToolMissing`] when the engine is
    /// not installed. An image without text yields an empty string.
    async fn recognize(&self, image: &Path) -> Result<String, ConverterError>;
}

/// Tesseract invoked as `tesseract <image> stdout -l <language>`.
#[derive(Debug, Clone)]
pub struct TesseractCli {
    command: String,
    language: String,
    timeout: Duration,
}

impl TesseractCli {
    pub fn new(command: impl Into<String>, language: impl Into<String>, timeout: Duration) -> Self {
        Self {
            command: command.into(),
            language: language.into(),
            timeout,
        }
    }
}

#[async_trait]
impl TextRecognizer for TesseractCli {
    async fn recognize(&self, image: &Path) -> Result<String, ConverterError> {
        if find_on_path(&self.command).is_none() {
            return Err(ConverterError::ToolMissing(self.command.clone()));
        }
        let args = [
            image.as_os_str(),
            OsStr::new("stdout"),
            OsStr::new("-l"),
            OsStr::new(&self.language),
        ];
        let output = run_tool(&self.command, args, self.timeout).await?;
        let text = String::from_utf8_lossy(&output.stdout).into_owned();
        debug!(chars = text.len(), "OCR finished");
        Ok(text)
    }
}

/// Split one OCR line into trimmed cells.
pub fn split_columns(line: &str) -> Vec<String> {
    COLUMN_SEPARATOR
        .split(line)
        .map(|cell| cell.trim().to_string())
        .collect()
}

/// OCR text into a Word document; pictures without text are embedded
/// under a note instead.
#[derive(Clone)]
pub struct ImageToWord {
    recognizer: Arc<dyn TextRecognizer>,
}

impl ImageToWord {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    async fn run(&self, input: &Path, output: &Path) -> Result<(), ConverterError> {
        let text = self.recognizer.recognize(input).await?;
        let (src, dst) = (input.to_path_buf(), output.to_path_buf());
        run_blocking(move || write_word(&text, &src, &dst)).await
    }
}

fn write_word(text: &str, input: &Path, output: &Path) -> Result<(), ConverterError> {
    let mut docx = DocxBuilder::new();
    if text.trim().is_empty() {
        docx.paragraph(WORD_PLACEHOLDER)
            .picture(EmbeddedImage::from_path(input)?, PICTURE_WIDTH_INCHES);
    } else {
        for line in text.lines() {
            docx.paragraph(line);
        }
    }
    docx.write(output)
}

#[async_trait]
impl Converter for ImageToWord {
    fn name(&self) -> &'static str {
        "image_to_word"
    }

    async fn convert(&self, input: &Path, output: &Path) -> bool {
        let result = self.run(input, output).await;
        contain(self.name(), input, result)
    }
}

/// OCR text into a spreadsheet, one row per non-blank line.
#[derive(Clone)]
pub struct ImageToExcel {
    recognizer: Arc<dyn TextRecognizer>,
}

impl ImageToExcel {
    pub fn new(recognizer: Arc<dyn TextRecognizer>) -> Self {
        Self { recognizer }
    }

    async fn run(&self, input: &Path, output: &Path) -> Result<(), ConverterError> {
        let text = self.recognizer.recognize(input).await?;
        let (src, dst) = (input.to_path_buf(), output.to_path_buf());
        run_blocking(move || write_excel(&text, &src, &dst)).await
    }
}

fn write_excel(text: &str, input: &Path, output: &Path) -> Result<(), ConverterError> {
    let mut book = XlsxBuilder::new();
    for line in text.lines().filter(|l| !l.trim().is_empty()) {
        book.row(split_columns(line));
    }
    if book.row_count() == 0 {
        book.row([EXCEL_PLACEHOLDER])
            .picture_at(1, EmbeddedImage::from_path(input)?);
    }
    book.write(output)
}

#[async_trait]
impl Converter for ImageToExcel {
    fn name(&self) -> &'static str {
        "image_to_excel"
    }

    async fn convert(&self, input: &Path, output: &Path) -> bool {
        let result = self.run(input, output).await;
        contain(self.name(), input, result)
    }
}
