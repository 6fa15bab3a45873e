//! Action catalogue and converter bindings.
//!
//! [`Category`] and [`Action`] are closed enums: the set of supported
//! conversions is fixed at compile time. [`Registry`] binds each action to a
//! [`Converter`] once, at startup, and is read-only afterwards.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::config::GatewayConfig;
use crate::converters::{
    Converter, ImageToExcel, ImageToPdf, ImageToWord, OfficeConverter, PdfToDocx, PdfToImage,
    TesseractCli, TextRecognizer,
};
use crate::error::GatewayError;
use crate::temp::TempStore;

// ── Categories ───────────────────────────────────────────────────────────────

/// Source-format family detected from an upload's filename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Pdf,
    Word,
    Excel,
    Image,
}

impl Category {
    /// Detect the category from the filename's extension, ignoring case.
    ///
    /// Returns `None` for unknown or missing extensions.
    pub fn detect(filename: &str) -> Option<Self> {
        let ext = Path::new(filename).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "pdf" => Some(Self::Pdf),
            "doc" | "docx" => Some(Self::Word),
            "xls" | "xlsx" => Some(Self::Excel),
            "png" | "jpg" | "jpeg" => Some(Self::Image),
            _ => None,
        }
    }

    /// Actions offered for this category, in menu order.
    pub fn actions(self) -> &'static [Action] {
        match self {
            Self::Pdf => &[Action::PdfToDocx, Action::PdfToImage],
            Self::Word => &[Action::DocxToPdf, Action::DocxToExcel, Action::DocxToImage],
            Self::Excel => &[Action::ExcelToPdf, Action::ExcelToWord],
            Self::Image => &[Action::ImageToPdf, Action::ImageToWord, Action::ImageToExcel],
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Word => "word",
            Self::Excel => "excel",
            Self::Image => "image",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Actions for `filename`, empty when the format is not supported.
pub fn actions_for(filename: &str) -> &'static [Action] {
    Category::detect(filename)
        .map(Category::actions)
        .unwrap_or_default()
}

// ── Actions ──────────────────────────────────────────────────────────────────

/// A supported conversion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    PdfToDocx,
    PdfToImage,
    DocxToPdf,
    DocxToExcel,
    DocxToImage,
    ExcelToPdf,
    ExcelToWord,
    ImageToPdf,
    ImageToWord,
    ImageToExcel,
}

impl Action {
    pub const ALL: [Action; 10] = [
        Action::PdfToDocx,
        Action::PdfToImage,
        Action::DocxToPdf,
        Action::DocxToExcel,
        Action::DocxToImage,
        Action::ExcelToPdf,
        Action::ExcelToWord,
        Action::ImageToPdf,
        Action::ImageToWord,
        Action::ImageToExcel,
    ];

    /// Stable identifier carried in selection events.
    pub fn id(self) -> &'static str {
        match self {
            Self::PdfToDocx => "pdf_to_docx",
            Self::PdfToImage => "pdf_to_image",
            Self::DocxToPdf => "docx_to_pdf",
            Self::DocxToExcel => "docx_to_excel",
            Self::DocxToImage => "docx_to_image",
            Self::ExcelToPdf => "excel_to_pdf",
            Self::ExcelToWord => "excel_to_word",
            Self::ImageToPdf => "image_to_pdf",
            Self::ImageToWord => "image_to_word",
            Self::ImageToExcel => "image_to_excel",
        }
    }

    /// Button text shown to the user.
    pub fn label(self) -> &'static str {
        match self {
            Self::PdfToDocx => "PDF to Word",
            Self::PdfToImage => "PDF to Image (PNG)",
            Self::DocxToPdf => "Word to PDF",
            Self::DocxToExcel => "Word to Excel",
            Self::DocxToImage => "Word to Image",
            Self::ExcelToPdf => "Excel to PDF",
            Self::ExcelToWord => "Excel to Word",
            Self::ImageToPdf => "Image to PDF",
            Self::ImageToWord => "Image to Word",
            Self::ImageToExcel => "Image to Excel",
        }
    }

    /// Extension of the artifact this action produces.
    pub fn output_extension(self) -> &'static str {
        match self {
            Self::PdfToDocx | Self::ExcelToWord | Self::ImageToWord => "docx",
            Self::PdfToImage | Self::DocxToImage => "png",
            Self::DocxToPdf | Self::ExcelToPdf | Self::ImageToPdf => "pdf",
            Self::DocxToExcel | Self::ImageToExcel => "xlsx",
        }
    }

    /// Category whose uploads this action accepts.
    pub fn category(self) -> Category {
        match self {
            Self::PdfToDocx | Self::PdfToImage => Category::Pdf,
            Self::DocxToPdf | Self::DocxToExcel | Self::DocxToImage => Category::Word,
            Self::ExcelToPdf | Self::ExcelToWord => Category::Excel,
            Self::ImageToPdf | Self::ImageToWord | Self::ImageToExcel => Category::Image,
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for Action {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|a| a.id() == s)
            .ok_or_else(|| GatewayError::UnknownAction(s.to_string()))
    }
}

/// One entry of the menu sent to the user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionChoice {
    pub id: String,
    pub label: String,
}

impl From<Action> for ActionChoice {
    fn from(action: Action) -> Self {
        Self {
            id: action.id().to_string(),
            label: action.label().to_string(),
        }
    }
}

// ── Registry ─────────────────────────────────────────────────────────────────

/// A bound action.
#[derive(Clone)]
pub struct RegistryEntry {
    pub converter: Arc<dyn Converter>,
    pub output_extension: &'static str,
}

impl fmt::Debug for RegistryEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistryEntry")
            .field("converter", &self.converter.name())
            .field("output_extension", &self.output_extension)
            .finish()
    }
}

/// Action → converter table.
#[derive(Debug, Clone)]
pub struct Registry {
    entries: HashMap<Action, RegistryEntry>,
}

impl Registry {
    /// Bind the default converter for every action.
    pub fn new(config: &GatewayConfig, temp: &TempStore) -> Self {
        let timeout = config.process_timeout();
        let office = |format: &str| -> Arc<dyn Converter> {
            Arc::new(OfficeConverter::new(
                config.office_command.clone(),
                format,
                timeout,
                temp.clone(),
            ))
        };
        let recognizer: Arc<dyn TextRecognizer> = Arc::new(TesseractCli::new(
            config.ocr_command.clone(),
            config.ocr_language.clone(),
            timeout,
        ));
        let library = config.pdfium_library.clone();

        let mut registry = Self {
            entries: HashMap::with_capacity(Action::ALL.len()),
        };
        for action in Action::ALL {
            let converter: Arc<dyn Converter> = match action {
                Action::PdfToDocx => Arc::new(PdfToDocx::new(library.clone())),
                Action::PdfToImage => {
                    Arc::new(PdfToImage::new(library.clone(), config.pdf_render_width))
                }
                Action::DocxToPdf | Action::ExcelToPdf => office("pdf"),
                Action::DocxToExcel => office("xlsx"),
                Action::DocxToImage => office("png"),
                Action::ExcelToWord => office("docx"),
                Action::ImageToPdf => Arc::new(ImageToPdf),
                Action::ImageToWord => Arc::new(ImageToWord::new(recognizer.clone())),
                Action::ImageToExcel => Arc::new(ImageToExcel::new(recognizer.clone())),
            };
            registry = registry.with_converter(action, converter);
        }
        registry
    }

    /// Replace the converter bound to `action`.
    pub fn with_converter(mut self, action: Action, converter: Arc<dyn Converter>) -> Self {
        self.entries.insert(
            action,
            RegistryEntry {
                converter,
                output_extension: action.output_extension(),
            },
        );
        self
    }

    pub fn lookup(&self, action: Action) -> Option<&RegistryEntry> {
        self.entries.get(&action)
    }

    /// Menu entries for `category`, in order.
    pub fn choices(&self, category: Category) -> Vec<ActionChoice> {
        category
            .actions()
            .iter()
            .filter(|a| self.entries.contains_key(*a))
            .map(|&a| ActionChoice::from(a))
            .collect()
    }
}
