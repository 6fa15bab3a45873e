//! Error types for the fileconv-gateway library.
//!
//! Three error types mirror the three places a job can go wrong:
//!
//! * [`GatewayError`] — orchestrator-level conditions surfaced to the
//!   transport layer as structured kinds (unsupported format, no staged
//!   upload, unknown action). Returned as `Err(GatewayError)` from the
//!   [`crate::gateway::Gateway`] event handlers.
//!
//! * [`ConverterError`] — failures *inside* a converter adapter (tool
//!   missing, process crashed, malformed input). These never cross the
//!   adapter boundary: each adapter logs them and reports `false`.
//!
//! * [`DeliveryError`] — the transport could not send a status update or
//!   the finished artifact. Delivery failures are reported separately from
//!   conversion failures so a retry does not re-run the conversion.

use std::path::PathBuf;
use thiserror::Error;

/// Structured errors returned by the job orchestrator.
#[derive(Debug, Error)]
pub enum GatewayError {
    // ── Upload errors ─────────────────────────────────────────────────────
    /// The declared filename has no extension in any known category.
    #[error("Unsupported format ({extension}). Try PDF, Word, Excel, or Image.")]
    UnsupportedFormat { extension: String },

    /// The uploaded bytes could not be staged in temporary storage.
    #[error("Failed to stage upload at '{path}': {source}")]
    TempStorage {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── Selection errors ──────────────────────────────────────────────────
    /// An action was selected but no upload is staged for the user
    /// (expired, already consumed, or never uploaded).
    #[error("No active file found for user {user}. Please upload the file again.")]
    NoActiveSession { user: i64 },

    /// The action identifier is not one the registry knows.
    #[error("Unknown conversion action '{0}'")]
    UnknownAction(String),

    /// The action exists but does not apply to the staged file's category.
    #[error("Action '{action}' cannot be applied to a {category} file")]
    ActionNotApplicable { action: String, category: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// A failure inside a single converter adapter.
///
/// Logged at the adapter boundary and then reduced to a `false` return.
#[derive(Debug, Error)]
pub enum ConverterError {
    /// A required external program is not on the system `PATH`.
    #[error("'{0}' is not installed or not on PATH")]
    ToolMissing(String),

    /// The external program exited unsuccessfully.
    #[error("'{command}' failed with exit code {code:?}: {stderr}")]
    ProcessFailed {
        command: String,
        code: Option<i32>,
        stderr: String,
    },

    /// The external program exceeded the configured timeout and was killed.
    #[error("'{command}' timed out after {secs}s")]
    Timeout { command: String, secs: u64 },

    /// The tool reported success but the artifact it should have written
    /// is not there.
    #[error("Expected output '{0}' was not produced")]
    OutputMissing(PathBuf),

    /// pdfium could not be bound, or rejected the document.
    #[error("PDF engine error: {0}")]
    Pdf(String),

    /// Image decoding or encoding failed.
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    /// Writing the PDF container failed.
    #[error("PDF writer error: {0}")]
    PdfWrite(#[from] lopdf::Error),

    /// Writing the OOXML (zip) container failed.
    #[error("Archive error: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// File-system error while reading input or writing output.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A blocking conversion task panicked or was cancelled.
    #[error("Conversion task aborted: {0}")]
    TaskAborted(String),
}

/// The transport failed to deliver a status update or an artifact.
#[derive(Debug, Clone, Error, serde::Serialize, serde::Deserialize)]
#[error("Delivery failed: {reason}")]
pub struct DeliveryError {
    pub reason: String,
}

impl DeliveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_display() {
        let e = GatewayError::UnsupportedFormat {
            extension: ".txt".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains(".txt"), "got: {msg}");
        assert!(msg.contains("PDF, Word, Excel, or Image"));
    }

    #[test]
    fn no_active_session_display() {
        let e = GatewayError::NoActiveSession { user: 42 };
        assert!(e.to_string().contains("upload the file again"));
    }

    #[test]
    fn process_failed_display() {
        let e = ConverterError::ProcessFailed {
            command: "libreoffice".into(),
            code: Some(77),
            stderr: "source file could not be loaded".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("libreoffice"));
        assert!(msg.contains("77"));
        assert!(msg.contains("could not be loaded"));
    }

    #[test]
    fn timeout_display() {
        let e = ConverterError::Timeout {
            command: "tesseract".into(),
            secs: 30,
        };
        assert!(e.to_string().contains("30s"));
    }

    #[test]
    fn delivery_error_display() {
        let e = DeliveryError::new("connection reset");
        assert_eq!(e.to_string(), "Delivery failed: connection reset");
    }
}
