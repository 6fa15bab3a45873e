//! The chat-transport seam.
//!
//! The gateway never talks to a chat service directly. It reports progress
//! through [`Transport::update_status`] and hands finished files to
//! [`Transport::deliver`]; an adapter for a concrete service (or the console
//! transport in the `fileconv` binary) implements both.
//!
//! Status updates are best effort: a failed update is logged and the job
//! carries on. A failed delivery ends the job as
//! [`crate::gateway::JobOutcome::DeliveryFailed`].

use std::fmt;

use async_trait::async_trait;
use serde::Serialize;

use crate::error::DeliveryError;
use crate::registry::ActionChoice;
use crate::session::{MessageRef, UserId};

/// User-facing progress for one upload or job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum JobStatus {
    Downloading,
    DownloadingImage,
    /// A document was staged; `choices` are the buttons to offer.
    Received {
        filename: String,
        choices: Vec<ActionChoice>,
    },
    ImageReceived {
        choices: Vec<ActionChoice>,
    },
    UploadFailed,
    UnsupportedFormat {
        extension: String,
    },
    NoActiveSession,
    Converting,
    Sending,
    ConversionFailed,
    DeliveryFailed,
}

impl JobStatus {
    /// Menu to attach to the status message, if any.
    pub fn choices(&self) -> &[ActionChoice] {
        match self {
            Self::Received { choices, .. } | Self::ImageReceived { choices } => choices,
            _ => &[],
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(
            self,
            Self::UploadFailed
                | Self::UnsupportedFormat { .. }
                | Self::NoActiveSession
                | Self::ConversionFailed
                | Self::DeliveryFailed
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Downloading => f.write_str("⏳ Downloading file..."),
            Self::DownloadingImage => f.write_str("⏳ Downloading image..."),
            Self::Received { filename, .. } => {
                write!(f, "✅ File '{filename}' received! Choose conversion type:")
            }
            Self::ImageReceived { .. } => f.write_str("✅ Image received! Choose conversion type:"),
            Self::UploadFailed => f.write_str("❌ Could not receive the file. Please send it again."),
            Self::UnsupportedFormat { extension } => write!(
                f,
                "❌ Unsupported format ({extension}). Try PDF, Word, Excel, or Image."
            ),
            Self::NoActiveSession => {
                f.write_str("❌ No active file found. Please upload the file again.")
            }
            Self::Converting => f.write_str("⚙️ Converting file... Please wait."),
            Self::Sending => f.write_str("📤 Conversion complete! Sending file..."),
            Self::ConversionFailed => {
                f.write_str("❌ Conversion failed. Please try again later or check the file.")
            }
            Self::DeliveryFailed => f.write_str("❌ Error sending converted file."),
        }
    }
}

/// A converted file ready to send.
#[derive(Clone, PartialEq, Eq)]
pub struct Artifact {
    /// `<original stem>.<output extension>`
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl Artifact {
    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

impl fmt::Debug for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Artifact")
            .field("filename", &self.filename)
            .field("size", &self.bytes.len())
            .finish()
    }
}

/// Outbound side of a chat service.
///
/// Implementations must be `Send + Sync`: handlers for different users run
/// concurrently and share one transport.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Show `status` on the user's status message.
    async fn update_status(
        &self,
        user: UserId,
        message: &MessageRef,
        status: &JobStatus,
    ) -> Result<(), DeliveryError> {
        let _ = (user, message, status);
        Ok(())
    }

    /// Send the converted file to the user.
    async fn deliver(&self, user: UserId, artifact: Artifact) -> Result<(), DeliveryError>;

    /// Remove the status message once the file has been delivered.
    async fn dismiss(&self, user: UserId, message: &MessageRef) -> Result<(), DeliveryError> {
        let _ = (user, message);
        Ok(())
    }
}
