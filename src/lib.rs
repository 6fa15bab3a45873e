//! # fileconv-gateway
//!
//! A conversational file-conversion gateway: a user uploads a document or
//! image, picks a target format from a menu, and gets the converted file
//! back.
//!
//! The crate is the job-orchestration core. It knows nothing about any chat
//! service; a [`Transport`] implementation receives status updates and the
//! finished [`Artifact`].
//!
//! ## Job flow
//!
//! ```text
//! upload
//!  │
//!  ├─ 1. Detect   category from the declared extension (pdf/word/excel/image)
//!  ├─ 2. Stage    stream bytes to <temp_root>/<uuid>.<ext>, record session
//!  ├─ 3. Offer    ordered actions for the category
//!  │
//! select
//!  │
//!  ├─ 4. Take     session removed atomically (one job per user)
//!  ├─ 5. Convert  in-process (pdfium, lopdf, OOXML writer) or
//!  │              out-of-process (LibreOffice, tesseract) adapter
//!  ├─ 6. Deliver  <original stem>.<ext> through the transport
//!  └─ 7. Release  input and output temp files, on every path
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use async_trait::async_trait;
//! use fileconv_gateway::{
//!     Artifact, DeliveryError, Gateway, GatewayConfig, MessageRef, Transport, UserId,
//! };
//!
//! struct Outbox;
//!
//! #[async_trait]
//! impl Transport for Outbox {
//!     async fn deliver(&self, _user: UserId, artifact: Artifact) -> Result<(), DeliveryError> {
//!         std::fs::write(&artifact.filename, &artifact.bytes)
//!             .map_err(|e| DeliveryError::new(e.to_string()))
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let gateway = Gateway::new(GatewayConfig::builder().build()?, Arc::new(Outbox));
//!     let bytes = std::fs::read("photo.png")?;
//!
//!     let staged = gateway
//!         .on_file_received(1, MessageRef::new("m1"), bytes.as_slice(), "photo.png")
//!         .await?;
//!     println!("{:?}", staged.choices);
//!
//!     let outcome = gateway
//!         .on_action_selected(1, MessageRef::new("m1"), "image_to_pdf")
//!         .await?;
//!     println!("{outcome:?}");
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `fileconv` binary (clap + anyhow + indicatif + tracing-subscriber) |
//!
//! ## External tools
//!
//! | Actions | Needs |
//! |---------|-------|
//! | `pdf_to_docx`, `pdf_to_image` | pdfium shared library |
//! | `docx_to_*`, `excel_to_*` | `libreoffice` on `PATH` |
//! | `image_to_word`, `image_to_excel` | `tesseract` on `PATH` |
//! | `image_to_pdf` | nothing |

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod converters;
pub mod error;
pub mod gateway;
pub mod registry;
pub mod session;
pub mod temp;
pub mod transport;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{GatewayConfig, GatewayConfigBuilder};
pub use converters::Converter;
pub use error::{ConverterError, DeliveryError, GatewayError};
pub use gateway::{Gateway, JobOutcome, JobState, Staged, SweepReport, PHOTO_FILENAME};
pub use registry::{actions_for, Action, ActionChoice, Category, Registry};
pub use session::{MessageRef, UserId};
pub use temp::{ScratchFiles, TempStore};
pub use transport::{Artifact, JobStatus, Transport};
