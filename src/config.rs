//! Configuration for the conversion gateway.
//!
//! Everything the gateway needs at startup lives in [`GatewayConfig`], built
//! via [`GatewayConfigBuilder`]. The registry binds converters from it once;
//! nothing here is read again per job except through those converters.

use crate::error::GatewayError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration for a [`crate::gateway::Gateway`].
///
/// Built via [`GatewayConfig::builder()`] or using
/// [`GatewayConfig::default()`].
///
/// # Example
/// ```rust
/// use fileconv_gateway::GatewayConfig;
///
/// let config = GatewayConfig::builder()
///     .temp_root("/var/tmp/fileconv")
///     .office_command("soffice")
///     .process_timeout_secs(60)
///     .build()
///     .unwrap();
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// Directory holding every staged upload and conversion output.
    /// Default: `<system temp>/fileconv`.
    pub temp_root: PathBuf,

    /// Office-suite executable used for document transcoding. Default: `libreoffice`.
    pub office_command: String,

    /// OCR executable. Default: `tesseract`.
    pub ocr_command: String,

    /// OCR language code passed as `-l`. Default: `eng`.
    pub ocr_language: String,

    /// Wall-clock limit for any single external process. Default: 120.
    ///
    /// A wedged office process would otherwise hold the user's job (and its
    /// temp files) forever; the child is killed when this elapses.
    pub process_timeout_secs: u64,

    /// Target pixel width when rendering a PDF page to PNG. Range: 200–8000. Default: 1600.
    pub pdf_render_width: u32,

    /// Explicit path to the pdfium shared library.
    /// If None, `PDFIUM_LIB_PATH` is consulted, then the system library.
    pub pdfium_library: Option<PathBuf>,

    /// How long a staged upload may wait for an action. Default: 3600.
    pub session_ttl_secs: u64,

    /// Temp entries older than this with no live owner are deleted by the sweeper.
    /// Must be at least `session_ttl_secs + process_timeout_secs`. Default: 7200.
    pub orphan_max_age_secs: u64,

    /// Interval between sweeper runs. Default: 600.
    pub sweep_interval_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            temp_root: std::env::temp_dir().join("fileconv"),
            office_command: "libreoffice".to_string(),
            ocr_command: "tesseract".to_string(),
            ocr_language: "eng".to_string(),
            process_timeout_secs: 120,
            pdf_render_width: 1600,
            pdfium_library: None,
            session_ttl_secs: 3600,
            orphan_max_age_secs: 7200,
            sweep_interval_secs: 600,
        }
    }
}

impl GatewayConfig {
    /// Create a new builder for `GatewayConfig`.
    pub fn builder() -> GatewayConfigBuilder {
        GatewayConfigBuilder {
            config: Self::default(),
        }
    }

    pub fn process_timeout(&self) -> Duration {
        Duration::from_secs(self.process_timeout_secs)
    }

    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn orphan_max_age(&self) -> Duration {
        Duration::from_secs(self.orphan_max_age_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

/// Builder for [`GatewayConfig`].
#[derive(Debug)]
pub struct GatewayConfigBuilder {
    config: GatewayConfig,
}

impl GatewayConfigBuilder {
    pub fn temp_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.config.temp_root = root.into();
        self
    }

    pub fn office_command(mut self, command: impl Into<String>) -> Self {
        self.config.office_command = command.into();
        self
    }

    pub fn ocr_command(mut self, command: impl Into<String>) -> Self {
        self.config.ocr_command = command.into();
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn process_timeout_secs(mut self, secs: u64) -> Self {
        self.config.process_timeout_secs = secs;
        self
    }

    pub fn pdf_render_width(mut self, px: u32) -> Self {
        self.config.pdf_render_width = px.clamp(200, 8000);
        self
    }

    pub fn pdfium_library(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library = Some(path.into());
        self
    }

    pub fn session_ttl_secs(mut self, secs: u64) -> Self {
        self.config.session_ttl_secs = secs;
        self
    }

    pub fn orphan_max_age_secs(mut self, secs: u64) -> Self {
        self.config.orphan_max_age_secs = secs;
        self
    }

    pub fn sweep_interval_secs(mut self, secs: u64) -> Self {
        self.config.sweep_interval_secs = secs;
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<GatewayConfig, GatewayError> {
        let c = &self.config;
        if c.temp_root.as_os_str().is_empty() {
            return Err(GatewayError::InvalidConfig(
                "temp_root must not be empty".into(),
            ));
        }
        if c.office_command.trim().is_empty() || c.ocr_command.trim().is_empty() {
            return Err(GatewayError::InvalidConfig(
                "office_command and ocr_command must not be empty".into(),
            ));
        }
        if c.process_timeout_secs == 0 {
            return Err(GatewayError::InvalidConfig(
                "process_timeout_secs must be ≥ 1".into(),
            ));
        }
        if c.sweep_interval_secs == 0 {
            return Err(GatewayError::InvalidConfig(
                "sweep_interval_secs must be ≥ 1".into(),
            ));
        }
        // An upload may wait out its TTL and then spend up to one process
        // timeout in conversion before its files are released.
        let min_orphan_age = c.session_ttl_secs.saturating_add(c.process_timeout_secs);
        if c.orphan_max_age_secs < min_orphan_age {
            return Err(GatewayError::InvalidConfig(format!(
                "orphan_max_age_secs ({}) must be ≥ session_ttl_secs + process_timeout_secs ({})",
                c.orphan_max_age_secs, min_orphan_age
            )));
        }
        Ok(self.config)
    }
}
