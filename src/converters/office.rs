//! Document transcoding through a headless office suite.
//!
//! One [`OfficeConverter`] per target format. Each call runs the office
//! binary in a fresh scratch directory with its own output folder and user
//! profile, so two jobs whose inputs share a basename never see each
//! other's results and never fight over the profile lock.

use std::ffi::OsString;
use std::io;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;
use url::Url;

use super::tool::{find_on_path, run_tool};
use super::{contain, Converter};
use crate::error::ConverterError;
use crate::temp::TempStore;

/// Out-of-process converter backed by LibreOffice (or a compatible CLI).
#[derive(Debug, Clone)]
pub struct OfficeConverter {
    command: String,
    target_format: String,
    timeout: Duration,
    temp: TempStore,
}

impl OfficeConverter {
    /// `target_format` is passed to `--convert-to` verbatim and may carry a
    /// filter suffix, e.g. `pdf:writer_pdf_Export`.
    pub fn new(
        command: impl Into<String>,
        target_format: impl Into<String>,
        timeout: Duration,
        temp: TempStore,
    ) -> Self {
        Self {
            command: command.into(),
            target_format: target_format.into(),
            timeout,
            temp,
        }
    }

    pub fn target_format(&self) -> &str {
        &self.target_format
    }

    /// Extension of the file the office suite writes for `target_format`.
    fn produced_extension(&self) -> &str {
        self.target_format
            .split(':')
            .next()
            .unwrap_or(&self.target_format)
    }

    async fn transcode(&self, input: &Path, output: &Path) -> Result<(), ConverterError> {
        if find_on_path(&self.command).is_none() {
            return Err(ConverterError::ToolMissing(self.command.clone()));
        }

        let scratch = self.temp.scratch_dir().await?;
        let out_dir = scratch.path().join("out");
        let profile = scratch.path().join("profile");
        tokio::fs::create_dir_all(&out_dir).await?;

        let profile_arg = OsString::from(format!("-env:UserInstallation={}", profile_url(&profile)?));

        let args: Vec<OsString> = vec![
            "--headless".into(),
            "--norestore".into(),
            profile_arg,
            "--convert-to".into(),
            self.target_format.clone().into(),
            "--outdir".into(),
            out_dir.clone().into_os_string(),
            input.as_os_str().to_owned(),
        ];
        run_tool(&self.command, &args, self.timeout).await?;

        let stem = input.file_stem().unwrap_or_default();
        let mut produced_name = stem.to_os_string();
        produced_name.push(".");
        produced_name.push(self.produced_extension());
        let produced = out_dir.join(produced_name);

        if !tokio::fs::try_exists(&produced).await.unwrap_or(false) {
            return Err(ConverterError::OutputMissing(produced));
        }
        debug!(produced = %produced.display(), output = %output.display(), "Relocating office output");
        move_into_place(&produced, output).await
    }
}

#[async_trait]
impl Converter for OfficeConverter {
    fn name(&self) -> &'static str {
        "office"
    }

    async fn convert(&self, input: &Path, output: &Path) -> bool {
        let result = self.transcode(input, output).await;
        contain(self.name(), input, result)
    }
}

/// Percent-encoded `file://` URL for the profile directory `dir`.
fn profile_url(dir: &Path) -> Result<String, ConverterError> {
    Url::from_file_path(dir).map(String::from).map_err(|()| {
        ConverterError::Io(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("profile path is not absolute: {}", dir.display()),
        ))
    })
}

/// Move `from` over `to` with a single rename. Falls back to copy-and-delete
/// when the two paths are on different filesystems.
async fn move_into_place(from: &Path, to: &Path) -> Result<(), ConverterError> {
    if tokio::fs::rename(from, to).await.is_ok() {
        return Ok(());
    }
    if let Err(e) = tokio::fs::copy(from, to).await {
        // Never leave a truncated result behind.
        let _ = tokio::fs::remove_file(to).await;
        return Err(e.into());
    }
    // The scratch directory is removed afterwards regardless.
    let _ = tokio::fs::remove_file(from).await;
    Ok(())
}
