//! The job orchestrator.
//!
//! A [`Gateway`] turns transport events into conversion jobs:
//!
//! ```text
//! Idle ──upload──▶ AwaitingAction ──select──▶ Converting ──▶ Completed
//!                        │                         └───────▶ Failed
//!                        └── new upload replaces the staged file
//! ```
//!
//! Each user has at most one staged upload. Selecting an action removes it
//! from the session store in one atomic step, so two concurrent selections
//! for the same user can never both run. Every temp file a job touches is
//! owned by a [`ScratchFiles`] guard and is gone when the handler returns,
//! whatever the outcome.
//!
//! `Gateway` is a cheap `Arc` clone; spawn one task per inbound event.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tokio::io::{AsyncRead, AsyncWriteExt};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::GatewayConfig;
use crate::error::GatewayError;
use crate::registry::{Action, ActionChoice, Category, Registry, RegistryEntry};
use crate::session::{MessageRef, SessionEntry, SessionStore, UserId};
use crate::temp::{ScratchFiles, TempStore};
use crate::transport::{Artifact, JobStatus, Transport};

/// Name given to photo uploads, which arrive without one.
pub const PHOTO_FILENAME: &str = "image.jpg";

/// Lifecycle of one user's job, for logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobState {
    Idle,
    AwaitingAction,
    Converting,
    Completed,
    Failed,
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Idle => "idle",
            Self::AwaitingAction => "awaiting_action",
            Self::Converting => "converting",
            Self::Completed => "completed",
            Self::Failed => "failed",
        })
    }
}

/// Result of a successful upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Staged {
    pub category: Category,
    pub choices: Vec<ActionChoice>,
}

/// How a job ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    /// The artifact was handed to the transport.
    Delivered { filename: String, size: u64 },
    /// The converter reported failure or its output was unreadable.
    ConversionFailed,
    /// Conversion succeeded but the transport could not send the result.
    DeliveryFailed { reason: String },
}

impl JobOutcome {
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Counts from one maintenance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub sessions_evicted: usize,
    pub files_removed: usize,
}

struct Inner {
    config: GatewayConfig,
    temp: TempStore,
    registry: Registry,
    sessions: SessionStore,
    transport: Arc<dyn Transport>,
}

/// Conversion gateway. See the [module docs](self).
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<Inner>,
}

impl fmt::Debug for Gateway {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Gateway")
            .field("temp_root", &self.inner.temp.root())
            .field("sessions", &self.inner.sessions.len())
            .finish()
    }
}

impl Gateway {
    /// Create a gateway with the default converter for every action.
    pub fn new(config: GatewayConfig, transport: Arc<dyn Transport>) -> Self {
        let temp = TempStore::new(&config.temp_root);
        let registry = Registry::new(&config, &temp);
        Self::from_parts(config, temp, registry, transport)
    }

    /// Create a gateway with a customised registry.
    ///
    /// `build_registry` receives the default registry bound from `config`;
    /// use [`Registry::with_converter`] to swap individual converters.
    pub fn with_registry<F>(
        config: GatewayConfig,
        transport: Arc<dyn Transport>,
        build_registry: F,
    ) -> Self
    where
        F: FnOnce(Registry) -> Registry,
    {
        let temp = TempStore::new(&config.temp_root);
        let registry = build_registry(Registry::new(&config, &temp));
        Self::from_parts(config, temp, registry, transport)
    }

    fn from_parts(
        config: GatewayConfig,
        temp: TempStore,
        registry: Registry,
        transport: Arc<dyn Transport>,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                temp,
                registry,
                sessions: SessionStore::new(),
                transport,
            }),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.inner.config
    }

    pub fn temp(&self) -> &TempStore {
        &self.inner.temp
    }

    pub fn registry(&self) -> &Registry {
        &self.inner.registry
    }

    pub fn sessions(&self) -> &SessionStore {
        &self.inner.sessions
    }

    /// Menu for `filename`, empty when the format is unsupported.
    pub fn choices_for(&self, filename: &str) -> Vec<ActionChoice> {
        Category::detect(filename)
            .map(|c| self.inner.registry.choices(c))
            .unwrap_or_default()
    }

    // ── Events ───────────────────────────────────────────────────────────

    /// A document arrived. Stage it and offer the actions for its format.
    pub async fn on_file_received<R>(
        &self,
        user: UserId,
        message: MessageRef,
        reader: R,
        filename: &str,
    ) -> Result<Staged, GatewayError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let Some(category) = Category::detect(filename) else {
            let extension = dotted_extension(filename);
            warn!(user, filename, "Rejected upload with unsupported format");
            self.notify(
                user,
                &message,
                &JobStatus::UnsupportedFormat {
                    extension: extension.clone(),
                },
            )
            .await;
            return Err(GatewayError::UnsupportedFormat { extension });
        };

        self.notify(user, &message, &JobStatus::Downloading).await;
        let staged = self
            .stage(user, message.clone(), reader, filename, category)
            .await?;
        self.notify(
            user,
            &message,
            &JobStatus::Received {
                filename: filename.to_string(),
                choices: staged.choices.clone(),
            },
        )
        .await;
        Ok(staged)
    }

    /// A photo arrived. Photos carry no filename and are staged as
    /// [`PHOTO_FILENAME`].
    pub async fn on_photo_received<R>(
        &self,
        user: UserId,
        message: MessageRef,
        reader: R,
    ) -> Result<Staged, GatewayError>
    where
        R: AsyncRead + Unpin + Send,
    {
        self.notify(user, &message, &JobStatus::DownloadingImage).await;
        let staged = self
            .stage(user, message.clone(), reader, PHOTO_FILENAME, Category::Image)
            .await?;
        self.notify(
            user,
            &message,
            &JobStatus::ImageReceived {
                choices: staged.choices.clone(),
            },
        )
        .await;
        Ok(staged)
    }

    /// The user picked an action for their staged upload. Runs the job to
    /// completion.
    ///
    /// Unknown actions are rejected before the session is touched, and an
    /// action for another category puts the session back; both report
    /// [`JobStatus::ConversionFailed`] on `message`. Once the session is
    /// taken, the input and output files are released on every path, and a
    /// maintenance sweep leaves them alone while the job runs.
    pub async fn on_action_selected(
        &self,
        user: UserId,
        message: MessageRef,
        action_id: &str,
    ) -> Result<JobOutcome, GatewayError> {
        let bound = match action_id.parse::<Action>() {
            Ok(action) => self
                .inner
                .registry
                .lookup(action)
                .cloned()
                .map(|bound| (action, bound)),
            Err(_) => None,
        };
        let Some((action, bound)) = bound else {
            warn!(user, action_id, "Rejected unknown action");
            self.notify(user, &message, &JobStatus::ConversionFailed).await;
            return Err(GatewayError::UnknownAction(action_id.to_string()));
        };

        let Some(entry) = self.inner.sessions.take(user) else {
            info!(user, %action, state = %JobState::Idle, "Action selected with no staged upload");
            self.notify(user, &message, &JobStatus::NoActiveSession).await;
            return Err(GatewayError::NoActiveSession { user });
        };

        if action.category() != entry.category {
            let category = entry.category;
            warn!(user, %action, %category, "Action does not apply to staged upload");
            if let Some(stale) = self.inner.sessions.restore(user, entry) {
                self.inner.temp.release(&[Some(&stale.input_path)]).await;
            }
            self.notify(user, &message, &JobStatus::ConversionFailed).await;
            return Err(GatewayError::ActionNotApplicable {
                action: action.id().to_string(),
                category: category.to_string(),
            });
        }

        let mut files = ScratchFiles::new(&self.inner.temp);
        files.adopt(entry.input_path.clone());
        let outcome = self.run_job(user, action, &bound, &entry, &mut files).await;
        files.release().await;
        Ok(outcome)
    }

    /// Drop the user's staged upload, if any. Returns whether one existed.
    pub async fn cancel(&self, user: UserId) -> bool {
        match self.inner.sessions.take(user) {
            Some(entry) => {
                debug!(user, filename = %entry.original_filename, "Cancelled staged upload");
                self.inner.temp.release(&[Some(&entry.input_path)]).await;
                true
            }
            None => false,
        }
    }

    // ── Maintenance ──────────────────────────────────────────────────────

    /// Evict expired sessions, then delete orphaned temp entries.
    pub async fn sweep_once(&self) -> SweepReport {
        let evicted = self
            .inner
            .sessions
            .evict_older_than(self.inner.config.session_ttl());
        for (user, entry) in &evicted {
            info!(user, filename = %entry.original_filename, "Evicted expired upload");
        }
        let paths: Vec<_> = evicted.iter().map(|(_, e)| Some(&e.input_path)).collect();
        self.inner.temp.release(&paths).await;

        let keep = self.inner.sessions.live_paths();
        let files_removed = self
            .inner
            .temp
            .sweep(self.inner.config.orphan_max_age(), &keep)
            .await;

        SweepReport {
            sessions_evicted: evicted.len(),
            files_removed,
        }
    }

    /// Run [`Gateway::sweep_once`] every `sweep_interval` until the returned
    /// handle is aborted.
    pub fn spawn_sweeper(&self) -> JoinHandle<()> {
        let gateway = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(gateway.config().sweep_interval());
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // The first tick completes immediately.
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let report = gateway.sweep_once().await;
                debug!(
                    sessions_evicted = report.sessions_evicted,
                    files_removed = report.files_removed,
                    "Maintenance sweep finished"
                );
            }
        })
    }

    // ── Internals ────────────────────────────────────────────────────────

    async fn stage<R>(
        &self,
        user: UserId,
        message: MessageRef,
        reader: R,
        filename: &str,
        category: Category,
    ) -> Result<Staged, GatewayError>
    where
        R: AsyncRead + Unpin + Send,
    {
        let extension = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let input_path = match self.inner.temp.allocate(&extension).await {
            Ok(path) => path,
            Err(source) => {
                error!(user, "Could not allocate temp path: {}", source);
                self.notify(user, &message, &JobStatus::UploadFailed).await;
                return Err(GatewayError::TempStorage {
                    path: self.inner.temp.root().to_path_buf(),
                    source,
                });
            }
        };

        let mut guard = ScratchFiles::new(&self.inner.temp);
        guard.adopt(input_path.clone());
        let bytes = match write_upload(&input_path, reader).await {
            Ok(bytes) => bytes,
            Err(source) => {
                error!(user, path = %input_path.display(), "Failed to store upload: {}", source);
                guard.release().await;
                self.notify(user, &message, &JobStatus::UploadFailed).await;
                return Err(GatewayError::TempStorage {
                    path: input_path,
                    source,
                });
            }
        };

        // The session owns the file from here on.
        let entry = SessionEntry::new(input_path, filename, category, message);
        let replaced = self.inner.sessions.stage(user, entry);
        let _ = guard.keep();
        if let Some(previous) = replaced {
            info!(
                user,
                previous = %previous.original_filename,
                "New upload replaces staged file"
            );
            self.inner.temp.release(&[Some(&previous.input_path)]).await;
        }

        info!(
            user,
            filename,
            %category,
            bytes,
            state = %JobState::AwaitingAction,
            "Upload staged"
        );
        Ok(Staged {
            category,
            choices: self.inner.registry.choices(category),
        })
    }

    async fn run_job(
        &self,
        user: UserId,
        action: Action,
        bound: &RegistryEntry,
        entry: &SessionEntry,
        files: &mut ScratchFiles,
    ) -> JobOutcome {
        let message = &entry.pending_message_ref;

        let output_path = match self.inner.temp.allocate(bound.output_extension).await {
            Ok(path) => path,
            Err(e) => {
                error!(user, %action, "Could not allocate output path: {}", e);
                return self.fail(user, message, action).await;
            }
        };
        files.adopt(output_path.clone());

        self.notify(user, message, &JobStatus::Converting).await;
        info!(
            user,
            %action,
            converter = bound.converter.name(),
            state = %JobState::Converting,
            "Starting conversion"
        );
        let start = Instant::now();
        let converted = bound
            .converter
            .convert(&entry.input_path, &output_path)
            .await;
        let elapsed_ms = start.elapsed().as_millis() as u64;

        if !converted {
            warn!(user, %action, elapsed_ms, "Converter reported failure");
            return self.fail(user, message, action).await;
        }

        let bytes = match tokio::fs::read(&output_path).await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(user, %action, path = %output_path.display(), "Converted output unreadable: {}", e);
                return self.fail(user, message, action).await;
            }
        };

        self.notify(user, message, &JobStatus::Sending).await;
        let filename = result_filename(&entry.original_filename, bound.output_extension);
        let size = bytes.len() as u64;
        let artifact = Artifact {
            filename: filename.clone(),
            bytes,
        };

        match self.inner.transport.deliver(user, artifact).await {
            Ok(()) => {
                if let Err(e) = self.inner.transport.dismiss(user, message).await {
                    debug!(user, "Could not dismiss status message: {}", e);
                }
                info!(
                    user,
                    %action,
                    %filename,
                    size,
                    elapsed_ms,
                    state = %JobState::Completed,
                    "Converted file delivered"
                );
                JobOutcome::Delivered { filename, size }
            }
            Err(e) => {
                error!(user, %action, %filename, "Error sending converted file: {}", e);
                self.notify(user, message, &JobStatus::DeliveryFailed).await;
                JobOutcome::DeliveryFailed { reason: e.reason }
            }
        }
    }

    async fn fail(&self, user: UserId, message: &MessageRef, action: Action) -> JobOutcome {
        info!(user, %action, state = %JobState::Failed, "Conversion failed");
        self.notify(user, message, &JobStatus::ConversionFailed).await;
        JobOutcome::ConversionFailed
    }

    async fn notify(&self, user: UserId, message: &MessageRef, status: &JobStatus) {
        if let Err(e) = self
            .inner
            .transport
            .update_status(user, message, status)
            .await
        {
            warn!(user, %message, "Status update failed: {}", e);
        }
    }
}

/// Stream `reader` into a new file at `path`, returning the byte count.
async fn write_upload<R>(path: &Path, mut reader: R) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
{
    let mut file = tokio::fs::File::create(path).await?;
    let bytes = tokio::io::copy(&mut reader, &mut file).await?;
    file.flush().await?;
    Ok(bytes)
}

/// `.ext` of `filename` in lower case, or empty when it has none.
fn dotted_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| format!(".{}", e.to_ascii_lowercase()))
        .unwrap_or_default()
}

/// `<stem of original>.<extension>`.
fn result_filename(original: &str, extension: &str) -> String {
    let stem = Path::new(original)
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or(original);
    format!("{stem}.{extension}")
}
