//! Temporary file management.
//!
//! Every staged upload and every conversion output lives under one
//! process-wide root as `<uuid-v4>.<ext>`. Paths are handed out by name only;
//! the owner creates the file. Deletion never fails the caller: a file that
//! cannot be removed is logged and left for the sweeper.

use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use dashmap::DashSet;
use futures::future::join_all;
use tempfile::TempDir;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Allocator and janitor for the gateway's temp directory.
///
/// Clones share the set of paths claimed by running jobs, which
/// [`TempStore::sweep`] never touches.
#[derive(Debug, Clone)]
pub struct TempStore {
    root: PathBuf,
    claimed: Arc<DashSet<PathBuf>>,
}

impl TempStore {
    /// Create a store rooted at `root`.
    ///
    /// Relative roots are resolved against the current directory so every
    /// allocated path is absolute.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let root = if root.is_absolute() {
            root
        } else {
            std::env::current_dir()
                .map(|cwd| cwd.join(&root))
                .unwrap_or(root)
        };
        Self {
            root,
            claimed: Arc::new(DashSet::new()),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Number of paths currently held by [`ScratchFiles`] guards.
    pub fn claimed(&self) -> usize {
        self.claimed.len()
    }

    /// Reserve a fresh path ending in `.{extension}`.
    ///
    /// Creates the root directory if needed; `create_dir_all` tolerates a
    /// concurrent creator. No file is created.
    pub async fn allocate(&self, extension: &str) -> io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.root).await?;
        let extension = extension.trim_start_matches('.');
        let name = if extension.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            format!("{}.{}", Uuid::new_v4(), extension)
        };
        let path = self.root.join(name);
        debug!(path = %path.display(), "Allocated temp path");
        Ok(path)
    }

    /// Create an isolated directory under the root, deleted when dropped.
    ///
    /// Used to give each external process its own output directory.
    pub async fn scratch_dir(&self) -> io::Result<TempDir> {
        tokio::fs::create_dir_all(&self.root).await?;
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || {
            tempfile::Builder::new().prefix("job-").tempdir_in(root)
        })
        .await
        .map_err(io::Error::other)?
    }

    /// Delete every given path that exists.
    ///
    /// `None`, empty, and already-deleted paths are skipped. Failures are
    /// logged and swallowed.
    pub async fn release<P: AsRef<Path>>(&self, paths: &[Option<P>]) {
        let removals = paths
            .iter()
            .flatten()
            .map(|p| p.as_ref())
            .filter(|p| !p.as_os_str().is_empty())
            .map(remove_quietly);
        join_all(removals).await;
    }

    /// Delete root entries older than `max_age`, except those in `keep` and
    /// those claimed by a live [`ScratchFiles`].
    ///
    /// Returns how many entries were removed.
    pub async fn sweep(&self, max_age: Duration, keep: &HashSet<PathBuf>) -> usize {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return 0,
            Err(e) => {
                warn!(root = %self.root.display(), "Temp sweep could not list root: {}", e);
                return 0;
            }
        };

        let now = SystemTime::now();
        let mut removed = 0;
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(e) => {
                    warn!("Temp sweep aborted mid-listing: {}", e);
                    break;
                }
            };
            let path = entry.path();
            if keep.contains(&path) || self.claimed.contains(&path) {
                continue;
            }
            let Ok(meta) = entry.metadata().await else {
                continue;
            };
            let age = meta
                .modified()
                .ok()
                .and_then(|m| now.duration_since(m).ok())
                .unwrap_or_default();
            if age < max_age {
                continue;
            }

            let result = if meta.is_dir() {
                tokio::fs::remove_dir_all(&path).await
            } else {
                tokio::fs::remove_file(&path).await
            };
            match result {
                Ok(()) => {
                    debug!(path = %path.display(), age_secs = age.as_secs(), "Swept orphaned temp entry");
                    removed += 1;
                }
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "Failed to sweep temp entry: {}", e),
            }
        }

        if removed > 0 {
            info!("Temp sweep removed {} orphaned entries", removed);
        }
        removed
    }
}

async fn remove_quietly(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Deleted temporary file"),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), "Error deleting temporary file: {}", e),
    }
}

/// The temp files owned by one job.
///
/// Adopted paths are claimed in the store until released, so a concurrent
/// sweep skips them however old they are.
///
/// Call [`ScratchFiles::release`] on every exit path. If the owning future is
/// dropped first (cancelled, or a panic unwinds through it) the files are
/// removed synchronously in `Drop`.
#[derive(Debug)]
pub struct ScratchFiles {
    store: TempStore,
    paths: Vec<PathBuf>,
}

impl ScratchFiles {
    pub fn new(store: &TempStore) -> Self {
        Self {
            store: store.clone(),
            paths: Vec::new(),
        }
    }

    /// Take ownership of `path`.
    pub fn adopt(&mut self, path: PathBuf) {
        self.store.claimed.insert(path.clone());
        self.paths.push(path);
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// Give up ownership without deleting anything.
    pub fn keep(mut self) -> Vec<PathBuf> {
        let paths = std::mem::take(&mut self.paths);
        for path in &paths {
            self.store.claimed.remove(path);
        }
        paths
    }

    /// Delete all owned paths.
    pub async fn release(mut self) {
        let paths: Vec<Option<PathBuf>> = self.paths.drain(..).map(Some).collect();
        self.store.release(&paths).await;
        for path in paths.iter().flatten() {
            self.store.claimed.remove(path);
        }
    }
}

impl Drop for ScratchFiles {
    fn drop(&mut self) {
        for path in self.paths.drain(..) {
            match std::fs::remove_file(&path) {
                Ok(()) => debug!(path = %path.display(), "Deleted temporary file on drop"),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => warn!(path = %path.display(), "Error deleting temporary file on drop: {}", e),
            }
            self.store.claimed.remove(&path);
        }
    }
}
