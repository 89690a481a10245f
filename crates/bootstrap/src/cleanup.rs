//! Scoped cleanup ledger
//!
//! [`AutoCleaner`] records how to undo each change a bootstrap makes. If the
//! scope ends without [`AutoCleaner::discharge`], the ledger is unwound:
//! file and directory actions in reverse registration order, then callbacks
//! in registration order. Unwinding is best-effort; every failure is logged
//! and the remaining steps still run.

use std::collections::HashSet;
use std::error::Error as StdError;
use std::fmt;
use std::fs::{File, OpenOptions};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

/// Cleanup registration errors
#[derive(Debug, Error)]
pub enum CleanupError {
    /// A different action is already registered for the path
    #[error("A cleanup action is already registered for '{}'", path.display())]
    AlreadyRegistered {
        /// Path registered twice
        path: PathBuf,
    },

    /// The file to revert could not be backed up
    #[error("Failed to back up '{}' to '{}': {source}", path.display(), backup.display())]
    Backup {
        /// File to protect
        path: PathBuf,
        /// Backup location
        backup: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// How a registered path is restored on unwind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupAction {
    /// Remove a file created during the scope
    DeleteFile,
    /// Remove a directory created during the scope
    DeleteDir {
        /// Remove contents too; otherwise only an empty directory is removed
        recursive: bool,
    },
    /// Copy a pre-existing file back from its backup
    RevertFromBackup {
        /// Copy taken at registration
        backup: PathBuf,
    },
}

/// Result of a cleanup callback
pub type CallbackResult = Result<(), Box<dyn StdError>>;

struct Callback<'a> {
    name: String,
    run: Box<dyn FnOnce() -> CallbackResult + 'a>,
}

/// Ledger of undo actions for one bootstrap scope
#[derive(Default)]
pub struct AutoCleaner<'a> {
    actions: Vec<(PathBuf, CleanupAction)>,
    registered: HashSet<PathBuf>,
    callbacks: Vec<Callback<'a>>,
}

impl<'a> AutoCleaner<'a> {
    /// Empty ledger
    pub fn new() -> Self {
        Self::default()
    }

    /// Delete `path` on unwind
    pub fn add_file_delete(&mut self, path: impl Into<PathBuf>) -> Result<(), CleanupError> {
        self.register(path.into(), CleanupAction::DeleteFile)
    }

    /// Delete the directory `path` on unwind
    pub fn add_directory_delete(
        &mut self,
        path: impl Into<PathBuf>,
        recursive: bool,
    ) -> Result<(), CleanupError> {
        self.register(path.into(), CleanupAction::DeleteDir { recursive })
    }

    /// Restore the current content of `path` on unwind
    ///
    /// The file is copied now to a new sibling `<path>.<uuid>.bak`, so later
    /// writes to `path` cannot affect what is restored. The backup never
    /// replaces an existing file.
    pub fn add_file_revert(&mut self, path: impl Into<PathBuf>) -> Result<(), CleanupError> {
        let path = path.into();
        self.ensure_unregistered(&path)?;

        let backup = backup_path(&path);
        create_backup(&path, &backup).map_err(|source| CleanupError::Backup {
            path: path.clone(),
            backup: backup.clone(),
            source,
        })?;
        debug!(path = %path.display(), backup = %backup.display(), "Backed up file");

        self.register(path, CleanupAction::RevertFromBackup { backup })
    }

    /// Run `callback` on unwind, after all file and directory actions
    pub fn add_callback<F>(&mut self, name: impl Into<String>, callback: F)
    where
        F: FnOnce() -> CallbackResult + 'a,
    {
        self.callbacks.push(Callback {
            name: name.into(),
            run: Box::new(callback),
        });
    }

    /// Action registered for `path`, if any
    pub fn action_for(&self, path: &Path) -> Option<&CleanupAction> {
        self.actions
            .iter()
            .find(|(registered, _)| registered == path)
            .map(|(_, action)| action)
    }

    /// Number of registered actions, callbacks included
    pub fn len(&self) -> usize {
        self.actions.len() + self.callbacks.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Keep every change: drop the ledger and remove backups
    pub fn discharge(&mut self) {
        for (_, action) in self.actions.drain(..) {
            if let CleanupAction::RevertFromBackup { backup } = action {
                if let Err(e) = std::fs::remove_file(&backup) {
                    warn!(backup = %backup.display(), error = %e, "Failed to remove backup");
                }
            }
        }
        self.registered.clear();
        self.callbacks.clear();
    }

    fn ensure_unregistered(&self, path: &Path) -> Result<(), CleanupError> {
        if self.registered.contains(path) {
            return Err(CleanupError::AlreadyRegistered {
                path: path.to_path_buf(),
            });
        }
        Ok(())
    }

    fn register(&mut self, path: PathBuf, action: CleanupAction) -> Result<(), CleanupError> {
        self.ensure_unregistered(&path)?;
        self.registered.insert(path.clone());
        self.actions.push((path, action));
        Ok(())
    }

    fn unwind(&mut self) {
        while let Some((path, action)) = self.actions.pop() {
            if let Err(e) = undo(&path, &action) {
                warn!(path = %path.display(), action = ?action, error = %e, "Cleanup step failed");
            } else {
                debug!(path = %path.display(), action = ?action, "Cleanup step done");
            }
        }
        self.registered.clear();

        for callback in self.callbacks.drain(..) {
            match catch_unwind(AssertUnwindSafe(callback.run)) {
                Ok(Ok(())) => debug!(callback = %callback.name, "Cleanup callback done"),
                Ok(Err(e)) => {
                    warn!(callback = %callback.name, error = %e, "Cleanup callback failed");
                }
                Err(_) => warn!(callback = %callback.name, "Cleanup callback panicked"),
            }
        }
    }
}

impl Drop for AutoCleaner<'_> {
    fn drop(&mut self) {
        if !self.is_empty() {
            self.unwind();
        }
    }
}

impl fmt::Debug for AutoCleaner<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AutoCleaner")
            .field("actions", &self.actions)
            .field(
                "callbacks",
                &self.callbacks.iter().map(|c| &c.name).collect::<Vec<_>>(),
            )
            .finish()
    }
}

fn undo(path: &Path, action: &CleanupAction) -> std::io::Result<()> {
    match action {
        CleanupAction::DeleteFile => std::fs::remove_file(path),
        CleanupAction::DeleteDir { recursive: true } => std::fs::remove_dir_all(path),
        CleanupAction::DeleteDir { recursive: false } => std::fs::remove_dir(path),
        CleanupAction::RevertFromBackup { backup } => {
            std::fs::copy(backup, path)?;
            std::fs::remove_file(backup)
        }
    }
}

fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(format!(".{}.bak", Uuid::new_v4().simple()));
    path.with_file_name(name)
}

/// Copy `path` into the not yet existing `backup`, keeping permissions
fn create_backup(path: &Path, backup: &Path) -> std::io::Result<()> {
    let mut source = File::open(path)?;
    let permissions = source.metadata()?.permissions();
    let mut target = OpenOptions::new().write(true).create_new(true).open(backup)?;

    let copied = std::io::copy(&mut source, &mut target)
        .and_then(|_| target.set_permissions(permissions))
        .and_then(|()| target.sync_all());
    if copied.is_err() {
        let _ = std::fs::remove_file(backup);
    }
    copied
}
