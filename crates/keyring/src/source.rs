//! Master key sources
//!
//! A bootstrap run obtains the keyring master key from exactly one of:
//!
//! - an external reader/writer command pair ([`MasterKeySource::External`]),
//! - a master key file ([`MasterKeySource::File`]),
//! - an interactive prompt ([`MasterKeySource::Interactive`]).
//!
//! [`MasterKeyOptions::into_source`] enforces the mutual exclusion before any
//! I/O happens. [`MasterKeySource::resolve`] is one-shot: it either finds the
//! existing key, or generates one and returns it together with the pending
//! write that [`ResolvedMasterKey::persist`] performs once the keyring has
//! been saved.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use tracing::{debug, info};

use crate::crypto::MasterKey;
use crate::error::{KeyringError, MasterKeyError, MasterKeyResult};
use crate::keyring::KeyringId;
use crate::master_key_file::MasterKeyFile;
use crate::secret::SecretString;

/// Where the master key comes from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MasterKeySource {
    /// External programs: reader prints the key, writer stores it
    External {
        /// Reader program, invoked as `reader <keyring-id>`
        reader: PathBuf,
        /// Writer program, invoked as `writer <keyring-id>` with the key on stdin
        writer: PathBuf,
    },
    /// Master key file mapping keyring ids to keys
    File {
        /// Path of the master key file
        path: PathBuf,
    },
    /// Ask the operator on the terminal
    Interactive,
}

impl MasterKeySource {
    /// Human readable description used in error messages
    pub fn describe(&self) -> String {
        match self {
            Self::External { reader, .. } => {
                format!("master key reader '{}'", reader.display())
            }
            Self::File { path } => format!("master key file '{}'", path.display()),
            Self::Interactive => "the interactive prompt".to_string(),
        }
    }

    /// Obtain the master key for `target`
    ///
    /// When the key is unknown and the keyring does not exist yet, a new key
    /// is generated; it is persisted only by [`ResolvedMasterKey::persist`].
    /// When the key is unknown but the keyring exists, the keyring could never
    /// be opened again, so this is an error.
    pub fn resolve(
        &self,
        target: &KeyringTarget<'_>,
        prompter: &mut dyn Prompter,
    ) -> MasterKeyResult<ResolvedMasterKey> {
        let resolved = match self {
            Self::External { reader, writer } => match read_external(reader, target.id)? {
                Some(key) => ResolvedMasterKey::existing(key),
                None => self.generate_for(target, |key| PendingWrite::External {
                    writer: writer.clone(),
                    id: target.id.clone(),
                    key: key.clone(),
                })?,
            },
            Self::File { path } => {
                let file = match MasterKeyFile::load(path) {
                    Ok(file) => Some(file),
                    Err(KeyringError::NotFound { .. }) => None,
                    Err(e) => return Err(e.into()),
                };
                let known = match &file {
                    Some(file) => file.get(target.id, path)?,
                    None => None,
                };
                match known {
                    Some(key) => ResolvedMasterKey::existing(key),
                    None => self.generate_for(target, |_| PendingWrite::File {
                        path: path.clone(),
                        file: file.unwrap_or_default(),
                        id: target.id.clone(),
                    })?,
                }
            }
            Self::Interactive => {
                let key = prompter
                    .prompt_secret("Please provide a master key for the keyring: ")
                    .map_err(MasterKeyError::Prompt)?;
                if key.is_empty() {
                    return Err(MasterKeyError::EmptyKey);
                }
                ResolvedMasterKey {
                    key: MasterKey::new(key),
                    origin: KeyOrigin::Prompted,
                    pending: None,
                }
            }
        };

        debug!(source = %self.describe(), origin = ?resolved.origin, "Master key resolved");
        Ok(resolved)
    }

    fn generate_for(
        &self,
        target: &KeyringTarget<'_>,
        pending: impl FnOnce(&MasterKey) -> PendingWrite,
    ) -> MasterKeyResult<ResolvedMasterKey> {
        if target.exists {
            return Err(MasterKeyError::MasterKeyMissing {
                keyring_path: target.path.to_path_buf(),
                origin: self.describe(),
            });
        }
        let key = MasterKey::generate();
        info!(source = %self.describe(), id = %target.id, "Generated new master key");
        Ok(ResolvedMasterKey {
            pending: Some(pending(&key)),
            key,
            origin: KeyOrigin::Generated,
        })
    }
}

/// Keyring the master key is resolved for
#[derive(Debug, Clone, Copy)]
pub struct KeyringTarget<'a> {
    /// Keyring file path
    pub path: &'a Path,
    /// Keyring identity token
    pub id: &'a KeyringId,
    /// Whether the keyring file already exists
    pub exists: bool,
}

/// How a resolved key was obtained
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOrigin {
    /// Found in the configured source
    Existing,
    /// Freshly generated; must be persisted
    Generated,
    /// Typed by the operator
    Prompted,
}

#[derive(Debug)]
enum PendingWrite {
    External {
        writer: PathBuf,
        id: KeyringId,
        key: MasterKey,
    },
    File {
        path: PathBuf,
        file: MasterKeyFile,
        id: KeyringId,
    },
}

/// Outcome of [`MasterKeySource::resolve`]
#[derive(Debug)]
pub struct ResolvedMasterKey {
    key: MasterKey,
    origin: KeyOrigin,
    pending: Option<PendingWrite>,
}

impl ResolvedMasterKey {
    fn existing(key: MasterKey) -> Self {
        Self {
            key,
            origin: KeyOrigin::Existing,
            pending: None,
        }
    }

    /// The master key
    pub fn key(&self) -> &MasterKey {
        &self.key
    }

    /// How the key was obtained
    pub fn origin(&self) -> KeyOrigin {
        self.origin
    }

    /// Store a generated key in its source; no-op for existing or prompted keys
    pub fn persist(self) -> MasterKeyResult<MasterKey> {
        match self.pending {
            None => {}
            Some(PendingWrite::External { writer, id, key }) => {
                write_external(&writer, &id, &key)?;
            }
            Some(PendingWrite::File { path, mut file, id }) => {
                file.insert(&id, &self.key)?;
                file.save(&path)?;
            }
        }
        Ok(self.key)
    }
}

/// Flat master key options as they arrive from the command line
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MasterKeyOptions {
    /// `--master-key-file`
    pub file: Option<PathBuf>,
    /// `--master-key-reader`
    pub reader: Option<PathBuf>,
    /// `--master-key-writer`
    pub writer: Option<PathBuf>,
    /// `--master-key-prompt`
    pub prompt: bool,
}

impl MasterKeyOptions {
    /// Validate exclusivity and pick the source
    ///
    /// With nothing configured, the master key file at `default_file` is used.
    pub fn into_source(self, default_file: PathBuf) -> MasterKeyResult<MasterKeySource> {
        let external = self.reader.is_some() || self.writer.is_some();

        if self.file.is_some() && external {
            return Err(MasterKeyError::MutuallyExclusive {
                first: "--master-key-file",
                second: if self.reader.is_some() {
                    "--master-key-reader"
                } else {
                    "--master-key-writer"
                },
            });
        }
        if self.prompt && self.file.is_some() {
            return Err(MasterKeyError::MutuallyExclusive {
                first: "--master-key-prompt",
                second: "--master-key-file",
            });
        }
        if self.prompt && external {
            return Err(MasterKeyError::MutuallyExclusive {
                first: "--master-key-prompt",
                second: "--master-key-reader",
            });
        }

        match (self.reader, self.writer) {
            (Some(reader), Some(writer)) => Ok(MasterKeySource::External { reader, writer }),
            (Some(_), None) => Err(MasterKeyError::ReaderWithoutWriter),
            (None, Some(_)) => Err(MasterKeyError::WriterWithoutReader),
            (None, None) if self.prompt => Ok(MasterKeySource::Interactive),
            (None, None) => Ok(MasterKeySource::File {
                path: self.file.unwrap_or(default_file),
            }),
        }
    }
}

/// Source of interactively typed secrets
pub trait Prompter {
    /// Show `message` and read one secret line
    fn prompt_secret(&mut self, message: &str) -> std::io::Result<SecretString>;
}

/// Prompter on the controlling terminal
///
/// The prompt goes to stderr; the answer is read from the terminal with echo
/// turned off.
#[derive(Debug, Default)]
pub struct TerminalPrompter;

impl Prompter for TerminalPrompter {
    fn prompt_secret(&mut self, message: &str) -> std::io::Result<SecretString> {
        let mut stderr = std::io::stderr();
        stderr.write_all(message.as_bytes())?;
        stderr.flush()?;

        rpassword::read_password().map(SecretString::new)
    }
}

/// Run the reader; `None` means it does not know the key
pub(crate) fn read_external(reader: &Path, id: &KeyringId) -> MasterKeyResult<Option<MasterKey>> {
    let command = reader.display().to_string();
    let output = Command::new(reader)
        .arg(id.as_str())
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .map_err(|source| MasterKeyError::Spawn {
            command: command.clone(),
            source,
        })?;

    if !output.status.success() {
        return Err(MasterKeyError::ReaderFailed {
            command,
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    let mut stdout = String::from_utf8(output.stdout).map_err(|_| {
        MasterKeyError::InvalidReaderOutput {
            command: command.clone(),
            reason: "output is not UTF-8".to_string(),
        }
    })?;
    let trimmed_len = stdout.trim_end_matches(['\r', '\n']).len();
    stdout.truncate(trimmed_len);

    if stdout.is_empty() {
        debug!(reader = %command, id = %id, "Master key reader has no key");
        return Ok(None);
    }
    if stdout.contains('\n') {
        return Err(MasterKeyError::InvalidReaderOutput {
            command,
            reason: "output spans multiple lines".to_string(),
        });
    }
    Ok(Some(MasterKey::new(SecretString::new(stdout))))
}

pub(crate) fn write_external(writer: &Path, id: &KeyringId, key: &MasterKey) -> MasterKeyResult<()> {
    let command = writer.display().to_string();
    let spawn_err = |source: std::io::Error| MasterKeyError::Spawn {
        command: command.clone(),
        source,
    };

    let mut child = Command::new(writer)
        .arg(id.as_str())
        .stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(spawn_err)?;

    let written = match child.stdin.take() {
        Some(mut stdin) => key.expose_secret(|k| stdin.write_all(k.as_bytes())),
        None => Err(std::io::Error::from(std::io::ErrorKind::BrokenPipe)),
    };

    let output = child.wait_with_output().map_err(spawn_err)?;
    writer_outcome(&command, &output, written)?;

    info!(writer = %command, id = %id, "Master key handed to writer");
    Ok(())
}

/// A writer succeeded only if it exited 0 and the key reached its stdin
fn writer_outcome(
    command: &str,
    output: &Output,
    written: std::io::Result<()>,
) -> MasterKeyResult<()> {
    if !output.status.success() {
        return Err(MasterKeyError::WriterFailed {
            command: command.to_string(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    written.map_err(|source| MasterKeyError::WriterInput {
        command: command.to_string(),
        source,
    })
}
