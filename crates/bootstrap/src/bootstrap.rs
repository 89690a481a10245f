//! Bootstrap orchestration
//!
//! One run provisions the router account, stores its password in the
//! keyring under a master key from the configured source, and writes the
//! router configuration. Every change is registered with an
//! [`AutoCleaner`] first:
//!
//! - fresh installation directory: the directory and any parent created
//!   with it are deleted on failure
//! - pre-existing directory: files that existed are reverted from a backup,
//!   files created by this run are deleted, the directory is never touched
//! - accounts created by this run are dropped again
//!
//! Re-running against an existing installation reuses the keyring, its
//! master key and the stored account password.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use routerboot_account::classify::quoted_account;
use routerboot_account::{AccountProvisioner, MetadataConnection, drop_accounts};
use routerboot_keyring::{
    KeyOrigin, Keyring, KeyringError, KeyringId, KeyringStore, KeyringTarget, MasterKeyError,
    MasterKeySource, Prompter, ResolvedMasterKey,
};
use tracing::{debug, info, info_span, warn};

use crate::cleanup::AutoCleaner;
use crate::config_writer::{ConfigWriter, RouterConfig};
use crate::error::{BootstrapError, BootstrapResult};
use crate::options::{BootstrapOptions, PASSWORD_FIELD};
use crate::system::{SystemIdentity, SystemUser};

/// What a successful bootstrap did
#[derive(Debug, Clone)]
pub struct BootstrapReport {
    /// Installation directory
    pub directory: PathBuf,
    /// Whether the directory was created by this run
    pub fresh_install: bool,
    /// Configuration file written
    pub config_path: PathBuf,
    /// Keyring written
    pub keyring_path: PathBuf,
    /// Hosts whose account was created
    pub created: BTreeSet<String>,
    /// Hosts whose account already existed
    pub already_existing: BTreeSet<String>,
    /// How the master key was obtained
    pub key_origin: KeyOrigin,
}

/// Runs bootstraps against injected collaborators
pub struct Bootstrapper<'a, S: KeyringStore> {
    store: &'a S,
    identity: &'a dyn SystemIdentity,
    config_writer: &'a dyn ConfigWriter,
    prompter: &'a mut dyn Prompter,
}

impl<'a, S: KeyringStore> Bootstrapper<'a, S> {
    /// Bootstrapper over the given keyring store and system collaborators
    pub fn new(
        store: &'a S,
        identity: &'a dyn SystemIdentity,
        config_writer: &'a dyn ConfigWriter,
        prompter: &'a mut dyn Prompter,
    ) -> Self {
        Self {
            store,
            identity,
            config_writer,
            prompter,
        }
    }

    /// Bootstrap the installation described by `options`
    ///
    /// On error everything this run changed is undone before returning.
    pub fn run(
        &mut self,
        conn: &mut dyn MetadataConnection,
        options: &BootstrapOptions,
    ) -> BootstrapResult<BootstrapReport> {
        let _span = info_span!("bootstrap", directory = %options.directory.display()).entered();

        let config_path = options.config_path();
        let keyring_path = options.keyring_path();
        let username = options.account.username();

        let owner = options
            .user
            .as_deref()
            .map(|name| self.resolve_user(name))
            .transpose()?;

        let fresh_install = !options.directory.exists();
        if !fresh_install {
            check_directory(&options.directory, &config_path, options.force)?;
        }

        let mut cleaner = AutoCleaner::new();
        prepare_directory(&mut cleaner, options, fresh_install)?;

        let mut opened = None;
        let mut desired_password = options.password.clone();
        if desired_password.is_none() && self.store.exists(&keyring_path) {
            let (resolved, keyring) = self.open_keyring(&keyring_path, options)?;
            desired_password = keyring.fetch(username, PASSWORD_FIELD).cloned();
            if desired_password.is_some() {
                debug!(account = username, "Reusing account password from keyring");
            }
            opened = Some((resolved, keyring));
        }
        let password_known = desired_password.is_some();

        let provisioner = AccountProvisioner::new(options.password_policy, options.create_mode);
        let outcome = provisioner.provision(&mut *conn, &options.account, desired_password)?;

        if !outcome.created.is_empty() {
            let user = username.to_string();
            let created = outcome.created.clone();
            cleaner.add_callback("drop created router accounts", move || {
                drop_accounts(conn, &user, &created).map_err(Into::into)
            });
        }

        // New hosts got a fresh password, existing ones kept an unknown one
        if !password_known && !outcome.already_existing.is_empty() {
            return Err(BootstrapError::UnknownAccountPassword {
                accounts: outcome
                    .already_existing
                    .iter()
                    .map(|host| quoted_account(username, host))
                    .collect(),
            });
        }

        let (resolved, mut keyring) = match opened {
            Some(opened) => opened,
            None => self.open_keyring(&keyring_path, options)?,
        };
        keyring.store(username, PASSWORD_FIELD, outcome.password.clone());
        self.store.save(&keyring_path, &keyring, resolved.key())?;
        let key_origin = resolved.origin();
        resolved.persist()?;

        let router_config = RouterConfig {
            name: options.name.clone(),
            metadata_uri: options.metadata_uri.clone(),
            username: username.to_string(),
            keyring_path: keyring_path.clone(),
            master_key: options.master_key.clone(),
        };
        self.config_writer
            .write(&config_path, &router_config)
            .map_err(BootstrapError::io("Writing configuration", &config_path))?;

        if let Some(owner) = &owner {
            self.chown_outputs(owner, options, fresh_install)?;
        }

        cleaner.discharge();
        info!(
            account = %options.account,
            created = outcome.created.len(),
            already_existing = outcome.already_existing.len(),
            key_origin = ?key_origin,
            fresh_install,
            "Bootstrap complete"
        );

        Ok(BootstrapReport {
            directory: options.directory.clone(),
            fresh_install,
            config_path,
            keyring_path,
            created: outcome.created,
            already_existing: outcome.already_existing,
            key_origin,
        })
    }

    fn resolve_user(&self, name: &str) -> BootstrapResult<SystemUser> {
        self.identity
            .lookup_user(name)
            .map_err(|e| BootstrapError::Config(format!("cannot look up user '{name}': {e}")))?
            .ok_or_else(|| BootstrapError::UnknownUser(name.to_string()))
    }

    /// Existing keyring with its key, or a new keyring with a resolved key
    fn open_keyring(
        &mut self,
        path: &Path,
        options: &BootstrapOptions,
    ) -> BootstrapResult<(ResolvedMasterKey, Keyring)> {
        if !self.store.exists(path) {
            return self.new_keyring(path, &options.master_key);
        }

        let sealed = self.store.open(path)?;
        let resolved = match self.resolve(&options.master_key, path, sealed.id(), true) {
            Ok(resolved) => resolved,
            Err(MasterKeyError::MasterKeyMissing { .. }) if options.force => {
                warn!(
                    keyring = %path.display(),
                    source = %options.master_key.describe(),
                    "Master key of existing keyring is unknown, replacing the keyring"
                );
                return self.new_keyring(path, &options.master_key);
            }
            Err(e) => return Err(e.into()),
        };

        let keyring = sealed.unseal(resolved.key()).map_err(|e| match e {
            KeyringError::DecryptionFailed { .. } => MasterKeyError::KeyMismatch {
                keyring_path: path.to_path_buf(),
                origin: options.master_key.describe(),
            }
            .into(),
            other => BootstrapError::from(other),
        })?;
        debug!(keyring = %path.display(), id = %keyring.id(), "Opened existing keyring");
        Ok((resolved, keyring))
    }

    fn new_keyring(
        &mut self,
        path: &Path,
        source: &MasterKeySource,
    ) -> BootstrapResult<(ResolvedMasterKey, Keyring)> {
        let keyring = Keyring::new();
        let resolved = self.resolve(source, path, keyring.id(), false)?;
        Ok((resolved, keyring))
    }

    fn resolve(
        &mut self,
        source: &MasterKeySource,
        path: &Path,
        id: &KeyringId,
        exists: bool,
    ) -> Result<ResolvedMasterKey, MasterKeyError> {
        let target = KeyringTarget { path, id, exists };
        source.resolve(&target, &mut *self.prompter)
    }

    fn chown_outputs(
        &self,
        owner: &SystemUser,
        options: &BootstrapOptions,
        fresh_install: bool,
    ) -> BootstrapResult<()> {
        let mut paths = Vec::new();
        if fresh_install {
            paths.push(options.directory.clone());
        }
        paths.push(options.config_path());
        paths.push(options.keyring_path());
        if let MasterKeySource::File { path } = &options.master_key {
            if path.exists() {
                paths.push(path.clone());
            }
        }

        for path in paths {
            self.identity
                .chown(&path, owner)
                .map_err(BootstrapError::io("Changing owner of", &path))?;
        }
        debug!(user = %owner.name, "Installation handed to system user");
        Ok(())
    }
}

fn check_directory(directory: &Path, config_path: &Path, force: bool) -> BootstrapResult<()> {
    if !directory.is_dir() {
        return Err(BootstrapError::Config(format!(
            "'{}' exists and is not a directory",
            directory.display()
        )));
    }
    if config_path.exists() {
        info!(config = %config_path.display(), "Re-bootstrapping existing installation");
        return Ok(());
    }

    let mut entries =
        std::fs::read_dir(directory).map_err(BootstrapError::io("Reading directory", directory))?;
    if entries.next().is_some() && !force {
        return Err(BootstrapError::DirectoryNotEmpty {
            directory: directory.to_path_buf(),
        });
    }
    Ok(())
}

fn prepare_directory(
    cleaner: &mut AutoCleaner<'_>,
    options: &BootstrapOptions,
    fresh_install: bool,
) -> BootstrapResult<()> {
    let directory = &options.directory;
    if fresh_install {
        // Outermost first, so unwinding removes them innermost first
        for ancestor in missing_ancestors(directory).into_iter().rev() {
            std::fs::create_dir(&ancestor)
                .map_err(BootstrapError::io("Creating directory", &ancestor))?;
            cleaner.add_directory_delete(ancestor, false)?;
        }
        std::fs::create_dir(directory)
            .map_err(BootstrapError::io("Creating directory", directory))?;
        cleaner.add_directory_delete(directory, true)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(directory, std::fs::Permissions::from_mode(0o700))
                .map_err(BootstrapError::io("Setting permissions of", directory))?;
        }
        debug!(directory = %directory.display(), "Created installation directory");
    }

    let mut outputs = vec![options.config_path(), options.keyring_path()];
    if let MasterKeySource::File { path } = &options.master_key {
        outputs.push(path.clone());
    }

    for path in outputs {
        // Covered by the directory deletion
        if fresh_install && path.starts_with(directory) {
            continue;
        }
        if path.exists() {
            cleaner.add_file_revert(path)?;
        } else {
            cleaner.add_file_delete(path)?;
        }
    }
    Ok(())
}

/// Ancestors of `directory` that do not exist yet, innermost first
fn missing_ancestors(directory: &Path) -> Vec<PathBuf> {
    directory
        .ancestors()
        .skip(1)
        .filter(|ancestor| !ancestor.as_os_str().is_empty())
        .take_while(|ancestor| !ancestor.exists())
        .map(Path::to_path_buf)
        .collect()
}
