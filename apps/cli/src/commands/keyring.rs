//! `routerboot keyring`

use std::path::{Path, PathBuf};

use clap::{Args, Subcommand};
use routerboot_bootstrap::{
    BootstrapError, BootstrapResult, CONFIG_FILE_NAME, KEYRING_FILE_NAME, PASSWORD_FIELD,
    SystemIdentity, UnixIdentity,
};
use routerboot_keyring::{
    FileKeyringStore, KeyringError, KeyringStore, KeyringTarget, MasterKeyError,
    TerminalPrompter, rotate_master_key,
};
use tracing::info;

use super::{MasterKeyArgs, configured_account, installation_directory, load_settings};
use crate::config::Settings;

/// Keyring maintenance
#[derive(Subcommand, Debug)]
pub enum KeyringCommand {
    /// Re-encrypt the keyring under a new master key
    Rotate(KeyringArgs),

    /// Report whether the keyring holds a secret; the value is never shown
    Get(GetArgs),
}

/// Locating and unlocking the keyring
#[derive(Args, Debug)]
pub struct KeyringArgs {
    /// Installation directory
    #[arg(short, long)]
    pub directory: Option<PathBuf>,

    #[command(flatten)]
    pub master_key: MasterKeyArgs,

    /// Run as this system user, so files keep their owner
    #[arg(short, long)]
    pub user: Option<String>,
}

/// `keyring get`
#[derive(Args, Debug)]
pub struct GetArgs {
    #[command(flatten)]
    pub keyring: KeyringArgs,

    /// Principal, defaults to the configured router account
    pub principal: Option<String>,

    /// Field of the principal
    #[arg(long, default_value = PASSWORD_FIELD)]
    pub field: String,
}

/// Run a keyring subcommand
pub fn run(settings_path: &Path, command: KeyringCommand) -> anyhow::Result<()> {
    let settings = load_settings(settings_path)?;
    match command {
        KeyringCommand::Rotate(args) => rotate(&settings, args)?,
        KeyringCommand::Get(args) => get(&settings, args)?,
    }
    Ok(())
}

fn rotate(settings: &Settings, args: KeyringArgs) -> BootstrapResult<()> {
    let directory = prepare(settings, args.directory, args.user)?;
    let source = args.master_key.into_source(settings, &directory)?;
    let keyring_path = directory.join(KEYRING_FILE_NAME);

    let outcome = rotate_master_key(&FileKeyringStore, &keyring_path, &source)?;
    println!(
        "Rotated master key of keyring {} ({} entries)",
        outcome.id, outcome.entries
    );
    Ok(())
}

fn get(settings: &Settings, args: GetArgs) -> BootstrapResult<()> {
    let directory = prepare(settings, args.keyring.directory, args.keyring.user)?;
    let source = args.keyring.master_key.into_source(settings, &directory)?;
    let keyring_path = directory.join(KEYRING_FILE_NAME);
    let principal = args
        .principal
        .or_else(|| configured_account(&directory.join(CONFIG_FILE_NAME)))
        .ok_or_else(|| {
            BootstrapError::Config("no principal given and no configured account".to_string())
        })?;

    let sealed = FileKeyringStore.open(&keyring_path)?;
    let target = KeyringTarget {
        path: &keyring_path,
        id: sealed.id(),
        exists: true,
    };
    let resolved = source.resolve(&target, &mut TerminalPrompter)?;
    let keyring = sealed.unseal(resolved.key()).map_err(|e| match e {
        KeyringError::DecryptionFailed { .. } => MasterKeyError::KeyMismatch {
            keyring_path: keyring_path.clone(),
            origin: source.describe(),
        }
        .into(),
        other => BootstrapError::from(other),
    })?;

    let state = if keyring.fetch(&principal, &args.field).is_some() {
        "present"
    } else {
        "absent"
    };
    println!("{principal}/{}: {state}", args.field);
    Ok(())
}

/// Resolve the directory and drop to `user` before touching any file
fn prepare(
    settings: &Settings,
    directory: Option<PathBuf>,
    user: Option<String>,
) -> BootstrapResult<PathBuf> {
    let directory = installation_directory(directory, settings)?;
    if let Some(name) = user.or_else(|| settings.user.clone()) {
        let identity = UnixIdentity;
        let target = identity
            .lookup_user(&name)
            .map_err(|e| BootstrapError::Config(format!("cannot look up user '{name}': {e}")))?
            .ok_or(BootstrapError::UnknownUser(name))?;
        identity
            .switch_to(&target)
            .map_err(BootstrapError::io("Switching to user of", &directory))?;
        info!(user = %target.name, "Running as installation owner");
    }
    Ok(directory)
}
