//! Subcommand implementations

pub mod bootstrap;
pub mod keyring;

use std::path::{Path, PathBuf};

use clap::Args;
use routerboot_bootstrap::{BootstrapError, BootstrapResult, default_master_key_file};
use routerboot_keyring::{MasterKeyOptions, MasterKeySource};

use crate::config::Settings;

/// Master key source flags shared by every subcommand
#[derive(Args, Debug, Clone, Default)]
pub struct MasterKeyArgs {
    /// Master key file holding the keyring master key
    #[arg(long, value_name = "PATH")]
    pub master_key_file: Option<PathBuf>,

    /// Program printing the master key for a keyring id
    #[arg(long, value_name = "PROGRAM")]
    pub master_key_reader: Option<PathBuf>,

    /// Program storing the master key for a keyring id
    #[arg(long, value_name = "PROGRAM")]
    pub master_key_writer: Option<PathBuf>,

    /// Ask for the master key on the terminal
    #[arg(long)]
    pub master_key_prompt: bool,
}

impl MasterKeyArgs {
    /// Flags over settings, validated into one source
    pub fn into_source(
        self,
        settings: &Settings,
        directory: &Path,
    ) -> BootstrapResult<MasterKeySource> {
        let options = MasterKeyOptions {
            file: self.master_key_file.or_else(|| settings.master_key_file.clone()),
            reader: self
                .master_key_reader
                .or_else(|| settings.master_key_reader.clone()),
            writer: self
                .master_key_writer
                .or_else(|| settings.master_key_writer.clone()),
            prompt: self.master_key_prompt || settings.master_key_prompt,
        };
        Ok(options.into_source(default_master_key_file(directory))?)
    }
}

/// Load settings, reporting problems as usage errors
pub fn load_settings(path: &Path) -> BootstrapResult<Settings> {
    Settings::load(path).map_err(|e| {
        BootstrapError::Config(format!("settings file '{}': {e}", path.display()))
    })
}

/// Installation directory from the flag or the settings
pub fn installation_directory(
    flag: Option<PathBuf>,
    settings: &Settings,
) -> BootstrapResult<PathBuf> {
    flag.or_else(|| settings.directory.clone())
        .ok_or_else(|| BootstrapError::Config("--directory is required".to_string()))
}

/// Account user name recorded in an existing router configuration
pub fn configured_account(config_path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(config_path).ok()?;
    content
        .lines()
        .find_map(|line| line.trim().strip_prefix("user="))
        .map(str::trim)
        .filter(|user| !user.is_empty())
        .map(ToString::to_string)
}
