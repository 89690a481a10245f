//! Layered settings
//!
//! Built-in defaults, then the settings file (`routerboot.toml` unless
//! `--config` says otherwise), then `ROUTERBOOT_*` environment variables.
//! Command line flags are applied on top by the subcommands.
//!
//! List values from the environment use figment's array syntax, e.g.
//! `ROUTERBOOT_ACCOUNT_HOST='["%", "10.0.0.%"]'`.

use std::path::{Path, PathBuf};

use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use routerboot_account::{AccountCreateMode, DEFAULT_PASSWORD_LENGTH, DEFAULT_PASSWORD_RETRIES};
use serde::{Deserialize, Serialize};

/// Environment variables handled elsewhere
const IGNORED_ENV: &[&str] = &[
    "log",
    "log_format",
    "log_source",
    "log_colors",
    "account_password",
];

/// Non-secret options shared by every subcommand
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Installation directory
    pub directory: Option<PathBuf>,
    /// Router instance name
    pub name: String,
    /// Router account user name
    pub account: Option<String>,
    /// Hosts the account is created for
    pub account_host: Vec<String>,
    /// How existing accounts are treated
    pub account_create: AccountCreateMode,
    /// Attempts at a generated password the server accepts
    pub password_retries: u32,
    /// Generated password length
    pub password_length: usize,
    /// Send the password in plaintext so the server validates it
    pub force_password_validation: bool,
    /// Master key file
    pub master_key_file: Option<PathBuf>,
    /// External master key reader
    pub master_key_reader: Option<PathBuf>,
    /// External master key writer
    pub master_key_writer: Option<PathBuf>,
    /// Ask for the master key on the terminal
    pub master_key_prompt: bool,
    /// System user owning the installation
    pub user: Option<String>,
    /// Seconds to wait for the metadata server connection
    pub connect_timeout: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            directory: None,
            name: "system".to_string(),
            account: None,
            account_host: vec!["%".to_string()],
            account_create: AccountCreateMode::default(),
            password_retries: DEFAULT_PASSWORD_RETRIES,
            password_length: DEFAULT_PASSWORD_LENGTH,
            force_password_validation: false,
            master_key_file: None,
            master_key_reader: None,
            master_key_writer: None,
            master_key_prompt: false,
            user: None,
            connect_timeout: 15,
        }
    }
}

impl Settings {
    /// Load the layered settings; a missing settings file is not an error
    pub fn load(path: &Path) -> Result<Self, figment::Error> {
        Self::figment(path).extract()
    }

    fn figment(path: &Path) -> Figment {
        Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed("ROUTERBOOT_").ignore(IGNORED_ENV))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(settings.account_host, vec!["%".to_string()]);
        assert_eq!(settings.password_retries, DEFAULT_PASSWORD_RETRIES);
        assert_eq!(settings.name, "system");
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("routerboot.toml");
        std::fs::write(
            &path,
            r#"
directory = "/var/lib/router"
account = "router_edge"
account_host = ["10.0.0.%", "10.0.1.%"]
account_create = "always"
password_retries = 5
master_key_prompt = true
"#,
        )
        .unwrap();

        let settings = Settings::load(&path).unwrap();
        assert_eq!(settings.directory, Some(PathBuf::from("/var/lib/router")));
        assert_eq!(settings.account.as_deref(), Some("router_edge"));
        assert_eq!(settings.account_host, vec!["10.0.0.%", "10.0.1.%"]);
        assert_eq!(settings.account_create, AccountCreateMode::Always);
        assert_eq!(settings.password_retries, 5);
        assert!(settings.master_key_prompt);
        assert_eq!(settings.password_length, DEFAULT_PASSWORD_LENGTH);
    }

    #[test]
    fn test_invalid_file_is_reported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("routerboot.toml");
        std::fs::write(&path, "account_create = \"sometimes\"\n").unwrap();
        assert!(Settings::load(&path).is_err());
    }
}
