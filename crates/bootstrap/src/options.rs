//! Validated bootstrap options

use std::path::{Path, PathBuf};

use routerboot_account::{Account, AccountCreateMode, PasswordPolicy, SecretString};
use routerboot_keyring::MasterKeySource;

/// Router configuration file name inside the installation directory
pub const CONFIG_FILE_NAME: &str = "routerboot.conf";

/// Keyring file name inside the installation directory
pub const KEYRING_FILE_NAME: &str = "keyring";

/// Master key file name used when no key source is configured
pub const DEFAULT_MASTER_KEY_FILE_NAME: &str = "routerboot.key";

/// Keyring field holding an account password
pub const PASSWORD_FIELD: &str = "password";

/// Everything one bootstrap run needs, already validated
#[derive(Debug, Clone)]
pub struct BootstrapOptions {
    /// Installation directory
    pub directory: PathBuf,
    /// Router instance name
    pub name: String,
    /// Metadata server address written to the configuration
    pub metadata_uri: String,
    /// Account to provision
    pub account: Account,
    /// How existing accounts are treated
    pub create_mode: AccountCreateMode,
    /// Generated password policy
    pub password_policy: PasswordPolicy,
    /// Operator supplied account password
    pub password: Option<SecretString>,
    /// Master key source
    pub master_key: MasterKeySource,
    /// Bootstrap into a non-empty directory and replace an unusable keyring
    pub force: bool,
    /// System user that will own the installation
    pub user: Option<String>,
}

impl BootstrapOptions {
    /// Options with defaults for everything but the essentials
    pub fn new(
        directory: impl Into<PathBuf>,
        metadata_uri: impl Into<String>,
        account: Account,
    ) -> Self {
        let directory = directory.into();
        let master_key = MasterKeySource::File {
            path: default_master_key_file(&directory),
        };
        Self {
            directory,
            name: "system".to_string(),
            metadata_uri: metadata_uri.into(),
            account,
            create_mode: AccountCreateMode::default(),
            password_policy: PasswordPolicy::default(),
            password: None,
            master_key,
            force: false,
            user: None,
        }
    }

    /// Configuration file path
    pub fn config_path(&self) -> PathBuf {
        self.directory.join(CONFIG_FILE_NAME)
    }

    /// Keyring file path
    pub fn keyring_path(&self) -> PathBuf {
        self.directory.join(KEYRING_FILE_NAME)
    }
}

/// Master key file used when no source is configured for `directory`
pub fn default_master_key_file(directory: &Path) -> PathBuf {
    directory.join(DEFAULT_MASTER_KEY_FILE_NAME)
}
