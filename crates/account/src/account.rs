//! Account, password policy and provisioning outcome

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{ProvisioningError, ProvisioningResult};
use crate::SecretString;

/// Default number of passwords tried against a password validation policy
pub const DEFAULT_PASSWORD_RETRIES: u32 = 20;

/// Default length of generated passwords
pub const DEFAULT_PASSWORD_LENGTH: usize = 32;

const RETRIES_RANGE: std::ops::RangeInclusive<u32> = 1..=10_000;
const LENGTH_RANGE: std::ops::RangeInclusive<usize> = 8..=255;

/// Database account: one user name provisioned on a batch of hosts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Account {
    username: String,
    hostnames: BTreeSet<String>,
}

impl Account {
    /// Create an account; both the user name and the host set must be non-empty
    pub fn new<I, H>(username: impl Into<String>, hostnames: I) -> ProvisioningResult<Self>
    where
        I: IntoIterator<Item = H>,
        H: Into<String>,
    {
        let username = username.into();
        if username.is_empty() {
            return Err(ProvisioningError::InvalidAccount(
                "user name must not be empty".to_string(),
            ));
        }
        let hostnames: BTreeSet<String> = hostnames.into_iter().map(Into::into).collect();
        if hostnames.is_empty() {
            return Err(ProvisioningError::InvalidAccount(format!(
                "no hosts given for account '{username}'"
            )));
        }
        Ok(Self {
            username,
            hostnames,
        })
    }

    /// User name
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Hosts the account is provisioned on
    pub fn hostnames(&self) -> &BTreeSet<String> {
        &self.hostnames
    }

    /// Whether `host` is part of this account's batch
    pub fn has_host(&self, host: &str) -> bool {
        self.hostnames.contains(host)
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let hosts: Vec<&str> = self.hostnames.iter().map(String::as_str).collect();
        write!(f, "{}@{{{}}}", self.username, hosts.join(","))
    }
}

/// Password generation policy for one provisioning call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PasswordPolicy {
    retries: u32,
    use_hashed_password: bool,
    password_length: usize,
}

impl PasswordPolicy {
    /// Create a policy, validating the retry budget and password length
    pub fn new(retries: u32, password_length: usize) -> ProvisioningResult<Self> {
        if !RETRIES_RANGE.contains(&retries) {
            return Err(ProvisioningError::InvalidPolicy(format!(
                "password retries must be between {} and {}, got {retries}",
                RETRIES_RANGE.start(),
                RETRIES_RANGE.end()
            )));
        }
        if !LENGTH_RANGE.contains(&password_length) {
            return Err(ProvisioningError::InvalidPolicy(format!(
                "password length must be between {} and {}, got {password_length}",
                LENGTH_RANGE.start(),
                LENGTH_RANGE.end()
            )));
        }
        Ok(Self {
            retries,
            use_hashed_password: true,
            password_length,
        })
    }

    /// Send the password in clear from the first attempt
    pub fn with_plaintext_password(mut self) -> Self {
        self.use_hashed_password = false;
        self
    }

    /// Total number of CREATE USER attempts allowed for generated passwords
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Whether the first attempt sends a pre-computed hash
    pub fn use_hashed_password(&self) -> bool {
        self.use_hashed_password
    }

    /// Length of generated passwords
    pub fn password_length(&self) -> usize {
        self.password_length
    }
}

impl Default for PasswordPolicy {
    fn default() -> Self {
        Self {
            retries: DEFAULT_PASSWORD_RETRIES,
            use_hashed_password: true,
            password_length: DEFAULT_PASSWORD_LENGTH,
        }
    }
}

/// How CREATE USER treats accounts that already exist
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccountCreateMode {
    /// `CREATE USER IF NOT EXISTS`; existing accounts are reused without grants
    #[default]
    IfNotExists,
    /// Plain `CREATE USER`; an existing account is an error
    Always,
    /// No CREATE USER and no GRANT; the account must already exist
    Never,
}

impl AccountCreateMode {
    /// Name as accepted on the command line
    pub fn as_str(self) -> &'static str {
        match self {
            Self::IfNotExists => "if-not-exists",
            Self::Always => "always",
            Self::Never => "never",
        }
    }
}

impl fmt::Display for AccountCreateMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccountCreateMode {
    type Err = ProvisioningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "if-not-exists" => Ok(Self::IfNotExists),
            "always" => Ok(Self::Always),
            "never" => Ok(Self::Never),
            other => Err(ProvisioningError::InvalidPolicy(format!(
                "unknown account create mode '{other}', expected if-not-exists, always or never"
            ))),
        }
    }
}

/// Result of a successful provisioning call
///
/// `created` and `already_existing` are disjoint and together cover every
/// host of the account.
#[derive(Debug, Clone)]
pub struct ProvisioningOutcome {
    /// Hosts whose account was created by this call
    pub created: BTreeSet<String>,
    /// Hosts whose account existed before this call
    pub already_existing: BTreeSet<String>,
    /// Password the account was created with, or the supplied one
    pub password: SecretString,
}
