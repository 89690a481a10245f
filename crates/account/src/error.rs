//! Provisioning errors

use std::collections::BTreeSet;
use std::fmt;

use thiserror::Error;

/// Step of the provisioning protocol an error occurred in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// `CREATE USER`
    CreateUser,
    /// `SHOW WARNINGS` after `CREATE USER`
    ShowWarnings,
    /// `GRANT` statements
    Grants,
    /// `START TRANSACTION` / `COMMIT`
    Transaction,
    /// `DROP USER` while undoing a bootstrap
    DropUser,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::CreateUser => "CREATE USER stage",
            Self::ShowWarnings => "SHOW WARNINGS stage",
            Self::Grants => "GRANTs stage",
            Self::Transaction => "transaction stage",
            Self::DropUser => "DROP USER stage",
        })
    }
}

/// Account provisioning errors
#[derive(Debug, Error)]
pub enum ProvisioningError {
    /// Operator supplied password rejected by the server's validation policy
    #[error("Password does not satisfy the server's password validation policy: {message}")]
    PolicyViolation {
        /// Server message
        message: String,
    },

    /// Server cannot create the account with the requested authentication
    #[error("Authentication plugin unavailable ({stage}): {message}")]
    PluginUnavailable {
        /// Stage that failed
        stage: Stage,
        /// Server message
        message: String,
    },

    /// Every generated password was rejected by the validation policy
    #[error(
        "Could not create a user account satisfying the password policy after {attempts} attempts \
         ({message}); decrease password validation policy or increase --password-retries"
    )]
    RetriesExhausted {
        /// Attempts made
        attempts: u32,
        /// Last server message
        message: String,
    },

    /// Plain CREATE USER found accounts that already exist
    #[error("Account(s) {} already exist on the server", join_accounts(accounts))]
    AccountExists {
        /// Existing `'user'@'host'` accounts
        accounts: BTreeSet<String>,
    },

    /// Server message did not match the expected account quoting
    #[error("Failed to parse server message ({stage}): {reason}: {message}")]
    ParseFailure {
        /// Stage the message came from
        stage: Stage,
        /// What did not match
        reason: String,
        /// Raw server message
        message: String,
    },

    /// No password supplied for an account that is not created
    #[error("An account password is required when the account is not created")]
    MissingPassword,

    /// Account definition is not usable
    #[error("Invalid account: {0}")]
    InvalidAccount(String),

    /// Policy or mode out of range
    #[error("Invalid account options: {0}")]
    InvalidPolicy(String),

    /// Any other server error
    #[error("Error in {stage}: {message} ({code})")]
    Unclassified {
        /// Stage that failed
        stage: Stage,
        /// Server error code
        code: u16,
        /// Server message
        message: String,
    },
}

impl ProvisioningError {
    pub(crate) fn unclassified(stage: Stage, error: crate::SqlError) -> Self {
        Self::Unclassified {
            stage,
            code: error.code,
            message: error.message,
        }
    }
}

fn join_accounts(accounts: &BTreeSet<String>) -> String {
    accounts.iter().map(String::as_str).collect::<Vec<_>>().join(",")
}

/// Result type alias for provisioning
pub type ProvisioningResult<T> = Result<T, ProvisioningError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SqlError;

    #[test]
    fn test_unclassified_names_stage() {
        let err = ProvisioningError::unclassified(
            Stage::Grants,
            SqlError::new(1142, "42000", "GRANT command denied to user 'admin'@'%'"),
        );
        assert_eq!(
            err.to_string(),
            "Error in GRANTs stage: GRANT command denied to user 'admin'@'%' (1142)"
        );
    }

    #[test]
    fn test_retries_exhausted_hint() {
        let err = ProvisioningError::RetriesExhausted {
            attempts: 3,
            message: "Your password does not satisfy the current policy requirements".into(),
        };
        assert!(err.to_string().contains("increase --password-retries"));
    }

    #[test]
    fn test_account_exists_lists_accounts() {
        let err = ProvisioningError::AccountExists {
            accounts: ["'r'@'h1'".to_string(), "'r'@'h2'".to_string()].into(),
        };
        assert_eq!(
            err.to_string(),
            "Account(s) 'r'@'h1','r'@'h2' already exist on the server"
        );
    }
}
