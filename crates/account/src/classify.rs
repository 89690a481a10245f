//! Classification of server errors and warnings
//!
//! Account names in server messages are matched strictly as
//! `'user'@'host'`; anything else is a parse failure carrying the raw text,
//! never a guess.

use std::collections::BTreeSet;
use std::sync::LazyLock;

use regex::Regex;

use crate::account::Account;
use crate::connection::{SqlError, SqlWarning};
use crate::error::{ProvisioningError, ProvisioningResult, Stage};

/// `ER_PLUGIN_IS_NOT_LOADED`
pub const ER_PLUGIN_IS_NOT_LOADED: u16 = 1524;
/// `ER_NOT_VALID_PASSWORD`
pub const ER_NOT_VALID_PASSWORD: u16 = 1819;
/// `ER_CANNOT_USER`
pub const ER_CANNOT_USER: u16 = 1396;
/// `ER_USER_ALREADY_EXISTS`, reported as a note by `IF NOT EXISTS`
pub const ER_USER_ALREADY_EXISTS: u16 = 3163;

const ACCOUNT: &str = r"'([^']*)'@'([^']*)'";

static ACCOUNT_RE: LazyLock<Regex> = LazyLock::new(|| compile(ACCOUNT));

static CREATE_USER_FAILED_RE: LazyLock<Regex> = LazyLock::new(|| {
    compile(&format!(
        r"^Operation CREATE USER failed for ((?:{ACCOUNT})(?:,{ACCOUNT})*)$"
    ))
});

static ALREADY_EXISTS_RE: LazyLock<Regex> =
    LazyLock::new(|| compile(&format!(r"^Authorization ID {ACCOUNT} already exists\.$")));

fn compile(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static account pattern is valid")
}

/// What a server error or warning means for provisioning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Password rejected by the validation policy
    PasswordPolicy,
    /// Authentication plugin not loaded
    PluginUnavailable,
    /// `Operation CREATE USER failed for ...`
    CreateUserFailed,
    /// Account already exists (warning)
    AccountAlreadyExists,
    /// Anything else
    Other,
}

fn category_of(code: u16) -> ErrorCategory {
    match code {
        ER_NOT_VALID_PASSWORD => ErrorCategory::PasswordPolicy,
        ER_PLUGIN_IS_NOT_LOADED => ErrorCategory::PluginUnavailable,
        ER_CANNOT_USER => ErrorCategory::CreateUserFailed,
        ER_USER_ALREADY_EXISTS => ErrorCategory::AccountAlreadyExists,
        _ => ErrorCategory::Other,
    }
}

/// Classify a server error
pub fn classify(error: &SqlError) -> ErrorCategory {
    category_of(error.code)
}

/// Classify a `SHOW WARNINGS` row
pub fn classify_warning(warning: &SqlWarning) -> ErrorCategory {
    category_of(warning.code)
}

/// Format one account the way the server quotes it
pub fn quoted_account(username: &str, host: &str) -> String {
    format!("'{username}'@'{host}'")
}

fn host_in_batch(
    account: &Account,
    username: &str,
    host: &str,
    stage: Stage,
    message: &str,
) -> ProvisioningResult<String> {
    if username != account.username() || !account.has_host(host) {
        return Err(ProvisioningError::ParseFailure {
            stage,
            reason: format!(
                "account {} is not part of {account}",
                quoted_account(username, host)
            ),
            message: message.to_string(),
        });
    }
    Ok(host.to_string())
}

/// Hosts named by `Operation CREATE USER failed for 'u'@'h1','u'@'h2'`
pub fn parse_create_user_failure(
    message: &str,
    account: &Account,
) -> ProvisioningResult<BTreeSet<String>> {
    let list = CREATE_USER_FAILED_RE
        .captures(message)
        .and_then(|caps| caps.get(1))
        .ok_or_else(|| ProvisioningError::ParseFailure {
            stage: Stage::CreateUser,
            reason: "unexpected CREATE USER failure message".to_string(),
            message: message.to_string(),
        })?;

    ACCOUNT_RE
        .captures_iter(list.as_str())
        .map(|caps| host_in_batch(account, &caps[1], &caps[2], Stage::CreateUser, message))
        .collect()
}

/// Host named by `Authorization ID 'u'@'h' already exists.`
pub fn parse_already_exists_warning(
    warning: &SqlWarning,
    account: &Account,
) -> ProvisioningResult<String> {
    let caps = ALREADY_EXISTS_RE
        .captures(&warning.message)
        .ok_or_else(|| ProvisioningError::ParseFailure {
            stage: Stage::ShowWarnings,
            reason: "unexpected account-exists warning".to_string(),
            message: warning.message.clone(),
        })?;
    host_in_batch(
        account,
        &caps[1],
        &caps[2],
        Stage::ShowWarnings,
        &warning.message,
    )
}
