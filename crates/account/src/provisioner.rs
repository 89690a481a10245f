//! Account provisioning protocol
//!
//! One attempt is `START TRANSACTION`, the batched `CREATE USER`, warning
//! classification, GRANTs for the new hosts and `COMMIT`. Every failed
//! attempt is rolled back before it is retried or reported.

use std::collections::BTreeSet;

use tracing::{debug, info, warn};

use crate::SecretString;
use crate::account::{Account, AccountCreateMode, PasswordPolicy, ProvisioningOutcome};
use crate::classify::{
    ErrorCategory, classify, classify_warning, parse_already_exists_warning,
    parse_create_user_failure, quoted_account,
};
use crate::connection::{MetadataConnection, SqlError};
use crate::error::{ProvisioningError, ProvisioningResult, Stage};
use crate::password;
use crate::sql::{self, Identification};

/// Why one attempt did not complete
enum AttemptError {
    /// Password rejected by the validation policy
    Policy(SqlError),
    /// Hashing plugin not loaded on the server
    Plugin(SqlError),
    /// Not retryable
    Fatal(ProvisioningError),
}

impl From<ProvisioningError> for AttemptError {
    fn from(e: ProvisioningError) -> Self {
        Self::Fatal(e)
    }
}

/// Hosts split by one successful attempt
struct Attempt {
    created: BTreeSet<String>,
    already_existing: BTreeSet<String>,
}

/// Creates router accounts on the metadata server
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountProvisioner {
    policy: PasswordPolicy,
    mode: AccountCreateMode,
}

impl AccountProvisioner {
    /// Provisioner with the given policy and create mode
    pub fn new(policy: PasswordPolicy, mode: AccountCreateMode) -> Self {
        Self { policy, mode }
    }

    /// Provision `account`, with `desired_password` or a generated one
    ///
    /// A supplied password is never replaced: if the server's validation
    /// policy rejects it, provisioning fails. Generated passwords are
    /// regenerated up to the policy's retry budget.
    pub fn provision(
        &self,
        conn: &mut dyn MetadataConnection,
        account: &Account,
        desired_password: Option<SecretString>,
    ) -> ProvisioningResult<ProvisioningOutcome> {
        if self.mode == AccountCreateMode::Never {
            let password = desired_password.ok_or(ProvisioningError::MissingPassword)?;
            info!(account = %account, "Using existing account");
            return Ok(ProvisioningOutcome {
                created: BTreeSet::new(),
                already_existing: account.hostnames().clone(),
                password,
            });
        }

        let supplied = desired_password.is_some();
        let mut password = desired_password
            .unwrap_or_else(|| password::generate(self.policy.password_length()));
        let mut hashed = self.policy.use_hashed_password();
        let mut attempts = 0u32;

        loop {
            attempts += 1;
            match self.attempt(conn, account, &password, hashed) {
                Ok(attempt) => {
                    info!(
                        account = %account,
                        created = attempt.created.len(),
                        already_existing = attempt.already_existing.len(),
                        attempts,
                        "Account provisioned"
                    );
                    return Ok(ProvisioningOutcome {
                        created: attempt.created,
                        already_existing: attempt.already_existing,
                        password,
                    });
                }
                Err(AttemptError::Plugin(e)) if hashed => {
                    warn!(
                        code = e.code,
                        "mysql_native_password is not available, retrying with a plaintext password"
                    );
                    hashed = false;
                    // The fallback reuses the password; it is not a new attempt
                    attempts -= 1;
                }
                Err(AttemptError::Plugin(e)) => {
                    return Err(ProvisioningError::PluginUnavailable {
                        stage: Stage::CreateUser,
                        message: e.message,
                    });
                }
                Err(AttemptError::Policy(e)) if supplied => {
                    return Err(ProvisioningError::PolicyViolation { message: e.message });
                }
                Err(AttemptError::Policy(e)) => {
                    if attempts >= self.policy.retries() {
                        return Err(ProvisioningError::RetriesExhausted {
                            attempts,
                            message: e.message,
                        });
                    }
                    debug!(attempts, "Generated password rejected by policy, generating another");
                    password = password::generate(self.policy.password_length());
                }
                Err(AttemptError::Fatal(e)) => return Err(e),
            }
        }
    }

    fn attempt(
        &self,
        conn: &mut dyn MetadataConnection,
        account: &Account,
        password: &SecretString,
        hashed: bool,
    ) -> Result<Attempt, AttemptError> {
        conn.execute("START TRANSACTION")
            .map_err(|e| ProvisioningError::unclassified(Stage::Transaction, e))?;

        let result = self.create_and_grant(conn, account, password, hashed).and_then(|attempt| {
            conn.execute("COMMIT")
                .map_err(|e| {
                    AttemptError::Fatal(ProvisioningError::unclassified(Stage::Transaction, e))
                })
                .map(|()| attempt)
        });
        if result.is_err() {
            rollback(conn);
        }
        result
    }

    fn create_and_grant(
        &self,
        conn: &mut dyn MetadataConnection,
        account: &Account,
        password: &SecretString,
        hashed: bool,
    ) -> Result<Attempt, AttemptError> {
        let if_not_exists = self.mode == AccountCreateMode::IfNotExists;
        let identification = if hashed {
            Identification::Hashed(password)
        } else {
            Identification::Plaintext(password)
        };
        let statement = sql::create_user(
            account.username(),
            account.hostnames(),
            &identification,
            if_not_exists,
        );

        if let Err(e) = statement.expose_secret(|s| conn.execute(s)) {
            return Err(match classify(&e) {
                ErrorCategory::PasswordPolicy => AttemptError::Policy(e),
                ErrorCategory::PluginUnavailable => AttemptError::Plugin(e),
                ErrorCategory::CreateUserFailed => {
                    let hosts = parse_create_user_failure(&e.message, account)?;
                    ProvisioningError::AccountExists {
                        accounts: hosts
                            .iter()
                            .map(|host| quoted_account(account.username(), host))
                            .collect(),
                    }
                    .into()
                }
                _ => ProvisioningError::unclassified(Stage::CreateUser, e).into(),
            });
        }

        let already_existing = if if_not_exists {
            existing_hosts(conn, account)?
        } else {
            BTreeSet::new()
        };
        let created: BTreeSet<String> = account
            .hostnames()
            .difference(&already_existing)
            .cloned()
            .collect();

        if !created.is_empty() {
            for grant in sql::grants(account.username(), &created) {
                conn.execute(&grant)
                    .map_err(|e| ProvisioningError::unclassified(Stage::Grants, e))?;
            }
        }

        Ok(Attempt {
            created,
            already_existing,
        })
    }
}

/// Hosts that `CREATE USER IF NOT EXISTS` reported as already present
fn existing_hosts(
    conn: &mut dyn MetadataConnection,
    account: &Account,
) -> ProvisioningResult<BTreeSet<String>> {
    let warnings = conn
        .warnings()
        .map_err(|e| ProvisioningError::unclassified(Stage::ShowWarnings, e))?;

    let mut existing = BTreeSet::new();
    for warning in &warnings {
        if classify_warning(warning) == ErrorCategory::AccountAlreadyExists {
            existing.insert(parse_already_exists_warning(warning, account)?);
        } else {
            debug!(
                level = %warning.level,
                code = warning.code,
                message = %warning.message,
                "Ignoring CREATE USER warning"
            );
        }
    }
    Ok(existing)
}

fn rollback(conn: &mut dyn MetadataConnection) {
    if let Err(e) = conn.execute("ROLLBACK") {
        warn!(code = e.code, error = %e.message, "ROLLBACK failed");
    }
}

/// Drop the accounts of `username` on `hosts`; used to undo a failed bootstrap
pub fn drop_accounts(
    conn: &mut dyn MetadataConnection,
    username: &str,
    hosts: &BTreeSet<String>,
) -> ProvisioningResult<()> {
    if hosts.is_empty() {
        return Ok(());
    }
    conn.execute(&sql::drop_users(username, hosts))
        .map_err(|e| ProvisioningError::unclassified(Stage::DropUser, e))?;
    info!(username, hosts = hosts.len(), "Dropped router accounts");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ER_CANNOT_USER, ER_NOT_VALID_PASSWORD, ER_PLUGIN_IS_NOT_LOADED};
    use crate::testing::ScriptedConnection;
    use pretty_assertions::assert_eq;

    fn policy_error() -> SqlError {
        SqlError::new(
            ER_NOT_VALID_PASSWORD,
            "HY000",
            "Your password does not satisfy the current policy requirements",
        )
    }

    fn hosts(list: &[&str]) -> BTreeSet<String> {
        list.iter().map(ToString::to_string).collect()
    }

    #[test]
    fn test_supplied_password_is_kept() {
        let mut conn = ScriptedConnection::new();
        let account = Account::new("r", ["%"]).unwrap();
        let outcome = AccountProvisioner::default()
            .provision(&mut conn, &account, Some(SecretString::new("secret")))
            .unwrap();
        assert_eq!(outcome.password, SecretString::new("secret"));
        assert_eq!(conn.count("COMMIT"), 1);
        assert_eq!(conn.count("ROLLBACK"), 0);
    }

    #[test]
    fn test_supplied_password_policy_violation_is_fatal() {
        let mut conn = ScriptedConnection::new().fail_always("CREATE USER", policy_error());
        let account = Account::new("r", ["%"]).unwrap();
        let err = AccountProvisioner::default()
            .provision(&mut conn, &account, Some(SecretString::new("weak")))
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::PolicyViolation { .. }));
        assert_eq!(conn.count("CREATE USER"), 1);
        assert_eq!(conn.count("ROLLBACK"), 1);
    }

    #[test]
    fn test_generated_password_retried_until_accepted() {
        let mut conn = ScriptedConnection::new().fail_times("CREATE USER", 2, policy_error());
        let account = Account::new("r", ["%"]).unwrap();
        let outcome = AccountProvisioner::default()
            .provision(&mut conn, &account, None)
            .unwrap();
        assert_eq!(conn.count("CREATE USER"), 3);
        assert_eq!(conn.count("ROLLBACK"), 2);
        assert_eq!(outcome.created, hosts(&["%"]));
        assert_eq!(outcome.password.len(), 32);
    }

    #[test]
    fn test_plugin_unavailable_after_fallback_is_fatal() {
        let mut conn = ScriptedConnection::new().fail_always(
            "CREATE USER",
            SqlError::new(ER_PLUGIN_IS_NOT_LOADED, "HY000", "Plugin 'x' is not loaded"),
        );
        let account = Account::new("r", ["%"]).unwrap();
        let err = AccountProvisioner::default()
            .provision(&mut conn, &account, Some(SecretString::new("secret")))
            .unwrap_err();
        assert!(matches!(err, ProvisioningError::PluginUnavailable { .. }));
        assert_eq!(conn.count("CREATE USER"), 2);
    }

    #[test]
    fn test_plaintext_policy_skips_hashing() {
        let mut conn = ScriptedConnection::new();
        let account = Account::new("r", ["%"]).unwrap();
        AccountProvisioner::new(
            PasswordPolicy::default().with_plaintext_password(),
            AccountCreateMode::IfNotExists,
        )
        .provision(&mut conn, &account, Some(SecretString::new("secret")))
        .unwrap();
        assert_eq!(
            conn.matching("CREATE USER"),
            vec!["CREATE USER IF NOT EXISTS 'r'@'%' IDENTIFIED BY 'secret'"]
        );
    }

    #[test]
    fn test_always_mode_reports_existing_accounts() {
        let mut conn = ScriptedConnection::new().fail_once(
            "CREATE USER",
            SqlError::new(
                ER_CANNOT_USER,
                "HY000",
                "Operation CREATE USER failed for 'r'@'h1'",
            ),
        );
        let account = Account::new("r", ["h1", "h2"]).unwrap();
        let err = AccountProvisioner::new(PasswordPolicy::default(), AccountCreateMode::Always)
            .provision(&mut conn, &account, Some(SecretString::new("secret")))
            .unwrap_err();
        match err {
            ProvisioningError::AccountExists { accounts } => {
                assert_eq!(accounts, hosts(&["'r'@'h1'"]));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert!(conn.matching("CREATE USER")[0].starts_with("CREATE USER 'r'@'h1'"));
        assert_eq!(conn.count("ROLLBACK"), 1);
        assert_eq!(conn.count("SHOW WARNINGS"), 0);
    }

    #[test]
    fn test_never_mode_issues_no_statements() {
        let mut conn = ScriptedConnection::new();
        let account = Account::new("r", ["h1", "h2"]).unwrap();
        let provisioner =
            AccountProvisioner::new(PasswordPolicy::default(), AccountCreateMode::Never);

        let outcome = provisioner
            .provision(&mut conn, &account, Some(SecretString::new("secret")))
            .unwrap();
        assert!(outcome.created.is_empty());
        assert_eq!(outcome.already_existing, hosts(&["h1", "h2"]));
        assert!(conn.statements().is_empty());

        let err = provisioner.provision(&mut conn, &account, None).unwrap_err();
        assert!(matches!(err, ProvisioningError::MissingPassword));
    }

    #[test]
    fn test_grant_failure_rolls_back_with_stage() {
        let mut conn = ScriptedConnection::new().fail_once(
            "GRANT INSERT",
            SqlError::new(1142, "42000", "INSERT command denied"),
        );
        let account = Account::new("r", ["%"]).unwrap();
        let err = AccountProvisioner::default()
            .provision(&mut conn, &account, Some(SecretString::new("secret")))
            .unwrap_err();
        assert!(err.to_string().contains("GRANTs stage"));
        assert_eq!(conn.count("ROLLBACK"), 1);
        assert_eq!(conn.count("COMMIT"), 0);
    }

    #[test]
    fn test_warnings_failure_is_show_warnings_stage() {
        let mut conn = ScriptedConnection::new()
            .fail_warnings(SqlError::new(2013, "HY000", "Lost connection"));
        let account = Account::new("r", ["%"]).unwrap();
        let err = AccountProvisioner::default()
            .provision(&mut conn, &account, Some(SecretString::new("secret")))
            .unwrap_err();
        assert!(matches!(
            err,
            ProvisioningError::Unclassified {
                stage: Stage::ShowWarnings,
                ..
            }
        ));
    }

    #[test]
    fn test_failed_rollback_returns_original_error() {
        let mut conn = ScriptedConnection::new()
            .fail_once("CREATE USER", SqlError::new(1045, "28000", "Access denied"))
            .fail_always("ROLLBACK", SqlError::new(2013, "HY000", "Lost connection"));
        let account = Account::new("r", ["%"]).unwrap();
        let err = AccountProvisioner::default()
            .provision(&mut conn, &account, Some(SecretString::new("secret")))
            .unwrap_err();
        match err {
            ProvisioningError::Unclassified { stage, code, .. } => {
                assert_eq!(stage, Stage::CreateUser);
                assert_eq!(code, 1045);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_drop_accounts() {
        let mut conn = ScriptedConnection::new();
        drop_accounts(&mut conn, "r", &hosts(&["h1", "h2"])).unwrap();
        drop_accounts(&mut conn, "r", &BTreeSet::new()).unwrap();
        assert_eq!(
            conn.statements(),
            ["DROP USER IF EXISTS 'r'@'h1','r'@'h2'".to_string()]
        );
    }
}
