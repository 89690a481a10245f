//! Statement text for account provisioning

use crate::SecretString;
use crate::password::native_password_hash;

/// Privileges a router account needs, one GRANT each
const GRANTS: [&str; 6] = [
    "SELECT, EXECUTE ON mysql_innodb_cluster_metadata.*",
    "SELECT ON performance_schema.replication_group_members",
    "SELECT ON performance_schema.replication_group_member_stats",
    "SELECT ON performance_schema.global_variables",
    "INSERT, UPDATE, DELETE ON mysql_innodb_cluster_metadata.routers",
    "INSERT, UPDATE, DELETE ON mysql_innodb_cluster_metadata.v2_routers",
];

/// Escape `value` for use inside a single-quoted literal
pub(crate) fn escape(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        if matches!(c, '\'' | '\\') {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

fn account(username: &str, host: &str) -> String {
    format!("'{}'@'{}'", escape(username), escape(host))
}

fn account_list<'a>(username: &str, hosts: impl IntoIterator<Item = &'a String>) -> String {
    hosts
        .into_iter()
        .map(|host| account(username, host))
        .collect::<Vec<_>>()
        .join(",")
}

/// How the CREATE USER statement authenticates the account
pub(crate) enum Identification<'a> {
    /// `IDENTIFIED WITH mysql_native_password AS '<hash>'`
    Hashed(&'a SecretString),
    /// `IDENTIFIED BY '<password>'`
    Plaintext(&'a SecretString),
}

impl Identification<'_> {
    fn clause(&self) -> String {
        match self {
            Self::Hashed(password) => format!(
                "IDENTIFIED WITH mysql_native_password AS '{}'",
                native_password_hash(password)
            ),
            Self::Plaintext(password) => {
                password.expose_secret(|p| format!("IDENTIFIED BY '{}'", escape(p)))
            }
        }
    }
}

/// Batched CREATE USER for every host
pub(crate) fn create_user<'a>(
    username: &str,
    hosts: impl IntoIterator<Item = &'a String>,
    identification: &Identification<'_>,
    if_not_exists: bool,
) -> SecretString {
    let clause = identification.clause();
    let accounts = hosts
        .into_iter()
        .map(|host| format!("{} {clause}", account(username, host)))
        .collect::<Vec<_>>()
        .join(", ");
    let keyword = if if_not_exists {
        "CREATE USER IF NOT EXISTS"
    } else {
        "CREATE USER"
    };
    SecretString::new(format!("{keyword} {accounts}"))
}

/// The GRANT statements for `hosts`, each batching every host
pub(crate) fn grants<'a>(
    username: &str,
    hosts: impl IntoIterator<Item = &'a String>,
) -> Vec<String> {
    let accounts = account_list(username, hosts);
    GRANTS
        .iter()
        .map(|privileges| format!("GRANT {privileges} TO {accounts}"))
        .collect()
}

/// `DROP USER IF EXISTS` for `hosts`
pub(crate) fn drop_users<'a>(username: &str, hosts: impl IntoIterator<Item = &'a String>) -> String {
    format!("DROP USER IF EXISTS {}", account_list(username, hosts))
}
