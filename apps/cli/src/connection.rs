//! Metadata server connection over sqlx
//!
//! [`SqlxConnection`] implements the synchronous [`MetadataConnection`] by
//! blocking on a current-thread runtime it owns. Statements are sent with the
//! text protocol and never logged, since CREATE USER carries the password.

use std::fmt;
use std::time::Duration;

use anyhow::{Context, anyhow, bail};
use routerboot_account::{MetadataConnection, Row, SecretString, SqlError, SqlWarning};
use sqlx::mysql::{MySqlConnectOptions, MySqlConnection, MySqlDatabaseError, MySqlRow};
use sqlx::{ConnectOptions, Row as _};
use tokio::runtime::Runtime;
use tracing::{debug, info};
use url::Url;

const DEFAULT_PORT: u16 = 3306;
const DEFAULT_USER: &str = "root";

/// `CR_UNKNOWN_ERROR`, for failures without a server error number
const CR_UNKNOWN_ERROR: u16 = 2000;

/// Metadata server address with the credentials split off
#[derive(Clone, PartialEq, Eq)]
pub struct ServerAddress {
    /// Host name or address
    pub host: String,
    /// TCP port
    pub port: u16,
    /// Administrative user running the bootstrap
    pub user: String,
    /// Password given in the address, if any
    pub password: Option<SecretString>,
}

impl ServerAddress {
    /// Parse `[mysql://][user[:password]@]host[:port]`
    pub fn parse(input: &str) -> anyhow::Result<Self> {
        let with_scheme = if input.contains("://") {
            input.to_string()
        } else {
            format!("mysql://{input}")
        };
        let url = Url::parse(&with_scheme)
            .with_context(|| format!("Invalid metadata server address '{input}'"))?;

        if url.scheme() != "mysql" {
            bail!(
                "Unsupported scheme '{}' in metadata server address, expected mysql",
                url.scheme()
            );
        }
        let host = url
            .host_str()
            .filter(|host| !host.is_empty())
            .ok_or_else(|| anyhow!("Metadata server address '{input}' has no host"))?;

        let user = if url.username().is_empty() {
            DEFAULT_USER.to_string()
        } else {
            decode(url.username())?
        };
        let password = url.password().map(decode).transpose()?.map(SecretString::new);

        Ok(Self {
            host: host.to_string(),
            port: url.port().unwrap_or(DEFAULT_PORT),
            user,
            password,
        })
    }

    /// Address without credentials, as written to the router configuration
    pub fn public_uri(&self) -> String {
        format!("mysql://{}:{}", self.host, self.port)
    }
}

impl fmt::Display for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.user, self.host, self.port)
    }
}

impl fmt::Debug for ServerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ServerAddress")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Percent-decode a user info component; `+` stays literal
fn decode(component: &str) -> anyhow::Result<String> {
    let escaped = component.replace('+', "%2B");
    url::form_urlencoded::parse(format!("v={escaped}").as_bytes())
        .next()
        .map(|(_, value)| value.into_owned())
        .ok_or_else(|| anyhow!("Cannot decode '{component}' in metadata server address"))
}

/// Blocking MySQL session
pub struct SqlxConnection {
    runtime: Runtime,
    conn: MySqlConnection,
}

impl SqlxConnection {
    /// Connect and authenticate as `address.user` with `password`
    pub fn connect(
        address: &ServerAddress,
        password: &SecretString,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to build tokio runtime for the SQL driver")?;

        let options = MySqlConnectOptions::new()
            .host(&address.host)
            .port(address.port)
            .username(&address.user);
        let options = password.expose_secret(|p| options.password(p));

        let conn = runtime
            .block_on(async { tokio::time::timeout(timeout, options.connect()).await })
            .map_err(|_| anyhow!("Timed out after {timeout:?} connecting to {address}"))?
            .with_context(|| format!("Unable to connect to the metadata server at {address}"))?;

        info!(server = %address, "Connected to metadata server");
        Ok(Self { runtime, conn })
    }

    fn fetch(&mut self, sql: &str) -> Result<Vec<MySqlRow>, SqlError> {
        let conn = &mut self.conn;
        self.runtime
            .block_on(sqlx::raw_sql(sql).fetch_all(conn))
            .map_err(sql_error)
    }
}

impl MetadataConnection for SqlxConnection {
    fn execute(&mut self, sql: &str) -> Result<(), SqlError> {
        let conn = &mut self.conn;
        self.runtime
            .block_on(sqlx::raw_sql(sql).execute(conn))
            .map(|_| ())
            .map_err(sql_error)
    }

    fn query(&mut self, sql: &str) -> Result<Vec<Row>, SqlError> {
        let rows = self.fetch(sql)?;
        rows.iter().map(text_row).collect()
    }

    fn warnings(&mut self) -> Result<Vec<SqlWarning>, SqlError> {
        let rows = self.fetch("SHOW WARNINGS")?;
        let warnings = rows
            .iter()
            .map(|row| {
                Ok(SqlWarning {
                    level: row.try_get("Level").map_err(sql_error)?,
                    code: warning_code(row)?,
                    message: row.try_get("Message").map_err(sql_error)?,
                })
            })
            .collect::<Result<Vec<_>, SqlError>>()?;
        debug!(count = warnings.len(), "Read server warnings");
        Ok(warnings)
    }
}

fn warning_code(row: &MySqlRow) -> Result<u16, SqlError> {
    let code: u32 = row.try_get("Code").map_err(sql_error)?;
    u16::try_from(code).map_err(|_| {
        SqlError::new(
            CR_UNKNOWN_ERROR,
            "HY000",
            format!("warning code {code} out of range"),
        )
    })
}

/// Every column as text; integer columns are formatted
fn text_row(row: &MySqlRow) -> Result<Row, SqlError> {
    (0..row.len())
        .map(|index| {
            if let Ok(value) = row.try_get::<Option<String>, _>(index) {
                return Ok(value);
            }
            if let Ok(value) = row.try_get::<Option<i64>, _>(index) {
                return Ok(value.map(|v| v.to_string()));
            }
            row.try_get::<Option<u64>, _>(index)
                .map(|value| value.map(|v| v.to_string()))
                .map_err(sql_error)
        })
        .collect()
}

fn sql_error(error: sqlx::Error) -> SqlError {
    if let sqlx::Error::Database(db) = &error {
        if let Some(mysql) = db.try_downcast_ref::<MySqlDatabaseError>() {
            return SqlError::new(
                mysql.number(),
                mysql.code().unwrap_or("HY000"),
                mysql.message(),
            );
        }
        return SqlError::new(CR_UNKNOWN_ERROR, "HY000", db.message());
    }
    SqlError::new(CR_UNKNOWN_ERROR, "HY000", error.to_string())
}
