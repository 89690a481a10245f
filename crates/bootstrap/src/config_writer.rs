//! Router configuration file rendering

use std::fmt::Write as _;
use std::io;
use std::path::{Path, PathBuf};

use routerboot_keyring::{MasterKeySource, atomic_write};

/// Values written to the router configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouterConfig {
    /// Router instance name
    pub name: String,
    /// Metadata server address, without credentials
    pub metadata_uri: String,
    /// Account the router connects as
    pub username: String,
    /// Keyring holding the account password
    pub keyring_path: PathBuf,
    /// Where the router finds the keyring master key at startup
    pub master_key: MasterKeySource,
}

/// Writes the router configuration file
pub trait ConfigWriter {
    /// Render `config` to `path`, replacing any previous file
    fn write(&self, path: &Path, config: &RouterConfig) -> io::Result<()>;
}

/// INI style configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct IniConfigWriter;

impl IniConfigWriter {
    /// Render without writing
    pub fn render(config: &RouterConfig) -> String {
        let mut out = String::new();
        // Writing to a String cannot fail
        let _ = writeln!(out, "# File automatically generated during router bootstrap");
        let _ = writeln!(out, "[DEFAULT]");
        let _ = writeln!(out, "name={}", config.name);
        let _ = writeln!(out, "keyring_path={}", config.keyring_path.display());
        match &config.master_key {
            MasterKeySource::File { path } => {
                let _ = writeln!(out, "master_key_path={}", path.display());
            }
            MasterKeySource::External { reader, writer } => {
                let _ = writeln!(out, "master_key_reader={}", reader.display());
                let _ = writeln!(out, "master_key_writer={}", writer.display());
            }
            // The router asks for the key when it starts
            MasterKeySource::Interactive => {}
        }
        let _ = writeln!(out);
        let _ = writeln!(out, "[metadata_cache:bootstrap]");
        let _ = writeln!(out, "bootstrap_server_addresses={}", config.metadata_uri);
        let _ = writeln!(out, "user={}", config.username);
        out
    }
}

impl ConfigWriter for IniConfigWriter {
    fn write(&self, path: &Path, config: &RouterConfig) -> io::Result<()> {
        atomic_write(path, Self::render(config).as_bytes())
    }
}
