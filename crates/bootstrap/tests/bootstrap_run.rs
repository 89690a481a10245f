//! End-to-end bootstrap runs against a scripted server and a real filesystem
#![cfg(unix)]

use std::collections::BTreeMap;
use std::io;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use pretty_assertions::assert_eq;
use routerboot_account::password::native_password_hash;
use routerboot_account::testing::ScriptedConnection;
use routerboot_account::{Account, SqlWarning};
use routerboot_bootstrap::{
    BootstrapError, BootstrapOptions, BootstrapReport, Bootstrapper, ConfigWriter,
    IniConfigWriter, PASSWORD_FIELD, RouterConfig, UnixIdentity,
};
use routerboot_keyring::{
    FileKeyringStore, KeyOrigin, KeyringStore, MasterKey, MasterKeyError, MasterKeyFile,
    MasterKeySource, Prompter, SecretString,
};
use tempfile::TempDir;

const USER: &str = "router_1";

struct NoPrompt;

impl Prompter for NoPrompt {
    fn prompt_secret(&mut self, _message: &str) -> io::Result<SecretString> {
        panic!("file and external sources never prompt");
    }
}

struct FailingWriter;

impl ConfigWriter for FailingWriter {
    fn write(&self, _path: &Path, _config: &RouterConfig) -> io::Result<()> {
        Err(io::Error::new(io::ErrorKind::PermissionDenied, "read-only"))
    }
}

fn options(directory: &Path, hosts: &[&str]) -> BootstrapOptions {
    BootstrapOptions::new(
        directory,
        "mysql://db1:3306",
        Account::new(USER, hosts.iter().copied()).unwrap(),
    )
}

fn run_with(
    conn: &mut ScriptedConnection,
    options: &BootstrapOptions,
    writer: &dyn ConfigWriter,
) -> Result<BootstrapReport, BootstrapError> {
    let store = FileKeyringStore::new();
    let mut prompt = NoPrompt;
    Bootstrapper::new(&store, &UnixIdentity, writer, &mut prompt).run(conn, options)
}

fn run(
    conn: &mut ScriptedConnection,
    options: &BootstrapOptions,
) -> Result<BootstrapReport, BootstrapError> {
    run_with(conn, options, &IniConfigWriter)
}

fn exists_warning(host: &str) -> SqlWarning {
    SqlWarning::note(3163, format!("Authorization ID '{USER}'@'{host}' already exists."))
}

fn stored_password(options: &BootstrapOptions) -> SecretString {
    let store = FileKeyringStore::new();
    let MasterKeySource::File { path } = &options.master_key else {
        panic!("tests use the master key file");
    };
    let id = store.read_header(&options.keyring_path()).unwrap();
    let key = MasterKeyFile::load(path).unwrap().get(&id, path).unwrap().unwrap();
    store
        .load(&options.keyring_path(), &key)
        .unwrap()
        .fetch(USER, PASSWORD_FIELD)
        .cloned()
        .unwrap()
}

fn snapshot(dir: &Path) -> BTreeMap<PathBuf, Vec<u8>> {
    std::fs::read_dir(dir)
        .unwrap()
        .map(|entry| {
            let path = entry.unwrap().path();
            let data = std::fs::read(&path).unwrap();
            (path, data)
        })
        .collect()
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

#[test]
fn test_fresh_bootstrap_creates_account_keyring_and_config() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("router");
    let options = options(&target, &["%"]);
    let mut conn = ScriptedConnection::new();

    let report = run(&mut conn, &options).unwrap();

    assert!(report.fresh_install);
    assert_eq!(report.created, ["%".to_string()].into());
    assert!(report.already_existing.is_empty());
    assert_eq!(report.key_origin, KeyOrigin::Generated);
    assert_eq!(conn.count("CREATE USER IF NOT EXISTS 'router_1'@'%'"), 1);
    assert_eq!(conn.count("GRANT "), 6);
    assert_eq!(conn.count("COMMIT"), 1);
    assert_eq!(conn.count("ROLLBACK"), 0);

    let mode = std::fs::metadata(&target).unwrap().permissions().mode();
    assert_eq!(mode & 0o777, 0o700);
    let config = std::fs::read_to_string(options.config_path()).unwrap();
    assert!(config.contains("user=router_1\n"));
    assert!(config.contains(&format!("keyring_path={}\n", options.keyring_path().display())));
    assert_eq!(stored_password(&options).len(), 32);
}

#[test]
fn test_rebootstrap_reuses_keyring_password() {
    let dir = TempDir::new().unwrap();
    let options = options(&dir.path().join("router"), &["%"]);
    run(&mut ScriptedConnection::new(), &options).unwrap();
    let first_password = stored_password(&options);

    let mut conn = ScriptedConnection::new().with_warnings(vec![exists_warning("%")]);
    let report = run(&mut conn, &options).unwrap();

    assert!(!report.fresh_install);
    assert!(report.created.is_empty());
    assert_eq!(report.already_existing, ["%".to_string()].into());
    assert_eq!(report.key_origin, KeyOrigin::Existing);
    assert_eq!(conn.count("GRANT "), 0);
    assert_eq!(stored_password(&options), first_password);
    // The reused password is the one sent to the server
    let creates = conn.matching("CREATE USER");
    assert!(creates[0].contains(&native_password_hash(&first_password)));
    // Backups are gone once the run succeeded
    let names: Vec<_> = snapshot(&dir.path().join("router")).into_keys().collect();
    assert!(names.iter().all(|path| path.extension().is_none_or(|ext| ext != "bak")));
}

#[test]
fn test_failure_after_provisioning_removes_fresh_directory_and_accounts() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("router");
    let mut options = options(&target, &["%", "10.0.0.%"]);
    options.master_key = MasterKeySource::External {
        reader: script(dir.path(), "reader.sh", "echo 'vault sealed' >&2; exit 3"),
        writer: script(dir.path(), "writer.sh", "exit 0"),
    };
    let mut conn = ScriptedConnection::new();

    let err = run(&mut conn, &options).unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::MasterKey(MasterKeyError::ReaderFailed { .. })
    ));
    assert!(!target.exists());
    assert_eq!(
        conn.matching("DROP USER"),
        vec!["DROP USER IF EXISTS 'router_1'@'%','router_1'@'10.0.0.%'"]
    );
}

#[test]
fn test_failure_in_existing_directory_restores_previous_files() {
    let dir = TempDir::new().unwrap();
    let options_v1 = options(dir.path(), &["%"]);
    run(&mut ScriptedConnection::new(), &options_v1).unwrap();
    let before = snapshot(dir.path());

    let options_v2 = options(dir.path(), &["%", "10.0.0.%"]);
    let mut conn = ScriptedConnection::new().with_warnings(vec![exists_warning("%")]);
    let err = run_with(&mut conn, &options_v2, &FailingWriter).unwrap_err();

    assert!(matches!(err, BootstrapError::Io { .. }));
    // Only the account created by this run is dropped
    assert_eq!(
        conn.matching("DROP USER"),
        vec!["DROP USER IF EXISTS 'router_1'@'10.0.0.%'"]
    );
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn test_failed_rebootstrap_keeps_operator_backup_files() {
    let dir = TempDir::new().unwrap();
    let options = options(dir.path(), &["%"]);
    run(&mut ScriptedConnection::new(), &options).unwrap();
    let operator_backup = dir.path().join("routerboot.conf.bak");
    std::fs::write(&operator_backup, b"operator's own backup").unwrap();
    let before = snapshot(dir.path());

    let mut conn = ScriptedConnection::new().with_warnings(vec![exists_warning("%")]);
    run_with(&mut conn, &options, &FailingWriter).unwrap_err();

    assert_eq!(
        std::fs::read(&operator_backup).unwrap(),
        b"operator's own backup"
    );
    assert_eq!(snapshot(dir.path()), before);
}

#[test]
fn test_failed_fresh_bootstrap_removes_created_parent_directories() {
    let dir = TempDir::new().unwrap();
    let outer = dir.path().join("a");
    let options = options(&outer.join("b").join("router"), &["%"]);
    let mut conn = ScriptedConnection::new();

    run_with(&mut conn, &options, &FailingWriter).unwrap_err();

    assert!(!outer.exists());
    assert!(dir.path().is_dir());
    assert_eq!(conn.matching("DROP USER"), vec!["DROP USER IF EXISTS 'router_1'@'%'"]);
}

#[test]
fn test_existing_account_with_unknown_password_is_rejected() {
    let dir = TempDir::new().unwrap();
    let target = dir.path().join("router");
    let options = options(&target, &["%", "10.0.0.%"]);
    let mut conn = ScriptedConnection::new().with_warnings(vec![exists_warning("%")]);

    let err = run(&mut conn, &options).unwrap_err();

    match &err {
        BootstrapError::UnknownAccountPassword { accounts } => {
            assert_eq!(accounts, &["'router_1'@'%'".to_string()].into());
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(err.exit_code(), 1);
    assert_eq!(
        conn.matching("DROP USER"),
        vec!["DROP USER IF EXISTS 'router_1'@'10.0.0.%'"]
    );
    assert!(!target.exists());
}

#[test]
fn test_wrong_master_key_is_reported_without_touching_files() {
    let dir = TempDir::new().unwrap();
    let install = dir.path().join("router");
    let options_v1 = options(&install, &["%"]);
    run(&mut ScriptedConnection::new(), &options_v1).unwrap();
    let before = snapshot(&install);

    // A second key file that knows the keyring id, with a different key
    let id = FileKeyringStore::new()
        .read_header(&options_v1.keyring_path())
        .unwrap();
    let other_key_file = dir.path().join("other.key");
    let mut file = MasterKeyFile::new();
    file.insert(&id, &MasterKey::generate()).unwrap();
    file.save(&other_key_file).unwrap();

    let mut options_v2 = options_v1.clone();
    options_v2.master_key = MasterKeySource::File {
        path: other_key_file,
    };
    let mut conn = ScriptedConnection::new();
    let err = run(&mut conn, &options_v2).unwrap_err();

    assert!(matches!(
        err,
        BootstrapError::MasterKey(MasterKeyError::KeyMismatch { .. })
    ));
    // The keyring is opened before the server is touched
    assert!(conn.statements().is_empty());
    assert_eq!(snapshot(&install), before);
}

#[test]
fn test_non_empty_directory_is_refused_before_any_change() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();
    let mut conn = ScriptedConnection::new();

    let err = run(&mut conn, &options(dir.path(), &["%"])).unwrap_err();

    assert!(matches!(err, BootstrapError::DirectoryNotEmpty { .. }));
    assert_eq!(err.exit_code(), 2);
    assert!(conn.statements().is_empty());
    assert_eq!(
        std::fs::read_dir(dir.path()).unwrap().count(),
        1,
        "nothing was added"
    );
}

#[test]
fn test_force_bootstraps_into_non_empty_directory() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("notes.txt"), b"keep me").unwrap();
    let mut options = options(dir.path(), &["%"]);
    options.force = true;

    let report = run(&mut ScriptedConnection::new(), &options).unwrap();

    assert!(!report.fresh_install);
    assert!(options.config_path().exists());
    assert_eq!(
        std::fs::read(dir.path().join("notes.txt")).unwrap(),
        b"keep me"
    );
}
