//! External master key reader/writer contract, exercised with shell scripts
#![cfg(unix)]

use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use routerboot_keyring::{
    FileKeyringStore, KeyOrigin, Keyring, KeyringStore, KeyringTarget, MasterKey,
    MasterKeyError, MasterKeySource, Prompter, SecretString, rotate_master_key,
};
use tempfile::TempDir;

struct NoPrompt;

impl Prompter for NoPrompt {
    fn prompt_secret(&mut self, _message: &str) -> std::io::Result<SecretString> {
        panic!("external sources never prompt");
    }
}

fn script(dir: &Path, name: &str, body: &str) -> PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    path
}

/// Reader that prints the key stored by the paired writer, if any
fn reader_writer_pair(dir: &Path) -> (PathBuf, PathBuf) {
    let store = dir.join("store");
    std::fs::create_dir(&store).unwrap();
    let reader = script(
        dir,
        "reader.sh",
        &format!(
            "if [ -f '{0}/'\"$1\" ]; then cat '{0}/'\"$1\"; fi",
            store.display()
        ),
    );
    let writer = script(
        dir,
        "writer.sh",
        &format!("cat > '{0}/'\"$1\"", store.display()),
    );
    (reader, writer)
}

#[test]
fn test_empty_reader_output_generates_and_writes_key() {
    let dir = TempDir::new().unwrap();
    let (reader, writer) = reader_writer_pair(dir.path());
    let source = MasterKeySource::External { reader, writer };
    let keyring = Keyring::new();
    let keyring_path = dir.path().join("keyring");

    let target = KeyringTarget {
        path: &keyring_path,
        id: keyring.id(),
        exists: false,
    };
    let resolved = source.resolve(&target, &mut NoPrompt).unwrap();
    assert_eq!(resolved.origin(), KeyOrigin::Generated);

    // Nothing is handed to the writer before persist
    let stored = dir.path().join("store").join(keyring.id().as_str());
    assert!(!stored.exists());

    let key = resolved.persist().unwrap();
    let written = std::fs::read_to_string(&stored).unwrap();
    assert_eq!(MasterKey::new(written.as_str()), key);

    // A second resolution reads the stored key back
    let again = source.resolve(&target, &mut NoPrompt).unwrap();
    assert_eq!(again.origin(), KeyOrigin::Existing);
    assert_eq!(again.key(), &key);
}

#[test]
fn test_reader_nonzero_exit_is_fatal() {
    let dir = TempDir::new().unwrap();
    let reader = script(dir.path(), "reader.sh", "echo 'vault sealed' >&2\nexit 3");
    let writer = script(dir.path(), "writer.sh", "exit 0");
    let source = MasterKeySource::External { reader, writer };
    let keyring = Keyring::new();
    let keyring_path = dir.path().join("keyring");

    let err = source
        .resolve(
            &KeyringTarget {
                path: &keyring_path,
                id: keyring.id(),
                exists: false,
            },
            &mut NoPrompt,
        )
        .unwrap_err();
    match err {
        MasterKeyError::ReaderFailed { stderr, status, .. } => {
            assert_eq!(stderr, "vault sealed");
            assert_eq!(status.code(), Some(3));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_writer_nonzero_exit_is_fatal() {
    let dir = TempDir::new().unwrap();
    let reader = script(dir.path(), "reader.sh", "exit 0");
    let writer = script(dir.path(), "writer.sh", "cat > /dev/null\nexit 1");
    let source = MasterKeySource::External { reader, writer };
    let keyring = Keyring::new();
    let keyring_path = dir.path().join("keyring");

    let resolved = source
        .resolve(
            &KeyringTarget {
                path: &keyring_path,
                id: keyring.id(),
                exists: false,
            },
            &mut NoPrompt,
        )
        .unwrap();
    let err = resolved.persist().unwrap_err();
    assert!(matches!(err, MasterKeyError::WriterFailed { .. }));
}

#[test]
fn test_unknown_key_for_existing_keyring_is_missing() {
    let dir = TempDir::new().unwrap();
    let reader = script(dir.path(), "reader.sh", "exit 0");
    let writer = script(dir.path(), "writer.sh", "exit 0");
    let source = MasterKeySource::External { reader, writer };
    let keyring = Keyring::new();
    let keyring_path = dir.path().join("keyring");

    let err = source
        .resolve(
            &KeyringTarget {
                path: &keyring_path,
                id: keyring.id(),
                exists: true,
            },
            &mut NoPrompt,
        )
        .unwrap_err();
    assert!(matches!(err, MasterKeyError::MasterKeyMissing { .. }));
}

#[test]
fn test_reader_receives_identity_token() {
    let dir = TempDir::new().unwrap();
    let seen = dir.path().join("seen");
    let reader = script(
        dir.path(),
        "reader.sh",
        &format!("printf '%s' \"$1\" > '{}'\necho fixed-key", seen.display()),
    );
    let writer = script(dir.path(), "writer.sh", "exit 0");
    let source = MasterKeySource::External { reader, writer };
    let keyring = Keyring::new();
    let keyring_path = dir.path().join("keyring");

    let resolved = source
        .resolve(
            &KeyringTarget {
                path: &keyring_path,
                id: keyring.id(),
                exists: true,
            },
            &mut NoPrompt,
        )
        .unwrap();
    assert_eq!(resolved.key(), &MasterKey::new("fixed-key"));
    assert_eq!(std::fs::read_to_string(&seen).unwrap(), keyring.id().as_str());
}

#[test]
fn test_rotation_through_writer() {
    let dir = TempDir::new().unwrap();
    let (reader, writer) = reader_writer_pair(dir.path());
    let source = MasterKeySource::External { reader, writer };
    let store = FileKeyringStore::new();
    let keyring_path = dir.path().join("keyring");

    let mut keyring = Keyring::new();
    keyring.store("router_1", "password", SecretString::new("db-pw"));
    let target = KeyringTarget {
        path: &keyring_path,
        id: keyring.id(),
        exists: false,
    };
    let old_key = source.resolve(&target, &mut NoPrompt).unwrap().persist().unwrap();
    store.save(&keyring_path, &keyring, &old_key).unwrap();

    let outcome = rotate_master_key(&store, &keyring_path, &source).unwrap();
    assert_eq!(&outcome.id, keyring.id());

    let new_key = source
        .resolve(
            &KeyringTarget {
                exists: true,
                ..target
            },
            &mut NoPrompt,
        )
        .unwrap();
    assert_ne!(new_key.key(), &old_key);
    let reopened = store.load(&keyring_path, new_key.key()).unwrap();
    assert_eq!(
        reopened.fetch("router_1", "password"),
        Some(&SecretString::new("db-pw"))
    );
}
