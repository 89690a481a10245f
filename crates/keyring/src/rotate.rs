//! Master key rotation
//!
//! Re-keys an existing keyring under a fresh master key without changing its
//! identity. The re-sealed keyring is staged next to the original, the new
//! key is stored by its source, and only then is the staged keyring renamed
//! into place. If that rename fails the source gets the old key back, so the
//! key in force always opens the keyring on disk.

use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::crypto::MasterKey;
use crate::error::{KeyringError, MasterKeyError, MasterKeyResult};
use crate::keyring::KeyringId;
use crate::master_key_file::MasterKeyFile;
use crate::source::{MasterKeySource, read_external, write_external};
use crate::store::KeyringStore;

/// Result of a successful rotation
#[derive(Debug)]
pub struct RotationOutcome {
    /// Identity of the rotated keyring (unchanged)
    pub id: KeyringId,
    /// Number of secrets carried over
    pub entries: usize,
}

/// Re-key the keyring at `keyring_path` using `source`
pub fn rotate_master_key<S: KeyringStore>(
    store: &S,
    keyring_path: &Path,
    source: &MasterKeySource,
) -> MasterKeyResult<RotationOutcome> {
    let sealed = store.open(keyring_path)?;
    let id = sealed.id().clone();

    let missing = || MasterKeyError::MasterKeyMissing {
        keyring_path: keyring_path.to_path_buf(),
        origin: source.describe(),
    };

    let current = match source {
        MasterKeySource::File { path } => {
            let file = match MasterKeyFile::load(path) {
                Ok(file) => file,
                Err(KeyringError::NotFound { .. }) => return Err(missing()),
                Err(e) => return Err(e.into()),
            };
            file.get(&id, path)?.ok_or_else(missing)?
        }
        MasterKeySource::External { reader, .. } => {
            read_external(reader, &id)?.ok_or_else(missing)?
        }
        MasterKeySource::Interactive => {
            return Err(MasterKeyError::RotationUnsupported {
                origin: source.describe(),
            });
        }
    };

    let keyring = sealed.unseal(&current).map_err(|e| match e {
        KeyringError::DecryptionFailed { .. } => MasterKeyError::KeyMismatch {
            keyring_path: keyring_path.to_path_buf(),
            origin: source.describe(),
        },
        other => other.into(),
    })?;

    let new_key = MasterKey::generate();
    let staged = staging_path(keyring_path);
    store.save(&staged, &keyring, &new_key)?;

    if let Err(e) = store_key(source, &id, &new_key) {
        remove_staged(&staged);
        return Err(e);
    }

    if let Err(rename) = std::fs::rename(&staged, keyring_path) {
        remove_staged(&staged);
        if let Err(restore) = store_key(source, &id, &current) {
            warn!(
                keyring = %keyring_path.display(),
                error = %restore,
                "Failed to restore the previous master key"
            );
        }
        return Err(KeyringError::Write {
            path: keyring_path.to_path_buf(),
            source: rename,
        }
        .into());
    }

    info!(keyring = %keyring_path.display(), id = %id, "Master key rotated");
    Ok(RotationOutcome {
        id,
        entries: keyring.len(),
    })
}

/// Hand `key` for keyring `id` to the source
fn store_key(source: &MasterKeySource, id: &KeyringId, key: &MasterKey) -> MasterKeyResult<()> {
    match source {
        MasterKeySource::File { path } => MasterKeyFile::load(path)
            .and_then(|mut file| {
                file.insert(id, key)?;
                file.save(path)
            })
            .map_err(MasterKeyError::from),
        MasterKeySource::External { writer, .. } => write_external(writer, id, key),
        MasterKeySource::Interactive => Err(MasterKeyError::RotationUnsupported {
            origin: source.describe(),
        }),
    }
}

fn remove_staged(staged: &Path) {
    if let Err(e) = std::fs::remove_file(staged) {
        warn!(path = %staged.display(), error = %e, "Failed to remove staged keyring");
    }
}

fn staging_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("keyring");
    path.with_file_name(format!("{name}.rotating"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::KeyringResult;
    use crate::keyring::Keyring;
    use crate::secret::SecretString;
    use crate::store::{FileKeyringStore, SealedKeyring};
    use tempfile::TempDir;

    fn setup(dir: &Path) -> (PathBuf, PathBuf, KeyringId, MasterKey) {
        let keyring_path = dir.join("keyring");
        let key_path = dir.join("router.key");
        let key = MasterKey::generate();

        let mut keyring = Keyring::new();
        keyring.store("router_x", "password", SecretString::new("pw"));
        FileKeyringStore::new()
            .save(&keyring_path, &keyring, &key)
            .unwrap();

        let mut file = MasterKeyFile::new();
        file.insert(keyring.id(), &key).unwrap();
        file.save(&key_path).unwrap();

        (keyring_path, key_path, keyring.id().clone(), key)
    }

    #[test]
    fn test_rotation_keeps_identity_and_changes_key() {
        let dir = TempDir::new().unwrap();
        let (keyring_path, key_path, id, old_key) = setup(dir.path());
        let store = FileKeyringStore::new();
        let source = MasterKeySource::File {
            path: key_path.clone(),
        };

        let outcome = rotate_master_key(&store, &keyring_path, &source).unwrap();
        assert_eq!(outcome.id, id);
        assert_eq!(outcome.entries, 1);

        let new_key = MasterKeyFile::load(&key_path)
            .unwrap()
            .get(&id, &key_path)
            .unwrap()
            .unwrap();
        assert_ne!(new_key, old_key);
        assert_eq!(store.read_header(&keyring_path).unwrap(), id);

        let keyring = store.load(&keyring_path, &new_key).unwrap();
        assert_eq!(
            keyring.fetch("router_x", "password"),
            Some(&SecretString::new("pw"))
        );
        assert!(matches!(
            store.load(&keyring_path, &old_key),
            Err(KeyringError::DecryptionFailed { .. })
        ));
        assert!(!staging_path(&keyring_path).exists());
    }

    /// Reads the keyring from `real` whatever path it is asked for
    struct Redirected {
        real: PathBuf,
    }

    impl KeyringStore for Redirected {
        fn exists(&self, _path: &Path) -> bool {
            true
        }

        fn open(&self, _path: &Path) -> KeyringResult<SealedKeyring> {
            FileKeyringStore::new().open(&self.real)
        }

        fn save(&self, path: &Path, keyring: &Keyring, key: &MasterKey) -> KeyringResult<()> {
            FileKeyringStore::new().save(path, keyring, key)
        }
    }

    #[test]
    fn test_failed_swap_restores_previous_key() {
        let dir = TempDir::new().unwrap();
        let (real, key_path, id, old_key) = setup(dir.path());
        // A non-empty directory cannot be replaced by the staged file
        let keyring_path = dir.path().join("occupied");
        std::fs::create_dir(&keyring_path).unwrap();
        std::fs::write(keyring_path.join("entry"), b"x").unwrap();

        let err = rotate_master_key(
            &Redirected { real: real.clone() },
            &keyring_path,
            &MasterKeySource::File {
                path: key_path.clone(),
            },
        )
        .unwrap_err();

        assert!(matches!(
            err,
            MasterKeyError::Keyring(KeyringError::Write { .. })
        ));
        let in_force = MasterKeyFile::load(&key_path)
            .unwrap()
            .get(&id, &key_path)
            .unwrap()
            .unwrap();
        assert_eq!(in_force, old_key);
        FileKeyringStore::new().load(&real, &in_force).unwrap();
        assert!(!staging_path(&keyring_path).exists());
    }

    #[test]
    fn test_rotation_without_master_key_file_fails() {
        let dir = TempDir::new().unwrap();
        let (keyring_path, key_path, _, _) = setup(dir.path());
        std::fs::remove_file(&key_path).unwrap();

        let err = rotate_master_key(
            &FileKeyringStore::new(),
            &keyring_path,
            &MasterKeySource::File { path: key_path },
        )
        .unwrap_err();
        assert!(matches!(err, MasterKeyError::MasterKeyMissing { .. }));
    }

    #[test]
    fn test_interactive_rotation_is_unsupported() {
        let dir = TempDir::new().unwrap();
        let (keyring_path, _, _, _) = setup(dir.path());
        let err = rotate_master_key(
            &FileKeyringStore::new(),
            &keyring_path,
            &MasterKeySource::Interactive,
        )
        .unwrap_err();
        assert!(matches!(err, MasterKeyError::RotationUnsupported { .. }));
    }
}
