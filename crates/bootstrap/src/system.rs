//! Operating system user operations
//!
//! [`SystemIdentity`] is injected wherever bootstrap touches file ownership
//! or process credentials; [`UnixIdentity`] is the real implementation.
#![allow(unsafe_code)]

use std::io;
use std::path::Path;

/// A resolved system user
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SystemUser {
    /// Login name
    pub name: String,
    /// User id
    pub uid: u32,
    /// Primary group id
    pub gid: u32,
}

/// User lookup, ownership changes and privilege switching
pub trait SystemIdentity {
    /// Look up a user by name; `Ok(None)` when no such user exists
    fn lookup_user(&self, name: &str) -> io::Result<Option<SystemUser>>;

    /// Give `path` to `user` and its primary group
    fn chown(&self, path: &Path, user: &SystemUser) -> io::Result<()>;

    /// Switch the process to `user`: group first, then user
    fn switch_to(&self, user: &SystemUser) -> io::Result<()>;
}

/// [`SystemIdentity`] backed by the C library
#[cfg(unix)]
#[derive(Debug, Clone, Copy, Default)]
pub struct UnixIdentity;

#[cfg(unix)]
impl SystemIdentity for UnixIdentity {
    fn lookup_user(&self, name: &str) -> io::Result<Option<SystemUser>> {
        use std::ffi::{CStr, CString};

        let c_name = CString::new(name)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "user name contains NUL"))?;
        let mut buf = vec![0 as libc::c_char; 4096];

        loop {
            // SAFETY: passwd is plain old data; getpwnam_r fills it and points
            // its strings into `buf`, which outlives every read below.
            let mut passwd: libc::passwd = unsafe { std::mem::zeroed() };
            let mut result: *mut libc::passwd = std::ptr::null_mut();
            // SAFETY: all pointers are valid for the duration of the call and
            // `buf.len()` is the true buffer size.
            let rc = unsafe {
                libc::getpwnam_r(
                    c_name.as_ptr(),
                    &raw mut passwd,
                    buf.as_mut_ptr(),
                    buf.len(),
                    &raw mut result,
                )
            };

            if rc == libc::ERANGE && buf.len() < 1 << 20 {
                buf.resize(buf.len() * 2, 0);
                continue;
            }
            if rc != 0 {
                return Err(io::Error::from_raw_os_error(rc));
            }
            if result.is_null() {
                return Ok(None);
            }

            // SAFETY: on success pw_name points to a NUL terminated string in `buf`
            let user_name = unsafe { CStr::from_ptr(passwd.pw_name) }
                .to_string_lossy()
                .into_owned();
            return Ok(Some(SystemUser {
                name: user_name,
                uid: passwd.pw_uid,
                gid: passwd.pw_gid,
            }));
        }
    }

    fn chown(&self, path: &Path, user: &SystemUser) -> io::Result<()> {
        std::os::unix::fs::chown(path, Some(user.uid), Some(user.gid))
    }

    fn switch_to(&self, user: &SystemUser) -> io::Result<()> {
        // SAFETY: plain syscalls without pointer arguments
        if unsafe { libc::setgid(user.gid) } != 0 {
            return Err(io::Error::last_os_error());
        }
        // SAFETY: as above
        if unsafe { libc::setuid(user.uid) } != 0 {
            return Err(io::Error::last_os_error());
        }
        tracing::info!(user = %user.name, uid = user.uid, gid = user.gid, "Switched user");
        Ok(())
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_root() {
        let root = UnixIdentity.lookup_user("root").unwrap().unwrap();
        assert_eq!(root.uid, 0);
        assert_eq!(root.name, "root");
    }

    #[test]
    fn test_lookup_unknown_user() {
        assert!(
            UnixIdentity
                .lookup_user("routerboot-no-such-user")
                .unwrap()
                .is_none()
        );
        assert!(UnixIdentity.lookup_user("bad\0name").is_err());
    }
}
