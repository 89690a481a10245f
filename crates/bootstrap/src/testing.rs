//! In-memory doubles for the system boundary
//!
//! Available in this crate's tests and, with the `test-util` feature, to
//! downstream crates.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::path::{Path, PathBuf};

use routerboot_keyring::{Prompter, SecretString};

use crate::system::{SystemIdentity, SystemUser};

/// [`SystemIdentity`] over a fixed user table that records ownership changes
#[derive(Debug, Default)]
pub struct RecordingIdentity {
    users: Vec<SystemUser>,
    chowned: RefCell<Vec<(PathBuf, String)>>,
}

impl RecordingIdentity {
    /// Identity without any users
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a known user
    pub fn with_user(mut self, name: &str, uid: u32, gid: u32) -> Self {
        self.users.push(SystemUser {
            name: name.to_string(),
            uid,
            gid,
        });
        self
    }

    /// `(path, user)` for every chown, in order
    pub fn chowned(&self) -> Vec<(PathBuf, String)> {
        self.chowned.borrow().clone()
    }
}

impl SystemIdentity for RecordingIdentity {
    fn lookup_user(&self, name: &str) -> io::Result<Option<SystemUser>> {
        Ok(self.users.iter().find(|user| user.name == name).cloned())
    }

    fn chown(&self, path: &Path, user: &SystemUser) -> io::Result<()> {
        if !path.exists() {
            return Err(io::Error::new(io::ErrorKind::NotFound, "no such file"));
        }
        self.chowned
            .borrow_mut()
            .push((path.to_path_buf(), user.name.clone()));
        Ok(())
    }

    fn switch_to(&self, _user: &SystemUser) -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::PermissionDenied,
            "bootstrap runs never switch user",
        ))
    }
}

/// [`Prompter`] answering from a queue; an empty queue is an I/O error
#[derive(Debug, Default)]
pub struct ScriptedPrompter {
    answers: VecDeque<String>,
    prompts: Vec<String>,
}

impl ScriptedPrompter {
    /// Prompter that answers `answers` in order
    pub fn new<I, S>(answers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            answers: answers.into_iter().map(Into::into).collect(),
            prompts: Vec::new(),
        }
    }

    /// Messages shown so far
    pub fn prompts(&self) -> &[String] {
        &self.prompts
    }
}

impl Prompter for ScriptedPrompter {
    fn prompt_secret(&mut self, message: &str) -> io::Result<SecretString> {
        self.prompts.push(message.to_string());
        self.answers
            .pop_front()
            .map(SecretString::new)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no scripted answer"))
    }
}
