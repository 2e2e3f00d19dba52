//! Variable scoping and working directory state
//!
//! Lookups go through three layers: command-local assignments (see
//! [`CommandEnv`]), shell-scoped variables, and the environment the shell was
//! started with. Only the last two live in [`ShellEnv`]; a command-local
//! overlay borrows the shell scope for the lifetime of one command.

use std::collections::HashMap;
use std::fs;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use husk_builtins::VarLookup;
use husk_builtins::error::io_reason;

/// Failures of `cd`, rendered on the command's stderr
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EnvError {
    #[error("cd: OLDPWD not set")]
    NoPrevious,

    #[error("cd: HOME not set")]
    NoHome,

    #[error("cd: {path}: Not a directory")]
    NotADirectory { path: String },

    #[error("cd: {path}: {reason}")]
    Io { path: String, reason: String },
}

impl EnvError {
    /// Exit status of the failed `cd`
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::NotADirectory { .. } => 20,
            _ => 1,
        }
    }
}

/// A shell-scoped variable
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellVar {
    pub value: String,
    /// Passed on to spawned processes
    pub exported: bool,
}

/// Variables, working directory and `$?` of one shell scope.
///
/// Cloning is how subshells, pipeline stages and background jobs get their
/// private copy; the inherited baseline is shared.
#[derive(Debug, Clone)]
pub struct ShellEnv {
    inherited: Arc<HashMap<String, String>>,
    vars: HashMap<String, ShellVar>,
    cwd: PathBuf,
    previous_cwd: Option<PathBuf>,
    /// `$?`
    pub last_status: i32,
}

impl ShellEnv {
    #[must_use]
    pub fn new(inherited: HashMap<String, String>, cwd: PathBuf) -> Self {
        Self {
            inherited: Arc::new(inherited),
            vars: HashMap::new(),
            cwd,
            previous_cwd: None,
            last_status: 0,
        }
    }

    /// Start from the current process: its environment and working directory.
    ///
    /// # Errors
    ///
    /// When the process working directory cannot be read.
    pub fn from_process() -> io::Result<Self> {
        Ok(Self::new(std::env::vars().collect(), std::env::current_dir()?))
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        if name == "?" {
            return Some(self.last_status.to_string());
        }
        self.vars
            .get(name)
            .map(|var| var.value.clone())
            .or_else(|| self.inherited.get(name).cloned())
    }

    /// Set a shell-scoped variable. A variable that is already exported, or
    /// came from the inherited environment, stays exported.
    pub fn assign(&mut self, name: &str, value: String, exported: bool) {
        let was_exported =
            self.vars.get(name).is_some_and(|var| var.exported) || self.inherited.contains_key(name);
        self.vars.insert(
            name.to_string(),
            ShellVar {
                value,
                exported: exported || was_exported,
            },
        );
    }

    /// Promote an existing variable to exported. Unset names are ignored.
    pub fn export(&mut self, name: &str) {
        if let Some(var) = self.vars.get_mut(name) {
            var.exported = true;
        } else if let Some(value) = self.inherited.get(name) {
            let value = value.clone();
            self.vars.insert(name.to_string(), ShellVar { value, exported: true });
        }
    }

    /// Shell variables marked for export, sorted by name
    #[must_use]
    pub fn exported(&self) -> Vec<(&str, &str)> {
        let mut out: Vec<(&str, &str)> = self
            .vars
            .iter()
            .filter(|(_, var)| var.exported)
            .map(|(name, var)| (name.as_str(), var.value.as_str()))
            .collect();
        out.sort_unstable();
        out
    }

    /// Environment handed to spawned processes: the inherited baseline plus
    /// exported shell variables
    #[must_use]
    pub fn process_env(&self) -> HashMap<String, String> {
        let mut env = (*self.inherited).clone();
        for (name, var) in &self.vars {
            if var.exported {
                env.insert(name.clone(), var.value.clone());
            }
        }
        env
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    #[must_use]
    pub fn previous_cwd(&self) -> Option<&Path> {
        self.previous_cwd.as_deref()
    }

    /// Change directory. `-` swaps with the previous directory and no target
    /// means `$HOME`.
    ///
    /// # Errors
    ///
    /// [`EnvError`] when the target is missing, not a directory, or there is
    /// no previous directory to go back to.
    pub fn change_dir(&mut self, target: Option<&str>) -> Result<&Path, EnvError> {
        let (display, dest) = match target {
            Some("-") => {
                let previous = self.previous_cwd.clone().ok_or(EnvError::NoPrevious)?;
                (previous.display().to_string(), previous)
            }
            Some(target) => (target.to_string(), self.cwd.join(target)),
            None => {
                let home = self.get("HOME").ok_or(EnvError::NoHome)?;
                let dest = self.cwd.join(&home);
                (home, dest)
            }
        };

        let meta = fs::metadata(&dest).map_err(|err| match err.kind() {
            io::ErrorKind::NotADirectory => EnvError::NotADirectory { path: display.clone() },
            _ => EnvError::Io {
                path: display.clone(),
                reason: io_reason(&err),
            },
        })?;
        if !meta.is_dir() {
            return Err(EnvError::NotADirectory { path: display });
        }

        let dest = normalize(&dest);
        tracing::debug!(from = %self.cwd.display(), to = %dest.display(), "cd");
        self.previous_cwd = Some(std::mem::replace(&mut self.cwd, dest));
        Ok(&self.cwd)
    }

    /// Overlay `locals` on this scope for a single command
    #[must_use]
    pub fn command_env(&self, locals: Vec<(String, String)>) -> CommandEnv<'_> {
        CommandEnv {
            shell: self,
            locals: locals.into_iter().collect(),
        }
    }
}

impl VarLookup for ShellEnv {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name)
    }
}

/// Command-local assignments layered over a shell scope
#[derive(Debug)]
pub struct CommandEnv<'e> {
    shell: &'e ShellEnv,
    locals: HashMap<String, String>,
}

impl CommandEnv<'_> {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<String> {
        self.locals.get(name).cloned().or_else(|| self.shell.get(name))
    }

    /// The process environment with command-local assignments on top
    #[must_use]
    pub fn process_env(&self) -> HashMap<String, String> {
        let mut env = self.shell.process_env();
        env.extend(self.locals.iter().map(|(k, v)| (k.clone(), v.clone())));
        env
    }

    #[must_use]
    pub fn cwd(&self) -> &Path {
        self.shell.cwd()
    }
}

impl VarLookup for CommandEnv<'_> {
    fn var(&self, name: &str) -> Option<String> {
        self.get(name)
    }
}

/// Fold `.` and `..` out of an absolute path without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
