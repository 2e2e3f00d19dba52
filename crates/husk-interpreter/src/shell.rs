//! Embedding API: run scripts from Rust and capture their output

use std::collections::HashMap;
use std::io;
use std::path::PathBuf;

use husk_ast::{HuskError, Script};
use husk_parser::Parser;

use crate::env::ShellEnv;
use crate::error::ExecError;
use crate::exec::{Stdin, run_script};
use crate::host::{HostBuffer, Template};
use crate::io::{IoFault, Sink, StdStream};
use crate::spawn::{OsSpawner, Spawner};

/// How a script finished, with everything it wrote
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExitStatus {
    pub code: i32,
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

impl ExitStatus {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.code == 0
    }

    /// Stdout as text, invalid UTF-8 replaced
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.stdout).into_owned()
    }

    #[must_use]
    pub fn stderr_text(&self) -> String {
        String::from_utf8_lossy(&self.stderr).into_owned()
    }

    #[must_use]
    pub fn lines(&self) -> Vec<String> {
        self.text().lines().map(str::to_string).collect()
    }

    /// Parse stdout as JSON.
    ///
    /// # Errors
    ///
    /// When stdout is not a single JSON document.
    pub fn json(&self) -> serde_json::Result<serde_json::Value> {
        serde_json::from_slice(&self.stdout)
    }
}

/// What can go wrong running a script
#[derive(thiserror::Error, Debug)]
pub enum ShellError {
    /// Lexing, parsing or expansion failed; nothing after it ran
    #[error(transparent)]
    Syntax(HuskError),

    /// The writer arena was used incorrectly
    #[error(transparent)]
    Fatal(IoFault),

    #[error("husk: {0}")]
    Io(io::Error),

    /// Nonzero exit while throwing is enabled
    #[error("husk: script failed with exit code {}", .0.code)]
    Failed(ExitStatus),
}

impl From<ExecError> for ShellError {
    fn from(err: ExecError) -> Self {
        match err {
            ExecError::Fault(fault) => Self::Fatal(fault),
            ExecError::Expansion(err) => Self::Syntax(err),
            ExecError::Io(err) => Self::Io(err),
        }
    }
}

/// Runs scripts with captured output.
///
/// ```no_run
/// use husk_interpreter::{Shell, Template};
///
/// let shell = Shell::new().quiet();
/// let status = shell.run(Template::new().text("echo ").value("two words")).unwrap();
/// assert_eq!(status.text(), "two words\n");
/// ```
pub struct Shell {
    cwd: Option<PathBuf>,
    env: HashMap<String, String>,
    inherit_env: bool,
    quiet: bool,
    throws: bool,
    inherit_stdin: bool,
    spawner: Box<dyn Spawner>,
}

impl Default for Shell {
    fn default() -> Self {
        Self::new()
    }
}

impl Shell {
    /// A shell in the current directory with the process environment. Output
    /// is captured and echoed to the process streams; nonzero exits are
    /// returned as [`ShellError::Failed`].
    #[must_use]
    pub fn new() -> Self {
        Self {
            cwd: None,
            env: HashMap::new(),
            inherit_env: true,
            quiet: false,
            throws: true,
            inherit_stdin: false,
            spawner: Box::new(OsSpawner),
        }
    }

    #[must_use]
    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Add a variable to the environment scripts start with
    #[must_use]
    pub fn env(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(name.into(), value.into());
        self
    }

    /// Start from an empty environment instead of the process's
    #[must_use]
    pub fn env_clear(mut self) -> Self {
        self.inherit_env = false;
        self
    }

    /// Capture output without echoing it
    #[must_use]
    pub fn quiet(mut self) -> Self {
        self.quiet = true;
        self
    }

    /// Report nonzero exits as a normal [`ExitStatus`]
    #[must_use]
    pub fn nothrow(mut self) -> Self {
        self.throws = false;
        self
    }

    #[must_use]
    pub fn throws(mut self, throws: bool) -> Self {
        self.throws = throws;
        self
    }

    /// Let scripts read the process's stdin
    #[must_use]
    pub fn inherit_stdin(mut self) -> Self {
        self.inherit_stdin = true;
        self
    }

    #[must_use]
    pub fn spawner(mut self, spawner: impl Spawner + 'static) -> Self {
        self.spawner = Box::new(spawner);
        self
    }

    /// Parse and run a script.
    ///
    /// # Errors
    ///
    /// [`ShellError::Syntax`] for lex, parse and expansion errors,
    /// [`ShellError::Io`] when the shell cannot get OS resources, and
    /// [`ShellError::Failed`] for a nonzero exit unless [`Shell::nothrow`] is
    /// set.
    pub fn run(&self, template: impl Into<Template>) -> Result<ExitStatus, ShellError> {
        let template = template.into();
        let script = Parser::with_template(template.source(), &template.slots())
            .and_then(|parser| parser.parse())
            .map_err(ShellError::Syntax)?;
        self.run_parsed(&script, &template)
    }

    fn run_parsed(&self, script: &Script, template: &Template) -> Result<ExitStatus, ShellError> {
        let cwd = match &self.cwd {
            Some(cwd) => cwd.clone(),
            None => std::env::current_dir().map_err(ShellError::Io)?,
        };
        let mut inherited: HashMap<String, String> = if self.inherit_env {
            std::env::vars().collect()
        } else {
            HashMap::new()
        };
        inherited.extend(self.env.iter().map(|(k, v)| (k.clone(), v.clone())));

        let stdout = HostBuffer::new();
        let stderr = HostBuffer::new();
        let echo = |stream| (!self.quiet).then_some(stream);
        let stdin = if self.inherit_stdin { Stdin::Inherit } else { Stdin::Null };

        tracing::debug!(cwd = %cwd.display(), statements = script.statements.len(), "run");
        let (done, _) = run_script(
            script,
            ShellEnv::new(inherited, cwd),
            &*self.spawner,
            template.values(),
            stdin,
            Sink::Buffer {
                buffer: stdout.clone(),
                echo: echo(StdStream::Stdout),
            },
            Sink::Buffer {
                buffer: stderr.clone(),
                echo: echo(StdStream::Stderr),
            },
        )?;

        let status = ExitStatus {
            code: done.code,
            stdout: stdout.take(),
            stderr: stderr.take(),
        };
        if self.throws && !status.success() {
            return Err(ShellError::Failed(status));
        }
        Ok(status)
    }
}
