//! husk interpreter
//!
//! Executes parsed scripts: word expansion, pipelines of builtins and
//! external processes, redirects, subshells and background jobs. Embedders
//! use [`Shell`]; the command-line front end keeps one [`Interpreter`] for
//! the life of the process.

mod env;
mod error;
mod exec;
mod expand;
mod host;
mod io;
mod shell;
mod spawn;

use husk_ast::Script;

pub use env::{CommandEnv, EnvError, ShellEnv, ShellVar};
pub use error::ExecError;
pub use expand::braces;
pub use host::{HostBuffer, HostValue, Template};
pub use io::{IoFault, StdStream};
pub use shell::{ExitStatus, Shell, ShellError};
pub use spawn::{OsSpawner, ProcessHandle, SpawnRequest, Spawner};

use exec::{Stdin, run_script};
use io::Sink;

/// A long-lived shell scope that streams straight to the process's stdout
/// and stderr. Variables, exports and the working directory carry over from
/// one script to the next.
pub struct Interpreter {
    env: ShellEnv,
    spawner: Box<dyn Spawner>,
}

impl Interpreter {
    #[must_use]
    pub fn new(env: ShellEnv) -> Self {
        Self {
            env,
            spawner: Box::new(OsSpawner),
        }
    }

    /// An interpreter over the current process's environment and directory.
    ///
    /// # Errors
    ///
    /// When the working directory cannot be read.
    pub fn from_process() -> std::io::Result<Self> {
        Ok(Self::new(ShellEnv::from_process()?))
    }

    #[must_use]
    pub fn with_spawner(mut self, spawner: impl Spawner + 'static) -> Self {
        self.spawner = Box::new(spawner);
        self
    }

    #[must_use]
    pub const fn env(&self) -> &ShellEnv {
        &self.env
    }

    /// Run `script` with the process's stdin and return its exit code.
    ///
    /// # Errors
    ///
    /// [`ShellError::Syntax`] for expansion errors, [`ShellError::Fatal`] and
    /// [`ShellError::Io`] when execution itself broke down. The scope is left
    /// as it was before the script in that case.
    pub fn execute(&mut self, script: &Script) -> Result<i32, ShellError> {
        let (done, env) = run_script(
            script,
            self.env.clone(),
            &*self.spawner,
            &[],
            Stdin::Inherit,
            Sink::Inherit(StdStream::Stdout),
            Sink::Inherit(StdStream::Stderr),
        )?;
        self.env = env;
        Ok(done.code)
    }
}
