//! Starting external programs

use std::collections::HashMap;
use std::io;
use std::os::unix::process::{CommandExt, ExitStatusExt};
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};

use husk_builtins::which::resolve_program;

/// Everything needed to start one external command
#[derive(Debug)]
pub struct SpawnRequest {
    /// `argv[0]` is the command name as written in the script
    pub argv: Vec<String>,
    /// The complete environment of the child
    pub env: HashMap<String, String>,
    pub cwd: PathBuf,
    pub stdin: Stdio,
    pub stdout: Stdio,
    pub stderr: Stdio,
}

/// A running child process
pub trait ProcessHandle {
    /// Exit code if the process has finished.
    ///
    /// # Errors
    ///
    /// OS errors from waiting on the process.
    fn try_wait(&mut self) -> io::Result<Option<i32>>;

    /// Ask the process to stop.
    ///
    /// # Errors
    ///
    /// OS errors from signalling the process.
    fn kill(&mut self) -> io::Result<()>;

    /// Block until the process finishes.
    ///
    /// # Errors
    ///
    /// OS errors from waiting on the process.
    fn wait(&mut self) -> io::Result<i32>;
}

/// Starts external processes on behalf of the interpreter
pub trait Spawner {
    /// Start `request`. A program that cannot be found is reported as
    /// [`io::ErrorKind::NotFound`].
    ///
    /// # Errors
    ///
    /// `NotFound` for unknown programs, other OS errors from spawning.
    fn spawn(&self, request: SpawnRequest) -> io::Result<Box<dyn ProcessHandle>>;
}

/// Spawns real processes through `std::process::Command`, looking programs
/// up in the request's `PATH`
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSpawner;

impl Spawner for OsSpawner {
    fn spawn(&self, request: SpawnRequest) -> io::Result<Box<dyn ProcessHandle>> {
        let Some((name, args)) = request.argv.split_first() else {
            return Err(io::ErrorKind::InvalidInput.into());
        };
        let program = resolve_program(name, request.env.get("PATH").map(String::as_str), &request.cwd)
            .ok_or_else(|| io::Error::from(io::ErrorKind::NotFound))?;

        let child = Command::new(&program)
            .arg0(name)
            .args(args)
            .env_clear()
            .envs(&request.env)
            .current_dir(&request.cwd)
            .stdin(request.stdin)
            .stdout(request.stdout)
            .stderr(request.stderr)
            .spawn()?;
        tracing::debug!(pid = child.id(), program = %program.display(), "spawned");
        Ok(Box::new(OsProcess(child)))
    }
}

struct OsProcess(Child);

impl ProcessHandle for OsProcess {
    fn try_wait(&mut self) -> io::Result<Option<i32>> {
        Ok(self.0.try_wait()?.map(exit_code))
    }

    fn kill(&mut self) -> io::Result<()> {
        self.0.kill()
    }

    fn wait(&mut self) -> io::Result<i32> {
        Ok(exit_code(self.0.wait()?))
    }
}

/// Shell exit code: the status itself, or 128 + signal number
fn exit_code(status: std::process::ExitStatus) -> i32 {
    status
        .code()
        .unwrap_or_else(|| 128 + status.signal().unwrap_or(0))
}
