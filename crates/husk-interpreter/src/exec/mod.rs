//! Cooperative job executor
//!
//! A script run is a tree of state machines: [`ScriptRun`] walks statements,
//! each expression becomes a job (a pipeline or an `&&`/`||` chain), and each
//! pipeline owns its stages. Nothing blocks: [`drive`] steps the tree, and
//! when no step made progress it waits in poll(2) on the writer arena's fds
//! with a short backoff so child exits and `sleep` deadlines are noticed.

mod command;
mod job;
mod pipeline;
mod script;
mod shell_builtins;

use std::fs::File;
use std::io::{self, PipeReader};
use std::process::Stdio;
use std::rc::Rc;
use std::sync::{Arc, Once};
use std::time::Duration;

use husk_ast::Script;

use crate::env::ShellEnv;
use crate::error::ExecError;
use crate::expand::Substitute;
use crate::host::{HostBuffer, HostValue};
use crate::io::{IoArena, Sink, WriterId};
use crate::spawn::Spawner;

pub(crate) use script::ScriptRun;

const MIN_BACKOFF: Duration = Duration::from_millis(1);
const MAX_BACKOFF: Duration = Duration::from_millis(16);

/// Shared state of one run
pub(crate) struct ExecCtx<'a> {
    pub io: IoArena,
    pub spawner: &'a dyn Spawner,
    /// Values interpolated into the script, by slot index
    pub host: &'a [HostValue],
}

/// What a stage reads from
#[derive(Debug, Clone)]
pub(crate) enum Stdin {
    Null,
    /// The shell process's own stdin
    Inherit,
    /// Read end of the pipe from the previous stage
    Pipe(Rc<PipeReader>),
    File(Rc<File>),
    /// Host-provided bytes, fed through a fresh pipe per reader
    Bytes(Arc<[u8]>),
}

impl Stdin {
    /// Stdio for a child process. Byte sources get their own pipe, written
    /// through the arena.
    fn stdio(&self, io: &mut IoArena) -> Result<Stdio, ExecError> {
        Ok(match self {
            Self::Null => Stdio::null(),
            Self::Inherit => Stdio::inherit(),
            Self::Pipe(reader) => Stdio::from(reader.try_clone()?),
            Self::File(file) => Stdio::from(file.try_clone()?),
            Self::Bytes(bytes) => {
                let (reader, pipe) = io::pipe()?;
                let writer = io.acquire(Sink::Pipe(pipe));
                io.write(writer, bytes)?;
                io.release(writer)?;
                Stdio::from(reader)
            }
        })
    }
}

/// The standard streams of a stage or script. Whoever holds a `StageIo`
/// owns one reference to each writer in it.
#[derive(Debug)]
pub(crate) struct StageIo {
    pub stdin: Stdin,
    pub stdout: WriterId,
    pub stderr: WriterId,
}

impl StageIo {
    /// A second owner of the same streams
    fn share(&self, io: &mut IoArena) -> Result<Self, ExecError> {
        Ok(Self {
            stdin: self.stdin.clone(),
            stdout: io.retain(self.stdout)?,
            stderr: io.retain(self.stderr)?,
        })
    }

    /// Give up the writer references and drop stdin. Call once.
    fn release(&mut self, io: &mut IoArena) -> Result<(), ExecError> {
        self.stdin = Stdin::Null;
        io.release(self.stdout)?;
        io.release(self.stderr)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Completion {
    pub code: i32,
    /// Finished through `exit`
    pub exit: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Step {
    Pending { progressed: bool },
    Ready(Completion),
}

fn ignore_sigpipe() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        // SAFETY: installs the SIG_IGN disposition, no handler code runs
        unsafe {
            libc::signal(libc::SIGPIPE, libc::SIG_IGN);
        }
    });
}

/// Step `run` until it completes
pub(crate) fn drive(run: &mut ScriptRun<'_>, ctx: &mut ExecCtx<'_>) -> Result<Completion, ExecError> {
    ignore_sigpipe();
    let mut backoff = MIN_BACKOFF;
    loop {
        ctx.io.service(Duration::ZERO)?;
        match run.step(ctx)? {
            Step::Ready(done) => return Ok(done),
            Step::Pending { progressed: true } => backoff = MIN_BACKOFF,
            Step::Pending { progressed: false } => {
                ctx.io.service(backoff)?;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }
    }
}

/// Run `script` to completion on a fresh arena, writing to `stdout` and
/// `stderr`. Returns how it ended and the final shell scope.
pub(crate) fn run_script(
    script: &Script,
    env: ShellEnv,
    spawner: &dyn Spawner,
    host: &[HostValue],
    stdin: Stdin,
    stdout: Sink,
    stderr: Sink,
) -> Result<(Completion, ShellEnv), ExecError> {
    let mut ctx = ExecCtx {
        io: IoArena::new(),
        spawner,
        host,
    };
    let io = StageIo {
        stdin,
        stdout: ctx.io.acquire(stdout),
        stderr: ctx.io.acquire(stderr),
    };
    let mut run = ScriptRun::new(script, env, io);
    match drive(&mut run, &mut ctx) {
        Ok(done) => {
            tracing::trace!(live = ctx.io.live_writers(), "script finished");
            Ok((done, run.into_env()))
        }
        Err(err) => {
            if let Err(cancel) = run.cancel(&mut ctx) {
                tracing::warn!(%cancel, "cleanup after a failed run");
            }
            Err(err)
        }
    }
}

/// Command substitution inside a stage: runs nested scripts on the same
/// arena, with the stage's stderr
struct Substitution<'c, 'a> {
    ctx: &'c mut ExecCtx<'a>,
    stderr: WriterId,
    /// Exit code of the most recent substitution
    status: Option<i32>,
}

impl<'c, 'a> Substitution<'c, 'a> {
    fn new(ctx: &'c mut ExecCtx<'a>, stderr: WriterId) -> Self {
        Self {
            ctx,
            stderr,
            status: None,
        }
    }
}

impl Substitute for Substitution<'_, '_> {
    fn substitute(&mut self, script: &Script, env: &ShellEnv) -> Result<String, ExecError> {
        let buffer = HostBuffer::new();
        let stdout = self.ctx.io.acquire(Sink::Buffer {
            buffer: buffer.clone(),
            echo: None,
        });
        let io = StageIo {
            stdin: Stdin::Null,
            stdout,
            stderr: self.ctx.io.retain(self.stderr)?,
        };
        let mut run = ScriptRun::new(script, env.clone(), io);
        let done = drive(&mut run, self.ctx)?;
        self.status = Some(done.code);
        Ok(String::from_utf8_lossy(&buffer.take()).into_owned())
    }
}
