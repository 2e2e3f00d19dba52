//! Starting a single stage: expansion, redirects and dispatch

use std::fs::{File, OpenOptions};
use std::io;
use std::path::Path;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};

use husk_ast::{Assign, Cmd, HuskError, Redirect, RedirectSpec, RedirectTarget, Subshell};
use husk_builtins::error::io_reason;
use husk_builtins::{Builtin, Invocation, Outcome, Streams};

use super::pipeline::{Running, StageItem, StageState};
use super::{ExecCtx, ScriptRun, StageIo, Stdin, Substitution, shell_builtins};
use crate::env::ShellEnv;
use crate::error::ExecError;
use crate::expand::Expander;
use crate::host::HostValue;
use crate::io::{IoArena, IoFault, Sink, Ticket, TicketState, WriterId};
use crate::spawn::SpawnRequest;

/// A redirect with its target expanded
enum Target {
    Path(String),
    Host(usize),
    Duplicate,
}

/// Start `item` on `io`. Whatever ends up in `io` afterwards is owned by the
/// stage and released when it retires.
pub(super) fn launch<'s>(
    item: StageItem<'s>,
    io: &mut StageIo,
    ctx: &mut ExecCtx<'_>,
    env: &mut ShellEnv,
) -> Result<StageState<'s>, ExecError> {
    match item {
        StageItem::Assign(assigns) => assign_only(assigns, io, ctx, env),
        StageItem::Cmd(cmd) => command(cmd, io, ctx, env),
        StageItem::Subshell(subshell) => subshell_stage(subshell, io, ctx, env),
    }
}

fn assign_only<'s>(
    assigns: &[Assign],
    io: &mut StageIo,
    ctx: &mut ExecCtx<'_>,
    env: &mut ShellEnv,
) -> Result<StageState<'s>, ExecError> {
    io.stdin = Stdin::Null;
    let mut code = 0;
    for assign in assigns {
        if assign.value.is_none() && assign.exported {
            env.export(&assign.label);
            continue;
        }
        let mut subst = Substitution::new(&mut *ctx, io.stderr);
        let value = Expander::new(env, &mut subst).assign_value(assign)?;
        // The last substitution's status becomes the statement's
        if let Some(status) = subst.status {
            code = status;
        }
        env.assign(&assign.label, value, assign.exported);
    }
    Ok(StageState::finished(code, false, Vec::new()))
}

fn command<'s>(
    cmd: &Cmd,
    io: &mut StageIo,
    ctx: &mut ExecCtx<'_>,
    env: &mut ShellEnv,
) -> Result<StageState<'s>, ExecError> {
    let (argv, locals, targets, substituted) = {
        let mut subst = Substitution::new(&mut *ctx, io.stderr);
        let mut expander = Expander::new(env, &mut subst);
        let argv = expander.fields(&cmd.name_and_args)?;
        let mut locals = Vec::with_capacity(cmd.assigns.len());
        for assign in &cmd.assigns {
            locals.push((assign.label.clone(), expander.assign_value(assign)?));
        }
        let targets = expand_targets(&mut expander, &cmd.redirects)?;
        (argv, locals, targets, subst.status)
    };

    if let Some(message) = apply_redirects(&targets, env.cwd(), io, ctx)? {
        return failed(1, &message, io, ctx);
    }

    let Some((name, args)) = argv.split_first() else {
        // Assignments with redirects but no command
        io.stdin = Stdin::Null;
        for (assign, (_, value)) in cmd.assigns.iter().zip(locals) {
            env.assign(&assign.label, value, assign.exported);
        }
        return Ok(StageState::finished(substituted.unwrap_or(0), false, Vec::new()));
    };

    if shell_builtins::is_shell_builtin(name, args.len()) {
        io.stdin = Stdin::Null;
        if name == "export" {
            for (label, value) in locals {
                env.assign(&label, value, false);
            }
        }
        let output = shell_builtins::run(name, args, env);
        let mut tickets = Vec::new();
        if !output.stdout.is_empty() {
            tickets.push(ctx.io.write(io.stdout, output.stdout.as_bytes())?);
        }
        if !output.stderr.is_empty() {
            tickets.push(ctx.io.write(io.stderr, output.stderr.as_bytes())?);
        }
        return Ok(StageState::finished(output.code, false, tickets));
    }

    if let Some(builtin) = Builtin::from_name(name) {
        return run_builtin(builtin, args, locals, io, ctx, env);
    }

    spawn_external(argv, locals, io, ctx, env)
}

fn subshell_stage<'s>(
    subshell: &'s Subshell,
    io: &mut StageIo,
    ctx: &mut ExecCtx<'_>,
    env: &ShellEnv,
) -> Result<StageState<'s>, ExecError> {
    let targets = {
        let mut subst = Substitution::new(&mut *ctx, io.stderr);
        expand_targets(&mut Expander::new(env, &mut subst), &subshell.redirects)?
    };
    if let Some(message) = apply_redirects(&targets, env.cwd(), io, ctx)? {
        return failed(1, &message, io, ctx);
    }

    let inner = io.share(&mut ctx.io)?;
    io.stdin = Stdin::Null;
    let run = ScriptRun::new(&subshell.script, env.clone(), inner);
    Ok(StageState::Running(Running::Subshell(Box::new(run))))
}

fn run_builtin<'s>(
    builtin: Builtin,
    args: &[String],
    locals: Vec<(String, String)>,
    io: &mut StageIo,
    ctx: &mut ExecCtx<'_>,
    env: &ShellEnv,
) -> Result<StageState<'s>, ExecError> {
    io.stdin = Stdin::Null;
    let vars = env.command_env(locals);
    let inv = Invocation {
        args,
        cwd: env.cwd(),
        vars: &vars,
        last_status: env.last_status,
    };
    let mut streams = StageStreams {
        arena: &mut ctx.io,
        stdout: io.stdout,
        stderr: io.stderr,
        tickets: Vec::new(),
        fault: None,
    };
    let outcome = builtin.run(&inv, &mut streams);
    if let Some(fault) = streams.fault {
        return Err(fault.into());
    }
    let tickets = streams.tickets;

    Ok(match outcome {
        Outcome::Status(code) => StageState::finished(code, false, tickets),
        Outcome::Exit(code) => StageState::finished(code, true, tickets),
        Outcome::Sleep(duration) => {
            let now = Instant::now();
            let until = now
                .checked_add(duration)
                .unwrap_or_else(|| now + Duration::from_secs(u64::from(u32::MAX)));
            StageState::Running(Running::Sleep { until, tickets })
        }
    })
}

fn spawn_external<'s>(
    argv: Vec<String>,
    locals: Vec<(String, String)>,
    io: &mut StageIo,
    ctx: &mut ExecCtx<'_>,
    env: &ShellEnv,
) -> Result<StageState<'s>, ExecError> {
    let name = argv.first().cloned().unwrap_or_default();
    let vars = env.command_env(locals);

    let stdin = io.stdin.stdio(&mut ctx.io)?;
    io.stdin = Stdin::Null;
    let (stdout, out_collector) = ctx.io.child_stdio(io.stdout)?;
    let (stderr, err_collector) = ctx.io.child_stdio(io.stderr)?;
    let collectors = out_collector.into_iter().chain(err_collector).collect();

    let request = SpawnRequest {
        argv,
        env: vars.process_env(),
        cwd: env.cwd().to_path_buf(),
        stdin,
        stdout,
        stderr,
    };
    match ctx.spawner.spawn(request) {
        Ok(handle) => Ok(StageState::Running(Running::Child { handle, collectors })),
        Err(err) => {
            let message = if err.kind() == io::ErrorKind::NotFound {
                format!("husk: command not found: {name}")
            } else {
                format!("husk: {name}: {}", io_reason(&err))
            };
            let ticket = ctx.io.write(io.stderr, format!("{message}\n").as_bytes())?;
            Ok(StageState::AwaitingDrain {
                code: 1,
                exit: false,
                tickets: vec![ticket],
                collectors,
            })
        }
    }
}

/// Finish a stage early with `message` on its stderr
fn failed<'s>(code: i32, message: &str, io: &mut StageIo, ctx: &mut ExecCtx<'_>) -> Result<StageState<'s>, ExecError> {
    io.stdin = Stdin::Null;
    let ticket = ctx.io.write(io.stderr, format!("{message}\n").as_bytes())?;
    Ok(StageState::finished(code, false, vec![ticket]))
}

fn expand_targets(expander: &mut Expander<'_>, redirects: &[Redirect]) -> Result<Vec<(RedirectSpec, Target)>, ExecError> {
    let mut targets = Vec::with_capacity(redirects.len());
    for redirect in redirects {
        let target = match &redirect.target {
            RedirectTarget::Atom(word) => Target::Path(expander.string(word)?),
            RedirectTarget::Host(index) => Target::Host(*index),
            RedirectTarget::Duplicate => Target::Duplicate,
        };
        targets.push((redirect.spec, target));
    }
    Ok(targets)
}

/// Rewire `io` for each redirect in order. `Ok(Some(message))` is a failure
/// the command reports on its own stderr.
fn apply_redirects(
    targets: &[(RedirectSpec, Target)],
    cwd: &Path,
    io: &mut StageIo,
    ctx: &mut ExecCtx<'_>,
) -> Result<Option<String>, ExecError> {
    let host = ctx.host;
    for (spec, target) in targets {
        let spec = *spec;
        match target {
            Target::Duplicate => {
                if spec.contains(RedirectSpec::STDERR) {
                    let stdout = ctx.io.retain(io.stdout)?;
                    ctx.io.release(io.stderr)?;
                    io.stderr = stdout;
                } else {
                    let stderr = ctx.io.retain(io.stderr)?;
                    ctx.io.release(io.stdout)?;
                    io.stdout = stderr;
                }
            }
            Target::Path(path) => {
                let full = cwd.join(path);
                if spec.is_read() {
                    match File::open(&full) {
                        Ok(file) => io.stdin = Stdin::File(Rc::new(file)),
                        Err(err) => return Ok(Some(format!("husk: {}: {path}", io_reason(&err)))),
                    }
                    continue;
                }

                let mut options = OpenOptions::new();
                options.write(true).create(true);
                if spec.is_append() {
                    options.append(true);
                } else {
                    options.truncate(true);
                }
                let file = match options.open(&full) {
                    Ok(file) => file,
                    Err(err) => return Ok(Some(format!("husk: {}: {path}", io_reason(&err)))),
                };
                if spec.contains(RedirectSpec::STDIN) {
                    // `0>`: stdin is a file opened for writing
                    io.stdin = Stdin::File(Rc::new(file));
                    continue;
                }
                let writer = ctx.io.acquire(Sink::File(file));
                attach(spec, writer, io, &mut ctx.io)?;
            }
            Target::Host(index) => match (host.get(*index), spec.contains(RedirectSpec::STDIN)) {
                (Some(HostValue::Buffer(buffer)), true) if spec.is_read() => {
                    io.stdin = Stdin::Bytes(buffer.snapshot().into());
                }
                (Some(HostValue::Bytes(bytes)), true) if spec.is_read() => {
                    io.stdin = Stdin::Bytes(Arc::clone(bytes));
                }
                (Some(HostValue::Buffer(buffer)), false) => {
                    if !spec.is_append() {
                        buffer.clear();
                    }
                    let writer = ctx.io.acquire(Sink::Buffer {
                        buffer: buffer.clone(),
                        echo: None,
                    });
                    attach(spec, writer, io, &mut ctx.io)?;
                }
                _ => {
                    return Err(HuskError::expansion(format!(
                        "interpolated value {index} cannot be used as a redirect target here"
                    ))
                    .into());
                }
            },
        }
    }
    Ok(None)
}

/// Point stdout and/or stderr at a freshly acquired `writer`, taking over its
/// reference
fn attach(spec: RedirectSpec, writer: WriterId, io: &mut StageIo, arena: &mut IoArena) -> Result<(), IoFault> {
    if spec.contains(RedirectSpec::STDOUT) {
        arena.release(io.stdout)?;
        io.stdout = writer;
    }
    if spec.contains(RedirectSpec::STDERR) {
        let writer = if spec.contains(RedirectSpec::STDOUT) {
            arena.retain(writer)?
        } else {
            writer
        };
        arena.release(io.stderr)?;
        io.stderr = writer;
    }
    Ok(())
}

/// Builtin output routed through the arena
struct StageStreams<'a> {
    arena: &'a mut IoArena,
    stdout: WriterId,
    stderr: WriterId,
    tickets: Vec<Ticket>,
    fault: Option<IoFault>,
}

impl StageStreams<'_> {
    fn write(&mut self, writer: WriterId, bytes: &[u8]) -> io::Result<()> {
        if self.fault.is_some() || self.arena.is_dead(writer) {
            return Err(io::ErrorKind::BrokenPipe.into());
        }
        match self.arena.write(writer, bytes) {
            Ok(ticket) => {
                if self.arena.ticket_state(ticket) == TicketState::Broken {
                    return Err(io::ErrorKind::BrokenPipe.into());
                }
                self.tickets.push(ticket);
                Ok(())
            }
            Err(fault) => {
                tracing::warn!(%fault, "builtin write failed");
                self.fault = Some(fault);
                Err(io::Error::other("writer fault"))
            }
        }
    }
}

impl Streams for StageStreams<'_> {
    fn stdout(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write(self.stdout, bytes)
    }

    fn stderr(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.write(self.stderr, bytes)
    }
}
