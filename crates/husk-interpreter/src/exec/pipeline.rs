//! Pipelines and their stages

use std::io::PipeReader;
use std::rc::Rc;
use std::time::Instant;

use husk_ast::{Assign, Cmd, PipelineItem, Subshell};

use super::{Completion, ExecCtx, ScriptRun, StageIo, Stdin, Step, command};
use crate::env::ShellEnv;
use crate::error::ExecError;
use crate::io::{CollectorId, Sink, Ticket, TicketState};
use crate::spawn::ProcessHandle;

/// What one stage runs
#[derive(Debug, Clone, Copy)]
pub(crate) enum StageItem<'s> {
    Cmd(&'s Cmd),
    Assign(&'s [Assign]),
    Subshell(&'s Subshell),
}

impl<'s> From<&'s PipelineItem> for StageItem<'s> {
    fn from(item: &'s PipelineItem) -> Self {
        match item {
            PipelineItem::Cmd(cmd) => Self::Cmd(cmd),
            PipelineItem::Assign(assigns) => Self::Assign(assigns),
            PipelineItem::Subshell(subshell) => Self::Subshell(subshell),
        }
    }
}

/// The part of a stage that outlives its start
pub(crate) enum Running<'s> {
    Child {
        handle: Box<dyn ProcessHandle>,
        collectors: Vec<CollectorId>,
    },
    /// `sleep`: done once the deadline passes
    Sleep { until: Instant, tickets: Vec<Ticket> },
    Subshell(Box<ScriptRun<'s>>),
}

pub(crate) enum StageState<'s> {
    Spawning,
    Running(Running<'s>),
    /// Finished; waiting for its output to be delivered
    AwaitingDrain {
        code: i32,
        exit: bool,
        tickets: Vec<Ticket>,
        collectors: Vec<CollectorId>,
    },
    Done(Completion),
}

impl StageState<'_> {
    pub(super) fn finished(code: i32, exit: bool, tickets: Vec<Ticket>) -> Self {
        Self::AwaitingDrain {
            code,
            exit,
            tickets,
            collectors: Vec::new(),
        }
    }

    fn name(&self) -> &'static str {
        match self {
            Self::Spawning => "spawning",
            Self::Running(_) => "running",
            Self::AwaitingDrain { .. } => "awaiting-drain",
            Self::Done(_) => "done",
        }
    }
}

pub(crate) struct Stage<'s> {
    io: StageIo,
    released: bool,
    state: StageState<'s>,
}

impl<'s> Stage<'s> {
    fn start(item: StageItem<'s>, io: StageIo, ctx: &mut ExecCtx<'_>, env: &mut ShellEnv) -> Result<Self, ExecError> {
        let mut stage = Self {
            io,
            released: false,
            state: StageState::Spawning,
        };
        stage.state = command::launch(item, &mut stage.io, ctx, env)?;
        tracing::trace!(state = stage.state.name(), "stage started");
        Ok(stage)
    }

    fn completion(&self) -> Option<Completion> {
        match self.state {
            StageState::Done(done) => Some(done),
            _ => None,
        }
    }

    /// Advance; `true` when the state changed
    fn step(&mut self, ctx: &mut ExecCtx<'_>) -> Result<bool, ExecError> {
        let next = match &mut self.state {
            StageState::Spawning | StageState::Done(_) => return Ok(false),
            StageState::Running(Running::Child { handle, collectors }) => {
                let Some(code) = handle.try_wait()? else {
                    return Ok(false);
                };
                tracing::debug!(code, "stage exited");
                StageState::AwaitingDrain {
                    code,
                    exit: false,
                    tickets: Vec::new(),
                    collectors: std::mem::take(collectors),
                }
            }
            StageState::Running(Running::Sleep { until, tickets }) => {
                if Instant::now() < *until {
                    return Ok(false);
                }
                StageState::finished(0, false, std::mem::take(tickets))
            }
            StageState::Running(Running::Subshell(run)) => match run.step(ctx)? {
                Step::Pending { progressed } => return Ok(progressed),
                // `exit` ends the subshell only
                Step::Ready(done) => StageState::finished(done.code, false, Vec::new()),
            },
            StageState::AwaitingDrain {
                code,
                exit,
                tickets,
                collectors,
            } => {
                if collectors.iter().any(|&collector| !ctx.io.collector_done(collector)) {
                    return Ok(false);
                }
                let mut broken = false;
                for &ticket in tickets.iter() {
                    match ctx.io.ticket_state(ticket) {
                        TicketState::Pending => return Ok(false),
                        TicketState::Broken => broken = true,
                        TicketState::Done => {}
                    }
                }
                let done = Completion {
                    code: if broken && *code == 0 { 1 } else { *code },
                    exit: *exit,
                };
                self.retire(ctx)?;
                StageState::Done(done)
            }
        };
        tracing::trace!(from = self.state.name(), to = next.name(), "stage transition");
        self.state = next;
        Ok(true)
    }

    fn retire(&mut self, ctx: &mut ExecCtx<'_>) -> Result<(), ExecError> {
        if !self.released {
            self.released = true;
            self.io.release(&mut ctx.io)?;
        }
        Ok(())
    }

    /// Kill whatever is still running and release the stage's writers
    fn cancel(&mut self, ctx: &mut ExecCtx<'_>) -> Result<(), ExecError> {
        let code = match &mut self.state {
            StageState::Running(Running::Child { handle, .. }) => {
                let _ = handle.kill();
                handle.wait().unwrap_or(128 + libc::SIGKILL)
            }
            StageState::Running(Running::Subshell(run)) => {
                run.cancel(ctx)?;
                1
            }
            StageState::Done(done) => done.code,
            _ => 1,
        };
        self.retire(ctx)?;
        self.state = StageState::Done(Completion { code, exit: false });
        Ok(())
    }
}

impl Drop for Stage<'_> {
    fn drop(&mut self) {
        if let StageState::Running(Running::Child { handle, .. }) = &mut self.state {
            let _ = handle.kill();
            let _ = handle.wait();
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum PipelineState {
    Spawning,
    Running,
    /// The last stage is done; earlier ones are still finishing
    Draining,
    Done(Completion),
}

pub(crate) struct PipelineRun<'s> {
    items: Vec<StageItem<'s>>,
    stages: Vec<Stage<'s>>,
    state: PipelineState,
}

impl<'s> PipelineRun<'s> {
    pub fn new(items: Vec<StageItem<'s>>) -> Self {
        Self {
            items,
            stages: Vec::new(),
            state: PipelineState::Spawning,
        }
    }

    pub fn step(&mut self, ctx: &mut ExecCtx<'_>, env: &mut ShellEnv, io: &StageIo) -> Result<Step, ExecError> {
        match self.state {
            PipelineState::Spawning => {
                self.spawn(ctx, env, io)?;
                self.state = PipelineState::Running;
                return Ok(Step::Pending { progressed: true });
            }
            PipelineState::Done(done) => return Ok(Step::Ready(done)),
            PipelineState::Running | PipelineState::Draining => {}
        }

        let mut progressed = false;
        for stage in &mut self.stages {
            progressed |= stage.step(ctx)?;
        }

        let last = self.stages.last().and_then(Stage::completion);
        if !self.stages.iter().all(|stage| stage.completion().is_some()) {
            if last.is_some() && matches!(self.state, PipelineState::Running) {
                tracing::trace!("pipeline draining");
                self.state = PipelineState::Draining;
            }
            return Ok(Step::Pending { progressed });
        }

        let last = last.unwrap_or(Completion { code: 0, exit: false });
        let done = Completion {
            code: last.code,
            // `exit` in a multi-stage pipeline only ends its own stage
            exit: last.exit && self.stages.len() == 1,
        };
        tracing::debug!(code = done.code, "pipeline finished");
        self.stages.clear();
        self.state = PipelineState::Done(done);
        Ok(Step::Ready(done))
    }

    /// Start every stage, left to right, wiring stdout of each stage to the
    /// next one's stdin
    fn spawn(&mut self, ctx: &mut ExecCtx<'_>, env: &mut ShellEnv, io: &StageIo) -> Result<(), ExecError> {
        let count = self.items.len();
        tracing::debug!(stages = count, "pipeline start");

        let mut upstream: Option<PipeReader> = None;
        for (index, &item) in self.items.iter().enumerate() {
            let stdin = match upstream.take() {
                Some(reader) => Stdin::Pipe(Rc::new(reader)),
                None => io.stdin.clone(),
            };
            let stdout = if index + 1 < count {
                let (reader, pipe) = std::io::pipe()?;
                upstream = Some(reader);
                ctx.io.acquire(Sink::Pipe(pipe))
            } else {
                ctx.io.retain(io.stdout)?
            };
            let stage_io = StageIo {
                stdin,
                stdout,
                stderr: ctx.io.retain(io.stderr)?,
            };

            let stage = if count == 1 {
                Stage::start(item, stage_io, ctx, env)?
            } else {
                Stage::start(item, stage_io, ctx, &mut env.clone())?
            };
            self.stages.push(stage);
        }
        Ok(())
    }

    pub fn cancel(&mut self, ctx: &mut ExecCtx<'_>) -> Result<(), ExecError> {
        for stage in &mut self.stages {
            stage.cancel(ctx)?;
        }
        let code = self.stages.last().and_then(Stage::completion).map_or(1, |done| done.code);
        self.stages.clear();
        self.state = PipelineState::Done(Completion { code, exit: false });
        Ok(())
    }
}
