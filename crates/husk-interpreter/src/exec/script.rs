//! Statement-by-statement execution of one script or subshell

use husk_ast::{Expr, Script, Statement};

use super::job::Job;
use super::{Completion, ExecCtx, StageIo, Step};
use crate::env::ShellEnv;
use crate::error::ExecError;

/// A background job with its private environment
struct Detached<'s> {
    job: Job<'s>,
    env: ShellEnv,
}

pub(crate) struct ScriptRun<'s> {
    statements: &'s [Statement],
    statement: usize,
    expression: usize,
    current: Option<Job<'s>>,
    detached: Vec<Detached<'s>>,
    env: ShellEnv,
    io: StageIo,
    released: bool,
    last: i32,
}

impl<'s> ScriptRun<'s> {
    /// Takes over the references held by `io`
    pub fn new(script: &'s Script, env: ShellEnv, io: StageIo) -> Self {
        let last = env.last_status;
        Self {
            statements: &script.statements,
            statement: 0,
            expression: 0,
            current: None,
            detached: Vec::new(),
            env,
            io,
            released: false,
            last,
        }
    }

    pub fn into_env(self) -> ShellEnv {
        self.env
    }

    pub fn step(&mut self, ctx: &mut ExecCtx<'_>) -> Result<Step, ExecError> {
        if self.released {
            return Ok(Step::Ready(Completion {
                code: self.last,
                exit: false,
            }));
        }
        let mut progressed = false;

        let mut i = 0;
        while i < self.detached.len() {
            let detached = &mut self.detached[i];
            match detached.job.step(ctx, &mut detached.env, &self.io)? {
                Step::Ready(_) => {
                    self.detached.remove(i);
                    progressed = true;
                }
                Step::Pending { progressed: p } => {
                    progressed |= p;
                    i += 1;
                }
            }
        }

        loop {
            if let Some(job) = self.current.as_mut() {
                match job.step(ctx, &mut self.env, &self.io)? {
                    Step::Pending { progressed: p } => {
                        return Ok(Step::Pending {
                            progressed: progressed || p,
                        });
                    }
                    Step::Ready(done) => {
                        self.current = None;
                        self.last = done.code;
                        self.env.last_status = done.code;
                        progressed = true;
                        if done.exit {
                            return self.finish(ctx, true);
                        }
                    }
                }
            }

            let Some(expr) = self.next_expression() else {
                break;
            };
            if let Expr::Async(inner) = expr {
                self.detached.push(Detached {
                    job: Job::start(inner),
                    env: self.env.clone(),
                });
                self.env.last_status = 0;
                self.last = 0;
            } else {
                self.current = Some(Job::start(expr));
            }
            progressed = true;
        }

        if self.detached.is_empty() {
            return self.finish(ctx, false);
        }
        Ok(Step::Pending { progressed })
    }

    fn next_expression(&mut self) -> Option<&'s Expr> {
        let statements = self.statements;
        loop {
            let statement = statements.get(self.statement)?;
            if let Some(expr) = statement.expressions.get(self.expression) {
                self.expression += 1;
                return Some(expr);
            }
            self.statement += 1;
            self.expression = 0;
        }
    }

    /// Release the streams; on `exit`, background jobs are killed
    fn finish(&mut self, ctx: &mut ExecCtx<'_>, exit: bool) -> Result<Step, ExecError> {
        for mut detached in self.detached.drain(..) {
            detached.job.cancel(ctx)?;
        }
        if !self.released {
            self.released = true;
            self.io.release(&mut ctx.io)?;
        }
        Ok(Step::Ready(Completion { code: self.last, exit }))
    }

    /// Kill everything still running and release the streams
    pub fn cancel(&mut self, ctx: &mut ExecCtx<'_>) -> Result<(), ExecError> {
        if let Some(mut job) = self.current.take() {
            job.cancel(ctx)?;
        }
        self.finish(ctx, false).map(drop)
    }
}
