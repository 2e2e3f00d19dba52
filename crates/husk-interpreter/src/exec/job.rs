//! Jobs: one expression of a statement

use husk_ast::{Cond, CondOp, Expr};

use super::pipeline::{PipelineRun, StageItem};
use super::{ExecCtx, StageIo, Step};
use crate::env::ShellEnv;
use crate::error::ExecError;

pub(crate) enum Job<'s> {
    Pipeline(PipelineRun<'s>),
    Cond(Box<CondRun<'s>>),
}

/// `left && right` / `left || right`
pub(crate) struct CondRun<'s> {
    cond: &'s Cond,
    job: Job<'s>,
    on_right: bool,
}

impl<'s> Job<'s> {
    pub fn start(expr: &'s Expr) -> Self {
        let single = |item| Self::Pipeline(PipelineRun::new(vec![item]));
        match expr {
            Expr::Cmd(cmd) => single(StageItem::Cmd(cmd)),
            Expr::Assign(assigns) => single(StageItem::Assign(assigns)),
            Expr::Subshell(subshell) => single(StageItem::Subshell(subshell)),
            Expr::Pipeline(pipeline) => Self::Pipeline(PipelineRun::new(
                pipeline.items.iter().map(StageItem::from).collect(),
            )),
            Expr::Cond(cond) => Self::Cond(Box::new(CondRun {
                cond: &**cond,
                job: Self::start(&cond.left),
                on_right: false,
            })),
            // Only whole statement expressions are backgrounded
            Expr::Async(inner) => Self::start(inner),
        }
    }

    pub fn step(&mut self, ctx: &mut ExecCtx<'_>, env: &mut ShellEnv, io: &StageIo) -> Result<Step, ExecError> {
        match self {
            Self::Pipeline(run) => run.step(ctx, env, io),
            Self::Cond(run) => run.step(ctx, env, io),
        }
    }

    pub fn cancel(&mut self, ctx: &mut ExecCtx<'_>) -> Result<(), ExecError> {
        match self {
            Self::Pipeline(run) => run.cancel(ctx),
            Self::Cond(run) => run.job.cancel(ctx),
        }
    }
}

impl CondRun<'_> {
    fn step(&mut self, ctx: &mut ExecCtx<'_>, env: &mut ShellEnv, io: &StageIo) -> Result<Step, ExecError> {
        let done = match self.job.step(ctx, env, io)? {
            Step::Ready(done) => done,
            pending => return Ok(pending),
        };
        if self.on_right || done.exit {
            return Ok(Step::Ready(done));
        }

        env.last_status = done.code;
        let run_right = match self.cond.op {
            CondOp::And => done.code == 0,
            CondOp::Or => done.code != 0,
        };
        if !run_right {
            return Ok(Step::Ready(done));
        }
        self.job = Job::start(&self.cond.right);
        self.on_right = true;
        Ok(Step::Pending { progressed: true })
    }
}
