//! Coroutine state machine and frame lifetime verification.
//!
//! A lowered coroutine is a frame plus a multiway branch at every
//! suspension point. The result code of a suspension picks the edge:
//! `0` resumes, `1` runs cleanup, anything else leaves the coroutine
//! suspended and returns to the caller with the frame still alive.
//!
//! `verify_frame_lifetime` walks the control flow graph along resume and
//! cleanup edges and checks that every path reaching a return frees the
//! frame exactly once. It understands both the async-level form
//! (`async.coro_suspend`, `async.coro_free`) and the lowered form
//! (`cf.switch` on a sign-extended `coro.suspend`, `coro.free`).

use std::collections::HashSet;

use derive_more::{Display, Error};
use spindle_ir::dialect::{arith, cf, func};
use spindle_ir::ops::DialectOp;
use spindle_ir::walk;
use spindle_ir::{BlockRef, IrContext, OpRef, Symbol, ValueDef};
use tracing::trace;

use crate::dialect::{coro, r#async};

/// Where a coroutine stands with respect to its frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CoroState {
    Running,
    SuspendedAwaitingResume,
    SuspendedAwaitingCleanup,
    Done,
}

/// Decoded result code of a suspension.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SuspendOutcome {
    Resume,
    Cleanup,
    Suspend,
}

impl SuspendOutcome {
    pub fn from_code(code: i8) -> Self {
        match code {
            0 => SuspendOutcome::Resume,
            1 => SuspendOutcome::Cleanup,
            _ => SuspendOutcome::Suspend,
        }
    }
}

impl CoroState {
    /// State after taking the edge selected by `outcome`.
    pub fn step(self, outcome: SuspendOutcome) -> Self {
        match (self, outcome) {
            (CoroState::Done, _) => CoroState::Done,
            (_, SuspendOutcome::Suspend) => CoroState::SuspendedAwaitingResume,
            (_, SuspendOutcome::Resume) => CoroState::Running,
            (_, SuspendOutcome::Cleanup) => CoroState::SuspendedAwaitingCleanup,
        }
    }

    /// State after the frame is released.
    pub fn free(self) -> Self {
        CoroState::Done
    }
}

/// The three successors of a suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SuspendTargets {
    pub suspend: BlockRef,
    pub resume: BlockRef,
    pub cleanup: BlockRef,
}

impl SuspendTargets {
    pub fn from_suspend(ctx: &IrContext, op: r#async::CoroSuspend) -> Self {
        Self {
            suspend: op.suspend_dest(ctx),
            resume: op.resume_dest(ctx),
            cleanup: op.cleanup_dest(ctx),
        }
    }

    /// Targets of a lowered `cf.switch` whose flag comes from `coro.suspend`.
    pub fn from_lowered(ctx: &IrContext, switch: cf::Switch) -> Option<Self> {
        if !is_suspend_flag(ctx, switch) {
            return None;
        }
        Some(Self {
            suspend: switch.default_dest(ctx),
            resume: switch.target(ctx, 0),
            cleanup: switch.target(ctx, 1),
        })
    }

    pub fn target(&self, code: i8) -> BlockRef {
        match SuspendOutcome::from_code(code) {
            SuspendOutcome::Resume => self.resume,
            SuspendOutcome::Cleanup => self.cleanup,
            SuspendOutcome::Suspend => self.suspend,
        }
    }
}

/// `cf.switch (arith.sext (coro.suspend ..))`
fn is_suspend_flag(ctx: &IrContext, switch: cf::Switch) -> bool {
    let ValueDef::OpResult(sext, 0) = ctx.value_def(switch.flag(ctx)) else {
        return false;
    };
    let Ok(sext) = arith::Sext::from_op(ctx, sext) else {
        return false;
    };
    matches!(
        ctx.value_def(sext.input(ctx)),
        ValueDef::OpResult(suspend, 0) if coro::Suspend::matches(ctx, suspend)
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Display, Error)]
pub enum FrameLifetimeError {
    #[display("coroutine `{function}` can return from {block} without freeing its frame")]
    Leak {
        function: Symbol,
        block: BlockRef,
    },
    #[display("coroutine `{function}` frees its frame twice on a path through {block}")]
    DoubleFree {
        function: Symbol,
        block: BlockRef,
    },
}

/// Whether `f` allocates a coroutine frame.
pub fn is_coroutine(ctx: &IrContext, f: func::Func) -> bool {
    walk::collect_ops(ctx, f.body(ctx)).into_iter().any(|op| {
        r#async::CoroBegin::matches(ctx, op) || coro::Begin::matches(ctx, op)
    })
}

fn is_frame_free(ctx: &IrContext, op: OpRef) -> bool {
    r#async::CoroFree::matches(ctx, op) || coro::Free::matches(ctx, op)
}

/// Check that every path from the entry to a return frees the frame once.
pub fn verify_frame_lifetime(ctx: &IrContext, f: func::Func) -> Result<(), FrameLifetimeError> {
    let function = f.sym_name(ctx);
    let Some(entry) = f.entry_block(ctx) else {
        return Ok(());
    };

    let mut visited: HashSet<(BlockRef, CoroState)> = HashSet::new();
    let mut stack = vec![(entry, CoroState::Running)];

    while let Some((block, mut state)) = stack.pop() {
        if !visited.insert((block, state)) {
            continue;
        }

        for &op in &ctx.block(block).ops {
            if is_frame_free(ctx, op) {
                if state == CoroState::Done {
                    return Err(FrameLifetimeError::DoubleFree { function, block });
                }
                state = state.free();
            }
        }

        let Some(terminator) = ctx.block(block).ops.last().copied() else {
            continue;
        };

        if func::Return::matches(ctx, terminator) {
            if state != CoroState::Done {
                return Err(FrameLifetimeError::Leak { function, block });
            }
            continue;
        }

        let targets = if let Ok(suspend) = r#async::CoroSuspend::from_op(ctx, terminator) {
            Some(SuspendTargets::from_suspend(ctx, suspend))
        } else if let Ok(switch) = cf::Switch::from_op(ctx, terminator) {
            SuspendTargets::from_lowered(ctx, switch)
        } else {
            None
        };

        match targets {
            // The exit edge keeps the frame alive for a later resumption.
            Some(targets) => {
                stack.push((targets.resume, state.step(SuspendOutcome::Resume)));
                stack.push((targets.cleanup, state.step(SuspendOutcome::Cleanup)));
            }
            None => {
                for &succ in &ctx.op(terminator).successors {
                    stack.push((succ, state));
                }
            }
        }
    }

    trace!(%function, "frame lifetime verified");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_ir::dialect::core;
    use spindle_ir::{BlockData, Location, PathRef, Span};

    fn loc() -> Location {
        Location::new(PathRef::from_u32(0), Span::default())
    }

    #[test]
    fn outcome_codes() {
        assert_eq!(SuspendOutcome::from_code(0), SuspendOutcome::Resume);
        assert_eq!(SuspendOutcome::from_code(1), SuspendOutcome::Cleanup);
        assert_eq!(SuspendOutcome::from_code(-1), SuspendOutcome::Suspend);
        assert_eq!(SuspendOutcome::from_code(7), SuspendOutcome::Suspend);
    }

    #[test]
    fn transitions() {
        let s = CoroState::Running;
        assert_eq!(s.step(SuspendOutcome::Suspend), CoroState::SuspendedAwaitingResume);
        assert_eq!(
            s.step(SuspendOutcome::Suspend).step(SuspendOutcome::Resume),
            CoroState::Running
        );
        assert_eq!(s.step(SuspendOutcome::Cleanup), CoroState::SuspendedAwaitingCleanup);
        assert_eq!(s.free(), CoroState::Done);
        assert_eq!(CoroState::Done.step(SuspendOutcome::Resume), CoroState::Done);
    }

    /// entry: id, begin, save, suspend(exit, resume, cleanup)
    /// resume: br cleanup
    /// cleanup: [free x frees], br exit
    /// exit: end, return
    fn coroutine(ctx: &mut IrContext, frees: usize, resume_frees: usize) -> func::Func {
        let (f, entry) = func::define(ctx, loc(), Symbol::new("c"), &[], &[]);
        let body = f.body(ctx);
        let [exit, resume, cleanup] = [(); 3].map(|_| {
            let b = ctx.create_block(BlockData::new(loc(), []));
            ctx.push_block(body, b);
            b
        });

        let id = r#async::coro_id(ctx, loc());
        let id_v = id.result(ctx);
        let begin = r#async::coro_begin(ctx, loc(), id_v);
        let hdl = begin.result(ctx);
        let save = r#async::coro_save(ctx, loc(), hdl);
        let state = save.result(ctx);
        let suspend = r#async::coro_suspend(ctx, loc(), state, exit, resume, cleanup);
        for op in [id.op_ref(), begin.op_ref(), save.op_ref(), suspend.op_ref()] {
            ctx.push_op(entry, op);
        }

        for _ in 0..resume_frees {
            let free = r#async::coro_free(ctx, loc(), id_v, hdl);
            ctx.push_op(resume, free.op_ref());
        }
        let br = cf::br(ctx, loc(), cleanup, []);
        ctx.push_op(resume, br.op_ref());

        for _ in 0..frees {
            let free = r#async::coro_free(ctx, loc(), id_v, hdl);
            ctx.push_op(cleanup, free.op_ref());
        }
        let br = cf::br(ctx, loc(), exit, []);
        ctx.push_op(cleanup, br.op_ref());

        let end = r#async::coro_end(ctx, loc(), hdl);
        ctx.push_op(exit, end.op_ref());
        let ret = func::r#return(ctx, loc(), []);
        ctx.push_op(exit, ret.op_ref());
        f
    }

    #[test]
    fn single_free_on_every_path() {
        let mut ctx = IrContext::new();
        let f = coroutine(&mut ctx, 1, 0);
        assert!(is_coroutine(&ctx, f));
        assert_eq!(verify_frame_lifetime(&ctx, f), Ok(()));
    }

    #[test]
    fn missing_free_is_a_leak() {
        let mut ctx = IrContext::new();
        let f = coroutine(&mut ctx, 0, 0);
        let err = verify_frame_lifetime(&ctx, f).unwrap_err();
        assert!(matches!(err, FrameLifetimeError::Leak { .. }));
    }

    #[test]
    fn free_on_resume_and_cleanup_is_double() {
        let mut ctx = IrContext::new();
        let f = coroutine(&mut ctx, 1, 1);
        let err = verify_frame_lifetime(&ctx, f).unwrap_err();
        assert!(matches!(err, FrameLifetimeError::DoubleFree { .. }));
    }

    #[test]
    fn plain_functions_are_not_coroutines() {
        let mut ctx = IrContext::new();
        let i32_ty = core::i32(&mut ctx);
        let (f, entry) = func::define(&mut ctx, loc(), Symbol::new("p"), &[], &[i32_ty]);
        let c = arith::r#const(&mut ctx, loc(), i32_ty, 0);
        let c_v = c.result(&ctx);
        ctx.push_op(entry, c.op_ref());
        let ret = func::r#return(&mut ctx, loc(), [c_v]);
        ctx.push_op(entry, ret.op_ref());
        assert!(!is_coroutine(&ctx, f));
    }

    #[test]
    fn targets_by_code() {
        let mut ctx = IrContext::new();
        let [a, b, c] = [(); 3].map(|_| ctx.create_block(BlockData::new(loc(), [])));
        let targets = SuspendTargets {
            suspend: a,
            resume: b,
            cleanup: c,
        };
        assert_eq!(targets.target(0), b);
        assert_eq!(targets.target(1), c);
        assert_eq!(targets.target(-1), a);
    }
}
