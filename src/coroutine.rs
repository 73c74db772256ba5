//! Lowering of async coroutine primitives to native frame intrinsics.
//!
//! - `async.coro_id` → `coro.id`
//! - `async.coro_begin` → `coro.size` + `call @malloc` + `coro.begin`
//! - `async.coro_free` → `coro.free` + `call @free`
//! - `async.coro_end` → `coro.end`
//! - `async.coro_save` → `coro.save`
//! - `async.coro_suspend` → `coro.suspend` + `arith.sext` + `cf.switch`

use std::rc::Rc;

use spindle_ir::dialect::{arith, cf, core, func};
use spindle_ir::ops::DialectOp;
use spindle_ir::rewrite::{OpAdaptor, PatternRewriter, RewritePattern};
use spindle_ir::{IrContext, OpRef};

use crate::abi::RuntimeAbi;
use crate::dialect::{coro, r#async};

// ============================================================================
// Pattern: async.coro_id → coro.id
// ============================================================================

pub struct CoroIdLowering;

impl RewritePattern for CoroIdLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        _adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::CoroId::matches(ctx, op) {
            return false;
        }
        let location = ctx.op(op).location;
        let id = coro::id(ctx, location);
        rewriter.replace_op(id.op_ref());
        true
    }
}

// ============================================================================
// Pattern: async.coro_begin → frame allocation
// ============================================================================

pub struct CoroBeginLowering {
    pub abi: Rc<RuntimeAbi>,
}

impl RewritePattern for CoroBeginLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::CoroBegin::matches(ctx, op) {
            return false;
        }
        let location = ctx.op(op).location;
        let ptr = core::ptr(ctx);
        let id = adaptor.operand(0);

        // %size = coro.size %id
        let size = coro::size(ctx, location, id);
        let size_v = size.result(ctx);
        // %mem = func.call @malloc(%size)
        let alloc = func::call(ctx, location, [size_v], [ptr], self.abi.alloc());
        let mem = ctx.op_result(alloc.op_ref(), 0);
        // %hdl = coro.begin %id, %mem
        let begin = coro::begin(ctx, location, id, mem);

        rewriter.insert_op(size.op_ref());
        rewriter.insert_op(alloc.op_ref());
        rewriter.replace_op(begin.op_ref());
        true
    }
}

// ============================================================================
// Pattern: async.coro_free → release the frame memory
// ============================================================================

pub struct CoroFreeLowering {
    pub abi: Rc<RuntimeAbi>,
}

impl RewritePattern for CoroFreeLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::CoroFree::matches(ctx, op) {
            return false;
        }
        let location = ctx.op(op).location;

        // %mem = coro.free %id, %hdl
        let mem = coro::free(ctx, location, adaptor.operand(0), adaptor.operand(1));
        let mem_v = mem.result(ctx);
        // func.call @free(%mem)
        let release = func::call(ctx, location, [mem_v], [], self.abi.free());

        rewriter.insert_op(mem.op_ref());
        rewriter.replace_op(release.op_ref());
        true
    }
}

// ============================================================================
// Pattern: async.coro_end → coro.end
// ============================================================================

pub struct CoroEndLowering;

impl RewritePattern for CoroEndLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::CoroEnd::matches(ctx, op) {
            return false;
        }
        let location = ctx.op(op).location;
        let end = coro::end(ctx, location, adaptor.operand(0));
        rewriter.insert_op(end.op_ref());
        rewriter.erase_op(vec![]);
        true
    }
}

// ============================================================================
// Pattern: async.coro_save → coro.save
// ============================================================================

pub struct CoroSaveLowering;

impl RewritePattern for CoroSaveLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::CoroSave::matches(ctx, op) {
            return false;
        }
        let location = ctx.op(op).location;
        let save = coro::save(ctx, location, adaptor.operand(0));
        rewriter.replace_op(save.op_ref());
        true
    }
}

// ============================================================================
// Pattern: async.coro_suspend → coro.suspend + multiway branch
// ============================================================================

/// Result code 0 resumes, 1 cleans up, anything else (canonically -1)
/// leaves the coroutine suspended and exits to the caller. The exit is the
/// switch default.
pub struct CoroSuspendLowering;

impl RewritePattern for CoroSuspendLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(suspend_op) = r#async::CoroSuspend::from_op(ctx, op) else {
            return false;
        };
        let location = ctx.op(op).location;
        let i32_ty = core::i32(ctx);
        let suspend_dest = suspend_op.suspend_dest(ctx);
        let resume_dest = suspend_op.resume_dest(ctx);
        let cleanup_dest = suspend_op.cleanup_dest(ctx);

        // %code = coro.suspend %state : i8
        let suspended = coro::suspend(ctx, location, adaptor.operand(0), false);
        let code = suspended.result(ctx);
        // %flag = arith.sext %code : i32
        let flag = arith::sext(ctx, location, code, i32_ty);
        let flag_v = flag.result(ctx);
        // cf.switch %flag, default ^suspend [0: ^resume, 1: ^cleanup]
        let switch = cf::switch(
            ctx,
            location,
            flag_v,
            suspend_dest,
            &[(0, resume_dest), (1, cleanup_dest)],
        );

        rewriter.insert_op(suspended.op_ref());
        rewriter.insert_op(flag.op_ref());
        rewriter.replace_op(switch.op_ref());
        true
    }
}
