//! Pre-order traversal over nested operations.

use std::ops::ControlFlow;

use crate::context::IrContext;
use crate::ops::DialectOp;
use crate::refs::{BlockRef, OpRef, RegionRef};

/// Controls whether to descend into an operation's regions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkAction {
    Advance,
    Skip,
}

/// Walk all operations in a region recursively.
pub fn walk_region<B>(
    ctx: &IrContext,
    region: RegionRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    for &block in &ctx.region(region).blocks {
        walk_block(ctx, block, f)?;
    }
    ControlFlow::Continue(())
}

/// Walk all operations in a block recursively.
pub fn walk_block<B>(
    ctx: &IrContext,
    block: BlockRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    for &op in &ctx.block(block).ops {
        walk_op(ctx, op, f)?;
    }
    ControlFlow::Continue(())
}

/// Visit an operation, then its nested regions unless told to skip.
pub fn walk_op<B>(
    ctx: &IrContext,
    op: OpRef,
    f: &mut dyn FnMut(OpRef) -> ControlFlow<B, WalkAction>,
) -> ControlFlow<B, ()> {
    match f(op) {
        ControlFlow::Break(b) => return ControlFlow::Break(b),
        ControlFlow::Continue(WalkAction::Skip) => return ControlFlow::Continue(()),
        ControlFlow::Continue(WalkAction::Advance) => {}
    }
    for &region in &ctx.op(op).regions {
        walk_region(ctx, region, f)?;
    }
    ControlFlow::Continue(())
}

/// Collect every operation of type `T` nested in a region, in pre-order.
pub fn collect_typed<T: DialectOp>(ctx: &IrContext, region: RegionRef) -> Vec<T> {
    let mut found = Vec::new();
    let _ = walk_region::<()>(ctx, region, &mut |op| {
        if let Ok(typed) = T::from_op(ctx, op) {
            found.push(typed);
        }
        ControlFlow::Continue(WalkAction::Advance)
    });
    found
}

/// Collect every operation nested in a region, in pre-order.
pub fn collect_ops(ctx: &IrContext, region: RegionRef) -> Vec<OpRef> {
    let mut found = Vec::new();
    let _ = walk_region::<()>(ctx, region, &mut |op| {
        found.push(op);
        ControlFlow::Continue(WalkAction::Advance)
    });
    found
}
