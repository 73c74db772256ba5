//! Compound mutations built on the low-level context methods.

use smallvec::SmallVec;

use crate::context::{BlockData, IrContext};
use crate::refs::{BlockRef, OpRef, RegionRef};

/// Split `block` before `before_op`, moving `before_op` and everything after
/// it into a new block placed right after `block` in the same region.
///
/// The new block has no arguments.
///
/// # Panics
///
/// Panics if `before_op` is not in `block` or `block` has no region.
pub fn split_block(ctx: &mut IrContext, block: BlockRef, before_op: OpRef) -> BlockRef {
    let loc = ctx.block(block).location;

    let ops = &ctx.block(block).ops;
    let Some(pos) = ops.iter().position(|&o| o == before_op) else {
        panic!("split_block: {before_op} not found in {block}");
    };
    let tail_ops: SmallVec<[OpRef; 4]> = ops[pos..].into();
    ctx.block_mut(block).ops.truncate(pos);

    let new_block = ctx.create_block(BlockData::new(loc, []));
    for &op in &tail_ops {
        ctx.op_mut(op).parent_block = Some(new_block);
    }
    ctx.block_mut(new_block).ops = tail_ops;

    let Some(region) = ctx.block(block).parent_region else {
        panic!("split_block: {block} does not belong to a region");
    };
    insert_block_after(ctx, region, block, new_block);

    new_block
}

/// Insert an unattached block into `region` right after `after`.
pub fn insert_block_after(ctx: &mut IrContext, region: RegionRef, after: BlockRef, block: BlockRef) {
    let Some(pos) = ctx.region(region).blocks.iter().position(|&b| b == after) else {
        panic!("insert_block_after: {after} not found in {region}");
    };
    ctx.region_mut(region).blocks.insert(pos + 1, block);
    ctx.block_mut(block).parent_region = Some(region);
}

/// Move all blocks of `src_region` into `dest_region` before `insert_before`,
/// or at the end when it is `None`. Returns the moved blocks.
pub fn inline_region_blocks(
    ctx: &mut IrContext,
    src_region: RegionRef,
    dest_region: RegionRef,
    insert_before: Option<BlockRef>,
) -> Vec<BlockRef> {
    if src_region == dest_region {
        return Vec::new();
    }

    let src_blocks: SmallVec<[BlockRef; 4]> =
        std::mem::take(&mut ctx.region_mut(src_region).blocks);
    for &b in &src_blocks {
        ctx.block_mut(b).parent_region = Some(dest_region);
    }

    let dest_blocks = &mut ctx.region_mut(dest_region).blocks;
    match insert_before {
        Some(before) => {
            let Some(pos) = dest_blocks.iter().position(|&b| b == before) else {
                panic!("inline_region_blocks: {before} not found in {dest_region}");
            };
            for (i, &b) in src_blocks.iter().enumerate() {
                dest_blocks.insert(pos + i, b);
            }
        }
        None => dest_blocks.extend(src_blocks.iter().copied()),
    }

    src_blocks.to_vec()
}

/// Move `region` from its current owner to the end of `new_owner`'s regions.
pub fn move_region(ctx: &mut IrContext, region: RegionRef, new_owner: OpRef) {
    ctx.detach_region(region);
    ctx.attach_region(new_owner, region);
}

/// Detach an operation from its block and remove it.
///
/// All results must be unused.
pub fn erase_op(ctx: &mut IrContext, op: OpRef) {
    ctx.detach_op(op);
    ctx.remove_op(op);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{arith, core};
    use crate::ops::DialectOp;
    use crate::{Location, PathRef, RegionData, Span};
    use smallvec::smallvec;

    fn loc() -> Location {
        Location::new(PathRef::from_u32(0), Span::default())
    }

    fn consts(ctx: &mut IrContext, n: i64) -> Vec<OpRef> {
        let i32_ty = core::i32(ctx);
        (0..n)
            .map(|i| arith::r#const(ctx, loc(), i32_ty, i).op_ref())
            .collect()
    }

    #[test]
    fn split_moves_tail_into_following_block() {
        let mut ctx = IrContext::new();
        let ops = consts(&mut ctx, 3);
        let block = ctx.create_block(BlockData::new(loc(), []));
        for &op in &ops {
            ctx.push_op(block, op);
        }
        let region = ctx.create_region(RegionData {
            location: loc(),
            blocks: smallvec![block],
            parent_op: None,
        });

        let tail = split_block(&mut ctx, block, ops[1]);

        assert_eq!(ctx.block(block).ops.as_slice(), &ops[..1]);
        assert_eq!(ctx.block(tail).ops.as_slice(), &ops[1..]);
        assert_eq!(ctx.op(ops[2]).parent_block, Some(tail));
        assert_eq!(ctx.region(region).blocks.as_slice(), &[block, tail]);
    }

    #[test]
    fn inline_preserves_block_order() {
        let mut ctx = IrContext::new();
        let a = ctx.create_block(BlockData::new(loc(), []));
        let b = ctx.create_block(BlockData::new(loc(), []));
        let tail = ctx.create_block(BlockData::new(loc(), []));
        let src = ctx.create_region(RegionData {
            location: loc(),
            blocks: smallvec![a, b],
            parent_op: None,
        });
        let dest = ctx.create_region(RegionData {
            location: loc(),
            blocks: smallvec![tail],
            parent_op: None,
        });

        let moved = inline_region_blocks(&mut ctx, src, dest, Some(tail));

        assert_eq!(moved, vec![a, b]);
        assert!(ctx.region(src).blocks.is_empty());
        assert_eq!(ctx.region(dest).blocks.as_slice(), &[a, b, tail]);
        assert_eq!(ctx.block(a).parent_region, Some(dest));
    }
}
