//! Operand views that remember pre-conversion types.
//!
//! Structural conversion retypes block arguments and replaces results, so
//! by the time an op-by-op pattern runs, its operand types may already be
//! lowered. `OriginalTypes` is a snapshot taken before any conversion and
//! carried across replacements so patterns can still dispatch on the
//! source kind of each operand.

use std::collections::HashMap;
use std::ops::ControlFlow;

use crate::context::IrContext;
use crate::refs::{OpRef, RegionRef, TypeRef, ValueRef};
use crate::walk::{self, WalkAction};

/// Pre-conversion type of every value in a unit.
#[derive(Debug, Default, Clone)]
pub struct OriginalTypes {
    types: HashMap<ValueRef, TypeRef>,
}

impl OriginalTypes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the current type of every result and block argument in `region`.
    pub fn capture(ctx: &IrContext, region: RegionRef) -> Self {
        let mut snapshot = Self::new();
        snapshot.record_blocks(ctx, region);
        let _ = walk::walk_region::<()>(ctx, region, &mut |op| {
            for &v in ctx.op_results(op) {
                snapshot.types.insert(v, ctx.value_ty(v));
            }
            let regions = ctx.op(op).regions.clone();
            for r in regions {
                snapshot.record_blocks(ctx, r);
            }
            ControlFlow::Continue(WalkAction::Advance)
        });
        snapshot
    }

    fn record_blocks(&mut self, ctx: &IrContext, region: RegionRef) {
        for &block in &ctx.region(region).blocks {
            for &arg in ctx.block_args(block) {
                self.types.insert(arg, ctx.value_ty(arg));
            }
        }
    }

    /// Original type of `v`, or its current type if it was created later.
    pub fn get(&self, ctx: &IrContext, v: ValueRef) -> TypeRef {
        self.types.get(&v).copied().unwrap_or_else(|| ctx.value_ty(v))
    }

    /// Let `new` stand in for `old` when `old` is being replaced.
    pub fn inherit(&mut self, old: ValueRef, new: ValueRef) {
        if let Some(&ty) = self.types.get(&old) {
            self.types.entry(new).or_insert(ty);
        }
    }

    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

/// Operands of the op being rewritten, paired with their original types.
pub struct OpAdaptor {
    op: OpRef,
    operands: Vec<ValueRef>,
    original_types: Vec<TypeRef>,
}

impl OpAdaptor {
    pub fn new(ctx: &IrContext, op: OpRef, originals: &OriginalTypes) -> Self {
        let operands = ctx.op_operands(op).to_vec();
        let original_types = operands.iter().map(|&v| originals.get(ctx, v)).collect();
        Self {
            op,
            operands,
            original_types,
        }
    }

    pub fn op(&self) -> OpRef {
        self.op
    }

    pub fn operands(&self) -> &[ValueRef] {
        &self.operands
    }

    pub fn operand(&self, index: usize) -> ValueRef {
        self.operands[index]
    }

    /// Type of operand `index` before any conversion ran.
    pub fn original_type(&self, index: usize) -> TypeRef {
        self.original_types[index]
    }

    pub fn original_types(&self) -> &[TypeRef] {
        &self.original_types
    }
}
