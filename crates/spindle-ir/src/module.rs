//! Module wrapper and top-level symbol lookup.

use crate::context::IrContext;
use crate::refs::{BlockRef, OpRef, RegionRef};
use crate::symbol::Symbol;

/// Thin wrapper around an `OpRef` pointing to a `core.module` operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Module(pub OpRef);

impl Module {
    /// Wrap `op` if it is a `core.module` with a body region.
    pub fn new(ctx: &IrContext, op: OpRef) -> Option<Self> {
        let data = ctx.op(op);
        if data.dialect == "core" && data.name == "module" && !data.regions.is_empty() {
            Some(Module(op))
        } else {
            None
        }
    }

    pub fn op(self) -> OpRef {
        self.0
    }

    pub fn body(self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    /// First block of the body, which holds all top-level symbols.
    pub fn first_block(self, ctx: &IrContext) -> Option<BlockRef> {
        ctx.region(self.body(ctx)).blocks.first().copied()
    }

    /// Top-level operations in the first block.
    pub fn ops(self, ctx: &IrContext) -> Vec<OpRef> {
        match self.first_block(ctx) {
            Some(block) => ctx.block(block).ops.to_vec(),
            None => Vec::new(),
        }
    }

    /// Find a top-level operation whose `sym_name` attribute is `name`.
    pub fn lookup_symbol(self, ctx: &IrContext, name: Symbol) -> Option<OpRef> {
        let block = self.first_block(ctx)?;
        ctx.block(block).ops.iter().copied().find(|&op| {
            ctx.op_attr(op, "sym_name")
                .and_then(|a| a.as_symbol())
                .is_some_and(|s| s == name)
        })
    }

    /// Insert a top-level operation at the front of the module, before all
    /// existing symbols.
    pub fn prepend_op(self, ctx: &mut IrContext, op: OpRef) {
        let Some(block) = self.first_block(ctx) else {
            return;
        };
        match ctx.block(block).ops.first().copied() {
            Some(first) => ctx.insert_op_before(block, first, op),
            None => ctx.push_op(block, op),
        }
    }

    /// Walk up from `op` to the enclosing module.
    pub fn of(ctx: &IrContext, op: OpRef) -> Option<Self> {
        let mut current = op;
        loop {
            if let Some(module) = Module::new(ctx, current) {
                return Some(module);
            }
            current = ctx.parent_op(current)?;
        }
    }
}
