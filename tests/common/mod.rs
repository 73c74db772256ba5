//! Shared IR builders for the lowering tests.

#![allow(dead_code)]

use std::ops::ControlFlow;

use smallvec::smallvec;
use spindle::{LoweringOptions, LoweringReport, LoweringResult, lower_async};
use spindle_ir::dialect::{core, func};
use spindle_ir::ops::DialectOp;
use spindle_ir::walk::{self, WalkAction};
use spindle_ir::{
    BlockData, BlockRef, IrContext, Location, Module, OpRef, PathRef, RegionData, RegionRef, Span,
    Symbol, TypeRef,
};

pub fn loc() -> Location {
    Location::new(PathRef::from_u32(0), Span::default())
}

/// A module under construction.
pub struct Unit {
    pub ctx: IrContext,
    pub module: Module,
}

impl Unit {
    pub fn new() -> Self {
        let mut ctx = IrContext::new();
        let module = core::module(&mut ctx, loc(), Symbol::new("test"));
        Self { ctx, module }
    }

    /// Define a function at the end of the module.
    pub fn add_func(
        &mut self,
        name: &'static str,
        inputs: &[TypeRef],
        results: &[TypeRef],
    ) -> (func::Func, BlockRef) {
        let (f, entry) = func::define(&mut self.ctx, loc(), Symbol::new(name), inputs, results);
        let top = self.module.first_block(&self.ctx).expect("module body");
        self.ctx.push_op(top, f.op_ref());
        (f, entry)
    }

    pub fn func(&self, name: &str) -> func::Func {
        let op = self
            .module
            .lookup_symbol(&self.ctx, Symbol::from_dynamic(name))
            .unwrap_or_else(|| panic!("no function `{name}`"));
        func::Func::from_op(&self.ctx, op).unwrap()
    }

    /// Every `func.call` of `callee` in the module, in pre-order.
    pub fn calls_to(&self, callee: &str) -> Vec<OpRef> {
        self.find(|ctx, op| {
            func::Call::from_op(ctx, op).is_ok_and(|call| call.callee(ctx) == callee)
        })
    }

    /// Every op named `dialect.name` in the module, in pre-order.
    pub fn ops_named(&self, dialect: &str, name: &str) -> Vec<OpRef> {
        self.find(|ctx, op| ctx.op(op).dialect == dialect && ctx.op(op).name == name)
    }

    pub fn count_dialect(&self, dialect: &str) -> usize {
        self.find(|ctx, op| ctx.op(op).dialect == dialect).len()
    }

    fn find(&self, pred: impl Fn(&IrContext, OpRef) -> bool) -> Vec<OpRef> {
        let mut found = Vec::new();
        let _ = walk::walk_region::<()>(&self.ctx, self.module.body(&self.ctx), &mut |op| {
            if pred(&self.ctx, op) {
                found.push(op);
            }
            ControlFlow::Continue(WalkAction::Advance)
        });
        found
    }

    pub fn lower(&mut self) -> LoweringResult<LoweringReport> {
        lower_async(&mut self.ctx, self.module, &x86_64())
    }
}

pub fn x86_64() -> LoweringOptions {
    LoweringOptions {
        target: Some("x86_64-unknown-linux-gnu".to_owned()),
        ..LoweringOptions::default()
    }
}

/// Append `ops` to `block` in order.
pub fn push_all(ctx: &mut IrContext, block: BlockRef, ops: impl IntoIterator<Item = OpRef>) {
    for op in ops {
        ctx.push_op(block, op);
    }
}

/// A region with one block taking `args`, filled by `build`.
pub fn region(
    ctx: &mut IrContext,
    args: &[TypeRef],
    build: impl FnOnce(&mut IrContext, BlockRef),
) -> RegionRef {
    let block = ctx.create_block(BlockData::new(loc(), args.iter().copied()));
    build(ctx, block);
    ctx.create_region(RegionData {
        location: loc(),
        blocks: smallvec![block],
        parent_op: None,
    })
}

/// Append a fresh block to `f`'s body.
pub fn add_block(ctx: &mut IrContext, f: func::Func) -> BlockRef {
    let block = ctx.create_block(BlockData::new(loc(), []));
    let body = f.body(ctx);
    ctx.push_block(body, block);
    block
}
