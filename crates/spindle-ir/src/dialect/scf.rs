//! Scf dialect: structured conditionals and loops.

use crate::context::IrContext;
use crate::location::Location;
use crate::ops;
use crate::refs::{RegionRef, TypeRef, ValueRef};

crate::dialect_ops! {
    dialect "scf";
    /// Two-region conditional; each region ends in `scf.yield`.
    If => "if";
    /// Counted loop over `[lower, upper)` by `step`, with loop-carried values.
    For => "for";
    Yield => "yield";
}

pub fn r#if(
    ctx: &mut IrContext,
    location: Location,
    cond: ValueRef,
    results: impl IntoIterator<Item = TypeRef>,
    then_region: RegionRef,
    else_region: RegionRef,
) -> If {
    ops::build(
        ctx,
        ops::builder::<If>(location)
            .operand(cond)
            .results(results)
            .region(then_region)
            .region(else_region),
    )
}

impl If {
    pub fn cond(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn then_region(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    pub fn else_region(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[1]
    }
}

/// Body's entry block takes the induction variable followed by one
/// argument per init value.
pub fn r#for(
    ctx: &mut IrContext,
    location: Location,
    lower: ValueRef,
    upper: ValueRef,
    step: ValueRef,
    inits: impl IntoIterator<Item = ValueRef>,
    body: RegionRef,
) -> For {
    let inits: Vec<ValueRef> = inits.into_iter().collect();
    let results: Vec<TypeRef> = inits.iter().map(|&v| ctx.value_ty(v)).collect();
    ops::build(
        ctx,
        ops::builder::<For>(location)
            .operand(lower)
            .operand(upper)
            .operand(step)
            .operands(inits)
            .results(results)
            .region(body),
    )
}

impl For {
    pub fn init_args<'a>(&self, ctx: &'a IrContext) -> &'a [ValueRef] {
        &ctx.op_operands(self.0)[3..]
    }

    pub fn body(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }
}

pub fn r#yield(
    ctx: &mut IrContext,
    location: Location,
    values: impl IntoIterator<Item = ValueRef>,
) -> Yield {
    ops::build(ctx, ops::builder::<Yield>(location).operands(values))
}
