//! Cf dialect: unstructured branches between blocks.

use crate::context::IrContext;
use crate::location::Location;
use crate::ops;
use crate::refs::{BlockRef, ValueRef};
use crate::types::Attribute;

crate::dialect_ops! {
    dialect "cf";
    /// Unconditional branch; operands become the destination's block arguments.
    Br => "br";
    /// Two-way branch on an `i1`.
    CondBr => "cond_br";
    /// Multiway branch. Successor 0 is the default, successor `i + 1`
    /// is taken when the flag equals `case_values[i]`.
    Switch => "switch";
}

crate::symbols! {
    ATTR_CASE_VALUES => "case_values",
}

pub fn br(
    ctx: &mut IrContext,
    location: Location,
    dest: BlockRef,
    args: impl IntoIterator<Item = ValueRef>,
) -> Br {
    ops::build(
        ctx,
        ops::builder::<Br>(location).operands(args).successor(dest),
    )
}

pub fn cond_br(
    ctx: &mut IrContext,
    location: Location,
    cond: ValueRef,
    then_dest: BlockRef,
    else_dest: BlockRef,
) -> CondBr {
    ops::build(
        ctx,
        ops::builder::<CondBr>(location)
            .operand(cond)
            .successor(then_dest)
            .successor(else_dest),
    )
}

pub fn switch(
    ctx: &mut IrContext,
    location: Location,
    flag: ValueRef,
    default: BlockRef,
    cases: &[(i64, BlockRef)],
) -> Switch {
    let values = cases.iter().map(|&(v, _)| Attribute::from(v)).collect();
    ops::build(
        ctx,
        ops::builder::<Switch>(location)
            .operand(flag)
            .attr(ATTR_CASE_VALUES(), Attribute::List(values))
            .successor(default)
            .successors(cases.iter().map(|&(_, b)| b)),
    )
}

impl Switch {
    pub fn flag(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn default_dest(&self, ctx: &IrContext) -> BlockRef {
        ctx.op(self.0).successors[0]
    }

    /// `(case value, destination)` pairs in declaration order.
    pub fn cases(&self, ctx: &IrContext) -> Vec<(i64, BlockRef)> {
        let data = ctx.op(self.0);
        let values = data
            .attributes
            .get(&ATTR_CASE_VALUES())
            .and_then(|a| a.as_list())
            .unwrap_or(&[]);
        values
            .iter()
            .zip(data.successors.iter().skip(1))
            .filter_map(|(v, &b)| v.as_int().map(|bits| (bits as i64, b)))
            .collect()
    }

    /// Destination taken for a given flag value.
    pub fn target(&self, ctx: &IrContext, flag: i64) -> BlockRef {
        self.cases(ctx)
            .into_iter()
            .find(|&(v, _)| v == flag)
            .map(|(_, b)| b)
            .unwrap_or_else(|| self.default_dest(ctx))
    }
}
