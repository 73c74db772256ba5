//! Arith dialect: integer constants and the few arithmetic ops lowering needs.

use crate::context::IrContext;
use crate::location::Location;
use crate::ops::{self, DialectOp};
use crate::refs::{TypeRef, ValueRef};
use crate::types::Attribute;

crate::dialect_ops! {
    dialect "arith";
    Const => "const";
    Add => "add";
    /// Sign extension to a wider integer.
    Sext => "sext";
}

crate::symbols! {
    ATTR_VALUE => "value",
}

pub fn r#const(ctx: &mut IrContext, location: Location, ty: TypeRef, value: i64) -> Const {
    ops::build(
        ctx,
        ops::builder::<Const>(location)
            .result(ty)
            .attr(ATTR_VALUE(), Attribute::from(value)),
    )
}

impl Const {
    pub fn value(&self, ctx: &IrContext) -> i64 {
        match ctx.op(self.0).attributes.get(&ATTR_VALUE()) {
            Some(Attribute::IntBits(bits)) => *bits as i64,
            _ => panic!("arith.const {} without integer value", self.0),
        }
    }

    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

pub fn add(ctx: &mut IrContext, location: Location, lhs: ValueRef, rhs: ValueRef) -> Add {
    let ty = ctx.value_ty(lhs);
    ops::build(
        ctx,
        ops::builder::<Add>(location).operand(lhs).operand(rhs).result(ty),
    )
}

impl Add {
    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

pub fn sext(ctx: &mut IrContext, location: Location, value: ValueRef, ty: TypeRef) -> Sext {
    ops::build(ctx, ops::builder::<Sext>(location).operand(value).result(ty))
}

impl Sext {
    pub fn input(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

/// Value of `v` if it is produced by `arith.const`.
pub fn const_value(ctx: &IrContext, v: ValueRef) -> Option<i64> {
    match ctx.value_def(v) {
        crate::ValueDef::OpResult(op, 0) => Const::from_op(ctx, op).ok().map(|c| c.value(ctx)),
        _ => None,
    }
}
