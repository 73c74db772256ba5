//! Ptr dialect: raw pointer arithmetic, casts and memory access.

use crate::context::IrContext;
use crate::location::Location;
use crate::ops;
use crate::refs::{TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::Attribute;

crate::dialect_ops! {
    dialect "ptr";
    /// Null pointer of the result type.
    Null => "null";
    /// Element-indexed address computation (`base + index * sizeof(elem)`).
    Offset => "offset";
    ToInt => "to_int";
    /// Reinterpret a pointer as another pointer type.
    Cast => "cast";
    Load => "load";
    Store => "store";
    /// Address of a function symbol.
    FuncAddr => "func_addr";
}

crate::symbols! {
    ATTR_SYMBOL => "symbol",
}

pub fn null(ctx: &mut IrContext, location: Location, ty: TypeRef) -> Null {
    ops::build(ctx, ops::builder::<Null>(location).result(ty))
}

/// `base` must be a typed pointer; the result has the same type.
pub fn offset(ctx: &mut IrContext, location: Location, base: ValueRef, index: ValueRef) -> Offset {
    let ty = ctx.value_ty(base);
    ops::build(
        ctx,
        ops::builder::<Offset>(location)
            .operand(base)
            .operand(index)
            .result(ty),
    )
}

pub fn to_int(ctx: &mut IrContext, location: Location, value: ValueRef, ty: TypeRef) -> ToInt {
    ops::build(ctx, ops::builder::<ToInt>(location).operand(value).result(ty))
}

pub fn cast(ctx: &mut IrContext, location: Location, value: ValueRef, ty: TypeRef) -> Cast {
    ops::build(ctx, ops::builder::<Cast>(location).operand(value).result(ty))
}

pub fn load(ctx: &mut IrContext, location: Location, addr: ValueRef, ty: TypeRef) -> Load {
    ops::build(ctx, ops::builder::<Load>(location).operand(addr).result(ty))
}

pub fn store(ctx: &mut IrContext, location: Location, value: ValueRef, addr: ValueRef) -> Store {
    ops::build(
        ctx,
        ops::builder::<Store>(location).operand(value).operand(addr),
    )
}

pub fn func_addr(ctx: &mut IrContext, location: Location, symbol: Symbol, ty: TypeRef) -> FuncAddr {
    ops::build(
        ctx,
        ops::builder::<FuncAddr>(location)
            .attr(ATTR_SYMBOL(), Attribute::Symbol(symbol))
            .result(ty),
    )
}

impl FuncAddr {
    pub fn symbol(&self, ctx: &IrContext) -> Symbol {
        match ctx.op(self.0).attributes.get(&ATTR_SYMBOL()) {
            Some(Attribute::Symbol(s)) => *s,
            _ => panic!("ptr.func_addr {} without symbol", self.0),
        }
    }
}

macro_rules! single_result {
    ($($ty:ident),*) => {
        $(
            impl $ty {
                pub fn result(&self, ctx: &IrContext) -> ValueRef {
                    ctx.op_result(self.0, 0)
                }
            }
        )*
    };
}

single_result!(Null, Offset, ToInt, Cast, Load, FuncAddr);
