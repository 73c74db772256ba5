//! Coro dialect: native coroutine frame intrinsics.
//!
//! These map directly onto the backend's switched-resume coroutine
//! support. `coro.token` values are builder tokens that only ever feed
//! the next intrinsic.

use spindle_ir::dialect::core;
use spindle_ir::ops::{self, DialectOp};
use spindle_ir::{Attribute, IrContext, Location, Symbol, TypeDataBuilder, TypeRef, ValueRef};

spindle_ir::dialect_ops! {
    dialect "coro";
    Id => "id";
    /// Size in bytes of the frame identified by a `coro.id`.
    Size => "size";
    /// Initialize the frame in caller-provided memory; yields the handle.
    Begin => "begin";
    /// Memory backing the frame, to be released by the caller.
    Free => "free";
    End => "end";
    Save => "save";
    /// Suspend; the `i8` result is 0 on resume, 1 on destroy, -1 when suspended.
    Suspend => "suspend";
    Resume => "resume";
}

spindle_ir::symbols! {
    ATTR_FINAL => "final",
}

pub fn token_type(ctx: &mut IrContext) -> TypeRef {
    ctx.types
        .intern(TypeDataBuilder::new(Symbol::new(DIALECT_NAME), Symbol::new("token")).build())
}

pub fn id(ctx: &mut IrContext, location: Location) -> Id {
    let ty = token_type(ctx);
    ops::build(ctx, ops::builder::<Id>(location).result(ty))
}

pub fn size(ctx: &mut IrContext, location: Location, id: ValueRef) -> Size {
    let ty = core::i64(ctx);
    ops::build(ctx, ops::builder::<Size>(location).operand(id).result(ty))
}

pub fn begin(ctx: &mut IrContext, location: Location, id: ValueRef, mem: ValueRef) -> Begin {
    let ty = core::ptr(ctx);
    ops::build(
        ctx,
        ops::builder::<Begin>(location)
            .operand(id)
            .operand(mem)
            .result(ty),
    )
}

pub fn free(ctx: &mut IrContext, location: Location, id: ValueRef, handle: ValueRef) -> Free {
    let ty = core::ptr(ctx);
    ops::build(
        ctx,
        ops::builder::<Free>(location)
            .operand(id)
            .operand(handle)
            .result(ty),
    )
}

pub fn end(ctx: &mut IrContext, location: Location, handle: ValueRef) -> End {
    ops::build(ctx, ops::builder::<End>(location).operand(handle))
}

pub fn save(ctx: &mut IrContext, location: Location, handle: ValueRef) -> Save {
    let ty = token_type(ctx);
    ops::build(ctx, ops::builder::<Save>(location).operand(handle).result(ty))
}

pub fn suspend(ctx: &mut IrContext, location: Location, state: ValueRef, is_final: bool) -> Suspend {
    let ty = core::i8(ctx);
    ops::build(
        ctx,
        ops::builder::<Suspend>(location)
            .operand(state)
            .result(ty)
            .attr(ATTR_FINAL(), Attribute::Bool(is_final)),
    )
}

pub fn resume(ctx: &mut IrContext, location: Location, handle: ValueRef) -> Resume {
    ops::build(ctx, ops::builder::<Resume>(location).operand(handle))
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

single_result!(Id, Size, Begin, Free, Save, Suspend);

impl Free {
    pub fn handle(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.op_ref())[1]
    }
}
