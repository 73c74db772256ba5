//! Core dialect: the module op and builtin scalar, pointer and function types.

use smallvec::smallvec;

use crate::context::{BlockData, IrContext, RegionData};
use crate::location::Location;
use crate::module::Module;
use crate::ops::{self, DialectOp};
use crate::refs::TypeRef;
use crate::symbol::Symbol;
use crate::types::{Attribute, TypeDataBuilder};

crate::dialect_ops! {
    dialect "core";
    /// Top-level container of a compilation unit.
    ModuleOp => "module";
}

crate::symbols! {
    ATTR_SYM_NAME => "sym_name",
    ATTR_NUM_INPUTS => "num_inputs",
}

/// Create an empty `core.module` with a single body block.
pub fn module(ctx: &mut IrContext, location: Location, name: Symbol) -> Module {
    let block = ctx.create_block(BlockData::new(location, []));
    let body = ctx.create_region(RegionData {
        location,
        blocks: smallvec![block],
        parent_op: None,
    });
    let op: ModuleOp = ops::build(
        ctx,
        ops::builder::<ModuleOp>(location)
            .attr(ATTR_SYM_NAME(), Attribute::Symbol(name))
            .region(body),
    );
    Module(op.op_ref())
}

fn simple(ctx: &mut IrContext, name: &'static str) -> TypeRef {
    ctx.types
        .intern(TypeDataBuilder::new(Symbol::new("core"), Symbol::new(name)).build())
}

pub fn i1(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "i1")
}

pub fn i8(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "i8")
}

pub fn i32(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "i32")
}

pub fn i64(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "i64")
}

pub fn f32(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "f32")
}

pub fn f64(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "f64")
}

/// Unit type, used as the result of functions returning nothing.
pub fn nil(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "nil")
}

/// Opaque pointer.
pub fn ptr(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "ptr")
}

/// Pointer to a known pointee type.
pub fn ptr_to(ctx: &mut IrContext, pointee: TypeRef) -> TypeRef {
    ctx.types.intern(
        TypeDataBuilder::new(Symbol::new("core"), Symbol::new("ptr"))
            .param(pointee)
            .build(),
    )
}

pub fn tuple(ctx: &mut IrContext, elems: impl IntoIterator<Item = TypeRef>) -> TypeRef {
    ctx.types.intern(
        TypeDataBuilder::new(Symbol::new("core"), Symbol::new("tuple"))
            .params(elems)
            .build(),
    )
}

/// Function type. Params are the inputs followed by the results; the
/// `num_inputs` attribute marks the split.
pub fn func(ctx: &mut IrContext, inputs: &[TypeRef], results: &[TypeRef]) -> TypeRef {
    ctx.types.intern(
        TypeDataBuilder::new(Symbol::new("core"), Symbol::new("func"))
            .params(inputs.iter().chain(results).copied())
            .attr(ATTR_NUM_INPUTS(), Attribute::IntBits(inputs.len() as u64))
            .build(),
    )
}

/// Split a function type into `(inputs, results)`.
pub fn func_signature(ctx: &IrContext, ty: TypeRef) -> Option<(Vec<TypeRef>, Vec<TypeRef>)> {
    let data = ctx.types.get(ty);
    if data.dialect != "core" || data.name != "func" {
        return None;
    }
    let num_inputs = data.attrs.get(&ATTR_NUM_INPUTS())?.as_int()? as usize;
    let (inputs, results) = data.params.split_at(num_inputs.min(data.params.len()));
    Some((inputs.to_vec(), results.to_vec()))
}

/// Whether `ty` is `core.<name>`.
pub fn is(ctx: &IrContext, ty: TypeRef, name: &'static str) -> bool {
    ctx.types.is_dialect(ty, Symbol::new("core"), Symbol::new(name))
}

/// Whether `ty` is a pointer, opaque or typed.
pub fn is_ptr(ctx: &IrContext, ty: TypeRef) -> bool {
    is(ctx, ty, "ptr")
}

/// Pointee of a typed pointer.
pub fn pointee(ctx: &IrContext, ty: TypeRef) -> Option<TypeRef> {
    if !is_ptr(ctx, ty) {
        return None;
    }
    ctx.types.get(ty).params.first().copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn func_signature_splits_inputs_and_results() {
        let mut ctx = IrContext::new();
        let i32_ty = i32(&mut ctx);
        let ptr_ty = ptr(&mut ctx);
        let ty = func(&mut ctx, &[ptr_ty, i32_ty], &[ptr_ty, ptr_ty]);
        let (inputs, results) = func_signature(&ctx, ty).expect("function type");
        assert_eq!(inputs, vec![ptr_ty, i32_ty]);
        assert_eq!(results, vec![ptr_ty, ptr_ty]);
    }

    #[test]
    fn zero_result_function_differs_from_single_result() {
        let mut ctx = IrContext::new();
        let i32_ty = i32(&mut ctx);
        let a = func(&mut ctx, &[i32_ty], &[]);
        let b = func(&mut ctx, &[], &[i32_ty]);
        assert_ne!(a, b);
        assert_eq!(func_signature(&ctx, b).map(|(i, _)| i.len()), Some(0));
    }

    #[test]
    fn typed_pointer_exposes_pointee() {
        let mut ctx = IrContext::new();
        let i64_ty = i64(&mut ctx);
        let p = ptr_to(&mut ctx, i64_ty);
        let opaque = ptr(&mut ctx);
        assert!(is_ptr(&ctx, p));
        assert_eq!(pointee(&ctx, p), Some(i64_ty));
        assert_eq!(pointee(&ctx, opaque), None);
    }
}
