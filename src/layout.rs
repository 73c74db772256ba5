//! Platform sizes of lowered types.
//!
//! Value storage is sized in the IR with the `null + 1` idiom rather than a
//! `sizeof` primitive. `fold_size_of` evaluates that idiom back into bytes so
//! the emitted sequence can be checked against the target's real layout.

use spindle_ir::dialect::{arith, core, ptr};
use spindle_ir::ops::DialectOp;
use spindle_ir::{IrContext, TypeRef, ValueDef, ValueRef};
use target_lexicon::Triple;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataLayout {
    pointer_bytes: u64,
}

impl DataLayout {
    pub fn for_triple(triple: &Triple) -> Option<Self> {
        let width = triple.pointer_width().ok()?;
        Some(Self {
            pointer_bytes: u64::from(width.bytes()),
        })
    }

    pub fn host() -> Option<Self> {
        Self::for_triple(&Triple::host())
    }

    pub fn with_pointer_bytes(pointer_bytes: u64) -> Self {
        Self { pointer_bytes }
    }

    pub fn pointer_bytes(&self) -> u64 {
        self.pointer_bytes
    }

    /// Size of `ty` in bytes, including trailing padding.
    pub fn size_of(&self, ctx: &IrContext, ty: TypeRef) -> Option<u64> {
        Some(self.size_and_align(ctx, ty)?.0)
    }

    pub fn align_of(&self, ctx: &IrContext, ty: TypeRef) -> Option<u64> {
        Some(self.size_and_align(ctx, ty)?.1)
    }

    fn size_and_align(&self, ctx: &IrContext, ty: TypeRef) -> Option<(u64, u64)> {
        let scalar = |bytes: u64| Some((bytes, bytes));
        if core::is(ctx, ty, "i1") || core::is(ctx, ty, "i8") {
            scalar(1)
        } else if core::is(ctx, ty, "i32") || core::is(ctx, ty, "f32") {
            scalar(4)
        } else if core::is(ctx, ty, "i64") || core::is(ctx, ty, "f64") {
            scalar(8)
        } else if core::is_ptr(ctx, ty) {
            scalar(self.pointer_bytes)
        } else if core::is(ctx, ty, "tuple") {
            let mut size = 0u64;
            let mut align = 1u64;
            for &elem in &ctx.types.get(ty).params {
                let (elem_size, elem_align) = self.size_and_align(ctx, elem)?;
                size = size.next_multiple_of(elem_align) + elem_size;
                align = align.max(elem_align);
            }
            Some((size.next_multiple_of(align), align))
        } else {
            None
        }
    }
}

/// Evaluate `ptr.to_int(ptr.offset(ptr.null : ptr<T>, arith.const n))` to
/// `n * sizeof(T)`. Returns `None` for any other shape.
pub fn fold_size_of(ctx: &IrContext, layout: &DataLayout, value: ValueRef) -> Option<u64> {
    let ValueDef::OpResult(to_int, 0) = ctx.value_def(value) else {
        return None;
    };
    ptr::ToInt::from_op(ctx, to_int).ok()?;
    let addr = ctx.op_operands(to_int)[0];

    let ValueDef::OpResult(offset, 0) = ctx.value_def(addr) else {
        return None;
    };
    ptr::Offset::from_op(ctx, offset).ok()?;
    let &[base, index] = ctx.op_operands(offset) else {
        return None;
    };

    let ValueDef::OpResult(null, 0) = ctx.value_def(base) else {
        return None;
    };
    ptr::Null::from_op(ctx, null).ok()?;

    let count = u64::try_from(arith::const_value(ctx, index)?).ok()?;
    let pointee = core::pointee(ctx, ctx.value_ty(base))?;
    Some(count * layout.size_of(ctx, pointee)?)
}
