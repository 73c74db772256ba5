//! Func dialect: function definitions, calls and returns.

use smallvec::smallvec;

use crate::context::{BlockData, IrContext, RegionData};
use crate::dialect::core;
use crate::location::Location;
use crate::ops::{self, DialectOp};
use crate::refs::{BlockRef, RegionRef, TypeRef, ValueRef};
use crate::symbol::Symbol;
use crate::types::Attribute;

crate::dialect_ops! {
    dialect "func";
    /// Function definition. Attributes `sym_name` and `type`, one body region.
    Func => "func";
    /// Direct call of a symbol.
    Call => "call";
    Return => "return";
    Unreachable => "unreachable";
}

crate::symbols! {
    ATTR_SYM_NAME => "sym_name",
    ATTR_TYPE => "type",
    ATTR_CALLEE => "callee",
    ATTR_ABI => "abi",
}

pub fn func(
    ctx: &mut IrContext,
    location: Location,
    name: Symbol,
    ty: TypeRef,
    body: RegionRef,
) -> Func {
    ops::build(
        ctx,
        ops::builder::<Func>(location)
            .attr(ATTR_SYM_NAME(), Attribute::Symbol(name))
            .attr(ATTR_TYPE(), Attribute::Type(ty))
            .region(body),
    )
}

/// Build a function with an empty entry block whose arguments match `inputs`.
pub fn define(
    ctx: &mut IrContext,
    location: Location,
    name: Symbol,
    inputs: &[TypeRef],
    results: &[TypeRef],
) -> (Func, BlockRef) {
    let ty = core::func(ctx, inputs, results);
    let entry = ctx.create_block(BlockData::new(location, inputs.iter().copied()));
    let body = ctx.create_region(RegionData {
        location,
        blocks: smallvec![entry],
        parent_op: None,
    });
    (func(ctx, location, name, ty, body), entry)
}

/// Build an external declaration: entry block with `func.unreachable`, `abi = "C"`.
pub fn declare(
    ctx: &mut IrContext,
    location: Location,
    name: Symbol,
    inputs: &[TypeRef],
    results: &[TypeRef],
) -> Func {
    let (f, entry) = define(ctx, location, name, inputs, results);
    let unreachable = unreachable(ctx, location);
    ctx.push_op(entry, unreachable.op_ref());
    ctx.op_mut(f.op_ref())
        .attributes
        .insert(ATTR_ABI(), Attribute::String("C".to_owned()));
    f
}

impl Func {
    pub fn sym_name(&self, ctx: &IrContext) -> Symbol {
        match ctx.op(self.0).attributes.get(&ATTR_SYM_NAME()) {
            Some(Attribute::Symbol(s)) => *s,
            _ => panic!("func.func {} without sym_name", self.0),
        }
    }

    pub fn ty(&self, ctx: &IrContext) -> TypeRef {
        match ctx.op(self.0).attributes.get(&ATTR_TYPE()) {
            Some(Attribute::Type(t)) => *t,
            _ => panic!("func.func {} without type", self.0),
        }
    }

    pub fn set_ty(&self, ctx: &mut IrContext, ty: TypeRef) {
        ctx.op_mut(self.0)
            .attributes
            .insert(ATTR_TYPE(), Attribute::Type(ty));
    }

    pub fn body(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    pub fn entry_block(&self, ctx: &IrContext) -> Option<BlockRef> {
        ctx.region(self.body(ctx)).blocks.first().copied()
    }

    /// Whether this is an external declaration rather than a definition.
    pub fn is_declaration(&self, ctx: &IrContext) -> bool {
        ctx.op(self.0).attributes.contains_key(&ATTR_ABI())
    }
}

pub fn call(
    ctx: &mut IrContext,
    location: Location,
    args: impl IntoIterator<Item = ValueRef>,
    results: impl IntoIterator<Item = TypeRef>,
    callee: Symbol,
) -> Call {
    ops::build(
        ctx,
        ops::builder::<Call>(location)
            .operands(args)
            .results(results)
            .attr(ATTR_CALLEE(), Attribute::Symbol(callee)),
    )
}

impl Call {
    pub fn callee(&self, ctx: &IrContext) -> Symbol {
        match ctx.op(self.0).attributes.get(&ATTR_CALLEE()) {
            Some(Attribute::Symbol(s)) => *s,
            _ => panic!("func.call {} without callee", self.0),
        }
    }
}

pub fn r#return(
    ctx: &mut IrContext,
    location: Location,
    values: impl IntoIterator<Item = ValueRef>,
) -> Return {
    ops::build(ctx, ops::builder::<Return>(location).operands(values))
}

pub fn unreachable(ctx: &mut IrContext, location: Location) -> Unreachable {
    ops::build(ctx, ops::builder::<Unreachable>(location))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{PathRef, Span};

    #[test]
    fn declaration_has_unreachable_body() {
        let mut ctx = IrContext::new();
        let loc = Location::new(PathRef::from_u32(0), Span::default());
        let ptr = core::ptr(&mut ctx);
        let f = declare(&mut ctx, loc, Symbol::new("free"), &[ptr], &[]);

        assert!(f.is_declaration(&ctx));
        assert_eq!(f.sym_name(&ctx), "free");
        let entry = f.entry_block(&ctx).expect("entry block");
        assert_eq!(ctx.block_args(entry).len(), 1);
        let only = ctx.block(entry).ops[0];
        assert!(Unreachable::matches(&ctx, only));
    }
}
