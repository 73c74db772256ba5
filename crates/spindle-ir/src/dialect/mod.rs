//! Lowered dialects shared by every pass.

pub mod arith;
pub mod cf;
pub mod core;
pub mod func;
pub mod ptr;
pub mod scf;

#[cfg(test)]
mod tests {
    use crate::dialect::{arith, cf, core, func, ptr};
    use crate::ops::DialectOp;
    use crate::{BlockData, IrContext, Location, PathRef, Span, Symbol};

    fn loc() -> Location {
        Location::new(PathRef::from_u32(0), Span::default())
    }

    #[test]
    fn const_round_trips_negative_values() {
        let mut ctx = IrContext::new();
        let i32_ty = core::i32(&mut ctx);
        let c = arith::r#const(&mut ctx, loc(), i32_ty, -1);
        let view = arith::Const::from_op(&ctx, c.op_ref()).expect("arith.const");
        assert_eq!(view.value(&ctx), -1);
        assert_eq!(arith::const_value(&ctx, c.result(&ctx)), Some(-1));
    }

    #[test]
    fn from_op_rejects_other_kinds() {
        let mut ctx = IrContext::new();
        let i32_ty = core::i32(&mut ctx);
        let c = arith::r#const(&mut ctx, loc(), i32_ty, 0);
        let err = func::Call::from_op(&ctx, c.op_ref()).unwrap_err();
        assert_eq!(err.to_string(), "expected `call`, found `arith.const`");
    }

    #[test]
    fn switch_resolves_cases_and_default() {
        let mut ctx = IrContext::new();
        let i32_ty = core::i32(&mut ctx);
        let flag = arith::r#const(&mut ctx, loc(), i32_ty, 0);
        let a = ctx.create_block(BlockData::new(loc(), []));
        let b = ctx.create_block(BlockData::new(loc(), []));
        let d = ctx.create_block(BlockData::new(loc(), []));
        let flag_v = flag.result(&ctx);
        let sw = cf::switch(&mut ctx, loc(), flag_v, d, &[(0, a), (1, b)]);

        assert_eq!(sw.target(&ctx, 0), a);
        assert_eq!(sw.target(&ctx, 1), b);
        assert_eq!(sw.target(&ctx, -1), d);
        assert_eq!(sw.target(&ctx, 7), d);
    }

    #[test]
    fn func_addr_keeps_symbol() {
        let mut ctx = IrContext::new();
        let p = core::ptr(&mut ctx);
        let addr = ptr::func_addr(&mut ctx, loc(), Symbol::new("__resume"), p);
        assert_eq!(addr.symbol(&ctx), "__resume");
        assert_eq!(ctx.value_ty(addr.result(&ctx)), p);
    }
}
