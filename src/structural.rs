//! Type conversion of region-bearing and signature-carrying operations.
//!
//! One generic recipe handles every such op: convert the result types,
//! build a replacement with the same attributes and no regions, move the
//! regions across, retype block arguments in place, then let RAUW redirect
//! uses of the old results. Regions are moved, never cloned, so the nested
//! ops keep their identity and are legalized exactly once.
//!
//! Only strict 1:1 type mappings are accepted.

use spindle_ir::rewrite::{
    ConversionTarget, FailureKind, LegalityCheck, OpAdaptor, PatternApplicator, PatternRewriter,
    RewritePattern, TypeConverter, helpers,
};
use spindle_ir::{Attribute, BlockRef, IrContext, OpRef, OperationDataBuilder, TypeRef, ValueRef};

/// Ops converted structurally during the async lowering.
pub const STRUCTURAL_OPS: &[(&str, &str)] = &[
    ("scf", "if"),
    ("scf", "for"),
    ("scf", "yield"),
    ("func", "func"),
    ("func", "call"),
    ("func", "return"),
];

/// Async ops whose payload types may be converted without lowering them.
pub const ASYNC_STRUCTURAL_OPS: &[(&str, &str)] = &[
    ("async", "execute"),
    ("async", "await"),
    ("async", "yield"),
];

pub struct ConvertStructuralPattern {
    dialect: &'static str,
    name: &'static str,
}

impl ConvertStructuralPattern {
    pub fn new(dialect: &'static str, name: &'static str) -> Self {
        Self { dialect, name }
    }
}

impl RewritePattern for ConvertStructuralPattern {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        _adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let data = ctx.op(op);
        if data.dialect != self.dialect || data.name != self.name {
            return false;
        }
        let converter = rewriter.type_converter();

        // Everything is validated before the replacement is created.
        let result_types: Vec<TypeRef> = ctx.op_result_types(op).to_vec();
        let new_results = match converter.convert_types(&mut ctx.types, &result_types) {
            Ok(types) => types,
            Err(err) => {
                return rewriter.notify_match_failure(
                    ctx,
                    op,
                    FailureKind::NotOneToOne,
                    format!("result: {err}"),
                );
            }
        };

        let regions = ctx.op(op).regions.to_vec();
        let mut arg_updates: Vec<(BlockRef, u32, TypeRef)> = Vec::new();
        for &region in &regions {
            for block in ctx.region(region).blocks.to_vec() {
                let args: Vec<ValueRef> = ctx.block_args(block).to_vec();
                for (index, arg) in args.into_iter().enumerate() {
                    let ty = ctx.value_ty(arg);
                    match converter.convert_type(&mut ctx.types, ty) {
                        Ok(new_ty) if new_ty != ty => arg_updates.push((block, index as u32, new_ty)),
                        Ok(_) => {}
                        Err(err) => {
                            return rewriter.notify_match_failure(
                                ctx,
                                op,
                                FailureKind::NotOneToOne,
                                format!("block argument: {err}"),
                            );
                        }
                    }
                }
            }
        }

        let mut attributes = ctx.op(op).attributes.clone();
        let mut attributes_changed = false;
        for attr in attributes.values_mut() {
            let Attribute::Type(ty) = attr else {
                continue;
            };
            match converter.convert_type(&mut ctx.types, *ty) {
                Ok(new_ty) => {
                    attributes_changed |= new_ty != *ty;
                    *ty = new_ty;
                }
                Err(err) => {
                    return rewriter.notify_match_failure(
                        ctx,
                        op,
                        FailureKind::NotOneToOne,
                        format!("type attribute: {err}"),
                    );
                }
            }
        }

        if new_results == result_types && arg_updates.is_empty() && !attributes_changed {
            return false;
        }

        let data = ctx.op(op);
        let location = data.location;
        let dialect = data.dialect;
        let name = data.name;
        let successors = data.successors.to_vec();
        let operands = ctx.op_operands(op).to_vec();
        let new_data = OperationDataBuilder::new(location, dialect, name)
            .operands(operands)
            .results(new_results)
            .attrs(attributes)
            .successors(successors)
            .build(ctx);
        let new_op = ctx.create_op(new_data);

        for region in regions {
            helpers::move_region(ctx, region, new_op);
        }
        for (block, index, ty) in arg_updates {
            ctx.set_block_arg_type(block, index, ty);
        }

        rewriter.replace_op(new_op);
        true
    }

    fn name(&self) -> &'static str {
        "ConvertStructuralPattern"
    }
}

/// Whether every type an op mentions is already legal.
///
/// Looks at results, operands, block arguments of the op's own regions and
/// type attributes. Nested ops are checked on their own.
pub fn is_structurally_legal(ctx: &mut IrContext, converter: &TypeConverter, op: OpRef) -> bool {
    let mut types: Vec<TypeRef> = ctx.op_result_types(op).to_vec();
    types.extend(ctx.op_operands(op).iter().map(|&v| ctx.value_ty(v)));
    for &region in &ctx.op(op).regions {
        for &block in &ctx.region(region).blocks {
            types.extend(ctx.block(block).args.iter().map(|a| a.ty));
        }
    }
    types.extend(ctx.op(op).attributes.values().filter_map(Attribute::as_type));

    types
        .into_iter()
        .all(|ty| converter.is_legal(&mut ctx.types, ty))
}

fn add_dynamic_legality(
    converter: &TypeConverter,
    target: &mut ConversionTarget,
    ops: &'static [(&'static str, &'static str)],
) {
    let converter = converter.clone();
    target.add_dynamic_check(move |ctx, op| {
        let data = ctx.op(op);
        let covered = ops
            .iter()
            .any(|&(dialect, name)| data.dialect == dialect && data.name == name);
        if !covered {
            return None;
        }
        Some(if is_structurally_legal(ctx, &converter, op) {
            LegalityCheck::Legal
        } else {
            LegalityCheck::Illegal
        })
    });
}

fn add_patterns(applicator: PatternApplicator, ops: &'static [(&'static str, &'static str)]) -> PatternApplicator {
    ops.iter().fold(applicator, |applicator, &(dialect, name)| {
        applicator.add_pattern(ConvertStructuralPattern::new(dialect, name))
    })
}

/// Structural conversion of `scf` control flow and `func` signatures.
pub fn populate_structural_conversions(
    converter: &TypeConverter,
    target: &mut ConversionTarget,
    applicator: PatternApplicator,
) -> PatternApplicator {
    add_dynamic_legality(converter, target, STRUCTURAL_OPS);
    add_patterns(applicator, STRUCTURAL_OPS)
}

/// Let another conversion push payload types through `async.execute`,
/// `async.await` and `async.yield` without lowering them.
///
/// These ops become legal as soon as their types are, so this must not be
/// combined with a target that marks the whole async dialect illegal.
pub fn populate_async_structural_conversions(
    converter: &TypeConverter,
    target: &mut ConversionTarget,
    applicator: PatternApplicator,
) -> PatternApplicator {
    add_dynamic_legality(converter, target, ASYNC_STRUCTURAL_OPS);
    add_patterns(applicator, ASYNC_STRUCTURAL_OPS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::r#async;
    use crate::type_converter::async_type_converter;
    use smallvec::{smallvec, SmallVec};
    use spindle_ir::dialect::{arith, core, func, scf};
    use spindle_ir::ops::DialectOp;
    use spindle_ir::rewrite::OriginalTypes;
    use spindle_ir::{BlockData, Location, Module, PathRef, RegionData, Span, Symbol};

    fn loc() -> Location {
        Location::new(PathRef::from_u32(0), Span::default())
    }

    fn single_block_region(ctx: &mut IrContext, ops: &[OpRef]) -> spindle_ir::RegionRef {
        let block = ctx.create_block(BlockData::new(loc(), []));
        for &op in ops {
            ctx.push_op(block, op);
        }
        ctx.create_region(RegionData {
            location: loc(),
            blocks: smallvec![block],
            parent_op: None,
        })
    }

    /// `func @f(%c: i1) -> token { %r = scf.if %c -> token {..} else {..}; return %r }`
    fn token_if(ctx: &mut IrContext) -> (Module, scf::If) {
        let module = core::module(ctx, loc(), Symbol::new("m"));
        let i1 = core::i1(ctx);
        let token = r#async::token_type(ctx);
        let (f, entry) = func::define(ctx, loc(), Symbol::new("f"), &[i1], &[token]);

        let branch = |ctx: &mut IrContext| {
            let t = r#async::runtime_create(ctx, loc(), token);
            let t_v = t.result(ctx);
            let y = scf::r#yield(ctx, loc(), [t_v]);
            single_block_region(ctx, &[t.op_ref(), y.op_ref()])
        };
        let then_region = branch(ctx);
        let else_region = branch(ctx);
        let cond = ctx.block_arg(entry, 0);
        let if_op = scf::r#if(ctx, loc(), cond, [token], then_region, else_region);
        ctx.push_op(entry, if_op.op_ref());
        let r = ctx.op_result(if_op.op_ref(), 0);
        let ret = func::r#return(ctx, loc(), [r]);
        ctx.push_op(entry, ret.op_ref());
        let block = module.first_block(ctx).unwrap();
        ctx.push_op(block, f.op_ref());
        (module, if_op)
    }

    fn structural_applicator(converter: TypeConverter) -> (PatternApplicator, ConversionTarget) {
        let mut target = ConversionTarget::new();
        let applicator = populate_structural_conversions(
            &converter,
            &mut target,
            PatternApplicator::new(converter.clone()),
        );
        (applicator, target)
    }

    #[test]
    fn moved_regions_keep_their_ops() {
        let mut ctx = IrContext::new();
        let (module, if_op) = token_if(&mut ctx);
        let before: Vec<SmallVec<[OpRef; 4]>> = ctx
            .op(if_op.op_ref())
            .regions
            .iter()
            .map(|&r| ctx.block(ctx.region(r).blocks[0]).ops.clone())
            .collect();

        let mut originals = OriginalTypes::capture(&ctx, module.body(&ctx));
        let (applicator, _) = structural_applicator(async_type_converter());
        let result = applicator.apply_partial(&mut ctx, module, &mut originals);
        assert!(result.reached_fixpoint);

        let f = func::Func::from_op(&ctx, module.ops(&ctx)[0]).unwrap();
        let entry = f.entry_block(&ctx).unwrap();
        let new_if = scf::If::from_op(&ctx, ctx.block(entry).ops[0]).unwrap();
        assert_ne!(new_if, if_op);
        let after: Vec<SmallVec<[OpRef; 4]>> = ctx
            .op(new_if.op_ref())
            .regions
            .iter()
            .map(|&r| ctx.block(ctx.region(r).blocks[0]).ops.clone())
            .collect();
        assert_eq!(before, after);

        let ptr = core::ptr(&mut ctx);
        assert_eq!(ctx.op_result_types(new_if.op_ref()), &[ptr]);
        let ret = ctx.block(entry).ops[1];
        assert_eq!(ctx.op_operands(ret), &[ctx.op_result(new_if.op_ref(), 0)]);
        assert_eq!(core::func_signature(&ctx, f.ty(&ctx)).unwrap().1, vec![ptr]);
    }

    #[test]
    fn one_to_many_conversion_fails_fast() {
        let mut ctx = IrContext::new();
        let (module, if_op) = token_if(&mut ctx);
        let i64_ty = core::i64(&mut ctx);
        let token = r#async::token_type(&mut ctx);

        let mut converter = TypeConverter::new();
        converter.add_expansion(move |_, ty| (ty == token).then(|| smallvec![i64_ty, i64_ty]));
        let (applicator, target) = structural_applicator(converter);
        let mut originals = OriginalTypes::new();
        let result = applicator.apply_conversion(&mut ctx, module, &target, &mut originals);

        assert!(!result.succeeded());
        let diag = result
            .diagnostics
            .iter()
            .find(|d| d.op == if_op.op_ref())
            .expect("diagnostic on scf.if");
        assert_eq!(diag.kind, FailureKind::NotOneToOne);
        assert!(diag.to_string().contains("not a 1:1"));
        // Nothing was rewritten around the failing op.
        assert_eq!(ctx.op(if_op.op_ref()).regions.len(), 2);
    }

    #[test]
    fn legality_tracks_operand_types() {
        let mut ctx = IrContext::new();
        let converter = async_type_converter();
        let i32_ty = core::i32(&mut ctx);
        let token = r#async::token_type(&mut ctx);
        let t = r#async::runtime_create(&mut ctx, loc(), token).result(&ctx);
        let c = arith::r#const(&mut ctx, loc(), i32_ty, 0).result(&ctx);
        let yield_token = scf::r#yield(&mut ctx, loc(), [t]);
        let yield_int = scf::r#yield(&mut ctx, loc(), [c]);

        assert!(!is_structurally_legal(&mut ctx, &converter, yield_token.op_ref()));
        assert!(is_structurally_legal(&mut ctx, &converter, yield_int.op_ref()));
    }

    #[test]
    fn async_payloads_follow_the_converter() {
        let mut ctx = IrContext::new();
        let module = core::module(&mut ctx, loc(), Symbol::new("m"));
        let i32_ty = core::i32(&mut ctx);
        let i64_ty = core::i64(&mut ctx);
        let value_i32 = r#async::value_type(&mut ctx, i32_ty);
        let (f, entry) = func::define(&mut ctx, loc(), Symbol::new("f"), &[value_i32], &[i32_ty]);
        let input = ctx.block_arg(entry, 0);

        // execute(%input) { ^bb0(%x: i32): yield %x }
        let body_entry = ctx.create_block(BlockData::new(loc(), [i32_ty]));
        let x = ctx.block_arg(body_entry, 0);
        let y = r#async::r#yield(&mut ctx, loc(), [x]);
        ctx.push_op(body_entry, y.op_ref());
        let body = ctx.create_region(RegionData {
            location: loc(),
            blocks: smallvec![body_entry],
            parent_op: None,
        });
        let exec = r#async::execute(&mut ctx, loc(), &[], &[input], &[i32_ty], body);
        ctx.push_op(entry, exec.op_ref());
        let value = exec.values(&ctx)[0];
        let awaited = r#async::r#await(&mut ctx, loc(), value);
        ctx.push_op(entry, awaited.op_ref());
        let result = awaited.result(&ctx).unwrap();
        let ret = func::r#return(&mut ctx, loc(), [result]);
        ctx.push_op(entry, ret.op_ref());
        let top = module.first_block(&ctx).unwrap();
        ctx.push_op(top, f.op_ref());

        let mut converter = TypeConverter::new();
        converter.add_conversion(move |_, ty| (ty == i32_ty).then_some(i64_ty));
        let mut target = ConversionTarget::new();
        let applicator = PatternApplicator::new(converter.clone());
        let applicator = populate_structural_conversions(&converter, &mut target, applicator);
        let applicator = populate_async_structural_conversions(&converter, &mut target, applicator);
        let mut originals = OriginalTypes::capture(&ctx, module.body(&ctx));
        let result = applicator.apply_conversion(&mut ctx, module, &target, &mut originals);
        assert!(result.succeeded(), "{:?}", result.diagnostics);

        let value_i64 = r#async::value_type(&mut ctx, i64_ty);
        let token = r#async::token_type(&mut ctx);
        let f = func::Func::from_op(&ctx, module.ops(&ctx)[0]).unwrap();
        let entry = f.entry_block(&ctx).unwrap();
        let ops = ctx.block(entry).ops.clone();

        let exec = r#async::Execute::from_op(&ctx, ops[0]).unwrap();
        assert_eq!(ctx.op_result_types(exec.op_ref()), &[token, value_i64]);
        let body_entry = ctx.region(exec.body(&ctx)).blocks[0];
        assert_eq!(ctx.value_ty(ctx.block_arg(body_entry, 0)), i64_ty);
        assert!(r#async::Yield::matches(&ctx, ctx.block(body_entry).ops[0]));

        let awaited = r#async::Await::from_op(&ctx, ops[1]).unwrap();
        assert_eq!(awaited.operand(&ctx), exec.values(&ctx)[0]);
        assert_eq!(ctx.value_ty(awaited.result(&ctx).unwrap()), i64_ty);
        assert_eq!(
            core::func_signature(&ctx, f.ty(&ctx)).unwrap(),
            (vec![value_i64], vec![i64_ty])
        );
    }
}
