//! PatternApplicator: fixpoint iteration of rewrite patterns over a module.
//!
//! Each iteration snapshots the ops of every block, visits nested regions
//! before their owner, and applies at most one pattern per op. Ops removed
//! from their block during the iteration are skipped.

use tracing::{debug, trace};

use super::adaptor::{OpAdaptor, OriginalTypes};
use super::conversion_target::{ConversionTarget, IllegalOp, LegalityCheck};
use super::diagnostic::{Diagnostic, FailureKind};
use super::pattern::RewritePattern;
use super::rewriter::{self, PatternRewriter};
use super::type_converter::TypeConverter;
use crate::context::IrContext;
use crate::module::Module;
use crate::ops;
use crate::refs::{BlockRef, OpRef, RegionRef};

/// Result of applying rewrite patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ApplyResult {
    pub iterations: usize,
    /// Number of pattern applications.
    pub total_changes: usize,
    /// Whether an iteration finished without changes.
    pub reached_fixpoint: bool,
}

/// Result of a conversion run against a target.
#[derive(Debug)]
pub struct ConversionResult {
    pub apply: ApplyResult,
    /// Failures reported by patterns in the last iteration, plus one
    /// `Illegal` diagnostic per remaining illegal op nobody explained.
    pub diagnostics: Vec<Diagnostic>,
    pub illegal: Vec<IllegalOp>,
}

impl ConversionResult {
    pub fn succeeded(&self) -> bool {
        self.illegal.is_empty() && self.apply.reached_fixpoint
    }
}

pub struct PatternApplicator {
    patterns: Vec<Box<dyn RewritePattern>>,
    max_iterations: usize,
    type_converter: TypeConverter,
}

struct Visit<'a> {
    target: Option<&'a ConversionTarget>,
    module_first_block: Option<BlockRef>,
    failures: Vec<Diagnostic>,
}

impl PatternApplicator {
    pub fn new(type_converter: TypeConverter) -> Self {
        Self {
            patterns: Vec::new(),
            max_iterations: 10,
            type_converter,
        }
    }

    pub fn add_pattern(mut self, pattern: impl RewritePattern + 'static) -> Self {
        self.patterns.push(Box::new(pattern));
        self
    }

    pub fn add_boxed_pattern(mut self, pattern: Box<dyn RewritePattern>) -> Self {
        self.patterns.push(pattern);
        self
    }

    pub fn with_max_iterations(mut self, n: usize) -> Self {
        self.max_iterations = n;
        self
    }

    pub fn type_converter(&self) -> &TypeConverter {
        &self.type_converter
    }

    /// Greedily apply patterns to every op until nothing changes.
    pub fn apply_partial(
        &self,
        ctx: &mut IrContext,
        module: Module,
        originals: &mut OriginalTypes,
    ) -> ApplyResult {
        let mut visit = Visit {
            target: None,
            module_first_block: module.first_block(ctx),
            failures: Vec::new(),
        };
        self.iterate(ctx, module, originals, &mut visit)
    }

    /// Apply patterns only to ops `target` considers illegal, then verify.
    ///
    /// Legal ops are never touched. Conversion is partial: the result
    /// lists whatever stayed illegal instead of rolling anything back.
    pub fn apply_conversion(
        &self,
        ctx: &mut IrContext,
        module: Module,
        target: &ConversionTarget,
        originals: &mut OriginalTypes,
    ) -> ConversionResult {
        let mut visit = Visit {
            target: Some(target),
            module_first_block: module.first_block(ctx),
            failures: Vec::new(),
        };
        let apply = self.iterate(ctx, module, originals, &mut visit);

        let illegal = target.verify(ctx, module.body(ctx));
        let mut diagnostics = visit.failures;
        for remaining in &illegal {
            if !diagnostics.iter().any(|d| d.op == remaining.op) {
                diagnostics.push(Diagnostic::error(
                    ctx,
                    remaining.op,
                    FailureKind::Illegal,
                    format!("no pattern converted {}", ops::full_name(ctx, remaining.op)),
                ));
            }
        }

        ConversionResult {
            apply,
            diagnostics,
            illegal,
        }
    }

    fn iterate(
        &self,
        ctx: &mut IrContext,
        module: Module,
        originals: &mut OriginalTypes,
        visit: &mut Visit<'_>,
    ) -> ApplyResult {
        let mut total_changes = 0;
        let mut iterations = 0;

        for _ in 0..self.max_iterations {
            iterations += 1;
            visit.failures.clear();
            let body = module.body(ctx);
            let changes = self.visit_region(ctx, body, originals, visit);
            trace!(iteration = iterations, changes, "pattern iteration");
            total_changes += changes;
            if changes == 0 {
                return ApplyResult {
                    iterations,
                    total_changes,
                    reached_fixpoint: true,
                };
            }
        }

        debug!(iterations, total_changes, "pattern application hit iteration limit");
        ApplyResult {
            iterations,
            total_changes,
            reached_fixpoint: false,
        }
    }

    fn visit_region(
        &self,
        ctx: &mut IrContext,
        region: RegionRef,
        originals: &mut OriginalTypes,
        visit: &mut Visit<'_>,
    ) -> usize {
        let mut changes = 0;
        let blocks: Vec<BlockRef> = ctx.region(region).blocks.to_vec();
        for block in blocks {
            changes += self.visit_block(ctx, block, originals, visit);
        }
        changes
    }

    fn visit_block(
        &self,
        ctx: &mut IrContext,
        block: BlockRef,
        originals: &mut OriginalTypes,
        visit: &mut Visit<'_>,
    ) -> usize {
        let mut changes = 0;
        let ops: Vec<OpRef> = ctx.block(block).ops.to_vec();

        for op in ops {
            if ctx.op(op).parent_block != Some(block) {
                continue;
            }

            let regions: Vec<RegionRef> = ctx.op(op).regions.to_vec();
            for region in regions {
                changes += self.visit_region(ctx, region, originals, visit);
            }

            if ctx.op(op).parent_block != Some(block) {
                continue;
            }

            if let Some(target) = visit.target
                && target.is_legal(ctx, op) == LegalityCheck::Legal
            {
                continue;
            }

            let adaptor = OpAdaptor::new(ctx, op, originals);
            for pattern in &self.patterns {
                let mut rw = PatternRewriter::new(&self.type_converter);
                let matched = pattern.match_and_rewrite(ctx, op, &adaptor, &mut rw);
                visit.failures.extend(rw.take_failures());
                if matched && rw.has_mutations() {
                    trace!(pattern = pattern.name(), %op, "pattern applied");
                    let mutations = rw.take_mutations();
                    rewriter::apply_mutations(
                        ctx,
                        op,
                        mutations,
                        visit.module_first_block,
                        originals,
                    );
                    changes += 1;
                    break;
                }
            }
        }

        changes
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::{arith, core, func};
    use crate::ops::DialectOp;
    use crate::{Location, OperationDataBuilder, PathRef, Span, Symbol, TypeRef};

    fn loc() -> Location {
        Location::new(PathRef::from_u32(0), Span::default())
    }

    /// Renames test.source into test.target.
    struct RenamePattern;

    impl RewritePattern for RenamePattern {
        fn match_and_rewrite(
            &self,
            ctx: &mut IrContext,
            op: OpRef,
            _adaptor: &OpAdaptor,
            rewriter: &mut PatternRewriter,
        ) -> bool {
            let data = ctx.op(op);
            if data.dialect != "test" || data.name != "source" {
                return false;
            }
            let location = data.location;
            let result_types: Vec<TypeRef> = ctx.op_result_types(op).to_vec();
            let new_data =
                OperationDataBuilder::new(location, Symbol::new("test"), Symbol::new("target"))
                    .results(result_types)
                    .build(ctx);
            let new_op = ctx.create_op(new_data);
            rewriter.replace_op(new_op);
            true
        }
    }

    /// Refuses test.stuck with a diagnostic.
    struct RefusePattern;

    impl RewritePattern for RefusePattern {
        fn match_and_rewrite(
            &self,
            ctx: &mut IrContext,
            op: OpRef,
            _adaptor: &OpAdaptor,
            rewriter: &mut PatternRewriter,
        ) -> bool {
            if ctx.op(op).name != "stuck" {
                return false;
            }
            rewriter.notify_match_failure(ctx, op, FailureKind::UnsupportedKind, "cannot lower")
        }
    }

    fn test_op(ctx: &mut IrContext, name: &'static str, ty: TypeRef) -> OpRef {
        let data = OperationDataBuilder::new(loc(), Symbol::new("test"), Symbol::new(name))
            .result(ty)
            .build(ctx);
        ctx.create_op(data)
    }

    #[test]
    fn replacement_keeps_uses_and_position() {
        let mut ctx = IrContext::new();
        let module = core::module(&mut ctx, loc(), Symbol::new("m"));
        let block = module.first_block(&ctx).unwrap();
        let i32_ty = core::i32(&mut ctx);

        let source = test_op(&mut ctx, "source", i32_ty);
        let v = ctx.op_result(source, 0);
        let user = func::r#return(&mut ctx, loc(), [v]);
        ctx.push_op(block, source);
        ctx.push_op(block, user.op_ref());

        let mut originals = OriginalTypes::capture(&ctx, module.body(&ctx));
        let applicator = PatternApplicator::new(TypeConverter::new()).add_pattern(RenamePattern);
        let result = applicator.apply_partial(&mut ctx, module, &mut originals);

        assert!(result.reached_fixpoint);
        assert_eq!(result.total_changes, 1);
        let ops = module.ops(&ctx);
        assert_eq!(ops.len(), 2);
        assert_eq!(ctx.op(ops[0]).name, "target");
        assert_eq!(ctx.op_operands(ops[1]), &[ctx.op_result(ops[0], 0)]);
        assert_eq!(originals.get(&ctx, ctx.op_result(ops[0], 0)), i32_ty);
    }

    #[test]
    fn conversion_reports_pattern_failures() {
        let mut ctx = IrContext::new();
        let module = core::module(&mut ctx, loc(), Symbol::new("m"));
        let block = module.first_block(&ctx).unwrap();
        let i32_ty = core::i32(&mut ctx);
        let stuck = test_op(&mut ctx, "stuck", i32_ty);
        let fine = arith::r#const(&mut ctx, loc(), i32_ty, 1);
        ctx.push_op(block, stuck);
        ctx.push_op(block, fine.op_ref());

        let mut target = ConversionTarget::new();
        target.add_illegal_dialect("test");
        let mut originals = OriginalTypes::new();
        let applicator = PatternApplicator::new(TypeConverter::new()).add_pattern(RefusePattern);
        let result = applicator.apply_conversion(&mut ctx, module, &target, &mut originals);

        assert!(!result.succeeded());
        assert_eq!(result.illegal.len(), 1);
        assert_eq!(result.diagnostics.len(), 1);
        insta::assert_snapshot!(
            result.diagnostics[0].to_string(),
            @"error: test.stuck: unsupported kind: cannot lower"
        );
    }

    #[test]
    fn conversion_skips_legal_ops() {
        let mut ctx = IrContext::new();
        let module = core::module(&mut ctx, loc(), Symbol::new("m"));
        let block = module.first_block(&ctx).unwrap();
        let i32_ty = core::i32(&mut ctx);
        let source = test_op(&mut ctx, "source", i32_ty);
        ctx.push_op(block, source);

        let mut target = ConversionTarget::new();
        target.add_legal_dialect("test");
        let mut originals = OriginalTypes::new();
        let applicator = PatternApplicator::new(TypeConverter::new()).add_pattern(RenamePattern);
        let result = applicator.apply_conversion(&mut ctx, module, &target, &mut originals);

        assert!(result.succeeded());
        assert_eq!(result.apply.total_changes, 0);
        assert_eq!(ctx.op(module.ops(&ctx)[0]).name, "source");
    }
}
