//! Driver of the async lowering.
//!
//! Stages, in order:
//! 1. declare the runtime ABI, the frame allocator and the resume trampoline;
//! 2. outline `async.execute` into coroutines and lower `async.await`;
//! 3. check that every coroutine frees its frame exactly once;
//! 4. convert the signatures of region-holding ops to a fixed point;
//! 5. lower every remaining async op, reporting whatever stays illegal.

use std::cell::RefCell;
use std::rc::Rc;

use spindle_ir::dialect::func;
use spindle_ir::ops::DialectOp;
use spindle_ir::rewrite::{
    ApplyResult, ConversionTarget, OriginalTypes, PatternApplicator, TypeConverter,
};
use spindle_ir::{IrContext, Module, Symbol};
use tracing::{debug, warn};

use crate::abi::{RuntimeAbi, declare_abi};
use crate::coroutine::{
    CoroBeginLowering, CoroEndLowering, CoroFreeLowering, CoroIdLowering, CoroSaveLowering,
    CoroSuspendLowering,
};
use crate::dialect::r#async;
use crate::errors::{LoweringError, LoweringResult};
use crate::execute::{OutlineExecutePattern, OutlinedCoroutines, lower_awaits};
use crate::fsm::{is_coroutine, verify_frame_lifetime};
use crate::options::LoweringOptions;
use crate::runtime::{
    AddToGroupLowering, AwaitAndResumeLowering, AwaitLowering, CreateLowering, LoadLowering,
    RefCountLowering, ResumeLowering, SetAvailableLowering, StoreLowering,
};
use crate::structural::populate_structural_conversions;
use crate::type_converter::async_type_converter;

/// What a successful lowering did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoweringReport {
    pub structural: ApplyResult,
    pub ops: ApplyResult,
    /// Runtime functions, allocator and trampoline added to the module.
    pub declared: Vec<Symbol>,
    /// Coroutines outlined from `async.execute`.
    pub outlined: Vec<Symbol>,
}

/// Lower every async operation in `module` to runtime calls and `coro` ops.
pub fn lower_async(
    ctx: &mut IrContext,
    module: Module,
    options: &LoweringOptions,
) -> LoweringResult<LoweringReport> {
    let layout = options.data_layout()?;
    debug!(pointer_bytes = layout.pointer_bytes(), "lowering async operations");

    let abi = Rc::new(RuntimeAbi::new(options));
    let declared = declare_abi(ctx, module, &abi)?;

    let outlined = outline_executes(ctx, module, options)?;
    verify_coroutines(ctx, module)?;

    let converter = async_type_converter();
    let mut originals = OriginalTypes::capture(ctx, module.body(ctx));

    let mut structural_target = ConversionTarget::new();
    let structural_patterns = populate_structural_conversions(
        &converter,
        &mut structural_target,
        PatternApplicator::new(converter.clone()).with_max_iterations(options.max_iterations),
    );
    let structural = structural_patterns.apply_partial(ctx, module, &mut originals);
    if !structural.reached_fixpoint {
        return Err(LoweringError::no_fixpoint("structural", structural.iterations));
    }
    debug!(changes = structural.total_changes, "structural conversion done");

    let mut target = ConversionTarget::new();
    target.add_illegal_dialect(r#async::DIALECT_NAME);
    let patterns = op_patterns(&converter, &abi, options);
    let patterns = populate_structural_conversions(&converter, &mut target, patterns);
    let result = patterns.apply_conversion(ctx, module, &target, &mut originals);

    if !result.illegal.is_empty() {
        for diagnostic in &result.diagnostics {
            warn!(%diagnostic, "async lowering failed");
        }
        return Err(LoweringError::legalization(result.diagnostics));
    }
    if !result.apply.reached_fixpoint {
        return Err(LoweringError::no_fixpoint("legalization", result.apply.iterations));
    }
    verify_coroutines(ctx, module)?;
    debug!(
        changes = result.apply.total_changes,
        coroutines = outlined.len(),
        "async lowering done"
    );

    Ok(LoweringReport {
        structural,
        ops: result.apply,
        declared,
        outlined,
    })
}

fn outline_executes(
    ctx: &mut IrContext,
    module: Module,
    options: &LoweringOptions,
) -> LoweringResult<Vec<Symbol>> {
    let outlined = Rc::new(RefCell::new(OutlinedCoroutines::default()));
    let outliner = PatternApplicator::new(TypeConverter::new())
        .add_pattern(OutlineExecutePattern {
            outlined: outlined.clone(),
        })
        .with_max_iterations(options.max_iterations);
    let mut target = ConversionTarget::new();
    target.add_illegal_op(r#async::DIALECT_NAME, "execute");
    let mut originals = OriginalTypes::new();

    let result = outliner.apply_conversion(ctx, module, &target, &mut originals);
    if !result.illegal.is_empty() {
        return Err(LoweringError::legalization(result.diagnostics));
    }
    if !result.apply.reached_fixpoint {
        return Err(LoweringError::no_fixpoint("outlining", result.apply.iterations));
    }

    let outlined = outlined.borrow();
    let diagnostics = lower_awaits(ctx, module, &outlined);
    if !diagnostics.is_empty() {
        return Err(LoweringError::legalization(diagnostics));
    }
    Ok(outlined.names().to_vec())
}

fn verify_coroutines(ctx: &IrContext, module: Module) -> LoweringResult<()> {
    for op in module.ops(ctx) {
        let Ok(f) = func::Func::from_op(ctx, op) else {
            continue;
        };
        if is_coroutine(ctx, f) {
            verify_frame_lifetime(ctx, f)?;
        }
    }
    Ok(())
}

fn op_patterns(
    converter: &TypeConverter,
    abi: &Rc<RuntimeAbi>,
    options: &LoweringOptions,
) -> PatternApplicator {
    PatternApplicator::new(converter.clone())
        .with_max_iterations(options.max_iterations)
        .add_pattern(CoroIdLowering)
        .add_pattern(CoroBeginLowering { abi: abi.clone() })
        .add_pattern(CoroFreeLowering { abi: abi.clone() })
        .add_pattern(CoroEndLowering)
        .add_pattern(CoroSaveLowering)
        .add_pattern(CoroSuspendLowering)
        .add_pattern(CreateLowering { abi: abi.clone() })
        .add_pattern(SetAvailableLowering { abi: abi.clone() })
        .add_pattern(AwaitLowering { abi: abi.clone() })
        .add_pattern(AwaitAndResumeLowering { abi: abi.clone() })
        .add_pattern(ResumeLowering { abi: abi.clone() })
        .add_pattern(StoreLowering { abi: abi.clone() })
        .add_pattern(LoadLowering { abi: abi.clone() })
        .add_pattern(AddToGroupLowering { abi: abi.clone() })
        .add_pattern(RefCountLowering { abi: abi.clone() })
}
