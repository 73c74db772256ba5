//! Outlining of `async.execute` regions into coroutine functions, and
//! lowering of `async.await` to runtime ops.
//!
//! An execute becomes a call to a fresh module-level function:
//!
//! ```text
//! func @f_async_execute_0(%deps.., %operands.., %captures..) -> (token, values..)
//!   entry:    token/value creation, coro_id, coro_begin,
//!             coro_save, runtime_resume, coro_suspend(^suspend, ^resume0, ^cleanup)
//!   resumeN:  one save/await_and_resume/suspend per dependency and operand
//!   body:     payload loads, then the execute body; every yield stores its
//!             payloads, sets values then the token available, and branches
//!             to ^cleanup
//!   cleanup:  coro_free, br ^suspend
//!   suspend:  coro_end, return token and values
//! ```
//!
//! Awaits are handled afterwards by `lower_awaits`, once every coroutine
//! is known.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

use spindle_ir::dialect::{cf, func};
use spindle_ir::ops::DialectOp;
use spindle_ir::rewrite::helpers::split_block;
use spindle_ir::rewrite::{Diagnostic, FailureKind, OpAdaptor, PatternRewriter, RewritePattern};
use spindle_ir::walk;
use spindle_ir::{
    BlockData, BlockRef, IrContext, Location, Module, OpRef, RegionRef, Symbol, TypeRef, ValueRef,
};
use tracing::debug;

use crate::dialect::r#async::{self, AsyncKind};

/// Frame and exit blocks of an outlined coroutine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoroutineInfo {
    pub id: ValueRef,
    pub handle: ValueRef,
    pub cleanup: BlockRef,
    pub suspend: BlockRef,
}

/// Coroutines created so far, in outlining order.
#[derive(Debug, Default)]
pub struct OutlinedCoroutines {
    counter: u32,
    order: Vec<Symbol>,
    info: HashMap<Symbol, CoroutineInfo>,
}

impl OutlinedCoroutines {
    pub fn get(&self, name: Symbol) -> Option<&CoroutineInfo> {
        self.info.get(&name)
    }

    pub fn names(&self) -> &[Symbol] {
        &self.order
    }

    /// `<parent>_async_execute_<n>`, skipping names already taken in `module`.
    fn next_name(&mut self, ctx: &IrContext, module: Option<Module>, parent: &str) -> Symbol {
        loop {
            let name = Symbol::from_dynamic(&format!("{parent}_async_execute_{}", self.counter));
            self.counter += 1;
            let taken = self.info.contains_key(&name)
                || module.is_some_and(|m| m.lookup_symbol(ctx, name).is_some());
            if !taken {
                return name;
            }
        }
    }

    fn record(&mut self, name: Symbol, info: CoroutineInfo) {
        self.order.push(name);
        self.info.insert(name, info);
    }
}

/// Closest enclosing `func.func` of `op`.
fn enclosing_func(ctx: &IrContext, op: OpRef) -> Option<func::Func> {
    let mut current = ctx.parent_op(op);
    while let Some(parent) = current {
        if let Ok(f) = func::Func::from_op(ctx, parent) {
            return Some(f);
        }
        current = ctx.parent_op(parent);
    }
    None
}

/// Values used inside `region` but defined outside of it, in first-use order.
fn live_ins(ctx: &IrContext, region: RegionRef) -> Vec<ValueRef> {
    let mut seen = HashSet::new();
    let mut captured = Vec::new();
    for op in walk::collect_ops(ctx, region) {
        for &v in ctx.op_operands(op) {
            let inside = ctx
                .value_block(v)
                .is_some_and(|b| ctx.is_block_in_region(b, region));
            if !inside && seen.insert(v) {
                captured.push(v);
            }
        }
    }
    captured
}

/// `async.yield` terminators of the top-level blocks of `region`.
fn top_level_yields(ctx: &IrContext, region: RegionRef) -> Vec<OpRef> {
    ctx.region(region)
        .blocks
        .iter()
        .filter_map(|&b| ctx.block_terminator(b))
        .filter(|&op| r#async::Yield::matches(ctx, op))
        .collect()
}

fn new_block(ctx: &mut IrContext, location: Location, region: RegionRef) -> BlockRef {
    let block = ctx.create_block(BlockData::new(location, []));
    ctx.push_block(region, block);
    block
}

/// `coro_save` + `coro_suspend` at the end of `block`, resuming in a new block.
fn suspend_into_new_block(
    ctx: &mut IrContext,
    location: Location,
    block: BlockRef,
    region: RegionRef,
    info: &CoroutineInfo,
    before_suspend: impl FnOnce(&mut IrContext) -> OpRef,
) -> BlockRef {
    let save = r#async::coro_save(ctx, location, info.handle);
    let state = save.result(ctx);
    ctx.push_op(block, save.op_ref());
    let op = before_suspend(ctx);
    ctx.push_op(block, op);
    let resume = new_block(ctx, location, region);
    let suspend =
        r#async::coro_suspend(ctx, location, state, info.suspend, resume, info.cleanup);
    ctx.push_op(block, suspend.op_ref());
    resume
}

// ============================================================================
// Pattern: async.execute → outlined coroutine + call
// ============================================================================

pub struct OutlineExecutePattern {
    pub outlined: Rc<RefCell<OutlinedCoroutines>>,
}

impl OutlineExecutePattern {
    fn check(&self, ctx: &IrContext, exec: r#async::Execute) -> Result<(), String> {
        for &dep in exec.dependencies(ctx) {
            if AsyncKind::of(ctx, ctx.value_ty(dep)) != Some(AsyncKind::Token) {
                return Err("execute dependencies must be tokens".to_owned());
            }
        }
        for &operand in exec.body_operands(ctx) {
            if !matches!(AsyncKind::of(ctx, ctx.value_ty(operand)), Some(AsyncKind::Value(_))) {
                return Err("execute operands must be async values".to_owned());
            }
        }

        let body = exec.body(ctx);
        let Some(&entry) = ctx.region(body).blocks.first() else {
            return Err("execute body has no blocks".to_owned());
        };
        let operands = exec.body_operands(ctx).len();
        let params = ctx.block_args(entry).len();
        if operands != params {
            return Err(format!(
                "execute body takes {params} payload(s) for {operands} operand(s)"
            ));
        }

        let values = exec.values(ctx).len();
        for y in top_level_yields(ctx, body) {
            let yielded = ctx.op_operands(y).len();
            if yielded != values {
                return Err(format!("yield of {yielded} value(s) from an execute of {values}"));
            }
        }
        Ok(())
    }
}

impl RewritePattern for OutlineExecutePattern {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        _adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let Ok(exec) = r#async::Execute::from_op(ctx, op) else {
            return false;
        };
        if let Err(message) = self.check(ctx, exec) {
            return rewriter.notify_match_failure(ctx, op, FailureKind::UnsupportedKind, message);
        }

        let location = ctx.op(op).location;
        let exec_body = exec.body(ctx);
        let parent = enclosing_func(ctx, op)
            .map(|f| f.sym_name(ctx).to_string())
            .unwrap_or_else(|| "module".to_owned());
        let module = Module::of(ctx, op);
        let name = self.outlined.borrow_mut().next_name(ctx, module, &parent);

        let dependencies = exec.dependencies(ctx).to_vec();
        let operands = exec.body_operands(ctx).to_vec();
        let captures = live_ins(ctx, exec_body);
        let args: Vec<ValueRef> = dependencies
            .iter()
            .chain(&operands)
            .chain(&captures)
            .copied()
            .collect();
        let inputs: Vec<TypeRef> = args.iter().map(|&v| ctx.value_ty(v)).collect();
        let results: Vec<TypeRef> = ctx.op_result_types(op).to_vec();

        let (coroutine, entry) = func::define(ctx, location, name, &inputs, &results);
        let region = coroutine.body(ctx);
        let params: Vec<ValueRef> = ctx.block_args(entry).to_vec();
        let (dep_params, rest) = params.split_at(dependencies.len());
        let (operand_params, capture_params) = rest.split_at(operands.len());

        // Captured values are read from the function parameters.
        for (&captured, &param) in captures.iter().zip(capture_params) {
            let uses = ctx.uses(captured).to_vec();
            for u in uses {
                let inside = ctx
                    .op(u.user)
                    .parent_block
                    .is_some_and(|b| ctx.is_block_in_region(b, exec_body));
                if inside {
                    ctx.set_operand(u.user, u.operand_index, param);
                }
            }
        }

        // Results and frame.
        let token_ty = results[0];
        let token = r#async::runtime_create(ctx, location, token_ty);
        let token_v = token.result(ctx);
        ctx.push_op(entry, token.op_ref());
        let mut values = Vec::with_capacity(results.len() - 1);
        for &ty in &results[1..] {
            let value = r#async::runtime_create(ctx, location, ty);
            values.push(value.result(ctx));
            ctx.push_op(entry, value.op_ref());
        }
        let id = r#async::coro_id(ctx, location);
        let id_v = id.result(ctx);
        ctx.push_op(entry, id.op_ref());
        let begin = r#async::coro_begin(ctx, location, id_v);
        let handle = begin.result(ctx);
        ctx.push_op(entry, begin.op_ref());

        let info = CoroutineInfo {
            id: id_v,
            handle,
            cleanup: ctx.create_block(BlockData::new(location, [])),
            suspend: ctx.create_block(BlockData::new(location, [])),
        };

        // Initial suspension: hand the coroutine to the runtime.
        let mut current = suspend_into_new_block(ctx, location, entry, region, &info, |ctx| {
            r#async::runtime_resume(ctx, location, handle).op_ref()
        });

        // Wait for every dependency and operand without blocking a thread.
        for &awaited in dep_params.iter().chain(operand_params) {
            current = suspend_into_new_block(ctx, location, current, region, &info, |ctx| {
                r#async::runtime_await_and_resume(ctx, location, awaited, handle).op_ref()
            });
        }

        // Payloads replace the body's entry arguments.
        let body_blocks: Vec<BlockRef> = ctx.region(exec_body).blocks.to_vec();
        let body_entry = body_blocks[0];
        for (index, &param) in operand_params.iter().enumerate() {
            let ty = ctx.value_ty(param);
            let Some(payload) = r#async::value_payload(ctx, ty) else {
                continue;
            };
            let load = r#async::runtime_load(ctx, location, param, payload);
            let loaded = load.result(ctx);
            ctx.push_op(current, load.op_ref());
            let old = ctx.block_arg(body_entry, index as u32);
            ctx.replace_all_uses(old, loaded);
        }

        // Move the body.
        let entry_ops: Vec<OpRef> = ctx.block(body_entry).ops.to_vec();
        for body_op in entry_ops {
            ctx.remove_op_from_block(body_entry, body_op);
            ctx.push_op(current, body_op);
        }
        ctx.region_mut(exec_body).blocks.clear();
        for &b in &body_blocks {
            ctx.block_mut(b).parent_region = None;
        }
        for &b in &body_blocks[1..] {
            ctx.push_block(region, b);
        }

        // Yields publish their results and finish the coroutine.
        for y in top_level_yields(ctx, region) {
            let Some(block) = ctx.op(y).parent_block else {
                continue;
            };
            let yielded: Vec<ValueRef> = ctx.op_operands(y).to_vec();
            let mut publish = Vec::new();
            for (&payload, &storage) in yielded.iter().zip(&values) {
                publish.push(r#async::runtime_store(ctx, location, payload, storage).op_ref());
            }
            for &storage in &values {
                publish.push(r#async::runtime_set_available(ctx, location, storage).op_ref());
            }
            publish.push(r#async::runtime_set_available(ctx, location, token_v).op_ref());
            publish.push(cf::br(ctx, location, info.cleanup, []).op_ref());
            for publish_op in publish {
                ctx.insert_op_before(block, y, publish_op);
            }
            ctx.remove_op_from_block(block, y);
            ctx.remove_op(y);
        }

        // Cleanup frees the frame; suspend ends the coroutine and returns.
        ctx.push_block(region, info.cleanup);
        let free = r#async::coro_free(ctx, location, id_v, handle);
        ctx.push_op(info.cleanup, free.op_ref());
        let to_suspend = cf::br(ctx, location, info.suspend, []);
        ctx.push_op(info.cleanup, to_suspend.op_ref());

        ctx.push_block(region, info.suspend);
        let end = r#async::coro_end(ctx, location, handle);
        ctx.push_op(info.suspend, end.op_ref());
        let returned: Vec<ValueRef> = std::iter::once(token_v).chain(values).collect();
        let ret = func::r#return(ctx, location, returned);
        ctx.push_op(info.suspend, ret.op_ref());

        self.outlined.borrow_mut().record(name, info);
        debug!(%name, captures = captures.len(), "outlined async.execute");

        let call = func::call(ctx, location, args, results, name);
        rewriter.add_module_op(coroutine.op_ref());
        rewriter.replace_op(call.op_ref());
        true
    }
}

// ============================================================================
// async.await
// ============================================================================

/// Lower every `async.await` in `module`.
///
/// Awaits in plain functions block the calling thread. Awaits in the
/// top-level blocks of an outlined coroutine become suspension points.
/// An await nested in a region inside a coroutine cannot branch to the
/// coroutine's exits and is reported instead.
pub fn lower_awaits(
    ctx: &mut IrContext,
    module: Module,
    outlined: &OutlinedCoroutines,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let body = module.body(ctx);
    let awaits = walk::collect_typed::<r#async::Await>(ctx, body);

    for awaited in awaits {
        let op = awaited.op_ref();
        let Some(block) = ctx.op(op).parent_block else {
            continue;
        };
        let coroutine = enclosing_func(ctx, op).and_then(|f| {
            let info = outlined.get(f.sym_name(ctx))?;
            Some((f, *info))
        });

        match coroutine {
            None => lower_blocking_await(ctx, awaited, block),
            Some((f, info)) => {
                let region = f.body(ctx);
                if ctx.block(block).parent_region == Some(region) {
                    lower_suspending_await(ctx, awaited, block, region, &info);
                } else {
                    diagnostics.push(Diagnostic::error(
                        ctx,
                        op,
                        FailureKind::UnsupportedAwait,
                        "await inside a nested region of a coroutine cannot suspend it",
                    ));
                }
            }
        }
    }

    if !diagnostics.is_empty() {
        debug!(count = diagnostics.len(), "unsupported awaits");
    }
    diagnostics
}

/// Replace the await's result by a load of the awaited value, if any.
fn finish_await(ctx: &mut IrContext, awaited: r#async::Await, block: BlockRef, location: Location) {
    let op = awaited.op_ref();
    let operand = awaited.operand(ctx);
    if let Some(result) = awaited.result(ctx) {
        let payload = ctx.value_ty(result);
        let load = r#async::runtime_load(ctx, location, operand, payload);
        ctx.insert_op_before(block, op, load.op_ref());
        let loaded = load.result(ctx);
        ctx.replace_all_uses(result, loaded);
    }
    ctx.remove_op_from_block(block, op);
    ctx.remove_op(op);
}

fn lower_blocking_await(ctx: &mut IrContext, awaited: r#async::Await, block: BlockRef) {
    let op = awaited.op_ref();
    let location = ctx.op(op).location;
    let operand = awaited.operand(ctx);
    let wait = r#async::runtime_await(ctx, location, operand);
    ctx.insert_op_before(block, op, wait.op_ref());
    finish_await(ctx, awaited, block, location);
}

fn lower_suspending_await(
    ctx: &mut IrContext,
    awaited: r#async::Await,
    block: BlockRef,
    region: RegionRef,
    info: &CoroutineInfo,
) {
    let op = awaited.op_ref();
    let location = ctx.op(op).location;
    let operand = awaited.operand(ctx);

    let save = r#async::coro_save(ctx, location, info.handle);
    let state = save.result(ctx);
    ctx.insert_op_before(block, op, save.op_ref());
    let register = r#async::runtime_await_and_resume(ctx, location, operand, info.handle);
    ctx.insert_op_before(block, op, register.op_ref());

    let resume = split_block(ctx, block, op);
    debug_assert_eq!(ctx.block(resume).parent_region, Some(region));
    let suspend = r#async::coro_suspend(ctx, location, state, info.suspend, resume, info.cleanup);
    ctx.push_op(block, suspend.op_ref());

    finish_await(ctx, awaited, resume, location);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::verify_frame_lifetime;
    use spindle_ir::dialect::{arith, core};
    use spindle_ir::rewrite::{OriginalTypes, PatternApplicator, TypeConverter};
    use spindle_ir::{PathRef, RegionData, Span};
    use smallvec::smallvec;

    fn loc() -> Location {
        Location::new(PathRef::from_u32(0), Span::default())
    }

    fn outline(ctx: &mut IrContext, module: Module) -> Rc<RefCell<OutlinedCoroutines>> {
        let outlined = Rc::new(RefCell::new(OutlinedCoroutines::default()));
        let applicator = PatternApplicator::new(TypeConverter::new()).add_pattern(
            OutlineExecutePattern {
                outlined: outlined.clone(),
            },
        );
        let mut originals = OriginalTypes::new();
        applicator.apply_partial(ctx, module, &mut originals);
        outlined
    }

    /// func @main() -> i32 { %c = 7; %t, %v = execute { yield %c + 1 }; %r = await %v; return %r }
    fn main_with_execute(ctx: &mut IrContext) -> (Module, func::Func) {
        let module = core::module(ctx, loc(), Symbol::new("m"));
        let i32_ty = core::i32(ctx);
        let (main, entry) = func::define(ctx, loc(), Symbol::new("main"), &[], &[i32_ty]);

        let seven = arith::r#const(ctx, loc(), i32_ty, 7);
        let seven_v = seven.result(ctx);
        ctx.push_op(entry, seven.op_ref());

        let body_entry = ctx.create_block(BlockData::new(loc(), []));
        let one = arith::r#const(ctx, loc(), i32_ty, 1);
        let one_v = one.result(ctx);
        let sum = arith::add(ctx, loc(), seven_v, one_v);
        let sum_v = sum.result(ctx);
        let y = r#async::r#yield(ctx, loc(), [sum_v]);
        for op in [one.op_ref(), sum.op_ref(), y.op_ref()] {
            ctx.push_op(body_entry, op);
        }
        let body = ctx.create_region(RegionData {
            location: loc(),
            blocks: smallvec![body_entry],
            parent_op: None,
        });
        let exec = r#async::execute(ctx, loc(), &[], &[], &[i32_ty], body);
        ctx.push_op(entry, exec.op_ref());
        let value = exec.values(ctx)[0];
        let awaited = r#async::r#await(ctx, loc(), value);
        let result = awaited.result(ctx).unwrap();
        ctx.push_op(entry, awaited.op_ref());
        let ret = func::r#return(ctx, loc(), [result]);
        ctx.push_op(entry, ret.op_ref());

        let top = module.first_block(ctx).unwrap();
        ctx.push_op(top, main.op_ref());
        (module, main)
    }

    #[test]
    fn execute_is_replaced_by_call_to_coroutine() {
        let mut ctx = IrContext::new();
        let (module, main) = main_with_execute(&mut ctx);

        let outlined = outline(&mut ctx, module);

        let outlined = outlined.borrow();
        assert_eq!(outlined.names(), &[Symbol::new("main_async_execute_0")]);
        let entry = main.entry_block(&ctx).unwrap();
        let call = ctx.block(entry).ops[1];
        let call = func::Call::from_op(&ctx, call).unwrap();
        assert_eq!(call.callee(&ctx), "main_async_execute_0");
        // The captured constant is passed as an argument.
        assert_eq!(ctx.op_operands(call.op_ref()), &[ctx.op_result(ctx.block(entry).ops[0], 0)]);

        let op = module
            .lookup_symbol(&ctx, Symbol::new("main_async_execute_0"))
            .unwrap();
        let coroutine = func::Func::from_op(&ctx, op).unwrap();
        assert_eq!(verify_frame_lifetime(&ctx, coroutine), Ok(()));
    }

    #[test]
    fn yield_stores_before_publishing() {
        let mut ctx = IrContext::new();
        let (module, _) = main_with_execute(&mut ctx);
        outline(&mut ctx, module);

        let op = module
            .lookup_symbol(&ctx, Symbol::new("main_async_execute_0"))
            .unwrap();
        let coroutine = func::Func::from_op(&ctx, op).unwrap();
        let names: Vec<String> = walk::collect_ops(&ctx, coroutine.body(&ctx))
            .into_iter()
            .filter(|&op| ctx.op(op).dialect == r#async::DIALECT_NAME)
            .map(|op| ctx.op(op).name.to_string())
            .filter(|name| name == "runtime_store" || name == "runtime_set_available")
            .collect();
        assert_eq!(names, ["runtime_store", "runtime_set_available", "runtime_set_available"]);
    }

    #[test]
    fn await_outside_coroutine_blocks() {
        let mut ctx = IrContext::new();
        let (module, main) = main_with_execute(&mut ctx);
        let outlined = outline(&mut ctx, module);

        let diagnostics = lower_awaits(&mut ctx, module, &outlined.borrow());

        assert!(diagnostics.is_empty());
        let entry = main.entry_block(&ctx).unwrap();
        let ops = &ctx.block(entry).ops;
        assert!(r#async::RuntimeAwait::matches(&ctx, ops[2]));
        assert!(r#async::RuntimeLoad::matches(&ctx, ops[3]));
        assert_eq!(ctx.op_operands(ops[4]), &[ctx.op_result(ops[3], 0)]);
    }

    #[test]
    fn await_in_coroutine_suspends() {
        let mut ctx = IrContext::new();
        let module = core::module(&mut ctx, loc(), Symbol::new("m"));
        let token_ty = r#async::token_type(&mut ctx);
        let (main, entry) = func::define(&mut ctx, loc(), Symbol::new("main"), &[token_ty], &[]);
        let outer_dep = ctx.block_arg(entry, 0);

        let body_entry = ctx.create_block(BlockData::new(loc(), []));
        let awaited = r#async::r#await(&mut ctx, loc(), outer_dep);
        let y = r#async::r#yield(&mut ctx, loc(), []);
        ctx.push_op(body_entry, awaited.op_ref());
        ctx.push_op(body_entry, y.op_ref());
        let body = ctx.create_region(RegionData {
            location: loc(),
            blocks: smallvec![body_entry],
            parent_op: None,
        });
        let exec = r#async::execute(&mut ctx, loc(), &[], &[], &[], body);
        ctx.push_op(entry, exec.op_ref());
        let ret = func::r#return(&mut ctx, loc(), []);
        ctx.push_op(entry, ret.op_ref());
        let top = module.first_block(&ctx).unwrap();
        ctx.push_op(top, main.op_ref());

        let outlined = outline(&mut ctx, module);
        let diagnostics = lower_awaits(&mut ctx, module, &outlined.borrow());
        assert!(diagnostics.is_empty());

        let op = module
            .lookup_symbol(&ctx, Symbol::new("main_async_execute_0"))
            .unwrap();
        let coroutine = func::Func::from_op(&ctx, op).unwrap();
        let ops = walk::collect_ops(&ctx, coroutine.body(&ctx));
        let registered = ops
            .iter()
            .filter(|&&op| r#async::RuntimeAwaitAndResume::matches(&ctx, op))
            .count();
        let suspends = ops
            .iter()
            .filter(|&&op| r#async::CoroSuspend::matches(&ctx, op))
            .count();
        assert_eq!(registered, 1);
        // Initial suspension plus the await.
        assert_eq!(suspends, 2);
        assert!(!ops.iter().any(|&op| r#async::Await::matches(&ctx, op)));
        assert_eq!(verify_frame_lifetime(&ctx, coroutine), Ok(()));
    }

    #[test]
    fn outlined_name_skips_existing_symbols() {
        let mut ctx = IrContext::new();
        let (module, _) = main_with_execute(&mut ctx);
        let (taken, taken_entry) =
            func::define(&mut ctx, loc(), Symbol::new("main_async_execute_0"), &[], &[]);
        let ret = func::r#return(&mut ctx, loc(), []);
        ctx.push_op(taken_entry, ret.op_ref());
        let top = module.first_block(&ctx).unwrap();
        ctx.push_op(top, taken.op_ref());

        let outlined = outline(&mut ctx, module);

        assert_eq!(outlined.borrow().names(), &[Symbol::new("main_async_execute_1")]);
        let defined = module
            .ops(&ctx)
            .into_iter()
            .filter_map(|op| func::Func::from_op(&ctx, op).ok())
            .filter(|f| f.sym_name(&ctx) == "main_async_execute_0")
            .count();
        assert_eq!(defined, 1);
    }

    #[test]
    fn await_nested_in_coroutine_region_is_rejected() {
        use spindle_ir::dialect::scf;

        let mut ctx = IrContext::new();
        let module = core::module(&mut ctx, loc(), Symbol::new("m"));
        let token_ty = r#async::token_type(&mut ctx);
        let i1 = core::i1(&mut ctx);
        let (main, entry) =
            func::define(&mut ctx, loc(), Symbol::new("main"), &[token_ty, i1], &[]);
        let dep = ctx.block_arg(entry, 0);
        let cond = ctx.block_arg(entry, 1);

        let single = |ctx: &mut IrContext, ops: &[OpRef]| {
            let block = ctx.create_block(BlockData::new(loc(), []));
            for &op in ops {
                ctx.push_op(block, op);
            }
            ctx.create_region(RegionData {
                location: loc(),
                blocks: smallvec![block],
                parent_op: None,
            })
        };
        let awaited = r#async::r#await(&mut ctx, loc(), dep);
        let then_yield = scf::r#yield(&mut ctx, loc(), []);
        let then_region = single(&mut ctx, &[awaited.op_ref(), then_yield.op_ref()]);
        let else_yield = scf::r#yield(&mut ctx, loc(), []);
        let else_region = single(&mut ctx, &[else_yield.op_ref()]);
        let branch = scf::r#if(&mut ctx, loc(), cond, [], then_region, else_region);
        let y = r#async::r#yield(&mut ctx, loc(), []);
        let body = single(&mut ctx, &[branch.op_ref(), y.op_ref()]);
        let exec = r#async::execute(&mut ctx, loc(), &[], &[], &[], body);
        ctx.push_op(entry, exec.op_ref());
        let ret = func::r#return(&mut ctx, loc(), []);
        ctx.push_op(entry, ret.op_ref());
        let top = module.first_block(&ctx).unwrap();
        ctx.push_op(top, main.op_ref());

        let outlined = outline(&mut ctx, module);
        let diagnostics = lower_awaits(&mut ctx, module, &outlined.borrow());

        let kinds: Vec<FailureKind> = diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, [FailureKind::UnsupportedAwait]);
        assert_eq!(diagnostics[0].op, awaited.op_ref());
    }
}
