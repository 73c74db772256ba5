//! Lowering of `async.runtime_*` operations to calls into the async runtime.
//!
//! Operand kinds are read from the original, pre-conversion types through
//! the adaptor, since by the time these patterns run the operands may
//! already be plain pointers.
//!
//! - `runtime_create` → `CreateToken` / `CreateValue(size)` / `CreateGroup`
//! - `runtime_set_available` → `EmplaceToken` / `EmplaceValue`
//! - `runtime_await` → `AwaitToken` / `AwaitValue` / `AwaitAllInGroup`
//! - `runtime_await_and_resume` → `*AndExecute(x, hdl, @__resume)`
//! - `runtime_resume` → `Execute(hdl, @__resume)`
//! - `runtime_store` / `runtime_load` → `GetValueStorage` + `ptr.store` / `ptr.load`
//! - `runtime_add_to_group` → `AddTokenToGroup`
//! - `runtime_add_ref` / `runtime_drop_ref` → `AddRef` / `DropRef`

use std::rc::Rc;

use spindle_ir::dialect::{arith, core, func, ptr};
use spindle_ir::ops::DialectOp;
use spindle_ir::rewrite::{FailureKind, OpAdaptor, PatternRewriter, RewritePattern};
use spindle_ir::{IrContext, Location, OpRef, TypeRef, ValueRef};

use crate::abi::{RuntimeAbi, RuntimeFn};
use crate::dialect::r#async::{self, AsyncKind};

/// Build `func.call @<runtime fn>(args)` with the entry point's result types.
fn call_runtime(
    ctx: &mut IrContext,
    abi: &RuntimeAbi,
    location: Location,
    f: RuntimeFn,
    args: impl IntoIterator<Item = ValueRef>,
) -> func::Call {
    let (_, results) = f.signature(ctx);
    func::call(ctx, location, args, results, abi.symbol(f))
}

/// Kind of operand `index` before type conversion.
fn operand_kind(ctx: &IrContext, adaptor: &OpAdaptor, index: usize) -> Option<AsyncKind> {
    AsyncKind::of(ctx, adaptor.original_type(index))
}

fn kind_name(kind: Option<AsyncKind>) -> &'static str {
    kind.map_or("non-async", AsyncKind::name)
}

/// Lowered payload type of a value, or a diagnostic.
fn lowered_payload(
    ctx: &mut IrContext,
    op: OpRef,
    kind: Option<AsyncKind>,
    rewriter: &mut PatternRewriter,
) -> Option<TypeRef> {
    let Some(AsyncKind::Value(payload)) = kind else {
        rewriter.notify_match_failure(
            ctx,
            op,
            FailureKind::UnknownPayloadType,
            format!("storage must be an async value, found {}", kind_name(kind)),
        );
        return None;
    };
    match rewriter.type_converter().convert_type(&mut ctx.types, payload) {
        Ok(lowered) => Some(lowered),
        Err(err) => {
            rewriter.notify_match_failure(ctx, op, FailureKind::UnknownPayloadType, err.to_string());
            None
        }
    }
}

/// `GetValueStorage(storage)` reinterpreted as `ptr<payload>`.
fn value_storage(
    ctx: &mut IrContext,
    abi: &RuntimeAbi,
    location: Location,
    storage: ValueRef,
    payload: TypeRef,
    rewriter: &mut PatternRewriter,
) -> ValueRef {
    let raw = call_runtime(ctx, abi, location, RuntimeFn::GetValueStorage, [storage]);
    let raw_v = ctx.op_result(raw.op_ref(), 0);
    let typed_ptr = core::ptr_to(ctx, payload);
    let cast = ptr::cast(ctx, location, raw_v, typed_ptr);
    rewriter.insert_op(raw.op_ref());
    rewriter.insert_op(cast.op_ref());
    cast.result(ctx)
}

// ============================================================================
// Pattern: runtime_create
// ============================================================================

pub struct CreateLowering {
    pub abi: Rc<RuntimeAbi>,
}

impl RewritePattern for CreateLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        _adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::RuntimeCreate::matches(ctx, op) {
            return false;
        }
        let location = ctx.op(op).location;
        let kind = AsyncKind::of(ctx, ctx.op_result_types(op)[0]);

        let call = match kind {
            Some(AsyncKind::Token) => {
                call_runtime(ctx, &self.abi, location, RuntimeFn::CreateToken, [])
            }
            Some(AsyncKind::Group) => {
                call_runtime(ctx, &self.abi, location, RuntimeFn::CreateGroup, [])
            }
            Some(AsyncKind::Value(_)) => {
                let Some(payload) = lowered_payload(ctx, op, kind, rewriter) else {
                    return false;
                };
                // sizeof(T) = ptr.to_int(ptr.offset(null : ptr<T>, 1))
                let i32_ty = core::i32(ctx);
                let typed_ptr = core::ptr_to(ctx, payload);
                let null = ptr::null(ctx, location, typed_ptr);
                let null_v = null.result(ctx);
                let one = arith::r#const(ctx, location, i32_ty, 1);
                let one_v = one.result(ctx);
                let end = ptr::offset(ctx, location, null_v, one_v);
                let end_v = end.result(ctx);
                let size = ptr::to_int(ctx, location, end_v, i32_ty);
                let size_v = size.result(ctx);
                for prefix in [null.op_ref(), one.op_ref(), end.op_ref(), size.op_ref()] {
                    rewriter.insert_op(prefix);
                }
                call_runtime(ctx, &self.abi, location, RuntimeFn::CreateValue, [size_v])
            }
            None => {
                return rewriter.notify_match_failure(
                    ctx,
                    op,
                    FailureKind::UnsupportedKind,
                    "can only create tokens, values and groups",
                );
            }
        };
        rewriter.replace_op(call.op_ref());
        true
    }
}

// ============================================================================
// Pattern: runtime_set_available
// ============================================================================

pub struct SetAvailableLowering {
    pub abi: Rc<RuntimeAbi>,
}

impl RewritePattern for SetAvailableLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::RuntimeSetAvailable::matches(ctx, op) {
            return false;
        }
        let kind = operand_kind(ctx, adaptor, 0);
        let f = match kind {
            Some(AsyncKind::Token) => RuntimeFn::EmplaceToken,
            Some(AsyncKind::Value(_)) => RuntimeFn::EmplaceValue,
            Some(AsyncKind::Group) | None => {
                return rewriter.notify_match_failure(
                    ctx,
                    op,
                    FailureKind::UnsupportedKind,
                    format!("cannot set a {} available", kind_name(kind)),
                );
            }
        };
        let location = ctx.op(op).location;
        let call = call_runtime(ctx, &self.abi, location, f, [adaptor.operand(0)]);
        rewriter.replace_op(call.op_ref());
        true
    }
}

// ============================================================================
// Pattern: runtime_await (blocking)
// ============================================================================

pub struct AwaitLowering {
    pub abi: Rc<RuntimeAbi>,
}

impl RewritePattern for AwaitLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::RuntimeAwait::matches(ctx, op) {
            return false;
        }
        let f = match operand_kind(ctx, adaptor, 0) {
            Some(AsyncKind::Token) => RuntimeFn::AwaitToken,
            Some(AsyncKind::Value(_)) => RuntimeFn::AwaitValue,
            Some(AsyncKind::Group) => RuntimeFn::AwaitAllInGroup,
            None => {
                return rewriter.notify_match_failure(
                    ctx,
                    op,
                    FailureKind::UnsupportedKind,
                    "can only await tokens, values and groups",
                );
            }
        };
        let location = ctx.op(op).location;
        let call = call_runtime(ctx, &self.abi, location, f, [adaptor.operand(0)]);
        rewriter.replace_op(call.op_ref());
        true
    }
}

// ============================================================================
// Pattern: runtime_await_and_resume
// ============================================================================

pub struct AwaitAndResumeLowering {
    pub abi: Rc<RuntimeAbi>,
}

impl RewritePattern for AwaitAndResumeLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::RuntimeAwaitAndResume::matches(ctx, op) {
            return false;
        }
        let f = match operand_kind(ctx, adaptor, 0) {
            Some(AsyncKind::Token) => RuntimeFn::AwaitTokenAndExecute,
            Some(AsyncKind::Value(_)) => RuntimeFn::AwaitValueAndExecute,
            Some(AsyncKind::Group) => RuntimeFn::AwaitAllInGroupAndExecute,
            None => {
                return rewriter.notify_match_failure(
                    ctx,
                    op,
                    FailureKind::UnsupportedKind,
                    "can only await tokens, values and groups",
                );
            }
        };
        let location = ctx.op(op).location;
        let ptr_ty = core::ptr(ctx);
        let resume_fn = ptr::func_addr(ctx, location, self.abi.resume_trampoline(), ptr_ty);
        let resume_v = resume_fn.result(ctx);
        let call = call_runtime(
            ctx,
            &self.abi,
            location,
            f,
            [adaptor.operand(0), adaptor.operand(1), resume_v],
        );
        rewriter.insert_op(resume_fn.op_ref());
        rewriter.replace_op(call.op_ref());
        true
    }
}

// ============================================================================
// Pattern: runtime_resume
// ============================================================================

pub struct ResumeLowering {
    pub abi: Rc<RuntimeAbi>,
}

impl RewritePattern for ResumeLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::RuntimeResume::matches(ctx, op) {
            return false;
        }
        let location = ctx.op(op).location;
        let ptr_ty = core::ptr(ctx);
        let resume_fn = ptr::func_addr(ctx, location, self.abi.resume_trampoline(), ptr_ty);
        let resume_v = resume_fn.result(ctx);
        let call = call_runtime(
            ctx,
            &self.abi,
            location,
            RuntimeFn::Execute,
            [adaptor.operand(0), resume_v],
        );
        rewriter.insert_op(resume_fn.op_ref());
        rewriter.replace_op(call.op_ref());
        true
    }
}

// ============================================================================
// Pattern: runtime_store / runtime_load
// ============================================================================

pub struct StoreLowering {
    pub abi: Rc<RuntimeAbi>,
}

impl RewritePattern for StoreLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::RuntimeStore::matches(ctx, op) {
            return false;
        }
        let kind = operand_kind(ctx, adaptor, 1);
        let Some(payload) = lowered_payload(ctx, op, kind, rewriter) else {
            return false;
        };
        let location = ctx.op(op).location;
        let addr = value_storage(ctx, &self.abi, location, adaptor.operand(1), payload, rewriter);
        let store = ptr::store(ctx, location, adaptor.operand(0), addr);
        rewriter.replace_op(store.op_ref());
        true
    }
}

pub struct LoadLowering {
    pub abi: Rc<RuntimeAbi>,
}

impl RewritePattern for LoadLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::RuntimeLoad::matches(ctx, op) {
            return false;
        }
        let kind = operand_kind(ctx, adaptor, 0);
        let Some(payload) = lowered_payload(ctx, op, kind, rewriter) else {
            return false;
        };
        let location = ctx.op(op).location;
        let addr = value_storage(ctx, &self.abi, location, adaptor.operand(0), payload, rewriter);
        let load = ptr::load(ctx, location, addr, payload);
        rewriter.replace_op(load.op_ref());
        true
    }
}

// ============================================================================
// Pattern: runtime_add_to_group
// ============================================================================

pub struct AddToGroupLowering {
    pub abi: Rc<RuntimeAbi>,
}

impl RewritePattern for AddToGroupLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        if !r#async::RuntimeAddToGroup::matches(ctx, op) {
            return false;
        }
        let kind = operand_kind(ctx, adaptor, 0);
        if kind != Some(AsyncKind::Token) {
            return rewriter.notify_match_failure(
                ctx,
                op,
                FailureKind::UnsupportedKind,
                format!("only tokens can be added to a group, found {}", kind_name(kind)),
            );
        }
        let location = ctx.op(op).location;
        let call = call_runtime(
            ctx,
            &self.abi,
            location,
            RuntimeFn::AddTokenToGroup,
            [adaptor.operand(0), adaptor.operand(1)],
        );
        rewriter.replace_op(call.op_ref());
        true
    }
}

// ============================================================================
// Pattern: runtime_add_ref / runtime_drop_ref
// ============================================================================

pub struct RefCountLowering {
    pub abi: Rc<RuntimeAbi>,
}

impl RewritePattern for RefCountLowering {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool {
        let f = if r#async::RuntimeAddRef::matches(ctx, op) {
            RuntimeFn::AddRef
        } else if r#async::RuntimeDropRef::matches(ctx, op) {
            RuntimeFn::DropRef
        } else {
            return false;
        };
        let Some(count) = r#async::ref_count(ctx, op) else {
            return rewriter.notify_match_failure(
                ctx,
                op,
                FailureKind::UnsupportedKind,
                "reference count operation without a count",
            );
        };
        let Ok(count) = i32::try_from(count) else {
            return rewriter.notify_match_failure(
                ctx,
                op,
                FailureKind::UnsupportedKind,
                format!("reference count delta {count} does not fit in i32"),
            );
        };
        let location = ctx.op(op).location;
        let i32_ty = core::i32(ctx);
        let count = arith::r#const(ctx, location, i32_ty, i64::from(count));
        let count_v = count.result(ctx);
        let call = call_runtime(ctx, &self.abi, location, f, [adaptor.operand(0), count_v]);
        rewriter.insert_op(count.op_ref());
        rewriter.replace_op(call.op_ref());
        true
    }
}
