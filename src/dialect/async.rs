//! Async dialect: tokens, value futures, groups and coroutine primitives.
//!
//! Three layers live in this dialect:
//! - `execute`/`await`/`yield` describe asynchronous regions;
//! - `coro_*` ops are explicit coroutine primitives operating on a frame;
//! - `runtime_*` ops are one step away from calls into the async runtime.
//!
//! Everything here is illegal after lowering.

use spindle_ir::dialect::core;
use spindle_ir::ops::{self, DialectOp};
use spindle_ir::{
    Attribute, BlockRef, IrContext, Location, RegionRef, Symbol, TypeDataBuilder, TypeRef,
    ValueRef,
};

spindle_ir::dialect_ops! {
    dialect "async";
    /// Asynchronous region. Operands are the token dependencies followed by
    /// value operands; the body's entry block takes one payload per value
    /// operand. Results are a completion token followed by one value per
    /// `async.yield` operand.
    Execute => "execute";
    /// Wait for a token, value or group. Produces the payload for values.
    Await => "await";
    /// Terminator of an `async.execute` body.
    Yield => "yield";

    CoroId => "coro_id";
    /// Allocate and initialize the coroutine frame.
    CoroBegin => "coro_begin";
    CoroFree => "coro_free";
    CoroEnd => "coro_end";
    CoroSave => "coro_save";
    /// Suspension point. Successors are `[suspend, resume, cleanup]`.
    CoroSuspend => "coro_suspend";

    RuntimeCreate => "runtime_create";
    RuntimeSetAvailable => "runtime_set_available";
    RuntimeAwait => "runtime_await";
    /// Register a coroutine to be resumed once the operand completes.
    RuntimeAwaitAndResume => "runtime_await_and_resume";
    RuntimeResume => "runtime_resume";
    RuntimeStore => "runtime_store";
    RuntimeLoad => "runtime_load";
    /// Add a token to a group. Returns the token's rank in the group.
    RuntimeAddToGroup => "runtime_add_to_group";
    RuntimeAddRef => "runtime_add_ref";
    RuntimeDropRef => "runtime_drop_ref";
}

spindle_ir::symbols! {
    ATTR_NUM_DEPENDENCIES => "num_dependencies",
    ATTR_COUNT => "count",
}

// ============================================================================
// Types
// ============================================================================

fn simple(ctx: &mut IrContext, name: &'static str) -> TypeRef {
    ctx.types
        .intern(TypeDataBuilder::new(Symbol::new(DIALECT_NAME), Symbol::new(name)).build())
}

pub fn token_type(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "token")
}

pub fn value_type(ctx: &mut IrContext, payload: TypeRef) -> TypeRef {
    ctx.types.intern(
        TypeDataBuilder::new(Symbol::new(DIALECT_NAME), Symbol::new("value"))
            .param(payload)
            .build(),
    )
}

pub fn group_type(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "group")
}

pub fn coro_id_type(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "coro_id")
}

pub fn coro_state_type(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "coro_state")
}

pub fn coro_handle_type(ctx: &mut IrContext) -> TypeRef {
    simple(ctx, "coro_handle")
}

/// Whether `ty` is `async.<name>`.
pub fn is(ctx: &IrContext, ty: TypeRef, name: &'static str) -> bool {
    ctx.types
        .is_dialect(ty, Symbol::new(DIALECT_NAME), Symbol::new(name))
}

/// Payload type of an `async.value`.
pub fn value_payload(ctx: &IrContext, ty: TypeRef) -> Option<TypeRef> {
    if !is(ctx, ty, "value") {
        return None;
    }
    ctx.types.get(ty).params.first().copied()
}

/// The three kinds of runtime-managed async objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AsyncKind {
    Token,
    Value(TypeRef),
    Group,
}

impl AsyncKind {
    pub fn of(ctx: &IrContext, ty: TypeRef) -> Option<Self> {
        if is(ctx, ty, "token") {
            Some(AsyncKind::Token)
        } else if is(ctx, ty, "group") {
            Some(AsyncKind::Group)
        } else {
            value_payload(ctx, ty).map(AsyncKind::Value)
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            AsyncKind::Token => "token",
            AsyncKind::Value(_) => "value",
            AsyncKind::Group => "group",
        }
    }
}

// ============================================================================
// High-level ops
// ============================================================================

/// Build an `async.execute`. Result types are derived from `value_results`.
pub fn execute(
    ctx: &mut IrContext,
    location: Location,
    dependencies: &[ValueRef],
    operands: &[ValueRef],
    value_results: &[TypeRef],
    body: RegionRef,
) -> Execute {
    let token = token_type(ctx);
    let values: Vec<TypeRef> = value_results
        .iter()
        .map(|&payload| value_type(ctx, payload))
        .collect();
    ops::build(
        ctx,
        ops::builder::<Execute>(location)
            .operands(dependencies.iter().chain(operands).copied())
            .result(token)
            .results(values)
            .attr(
                ATTR_NUM_DEPENDENCIES(),
                Attribute::IntBits(dependencies.len() as u64),
            )
            .region(body),
    )
}

impl Execute {
    fn num_dependencies(&self, ctx: &IrContext) -> usize {
        ctx.op_attr(self.0, "num_dependencies")
            .and_then(Attribute::as_int)
            .unwrap_or(0) as usize
    }

    pub fn dependencies<'a>(&self, ctx: &'a IrContext) -> &'a [ValueRef] {
        let operands = ctx.op_operands(self.0);
        &operands[..self.num_dependencies(ctx).min(operands.len())]
    }

    pub fn body_operands<'a>(&self, ctx: &'a IrContext) -> &'a [ValueRef] {
        let operands = ctx.op_operands(self.0);
        &operands[self.num_dependencies(ctx).min(operands.len())..]
    }

    pub fn body(&self, ctx: &IrContext) -> RegionRef {
        ctx.op(self.0).regions[0]
    }

    pub fn token(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }

    pub fn values<'a>(&self, ctx: &'a IrContext) -> &'a [ValueRef] {
        &ctx.op_results(self.0)[1..]
    }
}

/// Build an `async.await`. Values produce their payload, other kinds nothing.
pub fn r#await(ctx: &mut IrContext, location: Location, operand: ValueRef) -> Await {
    let ty = ctx.value_ty(operand);
    let payload = value_payload(ctx, ty);
    ops::build(
        ctx,
        ops::builder::<Await>(location)
            .operand(operand)
            .results(payload),
    )
}

impl Await {
    pub fn operand(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_operands(self.0)[0]
    }

    pub fn result(&self, ctx: &IrContext) -> Option<ValueRef> {
        ctx.op_results(self.0).first().copied()
    }
}

pub fn r#yield(
    ctx: &mut IrContext,
    location: Location,
    values: impl IntoIterator<Item = ValueRef>,
) -> Yield {
    ops::build(ctx, ops::builder::<Yield>(location).operands(values))
}

// ============================================================================
// Coroutine primitives
// ============================================================================

pub fn coro_id(ctx: &mut IrContext, location: Location) -> CoroId {
    let ty = coro_id_type(ctx);
    ops::build(ctx, ops::builder::<CoroId>(location).result(ty))
}

pub fn coro_begin(ctx: &mut IrContext, location: Location, id: ValueRef) -> CoroBegin {
    let ty = coro_handle_type(ctx);
    ops::build(ctx, ops::builder::<CoroBegin>(location).operand(id).result(ty))
}

pub fn coro_free(ctx: &mut IrContext, location: Location, id: ValueRef, handle: ValueRef) -> CoroFree {
    ops::build(
        ctx,
        ops::builder::<CoroFree>(location).operand(id).operand(handle),
    )
}

pub fn coro_end(ctx: &mut IrContext, location: Location, handle: ValueRef) -> CoroEnd {
    ops::build(ctx, ops::builder::<CoroEnd>(location).operand(handle))
}

pub fn coro_save(ctx: &mut IrContext, location: Location, handle: ValueRef) -> CoroSave {
    let ty = coro_state_type(ctx);
    ops::build(
        ctx,
        ops::builder::<CoroSave>(location).operand(handle).result(ty),
    )
}

pub fn coro_suspend(
    ctx: &mut IrContext,
    location: Location,
    state: ValueRef,
    suspend: BlockRef,
    resume: BlockRef,
    cleanup: BlockRef,
) -> CoroSuspend {
    ops::build(
        ctx,
        ops::builder::<CoroSuspend>(location)
            .operand(state)
            .successor(suspend)
            .successor(resume)
            .successor(cleanup),
    )
}

impl CoroId {
    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

impl CoroBegin {
    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

impl CoroSave {
    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

impl CoroSuspend {
    pub fn suspend_dest(&self, ctx: &IrContext) -> BlockRef {
        ctx.op(self.0).successors[0]
    }

    pub fn resume_dest(&self, ctx: &IrContext) -> BlockRef {
        ctx.op(self.0).successors[1]
    }

    pub fn cleanup_dest(&self, ctx: &IrContext) -> BlockRef {
        ctx.op(self.0).successors[2]
    }
}

// ============================================================================
// Runtime ops
// ============================================================================

/// Create a token, value or group of type `ty`.
pub fn runtime_create(ctx: &mut IrContext, location: Location, ty: TypeRef) -> RuntimeCreate {
    ops::build(ctx, ops::builder::<RuntimeCreate>(location).result(ty))
}

pub fn runtime_set_available(
    ctx: &mut IrContext,
    location: Location,
    operand: ValueRef,
) -> RuntimeSetAvailable {
    ops::build(
        ctx,
        ops::builder::<RuntimeSetAvailable>(location).operand(operand),
    )
}

pub fn runtime_await(ctx: &mut IrContext, location: Location, operand: ValueRef) -> RuntimeAwait {
    ops::build(ctx, ops::builder::<RuntimeAwait>(location).operand(operand))
}

pub fn runtime_await_and_resume(
    ctx: &mut IrContext,
    location: Location,
    operand: ValueRef,
    handle: ValueRef,
) -> RuntimeAwaitAndResume {
    ops::build(
        ctx,
        ops::builder::<RuntimeAwaitAndResume>(location)
            .operand(operand)
            .operand(handle),
    )
}

pub fn runtime_resume(ctx: &mut IrContext, location: Location, handle: ValueRef) -> RuntimeResume {
    ops::build(ctx, ops::builder::<RuntimeResume>(location).operand(handle))
}

pub fn runtime_store(
    ctx: &mut IrContext,
    location: Location,
    value: ValueRef,
    storage: ValueRef,
) -> RuntimeStore {
    ops::build(
        ctx,
        ops::builder::<RuntimeStore>(location)
            .operand(value)
            .operand(storage),
    )
}

/// Load the payload of `storage`, an `async.value<T>`, as `T`.
pub fn runtime_load(
    ctx: &mut IrContext,
    location: Location,
    storage: ValueRef,
    payload: TypeRef,
) -> RuntimeLoad {
    ops::build(
        ctx,
        ops::builder::<RuntimeLoad>(location)
            .operand(storage)
            .result(payload),
    )
}

pub fn runtime_add_to_group(
    ctx: &mut IrContext,
    location: Location,
    operand: ValueRef,
    group: ValueRef,
) -> RuntimeAddToGroup {
    let rank = core::i64(ctx);
    ops::build(
        ctx,
        ops::builder::<RuntimeAddToGroup>(location)
            .operand(operand)
            .operand(group)
            .result(rank),
    )
}

pub fn runtime_add_ref(
    ctx: &mut IrContext,
    location: Location,
    operand: ValueRef,
    count: i64,
) -> RuntimeAddRef {
    ops::build(
        ctx,
        ops::builder::<RuntimeAddRef>(location)
            .operand(operand)
            .attr(ATTR_COUNT(), Attribute::from(count)),
    )
}

pub fn runtime_drop_ref(
    ctx: &mut IrContext,
    location: Location,
    operand: ValueRef,
    count: i64,
) -> RuntimeDropRef {
    ops::build(
        ctx,
        ops::builder::<RuntimeDropRef>(location)
            .operand(operand)
            .attr(ATTR_COUNT(), Attribute::from(count)),
    )
}

/// Reference count delta of an `add_ref`/`drop_ref`.
pub fn ref_count(ctx: &IrContext, op: spindle_ir::OpRef) -> Option<i64> {
    if !RuntimeAddRef::matches(ctx, op) && !RuntimeDropRef::matches(ctx, op) {
        return None;
    }
    ctx.op_attr(op, "count")
        .and_then(Attribute::as_int)
        .map(|bits| bits as i64)
}

impl RuntimeCreate {
    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

impl RuntimeLoad {
    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

impl RuntimeAddToGroup {
    pub fn result(&self, ctx: &IrContext) -> ValueRef {
        ctx.op_result(self.0, 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use spindle_ir::{BlockData, PathRef, RegionData, Span};
    use smallvec::smallvec;

    fn loc() -> Location {
        Location::new(PathRef::from_u32(0), Span::default())
    }

    #[test]
    fn kinds_are_recognized() {
        let mut ctx = IrContext::new();
        let i32_ty = core::i32(&mut ctx);
        let token = token_type(&mut ctx);
        let value = value_type(&mut ctx, i32_ty);
        let group = group_type(&mut ctx);

        assert_eq!(AsyncKind::of(&ctx, token), Some(AsyncKind::Token));
        assert_eq!(AsyncKind::of(&ctx, value), Some(AsyncKind::Value(i32_ty)));
        assert_eq!(AsyncKind::of(&ctx, group), Some(AsyncKind::Group));
        assert_eq!(AsyncKind::of(&ctx, i32_ty), None);
    }

    #[test]
    fn execute_splits_dependencies_from_operands() {
        let mut ctx = IrContext::new();
        let i32_ty = core::i32(&mut ctx);
        let token = token_type(&mut ctx);
        let value = value_type(&mut ctx, i32_ty);
        let dep = runtime_create(&mut ctx, loc(), token).result(&ctx);
        let operand = runtime_create(&mut ctx, loc(), value).result(&ctx);

        let entry = ctx.create_block(BlockData::new(loc(), [i32_ty]));
        let arg = ctx.block_arg(entry, 0);
        let y = r#yield(&mut ctx, loc(), [arg]);
        ctx.push_op(entry, y.op_ref());
        let body = ctx.create_region(RegionData {
            location: loc(),
            blocks: smallvec![entry],
            parent_op: None,
        });
        let exec = execute(&mut ctx, loc(), &[dep], &[operand], &[i32_ty], body);

        assert_eq!(exec.dependencies(&ctx), &[dep]);
        assert_eq!(exec.body_operands(&ctx), &[operand]);
        assert_eq!(ctx.value_ty(exec.token(&ctx)), token);
        assert_eq!(exec.values(&ctx).len(), 1);
        assert_eq!(ctx.value_ty(exec.values(&ctx)[0]), value);
    }

    #[test]
    fn await_produces_payload_only_for_values() {
        let mut ctx = IrContext::new();
        let i64_ty = core::i64(&mut ctx);
        let token = token_type(&mut ctx);
        let value = value_type(&mut ctx, i64_ty);
        let t = runtime_create(&mut ctx, loc(), token).result(&ctx);
        let v = runtime_create(&mut ctx, loc(), value).result(&ctx);

        let on_token = r#await(&mut ctx, loc(), t);
        let on_value = r#await(&mut ctx, loc(), v);

        assert_eq!(on_token.result(&ctx), None);
        let payload = on_value.result(&ctx).expect("payload");
        assert_eq!(ctx.value_ty(payload), i64_ty);
    }

    #[test]
    fn ref_count_reads_signed_delta() {
        let mut ctx = IrContext::new();
        let token = token_type(&mut ctx);
        let t = runtime_create(&mut ctx, loc(), token).result(&ctx);
        let add = runtime_add_ref(&mut ctx, loc(), t, 3);
        let drop = runtime_drop_ref(&mut ctx, loc(), t, 3);
        assert_eq!(ref_count(&ctx, add.op_ref()), Some(3));
        assert_eq!(ref_count(&ctx, drop.op_ref()), Some(3));
    }
}
