//! Declarations of the async runtime ABI, the frame allocator and the
//! resume trampoline.
//!
//! The runtime functions are provided at link time. Each one is declared
//! as an extern `func.func` with an unreachable body. Insertion is checked
//! against the module's symbols first, so running it again is a no-op.

use spindle_ir::dialect::{core, func};
use spindle_ir::ops::DialectOp;
use spindle_ir::{IrContext, Location, Module, Symbol, TypeRef};
use tracing::debug;

use crate::dialect::coro;
use crate::errors::{LoweringErrorKind, LoweringResult};
use crate::options::LoweringOptions;

/// Entry points of the async runtime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuntimeFn {
    AddRef,
    DropRef,
    CreateToken,
    CreateValue,
    CreateGroup,
    EmplaceToken,
    EmplaceValue,
    AwaitToken,
    AwaitValue,
    AwaitAllInGroup,
    Execute,
    GetValueStorage,
    AddTokenToGroup,
    AwaitTokenAndExecute,
    AwaitValueAndExecute,
    AwaitAllInGroupAndExecute,
}

impl RuntimeFn {
    pub const ALL: [RuntimeFn; 16] = [
        RuntimeFn::AddRef,
        RuntimeFn::DropRef,
        RuntimeFn::CreateToken,
        RuntimeFn::CreateValue,
        RuntimeFn::CreateGroup,
        RuntimeFn::EmplaceToken,
        RuntimeFn::EmplaceValue,
        RuntimeFn::AwaitToken,
        RuntimeFn::AwaitValue,
        RuntimeFn::AwaitAllInGroup,
        RuntimeFn::Execute,
        RuntimeFn::GetValueStorage,
        RuntimeFn::AddTokenToGroup,
        RuntimeFn::AwaitTokenAndExecute,
        RuntimeFn::AwaitValueAndExecute,
        RuntimeFn::AwaitAllInGroupAndExecute,
    ];

    /// Name without the runtime prefix.
    pub fn suffix(self) -> &'static str {
        match self {
            RuntimeFn::AddRef => "AddRef",
            RuntimeFn::DropRef => "DropRef",
            RuntimeFn::CreateToken => "CreateToken",
            RuntimeFn::CreateValue => "CreateValue",
            RuntimeFn::CreateGroup => "CreateGroup",
            RuntimeFn::EmplaceToken => "EmplaceToken",
            RuntimeFn::EmplaceValue => "EmplaceValue",
            RuntimeFn::AwaitToken => "AwaitToken",
            RuntimeFn::AwaitValue => "AwaitValue",
            RuntimeFn::AwaitAllInGroup => "AwaitAllInGroup",
            RuntimeFn::Execute => "Execute",
            RuntimeFn::GetValueStorage => "GetValueStorage",
            RuntimeFn::AddTokenToGroup => "AddTokenToGroup",
            RuntimeFn::AwaitTokenAndExecute => "AwaitTokenAndExecute",
            RuntimeFn::AwaitValueAndExecute => "AwaitValueAndExecute",
            RuntimeFn::AwaitAllInGroupAndExecute => "AwaitAllInGroupAndExecute",
        }
    }

    /// `(inputs, results)` in lowered types. Handles are opaque pointers.
    pub fn signature(self, ctx: &mut IrContext) -> (Vec<TypeRef>, Vec<TypeRef>) {
        let ptr = core::ptr(ctx);
        let i32_ty = core::i32(ctx);
        let i64_ty = core::i64(ctx);
        match self {
            RuntimeFn::AddRef | RuntimeFn::DropRef => (vec![ptr, i32_ty], vec![]),
            RuntimeFn::CreateToken | RuntimeFn::CreateGroup => (vec![], vec![ptr]),
            RuntimeFn::CreateValue => (vec![i32_ty], vec![ptr]),
            RuntimeFn::EmplaceToken
            | RuntimeFn::EmplaceValue
            | RuntimeFn::AwaitToken
            | RuntimeFn::AwaitValue
            | RuntimeFn::AwaitAllInGroup => (vec![ptr], vec![]),
            RuntimeFn::Execute => (vec![ptr, ptr], vec![]),
            RuntimeFn::GetValueStorage => (vec![ptr], vec![ptr]),
            RuntimeFn::AddTokenToGroup => (vec![ptr, ptr], vec![i64_ty]),
            RuntimeFn::AwaitTokenAndExecute
            | RuntimeFn::AwaitValueAndExecute
            | RuntimeFn::AwaitAllInGroupAndExecute => (vec![ptr, ptr, ptr], vec![]),
        }
    }
}

/// Symbol names the lowered code binds against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeAbi {
    prefix: String,
    alloc: Symbol,
    free: Symbol,
    resume_trampoline: Symbol,
}

impl RuntimeAbi {
    pub fn new(options: &LoweringOptions) -> Self {
        Self {
            prefix: options.runtime_prefix.clone(),
            alloc: Symbol::from_dynamic(&options.allocator.alloc),
            free: Symbol::from_dynamic(&options.allocator.free),
            resume_trampoline: Symbol::from_dynamic(&options.resume_trampoline),
        }
    }

    pub fn symbol(&self, f: RuntimeFn) -> Symbol {
        Symbol::from_dynamic(&format!("{}{}", self.prefix, f.suffix()))
    }

    pub fn alloc(&self) -> Symbol {
        self.alloc
    }

    pub fn free(&self) -> Symbol {
        self.free
    }

    pub fn resume_trampoline(&self) -> Symbol {
        self.resume_trampoline
    }
}

impl Default for RuntimeAbi {
    fn default() -> Self {
        Self::new(&LoweringOptions::default())
    }
}

/// Ensure every runtime entry point, the allocator pair and the resume
/// trampoline exist in `module`. Returns the names that were added.
pub fn declare_abi(ctx: &mut IrContext, module: Module, abi: &RuntimeAbi) -> LoweringResult<Vec<Symbol>> {
    if module.first_block(ctx).is_none() {
        return Err(LoweringErrorKind::MissingModuleBody.into());
    }

    let location = ctx.op(module.op()).location;
    let mut declared = Vec::new();

    let ptr = core::ptr(ctx);
    let i64_ty = core::i64(ctx);

    let mut externs: Vec<(Symbol, Vec<TypeRef>, Vec<TypeRef>)> = RuntimeFn::ALL
        .iter()
        .map(|&f| {
            let (inputs, results) = f.signature(ctx);
            (abi.symbol(f), inputs, results)
        })
        .collect();
    // malloc(size: i64) -> ptr
    externs.push((abi.alloc(), vec![i64_ty], vec![ptr]));
    // free(mem: ptr) -> ()
    externs.push((abi.free(), vec![ptr], vec![]));

    for (name, inputs, results) in externs {
        if module.lookup_symbol(ctx, name).is_some() {
            continue;
        }
        let decl = func::declare(ctx, location, name, &inputs, &results);
        module.prepend_op(ctx, decl.op_ref());
        declared.push(name);
    }

    if module.lookup_symbol(ctx, abi.resume_trampoline()).is_none() {
        let trampoline = build_resume_trampoline(ctx, location, abi.resume_trampoline());
        module.prepend_op(ctx, trampoline.op_ref());
        declared.push(abi.resume_trampoline());
    }

    if !declared.is_empty() {
        debug!(count = declared.len(), "declared async runtime ABI");
    }
    Ok(declared)
}

/// `func @__resume(%hdl: ptr) { coro.resume %hdl; return }`
fn build_resume_trampoline(ctx: &mut IrContext, location: Location, name: Symbol) -> func::Func {
    let ptr = core::ptr(ctx);
    let (trampoline, entry) = func::define(ctx, location, name, &[ptr], &[]);
    let handle = ctx.block_arg(entry, 0);
    let resume = coro::resume(ctx, location, handle);
    ctx.push_op(entry, resume.op_ref());
    let ret = func::r#return(ctx, location, []);
    ctx.push_op(entry, ret.op_ref());
    trampoline
}
