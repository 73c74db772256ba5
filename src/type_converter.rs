//! Type conversion from async types to runtime handles.
//!
//! - `async.token`, `async.value<T>`, `async.group`, `async.coro_handle` → `core.ptr`
//! - `async.coro_id`, `async.coro_state` → `coro.token`
//!
//! Every other type converts to itself, or to itself with converted
//! parameters, so the converter composes with unrelated conversions.

use spindle_ir::rewrite::TypeConverter;
use spindle_ir::{Symbol, TypeDataBuilder, TypeInterner, TypeRef};

use crate::dialect::{coro, r#async};

fn is_async(types: &TypeInterner, ty: TypeRef, name: &'static str) -> bool {
    types.is_dialect(ty, Symbol::new(r#async::DIALECT_NAME), Symbol::new(name))
}

fn intern(types: &mut TypeInterner, dialect: &'static str, name: &'static str) -> TypeRef {
    types.intern(TypeDataBuilder::new(Symbol::new(dialect), Symbol::new(name)).build())
}

/// Converter used by the whole async lowering.
pub fn async_type_converter() -> TypeConverter {
    let mut converter = TypeConverter::new();
    converter.add_conversion(|types, ty| {
        let handle = ["token", "value", "group", "coro_handle"]
            .into_iter()
            .any(|name| is_async(types, ty, name));
        handle.then(|| intern(types, "core", "ptr"))
    });
    converter.add_conversion(|types, ty| {
        let builder_token = is_async(types, ty, "coro_id") || is_async(types, ty, "coro_state");
        builder_token.then(|| intern(types, coro::DIALECT_NAME, "token"))
    });
    converter
}
