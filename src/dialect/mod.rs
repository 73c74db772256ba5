//! Dialects owned by the async lowering.

pub mod coro;
pub mod r#async;
