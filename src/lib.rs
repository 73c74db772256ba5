//! Lowering of the async dialect to runtime calls and native coroutine frames.
//!
//! The entry point is [`lower_async`]. Building blocks are public so other
//! passes can reuse the type converter or the structural conversions
//! without running the whole lowering.

pub mod abi;
pub mod coroutine;
pub mod dialect;
pub mod errors;
pub mod execute;
pub mod fsm;
pub mod layout;
pub mod options;
pub mod pass;
pub mod runtime;
pub mod structural;
pub mod type_converter;

pub use abi::{RuntimeAbi, RuntimeFn, declare_abi};
pub use errors::{LoweringError, LoweringErrorKind, LoweringResult};
pub use options::{AllocatorNames, LoweringOptions};
pub use pass::{LoweringReport, lower_async};
pub use structural::{populate_async_structural_conversions, populate_structural_conversions};
pub use type_converter::async_type_converter;
