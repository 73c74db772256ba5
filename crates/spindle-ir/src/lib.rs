//! Arena-based mutable IR used by the spindle lowering passes.
//!
//! Entities live in `cranelift-entity` arenas owned by [`IrContext`], which
//! maintains use-chains so that replacing a value is a slot rewrite.

pub mod context;
pub mod dialect;
pub mod location;
pub mod module;
pub mod ops;
pub mod refs;
pub mod rewrite;
pub mod symbol;
pub mod types;
pub mod walk;

pub use context::{
    BlockArgData, BlockData, IrContext, OperationData, OperationDataBuilder, RegionData, Use,
    ValueData,
};
pub use location::{Location, Span};
pub use module::Module;
pub use ops::{ConversionError, DialectOp};
pub use refs::{BlockRef, OpRef, PathRef, RegionRef, TypeRef, ValueDef, ValueRef};
pub use symbol::Symbol;
pub use types::{Attribute, PathInterner, TypeData, TypeDataBuilder, TypeInterner};
pub use walk::WalkAction;
