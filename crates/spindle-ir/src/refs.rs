//! Entity references.
//!
//! Each ref is a `u32` slot index into a `PrimaryMap` owned by `IrContext`.
//! Slots are never reused, so a ref stays valid for the lifetime of the
//! context even after the entity is detached.

use cranelift_entity::entity_impl;
use std::fmt;

/// Reference to an operation.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpRef(u32);
entity_impl!(OpRef, "op");

/// Reference to an SSA value.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ValueRef(u32);
entity_impl!(ValueRef, "v");

/// Reference to a basic block.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef(u32);
entity_impl!(BlockRef, "block");

/// Reference to a region.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionRef(u32);
entity_impl!(RegionRef, "region");

/// Reference to an interned type.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeRef(u32);
entity_impl!(TypeRef, "ty");

/// Reference to an interned source path.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PathRef(u32);
entity_impl!(PathRef, "path");

/// Where a value is defined.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ValueDef {
    /// Result of an operation at the given index.
    OpResult(OpRef, u32),
    /// Block argument at the given index.
    BlockArg(BlockRef, u32),
}

impl fmt::Display for ValueDef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValueDef::OpResult(op, idx) => write!(f, "{op}#{idx}"),
            ValueDef::BlockArg(block, idx) => write!(f, "{block}#{idx}"),
        }
    }
}
