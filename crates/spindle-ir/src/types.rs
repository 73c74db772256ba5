//! Attributes, interned types and interned paths.

use std::collections::{BTreeMap, HashMap};

use cranelift_entity::PrimaryMap;
use smallvec::SmallVec;

use crate::refs::{PathRef, TypeRef};
use crate::symbol::Symbol;

// ============================================================================
// Attribute
// ============================================================================

/// Attribute values attached to operations, block arguments and types.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Attribute {
    Unit,
    Bool(bool),
    /// Integer constant stored as raw bits (signless).
    IntBits(u64),
    String(String),
    Type(TypeRef),
    Symbol(Symbol),
    List(Vec<Attribute>),
}

impl Attribute {
    pub fn as_int(&self) -> Option<u64> {
        match self {
            Attribute::IntBits(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<Symbol> {
        match self {
            Attribute::Symbol(s) => Some(*s),
            _ => None,
        }
    }

    pub fn as_type(&self) -> Option<TypeRef> {
        match self {
            Attribute::Type(t) => Some(*t),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Attribute]> {
        match self {
            Attribute::List(items) => Some(items),
            _ => None,
        }
    }
}

impl From<i64> for Attribute {
    fn from(value: i64) -> Self {
        Attribute::IntBits(u64::from_ne_bytes(value.to_ne_bytes()))
    }
}

impl From<u64> for Attribute {
    fn from(value: u64) -> Self {
        Attribute::IntBits(value)
    }
}

impl From<bool> for Attribute {
    fn from(value: bool) -> Self {
        Attribute::Bool(value)
    }
}

impl From<Vec<Attribute>> for Attribute {
    fn from(value: Vec<Attribute>) -> Self {
        Attribute::List(value)
    }
}

impl From<Symbol> for Attribute {
    fn from(value: Symbol) -> Self {
        Attribute::Symbol(value)
    }
}

impl From<TypeRef> for Attribute {
    fn from(value: TypeRef) -> Self {
        Attribute::Type(value)
    }
}

impl From<&str> for Attribute {
    fn from(value: &str) -> Self {
        Attribute::String(value.to_string())
    }
}

// ============================================================================
// TypeData
// ============================================================================

/// Structure of a single interned type.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeData {
    pub dialect: Symbol,
    pub name: Symbol,
    pub params: SmallVec<[TypeRef; 4]>,
    pub attrs: BTreeMap<Symbol, Attribute>,
}

/// Fluent builder for `TypeData`. Defaults to no params and no attrs.
pub struct TypeDataBuilder {
    dialect: Symbol,
    name: Symbol,
    params: SmallVec<[TypeRef; 4]>,
    attrs: BTreeMap<Symbol, Attribute>,
}

impl TypeDataBuilder {
    pub fn new(dialect: Symbol, name: Symbol) -> Self {
        Self {
            dialect,
            name,
            params: SmallVec::new(),
            attrs: BTreeMap::new(),
        }
    }

    pub fn param(mut self, ty: TypeRef) -> Self {
        self.params.push(ty);
        self
    }

    pub fn params(mut self, tys: impl IntoIterator<Item = TypeRef>) -> Self {
        self.params.extend(tys);
        self
    }

    pub fn attr(mut self, key: impl Into<Symbol>, val: Attribute) -> Self {
        self.attrs.insert(key.into(), val);
        self
    }

    pub fn build(self) -> TypeData {
        TypeData {
            dialect: self.dialect,
            name: self.name,
            params: self.params,
            attrs: self.attrs,
        }
    }
}

// ============================================================================
// TypeInterner
// ============================================================================

/// Deduplicating type registry. Equal `TypeData` always yields the same `TypeRef`.
#[derive(Default)]
pub struct TypeInterner {
    types: PrimaryMap<TypeRef, TypeData>,
    dedup: HashMap<TypeData, TypeRef>,
}

impl TypeInterner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Intern a type, returning the existing ref if the data matches.
    pub fn intern(&mut self, data: TypeData) -> TypeRef {
        if let Some(&existing) = self.dedup.get(&data) {
            return existing;
        }
        let r = self.types.push(data.clone());
        self.dedup.insert(data, r);
        r
    }

    pub fn get(&self, r: TypeRef) -> &TypeData {
        &self.types[r]
    }

    /// Check whether `r` is `dialect.name`.
    pub fn is_dialect(&self, r: TypeRef, dialect: Symbol, name: Symbol) -> bool {
        let data = &self.types[r];
        data.dialect == dialect && data.name == name
    }

    /// Number of distinct interned types.
    pub fn len(&self) -> usize {
        self.types.len()
    }

    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }
}

// ============================================================================
// PathInterner
// ============================================================================

/// Deduplicating source path interner.
#[derive(Default)]
pub struct PathInterner {
    paths: PrimaryMap<PathRef, String>,
    dedup: HashMap<String, PathRef>,
}

impl PathInterner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, path: String) -> PathRef {
        if let Some(&existing) = self.dedup.get(&path) {
            return existing;
        }
        let r = self.paths.push(path.clone());
        self.dedup.insert(path, r);
        r
    }

    pub fn get(&self, r: PathRef) -> &str {
        &self.paths[r]
    }
}
