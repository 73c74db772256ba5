//! Type conversion rules for dialect lowering.
//!
//! Rules are tried in order. A type no rule matches is rebuilt from its
//! converted parameters, so container types (function types, tuples,
//! typed pointers, future payloads) follow their element conversions.
//! A type with no rule and no changed parameter is returned unchanged.

use std::rc::Rc;

use derive_more::Display;
use smallvec::SmallVec;

use crate::refs::TypeRef;
use crate::types::{TypeData, TypeInterner};

type ConversionFn = dyn Fn(&mut TypeInterner, TypeRef) -> Option<TypeRef>;
type ExpansionFn = dyn Fn(&mut TypeInterner, TypeRef) -> Option<SmallVec<[TypeRef; 2]>>;

/// A type that maps to zero or several types where exactly one is required.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[display("{from} expands to {count} types; not a 1:1 type conversion")]
pub struct NotOneToOne {
    pub from: TypeRef,
    pub count: usize,
}

impl std::error::Error for NotOneToOne {}

/// Ordered type conversion rules. Cloning shares the rules.
#[derive(Default, Clone)]
pub struct TypeConverter {
    conversions: Vec<Rc<ConversionFn>>,
    expansions: Vec<Rc<ExpansionFn>>,
}

impl TypeConverter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a 1:1 conversion rule. Return `None` to defer to later rules.
    pub fn add_conversion(
        &mut self,
        f: impl Fn(&mut TypeInterner, TypeRef) -> Option<TypeRef> + 'static,
    ) {
        self.conversions.push(Rc::new(f));
    }

    /// Add a rule mapping one type to a list of types.
    ///
    /// Only single-element expansions are usable by 1:1 rewrites; any other
    /// length makes `convert_type` fail with `NotOneToOne`.
    pub fn add_expansion(
        &mut self,
        f: impl Fn(&mut TypeInterner, TypeRef) -> Option<SmallVec<[TypeRef; 2]>> + 'static,
    ) {
        self.expansions.push(Rc::new(f));
    }

    /// Convert `ty` to exactly one type. Unmatched types convert to themselves.
    pub fn convert_type(&self, types: &mut TypeInterner, ty: TypeRef) -> Result<TypeRef, NotOneToOne> {
        for expand in &self.expansions {
            if let Some(expanded) = expand(types, ty) {
                return match expanded.as_slice() {
                    [single] => Ok(*single),
                    _ => Err(NotOneToOne {
                        from: ty,
                        count: expanded.len(),
                    }),
                };
            }
        }
        for conv in &self.conversions {
            if let Some(converted) = conv(types, ty) {
                return Ok(converted);
            }
        }
        self.convert_params(types, ty)
    }

    fn convert_params(&self, types: &mut TypeInterner, ty: TypeRef) -> Result<TypeRef, NotOneToOne> {
        let data = types.get(ty).clone();
        if data.params.is_empty() {
            return Ok(ty);
        }
        let mut params = SmallVec::<[TypeRef; 4]>::with_capacity(data.params.len());
        for &p in &data.params {
            params.push(self.convert_type(types, p)?);
        }
        if params == data.params {
            return Ok(ty);
        }
        Ok(types.intern(TypeData { params, ..data }))
    }

    /// Convert every type in `tys`, stopping at the first failure.
    pub fn convert_types(
        &self,
        types: &mut TypeInterner,
        tys: &[TypeRef],
    ) -> Result<Vec<TypeRef>, NotOneToOne> {
        tys.iter().map(|&t| self.convert_type(types, t)).collect()
    }

    /// Convert a type, keeping it as is when it cannot be converted 1:1.
    pub fn convert_type_or_identity(&self, types: &mut TypeInterner, ty: TypeRef) -> TypeRef {
        self.convert_type(types, ty).unwrap_or(ty)
    }

    /// A type is legal when converting it is the identity.
    pub fn is_legal(&self, types: &mut TypeInterner, ty: TypeRef) -> bool {
        self.convert_type(types, ty) == Ok(ty)
    }

    pub fn is_empty(&self) -> bool {
        self.conversions.is_empty() && self.expansions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Symbol;
    use crate::types::TypeDataBuilder;
    use smallvec::smallvec;

    fn ty(types: &mut TypeInterner, dialect: &'static str, name: &'static str) -> TypeRef {
        types.intern(TypeDataBuilder::new(Symbol::new(dialect), Symbol::new(name)).build())
    }

    #[test]
    fn unmatched_types_are_identity() {
        let mut types = TypeInterner::new();
        let i32_ty = ty(&mut types, "core", "i32");
        let converter = TypeConverter::new();
        assert_eq!(converter.convert_type(&mut types, i32_ty), Ok(i32_ty));
        assert!(converter.is_legal(&mut types, i32_ty));
    }

    #[test]
    fn containers_follow_element_conversions() {
        let mut types = TypeInterner::new();
        let token = ty(&mut types, "async", "token");
        let ptr = ty(&mut types, "core", "ptr");
        let tuple = types.intern(
            TypeDataBuilder::new(Symbol::new("core"), Symbol::new("tuple"))
                .param(token)
                .param(token)
                .build(),
        );

        let mut converter = TypeConverter::new();
        converter.add_conversion(move |_, t| (t == token).then_some(ptr));

        let converted = converter.convert_type(&mut types, tuple).unwrap();
        assert_eq!(types.get(converted).params.as_slice(), &[ptr, ptr]);
        assert!(!converter.is_legal(&mut types, tuple));
        assert!(converter.is_legal(&mut types, converted));
    }

    #[test]
    fn multi_type_expansion_is_not_one_to_one() {
        let mut types = TypeInterner::new();
        let pair = ty(&mut types, "test", "pair");
        let i64_ty = ty(&mut types, "core", "i64");

        let mut converter = TypeConverter::new();
        converter.add_expansion(move |_, t| (t == pair).then(|| smallvec![i64_ty, i64_ty]));

        let err = converter.convert_type(&mut types, pair).unwrap_err();
        assert_eq!(err.count, 2);
        assert!(err.to_string().ends_with("not a 1:1 type conversion"));
        assert_eq!(converter.convert_type_or_identity(&mut types, pair), pair);
    }
}
