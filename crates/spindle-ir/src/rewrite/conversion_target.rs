//! Legality rules for dialect conversion.

use std::collections::HashSet;

use crate::context::IrContext;
use crate::refs::{OpRef, RegionRef};
use crate::symbol::Symbol;
use crate::walk;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LegalityCheck {
    Legal,
    Illegal,
}

type DynamicCheckFn = dyn Fn(&mut IrContext, OpRef) -> Option<LegalityCheck>;

/// Which operations and dialects may remain after conversion.
///
/// Dynamic checks take `&mut IrContext` because type legality queries may
/// intern converted types.
#[derive(Default)]
pub struct ConversionTarget {
    legal_dialects: HashSet<Symbol>,
    illegal_dialects: HashSet<Symbol>,
    legal_ops: HashSet<(Symbol, Symbol)>,
    illegal_ops: HashSet<(Symbol, Symbol)>,
    dynamic_checks: Vec<Box<DynamicCheckFn>>,
}

impl ConversionTarget {
    /// An empty target: everything is legal.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_legal_dialect(&mut self, dialect: &str) {
        self.legal_dialects.insert(Symbol::from_dynamic(dialect));
    }

    pub fn add_illegal_dialect(&mut self, dialect: &str) {
        self.illegal_dialects.insert(Symbol::from_dynamic(dialect));
    }

    pub fn add_legal_op(&mut self, dialect: &str, op_name: &str) {
        self.legal_ops
            .insert((Symbol::from_dynamic(dialect), Symbol::from_dynamic(op_name)));
    }

    pub fn add_illegal_op(&mut self, dialect: &str, op_name: &str) {
        self.illegal_ops
            .insert((Symbol::from_dynamic(dialect), Symbol::from_dynamic(op_name)));
    }

    /// Add a dynamic check. Return `None` to defer to the static rules.
    pub fn add_dynamic_check(
        &mut self,
        f: impl Fn(&mut IrContext, OpRef) -> Option<LegalityCheck> + 'static,
    ) {
        self.dynamic_checks.push(Box::new(f));
    }

    /// Resolution order: dynamic checks, op rules, dialect rules, legal.
    pub fn is_legal(&self, ctx: &mut IrContext, op: OpRef) -> LegalityCheck {
        for check in &self.dynamic_checks {
            if let Some(result) = check(ctx, op) {
                return result;
            }
        }

        let data = ctx.op(op);
        let key = (data.dialect, data.name);

        if self.legal_ops.contains(&key) {
            return LegalityCheck::Legal;
        }
        if self.illegal_ops.contains(&key) {
            return LegalityCheck::Illegal;
        }
        if self.legal_dialects.contains(&data.dialect) {
            return LegalityCheck::Legal;
        }
        if self.illegal_dialects.contains(&data.dialect) {
            return LegalityCheck::Illegal;
        }
        LegalityCheck::Legal
    }

    /// Every illegal operation remaining under `region`.
    pub fn verify(&self, ctx: &mut IrContext, region: RegionRef) -> Vec<IllegalOp> {
        let all = walk::collect_ops(ctx, region);
        let mut illegal = Vec::new();
        for op in all {
            if self.is_legal(ctx, op) == LegalityCheck::Illegal {
                let data = ctx.op(op);
                illegal.push(IllegalOp {
                    op,
                    dialect: data.dialect,
                    name: data.name,
                });
            }
        }
        illegal
    }
}

/// An illegal operation found during verification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IllegalOp {
    pub op: OpRef,
    pub dialect: Symbol,
    pub name: Symbol,
}

impl std::fmt::Display for IllegalOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{} ({})", self.dialect, self.name, self.op)
    }
}
