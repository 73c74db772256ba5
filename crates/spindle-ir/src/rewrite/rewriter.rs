//! PatternRewriter: mutations recorded by a pattern, applied by the applicator.

use super::adaptor::OriginalTypes;
use super::diagnostic::{Diagnostic, FailureKind};
use super::type_converter::TypeConverter;
use crate::context::IrContext;
use crate::refs::{BlockRef, OpRef, ValueRef};

/// Accumulated mutations from a pattern rewrite.
pub(crate) struct Mutations {
    pub(crate) prefix_ops: Vec<OpRef>,
    pub(crate) replacement: Option<OpRef>,
    pub(crate) erase_values: Option<Vec<ValueRef>>,
    pub(crate) module_ops: Vec<OpRef>,
}

/// Rewriter handed to patterns.
///
/// Operands are read straight from the context; replacing results is done
/// with RAUW when the mutations are applied.
pub struct PatternRewriter<'a> {
    type_converter: &'a TypeConverter,
    prefix_ops: Vec<OpRef>,
    replacement: Option<OpRef>,
    erase_values: Option<Vec<ValueRef>>,
    module_ops: Vec<OpRef>,
    failures: Vec<Diagnostic>,
}

impl<'a> PatternRewriter<'a> {
    pub(crate) fn new(type_converter: &'a TypeConverter) -> Self {
        Self {
            type_converter,
            prefix_ops: Vec::new(),
            replacement: None,
            erase_values: None,
            module_ops: Vec::new(),
            failures: Vec::new(),
        }
    }

    pub fn type_converter(&self) -> &'a TypeConverter {
        self.type_converter
    }

    // === Mutations ===

    /// Insert a freshly created, unattached op before the current op.
    pub fn insert_op(&mut self, op: OpRef) {
        self.prefix_ops.push(op);
    }

    /// Replace the current op. Old results map 1:1 by index onto the new op's results.
    pub fn replace_op(&mut self, new_op: OpRef) {
        debug_assert!(
            self.replacement.is_none() && self.erase_values.is_none(),
            "replace_op called after replace_op or erase_op"
        );
        self.replacement = Some(new_op);
    }

    /// Erase the current op, mapping its results onto `replacement_values`.
    pub fn erase_op(&mut self, replacement_values: Vec<ValueRef>) {
        debug_assert!(
            self.replacement.is_none() && self.erase_values.is_none(),
            "erase_op called after replace_op or erase_op"
        );
        self.erase_values = Some(replacement_values);
    }

    /// Append an operation to the module body (e.g. an outlined function).
    pub fn add_module_op(&mut self, op: OpRef) {
        self.module_ops.push(op);
    }

    /// Insert prefix ops and replace the current op in one call.
    pub fn replace_with_prefix(&mut self, prefix: Vec<OpRef>, replacement: OpRef) {
        self.prefix_ops.extend(prefix);
        self.replace_op(replacement);
    }

    /// Record why the current op could not be converted. Always returns `false`.
    pub fn notify_match_failure(
        &mut self,
        ctx: &IrContext,
        op: OpRef,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> bool {
        self.failures.push(Diagnostic::error(ctx, op, kind, message));
        false
    }

    pub(crate) fn has_mutations(&self) -> bool {
        !self.prefix_ops.is_empty()
            || self.replacement.is_some()
            || self.erase_values.is_some()
            || !self.module_ops.is_empty()
    }

    pub(crate) fn take_failures(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.failures)
    }

    pub(crate) fn take_mutations(self) -> Mutations {
        Mutations {
            prefix_ops: self.prefix_ops,
            replacement: self.replacement,
            erase_values: self.erase_values,
            module_ops: self.module_ops,
        }
    }
}

/// Apply recorded mutations for `original_op`.
pub(crate) fn apply_mutations(
    ctx: &mut IrContext,
    original_op: OpRef,
    mutations: Mutations,
    module_first_block: Option<BlockRef>,
    originals: &mut OriginalTypes,
) {
    let parent_block = ctx.op(original_op).parent_block;

    if let Some(block) = parent_block {
        for &prefix_op in &mutations.prefix_ops {
            ctx.insert_op_before(block, original_op, prefix_op);
        }
    }

    if let Some(new_op) = mutations.replacement {
        let old_results: Vec<ValueRef> = ctx.op_results(original_op).to_vec();
        let new_results: Vec<ValueRef> = ctx.op_results(new_op).to_vec();
        debug_assert_eq!(
            old_results.len(),
            new_results.len(),
            "replace_op: result count mismatch ({} vs {})",
            old_results.len(),
            new_results.len()
        );
        for (&old_v, &new_v) in old_results.iter().zip(new_results.iter()) {
            originals.inherit(old_v, new_v);
            ctx.replace_all_uses(old_v, new_v);
        }

        if let Some(block) = parent_block {
            ctx.insert_op_before(block, original_op, new_op);
            ctx.remove_op_from_block(block, original_op);
        }
        ctx.remove_op(original_op);
    } else if let Some(erase_values) = mutations.erase_values {
        let old_results: Vec<ValueRef> = ctx.op_results(original_op).to_vec();
        debug_assert_eq!(
            old_results.len(),
            erase_values.len(),
            "erase_op: replacement value count mismatch ({} vs {})",
            old_results.len(),
            erase_values.len()
        );
        for (&old_v, &new_v) in old_results.iter().zip(erase_values.iter()) {
            originals.inherit(old_v, new_v);
            ctx.replace_all_uses(old_v, new_v);
        }

        if let Some(block) = parent_block {
            ctx.remove_op_from_block(block, original_op);
        }
        ctx.remove_op(original_op);
    }

    if let Some(module_block) = module_first_block {
        for module_op in mutations.module_ops {
            ctx.push_op(module_block, module_op);
        }
    }
}
