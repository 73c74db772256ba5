//! Rewrite pattern trait.

use super::adaptor::OpAdaptor;
use super::rewriter::PatternRewriter;
use crate::context::IrContext;
use crate::refs::OpRef;

/// A pattern that matches one kind of operation and records its rewrite.
///
/// Return `true` if the pattern matched and recorded mutations through the
/// rewriter. A pattern that cannot convert an op it is responsible for
/// should call `rewriter.notify_match_failure` and return `false`, and
/// must not have created any operation before doing so.
pub trait RewritePattern {
    fn match_and_rewrite(
        &self,
        ctx: &mut IrContext,
        op: OpRef,
        adaptor: &OpAdaptor,
        rewriter: &mut PatternRewriter,
    ) -> bool;

    /// Human-readable name for logging.
    fn name(&self) -> &'static str {
        std::any::type_name::<Self>()
    }
}
