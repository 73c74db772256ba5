//! Rewrite and legalization infrastructure.
//!
//! Patterns mutate the arena in place; result replacement is RAUW on the
//! context rather than a functional rebuild.

pub mod adaptor;
pub mod applicator;
pub mod conversion_target;
pub mod diagnostic;
pub mod helpers;
pub mod pattern;
pub mod rewriter;
pub mod type_converter;

pub use adaptor::{OpAdaptor, OriginalTypes};
pub use applicator::{ApplyResult, ConversionResult, PatternApplicator};
pub use conversion_target::{ConversionTarget, IllegalOp, LegalityCheck};
pub use diagnostic::{Diagnostic, FailureKind, Severity};
pub use pattern::RewritePattern;
pub use rewriter::PatternRewriter;
pub use type_converter::{NotOneToOne, TypeConverter};
