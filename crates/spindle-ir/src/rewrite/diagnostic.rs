//! Diagnostics attached to operations that failed to legalize.

use derive_more::Display;

use crate::context::IrContext;
use crate::location::Location;
use crate::ops;
use crate::refs::OpRef;

/// Why a pattern refused to convert an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum FailureKind {
    /// The operand is a token/value/group kind the operation does not support.
    #[display("unsupported kind")]
    UnsupportedKind,
    /// A structural rewrite met a type that does not map to exactly one type.
    #[display("not a 1:1 conversion")]
    NotOneToOne,
    /// A payload type has no known lowered form.
    #[display("unknown payload type")]
    UnknownPayloadType,
    /// An await in a position that cannot be turned into a suspension point.
    #[display("unsupported await")]
    UnsupportedAwait,
    /// No pattern converted an illegal operation.
    #[display("failed to legalize")]
    Illegal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Severity {
    #[display("error")]
    Error,
    #[display("warning")]
    Warning,
}

/// A message attached to one operation.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{severity}: {op_name}: {kind}: {message}")]
pub struct Diagnostic {
    pub op: OpRef,
    pub op_name: String,
    pub location: Location,
    pub severity: Severity,
    pub kind: FailureKind,
    pub message: String,
}

impl Diagnostic {
    pub fn error(ctx: &IrContext, op: OpRef, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            op,
            op_name: ops::full_name(ctx, op),
            location: ctx.op(op).location,
            severity: Severity::Error,
            kind,
            message: message.into(),
        }
    }
}
