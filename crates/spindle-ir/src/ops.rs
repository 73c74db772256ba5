//! Typed operation wrappers.
//!
//! Provides the `DialectOp` trait and the `dialect_ops!` macro that
//! generates a `Copy` wrapper around `OpRef` for each operation kind.

use derive_more::Display;

use crate::context::IrContext;
use crate::refs::OpRef;
use crate::symbol::Symbol;

/// Error when viewing an operation through the wrong wrapper.
#[derive(Debug, Clone, PartialEq, Eq, Display)]
pub enum ConversionError {
    #[display("expected `{expected}`, found `{actual}`")]
    WrongOperation {
        expected: &'static str,
        actual: String,
    },
    #[display("missing attribute `{_0}`")]
    MissingAttribute(&'static str),
    #[display("attribute `{_0}` has the wrong kind")]
    WrongAttributeType(&'static str),
}

impl std::error::Error for ConversionError {}

/// A typed view of an operation of one `dialect.name` kind.
pub trait DialectOp: Sized + Copy {
    const DIALECT_NAME: &'static str;
    const OP_NAME: &'static str;

    /// Wrap without checking. Only for generated code and constructors.
    fn wrap_unchecked(op: OpRef) -> Self;

    fn op_ref(&self) -> OpRef;

    fn matches(ctx: &IrContext, op: OpRef) -> bool {
        let data = ctx.op(op);
        data.dialect == Symbol::new(Self::DIALECT_NAME) && data.name == Symbol::new(Self::OP_NAME)
    }

    fn from_op(ctx: &IrContext, op: OpRef) -> Result<Self, ConversionError> {
        if Self::matches(ctx, op) {
            Ok(Self::wrap_unchecked(op))
        } else {
            let data = ctx.op(op);
            Err(ConversionError::WrongOperation {
                expected: Self::OP_NAME,
                actual: format!("{}.{}", data.dialect, data.name),
            })
        }
    }
}

/// Full `dialect.op` name of an operation, for diagnostics.
pub fn full_name(ctx: &IrContext, op: OpRef) -> String {
    let data = ctx.op(op);
    format!("{}.{}", data.dialect, data.name)
}

/// Generate wrapper structs for the operations of one dialect.
///
/// ```
/// # use spindle_ir::dialect_ops;
/// dialect_ops! {
///     dialect "demo";
///     /// A demo operation.
///     Frob => "frob";
/// }
/// ```
#[macro_export]
macro_rules! dialect_ops {
    (
        dialect $dialect:literal;
        $($(#[$meta:meta])* $name:ident => $op:literal;)*
    ) => {
        /// Name of this dialect.
        pub const DIALECT_NAME: &str = $dialect;

        $(
            $(#[$meta])*
            #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
            pub struct $name($crate::OpRef);

            impl $crate::ops::DialectOp for $name {
                const DIALECT_NAME: &'static str = $dialect;
                const OP_NAME: &'static str = $op;

                fn wrap_unchecked(op: $crate::OpRef) -> Self {
                    Self(op)
                }

                fn op_ref(&self) -> $crate::OpRef {
                    self.0
                }
            }

            impl $name {
                /// Symbol of the operation name within its dialect.
                #[allow(dead_code)]
                pub fn op_name() -> $crate::Symbol {
                    $crate::Symbol::new($op)
                }

                /// Result value at `index`.
                #[allow(dead_code)]
                pub fn result_at(&self, ctx: &$crate::IrContext, index: u32) -> $crate::ValueRef {
                    ctx.op_result(self.0, index)
                }
            }
        )*
    };
}

/// Build an operation of the given kind from a prepared builder and wrap it.
pub fn build<T: DialectOp>(ctx: &mut IrContext, builder: crate::OperationDataBuilder) -> T {
    let data = builder.build(ctx);
    T::wrap_unchecked(ctx.create_op(data))
}

/// Start a builder for operation kind `T`.
pub fn builder<T: DialectOp>(location: crate::Location) -> crate::OperationDataBuilder {
    crate::OperationDataBuilder::new(
        location,
        Symbol::new(T::DIALECT_NAME),
        Symbol::new(T::OP_NAME),
    )
}
