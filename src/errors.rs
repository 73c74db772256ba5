//! Error types for async lowering

use derive_more::Display;
use spindle_ir::rewrite::Diagnostic;

use crate::fsm::FrameLifetimeError;

pub type LoweringResult<T> = Result<T, LoweringError>;

#[derive(Display, Debug)]
#[display("{kind}")]
pub struct LoweringError {
    kind: Box<LoweringErrorKind>,
}

impl<E> From<E> for LoweringError
where
    LoweringErrorKind: From<E>,
{
    fn from(error: E) -> Self {
        LoweringError {
            kind: Box::new(LoweringErrorKind::from(error)),
        }
    }
}

impl LoweringError {
    pub(crate) fn legalization(diagnostics: Vec<Diagnostic>) -> Self {
        LoweringErrorKind::Legalization { diagnostics }.into()
    }

    pub(crate) fn no_fixpoint(stage: &'static str, iterations: usize) -> Self {
        LoweringErrorKind::NoFixpoint { stage, iterations }.into()
    }

    pub fn kind(&self) -> &LoweringErrorKind {
        &self.kind
    }

    /// Per-operation diagnostics, empty unless legalization failed.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match &*self.kind {
            LoweringErrorKind::Legalization { diagnostics } => diagnostics,
            _ => &[],
        }
    }
}

#[derive(Display, Debug)]
pub enum LoweringErrorKind {
    #[display("failed to legalize {} async operation(s)", diagnostics.len())]
    Legalization { diagnostics: Vec<Diagnostic> },

    #[display("{stage} stage did not converge after {iterations} iterations")]
    NoFixpoint {
        stage: &'static str,
        iterations: usize,
    },

    #[display("{_0}")]
    FrameLifetime(FrameLifetimeError),

    #[display("module has no body block")]
    MissingModuleBody,

    #[display("invalid target: {_0}")]
    InvalidTarget(String),
}

impl From<FrameLifetimeError> for LoweringErrorKind {
    fn from(error: FrameLifetimeError) -> Self {
        LoweringErrorKind::FrameLifetime(error)
    }
}

impl From<target_lexicon::ParseError> for LoweringErrorKind {
    fn from(error: target_lexicon::ParseError) -> Self {
        LoweringErrorKind::InvalidTarget(error.to_string())
    }
}

impl std::error::Error for LoweringError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &*self.kind {
            LoweringErrorKind::FrameLifetime(e) => Some(e),
            _ => None,
        }
    }
}
