//! Configuration of the async lowering.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use target_lexicon::Triple;

use crate::errors::{LoweringError, LoweringErrorKind, LoweringResult};
use crate::layout::DataLayout;

/// Names of the allocation functions coroutine frames are carved from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorNames {
    pub alloc: String,
    pub free: String,
}

impl Default for AllocatorNames {
    fn default() -> Self {
        Self {
            alloc: "malloc".to_owned(),
            free: "free".to_owned(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoweringOptions {
    /// Target triple. `None` means the host.
    pub target: Option<String>,
    /// Iteration limit of each fixpoint stage.
    pub max_iterations: usize,
    /// Prefix of every runtime entry point, e.g. `<prefix>CreateToken`.
    pub runtime_prefix: String,
    pub allocator: AllocatorNames,
    /// Name of the synthesized function the runtime calls to resume a coroutine.
    pub resume_trampoline: String,
}

impl Default for LoweringOptions {
    fn default() -> Self {
        Self {
            target: None,
            max_iterations: 10,
            runtime_prefix: "mlirAsyncRuntime".to_owned(),
            allocator: AllocatorNames::default(),
            resume_trampoline: "__resume".to_owned(),
        }
    }
}

impl LoweringOptions {
    pub fn triple(&self) -> LoweringResult<Triple> {
        match &self.target {
            Some(text) => Ok(Triple::from_str(text)?),
            None => Ok(Triple::host()),
        }
    }

    pub fn data_layout(&self) -> LoweringResult<DataLayout> {
        let triple = self.triple()?;
        DataLayout::for_triple(&triple).ok_or_else(|| {
            LoweringError::from(LoweringErrorKind::InvalidTarget(format!(
                "{triple} has no known pointer width"
            )))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_runtime_abi() {
        let options = LoweringOptions::default();
        assert_eq!(options.runtime_prefix, "mlirAsyncRuntime");
        assert_eq!(options.allocator.alloc, "malloc");
        assert_eq!(options.allocator.free, "free");
        assert_eq!(options.resume_trampoline, "__resume");
        assert_eq!(options.max_iterations, 10);
    }

    #[test]
    fn partial_config_keeps_defaults() {
        let options: LoweringOptions = toml::from_str(
            r#"
            target = "x86_64-unknown-linux-gnu"

            [allocator]
            alloc = "GC_malloc"
            "#,
        )
        .unwrap();
        assert_eq!(options.allocator.alloc, "GC_malloc");
        assert_eq!(options.allocator.free, "free");
        assert_eq!(options.max_iterations, 10);
        assert_eq!(options.data_layout().unwrap().pointer_bytes(), 8);
    }

    #[test]
    fn bad_target_is_reported() {
        let options = LoweringOptions {
            target: Some("not-a-real-triple-at-all".to_owned()),
            ..LoweringOptions::default()
        };
        let err = options.triple().unwrap_err();
        assert!(err.to_string().starts_with("invalid target"));
    }
}
