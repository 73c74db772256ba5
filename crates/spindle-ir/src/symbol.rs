//! Interned symbols for dialect, operation, attribute and function names.

use std::borrow::Cow;
use std::sync::LazyLock;

use lasso::{Rodeo, Spur};
use parking_lot::RwLock;

/// Global string interner for symbols.
static INTERNER: LazyLock<RwLock<Rodeo>> = LazyLock::new(|| RwLock::new(Rodeo::default()));

/// Interned name, compared and hashed as a 4-byte key.
///
/// The interner is process-wide, so symbols created by different
/// `IrContext`s compare equal when their text does.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Spur);

impl Symbol {
    /// Intern a static string. Prefer this over `from_dynamic` when possible.
    pub fn new(text: &'static str) -> Self {
        Self::get_or_else(text, |rodeo| rodeo.get_or_intern_static(text))
    }

    /// Intern a string built at runtime.
    pub fn from_dynamic(text: &str) -> Self {
        Self::get_or_else(text, |rodeo| rodeo.get_or_intern(text))
    }

    fn get_or_else(text: &str, f: impl for<'r> FnOnce(&'r mut Rodeo) -> Spur) -> Self {
        let mut lock = INTERNER.upgradable_read();
        Symbol(if let Some(spur) = lock.get(text) {
            spur
        } else {
            lock.with_upgraded(f)
        })
    }

    /// Access the symbol's text without allocating.
    ///
    /// Uses `read_recursive()` so nested symbol operations inside the
    /// closure (Display, comparisons) cannot deadlock.
    pub fn with_str<R>(&self, f: impl FnOnce(&str) -> R) -> R {
        let interner = INTERNER.read_recursive();
        f(interner.resolve(&self.0))
    }
}

impl From<&'static str> for Symbol {
    fn from(text: &'static str) -> Self {
        Symbol::new(text)
    }
}

impl From<Cow<'_, str>> for Symbol {
    fn from(text: Cow<'_, str>) -> Self {
        Symbol::from_dynamic(&text)
    }
}

impl From<String> for Symbol {
    fn from(text: String) -> Self {
        Symbol::from_dynamic(&text)
    }
}

/// Declare several symbol accessor functions at once.
///
/// ```
/// use spindle_ir::symbols;
///
/// symbols! {
///     ATTR_CALLEE => "callee",
///     #[allow(dead_code)]
///     ATTR_UNUSED => "unused",
/// }
///
/// assert_eq!(ATTR_CALLEE(), "callee");
/// ```
#[macro_export]
macro_rules! symbols {
    ($($(#[$attr:meta])* $name:ident => $text:literal),* $(,)?) => {
        $(
            $(#[$attr])*
            #[allow(non_snake_case)]
            #[inline]
            pub fn $name() -> $crate::Symbol {
                $crate::Symbol::new($text)
            }
        )*
    };
}

impl PartialEq<str> for Symbol {
    fn eq(&self, other: &str) -> bool {
        self.with_str(|s| s == other)
    }
}

impl PartialEq<&str> for Symbol {
    fn eq(&self, other: &&str) -> bool {
        self.with_str(|s| s == *other)
    }
}

impl PartialEq<Symbol> for str {
    fn eq(&self, other: &Symbol) -> bool {
        other.with_str(|s| s == self)
    }
}

impl PartialEq<Symbol> for &str {
    fn eq(&self, other: &Symbol) -> bool {
        other.with_str(|s| s == *self)
    }
}

impl std::fmt::Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.with_str(|s| f.write_str(s))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn static_and_dynamic_interning_agree() {
        let a = Symbol::new("mlirAsyncRuntimeAddRef");
        let b = Symbol::from_dynamic(&format!("mlirAsyncRuntime{}", "AddRef"));
        assert_eq!(a, b);
        assert_eq!(a, "mlirAsyncRuntimeAddRef");
    }

    #[test]
    fn display_resolves_text() {
        assert_eq!(Symbol::new("coro").to_string(), "coro");
    }

    #[test]
    fn nested_with_str_does_not_deadlock() {
        let outer = Symbol::new("outer");
        let len = outer.with_str(|s| s.len() + Symbol::new("inner").to_string().len());
        assert_eq!(len, 10);
    }
}
