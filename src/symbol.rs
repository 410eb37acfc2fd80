use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// Characters that may not appear in a bare symbol.
pub const DELIMITERS: &str = "()'`,\";";

/// An immutable symbol name. Equality, ordering and hashing are by name, so
/// two symbols read from different places compare equal. The name is
/// atomically counted so errors naming a symbol can cross threads.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Symbol(Arc<str>);

impl Symbol {
    #[inline]
    pub fn new<A: AsRef<str>>(name: A) -> Self {
        Self(Arc::from(name.as_ref()))
    }

    #[inline]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Returns true if printing the name bare would not read back as the
    /// same symbol.
    pub fn needs_escape(&self) -> bool {
        self.0.is_empty()
            || self.0.chars().any(|c| c.is_whitespace() || DELIMITERS.contains(c))
            || self.0.starts_with('#')
            || self.0.parse::<i64>().is_ok()
    }
}

impl From<&str> for Symbol {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.needs_escape() {
            write!(f, "|{}|", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Symbol({})", self.0)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn symbols_compare_by_name() {
        assert_eq!(Symbol::new("foo"), Symbol::from("foo"));
        assert!(Symbol::new("a") < Symbol::new("b"));
    }

    #[test]
    fn display_escapes_unreadable_names() {
        assert_eq!(Symbol::new("lambda").to_string(), "lambda");
        assert_eq!(Symbol::new("two words").to_string(), "|two words|");
        assert_eq!(Symbol::new("42").to_string(), "|42|");
    }
}
