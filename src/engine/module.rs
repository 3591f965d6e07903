//! A module: one namespace of clauses plus the flags that change how its
//! goals are read and run.

use crate::engine::clause::ClauseStore;

/// Prolog flags scoped per module (ISO flags are set with `set_prolog_flag/2`
/// and are conventionally module-local in multi-module systems).
#[derive(Debug, Clone, Copy)]
pub struct Flags {
    pub double_quotes: DoubleQuotes,
    pub character_escapes: bool,
    pub rational_syntax: bool,
    /// When true, `/` between two integers that divide evenly still
    /// produces a rational cell rather than collapsing to an integer.
    pub prefer_rationals: bool,
}

impl Default for Flags {
    fn default() -> Self {
        Self {
            double_quotes: DoubleQuotes::Codes,
            character_escapes: true,
            rational_syntax: false,
            prefer_rationals: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DoubleQuotes {
    Codes,
    Chars,
    Atom,
}

/// Operator descriptor for a user-declared `op/3` directive. This engine has
/// no reader of its own (§1 Non-goals), so the table is carried for an
/// external parser to consult; the core never reads it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperatorDef {
    pub priority: u16,
    pub kind: OperatorKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperatorKind {
    Xfx,
    Xfy,
    Yfx,
    Fy,
    Fx,
    Xf,
    Yf,
}

#[derive(Debug, Default)]
pub struct Module {
    pub name: String,
    pub clauses: ClauseStore,
    pub flags: Flags,
    pub operators: std::collections::HashMap<String, OperatorDef>,
}

impl Module {
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            clauses: ClauseStore::new(),
            flags: Flags::default(),
            operators: std::collections::HashMap::new(),
        }
    }
}
