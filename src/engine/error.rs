//! Error taxonomy: ISO-style Prolog exceptions the dispatcher can throw, and
//! the embedding-facing [`EngineError`] returned by [`crate::engine::Engine`]
//! entry points for failures that never reach Prolog code (bad module name,
//! malformed persistence log, ...).
//!
//! Mirrors the teacher's own boundary convention (see `bits::Error` /
//! `read::Error` in the original `llvm-bitcode-rs` sources this crate grew
//! from): a closed, hand-written `enum` with a manual `Display`/`Error`
//! impl, rather than `thiserror`/`anyhow`.

use std::fmt;

use crate::engine::atoms::AtomTable;
use crate::engine::cell::{Cell, Payload, Tag};
use crate::engine::clause::FunctorKey;
use crate::engine::term::{Term, TermBuf};

/// An exception ball as ISO Prolog built-ins throw it: `error(Formal,
/// Context)` structures are the convention, but `throw/1` accepts any term,
/// so the dispatcher carries the whole cell stream rather than a closed enum.
#[derive(Debug, Clone)]
pub struct PrologError {
    pub ball: Vec<Cell>,
}

impl PrologError {
    #[must_use]
    pub fn new(ball: Vec<Cell>) -> Self {
        Self { ball }
    }

    /// Number of distinct local variable slots the ball references — the
    /// frame size `instantiate` must allocate before pushing it onto the
    /// heap. Computed rather than carried, since every producer of a ball
    /// (this module, [`crate::engine::unify::deep_clone`]) already numbers
    /// local variables densely from 0.
    #[must_use]
    pub fn nbr_vars(&self) -> u32 {
        self.ball
            .iter()
            .filter_map(|c| match (c.tag, &c.payload) {
                (Tag::Var, Payload::Var(slot)) => Some(*slot + 1),
                _ => None,
            })
            .max()
            .unwrap_or(0)
    }
}

impl From<Term> for PrologError {
    fn from(term: Term) -> Self {
        PrologError::new(term.cells)
    }
}

/// The formal part of an ISO `error/2` ball, for built-ins to construct
/// without hand-assembling cells at every call site. [`crate::engine::builtins`]
/// turns these into a [`PrologError`] via the atom table.
#[derive(Debug, Clone)]
pub enum FormalError {
    InstantiationError,
    TypeError { expected: &'static str, culprit: Cell },
    DomainError { domain: &'static str, culprit: Cell },
    ExistenceError { kind: &'static str, culprit: FunctorKey },
    PermissionError { operation: &'static str, kind: &'static str, culprit: Cell },
    EvaluationError { what: &'static str },
    RepresentationError { what: &'static str },
}

impl FormalError {
    /// Build the standalone `error(Formal, Name/Arity)` ball ISO mandates
    /// (§7), ready to be pushed onto the heap by the dispatcher's
    /// `instantiate` once a `throw/1` site raises it. `context` names the
    /// built-in that raised it; `None` yields an unbound context variable.
    #[must_use]
    pub fn into_ball(self, atoms: &mut AtomTable, context: Option<FunctorKey>) -> PrologError {
        let error_atom = atoms.intern("error");
        let mut buf = TermBuf::new();
        let outer = buf.open_functor(Cell::functor(error_atom, 2));
        push_formal(&mut buf, atoms, &self);
        match context {
            Some(key) => {
                let slash = atoms.intern("/");
                let mark = buf.open_functor(Cell::functor(slash, 2));
                buf.push_leaf(Cell::atom(key.atom));
                buf.push_leaf(Cell::int(key.arity as i64));
                buf.close_functor(mark);
            }
            None => {
                buf.push_leaf(Cell::var(0));
            }
        }
        buf.close_functor(outer);
        PrologError::new(buf.finish(1).cells)
    }
}

fn push_formal(buf: &mut TermBuf, atoms: &mut AtomTable, formal: &FormalError) {
    match formal {
        FormalError::InstantiationError => {
            buf.push_leaf(Cell::atom(atoms.intern("instantiation_error")));
        }
        FormalError::TypeError { expected, culprit } => {
            let name = atoms.intern("type_error");
            let mark = buf.open_functor(Cell::functor(name, 2));
            buf.push_leaf(Cell::atom(atoms.intern(expected)));
            buf.push_leaf(culprit.clone());
            buf.close_functor(mark);
        }
        FormalError::DomainError { domain, culprit } => {
            let name = atoms.intern("domain_error");
            let mark = buf.open_functor(Cell::functor(name, 2));
            buf.push_leaf(Cell::atom(atoms.intern(domain)));
            buf.push_leaf(culprit.clone());
            buf.close_functor(mark);
        }
        FormalError::ExistenceError { kind, culprit } => {
            let name = atoms.intern("existence_error");
            let slash = atoms.intern("/");
            let mark = buf.open_functor(Cell::functor(name, 2));
            buf.push_leaf(Cell::atom(atoms.intern(kind)));
            let slash_mark = buf.open_functor(Cell::functor(slash, 2));
            buf.push_leaf(Cell::atom(culprit.atom));
            buf.push_leaf(Cell::int(culprit.arity as i64));
            buf.close_functor(slash_mark);
            buf.close_functor(mark);
        }
        FormalError::PermissionError { operation, kind, culprit } => {
            let name = atoms.intern("permission_error");
            let mark = buf.open_functor(Cell::functor(name, 3));
            buf.push_leaf(Cell::atom(atoms.intern(operation)));
            buf.push_leaf(Cell::atom(atoms.intern(kind)));
            buf.push_leaf(culprit.clone());
            buf.close_functor(mark);
        }
        FormalError::EvaluationError { what } => {
            let name = atoms.intern("evaluation_error");
            let mark = buf.open_functor(Cell::functor(name, 1));
            buf.push_leaf(Cell::atom(atoms.intern(what)));
            buf.close_functor(mark);
        }
        FormalError::RepresentationError { what } => {
            let name = atoms.intern("representation_error");
            let mark = buf.open_functor(Cell::functor(name, 1));
            buf.push_leaf(Cell::atom(atoms.intern(what)));
            buf.close_functor(mark);
        }
    }
}

impl fmt::Display for FormalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FormalError::InstantiationError => write!(f, "instantiation_error"),
            FormalError::TypeError { expected, .. } => write!(f, "type_error({expected})"),
            FormalError::DomainError { domain, .. } => write!(f, "domain_error({domain})"),
            FormalError::ExistenceError { kind, culprit } => {
                write!(f, "existence_error({kind}, {}/{})", culprit.atom, culprit.arity)
            }
            FormalError::PermissionError { operation, kind, .. } => {
                write!(f, "permission_error({operation}, {kind})")
            }
            FormalError::EvaluationError { what } => write!(f, "evaluation_error({what})"),
            FormalError::RepresentationError { what } => write!(f, "representation_error({what})"),
        }
    }
}

/// Failures from the embedding API (§6) that never reach Prolog-level
/// exception handling: they abort the call outright.
#[derive(Debug)]
pub enum EngineError {
    UnknownModule(String),
    /// A `throw/1` ball escaped every `catch/3` in the query.
    Uncaught(PrologError),
    Persistence(String),
    /// A clause or query term failed [`crate::engine::term::Term::validate_nbr_cells`].
    MalformedTerm,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EngineError::UnknownModule(name) => write!(f, "no such module: {name}"),
            EngineError::Uncaught(err) => write!(f, "uncaught exception ({} cells)", err.ball.len()),
            EngineError::Persistence(msg) => write!(f, "persistence log error: {msg}"),
            EngineError::MalformedTerm => write!(f, "term failed the nbr_cells invariant"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<PrologError> for EngineError {
    fn from(err: PrologError) -> Self {
        EngineError::Uncaught(err)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instantiation_error_ball_has_no_variables() {
        let mut atoms = AtomTable::new();
        let err = FormalError::InstantiationError.into_ball(&mut atoms, None);
        assert_eq!(err.nbr_vars(), 1); // unbound context var
        assert_eq!(err.ball[0].functor_key().map(|k| atoms.name(k.atom).to_string()), Some("error".to_string()));
    }

    #[test]
    fn type_error_ball_names_culprit_and_context() {
        let mut atoms = AtomTable::new();
        let p = atoms.intern("p");
        let err = FormalError::TypeError { expected: "integer", culprit: Cell::atom(p) }
            .into_ball(&mut atoms, Some(FunctorKey::new(p, 1)));
        assert_eq!(err.nbr_vars(), 0);
        assert_eq!(err.ball[0].arity, 2);
    }
}
