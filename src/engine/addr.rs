//! Cross-store cell addressing.
//!
//! Spec §4.3 describes continuations and variable bindings as raw `cell*`
//! pointers. This engine never hands out pointers into either backing
//! store (the clause store's immutable templates, or the per-query heap),
//! so an address is instead a small sum type identifying which store and
//! where — stable across both stores' reallocation, since indices don't
//! move when a `Vec` grows the way pointers would.

use crate::engine::clause::ClauseId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeAddr {
    Clause(ClauseId, usize),
    Heap(usize),
}

impl CodeAddr {
    /// The same clause/heap, advanced to a different offset.
    #[must_use]
    pub fn at(self, offset: usize) -> Self {
        match self {
            CodeAddr::Clause(clause, _) => CodeAddr::Clause(clause, offset),
            CodeAddr::Heap(_) => CodeAddr::Heap(offset),
        }
    }
}

/// An address paired with the frame whose slots its local variable numbers
/// resolve against — spec §4.5's `unify(p1, ctx1, p2, ctx2)`, generalized so
/// every address always travels with its context rather than only at
/// unify's call boundary.
///
/// A clause's stored cells number their variables locally (`0..nbr_vars`,
/// shared and immutable across every activation of that clause); `frame`
/// supplies the activation currently running one to translate those local
/// numbers to global slots. Heap cells — the query goal, `copy_term`
/// output, `findall` snapshots — are built with already-global slot numbers,
/// so `frame` is unused when `addr` is [`CodeAddr::Heap`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ref {
    pub addr: CodeAddr,
    pub frame: usize,
}

impl Ref {
    #[must_use]
    pub fn new(addr: CodeAddr, frame: usize) -> Self {
        Self { addr, frame }
    }

    #[must_use]
    pub fn heap(offset: usize, frame: usize) -> Self {
        Self { addr: CodeAddr::Heap(offset), frame }
    }

    #[must_use]
    pub fn in_clause(clause: ClauseId, offset: usize, frame: usize) -> Self {
        Self { addr: CodeAddr::Clause(clause, offset), frame }
    }

    #[must_use]
    pub fn at(self, offset: usize) -> Self {
        Self { addr: self.addr.at(offset), frame: self.frame }
    }
}
