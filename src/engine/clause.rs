//! The clause store: asserted facts and rules, indexed by functor and, where
//! it discriminates, by first argument.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU16, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::engine::atoms::AtomOffset;
use crate::engine::cell::{Cell, Tag};
use crate::engine::term::Term;

/// Stable 128-bit clause identity, exposed to surface code for `clause/3`,
/// `erase/1`, `instance/2` — distinct from [`ClauseId`], which is this
/// process's cheap in-memory handle. Formatted as three hex fields
/// separated by `-`: a 16-digit microsecond timestamp, a 4-digit per-
/// timestamp counter, and a 12-digit low-48-bits process seed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Uuid {
    pub timestamp_us: u64,
    pub counter: u16,
    pub process_seed: u64,
}

impl Uuid {
    #[must_use]
    pub fn generate(process_seed: u64) -> Self {
        static COUNTER: AtomicU16 = AtomicU16::new(0);
        let timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("system clock is after the Unix epoch")
            .as_micros() as u64;
        let counter = COUNTER.fetch_add(1, Ordering::Relaxed);
        Self { timestamp_us, counter, process_seed: process_seed & 0xFFFF_FFFF_FFFF }
    }
}

impl fmt::Display for Uuid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:016x}-{:04x}-{:012x}",
            self.timestamp_us, self.counter, self.process_seed
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UuidParseError;

impl std::str::FromStr for Uuid {
    type Err = UuidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split('-');
        let (Some(ts), Some(ctr), Some(seed), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(UuidParseError);
        };
        let timestamp_us = u64::from_str_radix(ts, 16).map_err(|_| UuidParseError)?;
        let counter = u16::from_str_radix(ctr, 16).map_err(|_| UuidParseError)?;
        let process_seed = u64::from_str_radix(seed, 16).map_err(|_| UuidParseError)?;
        Ok(Self { timestamp_us, counter, process_seed })
    }
}

/// `(name, arity)` — the unit clauses are filed and looked up by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FunctorKey {
    pub atom: AtomOffset,
    pub arity: u8,
}

impl FunctorKey {
    #[must_use]
    pub fn new(atom: AtomOffset, arity: u8) -> Self {
        Self { atom, arity }
    }
}

/// Monotonically increasing clause identity, stable across `asserta`,
/// `assertz` and `retract` so that choice points and the persistence log can
/// reference a clause without caring where in the list it currently sits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ClauseId(pub u64);

/// A first-argument index key: ground atoms/numbers/strings discriminate,
/// everything else (variables, compounds) falls into the catch-all bucket
/// that every query must still try.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum IndexKey {
    Var,
    Atom(AtomOffset),
    Functor(AtomOffset, u8),
    Int(i64),
    Str(String),
}

impl IndexKey {
    #[must_use]
    pub fn of(cell: &Cell) -> Self {
        match cell.tag {
            Tag::Var => IndexKey::Var,
            Tag::Literal if cell.arity == 0 => match cell.functor_key() {
                Some(k) => IndexKey::Atom(k.atom),
                None => IndexKey::Var,
            },
            Tag::Literal => {
                let k = cell.functor_key().expect("literal cell has a functor key");
                IndexKey::Functor(k.atom, k.arity)
            }
            Tag::Int => match &cell.payload {
                crate::engine::cell::Payload::Int { num, den: 1 } => IndexKey::Int(*num),
                _ => IndexKey::Var,
            },
            Tag::Str => match &cell.payload {
                crate::engine::cell::Payload::Str(s) => IndexKey::Str(s.to_string()),
                _ => IndexKey::Var,
            },
            _ => IndexKey::Var,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Clause {
    pub id: ClauseId,
    pub uuid: Uuid,
    pub term: Term,
    /// Offset of the head cell within `term.cells` (0 unless wrapped in `:-/2`).
    pub head_at: usize,
    /// Offset of the body's first cell, `None` for a fact.
    pub body_at: Option<usize>,
    pub erased: bool,
}

impl Clause {
    #[must_use]
    pub fn head(&self) -> &Cell {
        &self.term.cells[self.head_at]
    }

    #[must_use]
    pub fn first_arg_key(&self) -> Option<IndexKey> {
        let head = self.head();
        if head.arity == 0 {
            return None;
        }
        let first = Term::child_offsets(&self.term.cells, self.head_at)[0];
        Some(IndexKey::of(&self.term.cells[first]))
    }
}

/// All clauses sharing one `(name, arity)`, in assert order, plus the
/// first-argument index over that order.
#[derive(Debug, Default)]
pub struct Predicate {
    pub clauses: Vec<ClauseId>,
    by_first_arg: BTreeMap<IndexKey, Vec<ClauseId>>,
    dirty: usize,
}

impl Predicate {
    fn reindex(&mut self, store: &BTreeMap<ClauseId, Clause>) {
        self.by_first_arg.clear();
        for &id in &self.clauses {
            let Some(clause) = store.get(&id) else { continue };
            if clause.erased {
                continue;
            }
            let key = clause.first_arg_key().unwrap_or(IndexKey::Var);
            self.by_first_arg.entry(key).or_default().push(id);
        }
        self.dirty = 0;
    }
}

/// Asserted clauses for one module, filed by functor and (for discriminating
/// first arguments) by index.
///
/// Erasure is logical: `retract` flips [`Clause::erased`] rather than
/// shifting the vector, so choice points iterating a predicate never observe
/// a clause vanish mid-backtrack. A predicate's index is rebuilt lazily once
/// enough erasures accumulate (spec §4.4's "sweep", generalized: rebuilding
/// cheaply just re-scans the live clause list rather than needing a separate
/// mark-and-sweep pass).
#[derive(Debug, Default)]
pub struct ClauseStore {
    clauses: BTreeMap<ClauseId, Clause>,
    predicates: BTreeMap<FunctorKey, Predicate>,
    by_uuid: BTreeMap<Uuid, ClauseId>,
    next_id: u64,
    process_seed: u64,
}

const REINDEX_THRESHOLD: usize = 16;

impl ClauseStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_process_seed(std::process::id() as u64)
    }

    #[must_use]
    pub fn with_process_seed(process_seed: u64) -> Self {
        Self {
            clauses: BTreeMap::new(),
            predicates: BTreeMap::new(),
            by_uuid: BTreeMap::new(),
            next_id: 0,
            process_seed,
        }
    }

    fn fresh_id(&mut self) -> ClauseId {
        let id = ClauseId(self.next_id);
        self.next_id += 1;
        id
    }

    fn functor_of(term: &Term, head_at: usize) -> FunctorKey {
        term.cells[head_at]
            .functor_key()
            .expect("clause head must be an atom or compound")
    }

    pub fn assertz(&mut self, clause_term: Term, clause_atom: AtomOffset) -> ClauseId {
        self.assertz_with_uuid(clause_term, clause_atom, Uuid::generate(self.process_seed))
    }

    pub fn asserta(&mut self, clause_term: Term, clause_atom: AtomOffset) -> ClauseId {
        self.asserta_with_uuid(clause_term, clause_atom, Uuid::generate(self.process_seed))
    }

    /// `assertz` with a caller-chosen uuid, for persistence replay: a log's
    /// later `Erase` records name the uuid a clause was saved under, so
    /// replay must preserve it rather than mint a fresh one.
    pub(crate) fn assertz_with_uuid(&mut self, clause_term: Term, clause_atom: AtomOffset, uuid: Uuid) -> ClauseId {
        let id = self.fresh_id();
        let (head_at, body_at) = clause_term.split_clause(clause_atom);
        let key = Self::functor_of(&clause_term, head_at);
        let clause = Clause { id, uuid, term: clause_term, head_at, body_at, erased: false };
        self.clauses.insert(id, clause);
        self.by_uuid.insert(uuid, id);
        let pred = self.predicates.entry(key).or_default();
        pred.clauses.push(id);
        pred.reindex(&self.clauses);
        id
    }

    pub(crate) fn asserta_with_uuid(&mut self, clause_term: Term, clause_atom: AtomOffset, uuid: Uuid) -> ClauseId {
        let id = self.fresh_id();
        let (head_at, body_at) = clause_term.split_clause(clause_atom);
        let key = Self::functor_of(&clause_term, head_at);
        let clause = Clause { id, uuid, term: clause_term, head_at, body_at, erased: false };
        self.clauses.insert(id, clause);
        self.by_uuid.insert(uuid, id);
        let pred = self.predicates.entry(key).or_default();
        pred.clauses.insert(0, id);
        pred.reindex(&self.clauses);
        id
    }

    #[must_use]
    pub fn get(&self, id: ClauseId) -> Option<&Clause> {
        self.clauses.get(&id).filter(|c| !c.erased)
    }

    #[must_use]
    pub fn get_by_uuid(&self, uuid: Uuid) -> Option<&Clause> {
        self.by_uuid.get(&uuid).and_then(|&id| self.get(id))
    }

    /// Logically erase a clause; returns `false` if it was already gone.
    pub fn erase(&mut self, id: ClauseId) -> bool {
        let Some(clause) = self.clauses.get_mut(&id) else { return false };
        if clause.erased {
            return false;
        }
        clause.erased = true;
        let key = Self::functor_of(&clause.term, clause.head_at);
        if let Some(pred) = self.predicates.get_mut(&key) {
            pred.dirty += 1;
            if pred.dirty >= REINDEX_THRESHOLD {
                pred.reindex(&self.clauses);
            }
        }
        true
    }

    pub fn erase_by_uuid(&mut self, uuid: Uuid) -> bool {
        match self.by_uuid.get(&uuid).copied() {
            Some(id) => self.erase(id),
            None => false,
        }
    }

    /// Physically drop every logically-erased clause. Spec's "dirty sweep",
    /// run between queries rather than eagerly since a choice point may
    /// still be iterating a predicate's clause list mid-query.
    pub fn sweep(&mut self) {
        let dead: Vec<ClauseId> = self
            .clauses
            .iter()
            .filter(|(_, c)| c.erased)
            .map(|(&id, _)| id)
            .collect();
        for id in dead {
            if let Some(clause) = self.clauses.remove(&id) {
                self.by_uuid.remove(&clause.uuid);
                let key = Self::functor_of(&clause.term, clause.head_at);
                if let Some(pred) = self.predicates.get_mut(&key) {
                    pred.clauses.retain(|c| *c != id);
                    pred.reindex(&self.clauses);
                }
            }
        }
    }

    pub fn abolish(&mut self, key: FunctorKey) {
        if let Some(pred) = self.predicates.remove(&key) {
            for id in pred.clauses {
                self.clauses.remove(&id);
            }
        }
    }

    /// All live clause ids for `key` matching `first_arg` (or every live
    /// clause, if `first_arg` is `None` or not ground), in assert order.
    #[must_use]
    pub fn candidates(&self, key: FunctorKey, first_arg: Option<&Cell>) -> Vec<ClauseId> {
        let Some(pred) = self.predicates.get(&key) else { return Vec::new() };
        match first_arg.map(IndexKey::of) {
            Some(idx) if idx != IndexKey::Var => {
                let mut ids: Vec<ClauseId> = pred
                    .by_first_arg
                    .get(&idx)
                    .cloned()
                    .unwrap_or_default();
                if let Some(var_bucket) = pred.by_first_arg.get(&IndexKey::Var) {
                    ids.extend(var_bucket.iter().copied());
                    ids.sort_by_key(|id| pred.clauses.iter().position(|c| c == id).unwrap_or(usize::MAX));
                }
                ids
            }
            _ => pred
                .clauses
                .iter()
                .copied()
                .filter(|id| self.clauses.get(id).is_some_and(|c| !c.erased))
                .collect(),
        }
    }

    #[must_use]
    pub fn has_predicate(&self, key: FunctorKey) -> bool {
        self.predicates.contains_key(&key)
    }

    pub fn iter_live(&self) -> impl Iterator<Item = &Clause> {
        self.clauses.values().filter(|c| !c.erased)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::atoms::AtomTable;
    use crate::engine::term::TermBuf;

    fn fact(atoms: &mut AtomTable, name: &str, n: i64) -> Term {
        let f = atoms.intern(name);
        let mut buf = TermBuf::new();
        let mark = buf.open_functor(Cell::functor(f, 1));
        buf.push_leaf(Cell::int(n));
        buf.close_functor(mark);
        buf.finish(0)
    }

    #[test]
    fn assertz_then_asserta_orders_clauses() {
        let mut atoms = AtomTable::new();
        let clause_atom = atoms.intern(":-");
        let mut store = ClauseStore::new();
        let c1 = store.assertz(fact(&mut atoms, "p", 1), clause_atom);
        let c2 = store.assertz(fact(&mut atoms, "p", 2), clause_atom);
        let c0 = store.asserta(fact(&mut atoms, "p", 0), clause_atom);
        let key = FunctorKey::new(atoms.intern("p"), 1);
        assert_eq!(store.candidates(key, None), vec![c0, c1, c2]);
    }

    #[test]
    fn erase_is_logical_and_excluded_from_candidates() {
        let mut atoms = AtomTable::new();
        let clause_atom = atoms.intern(":-");
        let mut store = ClauseStore::new();
        let c1 = store.assertz(fact(&mut atoms, "p", 1), clause_atom);
        let key = FunctorKey::new(atoms.intern("p"), 1);
        assert!(store.erase(c1));
        assert!(store.candidates(key, None).is_empty());
        assert!(store.get(c1).is_none());
    }

    #[test]
    fn first_arg_index_narrows_candidates() {
        let mut atoms = AtomTable::new();
        let clause_atom = atoms.intern(":-");
        let mut store = ClauseStore::new();
        store.assertz(fact(&mut atoms, "p", 1), clause_atom);
        store.assertz(fact(&mut atoms, "p", 2), clause_atom);
        let key = FunctorKey::new(atoms.intern("p"), 1);
        let probe = Cell::int(2);
        assert_eq!(store.candidates(key, Some(&probe)).len(), 1);
    }

    #[test]
    fn uuid_formats_as_three_hex_fields_and_roundtrips() {
        let uuid = Uuid { timestamp_us: 0x1234_5678_9abc, counter: 0x42, process_seed: 0xaabb_ccdd_eeff };
        let text = uuid.to_string();
        assert_eq!(text, "0000123456789abc-0042-aabbccddeeff");
        assert_eq!(text.parse::<Uuid>().unwrap(), uuid);
    }

    #[test]
    fn erase_by_uuid_finds_the_right_clause() {
        let mut atoms = AtomTable::new();
        let clause_atom = atoms.intern(":-");
        let mut store = ClauseStore::new();
        let c1 = store.assertz(fact(&mut atoms, "p", 1), clause_atom);
        let uuid = store.get(c1).unwrap().uuid;
        assert!(store.erase_by_uuid(uuid));
        assert!(store.get_by_uuid(uuid).is_none());
    }

    #[test]
    fn sweep_physically_removes_erased_clauses() {
        let mut atoms = AtomTable::new();
        let clause_atom = atoms.intern(":-");
        let mut store = ClauseStore::new();
        let c1 = store.assertz(fact(&mut atoms, "p", 1), clause_atom);
        store.erase(c1);
        store.sweep();
        let key = FunctorKey::new(atoms.intern("p"), 1);
        assert!(store.predicates.get(&key).unwrap().clauses.is_empty());
    }
}
