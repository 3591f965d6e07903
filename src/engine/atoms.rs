//! Append-only atom interner.
//!
//! Atoms are identified by the byte offset of their NUL-terminated name in a
//! single growable pool. Offsets are stable for the lifetime of the
//! [`AtomTable`] — the pool never shrinks or relocates existing bytes.

use std::collections::HashMap;

/// Offset of an interned atom name within the pool.
pub type AtomOffset = u32;

/// Atom names resolved once at engine startup and reused on every hot path.
#[derive(Debug, Clone, Copy)]
pub struct WellKnownAtoms {
    pub nil: AtomOffset,
    pub dot: AtomOffset,
    pub cut: AtomOffset,
    pub clause: AtomOffset,
    pub true_: AtomOffset,
    pub fail: AtomOffset,
    pub end_of_file: AtomOffset,
    pub lt: AtomOffset,
    pub eq: AtomOffset,
    pub gt: AtomOffset,
    pub anon: AtomOffset,
    pub sys_elapsed: AtomOffset,
    pub sys_queue: AtomOffset,
    /// `,`/2 — conjunction, split by the dispatcher itself rather than the
    /// built-in table so each conjunct gets its own `Cont` node.
    pub comma: AtomOffset,
    /// `;`/2 — disjunction, including the `->`/2-headed if-then-else form.
    pub semicolon: AtomOffset,
    pub arrow: AtomOffset,
    /// `\+`/1 — negation as failure.
    pub naf: AtomOffset,
    pub call: AtomOffset,
    pub catch: AtomOffset,
    pub throw: AtomOffset,
    /// `once`/1 — commit to the first solution of its argument.
    pub once: AtomOffset,
    /// `^`/2 — existential quantification, stripped by `bagof`/`setof`
    /// before running the inner goal.
    pub caret: AtomOffset,
    /// `bagof`/3 — recognized directly by the dispatcher rather than the
    /// built-in table since a free-variable grouping retry needs the
    /// current continuation to build its choice point.
    pub bagof: AtomOffset,
    pub setof: AtomOffset,
}

/// Append-only `(name -> offset)` interner.
///
/// Lookup by offset is O(1) pointer arithmetic into the pool; lookup by name
/// is a hash-map probe kept only as an internal acceleration over the
/// spec-mandated linear scan — it does not change any observable behavior,
/// since interning remains idempotent and offsets remain stable.
#[derive(Debug, Clone)]
pub struct AtomTable {
    pool: Vec<u8>,
    by_name: HashMap<Box<str>, AtomOffset>,
}

impl AtomTable {
    pub fn new() -> Self {
        Self {
            pool: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Return the existing offset for `name`, interning it if this is the
    /// first occurrence.
    pub fn intern(&mut self, name: &str) -> AtomOffset {
        if let Some(&offset) = self.by_name.get(name) {
            return offset;
        }
        let offset = self.pool.len() as AtomOffset;
        self.pool.extend_from_slice(name.as_bytes());
        self.pool.push(0);
        self.by_name.insert(name.into(), offset);
        offset
    }

    /// Query without inserting.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<AtomOffset> {
        self.by_name.get(name).copied()
    }

    /// Resolve the NUL-terminated name stored at `offset`.
    ///
    /// # Panics
    /// Panics if `offset` does not point at the start of an interned name —
    /// every caller obtains offsets exclusively from [`AtomTable::intern`].
    #[must_use]
    pub fn name(&self, offset: AtomOffset) -> &str {
        let start = offset as usize;
        let end = self.pool[start..]
            .iter()
            .position(|&b| b == 0)
            .map(|i| start + i)
            .expect("atom offset must point at a NUL-terminated name");
        std::str::from_utf8(&self.pool[start..end]).expect("atom pool is valid UTF-8")
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl Default for AtomTable {
    fn default() -> Self {
        Self::new()
    }
}

impl WellKnownAtoms {
    pub(crate) fn resolve(atoms: &mut AtomTable) -> Self {
        Self {
            nil: atoms.intern("[]"),
            dot: atoms.intern("."),
            cut: atoms.intern("!"),
            clause: atoms.intern(":-"),
            true_: atoms.intern("true"),
            fail: atoms.intern("fail"),
            end_of_file: atoms.intern("end_of_file"),
            lt: atoms.intern("<"),
            eq: atoms.intern("="),
            gt: atoms.intern(">"),
            anon: atoms.intern("_"),
            sys_elapsed: atoms.intern("$sys_elapsed"),
            sys_queue: atoms.intern("$sys_queue"),
            comma: atoms.intern(","),
            semicolon: atoms.intern(";"),
            arrow: atoms.intern("->"),
            naf: atoms.intern("\\+"),
            call: atoms.intern("call"),
            catch: atoms.intern("catch"),
            throw: atoms.intern("throw"),
            once: atoms.intern("once"),
            caret: atoms.intern("^"),
            bagof: atoms.intern("bagof"),
            setof: atoms.intern("setof"),
        }
    }
}
