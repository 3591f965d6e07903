//! The fixed-width tagged term cell: the universal carrier for every value
//! and sub-term in the engine.

use bitflags::bitflags;
use num_enum::TryFromPrimitive;

use crate::engine::addr::Ref;
use crate::engine::atoms::AtomOffset;
use crate::engine::clause::FunctorKey;

/// Discriminant for [`Cell`]'s payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, TryFromPrimitive)]
#[repr(u8)]
pub enum Tag {
    /// Unbound-and-forgotten marker left behind by backtracking.
    Empty = 0,
    /// A logic variable, referencing a slot by local index.
    Var = 1,
    /// An atom or compound functor, named by an interned atom offset.
    Literal = 2,
    /// A string (list-of-codes sugar / double-quoted text).
    Str = 3,
    /// An arbitrary-precision-free rational; integers are `(n, 1)`.
    Int = 4,
    /// An IEEE-754 double.
    Float = 5,
    /// A pointer to a cell living elsewhere on the heap.
    Indirect = 6,
    /// Marks the end of a clause body / return continuation.
    End = 7,
}

bitflags! {
    /// Per-cell flags. Mirrors the bitset described in spec §3, trimmed to
    /// the subset this engine's core actually consults; stream/operator
    /// bookkeeping belongs to the (out-of-scope) parser and I/O layer and is
    /// carried here only as opaque bits they may set.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct CellFlags: u16 {
        /// The cell's `(name, arity)` resolved to a built-in at cross-reference time.
        const BUILTIN       = 1 << 0;
        /// Integer literal was written in hex.
        const HEX           = 1 << 1;
        /// Integer literal was written in octal.
        const OCTAL         = 1 << 2;
        /// Integer literal was written in binary.
        const BINARY        = 1 << 3;
        /// Last goal cell of a clause body.
        const TAIL          = 1 << 4;
        /// Last goal of a clause body whose functor matches the clause head
        /// (a tail-recursive call site — the TCO precondition).
        const TAILREC       = 1 << 5;
        /// String payload is stored inline rather than heap-owned.
        const SMALL_STRING  = 1 << 6;
        /// String payload is a non-owning slice into a larger buffer.
        const SLICE         = 1 << 7;
        /// Integer payload is a stream-table index.
        const STREAM        = 1 << 8;
        /// Marked for removal by a `bagof`/`setof` partition pass.
        const DELETED       = 1 << 9;
        /// First textual occurrence of a variable name (parser bookkeeping).
        const FIRST_USE     = 1 << 10;
        /// String payload must never be freed (points into program data).
        const CONST_STRING  = 1 << 11;
        /// `End` cell marks a return continuation rather than a plain terminator.
        const RETURN        = 1 << 12;
    }
}

/// The value payload, discriminated by [`Tag`].
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    /// Slot index: clause-relative (`0..nbr_vars`) if the cell lives in a
    /// stored clause template, or global if it lives on the heap. Which
    /// applies depends on the [`crate::engine::frame::CodeAddr`] variant the
    /// cell was read through.
    Var(u32),
    /// Interned atom offset naming the literal / functor.
    Literal(AtomOffset),
    Str(Box<str>),
    /// Rational `numerator / denominator`; integers carry `denominator == 1`.
    Int { num: i64, den: i64 },
    Float(f64),
    /// A variable bound to a compound subterm living in the clause store or
    /// the heap, rather than copied in place.
    Indirect(Ref),
}

/// A single node in a pre-order term tree.
///
/// Invariant (spec §3 "Key invariants" #1): `nbr_cells == 1 +
/// sum(children[i].nbr_cells)`; for a leaf `nbr_cells == 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    pub tag: Tag,
    pub arity: u8,
    pub flags: CellFlags,
    pub nbr_cells: u32,
    pub payload: Payload,
}

impl Cell {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            tag: Tag::Empty,
            arity: 0,
            flags: CellFlags::empty(),
            nbr_cells: 1,
            payload: Payload::Empty,
        }
    }

    #[must_use]
    pub fn var(slot: u32) -> Self {
        Self {
            tag: Tag::Var,
            arity: 0,
            flags: CellFlags::empty(),
            nbr_cells: 1,
            payload: Payload::Var(slot),
        }
    }

    #[must_use]
    pub fn atom(offset: AtomOffset) -> Self {
        Self {
            tag: Tag::Literal,
            arity: 0,
            flags: CellFlags::empty(),
            nbr_cells: 1,
            payload: Payload::Literal(offset),
        }
    }

    /// A functor cell heading a compound term; `nbr_cells` must be filled in
    /// by the caller once the subtree is fully laid out (see
    /// [`crate::engine::term::TermBuf::close_functor`]).
    #[must_use]
    pub fn functor(offset: AtomOffset, arity: u8) -> Self {
        Self {
            tag: Tag::Literal,
            arity,
            flags: CellFlags::empty(),
            nbr_cells: 1,
            payload: Payload::Literal(offset),
        }
    }

    #[must_use]
    pub fn int(n: i64) -> Self {
        Self {
            tag: Tag::Int,
            arity: 0,
            flags: CellFlags::empty(),
            nbr_cells: 1,
            payload: Payload::Int { num: n, den: 1 },
        }
    }

    #[must_use]
    pub fn rational(num: i64, den: i64) -> Self {
        debug_assert_ne!(den, 0);
        Self {
            tag: Tag::Int,
            arity: 0,
            flags: CellFlags::empty(),
            nbr_cells: 1,
            payload: Payload::Int { num, den },
        }
    }

    #[must_use]
    pub fn float(f: f64) -> Self {
        Self {
            tag: Tag::Float,
            arity: 0,
            flags: CellFlags::empty(),
            nbr_cells: 1,
            payload: Payload::Float(f),
        }
    }

    #[must_use]
    pub fn string(s: impl Into<Box<str>>) -> Self {
        Self {
            tag: Tag::Str,
            arity: 0,
            flags: CellFlags::empty(),
            nbr_cells: 1,
            payload: Payload::Str(s.into()),
        }
    }

    #[must_use]
    pub fn indirect(target: Ref) -> Self {
        Self {
            tag: Tag::Indirect,
            arity: 0,
            flags: CellFlags::empty(),
            nbr_cells: 1,
            payload: Payload::Indirect(target),
        }
    }

    #[must_use]
    pub fn end() -> Self {
        Self {
            tag: Tag::End,
            arity: 0,
            flags: CellFlags::empty(),
            nbr_cells: 1,
            payload: Payload::Empty,
        }
    }

    #[must_use]
    pub fn is_var(&self) -> bool {
        self.tag == Tag::Var
    }

    #[must_use]
    pub fn is_empty_cell(&self) -> bool {
        self.tag == Tag::Empty
    }

    #[must_use]
    pub fn is_indirect(&self) -> bool {
        self.tag == Tag::Indirect
    }

    #[must_use]
    pub fn is_literal(&self) -> bool {
        self.tag == Tag::Literal
    }

    #[must_use]
    pub fn is_atom(&self) -> bool {
        matches!(self.tag, Tag::Literal) && self.arity == 0
    }

    #[must_use]
    pub fn is_structure(&self) -> bool {
        matches!(self.tag, Tag::Literal) && self.arity > 0
    }

    #[must_use]
    pub fn is_number(&self) -> bool {
        matches!(self.tag, Tag::Int | Tag::Float)
    }

    #[must_use]
    pub fn is_end(&self) -> bool {
        self.tag == Tag::End
    }

    /// `(atom_offset, arity)` key, valid only for literal/structure cells.
    #[must_use]
    pub fn functor_key(&self) -> Option<FunctorKey> {
        match self.payload {
            Payload::Literal(offset) if self.tag == Tag::Literal => {
                Some(FunctorKey::new(offset, self.arity))
            }
            _ => None,
        }
    }
}
