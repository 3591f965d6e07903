//! The standard order of terms: `Var < Number < Atom < String < Compound`,
//! used by `setof/3`'s sort and by first-argument indexing's tie-breaking.
//!
//! Comparison operates on fully-materialized, already-dereferenced cell
//! streams (the snapshots `copy_term` and `findall` produce), so it never
//! needs to cross into the frame store or heap to resolve a variable.

use std::cmp::Ordering;

use crate::engine::atoms::AtomTable;
use crate::engine::cell::{Cell, Payload, Tag};
use crate::engine::term::Term;

fn rank(tag: Tag) -> u8 {
    match tag {
        Tag::Var => 0,
        Tag::Float | Tag::Int => 1,
        Tag::Literal => 2,
        Tag::Str => 3,
        Tag::Empty | Tag::Indirect | Tag::End => 4,
    }
}

fn number_value(cell: &Cell) -> f64 {
    match cell.payload {
        Payload::Int { num, den } => num as f64 / den as f64,
        Payload::Float(f) => f,
        _ => unreachable!("number_value called on a non-numeric cell"),
    }
}

/// Compare the subtrees rooted at `a[at_a]` and `b[at_b]`.
#[must_use]
pub fn compare_at(atoms: &AtomTable, a: &[Cell], at_a: usize, b: &[Cell], at_b: usize) -> Ordering {
    let (ca, cb) = (&a[at_a], &b[at_b]);
    let (ra, rb) = (rank(ca.tag), rank(cb.tag));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match ca.tag {
        Tag::Var => match (&ca.payload, &cb.payload) {
            (Payload::Var(x), Payload::Var(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
        Tag::Int | Tag::Float => number_value(ca)
            .partial_cmp(&number_value(cb))
            .unwrap_or(Ordering::Equal),
        Tag::Str => match (&ca.payload, &cb.payload) {
            (Payload::Str(x), Payload::Str(y)) => x.cmp(y),
            _ => Ordering::Equal,
        },
        Tag::Literal => {
            // Arity first, then functor name, then children left to right —
            // matching the usual Prolog standard-order tie-break.
            match ca.arity.cmp(&cb.arity) {
                Ordering::Equal => {}
                other => return other,
            }
            let (ka, kb) = (ca.functor_key().unwrap(), cb.functor_key().unwrap());
            match atoms.name(ka.atom).cmp(atoms.name(kb.atom)) {
                Ordering::Equal => {}
                other => return other,
            }
            let children_a = Term::child_offsets(a, at_a);
            let children_b = Term::child_offsets(b, at_b);
            for (&ca_off, &cb_off) in children_a.iter().zip(children_b.iter()) {
                match compare_at(atoms, a, ca_off, b, cb_off) {
                    Ordering::Equal => continue,
                    other => return other,
                }
            }
            Ordering::Equal
        }
        Tag::Empty | Tag::Indirect | Tag::End => Ordering::Equal,
    }
}

#[must_use]
pub fn compare(atoms: &AtomTable, a: &Term, b: &Term) -> Ordering {
    compare_at(atoms, &a.cells, 0, &b.cells, 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::term::TermBuf;

    #[test]
    fn numbers_precede_atoms_precede_compounds() {
        let mut atoms = AtomTable::new();
        let a = atoms.intern("a");
        let f = atoms.intern("f");

        let mut n = TermBuf::new();
        n.push_leaf(Cell::int(1));
        let n = n.finish(0);

        let mut atom = TermBuf::new();
        atom.push_leaf(Cell::atom(a));
        let atom = atom.finish(0);

        let mut compound = TermBuf::new();
        let mark = compound.open_functor(Cell::functor(f, 1));
        compound.push_leaf(Cell::int(1));
        compound.close_functor(mark);
        let compound = compound.finish(0);

        assert_eq!(compare(&atoms, &n, &atom), Ordering::Less);
        assert_eq!(compare(&atoms, &atom, &compound), Ordering::Less);
    }

    #[test]
    fn compounds_compare_by_arity_then_name_then_children() {
        let mut atoms = AtomTable::new();
        let f = atoms.intern("f");
        let g = atoms.intern("g");

        let mut lhs = TermBuf::new();
        let mark = lhs.open_functor(Cell::functor(f, 1));
        lhs.push_leaf(Cell::int(1));
        lhs.close_functor(mark);
        let lhs = lhs.finish(0);

        let mut rhs = TermBuf::new();
        let mark = rhs.open_functor(Cell::functor(g, 1));
        rhs.push_leaf(Cell::int(1));
        rhs.close_functor(mark);
        let rhs = rhs.finish(0);

        assert_eq!(compare(&atoms, &lhs, &rhs), Ordering::Less);
    }
}
