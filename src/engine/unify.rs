//! Unification of two cell subtrees that may live in different backing
//! stores (a clause template, the heap) and reference variables bound
//! anywhere in the frame store.
//!
//! Entry point mirrors spec §4.5's `unify(p1, ctx1, p2, ctx2) -> bool`: each
//! side is a [`Ref`] pairing an address with the frame its local variable
//! numbers resolve against.

use crate::engine::addr::{CodeAddr, Ref};
use crate::engine::cell::{Cell, Payload, Tag};
use crate::engine::clause::ClauseStore;
use crate::engine::frame::FrameStore;
use crate::engine::heap::Heap;
use crate::engine::term::Term;
use crate::engine::trail::Trail;

pub struct UnifyCtx<'a> {
    pub clauses: &'a ClauseStore,
    pub heap: &'a Heap,
    pub frames: &'a mut FrameStore,
    pub trail: &'a mut Trail,
}

impl<'a> UnifyCtx<'a> {
    pub(crate) fn cell_at(&self, r: Ref) -> Cell {
        match r.addr {
            CodeAddr::Clause(clause, offset) => {
                self.clauses
                    .get(clause)
                    .expect("clause referenced by a live choice point or frame is never erased")
                    .term
                    .cells[offset]
                    .clone()
            }
            CodeAddr::Heap(offset) => self.heap.get(offset).clone(),
        }
    }

    pub(crate) fn children(&self, r: Ref) -> Vec<Ref> {
        match r.addr {
            CodeAddr::Clause(clause, offset) => {
                let cells = &self.clauses.get(clause).unwrap().term.cells;
                Term::child_offsets(cells, offset)
                    .into_iter()
                    .map(|o| Ref::new(CodeAddr::Clause(clause, o), r.frame))
                    .collect()
            }
            CodeAddr::Heap(offset) => Term::child_offsets(self.heap.all(), offset)
                .into_iter()
                .map(|o| Ref::heap(o, r.frame))
                .collect(),
        }
    }

    fn global_slot(&self, r: Ref, cell: &Cell) -> u32 {
        match (r.addr, cell.payload) {
            (CodeAddr::Clause(..), Payload::Var(local)) => self.frames.frame(r.frame).base + local,
            (CodeAddr::Heap(_), Payload::Var(global)) => global,
            _ => unreachable!("global_slot called on a non-variable cell"),
        }
    }

    /// Resolve `r` past any variable bindings and `Indirect` hops. Returns
    /// the grounded `(ref, cell)` pair, or the representative global slot
    /// number if the chain bottoms out at an unbound variable.
    pub(crate) fn deref(&self, r: Ref) -> Result<(Ref, Cell), u32> {
        let cell = self.cell_at(r);
        match cell.tag {
            Tag::Indirect => {
                let Payload::Indirect(next) = cell.payload else { unreachable!() };
                self.deref(next)
            }
            Tag::Var => {
                let slot = self.global_slot(r, &cell);
                let resolved = self.frames.deref(Cell::var(slot));
                match resolved.tag {
                    Tag::Var => {
                        let Payload::Var(rep) = resolved.payload else { unreachable!() };
                        Err(rep)
                    }
                    Tag::Indirect => {
                        let Payload::Indirect(next) = resolved.payload else { unreachable!() };
                        self.deref(next)
                    }
                    _ => Ok((r, resolved)),
                }
            }
            _ => Ok((r, cell)),
        }
    }

    fn bind_var_to_var(&mut self, newer: u32, older: u32) {
        self.trail.push(newer);
        self.frames.bind(newer, Cell::var(older));
    }

    fn bind_var_to_value(&mut self, slot: u32, r: Ref, val: &Cell) {
        self.trail.push(slot);
        if val.is_structure() {
            self.frames.bind(slot, Cell::indirect(r));
        } else {
            self.frames.bind(slot, val.clone());
        }
    }
}

/// Unify the subterms at `a` and `b`, recording every binding made on the
/// trail so a later `unwind_to` can undo exactly this call's work.
///
/// Returns `false` (leaving any bindings already made — the caller unwinds
/// to its choice point's trail mark on failure, per spec §4.5) on mismatch.
pub fn unify(ctx: &mut UnifyCtx, a: Ref, b: Ref) -> bool {
    let da = ctx.deref(a);
    let db = ctx.deref(b);
    match (da, db) {
        (Err(sa), Err(sb)) => {
            if sa == sb {
                return true;
            }
            // Bind the more recently allocated (numerically larger) slot to
            // the older one, approximating "bind to the older context" when
            // slot numbers are allocated monotonically.
            let (older, newer) = if sa < sb { (sa, sb) } else { (sb, sa) };
            ctx.bind_var_to_var(newer, older);
            true
        }
        (Err(slot), Ok((r, val))) | (Ok((r, val)), Err(slot)) => {
            ctx.bind_var_to_value(slot, r, &val);
            true
        }
        (Ok((ra, val_a)), Ok((rb, val_b))) => unify_values(ctx, ra, &val_a, rb, &val_b),
    }
}

fn unify_values(ctx: &mut UnifyCtx, ra: Ref, a: &Cell, rb: Ref, b: &Cell) -> bool {
    match (a.tag, b.tag) {
        (Tag::Literal, Tag::Literal) => {
            let (ka, kb) = (a.functor_key(), b.functor_key());
            if ka != kb {
                return false;
            }
            if a.arity == 0 {
                return true;
            }
            let (children_a, children_b) = (ctx.children(ra), ctx.children(rb));
            children_a
                .into_iter()
                .zip(children_b)
                .all(|(ca, cb)| unify(ctx, ca, cb))
        }
        (Tag::Int, Tag::Int) => a.payload == b.payload,
        (Tag::Float, Tag::Float) => matches!(
            (a.payload, b.payload),
            (Payload::Float(x), Payload::Float(y)) if x == y
        ),
        (Tag::Str, Tag::Str) => a.payload == b.payload,
        _ => false,
    }
}

/// Walk the live term at `r`, dereferencing every variable it contains, and
/// produce a standalone [`Term`] with fresh, frame-independent local variable
/// numbers (repeated occurrences of the same global slot share one fresh
/// local slot). Used to detach a value from the frame/heap it currently
/// lives in — a thrown ball must survive the rollback that unwinding to its
/// `catch/3` point performs, and `findall`'s collected template must survive
/// the backtracking that runs the next candidate solution.
#[must_use]
pub fn deep_clone(ctx: &UnifyCtx, r: Ref) -> Term {
    let mut cells = Vec::new();
    let mut renumber: std::collections::HashMap<u32, u32> = std::collections::HashMap::new();
    let mut next_local = 0u32;
    walk(ctx, r, &mut cells, &mut renumber, &mut next_local);
    Term::new(cells, next_local)
}

fn walk(
    ctx: &UnifyCtx,
    r: Ref,
    out: &mut Vec<Cell>,
    renumber: &mut std::collections::HashMap<u32, u32>,
    next_local: &mut u32,
) {
    match ctx.deref(r) {
        Err(slot) => {
            let local = *renumber.entry(slot).or_insert_with(|| {
                let l = *next_local;
                *next_local += 1;
                l
            });
            out.push(Cell::var(local));
        }
        Ok((rr, cell)) => match cell.tag {
            Tag::Literal if cell.arity > 0 => {
                let mark = out.len();
                out.push(cell.clone());
                for child in ctx.children(rr) {
                    walk(ctx, child, out, renumber, next_local);
                }
                let span = (out.len() - mark) as u32;
                out[mark].nbr_cells = span;
            }
            _ => out.push(cell),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::atoms::AtomTable;
    use crate::engine::cell::Cell;

    fn ctx<'a>(
        clauses: &'a ClauseStore,
        heap: &'a Heap,
        frames: &'a mut FrameStore,
        trail: &'a mut Trail,
    ) -> UnifyCtx<'a> {
        UnifyCtx { clauses, heap, frames, trail }
    }

    #[test]
    fn ground_atoms_unify_iff_equal() {
        let mut atoms = AtomTable::new();
        let foo = atoms.intern("foo");
        let bar = atoms.intern("bar");
        let clauses = ClauseStore::new();
        let mut heap = Heap::new();
        let mut frames = FrameStore::new();
        let mut trail = Trail::new();
        let a = Ref::heap(heap.alloc_one(Cell::atom(foo)), 0);
        let b = Ref::heap(heap.alloc_one(Cell::atom(foo)), 0);
        let c = Ref::heap(heap.alloc_one(Cell::atom(bar)), 0);
        assert!(unify(&mut ctx(&clauses, &heap, &mut frames, &mut trail), a, b));
        assert!(!unify(&mut ctx(&clauses, &heap, &mut frames, &mut trail), a, c));
    }

    #[test]
    fn unbound_var_binds_to_ground_value() {
        let clauses = ClauseStore::new();
        let mut heap = Heap::new();
        let mut frames = FrameStore::new();
        let mut trail = Trail::new();
        frames.push_frame(1, 0, crate::engine::cont::Cont::done());
        let var = Ref::heap(heap.alloc_one(Cell::var(0)), 0);
        let val = Ref::heap(heap.alloc_one(Cell::int(42)), 0);
        assert!(unify(&mut ctx(&clauses, &heap, &mut frames, &mut trail), var, val));
        assert_eq!(frames.get_slot(0), &Cell::int(42));
        assert_eq!(trail.len(), 1);
    }

    #[test]
    fn two_unbound_vars_link_newer_to_older() {
        let clauses = ClauseStore::new();
        let mut heap = Heap::new();
        let mut frames = FrameStore::new();
        let mut trail = Trail::new();
        frames.push_frame(2, 0, crate::engine::cont::Cont::done());
        let addr0 = Ref::heap(heap.alloc_one(Cell::var(0)), 0);
        let addr1 = Ref::heap(heap.alloc_one(Cell::var(1)), 0);
        assert!(unify(&mut ctx(&clauses, &heap, &mut frames, &mut trail), addr0, addr1));
        assert_eq!(frames.get_slot(1), &Cell::var(0));
    }

    #[test]
    fn mismatched_structures_fail() {
        let mut atoms = AtomTable::new();
        let f = atoms.intern("f");
        let g = atoms.intern("g");
        let clauses = ClauseStore::new();
        let mut heap = Heap::new();
        let mut frames = FrameStore::new();
        let mut trail = Trail::new();
        let fa = heap.alloc([Cell::functor(f, 1), Cell::int(1)]);
        heap.get_mut(fa).nbr_cells = 2;
        let ga = heap.alloc([Cell::functor(g, 1), Cell::int(1)]);
        heap.get_mut(ga).nbr_cells = 2;
        assert!(!unify(
            &mut ctx(&clauses, &heap, &mut frames, &mut trail),
            Ref::heap(fa, 0),
            Ref::heap(ga, 0)
        ));
    }

    #[test]
    fn variable_bound_to_compound_stores_an_indirect_ref() {
        let mut atoms = AtomTable::new();
        let f = atoms.intern("f");
        let clauses = ClauseStore::new();
        let mut heap = Heap::new();
        let mut frames = FrameStore::new();
        let mut trail = Trail::new();
        frames.push_frame(1, 0, crate::engine::cont::Cont::done());
        let structure = heap.alloc([Cell::functor(f, 1), Cell::int(7)]);
        heap.get_mut(structure).nbr_cells = 2;
        let var = Ref::heap(heap.alloc_one(Cell::var(0)), 0);
        assert!(unify(
            &mut ctx(&clauses, &heap, &mut frames, &mut trail),
            var,
            Ref::heap(structure, 0)
        ));
        assert!(frames.get_slot(0).is_indirect());
    }

    #[test]
    fn deep_clone_renumbers_shared_variable_to_one_fresh_local_slot() {
        let mut atoms = AtomTable::new();
        let f = atoms.intern("f");
        let clauses = ClauseStore::new();
        let mut heap = Heap::new();
        let mut frames = FrameStore::new();
        let mut trail = Trail::new();
        frames.push_frame(1, 0, crate::engine::cont::Cont::done());
        let structure = heap.alloc([
            Cell::functor(f, 2),
            Cell::var(0),
            Cell::var(0),
        ]);
        heap.get_mut(structure).nbr_cells = 3;
        let term = deep_clone(&ctx(&clauses, &heap, &mut frames, &mut trail), Ref::heap(structure, 0));
        assert_eq!(term.nbr_vars, 1);
        assert_eq!(term.cells[1], Cell::var(0));
        assert_eq!(term.cells[2], Cell::var(0));
    }

    #[test]
    fn deep_clone_leaves_ground_term_structurally_equal() {
        let mut atoms = AtomTable::new();
        let f = atoms.intern("f");
        let clauses = ClauseStore::new();
        let mut heap = Heap::new();
        let mut frames = FrameStore::new();
        let mut trail = Trail::new();
        let structure = heap.alloc([Cell::functor(f, 1), Cell::int(7)]);
        heap.get_mut(structure).nbr_cells = 2;
        let term = deep_clone(&ctx(&clauses, &heap, &mut frames, &mut trail), Ref::heap(structure, 0));
        assert_eq!(term.nbr_vars, 0);
        assert!(term.validate_nbr_cells());
        assert_eq!(term.cells[1], Cell::int(7));
    }
}
