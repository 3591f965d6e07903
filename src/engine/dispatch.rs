//! The SLD-resolution dispatcher: the main loop that turns a goal plus its
//! continuation into solutions, failure, or a thrown ball.
//!
//! Spec §4.6 describes one big `switch` over the current cell driven by a
//! saved `curr_cell`/`curr_frame` pair. This engine instead drives an
//! explicit state machine (`DriverState`) over [`crate::engine::cont::Cont`],
//! so a clause body's continuation can point directly into its caller's
//! remaining goals rather than needing both to share one frame's `curr_cell`.

use std::rc::Rc;

use crate::engine::atoms::{AtomTable, WellKnownAtoms};
use crate::engine::builtins::BuiltinTable;
use crate::engine::cell::{Cell, Payload, Tag};
use crate::engine::choice::{Alternative, ChoicePoint, ChoiceStack};
use crate::engine::clause::{ClauseId, ClauseStore, FunctorKey};
use crate::engine::cont::Cont;
use crate::engine::error::{FormalError, PrologError};
use crate::engine::frame::FrameStore;
use crate::engine::heap::Heap;
use crate::engine::term::Term;
use crate::engine::trail::Trail;
use crate::engine::unify::{self, unify, UnifyCtx};
use crate::engine::EngineConfig;
use crate::engine::OptLevel;
use crate::engine::addr::{CodeAddr, Ref};

/// Where the dispatcher is within one step of solving a query.
#[derive(Debug, Clone)]
pub enum DriverState {
    /// Run `goal`, then resume `cont`.
    Run { goal: Ref, cont: Rc<Cont> },
    /// Pop the next retryable choice point and resume there.
    Backtrack,
    /// No more work; every choice point has been exhausted.
    Finished,
}

enum DriveOutcome {
    Next(DriverState),
    Solution,
    Fail,
    Throw(PrologError),
}

/// One running query: the frame/trail/choice-point/heap state private to it,
/// plus borrowed access to the module it runs against. Built fresh per
/// top-level query by [`crate::engine::Engine`]; `first`/`redo` drive it to
/// successive solutions.
pub struct Query<'a> {
    pub atoms: &'a mut AtomTable,
    pub well_known: WellKnownAtoms,
    pub clauses: &'a mut ClauseStore,
    pub config: &'a EngineConfig,
    pub builtins: &'a BuiltinTable,
    pub heap: Heap,
    pub frames: FrameStore,
    pub choices: ChoiceStack,
    pub trail: Trail,
    state: DriverState,
}

impl<'a> Query<'a> {
    #[must_use]
    pub fn new(
        atoms: &'a mut AtomTable,
        clauses: &'a mut ClauseStore,
        config: &'a EngineConfig,
        builtins: &'a BuiltinTable,
    ) -> Self {
        let well_known = WellKnownAtoms::resolve(atoms);
        Self {
            atoms,
            well_known,
            clauses,
            config,
            builtins,
            heap: Heap::new(),
            frames: FrameStore::new(),
            choices: ChoiceStack::new(),
            trail: Trail::new(),
            state: DriverState::Finished,
        }
    }

    /// Install `goal` (a standalone term, locally-numbered variables) as the
    /// query to run and ready the driver at its first step. Returns the
    /// heap `Ref` the goal was instantiated at, so a caller can later deref
    /// into its argument variables to read back bindings once a solution is
    /// found — the driver itself discards this ref once the goal succeeds.
    pub fn start(&mut self, goal: &Term) -> Ref {
        let r = self.instantiate(&goal.cells, goal.nbr_vars);
        self.state = DriverState::Run { goal: r, cont: Cont::done() };
        r
    }

    /// Rebuild a `Query` around state previously taken out by
    /// [`Query::into_parts`] — how [`crate::engine::task::TaskRuntime`]
    /// resumes a suspended task's solve against a freshly borrowed
    /// atom/clause/builtin set each time it gets a turn.
    #[must_use]
    pub(crate) fn from_parts(
        atoms: &'a mut AtomTable,
        well_known: WellKnownAtoms,
        clauses: &'a mut ClauseStore,
        config: &'a EngineConfig,
        builtins: &'a BuiltinTable,
        heap: Heap,
        frames: FrameStore,
        choices: ChoiceStack,
        trail: Trail,
        state: DriverState,
    ) -> Self {
        Self { atoms, well_known, clauses, config, builtins, heap, frames, choices, trail, state }
    }

    /// Tear a `Query` back down into its owned, engine-independent pieces so
    /// a caller can hold onto them across turns without holding this
    /// `Query`'s borrow of the engine open.
    pub(crate) fn into_parts(self) -> (Heap, FrameStore, ChoiceStack, Trail, DriverState) {
        (self.heap, self.frames, self.choices, self.trail, self.state)
    }

    /// Drive to the next solution. `Ok(true)` means a solution was found —
    /// bindings are visible via `self.frames` until the next `redo`/drop.
    /// `Ok(false)` means every alternative is exhausted.
    pub fn first(&mut self) -> Result<bool, PrologError> {
        self.drive(0)
    }

    /// Resume backtracking for the next solution after a prior `Ok(true)`.
    pub fn redo(&mut self) -> Result<bool, PrologError> {
        self.state = DriverState::Backtrack;
        self.drive(0)
    }

    fn drive(&mut self, floor: usize) -> Result<bool, PrologError> {
        loop {
            let state = std::mem::replace(&mut self.state, DriverState::Finished);
            let outcome = match state {
                DriverState::Finished => return Ok(false),
                DriverState::Backtrack => self.do_backtrack(floor),
                DriverState::Run { goal, cont } => self.advance(goal, cont),
            };
            match outcome {
                DriveOutcome::Next(next) => self.state = next,
                DriveOutcome::Solution => {
                    self.state = DriverState::Backtrack;
                    return Ok(true);
                }
                DriveOutcome::Fail => self.state = DriverState::Backtrack,
                DriveOutcome::Throw(e) => {
                    self.state = DriverState::Finished;
                    return Err(e);
                }
            }
        }
    }

    /// Run `goal` to its first solution, then always roll back every
    /// binding and choice point it made — the bounded sub-solve `\+/1`,
    /// `once/1` and if-then-else's condition-commit need.
    pub(crate) fn solve_once(&mut self, goal: Ref) -> Result<bool, PrologError> {
        let floor = self.choices.mark();
        let heap_mark = self.heap.mark();
        let slot_mark = self.frames.slot_mark();
        let frame_mark = self.frames.frame_mark();
        let trail_mark = self.trail.mark();
        let saved = std::mem::replace(&mut self.state, DriverState::Run { goal, cont: Cont::done() });
        let result = self.drive(floor);
        self.choices.cut_to(floor);
        self.heap.rollback(heap_mark);
        self.frames.rollback_slots(slot_mark);
        self.frames.rollback_frames(frame_mark);
        self.unwind_trail(trail_mark);
        self.state = saved;
        result
    }

    /// Run `goal` to exhaustion, invoking `on_solution` once per solution
    /// before backtracking for the next one, then roll back every binding
    /// and choice point the whole enumeration made — the all-solutions
    /// collectors (`findall/3`, `bagof/3`, `setof/3`) need exactly this: a
    /// bounded sub-computation whose side effects on the caller's state are
    /// limited to whatever `on_solution` copies out.
    pub(crate) fn for_each_solution(
        &mut self,
        goal: Ref,
        mut on_solution: impl FnMut(&mut Query),
    ) -> Result<(), PrologError> {
        let floor = self.choices.mark();
        let heap_mark = self.heap.mark();
        let slot_mark = self.frames.slot_mark();
        let frame_mark = self.frames.frame_mark();
        let trail_mark = self.trail.mark();
        let saved = std::mem::replace(&mut self.state, DriverState::Run { goal, cont: Cont::done() });
        let mut result = Ok(());
        loop {
            match self.drive(floor) {
                Ok(true) => on_solution(self),
                Ok(false) => break,
                Err(e) => {
                    result = Err(e);
                    break;
                }
            }
        }
        self.choices.cut_to(floor);
        self.heap.rollback(heap_mark);
        self.frames.rollback_slots(slot_mark);
        self.frames.rollback_frames(frame_mark);
        self.unwind_trail(trail_mark);
        self.state = saved;
        result
    }

    pub(crate) fn unwind_trail(&mut self, mark: usize) {
        let frames = &mut self.frames;
        self.trail.unwind_to(mark, |slot| frames.bind(slot, Cell::empty()));
    }

    pub(crate) fn unify_ctx(&mut self) -> UnifyCtx<'_> {
        UnifyCtx { clauses: &*self.clauses, heap: &self.heap, frames: &mut self.frames, trail: &mut self.trail }
    }

    /// Materialize the term currently reachable at `r` (following every
    /// bound variable) into a standalone, freshly-renumbered [`Term`] — the
    /// embedding API's way to read a binding back out of a solution, once
    /// [`Query::first`]/[`Query::redo`] returns `Ok(true)`.
    pub fn resolve(&mut self, r: Ref) -> Term {
        let ctx = self.unify_ctx();
        unify::deep_clone(&ctx, r)
    }

    /// Push a standalone cell stream (locally-numbered variables) onto the
    /// heap, allocating `nbr_vars` fresh global slots for it.
    pub(crate) fn instantiate(&mut self, cells: &[Cell], nbr_vars: u32) -> Ref {
        let frame_idx = self.frames.push_frame(nbr_vars, self.choices.mark() as u32, Cont::done());
        let base = self.frames.frame(frame_idx).base;
        let remapped: Vec<Cell> = cells.iter().map(|c| remap_var(c, base)).collect();
        let offset = self.heap.alloc(remapped);
        Ref::heap(offset, frame_idx)
    }

    fn instantiation_error(&mut self) -> PrologError {
        FormalError::InstantiationError.into_ball(self.atoms, None)
    }

    fn type_error(&mut self, expected: &'static str, culprit: Cell) -> PrologError {
        FormalError::TypeError { expected, culprit }.into_ball(self.atoms, None)
    }

    fn existence_error(&mut self, kind: &'static str, key: FunctorKey) -> PrologError {
        FormalError::ExistenceError { kind, culprit: key }.into_ball(self.atoms, None)
    }

    fn resume(&mut self, cont: Rc<Cont>) -> DriveOutcome {
        match &*cont {
            Cont::Done => DriveOutcome::Solution,
            Cont::Goal(g, rest) => DriveOutcome::Next(DriverState::Run { goal: *g, cont: rest.clone() }),
            Cont::CutTo(mark, rest) => {
                self.choices.cut_to(*mark);
                let rest = rest.clone();
                self.resume(rest)
            }
        }
    }

    fn capture_marks(&self) -> (usize, usize, usize, usize) {
        (self.heap.mark(), self.frames.slot_mark(), self.frames.frame_mark(), self.trail.mark())
    }

    fn push_point(&mut self, frame_idx: usize, marks: (usize, usize, usize, usize), alt: Alternative) {
        self.choices.push(ChoicePoint {
            heap_mark: marks.0,
            slot_mark: marks.1,
            frame_mark: marks.2,
            trail_mark: marks.3,
            frame_idx,
            pin_mask: 0,
            alt,
        });
    }

    /// As [`Query::unwind_trail`], but slots whose bit is set in `pin_mask`
    /// (relative to `base`) are left bound — a `Groups` retry is about to
    /// rebind them to the next partition's witness anyway.
    fn unwind_trail_pinned(&mut self, mark: usize, base: u32, pin_mask: u32) {
        let frames = &mut self.frames;
        self.trail.unwind_to(mark, |slot| {
            let bit = slot.wrapping_sub(base);
            if bit < 32 && (pin_mask >> bit) & 1 == 1 {
                return;
            }
            frames.bind(slot, Cell::empty());
        });
    }

    fn do_backtrack(&mut self, floor: usize) -> DriveOutcome {
        let Some(point) = self.choices.pop_retryable_floor(floor) else { return DriveOutcome::Fail };
        self.heap.rollback(point.heap_mark);
        self.frames.rollback_slots(point.slot_mark);
        self.frames.rollback_frames(point.frame_mark);
        match point.alt {
            Alternative::Clauses { goal, remaining, rest } => {
                self.unwind_trail(point.trail_mark);
                self.attempt_predicate(goal, remaining, rest, point.frame_idx)
            }
            Alternative::Disjunct { goal, rest } => {
                self.unwind_trail(point.trail_mark);
                DriveOutcome::Next(DriverState::Run { goal, cont: rest })
            }
            Alternative::Groups { free_vars, list, remaining, rest } => {
                let base = self.frames.frame(point.frame_idx).base;
                self.unwind_trail_pinned(point.trail_mark, base, point.pin_mask);
                self.attempt_groups(point.frame_idx, free_vars, list, remaining, rest)
            }
            Alternative::Catch { .. } | Alternative::Barrier => {
                unreachable!("pop_retryable_floor only returns retryable alternatives")
            }
        }
    }

    /// Unwind the choice stack looking for a `catch/3` whose catcher unifies
    /// with `ball`. Ignores `floor`: an exception propagates through a
    /// bounded sub-solve's own choice points into whatever enclosing `catch`
    /// exists below it.
    fn unwind_to_catch(&mut self, ball: PrologError) -> DriveOutcome {
        loop {
            let Some(point) = self.choices.pop() else { return DriveOutcome::Throw(ball) };
            self.heap.rollback(point.heap_mark);
            self.frames.rollback_slots(point.slot_mark);
            self.frames.rollback_frames(point.frame_mark);
            self.unwind_trail(point.trail_mark);
            if let Alternative::Catch { catcher, recovery, rest } = point.alt {
                let ball_ref = self.instantiate(&ball.ball, ball.nbr_vars());
                if unify(&mut self.unify_ctx(), catcher, ball_ref) {
                    return DriveOutcome::Next(DriverState::Run { goal: recovery, cont: rest });
                }
                self.unwind_trail(point.trail_mark);
            }
        }
    }

    fn advance(&mut self, goal: Ref, cont: Rc<Cont>) -> DriveOutcome {
        let (r, cell) = match self.unify_ctx().deref(goal) {
            Ok(pair) => pair,
            Err(_) => return DriveOutcome::Throw(self.instantiation_error()),
        };
        if !cell.is_atom() && !cell.is_structure() {
            return DriveOutcome::Throw(self.type_error("callable", cell));
        }
        let key = cell.functor_key().unwrap();
        let wk = self.well_known;

        if key.atom == wk.comma && key.arity == 2 {
            let children = self.unify_ctx().children(r);
            let rest = Cont::push(children[1], cont);
            return DriveOutcome::Next(DriverState::Run { goal: children[0], cont: rest });
        }
        if key.atom == wk.cut && key.arity == 0 {
            let frame = self.frames.frame(r.frame);
            self.choices.cut_to(frame.cut_barrier as usize);
            return self.resume(cont);
        }
        if key.atom == wk.true_ && key.arity == 0 {
            return self.resume(cont);
        }
        if key.atom == wk.fail && key.arity == 0 {
            return DriveOutcome::Fail;
        }
        if key.atom == wk.semicolon && key.arity == 2 {
            return self.dispatch_disjunction(r, cont);
        }
        if key.atom == wk.naf && key.arity == 1 {
            let g = self.unify_ctx().children(r)[0];
            return match self.solve_once(g) {
                Ok(true) => DriveOutcome::Fail,
                Ok(false) => self.resume(cont),
                Err(e) => DriveOutcome::Throw(e),
            };
        }
        if key.atom == wk.once && key.arity == 1 {
            let g = self.unify_ctx().children(r)[0];
            return match self.solve_once(g) {
                Ok(true) => self.resume(cont),
                Ok(false) => DriveOutcome::Fail,
                Err(e) => DriveOutcome::Throw(e),
            };
        }
        if key.atom == wk.call && (1..=8).contains(&key.arity) {
            let children = self.unify_ctx().children(r);
            let goal2 = match self.build_call_goal(children[0], &children[1..]) {
                Ok(g) => g,
                Err(e) => return DriveOutcome::Throw(e),
            };
            let marks = self.capture_marks();
            self.push_point(r.frame, marks, Alternative::Barrier);
            return DriveOutcome::Next(DriverState::Run { goal: goal2, cont });
        }
        if key.atom == wk.catch && key.arity == 3 {
            let children = self.unify_ctx().children(r);
            let marks = self.capture_marks();
            self.push_point(
                r.frame,
                marks,
                Alternative::Catch { catcher: children[1], recovery: children[2], rest: cont.clone() },
            );
            return DriveOutcome::Next(DriverState::Run { goal: children[0], cont });
        }
        if key.atom == wk.throw && key.arity == 1 {
            let arg = self.unify_ctx().children(r)[0];
            let ctx = self.unify_ctx();
            let term = unify::deep_clone(&ctx, arg);
            return self.unwind_to_catch(PrologError::from(term));
        }
        if (key.atom == wk.bagof || key.atom == wk.setof) && key.arity == 3 {
            let is_setof = key.atom == wk.setof;
            let children = self.unify_ctx().children(r);
            return self.bagof_setof(children[0], children[1], children[2], is_setof, r.frame, cont);
        }

        if let Some(f) = self.builtins.get(&key).copied() {
            let args = self.unify_ctx().children(r);
            return match f(self, &args) {
                Ok(true) => self.resume(cont),
                Ok(false) => DriveOutcome::Fail,
                Err(e) => DriveOutcome::Throw(e),
            };
        }

        if !self.clauses.has_predicate(key) {
            return DriveOutcome::Throw(self.existence_error("procedure", key));
        }
        let first_arg = if key.arity > 0 {
            let children = self.unify_ctx().children(r);
            match self.unify_ctx().deref(children[0]) {
                Ok((_, c)) => Some(c),
                Err(_) => None,
            }
        } else {
            None
        };
        let candidates = self.clauses.candidates(key, first_arg.as_ref());
        self.attempt_predicate(r, candidates, cont, r.frame)
    }

    fn dispatch_disjunction(&mut self, r: Ref, cont: Rc<Cont>) -> DriveOutcome {
        let children = self.unify_ctx().children(r);
        let (left, right) = (children[0], children[1]);
        let left_deref = self.unify_ctx().deref(left);
        if let Ok((lr, lcell)) = left_deref {
            if lcell.functor_key() == Some(FunctorKey::new(self.well_known.arrow, 2)) {
                let cond_children = self.unify_ctx().children(lr);
                let (cond, then) = (cond_children[0], cond_children[1]);
                let barrier = self.choices.mark();
                let marks = self.capture_marks();
                self.push_point(r.frame, marks, Alternative::Disjunct { goal: right, rest: cont.clone() });
                let then_cont = Cont::cut_to(barrier, Cont::push(then, cont));
                return DriveOutcome::Next(DriverState::Run { goal: cond, cont: then_cont });
            }
        }
        let marks = self.capture_marks();
        self.push_point(r.frame, marks, Alternative::Disjunct { goal: right, rest: cont.clone() });
        DriveOutcome::Next(DriverState::Run { goal: left, cont })
    }

    /// `bagof/3`/`setof/3`: group `goal`'s solutions by its free variables
    /// (grounded on `examples/original_source/builtins.c`'s `fn_bagof`/
    /// `fn_setof`), then unify `list` with the first group's items,
    /// leaving a [`Alternative::Groups`] choice point to hand back the rest
    /// one at a time on backtracking.
    fn bagof_setof(
        &mut self,
        template: Ref,
        goal: Ref,
        list: Ref,
        is_setof: bool,
        frame_idx: usize,
        cont: Rc<Cont>,
    ) -> DriveOutcome {
        let grouped = crate::engine::findall::compute_groups(self, template, goal, is_setof);
        let (free_vars, groups) = match grouped {
            Ok(Some(pair)) => pair,
            Ok(None) => {
                let results = match crate::engine::findall::collect_simple(self, template, goal, is_setof) {
                    Ok(r) => r,
                    Err(e) => return DriveOutcome::Throw(e),
                };
                if results.is_empty() {
                    return DriveOutcome::Fail;
                }
                let list_term = merge_into_list(self.well_known.dot, self.well_known.nil, results);
                let built = self.instantiate(&list_term.cells, list_term.nbr_vars);
                return if unify(&mut self.unify_ctx(), list, built) {
                    self.resume(cont)
                } else {
                    DriveOutcome::Fail
                };
            }
            Err(e) => return DriveOutcome::Throw(e),
        };
        if groups.is_empty() {
            return DriveOutcome::Fail;
        }
        let remaining: std::collections::VecDeque<_> = groups.into();
        self.attempt_groups(frame_idx, Rc::new(free_vars), list, remaining, cont)
    }

    /// Try each remaining group in order, unifying its witness values
    /// against `free_vars` and its items against `list`. Leaves a retry
    /// point behind (with a pin mask covering `free_vars`' slots, so a
    /// later backtrack into it doesn't unbind them only to immediately
    /// rebind them) when more than one group remains.
    fn attempt_groups(
        &mut self,
        frame_idx: usize,
        free_vars: Rc<Vec<(u32, Ref)>>,
        list: Ref,
        mut remaining: std::collections::VecDeque<(Vec<Term>, Vec<Term>)>,
        rest: Rc<Cont>,
    ) -> DriveOutcome {
        while let Some((witness, items)) = remaining.pop_front() {
            let heap_mark = self.heap.mark();
            let slot_mark = self.frames.slot_mark();
            let frame_mark = self.frames.frame_mark();
            let trail_mark = self.trail.mark();
            if self.unify_group(&free_vars, &witness, list, items) {
                if !remaining.is_empty() {
                    let base = self.frames.frame(frame_idx).base;
                    let mut pin_mask = 0u32;
                    for &(slot, _) in free_vars.iter() {
                        let bit = slot.wrapping_sub(base);
                        if bit < 32 {
                            pin_mask |= 1 << bit;
                        }
                    }
                    self.choices.push(ChoicePoint {
                        heap_mark,
                        slot_mark,
                        frame_mark,
                        trail_mark,
                        frame_idx,
                        pin_mask,
                        alt: Alternative::Groups {
                            free_vars: free_vars.clone(),
                            list,
                            remaining,
                            rest: rest.clone(),
                        },
                    });
                }
                return self.resume(rest);
            }
            self.unwind_trail(trail_mark);
            self.heap.rollback(heap_mark);
            self.frames.rollback_frames(frame_mark);
            self.frames.rollback_slots(slot_mark);
        }
        DriveOutcome::Fail
    }

    fn unify_group(&mut self, free_vars: &[(u32, Ref)], witness: &[Term], list: Ref, items: Vec<Term>) -> bool {
        for (&(_, fv), w) in free_vars.iter().zip(witness) {
            let built = self.instantiate(&w.cells, w.nbr_vars);
            if !unify(&mut self.unify_ctx(), fv, built) {
                return false;
            }
        }
        let merged = merge_into_list(self.well_known.dot, self.well_known.nil, items);
        let built = self.instantiate(&merged.cells, merged.nbr_vars);
        unify(&mut self.unify_ctx(), list, built)
    }

    /// Build `Goal` extended with `extra` trailing arguments (`call/N`,
    /// `N>1`), by deep-cloning every argument into one standalone term with
    /// a shared, freshly renumbered variable space.
    fn build_call_goal(&mut self, inner: Ref, extra: &[Ref]) -> Result<Ref, PrologError> {
        if extra.is_empty() {
            return Ok(inner);
        }
        let (ir, icell) = self.unify_ctx().deref(inner).map_err(|_| self.instantiation_error())?;
        if !icell.is_atom() && !icell.is_structure() {
            return Err(self.type_error("callable", icell));
        }
        let key = icell.functor_key().unwrap();
        let mut parts: Vec<Term> = Vec::with_capacity(key.arity as usize + extra.len());
        for child in self.unify_ctx().children(ir) {
            let ctx = self.unify_ctx();
            parts.push(unify::deep_clone(&ctx, child));
        }
        for &e in extra {
            let ctx = self.unify_ctx();
            parts.push(unify::deep_clone(&ctx, e));
        }
        let new_arity = key.arity + extra.len() as u8;
        let combined = merge_into_compound(key.atom, new_arity, parts);
        Ok(self.instantiate(&combined.cells, combined.nbr_vars))
    }

    fn attempt_predicate(
        &mut self,
        goal: Ref,
        remaining: Vec<ClauseId>,
        rest: Rc<Cont>,
        calling_frame_idx: usize,
    ) -> DriveOutcome {
        let heap_mark = self.heap.mark();
        let slot_mark = self.frames.slot_mark();
        let frame_mark = self.frames.frame_mark();
        let trail_mark = self.trail.mark();
        let total = remaining.len();
        let goal_children = self.unify_ctx().children(goal);

        for (i, &id) in remaining.iter().enumerate() {
            let Some(clause) = self.clauses.get(id).cloned() else { continue };
            let is_last = i == total - 1;
            let frame = self.frames.frame(calling_frame_idx);
            let can_tco = matches!(self.config.opt_level, OptLevel::Tco)
                && is_last
                && frame.cut_barrier == self.choices.mark() as u32
                && Rc::ptr_eq(&rest, &frame.entry_cont);

            let tentative_frame_idx = if can_tco {
                self.frames.reuse(calling_frame_idx, clause.term.nbr_vars, rest.clone());
                calling_frame_idx
            } else {
                self.frames.push_frame(clause.term.nbr_vars, self.choices.mark() as u32, rest.clone())
            };

            let head_offsets = Term::child_offsets(&clause.term.cells, clause.head_at);
            let mut ok = true;
            for (&ga, &ho) in goal_children.iter().zip(head_offsets.iter()) {
                let ha = Ref::new(CodeAddr::Clause(id, ho), tentative_frame_idx);
                if !unify(&mut self.unify_ctx(), ga, ha) {
                    ok = false;
                    break;
                }
            }

            if ok {
                if !is_last {
                    let left: Vec<ClauseId> = remaining[i + 1..].to_vec();
                    self.choices.push(ChoicePoint {
                        heap_mark,
                        slot_mark,
                        frame_mark,
                        trail_mark,
                        frame_idx: calling_frame_idx,
                        pin_mask: 0,
                        alt: Alternative::Clauses { goal, remaining: left, rest: rest.clone() },
                    });
                }
                return match clause.body_at {
                    Some(b) => DriveOutcome::Next(DriverState::Run {
                        goal: Ref::in_clause(id, b, tentative_frame_idx),
                        cont: rest,
                    }),
                    None => self.resume(rest),
                };
            }

            self.unwind_trail(trail_mark);
            self.heap.rollback(heap_mark);
            if !can_tco {
                self.frames.rollback_frames(frame_mark);
                self.frames.rollback_slots(slot_mark);
            }
        }
        DriveOutcome::Fail
    }
}

fn remap_var(cell: &Cell, base: u32) -> Cell {
    match (cell.tag, &cell.payload) {
        (Tag::Var, Payload::Var(local)) => Cell::var(base + local),
        _ => cell.clone(),
    }
}

/// Merge independently-numbered standalone terms into one compound's
/// argument list, renumbering each part's variables by a running offset so
/// distinct parts never collide on the same local slot.
pub(crate) fn merge_into_compound(atom: crate::engine::atoms::AtomOffset, arity: u8, parts: Vec<Term>) -> Term {
    let mut cells = vec![Cell::functor(atom, arity)];
    let mut total_vars = 0u32;
    for part in parts {
        let offset = total_vars;
        total_vars += part.nbr_vars;
        cells.extend(part.cells.into_iter().map(|c| remap_var(&c, offset)));
    }
    cells[0].nbr_cells = cells.len() as u32;
    Term::new(cells, total_vars)
}

/// Merge independently-numbered standalone terms into a canonical Prolog
/// list, renumbering as [`merge_into_compound`] does — `findall`'s result
/// list and similar "collect a bag of terms" builtins share this shape.
pub(crate) fn merge_into_list(
    dot: crate::engine::atoms::AtomOffset,
    nil: crate::engine::atoms::AtomOffset,
    parts: Vec<Term>,
) -> Term {
    let mut total_vars = 0u32;
    let items: Vec<Vec<Cell>> = parts
        .into_iter()
        .map(|part| {
            let offset = total_vars;
            total_vars += part.nbr_vars;
            part.cells.into_iter().map(|c| remap_var(&c, offset)).collect()
        })
        .collect();
    let mut buf = crate::engine::term::TermBuf::new();
    crate::engine::term::build_list(&mut buf, dot, nil, items);
    buf.finish(total_vars)
}
