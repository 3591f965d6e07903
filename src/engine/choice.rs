//! The choice point stack: one entry per untried alternative, consulted on
//! failure to resume the most recent one (`retry_choice`) and truncated by
//! cut.

use std::collections::VecDeque;
use std::rc::Rc;

use crate::engine::addr::Ref;
use crate::engine::clause::ClauseId;
use crate::engine::cont::Cont;
use crate::engine::heap::HeapMark;
use crate::engine::term::Term;
use crate::engine::trail::TrailMark;

/// What kind of resumption a choice point represents.
#[derive(Debug, Clone)]
pub enum Alternative {
    /// Remaining clauses of a predicate to try against `goal`, followed by
    /// `rest` once one of them succeeds. `remaining` is in try-order,
    /// consumed from the front.
    Clauses { goal: Ref, remaining: Vec<ClauseId>, rest: Rc<Cont> },
    /// A single untried alternative goal, e.g. the right side of `;`/2 or an
    /// if-then-else's `Else` branch. Unlike `Clauses` there is nothing left
    /// to try after this one fires, so retrying it also pops the point.
    Disjunct { goal: Ref, rest: Rc<Cont> },
    /// A `catch/3` barrier: no alternative to retry, but failure/throw
    /// unwinds here so `catcher` can be matched against a thrown ball before
    /// the exception propagates further. `recovery` is run (with `rest` as
    /// its continuation) once a thrown ball unifies with `catcher`.
    Catch { catcher: Ref, recovery: Ref, rest: Rc<Cont> },
    /// An opaque call boundary (`call/1` and friends): cut inside the called
    /// goal must not prune choice points created before the call.
    Barrier,
    /// The remaining free-variable partitions of a `bagof`/`setof` solve:
    /// each entry pairs one partition's witness values (one term per entry
    /// in `free_vars`, same order) with that partition's already-grouped
    /// item list. Retrying unifies the next partition's witness and list
    /// against the same `free_vars`/`list` the first partition used.
    Groups {
        free_vars: Rc<Vec<(u32, Ref)>>,
        list: Ref,
        remaining: VecDeque<(Vec<Term>, Vec<Term>)>,
        rest: Rc<Cont>,
    },
}

#[derive(Debug, Clone)]
pub struct ChoicePoint {
    pub heap_mark: HeapMark,
    pub slot_mark: usize,
    pub frame_mark: usize,
    pub trail_mark: TrailMark,
    /// Frame this choice point resumes execution inside.
    pub frame_idx: usize,
    /// Bitmask, relative to `frame_idx`'s base slot, of variable slots a
    /// `Groups` retry rebinds immediately — backtracking into this point
    /// skips unbinding them rather than unbind-then-immediately-rebind.
    /// Unused (`0`) by every other alternative.
    pub pin_mask: u32,
    pub alt: Alternative,
}

#[derive(Debug, Default)]
pub struct ChoiceStack {
    points: Vec<ChoicePoint>,
}

impl ChoiceStack {
    #[must_use]
    pub fn new() -> Self {
        Self { points: Vec::new() }
    }

    #[must_use]
    pub fn mark(&self) -> usize {
        self.points.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn push(&mut self, point: ChoicePoint) {
        self.points.push(point);
    }

    /// Discard every choice point above `mark` — what a cut does.
    pub fn cut_to(&mut self, mark: usize) {
        self.points.truncate(mark);
    }

    #[must_use]
    pub fn top(&self) -> Option<&ChoicePoint> {
        self.points.last()
    }

    pub fn top_mut(&mut self) -> Option<&mut ChoicePoint> {
        self.points.last_mut()
    }

    pub fn pop(&mut self) -> Option<ChoicePoint> {
        self.points.pop()
    }

    /// Pop choice points from the top until one yields a further
    /// alternative to try, discarding exhausted clause lists and points that
    /// carry no retry at all (`Catch`, `Barrier` — they matter only for
    /// exception unwinding and cut scoping, not plain backtracking).
    pub fn pop_retryable(&mut self) -> Option<ChoicePoint> {
        self.pop_retryable_floor(0)
    }

    /// As [`ChoiceStack::pop_retryable`], but never pops past `floor` — the
    /// choice-stack height a bounded sub-solve (`\+/1`, `once/1`, an
    /// if-then-else condition) started at. Points below `floor` belong to
    /// the enclosing computation and are left untouched.
    pub fn pop_retryable_floor(&mut self, floor: usize) -> Option<ChoicePoint> {
        while self.points.len() > floor {
            let point = self.points.pop().expect("len() > floor implies non-empty");
            let retryable = match &point.alt {
                Alternative::Clauses { remaining, .. } => !remaining.is_empty(),
                Alternative::Disjunct { .. } => true,
                Alternative::Groups { remaining, .. } => !remaining.is_empty(),
                Alternative::Catch { .. } | Alternative::Barrier => false,
            };
            if retryable {
                return Some(point);
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn point(alt: Alternative) -> ChoicePoint {
        ChoicePoint { heap_mark: 0, slot_mark: 0, frame_mark: 0, trail_mark: 0, frame_idx: 0, pin_mask: 0, alt }
    }

    fn dummy_goal() -> Ref {
        Ref::heap(0, 0)
    }

    #[test]
    fn cut_to_discards_points_above_mark() {
        let mut stack = ChoiceStack::new();
        stack.push(point(Alternative::Barrier));
        let mark = stack.mark();
        stack.push(point(Alternative::Barrier));
        stack.push(point(Alternative::Barrier));
        stack.cut_to(mark);
        assert_eq!(stack.mark(), mark);
    }

    #[test]
    fn pop_retryable_skips_exhausted_clause_points() {
        let mut stack = ChoiceStack::new();
        stack.push(point(Alternative::Clauses {
            goal: dummy_goal(),
            remaining: vec![],
            rest: Cont::done(),
        }));
        stack.push(point(Alternative::Clauses {
            goal: dummy_goal(),
            remaining: vec![ClauseId(1)],
            rest: Cont::done(),
        }));
        let retried = stack.pop_retryable().expect("one retryable point left");
        assert!(
            matches!(retried.alt, Alternative::Clauses { remaining, .. } if remaining == vec![ClauseId(1)])
        );
        assert!(stack.is_empty());
    }

    #[test]
    fn pop_retryable_skips_catch_and_barrier_points() {
        let mut stack = ChoiceStack::new();
        stack.push(point(Alternative::Disjunct { goal: dummy_goal(), rest: Cont::done() }));
        stack.push(point(Alternative::Barrier));
        stack.push(point(Alternative::Catch {
            catcher: dummy_goal(),
            recovery: dummy_goal(),
            rest: Cont::done(),
        }));
        let retried = stack.pop_retryable().expect("disjunct beneath the barriers is retryable");
        assert!(matches!(retried.alt, Alternative::Disjunct { .. }));
        assert!(stack.is_empty());
    }

    #[test]
    fn pop_retryable_skips_exhausted_groups_points() {
        let mut stack = ChoiceStack::new();
        stack.push(point(Alternative::Groups {
            free_vars: Rc::new(vec![]),
            list: dummy_goal(),
            remaining: VecDeque::new(),
            rest: Cont::done(),
        }));
        stack.push(point(Alternative::Groups {
            free_vars: Rc::new(vec![]),
            list: dummy_goal(),
            remaining: VecDeque::from(vec![(vec![], vec![])]),
            rest: Cont::done(),
        }));
        let retried = stack.pop_retryable().expect("one retryable point left");
        assert!(matches!(retried.alt, Alternative::Groups { remaining, .. } if remaining.len() == 1));
        assert!(stack.is_empty());
    }
}
