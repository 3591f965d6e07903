//! The explicit goal continuation: "what remains to execute."
//!
//! Spec §4.4 models a frame's continuation as a single saved `curr_cell`,
//! which works in the original because a clause body's conjunctions are
//! walked by repeatedly advancing `curr_cell` within one frame. This engine
//! instead represents "the rest of the computation" as its own persistent
//! list so that a called predicate's body can resume directly into its
//! caller's remaining goals without the two needing to share a frame —
//! the continuation-passing reading of SLD resolution. `Rc` makes capturing
//! the current continuation in a choice point (for retry) and restoring it
//! on backtrack an O(1) clone rather than a deep copy.

use std::rc::Rc;

use crate::engine::addr::Ref;

#[derive(Debug, Clone)]
pub enum Cont {
    /// Nothing left to run: the query has succeeded.
    Done,
    /// Run the goal at `Ref` (in its own frame's context), then `Rc<Cont>`.
    Goal(Ref, Rc<Cont>),
    /// Not a Prolog-visible goal: cut the choice stack to this mark, then
    /// continue into the rest. Used to commit `->`'s condition once it
    /// succeeds (discarding both its own choice points and the `;`
    /// alternative) without that commit being a separate callable goal.
    CutTo(usize, Rc<Cont>),
}

impl Cont {
    #[must_use]
    pub fn done() -> Rc<Cont> {
        Rc::new(Cont::Done)
    }

    #[must_use]
    pub fn push(goal: Ref, rest: Rc<Cont>) -> Rc<Cont> {
        Rc::new(Cont::Goal(goal, rest))
    }

    #[must_use]
    pub fn cut_to(mark: usize, rest: Rc<Cont>) -> Rc<Cont> {
        Rc::new(Cont::CutTo(mark, rest))
    }
}
