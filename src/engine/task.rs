//! Cooperative task runtime: subqueries that share the module and atom pool
//! but keep their own frames/slots/choices/trail, scheduled round-robin by
//! one caller-driven pump rather than preemptively.
//!
//! Spec §4.9 describes suspension at `yield`/`send`/`recv`/timer points
//! *inside* a running goal. Reaching that granularity would mean threading a
//! new suspend-and-resume outcome through [`crate::engine::dispatch::Query`]'s
//! step loop, on top of its existing `Solution`/`Fail`/`Throw` outcomes. This
//! runtime instead schedules at the coarser grain of "one SLD solution": a
//! pump tick drives each ready task to its next solution (or exhaustion) via
//! [`crate::engine::dispatch::Query::first`]/[`crate::engine::dispatch::Query::redo`]
//! in full, and a task voluntarily yields the scheduler only *between* such
//! solutions, via [`TaskRuntime::yield_now`]. `sleep`/`delay` gate resumption
//! on a wall-clock deadline rather than within a solve.

use std::collections::VecDeque;
use std::time::Instant;

use log::{debug, trace, warn};

use crate::engine::atoms::{AtomTable, WellKnownAtoms};
use crate::engine::builtins::BuiltinTable;
use crate::engine::choice::ChoiceStack;
use crate::engine::clause::ClauseStore;
use crate::engine::dispatch::{DriverState, Query};
use crate::engine::error::PrologError;
use crate::engine::frame::FrameStore;
use crate::engine::heap::Heap;
use crate::engine::term::Term;
use crate::engine::trail::Trail;
use crate::engine::EngineConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// Eligible to run on the next pump tick.
    Ready,
    /// Suspended until the wall-clock deadline passes (`sleep`/`delay`).
    Waiting(Instant),
    /// Suspended until [`TaskRuntime::deliver`] gives it a message.
    AwaitingRecv,
    /// The task's goal is exhausted, threw uncaught, or was cancelled.
    Done,
}

/// One spawned subquery: the goal it is solving plus the backtracking state
/// that survives between pump ticks. Detached from the parent's own
/// heap/frames/choices/trail — per §4.9, a task's own state starts empty and
/// only the bindings the spawning goal's deep clone carried in are shared.
pub struct Task {
    pub id: TaskId,
    pub state: TaskState,
    started: bool,
    heap: Heap,
    frames: FrameStore,
    choices: ChoiceStack,
    trail: Trail,
    driver: DriverState,
    inbox: VecDeque<Term>,
    pub last_error: Option<PrologError>,
}

impl Task {
    #[must_use]
    pub fn is_done(&self) -> bool {
        matches!(self.state, TaskState::Done)
    }
}

/// The module-owned pump over every task spawned against it, plus the
/// mailbox a spawned task's `send/1` appends to and the parent's `recv/1`
/// drains (§4.9's "queue 0").
pub struct TaskRuntime {
    well_known: WellKnownAtoms,
    next_id: u64,
    tasks: Vec<Task>,
    parent_mailbox: VecDeque<Term>,
}

impl TaskRuntime {
    #[must_use]
    pub fn new(atoms: &mut AtomTable) -> Self {
        Self {
            well_known: WellKnownAtoms::resolve(atoms),
            next_id: 0,
            tasks: Vec::new(),
            parent_mailbox: VecDeque::new(),
        }
    }

    /// Spawn `goal` (deep-cloned from the caller's live bindings by the
    /// caller before calling this, via [`crate::engine::unify::deep_clone`],
    /// per §4.9's "transitively reachable slots" rule) as a fresh task.
    pub fn spawn(
        &mut self,
        goal: &Term,
        atoms: &mut AtomTable,
        clauses: &mut ClauseStore,
        config: &EngineConfig,
        builtins: &BuiltinTable,
    ) -> TaskId {
        let id = TaskId(self.next_id);
        self.next_id += 1;
        let mut query = Query::from_parts(
            atoms,
            self.well_known,
            clauses,
            config,
            builtins,
            Heap::new(),
            FrameStore::new(),
            ChoiceStack::new(),
            Trail::new(),
            DriverState::Finished,
        );
        query.start(goal);
        let (heap, frames, choices, trail, driver) = query.into_parts();
        debug!("task {} spawned", id.0);
        self.tasks.push(Task {
            id,
            state: TaskState::Ready,
            started: false,
            heap,
            frames,
            choices,
            trail,
            driver,
            inbox: VecDeque::new(),
            last_error: None,
        });
        id
    }

    /// Drive every `Ready` task one solution further, transitioning
    /// `Waiting` tasks whose deadline has passed back to `Ready` first.
    /// Returns the ids that reached a new solution or `Done` this tick.
    pub fn pump(
        &mut self,
        atoms: &mut AtomTable,
        clauses: &mut ClauseStore,
        config: &EngineConfig,
        builtins: &BuiltinTable,
    ) -> Vec<TaskId> {
        let now = Instant::now();
        for task in &mut self.tasks {
            if let TaskState::Waiting(deadline) = task.state {
                if now >= deadline {
                    task.state = TaskState::Ready;
                }
            }
        }

        let mut progressed = Vec::new();
        for task in &mut self.tasks {
            if task.state != TaskState::Ready {
                continue;
            }
            let heap = std::mem::take(&mut task.heap);
            let frames = std::mem::take(&mut task.frames);
            let choices = std::mem::take(&mut task.choices);
            let trail = std::mem::take(&mut task.trail);
            let driver = std::mem::replace(&mut task.driver, DriverState::Finished);
            let mut query = Query::from_parts(
                atoms, self.well_known, clauses, config, builtins, heap, frames, choices, trail, driver,
            );
            let result = if task.started { query.redo() } else { query.first() };
            task.started = true;
            let (heap, frames, choices, trail, driver) = query.into_parts();
            task.heap = heap;
            task.frames = frames;
            task.choices = choices;
            task.trail = trail;
            task.driver = driver;
            match result {
                Ok(true) => {
                    trace!("task {} yielded a solution", task.id.0);
                    progressed.push(task.id);
                }
                Ok(false) => {
                    task.state = TaskState::Done;
                    progressed.push(task.id);
                }
                Err(e) => {
                    warn!("task {} threw uncaught: {}", task.id.0, display_ball(&e));
                    task.last_error = Some(e);
                    task.state = TaskState::Done;
                    progressed.push(task.id);
                }
            }
        }
        progressed
    }

    /// Pump until every spawned task is `Done`.
    pub fn wait(
        &mut self,
        atoms: &mut AtomTable,
        clauses: &mut ClauseStore,
        config: &EngineConfig,
        builtins: &BuiltinTable,
    ) {
        while self.tasks.iter().any(|t| !t.is_done()) {
            self.pump(atoms, clauses, config, builtins);
        }
    }

    /// Pump until at least one task progresses (reached a solution, or
    /// finished), then return. Mirrors `await`'s "pump until one result".
    pub fn await_any(
        &mut self,
        atoms: &mut AtomTable,
        clauses: &mut ClauseStore,
        config: &EngineConfig,
        builtins: &BuiltinTable,
    ) -> Vec<TaskId> {
        loop {
            let progressed = self.pump(atoms, clauses, config, builtins);
            if !progressed.is_empty() {
                return progressed;
            }
            if self.tasks.iter().all(|t| t.is_done()) {
                return Vec::new();
            }
        }
    }

    /// A task voluntarily gives up its turn without advancing; it stays
    /// `Ready` and simply runs again on the next tick.
    pub fn yield_now(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            trace!("task {} yielded its turn", id.0);
            task.state = TaskState::Ready;
        }
    }

    /// Suspend `id` until `deadline` passes (`sleep`/`delay`).
    pub fn sleep_until(&mut self, id: TaskId, deadline: Instant) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.state = TaskState::Waiting(deadline);
        }
    }

    /// A spawned task delivering a result to the parent's mailbox
    /// (`send/1`'s target, per §4.9).
    pub fn send_to_parent(&mut self, term: Term) {
        self.parent_mailbox.push_back(term);
    }

    /// The parent's `recv/1`: pop the oldest undelivered message, if any.
    pub fn recv_from_children(&mut self) -> Option<Term> {
        self.parent_mailbox.pop_front()
    }

    /// Deliver a message directly to a specific task's own inbox and wake it
    /// if it was `AwaitingRecv`.
    pub fn deliver(&mut self, id: TaskId, term: Term) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.inbox.push_back(term);
            if task.state == TaskState::AwaitingRecv {
                task.state = TaskState::Ready;
            }
        }
    }

    pub fn task_recv(&mut self, id: TaskId) -> Option<Term> {
        self.tasks.iter_mut().find(|t| t.id == id).and_then(|t| t.inbox.pop_front())
    }

    pub fn mark_awaiting_recv(&mut self, id: TaskId) {
        if let Some(task) = self.tasks.iter_mut().find(|t| t.id == id) {
            task.state = TaskState::AwaitingRecv;
        }
    }

    #[must_use]
    pub fn get(&self, id: TaskId) -> Option<&Task> {
        self.tasks.iter().find(|t| t.id == id)
    }

    #[must_use]
    pub fn all_done(&self) -> bool {
        self.tasks.iter().all(|t| t.is_done())
    }
}

fn display_ball(err: &PrologError) -> String {
    format!("{} cells", err.ball.len())
}
