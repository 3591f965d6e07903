//! The execution engine: module table, configuration, and the embedding API
//! that builds a [`dispatch::Query`] and drives it to solutions.

pub mod addr;
pub mod atoms;
pub mod build;
pub mod builtins;
pub mod cell;
pub mod choice;
pub mod clause;
pub mod cont;
pub mod dispatch;
pub mod error;
pub mod findall;
pub mod frame;
pub mod heap;
pub mod module;
pub mod order;
pub mod persist;
pub mod task;
pub mod term;
pub mod trail;
pub mod unify;

use std::collections::HashMap;
use std::io::{BufRead, Write};

use log::{debug, error, info};

use crate::engine::atoms::AtomTable;
use crate::engine::builtins::BuiltinTable;
use crate::engine::dispatch::Query;
use crate::engine::module::Module;
use crate::engine::persist::Record;
use crate::engine::term::Term;

pub use error::EngineError;

/// Whether the dispatcher collapses a clause's last call into its caller's
/// frame (tail-call optimization) or leaves every call its own frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OptLevel {
    Off,
    Tco,
}

/// Engine-wide knobs, set once at construction and shared read-only by
/// every [`dispatch::Query`] run against it.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Log each goal dispatch at `trace` level.
    pub trace: bool,
    /// Suppress `info`-level startup/shutdown logging.
    pub quiet: bool,
    /// Track and log per-query choice-point/unification counters.
    pub stats: bool,
    /// Reject built-ins and constructs outside the ISO reference subset.
    pub iso_only: bool,
    pub opt_level: OptLevel,
    /// Ceiling on live choice points before a query aborts with a
    /// `resource_error`.
    pub max_choice_depth: usize,
    /// Ceiling on heap bytes a single query's arena may grow to.
    pub max_arena_bytes: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            trace: false,
            quiet: false,
            stats: false,
            iso_only: false,
            opt_level: OptLevel::Tco,
            max_choice_depth: 1_000_000,
            max_arena_bytes: 256 * 1024 * 1024,
        }
    }
}

/// The top-level embedding handle: an atom table, a builtin registry built
/// once, and the module namespace(s) clauses live in.
pub struct Engine {
    atoms: AtomTable,
    config: EngineConfig,
    builtins: BuiltinTable,
    modules: HashMap<String, Module>,
    halted: bool,
    halt_code: i32,
}

impl Engine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let mut atoms = AtomTable::new();
        let builtins = builtins::registry(&mut atoms);
        let mut modules = HashMap::new();
        modules.insert("user".to_string(), Module::new("user"));
        if !config.quiet {
            info!("engine initialized, iso_only={}", config.iso_only);
        }
        Self { atoms, config, builtins, modules, halted: false, halt_code: 0 }
    }

    #[must_use]
    pub fn atoms(&mut self) -> &mut AtomTable {
        &mut self.atoms
    }

    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Get-or-create the named module.
    pub fn module(&mut self, name: &str) -> &mut Module {
        self.modules.entry(name.to_string()).or_insert_with(|| Module::new(name))
    }

    pub fn get_module(&self, name: &str) -> Result<&Module, EngineError> {
        self.modules.get(name).ok_or_else(|| EngineError::UnknownModule(name.to_string()))
    }

    /// Run `goal` against `module`'s clause store, calling `on_solution`
    /// once per solution found with the query and the `Ref` `goal` was
    /// instantiated at (deref/`children` it to read back bindings).
    /// `on_solution` returns `true` to backtrack for another solution,
    /// `false` to stop early.
    pub fn run(
        &mut self,
        module: &str,
        goal: &Term,
        mut on_solution: impl FnMut(&mut Query, crate::engine::addr::Ref) -> bool,
    ) -> Result<(), EngineError> {
        if !self.modules.contains_key(module) {
            return Err(EngineError::UnknownModule(module.to_string()));
        }
        if !goal.validate_nbr_cells() {
            return Err(EngineError::MalformedTerm);
        }
        let module_entry = self.modules.get_mut(module).unwrap();
        let mut query = Query::new(&mut self.atoms, &mut module_entry.clauses, &self.config, &self.builtins);
        let goal_ref = query.start(goal);
        let mut more = query.first().map_err(EngineError::Uncaught)?;
        while more {
            if !on_solution(&mut query, goal_ref) {
                break;
            }
            more = query.redo().map_err(EngineError::Uncaught)?;
        }
        Ok(())
    }

    /// Replay a persistence log, applying every record in file order to
    /// `module`'s clause store.
    pub fn persist_replay(&mut self, module: &str, r: impl BufRead) -> Result<usize, EngineError> {
        let records = persist::read_log(r, &mut self.atoms).map_err(EngineError::Persistence)?;
        let clause_atom = self.atoms.intern(":-");
        let module_entry = self.module(module);
        let mut applied = 0;
        for record in &records {
            match record {
                Record::Asserta { uuid, term } => {
                    module_entry.clauses.asserta_with_uuid(term.clone(), clause_atom, *uuid);
                }
                Record::Assertz { uuid, term } => {
                    module_entry.clauses.assertz_with_uuid(term.clone(), clause_atom, *uuid);
                }
                Record::Erase { uuid } => {
                    module_entry.clauses.erase_by_uuid(*uuid);
                }
            }
            applied += 1;
        }
        debug!("replayed {applied} persistence records into module {module}");
        Ok(applied)
    }

    /// Write every live clause of `module` to `w` as a sequence of `assertz`
    /// records, in clause order.
    pub fn persist_save(&mut self, module: &str, w: &mut impl Write) -> Result<usize, EngineError> {
        let atoms = &self.atoms;
        let module_entry = self.get_module(module)?;
        let mut written = 0;
        for clause in module_entry.clauses.iter_live() {
            let record = Record::Assertz { uuid: clause.uuid, term: clause.term.clone() };
            persist::write_record(w, atoms, &record).map_err(|e| EngineError::Persistence(e.to_string()))?;
            written += 1;
        }
        Ok(written)
    }

    pub fn halt(&mut self, code: i32) {
        if !self.config.quiet {
            error!("halt({code})");
        }
        self.halted = true;
        self.halt_code = code;
    }

    #[must_use]
    pub fn is_halted(&self) -> bool {
        self.halted
    }

    #[must_use]
    pub fn halt_code(&self) -> i32 {
        self.halt_code
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::cell::Cell;

    #[test]
    fn run_on_an_unknown_module_errors() {
        let mut engine = Engine::new(EngineConfig::default());
        let goal = Term::new(vec![Cell::atom(engine.atoms().intern("true"))], 0);
        let result = engine.run("nope", &goal, |_, _| false);
        assert!(matches!(result, Err(EngineError::UnknownModule(_))));
    }

    #[test]
    fn run_true_succeeds_exactly_once() {
        let mut engine = Engine::new(EngineConfig::default());
        let true_atom = engine.atoms().intern("true");
        let goal = Term::new(vec![Cell::atom(true_atom)], 0);
        let mut count = 0;
        engine.run("user", &goal, |_, _| {
            count += 1;
            true
        }).unwrap();
        assert_eq!(count, 1);
    }

    #[test]
    fn run_fail_succeeds_zero_times() {
        let mut engine = Engine::new(EngineConfig::default());
        let fail_atom = engine.atoms().intern("fail");
        let goal = Term::new(vec![Cell::atom(fail_atom)], 0);
        let mut count = 0;
        engine.run("user", &goal, |_, _| {
            count += 1;
            true
        }).unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn halt_records_code() {
        let mut engine = Engine::new(EngineConfig::default());
        engine.halt(2);
        assert!(engine.is_halted());
        assert_eq!(engine.halt_code(), 2);
    }
}
