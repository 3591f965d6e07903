//! The reference built-in predicate table.
//!
//! Spec §4.7 ties a built-in to a clause site by setting `CellFlags::BUILTIN`
//! on cross-reference and storing a function pointer inline on the cell.
//! This engine instead looks a call's `(name, arity)` up in a
//! [`BuiltinTable`] once per dispatch step — the table is built once at
//! [`crate::engine::Engine`] construction and shared read-only across every
//! query, so there is nothing per-cell to cross-reference.

mod arith;
mod control;
mod term_ops;

use std::collections::HashMap;

use crate::engine::addr::Ref;
use crate::engine::atoms::AtomTable;
use crate::engine::clause::FunctorKey;
use crate::engine::dispatch::Query;
use crate::engine::error::PrologError;

/// `Ok(true)` succeeds, `Ok(false)` fails, `Err` throws.
pub type BuiltinFn = fn(&mut Query, args: &[Ref]) -> Result<bool, PrologError>;

pub type BuiltinTable = HashMap<FunctorKey, BuiltinFn>;

/// Build the table of built-ins every [`crate::engine::Engine`] module
/// shares. Control constructs (`,`/2, `;`/2, `!`/0, `\+`/1, `call/N`,
/// `catch/3`, `throw/1`, `bagof/3`, `setof/3`) are recognized directly by
/// the dispatcher and never appear here — this table is only the ISO
/// reference subset that behaves like an ordinary deterministic (or
/// semi-deterministic) predicate call.
#[must_use]
pub fn registry(atoms: &mut AtomTable) -> BuiltinTable {
    let mut table = BuiltinTable::new();
    let mut add = |table: &mut BuiltinTable, name: &str, arity: u8, f: BuiltinFn| {
        table.insert(FunctorKey::new(atoms.intern(name), arity), f);
    };

    add(&mut table, "=", 2, control::unify2);
    add(&mut table, "\\=", 2, control::not_unifiable2);
    add(&mut table, "==", 2, control::equal2);
    add(&mut table, "\\==", 2, control::not_equal2);
    add(&mut table, "@<", 2, control::order_lt);
    add(&mut table, "@>", 2, control::order_gt);
    add(&mut table, "@=<", 2, control::order_le);
    add(&mut table, "@>=", 2, control::order_ge);
    add(&mut table, "var", 1, control::is_var);
    add(&mut table, "nonvar", 1, control::is_nonvar);
    add(&mut table, "atom", 1, control::is_atom);
    add(&mut table, "number", 1, control::is_number);
    add(&mut table, "atomic", 1, control::is_atomic);
    add(&mut table, "compound", 1, control::is_compound);
    add(&mut table, "callable", 1, control::is_callable);
    add(&mut table, "assertz", 1, control::assertz1);
    add(&mut table, "asserta", 1, control::asserta1);
    add(&mut table, "retract", 1, control::retract1);
    add(&mut table, "copy_term", 2, term_ops::copy_term2);

    add(&mut table, "is", 2, arith::is2);
    add(&mut table, "<", 2, arith::lt2);
    add(&mut table, ">", 2, arith::gt2);
    add(&mut table, "=<", 2, arith::le2);
    add(&mut table, ">=", 2, arith::ge2);
    add(&mut table, "=:=", 2, arith::num_eq2);
    add(&mut table, "=\\=", 2, arith::num_ne2);

    add(&mut table, "functor", 3, term_ops::functor3);
    add(&mut table, "arg", 3, term_ops::arg3);
    add(&mut table, "=..", 2, term_ops::univ2);

    add(&mut table, "findall", 3, crate::engine::findall::findall3);

    table
}
