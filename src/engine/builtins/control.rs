//! Term-identity, type-checking and database-mutation built-ins.

use std::cmp::Ordering;

use crate::engine::addr::Ref;
use crate::engine::cell::Cell;
use crate::engine::clause::FunctorKey;
use crate::engine::dispatch::Query;
use crate::engine::error::{FormalError, PrologError};
use crate::engine::order;
use crate::engine::unify::{self, unify};

pub fn unify2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(unify(&mut q.unify_ctx(), args[0], args[1]))
}

pub fn not_unifiable2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    let trail_mark = q.trail.mark();
    let ok = unify(&mut q.unify_ctx(), args[0], args[1]);
    q.unwind_trail(trail_mark);
    Ok(!ok)
}

fn compare_terms(q: &mut Query, a: Ref, b: Ref) -> Ordering {
    let ta = {
        let ctx = q.unify_ctx();
        unify::deep_clone(&ctx, a)
    };
    let tb = {
        let ctx = q.unify_ctx();
        unify::deep_clone(&ctx, b)
    };
    order::compare(q.atoms, &ta, &tb)
}

pub fn equal2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(compare_terms(q, args[0], args[1]) == Ordering::Equal)
}

pub fn not_equal2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(compare_terms(q, args[0], args[1]) != Ordering::Equal)
}

pub fn order_lt(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(compare_terms(q, args[0], args[1]) == Ordering::Less)
}

pub fn order_gt(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(compare_terms(q, args[0], args[1]) == Ordering::Greater)
}

pub fn order_le(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(compare_terms(q, args[0], args[1]) != Ordering::Greater)
}

pub fn order_ge(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(compare_terms(q, args[0], args[1]) != Ordering::Less)
}

fn deref_cell(q: &mut Query, r: Ref) -> Result<Cell, u32> {
    q.unify_ctx().deref(r).map(|(_, c)| c)
}

pub fn is_var(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(deref_cell(q, args[0]).is_err())
}

pub fn is_nonvar(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(deref_cell(q, args[0]).is_ok())
}

pub fn is_atom(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(matches!(deref_cell(q, args[0]), Ok(c) if c.is_atom()))
}

pub fn is_number(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(matches!(deref_cell(q, args[0]), Ok(c) if c.is_number()))
}

pub fn is_atomic(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(matches!(deref_cell(q, args[0]), Ok(c) if c.is_atom() || c.is_number() || c.tag == crate::engine::cell::Tag::Str))
}

pub fn is_compound(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(matches!(deref_cell(q, args[0]), Ok(c) if c.is_structure()))
}

pub fn is_callable(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(matches!(deref_cell(q, args[0]), Ok(c) if c.is_atom() || c.is_structure()))
}

fn clause_term(q: &mut Query, arg: Ref) -> Result<crate::engine::term::Term, PrologError> {
    let (r, cell) = q
        .unify_ctx()
        .deref(arg)
        .map_err(|_| FormalError::InstantiationError.into_ball(q.atoms, None))?;
    if !cell.is_atom() && !cell.is_structure() {
        return Err(FormalError::TypeError { expected: "callable", culprit: cell }.into_ball(q.atoms, None));
    }
    let ctx = q.unify_ctx();
    Ok(unify::deep_clone(&ctx, r))
}

pub fn assertz1(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    let term = clause_term(q, args[0])?;
    let clause_atom = q.well_known.clause;
    q.clauses.assertz(term, clause_atom);
    Ok(true)
}

pub fn asserta1(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    let term = clause_term(q, args[0])?;
    let clause_atom = q.well_known.clause;
    q.clauses.asserta(term, clause_atom);
    Ok(true)
}

/// Deterministic simplification of ISO `retract/1`: erase the first live
/// clause whose head (and body, if given) unifies with the argument, rather
/// than leaving a choice point over every matching clause.
pub fn retract1(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    let clause_atom = q.well_known.clause;
    let (r, cell) = q
        .unify_ctx()
        .deref(args[0])
        .map_err(|_| FormalError::InstantiationError.into_ball(q.atoms, None))?;
    let is_rule = cell.functor_key() == Some(FunctorKey::new(clause_atom, 2));
    let (pattern_head, pattern_body) = if is_rule {
        let children = q.unify_ctx().children(r);
        (children[0], Some(children[1]))
    } else {
        (r, None)
    };
    let (_hr, hcell) = q
        .unify_ctx()
        .deref(pattern_head)
        .map_err(|_| FormalError::InstantiationError.into_ball(q.atoms, None))?;
    if !hcell.is_atom() && !hcell.is_structure() {
        return Err(FormalError::TypeError { expected: "callable", culprit: hcell }.into_ball(q.atoms, None));
    }
    let key = hcell.functor_key().unwrap();
    let candidates = q.clauses.candidates(key, None);
    let trail_mark = q.trail.mark();
    for id in candidates {
        let Some(clause) = q.clauses.get(id).cloned() else { continue };
        let frame_idx =
            q.frames.push_frame(clause.term.nbr_vars, q.choices.mark() as u32, crate::engine::cont::Cont::done());
        let head_offsets = crate::engine::term::Term::child_offsets(&clause.term.cells, clause.head_at);
        let goal_children = q.unify_ctx().children(pattern_head);
        let mut ok = goal_children.len() == head_offsets.len();
        if ok {
            for (&ga, &ho) in goal_children.iter().zip(head_offsets.iter()) {
                let ha = Ref::new(crate::engine::addr::CodeAddr::Clause(id, ho), frame_idx);
                if !unify(&mut q.unify_ctx(), ga, ha) {
                    ok = false;
                    break;
                }
            }
        }
        if ok {
            if let (Some(pb), Some(cb)) = (pattern_body, clause.body_at) {
                let cb_ref = Ref::new(crate::engine::addr::CodeAddr::Clause(id, cb), frame_idx);
                ok = unify(&mut q.unify_ctx(), pb, cb_ref);
            } else if pattern_body.is_some() != clause.body_at.is_some() {
                ok = false;
            }
        }
        if ok {
            q.clauses.erase(id);
            return Ok(true);
        }
        q.unwind_trail(trail_mark);
    }
    Ok(false)
}
