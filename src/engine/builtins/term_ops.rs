//! Term construction/decomposition: `functor/3`, `arg/3`, `=../2`,
//! `copy_term/2`.

use crate::engine::addr::Ref;
use crate::engine::cell::Cell;
use crate::engine::dispatch::Query;
use crate::engine::error::{FormalError, PrologError};
use crate::engine::term::{Term, TermBuf};
use crate::engine::unify::{self, unify};

fn inst_err(q: &mut Query) -> PrologError {
    FormalError::InstantiationError.into_ball(q.atoms, None)
}

pub fn functor3(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    let deref = q.unify_ctx().deref(args[0]);
    if let Ok((_, cell)) = deref {
        let (name_cell, arity_cell) = if cell.is_structure() {
            (Cell::atom(cell.functor_key().unwrap().atom), Cell::int(cell.arity as i64))
        } else {
            (cell.clone(), Cell::int(0))
        };
        let name_ref = q.instantiate(std::slice::from_ref(&name_cell), 0);
        let arity_ref = q.instantiate(std::slice::from_ref(&arity_cell), 0);
        return Ok(unify(&mut q.unify_ctx(), args[1], name_ref) && unify(&mut q.unify_ctx(), args[2], arity_ref));
    }

    let (_, name_cell) = q.unify_ctx().deref(args[1]).map_err(|_| inst_err(q))?;
    let (_, arity_cell) = q.unify_ctx().deref(args[2]).map_err(|_| inst_err(q))?;
    let crate::engine::cell::Payload::Int { num: arity, den: 1 } = arity_cell.payload else {
        return Err(FormalError::TypeError { expected: "integer", culprit: arity_cell }.into_ball(q.atoms, None));
    };
    if arity == 0 {
        let built = q.instantiate(std::slice::from_ref(&name_cell), 0);
        return Ok(unify(&mut q.unify_ctx(), args[0], built));
    }
    if !name_cell.is_atom() {
        return Err(FormalError::TypeError { expected: "atom", culprit: name_cell }.into_ball(q.atoms, None));
    }
    let key = name_cell.functor_key().unwrap();
    let mut buf = TermBuf::new();
    let mark = buf.open_functor(Cell::functor(key.atom, arity as u8));
    for i in 0..arity as u32 {
        buf.push_leaf(Cell::var(i));
    }
    buf.close_functor(mark);
    let term = buf.finish(arity as u32);
    let built = q.instantiate(&term.cells, term.nbr_vars);
    Ok(unify(&mut q.unify_ctx(), args[0], built))
}

pub fn arg3(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    let (_, n_cell) = q.unify_ctx().deref(args[0]).map_err(|_| inst_err(q))?;
    let crate::engine::cell::Payload::Int { num: n, den: 1 } = n_cell.payload else {
        return Err(FormalError::TypeError { expected: "integer", culprit: n_cell }.into_ball(q.atoms, None));
    };
    let (tr, tcell) = q.unify_ctx().deref(args[1]).map_err(|_| inst_err(q))?;
    if !tcell.is_structure() {
        return Err(FormalError::TypeError { expected: "compound", culprit: tcell }.into_ball(q.atoms, None));
    }
    if n < 1 || n as u8 > tcell.arity {
        return Ok(false);
    }
    let children = q.unify_ctx().children(tr);
    Ok(unify(&mut q.unify_ctx(), args[2], children[(n - 1) as usize]))
}

pub fn univ2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    let deref = q.unify_ctx().deref(args[0]);
    if let Ok((r, cell)) = deref {
        let mut parts: Vec<Term> = Vec::new();
        if cell.is_structure() {
            let head = Term::new(vec![Cell::atom(cell.functor_key().unwrap().atom)], 0);
            parts.push(head);
            for child in q.unify_ctx().children(r) {
                let ctx = q.unify_ctx();
                parts.push(unify::deep_clone(&ctx, child));
            }
        } else {
            let ctx = q.unify_ctx();
            parts.push(unify::deep_clone(&ctx, r));
        }
        let list = crate::engine::dispatch::merge_into_list(q.well_known.dot, q.well_known.nil, parts);
        let built = q.instantiate(&list.cells, list.nbr_vars);
        return Ok(unify(&mut q.unify_ctx(), args[1], built));
    }

    let items = collect_list(q, args[1])?;
    if items.is_empty() {
        return Err(FormalError::DomainError { domain: "non_empty_list", culprit: Cell::atom(q.well_known.nil) }
            .into_ball(q.atoms, None));
    }
    let mut iter = items.into_iter();
    let head = iter.next().unwrap();
    let (_, head_cell) = q.unify_ctx().deref(head).map_err(|_| inst_err(q))?;
    let rest: Vec<Ref> = iter.collect();
    if rest.is_empty() {
        let built = q.instantiate(std::slice::from_ref(&head_cell), 0);
        return Ok(unify(&mut q.unify_ctx(), args[0], built));
    }
    if !head_cell.is_atom() {
        return Err(FormalError::TypeError { expected: "atom", culprit: head_cell }.into_ball(q.atoms, None));
    }
    let key_atom = head_cell.functor_key().unwrap().atom;
    let mut parts = Vec::with_capacity(rest.len());
    for r in rest {
        let ctx = q.unify_ctx();
        parts.push(unify::deep_clone(&ctx, r));
    }
    let arity = parts.len() as u8;
    let combined = crate::engine::dispatch::merge_into_compound(key_atom, arity, parts);
    let built = q.instantiate(&combined.cells, combined.nbr_vars);
    Ok(unify(&mut q.unify_ctx(), args[0], built))
}

/// Walk a proper list of `./2` cells into its element `Ref`s, erroring if it
/// is partial or not a list at all.
pub(crate) fn collect_list(q: &mut Query, mut r: Ref) -> Result<Vec<Ref>, PrologError> {
    let mut out = Vec::new();
    loop {
        let (rr, cell) = q.unify_ctx().deref(r).map_err(|_| inst_err(q))?;
        if cell.functor_key() == Some(crate::engine::clause::FunctorKey::new(q.well_known.dot, 2)) {
            let children = q.unify_ctx().children(rr);
            out.push(children[0]);
            r = children[1];
        } else if cell.functor_key().map(|k| k.atom) == Some(q.well_known.nil) && cell.arity == 0 {
            return Ok(out);
        } else {
            return Err(FormalError::TypeError { expected: "list", culprit: cell }.into_ball(q.atoms, None));
        }
    }
}

pub fn copy_term2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    let term = {
        let ctx = q.unify_ctx();
        unify::deep_clone(&ctx, args[0])
    };
    let built = q.instantiate(&term.cells, term.nbr_vars);
    Ok(unify(&mut q.unify_ctx(), args[1], built))
}
