//! All-solutions collectors: `findall/3`, and the pure data side of
//! `bagof/3`/`setof/3`.
//!
//! `findall/3` is a plain deterministic built-in (below). `bagof`/`setof`
//! are not — ISO groups their solutions by the free variables of `Goal`
//! that are neither in `Template` nor existentially `^`-quantified,
//! backtracking to hand back one group's list per retry. That needs a
//! choice point carrying the dispatcher's continuation, so the dispatcher
//! recognizes `bagof`/`setof` directly (see `Query::bagof_setof` in
//! `dispatch.rs`) the same way it does `catch/3`; this module only computes
//! the partitions, grounded on the grouping `fn_bagof`/`fn_setof` perform in
//! `examples/original_source/builtins.c`.

use crate::engine::addr::Ref;
use crate::engine::cell::Tag;
use crate::engine::clause::FunctorKey;
use crate::engine::dispatch::{merge_into_list, Query};
use crate::engine::error::PrologError;
use crate::engine::order;
use crate::engine::term::Term;
use crate::engine::unify;

/// Strip leading `Var^Goal` existential quantifiers, collecting each
/// quantified variable's free-variable entries into `existentials` along
/// the way, and returning the unqualified inner goal.
fn strip_existentials(q: &mut Query, mut r: Ref, existentials: &mut Vec<(u32, Ref)>) -> Ref {
    loop {
        let Ok((rr, cell)) = q.unify_ctx().deref(r) else { return r };
        if cell.functor_key() != Some(FunctorKey::new(q.well_known.caret, 2)) {
            return r;
        }
        let children = q.unify_ctx().children(rr);
        collect_free_refs(q, children[0], existentials);
        r = children[1];
    }
}

/// Walk the live term at `r`, collecting the global slot and a live `Ref`
/// handle for every distinct unbound variable reachable in it, in
/// first-encountered order. Unlike `unify::deep_clone`, this never
/// renumbers anything — the slot is the variable's real identity, usable to
/// compare against another live term's variables or to `unify` against
/// later in the same solve.
fn collect_free_refs(q: &mut Query, r: Ref, out: &mut Vec<(u32, Ref)>) {
    match q.unify_ctx().deref(r) {
        Err(slot) => {
            if !out.iter().any(|&(s, _)| s == slot) {
                out.push((slot, r));
            }
        }
        Ok((rr, cell)) => {
            if cell.tag == Tag::Literal && cell.arity > 0 {
                for child in q.unify_ctx().children(rr) {
                    collect_free_refs(q, child, out);
                }
            }
        }
    }
}

fn compare_witness(atoms: &crate::engine::atoms::AtomTable, a: &[Term], b: &[Term]) -> std::cmp::Ordering {
    for (x, y) in a.iter().zip(b) {
        let ord = order::compare(atoms, x, y);
        if ord != std::cmp::Ordering::Equal {
            return ord;
        }
    }
    std::cmp::Ordering::Equal
}

fn collect(q: &mut Query, template: Ref, goal: Ref) -> Result<Vec<Term>, PrologError> {
    let mut results = Vec::new();
    q.for_each_solution(goal, |q| {
        let ctx = q.unify_ctx();
        results.push(unify::deep_clone(&ctx, template));
    })?;
    Ok(results)
}

pub fn findall3(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    let results = collect(q, args[0], args[1])?;
    let list = merge_into_list(q.well_known.dot, q.well_known.nil, results);
    let built = q.instantiate(&list.cells, list.nbr_vars);
    Ok(unify::unify(&mut q.unify_ctx(), args[2], built))
}

/// The no-free-variables fallback for `bagof`/`setof`: behaves like
/// `findall/3` (after `^`-stripping), sorted and deduplicated for `setof`.
pub(crate) fn collect_simple(
    q: &mut Query,
    template: Ref,
    goal: Ref,
    is_setof: bool,
) -> Result<Vec<Term>, PrologError> {
    let mut results = collect(q, template, goal)?;
    if is_setof {
        results.sort_by(|a, b| order::compare(q.atoms, a, b));
        results.dedup_by(|a, b| order::compare(q.atoms, a, b) == std::cmp::Ordering::Equal);
    }
    Ok(results)
}

/// Strip existential quantifiers from `goal`, then partition its solutions
/// by the free variables of the stripped goal that are neither in
/// `template` nor existentially quantified. Returns `Ok(None)` when there
/// are no such free variables — grouping degenerates to one partition, so
/// the caller should fall back to [`collect_simple`] instead. Otherwise
/// returns the free-variable `(slot, Ref)` list (in first-encountered
/// order, the order each group's witness values are given in) paired with
/// the groups themselves, sorted by witness standard order — the order
/// `bagof`/`setof` backtrack through them in.
pub(crate) fn compute_groups(
    q: &mut Query,
    template: Ref,
    goal: Ref,
    is_setof: bool,
) -> Result<Option<(Vec<(u32, Ref)>, Vec<(Vec<Term>, Vec<Term>)>)>, PrologError> {
    let mut existentials = Vec::new();
    let goal = strip_existentials(q, goal, &mut existentials);

    let mut template_vars = Vec::new();
    collect_free_refs(q, template, &mut template_vars);

    let mut goal_vars = Vec::new();
    collect_free_refs(q, goal, &mut goal_vars);

    let free_vars: Vec<(u32, Ref)> = goal_vars
        .into_iter()
        .filter(|(slot, _)| {
            !template_vars.iter().any(|(s, _)| s == slot) && !existentials.iter().any(|(s, _)| s == slot)
        })
        .collect();

    if free_vars.is_empty() {
        return Ok(None);
    }

    let mut pairs: Vec<(Vec<Term>, Term)> = Vec::new();
    q.for_each_solution(goal, |q| {
        let ctx = q.unify_ctx();
        let witness: Vec<Term> = free_vars.iter().map(|&(_, r)| unify::deep_clone(&ctx, r)).collect();
        let tmpl = unify::deep_clone(&ctx, template);
        pairs.push((witness, tmpl));
    })?;
    if pairs.is_empty() {
        return Ok(Some((free_vars, Vec::new())));
    }
    pairs.sort_by(|(wa, _), (wb, _)| compare_witness(q.atoms, wa, wb));

    let mut groups: Vec<(Vec<Term>, Vec<Term>)> = Vec::new();
    for (witness, tmpl) in pairs {
        match groups.last_mut() {
            Some((last_w, items)) if compare_witness(q.atoms, last_w, &witness) == std::cmp::Ordering::Equal => {
                items.push(tmpl);
            }
            _ => groups.push((witness, vec![tmpl])),
        }
    }
    if is_setof {
        for (_, items) in &mut groups {
            items.sort_by(|a, b| order::compare(q.atoms, a, b));
            items.dedup_by(|a, b| order::compare(q.atoms, a, b) == std::cmp::Ordering::Equal);
        }
    }
    Ok(Some((free_vars, groups)))
}
