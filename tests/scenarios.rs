//! End-to-end solve scenarios against the public embedding API, built with
//! [`prolog_engine::engine::build::TermBuilder`] in place of a parser.

use prolog_engine::engine::atoms::AtomTable;
use prolog_engine::engine::build::TermBuilder;
use prolog_engine::engine::cell::Payload;
use prolog_engine::engine::term::Term;
use prolog_engine::{Engine, EngineConfig};

/// Every scenario below runs through `log`, same as the `clara-*` binaries
/// this engine's dependency stack is grounded on; route it somewhere a
/// failing test's `RUST_LOG=debug` run can see it. `try_init` rather than
/// `init`: every `#[test]` fn in this binary calls this, and only the first
/// call may succeed.
fn init_logging() {
    let _ = env_logger::try_init();
}

/// Walk a resolved (fully dereferenced) `.`/2-terminated list rooted at
/// `term.cells[at]`, returning the cell offset of each element.
fn list_offsets(term: &Term, at: usize) -> Vec<usize> {
    let mut out = Vec::new();
    let mut cursor = at;
    loop {
        if term.cells[cursor].arity == 0 {
            return out;
        }
        let children = Term::child_offsets(&term.cells, cursor);
        out.push(children[0]);
        cursor = children[1];
    }
}

fn as_int(term: &Term, at: usize) -> i64 {
    match term.cells[at].payload {
        Payload::Int { num, den: 1 } => num,
        ref other => panic!("expected an integer cell, got {other:?}"),
    }
}

fn as_atom(term: &Term, at: usize) -> u32 {
    match term.cells[at].payload {
        Payload::Literal(offset) => offset,
        ref other => panic!("expected an atom cell, got {other:?}"),
    }
}

fn build_int_list(b: &mut TermBuilder, atoms: &mut AtomTable, items: &[i64]) {
    if items.is_empty() {
        b.atom(atoms, "[]");
    } else {
        let mark = b.open_compound(atoms, ".", 2);
        b.int(items[0]);
        build_int_list(b, atoms, &items[1..]);
        b.close_compound(mark);
    }
}

fn build_atom_list(b: &mut TermBuilder, atoms: &mut AtomTable, items: &[&str]) {
    if items.is_empty() {
        b.atom(atoms, "[]");
    } else {
        let mark = b.open_compound(atoms, ".", 2);
        b.atom(atoms, items[0]);
        build_atom_list(b, atoms, &items[1..]);
        b.close_compound(mark);
    }
}

/// `append([], L, L).` / `append([H|T], L, [H|R]) :- append(T, L, R).`
fn define_append(engine: &mut Engine) {
    let clause_atom = engine.atoms().intern(":-");

    let mut b = TermBuilder::new();
    let mark = b.open_compound(engine.atoms(), "append", 3);
    b.atom(engine.atoms(), "[]");
    b.var("L");
    b.var("L");
    b.close_compound(mark);
    let fact = b.finish();

    let mut b = TermBuilder::new();
    let rule_mark = b.open_compound(engine.atoms(), ":-", 2);
    let head_mark = b.open_compound(engine.atoms(), "append", 3);
    let cons1 = b.open_compound(engine.atoms(), ".", 2);
    b.var("H");
    b.var("T");
    b.close_compound(cons1);
    b.var("L");
    let cons2 = b.open_compound(engine.atoms(), ".", 2);
    b.var("H");
    b.var("R");
    b.close_compound(cons2);
    b.close_compound(head_mark);
    let body_mark = b.open_compound(engine.atoms(), "append", 3);
    b.var("T");
    b.var("L");
    b.var("R");
    b.close_compound(body_mark);
    b.close_compound(rule_mark);
    let rule = b.finish();

    let module = engine.module("user");
    module.clauses.assertz(fact, clause_atom);
    module.clauses.assertz(rule, clause_atom);
}

#[test]
fn append_concatenates_two_lists() {
    init_logging();
    let mut engine = Engine::new(EngineConfig::default());
    define_append(&mut engine);

    let mut b = TermBuilder::new();
    let mark = b.open_compound(engine.atoms(), "append", 3);
    build_int_list(&mut b, engine.atoms(), &[1, 2]);
    build_int_list(&mut b, engine.atoms(), &[3, 4]);
    b.var("X");
    b.close_compound(mark);
    let goal = b.finish();

    let mut solutions = 0;
    let mut result = Vec::new();
    engine
        .run("user", &goal, |q, goal_ref| {
            solutions += 1;
            let snapshot = q.resolve(goal_ref);
            let args = Term::child_offsets(&snapshot.cells, 0);
            result = list_offsets(&snapshot, args[2]).into_iter().map(|o| as_int(&snapshot, o)).collect();
            false
        })
        .unwrap();

    assert_eq!(solutions, 1);
    assert_eq!(result, vec![1, 2, 3, 4]);
}

/// `member(X, [X|_]).` / `member(X, [_|T]) :- member(X, T).`
fn define_member(engine: &mut Engine) {
    let clause_atom = engine.atoms().intern(":-");

    let mut b = TermBuilder::new();
    let mark = b.open_compound(engine.atoms(), "member", 2);
    b.var("X");
    let cons = b.open_compound(engine.atoms(), ".", 2);
    b.var("X");
    b.var("_");
    b.close_compound(cons);
    b.close_compound(mark);
    let fact = b.finish();

    let mut b = TermBuilder::new();
    let rule_mark = b.open_compound(engine.atoms(), ":-", 2);
    let head_mark = b.open_compound(engine.atoms(), "member", 2);
    b.var("X");
    let cons = b.open_compound(engine.atoms(), ".", 2);
    b.var("_");
    b.var("T");
    b.close_compound(cons);
    b.close_compound(head_mark);
    let body_mark = b.open_compound(engine.atoms(), "member", 2);
    b.var("X");
    b.var("T");
    b.close_compound(body_mark);
    b.close_compound(rule_mark);
    let rule = b.finish();

    let module = engine.module("user");
    module.clauses.assertz(fact, clause_atom);
    module.clauses.assertz(rule, clause_atom);
}

#[test]
fn member_backtracks_through_every_list_element() {
    init_logging();
    let mut engine = Engine::new(EngineConfig::default());
    define_member(&mut engine);

    let mut b = TermBuilder::new();
    let mark = b.open_compound(engine.atoms(), "member", 2);
    b.var("X");
    build_atom_list(&mut b, engine.atoms(), &["a", "b", "c"]);
    b.close_compound(mark);
    let goal = b.finish();

    let mut found = Vec::new();
    engine
        .run("user", &goal, |q, goal_ref| {
            let snapshot = q.resolve(goal_ref);
            let args = Term::child_offsets(&snapshot.cells, 0);
            found.push(as_atom(&snapshot, args[0]));
            true
        })
        .unwrap();

    let found_names: Vec<&str> = found.iter().map(|&o| engine.atoms().name(o)).collect();
    assert_eq!(found_names, vec!["a", "b", "c"]);
}

/// `count(0).` / `count(N) :- N > 0, N1 is N - 1, count(N1).` — every
/// recursive call site is the clause's last goal, so with
/// `OptLevel::Tco` (the default) this runs in one dispatcher frame per
/// call rather than growing a frame per level.
fn define_count(engine: &mut Engine) {
    let clause_atom = engine.atoms().intern(":-");

    let mut b = TermBuilder::new();
    let mark = b.open_compound(engine.atoms(), "count", 1);
    b.int(0);
    b.close_compound(mark);
    let base = b.finish();

    let mut b = TermBuilder::new();
    let rule_mark = b.open_compound(engine.atoms(), ":-", 2);
    let head_mark = b.open_compound(engine.atoms(), "count", 1);
    b.var("N");
    b.close_compound(head_mark);

    let conj1_mark = b.open_compound(engine.atoms(), ",", 2);
    let gt_mark = b.open_compound(engine.atoms(), ">", 2);
    b.var("N");
    b.int(0);
    b.close_compound(gt_mark);

    let conj2_mark = b.open_compound(engine.atoms(), ",", 2);
    let is_mark = b.open_compound(engine.atoms(), "is", 2);
    b.var("N1");
    let minus_mark = b.open_compound(engine.atoms(), "-", 2);
    b.var("N");
    b.int(1);
    b.close_compound(minus_mark);
    b.close_compound(is_mark);

    let tail_mark = b.open_compound(engine.atoms(), "count", 1);
    b.var("N1");
    b.close_compound(tail_mark);

    b.close_compound(conj2_mark);
    b.close_compound(conj1_mark);
    b.close_compound(rule_mark);
    let rule = b.finish();

    let module = engine.module("user");
    module.clauses.assertz(base, clause_atom);
    module.clauses.assertz(rule, clause_atom);
}

#[test]
fn count_down_recursion_terminates_with_one_solution() {
    init_logging();
    let mut engine = Engine::new(EngineConfig::default());
    define_count(&mut engine);

    let mut b = TermBuilder::new();
    let mark = b.open_compound(engine.atoms(), "count", 1);
    b.int(5);
    b.close_compound(mark);
    let goal = b.finish();

    let mut solutions = 0;
    engine
        .run("user", &goal, |_, _| {
            solutions += 1;
            true
        })
        .unwrap();
    assert_eq!(solutions, 1);
}

/// `fact(0,1).` / `fact(N,F) :- N>0, N1 is N-1, fact(N1,F1), F is N*F1.` —
/// the recursive call is *not* the clause's last goal (`F is N*F1` follows
/// it), so this is not a TCO candidate; it exercises plain recursion rather
/// than the frame-reuse path `count`/1 above exercises.
fn define_fact(engine: &mut Engine) {
    let clause_atom = engine.atoms().intern(":-");

    let mut b = TermBuilder::new();
    let mark = b.open_compound(engine.atoms(), "fact", 2);
    b.int(0);
    b.int(1);
    b.close_compound(mark);
    let base = b.finish();

    let mut b = TermBuilder::new();
    let rule_mark = b.open_compound(engine.atoms(), ":-", 2);
    let head_mark = b.open_compound(engine.atoms(), "fact", 2);
    b.var("N");
    b.var("F");
    b.close_compound(head_mark);

    let conj1 = b.open_compound(engine.atoms(), ",", 2);
    let gt_mark = b.open_compound(engine.atoms(), ">", 2);
    b.var("N");
    b.int(0);
    b.close_compound(gt_mark);

    let conj2 = b.open_compound(engine.atoms(), ",", 2);
    let is1_mark = b.open_compound(engine.atoms(), "is", 2);
    b.var("N1");
    let minus_mark = b.open_compound(engine.atoms(), "-", 2);
    b.var("N");
    b.int(1);
    b.close_compound(minus_mark);
    b.close_compound(is1_mark);

    let conj3 = b.open_compound(engine.atoms(), ",", 2);
    let recur_mark = b.open_compound(engine.atoms(), "fact", 2);
    b.var("N1");
    b.var("F1");
    b.close_compound(recur_mark);

    let is2_mark = b.open_compound(engine.atoms(), "is", 2);
    b.var("F");
    let mul_mark = b.open_compound(engine.atoms(), "*", 2);
    b.var("N");
    b.var("F1");
    b.close_compound(mul_mark);
    b.close_compound(is2_mark);

    b.close_compound(conj3);
    b.close_compound(conj2);
    b.close_compound(conj1);
    b.close_compound(rule_mark);
    let rule = b.finish();

    let module = engine.module("user");
    module.clauses.assertz(base, clause_atom);
    module.clauses.assertz(rule, clause_atom);
}

#[test]
fn fact_computes_factorial_via_non_tail_recursion() {
    init_logging();
    let mut engine = Engine::new(EngineConfig::default());
    define_fact(&mut engine);

    let mut b = TermBuilder::new();
    let mark = b.open_compound(engine.atoms(), "fact", 2);
    b.int(10);
    b.var("F");
    b.close_compound(mark);
    let goal = b.finish();

    let mut solutions = 0;
    let mut result = 0;
    engine
        .run("user", &goal, |q, goal_ref| {
            solutions += 1;
            let snapshot = q.resolve(goal_ref);
            let args = Term::child_offsets(&snapshot.cells, 0);
            result = as_int(&snapshot, args[1]);
            false
        })
        .unwrap();

    assert_eq!(solutions, 1);
    assert_eq!(result, 3_628_800);
}

/// `boom :- throw(oops).` driven through `catch(boom, oops, true)`.
#[test]
fn catch_recovers_from_a_matching_throw() {
    init_logging();
    let mut engine = Engine::new(EngineConfig::default());
    let clause_atom = engine.atoms().intern(":-");

    let mut b = TermBuilder::new();
    let rule_mark = b.open_compound(engine.atoms(), ":-", 2);
    b.atom(engine.atoms(), "boom");
    let throw_mark = b.open_compound(engine.atoms(), "throw", 1);
    b.atom(engine.atoms(), "oops");
    b.close_compound(throw_mark);
    b.close_compound(rule_mark);
    let rule = b.finish();
    engine.module("user").clauses.assertz(rule, clause_atom);

    let mut b = TermBuilder::new();
    let catch_mark = b.open_compound(engine.atoms(), "catch", 3);
    b.atom(engine.atoms(), "boom");
    b.atom(engine.atoms(), "oops");
    b.atom(engine.atoms(), "true");
    b.close_compound(catch_mark);
    let goal = b.finish();

    let mut solutions = 0;
    engine
        .run("user", &goal, |_, _| {
            solutions += 1;
            true
        })
        .unwrap();
    assert_eq!(solutions, 1);
}

/// `color(red).` / `color(green).` / `color(blue).` collected by
/// `findall(X, color(X), L)`.
#[test]
fn findall_collects_every_solution_in_order() {
    init_logging();
    let mut engine = Engine::new(EngineConfig::default());
    let clause_atom = engine.atoms().intern(":-");
    for name in ["red", "green", "blue"] {
        let mut b = TermBuilder::new();
        let mark = b.open_compound(engine.atoms(), "color", 1);
        b.atom(engine.atoms(), name);
        b.close_compound(mark);
        let fact = b.finish();
        engine.module("user").clauses.assertz(fact, clause_atom);
    }

    let mut b = TermBuilder::new();
    let mark = b.open_compound(engine.atoms(), "findall", 3);
    b.var("X");
    let goal_mark = b.open_compound(engine.atoms(), "color", 1);
    b.var("X");
    b.close_compound(goal_mark);
    b.var("L");
    b.close_compound(mark);
    let goal = b.finish();

    let mut result = Vec::new();
    engine
        .run("user", &goal, |q, goal_ref| {
            let snapshot = q.resolve(goal_ref);
            let args = Term::child_offsets(&snapshot.cells, 0);
            result = list_offsets(&snapshot, args[2]).into_iter().map(|o| as_atom(&snapshot, o)).collect();
            false
        })
        .unwrap();

    let names: Vec<&str> = result.iter().map(|&o| engine.atoms().name(o)).collect();
    assert_eq!(names, vec!["red", "green", "blue"]);
}

/// `likes(mary,wine).` / `likes(mary,beer).` / `likes(john,wine).` through
/// `setof(X, Y^likes(X,Y), L)` — `Y^` existentially quantifies away the
/// only variable `likes/2` has besides the template, so there is nothing
/// left to group by: one partition, the sorted duplicate-free bag of every
/// `X` that appears in any `likes/2` fact.
#[test]
fn setof_sorts_and_dedups_with_existential_quantifier_stripped() {
    init_logging();
    let mut engine = Engine::new(EngineConfig::default());
    let clause_atom = engine.atoms().intern(":-");
    for (who, what) in [("mary", "wine"), ("mary", "beer"), ("john", "wine")] {
        let mut b = TermBuilder::new();
        let mark = b.open_compound(engine.atoms(), "likes", 2);
        b.atom(engine.atoms(), who);
        b.atom(engine.atoms(), what);
        b.close_compound(mark);
        let fact = b.finish();
        engine.module("user").clauses.assertz(fact, clause_atom);
    }

    let mut b = TermBuilder::new();
    let mark = b.open_compound(engine.atoms(), "setof", 3);
    b.var("X");
    let caret_mark = b.open_compound(engine.atoms(), "^", 2);
    b.var("Y");
    let goal_mark = b.open_compound(engine.atoms(), "likes", 2);
    b.var("X");
    b.var("Y");
    b.close_compound(goal_mark);
    b.close_compound(caret_mark);
    b.var("L");
    b.close_compound(mark);
    let goal = b.finish();

    let mut result = Vec::new();
    let mut solutions = 0;
    engine
        .run("user", &goal, |q, goal_ref| {
            solutions += 1;
            let snapshot = q.resolve(goal_ref);
            let args = Term::child_offsets(&snapshot.cells, 0);
            result = list_offsets(&snapshot, args[2]).into_iter().map(|o| as_atom(&snapshot, o)).collect();
            false
        })
        .unwrap();

    assert_eq!(solutions, 1);
    let names: Vec<&str> = result.iter().map(|&o| engine.atoms().name(o)).collect();
    assert_eq!(names, vec!["john", "mary"]);
}

/// `parent(alice,bob).` / `parent(alice,carol).` / `parent(dave,ella).`
/// through `bagof(X, parent(X,Y), L)` — `Y` is free (not `^`-quantified, not
/// in the template), so this backtracks once per distinct `Y`, each time
/// binding `L` to the bag of `X`s sharing that `Y`, in `Y`'s standard order.
#[test]
fn bagof_backtracks_through_free_variable_groups() {
    init_logging();
    let mut engine = Engine::new(EngineConfig::default());
    let clause_atom = engine.atoms().intern(":-");
    for (parent, child) in [("alice", "bob"), ("alice", "carol"), ("dave", "ella")] {
        let mut b = TermBuilder::new();
        let mark = b.open_compound(engine.atoms(), "parent", 2);
        b.atom(engine.atoms(), parent);
        b.atom(engine.atoms(), child);
        b.close_compound(mark);
        let fact = b.finish();
        engine.module("user").clauses.assertz(fact, clause_atom);
    }

    let mut b = TermBuilder::new();
    let mark = b.open_compound(engine.atoms(), "bagof", 3);
    b.var("X");
    let goal_mark = b.open_compound(engine.atoms(), "parent", 2);
    b.var("X");
    b.var("Y");
    b.close_compound(goal_mark);
    b.var("L");
    b.close_compound(mark);
    let goal = b.finish();

    let mut groups: Vec<(u32, Vec<u32>)> = Vec::new();
    engine
        .run("user", &goal, |q, goal_ref| {
            let snapshot = q.resolve(goal_ref);
            let args = Term::child_offsets(&snapshot.cells, 0);
            let goal_args = Term::child_offsets(&snapshot.cells, args[1]);
            let y = as_atom(&snapshot, goal_args[1]);
            let xs = list_offsets(&snapshot, args[2]).into_iter().map(|o| as_atom(&snapshot, o)).collect();
            groups.push((y, xs));
            true
        })
        .unwrap();

    assert_eq!(groups.len(), 3);
    let rendered: Vec<(&str, Vec<&str>)> = groups
        .iter()
        .map(|(y, xs)| (engine.atoms().name(*y), xs.iter().map(|&o| engine.atoms().name(o)).collect()))
        .collect();
    assert_eq!(
        rendered,
        vec![("bob", vec!["alice"]), ("carol", vec!["alice"]), ("ella", vec!["dave"])]
    );
}
