//! Arithmetic evaluation for `is/2` and the numeric comparison predicates.
//!
//! Spec §4.7 lists arithmetic as one of the built-in families every engine
//! carries; this is the minimal ISO subset (`+`, `-`, `*`, `/`, integer
//! `mod`, unary minus, `abs`) needed by the reference predicate set, backed
//! by the same `Payload::Int{num,den}` rational cells terms already use —
//! no separate bignum type.

use crate::engine::addr::Ref;
use crate::engine::cell::{Cell, Payload, Tag};
use crate::engine::dispatch::Query;
use crate::engine::error::{FormalError, PrologError};
use crate::engine::unify::unify;

#[derive(Debug, Clone, Copy)]
enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    fn as_f64(self) -> f64 {
        match self {
            Num::Int(n) => n as f64,
            Num::Float(f) => f,
        }
    }

    fn to_cell(self) -> Cell {
        match self {
            Num::Int(n) => Cell::int(n),
            Num::Float(f) => Cell::float(f),
        }
    }
}

fn type_err(q: &mut Query, culprit: Cell) -> PrologError {
    FormalError::TypeError { expected: "evaluable", culprit }.into_ball(q.atoms, None)
}

fn eval(q: &mut Query, r: Ref) -> Result<Num, PrologError> {
    let (rr, cell) = q
        .unify_ctx()
        .deref(r)
        .map_err(|_| FormalError::InstantiationError.into_ball(q.atoms, None))?;
    match cell.tag {
        Tag::Int => {
            let Payload::Int { num, den } = cell.payload else { unreachable!() };
            if den == 1 {
                Ok(Num::Int(num))
            } else {
                Ok(Num::Float(num as f64 / den as f64))
            }
        }
        Tag::Float => {
            let Payload::Float(f) = cell.payload else { unreachable!() };
            Ok(Num::Float(f))
        }
        Tag::Literal if cell.arity == 0 => Err(type_err(q, cell)),
        Tag::Literal => {
            let key = cell.functor_key().unwrap();
            let name = q.atoms.name(key.atom).to_string();
            let children = q.unify_ctx().children(rr);
            match (name.as_str(), key.arity) {
                ("+", 2) => Ok(binop(eval(q, children[0])?, eval(q, children[1])?, |a, b| a + b, |a, b| a + b)),
                ("-", 2) => Ok(binop(eval(q, children[0])?, eval(q, children[1])?, |a, b| a - b, |a, b| a - b)),
                ("*", 2) => Ok(binop(eval(q, children[0])?, eval(q, children[1])?, |a, b| a * b, |a, b| a * b)),
                ("/", 2) => {
                    let a = eval(q, children[0])?;
                    let b = eval(q, children[1])?;
                    match (a, b) {
                        (Num::Int(x), Num::Int(y)) if y != 0 && x % y == 0 => Ok(Num::Int(x / y)),
                        _ => {
                            let bv = b.as_f64();
                            if bv == 0.0 {
                                Err(FormalError::EvaluationError { what: "zero_divisor" }.into_ball(q.atoms, None))
                            } else {
                                Ok(Num::Float(a.as_f64() / bv))
                            }
                        }
                    }
                }
                ("mod", 2) => {
                    let a = eval(q, children[0])?;
                    let b = eval(q, children[1])?;
                    match (a, b) {
                        (Num::Int(x), Num::Int(y)) if y != 0 => Ok(Num::Int(x.rem_euclid(y))),
                        (_, Num::Int(0)) => {
                            Err(FormalError::EvaluationError { what: "zero_divisor" }.into_ball(q.atoms, None))
                        }
                        _ => Err(FormalError::TypeError { expected: "integer", culprit: cell }.into_ball(q.atoms, None)),
                    }
                }
                ("-", 1) => Ok(match eval(q, children[0])? {
                    Num::Int(x) => Num::Int(-x),
                    Num::Float(x) => Num::Float(-x),
                }),
                ("abs", 1) => Ok(match eval(q, children[0])? {
                    Num::Int(x) => Num::Int(x.abs()),
                    Num::Float(x) => Num::Float(x.abs()),
                }),
                _ => Err(type_err(q, cell)),
            }
        }
        _ => Err(type_err(q, cell)),
    }
}

fn binop(a: Num, b: Num, fi: impl Fn(i64, i64) -> i64, ff: impl Fn(f64, f64) -> f64) -> Num {
    match (a, b) {
        (Num::Int(x), Num::Int(y)) => Num::Int(fi(x, y)),
        _ => Num::Float(ff(a.as_f64(), b.as_f64())),
    }
}

pub fn is2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    let value = eval(q, args[1])?;
    let cell = value.to_cell();
    let target = q.instantiate(std::slice::from_ref(&cell), 0);
    Ok(unify(&mut q.unify_ctx(), args[0], target))
}

fn compare(q: &mut Query, args: &[Ref]) -> Result<std::cmp::Ordering, PrologError> {
    let a = eval(q, args[0])?.as_f64();
    let b = eval(q, args[1])?.as_f64();
    Ok(a.partial_cmp(&b).unwrap_or(std::cmp::Ordering::Equal))
}

pub fn lt2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(compare(q, args)? == std::cmp::Ordering::Less)
}

pub fn gt2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(compare(q, args)? == std::cmp::Ordering::Greater)
}

pub fn le2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(compare(q, args)? != std::cmp::Ordering::Greater)
}

pub fn ge2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(compare(q, args)? != std::cmp::Ordering::Less)
}

pub fn num_eq2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(compare(q, args)? == std::cmp::Ordering::Equal)
}

pub fn num_ne2(q: &mut Query, args: &[Ref]) -> Result<bool, PrologError> {
    Ok(compare(q, args)? != std::cmp::Ordering::Equal)
}
