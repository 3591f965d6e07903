//! The write-ahead persistence log for `persist`-flagged predicates.
//!
//! Format: one record per line, `<op> <uuid> <term>`, where `<op>` is `a`
//! (asserta), `z` (assertz) or `e` (erase) and `<term>` is this crate's own
//! canonical cell-stream encoding (not Prolog surface syntax — the reader
//! that would produce that syntax is out of scope, per spec §1). Replay
//! applies records in file order, grounded on `module_load_fp` /
//! `module_save_file` in the original runtime.

use std::fmt::Write as _;
use std::io::{self, BufRead, Write};

use crate::engine::atoms::{AtomOffset, AtomTable};
use crate::engine::cell::{Cell, Payload, Tag};
use crate::engine::clause::Uuid;
use crate::engine::term::Term;

#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    Asserta { uuid: Uuid, term: Term },
    Assertz { uuid: Uuid, term: Term },
    Erase { uuid: Uuid },
}

/// Append `record` to `w` as one line.
pub fn write_record(w: &mut impl Write, atoms: &AtomTable, record: &Record) -> io::Result<()> {
    match record {
        Record::Asserta { uuid, term } => writeln!(w, "a {uuid} {}", encode_term(atoms, term)),
        Record::Assertz { uuid, term } => writeln!(w, "z {uuid} {}", encode_term(atoms, term)),
        Record::Erase { uuid } => writeln!(w, "e {uuid}"),
    }
}

/// Parse every line of `r` into a [`Record`], in file order.
pub fn read_log(r: impl BufRead, atoms: &mut AtomTable) -> Result<Vec<Record>, String> {
    let mut out = Vec::new();
    for (lineno, line) in r.lines().enumerate() {
        let line = line.map_err(|e| format!("line {}: {e}", lineno + 1))?;
        if line.trim().is_empty() {
            continue;
        }
        out.push(parse_record(&line, atoms).map_err(|e| format!("line {}: {e}", lineno + 1))?);
    }
    Ok(out)
}

fn parse_record(line: &str, atoms: &mut AtomTable) -> Result<Record, String> {
    let mut parts = line.splitn(3, ' ');
    let op = parts.next().ok_or("missing opcode")?;
    let uuid_str = parts.next().ok_or("missing uuid")?;
    let uuid: Uuid = uuid_str.parse().map_err(|_| format!("malformed uuid {uuid_str:?}"))?;
    match op {
        "e" => Ok(Record::Erase { uuid }),
        "a" | "z" => {
            let rest = parts.next().ok_or("missing term")?;
            let term = decode_term(rest, atoms)?;
            Ok(if op == "a" { Record::Asserta { uuid, term } } else { Record::Assertz { uuid, term } })
        }
        other => Err(format!("unknown opcode {other:?}")),
    }
}

/// Encode a cell stream as whitespace-separated tokens, pre-order. Each
/// token is `tag:payload`; atom names are written out in full (not just
/// their offset) so the log is portable across engine instances whose atom
/// tables were populated in a different order.
fn encode_term(atoms: &AtomTable, term: &Term) -> String {
    let mut out = format!("{}", term.nbr_vars);
    for cell in &term.cells {
        out.push(' ');
        encode_cell(atoms, cell, &mut out);
    }
    out
}

fn encode_cell(atoms: &AtomTable, cell: &Cell, out: &mut String) {
    match cell.tag {
        Tag::Var => {
            let Payload::Var(slot) = cell.payload else { unreachable!() };
            write!(out, "v:{slot}").unwrap();
        }
        Tag::Literal => {
            let name = cell.functor_key().map(|k| atoms.name(k.atom)).unwrap_or("");
            write!(out, "l:{}:{}:{}", cell.arity, cell.nbr_cells, escape(name)).unwrap();
        }
        Tag::Int => {
            let Payload::Int { num, den } = cell.payload else { unreachable!() };
            write!(out, "i:{num}:{den}").unwrap();
        }
        Tag::Float => {
            let Payload::Float(f) = cell.payload else { unreachable!() };
            write!(out, "f:{}", f.to_bits()).unwrap();
        }
        Tag::Str => {
            let Payload::Str(s) = &cell.payload else { unreachable!() };
            write!(out, "s:{}", escape(s)).unwrap();
        }
        Tag::Empty | Tag::Indirect | Tag::End => {
            // Not expected in a clause template written to the log — a
            // clause's stored term never carries a live heap binding.
            write!(out, "_").unwrap();
        }
    }
}

fn escape(s: &str) -> String {
    s.replace('\\', "\\\\").replace(' ', "\\s")
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some('s') => out.push(' '),
                Some('\\') => out.push('\\'),
                Some(other) => out.push(other),
                None => {}
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn decode_term(rest: &str, atoms: &mut AtomTable) -> Result<Term, String> {
    let mut tokens = rest.split(' ');
    let nbr_vars: u32 = tokens
        .next()
        .ok_or("missing var count")?
        .parse()
        .map_err(|_| "malformed var count")?;
    let mut cells = Vec::new();
    for token in tokens {
        cells.push(decode_cell(token, atoms)?);
    }
    if cells.is_empty() {
        return Err("empty term".to_string());
    }
    Ok(Term::new(cells, nbr_vars))
}

fn decode_cell(token: &str, atoms: &mut AtomTable) -> Result<Cell, String> {
    let mut fields = token.splitn(2, ':');
    let tag = fields.next().ok_or("missing tag")?;
    let rest = fields.next().unwrap_or("");
    match tag {
        "v" => {
            let slot: u32 = rest.parse().map_err(|_| "malformed var slot")?;
            Ok(Cell::var(slot))
        }
        "l" => {
            let mut parts = rest.splitn(3, ':');
            let arity: u8 = parts.next().ok_or("missing arity")?.parse().map_err(|_| "bad arity")?;
            let nbr_cells: u32 =
                parts.next().ok_or("missing nbr_cells")?.parse().map_err(|_| "bad nbr_cells")?;
            let name = unescape(parts.next().ok_or("missing atom name")?);
            let offset: AtomOffset = atoms.intern(&name);
            let mut cell = Cell::functor(offset, arity);
            cell.nbr_cells = nbr_cells;
            Ok(cell)
        }
        "i" => {
            let mut parts = rest.splitn(2, ':');
            let num: i64 = parts.next().ok_or("missing numerator")?.parse().map_err(|_| "bad numerator")?;
            let den: i64 =
                parts.next().ok_or("missing denominator")?.parse().map_err(|_| "bad denominator")?;
            Ok(Cell::rational(num, den))
        }
        "f" => {
            let bits: u64 = rest.parse().map_err(|_| "bad float bits")?;
            Ok(Cell::float(f64::from_bits(bits)))
        }
        "s" => Ok(Cell::string(unescape(rest))),
        "_" => Ok(Cell::end()),
        other => Err(format!("unknown cell tag {other:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::term::TermBuf;

    #[test]
    fn record_roundtrips_through_text() {
        let mut atoms = AtomTable::new();
        let f = atoms.intern("likes");
        let mut buf = TermBuf::new();
        let mark = buf.open_functor(Cell::functor(f, 2));
        buf.push_leaf(Cell::var(0));
        buf.push_leaf(Cell::atom(atoms.intern("pizza")));
        buf.close_functor(mark);
        let term = buf.finish(1);

        let uuid = Uuid::generate(1);
        let record = Record::Assertz { uuid, term: term.clone() };

        let mut out = Vec::new();
        write_record(&mut out, &atoms, &record).unwrap();
        let text = String::from_utf8(out).unwrap();

        let parsed = read_log(text.as_bytes(), &mut atoms).unwrap();
        assert_eq!(parsed.len(), 1);
        match &parsed[0] {
            Record::Assertz { uuid: u2, term: t2 } => {
                assert_eq!(*u2, uuid);
                assert_eq!(t2.cells.len(), term.cells.len());
                assert_eq!(t2.nbr_vars, term.nbr_vars);
            }
            _ => panic!("expected an assertz record"),
        }
    }

    #[test]
    fn erase_record_has_no_term() {
        let atoms = AtomTable::new();
        let mut out = Vec::new();
        let uuid = Uuid::generate(2);
        write_record(&mut out, &atoms, &Record::Erase { uuid }).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.trim_end(), format!("e {uuid}"));
    }
}
