//! A self-hosted Prolog execution engine.
//!
//! This crate is the execution core of a Prolog interpreter: term
//! representation, the clause store with first-argument indexing,
//! unification, trail-based backtracking, and the SLD-resolution dispatcher
//! that ties them together. The surface-syntax parser, directive/module
//! loader, I/O built-ins, and REPL are intentionally not part of this crate —
//! they are external collaborators that drive the engine through
//! [`engine::Engine`] and the narrow [`engine::builtins::BuiltinFn`]
//! interface.

pub mod engine;

pub use engine::{Engine, EngineConfig, EngineError};
