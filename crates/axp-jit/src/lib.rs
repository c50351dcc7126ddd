//! Compiled-code tier contract (spec.md §9, ambient expansion §4.12).
//!
//! `axp-jit` does not implement a native codegen backend -- that is out
//! of scope for this core's budget. It specifies the `JitBackend`
//! contract a real backend would have to satisfy and ships
//! [`InterpreterBackend`], a trivial backend that re-runs the tier-0
//! interpreter. [`JitEngine`] wraps any backend with per-block hit
//! counting so a block is only "compiled" once it has run often enough
//! to be worth it.

mod backend;
mod engine;
mod interpreter_backend;

pub use backend::JitBackend;
pub use engine::{JitEngine, JitStep, DEFAULT_JIT_THRESHOLD};
pub use interpreter_backend::{InterpretedBlock, InterpreterBackend};
