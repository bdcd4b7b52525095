#![forbid(unsafe_code)]
#![deny(unused_must_use)]

pub mod error;
pub mod eval;
pub mod store;
pub mod trace;

pub use error::EvalError;
pub use eval::{run_program, Env, Evaluator, RunOptions, Value};
pub use store::{Address, HeapStore, Memory, StackStore, Store};
