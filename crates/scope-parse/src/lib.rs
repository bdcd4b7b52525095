#![forbid(unsafe_code)]
#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]

mod lexer;
mod parser;
mod token;

pub use lexer::MAX_TOKENS;
pub use parser::{parse_str, MAX_NESTING_DEPTH};
