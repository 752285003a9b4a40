//! Construction of scanner and parser automata.
//!
//! Scanners are built from regular expressions grouped into longest-match
//! regions, parsers from context-free grammars through an LALR(1)
//! automaton. Both end up as the packed tables of [`skein_tables`].

pub mod compile;
pub mod diag;
pub mod first_sets;
pub mod fsm;
pub mod grammar;
pub mod key;
pub mod pda;
pub mod red;
pub mod samples;
pub mod types;
pub mod util;

pub use crate::compile::{build_parser, build_scanner, BuildConfig, BuildError};
