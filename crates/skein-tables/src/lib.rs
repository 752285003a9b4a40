//! Packed automaton tables produced by `skein` and consumed by code emitters.

pub mod fsm;
pub mod pda;

pub use crate::{
    fsm::FsmTables,
    pda::{PdaAction, PdaTables},
};

/// Structural problems found while checking a set of packed tables.
#[derive(Debug, thiserror::Error)]
pub enum TableError {
    #[error("table `{table}` has {actual} entries, expected {expected}")]
    Length {
        table: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("state {state} is out of range (num_states = {num_states})")]
    StateOutOfRange { state: usize, num_states: usize },

    #[error("entry {index} of `{table}` points outside of its target table")]
    Dangling { table: &'static str, index: usize },

    #[error("action list {index} is not terminated")]
    Unterminated { index: usize },
}

fn check_len(table: &'static str, actual: usize, expected: usize) -> Result<(), TableError> {
    if actual != expected {
        return Err(TableError::Length {
            table,
            expected,
            actual,
        });
    }
    Ok(())
}
