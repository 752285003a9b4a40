//! The reduced scanner: numbered states, flat transition lists and shared
//! action lists, ready to be packed into tables.

mod build;
mod tables;

pub use self::build::RedFsmBuild;

use crate::{
    fsm::ActionId,
    fsm::NameId,
    key::Key,
    util::{display_fn, display_key},
};
use std::fmt;

/// An ordered action list shared by every table that runs the same actions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedAction {
    pub id: usize,
    pub actions: Vec<ActionId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedTrans {
    pub low: Key,
    pub high: Key,
    /// `None` when the transition fails and there is no error state.
    pub target: Option<usize>,
    pub action: Option<usize>,
}

#[derive(Debug, Clone, Default)]
pub struct RedState {
    pub id: usize,
    pub out: Vec<RedTrans>,
    pub is_final: bool,
    pub to_state_action: Option<usize>,
    pub from_state_action: Option<usize>,
    pub eof_action: Option<usize>,
    pub eof_target: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct RedEntry {
    pub name_id: NameId,
    pub name: String,
    pub state: usize,
}

#[derive(Debug, Clone)]
pub struct RedFsm {
    pub states: Vec<RedState>,
    pub actions: Vec<RedAction>,
    pub entries: Vec<RedEntry>,
    /// Index into `entries` of each region's entry point.
    pub region_to_entry: Vec<Option<usize>>,
    pub start_state: usize,
    pub err_state: Option<usize>,
    pub first_final_state: usize,
    pub max_key: Key,
    pub want_complete: bool,
    /// Set when completing the machine produced error transitions but the
    /// graph has no error state; the emitter has to provide one.
    pub forced_error_state: bool,
}

impl RedFsm {
    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn display(&self) -> impl fmt::Display + '_ {
        display_fn(move |f| {
            writeln!(f, "## actions")?;
            for action in &self.actions {
                writeln!(f, "- {}: {:?}", action.id, action.actions)?;
            }
            writeln!(f, "## entries")?;
            for entry in &self.entries {
                writeln!(f, "- {} -> {}", entry.name, entry.state)?;
            }
            writeln!(
                f,
                "## states (start = {}, first final = {})",
                self.start_state, self.first_final_state
            )?;
            for state in &self.states {
                write!(f, "- {:03}", state.id)?;
                if Some(state.id) == self.err_state {
                    f.write_str(" (error)")?;
                }
                if state.is_final {
                    f.write_str(" (final)")?;
                }
                if let Some(act) = state.to_state_action {
                    write!(f, " to={}", act)?;
                }
                if let Some(act) = state.from_state_action {
                    write!(f, " from={}", act)?;
                }
                if let Some(act) = state.eof_action {
                    write!(f, " eof={}", act)?;
                }
                if let Some(targ) = state.eof_target {
                    write!(f, " eof_targ={}", targ)?;
                }
                writeln!(f)?;
                for trans in &state.out {
                    write!(f, "  {}..{}", display_key(trans.low), display_key(trans.high))?;
                    match trans.target {
                        Some(targ) => write!(f, " -> {}", targ)?,
                        None => f.write_str(" -> <err>")?,
                    }
                    if let Some(act) = trans.action {
                        write!(f, " / {}", act)?;
                    }
                    writeln!(f)?;
                }
            }
            Ok(())
        })
    }
}
