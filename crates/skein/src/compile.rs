//! Build configuration and the end-to-end drivers.

use crate::{
    diag::Diagnostics,
    fsm::{make_scanner, ScannerDef, ScannerGraph},
    grammar::Grammar,
    key::KeyAlphabet,
    pda::{make_pda_graph, make_pda_tables, ParserGraph},
    red::{RedFsm, RedFsmBuild},
};
use skein_tables::{FsmTables, PdaTables, TableError};

/// How often the scanner machines are minimized.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum MinimizeLevel {
    /// Never.
    None,
    /// Once, on the final machine.
    End,
    /// At the end of each operator sequence and on the final machine.
    #[default]
    Most,
    /// After every operator.
    Every,
}

/// Which parser states fold their reductions into the preceding shift.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum AdvanceMode {
    /// Every state that can.
    #[default]
    All,
    /// Only the states that need the end of input of a `parse_stop` root.
    ParseStopOnly,
}

/// How the per-state index spans of `PdaTables` are placed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum TableLayout {
    /// One span after the other.
    #[default]
    Linear,
    /// Interleaved wherever the slots are free, told apart by `owners`.
    Packed,
}

#[derive(Debug, Clone, Default)]
pub struct BuildConfig {
    pub alphabet: KeyAlphabet,
    /// Fill the gaps of every reduced state with error transitions.
    pub want_complete: bool,
    pub minimize: MinimizeLevel,
    pub advance: AdvanceMode,
    pub layout: TableLayout,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// The definitions have errors; no output is produced.
    #[error("{0}")]
    Diagnostics(Diagnostics),

    #[error("inconsistent tables: {0}")]
    Table(#[from] TableError),
}

/// A reduced scanner and its packed tables.
#[derive(Debug)]
pub struct Scanner {
    pub graph: ScannerGraph,
    pub red: RedFsm,
    pub tables: FsmTables,
}

/// Build the scanner of `def` down to its packed tables.
pub fn build_scanner(def: &ScannerDef, config: &BuildConfig) -> Result<Scanner, BuildError> {
    let graph = make_scanner(def, config)?;
    let red = RedFsmBuild::new(&graph.graph, config.alphabet)
        .names(&graph.names)
        .region_entries(graph.regions.iter().map(|region| region.entry_name))
        .want_complete(config.want_complete)
        .reduce_machine();
    tracing::debug!("reduced scanner has {} states", red.num_states());
    let tables = red.make_fsm_tables()?;
    Ok(Scanner { graph, red, tables })
}

/// An analyzed parser and its packed tables.
#[derive(Debug)]
pub struct Parser {
    pub graph: ParserGraph,
    pub tables: PdaTables,
}

/// Build the parser of `grammar` down to its packed tables.
pub fn build_parser(grammar: &Grammar, config: &BuildConfig) -> Result<Parser, BuildError> {
    let graph = make_pda_graph(grammar, config)?;
    let tables = make_pda_tables(&graph, grammar, config.layout)?;
    Ok(Parser { graph, tables })
}
