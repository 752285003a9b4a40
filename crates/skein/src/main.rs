use anyhow::Context as _;
use clap::{Args, Parser, Subcommand};
use skein::{
    compile::{build_parser, build_scanner, AdvanceMode, BuildConfig, MinimizeLevel, TableLayout},
    fsm::Builtin,
    key::{HostType, KeyAlphabet},
    red::RedFsmBuild,
    samples::{GrammarSample, ScannerSample},
};
use std::time::Instant;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    config: ConfigArgs,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Dump the reduced machine of a builtin.
    Builtin {
        /// The builtin name, e.g. `digit` or `xdigit`.
        name: String,
    },
    /// Build a bundled scanner and print its tables.
    Scanner {
        #[arg(value_enum)]
        sample: ScannerSample,
    },
    /// Build a bundled grammar and print its parse tables.
    Grammar {
        #[arg(value_enum)]
        sample: GrammarSample,
    },
}

#[derive(Debug, Args)]
struct ConfigArgs {
    /// The host type of the scanner alphabet.
    #[arg(long, global = true, default_value = "char")]
    alphtype: String,

    /// Give every reduced scanner state a transition on every key.
    #[arg(long, global = true)]
    complete: bool,

    #[arg(long, global = true, value_enum, default_value_t = MinimizeLevel::Most)]
    minimize: MinimizeLevel,

    #[arg(long, global = true, value_enum, default_value_t = AdvanceMode::All)]
    advance: AdvanceMode,

    #[arg(long, global = true, value_enum, default_value_t = TableLayout::Linear)]
    layout: TableLayout,

    /// Print the automata as well as the tables.
    #[arg(long, global = true)]
    dump: bool,
}

impl ConfigArgs {
    fn build_config(&self) -> anyhow::Result<BuildConfig> {
        let host = HostType::from_name(&self.alphtype)
            .with_context(|| anyhow::anyhow!("unknown alphabet type `{}'", self.alphtype))?;
        Ok(BuildConfig {
            alphabet: KeyAlphabet::new(host),
            want_complete: self.complete,
            minimize: self.minimize,
            advance: self.advance,
            layout: self.layout,
        })
    }
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    tracing::debug!("parsed CLI args = {:?}", cli);

    let config = cli.config.build_config()?;
    match cli.command {
        Command::Builtin { name } => dump_builtin(&name, &config),
        Command::Scanner { sample } => scanner(sample, &config, cli.config.dump),
        Command::Grammar { sample } => grammar(sample, &config, cli.config.dump),
    }
}

fn dump_builtin(name: &str, config: &BuildConfig) -> anyhow::Result<()> {
    let builtin = Builtin::from_name(name)
        .with_context(|| anyhow::anyhow!("unknown builtin `{}'", name))?;

    let mut graph = builtin.make_fsm(&config.alphabet);
    if config.want_complete {
        graph.add_error_state();
    }
    graph.depth_first_ordering();
    graph.sort_states_by_final();
    graph.set_state_numbers();

    let red = RedFsmBuild::new(&graph, config.alphabet)
        .want_complete(config.want_complete)
        .reduce_machine();
    println!("{}", red.display());
    Ok(())
}

fn scanner(sample: ScannerSample, config: &BuildConfig, dump: bool) -> anyhow::Result<()> {
    let def = sample.scanner_def();

    let s = Instant::now();
    let scanner = build_scanner(&def, config)
        .with_context(|| anyhow::anyhow!("failed to build the {:?} scanner", sample))?;
    tracing::info!("build_scanner: {:?} elapsed", s.elapsed());

    if !scanner.graph.diagnostics.is_empty() {
        eprint!("{}", scanner.graph.diagnostics);
    }
    if dump {
        println!("{}", scanner.graph.graph.display());
        println!("{}", scanner.red.display());
    }
    println!("{:#?}", scanner.tables);
    Ok(())
}

fn grammar(sample: GrammarSample, config: &BuildConfig, dump: bool) -> anyhow::Result<()> {
    let grammar = sample
        .grammar()
        .with_context(|| anyhow::anyhow!("invalid {:?} grammar", sample))?;

    let s = Instant::now();
    let parser = build_parser(&grammar, config)
        .with_context(|| anyhow::anyhow!("failed to build the {:?} parser", sample))?;
    tracing::info!("build_parser: {:?} elapsed", s.elapsed());

    if !parser.graph.diagnostics.is_empty() {
        eprint!("{}", parser.graph.diagnostics);
    }
    if dump {
        println!("{}", grammar);
        println!("{}", parser.graph.display(&grammar));
    }
    println!("{:#?}", parser.tables);
    Ok(())
}
