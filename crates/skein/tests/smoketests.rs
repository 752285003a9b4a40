use clap::ValueEnum as _;
use skein::{
    compile::{build_parser, build_scanner, AdvanceMode, BuildConfig, BuildError, TableLayout},
    fsm::{RegExpr, ScannerDef, TokenDef},
    grammar::{Grammar, LangElId, ProdId},
    key::Key,
    samples::{self, GrammarSample, ScannerSample},
};
use skein_tables::{FsmTables, PdaAction, PdaTables};

fn config(advance: AdvanceMode, layout: TableLayout) -> BuildConfig {
    BuildConfig {
        advance,
        layout,
        ..BuildConfig::default()
    }
}

/// Drive the tables like a parser that always takes the first action.
/// Returns the reduced productions in order, or `None` on a syntax error.
fn parse(tables: &PdaTables, grammar: &Grammar, input: &[&str]) -> Option<Vec<ProdId>> {
    let root = grammar.roots[0];
    let eof = grammar.eof_of(root);
    let mut tokens = input
        .iter()
        .map(|name| grammar.find(name).expect("known terminal").id)
        .chain(Some(eof))
        .peekable();

    let mut stack = vec![tables.start_states[0] as usize];
    let mut reduced = vec![];

    // Pop the right-hand side of `prod` and take the goto on its lhs,
    // following fused reductions on the way.
    let reduce = |stack: &mut Vec<usize>, reduced: &mut Vec<ProdId>, mut prod: u32| -> Option<()> {
        loop {
            let id = ProdId::from_raw(prod);
            let production = grammar.production(id);
            reduced.push(id);
            let len = stack.len().checked_sub(production.fsm_length)?;
            stack.truncate(len);
            let top = *stack.last()?;
            let set = tables.action_set(top, production.lhs.raw() as i32)?;
            stack.push(tables.target(set) as usize);
            match tables.actions(set).next()? {
                PdaAction::Shift => return Some(()),
                PdaAction::ShiftReduce(next) => prod = next,
                PdaAction::Reduce(..) => return None,
            }
        }
    };

    loop {
        let key: LangElId = *tokens.peek()?;
        let top = *stack.last()?;
        let set = tables.action_set(top, key.raw() as i32)?;
        match tables.actions(set).next()? {
            PdaAction::Shift if key == eof => return Some(reduced),
            PdaAction::Shift => {
                stack.push(tables.target(set) as usize);
                tokens.next();
            }
            PdaAction::ShiftReduce(prod) => {
                stack.push(tables.target(set) as usize);
                tokens.next();
                reduce(&mut stack, &mut reduced, prod)?;
            }
            PdaAction::Reduce(prod) => reduce(&mut stack, &mut reduced, prod)?,
        }
    }
}

fn all_tables(grammar: &Grammar) -> Vec<PdaTables> {
    let mut out = vec![];
    for advance in AdvanceMode::value_variants() {
        for layout in TableLayout::value_variants() {
            let parser = build_parser(grammar, &config(*advance, *layout)).unwrap();
            out.push(parser.tables);
        }
    }
    out
}

#[test]
fn calc_precedence_and_associativity() {
    let (_, g) = samples::calc();
    let prod = |i: usize| g.productions[i].id;
    let (plus, minus, star, num) = (prod(0), prod(1), prod(2), prod(5));

    for tables in all_tables(&g) {
        let reduced = parse(&tables, &g, &["NUM", "PLUS", "NUM", "STAR", "NUM"]).unwrap();
        assert_eq!(reduced, [num, num, num, star, plus]);

        let reduced = parse(&tables, &g, &["NUM", "MINUS", "NUM", "MINUS", "NUM"]).unwrap();
        assert_eq!(reduced, [num, num, minus, num, minus]);

        let input = ["LPAREN", "NUM", "PLUS", "NUM", "RPAREN", "STAR", "NUM"];
        let reduced = parse(&tables, &g, &input).unwrap();
        assert_eq!(reduced.last(), Some(&star));
    }
}

#[test]
fn advancing_reductions_keeps_the_language() {
    let inputs: &[&[&str]] = &[
        &["NUM"],
        &["NUM", "PLUS"],
        &["NUM", "NUM"],
        &[],
        &["LPAREN", "NUM"],
        &["LPAREN", "LPAREN", "NUM", "RPAREN", "SLASH", "NUM", "RPAREN"],
        &["STAR", "NUM"],
    ];
    let (_, g) = samples::calc();
    let tables = all_tables(&g);
    for input in inputs {
        let results: Vec<_> = tables.iter().map(|t| parse(t, &g, input)).collect();
        assert!(
            results.windows(2).all(|w| w[0] == w[1]),
            "{:?}: {:?}",
            input,
            results
        );
    }
    assert!(parse(&tables[0], &g, &["NUM", "PLUS"]).is_none());
    assert!(parse(&tables[0], &g, &["LPAREN", "NUM", "RPAREN"]).is_some());
}

#[test]
fn lists_with_commits() {
    let g = GrammarSample::Lists.grammar().unwrap();
    let parser = build_parser(&g, &BuildConfig::default()).unwrap();
    assert!(parser.tables.commit_len.iter().any(|&c| c != 0));
    assert!(parse(&parser.tables, &g, &["WORD", "WORD", "SEMI", "WORD", "SEMI"]).is_some());
    assert!(parse(&parser.tables, &g, &["WORD", "SEMI", "SEMI"]).is_none());
}

#[test]
fn blocks_stop_without_end_of_input() {
    let g = GrammarSample::Blocks.grammar().unwrap();
    for advance in AdvanceMode::value_variants() {
        let parser = build_parser(&g, &config(*advance, TableLayout::Packed)).unwrap();
        assert!(parser.graph.diagnostics.is_empty());
        let input = ["OPEN", "WORD", "OPEN", "CLOSE", "CLOSE"];
        assert!(parse(&parser.tables, &g, &input).is_some());
        assert!(parse(&parser.tables, &g, &input[..4]).is_none());
    }
}

#[test]
fn every_sample_builds() {
    for sample in GrammarSample::value_variants() {
        let g = sample.grammar().unwrap();
        build_parser(&g, &BuildConfig::default()).unwrap();
    }
    for sample in ScannerSample::value_variants() {
        let scanner = build_scanner(&sample.scanner_def(), &BuildConfig::default()).unwrap();
        scanner.tables.validate().unwrap();
    }
}

fn scan(tables: &FsmTables, mut state: usize, input: &str) -> Option<usize> {
    for key in input.bytes().map(|b| b as Key) {
        let trans = tables.transition(state, key)?;
        state = tables.target(trans)?;
        if tables.error_state >= 0 && state == tables.error_state as usize {
            return None;
        }
    }
    Some(state)
}

#[test]
fn calc_scanner_region_entry() {
    let (def, _) = samples::calc();
    let scanner = build_scanner(&def, &BuildConfig::default()).unwrap();
    let tables = &scanner.tables;
    assert_eq!(tables.entry_by_region.len(), 1);
    let entry = tables.entry_by_region[0];
    assert!(entry >= 0);

    assert!(scan(tables, entry as usize, "12").is_some());
    assert!(scan(tables, entry as usize, "@").is_none());
}

#[test]
fn undefined_references_fail_the_scanner_build() {
    let mut def = ScannerDef::new();
    def.region("main", vec![TokenDef::new("word", RegExpr::reference("wrod"))]);
    let Err(BuildError::Diagnostics(diag)) = build_scanner(&def, &BuildConfig::default()) else {
        panic!("expected diagnostics");
    };
    assert!(diag.has_errors());
    let rendered = diag.to_string();
    assert!(rendered.contains("graph lookup of wrod failed"), "{}", rendered);
}
