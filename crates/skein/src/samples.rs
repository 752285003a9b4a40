//! Bundled definitions, used by the command line tool, the benches and
//! the integration tests.

use crate::{
    fsm::{RegExpr, ScannerDef, TokenDef},
    grammar::{Grammar, GrammarDefError, PredType, Symbol},
};

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum ScannerSample {
    /// Numbers and arithmetic operators.
    Calc,
    /// A keyword competing with identifiers.
    Keywords,
}

impl ScannerSample {
    pub fn scanner_def(self) -> ScannerDef {
        match self {
            Self::Calc => calc().0,
            Self::Keywords => keywords(),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, clap::ValueEnum)]
pub enum GrammarSample {
    /// Arithmetic with precedence declarations.
    Calc,
    /// Balanced blocks with a `parse_stop` root.
    Blocks,
    /// Statement lists with commit points and a shortest-match element.
    Lists,
}

impl GrammarSample {
    pub fn grammar(self) -> Result<Grammar, GrammarDefError> {
        match self {
            Self::Calc => Ok(calc().1),
            Self::Blocks => blocks(),
            Self::Lists => lists(),
        }
    }
}

/// The calculator scanner, and a grammar whose terminals are its tokens.
pub fn calc() -> (ScannerDef, Grammar) {
    let mut def = ScannerDef::new();
    let region = def.region(
        "main",
        vec![
            TokenDef::new("NUM", RegExpr::reference("digit").plus()),
            TokenDef::new("PLUS", RegExpr::lit("+")),
            TokenDef::new("MINUS", RegExpr::lit("-")),
            TokenDef::new("STAR", RegExpr::lit("*")),
            TokenDef::new("SLASH", RegExpr::lit("/")),
            TokenDef::new("LPAREN", RegExpr::lit("(")),
            TokenDef::new("RPAREN", RegExpr::lit(")")),
            TokenDef::new("ws", RegExpr::reference("space").plus()).ignore(),
        ],
    );

    let grammar = Grammar::define(|g| {
        let num = g.terminal("NUM")?;
        let plus = g.terminal("PLUS")?;
        let minus = g.terminal("MINUS")?;
        let star = g.terminal("STAR")?;
        let slash = g.terminal("SLASH")?;
        let lparen = g.terminal("LPAREN")?;
        let rparen = g.terminal("RPAREN")?;
        for t in [num, plus, minus, star, slash, lparen, rparen] {
            g.token_region(t, region, None)?;
        }

        let expr = g.nonterminal("expr")?;
        g.precedence(PredType::Left, [plus, minus]);
        g.precedence(PredType::Left, [star, slash]);
        for op in [plus, minus, star, slash] {
            g.production(expr, [expr, op, expr])?;
        }
        g.production(expr, [lparen, expr, rparen])?;
        g.production(expr, [num])?;
        g.parser(expr)?;
        Ok(())
    })
    .expect("the calculator grammar is well formed");

    (def, grammar)
}

fn keywords() -> ScannerDef {
    let mut def = ScannerDef::new();
    def.define(
        "identifier",
        RegExpr::Concat(vec![
            RegExpr::Union(vec![RegExpr::reference("alpha"), RegExpr::lit("_")]),
            RegExpr::Union(vec![RegExpr::reference("alnum"), RegExpr::lit("_")]).star(),
        ]),
    );
    def.region(
        "main",
        vec![
            TokenDef::new("kw_if", RegExpr::lit("if")),
            TokenDef::new("kw_else", RegExpr::lit_ci("else")),
            TokenDef::new("ident", RegExpr::reference("identifier")),
            TokenDef::new("ws", RegExpr::reference("space").plus()).ignore(),
        ],
    );
    def
}

fn blocks() -> Result<Grammar, GrammarDefError> {
    Grammar::define(|g| {
        let open = g.terminal("OPEN")?;
        let close = g.terminal("CLOSE")?;
        let word = g.terminal("WORD")?;
        let block = g.nonterminal("block")?;
        let items = g.nonterminal("items")?;
        let item = g.nonterminal("item")?;
        g.production(block, [open, items, close])?;
        g.production(items, [items, item])?;
        g.production(items, Vec::<Symbol>::new())?;
        g.production(item, [word])?;
        g.production(item, [block])?;
        g.parse_stop(block)?;
        Ok(())
    })
}

fn lists() -> Result<Grammar, GrammarDefError> {
    Grammar::define(|g| {
        let word = g.terminal("WORD")?;
        let semi = g.terminal("SEMI")?;
        let stmts = g.nonterminal("stmts")?;
        let stmt = g.nonterminal("stmt")?;
        let words = g.nonterminal("words")?;
        g.production(stmts, [stmts, stmt])?;
        g.production(stmts, [stmt])?;
        let end = g.production(stmt, [words.into(), semi.commit()])?;
        g.commit(end);
        g.production(words, [words, word])?;
        g.production(words, [word])?;
        g.reduce_first(words);
        g.parser(stmts)?;
        Ok(())
    })
}
