//! Grammar types.

use crate::{
    fsm::RegionId,
    pda::{prod_fsm::make_prod_fsms, PdaGraph},
    types::{Map, OrdSet},
    util::display_fn,
};
use std::fmt;

/// The id of a language element in the shared token/parser id space.
///
/// Id 0 is never given to an element; parsers use it as the stack
/// sentinel.
#[derive(Copy, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct LangElId(u32);
impl fmt::Debug for LangElId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "E#{:03}", self.0)
    }
}
impl LangElId {
    pub const SENTINEL: Self = Self(0);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    pub const fn raw(self) -> u32 {
        self.0
    }
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(transparent)]
pub struct ProdId(u32);
impl fmt::Debug for ProdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "D#{:03}", self.0)
    }
}
impl ProdId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    pub const fn raw(self) -> u32 {
        self.0
    }
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A language element as handed out by [`GrammarDef`], before the final
/// ids are assigned. Use [`Grammar::id`] to translate it.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Symbol {
    raw: u32,
}

impl Symbol {
    /// Use this symbol in a production with a shift priority.
    pub fn prior(self, prior: i64) -> ElemDef {
        ElemDef::from(self).prior(prior)
    }

    /// Use this symbol in a production as a commit point.
    pub fn commit(self) -> ElemDef {
        ElemDef::from(self).commit()
    }
}

/// One right-hand side element passed to [`GrammarDef::production`].
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct ElemDef {
    sym: Symbol,
    prior: i64,
    commit: bool,
}

impl ElemDef {
    pub fn prior(mut self, prior: i64) -> Self {
        self.prior = prior;
        self
    }

    pub fn commit(mut self) -> Self {
        self.commit = true;
        self
    }
}

impl From<Symbol> for ElemDef {
    fn from(sym: Symbol) -> Self {
        Self {
            sym,
            prior: 0,
            commit: false,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LangElKind {
    Term,
    NonTerm,
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub enum PredType {
    #[default]
    None,
    Left,
    Right,
    Nonassoc,
}

impl fmt::Display for PredType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::None => f.write_str("none"),
            Self::Left => f.write_str("left"),
            Self::Right => f.write_str("right"),
            Self::Nonassoc => f.write_str("nonassoc"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct LangEl {
    pub id: LangElId,
    pub name: String,
    pub kind: LangElKind,
    pub is_eof: bool,
    pub pred: PredType,
    pub pred_value: u32,
    /// Order the productions of this nonterminal for the shortest match.
    pub reduce_first: bool,
    pub parse_stop: bool,
    /// The scanner region this terminal is matched in.
    pub token_region: Option<RegionId>,
    /// The region scanned for ignored tokens before the next token, once
    /// this terminal has been shifted.
    pub pre_region: Option<RegionId>,
    /// Nonterminals and their `_T_` terminal versions point at each other.
    pub term_dup: Option<LangElId>,
    /// Parser roots and their end-of-input elements point at each other.
    pub eof_lel: Option<LangElId>,
    /// The `_root -> X` production of a parser root.
    pub root_def: Option<ProdId>,
    pub productions: Vec<ProdId>,
}

impl LangEl {
    pub(crate) fn new(name: &str, kind: LangElKind) -> Self {
        Self {
            id: LangElId::SENTINEL,
            name: name.to_owned(),
            kind,
            is_eof: false,
            pred: PredType::None,
            pred_value: 0,
            reduce_first: false,
            parse_stop: false,
            token_region: None,
            pre_region: None,
            term_dup: None,
            eof_lel: None,
            root_def: None,
            productions: vec![],
        }
    }

    pub fn is_term(&self) -> bool {
        self.kind == LangElKind::Term
    }

    pub fn is_nonterm(&self) -> bool {
        self.kind == LangElKind::NonTerm
    }
}

impl fmt::Display for LangEl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProdEl {
    pub lang_el: LangElId,
    pub prior_val: i64,
    pub commit: bool,
}

#[derive(Debug, Clone)]
pub struct Production {
    pub id: ProdId,
    /// `lhs-N`, N counting the productions of `lhs` from 1.
    pub name: String,
    pub lhs: LangElId,
    pub rhs: Vec<ProdEl>,
    pub prod_commit: bool,
    /// The element whose precedence this production takes.
    pub pred_of: Option<LangElId>,
    /// The single-path machine over the right-hand side.
    pub fsm: PdaGraph,
    pub fsm_length: usize,
    /// Element ids that can start this production; `-1` stands for the
    /// empty string.
    pub first_set: OrdSet<i64>,
    pub non_term_first_set: OrdSet<i64>,
    pub is_left_rec: bool,
}

impl Production {
    // `"LHS := R1 R2 R3"`
    pub fn display<'g>(&'g self, g: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(|f| {
            write!(f, "{} :=", g.lang_el(self.lhs))?;
            for el in &self.rhs {
                write!(f, " {}", g.lang_el(el.lang_el))?;
                if el.commit {
                    f.write_str("!")?;
                }
            }
            Ok(())
        })
    }
}

/// The first-set marker of the empty string.
pub const EPSILON: i64 = -1;

/// The grammar definition used to derive the parser tables.
#[derive(Debug)]
#[non_exhaustive]
pub struct Grammar {
    pub lang_els: Map<LangElId, LangEl>,
    pub productions: Map<ProdId, Production>,
    /// Parser roots, in declaration order.
    pub roots: Vec<LangElId>,
    pub root_lel: LangElId,
    pub no_token: LangElId,
    pub error: Option<LangElId>,
    /// Every id from here on belongs to a nonterminal.
    pub first_non_term_id: LangElId,
    symbol_ids: Vec<LangElId>,
}

impl Grammar {
    /// Define a grammar using the specified function.
    pub fn define<F>(f: F) -> Result<Self, GrammarDefError>
    where
        F: FnOnce(&mut GrammarDef) -> Result<(), GrammarDefError>,
    {
        let mut def = GrammarDef::default();
        def.no_token = def.push_lel(LangEl::new("_notoken", LangElKind::Term));
        f(&mut def)?;
        def.end()
    }

    /// The final id of an element handed out by [`GrammarDef`].
    pub fn id(&self, sym: Symbol) -> LangElId {
        self.symbol_ids[sym.raw as usize]
    }

    pub fn lang_el(&self, id: LangElId) -> &LangEl {
        &self.lang_els[&id]
    }

    pub fn production(&self, id: ProdId) -> &Production {
        &self.productions[&id]
    }

    pub fn find(&self, name: &str) -> Option<&LangEl> {
        self.lang_els.values().find(|lel| lel.name == name)
    }

    /// Whether `id` names a nonterminal. Ids outside the grammar are not
    /// nonterminals.
    pub fn is_nonterm(&self, id: LangElId) -> bool {
        self.lang_els.get(&id).map_or(false, |lel| lel.is_nonterm())
    }

    /// The end-of-input element of a parser root.
    pub fn eof_of(&self, root: LangElId) -> LangElId {
        self.lang_el(root)
            .eof_lel
            .expect("parser roots have an end-of-input element")
    }

    pub fn max_lel_id(&self) -> LangElId {
        self.lang_els.keys().last().copied().unwrap_or_default()
    }
}

impl fmt::Display for Grammar {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "## terminals:")?;
        for lel in self.lang_els.values().filter(|l| l.is_term()) {
            write!(f, "{:?} {}", lel.id, lel)?;
            if lel.pred != PredType::None {
                write!(f, " (priority={}, assoc={})", lel.pred_value, lel.pred)?;
            }
            if let Some(region) = lel.token_region {
                write!(f, " (region={})", region.raw())?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n## nonterminals:")?;
        for lel in self.lang_els.values().filter(|l| l.is_nonterm()) {
            write!(f, "{:?} {}", lel.id, lel)?;
            if self.roots.contains(&lel.id) {
                f.write_str(" (root)")?;
            }
            if lel.reduce_first {
                f.write_str(" (reduce first)")?;
            }
            writeln!(f)?;
        }

        writeln!(f, "\n## productions:")?;
        for prod in self.productions.values() {
            write!(f, "{}: {}", prod.name, prod.display(self))?;
            if prod.is_left_rec {
                f.write_str(" (left recursive)")?;
            }
            writeln!(f)?;
        }

        Ok(())
    }
}

/// The contextual values for building a `Grammar`.
#[derive(Debug, Default)]
pub struct GrammarDef {
    lels: Vec<LangEl>,
    prods: Vec<Production>,
    roots: Vec<LangElId>,
    no_token: LangElId,
    error: Option<LangElId>,
    next_pred_value: u32,
}

impl GrammarDef {
    fn push_lel(&mut self, lel: LangEl) -> LangElId {
        let id = LangElId(self.lels.len() as u32);
        self.lels.push(lel);
        id
    }

    fn lel(&self, sym: Symbol) -> &LangEl {
        &self.lels[sym.raw as usize]
    }

    fn lel_mut(&mut self, sym: Symbol) -> &mut LangEl {
        &mut self.lels[sym.raw as usize]
    }

    fn declare(&mut self, name: &str, kind: LangElKind) -> Result<Symbol, GrammarDefError> {
        if !verify_name(name) {
            return Err(GrammarDefError::InvalidName(name.to_owned()));
        }
        if self.lels.iter().any(|lel| lel.name == name) {
            return Err(GrammarDefError::Duplicate(name.to_owned()));
        }
        let id = self.push_lel(LangEl::new(name, kind));
        Ok(Symbol { raw: id.0 })
    }

    /// Declare a terminal symbol used in this grammar.
    pub fn terminal(&mut self, name: &str) -> Result<Symbol, GrammarDefError> {
        self.declare(name, LangElKind::Term)
    }

    /// Declare a nonterminal symbol used in this grammar.
    pub fn nonterminal(&mut self, name: &str) -> Result<Symbol, GrammarDefError> {
        self.declare(name, LangElKind::NonTerm)
    }

    /// The error token, usable in productions to resynchronize.
    pub fn error_token(&mut self) -> Symbol {
        let id = match self.error {
            Some(id) => id,
            None => {
                let id = self.push_lel(LangEl::new("_error", LangElKind::Term));
                self.error = Some(id);
                id
            }
        };
        Symbol { raw: id.0 }
    }

    /// Tie a terminal to the scanner region it is matched in, and the
    /// region of ignored tokens scanned after it.
    pub fn token_region(
        &mut self,
        sym: Symbol,
        region: RegionId,
        pre_region: Option<RegionId>,
    ) -> Result<(), GrammarDefError> {
        let lel = self.lel_mut(sym);
        if !lel.is_term() {
            return Err(GrammarDefError::NotTerminal(lel.name.clone()));
        }
        lel.token_region = Some(region);
        lel.pre_region = pre_region;
        Ok(())
    }

    /// Specify a production of `lhs`.
    pub fn production<I>(&mut self, lhs: Symbol, rhs: I) -> Result<ProdId, GrammarDefError>
    where
        I: IntoIterator,
        I::Item: Into<ElemDef>,
    {
        if !self.lel(lhs).is_nonterm() {
            return Err(GrammarDefError::NotNonterminal(self.lel(lhs).name.clone()));
        }
        let rhs: Vec<ProdEl> = rhs
            .into_iter()
            .map(|el| {
                let el = el.into();
                ProdEl {
                    lang_el: LangElId(el.sym.raw),
                    prior_val: el.prior,
                    commit: el.commit,
                }
            })
            .collect();

        let lhs_id = LangElId(lhs.raw);
        if self
            .prods
            .iter()
            .any(|p| p.lhs == lhs_id && p.rhs == rhs)
        {
            return Err(GrammarDefError::Other {
                msg: format!("duplicate production of `{}'", self.lel(lhs).name),
            });
        }

        let id = self.push_prod(lhs_id, rhs);
        self.lel_mut(lhs).productions.push(id);
        Ok(id)
    }

    fn push_prod(&mut self, lhs: LangElId, rhs: Vec<ProdEl>) -> ProdId {
        let id = ProdId(self.prods.len() as u32);
        self.prods.push(Production {
            id,
            name: String::new(),
            lhs,
            rhs,
            prod_commit: false,
            pred_of: None,
            fsm: PdaGraph::new(),
            fsm_length: 0,
            first_set: OrdSet::new(),
            non_term_first_set: OrdSet::new(),
            is_left_rec: false,
        });
        id
    }

    /// Commit the parse once `prod` is reduced.
    pub fn commit(&mut self, prod: ProdId) {
        self.prods[prod.index()].prod_commit = true;
    }

    /// Give `prod` the precedence of `sym` instead of the default.
    pub fn prec(&mut self, prod: ProdId, sym: Symbol) {
        self.prods[prod.index()].pred_of = Some(LangElId(sym.raw));
    }

    /// Declare one precedence level. Later declarations bind tighter.
    pub fn precedence<I>(&mut self, pred: PredType, syms: I)
    where
        I: IntoIterator<Item = Symbol>,
    {
        self.next_pred_value += 1;
        let value = self.next_pred_value;
        for sym in syms {
            let lel = self.lel_mut(sym);
            lel.pred = pred;
            lel.pred_value = value;
        }
    }

    /// Order the productions of `sym` for the shortest match.
    pub fn reduce_first(&mut self, sym: Symbol) {
        self.lel_mut(sym).reduce_first = true;
    }

    /// Declare a parser rooted at `sym`.
    pub fn parser(&mut self, sym: Symbol) -> Result<(), GrammarDefError> {
        if !self.lel(sym).is_nonterm() {
            return Err(GrammarDefError::NotNonterminal(self.lel(sym).name.clone()));
        }
        let id = LangElId(sym.raw);
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
        Ok(())
    }

    /// Declare a parser rooted at `sym` that stops as soon as `sym` is
    /// complete, without looking at the next token.
    pub fn parse_stop(&mut self, sym: Symbol) -> Result<(), GrammarDefError> {
        self.parser(sym)?;
        self.lel_mut(sym).parse_stop = true;
        Ok(())
    }

    fn end(mut self) -> Result<Grammar, GrammarDefError> {
        if self.roots.is_empty() {
            return Err(GrammarDefError::NoParser);
        }
        if let Some(lel) = self
            .lels
            .iter()
            .find(|lel| lel.is_nonterm() && lel.productions.is_empty())
        {
            return Err(GrammarDefError::NoProductions(lel.name.clone()));
        }

        self.make_terminal_wrappers();
        self.make_eof_elements();
        let root_lel = self.wrap_non_terminals();
        self.set_default_precedence();
        let remap = self.make_lang_el_ids();
        let map = |id: LangElId| remap[id.index()];

        let mut lang_els = Map::default();
        for mut lel in self.lels {
            lel.term_dup = lel.term_dup.map(map);
            lel.eof_lel = lel.eof_lel.map(map);
            lang_els.insert(lel.id, lel);
        }
        lang_els.sort_keys();

        let mut productions = Map::default();
        for mut prod in self.prods {
            prod.lhs = map(prod.lhs);
            prod.pred_of = prod.pred_of.map(map);
            for el in &mut prod.rhs {
                el.lang_el = map(el.lang_el);
            }
            productions.insert(prod.id, prod);
        }
        for lel in lang_els.values() {
            for (n, prod) in lel.productions.iter().enumerate() {
                productions[prod].name = format!("{}-{}", lel.name, n + 1);
            }
        }

        let first_non_term_id = lang_els
            .values()
            .find(|lel| lel.is_nonterm())
            .map_or(LangElId(lang_els.len() as u32 + 1), |lel| lel.id);

        let mut grammar = Grammar {
            lang_els,
            productions,
            roots: self.roots.into_iter().map(map).collect(),
            root_lel: map(root_lel),
            no_token: map(self.no_token),
            error: self.error.map(map),
            first_non_term_id,
            symbol_ids: remap,
        };
        make_prod_fsms(&mut grammar);

        tracing::debug!(
            "grammar: {} elements, {} productions",
            grammar.lang_els.len(),
            grammar.productions.len()
        );
        Ok(grammar)
    }

    /// Make a `_T_` terminal for every nonterminal.
    fn make_terminal_wrappers(&mut self) {
        for i in 0..self.lels.len() {
            if self.lels[i].is_nonterm() {
                let name = format!("_T_{}", self.lels[i].name);
                let nt = LangElId(i as u32);
                let mut dup = LangEl::new(&name, LangElKind::Term);
                dup.term_dup = Some(nt);
                let dup = self.push_lel(dup);
                self.lels[i].term_dup = Some(dup);
            }
        }
    }

    /// Make an end-of-input terminal for every parser root.
    fn make_eof_elements(&mut self) {
        for i in 0..self.roots.len() {
            let root = self.roots[i];
            let name = format!("_eof_{}", self.lels[root.index()].name);
            let mut eof = LangEl::new(&name, LangElKind::Term);
            eof.is_eof = true;
            eof.eof_lel = Some(root);
            let eof = self.push_lel(eof);
            self.lels[root.index()].eof_lel = Some(eof);
        }
    }

    /// Make the `_root` nonterminal with one `_root -> X` production per
    /// parser root.
    fn wrap_non_terminals(&mut self) -> LangElId {
        let root_lel = self.push_lel(LangEl::new("_root", LangElKind::NonTerm));
        for i in 0..self.roots.len() {
            let root = self.roots[i];
            let prod = self.push_prod(
                root_lel,
                vec![ProdEl {
                    lang_el: root,
                    prior_val: 0,
                    commit: false,
                }],
            );
            self.lels[root_lel.index()].productions.push(prod);
            self.lels[root.index()].root_def = Some(prod);
        }
        root_lel
    }

    /// Productions without an explicit precedence take the one of their
    /// last element that has one.
    fn set_default_precedence(&mut self) {
        for prod in &mut self.prods {
            if prod.pred_of.is_none() {
                prod.pred_of = prod
                    .rhs
                    .iter()
                    .rev()
                    .map(|el| el.lang_el)
                    .find(|el| self.lels[el.index()].pred != PredType::None);
            }
        }
    }

    /// Assign the final ids: user terminals from 1, then end-of-input
    /// elements, `_notoken`, `_error` and everything else. Returns the map
    /// from definition index to id.
    fn make_lang_el_ids(&mut self) -> Vec<LangElId> {
        let mut remap = vec![LangElId::SENTINEL; self.lels.len()];
        let mut next = 1;
        let mut assign = |remap: &mut Vec<LangElId>, i: usize| {
            remap[i] = LangElId(next);
            next += 1;
        };

        for (i, lel) in self.lels.iter().enumerate() {
            let id = LangElId(i as u32);
            if lel.is_term() && !lel.is_eof && id != self.no_token && Some(id) != self.error {
                assign(&mut remap, i);
            }
        }
        for (i, lel) in self.lels.iter().enumerate() {
            if lel.is_eof {
                assign(&mut remap, i);
            }
        }
        assign(&mut remap, self.no_token.index());
        if let Some(error) = self.error {
            assign(&mut remap, error.index());
        }
        for i in 0..self.lels.len() {
            if remap[i] == LangElId::SENTINEL {
                assign(&mut remap, i);
            }
        }

        for (i, lel) in self.lels.iter_mut().enumerate() {
            lel.id = remap[i];
        }
        remap
    }
}

#[derive(Debug, thiserror::Error)]
pub enum GrammarDefError {
    #[error("`{0}' is not a usable element name")]
    InvalidName(String),

    #[error("`{0}' has already been declared")]
    Duplicate(String),

    #[error("`{0}' is not a terminal")]
    NotTerminal(String),

    #[error("`{0}' is not a nonterminal")]
    NotNonterminal(String),

    #[error("nonterminal `{0}' has no productions")]
    NoProductions(String),

    #[error("no parser has been declared")]
    NoParser,

    #[error("Other error: {}", msg)]
    Other { msg: String },
}
impl From<&str> for GrammarDefError {
    fn from(msg: &str) -> Self {
        Self::Other { msg: msg.into() }
    }
}
impl From<String> for GrammarDefError {
    fn from(msg: String) -> Self {
        Self::Other { msg }
    }
}

/// Names starting with an underscore are kept for generated elements.
fn verify_name(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() => (),
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr_grammar() -> (Grammar, [Symbol; 5]) {
        let mut syms = None;
        let g = Grammar::define(|g| {
            let plus = g.terminal("PLUS")?;
            let num = g.terminal("NUM")?;
            let expr = g.nonterminal("expr")?;
            let star = g.terminal("STAR")?;
            let term = g.nonterminal("term")?;
            g.precedence(PredType::Left, [plus]);
            g.precedence(PredType::Left, [star]);
            g.production(expr, [expr, plus, term])?;
            g.production(expr, [term])?;
            g.production(term, [term, star, num])?;
            g.production(term, [num])?;
            g.parser(expr)?;
            syms = Some([plus, num, expr, star, term]);
            Ok(())
        })
        .unwrap();
        (g, syms.unwrap())
    }

    #[test]
    fn id_layout() {
        let (g, [plus, num, expr, star, term]) = expr_grammar();
        // user terminals, then `_T_` wrappers, then eof, notoken.
        assert_eq!(g.id(plus).raw(), 1);
        assert_eq!(g.id(num).raw(), 2);
        assert_eq!(g.id(star).raw(), 3);
        assert_eq!(g.find("_T_expr").unwrap().id.raw(), 4);
        assert_eq!(g.find("_T_term").unwrap().id.raw(), 5);
        assert_eq!(g.eof_of(g.id(expr)).raw(), 6);
        assert_eq!(g.no_token.raw(), 7);
        assert_eq!(g.first_non_term_id.raw(), 8);
        assert_eq!(g.id(expr).raw(), 8);
        assert_eq!(g.id(term).raw(), 9);
        assert_eq!(g.root_lel.raw(), 10);
        assert_eq!(g.max_lel_id().raw(), 10);

        let ids: Vec<_> = g.lang_els.keys().map(|id| id.raw()).collect();
        assert_eq!(ids, (1..=10).collect::<Vec<_>>());
        for lel in g.lang_els.values() {
            assert_eq!(lel.is_nonterm(), lel.id >= g.first_non_term_id, "{}", lel);
        }
        let dup = g.lang_el(g.id(expr)).term_dup.unwrap();
        assert_eq!(g.lang_el(dup).term_dup, Some(g.id(expr)));
    }

    #[test]
    fn root_productions_and_names() {
        let (g, [_, _, expr, _, term]) = expr_grammar();
        let root_def = g.lang_el(g.id(expr)).root_def.unwrap();
        let prod = g.production(root_def);
        assert_eq!(prod.lhs, g.root_lel);
        assert_eq!(prod.rhs.len(), 1);
        assert_eq!(prod.rhs[0].lang_el, g.id(expr));
        assert_eq!(prod.name, "_root-1");
        assert!(g.lang_el(g.id(term)).root_def.is_none());

        let names: Vec<_> = g.productions.values().map(|p| p.name.as_str()).collect();
        assert_eq!(names, ["expr-1", "expr-2", "term-1", "term-2", "_root-1"]);
        assert_eq!(
            g.productions[0].display(&g).to_string(),
            "expr := expr PLUS term"
        );
    }

    #[test]
    fn default_precedence() {
        let (g, [plus, _, _, star, _]) = expr_grammar();
        let preds: Vec<_> = g.productions.values().map(|p| p.pred_of).collect();
        assert_eq!(
            preds,
            vec![Some(g.id(plus)), None, Some(g.id(star)), None, None]
        );
        assert!(g.lang_el(g.id(star)).pred_value > g.lang_el(g.id(plus)).pred_value);
    }

    #[test]
    fn error_element_follows_notoken() {
        let g = Grammar::define(|g| {
            let a = g.terminal("a")?;
            let s = g.nonterminal("s")?;
            let err = g.error_token();
            assert_eq!(g.error_token(), err);
            g.production(s, [a])?;
            g.production(s, [err])?;
            g.parser(s)?;
            Ok(())
        })
        .unwrap();
        let error = g.error.unwrap();
        assert_eq!(error.raw(), g.no_token.raw() + 1);
        assert_eq!(g.first_non_term_id.raw(), error.raw() + 1);
    }

    #[test]
    fn definition_errors() {
        let err = Grammar::define(|g| {
            g.terminal("a")?;
            g.terminal("a")?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarDefError::Duplicate(ref n) if n == "a"));

        let err = Grammar::define(|g| {
            g.terminal("_T_x")?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarDefError::InvalidName(..)));

        let err = Grammar::define(|g| {
            let a = g.terminal("a")?;
            g.production(a, [a])?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarDefError::NotNonterminal(..)));

        let err = Grammar::define(|g| {
            let s = g.nonterminal("s")?;
            let t = g.nonterminal("t")?;
            g.production(s, [t])?;
            g.parser(s)?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarDefError::NoProductions(ref n) if n == "t"));

        let err = Grammar::define(|g| {
            let a = g.terminal("a")?;
            let s = g.nonterminal("s")?;
            g.production(s, [a])?;
            Ok(())
        })
        .unwrap_err();
        assert!(matches!(err, GrammarDefError::NoParser));
        assert_eq!(err.to_string(), "no parser has been declared");
    }
}
