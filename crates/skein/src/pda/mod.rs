//! The parse automaton.
//!
//! Construction follows the classic LALR(1) recipe over the production
//! machines: LR(0) closure with states merged by dot set, follow sets
//! threaded through the nonterminal expansions, then an analysis pass that
//! orders the actions of every transition, resolves precedence and folds
//! isolated reductions into the shifts before them.

mod closure;
mod graph;
mod order;
pub(crate) mod prod_fsm;
mod resolve;
mod tables;

pub use self::{
    graph::{PdaGraph, PdaState, PdaStateId, PdaTrans, TransId},
    resolve::ActionData,
    tables::make_pda_tables,
};

use crate::{
    compile::{AdvanceMode, BuildConfig, BuildError},
    diag::{Diagnostics, InputLoc},
    grammar::{Grammar, LangElId},
    types::{Map, OrdSet},
    util::display_fn,
};
use skein_tables::pda::{make_reduce_code, PdaAction, SHIFT_CODE, SHIFT_REDUCE_CODE};
use std::{collections::VecDeque, fmt};

/// The analyzed parse automaton.
#[derive(Debug)]
pub struct ParserGraph {
    pub graph: PdaGraph,
    /// Distinct `(target, commit length, actions)` triples, in id order.
    pub action_sets: Vec<ActionData>,
    /// The entry state of each parser root.
    pub start_states: Map<LangElId, PdaStateId>,
    /// The state every reduction transition points at. It is never
    /// entered at run time.
    pub action_dest: PdaStateId,
    pub max_prod_len: usize,
    /// Warnings reported along the way.
    pub diagnostics: Diagnostics,
}

impl ParserGraph {
    pub fn display<'g>(&'g self, grammar: &'g Grammar) -> impl fmt::Display + 'g {
        display_fn(move |f| {
            writeln!(f, "## entries")?;
            for (root, state) in &self.start_states {
                writeln!(
                    f,
                    "- {} -> {:03}",
                    grammar.lang_el(*root),
                    self.graph.state(*state).state_num
                )?;
            }
            write!(
                f,
                "{}",
                self.graph
                    .display(|key| grammar.lang_el(key).name.clone())
            )?;
            writeln!(f, "## action sets")?;
            for (id, set) in self.action_sets.iter().enumerate() {
                write!(f, "- {}: -> {:03} commit={}", id, set.targ, set.commit_len)?;
                for &code in &set.actions {
                    if let Some(action) = PdaAction::decode(code) {
                        write!(f, " {}", action)?;
                    }
                }
                writeln!(f)?;
            }
            Ok(())
        })
    }
}

pub(crate) struct PdaBuild<'g> {
    grammar: &'g Grammar,
    graph: PdaGraph,
    advance: AdvanceMode,
    trans_closure_queue: VecDeque<TransId>,
    state_closure_queue: VecDeque<PdaStateId>,
    /// Closed states by dot set.
    closed_map: Map<OrdSet<u32>, PdaStateId>,
    start_states: Map<LangElId, PdaStateId>,
    action_dest: Option<PdaStateId>,
    action_sets: Vec<ActionData>,
    /// The next action order to hand out.
    time: u64,
    diag: Diagnostics,
    loc: InputLoc,
}

impl<'g> PdaBuild<'g> {
    fn new(grammar: &'g Grammar, config: &BuildConfig) -> Self {
        Self {
            grammar,
            graph: PdaGraph::new(),
            advance: config.advance,
            trans_closure_queue: VecDeque::new(),
            state_closure_queue: VecDeque::new(),
            closed_map: Map::default(),
            start_states: Map::default(),
            action_dest: None,
            action_sets: vec![],
            time: 1,
            diag: Diagnostics::default(),
            loc: InputLoc::internal(),
        }
    }

    fn is_nonterm(&self, key: LangElId) -> bool {
        key >= self.grammar.first_non_term_id
    }

    fn action_dest(&self) -> PdaStateId {
        self.action_dest
            .expect("the action destination is made with the follow sets")
    }

    /// Build the initial action lists: the shift first, then the reductions
    /// in production order. No action has an order yet.
    fn make_action_lists(&mut self) {
        for state in self.graph.state_ids() {
            let trans_ids: Vec<_> = self.graph.state(state).trans_map.values().copied().collect();
            for t in trans_ids {
                let trans = self.graph.trans_mut(t);
                if trans.is_shift {
                    trans.actions.push(SHIFT_CODE);
                    trans.act_priors.push(trans.shift_prior);
                }
                for (&prod, &prior) in &trans.reductions {
                    trans.actions.push(make_reduce_code(prod.raw(), false));
                    trans.act_priors.push(prior);
                }
                trans.act_ords = vec![0; trans.actions.len()];
            }
        }
    }

    fn analyze_machine(&mut self) {
        let grammar = self.grammar;

        self.make_action_lists();
        self.pda_action_order();
        self.sort_actions();
        self.resolve_precedence();

        match self.advance {
            AdvanceMode::All => {
                for state in self.graph.state_ids() {
                    self.graph.state_mut(state).advance_reductions = true;
                }
            }
            AdvanceMode::ParseStopOnly => {
                for &root in &grammar.roots {
                    if grammar.lang_el(root).parse_stop {
                        self.compute_advance_reductions(root);
                    }
                }
            }
        }

        self.advance_reductions();
        self.graph.set_state_numbers();
        self.reduce_actions();

        // Rejected nonterminal transitions were already reported.
        if !self.diag.has_errors() {
            self.check_action_shapes();
        }

        for &root in &grammar.roots {
            if grammar.lang_el(root).parse_stop {
                self.verify_parse_stop_grammar(root);
            }
        }
    }

    fn check_action_shapes(&self) {
        for state in self.graph.state_ids() {
            for (key, trans) in self.graph.out_trans(state) {
                if self.is_nonterm(key) {
                    assert_eq!(trans.actions.len(), 1);
                    let code = trans.actions[0];
                    assert!(code == SHIFT_CODE || code & 0x3 == SHIFT_REDUCE_CODE);
                }
                if trans.actions.iter().any(|&a| a & 0x3 == SHIFT_REDUCE_CODE) {
                    assert_eq!(trans.actions.len(), 1, "shift-reduce must stand alone");
                }
            }
        }
    }

    fn max_prod_len(&self) -> usize {
        self.grammar
            .productions
            .values()
            .map(|prod| prod.fsm_length)
            .max()
            .unwrap_or(0)
    }
}

/// Build and analyze the parse automaton of `grammar`.
pub fn make_pda_graph(grammar: &Grammar, config: &BuildConfig) -> Result<ParserGraph, BuildError> {
    let mut build = PdaBuild::new(grammar, config);
    build.lalr1_generate_parser();
    build.graph.set_state_numbers();
    tracing::debug!("LALR(1) automaton has {} states", build.graph.num_states());

    build.analyze_machine();
    if build.diag.has_errors() {
        return Err(BuildError::Diagnostics(build.diag));
    }
    tracing::debug!(
        "analyzed automaton: {} states, {} action sets",
        build.graph.num_states(),
        build.action_sets.len()
    );

    let max_prod_len = build.max_prod_len();
    let action_dest = build.action_dest();
    Ok(ParserGraph {
        graph: build.graph,
        action_sets: build.action_sets,
        start_states: build.start_states,
        action_dest,
        max_prod_len,
        diagnostics: build.diag,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{PredType, Symbol};

    fn arith(pred: bool) -> (Grammar, [Symbol; 4]) {
        let mut syms = None;
        let g = Grammar::define(|g| {
            let plus = g.terminal("PLUS")?;
            let star = g.terminal("STAR")?;
            let num = g.terminal("NUM")?;
            let expr = g.nonterminal("expr")?;
            if pred {
                g.precedence(PredType::Left, [plus]);
                g.precedence(PredType::Left, [star]);
            }
            g.production(expr, [expr, plus, expr])?;
            g.production(expr, [expr, star, expr])?;
            g.production(expr, [num])?;
            g.parser(expr)?;
            syms = Some([plus, star, num, expr]);
            Ok(())
        })
        .unwrap();
        (g, syms.unwrap())
    }

    fn parse_stop_only() -> BuildConfig {
        BuildConfig {
            advance: AdvanceMode::ParseStopOnly,
            ..BuildConfig::default()
        }
    }

    #[test]
    fn nonterminal_edges_are_single_shifts() {
        let (g, [_, _, _, expr]) = arith(true);
        let pg = make_pda_graph(&g, &BuildConfig::default()).unwrap();
        assert!(pg.diagnostics.is_empty());

        let start = pg.start_states[&g.id(expr)];
        let over = pg.graph.find_trans(start, g.id(expr)).unwrap();
        assert_eq!(pg.graph.trans(over).actions, vec![SHIFT_CODE]);
        let dup = g.lang_el(g.id(expr)).term_dup.unwrap();
        assert!(pg.graph.find_trans(start, dup).is_some());

        for state in pg.graph.state_ids() {
            assert_eq!(
                pg.graph.state(state).dot_set,
                pg.graph.state(state).dot_set2
            );
        }
        assert_eq!(pg.max_prod_len, 3);
    }

    #[test]
    fn precedence_leaves_one_action_per_transition() {
        let (g, [plus, star, _, _]) = arith(true);
        let pg = make_pda_graph(&g, &parse_stop_only()).unwrap();
        let mut reduces_on_plus = 0;
        for state in pg.graph.state_ids() {
            for (key, trans) in pg.graph.out_trans(state) {
                assert_eq!(trans.actions.len(), 1, "{:?}", key);
                if key == g.id(plus) && trans.actions[0] != SHIFT_CODE {
                    reduces_on_plus += 1;
                }
            }
        }
        assert!(reduces_on_plus > 0);

        // after `expr * expr` a PLUS reduces the product, a STAR too.
        let prod_times = g.productions[1].id;
        let red = make_reduce_code(prod_times.raw(), false);
        let found = pg.graph.state_ids().into_iter().any(|s| {
            let on = |k| {
                pg.graph
                    .find_trans(s, g.id(k))
                    .map(|t| pg.graph.trans(t).actions.clone())
            };
            on(plus) == Some(vec![red]) && on(star) == Some(vec![red])
        });
        assert!(found);
    }

    #[test]
    fn unresolved_conflicts_keep_every_action() {
        let (g, [plus, _, _, _]) = arith(false);
        let pg = make_pda_graph(&g, &parse_stop_only()).unwrap();
        let ambiguous = pg.graph.state_ids().into_iter().any(|s| {
            pg.graph
                .find_trans(s, g.id(plus))
                .map_or(false, |t| pg.graph.trans(t).actions.len() == 2)
        });
        assert!(ambiguous);
    }

    #[test]
    fn nonassoc_removes_the_transition() {
        let mut syms = None;
        let g = Grammar::define(|g| {
            let eq = g.terminal("EQ")?;
            let num = g.terminal("NUM")?;
            let expr = g.nonterminal("expr")?;
            g.precedence(PredType::Nonassoc, [eq]);
            g.production(expr, [expr, eq, expr])?;
            g.production(expr, [num])?;
            g.parser(expr)?;
            syms = Some(eq);
            Ok(())
        })
        .unwrap();
        let eq = g.id(syms.unwrap());
        let pg = make_pda_graph(&g, &parse_stop_only()).unwrap();

        // the state after `expr EQ expr` has nothing to do on EQ.
        let red = make_reduce_code(g.productions[0].id.raw(), false);
        let after_rhs = pg
            .graph
            .state_ids()
            .into_iter()
            .find(|&s| {
                pg.graph
                    .out_trans(s)
                    .any(|(_, t)| t.actions == vec![red])
            })
            .unwrap();
        assert!(pg.graph.find_trans(after_rhs, eq).is_none());
    }

    #[test]
    fn advancing_removes_states() {
        let (g, _) = arith(true);
        let all = make_pda_graph(&g, &BuildConfig::default()).unwrap();
        let stop_only = make_pda_graph(&g, &parse_stop_only()).unwrap();
        assert!(all.graph.num_states() < stop_only.graph.num_states());

        let has_shift_reduce = all.action_sets.iter().any(|set| {
            set.actions
                .iter()
                .any(|&a| a & 0x3 == SHIFT_REDUCE_CODE)
        });
        assert!(has_shift_reduce);
        for set in &all.action_sets {
            if set.actions.iter().any(|&a| a & 0x3 == SHIFT_REDUCE_CODE) {
                assert_eq!(set.targ, all.graph.state(all.action_dest).state_num);
            }
        }
    }

    #[test]
    fn parse_stop_rejects_eof_dependent_grammars() {
        // after `a` the parser needs the next token to choose.
        let result = Grammar::define(|g| {
            let a = g.terminal("a")?;
            let b = g.terminal("b")?;
            let s = g.nonterminal("s")?;
            g.production(s, [a])?;
            g.production(s, [a, b])?;
            g.parse_stop(s)?;
            Ok(())
        })
        .map(|g| make_pda_graph(&g, &parse_stop_only()))
        .unwrap();
        let Err(BuildError::Diagnostics(diag)) = result else {
            panic!("expected a diagnostic");
        };
        assert_eq!(
            diag.iter().next().unwrap().message,
            "grammar is not usable with parse_stop"
        );

        let g = Grammar::define(|g| {
            let open = g.terminal("OPEN")?;
            let close = g.terminal("CLOSE")?;
            let block = g.nonterminal("block")?;
            g.production(block, [open, close])?;
            g.parse_stop(block)?;
            Ok(())
        })
        .unwrap();
        let pg = make_pda_graph(&g, &parse_stop_only()).unwrap();
        assert!(pg.diagnostics.is_empty());
    }
}
