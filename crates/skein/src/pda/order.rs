//! Action ordering.
//!
//! The automaton is LALR(1) but the orders are handed out by walking it
//! like an LR(1) parser would, production by production from every root.
//! A transition that keeps several actions tries them in this order, so
//! the order decides which of several possible parses wins.

use super::{graph::PdaGraph, PdaBuild, PdaStateId, TransId};
use crate::grammar::{LangElId, ProdId, EPSILON};
use bit_set::BitSet;
use skein_tables::pda::{make_reduce_code, SHIFT_CODE};

impl PdaBuild<'_> {
    /// Collect the keys that can follow `parent` from the production state
    /// `over_src`, given the automaton is in `over_tab`.
    fn find_follow(
        &self,
        result: &mut BitSet,
        over_tab: PdaStateId,
        over_src: PdaStateId,
        parent: ProdId,
    ) {
        let grammar = self.grammar;
        let fsm = &grammar.production(parent).fsm;
        let src = fsm.state(over_src);

        if src.is_final {
            debug_assert!(src.trans_map.is_empty());
            let red = make_reduce_code(parent.raw(), false);
            for (key, trans) in self.graph.out_trans(over_tab) {
                if trans.actions.contains(&red) {
                    result.insert(key.index());
                }
            }
            return;
        }

        debug_assert_eq!(src.trans_map.len(), 1);
        let Some((&key, &past)) = src.trans_map.iter().next() else {
            return;
        };
        if !self.is_nonterm(key) {
            result.insert(key.index());
            return;
        }

        let lel = grammar.lang_el(key);
        let mut has_epsilon = false;
        for &prod in &lel.productions {
            for &id in &grammar.production(prod).first_set {
                if id == EPSILON {
                    has_epsilon = true;
                } else {
                    result.insert(id as usize);
                }
            }
        }
        if has_epsilon {
            let tab_trans = self
                .graph
                .find_trans(over_tab, key)
                .expect("the automaton follows every production");
            self.find_follow(
                result,
                self.graph.trans(tab_trans).to.expect("attached transition"),
                fsm.trans(past).to.expect("attached transition"),
                parent,
            );
        }
        if let Some(dup) = lel.term_dup {
            result.insert(dup.index());
        }
    }

    /// The automaton state reached by following `fsm` from `tab_state`,
    /// starting at `prod_state`.
    fn follow_prod(
        &self,
        mut tab_state: PdaStateId,
        fsm: &PdaGraph,
        mut prod_state: PdaStateId,
    ) -> PdaStateId {
        while let Some((&key, &prod_trans)) = fsm.state(prod_state).trans_map.iter().next() {
            let tab_trans = self
                .graph
                .find_trans(tab_state, key)
                .expect("the automaton follows every production");
            prod_state = fsm.trans(prod_trans).to.expect("attached transition");
            tab_state = self.graph.trans(tab_trans).to.expect("attached transition");
        }
        tab_state
    }

    /// Give `code` in `trans` the next order, unless it has one.
    fn try_set_time(&mut self, trans: TransId, code: u32) {
        let time = self.time;
        let trans = self.graph.trans_mut(trans);
        if let Some(pos) = trans.actions.iter().position(|&a| a == code) {
            if trans.act_ords[pos] == 0 {
                trans.act_ords[pos] = time;
                self.time += 1;
            }
        }
    }

    /// Order the reductions of `definition` on the keys that follow it.
    fn pda_order_follow(
        &mut self,
        root: LangElId,
        tab_state: PdaStateId,
        tab_trans: TransId,
        src_to: PdaStateId,
        parent: ProdId,
        definition: ProdId,
    ) {
        let grammar = self.grammar;
        let root_lel = grammar.lang_el(root);

        let mut follow = BitSet::new();
        if Some(parent) == root_lel.root_def {
            follow.insert(grammar.eof_of(root).index());
        } else {
            let over_tab = self.graph.trans(tab_trans).to.expect("attached transition");
            self.find_follow(&mut follow, over_tab, src_to, parent);
        }

        let def_fsm = &grammar.production(definition).fsm;
        let def_start = def_fsm.start().expect("production machine has a start state");
        let expand_to = self.follow_prod(tab_state, def_fsm, def_start);

        let red = make_reduce_code(definition.raw(), false);
        let outs: Vec<(LangElId, TransId)> = self
            .graph
            .state(expand_to)
            .trans_map
            .iter()
            .filter(|&(key, _)| follow.contains(key.index()))
            .map(|(&key, &trans)| (key, trans))
            .collect();
        for (key, trans) in outs {
            self.try_set_time(trans, red);
            self.add_region(expand_to, trans, key);
        }
    }

    /// Record the token region of the terminal `key` in `tab_state`, and
    /// its pre-region in the state the transition leads to.
    fn add_region(&mut self, tab_state: PdaStateId, tab_trans: TransId, key: LangElId) {
        let lel = self.grammar.lang_el(key);
        if !lel.is_term() || lel.is_eof {
            return;
        }
        let Some(region) = lel.token_region else {
            return;
        };

        let regions = &mut self.graph.state_mut(tab_state).regions;
        if !regions.contains(&Some(region)) {
            regions.push(Some(region));
        }

        if let Some(pre) = lel.pre_region {
            let to = self.graph.trans(tab_trans).to.expect("attached transition");
            let pre_regions = &mut self.graph.state_mut(to).pre_regions;
            if !pre_regions.contains(&pre) {
                pre_regions.push(pre);
            }
        }
    }

    /// Walk the production `parent` from `src_state` alongside the
    /// automaton from `tab_state`, ordering shifts as they are passed and
    /// the reductions of every nonterminal expanded on the way.
    fn pda_order_prod(
        &mut self,
        root: LangElId,
        tab_state: PdaStateId,
        src_state: PdaStateId,
        parent: ProdId,
    ) {
        let grammar = self.grammar;
        let fsm = &grammar.production(parent).fsm;
        let src = fsm.state(src_state);

        assert_eq!(src.dot_set.len(), 1);
        let dot = src.dot_set.as_slice()[0];
        if !self.graph.state_mut(tab_state).dot_set2.insert(dot) {
            return;
        }

        debug_assert!(src.trans_map.len() <= 1);
        let Some((&key, &src_trans)) = src.trans_map.iter().next() else {
            return;
        };
        let src_to = fsm.trans(src_trans).to.expect("attached transition");
        let tab_trans = self
            .graph
            .find_trans(tab_state, key)
            .expect("the automaton follows every production");

        let lel = grammar.lang_el(key);
        let start_of = |prod: ProdId| {
            grammar
                .production(prod)
                .fsm
                .start()
                .expect("production machine has a start state")
        };
        if lel.reduce_first {
            // Shortest match: the follows of every production first.
            for &def in &lel.productions {
                self.pda_order_follow(root, tab_state, tab_trans, src_to, parent, def);
            }
            for &def in &lel.productions {
                self.pda_order_prod(root, tab_state, start_of(def), def);
            }
        } else {
            for &def in &lel.productions {
                self.pda_order_prod(root, tab_state, start_of(def), def);
                self.pda_order_follow(root, tab_state, tab_trans, src_to, parent, def);
            }
        }

        self.try_set_time(tab_trans, SHIFT_CODE);
        if lel.is_nonterm() {
            if let Some(dup) = lel.term_dup.and_then(|dup| self.graph.find_trans(tab_state, dup)) {
                self.try_set_time(dup, SHIFT_CODE);
            }
        }
        self.add_region(tab_state, tab_trans, key);

        let tab_to = self.graph.trans(tab_trans).to.expect("attached transition");
        self.pda_order_prod(root, tab_to, src_to, parent);
    }

    pub(super) fn pda_action_order(&mut self) {
        let grammar = self.grammar;

        for &root in &grammar.roots {
            let start = self.start_states[&root];
            let root_def = grammar
                .lang_el(root)
                .root_def
                .expect("parser roots have a root production");
            let fsm_start = grammar
                .production(root_def)
                .fsm
                .start()
                .expect("production machine has a start state");
            self.pda_order_prod(root, start, fsm_start, root_def);

            // The shift of the end of input comes last.
            let over_start = self
                .graph
                .find_trans(start, root)
                .and_then(|t| self.graph.trans(t).to)
                .expect("entry states shift their root");
            let eof = self
                .graph
                .find_trans(over_start, grammar.eof_of(root))
                .expect("the root is followed by its end of input");
            self.graph.trans_mut(eof).act_ords[0] = self.time;
            self.time += 1;
        }

        for state in self.graph.state_ids() {
            if !self.graph.state(state).regions.is_empty() {
                continue;
            }
            let has_eof = self
                .graph
                .out_trans(state)
                .any(|(key, _)| grammar.lang_el(key).is_eof);
            if has_eof {
                self.graph.state_mut(state).regions.push(None);
            }
        }

        for state in self.graph.state_ids() {
            let st = self.graph.state(state);
            if !st.regions.is_empty() {
                continue;
            }
            let scans = self
                .graph
                .out_trans(state)
                .any(|(key, _)| grammar.lang_el(key).token_region.is_some());
            if scans {
                let msg = format!("state has an empty token region, state: {}", st.state_num);
                self.diag.warning(&self.loc, msg);
            }
        }

        for (_, st) in self.graph.states() {
            if st.pre_regions.len() > 1 {
                let msg = format!(
                    "tokens with different pre-regions lead to state {}",
                    st.state_num
                );
                self.diag.error(&self.loc, msg);
            }
        }

        // LALR(1) merging leaves some reductions that the LR(1) walk never
        // reaches. They can only lead to an error; they go last.
        for state in self.graph.state_ids() {
            let st = self.graph.state(state);
            assert_eq!(st.dot_set, st.dot_set2, "state {} not fully ordered", st.state_num);
            let trans_ids: Vec<_> = st.trans_map.values().copied().collect();
            for t in trans_ids {
                for ord in &mut self.graph.trans_mut(t).act_ords {
                    if *ord == 0 {
                        *ord = self.time;
                        self.time += 1;
                    }
                }
            }
        }
    }
}
