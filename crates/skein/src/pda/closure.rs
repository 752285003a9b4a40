//! LR(0) closure and LALR(1) follow sets.

use super::{PdaBuild, PdaStateId, TransId};
use crate::grammar::{LangElId, ProdId};
use std::collections::BTreeMap;

impl PdaBuild<'_> {
    /// Bring the production state `prod_state` into `dest`.
    ///
    /// `expand_from` is the nonterminal transition being closed when the
    /// item is derived rather than a core item. Its commits move to the
    /// first transition of the expansion, or become pending commits of
    /// `dest` when the production is empty.
    fn lr0_bring_in_item(
        &mut self,
        dest: PdaStateId,
        prod: ProdId,
        prod_state: PdaStateId,
        expand_from: Option<TransId>,
    ) {
        let grammar = self.grammar;
        let fsm = &grammar.production(prod).fsm;
        let src = fsm.state(prod_state);

        let dest_state = self.graph.state_mut(dest);
        dest_state.dot_set.union_with(&src.dot_set);
        dest_state.pending_commits.union_with(&src.pending_commits);

        let Some((&key, &src_trans)) = src.trans_map.iter().next() else {
            if let Some(from) = expand_from {
                let commits = std::mem::take(&mut self.graph.trans_mut(from).commits);
                let pending = &mut self.graph.state_mut(dest).pending_commits;
                for &len in &commits {
                    pending.insert((prod, len));
                }
            }
            return;
        };
        debug_assert_eq!(src.trans_map.len(), 1);
        let src_trans = fsm.trans(src_trans);
        let src_to = src_trans.to.expect("attached transition");

        let dest_trans = match self.graph.find_trans(dest, key) {
            None => {
                let new_state = self.graph.add_state();
                let trans = self.graph.insert_new_trans(dest, new_state, key);
                self.graph.add_in_trans(trans, src_trans, false);
                debug_assert!(self.graph.trans(trans).is_shift);
                self.graph
                    .state_mut(new_state)
                    .state_set
                    .insert((prod, src_to));
                if self.is_nonterm(key) {
                    self.trans_closure_queue.push_back(trans);
                }
                trans
            }
            Some(trans) => {
                let to = self.graph.trans(trans).to.expect("attached transition");
                self.graph.state_mut(to).state_set.insert((prod, src_to));
                self.graph.add_in_trans(trans, src_trans, false);
                trans
            }
        };

        if let Some(from) = expand_from {
            let commits = std::mem::take(&mut self.graph.trans_mut(from).commits);
            if !commits.is_empty() {
                self.graph
                    .trans_mut(dest_trans)
                    .commits
                    .union_with(&commits);
            }
        }
    }

    /// Close `state` over its core items. A state whose dot set is already
    /// closed elsewhere is merged into that state and dropped.
    fn lr0_invoke_closure(&mut self, state: PdaStateId) {
        let grammar = self.grammar;
        assert!(!self.graph.state(state).in_closed_map);

        self.trans_closure_queue.clear();

        let core: Vec<_> = self.graph.state(state).state_set.iter().copied().collect();
        for (prod, prod_state) in core {
            self.lr0_bring_in_item(state, prod, prod_state, None);
        }

        while let Some(to_close) = self.trans_closure_queue.pop_front() {
            let key = self.graph.trans(to_close).low_key;
            for &prod in &grammar.lang_el(key).productions {
                let start = grammar
                    .production(prod)
                    .fsm
                    .start()
                    .expect("production machine has a start state");
                self.lr0_bring_in_item(state, prod, start, Some(to_close));
            }
        }

        let targets: Vec<PdaStateId> = self
            .graph
            .out_trans(state)
            .filter_map(|(_, trans)| trans.to)
            .collect();
        let dot_set = self.graph.state(state).dot_set.clone();
        match self.closed_map.get(&dot_set) {
            None => {
                self.closed_map.insert(dot_set, state);
                self.graph.state_mut(state).in_closed_map = true;
                for targ in targets {
                    let targ_state = self.graph.state_mut(targ);
                    if !targ_state.on_closure_queue && !targ_state.in_closed_map {
                        targ_state.on_closure_queue = true;
                        self.state_closure_queue.push_back(targ);
                    }
                }
            }
            Some(&found) => {
                self.graph.in_trans_move(found, state);
                for targ in targets {
                    self.graph.detach_state(targ);
                }
                self.graph.detach_state(state);
            }
        }
    }

    fn lr0_close_all_states(&mut self) {
        while let Some(state) = self.state_closure_queue.pop_front() {
            self.graph.state_mut(state).on_closure_queue = false;
            self.lr0_invoke_closure(state);
        }
        tracing::trace!("LR(0) closure made {} states", self.graph.num_states());
    }

    /// Every transition on a nonterminal gets a twin shifting its `_T_`
    /// terminal to the same target.
    fn add_dup_terms(&mut self) {
        let grammar = self.grammar;
        for state in self.graph.state_ids() {
            let dups: Vec<(LangElId, PdaStateId)> = self
                .graph
                .out_trans(state)
                .filter(|&(key, _)| self.is_nonterm(key))
                .filter_map(|(key, trans)| {
                    let dup = grammar.lang_el(key).term_dup?;
                    Some((dup, trans.to.expect("attached transition")))
                })
                .collect();
            for (dup, to) in dups {
                let trans = self.graph.insert_new_trans(state, to, dup);
                self.graph.trans_mut(trans).is_shift = true;
            }
        }
    }

    /// Record, for every nonterminal transition, the states its productions
    /// end in when followed from the transition's source.
    fn link_expansions(&mut self) {
        let grammar = self.grammar;
        self.graph.set_state_numbers();
        for state in self.graph.state_ids() {
            let nonterms: Vec<(LangElId, TransId)> = self
                .graph
                .state(state)
                .trans_map
                .iter()
                .map(|(&key, &trans)| (key, trans))
                .filter(|&(key, _)| self.is_nonterm(key))
                .collect();
            for (key, trans) in nonterms {
                for &prod in &grammar.lang_el(key).productions {
                    let end = self
                        .graph
                        .follow_fsm(state, &grammar.production(prod).fsm);
                    self.graph.trans_mut(trans).expand_to.insert((end, prod));
                }
            }
        }
    }

    /// Commits pending in `state` for reductions of `prod` go with the
    /// reducing transition.
    fn transfer_commits(&mut self, trans: TransId, state: PdaStateId, prod: ProdId) {
        let lens: Vec<u32> = self
            .graph
            .state(state)
            .pending_commits
            .iter()
            .filter(|&&(p, _)| p == prod)
            .map(|&(_, len)| len)
            .collect();
        let commits = &mut self.graph.trans_mut(trans).commits;
        for len in lens {
            commits.insert(len);
        }
    }

    /// Add a reduction of `prod` on `key` in `expand_to`, making the
    /// transition when there is none yet.
    fn add_follow(&mut self, expand_to: PdaStateId, prod: ProdId, key: LangElId, prior: i64) {
        match self.graph.find_trans(expand_to, key) {
            Some(trans) => {
                self.transfer_commits(trans, expand_to, prod);
                self.graph.add_in_reduction(trans, prod, prior);
            }
            None => {
                let dest = self.action_dest();
                let trans = self.graph.insert_new_trans(expand_to, dest, key);
                self.graph.add_in_reduction(trans, prod, prior);
                self.transfer_commits(trans, expand_to, prod);
                self.trans_closure_queue.push_back(trans);
            }
        }
    }

    fn lalr1_add_follow2(&mut self, trans: TransId, follow_keys: &BTreeMap<LangElId, i64>) {
        let expand_to: Vec<_> = self.graph.trans(trans).expand_to.iter().copied().collect();
        for (state, prod) in expand_to {
            for (&key, &prior) in follow_keys {
                self.add_follow(state, prod, key, prior);
            }
        }
    }

    /// Terminals leaving `state` follow every nonterminal that enters it.
    fn lalr1_add_follow1_state(&mut self, state: PdaStateId) {
        let in_range = self.graph.state(state).in_range.clone();
        for in_trans in in_range {
            if !self.is_nonterm(self.graph.trans(in_trans).low_key) {
                continue;
            }
            let follow_keys: BTreeMap<LangElId, i64> = self
                .graph
                .out_trans(state)
                .filter(|&(key, _)| !self.is_nonterm(key))
                .map(|(key, trans)| (key, trans.max_prior()))
                .collect();
            if !follow_keys.is_empty() {
                self.lalr1_add_follow2(in_trans, &follow_keys);
            }
        }
    }

    /// A new terminal transition follows every nonterminal entering its
    /// source state.
    fn lalr1_add_follow1_trans(&mut self, trans: TransId) {
        let key = self.graph.trans(trans).low_key;
        if self.is_nonterm(key) {
            return;
        }
        let from = self.graph.trans(trans).from.expect("attached transition");
        let in_range = self.graph.state(from).in_range.clone();
        for in_trans in in_range {
            if self.is_nonterm(self.graph.trans(in_trans).low_key) {
                let prior = self.graph.trans(trans).max_prior();
                let expand_to: Vec<_> =
                    self.graph.trans(in_trans).expand_to.iter().copied().collect();
                for (state, prod) in expand_to {
                    self.add_follow(state, prod, key, prior);
                }
            }
        }
    }

    fn lalr1_add_follow_sets(&mut self) {
        let grammar = self.grammar;

        // Reductions pop the stack and pick their target from there, so
        // this state is never entered. Reductions only need a target.
        let dest = self.graph.add_state();
        self.graph.set_final(dest);
        self.action_dest = Some(dest);

        for &root in &grammar.roots {
            let root_def = grammar
                .lang_el(root)
                .root_def
                .expect("parser roots have a root production");
            let over_start = self
                .graph
                .follow_fsm(self.start_states[&root], &grammar.production(root_def).fsm);
            let eof = self
                .graph
                .insert_new_trans(over_start, dest, grammar.eof_of(root));
            self.graph.trans_mut(eof).is_shift = true;
        }

        self.trans_closure_queue.clear();
        for state in self.graph.state_ids() {
            self.lalr1_add_follow1_state(state);
        }
        while let Some(trans) = self.trans_closure_queue.pop_front() {
            self.lalr1_add_follow1_trans(trans);
        }
    }

    pub(super) fn lalr1_generate_parser(&mut self) {
        let grammar = self.grammar;
        for &root in &grammar.roots {
            let state = self.graph.add_state();
            self.graph.entry_states.push(state);

            let root_def = grammar
                .lang_el(root)
                .root_def
                .expect("parser roots have a root production");
            let start = grammar
                .production(root_def)
                .fsm
                .start()
                .expect("production machine has a start state");
            let st = self.graph.state_mut(state);
            st.state_set.insert((root_def, start));
            st.on_closure_queue = true;
            self.state_closure_queue.push_back(state);
            self.start_states.insert(root, state);
        }

        self.lr0_close_all_states();
        self.add_dup_terms();
        self.link_expansions();
        self.lalr1_add_follow_sets();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{compile::BuildConfig, grammar::Grammar};

    fn build(grammar: &Grammar) -> PdaBuild<'_> {
        let mut build = PdaBuild::new(grammar, &BuildConfig::default());
        build.lalr1_generate_parser();
        build.graph.set_state_numbers();
        build
    }

    #[test]
    fn lr0_states_are_unique_by_dot_set() {
        // s -> a s b | c
        let g = Grammar::define(|g| {
            let a = g.terminal("a")?;
            let b = g.terminal("b")?;
            let c = g.terminal("c")?;
            let s = g.nonterminal("s")?;
            g.production(s, [a, s, b])?;
            g.production(s, [c])?;
            g.parser(s)?;
            Ok(())
        })
        .unwrap();
        let build = build(&g);

        let mut seen = std::collections::HashSet::new();
        for (_, state) in build.graph.states() {
            if !state.dot_set.is_empty() {
                assert!(seen.insert(state.dot_set.clone()));
            }
        }
        // start, after s, after a (reached again by a), after a s, after
        // a s b, after c, and the action destination.
        assert_eq!(build.graph.num_states(), 7);

        let a = g.find("a").unwrap().id;
        let first = build.graph.find_trans(build.start_states[0], a).unwrap();
        let after_a = build.graph.trans(first).to.unwrap();
        let again = build.graph.find_trans(after_a, a).unwrap();
        assert_eq!(build.graph.trans(again).to, Some(after_a));
    }

    #[test]
    fn follow_sets_become_reductions() {
        let g = Grammar::define(|g| {
            let a = g.terminal("a")?;
            let b = g.terminal("b")?;
            let s = g.nonterminal("s")?;
            let x = g.nonterminal("x")?;
            g.production(s, [x, b])?;
            g.production(x, [a])?;
            g.parser(s)?;
            Ok(())
        })
        .unwrap();
        let build = build(&g);
        let (a, b) = (g.find("a").unwrap().id, g.find("b").unwrap().id);
        let x = g.find("x").unwrap();
        let start = build.start_states[0];

        let over_x = build.graph.find_trans(start, x.id).unwrap();
        assert_eq!(build.graph.trans(over_x).expand_to.len(), 1);
        let dup = build.graph.find_trans(start, x.term_dup.unwrap()).unwrap();
        assert_eq!(build.graph.trans(dup).to, build.graph.trans(over_x).to);

        let after_a = build.graph.trans(build.graph.find_trans(start, a).unwrap()).to.unwrap();
        let on_b = build.graph.find_trans(after_a, b).unwrap();
        let on_b = build.graph.trans(on_b);
        assert!(!on_b.is_shift);
        assert_eq!(on_b.reductions.keys().copied().collect::<Vec<_>>(), vec![x.productions[0]]);
        assert_eq!(on_b.to, build.action_dest);

        // s is followed by its end-of-input element.
        let s = g.find("s").unwrap();
        let after_b = {
            let over_x = build.graph.trans(over_x).to.unwrap();
            build.graph.trans(build.graph.find_trans(over_x, b).unwrap()).to.unwrap()
        };
        let on_eof = build.graph.find_trans(after_b, s.eof_lel.unwrap()).unwrap();
        assert!(build
            .graph
            .trans(on_eof)
            .reductions
            .contains_key(&s.productions[0]));
    }

    #[test]
    fn commits_move_to_the_reduction() {
        let g = Grammar::define(|g| {
            let a = g.terminal("a")?;
            let b = g.terminal("b")?;
            let s = g.nonterminal("s")?;
            let x = g.nonterminal("x")?;
            g.production(s, [x, b])?;
            let p = g.production(x, [a])?;
            g.commit(p);
            g.parser(s)?;
            Ok(())
        })
        .unwrap();
        let build = build(&g);
        let a = g.find("a").unwrap().id;
        let b = g.find("b").unwrap().id;
        let start = build.start_states[0];
        let after_a = build.graph.trans(build.graph.find_trans(start, a).unwrap()).to.unwrap();
        assert_eq!(
            build.graph.state(after_a).pending_commits.as_slice(),
            &[(g.find("x").unwrap().productions[0], 1)]
        );
        let on_b = build.graph.find_trans(after_a, b).unwrap();
        assert_eq!(build.graph.trans(on_b).commits.as_slice(), &[1]);
    }
}
