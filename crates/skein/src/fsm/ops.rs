//! Machine constructors and the regular-language operators.

use super::{
    action::{ActionId, LmPartId},
    graph::{FsmGraph, FsmTrans, StateId},
    name::NameId,
};
use crate::key::{Key, KeyAlphabet};

const FIN_LEFT: u8 = 1;
const FIN_RIGHT: u8 = 2;

impl FsmGraph {
    // ---- constructors ----

    /// Accepts only the empty word.
    pub fn lambda_fsm() -> Self {
        let mut g = Self::new();
        let start = g.start();
        g.set_final(start);
        g
    }

    /// Accepts nothing.
    pub fn empty_fsm() -> Self {
        Self::new()
    }

    /// One key out of `low ..= high`.
    pub fn range_fsm(low: Key, high: Key) -> Self {
        let mut g = Self::new();
        let end = g.add_state();
        g.set_final(end);
        let start = g.start();
        g.state_mut(start).out.push(FsmTrans::new(low, high, Some(end)));
        g
    }

    /// Any number of keys out of `low ..= high`.
    pub fn range_star_fsm(low: Key, high: Key) -> Self {
        let mut g = Self::lambda_fsm();
        let start = g.start();
        g.state_mut(start).out.push(FsmTrans::new(low, high, Some(start)));
        g
    }

    pub fn concat_fsm_key(key: Key) -> Self {
        Self::range_fsm(key, key)
    }

    /// The sequence `keys`.
    pub fn concat_fsm(keys: &[Key]) -> Self {
        let mut g = Self::new();
        let mut last = g.start();
        for &key in keys {
            let next = g.add_state();
            g.state_mut(last).out.push(FsmTrans::new(key, key, Some(next)));
            last = next;
        }
        g.set_final(last);
        g
    }

    /// The sequence `keys`, ASCII letters matching in either case.
    pub fn concat_fsm_ci(keys: &[Key]) -> Self {
        let mut g = Self::new();
        let mut last = g.start();
        for &key in keys {
            let next = g.add_state();
            let mut alts = vec![key];
            if let Ok(b) = u8::try_from(key) {
                if b.is_ascii_alphabetic() {
                    alts = vec![b.to_ascii_uppercase() as Key, b.to_ascii_lowercase() as Key];
                }
            }
            g.state_mut(last).out = alts
                .into_iter()
                .map(|k| FsmTrans::new(k, k, Some(next)))
                .collect();
            last = next;
        }
        g.set_final(last);
        g
    }

    /// One key out of the set `keys`.
    pub fn or_fsm(keys: &[Key]) -> Self {
        let mut keys = keys.to_vec();
        keys.sort_unstable();
        keys.dedup();
        let mut g = Self::new();
        let end = g.add_state();
        g.set_final(end);
        let start = g.start();
        g.state_mut(start).out = keys
            .into_iter()
            .map(|k| FsmTrans::new(k, k, Some(end)))
            .collect();
        g.compress_transitions();
        g
    }

    pub fn dot_fsm(alph: &KeyAlphabet) -> Self {
        Self::range_fsm(alph.min_key(), alph.max_key())
    }

    pub fn dot_star_fsm(alph: &KeyAlphabet) -> Self {
        Self::range_star_fsm(alph.min_key(), alph.max_key())
    }

    // ---- binary operators ----

    /// Disjoint union of state sets. The other machines keep their entry
    /// points and final states but lose their start state status.
    pub fn glob_op(&mut self, others: Vec<FsmGraph>) {
        for other in others {
            self.absorb(other);
        }
    }

    pub fn union_op(&mut self, other: FsmGraph) {
        let other_start = self.absorb(other);
        let start = self.add_state();
        let prev_start = self.start();
        self.merge_states(start, prev_start);
        self.merge_states(start, other_start);
        self.set_start(start);
        self.fill_in_states();
        self.remove_unreachable_states();
    }

    pub fn concat_op(&mut self, other: FsmGraph) {
        let finals = self.final_states();
        let other_start = self.absorb(other);
        for &fin in &finals {
            self.unset_final(fin);
        }
        for &fin in &finals {
            self.merge_states(fin, other_start);
        }
        self.fill_in_states();
        self.remove_unreachable_states();
    }

    pub fn intersect_op(&mut self, other: FsmGraph) {
        self.final_bits_op(other, |bits| bits == FIN_LEFT | FIN_RIGHT);
    }

    pub fn subtract_op(&mut self, mut other: FsmGraph) {
        // Actions and priorities of the subtracted machine are not carried.
        for state in &mut other.states {
            state.to_state_actions = Default::default();
            state.from_state_actions = Default::default();
            state.eof_actions = Default::default();
            for trans in &mut state.out {
                trans.actions = Default::default();
                trans.priors.clear();
                trans.lm_actions = Default::default();
            }
        }
        other.unset_all_entry_points();
        self.final_bits_op(other, |bits| bits & FIN_RIGHT == 0);
    }

    /// `self - (any* other any*)`: no part of the input may match `other`.
    pub fn strong_subtract_op(&mut self, other: FsmGraph, alph: &KeyAlphabet) {
        let mut contains = Self::dot_star_fsm(alph);
        contains.concat_op(other);
        contains.concat_op(Self::dot_star_fsm(alph));
        self.subtract_op(contains);
    }

    /// Run both machines side by side, tagging final states with the
    /// operand they came from, and keep the finals `keep` accepts.
    fn final_bits_op(&mut self, mut other: FsmGraph, keep: impl Fn(u8) -> bool) {
        for state in &mut self.states {
            if state.is_final {
                state.fin_bits = FIN_LEFT;
            }
        }
        for state in &mut other.states {
            if state.is_final {
                state.fin_bits = FIN_RIGHT;
            }
        }

        let other_start = self.absorb(other);
        let start = self.add_state();
        let prev_start = self.start();
        self.merge_states(start, prev_start);
        self.merge_states(start, other_start);
        self.set_start(start);
        self.fill_in_states();

        for state in &mut self.states {
            if state.is_final && !keep(state.fin_bits) {
                state.is_final = false;
            }
            state.fin_bits = 0;
        }
        self.remove_unreachable_states();
        self.remove_dead_end_states();
    }

    /// Draw the pending epsilon transitions: every state linked to a label
    /// takes over the out transitions of the label's entry states.
    pub fn epsilon_op(&mut self) {
        let mut merged: Vec<Vec<NameId>> = vec![vec![]; self.num_states()];
        loop {
            let mut work = vec![];
            for (id, state) in self.states() {
                for &name in &state.epsilon_trans {
                    if !merged[id.index()].contains(&name) {
                        work.push((id, name));
                    }
                }
            }
            if work.is_empty() {
                break;
            }
            for (id, name) in work {
                merged[id.index()].push(name);
                let targets: Vec<StateId> = self
                    .entry_points()
                    .iter()
                    .filter(|&&(n, _)| n == name)
                    .map(|&(_, s)| s)
                    .collect();
                for target in targets {
                    self.merge_states(id, target);
                }
            }
            self.fill_in_states();
            merged.resize(self.num_states(), vec![]);
        }
        for state in &mut self.states {
            state.epsilon_trans.clear();
        }
        self.remove_unreachable_states();
    }

    // ---- unary operators ----

    pub fn star_op(&mut self) {
        let prev_start = self.start();
        let start = self.add_state();
        self.merge_states(start, prev_start);
        self.set_start(start);

        for fin in self.final_states() {
            if fin != start {
                self.merge_states(fin, start);
            }
        }
        self.set_final(start);
        self.fill_in_states();
        self.remove_unreachable_states();
    }

    /// Every final state may carry on as if it were the start state.
    pub fn plus_op(&mut self) {
        let start = self.start();
        for fin in self.final_states() {
            if fin != start {
                self.merge_states(fin, start);
            }
        }
        self.fill_in_states();
        self.remove_unreachable_states();
    }

    pub fn question_op(&mut self) {
        self.union_op(Self::lambda_fsm());
    }

    pub fn exact_repeat_op(&mut self, n: u32) {
        if n == 0 {
            *self = Self::lambda_fsm();
            return;
        }
        let copy = self.clone();
        for _ in 1..n {
            self.concat_op(copy.clone());
        }
    }

    /// Zero up to `n` repetitions.
    pub fn max_repeat_op(&mut self, n: u32) {
        self.question_op();
        self.exact_repeat_op(n);
    }

    /// `n` or more repetitions.
    pub fn min_repeat_op(&mut self, n: u32) {
        let mut star = self.clone();
        star.star_op();
        if n == 0 {
            *self = star;
        } else {
            self.exact_repeat_op(n);
            self.concat_op(star);
        }
    }

    /// Between `low` and `high` repetitions, `low <= high`.
    pub fn range_repeat_op(&mut self, low: u32, high: u32) {
        debug_assert!(low <= high);
        let mut optional = self.clone();
        optional.max_repeat_op(high - low);
        if low == 0 {
            *self = optional;
        } else {
            self.exact_repeat_op(low);
            self.concat_op(optional);
        }
    }

    // ---- embeddings ----

    pub fn all_trans_action(&mut self, ordering: i32, action: ActionId) {
        for state in &mut self.states {
            for trans in state.out.iter_mut().filter(|t| t.target.is_some()) {
                trans.actions.set_action(ordering, action);
            }
        }
    }

    /// On the transitions leaving the start state.
    pub fn start_trans_action(&mut self, ordering: i32, action: ActionId) {
        self.isolate_start_state();
        let start = self.start();
        for trans in &mut self.state_mut(start).out {
            trans.actions.set_action(ordering, action);
        }
    }

    /// On the transitions entering a final state.
    pub fn finish_trans_action(&mut self, ordering: i32, action: ActionId) {
        for trans in self.trans_into_finals() {
            self.trans_mut(trans).actions.set_action(ordering, action);
        }
    }

    pub fn to_state_action(&mut self, ordering: i32, action: ActionId) {
        for state in &mut self.states {
            state.to_state_actions.set_action(ordering, action);
        }
    }

    pub fn from_state_action(&mut self, ordering: i32, action: ActionId) {
        for state in &mut self.states {
            state.from_state_actions.set_action(ordering, action);
        }
    }

    /// Run when the input ends in a final state.
    pub fn eof_action(&mut self, ordering: i32, action: ActionId) {
        for state in self.states.iter_mut().filter(|s| s.is_final) {
            state.eof_actions.set_action(ordering, action);
        }
    }

    pub fn all_trans_prior(&mut self, ordering: i32, key: i32, priority: i32) {
        for state in &mut self.states {
            for trans in &mut state.out {
                trans.priors.set_prior(ordering, key, priority);
            }
        }
    }

    /// Tag the transitions completing a token of a longest-match region.
    pub fn long_match_action(&mut self, ordering: i32, part: LmPartId) {
        for trans in self.trans_into_finals() {
            self.trans_mut(trans).lm_actions.set_action(ordering, part);
        }
    }

    fn trans_into_finals(&self) -> Vec<(StateId, usize)> {
        let mut found = vec![];
        for (id, state) in self.states() {
            for (i, trans) in state.out.iter().enumerate() {
                if trans.target.map_or(false, |t| self.state(t).is_final) {
                    found.push((id, i));
                }
            }
        }
        found
    }

    fn trans_mut(&mut self, (state, i): (StateId, usize)) -> &mut FsmTrans {
        &mut self.state_mut(state).out[i]
    }
}
