//! The state graph shared by every machine operator.
//!
//! States live in a `Vec` arena and are addressed by [`StateId`]. Removing
//! states compacts the arena and renumbers every reference, so ids are
//! always dense. Operators never leave epsilon transitions behind: where two
//! transitions on the same keys lead to different states, a combined state
//! standing for the set of original states is created on demand and filled
//! in by [`FsmGraph::fill_in_states`].

use super::{
    action::{ActionId, ActionTable, LmActionTable, LmPartId, PriorTable},
    name::NameId,
};
use crate::{
    key::{Key, KeyAlphabet},
    types::{Map, OrdSet},
    util::{display_fn, display_key},
};
use bit_vec::BitVec;
use std::{collections::VecDeque, fmt, mem};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct StateId(u32);
impl fmt::Debug for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "S#{:03}", self.0)
    }
}
impl fmt::Display for StateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}
impl StateId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A transition on the keys `low ..= high`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FsmTrans {
    pub low: Key,
    pub high: Key,
    /// `None` is a transition into the error state.
    pub target: Option<StateId>,
    pub actions: ActionTable,
    pub priors: PriorTable,
    pub lm_actions: LmActionTable,
}

impl FsmTrans {
    pub fn new(low: Key, high: Key, target: Option<StateId>) -> Self {
        Self {
            low,
            high,
            target,
            actions: ActionTable::default(),
            priors: PriorTable::default(),
            lm_actions: LmActionTable::default(),
        }
    }

    fn with_range(&self, low: Key, high: Key) -> Self {
        Self {
            low,
            high,
            ..self.clone()
        }
    }

    /// Same target and attached data, ignoring the key range.
    pub fn same_payload(&self, other: &FsmTrans) -> bool {
        self.target == other.target
            && self.actions == other.actions
            && self.priors == other.priors
            && self.lm_actions == other.lm_actions
    }
}

#[derive(Debug, Clone, Default)]
pub struct FsmState {
    /// Sorted, non-overlapping transitions.
    pub out: Vec<FsmTrans>,
    pub is_final: bool,
    pub to_state_actions: ActionTable,
    pub from_state_actions: ActionTable,
    pub eof_actions: ActionTable,
    pub eof_target: Option<StateId>,
    pub entry_ids: OrdSet<NameId>,
    /// Longest-match tokens that can complete from here. `None` stands for
    /// "nothing matched yet".
    pub lm_items: OrdSet<Option<LmPartId>>,
    /// Labels this state draws epsilon transitions to, resolved by
    /// [`FsmGraph::epsilon_op`].
    pub epsilon_trans: Vec<NameId>,
    /// For combined states, the original states merged into this one.
    pub(crate) state_set: OrdSet<StateId>,
    /// Marks the operand a final state came from during intersection and
    /// subtraction.
    pub(crate) fin_bits: u8,
}

impl FsmState {
    pub fn find_trans(&self, key: Key) -> Option<&FsmTrans> {
        let pos = self.out.partition_point(|t| t.high < key);
        self.out.get(pos).filter(|t| t.low <= key)
    }
}

#[derive(Debug, Clone)]
pub struct FsmGraph {
    pub(crate) states: Vec<FsmState>,
    pub(crate) start: StateId,
    /// Entry points sorted by name, several states per name allowed.
    pub(crate) entry_points: Vec<(NameId, StateId)>,
    pub(crate) err_state: Option<StateId>,
    pub lm_requires_error_state: bool,
    state_dict: Map<OrdSet<StateId>, StateId>,
    fill_queue: VecDeque<StateId>,
    order: Vec<StateId>,
}

impl Default for FsmGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl FsmGraph {
    /// A graph with a single, non-final start state.
    pub fn new() -> Self {
        Self {
            states: vec![FsmState::default()],
            start: StateId(0),
            entry_points: vec![],
            err_state: None,
            lm_requires_error_state: false,
            state_dict: Map::default(),
            fill_queue: VecDeque::new(),
            order: vec![],
        }
    }

    pub fn start(&self) -> StateId {
        self.start
    }

    pub fn set_start(&mut self, state: StateId) {
        self.start = state;
    }

    pub fn err_state(&self) -> Option<StateId> {
        self.err_state
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn state(&self, id: StateId) -> &FsmState {
        &self.states[id.index()]
    }

    pub fn state_mut(&mut self, id: StateId) -> &mut FsmState {
        &mut self.states[id.index()]
    }

    pub fn states(&self) -> impl Iterator<Item = (StateId, &FsmState)> + '_ {
        self.states
            .iter()
            .enumerate()
            .map(|(i, s)| (StateId(i as u32), s))
    }

    pub fn state_ids(&self) -> impl Iterator<Item = StateId> {
        (0..self.states.len() as u32).map(StateId)
    }

    pub fn add_state(&mut self) -> StateId {
        let id = StateId(self.states.len() as u32);
        self.states.push(FsmState::default());
        id
    }

    pub fn final_states(&self) -> Vec<StateId> {
        self.states()
            .filter_map(|(id, s)| s.is_final.then_some(id))
            .collect()
    }

    pub fn set_final(&mut self, state: StateId) {
        self.states[state.index()].is_final = true;
    }

    pub fn unset_final(&mut self, state: StateId) {
        self.states[state.index()].is_final = false;
    }

    pub fn unset_all_finals(&mut self) {
        for state in &mut self.states {
            state.is_final = false;
        }
    }

    pub fn entry_points(&self) -> &[(NameId, StateId)] {
        &self.entry_points[..]
    }

    pub fn set_entry(&mut self, id: NameId, state: StateId) {
        let pos = self.entry_points.partition_point(|&(n, _)| n <= id);
        self.entry_points.insert(pos, (id, state));
        self.states[state.index()].entry_ids.insert(id);
    }

    /// Remove every entry point registered under `id`.
    pub fn unset_entry(&mut self, id: NameId) {
        let states = &mut self.states;
        self.entry_points.retain(|&(n, state)| {
            if n == id {
                states[state.index()].entry_ids.remove(&id);
                false
            } else {
                true
            }
        });
    }

    pub fn unset_all_entry_points(&mut self) {
        for state in &mut self.states {
            state.entry_ids.clear();
        }
        self.entry_points.clear();
    }

    /// Whether any transition or EOF target leads into `state`.
    pub fn has_in_trans(&self, state: StateId) -> bool {
        self.states.iter().any(|s| {
            s.eof_target == Some(state) || s.out.iter().any(|t| t.target == Some(state))
        })
    }

    /// Make sure the start state has no in-transitions and no entry points,
    /// so that changing it affects only the start of the machine.
    pub fn isolate_start_state(&mut self) {
        let start = self.start;
        if !self.has_in_trans(start) && self.states[start.index()].entry_ids.is_empty() {
            return;
        }
        let new_start = self.add_state();
        self.merge_states(new_start, start);
        self.start = new_start;
        debug_assert!(self.fill_queue.is_empty());
        self.remove_unreachable_states();
    }

    /// Append the states of `other` to this graph, returning the id its
    /// start state was given. The start state of `other` loses its start
    /// status; its entry points are kept.
    pub(crate) fn absorb(&mut self, other: FsmGraph) -> StateId {
        let offset = self.states.len() as u32;
        let shift = |s: StateId| StateId(s.0 + offset);
        for mut state in other.states {
            for trans in &mut state.out {
                trans.target = trans.target.map(shift);
            }
            state.eof_target = state.eof_target.map(shift);
            state.state_set = state.state_set.iter().copied().map(shift).collect();
            self.states.push(state);
        }
        for (id, state) in other.entry_points {
            let pos = self.entry_points.partition_point(|&(n, _)| n <= id);
            self.entry_points.insert(pos, (id, shift(state)));
        }
        self.lm_requires_error_state |= other.lm_requires_error_state;
        shift(other.start)
    }

    // ---- merging ----

    /// Merge the out transitions and properties of `src` into `dest`.
    ///
    /// Transitions that cross and lead to different states are redirected
    /// to combined states, which are queued and must be completed with
    /// [`FsmGraph::fill_in_states`].
    pub fn merge_states(&mut self, dest: StateId, src: StateId) {
        let src_state = self.states[src.index()].clone();
        let dest_out = mem::take(&mut self.states[dest.index()].out);
        let out = if dest == src {
            dest_out
        } else {
            self.out_merge(dest_out, src_state.out)
        };

        let dest = &mut self.states[dest.index()];
        dest.out = out;
        dest.is_final |= src_state.is_final;
        dest.fin_bits |= src_state.fin_bits;
        dest.to_state_actions.set_actions(&src_state.to_state_actions);
        dest.from_state_actions.set_actions(&src_state.from_state_actions);
        dest.eof_actions.set_actions(&src_state.eof_actions);
        if dest.eof_target.is_none() {
            dest.eof_target = src_state.eof_target;
        }
        dest.lm_items.union_with(&src_state.lm_items);
        for name in src_state.epsilon_trans {
            if !dest.epsilon_trans.contains(&name) {
                dest.epsilon_trans.push(name);
            }
        }
    }

    fn out_merge(&mut self, dest: Vec<FsmTrans>, src: Vec<FsmTrans>) -> Vec<FsmTrans> {
        let mut result = Vec::with_capacity(dest.len() + src.len());
        let mut dest_iter = dest.into_iter();
        let mut src_iter = src.into_iter();
        let mut d = dest_iter.next();
        let mut s = src_iter.next();
        loop {
            match (d.take(), s.take()) {
                (None, None) => break,
                (Some(dt), None) => {
                    result.push(dt);
                    d = dest_iter.next();
                }
                (None, Some(st)) => {
                    result.push(st);
                    s = src_iter.next();
                }
                (Some(mut dt), Some(mut st)) => {
                    if dt.high < st.low {
                        result.push(dt);
                        d = dest_iter.next();
                        s = Some(st);
                    } else if st.high < dt.low {
                        result.push(st);
                        s = src_iter.next();
                        d = Some(dt);
                    } else if dt.low < st.low {
                        result.push(dt.with_range(dt.low, st.low - 1));
                        dt.low = st.low;
                        d = Some(dt);
                        s = Some(st);
                    } else if st.low < dt.low {
                        result.push(st.with_range(st.low, dt.low - 1));
                        st.low = dt.low;
                        d = Some(dt);
                        s = Some(st);
                    } else {
                        let high = dt.high.min(st.high);
                        result.push(self.cross_trans(&dt, &st, high));
                        if dt.high > high {
                            dt.low = high + 1;
                            d = Some(dt);
                        } else {
                            d = dest_iter.next();
                        }
                        if st.high > high {
                            st.low = high + 1;
                            s = Some(st);
                        } else {
                            s = src_iter.next();
                        }
                    }
                }
            }
        }
        result
    }

    /// Combine two transitions over the same keys `dt.low ..= high`.
    fn cross_trans(&mut self, dt: &FsmTrans, st: &FsmTrans, high: Key) -> FsmTrans {
        use std::cmp::Ordering::*;
        match st.priors.compare(&dt.priors) {
            Greater => st.with_range(dt.low, high),
            Less => dt.with_range(dt.low, high),
            Equal => {
                let mut trans = dt.with_range(dt.low, high);
                trans.target = self.combine_targets(dt.target, st.target);
                trans.actions.set_actions(&st.actions);
                trans.priors.set_priors(&st.priors);
                trans.lm_actions.set_actions(&st.lm_actions);
                trans
            }
        }
    }

    fn base_set(&self, state: StateId) -> OrdSet<StateId> {
        let set = &self.states[state.index()].state_set;
        if set.is_empty() {
            [state].into_iter().collect()
        } else {
            set.clone()
        }
    }

    fn combine_targets(&mut self, a: Option<StateId>, b: Option<StateId>) -> Option<StateId> {
        let (a, b) = match (a, b) {
            (None, x) | (x, None) => return x,
            (Some(a), Some(b)) if a == b => return Some(a),
            (Some(a), Some(b)) => (a, b),
        };
        let mut set = self.base_set(a);
        set.union_with(&self.base_set(b));
        if let Some(&found) = self.state_dict.get(&set) {
            return Some(found);
        }
        let combined = self.add_state();
        self.states[combined.index()].state_set = set.clone();
        self.state_dict.insert(set, combined);
        self.fill_queue.push_back(combined);
        Some(combined)
    }

    /// Complete every combined state queued by merging.
    pub fn fill_in_states(&mut self) {
        while let Some(combined) = self.fill_queue.pop_front() {
            let members = self.states[combined.index()].state_set.clone();
            for member in &members {
                self.merge_states(combined, *member);
            }
        }
        for state in &mut self.states {
            state.state_set.clear();
        }
        self.state_dict.clear();
    }

    /// Give every entry id a single target state, merging the targets of
    /// ids registered more than once.
    pub fn deterministic_entry(&mut self) {
        let prev = mem::take(&mut self.entry_points);
        self.unset_all_entry_points();

        let mut i = 0;
        while i < prev.len() {
            let id = prev[i].0;
            let end = i + prev[i..].iter().take_while(|&&(n, _)| n == id).count();
            if end - i == 1 {
                self.set_entry(id, prev[i].1);
            } else {
                let entry = self.add_state();
                for &(_, state) in &prev[i..end] {
                    self.merge_states(entry, state);
                }
                self.set_entry(id, entry);
            }
            i = end;
        }
        self.fill_in_states();
        self.remove_unreachable_states();
    }

    // ---- removal ----

    /// Keep the states whose bit is set in `keep`, renumbering references.
    /// Transitions into removed states are dropped.
    fn retain_states(&mut self, keep: &BitVec) {
        let mut remap = vec![None; self.states.len()];
        let mut next = 0;
        for (i, slot) in remap.iter_mut().enumerate() {
            if keep.get(i).unwrap_or(false) {
                *slot = Some(StateId(next));
                next += 1;
            }
        }
        if next as usize == self.states.len() {
            return;
        }
        let map = |s: StateId| remap[s.index()];

        let old = mem::take(&mut self.states);
        for (i, mut state) in old.into_iter().enumerate() {
            if remap[i].is_none() {
                continue;
            }
            state.out.retain_mut(|t| match t.target {
                Some(target) => match map(target) {
                    Some(new) => {
                        t.target = Some(new);
                        true
                    }
                    None => false,
                },
                None => true,
            });
            state.eof_target = state.eof_target.and_then(map);
            state.state_set = state.state_set.iter().filter_map(|&s| map(s)).collect();
            self.states.push(state);
        }

        self.start = map(self.start).expect("the start state is never removed");
        self.err_state = self.err_state.and_then(map);
        self.entry_points = mem::take(&mut self.entry_points)
            .into_iter()
            .filter_map(|(id, s)| map(s).map(|s| (id, s)))
            .collect();
        self.order.clear();
    }

    fn mark_reachable(&self) -> BitVec {
        let mut marks = BitVec::from_elem(self.states.len(), false);
        let mut stack: Vec<StateId> = vec![self.start];
        stack.extend(self.entry_points.iter().map(|&(_, s)| s));
        stack.extend(self.err_state);
        while let Some(state) = stack.pop() {
            if marks.get(state.index()).unwrap_or(true) {
                continue;
            }
            marks.set(state.index(), true);
            let st = &self.states[state.index()];
            stack.extend(st.out.iter().filter_map(|t| t.target));
            stack.extend(st.eof_target);
        }
        marks
    }

    /// Remove states that cannot be reached from the start state, an entry
    /// point or the error state.
    pub fn remove_unreachable_states(&mut self) {
        let marks = self.mark_reachable();
        self.retain_states(&marks);
    }

    /// Remove states from which no final state can be reached. The start
    /// state and entry points are kept.
    pub fn remove_dead_end_states(&mut self) {
        let n = self.states.len();
        let mut preds = vec![vec![]; n];
        for (id, state) in self.states() {
            for target in state.out.iter().filter_map(|t| t.target) {
                preds[target.index()].push(id);
            }
        }

        let mut marks = BitVec::from_elem(n, false);
        let mut stack: Vec<StateId> = self.final_states();
        while let Some(state) = stack.pop() {
            if marks.get(state.index()).unwrap_or(true) {
                continue;
            }
            marks.set(state.index(), true);
            stack.extend(preds[state.index()].iter().copied());
        }
        marks.set(self.start.index(), true);
        for &(_, state) in &self.entry_points {
            marks.set(state.index(), true);
        }
        if let Some(err) = self.err_state {
            marks.set(err.index(), true);
        }

        self.retain_states(&marks);
        self.remove_unreachable_states();
    }

    /// States reachable from `from` without passing through a final state.
    /// `from` itself is always included; other final states are not.
    pub fn reachable_stop_final(&self, from: StateId) -> BitVec {
        let mut marks = BitVec::from_elem(self.states.len(), false);
        let mut stack = vec![from];
        marks.set(from.index(), true);
        while let Some(state) = stack.pop() {
            for target in self.states[state.index()].out.iter().filter_map(|t| t.target) {
                if !self.states[target.index()].is_final && !marks[target.index()] {
                    marks.set(target.index(), true);
                    stack.push(target);
                }
            }
        }
        marks
    }

    // ---- cleanup passes ----

    pub fn remove_action_dups(&mut self) {
        for state in &mut self.states {
            state.to_state_actions.remove_dups();
            state.from_state_actions.remove_dups();
            state.eof_actions.remove_dups();
            for trans in &mut state.out {
                trans.actions.remove_dups();
            }
        }
    }

    pub fn null_action_keys(&mut self) {
        for state in &mut self.states {
            state.to_state_actions.null_keys();
            state.from_state_actions.null_keys();
            state.eof_actions.null_keys();
            for trans in &mut state.out {
                trans.actions.null_keys();
                trans.lm_actions.null_keys();
            }
        }
    }

    pub fn clear_all_priorities(&mut self) {
        for state in &mut self.states {
            for trans in &mut state.out {
                trans.priors.clear();
            }
        }
    }

    /// Merge adjacent ranges that agree on target, actions and priorities.
    pub fn compress_transitions(&mut self) {
        for state in &mut self.states {
            let mut out: Vec<FsmTrans> = Vec::with_capacity(state.out.len());
            for trans in state.out.drain(..) {
                match out.last_mut() {
                    Some(last) if last.high + 1 == trans.low && last.same_payload(&trans) => {
                        last.high = trans.high;
                    }
                    _ => out.push(trans),
                }
            }
            state.out = out;
        }
    }

    // ---- error handling ----

    /// Cover every key missing from `state` with a transition to the error
    /// state.
    pub fn fill_gaps(&mut self, state: StateId, alph: &KeyAlphabet) {
        let st = &mut self.states[state.index()];
        let mut out = Vec::with_capacity(st.out.len() * 2 + 1);
        let mut next = Some(alph.min_key());
        for trans in st.out.drain(..) {
            if let Some(low) = next {
                if low < trans.low {
                    out.push(FsmTrans::new(low, trans.low - 1, None));
                }
            }
            next = trans.high.checked_add(1).filter(|&k| k <= alph.max_key());
            out.push(trans);
        }
        if let Some(low) = next {
            out.push(FsmTrans::new(low, alph.max_key(), None));
        }
        st.out = out;
    }

    /// Send the keys `state` does not handle to `target`, running `action`.
    pub fn set_error_target(
        &mut self,
        state: StateId,
        target: StateId,
        ordering: i32,
        action: ActionId,
        alph: &KeyAlphabet,
    ) {
        self.fill_gaps(state, alph);
        for trans in &mut self.states[state.index()].out {
            if trans.target.is_none() {
                trans.target = Some(target);
                trans.actions.set_action(ordering, action);
            }
        }
    }

    /// Whether some state misses a key or has a transition to the error
    /// state.
    pub fn has_error_trans(&self, alph: &KeyAlphabet) -> bool {
        self.states.iter().any(|state| {
            let mut next = Some(alph.min_key());
            for trans in &state.out {
                if trans.target.is_none() || next != Some(trans.low) {
                    return true;
                }
                next = trans.high.checked_add(1).filter(|&k| k <= alph.max_key());
            }
            next.is_some()
        })
    }

    pub fn add_error_state(&mut self) -> StateId {
        let err = self.add_state();
        self.err_state = Some(err);
        err
    }

    // ---- ordering ----

    /// Order states depth first from the start state, then from the entry
    /// points. The order takes effect in [`FsmGraph::set_state_numbers`].
    pub fn depth_first_ordering(&mut self) {
        let mut visited = BitVec::from_elem(self.states.len(), false);
        let mut order = Vec::with_capacity(self.states.len());
        let roots: Vec<StateId> = std::iter::once(self.start)
            .chain(self.entry_points.iter().map(|&(_, s)| s))
            .chain(self.err_state)
            .collect();
        for root in roots {
            self.dfs_visit(root, &mut visited, &mut order);
        }
        for id in self.state_ids() {
            if !visited[id.index()] {
                order.push(id);
            }
        }
        self.order = order;
    }

    fn dfs_visit(&self, root: StateId, visited: &mut BitVec, order: &mut Vec<StateId>) {
        let mut stack = vec![root];
        while let Some(state) = stack.pop() {
            if visited[state.index()] {
                continue;
            }
            visited.set(state.index(), true);
            order.push(state);
            let st = &self.states[state.index()];
            for target in st.out.iter().rev().filter_map(|t| t.target) {
                if !visited[target.index()] {
                    stack.push(target);
                }
            }
        }
    }

    /// Move final states to the end of the order, keeping the relative
    /// order within both groups.
    pub fn sort_states_by_final(&mut self) {
        if self.order.is_empty() {
            self.order = self.state_ids().collect();
        }
        let states = &self.states;
        let (mut order, finals): (Vec<_>, Vec<_>) = self
            .order
            .iter()
            .copied()
            .partition(|s| !states[s.index()].is_final);
        order.extend(finals);
        self.order = order;
    }

    /// Renumber the states following the computed order.
    pub fn set_state_numbers(&mut self) {
        let order = mem::take(&mut self.order);
        if order.is_empty() {
            return;
        }
        let mut remap = vec![StateId(0); self.states.len()];
        for (new, old) in order.iter().enumerate() {
            remap[old.index()] = StateId(new as u32);
        }
        let map = |s: StateId| remap[s.index()];

        let mut old: Vec<Option<FsmState>> =
            mem::take(&mut self.states).into_iter().map(Some).collect();
        for id in &order {
            if let Some(mut state) = old[id.index()].take() {
                for trans in &mut state.out {
                    trans.target = trans.target.map(map);
                }
                state.eof_target = state.eof_target.map(map);
                self.states.push(state);
            }
        }
        self.start = map(self.start);
        self.err_state = self.err_state.map(map);
        for entry in &mut self.entry_points {
            entry.1 = map(entry.1);
        }
    }

    /// The id of the first final state after sorting by finality.
    pub fn first_final_state(&self) -> usize {
        self.states
            .iter()
            .position(|s| s.is_final)
            .unwrap_or(self.states.len())
    }

    // ---- running ----

    /// Run the machine over `keys`. Returns whether it ends in a final state.
    pub fn accepts(&self, keys: &[Key]) -> bool {
        let mut cur = self.start;
        for &key in keys {
            match self.states[cur.index()].find_trans(key).and_then(|t| t.target) {
                Some(next) => cur = next,
                None => return false,
            }
        }
        self.states[cur.index()].is_final
    }

    pub fn display(&self) -> impl fmt::Display + '_ {
        display_fn(move |f| {
            writeln!(f, "## states")?;
            for (id, state) in self.states() {
                write!(f, "- {:?}", id)?;
                if id == self.start {
                    f.write_str(" (start)")?;
                }
                if state.is_final {
                    f.write_str(" (final)")?;
                }
                if Some(id) == self.err_state {
                    f.write_str(" (error)")?;
                }
                if !state.entry_ids.is_empty() {
                    write!(f, " entry={:?}", state.entry_ids.as_slice())?;
                }
                writeln!(f)?;
                for trans in &state.out {
                    if trans.low == trans.high {
                        write!(f, "  {}", display_key(trans.low))?;
                    } else {
                        write!(f, "  {}..{}", display_key(trans.low), display_key(trans.high))?;
                    }
                    match trans.target {
                        Some(target) => write!(f, " -> {:?}", target)?,
                        None => f.write_str(" -> <err>")?,
                    }
                    if !trans.actions.is_empty() {
                        write!(f, " {:?}", trans.actions.actions().collect::<Vec<_>>())?;
                    }
                    writeln!(f)?;
                }
                if !state.eof_actions.is_empty() {
                    writeln!(f, "  eof {:?}", state.eof_actions.actions().collect::<Vec<_>>())?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_way() -> FsmGraph {
        // S0 -a-> S1 (final), S0 -b-> S2 (final)
        let mut g = FsmGraph::new();
        let s1 = g.add_state();
        let s2 = g.add_state();
        g.state_mut(g.start()).out = vec![
            FsmTrans::new('a' as Key, 'a' as Key, Some(s1)),
            FsmTrans::new('b' as Key, 'b' as Key, Some(s2)),
        ];
        g.set_final(s1);
        g.set_final(s2);
        g
    }

    #[test]
    fn merge_crossing_ranges() {
        let mut g = FsmGraph::new();
        let x = g.add_state();
        let y = g.add_state();
        let a = g.add_state();
        let b = g.add_state();
        g.set_final(a);
        g.set_final(b);
        g.state_mut(x).out = vec![FsmTrans::new(0, 10, Some(a))];
        g.state_mut(y).out = vec![FsmTrans::new(5, 20, Some(b))];
        let start = g.start();
        g.merge_states(start, x);
        g.merge_states(start, y);
        g.fill_in_states();

        let out = &g.state(start).out;
        assert_eq!(
            out.iter().map(|t| (t.low, t.high)).collect::<Vec<_>>(),
            vec![(0, 4), (5, 10), (11, 20)]
        );
        assert_eq!(out[0].target, Some(a));
        assert_eq!(out[2].target, Some(b));
        let combined = out[1].target.expect("combined target");
        assert!(combined != a && combined != b);
        assert!(g.state(combined).is_final);
    }

    #[test]
    fn unreachable_and_dead_ends() {
        let mut g = two_way();
        let orphan = g.add_state();
        g.set_final(orphan);
        g.remove_unreachable_states();
        assert_eq!(g.num_states(), 3);

        let dead = g.add_state();
        let start = g.start();
        g.state_mut(start).out.push(FsmTrans::new('c' as Key, 'c' as Key, Some(dead)));
        g.remove_dead_end_states();
        assert_eq!(g.num_states(), 3);
        assert!(g.accepts(&['a' as Key]));
        assert!(!g.accepts(&['c' as Key]));
    }

    #[test]
    fn gaps_and_ordering() {
        let alph = KeyAlphabet::default();
        let mut g = two_way();
        assert!(g.has_error_trans(&alph));
        let start = g.start();
        g.fill_gaps(start, &alph);
        let keys: Vec<_> = g.state(start).out.iter().map(|t| (t.low, t.high)).collect();
        assert_eq!(
            keys,
            vec![(-128, 96), (97, 97), (98, 98), (99, 127)]
        );

        g.compress_transitions();
        g.depth_first_ordering();
        g.sort_states_by_final();
        g.set_state_numbers();
        assert_eq!(g.first_final_state(), 1);
        assert!(g.accepts(&['b' as Key]));
    }
}
