//! The pushdown automaton graph.
//!
//! The same structure holds the single-path machine of each production and
//! the parse automaton built from them. States and transitions live in
//! arenas; detached states stay in the arena with `detached` set and are
//! skipped by every iteration, so ids stay stable while the automaton is
//! built.

use crate::{
    fsm::RegionId,
    grammar::{LangElId, ProdId},
    types::OrdSet,
    util::display_fn,
};
use bit_vec::BitVec;
use std::{collections::BTreeMap, fmt};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PdaStateId(u32);
impl fmt::Debug for PdaStateId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "P#{:03}", self.0)
    }
}
impl PdaStateId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransId(u32);
impl TransId {
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Default)]
pub struct PdaTrans {
    pub low_key: LangElId,
    pub from: Option<PdaStateId>,
    pub to: Option<PdaStateId>,
    pub is_shift: bool,
    pub shift_prior: i64,
    /// Productions reduced on this key, with the priority of each.
    pub reductions: BTreeMap<ProdId, i64>,
    pub actions: Vec<u32>,
    pub act_ords: Vec<u64>,
    pub act_priors: Vec<i64>,
    /// Where each production of a nonterminal edge ends up when followed
    /// from the edge's source state.
    pub expand_to: OrdSet<(PdaStateId, ProdId)>,
    pub commits: OrdSet<u32>,
    pub after_shift_commits: OrdSet<u32>,
    pub action_set: Option<usize>,
}

impl PdaTrans {
    pub fn new(key: LangElId) -> Self {
        Self {
            low_key: key,
            ..Default::default()
        }
    }

    /// The highest priority among the shift and the reductions.
    pub fn max_prior(&self) -> i64 {
        let mut prior = i64::MIN;
        if self.is_shift && self.shift_prior > prior {
            prior = self.shift_prior;
        }
        for &red in self.reductions.values() {
            prior = prior.max(red);
        }
        prior
    }

    /// Add a reduction, keeping the higher priority if it is already there.
    pub fn add_in_reduction(&mut self, prod: ProdId, prior: i64) {
        let slot = self.reductions.entry(prod).or_insert(prior);
        if prior > *slot {
            *slot = prior;
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PdaState {
    pub dot_set: OrdSet<u32>,
    /// The dots visited while ordering actions. Must end up equal to
    /// `dot_set`.
    pub dot_set2: OrdSet<u32>,
    /// The production states (core items) this state was made from.
    pub state_set: OrdSet<(ProdId, PdaStateId)>,
    /// Commits of productions reduced from this state: `(prod, length)`.
    pub pending_commits: OrdSet<(ProdId, u32)>,
    pub trans_map: BTreeMap<LangElId, TransId>,
    pub in_range: Vec<TransId>,
    /// Token regions scanned in this state. `None` is the EOF region.
    pub regions: Vec<Option<RegionId>>,
    pub pre_regions: Vec<RegionId>,
    pub advance_reductions: bool,
    pub state_num: usize,
    pub is_final: bool,
    pub(crate) on_closure_queue: bool,
    pub(crate) in_closed_map: bool,
    detached: bool,
}

impl PdaState {
    pub fn find_trans(&self, key: LangElId) -> Option<TransId> {
        self.trans_map.get(&key).copied()
    }

    pub fn is_detached(&self) -> bool {
        self.detached
    }
}

#[derive(Debug, Clone, Default)]
pub struct PdaGraph {
    states: Vec<PdaState>,
    trans: Vec<PdaTrans>,
    start: Option<PdaStateId>,
    pub(crate) entry_states: Vec<PdaStateId>,
}

impl PdaGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&self) -> Option<PdaStateId> {
        self.start
    }

    pub fn set_start(&mut self, state: PdaStateId) {
        debug_assert!(self.start.is_none());
        self.start = Some(state);
    }

    pub fn entry_states(&self) -> &[PdaStateId] {
        &self.entry_states[..]
    }

    pub fn state(&self, id: PdaStateId) -> &PdaState {
        &self.states[id.index()]
    }

    pub fn state_mut(&mut self, id: PdaStateId) -> &mut PdaState {
        &mut self.states[id.index()]
    }

    pub fn trans(&self, id: TransId) -> &PdaTrans {
        &self.trans[id.index()]
    }

    pub fn trans_mut(&mut self, id: TransId) -> &mut PdaTrans {
        &mut self.trans[id.index()]
    }

    /// The attached states, in the order they were added.
    pub fn states(&self) -> impl Iterator<Item = (PdaStateId, &PdaState)> + '_ {
        self.states
            .iter()
            .enumerate()
            .filter(|(_, s)| !s.detached)
            .map(|(i, s)| (PdaStateId(i as u32), s))
    }

    pub fn state_ids(&self) -> Vec<PdaStateId> {
        self.states().map(|(id, _)| id).collect()
    }

    pub fn num_states(&self) -> usize {
        self.states().count()
    }

    /// The transitions leaving `state`, by key.
    pub fn out_trans(&self, state: PdaStateId) -> impl Iterator<Item = (LangElId, &PdaTrans)> + '_ {
        self.states[state.index()]
            .trans_map
            .iter()
            .map(move |(&key, &t)| (key, &self.trans[t.index()]))
    }

    pub fn add_state(&mut self) -> PdaStateId {
        let id = PdaStateId(self.states.len() as u32);
        self.states.push(PdaState::default());
        id
    }

    pub fn set_final(&mut self, state: PdaStateId) {
        self.states[state.index()].is_final = true;
    }

    pub fn find_trans(&self, state: PdaStateId, key: LangElId) -> Option<TransId> {
        self.states[state.index()].find_trans(key)
    }

    /// Allocate a transition that is not attached to any state yet.
    pub fn new_trans(&mut self, trans: PdaTrans) -> TransId {
        let id = TransId(self.trans.len() as u32);
        self.trans.push(trans);
        id
    }

    /// Link a transition to its source and target states. Does not add it
    /// to the out map of `from`.
    pub fn attach_trans(&mut self, from: PdaStateId, to: PdaStateId, trans: TransId) {
        let t = &mut self.trans[trans.index()];
        assert!(t.from.is_none() && t.to.is_none());
        t.from = Some(from);
        t.to = Some(to);
        self.states[to.index()].in_range.push(trans);
    }

    pub fn detach_trans(&mut self, from: PdaStateId, to: PdaStateId, trans: TransId) {
        let t = &mut self.trans[trans.index()];
        assert!(t.from == Some(from) && t.to == Some(to));
        t.from = None;
        t.to = None;
        self.states[to.index()].in_range.retain(|&i| i != trans);
    }

    /// Create a transition on `key` from `from` to `to` and put it in the
    /// out map of `from`.
    pub fn insert_new_trans(&mut self, from: PdaStateId, to: PdaStateId, key: LangElId) -> TransId {
        let trans = self.new_trans(PdaTrans::new(key));
        self.attach_trans(from, to, trans);
        let prev = self.states[from.index()].trans_map.insert(key, trans);
        debug_assert!(prev.is_none());
        trans
    }

    /// Draw the properties of `src` into `dest`.
    pub fn add_in_trans(&mut self, dest: TransId, src: &PdaTrans, src_advances: bool) {
        let dest_trans = &mut self.trans[dest.index()];
        if dest_trans.is_shift && src.is_shift {
            if src.shift_prior > dest_trans.shift_prior {
                dest_trans.shift_prior = src.shift_prior;
            }
        } else if src.is_shift {
            dest_trans.shift_prior = src.shift_prior;
        }
        dest_trans.is_shift |= src.is_shift;

        for (&prod, &prior) in &src.reductions {
            dest_trans.add_in_reduction(prod, prior);
        }
        dest_trans.commits.union_with(&src.commits);

        if src_advances {
            if let Some(to) = dest_trans.to {
                self.states[to.index()].advance_reductions = true;
            }
        }
    }

    pub fn add_in_reduction(&mut self, dest: TransId, prod: ProdId, prior: i64) {
        self.trans[dest.index()].add_in_reduction(prod, prior);
    }

    /// Walk from `from` along the keys of the single-path machine `fsm`,
    /// returning the state reached when `fsm` reaches its final state.
    pub fn follow_fsm(&self, mut from: PdaStateId, fsm: &PdaGraph) -> PdaStateId {
        let mut follow_src = fsm.start.expect("production machine has a start state");
        while !fsm.state(follow_src).is_final {
            let src = fsm.state(follow_src);
            assert_eq!(src.trans_map.len(), 1);
            let (&key, &follow_trans) = src.trans_map.iter().next().expect("one transition");

            let in_trans = self
                .find_trans(from, key)
                .expect("the automaton follows every production");
            from = self.trans(in_trans).to.expect("attached transition");
            follow_src = fsm.trans(follow_trans).to.expect("attached transition");
        }
        from
    }

    /// The number of transitions from the start state to the final state of
    /// a single-path machine.
    pub fn fsm_length(&self) -> usize {
        let mut length = 0;
        let mut state = self.start.expect("production machine has a start state");
        while !self.state(state).is_final {
            length += 1;
            let (_, &t) = self.state(state).trans_map.iter().next().expect("one transition");
            state = self.trans(t).to.expect("attached transition");
        }
        length
    }

    /// Move every transition into `src` so that it goes into `dest`.
    pub fn in_trans_move(&mut self, dest: PdaStateId, src: PdaStateId) {
        assert_ne!(dest, src);
        assert_ne!(Some(src), self.start);
        while let Some(&trans) = self.states[src.index()].in_range.first() {
            let from = self.trans[trans.index()]
                .from
                .expect("attached transition");
            self.detach_trans(from, src, trans);
            self.attach_trans(from, dest, trans);
        }
    }

    /// Detach `state` and every transition into and out of it.
    pub fn detach_state(&mut self, state: PdaStateId) {
        while let Some(&trans) = self.states[state.index()].in_range.first() {
            let from = self.trans[trans.index()]
                .from
                .expect("attached transition");
            self.detach_trans(from, state, trans);
            let key = self.trans[trans.index()].low_key;
            self.states[from.index()].trans_map.remove(&key);
        }
        self.remove_out_trans(state);
        let st = &mut self.states[state.index()];
        st.is_final = false;
        st.detached = true;
    }

    /// Detach and drop every transition leaving `state`.
    pub fn remove_out_trans(&mut self, state: PdaStateId) {
        let out = std::mem::take(&mut self.states[state.index()].trans_map);
        for trans in out.into_values() {
            let to = self.trans[trans.index()].to.expect("attached transition");
            self.detach_trans(state, to, trans);
        }
    }

    fn mark_reachable(&self) -> BitVec {
        let mut marks = BitVec::from_elem(self.states.len(), false);
        let mut stack: Vec<PdaStateId> = self.start.into_iter().collect();
        stack.extend(self.entry_states.iter().copied());
        while let Some(state) = stack.pop() {
            if marks.get(state.index()).unwrap_or(true) {
                continue;
            }
            marks.set(state.index(), true);
            for &t in self.states[state.index()].trans_map.values() {
                stack.extend(self.trans[t.index()].to);
            }
        }
        marks
    }

    /// Remove the states that cannot be reached from the start state or an
    /// entry state.
    pub fn remove_unreachable_states(&mut self) {
        let marks = self.mark_reachable();
        for id in self.state_ids() {
            if !marks[id.index()] {
                self.detach_state(id);
            }
        }
    }

    /// Number the attached states in list order.
    pub fn set_state_numbers(&mut self) {
        let mut num = 0;
        for state in self.states.iter_mut().filter(|s| !s.detached) {
            state.state_num = num;
            num += 1;
        }
    }

    pub fn display<'a>(
        &'a self,
        name_of: impl Fn(LangElId) -> String + 'a,
    ) -> impl fmt::Display + 'a {
        display_fn(move |f| {
            writeln!(f, "## states")?;
            for (id, state) in self.states() {
                write!(f, "- {:03}", state.state_num)?;
                if self.entry_states.contains(&id) {
                    f.write_str(" (entry)")?;
                }
                if state.is_final {
                    f.write_str(" (final)")?;
                }
                if state.advance_reductions {
                    f.write_str(" (advance)")?;
                }
                if !state.regions.is_empty() {
                    f.write_str(" regions=[")?;
                    for (i, region) in state.regions.iter().enumerate() {
                        if i > 0 {
                            f.write_str(", ")?;
                        }
                        match region {
                            Some(r) => write!(f, "{}", r.raw())?,
                            None => f.write_str("eof")?,
                        }
                    }
                    f.write_str("]")?;
                }
                writeln!(f)?;
                for (key, trans) in self.out_trans(id) {
                    write!(f, "  {}", name_of(key))?;
                    if let Some(to) = trans.to {
                        write!(f, " -> {:03}", self.state(to).state_num)?;
                    }
                    if trans.actions.is_empty() {
                        if trans.is_shift {
                            f.write_str(" shift")?;
                        }
                        for prod in trans.reductions.keys() {
                            write!(f, " reduce({})", prod.raw())?;
                        }
                    }
                    for &code in &trans.actions {
                        match skein_tables::PdaAction::decode(code) {
                            Some(action) => write!(f, " {}", action)?,
                            None => write!(f, " <{}>", code)?,
                        }
                    }
                    if !trans.commits.is_empty() {
                        write!(f, " commits={:?}", trans.commits.as_slice())?;
                    }
                    writeln!(f)?;
                }
            }
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(raw: u32) -> LangElId {
        LangElId::from_raw(raw)
    }

    fn chain(keys: &[u32]) -> PdaGraph {
        let mut g = PdaGraph::new();
        let mut last = g.add_state();
        g.set_start(last);
        for &k in keys {
            let next = g.add_state();
            let t = g.insert_new_trans(last, next, key(k));
            g.trans_mut(t).is_shift = true;
            last = next;
        }
        g.set_final(last);
        g
    }

    #[test]
    fn follow_and_length() {
        let prod = chain(&[1, 2]);
        assert_eq!(prod.fsm_length(), 2);
        assert_eq!(chain(&[]).fsm_length(), 0);

        let mut g = chain(&[1, 2, 3]);
        let start = g.start().unwrap();
        let end = g.follow_fsm(start, &prod);
        let third = g.find_trans(end, key(3)).unwrap();
        assert!(g.trans(third).to.is_some());
        assert_eq!(g.follow_fsm(start, &chain(&[])), start);
    }

    #[test]
    fn merging_transition_properties() {
        let mut g = PdaGraph::new();
        let a = g.add_state();
        let b = g.add_state();
        let t = g.insert_new_trans(a, b, key(4));
        g.add_in_reduction(t, ProdId::from_raw(1), 3);

        let mut src = PdaTrans::new(key(4));
        src.is_shift = true;
        src.shift_prior = 7;
        src.reductions.insert(ProdId::from_raw(1), 5);
        src.reductions.insert(ProdId::from_raw(2), -1);
        src.commits.insert(2);
        g.add_in_trans(t, &src, true);

        let trans = g.trans(t);
        assert!(trans.is_shift);
        assert_eq!(trans.shift_prior, 7);
        assert_eq!(trans.reductions[&ProdId::from_raw(1)], 5);
        assert_eq!(trans.reductions[&ProdId::from_raw(2)], -1);
        assert_eq!(trans.max_prior(), 7);
        assert_eq!(trans.commits.as_slice(), &[2]);
        assert!(g.state(b).advance_reductions);
    }

    #[test]
    fn moving_and_removing_states() {
        let mut g = PdaGraph::new();
        let s0 = g.add_state();
        let s1 = g.add_state();
        let s2 = g.add_state();
        let orphan = g.add_state();
        g.entry_states.push(s0);
        g.insert_new_trans(s0, s1, key(1));
        g.insert_new_trans(s1, s1, key(2));
        g.insert_new_trans(orphan, s2, key(3));

        g.in_trans_move(s2, s1);
        assert!(g.state(s1).in_range.is_empty());
        assert_eq!(g.state(s2).in_range.len(), 3);

        g.remove_unreachable_states();
        assert!(g.state(s1).is_detached());
        assert!(g.state(orphan).is_detached());
        assert_eq!(g.state(s2).in_range.len(), 1);
        g.set_state_numbers();
        assert_eq!(g.state(s2).state_num, 1);
        assert_eq!(g.num_states(), 2);
    }
}
