use super::{RedAction, RedEntry, RedFsm, RedState, RedTrans};
use crate::{
    fsm::{action::ActionTable, ActionId, FsmGraph, NameId, NameTree, StateId},
    key::{Key, KeyAlphabet},
    types::Map,
};

/// Reduces a numbered [`FsmGraph`] into a [`RedFsm`].
///
/// The graph must have gone through `set_state_numbers` so that final
/// states come last.
#[derive(Debug)]
pub struct RedFsmBuild<'g> {
    graph: &'g FsmGraph,
    alph: KeyAlphabet,
    names: Option<&'g NameTree>,
    region_entries: Vec<Option<NameId>>,
    want_complete: bool,
    action_map: Map<Vec<ActionId>, usize>,
}

impl<'g> RedFsmBuild<'g> {
    pub fn new(graph: &'g FsmGraph, alph: KeyAlphabet) -> Self {
        Self {
            graph,
            alph,
            names: None,
            region_entries: vec![],
            want_complete: false,
            action_map: Map::default(),
        }
    }

    /// Name the entry points after their scopes in `names`.
    pub fn names(mut self, names: &'g NameTree) -> Self {
        self.names = Some(names);
        self
    }

    /// The name scope of each region, in region id order.
    pub fn region_entries(mut self, entries: impl IntoIterator<Item = Option<NameId>>) -> Self {
        self.region_entries = entries.into_iter().collect();
        self
    }

    /// Cover every key of the alphabet in every state.
    pub fn want_complete(mut self, want_complete: bool) -> Self {
        self.want_complete = want_complete;
        self
    }

    pub fn reduce_machine(mut self) -> RedFsm {
        let graph = self.graph;
        self.reduce_action_tables();

        let err_state = graph.err_state().map(|s| s.index());
        let mut forced_error_state = false;
        let mut states = Vec::with_capacity(graph.num_states());
        for (id, state) in graph.states() {
            let mut red = RedState::default();
            red.set_id(id);
            red.set_final(state.is_final);
            self.set_state_actions(&mut red, id);
            self.set_eof_trans(&mut red, id);
            if Some(id.index()) != err_state {
                red.out = self.make_trans_list(id, err_state);
                forced_error_state |= err_state.is_none()
                    && red.out.iter().any(|t| t.target.is_none());
            }
            states.push(red);
        }

        let mut red = RedFsm {
            states,
            actions: self
                .action_map
                .iter()
                .map(|(actions, &id)| RedAction {
                    id,
                    actions: actions.clone(),
                })
                .collect(),
            entries: vec![],
            region_to_entry: vec![],
            start_state: graph.start().index(),
            err_state,
            first_final_state: graph.first_final_state(),
            max_key: self.alph.max_key(),
            want_complete: self.want_complete,
            forced_error_state: forced_error_state && self.want_complete,
        };
        self.make_entry_points(&mut red);
        red.max_key = self.find_max_key(&red);
        tracing::debug!(
            "reduced machine: {} states, {} action lists",
            red.states.len(),
            red.actions.len()
        );
        red
    }

    fn action_list(&self, table: &ActionTable) -> Option<usize> {
        if table.is_empty() {
            return None;
        }
        let list: Vec<ActionId> = table.actions().collect();
        self.action_map.get(&list).copied()
    }

    fn insert_action_list(&mut self, table: &ActionTable) {
        if table.is_empty() {
            return;
        }
        let list: Vec<ActionId> = table.actions().collect();
        let next = self.action_map.len();
        self.action_map.entry(list).or_insert(next);
    }

    /// Give every distinct ordered action list an id, in first-seen order.
    fn reduce_action_tables(&mut self) {
        let graph = self.graph;
        for (_, state) in graph.states() {
            self.insert_action_list(&state.to_state_actions);
            self.insert_action_list(&state.from_state_actions);
            self.insert_action_list(&state.eof_actions);
            for trans in &state.out {
                self.insert_action_list(&trans.actions);
            }
        }
    }

    fn set_state_actions(&self, red: &mut RedState, id: StateId) {
        let state = self.graph.state(id);
        red.to_state_action = self.action_list(&state.to_state_actions);
        red.from_state_action = self.action_list(&state.from_state_actions);
        red.eof_action = self.action_list(&state.eof_actions);
    }

    fn set_eof_trans(&self, red: &mut RedState, id: StateId) {
        red.eof_target = self.graph.state(id).eof_target.map(|s| s.index());
    }

    fn make_trans(
        &self,
        low: Key,
        high: Key,
        target: Option<StateId>,
        actions: Option<&ActionTable>,
        err: Option<usize>,
    ) -> RedTrans {
        RedTrans {
            low,
            high,
            target: target.map(|s| s.index()).or(err),
            action: actions.and_then(|a| self.action_list(a)),
        }
    }

    /// The transitions of a state as ranges. With `want_complete`, gaps
    /// become error transitions so that the ranges cover the alphabet.
    fn make_trans_list(&self, id: StateId, err: Option<usize>) -> Vec<RedTrans> {
        let state = self.graph.state(id);
        let mut out = Vec::with_capacity(state.out.len());
        let mut next = Some(self.alph.min_key());
        for trans in &state.out {
            if self.want_complete {
                if let Some(low) = next {
                    if low < trans.low {
                        out.push(self.make_trans(low, trans.low - 1, None, None, err));
                    }
                }
                next = trans
                    .high
                    .checked_add(1)
                    .filter(|&k| k <= self.alph.max_key());
            }
            out.push(self.make_trans(
                trans.low,
                trans.high,
                trans.target,
                Some(&trans.actions),
                err,
            ));
        }
        if self.want_complete {
            if let Some(low) = next {
                out.push(self.make_trans(low, self.alph.max_key(), None, None, err));
            }
        }
        out
    }

    fn make_entry_points(&self, red: &mut RedFsm) {
        for &(name_id, state) in self.graph.entry_points() {
            let name = match self.names {
                Some(names) => names.qualified_name(name_id),
                None => format!("{:?}", name_id),
            };
            red.entries.push(RedEntry {
                name_id,
                name,
                state: state.index(),
            });
        }
        red.region_to_entry = self
            .region_entries
            .iter()
            .map(|name| {
                let name = (*name)?;
                red.entries.iter().position(|e| e.name_id == name)
            })
            .collect();
    }

    fn find_max_key(&self, red: &RedFsm) -> Key {
        red.states
            .iter()
            .flat_map(|s| s.out.iter())
            .map(|t| t.high)
            .fold(self.alph.max_key(), Key::max)
    }
}

impl RedState {
    fn set_id(&mut self, id: StateId) {
        self.id = id.index();
    }

    fn set_final(&mut self, is_final: bool) {
        self.is_final = is_final;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::Builtin;

    fn numbered(mut graph: FsmGraph) -> FsmGraph {
        graph.depth_first_ordering();
        graph.sort_states_by_final();
        graph.set_state_numbers();
        graph
    }

    #[test]
    fn complete_machine_covers_alphabet() {
        let alph = KeyAlphabet::default();
        let mut graph = Builtin::Digit.make_fsm(&alph);
        graph.add_error_state();
        let graph = numbered(graph);
        let red = RedFsmBuild::new(&graph, alph).want_complete(true).reduce_machine();

        let err = red.err_state.expect("error state");
        for state in &red.states {
            if state.id == err {
                assert!(state.out.is_empty());
                continue;
            }
            let mut next = alph.min_key();
            for trans in &state.out {
                assert_eq!(trans.low, next);
                next = trans.high + 1;
            }
            assert_eq!(next, alph.max_key() + 1);
        }
        assert!(!red.forced_error_state);
    }

    #[test]
    fn first_final_threshold() {
        let alph = KeyAlphabet::default();
        let mut graph = FsmGraph::concat_fsm(&alph.string_keys("ab"));
        graph.star_op();
        let graph = numbered(graph);
        let red = RedFsmBuild::new(&graph, alph).reduce_machine();
        for state in &red.states {
            assert_eq!(state.is_final, state.id >= red.first_final_state);
        }
        assert!(red.start_state < red.num_states());
    }

    #[test]
    fn action_lists_are_shared() {
        let alph = KeyAlphabet::default();
        let (a, b) = (ActionId::from_raw(0), ActionId::from_raw(1));
        let mut graph = FsmGraph::concat_fsm(&alph.string_keys("xyz"));
        graph.all_trans_action(0, a);
        graph.all_trans_action(1, b);
        graph.eof_action(2, a);
        let graph = numbered(graph);
        let red = RedFsmBuild::new(&graph, alph).reduce_machine();

        assert_eq!(red.actions.len(), 2);
        assert_eq!(red.actions[0].actions, vec![a, b]);
        assert_eq!(red.actions[1].actions, vec![a]);
        let used: Vec<_> = red
            .states
            .iter()
            .flat_map(|s| s.out.iter())
            .map(|t| t.action)
            .collect();
        assert_eq!(used, vec![Some(0); 3]);
    }
}
