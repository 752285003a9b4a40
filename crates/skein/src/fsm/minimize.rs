//! State minimization by partition refinement.

use super::{
    action::{ActionTable, LmActionTable, LmPartId, PriorTable},
    graph::{FsmGraph, FsmState, StateId},
    name::NameId,
};
use crate::{
    key::Key,
    types::{Map, OrdSet},
};

/// Everything about a state that does not depend on other states.
#[derive(Hash, PartialEq, Eq)]
struct InitKey {
    is_final: bool,
    to_state_actions: ActionTable,
    from_state_actions: ActionTable,
    eof_actions: ActionTable,
    has_eof_target: bool,
    lm_items: OrdSet<Option<LmPartId>>,
    epsilon_trans: Vec<NameId>,
}

#[derive(Hash, PartialEq, Eq)]
struct TransSig {
    low: Key,
    high: Key,
    target: Option<usize>,
    actions: ActionTable,
    priors: PriorTable,
    lm_actions: LmActionTable,
}

#[derive(Hash, PartialEq, Eq)]
struct StateSig {
    class: usize,
    out: Vec<TransSig>,
    eof_target: Option<usize>,
}

impl FsmGraph {
    /// Merge behaviourally equivalent states.
    ///
    /// Unreachable states are removed first. Two states end up merged when
    /// they agree on finality, their state actions and, for every key, on
    /// the class of the target and the data carried by the transition.
    pub fn minimize_partition2(&mut self) {
        self.remove_unreachable_states();

        let mut classes = Map::<InitKey, usize>::default();
        let mut class_of: Vec<usize> = self
            .states
            .iter()
            .map(|s| {
                let key = InitKey {
                    is_final: s.is_final,
                    to_state_actions: s.to_state_actions.clone(),
                    from_state_actions: s.from_state_actions.clone(),
                    eof_actions: s.eof_actions.clone(),
                    has_eof_target: s.eof_target.is_some(),
                    lm_items: s.lm_items.clone(),
                    epsilon_trans: s.epsilon_trans.clone(),
                };
                let next = classes.len();
                *classes.entry(key).or_insert(next)
            })
            .collect();
        let mut num_classes = classes.len();

        loop {
            let mut sigs = Map::<StateSig, usize>::default();
            let refined: Vec<usize> = self
                .states
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let sig = signature(s, class_of[i], &class_of);
                    let next = sigs.len();
                    *sigs.entry(sig).or_insert(next)
                })
                .collect();
            let refined_count = sigs.len();
            class_of = refined;
            if refined_count == num_classes {
                break;
            }
            num_classes = refined_count;
        }

        tracing::trace!(
            "minimize: {} states -> {} classes",
            self.states.len(),
            num_classes
        );
        self.collapse(&class_of, num_classes);
        self.compress_transitions();
    }

    /// Rebuild the graph with one state per class. The first member of each
    /// class stands for the whole class.
    fn collapse(&mut self, class_of: &[usize], num_classes: usize) {
        if num_classes == self.states.len() {
            return;
        }
        let map = |s: StateId| StateId::from_raw(class_of[s.index()] as u32);

        let mut new_states: Vec<Option<FsmState>> = vec![None; num_classes];
        let old = std::mem::take(&mut self.states);
        for (i, mut state) in old.into_iter().enumerate() {
            let class = class_of[i];
            match &mut new_states[class] {
                Some(rep) => {
                    rep.entry_ids.union_with(&state.entry_ids);
                }
                slot @ None => {
                    for trans in &mut state.out {
                        trans.target = trans.target.map(map);
                    }
                    state.eof_target = state.eof_target.map(map);
                    *slot = Some(state);
                }
            }
        }
        self.states = new_states.into_iter().flatten().collect();

        self.start = map(self.start);
        self.err_state = self.err_state.map(map);
        let mut entries: Vec<_> = std::mem::take(&mut self.entry_points)
            .into_iter()
            .map(|(id, s)| (id, map(s)))
            .collect();
        entries.sort();
        entries.dedup();
        self.entry_points = entries;
    }
}

fn signature(state: &FsmState, class: usize, class_of: &[usize]) -> StateSig {
    let mut out: Vec<TransSig> = Vec::with_capacity(state.out.len());
    for trans in &state.out {
        let target = trans.target.map(|t| class_of[t.index()]);
        match out.last_mut() {
            Some(last)
                if last.high + 1 == trans.low
                    && last.target == target
                    && last.actions == trans.actions
                    && last.priors == trans.priors
                    && last.lm_actions == trans.lm_actions =>
            {
                last.high = trans.high;
            }
            _ => out.push(TransSig {
                low: trans.low,
                high: trans.high,
                target,
                actions: trans.actions.clone(),
                priors: trans.priors.clone(),
                lm_actions: trans.lm_actions.clone(),
            }),
        }
    }
    StateSig {
        class,
        out,
        eof_target: state.eof_target.map(|t| class_of[t.index()]),
    }
}

#[cfg(test)]
mod tests {
    use crate::{
        fsm::{action::ActionId, graph::FsmGraph},
        key::Key,
    };

    fn keys(s: &str) -> Vec<Key> {
        s.bytes().map(|b| b as Key).collect()
    }

    fn lit(s: &str) -> FsmGraph {
        FsmGraph::concat_fsm(&keys(s))
    }

    /// Every string over `a`, `b`, `c` of length up to four.
    fn corpus() -> Vec<Vec<Key>> {
        let mut out = vec![vec![]];
        let mut last = vec![vec![]];
        for _ in 0..4 {
            let mut next = vec![];
            for prefix in &last {
                for b in b'a'..=b'c' {
                    let mut s: Vec<Key> = prefix.clone();
                    s.push(b as Key);
                    next.push(s);
                }
            }
            out.extend(next.iter().cloned());
            last = next;
        }
        out
    }

    #[test]
    fn merges_equivalent_states() {
        // (ab | cb): the two `b` states are equivalent.
        let mut g = FsmGraph::concat_fsm(&keys("ab"));
        g.union_op(FsmGraph::concat_fsm(&keys("cb")));
        let before = g.num_states();
        g.minimize_partition2();
        assert!(g.num_states() < before);
        assert_eq!(g.num_states(), 3);
        assert!(g.accepts(&keys("ab")));
        assert!(g.accepts(&keys("cb")));
        assert!(!g.accepts(&keys("b")));
    }

    #[test]
    fn idempotent() {
        let mut g = FsmGraph::concat_fsm(&keys("abc"));
        g.star_op();
        g.union_op(FsmGraph::concat_fsm(&keys("abd")));
        g.minimize_partition2();
        let once = g.num_states();
        let display_once = g.display().to_string();
        g.minimize_partition2();
        assert_eq!(g.num_states(), once);
        assert_eq!(g.display().to_string(), display_once);
    }

    #[test]
    fn preserves_the_language() {
        let machines: [(&str, fn() -> FsmGraph); 5] = [
            ("(ab)* | abc", || {
                let mut g = lit("ab");
                g.star_op();
                g.union_op(lit("abc"));
                g
            }),
            ("[ab]+ c", || {
                let mut g = FsmGraph::range_fsm(b'a' as Key, b'b' as Key);
                g.plus_op();
                g.concat_op(lit("c"));
                g
            }),
            ("[a-c]* & a[a-c]*", || {
                let mut g = FsmGraph::range_star_fsm(b'a' as Key, b'c' as Key);
                let mut rhs = lit("a");
                rhs.concat_op(FsmGraph::range_star_fsm(b'a' as Key, b'c' as Key));
                g.intersect_op(rhs);
                g
            }),
            ("[a-c]+ - (ab | ba)", || {
                let mut g = FsmGraph::range_fsm(b'a' as Key, b'c' as Key);
                g.plus_op();
                let mut rhs = lit("ab");
                rhs.union_op(lit("ba"));
                g.subtract_op(rhs);
                g
            }),
            ("(a | bc)* b", || {
                let mut g = lit("a");
                g.union_op(lit("bc"));
                g.star_op();
                g.concat_op(lit("b"));
                g
            }),
        ];

        let corpus = corpus();
        for (name, make) in machines {
            let original = make();
            let mut minimized = make();
            minimized.minimize_partition2();
            assert!(minimized.num_states() <= original.num_states(), "{}", name);
            for s in &corpus {
                let (got, want) = (minimized.accepts(s), original.accepts(s));
                assert_eq!(got, want, "{} on {:?}", name, s);
            }
        }
    }

    #[test]
    fn state_actions_keep_states_apart() {
        // `a | b`: the two final states only differ in their state actions.
        let embeds: [fn(&mut FsmGraph); 3] = [
            |g: &mut FsmGraph| g.eof_action(0, ActionId::from_raw(0)),
            |g: &mut FsmGraph| g.to_state_action(0, ActionId::from_raw(0)),
            |g: &mut FsmGraph| g.from_state_action(0, ActionId::from_raw(0)),
        ];

        let mut plain = lit("a");
        plain.union_op(lit("b"));
        plain.minimize_partition2();
        assert_eq!(plain.num_states(), 2);

        for embed in embeds {
            let mut g = lit("a");
            embed(&mut g);
            g.union_op(lit("b"));
            g.minimize_partition2();
            assert_eq!(g.num_states(), 3);
            assert!(g.accepts(&keys("a")));
            assert!(g.accepts(&keys("b")));
        }
    }
}
