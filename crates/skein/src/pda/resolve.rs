//! Conflict resolution and the final shape of the actions.

use super::{PdaBuild, PdaTrans, TransId};
use crate::{
    grammar::{LangEl, LangElId, PredType, ProdId},
    types::OrdSet,
};
use skein_tables::pda::{make_reduce_code, SHIFT_CODE};
use std::{cmp::Ordering, collections::BTreeMap};

/// What the parser does on one transition: the target state, the commit
/// length and the actions in the order they are tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionData {
    pub targ: usize,
    pub commit_len: i32,
    pub actions: Vec<u32>,
}

impl Ord for ActionData {
    fn cmp(&self, other: &Self) -> Ordering {
        self.targ
            .cmp(&other.targ)
            .then(self.commit_len.cmp(&other.commit_len))
            .then(self.actions.len().cmp(&other.actions.len()))
            .then_with(|| self.actions.cmp(&other.actions))
    }
}

impl PartialOrd for ActionData {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// The commit length stored with a transition.
///
/// Positive values commit after the shift, negative ones before it.
fn commit_len(trans: &PdaTrans) -> i32 {
    let c = trans.commits.last().map_or(0, |&c| c as i32);
    match trans.after_shift_commits.last() {
        Some(&after) => {
            let after = after as i32;
            if c > 0 && c + 1 > after {
                c + 1
            } else {
                after
            }
        }
        None => -c,
    }
}

/// Whether the action with the precedence `l2` beats the one before it.
fn precedence_swap(action1: u32, action2: u32, l1: &LangEl, l2: &LangEl) -> bool {
    match l2.pred_value.cmp(&l1.pred_value) {
        Ordering::Greater => true,
        Ordering::Equal => {
            (l1.pred == PredType::Left && action1 == SHIFT_CODE)
                || (l1.pred == PredType::Right && action2 == SHIFT_CODE)
        }
        Ordering::Less => false,
    }
}

fn precedence_remove_both(l1: &LangEl, l2: &LangEl) -> bool {
    l1.pred_value == l2.pred_value && l1.pred == PredType::Nonassoc
}

impl<'g> PdaBuild<'g> {
    /// Sort the actions of every transition by priority, then by order,
    /// and reject nonterminal transitions that are not plain shifts.
    pub(super) fn sort_actions(&mut self) {
        let grammar = self.grammar;
        for state in self.graph.state_ids() {
            let outs: Vec<(LangElId, TransId)> = self
                .graph
                .state(state)
                .trans_map
                .iter()
                .map(|(&k, &t)| (k, t))
                .collect();
            for (key, t) in outs {
                let trans = self.graph.trans_mut(t);
                let mut perm: Vec<usize> = (0..trans.actions.len()).collect();
                perm.sort_by(|&a, &b| {
                    trans.act_priors[b]
                        .cmp(&trans.act_priors[a])
                        .then(trans.act_ords[a].cmp(&trans.act_ords[b]))
                });
                trans.actions = perm.iter().map(|&i| trans.actions[i]).collect();
                trans.act_ords = perm.iter().map(|&i| trans.act_ords[i]).collect();
                trans.act_priors = perm.iter().map(|&i| trans.act_priors[i]).collect();

                if !self.is_nonterm(key) {
                    continue;
                }
                let trans = self.graph.trans(t);
                let name = &grammar.lang_el(key).name;
                if trans.actions != [SHIFT_CODE] {
                    let msg = format!(
                        "transition on nonterminal `{}' is something other than a shift",
                        name
                    );
                    self.diag.error(&self.loc, msg);
                }
                if !trans.commits.is_empty() {
                    let msg = format!("transition on nonterminal `{}' has a commit", name);
                    self.diag.error(&self.loc, msg);
                }
            }
        }
    }

    /// The element whose precedence rules an action, if it has one.
    fn pred_of(&self, key: LangElId, action: u32) -> Option<&'g LangEl> {
        let grammar = self.grammar;
        let lel = if action == SHIFT_CODE {
            Some(key)
        } else {
            grammar.production(ProdId::from_raw(action >> 2)).pred_of
        };
        lel.map(|id| grammar.lang_el(id))
            .filter(|lel| lel.pred != PredType::None)
    }

    /// Drop the actions that lose to another by precedence. A transition
    /// left without actions is removed.
    pub(super) fn resolve_precedence(&mut self) {
        for state in self.graph.state_ids() {
            let outs: Vec<(LangElId, TransId)> = self
                .graph
                .state(state)
                .trans_map
                .iter()
                .map(|(&k, &t)| (k, t))
                .collect();
            for (key, t) in outs {
                'again: loop {
                    let actions = self.graph.trans(t).actions.clone();
                    for i in 0..actions.len() {
                        let Some(li) = self.pred_of(key, actions[i]) else {
                            continue;
                        };
                        for j in i + 1..actions.len() {
                            let Some(lj) = self.pred_of(key, actions[j]) else {
                                continue;
                            };
                            let swap = precedence_swap(actions[i], actions[j], li, lj);
                            let remove_both = precedence_remove_both(li, lj);

                            let trans = self.graph.trans_mut(t);
                            if swap {
                                trans.actions.swap(i, j);
                                trans.act_ords.swap(i, j);
                                trans.act_priors.swap(i, j);
                            }
                            trans.actions.remove(j);
                            trans.act_ords.remove(j);
                            trans.act_priors.remove(j);
                            if remove_both {
                                trans.actions.remove(i);
                                trans.act_ords.remove(i);
                                trans.act_priors.remove(i);
                            }
                            continue 'again;
                        }
                    }
                    break;
                }

                if self.graph.trans(t).actions.is_empty() {
                    let to = self.graph.trans(t).to.expect("attached transition");
                    self.graph.detach_trans(state, to, t);
                    self.graph.state_mut(state).trans_map.remove(&key);
                }
            }
        }
    }

    /// Mark the states that can fold their single reduction into the shift
    /// that enters them. The state over the root keeps its end of input.
    pub(super) fn compute_advance_reductions(&mut self, root: LangElId) {
        let grammar = self.grammar;
        let root_def = grammar
            .lang_el(root)
            .root_def
            .expect("parser roots have a root production");
        let over_start = self
            .graph
            .follow_fsm(self.start_states[&root], &grammar.production(root_def).fsm);
        let eof = grammar.eof_of(root);

        for state in self.graph.state_ids() {
            if state != over_start && self.graph.find_trans(state, eof).is_some() {
                self.graph.state_mut(state).advance_reductions = true;
            }
        }
    }

    /// Fold each state that can only reduce one production into the shifts
    /// that lead to it, then drop the states nothing reaches anymore.
    pub(super) fn advance_reductions(&mut self) {
        let action_dest = self.action_dest();
        let mut advanced = 0;
        for state in self.graph.state_ids() {
            let st = self.graph.state(state);
            if !st.advance_reductions {
                continue;
            }

            let mut out_has_shift = false;
            let mut out_reds = OrdSet::<ProdId>::new();
            let mut out_commits = OrdSet::<u32>::new();
            for (_, trans) in self.graph.out_trans(state) {
                out_has_shift |= trans.is_shift;
                out_reds.extend(trans.reductions.keys().copied());
                out_commits.union_with(&trans.commits);
            }

            let mut in_has_shift = false;
            let mut in_has_reds = false;
            for &t in &st.in_range {
                let trans = self.graph.trans(t);
                in_has_shift |= trans.is_shift;
                in_has_reds |= !trans.reductions.is_empty();
            }

            if out_has_shift || out_reds.len() != 1 || !in_has_shift || in_has_reds {
                continue;
            }
            let red = *out_reds.first().expect("one reduction");

            let in_range = st.in_range.clone();
            for t in in_range {
                let trans = self.graph.trans_mut(t);
                assert_eq!(trans.actions, [SHIFT_CODE]);
                trans.actions[0] = make_reduce_code(red.raw(), true);
                trans.after_shift_commits.union_with(&out_commits);
            }
            self.graph.remove_out_trans(state);
            self.graph.in_trans_move(action_dest, state);
            advanced += 1;
        }

        self.graph.remove_unreachable_states();
        tracing::debug!("advanced the reductions of {} states", advanced);
    }

    /// After a parse-stop root, the parser must not need the end of input
    /// anywhere but over the root.
    pub(super) fn verify_parse_stop_grammar(&mut self, root: LangElId) {
        let grammar = self.grammar;
        let root_def = grammar
            .lang_el(root)
            .root_def
            .expect("parser roots have a root production");
        let over_start = self
            .graph
            .follow_fsm(self.start_states[&root], &grammar.production(root_def).fsm);
        let eof = grammar.eof_of(root);

        let needs_eof = self
            .graph
            .state_ids()
            .into_iter()
            .any(|state| state != over_start && self.graph.find_trans(state, eof).is_some());
        if needs_eof {
            self.diag.error(&self.loc, "grammar is not usable with parse_stop");
        }
    }

    /// Collect the distinct action data of the transitions and number them
    /// in sorted order. State numbers must be set.
    pub(super) fn reduce_actions(&mut self) {
        let mut all = BTreeMap::<ActionData, usize>::new();
        let mut per_trans = vec![];
        for state in self.graph.state_ids() {
            for &t in self.graph.state(state).trans_map.values() {
                let trans = self.graph.trans(t);
                let to = trans.to.expect("attached transition");
                let data = ActionData {
                    targ: self.graph.state(to).state_num,
                    commit_len: commit_len(trans),
                    actions: trans.actions.clone(),
                };
                all.insert(data.clone(), 0);
                per_trans.push((t, data));
            }
        }

        for (id, slot) in all.values_mut().enumerate() {
            *slot = id;
        }
        for (t, data) in per_trans {
            self.graph.trans_mut(t).action_set = Some(all[&data]);
        }
        self.action_sets = all.into_keys().collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::LangElKind;

    fn lel(pred: PredType, value: u32) -> LangEl {
        let mut lel = LangEl::new("t", LangElKind::Term);
        lel.pred = pred;
        lel.pred_value = value;
        lel
    }

    #[test]
    fn commit_lengths() {
        let mut trans = PdaTrans::default();
        assert_eq!(commit_len(&trans), 0);

        trans.commits.insert(2);
        trans.commits.insert(3);
        assert_eq!(commit_len(&trans), -3);

        trans.after_shift_commits.insert(1);
        assert_eq!(commit_len(&trans), 4);

        trans.after_shift_commits.insert(5);
        assert_eq!(commit_len(&trans), 5);

        trans.commits.clear();
        assert_eq!(commit_len(&trans), 5);
    }

    #[test]
    fn action_data_order() {
        let data = |targ, commit_len, actions: &[u32]| ActionData {
            targ,
            commit_len,
            actions: actions.to_vec(),
        };
        let mut sets = vec![
            data(2, 0, &[1]),
            data(1, 0, &[6, 1]),
            data(1, 0, &[10]),
            data(1, -1, &[1]),
            data(1, 0, &[2, 1]),
        ];
        sets.sort();
        assert_eq!(
            sets,
            vec![
                data(1, -1, &[1]),
                data(1, 0, &[10]),
                data(1, 0, &[2, 1]),
                data(1, 0, &[6, 1]),
                data(2, 0, &[1]),
            ]
        );
    }

    #[test]
    fn precedence_rules() {
        let reduce = make_reduce_code(4, false);
        let (left1, right1, nonassoc1) = (
            lel(PredType::Left, 1),
            lel(PredType::Right, 1),
            lel(PredType::Nonassoc, 1),
        );
        let left2 = lel(PredType::Left, 2);

        // the higher one wins whatever the order.
        assert!(precedence_swap(SHIFT_CODE, reduce, &left1, &left2));
        assert!(!precedence_swap(SHIFT_CODE, reduce, &left2, &left1));

        // equal: left prefers the reduction, right the shift.
        assert!(precedence_swap(SHIFT_CODE, reduce, &left1, &left1));
        assert!(!precedence_swap(reduce, SHIFT_CODE, &left1, &left1));
        assert!(precedence_swap(reduce, SHIFT_CODE, &right1, &right1));
        assert!(!precedence_swap(SHIFT_CODE, reduce, &right1, &right1));

        assert!(precedence_remove_both(&nonassoc1, &nonassoc1));
        assert!(!precedence_remove_both(&nonassoc1, &left2));
    }
}
