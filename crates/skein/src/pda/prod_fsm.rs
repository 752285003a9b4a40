//! The single-path machines of the productions.

use super::graph::PdaGraph;
use crate::{
    first_sets::{make_first_sets, make_non_term_first_sets},
    grammar::{Grammar, ProdEl},
};

/// A machine with one shift per right-hand side element.
///
/// An element marked as a commit point puts its position into the commits
/// of the transition that shifts it.
fn walk(rhs: &[ProdEl]) -> PdaGraph {
    let mut fsm = PdaGraph::new();
    let mut last = fsm.add_state();
    fsm.set_start(last);
    for (len, el) in rhs.iter().enumerate() {
        let next = fsm.add_state();
        let trans = fsm.insert_new_trans(last, next, el.lang_el);
        let trans = fsm.trans_mut(trans);
        trans.is_shift = true;
        trans.shift_prior = el.prior_val;
        if el.commit {
            trans.commits.insert(len as u32);
        }
        last = next;
    }
    fsm.set_final(last);
    fsm
}

/// Build the machine of every production, compute the first sets and
/// number the dot positions.
///
/// Each production gets one more dot than it has states, so that the dot
/// ranges of two productions never touch.
pub(crate) fn make_prod_fsms(grammar: &mut Grammar) {
    for prod in grammar.productions.values_mut() {
        prod.fsm = walk(&prod.rhs);
    }

    make_non_term_first_sets(grammar);
    make_first_sets(grammar);

    let mut dsi_low = 0;
    for prod in grammar.productions.values_mut() {
        prod.fsm_length = prod.fsm.fsm_length();

        let states = prod.fsm.state_ids();
        for (i, &state) in states.iter().enumerate() {
            debug_assert!(prod.fsm.out_trans(state).all(|(_, t)| t.is_shift));
            prod.fsm.state_mut(state).dot_set.insert(dsi_low + i as u32);
        }
        dsi_low += states.len() as u32 + 1;

        if prod.prod_commit {
            let length = prod.fsm_length as u32;
            for &state in &states {
                if prod.fsm.state(state).is_final {
                    prod.fsm
                        .state_mut(state)
                        .pending_commits
                        .insert((prod.id, length));
                }
            }
        }
    }
}
