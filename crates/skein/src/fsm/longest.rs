//! Token regions: scanning the longest match among a set of tokens.
//!
//! Each token gets a longest-match marker on the transitions that complete
//! it. The union of all tokens is then rewritten so that the scanner keeps
//! going while a longer match is possible and falls back to the last token
//! seen otherwise, restarting from the region's start state.

use super::{
    action::{ActionId, InlineItem, LmPartId, RegionId},
    graph::{FsmGraph, StateId},
    name::NameId,
    scanner::ScanCtx,
};
use crate::diag::InputLoc;

/// One token of a region, with the actions generated for it.
#[derive(Debug, Clone)]
pub struct LmPart {
    pub id: LmPartId,
    pub region: RegionId,
    pub name: String,
    pub loc: InputLoc,
    /// The user action run when the token is recognized.
    pub action: Option<ActionId>,
    pub ignore: bool,
    /// Remembers the token while a longer match is still possible.
    pub set_act_id: ActionId,
    /// Accepts the token on the transition that completes it.
    pub act_on_last: ActionId,
    /// Accepts the token on the key after it.
    pub act_on_next: ActionId,
    /// Accepts the token after the scanner ran ahead of it.
    pub act_lag_behind: ActionId,
    /// Whether the region's switch action has to handle this token.
    pub in_lm_select: bool,
}

#[derive(Debug, Clone, Default)]
pub struct RegionData {
    /// The scope of the region in the name tree; entry points use it.
    pub entry_name: Option<NameId>,
    pub parts: Vec<LmPartId>,
    /// Picks the token by its remembered id.
    pub lm_act_select: Option<ActionId>,
    pub lm_switch_handles_error: bool,
    /// The token that matches the empty string, if any.
    pub default_token: Option<LmPartId>,
}

/// Actions shared by all regions.
#[derive(Debug, Copy, Clone)]
pub(super) struct LmGlobals {
    init_act_id: ActionId,
    set_tok_start: ActionId,
    set_tok_end: ActionId,
    init_act_id_ord: i32,
    set_tok_start_ord: i32,
    set_tok_end_ord: i32,
}

impl<'d> ScanCtx<'d> {
    /// Create the shared actions when any region exists.
    pub(super) fn init_longest_match_data(&mut self) {
        if self.def.regions.is_empty() {
            return;
        }
        let loc = InputLoc::internal();
        let init_act_id = self.new_action("initact".into(), &loc, vec![InlineItem::LmInitAct]);
        let init_act_id_ord = self.next_action_ord();
        let set_tok_start =
            self.new_action("tokstart".into(), &loc, vec![InlineItem::LmSetTokStart]);
        let set_tok_start_ord = self.next_action_ord();
        let set_tok_end = self.new_action("tokend".into(), &loc, vec![InlineItem::LmSetTokEnd]);
        let set_tok_end_ord = self.next_action_ord();
        self.lm = Some(LmGlobals {
            init_act_id,
            set_tok_start,
            set_tok_end,
            init_act_id_ord,
            set_tok_start_ord,
            set_tok_end_ord,
        });
    }

    /// Name the region and its tokens, then create the generated actions.
    pub(super) fn make_region_name_tree(&mut self, rid: RegionId) {
        let def = self.def;
        let region = &def.regions[rid.index()];

        let id = self.names.add_name_inst(&region.loc, Some(&region.name), false);
        self.names.get_mut(id).is_longest_match = true;
        self.region_data[rid.index()].entry_name = Some(id);
        let prev = self.names.set_current(id);

        let anon = self.names.add_name_inst(&region.loc, None, false);
        self.names.set_current(anon);
        for token in &region.tokens {
            if let Some(expr) = &token.expr {
                self.name_expr(expr);
            }
        }
        self.names.set_current(prev);

        self.make_region_actions(rid);
    }

    fn make_region_actions(&mut self, rid: RegionId) {
        let def = self.def;
        let region = &def.regions[rid.index()];
        let tokens: Vec<_> = region.tokens.iter().filter(|t| t.expr.is_some()).collect();
        let first = self.parts.len();

        let make = |ctx: &mut Self, prefix: &str, item: fn(LmPartId) -> InlineItem| {
            tokens
                .iter()
                .enumerate()
                .map(|(i, token)| {
                    let part = LmPartId::from_raw((first + i) as u32);
                    let name = format!("{}{}", prefix, part.index());
                    ctx.new_action(name, &token.loc, vec![item(part)])
                })
                .collect::<Vec<_>>()
        };
        let store = make(self, "store", InlineItem::LmSetActId);
        let imm = make(self, "imm", InlineItem::LmOnLast);
        let lagh = make(self, "lagh", InlineItem::LmOnNext);
        let lag = make(self, "lag", InlineItem::LmOnLagBehind);

        for (i, token) in tokens.iter().enumerate() {
            let id = LmPartId::from_raw((first + i) as u32);
            self.parts.push(LmPart {
                id,
                region: rid,
                name: token.name.clone(),
                loc: token.loc.clone(),
                action: token.action,
                ignore: token.ignore,
                set_act_id: store[i],
                act_on_last: imm[i],
                act_on_next: lagh[i],
                act_lag_behind: lag[i],
                in_lm_select: false,
            });
            self.region_data[rid.index()].parts.push(id);
        }

        let select = self.new_action("lagsel".into(), &region.loc, vec![InlineItem::LmSwitch(rid)]);
        self.region_data[rid.index()].lm_act_select = Some(select);
    }

    pub(super) fn resolve_region(&mut self, rid: RegionId) {
        let def = self.def;
        let region = &def.regions[rid.index()];
        let frame_def = self.names.enter_name_scope(true, 1);
        let frame_anon = self.names.enter_name_scope(true, 1);
        for token in &region.tokens {
            if let Some(action) = token.action {
                self.add_embed_root(action);
            }
            if let Some(expr) = &token.expr {
                self.resolve_expr(expr);
            }
        }
        self.names.pop_name_scope(frame_anon);
        self.names.pop_name_scope(frame_def);
    }

    pub(super) fn walk_region(&mut self, rid: RegionId) -> FsmGraph {
        let def = self.def;
        let region = &def.regions[rid.index()];
        let frame_def = self.names.enter_name_scope(true, 1);
        let frame_anon = self.names.enter_name_scope(true, 1);

        let part_ids = self.region_data[rid.index()].parts.clone();
        let patterns = region.tokens.iter().filter_map(|t| t.expr.as_ref());
        let mut graphs = Vec::with_capacity(part_ids.len());
        for (expr, &part) in patterns.zip(&part_ids) {
            let mut graph = self.walk_expr(expr);
            let ord = self.next_action_ord();
            graph.long_match_action(ord, part);
            let data = &mut self.region_data[rid.index()];
            if data.default_token.is_none() && graph.state(graph.start()).is_final {
                data.default_token = Some(part);
            }
            graphs.push(graph);
        }

        if let Some(part) = self.region_data[rid.index()].default_token {
            let part = &self.parts[part.index()];
            if part.ignore {
                self.diag.error(
                    &part.loc,
                    "ignore token cannot be a scanner's zero-length token",
                );
            }
        }

        let mut graphs = graphs.into_iter();
        let mut graph = match graphs.next() {
            Some(mut graph) => {
                for other in graphs {
                    graph.union_op(other);
                }
                graph.remove_unreachable_states();
                graph.minimize_partition2();
                self.run_longest_match(&mut graph, rid);
                graph
            }
            None => FsmGraph::lambda_fsm(),
        };
        self.names.pop_name_scope(frame_anon);

        self.names.unset_obsolete_entries(&mut graph);
        let cur = self.names.current();
        if self.names.get(cur).num_refs > 0 {
            let start = graph.start();
            graph.set_entry(cur, start);
        }
        self.names.pop_name_scope(frame_def);
        graph
    }

    /// Rewrite the union of a region's tokens to scan for the longest match.
    fn run_longest_match(&mut self, graph: &mut FsmGraph, rid: RegionId) {
        let Some(lm) = self.lm else {
            return;
        };
        let start = graph.start();

        // Record in each state the tokens that may already have been
        // matched when the state is reached. `None` stands for no token.
        let marks = graph.reachable_stop_final(start);
        for id in graph.state_ids() {
            if marks[id.index()] {
                graph.state_mut(id).lm_items.insert(None);
            }
        }
        for (target, part) in lm_transitions(graph) {
            if graph.state(target).out.is_empty() {
                continue;
            }
            let marks = graph.reachable_stop_final(target);
            for id in graph.state_ids() {
                if marks[id.index()] {
                    graph.state_mut(id).lm_items.insert(Some(part));
                }
            }
        }

        let marks = graph.reachable_stop_final(start);
        let max_item_set_length = graph
            .states()
            .filter(|(id, _)| marks[id.index()])
            .map(|(_, s)| s.lm_items.len())
            .max()
            .unwrap_or(0);

        graph.isolate_start_state();
        let start = graph.start();
        graph
            .state_mut(start)
            .from_state_actions
            .set_action(lm.set_tok_start_ord, lm.set_tok_start);
        if max_item_set_length > 1 {
            self.region_data[rid.index()].lm_switch_handles_error = true;
            graph
                .state_mut(start)
                .to_state_actions
                .set_action(lm.init_act_id_ord, lm.init_act_id);
        }

        let mut restart = vec![];
        let trans_ids: Vec<(StateId, usize)> = graph
            .states()
            .flat_map(|(id, s)| {
                s.out
                    .iter()
                    .enumerate()
                    .filter(|(_, t)| !t.lm_actions.is_empty())
                    .map(move |(i, _)| (id, i))
            })
            .collect();
        for (state, i) in trans_ids {
            let trans = &graph.state(state).out[i];
            let Some((ordering, part)) = trans.lm_actions.first() else {
                continue;
            };
            let Some(target) = trans.target else {
                continue;
            };
            let part = &self.parts[part.index()];

            if graph.state(target).out.is_empty() {
                // Nothing can follow: accept on this key and start over.
                graph.state_mut(state).out[i]
                    .actions
                    .set_action(ordering, part.act_on_last);
                restart.push((state, i));
                continue;
            }

            let marks = graph.reachable_stop_final(target);
            let mut non_final_non_empty = false;
            let mut max_len = 0;
            for (id, s) in graph.states() {
                if !marks[id.index()] {
                    continue;
                }
                if !s.is_final && !s.lm_items.is_empty() {
                    non_final_non_empty = true;
                }
                max_len = max_len.max(s.lm_items.len());
            }

            let actions = &mut graph.state_mut(state).out[i].actions;
            if non_final_non_empty || max_len > 1 {
                actions.set_action(lm.set_tok_end_ord, lm.set_tok_end);
            }
            if max_len > 1 {
                actions.set_action(ordering, part.set_act_id);
            }
        }
        for (state, i) in restart {
            graph.state_mut(state).out[i].target = Some(start);
        }

        let lm_err_action_ord = self.next_action_ord();
        let alph = self.alph;
        for id in graph.state_ids().collect::<Vec<_>>() {
            let st = graph.state(id);
            let items = st.lm_items.as_slice().to_vec();
            let action = match items.as_slice() {
                [Some(part)] => {
                    let part = &self.parts[part.index()];
                    if st.is_final {
                        part.act_on_next
                    } else {
                        part.act_lag_behind
                    }
                }
                [_, _, ..] => {
                    for part in items.iter().flatten() {
                        self.parts[part.index()].in_lm_select = true;
                    }
                    match self.region_data[rid.index()].lm_act_select {
                        Some(select) => select,
                        None => continue,
                    }
                }
                _ => continue,
            };
            graph.set_error_target(id, start, lm_err_action_ord, action, &alph);
            let st = graph.state_mut(id);
            st.eof_actions.set_action(lm_err_action_ord, action);
            st.eof_target = Some(start);
        }

        graph.set_final(start);
    }
}

/// The target and the earliest token of every transition carrying a
/// longest-match marker.
fn lm_transitions(graph: &FsmGraph) -> Vec<(StateId, LmPartId)> {
    graph
        .states()
        .flat_map(|(_, s)| s.out.iter())
        .filter_map(|t| Some((t.target?, t.lm_actions.first()?.1)))
        .collect()
}
