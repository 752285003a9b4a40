//! Flattening the analyzed automaton into `PdaTables`.

use super::{ParserGraph, PdaState};
use crate::{compile::TableLayout, grammar::Grammar};
use skein_tables::{PdaTables, TableError};

/// The slots a state takes in `indices`, relative to its offset, with the
/// action set of each.
fn state_slots(state: &PdaState, graph: &ParserGraph) -> Vec<(usize, i32)> {
    let Some(&lo) = state.trans_map.keys().next() else {
        return vec![];
    };
    state
        .trans_map
        .iter()
        .map(|(key, &t)| {
            let set = graph
                .graph
                .trans(t)
                .action_set
                .expect("action sets are assigned to every transition");
            (key.index() - lo.index(), set as i32)
        })
        .collect()
}

/// The first offset at which none of `slots` is owned yet. Slots past the
/// end of the table are free.
fn find_index_off(owners: &[i32], slots: &[(usize, i32)], cur_len: usize) -> usize {
    if slots.is_empty() {
        return 0;
    }
    (0..cur_len)
        .find(|&start| {
            slots
                .iter()
                .all(|&(pos, _)| owners.get(start + pos).map_or(true, |&o| o < 0))
        })
        .unwrap_or(cur_len)
}

/// Flatten `graph` into tables laid out according to `layout`.
pub fn make_pda_tables(
    graph: &ParserGraph,
    grammar: &Grammar,
    layout: TableLayout,
) -> Result<PdaTables, TableError> {
    let states: Vec<&PdaState> = graph.graph.states().map(|(_, st)| st).collect();
    debug_assert!(states.iter().enumerate().all(|(i, st)| st.state_num == i));

    let mut tables = PdaTables {
        num_states: states.len(),
        first_non_term_id: grammar.first_non_term_id.raw(),
        max_prod_len: graph.max_prod_len as u32,
        ..Default::default()
    };

    let mut ind_len = 0;
    tables.offsets = vec![0; states.len()];
    for st in &states {
        let slots = state_slots(st, graph);
        let off = match layout {
            TableLayout::Linear => ind_len,
            TableLayout::Packed => find_index_off(&tables.owners, &slots, ind_len),
        };
        tables.offsets[st.state_num] = off as u32;

        for &(pos, set) in &slots {
            let at = off + pos;
            if at >= tables.indices.len() {
                tables.indices.resize(at + 1, -1);
                tables.owners.resize(at + 1, -1);
            }
            tables.indices[at] = set;
            tables.owners[at] = st.state_num as i32;
        }
        if let Some(&(last, _)) = slots.last() {
            ind_len = ind_len.max(off + last + 1);
        }
    }
    tables.indices.truncate(ind_len);
    tables.owners.truncate(ind_len);
    tracing::trace!("{:?} layout uses {} index slots", layout, ind_len);

    for st in &states {
        let mut keys = st.trans_map.keys();
        match (keys.next(), keys.next_back()) {
            (Some(lo), hi) => {
                tables.keys.push(lo.raw() as i32);
                tables.keys.push(hi.unwrap_or(lo).raw() as i32);
            }
            (None, _) => tables.keys.extend([0, 0]),
        }
    }

    for set in &graph.action_sets {
        tables.targs.push(set.targ as u32);
        tables.act_inds.push(tables.actions.len() as u32);
        tables.actions.extend(&set.actions);
        tables.actions.push(0);
        tables.commit_len.push(set.commit_len);
    }

    // Index 0 of the region tables is the empty list.
    tables.token_regions.push(0);
    tables.token_pre_regions.push(0);
    for st in &states {
        tables
            .token_region_inds
            .push(tables.token_regions.len() as u32);
        let pre = st.pre_regions.first().map_or(-1, |r| r.raw() as i32 + 1);
        for region in &st.regions {
            tables
                .token_regions
                .push(region.map_or(0, |r| r.raw() as i32 + 1));
            tables.token_pre_regions.push(pre);
        }
        tables.token_regions.push(0);
        tables.token_pre_regions.push(0);
    }

    tables.start_states = graph
        .graph
        .entry_states()
        .iter()
        .map(|&s| graph.graph.state(s).state_num as u32)
        .collect();

    tables.validate()?;
    Ok(tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        compile::BuildConfig,
        fsm::RegionId,
        grammar::{LangElId, PredType, Symbol},
        pda::make_pda_graph,
    };

    fn arith() -> Grammar {
        Grammar::define(|g| {
            let plus = g.terminal("PLUS")?;
            let star = g.terminal("STAR")?;
            let num = g.terminal("NUM")?;
            let expr = g.nonterminal("expr")?;
            g.precedence(PredType::Left, [plus]);
            g.precedence(PredType::Left, [star]);
            g.production(expr, [expr, plus, expr])?;
            g.production(expr, [expr, star, expr])?;
            g.production(expr, [num])?;
            g.parser(expr)?;
            Ok(())
        })
        .unwrap()
    }

    #[test]
    fn index_offsets() {
        let owners = [0, -1, 0, -1, -1];
        assert_eq!(find_index_off(&owners, &[(0, 1), (2, 1)], 5), 1);
        assert_eq!(find_index_off(&owners, &[(0, 1), (1, 1)], 5), 3);
        assert_eq!(find_index_off(&owners, &[(0, 1), (3, 1)], 0), 0);
        assert_eq!(find_index_off(&owners, &[], 5), 0);
        // past the end counts as free.
        assert_eq!(find_index_off(&[0, 0], &[(0, 1)], 2), 2);
    }

    #[test]
    fn both_layouts_agree_on_every_lookup() {
        let g = arith();
        let pg = make_pda_graph(&g, &BuildConfig::default()).unwrap();
        let linear = make_pda_tables(&pg, &g, TableLayout::Linear).unwrap();
        let packed = make_pda_tables(&pg, &g, TableLayout::Packed).unwrap();
        assert!(packed.indices.len() <= linear.indices.len());
        assert_eq!(linear.num_states, pg.graph.num_states());

        for (_, st) in pg.graph.states() {
            for key in 0..=g.max_lel_id().raw() as i32 {
                let expected = st
                    .find_trans(LangElId::from_raw(key as u32))
                    .and_then(|t| pg.graph.trans(t).action_set);
                assert_eq!(linear.action_set(st.state_num, key), expected);
                assert_eq!(packed.action_set(st.state_num, key), expected);
            }
        }
    }

    #[test]
    fn action_lists_and_entries() {
        let g = arith();
        let pg = make_pda_graph(&g, &BuildConfig::default()).unwrap();
        let tables = make_pda_tables(&pg, &g, TableLayout::Linear).unwrap();

        assert_eq!(tables.targs.len(), pg.action_sets.len());
        for (id, set) in pg.action_sets.iter().enumerate() {
            let codes: Vec<u32> = tables.actions(id).map(|a| a.encode()).collect();
            assert_eq!(codes, set.actions);
            assert_eq!(tables.target(id) as usize, set.targ);
            assert_eq!(tables.commit_len(id), set.commit_len);
        }
        assert_eq!(tables.start_states.len(), 1);
        assert_eq!(tables.first_non_term_id, g.first_non_term_id.raw());
        assert_eq!(tables.max_prod_len, 3);
    }

    #[test]
    fn region_lists() {
        let mut syms: Option<[Symbol; 2]> = None;
        let g = Grammar::define(|g| {
            let a = g.terminal("a")?;
            let b = g.terminal("b")?;
            let s = g.nonterminal("s")?;
            g.token_region(a, RegionId::from_raw(0), Some(RegionId::from_raw(2)))?;
            g.token_region(b, RegionId::from_raw(1), None)?;
            g.production(s, [a, b])?;
            g.parser(s)?;
            syms = Some([a, s]);
            Ok(())
        })
        .unwrap();
        let [a, s] = syms.unwrap();
        let pg = make_pda_graph(&g, &BuildConfig::default()).unwrap();
        let tables = make_pda_tables(&pg, &g, TableLayout::Linear).unwrap();

        assert_eq!(tables.token_regions[0], 0);
        assert_eq!(tables.token_region_inds[0], 1);

        let start = pg.start_states[&g.id(s)];
        let start_num = pg.graph.state(start).state_num;
        assert_eq!(tables.regions(start_num).collect::<Vec<_>>(), [1]);

        let on_a = pg.graph.find_trans(start, g.id(a)).unwrap();
        let after_a = pg.graph.trans(on_a).to.unwrap();
        let num = pg.graph.state(after_a).state_num;
        assert_eq!(tables.regions(num).collect::<Vec<_>>(), [2]);
        let ind = tables.token_region_inds[num] as usize;
        assert_eq!(tables.token_pre_regions[ind], 3);
        assert_eq!(tables.token_pre_regions[ind + 1], 0);
    }
}
