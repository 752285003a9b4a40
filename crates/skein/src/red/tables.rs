use super::RedFsm;
use crate::types::Map;
use skein_tables::{FsmTables, TableError};

fn opt(value: Option<usize>) -> i32 {
    value.map_or(-1, |v| v as i32)
}

impl RedFsm {
    /// Pack the machine into flat tables.
    ///
    /// Transitions with the same target and action are stored once and
    /// shared by all the ranges that take them.
    pub fn make_fsm_tables(&self) -> Result<FsmTables, TableError> {
        let mut tables = FsmTables {
            start_state: self.start_state as u32,
            first_final: self.first_final_state as u32,
            error_state: opt(self.err_state),
            max_key: self.max_key,
            num_states: self.states.len(),
            ..Default::default()
        };

        tables.entry_by_region = self
            .region_to_entry
            .iter()
            .map(|entry| opt(entry.map(|e| self.entries[e].state)))
            .collect();

        for action in &self.actions {
            tables.action_offsets.push(tables.actions.len() as u32);
            tables.actions.push(action.actions.len() as u32);
            tables
                .actions
                .extend(action.actions.iter().map(|a| a.raw()));
        }

        let mut trans_ids = Map::<(Option<usize>, Option<usize>), u32>::default();
        for state in &self.states {
            tables.key_offsets.push(tables.indices.len() as u32);
            tables.range_lens.push(state.out.len() as u32);
            for trans in &state.out {
                tables.keys.push(trans.low);
                tables.keys.push(trans.high);
                let next = trans_ids.len() as u32;
                let id = *trans_ids.entry((trans.target, trans.action)).or_insert(next);
                tables.indices.push(id);
            }
            tables.to_state_actions.push(opt(state.to_state_action));
            tables.from_state_actions.push(opt(state.from_state_action));
            tables.eof_actions.push(opt(state.eof_action));
            tables.eof_targs.push(opt(state.eof_target));
        }
        for &(target, action) in trans_ids.keys() {
            tables.trans_targs.push(opt(target));
            tables.trans_actions.push(opt(action));
        }

        tables.validate()?;
        Ok(tables)
    }
}
