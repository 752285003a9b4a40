//! Shift/reduce parser tables.

use crate::{check_len, TableError};
use std::fmt;

pub const SHIFT_CODE: u32 = 1;
pub const REDUCE_CODE: u32 = 2;
pub const SHIFT_REDUCE_CODE: u32 = 3;

/// Encode a reduction of `prod`, optionally fused with the preceding shift.
pub const fn make_reduce_code(prod: u32, shift_reduce: bool) -> u32 {
    let kind = if shift_reduce {
        SHIFT_REDUCE_CODE
    } else {
        REDUCE_CODE
    };
    kind | (prod << 2)
}

/// A decoded entry of the `actions` table.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum PdaAction {
    Shift,
    Reduce(u32),
    ShiftReduce(u32),
}

impl PdaAction {
    pub const fn decode(code: u32) -> Option<Self> {
        match code & 0x3 {
            SHIFT_CODE => Some(Self::Shift),
            REDUCE_CODE => Some(Self::Reduce(code >> 2)),
            SHIFT_REDUCE_CODE => Some(Self::ShiftReduce(code >> 2)),
            _ => None,
        }
    }

    pub const fn encode(self) -> u32 {
        match self {
            Self::Shift => SHIFT_CODE,
            Self::Reduce(prod) => make_reduce_code(prod, false),
            Self::ShiftReduce(prod) => make_reduce_code(prod, true),
        }
    }
}

impl fmt::Display for PdaAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shift => f.write_str("shift"),
            Self::Reduce(prod) => write!(f, "reduce({})", prod),
            Self::ShiftReduce(prod) => write!(f, "shift-reduce({})", prod),
        }
    }
}

/// The flattened parse automaton.
///
/// Every state owns the slots `offsets[s] ..= offsets[s] + (hi - lo)` of
/// `indices`, where `lo`/`hi` are `keys[2s]`/`keys[2s + 1]`. A slot holds
/// the id of an action set or `-1`. In the packed layout slots of different
/// states interleave and `owners` tells them apart.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdaTables {
    pub indices: Vec<i32>,
    pub owners: Vec<i32>,
    pub keys: Vec<i32>,
    pub offsets: Vec<u32>,
    pub targs: Vec<u32>,
    pub act_inds: Vec<u32>,
    pub actions: Vec<u32>,
    pub commit_len: Vec<i32>,
    pub token_region_inds: Vec<u32>,
    pub token_regions: Vec<i32>,
    pub token_pre_regions: Vec<i32>,
    pub num_states: usize,
    pub first_non_term_id: u32,
    pub start_states: Vec<u32>,
    pub max_prod_len: u32,
}

impl PdaTables {
    /// Look up the action set taken in `state` on the language element `key`.
    pub fn action_set(&self, state: usize, key: i32) -> Option<usize> {
        let lo = *self.keys.get(state * 2)?;
        let hi = *self.keys.get(state * 2 + 1)?;
        if key < lo || key > hi {
            return None;
        }
        let pos = self.offsets[state] as usize + (key - lo) as usize;
        if self.owners.get(pos).copied() != Some(state as i32) {
            return None;
        }
        let ind = *self.indices.get(pos)?;
        (ind >= 0).then_some(ind as usize)
    }

    /// The decoded action list of an action set.
    pub fn actions(&self, set: usize) -> impl Iterator<Item = PdaAction> + '_ {
        let start = self.act_inds[set] as usize;
        self.actions[start..]
            .iter()
            .take_while(|&&code| code != 0)
            .filter_map(|&code| PdaAction::decode(code))
    }

    pub fn target(&self, set: usize) -> u32 {
        self.targs[set]
    }

    pub fn commit_len(&self, set: usize) -> i32 {
        self.commit_len[set]
    }

    /// Token regions live in `state`, in the stored `region id + 1` form.
    ///
    /// The EOF region is stored as 0, the same value as the terminator, so
    /// a state scanning only for EOF yields nothing.
    pub fn regions(&self, state: usize) -> impl Iterator<Item = i32> + '_ {
        let start = self.token_region_inds[state] as usize;
        self.token_regions[start..]
            .iter()
            .copied()
            .take_while(|&r| r != 0)
    }

    pub fn validate(&self) -> Result<(), TableError> {
        check_len("keys", self.keys.len(), self.num_states * 2)?;
        check_len("offsets", self.offsets.len(), self.num_states)?;
        check_len("owners", self.owners.len(), self.indices.len())?;
        check_len("act_inds", self.act_inds.len(), self.targs.len())?;
        check_len("commit_len", self.commit_len.len(), self.targs.len())?;
        check_len(
            "token_region_inds",
            self.token_region_inds.len(),
            self.num_states,
        )?;
        check_len(
            "token_pre_regions",
            self.token_pre_regions.len(),
            self.token_regions.len(),
        )?;

        for (index, &ind) in self.indices.iter().enumerate() {
            if ind >= 0 && ind as usize >= self.targs.len() {
                return Err(TableError::Dangling {
                    table: "indices",
                    index,
                });
            }
        }
        for (index, &targ) in self.targs.iter().enumerate() {
            if targ as usize >= self.num_states {
                return Err(TableError::StateOutOfRange {
                    state: targ as usize,
                    num_states: self.num_states,
                });
            }
            let start = self.act_inds[index] as usize;
            if !self.actions[start.min(self.actions.len())..].contains(&0) {
                return Err(TableError::Unterminated { index });
            }
        }
        for &start in &self.start_states {
            if start as usize >= self.num_states {
                return Err(TableError::StateOutOfRange {
                    state: start as usize,
                    num_states: self.num_states,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reduce_codes() {
        assert_eq!(make_reduce_code(5, false), 2 | (5 << 2));
        assert_eq!(make_reduce_code(5, true), 3 | (5 << 2));
        assert_eq!(PdaAction::decode(SHIFT_CODE), Some(PdaAction::Shift));
        assert_eq!(PdaAction::decode(22), Some(PdaAction::Reduce(5)));
        assert_eq!(PdaAction::decode(23), Some(PdaAction::ShiftReduce(5)));
        assert_eq!(PdaAction::decode(0), None);
        assert_eq!(PdaAction::ShiftReduce(7).encode(), 31);
    }

    #[test]
    fn lookup_linear() {
        // state 0: keys 1..=3 with a gap on 2; state 1: no transitions.
        let tables = PdaTables {
            indices: vec![0, -1, 1],
            owners: vec![0, -1, 0],
            keys: vec![1, 3, 0, 0],
            offsets: vec![0, 3],
            targs: vec![1, 1],
            act_inds: vec![0, 2],
            actions: vec![SHIFT_CODE, 0, make_reduce_code(2, false), 0],
            commit_len: vec![0, -1],
            token_region_inds: vec![1, 3],
            token_regions: vec![0, 1, 0, 0],
            token_pre_regions: vec![0, -1, 0, 0],
            num_states: 2,
            first_non_term_id: 4,
            start_states: vec![0],
            max_prod_len: 1,
        };
        tables.validate().unwrap();

        assert_eq!(tables.action_set(0, 1), Some(0));
        assert_eq!(tables.action_set(0, 2), None);
        assert_eq!(tables.action_set(0, 3), Some(1));
        assert_eq!(tables.action_set(0, 4), None);
        assert_eq!(tables.action_set(1, 1), None);
        assert_eq!(
            tables.actions(1).collect::<Vec<_>>(),
            vec![PdaAction::Reduce(2)]
        );
        assert_eq!(tables.commit_len(1), -1);
        assert_eq!(tables.regions(0).collect::<Vec<_>>(), vec![1]);
        assert_eq!(tables.regions(1).count(), 0);
    }
}
