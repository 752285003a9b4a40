//! Scanner tables.

use crate::{check_len, TableError};

/// The flattened scanner automaton.
///
/// State `s` owns the ranges `key_offsets[s] .. key_offsets[s] + range_lens[s]`.
/// Range `r` covers `keys[2r] ..= keys[2r + 1]` and takes the transition
/// `indices[r]`. Transitions are shared between ranges with the same target
/// and action list.
///
/// Action references (`trans_actions`, `to_state_actions`, ...) hold an
/// index into `action_offsets` or `-1`. The list at `action_offsets[i]` is
/// stored length-prefixed in `actions`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FsmTables {
    pub start_state: u32,
    pub first_final: u32,
    pub error_state: i32,
    pub entry_by_region: Vec<i32>,
    pub key_offsets: Vec<u32>,
    pub range_lens: Vec<u32>,
    pub keys: Vec<i64>,
    pub indices: Vec<u32>,
    pub trans_targs: Vec<i32>,
    pub trans_actions: Vec<i32>,
    pub to_state_actions: Vec<i32>,
    pub from_state_actions: Vec<i32>,
    pub eof_actions: Vec<i32>,
    pub eof_targs: Vec<i32>,
    pub action_offsets: Vec<u32>,
    pub actions: Vec<u32>,
    pub max_key: i64,
    pub num_states: usize,
}

impl FsmTables {
    /// Find the transition taken from `state` on `key`.
    ///
    /// Returns `None` when no range of the state covers the key.
    pub fn transition(&self, state: usize, key: i64) -> Option<usize> {
        let offset = *self.key_offsets.get(state)? as usize;
        let len = *self.range_lens.get(state)? as usize;
        let (mut lo, mut hi) = (0, len);
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            let r = offset + mid;
            if key < self.keys[2 * r] {
                hi = mid;
            } else if key > self.keys[2 * r + 1] {
                lo = mid + 1;
            } else {
                return Some(self.indices[r] as usize);
            }
        }
        None
    }

    /// The state reached by a transition, if any.
    pub fn target(&self, trans: usize) -> Option<usize> {
        let targ = *self.trans_targs.get(trans)?;
        (targ >= 0).then_some(targ as usize)
    }

    pub fn is_final(&self, state: usize) -> bool {
        state as u32 >= self.first_final
    }

    /// The action ids of the action list `id`.
    pub fn action_list(&self, id: usize) -> &[u32] {
        let offset = self.action_offsets[id] as usize;
        let len = self.actions[offset] as usize;
        &self.actions[offset + 1..offset + 1 + len]
    }

    /// Run the machine over `input` from the start state, returning the
    /// state it stops in. Actions are not executed.
    pub fn run(&self, input: impl IntoIterator<Item = i64>) -> Option<usize> {
        let mut state = self.start_state as usize;
        for key in input {
            let trans = self.transition(state, key)?;
            state = self.target(trans)?;
            if self.error_state >= 0 && state == self.error_state as usize {
                return None;
            }
        }
        Some(state)
    }

    pub fn validate(&self) -> Result<(), TableError> {
        let n = self.num_states;
        check_len("key_offsets", self.key_offsets.len(), n)?;
        check_len("range_lens", self.range_lens.len(), n)?;
        check_len("to_state_actions", self.to_state_actions.len(), n)?;
        check_len("from_state_actions", self.from_state_actions.len(), n)?;
        check_len("eof_actions", self.eof_actions.len(), n)?;
        check_len("eof_targs", self.eof_targs.len(), n)?;
        check_len("keys", self.keys.len(), self.indices.len() * 2)?;
        check_len("trans_actions", self.trans_actions.len(), self.trans_targs.len())?;

        let in_range = |state: i32| -> Result<(), TableError> {
            if state >= 0 && state as usize >= n {
                return Err(TableError::StateOutOfRange {
                    state: state as usize,
                    num_states: n,
                });
            }
            Ok(())
        };

        if n > 0 {
            in_range(self.start_state as i32)?;
        }
        if self.first_final as usize > n {
            return Err(TableError::StateOutOfRange {
                state: self.first_final as usize,
                num_states: n,
            });
        }
        in_range(self.error_state)?;
        for &entry in &self.entry_by_region {
            in_range(entry)?;
        }
        for &targ in self.trans_targs.iter().chain(&self.eof_targs) {
            in_range(targ)?;
        }
        for (index, &trans) in self.indices.iter().enumerate() {
            if trans as usize >= self.trans_targs.len() {
                return Err(TableError::Dangling {
                    table: "indices",
                    index,
                });
            }
        }
        for state in 0..n {
            let end = self.key_offsets[state] as usize + self.range_lens[state] as usize;
            if end > self.indices.len() {
                return Err(TableError::Dangling {
                    table: "key_offsets",
                    index: state,
                });
            }
        }

        let refs = self
            .trans_actions
            .iter()
            .chain(&self.to_state_actions)
            .chain(&self.from_state_actions)
            .chain(&self.eof_actions);
        for (index, &act) in refs.enumerate() {
            if act >= 0 && act as usize >= self.action_offsets.len() {
                return Err(TableError::Dangling {
                    table: "action references",
                    index,
                });
            }
        }
        for (index, &offset) in self.action_offsets.iter().enumerate() {
            let offset = offset as usize;
            let fits = self
                .actions
                .get(offset)
                .map_or(false, |&len| offset + 1 + len as usize <= self.actions.len());
            if !fits {
                return Err(TableError::Unterminated { index });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // Two states recognizing `[0-9]+`; state 1 is final.
    fn digits() -> FsmTables {
        FsmTables {
            start_state: 0,
            first_final: 1,
            error_state: -1,
            entry_by_region: vec![],
            key_offsets: vec![0, 1],
            range_lens: vec![1, 1],
            keys: vec![48, 57, 48, 57],
            indices: vec![0, 0],
            trans_targs: vec![1],
            trans_actions: vec![0],
            to_state_actions: vec![-1, -1],
            from_state_actions: vec![-1, -1],
            eof_actions: vec![-1, -1],
            eof_targs: vec![-1, -1],
            action_offsets: vec![0],
            actions: vec![2, 7, 9],
            max_key: 127,
            num_states: 2,
        }
    }

    #[test]
    fn lookup() {
        let tables = digits();
        tables.validate().unwrap();

        assert_eq!(tables.transition(0, '5' as i64), Some(0));
        assert_eq!(tables.transition(0, 'a' as i64), None);
        assert_eq!(tables.target(0), Some(1));
        assert_eq!(tables.action_list(0), &[7, 9]);
        assert!(tables.is_final(1));
        assert!(!tables.is_final(0));

        let run = |s: &str| tables.run(s.bytes().map(i64::from));
        assert_eq!(run("123"), Some(1));
        assert_eq!(run(""), Some(0));
        assert_eq!(run("12a"), None);
    }

    #[test]
    fn validate_rejects_dangling() {
        let mut tables = digits();
        tables.trans_targs[0] = 5;
        assert!(matches!(
            tables.validate(),
            Err(TableError::StateOutOfRange { state: 5, .. })
        ));

        let mut tables = digits();
        tables.actions.truncate(2);
        assert!(matches!(
            tables.validate(),
            Err(TableError::Unterminated { index: 0 })
        ));
    }
}
