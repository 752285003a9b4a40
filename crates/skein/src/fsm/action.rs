//! User actions and the ordered tables that attach them to machines.

use super::name::{NameId, NameRef};
use crate::diag::InputLoc;
use std::fmt;

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionId(u32);
impl fmt::Debug for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A#{:03}", self.0)
    }
}
impl ActionId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    pub const fn raw(self) -> u32 {
        self.0
    }
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// One token of a longest-match region.
#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LmPartId(u32);
impl fmt::Debug for LmPartId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L#{:03}", self.0)
    }
}
impl LmPartId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RegionId(u32);
impl fmt::Debug for RegionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R#{:03}", self.0)
    }
}
impl RegionId {
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    pub const fn raw(self) -> u32 {
        self.0
    }
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A piece of an action body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InlineItem {
    /// Host-language text, passed through to the emitter.
    Text(String),
    Goto(NameRef),
    Call(NameRef),
    Next(NameRef),
    Entry(NameRef),
    Ret,

    // Generated by the longest-match construction.
    LmSwitch(RegionId),
    LmSetActId(LmPartId),
    LmSetTokEnd,
    LmOnLast(LmPartId),
    LmOnNext(LmPartId),
    LmOnLagBehind(LmPartId),
    LmInitAct,
    LmSetTokStart,
}

impl InlineItem {
    pub fn name_ref(&self) -> Option<&NameRef> {
        match self {
            Self::Goto(r) | Self::Call(r) | Self::Next(r) | Self::Entry(r) => Some(r),
            _ => None,
        }
    }

    pub(crate) fn name_ref_mut(&mut self) -> Option<&mut NameRef> {
        match self {
            Self::Goto(r) | Self::Call(r) | Self::Next(r) | Self::Entry(r) => Some(r),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Action {
    pub id: ActionId,
    pub name: String,
    pub loc: InputLoc,
    pub items: Vec<InlineItem>,
    /// The local scopes the action is embedded from. State references in
    /// the body are searched from these first.
    pub embed_roots: Vec<NameId>,
}

impl Action {
    pub fn is_longest_match(&self) -> bool {
        self.items.iter().any(|item| {
            !matches!(
                item,
                InlineItem::Text(..)
                    | InlineItem::Goto(..)
                    | InlineItem::Call(..)
                    | InlineItem::Next(..)
                    | InlineItem::Entry(..)
                    | InlineItem::Ret
            )
        })
    }
}

/// Actions keyed by their ordering, multiple actions per ordering allowed.
///
/// The table is kept sorted by ordering; actions with equal ordering keep
/// their insertion order. An identical (ordering, action) pair is stored
/// once.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActionTable {
    items: Vec<(i32, ActionId)>,
}

impl ActionTable {
    pub fn set_action(&mut self, ordering: i32, action: ActionId) {
        if self.items.contains(&(ordering, action)) {
            return;
        }
        let pos = self.items.partition_point(|&(o, _)| o <= ordering);
        self.items.insert(pos, (ordering, action));
    }

    pub fn set_actions(&mut self, other: &ActionTable) {
        for &(ordering, action) in &other.items {
            self.set_action(ordering, action);
        }
    }

    pub fn has_action(&self, action: ActionId) -> bool {
        self.items.iter().any(|&(_, a)| a == action)
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (i32, ActionId)> + '_ {
        self.items.iter().copied()
    }

    /// The actions in execution order.
    pub fn actions(&self) -> impl Iterator<Item = ActionId> + '_ {
        self.items.iter().map(|&(_, a)| a)
    }

    /// Keep only the first occurrence of every action.
    pub fn remove_dups(&mut self) {
        let mut seen = Vec::with_capacity(self.items.len());
        self.items.retain(|&(_, a)| {
            if seen.contains(&a) {
                false
            } else {
                seen.push(a);
                true
            }
        });
    }

    /// Zero all orderings. The relative order of the actions is kept.
    pub fn null_keys(&mut self) {
        for item in &mut self.items {
            item.0 = 0;
        }
    }
}

/// Longest-match items keyed by ordering.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LmActionTable {
    items: Vec<(i32, LmPartId)>,
}

impl LmActionTable {
    pub fn set_action(&mut self, ordering: i32, part: LmPartId) {
        if self.items.contains(&(ordering, part)) {
            return;
        }
        let pos = self.items.partition_point(|&(o, _)| o <= ordering);
        self.items.insert(pos, (ordering, part));
    }

    pub fn set_actions(&mut self, other: &LmActionTable) {
        for &(ordering, part) in &other.items {
            self.set_action(ordering, part);
        }
    }

    /// The entry with the lowest ordering, i.e. the earliest token.
    pub fn first(&self) -> Option<(i32, LmPartId)> {
        self.items.first().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn null_keys(&mut self) {
        for item in &mut self.items {
            item.0 = 0;
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PriorEl {
    pub key: i32,
    pub ordering: i32,
    pub priority: i32,
}

/// Priorities keyed by priority key, at most one per key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PriorTable {
    items: Vec<PriorEl>,
}

impl PriorTable {
    /// Set a priority. An existing priority on the same key is replaced
    /// when `ordering` is not older than the one already stored.
    pub fn set_prior(&mut self, ordering: i32, key: i32, priority: i32) {
        let el = PriorEl {
            key,
            ordering,
            priority,
        };
        match self.items.binary_search_by_key(&key, |p| p.key) {
            Ok(pos) => {
                if ordering >= self.items[pos].ordering {
                    self.items[pos] = el;
                }
            }
            Err(pos) => self.items.insert(pos, el),
        }
    }

    pub fn set_priors(&mut self, other: &PriorTable) {
        for p in &other.items {
            self.set_prior(p.ordering, p.key, p.priority);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn iter(&self) -> impl Iterator<Item = &PriorEl> + '_ {
        self.items.iter()
    }

    /// Compare two tables on the keys they share. The first shared key with
    /// differing priorities decides.
    pub fn compare(&self, other: &PriorTable) -> std::cmp::Ordering {
        use std::cmp::Ordering::*;
        let (mut i, mut j) = (0, 0);
        while i < self.items.len() && j < other.items.len() {
            let (a, b) = (&self.items[i], &other.items[j]);
            match a.key.cmp(&b.key) {
                Less => i += 1,
                Greater => j += 1,
                Equal => {
                    match a.priority.cmp(&b.priority) {
                        Equal => (),
                        ord => return ord,
                    }
                    i += 1;
                    j += 1;
                }
            }
        }
        Equal
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn action_table_ordering() {
        let (a, b, c) = (
            ActionId::from_raw(0),
            ActionId::from_raw(1),
            ActionId::from_raw(2),
        );
        let mut table = ActionTable::default();
        table.set_action(5, a);
        table.set_action(1, b);
        table.set_action(5, c);
        table.set_action(5, a);
        table.set_action(9, b);
        assert_eq!(table.actions().collect::<Vec<_>>(), vec![b, a, c, b]);

        table.remove_dups();
        assert_eq!(table.actions().collect::<Vec<_>>(), vec![b, a, c]);

        table.null_keys();
        assert!(table.iter().all(|(o, _)| o == 0));
    }

    #[test]
    fn prior_table_keeps_latest() {
        let mut table = PriorTable::default();
        table.set_prior(3, 0, 10);
        table.set_prior(2, 0, 20);
        assert_eq!(table.iter().next().map(|p| p.priority), Some(10));
        table.set_prior(4, 0, 20);
        assert_eq!(table.iter().next().map(|p| p.priority), Some(20));

        let mut other = PriorTable::default();
        other.set_prior(1, 0, 5);
        other.set_prior(1, 7, 50);
        assert_eq!(table.compare(&other), std::cmp::Ordering::Greater);
        assert_eq!(other.compare(&table), std::cmp::Ordering::Less);

        let mut unrelated = PriorTable::default();
        unrelated.set_prior(1, 3, 99);
        assert_eq!(table.compare(&unrelated), std::cmp::Ordering::Equal);
    }
}
