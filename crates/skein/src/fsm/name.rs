//! Name scopes of machine instantiations and labels.
//!
//! The tree is built in one walk over the definitions and then re-walked
//! in exactly the same order while resolving references and while building
//! the graphs. The `enter_name_scope` / `pop_name_scope` pair keeps the
//! later walks in step with the first one.

use super::graph::FsmGraph;
use crate::{
    diag::{Diagnostics, InputLoc},
    types::Map,
};
use std::{collections::VecDeque, fmt};

#[derive(Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NameId(u32);
impl fmt::Debug for NameId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "N#{:03}", self.0)
    }
}
impl NameId {
    pub const ROOT: Self = Self(0);

    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A possibly qualified reference to a name, `a::b` or `::a::b`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NameRef {
    /// The parts of the name. A leading empty part marks a reference
    /// rooted at the global scope.
    pub parts: Vec<String>,
    pub loc: InputLoc,
    /// Filled in by name resolution.
    pub target: Option<NameId>,
}

impl NameRef {
    pub fn new(path: &str, loc: InputLoc) -> Self {
        Self {
            parts: path.split("::").map(str::to_owned).collect(),
            loc,
            target: None,
        }
    }

    pub fn is_global(&self) -> bool {
        self.parts.first().map_or(false, |p| p.is_empty())
    }
}

impl fmt::Display for NameRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = self.parts.iter();
        if self.is_global() {
            parts.next();
            f.write_str("::")?;
        }
        for (i, part) in parts.enumerate() {
            if i > 0 {
                f.write_str("::")?;
            }
            f.write_str(part)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct NameInst {
    pub id: NameId,
    pub name: Option<String>,
    pub parent: Option<NameId>,
    pub loc: InputLoc,
    pub is_label: bool,
    pub is_longest_match: bool,
    pub children: Map<String, Vec<NameId>>,
    pub child_vect: Vec<NameId>,
    pub num_refs: usize,
    pub num_uses: usize,
    pub referenced_names: Vec<NameId>,
}

/// The traversal position saved when entering a scope.
#[derive(Debug, Copy, Clone)]
pub struct NameFrame {
    prev_inst: NameId,
    prev_child: usize,
    prev_local: NameId,
}

#[derive(Debug, Clone)]
pub struct NameTree {
    insts: Vec<NameInst>,
    cur: NameId,
    cur_child: usize,
    local: NameId,
}

impl Default for NameTree {
    fn default() -> Self {
        Self::new()
    }
}

impl NameTree {
    pub fn new() -> Self {
        let root = NameInst {
            id: NameId::ROOT,
            name: None,
            parent: None,
            loc: InputLoc::internal(),
            is_label: false,
            is_longest_match: false,
            children: Map::default(),
            child_vect: vec![],
            num_refs: 0,
            num_uses: 0,
            referenced_names: vec![],
        };
        Self {
            insts: vec![root],
            cur: NameId::ROOT,
            cur_child: 0,
            local: NameId::ROOT,
        }
    }

    pub fn get(&self, id: NameId) -> &NameInst {
        &self.insts[id.index()]
    }

    pub fn get_mut(&mut self, id: NameId) -> &mut NameInst {
        &mut self.insts[id.index()]
    }

    /// Every instance, indexed by id.
    pub fn name_index(&self) -> &[NameInst] {
        &self.insts[..]
    }

    pub fn len(&self) -> usize {
        self.insts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.insts.len() == 1
    }

    pub fn current(&self) -> NameId {
        self.cur
    }

    /// The innermost enclosing scope that was entered as a local scope.
    pub fn local_scope(&self) -> NameId {
        self.local
    }

    /// Add a child of the current scope, giving it the next id.
    pub fn add_name_inst(&mut self, loc: &InputLoc, name: Option<&str>, is_label: bool) -> NameId {
        let id = NameId(self.insts.len() as u32);
        self.insts.push(NameInst {
            id,
            name: name.map(str::to_owned),
            parent: Some(self.cur),
            loc: loc.clone(),
            is_label,
            is_longest_match: false,
            children: Map::default(),
            child_vect: vec![],
            num_refs: 0,
            num_uses: 0,
            referenced_names: vec![],
        });
        let parent = &mut self.insts[self.cur.index()];
        parent.child_vect.push(id);
        if let Some(name) = name {
            parent.children.entry(name.to_owned()).or_default().push(id);
        }
        id
    }

    /// Make `id` the current scope while building the tree, returning the
    /// previous one.
    pub fn set_current(&mut self, id: NameId) -> NameId {
        std::mem::replace(&mut self.cur, id)
    }

    /// Rewind the traversal to the root before a walk over the tree.
    pub fn reset_traversal(&mut self) {
        self.cur = NameId::ROOT;
        self.cur_child = 0;
        self.local = NameId::ROOT;
    }

    /// Descend `n` levels, each time into the next unvisited child.
    pub fn enter_name_scope(&mut self, is_local: bool, n: usize) -> NameFrame {
        let frame = NameFrame {
            prev_inst: self.cur,
            prev_child: self.cur_child,
            prev_local: self.local,
        };
        for _ in 0..n {
            let next = self.insts[self.cur.index()].child_vect[self.cur_child];
            self.cur = next;
            self.cur_child = 0;
        }
        if is_local {
            self.local = self.cur;
        }
        frame
    }

    /// Leave a scope, moving on to the next sibling.
    pub fn pop_name_scope(&mut self, frame: NameFrame) {
        self.cur = frame.prev_inst;
        self.cur_child = frame.prev_child + 1;
        self.local = frame.prev_local;
    }

    /// Leave a scope without advancing, so it can be entered again.
    pub fn reset_name_scope(&mut self, frame: NameFrame) {
        self.cur = frame.prev_inst;
        self.cur_child = frame.prev_child;
        self.local = frame.prev_local;
    }

    /// Breadth-first search below `from` for children named `part`.
    pub fn resolve_part(&self, from: NameId, part: &str, rec_labels_only: bool) -> Vec<NameId> {
        let mut queue = VecDeque::new();
        queue.push_back(from);
        let mut result = vec![];
        while let Some(from) = queue.pop_front() {
            let inst = self.get(from);
            if let Some(found) = inst.children.get(part) {
                for &id in found {
                    if !result.contains(&id) {
                        result.push(id);
                    }
                }
            }
            for &child in &inst.child_vect {
                if !rec_labels_only || self.get(child).is_label {
                    queue.push_back(child);
                }
            }
        }
        result
    }

    /// Resolve the parts of `name_ref` from `pos` onwards, starting at `from`.
    pub fn resolve_from(
        &self,
        result: &mut Vec<NameId>,
        from: NameId,
        name_ref: &NameRef,
        pos: usize,
    ) {
        let Some(part) = name_ref.parts.get(pos) else {
            return;
        };
        let resolved = self.resolve_part(from, part, false);
        if pos + 1 < name_ref.parts.len() {
            for name in resolved {
                self.resolve_from(result, name, name_ref, pos + 1);
            }
        } else {
            for name in resolved {
                if !result.contains(&name) {
                    result.push(name);
                }
            }
        }
    }

    /// Resolve a state reference made from an action body.
    ///
    /// Unqualified names are first looked up from each scope the action is
    /// embedded in, then from the root.
    pub fn resolve_state_ref(
        &self,
        name_ref: &NameRef,
        embed_roots: &[NameId],
        diag: &mut Diagnostics,
    ) -> Option<NameId> {
        let mut target = None;

        if !name_ref.is_global() && !embed_roots.is_empty() {
            let mut resolved = vec![];
            for &root in embed_roots {
                self.resolve_from(&mut resolved, root, name_ref, 0);
            }
            target = self.pick_resolved(name_ref, resolved, diag);
        }

        if target.is_none() {
            let mut resolved = vec![];
            let pos = if name_ref.is_global() { 1 } else { 0 };
            self.resolve_from(&mut resolved, NameId::ROOT, name_ref, pos);
            target = self.pick_resolved(name_ref, resolved, diag);
        }

        if target.is_none() {
            diag.error(
                &name_ref.loc,
                format!("could not resolve state reference {}", name_ref),
            );
        }
        target
    }

    /// Take the first candidate, complaining when there is more than one.
    pub(crate) fn pick_resolved(
        &self,
        name_ref: &NameRef,
        resolved: Vec<NameId>,
        diag: &mut Diagnostics,
    ) -> Option<NameId> {
        let first = *resolved.first()?;
        if resolved.len() > 1 {
            diag.error(
                &name_ref.loc,
                format!(
                    "state reference {} resolves to multiple entry points",
                    name_ref
                ),
            );
            let mut sorted = resolved;
            sorted.sort_by(|a, b| self.get(*a).loc.cmp_position(&self.get(*b).loc));
            for id in sorted {
                diag.error(&self.get(id).loc, format!("  -> {}", self.qualified_name(id)));
            }
        }
        Some(first)
    }

    /// Whether any scope enclosing `id` is a longest-match construction.
    pub fn is_inside_longest_match(&self, id: NameId) -> bool {
        let mut search = self.get(id).parent;
        while let Some(parent) = search {
            let inst = self.get(parent);
            if inst.is_longest_match {
                return true;
            }
            search = inst.parent;
        }
        false
    }

    /// Count a use of every name the current scope drew epsilon links to,
    /// dropping the entry points that have no remaining users.
    pub fn unset_obsolete_entries(&mut self, graph: &mut FsmGraph) {
        let referenced = self.insts[self.cur.index()].referenced_names.clone();
        for name in referenced {
            let inst = &mut self.insts[name.index()];
            inst.num_uses += 1;
            if inst.num_uses == inst.num_refs {
                graph.unset_entry(name);
            }
        }
    }

    /// `::outer::inner`, skipping the root and writing `<ANON>` for
    /// unnamed scopes.
    pub fn qualified_name(&self, id: NameId) -> String {
        let mut path = vec![];
        let mut cur = Some(id);
        while let Some(c) = cur {
            let inst = self.get(c);
            if inst.parent.is_none() {
                break;
            }
            path.push(inst.name.as_deref().unwrap_or("<ANON>"));
            cur = inst.parent;
        }
        path.iter().rev().map(|p| format!("::{}", p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn loc(line: u32) -> InputLoc {
        InputLoc::new("t", line, 1)
    }

    // root
    //  ├─ main (1)
    //  │   ├─ a (2, label)
    //  │   └─ <anon> (3)
    //  │       └─ a (4, label)
    //  └─ other (5)
    //      └─ b (6, label)
    fn sample() -> NameTree {
        let mut tree = NameTree::new();
        let main = tree.add_name_inst(&loc(1), Some("main"), false);
        let prev = tree.set_current(main);
        tree.add_name_inst(&loc(2), Some("a"), true);
        let anon = tree.add_name_inst(&loc(3), None, false);
        tree.set_current(anon);
        tree.add_name_inst(&loc(4), Some("a"), true);
        tree.set_current(prev);
        let other = tree.add_name_inst(&loc(5), Some("other"), false);
        tree.set_current(other);
        tree.add_name_inst(&loc(6), Some("b"), true);
        tree.set_current(prev);
        tree
    }

    #[test]
    fn breadth_first_resolution() {
        let tree = sample();
        let found = tree.resolve_part(NameId::ROOT, "a", false);
        assert_eq!(found, vec![NameId::from_raw(2), NameId::from_raw(4)]);
        let labels_only = tree.resolve_part(NameId::ROOT, "a", true);
        assert!(labels_only.is_empty());

        let mut result = vec![];
        let r = NameRef::new("other::b", loc(9));
        tree.resolve_from(&mut result, NameId::ROOT, &r, 0);
        assert_eq!(result, vec![NameId::from_raw(6)]);

        assert_eq!(tree.qualified_name(NameId::from_raw(4)), "::main::<ANON>::a");
    }

    #[test]
    fn state_refs() {
        let tree = sample();
        let mut diag = Diagnostics::default();

        let r = NameRef::new("b", loc(10));
        let found = tree.resolve_state_ref(&r, &[NameId::from_raw(5)], &mut diag);
        assert_eq!(found, Some(NameId::from_raw(6)));
        assert!(!diag.has_errors());

        let r = NameRef::new("a", loc(11));
        let found = tree.resolve_state_ref(&r, &[NameId::from_raw(1)], &mut diag);
        assert_eq!(found, Some(NameId::from_raw(2)));
        let messages: Vec<_> = diag.iter().map(|d| d.to_string()).collect();
        assert_eq!(
            messages,
            vec![
                "t:11:1: state reference a resolves to multiple entry points",
                "t:2:1:   -> ::main::a",
                "t:4:1:   -> ::main::<ANON>::a",
            ]
        );

        let mut diag = Diagnostics::default();
        let r = NameRef::new("::zzz", loc(12));
        assert_eq!(r.to_string(), "::zzz");
        assert_eq!(tree.resolve_state_ref(&r, &[], &mut diag), None);
        assert_eq!(
            diag.iter().next().map(|d| d.message.as_str()),
            Some("could not resolve state reference ::zzz")
        );
    }

    #[test]
    fn scope_walk() {
        let mut tree = sample();
        tree.reset_traversal();
        let main = tree.enter_name_scope(true, 1);
        assert_eq!(tree.current(), NameId::from_raw(1));
        assert_eq!(tree.local_scope(), NameId::from_raw(1));
        let label = tree.enter_name_scope(false, 1);
        assert_eq!(tree.current(), NameId::from_raw(2));
        assert_eq!(tree.local_scope(), NameId::from_raw(1));
        tree.pop_name_scope(label);
        let anon = tree.enter_name_scope(false, 1);
        assert_eq!(tree.current(), NameId::from_raw(3));
        tree.pop_name_scope(anon);
        tree.pop_name_scope(main);
        let other = tree.enter_name_scope(true, 1);
        assert_eq!(tree.current(), NameId::from_raw(5));
        tree.pop_name_scope(other);
    }
}
