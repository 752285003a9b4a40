//! Building the scanner automaton from its definitions.
//!
//! The definitions are walked three times in the same order: once to build
//! the name tree, once to resolve references to names, and once to build
//! the graphs. The walks enter and leave name scopes at the same points so
//! that each one sees the scopes created by the first.

use super::{
    action::{Action, ActionId, InlineItem, RegionId},
    builtin::Builtin,
    graph::FsmGraph,
    longest::{LmGlobals, LmPart, RegionData},
    name::{NameId, NameTree},
    regex::{EmbedKind, Instance, KeyLit, MachineDef, RegExpr, RepeatKind, TokenDef, TokenRegion},
};
use crate::{
    compile::{BuildConfig, BuildError, MinimizeLevel},
    diag::{Diagnostics, InputLoc},
    key::{Key, KeyAlphabet},
    types::Map,
};
use std::collections::VecDeque;

/// Everything the scanner is built from.
#[derive(Debug, Clone, Default)]
pub struct ScannerDef {
    pub actions: Vec<Action>,
    pub defs: Map<String, MachineDef>,
    pub regions: Vec<TokenRegion>,
    pub instances: Vec<Instance>,
}

impl ScannerDef {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare an action and return its id.
    pub fn action(&mut self, name: &str, items: Vec<InlineItem>) -> ActionId {
        let id = ActionId::from_raw(self.actions.len() as u32);
        self.actions.push(Action {
            id,
            name: name.to_owned(),
            loc: InputLoc::internal(),
            items,
            embed_roots: vec![],
        });
        id
    }

    /// Add a named definition, usable by reference.
    pub fn define(&mut self, name: &str, expr: RegExpr) {
        self.defs.insert(
            name.to_owned(),
            MachineDef {
                name: name.to_owned(),
                loc: InputLoc::internal(),
                expr,
            },
        );
    }

    /// Instantiate a machine as an entry point of the scanner.
    pub fn instance(&mut self, name: &str, expr: RegExpr) {
        self.instances.push(Instance::Machine(MachineDef {
            name: name.to_owned(),
            loc: InputLoc::internal(),
            expr,
        }));
    }

    /// Add a token region, instantiated as an entry point of the scanner.
    pub fn region(&mut self, name: &str, tokens: Vec<TokenDef>) -> RegionId {
        let id = RegionId::from_raw(self.regions.len() as u32);
        self.regions.push(TokenRegion {
            id,
            name: name.to_owned(),
            loc: InputLoc::internal(),
            tokens,
        });
        self.instances.push(Instance::Region(id));
        id
    }
}

impl TokenDef {
    pub fn new(name: &str, expr: RegExpr) -> Self {
        Self {
            name: name.to_owned(),
            loc: InputLoc::internal(),
            expr: Some(expr),
            action: None,
            ignore: false,
        }
    }

    pub fn without_pattern(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            loc: InputLoc::internal(),
            expr: None,
            action: None,
            ignore: false,
        }
    }

    pub fn with_action(mut self, action: ActionId) -> Self {
        self.action = Some(action);
        self
    }

    pub fn ignore(mut self) -> Self {
        self.ignore = true;
        self
    }
}

/// The finished scanner automaton and what is needed to reduce it.
#[derive(Debug)]
pub struct ScannerGraph {
    pub graph: FsmGraph,
    pub actions: Vec<Action>,
    pub names: NameTree,
    pub parts: Vec<LmPart>,
    pub regions: Vec<RegionData>,
    /// Warnings reported along the way.
    pub diagnostics: Diagnostics,
}

/// Build the scanner: construct every instance, glob them together and
/// prepare the result for reduction.
pub fn make_scanner(def: &ScannerDef, config: &BuildConfig) -> Result<ScannerGraph, BuildError> {
    let mut ctx = ScanCtx::new(def, config);
    ctx.init_longest_match_data();
    let mut graph = ctx.make_all_regions();

    if ctx.diag.has_errors() {
        return Err(BuildError::Diagnostics(ctx.diag));
    }

    if graph.lm_requires_error_state || graph.has_error_trans(&ctx.alph) {
        graph.add_error_state();
    }
    graph.depth_first_ordering();
    graph.sort_states_by_final();
    graph.set_state_numbers();
    tracing::debug!("scanner graph has {} states", graph.num_states());

    Ok(ScannerGraph {
        graph,
        actions: ctx.actions,
        names: ctx.names,
        parts: ctx.parts,
        regions: ctx.region_data,
        diagnostics: ctx.diag,
    })
}

enum RefKind<'d> {
    Def(&'d MachineDef),
    Builtin(Builtin),
    Recursive,
    Missing,
}

pub(super) struct ScanCtx<'d> {
    pub(super) def: &'d ScannerDef,
    pub(super) alph: KeyAlphabet,
    minimize: MinimizeLevel,
    pub(super) actions: Vec<Action>,
    pub(super) names: NameTree,
    pub(super) diag: Diagnostics,
    pub(super) cur_action_ord: i32,
    cur_prior_ord: i32,
    epsilon_links: VecDeque<Option<NameId>>,
    expanding: Vec<&'d str>,
    pub(super) parts: Vec<LmPart>,
    pub(super) region_data: Vec<RegionData>,
    pub(super) lm: Option<LmGlobals>,
}

impl<'d> ScanCtx<'d> {
    fn new(def: &'d ScannerDef, config: &BuildConfig) -> Self {
        Self {
            def,
            alph: config.alphabet,
            minimize: config.minimize,
            actions: def.actions.clone(),
            names: NameTree::new(),
            diag: Diagnostics::default(),
            cur_action_ord: 0,
            cur_prior_ord: 0,
            epsilon_links: VecDeque::new(),
            expanding: vec![],
            parts: vec![],
            region_data: def.regions.iter().map(|_| RegionData::default()).collect(),
            lm: None,
        }
    }

    pub(super) fn next_action_ord(&mut self) -> i32 {
        let ord = self.cur_action_ord;
        self.cur_action_ord += 1;
        ord
    }

    pub(super) fn new_action(
        &mut self,
        name: String,
        loc: &InputLoc,
        items: Vec<InlineItem>,
    ) -> ActionId {
        let id = ActionId::from_raw(self.actions.len() as u32);
        self.actions.push(Action {
            id,
            name,
            loc: loc.clone(),
            items,
            embed_roots: vec![],
        });
        id
    }

    fn make_all_regions(&mut self) -> FsmGraph {
        self.make_name_tree();
        self.reference_instances();
        self.resolve_name_refs();

        self.names.reset_traversal();
        let mut graphs = vec![];
        let def = self.def;
        for inst in &def.instances {
            let mut graph = match inst {
                Instance::Machine(def) => self.walk_instance(def),
                Instance::Region(id) => self.walk_region(*id),
            };
            self.finish_graph_build(&mut graph);
            graphs.push(graph);
        }

        let mut graphs = graphs.into_iter();
        let mut all = graphs.next().unwrap_or_else(FsmGraph::lambda_fsm);
        all.glob_op(graphs.collect());
        if self.region_data.iter().any(|r| r.lm_switch_handles_error) {
            all.lm_requires_error_state = true;
        }
        all
    }

    fn finish_graph_build(&mut self, graph: &mut FsmGraph) {
        graph.deterministic_entry();
        graph.remove_action_dups();
        graph.remove_unreachable_states();
        graph.null_action_keys();
        graph.clear_all_priorities();
        if self.minimize != MinimizeLevel::None {
            graph.minimize_partition2();
        }
        graph.compress_transitions();
    }

    fn after_op_minimize(&self, graph: &mut FsmGraph, last_in_seq: bool) {
        let run = match self.minimize {
            MinimizeLevel::Every => true,
            MinimizeLevel::Most => last_in_seq,
            MinimizeLevel::End | MinimizeLevel::None => false,
        };
        if run {
            graph.remove_unreachable_states();
            graph.minimize_partition2();
        }
    }

    fn ref_kind(&self, name: &str) -> RefKind<'d> {
        let def = self.def;
        match def.defs.get(name) {
            Some(_) if self.expanding.iter().any(|&e| e == name) => RefKind::Recursive,
            Some(machine) => RefKind::Def(machine),
            None => match Builtin::from_name(name) {
                Some(b) => RefKind::Builtin(b),
                None => RefKind::Missing,
            },
        }
    }

    // ---- pass 1: the name tree ----

    fn make_name_tree(&mut self) {
        let def = self.def;
        for inst in &def.instances {
            match inst {
                Instance::Machine(def) => {
                    let id = self.names.add_name_inst(&def.loc, Some(&def.name), false);
                    let prev = self.names.set_current(id);
                    self.name_expr(&def.expr);
                    self.names.set_current(prev);
                }
                Instance::Region(rid) => self.make_region_name_tree(*rid),
            }
        }
    }

    pub(super) fn name_expr(&mut self, expr: &'d RegExpr) {
        match expr {
            RegExpr::Label { name, loc, expr } => {
                let id = self.names.add_name_inst(loc, Some(name), true);
                let prev = self.names.set_current(id);
                self.name_expr(expr);
                self.names.set_current(prev);
            }
            RegExpr::Ref(name, loc) => match self.ref_kind(name) {
                RefKind::Def(def) => {
                    let id = self.names.add_name_inst(loc, Some(name), false);
                    let prev = self.names.set_current(id);
                    self.expanding.push(&def.name);
                    self.name_expr(&def.expr);
                    self.expanding.pop();
                    self.names.set_current(prev);
                }
                RefKind::Builtin(..) => (),
                RefKind::Recursive => self.diag.error(
                    loc,
                    format!("machine {} is defined in terms of itself", name),
                ),
                RefKind::Missing => {
                    self.diag.error(loc, format!("graph lookup of {} failed", name))
                }
            },
            _ => {
                for child in children(expr) {
                    self.name_expr(child);
                }
            }
        }
    }

    /// Every instance is referenced once so its entry point survives until
    /// the end of the build.
    fn reference_instances(&mut self) {
        let roots = self.names.get(NameId::ROOT).child_vect.clone();
        for id in roots {
            self.names.get_mut(id).num_refs += 1;
        }
    }

    // ---- pass 2: references ----

    fn resolve_name_refs(&mut self) {
        self.names.reset_traversal();
        let def = self.def;
        for inst in &def.instances {
            match inst {
                Instance::Machine(def) => {
                    let frame = self.names.enter_name_scope(true, 1);
                    self.resolve_expr(&def.expr);
                    self.names.pop_name_scope(frame);
                }
                Instance::Region(rid) => self.resolve_region(*rid),
            }
        }
        self.resolve_action_refs();
    }

    pub(super) fn resolve_expr(&mut self, expr: &'d RegExpr) {
        match expr {
            RegExpr::Label { expr, .. } => {
                let frame = self.names.enter_name_scope(false, 1);
                self.resolve_expr(expr);
                self.names.pop_name_scope(frame);
            }
            RegExpr::Ref(name, _) => {
                if let RefKind::Def(def) = self.ref_kind(name) {
                    self.expanding.push(&def.name);
                    let frame = self.names.enter_name_scope(true, 1);
                    self.resolve_expr(&def.expr);
                    self.names.pop_name_scope(frame);
                    self.expanding.pop();
                }
            }
            RegExpr::Embed { action, expr, .. } => {
                self.add_embed_root(*action);
                self.resolve_expr(expr);
            }
            RegExpr::Epsilon { expr, targets } => {
                self.resolve_expr(expr);
                let local = self.names.local_scope();
                for target in targets {
                    let mut resolved = vec![];
                    self.names.resolve_from(&mut resolved, local, target, 0);
                    match resolved.first() {
                        Some(&id) => {
                            self.names.get_mut(id).num_refs += 1;
                            self.epsilon_links.push_back(Some(id));
                        }
                        None => {
                            self.diag.error(
                                &target.loc,
                                format!("could not resolve label {}", target),
                            );
                            self.epsilon_links.push_back(None);
                        }
                    }
                }
            }
            _ => {
                for child in children(expr) {
                    self.resolve_expr(child);
                }
            }
        }
    }

    pub(super) fn add_embed_root(&mut self, action: ActionId) {
        let local = self.names.local_scope();
        let roots = &mut self.actions[action.index()].embed_roots;
        if !roots.contains(&local) {
            roots.push(local);
        }
    }

    /// Resolve the state references made by action bodies.
    fn resolve_action_refs(&mut self) {
        for i in 0..self.actions.len() {
            if self.actions[i].embed_roots.is_empty() {
                continue;
            }
            let roots = self.actions[i].embed_roots.clone();
            for j in 0..self.actions[i].items.len() {
                let Some(name_ref) = self.actions[i].items[j].name_ref() else {
                    continue;
                };
                let name_ref = name_ref.clone();
                let Some(target) = self.names.resolve_state_ref(&name_ref, &roots, &mut self.diag)
                else {
                    continue;
                };
                if self.names.is_inside_longest_match(target) {
                    self.diag.error(
                        &name_ref.loc,
                        "cannot enter inside a longest match construction as an entry point",
                    );
                } else {
                    self.names.get_mut(target).num_refs += 1;
                }
                if let Some(r) = self.actions[i].items[j].name_ref_mut() {
                    r.target = Some(target);
                }
            }
        }
    }

    // ---- pass 3: graphs ----

    fn walk_instance(&mut self, def: &'d MachineDef) -> FsmGraph {
        let frame = self.names.enter_name_scope(true, 1);
        let graph = self.walk_def_body(&def.expr);
        self.names.pop_name_scope(frame);
        graph
    }

    /// The body of a definition: resolve epsilon links, drop the entry
    /// points no longer needed and expose the definition itself when it is
    /// referenced.
    fn walk_def_body(&mut self, expr: &'d RegExpr) -> FsmGraph {
        let mut graph = self.walk_expr(expr);
        graph.epsilon_op();
        self.names.unset_obsolete_entries(&mut graph);
        let cur = self.names.current();
        if self.names.get(cur).num_refs > 0 {
            let start = graph.start();
            graph.set_entry(cur, start);
        }
        graph
    }

    fn key_of(&mut self, lit: &KeyLit, loc: &InputLoc) -> Key {
        match lit {
            KeyLit::Char(c) => self.alph.parse_key_char(*c, loc, &mut self.diag),
            KeyLit::Number(text) => self.alph.parse_key_num(text, loc, &mut self.diag),
        }
    }

    pub(super) fn walk_expr(&mut self, expr: &'d RegExpr) -> FsmGraph {
        match expr {
            RegExpr::Literal(s) => FsmGraph::concat_fsm(&self.alph.string_keys(s)),
            RegExpr::LiteralCi(s) => FsmGraph::concat_fsm_ci(&self.alph.string_keys(s)),
            RegExpr::Key(lit, loc) => FsmGraph::concat_fsm_key(self.key_of(lit, loc)),
            RegExpr::Range { low, high, loc } => {
                let low = self.key_of(low, loc);
                let high = self.key_of(high, loc);
                if low > high {
                    self.diag
                        .error(loc, "lower end of range is greater then upper end");
                    FsmGraph::empty_fsm()
                } else {
                    FsmGraph::range_fsm(low, high)
                }
            }
            RegExpr::OrLiteral(s) => FsmGraph::or_fsm(&self.alph.string_keys(s)),
            RegExpr::Builtin(b) => b.make_fsm(&self.alph),
            RegExpr::Ref(name, _) => match self.ref_kind(name) {
                RefKind::Def(def) => {
                    self.expanding.push(&def.name);
                    let frame = self.names.enter_name_scope(true, 1);
                    let graph = self.walk_def_body(&def.expr);
                    self.names.pop_name_scope(frame);
                    self.expanding.pop();
                    graph
                }
                RefKind::Builtin(b) => b.make_fsm(&self.alph),
                RefKind::Recursive | RefKind::Missing => FsmGraph::empty_fsm(),
            },

            RegExpr::Concat(items) => self.walk_seq(items, FsmGraph::concat_op),
            RegExpr::Union(items) => self.walk_seq(items, FsmGraph::union_op),
            RegExpr::Intersect(a, b) => {
                let mut graph = self.walk_expr(a);
                let other = self.walk_expr(b);
                graph.intersect_op(other);
                self.after_op_minimize(&mut graph, true);
                graph
            }
            RegExpr::Subtract(a, b) => {
                let mut graph = self.walk_expr(a);
                let other = self.walk_expr(b);
                graph.subtract_op(other);
                self.after_op_minimize(&mut graph, true);
                graph
            }
            RegExpr::StrongSubtract(a, b) => {
                let mut graph = self.walk_expr(a);
                let other = self.walk_expr(b);
                graph.strong_subtract_op(other, &self.alph);
                self.after_op_minimize(&mut graph, true);
                graph
            }

            RegExpr::Star(e) => self.walk_unary(e, FsmGraph::star_op),
            RegExpr::Plus(e) => self.walk_unary(e, FsmGraph::plus_op),
            RegExpr::Question(e) => self.walk_unary(e, FsmGraph::question_op),
            RegExpr::Repeat { expr, kind, loc } => {
                let mut graph = self.walk_expr(expr);
                match *kind {
                    RepeatKind::Exact(n) => graph.exact_repeat_op(n),
                    RepeatKind::Max(n) => graph.max_repeat_op(n),
                    RepeatKind::Min(n) => graph.min_repeat_op(n),
                    RepeatKind::Range(low, high) if high < low => {
                        self.diag.error(
                            loc,
                            "the upper bound of a repetition is less than the lower bound",
                        );
                        return FsmGraph::empty_fsm();
                    }
                    RepeatKind::Range(low, high) => graph.range_repeat_op(low, high),
                }
                self.after_op_minimize(&mut graph, true);
                graph
            }

            RegExpr::Label { expr, .. } => {
                let frame = self.names.enter_name_scope(false, 1);
                let mut graph = self.walk_expr(expr);
                let cur = self.names.current();
                if self.names.get(cur).num_refs > 0 {
                    let start = graph.start();
                    graph.set_entry(cur, start);
                }
                self.names.pop_name_scope(frame);
                graph
            }
            RegExpr::Embed { kind, action, expr } => {
                let ord = self.next_action_ord();
                let mut graph = self.walk_expr(expr);
                match kind {
                    EmbedKind::AllTrans => graph.all_trans_action(ord, *action),
                    EmbedKind::StartTrans => graph.start_trans_action(ord, *action),
                    EmbedKind::FinishTrans => graph.finish_trans_action(ord, *action),
                    EmbedKind::ToState => graph.to_state_action(ord, *action),
                    EmbedKind::FromState => graph.from_state_action(ord, *action),
                    EmbedKind::Eof => graph.eof_action(ord, *action),
                }
                graph
            }
            RegExpr::Prior {
                key,
                priority,
                expr,
            } => {
                let ord = self.cur_prior_ord;
                self.cur_prior_ord += 1;
                let mut graph = self.walk_expr(expr);
                graph.all_trans_prior(ord, *key, *priority);
                graph
            }
            RegExpr::Epsilon { expr, targets } => {
                let mut graph = self.walk_expr(expr);
                let local = self.names.local_scope();
                for _ in targets {
                    let Some(Some(target)) = self.epsilon_links.pop_front() else {
                        continue;
                    };
                    for fin in graph.final_states() {
                        graph.state_mut(fin).epsilon_trans.push(target);
                    }
                    self.names.get_mut(local).referenced_names.push(target);
                }
                graph
            }
        }
    }

    fn walk_seq(&mut self, items: &'d [RegExpr], op: fn(&mut FsmGraph, FsmGraph)) -> FsmGraph {
        let mut iter = items.iter();
        let mut graph = match iter.next() {
            Some(first) => self.walk_expr(first),
            None => return FsmGraph::lambda_fsm(),
        };
        let mut rest = iter.peekable();
        while let Some(item) = rest.next() {
            let other = self.walk_expr(item);
            op(&mut graph, other);
            let last = rest.peek().is_none();
            self.after_op_minimize(&mut graph, last);
        }
        graph
    }

    fn walk_unary(&mut self, expr: &'d RegExpr, op: fn(&mut FsmGraph)) -> FsmGraph {
        let mut graph = self.walk_expr(expr);
        op(&mut graph);
        self.after_op_minimize(&mut graph, true);
        graph
    }
}

/// The direct sub-expressions that do not open a name scope of their own.
fn children(expr: &RegExpr) -> Vec<&RegExpr> {
    match expr {
        RegExpr::Concat(items) | RegExpr::Union(items) => items.iter().collect(),
        RegExpr::Intersect(a, b) | RegExpr::Subtract(a, b) | RegExpr::StrongSubtract(a, b) => {
            vec![a, b]
        }
        RegExpr::Star(e) | RegExpr::Plus(e) | RegExpr::Question(e) => vec![e],
        RegExpr::Repeat { expr, .. }
        | RegExpr::Embed { expr, .. }
        | RegExpr::Prior { expr, .. }
        | RegExpr::Epsilon { expr, .. }
        | RegExpr::Label { expr, .. } => vec![expr],
        RegExpr::Literal(..)
        | RegExpr::LiteralCi(..)
        | RegExpr::Key(..)
        | RegExpr::Range { .. }
        | RegExpr::OrLiteral(..)
        | RegExpr::Builtin(..)
        | RegExpr::Ref(..) => vec![],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fsm::name::NameRef;

    fn keys(s: &str) -> Vec<Key> {
        s.bytes().map(|b| b as Key).collect()
    }

    fn build(def: &ScannerDef) -> ScannerGraph {
        make_scanner(def, &BuildConfig::default()).expect("scanner builds")
    }

    #[test]
    fn definitions_by_reference() {
        let mut def = ScannerDef::new();
        def.define("digits", RegExpr::reference("digit").plus());
        def.instance(
            "main",
            RegExpr::Concat(vec![
                RegExpr::reference("digits"),
                RegExpr::lit("."),
                RegExpr::reference("digits"),
            ]),
        );
        let scanner = build(&def);
        assert!(scanner.graph.accepts(&keys("3.14")));
        assert!(!scanner.graph.accepts(&keys("3.")));
        assert!(scanner.graph.err_state().is_some());
    }

    #[test]
    fn undefined_and_recursive_refs() {
        let mut def = ScannerDef::new();
        def.define("loop", RegExpr::Concat(vec![RegExpr::lit("a"), RegExpr::reference("loop")]));
        def.instance("main", RegExpr::Union(vec![
            RegExpr::reference("nothing"),
            RegExpr::reference("loop"),
        ]));
        let err = make_scanner(&def, &BuildConfig::default()).unwrap_err();
        let BuildError::Diagnostics(diag) = err else {
            panic!("expected diagnostics");
        };
        let messages: Vec<_> = diag.iter().map(|d| d.message.clone()).collect();
        assert_eq!(
            messages,
            vec![
                "graph lookup of nothing failed",
                "machine loop is defined in terms of itself",
            ]
        );
    }

    #[test]
    fn epsilon_links_to_labels() {
        // main := ( 'a' -> next ) ; next: 'b'
        let mut def = ScannerDef::new();
        def.instance(
            "main",
            RegExpr::Union(vec![
                RegExpr::Epsilon {
                    expr: Box::new(RegExpr::lit("a")),
                    targets: vec![NameRef::new("next", InputLoc::internal())],
                },
                RegExpr::lit("b").label("next"),
            ]),
        );
        let scanner = build(&def);
        assert!(scanner.graph.accepts(&keys("ab")));
        assert!(scanner.graph.accepts(&keys("b")));
        // The link adds to the final state of `a`, which stays final.
        assert!(scanner.graph.accepts(&keys("a")));
        assert!(!scanner.graph.accepts(&keys("ba")));
        // The label was only used by the link, so its entry point is gone.
        let label_entries = scanner
            .graph
            .entry_points()
            .iter()
            .filter(|&&(id, _)| scanner.names.get(id).is_label)
            .count();
        assert_eq!(label_entries, 0);
    }

    #[test]
    fn jump_targets_keep_entry_points() {
        let mut def = ScannerDef::new();
        let jump = def.action(
            "jump",
            vec![InlineItem::Goto(NameRef::new("inner", InputLoc::internal()))],
        );
        def.instance(
            "main",
            RegExpr::Concat(vec![
                RegExpr::lit("x").embed(EmbedKind::FinishTrans, jump),
                RegExpr::lit("y").label("inner"),
            ]),
        );
        let scanner = build(&def);
        let inner = scanner
            .graph
            .entry_points()
            .iter()
            .find(|&&(id, _)| scanner.names.get(id).name.as_deref() == Some("inner"));
        assert!(inner.is_some());
        let resolved = scanner.actions[jump.index()].items[0]
            .name_ref()
            .and_then(|r| r.target);
        assert_eq!(resolved, inner.map(|&(id, _)| id));
    }
}
