//! Scanner automata: construction, regular operators and minimization.

pub mod action;
pub mod builtin;
pub mod graph;
pub mod longest;
mod minimize;
pub mod name;
mod ops;
pub mod regex;
pub mod scanner;

pub use self::{
    action::{Action, ActionId, InlineItem, LmPartId, RegionId},
    builtin::Builtin,
    graph::{FsmGraph, FsmState, FsmTrans, StateId},
    name::{NameId, NameRef, NameTree},
    regex::{EmbedKind, Instance, KeyLit, MachineDef, RegExpr, RepeatKind, TokenDef, TokenRegion},
    scanner::{make_scanner, ScannerDef, ScannerGraph},
};
