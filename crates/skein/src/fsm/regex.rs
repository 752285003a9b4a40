//! The parsed form of machine definitions and token regions.

use super::{
    action::{ActionId, RegionId},
    builtin::Builtin,
    name::NameRef,
};
use crate::diag::InputLoc;

/// A single key as written in a definition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyLit {
    Char(char),
    /// Decimal, or hexadecimal with a `0x` prefix.
    Number(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RepeatKind {
    /// `{n}`
    Exact(u32),
    /// `{,n}`
    Max(u32),
    /// `{n,}`
    Min(u32),
    /// `{n,m}`
    Range(u32, u32),
}

/// Where an embedded action runs.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EmbedKind {
    /// `$`: on every transition.
    AllTrans,
    /// `>`: on the transitions leaving the start state.
    StartTrans,
    /// `@`: on the transitions entering a final state.
    FinishTrans,
    ToState,
    FromState,
    /// On end of input in a final state.
    Eof,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegExpr {
    /// A string, one key per byte.
    Literal(String),
    /// A string matching ASCII letters in either case.
    LiteralCi(String),
    Key(KeyLit, InputLoc),
    Range {
        low: KeyLit,
        high: KeyLit,
        loc: InputLoc,
    },
    /// One key out of the bytes of a string.
    OrLiteral(String),
    Builtin(Builtin),
    /// A reference to a named definition or a builtin.
    Ref(String, InputLoc),

    Concat(Vec<RegExpr>),
    Union(Vec<RegExpr>),
    Intersect(Box<RegExpr>, Box<RegExpr>),
    Subtract(Box<RegExpr>, Box<RegExpr>),
    StrongSubtract(Box<RegExpr>, Box<RegExpr>),

    Star(Box<RegExpr>),
    Plus(Box<RegExpr>),
    Question(Box<RegExpr>),
    Repeat {
        expr: Box<RegExpr>,
        kind: RepeatKind,
        loc: InputLoc,
    },

    /// `name: expr`, a scope that can be entered or linked to.
    Label {
        name: String,
        loc: InputLoc,
        expr: Box<RegExpr>,
    },
    Embed {
        kind: EmbedKind,
        action: ActionId,
        expr: Box<RegExpr>,
    },
    Prior {
        key: i32,
        priority: i32,
        expr: Box<RegExpr>,
    },
    /// `expr -> label`: epsilon transitions from the final states of `expr`
    /// to the labelled states.
    Epsilon {
        expr: Box<RegExpr>,
        targets: Vec<NameRef>,
    },
}

impl RegExpr {
    pub fn lit(s: &str) -> Self {
        Self::Literal(s.to_owned())
    }

    pub fn lit_ci(s: &str) -> Self {
        Self::LiteralCi(s.to_owned())
    }

    pub fn chars(s: &str) -> Self {
        Self::OrLiteral(s.to_owned())
    }

    pub fn range(low: char, high: char) -> Self {
        Self::Range {
            low: KeyLit::Char(low),
            high: KeyLit::Char(high),
            loc: InputLoc::internal(),
        }
    }

    pub fn reference(name: &str) -> Self {
        Self::Ref(name.to_owned(), InputLoc::internal())
    }

    pub fn star(self) -> Self {
        Self::Star(Box::new(self))
    }

    pub fn plus(self) -> Self {
        Self::Plus(Box::new(self))
    }

    pub fn question(self) -> Self {
        Self::Question(Box::new(self))
    }

    pub fn repeat(self, kind: RepeatKind) -> Self {
        Self::Repeat {
            expr: Box::new(self),
            kind,
            loc: InputLoc::internal(),
        }
    }

    pub fn minus(self, other: RegExpr) -> Self {
        Self::Subtract(Box::new(self), Box::new(other))
    }

    pub fn and(self, other: RegExpr) -> Self {
        Self::Intersect(Box::new(self), Box::new(other))
    }

    pub fn label(self, name: &str) -> Self {
        Self::Label {
            name: name.to_owned(),
            loc: InputLoc::internal(),
            expr: Box::new(self),
        }
    }

    pub fn embed(self, kind: EmbedKind, action: ActionId) -> Self {
        Self::Embed {
            kind,
            action,
            expr: Box::new(self),
        }
    }

    pub fn prior(self, key: i32, priority: i32) -> Self {
        Self::Prior {
            key,
            priority,
            expr: Box::new(self),
        }
    }
}

/// A named definition, usable through [`RegExpr::Ref`].
#[derive(Debug, Clone)]
pub struct MachineDef {
    pub name: String,
    pub loc: InputLoc,
    pub expr: RegExpr,
}

/// One token of a region.
#[derive(Debug, Clone)]
pub struct TokenDef {
    pub name: String,
    pub loc: InputLoc,
    /// Tokens without a pattern take part in the grammar only.
    pub expr: Option<RegExpr>,
    pub action: Option<ActionId>,
    /// Matched and dropped by the scanner.
    pub ignore: bool,
}

/// A set of tokens scanned together under the longest-match rule.
#[derive(Debug, Clone)]
pub struct TokenRegion {
    pub id: RegionId,
    pub name: String,
    pub loc: InputLoc,
    pub tokens: Vec<TokenDef>,
}

/// A machine built into the final scanner as an entry point.
#[derive(Debug, Clone)]
pub enum Instance {
    Machine(MachineDef),
    Region(RegionId),
}
