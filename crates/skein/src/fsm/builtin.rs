//! The named machines every definition can refer to.

use super::graph::FsmGraph;
use crate::key::{Key, KeyAlphabet};
use std::fmt;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Builtin {
    Any,
    Ascii,
    Extend,
    Alpha,
    Digit,
    Alnum,
    Lower,
    Upper,
    Cntrl,
    Graph,
    Print,
    Punct,
    Space,
    Xdigit,
    /// Matches the empty word without consuming input.
    Lambda,
    /// Matches nothing at all.
    Empty,
}

impl Builtin {
    pub const ALL: [Builtin; 16] = [
        Self::Any,
        Self::Ascii,
        Self::Extend,
        Self::Alpha,
        Self::Digit,
        Self::Alnum,
        Self::Lower,
        Self::Upper,
        Self::Cntrl,
        Self::Graph,
        Self::Print,
        Self::Punct,
        Self::Space,
        Self::Xdigit,
        Self::Lambda,
        Self::Empty,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Self::Any => "any",
            Self::Ascii => "ascii",
            Self::Extend => "extend",
            Self::Alpha => "alpha",
            Self::Digit => "digit",
            Self::Alnum => "alnum",
            Self::Lower => "lower",
            Self::Upper => "upper",
            Self::Cntrl => "cntrl",
            Self::Graph => "graph",
            Self::Print => "print",
            Self::Punct => "punct",
            Self::Space => "space",
            Self::Xdigit => "xdigit",
            Self::Lambda => "null",
            Self::Empty => "empty",
        }
    }

    /// `zlen` is accepted as another name for `null`.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "zlen" => Some(Self::Lambda),
            _ => Self::ALL.into_iter().find(|b| b.name() == name),
        }
    }

    /// The key ranges making up a single-key builtin.
    fn ranges(self) -> &'static [(char, char)] {
        match self {
            Self::Alpha => &[('A', 'Z'), ('a', 'z')],
            Self::Digit => &[('0', '9')],
            Self::Alnum => &[('0', '9'), ('A', 'Z'), ('a', 'z')],
            Self::Lower => &[('a', 'z')],
            Self::Upper => &[('A', 'Z')],
            Self::Graph => &[('!', '~')],
            Self::Print => &[(' ', '~')],
            Self::Punct => &[('!', '/'), (':', '@'), ('[', '`'), ('{', '~')],
            Self::Space => &[('\t', '\r'), (' ', ' ')],
            Self::Xdigit => &[('0', '9'), ('A', 'F'), ('a', 'f')],
            _ => &[],
        }
    }

    /// Build the machine.
    pub fn make_fsm(self, alph: &KeyAlphabet) -> FsmGraph {
        match self {
            Self::Any => FsmGraph::dot_fsm(alph),
            Self::Ascii => FsmGraph::range_fsm(0, 127),
            Self::Extend => FsmGraph::range_fsm(-128, 127),
            Self::Cntrl => union_of(&[(0, 31), (127, 127)]),
            Self::Lambda => FsmGraph::lambda_fsm(),
            Self::Empty => FsmGraph::empty_fsm(),
            _ => {
                let ranges: Vec<(Key, Key)> = self
                    .ranges()
                    .iter()
                    .map(|&(lo, hi)| (lo as Key, hi as Key))
                    .collect();
                union_of(&ranges)
            }
        }
    }
}

impl fmt::Display for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

fn union_of(ranges: &[(Key, Key)]) -> FsmGraph {
    let mut iter = ranges.iter();
    let mut g = match iter.next() {
        Some(&(lo, hi)) => FsmGraph::range_fsm(lo, hi),
        None => return FsmGraph::empty_fsm(),
    };
    for &(lo, hi) in iter {
        g.union_op(FsmGraph::range_fsm(lo, hi));
    }
    g.minimize_partition2();
    g
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepts(b: Builtin, s: &str) -> bool {
        let alph = KeyAlphabet::default();
        b.make_fsm(&alph).accepts(&alph.string_keys(s))
    }

    #[test]
    fn digit() {
        assert!(accepts(Builtin::Digit, "7"));
        assert!(!accepts(Builtin::Digit, "a"));
        assert!(!accepts(Builtin::Digit, "77"));
    }

    #[test]
    fn alpha() {
        assert!(accepts(Builtin::Alpha, "Q"));
        assert!(accepts(Builtin::Alpha, "q"));
        assert!(!accepts(Builtin::Alpha, "_"));
    }

    #[test]
    fn space() {
        for s in ["\t", "\n", "\x0b", "\x0c", "\r", " "] {
            assert!(accepts(Builtin::Space, s), "{:?}", s);
        }
        assert!(!accepts(Builtin::Space, "x"));
    }

    #[test]
    fn empty_and_lambda() {
        // `empty` has a single non-final state, so not even the empty word
        // matches. The zero-width machine is `null` / `zlen`.
        assert!(!accepts(Builtin::Empty, ""));
        assert!(!accepts(Builtin::Empty, "a"));
        assert_eq!(Builtin::Empty.make_fsm(&KeyAlphabet::default()).num_states(), 1);
        assert!(accepts(Builtin::Lambda, ""));
        assert!(!accepts(Builtin::Lambda, "a"));
        assert_eq!(Builtin::from_name("zlen"), Some(Builtin::Lambda));
    }

    #[test]
    fn single_key_builtins_minimize_to_two_states() {
        let alph = KeyAlphabet::default();
        for b in Builtin::ALL {
            if matches!(b, Builtin::Lambda | Builtin::Empty) {
                continue;
            }
            let g = b.make_fsm(&alph);
            assert_eq!(g.num_states(), 2, "{}", b);
        }
    }
}
