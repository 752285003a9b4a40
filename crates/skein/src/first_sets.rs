//! First sets of the productions, computed over their single-path machines.

use crate::{
    grammar::{Grammar, LangElId, EPSILON},
    pda::{PdaGraph, PdaStateId},
    types::OrdSet,
};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum Walk {
    /// Every element that can start the production, plus the `_T_`
    /// wrappers of the nonterminals among them.
    All,
    /// Only the nonterminals.
    NonTerms,
}

/// Compute `first_set` of every production.
pub(crate) fn make_first_sets(grammar: &mut Grammar) {
    fixpoint(grammar, Walk::All);
}

/// Compute `non_term_first_set` and `is_left_rec` of every production.
pub(crate) fn make_non_term_first_sets(grammar: &mut Grammar) {
    fixpoint(grammar, Walk::NonTerms);
    for prod in grammar.productions.values_mut() {
        prod.is_left_rec = prod.non_term_first_set.contains(&(prod.lhs.raw() as i64));
    }
}

fn fixpoint(grammar: &mut Grammar, walk: Walk) {
    let mut rounds = 0;
    let mut modified = true;
    while modified {
        modified = false;
        rounds += 1;
        for i in 0..grammar.productions.len() {
            let prod = &grammar.productions[i];
            let mut set = match walk {
                Walk::All => prod.first_set.clone(),
                Walk::NonTerms => prod.non_term_first_set.clone(),
            };
            let before = set.len();

            let start = prod.fsm.start().expect("production machine has a start state");
            if prod.fsm.state(start).is_final {
                set.insert(EPSILON);
            }
            walk_state(grammar, walk, &prod.fsm, start, &mut set);

            if set.len() != before {
                modified = true;
                let prod = &mut grammar.productions[i];
                match walk {
                    Walk::All => prod.first_set = set,
                    Walk::NonTerms => prod.non_term_first_set = set,
                }
            }
        }
    }
    tracing::trace!("first sets ({:?}) settled after {} rounds", walk, rounds);
}

fn walk_state(
    grammar: &Grammar,
    walk: Walk,
    fsm: &PdaGraph,
    state: PdaStateId,
    set: &mut OrdSet<i64>,
) {
    for (key, trans) in fsm.out_trans(state) {
        let is_nonterm = key >= grammar.first_non_term_id;
        if !is_nonterm {
            if walk == Walk::All {
                set.insert(key.raw() as i64);
            }
            continue;
        }

        set.insert(key.raw() as i64);
        let lel = grammar.lang_el(key);
        if walk == Walk::All {
            if let Some(dup) = lel.term_dup {
                set.insert(dup.raw() as i64);
            }
        }

        let mut has_epsilon = false;
        for prod in &lel.productions {
            let prod = grammar.production(*prod);
            let from = match walk {
                Walk::All => &prod.first_set,
                Walk::NonTerms => &prod.non_term_first_set,
            };
            for &id in from {
                if id == EPSILON {
                    has_epsilon = true;
                } else {
                    set.insert(id);
                }
            }
        }

        if has_epsilon {
            let to = trans.to.expect("attached transition");
            if fsm.state(to).is_final {
                set.insert(EPSILON);
            }
            walk_state(grammar, walk, fsm, to, set);
        }
    }
}

/// Names of the elements in a first set, `<eps>` for the empty string.
pub fn first_set_names(grammar: &Grammar, set: &OrdSet<i64>) -> Vec<String> {
    set.iter()
        .map(|&id| match id {
            EPSILON => "<eps>".to_owned(),
            id => grammar.lang_el(LangElId::from_raw(id as u32)).name.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::{PredType, Symbol};

    fn names(g: &Grammar, set: &OrdSet<i64>) -> Vec<String> {
        let mut names = first_set_names(g, set);
        names.sort();
        names
    }

    #[test]
    fn expression_first_sets() {
        let mut syms: Option<[Symbol; 2]> = None;
        let g = Grammar::define(|g| {
            let plus = g.terminal("PLUS")?;
            let num = g.terminal("NUM")?;
            let expr = g.nonterminal("expr")?;
            let term = g.nonterminal("term")?;
            g.precedence(PredType::Left, [plus]);
            g.production(expr, [expr, plus, term])?;
            g.production(expr, [term])?;
            g.production(term, [num])?;
            g.parser(expr)?;
            syms = Some([expr, term]);
            Ok(())
        })
        .unwrap();
        let [expr, term] = syms.unwrap();

        let expr1 = &g.productions[0];
        assert_eq!(
            names(&g, &expr1.first_set),
            ["NUM", "_T_expr", "_T_term", "expr", "term"]
        );
        assert_eq!(names(&g, &expr1.non_term_first_set), ["expr", "term"]);
        assert!(expr1.is_left_rec);

        let expr2 = &g.productions[1];
        assert_eq!(names(&g, &expr2.first_set), ["NUM", "_T_term", "term"]);
        assert!(!expr2.is_left_rec);

        let term1 = &g.productions[2];
        assert_eq!(names(&g, &term1.first_set), ["NUM"]);
        assert!(term1.non_term_first_set.is_empty());

        let root = g.production(g.lang_el(g.id(expr)).root_def.unwrap());
        assert!(root.first_set.contains(&(g.id(term).raw() as i64)));
        assert!(!root.is_left_rec);
    }

    #[test]
    fn epsilon_propagates_through_nullable_prefixes() {
        let g = Grammar::define(|g| {
            let a = g.terminal("a")?;
            let b = g.terminal("b")?;
            let s = g.nonterminal("s")?;
            let opt = g.nonterminal("opt")?;
            let both = g.nonterminal("both")?;
            g.production(s, [opt, a])?;
            g.production(opt, Vec::<Symbol>::new())?;
            g.production(opt, [b])?;
            g.production(both, [opt, opt])?;
            g.production(s, [both])?;
            g.parser(s)?;
            Ok(())
        })
        .unwrap();

        let s1 = &g.productions[0];
        assert_eq!(names(&g, &s1.first_set), ["_T_opt", "a", "b", "opt"]);
        assert!(!s1.first_set.contains(&EPSILON));

        let opt1 = &g.productions[1];
        assert_eq!(opt1.first_set.as_slice(), &[EPSILON]);
        assert_eq!(opt1.non_term_first_set.as_slice(), &[EPSILON]);

        let both = &g.productions[3];
        assert!(both.first_set.contains(&EPSILON));
        assert_eq!(names(&g, &both.non_term_first_set), ["<eps>", "opt"]);

        // s -> both, both is nullable so s is too.
        let s2 = &g.productions[4];
        assert!(s2.first_set.contains(&EPSILON));
        assert!(!s2.is_left_rec);
    }

    #[test]
    fn left_recursion_through_a_nullable_element() {
        let g = Grammar::define(|g| {
            let x = g.terminal("x")?;
            let list = g.nonterminal("list")?;
            let pre = g.nonterminal("pre")?;
            g.production(list, [pre, list, x])?;
            g.production(list, [x])?;
            g.production(pre, Vec::<Symbol>::new())?;
            g.parser(list)?;
            Ok(())
        })
        .unwrap();
        assert!(g.productions[0].is_left_rec);
        assert!(!g.productions[1].is_left_rec);
        assert!(!g.productions[2].is_left_rec);
    }
}
