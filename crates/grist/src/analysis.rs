use thiserror::Error;

use crate::grammar::{Grammar, Symbol, TermSet, NT};

// Missing entries indicate a broken pipeline invariant (a symbol used but
// never registered), not bad caller input; the enclosing computation aborts.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnalysisError {
    #[error("no FIRST entry for nonterminal {0}")]
    MissingFirst(NT),
    #[error("no FOLLOW entry for nonterminal {0}")]
    MissingFollow(NT),
}

/// FIRST sets for every nonterminal, computed to a fixed point.
/// FIRST of a terminal is the identity singleton and is answered
/// structurally rather than stored.
#[derive(Clone, Debug)]
pub struct FirstSets {
    per_nonterminal: Vec<TermSet>,
    n_terminals: usize,
}

impl FirstSets {
    pub fn compute(grammar: &Grammar) -> Result<FirstSets, AnalysisError> {
        let n = grammar.n_terminals();
        let mut per_nonterminal = vec![TermSet::new(n); grammar.n_nonterminals()];

        // repeated full passes; FIRST sets only grow, so this terminates
        loop {
            let mut changed = false;
            for p in grammar.productions() {
                let mut rhs_first = TermSet::new(n);
                let mut all_nullable = true;
                for &sym in &p.rhs {
                    match sym {
                        Symbol::Terminal(t) => {
                            rhs_first.insert_terminal(t);
                            all_nullable = false;
                        }
                        Symbol::Eof => {
                            rhs_first.insert_eof();
                            all_nullable = false;
                        }
                        // ε contributes nothing and stays nullable
                        Symbol::Empty => {}
                        Symbol::Nonterminal(nt) => {
                            let first = per_nonterminal
                                .get(nt)
                                .ok_or(AnalysisError::MissingFirst(nt))?;
                            let nullable = first.contains_empty();
                            rhs_first.union_without_empty(first);
                            if !nullable {
                                all_nullable = false;
                            }
                        }
                    }
                    if !all_nullable {
                        break;
                    }
                }
                if all_nullable {
                    rhs_first.insert_empty();
                }
                let entry = per_nonterminal
                    .get_mut(p.lhs)
                    .ok_or(AnalysisError::MissingFirst(p.lhs))?;
                changed |= entry.union_with(&rhs_first);
            }
            if !changed {
                break;
            }
        }

        Ok(FirstSets {
            per_nonterminal,
            n_terminals: n,
        })
    }

    pub fn of_nonterminal(&self, nt: NT) -> Result<&TermSet, AnalysisError> {
        self.per_nonterminal
            .get(nt)
            .ok_or(AnalysisError::MissingFirst(nt))
    }

    /// FIRST of an arbitrary symbol, materialized
    pub fn of_symbol(&self, sym: Symbol) -> Result<TermSet, AnalysisError> {
        let mut set = TermSet::new(self.n_terminals);
        match sym {
            Symbol::Terminal(t) => {
                set.insert_terminal(t);
            }
            Symbol::Eof => {
                set.insert_eof();
            }
            Symbol::Empty => {
                set.insert_empty();
            }
            Symbol::Nonterminal(nt) => {
                set.union_with(self.of_nonterminal(nt)?);
            }
        }
        Ok(set)
    }

    /// a symbol is nullable iff its FIRST set contains ε
    pub fn nullable(&self, sym: Symbol) -> bool {
        match sym {
            Symbol::Empty => true,
            Symbol::Nonterminal(nt) => self
                .per_nonterminal
                .get(nt)
                .is_some_and(TermSet::contains_empty),
            Symbol::Terminal(_) | Symbol::Eof => false,
        }
    }
}

/// FOLLOW sets for every nonterminal. Requires finished FIRST sets, which
/// the signature of `compute` enforces.
#[derive(Clone, Debug)]
pub struct FollowSets {
    per_nonterminal: Vec<TermSet>,
}

impl FollowSets {
    pub fn compute(grammar: &Grammar, first: &FirstSets) -> Result<FollowSets, AnalysisError> {
        let n = grammar.n_terminals();
        let mut per_nonterminal = vec![TermSet::new(n); grammar.n_nonterminals()];
        let start = grammar.start_symbol();
        per_nonterminal
            .get_mut(start)
            .ok_or(AnalysisError::MissingFollow(start))?
            .insert_eof();

        loop {
            let mut changed = false;
            for p in grammar.productions() {
                // scan right to left with a running trailer, seeded from
                // FOLLOW(lhs) as it stood at the top of this pass
                let mut trailer = per_nonterminal
                    .get(p.lhs)
                    .ok_or(AnalysisError::MissingFollow(p.lhs))?
                    .clone();
                for &sym in p.rhs.iter().rev() {
                    match sym {
                        Symbol::Empty => {}
                        Symbol::Terminal(t) => {
                            trailer = TermSet::new(n);
                            trailer.insert_terminal(t);
                        }
                        Symbol::Eof => {
                            trailer = TermSet::new(n);
                            trailer.insert_eof();
                        }
                        Symbol::Nonterminal(nt) => {
                            let entry = per_nonterminal
                                .get_mut(nt)
                                .ok_or(AnalysisError::MissingFollow(nt))?;
                            changed |= entry.union_with(&trailer);
                            let sym_first = first.of_nonterminal(nt)?;
                            if sym_first.contains_empty() {
                                // FOLLOW propagates through nullable symbols
                                trailer.union_without_empty(sym_first);
                            } else {
                                trailer = sym_first.clone();
                            }
                        }
                    }
                }
            }
            if !changed {
                break;
            }
        }

        Ok(FollowSets { per_nonterminal })
    }

    pub fn of(&self, nt: NT) -> Result<&TermSet, AnalysisError> {
        self.per_nonterminal
            .get(nt)
            .ok_or(AnalysisError::MissingFollow(nt))
    }
}

/// One grammar's finished analysis: the input to LR construction.
/// `run` performs FIRST then FOLLOW in the required order.
#[derive(Debug)]
pub struct Analysis<'g> {
    pub grammar: &'g Grammar,
    pub first: FirstSets,
    pub follow: FollowSets,
}

impl<'g> Analysis<'g> {
    pub fn run(grammar: &'g Grammar) -> Result<Analysis<'g>, AnalysisError> {
        let first = FirstSets::compute(grammar)?;
        let follow = FollowSets::compute(grammar, &first)?;
        Ok(Analysis {
            grammar,
            first,
            follow,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grammar::GrammarBuilder;

    // S' -> S, S -> C C, C -> c C | d
    fn cd_grammar() -> Grammar {
        let mut b = GrammarBuilder::new();
        let s_aug = b.nonterminal("S'");
        let s = b.nonterminal("S");
        let c_nt = b.nonterminal("C");
        let c = b.terminal("c");
        let d = b.terminal("d");
        b.production(s_aug, vec![s]).unwrap();
        b.production(s, vec![c_nt, c_nt]).unwrap();
        b.production(c_nt, vec![c, c_nt]).unwrap();
        b.production(c_nt, vec![d]).unwrap();
        b.build(0).unwrap()
    }

    // A' -> A, A -> a A | ε
    fn nullable_grammar() -> Grammar {
        let mut b = GrammarBuilder::new();
        let a_aug = b.nonterminal("A'");
        let a_nt = b.nonterminal("A");
        let a = b.terminal("a");
        b.production(a_aug, vec![a_nt]).unwrap();
        b.production(a_nt, vec![a, a_nt]).unwrap();
        b.production(a_nt, vec![Symbol::Empty]).unwrap();
        b.build(0).unwrap()
    }

    #[test]
    fn first_of_terminal_is_itself() {
        let g = cd_grammar();
        let first = FirstSets::compute(&g).unwrap();
        for t in 0..g.n_terminals() {
            let set = first.of_symbol(Symbol::Terminal(t)).unwrap();
            assert_eq!(set.len(), 1);
            assert!(set.contains_terminal(t));
        }
    }

    #[test]
    fn first_sets_of_cd_grammar() {
        let g = cd_grammar();
        let first = FirstSets::compute(&g).unwrap();
        for nt in 0..g.n_nonterminals() {
            // S', S and C all start with c or d
            let set = first.of_nonterminal(nt).unwrap();
            assert_eq!(set.len(), 2, "{}", g.nonterminal_name(nt));
            assert!(set.contains_terminal(0));
            assert!(set.contains_terminal(1));
            assert!(!set.contains_empty());
        }
    }

    #[test]
    fn follow_of_start_contains_eof() {
        let g = cd_grammar();
        let analysis = Analysis::run(&g).unwrap();
        assert!(analysis.follow.of(g.start_symbol()).unwrap().contains_eof());
    }

    #[test]
    fn follow_sets_of_cd_grammar() {
        let g = cd_grammar();
        let analysis = Analysis::run(&g).unwrap();
        // FOLLOW(C) = {c, d, $}
        let follow_c = analysis.follow.of(2).unwrap();
        assert_eq!(follow_c.len(), 3);
        assert!(follow_c.contains_terminal(0));
        assert!(follow_c.contains_terminal(1));
        assert!(follow_c.contains_eof());
        // FOLLOW(S) = {$}
        let follow_s = analysis.follow.of(1).unwrap();
        assert_eq!(follow_s.len(), 1);
        assert!(follow_s.contains_eof());
    }

    #[test]
    fn epsilon_production_makes_nonterminal_nullable() {
        let g = nullable_grammar();
        let first = FirstSets::compute(&g).unwrap();
        let first_a = first.of_nonterminal(1).unwrap();
        assert!(first_a.contains_empty());
        assert!(first_a.contains_terminal(0));
        // nullability spills up to A'
        assert!(first.nullable(Symbol::Nonterminal(0)));
        assert!(first.nullable(Symbol::Empty));
        assert!(!first.nullable(Symbol::Terminal(0)));
    }

    #[test]
    fn follow_propagates_through_nullable_suffix() {
        // S' -> S, S -> A b, A -> B c?, B -> d | ε  exercises the trailer
        // union path: FOLLOW(B) must pick up FIRST(C-part) and FOLLOW(A)
        let mut b = GrammarBuilder::new();
        let s_aug = b.nonterminal("S'");
        let s = b.nonterminal("S");
        let a_nt = b.nonterminal("A");
        let b_nt = b.nonterminal("B");
        let c_nt = b.nonterminal("C");
        let bt = b.terminal("b");
        let ct = b.terminal("c");
        let dt = b.terminal("d");
        b.production(s_aug, vec![s]).unwrap();
        b.production(s, vec![a_nt, bt]).unwrap();
        b.production(a_nt, vec![b_nt, c_nt]).unwrap();
        b.production(c_nt, vec![ct]).unwrap();
        b.production(c_nt, vec![Symbol::Empty]).unwrap();
        b.production(b_nt, vec![dt]).unwrap();
        let g = b.build(0).unwrap();
        let analysis = Analysis::run(&g).unwrap();
        // B is followed by FIRST(C) = {c} and, since C is nullable, by
        // FOLLOW(A) = {b} as well
        let follow_b = analysis.follow.of(3).unwrap();
        assert!(follow_b.contains_terminal(1)); // c
        assert!(follow_b.contains_terminal(0)); // b
        assert!(!follow_b.contains_empty());
    }

    #[test]
    fn no_nullables_means_no_empty_anywhere() {
        let g = cd_grammar();
        let analysis = Analysis::run(&g).unwrap();
        for nt in 0..g.n_nonterminals() {
            assert!(!analysis.first.of_nonterminal(nt).unwrap().contains_empty());
            assert!(!analysis.follow.of(nt).unwrap().contains_empty());
        }
    }
}
