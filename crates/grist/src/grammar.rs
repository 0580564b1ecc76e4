use std::collections::HashMap;

use bit_set::BitSet;
use thiserror::Error;

pub type Term = usize;
pub type NT = usize;

// everything is just interned indices since it is simpler, but maybe less safe;
// the name tables live on the Grammar
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Symbol {
    Terminal(Term),
    Nonterminal(NT),
    /// the reserved ε terminal; only ever appears alone in a production rhs
    Empty,
    /// the reserved `$` end-of-input terminal; never appears in a production rhs
    Eof,
}

impl Symbol {
    pub fn is_terminal(self) -> bool {
        matches!(self, Symbol::Terminal(_))
    }

    pub fn is_nonterminal(self) -> bool {
        matches!(self, Symbol::Nonterminal(_))
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Production {
    pub lhs: NT,
    pub rhs: Vec<Symbol>,
}

impl Production {
    /// ε-productions are exactly a one-symbol rhs holding `Empty`
    pub fn is_epsilon(&self) -> bool {
        self.rhs == [Symbol::Empty]
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum GrammarError {
    #[error("production lhs must be a nonterminal")]
    TerminalLhs,
    #[error("production rhs may not be a zero-length sequence")]
    EmptyRhs,
    #[error("EMPTY may only appear alone in a production rhs")]
    MisplacedEmpty,
    #[error("EOF may not appear in a production rhs")]
    EofInRhs,
    #[error("start production index {0} is out of range")]
    BadStart(usize),
    #[error("grammar has no productions")]
    NoProductions,
}

/// An ordered production list plus the designated (augmented) start production.
/// Immutable once built; all analysis passes borrow it.
#[derive(Debug)]
pub struct Grammar {
    productions: Vec<Production>,
    start: usize,
    terminal_names: Vec<String>,
    nonterminal_names: Vec<String>,
    by_lhs: Vec<Vec<usize>>,
}

impl Grammar {
    pub fn n_terminals(&self) -> usize {
        self.terminal_names.len()
    }

    pub fn n_nonterminals(&self) -> usize {
        self.nonterminal_names.len()
    }

    pub fn productions(&self) -> &[Production] {
        &self.productions
    }

    pub fn production(&self, idx: usize) -> &Production {
        &self.productions[idx]
    }

    /// index of the start production in the production list
    pub fn start(&self) -> usize {
        self.start
    }

    pub fn start_production(&self) -> &Production {
        &self.productions[self.start]
    }

    /// the augmented start symbol (lhs of the start production)
    pub fn start_symbol(&self) -> NT {
        self.productions[self.start].lhs
    }

    pub fn terminal_name(&self, t: Term) -> &str {
        &self.terminal_names[t]
    }

    pub fn nonterminal_name(&self, nt: NT) -> &str {
        &self.nonterminal_names[nt]
    }

    pub fn display_symbol(&self, sym: Symbol) -> &str {
        match sym {
            Symbol::Terminal(t) => self.terminal_name(t),
            Symbol::Nonterminal(nt) => self.nonterminal_name(nt),
            Symbol::Empty => "ε",
            Symbol::Eof => "$",
        }
    }

    /// production indices grouped by lhs nonterminal
    pub fn rules_for(&self, nt: NT) -> &[usize] {
        &self.by_lhs[nt]
    }
}

/// Caller-facing construction API: interns symbol names and checks the
/// production invariants up front so the analysis passes never have to.
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    terminal_names: Vec<String>,
    nonterminal_names: Vec<String>,
    terminals: HashMap<String, Term>,
    nonterminals: HashMap<String, NT>,
    productions: Vec<Production>,
}

impl GrammarBuilder {
    pub fn new() -> GrammarBuilder {
        GrammarBuilder::default()
    }

    pub fn terminal(&mut self, name: &str) -> Symbol {
        if let Some(&t) = self.terminals.get(name) {
            return Symbol::Terminal(t);
        }
        let t = self.terminal_names.len();
        self.terminal_names.push(name.to_string());
        self.terminals.insert(name.to_string(), t);
        Symbol::Terminal(t)
    }

    pub fn nonterminal(&mut self, name: &str) -> Symbol {
        if let Some(&nt) = self.nonterminals.get(name) {
            return Symbol::Nonterminal(nt);
        }
        let nt = self.nonterminal_names.len();
        self.nonterminal_names.push(name.to_string());
        self.nonterminals.insert(name.to_string(), nt);
        Symbol::Nonterminal(nt)
    }

    /// resolve a name: lhs names are nonterminals, everything else a terminal
    pub fn symbol(&mut self, name: &str) -> Symbol {
        if let Some(&nt) = self.nonterminals.get(name) {
            Symbol::Nonterminal(nt)
        } else {
            self.terminal(name)
        }
    }

    pub fn production(&mut self, lhs: Symbol, rhs: Vec<Symbol>) -> Result<usize, GrammarError> {
        let Symbol::Nonterminal(lhs) = lhs else {
            return Err(GrammarError::TerminalLhs);
        };
        if rhs.is_empty() {
            return Err(GrammarError::EmptyRhs);
        }
        if rhs.len() > 1 && rhs.contains(&Symbol::Empty) {
            return Err(GrammarError::MisplacedEmpty);
        }
        if rhs.contains(&Symbol::Eof) {
            return Err(GrammarError::EofInRhs);
        }
        let idx = self.productions.len();
        self.productions.push(Production { lhs, rhs });
        Ok(idx)
    }

    pub fn build(self, start: usize) -> Result<Grammar, GrammarError> {
        if self.productions.is_empty() {
            return Err(GrammarError::NoProductions);
        }
        if start >= self.productions.len() {
            return Err(GrammarError::BadStart(start));
        }
        let mut by_lhs: Vec<Vec<usize>> = Vec::new();
        by_lhs.resize_with(self.nonterminal_names.len(), Vec::new);
        for (i, p) in self.productions.iter().enumerate() {
            by_lhs[p.lhs].push(i);
        }
        Ok(Grammar {
            productions: self.productions,
            start,
            terminal_names: self.terminal_names,
            nonterminal_names: self.nonterminal_names,
            by_lhs,
        })
    }
}

/// A set of lookahead/FIRST/FOLLOW members over one grammar's terminals.
/// |T| + 2 bits: one per terminal, one for EOF and one for ε.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TermSet {
    data: BitSet,
    n_terminals: usize,
}

impl TermSet {
    pub fn new(n_terminals: usize) -> TermSet {
        TermSet {
            data: BitSet::with_capacity(n_terminals + 2),
            n_terminals,
        }
    }

    fn eof_bit(&self) -> usize {
        self.n_terminals
    }

    fn empty_bit(&self) -> usize {
        self.n_terminals + 1
    }

    pub fn contains_terminal(&self, t: Term) -> bool {
        self.data.contains(t)
    }

    pub fn contains_eof(&self) -> bool {
        self.data.contains(self.eof_bit())
    }

    pub fn contains_empty(&self) -> bool {
        self.data.contains(self.empty_bit())
    }

    pub fn insert_terminal(&mut self, t: Term) -> bool {
        self.data.insert(t)
    }

    pub fn insert_eof(&mut self) -> bool {
        let bit = self.eof_bit();
        self.data.insert(bit)
    }

    pub fn insert_empty(&mut self) -> bool {
        let bit = self.empty_bit();
        self.data.insert(bit)
    }

    pub fn remove_empty(&mut self) -> bool {
        let bit = self.empty_bit();
        self.data.remove(bit)
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// union in another set; reports whether this set grew (the change bit
    /// every fixed-point loop keys off)
    pub fn union_with(&mut self, other: &TermSet) -> bool {
        let before = self.data.len();
        self.data.union_with(&other.data);
        self.data.len() != before
    }

    /// union in another set with its ε bit masked off
    pub fn union_without_empty(&mut self, other: &TermSet) -> bool {
        let mut bits = other.data.clone();
        bits.remove(other.empty_bit());
        let before = self.data.len();
        self.data.union_with(&bits);
        self.data.len() != before
    }

    /// members in ascending order: terminals by id, then EOF, then ε
    pub fn iter(&self) -> impl Iterator<Item = Symbol> + '_ {
        let eof = self.eof_bit();
        let empty = self.empty_bit();
        self.data.iter().map(move |bit| {
            if bit == eof {
                Symbol::Eof
            } else if bit == empty {
                Symbol::Empty
            } else {
                Symbol::Terminal(bit)
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_interns_names_once() {
        let mut b = GrammarBuilder::new();
        let c1 = b.terminal("c");
        let c2 = b.terminal("c");
        assert_eq!(c1, c2);
        let s1 = b.nonterminal("S");
        let s2 = b.symbol("S");
        assert_eq!(s1, s2);
        assert_eq!(b.symbol("d"), Symbol::Terminal(1));
    }

    #[test]
    fn builder_rejects_bad_productions() {
        let mut b = GrammarBuilder::new();
        let s = b.nonterminal("S");
        let c = b.terminal("c");
        assert_eq!(b.production(c, vec![c]), Err(GrammarError::TerminalLhs));
        assert_eq!(b.production(s, vec![]), Err(GrammarError::EmptyRhs));
        assert_eq!(
            b.production(s, vec![c, Symbol::Empty]),
            Err(GrammarError::MisplacedEmpty)
        );
        assert_eq!(
            b.production(s, vec![Symbol::Eof]),
            Err(GrammarError::EofInRhs)
        );
        assert!(b.production(s, vec![Symbol::Empty]).is_ok());
        assert_eq!(b.build(7).unwrap_err(), GrammarError::BadStart(7));
    }

    #[test]
    fn build_groups_productions_by_lhs() {
        let mut b = GrammarBuilder::new();
        let s = b.nonterminal("S");
        let c_nt = b.nonterminal("C");
        let c = b.terminal("c");
        let d = b.terminal("d");
        b.production(s, vec![c_nt, c_nt]).unwrap();
        b.production(c_nt, vec![c, c_nt]).unwrap();
        b.production(c_nt, vec![d]).unwrap();
        let g = b.build(0).unwrap();
        assert_eq!(g.rules_for(0), &[0]);
        assert_eq!(g.rules_for(1), &[1, 2]);
        assert_eq!(g.start_symbol(), 0);
        assert!(g.production(2).rhs == [d]);
    }

    #[test]
    fn term_set_tracks_growth() {
        let mut a = TermSet::new(3);
        assert!(a.insert_terminal(1));
        assert!(!a.insert_terminal(1));
        assert!(a.insert_eof());
        let mut b = TermSet::new(3);
        b.insert_terminal(1);
        b.insert_empty();
        assert!(a.union_with(&b));
        assert!(a.contains_empty());
        assert!(!a.union_with(&b));

        let mut c = TermSet::new(3);
        assert!(c.union_without_empty(&b));
        assert!(c.contains_terminal(1));
        assert!(!c.contains_empty());
    }

    #[test]
    fn term_set_iterates_in_order() {
        let mut s = TermSet::new(2);
        s.insert_empty();
        s.insert_eof();
        s.insert_terminal(0);
        let members: Vec<Symbol> = s.iter().collect();
        assert_eq!(members, vec![Symbol::Terminal(0), Symbol::Eof, Symbol::Empty]);
    }
}
