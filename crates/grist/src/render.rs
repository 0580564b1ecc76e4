//! Human-readable dumps of the analysis artifacts. Display-only: nothing
//! downstream parses these.

use std::fmt::Write;

use petgraph::graph::{DiGraph, Graph};

use crate::analysis::Analysis;
use crate::grammar::{Grammar, Symbol, TermSet};
use crate::lr::{goto, transition_symbols, Automaton, LRAction, LrError, LRTables};

pub fn render_term_set(grammar: &Grammar, set: &TermSet) -> String {
    let mut out = String::from("{");
    for (i, sym) in set.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push('\'');
        out.push_str(grammar.display_symbol(sym));
        out.push('\'');
    }
    out.push('}');
    out
}

pub fn render_grammar(grammar: &Grammar) -> String {
    let mut out = String::new();
    for (i, p) in grammar.productions().iter().enumerate() {
        let _ = write!(out, "{}: {} ->", i, grammar.nonterminal_name(p.lhs));
        for &sym in &p.rhs {
            let _ = write!(out, " {}", grammar.display_symbol(sym));
        }
        out.push('\n');
    }
    out
}

pub fn render_first(analysis: &Analysis) -> String {
    let grammar = analysis.grammar;
    let mut out = String::new();
    for nt in 0..grammar.n_nonterminals() {
        let set = match analysis.first.of_nonterminal(nt) {
            Ok(set) => set,
            Err(_) => continue,
        };
        let _ = writeln!(
            out,
            "first({}) = {}",
            grammar.nonterminal_name(nt),
            render_term_set(grammar, set)
        );
    }
    out
}

pub fn render_follow(analysis: &Analysis) -> String {
    let grammar = analysis.grammar;
    let mut out = String::new();
    for nt in 0..grammar.n_nonterminals() {
        let set = match analysis.follow.of(nt) {
            Ok(set) => set,
            Err(_) => continue,
        };
        let _ = writeln!(
            out,
            "follow({}) = {}",
            grammar.nonterminal_name(nt),
            render_term_set(grammar, set)
        );
    }
    out
}

/// per-state item listing, one block per state in id order
pub fn render_states(automaton: &Automaton, grammar: &Grammar) -> String {
    let mut out = String::new();
    for state in automaton.states() {
        match state.parent {
            Some(parent) => {
                let _ = writeln!(
                    out,
                    "--- state {} (shift '{}' from {}) ---",
                    state.id,
                    grammar.display_symbol(state.shift_symbol),
                    parent
                );
            }
            None => {
                let _ = writeln!(out, "--- state {} (initial) ---", state.id);
            }
        }
        for (core, la) in state.items.iter() {
            let p = grammar.production(core.production);
            let _ = write!(out, "  {} ->", grammar.nonterminal_name(p.lhs));
            for (i, &sym) in p.rhs.iter().enumerate() {
                if i == core.dot {
                    out.push_str(" .");
                }
                let _ = write!(out, " {}", grammar.display_symbol(sym));
            }
            if core.dot == p.rhs.len() {
                out.push_str(" .");
            }
            let _ = writeln!(out, ", {}", render_term_set(grammar, la));
        }
    }
    out
}

/// the classic fixed-width action/goto matrix: terminal columns then `$`,
/// then one goto column per nonterminal (the augmented start symbol is
/// omitted, a reduction can never produce it)
pub fn render_tables(tables: &LRTables, grammar: &Grammar) -> String {
    let mut out = String::new();

    let terminals: Vec<Symbol> = (0..grammar.n_terminals())
        .map(Symbol::Terminal)
        .chain([Symbol::Eof])
        .collect();
    let nonterminals: Vec<usize> = (0..grammar.n_nonterminals())
        .filter(|&nt| nt != grammar.start_symbol())
        .collect();

    let _ = write!(out, "{:>8}", "state");
    for &sym in &terminals {
        let _ = write!(out, "{:>8}", grammar.display_symbol(sym));
    }
    let _ = write!(out, " |");
    for &nt in &nonterminals {
        let _ = write!(out, "{:>8}", grammar.nonterminal_name(nt));
    }
    out.push('\n');

    for state in 0..tables.n_states() {
        let _ = write!(out, "{:>8}", state);
        for &sym in &terminals {
            let cell = match tables.action(state, sym) {
                Some(LRAction::Shift(target)) => format!("s{}", target),
                Some(LRAction::Reduce(production)) => format!("r{}", production),
                Some(LRAction::Accept) => "a".to_string(),
                None => String::new(),
            };
            let _ = write!(out, "{:>8}", cell);
        }
        let _ = write!(out, " |");
        for &nt in &nonterminals {
            match tables.goto(state, nt) {
                Some(target) => {
                    let _ = write!(out, "{:>8}", target);
                }
                None => {
                    let _ = write!(out, "{:>8}", "");
                }
            }
        }
        out.push('\n');
    }
    out
}

/// the GOTO automaton as a graph for `petgraph::dot::Dot` dumps; edges are
/// recomputed since the state graph stores none
pub fn automaton_graph(
    automaton: &Automaton,
    analysis: &Analysis,
) -> Result<Graph<String, String>, LrError> {
    let grammar = analysis.grammar;
    let mut graph = DiGraph::new();
    let nodes: Vec<_> = automaton
        .states()
        .iter()
        .map(|s| graph.add_node(format!("state {} ({} items)", s.id, s.items.len())))
        .collect();
    for state in automaton.states() {
        for sym in transition_symbols(grammar, &state.items) {
            let next = goto(analysis, &state.items, sym)?.ok_or(LrError::EmptyGoto(sym))?;
            let target = automaton.state_of(&next).ok_or(LrError::UnknownGotoState)?;
            graph.add_edge(
                nodes[state.id],
                nodes[target],
                grammar.display_symbol(sym).to_string(),
            );
        }
    }
    Ok(graph)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::Analysis;
    use crate::grammar::GrammarBuilder;
    use crate::lr::{Automaton, LRTables};

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

    #[test]
    fn set_and_grammar_dumps() {
        let g = cd_grammar();
        let analysis = Analysis::run(&g).unwrap();
        assert!(render_grammar(&g).contains("1: S -> C C"));
        assert!(render_first(&analysis).contains("first(C) = {'c', 'd'}"));
        assert!(render_follow(&analysis).contains("follow(C) = {'c', 'd', '$'}"));
    }

    #[test]
    fn state_dump_marks_the_dot() {
        let g = cd_grammar();
        let analysis = Analysis::run(&g).unwrap();
        let automaton = Automaton::build(&analysis).unwrap();
        let dump = render_states(&automaton, &g);
        assert!(dump.contains("--- state 0 (initial) ---"));
        assert!(dump.contains("S' -> . S, {'$'}"));
    }

    #[test]
    fn graph_mirrors_the_automaton() {
        let g = cd_grammar();
        let analysis = Analysis::run(&g).unwrap();
        let automaton = Automaton::build(&analysis).unwrap();
        let graph = automaton_graph(&automaton, &analysis).unwrap();
        assert_eq!(graph.node_count(), automaton.len());
        let expected_edges: usize = automaton
            .states()
            .iter()
            .map(|s| transition_symbols(&g, &s.items).len())
            .sum();
        assert_eq!(graph.edge_count(), expected_edges);
    }

    #[test]
    fn table_dump_has_a_row_per_state() {
        let g = cd_grammar();
        let tables = LRTables::from_grammar(&g).unwrap();
        let dump = render_tables(&tables, &g);
        // header + one row per state
        assert_eq!(dump.lines().count(), tables.n_states() + 1);
        // exactly one accept cell
        assert_eq!(dump.matches("       a").count(), 1);
    }
}
