//! A small hand parser for plain-BNF grammar descriptions.
//!
//! Rules are chunks separated by blank lines (a rule may span lines):
//!
//! ```text
//! S' ::= S
//!
//! S ::= C C
//!
//! C ::= c C | d
//! ```
//!
//! Whitespace delimits symbols; `|` separates alternatives and an empty
//! alternative denotes ε. Names appearing on a lhs are nonterminals,
//! everything else is a terminal. The first rule's first alternative is the
//! start production, so the grammar author writes the augmentation
//! themselves.

use std::collections::VecDeque;

use thiserror::Error;

use crate::grammar::{Grammar, GrammarBuilder, GrammarError, Symbol};

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BnfError {
    #[error("rule has no name")]
    MissingName,
    #[error("didn't see ::= delimiter")]
    MissingDelimiter,
    #[error("grammar description is empty")]
    Empty,
    #[error(transparent)]
    Grammar(#[from] GrammarError),
}

struct RawRule<'a> {
    name: &'a str,
    alternatives: Vec<Vec<&'a str>>,
}

fn parse_rule(chunk: &str) -> Result<RawRule<'_>, BnfError> {
    let mut toks: VecDeque<&str> = chunk.split_whitespace().collect();
    let name = toks.pop_front().ok_or(BnfError::MissingName)?;
    if toks.pop_front() != Some("::=") {
        return Err(BnfError::MissingDelimiter);
    }
    let mut alternatives: Vec<Vec<&str>> = vec![Vec::new()];
    for tok in toks {
        if tok == "|" {
            alternatives.push(Vec::new());
        } else {
            alternatives.last_mut().expect("never empty").push(tok);
        }
    }
    Ok(RawRule { name, alternatives })
}

pub fn grammar_from_bnf(input: &str) -> Result<Grammar, BnfError> {
    // windows :sob:
    let chunks = input.split("\r\n\r\n").flat_map(|s| s.split("\n\n"));

    let mut rules: Vec<RawRule> = Vec::new();
    for chunk in chunks {
        if chunk.trim().is_empty() {
            continue;
        }
        rules.push(parse_rule(chunk)?);
    }
    if rules.is_empty() {
        return Err(BnfError::Empty);
    }

    let mut builder = GrammarBuilder::new();
    // pass 1: every lhs name is a nonterminal - rules are order invariant
    for rule in &rules {
        builder.nonterminal(rule.name);
    }
    // pass 2: resolve rhs names and build productions
    for rule in &rules {
        let lhs = builder.nonterminal(rule.name);
        for alt in &rule.alternatives {
            let rhs = if alt.is_empty() {
                vec![Symbol::Empty]
            } else {
                alt.iter().map(|name| builder.symbol(name)).collect()
            };
            builder.production(lhs, rhs)?;
        }
    }
    Ok(builder.build(0)?)
}
