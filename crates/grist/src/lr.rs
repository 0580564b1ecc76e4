use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use serde_binary::binary_stream::Endian;
use thiserror::Error;

use crate::analysis::{Analysis, AnalysisError};
use crate::grammar::{Grammar, Symbol, TermSet, NT};

pub type StateId = usize;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum LrError {
    #[error("seed item for production {production} (dot {dot}) has an empty lookahead set")]
    EmptySeedLookahead { production: usize, dot: usize },
    #[error("goto over {0:?} produced no items")]
    EmptyGoto(Symbol),
    #[error("goto target is not a known state")]
    UnknownGotoState,
    #[error(transparent)]
    Analysis(#[from] AnalysisError),
}

/// An LR(1) item minus its lookahead set: a production (by index into the
/// grammar's production list) and a dot position in `[0, rhs.len()]`.
/// Items deduplicate on this key; lookaheads merge.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemCore {
    pub production: usize,
    pub dot: usize,
}

/// A deduplicated set of LR(1) items keyed by `(production, dot)` with the
/// merged lookahead as the value. Two states are the same state iff these
/// maps are equal, lookaheads included.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ItemSet {
    items: BTreeMap<ItemCore, TermSet>,
}

impl ItemSet {
    pub fn new() -> ItemSet {
        ItemSet::default()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (ItemCore, &TermSet)> + '_ {
        self.items.iter().map(|(&core, la)| (core, la))
    }

    pub fn lookahead(&self, core: ItemCore) -> Option<&TermSet> {
        self.items.get(&core)
    }

    /// insert-or-merge; reports whether the set changed (new item, or an
    /// existing item's lookahead grew)
    pub fn merge(&mut self, core: ItemCore, lookahead: TermSet) -> bool {
        match self.items.entry(core) {
            Entry::Vacant(e) => {
                e.insert(lookahead);
                true
            }
            Entry::Occupied(mut e) => e.get_mut().union_with(&lookahead),
        }
    }
}

/// lookahead for items predicted from `B` given the symbols after `B` in the
/// predicting item's rhs and that item's own lookahead
fn predicted_lookahead(
    analysis: &Analysis,
    trailing: &[Symbol],
    item_la: &TermSet,
) -> Result<TermSet, LrError> {
    if trailing.is_empty() {
        return Ok(item_la.clone());
    }
    let mut la = TermSet::new(analysis.grammar.n_terminals());
    let mut exhausted = true;
    for &sym in trailing {
        match sym {
            Symbol::Terminal(t) => {
                la.insert_terminal(t);
                exhausted = false;
                break;
            }
            Symbol::Eof => {
                la.insert_eof();
                exhausted = false;
                break;
            }
            Symbol::Empty => {}
            Symbol::Nonterminal(nt) => {
                la.union_without_empty(analysis.first.of_nonterminal(nt)?);
                if !analysis.first.nullable(sym) {
                    exhausted = false;
                    break;
                }
            }
        }
    }
    if exhausted {
        // every trailing symbol was nullable: the item's own lookahead
        // spills through
        la.union_without_empty(item_la);
    }
    Ok(la)
}

/// Closure of an item set: expand every nonterminal after a dot until a full
/// pass adds no item and grows no lookahead. Lookaheads only grow, which is
/// what makes this terminate.
pub fn closure(analysis: &Analysis, mut set: ItemSet) -> Result<ItemSet, LrError> {
    for (core, la) in set.iter() {
        if la.is_empty() {
            return Err(LrError::EmptySeedLookahead {
                production: core.production,
                dot: core.dot,
            });
        }
    }
    let grammar = analysis.grammar;
    loop {
        let mut pending: Vec<(ItemCore, TermSet)> = Vec::new();
        for (core, la) in set.iter() {
            let prod = grammar.production(core.production);
            let Some(&sym) = prod.rhs.get(core.dot) else {
                continue;
            };
            let Symbol::Nonterminal(b) = sym else {
                continue;
            };
            let new_la = predicted_lookahead(analysis, &prod.rhs[core.dot + 1..], la)?;
            for &rule in grammar.rules_for(b) {
                pending.push((
                    ItemCore {
                        production: rule,
                        dot: 0,
                    },
                    new_la.clone(),
                ));
            }
        }
        let mut changed = false;
        for (core, la) in pending {
            changed |= set.merge(core, la);
        }
        if !changed {
            break;
        }
    }
    Ok(set)
}

/// symbols that appear after a dot somewhere in the set (ε is never a
/// transition; EOF cannot occur in an rhs)
pub(crate) fn transition_symbols(grammar: &Grammar, items: &ItemSet) -> BTreeSet<Symbol> {
    let mut symbols = BTreeSet::new();
    for (core, _) in items.iter() {
        if let Some(&sym) = grammar.production(core.production).rhs.get(core.dot) {
            if sym != Symbol::Empty {
                symbols.insert(sym);
            }
        }
    }
    symbols
}

/// GOTO: advance every item whose post-dot symbol matches, then close.
/// `None` when no item matches.
pub fn goto(analysis: &Analysis, items: &ItemSet, symbol: Symbol) -> Result<Option<ItemSet>, LrError> {
    if matches!(symbol, Symbol::Empty | Symbol::Eof) {
        return Ok(None);
    }
    let grammar = analysis.grammar;
    let mut advanced = ItemSet::new();
    for (core, la) in items.iter() {
        if grammar.production(core.production).rhs.get(core.dot) == Some(&symbol) {
            advanced.merge(
                ItemCore {
                    production: core.production,
                    dot: core.dot + 1,
                },
                la.clone(),
            );
        }
    }
    if advanced.is_empty() {
        return Ok(None);
    }
    closure(analysis, advanced).map(Some)
}

/// One state of the canonical collection: the closed item set, the symbol
/// shifted to reach it (EOF sentinel for the initial state), its id and the
/// id of the state it was first discovered from.
#[derive(Clone, Debug)]
pub struct State {
    pub items: ItemSet,
    pub shift_symbol: Symbol,
    pub id: StateId,
    pub parent: Option<StateId>,
}

/// The canonical collection of LR(1) states. Edges are not stored; they are
/// recomputed on demand by re-running GOTO and looking the result up in the
/// item-set index.
#[derive(Debug)]
pub struct Automaton {
    states: Vec<State>,
    index: HashMap<ItemSet, StateId>,
}

impl Automaton {
    pub fn build(analysis: &Analysis) -> Result<Automaton, LrError> {
        let grammar = analysis.grammar;
        let mut eof = TermSet::new(grammar.n_terminals());
        eof.insert_eof();
        let mut seed = ItemSet::new();
        seed.merge(
            ItemCore {
                production: grammar.start(),
                dot: 0,
            },
            eof,
        );
        let initial = closure(analysis, seed)?;

        let mut automaton = Automaton {
            states: Vec::new(),
            index: HashMap::new(),
        };
        automaton.index.insert(initial.clone(), 0);
        automaton.states.push(State {
            items: initial,
            shift_symbol: Symbol::Eof,
            id: 0,
            parent: None,
        });

        let mut worklist: Vec<StateId> = vec![0];
        while let Some(id) = worklist.pop() {
            let items = automaton.states[id].items.clone();
            for sym in transition_symbols(grammar, &items) {
                let Some(next) = goto(analysis, &items, sym)? else {
                    continue;
                };
                if automaton.index.contains_key(&next) {
                    continue;
                }
                let next_id = automaton.states.len();
                automaton.index.insert(next.clone(), next_id);
                automaton.states.push(State {
                    items: next,
                    shift_symbol: sym,
                    id: next_id,
                    parent: Some(id),
                });
                worklist.push(next_id);
            }
        }
        Ok(automaton)
    }

    pub fn states(&self) -> &[State] {
        &self.states
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    /// id of the state with exactly this item set
    pub fn state_of(&self, items: &ItemSet) -> Option<StateId> {
        self.index.get(items).copied()
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LRAction {
    Shift(StateId),
    /// reduce by the production at this index in the grammar's list
    Reduce(usize),
    Accept,
}

/// A `(state, terminal)` cell that was written twice with different actions.
/// The table keeps the first write; the rest land here.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub state: StateId,
    pub symbol: Symbol,
    pub kept: LRAction,
    pub dropped: LRAction,
}

// states = rows; action columns are terminals in id order with EOF last,
// goto columns are nonterminals in id order
#[derive(Debug, PartialEq, Eq)]
pub struct LRTables {
    n_states: usize,
    n_terminals: usize,
    n_nonterminals: usize,
    action: Vec<Option<LRAction>>,
    goto: Vec<Option<StateId>>,
    conflicts: Vec<Conflict>,
}

impl LRTables {
    pub fn from_automaton(automaton: &Automaton, analysis: &Analysis) -> Result<LRTables, LrError> {
        let grammar = analysis.grammar;
        let n_states = automaton.len();
        let n_terminals = grammar.n_terminals();
        let n_nonterminals = grammar.n_nonterminals();
        let mut tables = LRTables {
            n_states,
            n_terminals,
            n_nonterminals,
            action: vec![None; n_states * (n_terminals + 1)],
            goto: vec![None; n_states * n_nonterminals],
            conflicts: Vec::new(),
        };

        for state in automaton.states() {
            // one GOTO per transition symbol, shared by every item that
            // proposes a move over it
            let mut targets: BTreeMap<Symbol, StateId> = BTreeMap::new();
            for sym in transition_symbols(grammar, &state.items) {
                let next = goto(analysis, &state.items, sym)?.ok_or(LrError::EmptyGoto(sym))?;
                let target = automaton.state_of(&next).ok_or(LrError::UnknownGotoState)?;
                targets.insert(sym, target);
            }

            for (core, la) in state.items.iter() {
                let prod = grammar.production(core.production);
                let at_end = core.dot == prod.rhs.len();
                if at_end
                    && core.production == grammar.start()
                    && la.len() == 1
                    && la.contains_eof()
                {
                    tables.set_action(state.id, Symbol::Eof, LRAction::Accept);
                } else if at_end || prod.is_epsilon() {
                    // ε-productions reduce without the dot ever moving
                    for sym in la.iter() {
                        tables.set_action(state.id, sym, LRAction::Reduce(core.production));
                    }
                } else {
                    let sym = prod.rhs[core.dot];
                    let target = targets
                        .get(&sym)
                        .copied()
                        .ok_or(LrError::EmptyGoto(sym))?;
                    match sym {
                        Symbol::Terminal(_) => {
                            tables.set_action(state.id, sym, LRAction::Shift(target));
                        }
                        Symbol::Nonterminal(nt) => {
                            tables.set_goto(state.id, nt, target);
                        }
                        // the builder rejects ε and EOF in these positions
                        Symbol::Empty | Symbol::Eof => {}
                    }
                }
            }
        }
        Ok(tables)
    }

    /// the whole pipeline in the required order: FIRST, FOLLOW, canonical
    /// collection, tables
    pub fn from_grammar(grammar: &Grammar) -> Result<LRTables, LrError> {
        let analysis = Analysis::run(grammar)?;
        let automaton = Automaton::build(&analysis)?;
        LRTables::from_automaton(&automaton, &analysis)
    }

    fn action_column(&self, symbol: Symbol) -> Option<usize> {
        match symbol {
            Symbol::Terminal(t) => Some(t),
            Symbol::Eof => Some(self.n_terminals),
            Symbol::Nonterminal(_) | Symbol::Empty => None,
        }
    }

    // first write wins; an identical rewrite is fine, a different one is a
    // grammar-ambiguity symptom and gets recorded
    fn set_action(&mut self, state: StateId, symbol: Symbol, action: LRAction) {
        let Some(col) = self.action_column(symbol) else {
            return;
        };
        let cell = &mut self.action[state * (self.n_terminals + 1) + col];
        match *cell {
            None => *cell = Some(action),
            Some(existing) if existing == action => {}
            Some(existing) => self.conflicts.push(Conflict {
                state,
                symbol,
                kept: existing,
                dropped: action,
            }),
        }
    }

    fn set_goto(&mut self, state: StateId, nt: NT, target: StateId) {
        let cell = &mut self.goto[state * self.n_nonterminals + nt];
        match *cell {
            None => *cell = Some(target),
            Some(existing) if existing == target => {}
            Some(existing) => self.conflicts.push(Conflict {
                state,
                symbol: Symbol::Nonterminal(nt),
                kept: LRAction::Shift(existing),
                dropped: LRAction::Shift(target),
            }),
        }
    }

    pub fn n_states(&self) -> usize {
        self.n_states
    }

    pub fn action(&self, state: StateId, symbol: Symbol) -> Option<LRAction> {
        let col = self.action_column(symbol)?;
        self.action[state * (self.n_terminals + 1) + col]
    }

    pub fn goto(&self, state: StateId, nt: NT) -> Option<StateId> {
        self.goto[state * self.n_nonterminals + nt]
    }

    pub fn conflicts(&self) -> &[Conflict] {
        &self.conflicts
    }

    /// serialize the finished tables into the binary artifact format
    pub fn compile(&self) -> Result<Vec<u8>, serde_binary::Error> {
        let flat = CompiledTables {
            n_states: self.n_states as u64,
            n_terminals: self.n_terminals as u64,
            n_nonterminals: self.n_nonterminals as u64,
            action: self.action.iter().map(|&cell| encode_action(cell)).collect(),
            goto: self
                .goto
                .iter()
                .map(|&cell| cell.map_or(EMPTY_CELL, |s| s as i64))
                .collect(),
            conflict_states: self.conflicts.iter().map(|c| c.state as u64).collect(),
            conflict_symbols: self.conflicts.iter().map(|c| encode_symbol(c.symbol)).collect(),
            conflict_kept: self
                .conflicts
                .iter()
                .map(|c| encode_action(Some(c.kept)))
                .collect(),
            conflict_dropped: self
                .conflicts
                .iter()
                .map(|c| encode_action(Some(c.dropped)))
                .collect(),
        };
        serde_binary::to_vec(&flat, Endian::Little)
    }

    pub fn from_compiled(bytes: &[u8]) -> Result<LRTables, serde_binary::Error> {
        use serde::de::Error as _;

        let flat: CompiledTables = serde_binary::from_slice(bytes, Endian::Little)?;
        let n_states = flat.n_states as usize;
        let n_terminals = flat.n_terminals as usize;
        let n_nonterminals = flat.n_nonterminals as usize;
        let n_conflicts = flat.conflict_states.len();
        if flat.action.len() != n_states * (n_terminals + 1)
            || flat.goto.len() != n_states * n_nonterminals
            || flat.conflict_symbols.len() != n_conflicts
            || flat.conflict_kept.len() != n_conflicts
            || flat.conflict_dropped.len() != n_conflicts
        {
            return Err(serde_binary::Error::custom(
                "table artifact dimensions are inconsistent",
            ));
        }
        let mut conflicts = Vec::with_capacity(n_conflicts);
        for i in 0..n_conflicts {
            let kept = decode_action(flat.conflict_kept[i])
                .ok_or_else(|| serde_binary::Error::custom("conflict with an empty kept action"))?;
            let dropped = decode_action(flat.conflict_dropped[i]).ok_or_else(|| {
                serde_binary::Error::custom("conflict with an empty dropped action")
            })?;
            conflicts.push(Conflict {
                state: flat.conflict_states[i] as StateId,
                symbol: decode_symbol(flat.conflict_symbols[i]),
                kept,
                dropped,
            });
        }
        Ok(LRTables {
            n_states,
            n_terminals,
            n_nonterminals,
            action: flat.action.iter().map(|&raw| decode_action(raw)).collect(),
            goto: flat
                .goto
                .iter()
                .map(|&raw| (raw != EMPTY_CELL).then_some(raw as StateId))
                .collect(),
            conflicts,
        })
    }
}

// The on-disk form packs every cell into one i64, the way a scanner table
// keeps -1 for an invalid transition. The serde layer mis-decodes a vector
// of optional enums that is not a struct's final field, so the artifact
// never stores one.
#[derive(Serialize, Deserialize)]
struct CompiledTables {
    n_states: u64,
    n_terminals: u64,
    n_nonterminals: u64,
    action: Vec<i64>,
    goto: Vec<i64>,
    conflict_states: Vec<u64>,
    conflict_symbols: Vec<i64>,
    conflict_kept: Vec<i64>,
    conflict_dropped: Vec<i64>,
}

const EMPTY_CELL: i64 = -1;

// -1 = empty, 0 = accept, s + 1 = shift s, -(p + 2) = reduce p
fn encode_action(cell: Option<LRAction>) -> i64 {
    match cell {
        None => EMPTY_CELL,
        Some(LRAction::Accept) => 0,
        Some(LRAction::Shift(s)) => s as i64 + 1,
        Some(LRAction::Reduce(p)) => -(p as i64) - 2,
    }
}

fn decode_action(raw: i64) -> Option<LRAction> {
    match raw {
        EMPTY_CELL => None,
        0 => Some(LRAction::Accept),
        s if s > 0 => Some(LRAction::Shift((s - 1) as StateId)),
        p => Some(LRAction::Reduce((-(p + 2)) as usize)),
    }
}

// 0 = $, t + 1 = terminal t, -(n + 1) = nonterminal n; ε never labels a
// table column so it never reaches a conflict record
fn encode_symbol(symbol: Symbol) -> i64 {
    match symbol {
        Symbol::Eof => 0,
        Symbol::Terminal(t) => t as i64 + 1,
        Symbol::Nonterminal(n) => -(n as i64) - 1,
        Symbol::Empty => i64::MIN,
    }
}

fn decode_symbol(raw: i64) -> Symbol {
    match raw {
        0 => Symbol::Eof,
        t if t > 0 => Symbol::Terminal((t - 1) as usize),
        n => Symbol::Nonterminal((-(n + 1)) as NT),
    }
}
