pub mod analysis;
pub mod bnf;
pub mod grammar;
pub mod lr;
pub mod render;

pub use analysis::{Analysis, AnalysisError, FirstSets, FollowSets};
pub use grammar::{Grammar, GrammarBuilder, GrammarError, Production, Symbol, TermSet};
pub use lr::{Automaton, Conflict, ItemCore, ItemSet, LRAction, LRTables, LrError, State, StateId};
