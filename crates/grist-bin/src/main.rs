use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use petgraph::dot::Dot;

use grist::bnf::grammar_from_bnf;
use grist::render;
use grist::{Analysis, Automaton, LRTables};

/// Generate canonical LR(1) action/goto tables from a BNF grammar
/// description.
#[derive(Parser)]
struct Args {
    /// grammar description file (first rule is the augmented start rule)
    grammar: PathBuf,
    /// dump the canonical collection of item sets
    #[arg(long)]
    states: bool,
    /// print the GOTO automaton as Graphviz dot
    #[arg(long)]
    dot: bool,
    /// write the compiled table artifact to this path
    #[arg(long)]
    emit: Option<PathBuf>,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let text = fs::read_to_string(&args.grammar)
        .with_context(|| format!("reading {}", args.grammar.display()))?;
    let grammar = grammar_from_bnf(&text)?;
    let analysis = Analysis::run(&grammar)?;

    println!("{}", render::render_grammar(&grammar));
    println!("{}", render::render_first(&analysis));
    println!("{}", render::render_follow(&analysis));

    let automaton = Automaton::build(&analysis)?;
    if args.states {
        println!("{}", render::render_states(&automaton, &grammar));
    }

    let tables = LRTables::from_automaton(&automaton, &analysis)?;
    println!("{}", render::render_tables(&tables, &grammar));
    for conflict in tables.conflicts() {
        println!(
            "conflict: state {}, symbol '{}': kept {:?}, dropped {:?}",
            conflict.state,
            grammar.display_symbol(conflict.symbol),
            conflict.kept,
            conflict.dropped
        );
    }

    if args.dot {
        let graph = render::automaton_graph(&automaton, &analysis)?;
        println!("{:?}", Dot::new(&graph));
    }

    if let Some(path) = args.emit {
        let bytes = tables.compile().context("serializing tables")?;
        fs::write(&path, &bytes).with_context(|| format!("writing {}", path.display()))?;
        println!("Wrote {}, {} bytes", path.display(), bytes.len());
    }

    Ok(())
}
