use anyhow::{bail, Context, Result};
use clap::{Parser, ValueEnum};
use simplicfg::verify::verify;
use simplicfg::{
    parse_function, simplify_function, DomOracle, DominatorTree, FoldPriority, SimplifyOptions,
    TargetCostModel,
};
use std::collections::BTreeSet;
use std::fs;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum Priority {
    /// Thread and merge equality comparisons first
    ValueComparison,
    /// Combine conditions into a common destination first
    CommonDestination,
}

impl From<Priority> for FoldPriority {
    fn from(p: Priority) -> Self {
        match p {
            Priority::ValueComparison => FoldPriority::ValueComparisonFirst,
            Priority::CommonDestination => FoldPriority::CommonDestinationFirst,
        }
    }
}

/// simplicfg — control-flow graph simplifier for a textual SSA IR.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Input function (.cfg)
    input: PathBuf,

    /// Output file for the simplified function
    #[arg(long, short)]
    output: Option<PathBuf>,

    /// Do not hoist common code out of branch arms
    #[arg(long)]
    no_hoisting: bool,

    /// Do not sink common code into successors
    #[arg(long)]
    no_sinking: bool,

    /// Do not turn switches into lookup tables
    #[arg(long)]
    no_lookup_tables: bool,

    /// Do not speculate stores
    #[arg(long)]
    no_speculate_stores: bool,

    /// Do not merge paired conditional stores
    #[arg(long)]
    no_merge_conditional_stores: bool,

    /// Fold return blocks into their unconditional predecessors
    #[arg(long)]
    duplicate_returns: bool,

    /// Instructions the common-destination fold may duplicate
    #[arg(long, default_value_t = 1)]
    bonus_instruction_budget: u32,

    /// Cost budget for speculating one branch arm
    #[arg(long, default_value_t = 2)]
    phi_folding_threshold: u32,

    /// Cost budget for turning a diamond into selects
    #[arg(long, default_value_t = 4)]
    two_entry_phi_folding_threshold: u32,

    /// Which overlapping branch fold is tried first
    #[arg(long, value_enum, default_value_t = Priority::ValueComparison)]
    fold_priority: Priority,

    /// Block that must survive empty-block forwarding (repeatable)
    #[arg(long = "loop-header", value_name = "BLOCK")]
    loop_headers: Vec<String>,

    /// Keep a dominator tree up to date and check it afterwards
    #[arg(long)]
    preserve_dominators: bool,

    /// Check IR invariants before and after simplification
    #[arg(long)]
    verify: bool,

    /// Print rule firing counts to stderr
    #[arg(long)]
    stats: bool,
}

impl Cli {
    fn options(&self) -> SimplifyOptions {
        SimplifyOptions {
            enable_hoisting: !self.no_hoisting,
            enable_sinking: !self.no_sinking,
            enable_lookup_tables: !self.no_lookup_tables,
            speculate_stores: !self.no_speculate_stores,
            merge_conditional_stores: !self.no_merge_conditional_stores,
            duplicate_returns: self.duplicate_returns,
            bonus_instruction_budget: self.bonus_instruction_budget,
            phi_folding_threshold: self.phi_folding_threshold,
            two_entry_phi_folding_threshold: self.two_entry_phi_folding_threshold,
            fold_priority: self.fold_priority.into(),
            require_dominator_preservation: self.preserve_dominators,
            ..SimplifyOptions::default()
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("SIMPLICFG_LOG").unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    eprintln!("simplicfg: simplifying {}", cli.input.display());

    let source = fs::read_to_string(&cli.input)
        .with_context(|| format!("failed to read {}", cli.input.display()))?;
    let mut func = parse_function(&source)
        .with_context(|| format!("failed to parse {}", cli.input.display()))?;
    if cli.verify {
        verify(&func).context("input failed verification")?;
    }

    let mut options = cli.options();
    if !cli.loop_headers.is_empty() {
        let mut hints = BTreeSet::new();
        for name in &cli.loop_headers {
            match func.block_by_name(name) {
                Some(b) => {
                    hints.insert(b);
                }
                None => bail!("no block named {name} in @{}", func.name),
            }
        }
        options.loop_header_hints = Some(hints);
    }

    let mut dt = cli.preserve_dominators.then(|| DominatorTree::new(&func));
    let stats = match dt.as_mut() {
        Some(dt) => {
            let dom: &mut dyn DomOracle = dt;
            simplify_function(&mut func, &TargetCostModel, Some(dom), &options)
        }
        None => simplify_function(&mut func, &TargetCostModel, None, &options),
    };

    if cli.verify {
        verify(&func).context("simplified function failed verification")?;
    }
    if let Some(dt) = &dt {
        if !dt.is_consistent_with(&func) {
            bail!("dominator tree diverged from @{}", func.name);
        }
    }
    if cli.stats {
        eprint!("{stats}");
    }

    let text = func.to_string();
    if let Some(output_path) = cli.output {
        fs::write(&output_path, &text)
            .with_context(|| format!("failed to write {}", output_path.display()))?;
        eprintln!("simplicfg: wrote {}", output_path.display());
    } else {
        print!("{}", text);
    }

    eprintln!("simplicfg: simplification complete");
    Ok(())
}
