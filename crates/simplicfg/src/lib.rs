//! simplicfg — control-flow graph simplification.
//!
//! This crate provides a catalogue of local CFG rewrites (branch folding,
//! block merging, hoisting, sinking, speculation, switch lowering) over a
//! small SSA IR, a per-block fixpoint driver and a whole-function pipeline.

pub mod interp;
pub mod ir;
pub mod oracle;
pub mod pipeline;
pub mod simplify;
pub mod verify;

// Re-export key types for convenience
pub use anyhow::{Context, Result};
pub use ir::{parse_function, Function};
pub use oracle::{CostOracle, DomOracle, DominatorTree, TargetCostModel};
pub use pipeline::{simplify_function, PipelineStats};
pub use simplify::{simplify, simplify_with_stats, FoldPriority, SimplifyOptions, SimplifyStats};

/// Simplify a function given in textual form.
///
/// Parses `source`, runs [`simplify_function`] with the default target cost
/// model, checks the result and returns it printed back to text together
/// with what fired.
///
/// # Example
/// ```
/// use simplicfg::{simplify_text, SimplifyOptions};
///
/// let source = "
/// func @f(i1 %c) -> i32 {
/// entry:
///   br %c, label %a, label %a
/// a:
///   ret i32 7
/// }
/// ";
/// let (text, _) = simplify_text(source, &SimplifyOptions::default()).unwrap();
/// assert!(!text.contains("br "));
/// ```
pub fn simplify_text(source: &str, options: &SimplifyOptions) -> Result<(String, PipelineStats)> {
    let mut func = parse_function(source).context("failed to parse function")?;
    verify::verify(&func).context("input is not well formed")?;

    let stats = simplify_function(&mut func, &TargetCostModel, None, options);
    verify::verify(&func).context("simplification broke an invariant")?;

    Ok((func.to_string(), stats))
}
