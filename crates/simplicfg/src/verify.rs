//! Structural invariant checker.
//!
//! [`verify`] reports the first violated invariant of a function:
//!
//! - the entry block exists, has no predecessors and holds no PHIs,
//! - every successor is a live block and every predecessor table lists
//!   exactly the incoming edges (one entry per edge),
//! - in reachable blocks, PHIs come first and cover exactly the block's
//!   distinct predecessors, and no operand refers to a deleted instruction,
//! - branch conditions are `i1`, switch cases are distinct and match the
//!   condition type, and weights have one slot per successor.

use crate::ir::{BlockId, Function, InstId, Terminator, Type, Value};
use anyhow::{bail, Result};
use std::collections::{BTreeMap, BTreeSet};

/// Blocks reachable from the entry.
fn reachable(func: &Function) -> BTreeSet<BlockId> {
    let mut seen = BTreeSet::new();
    let mut work = vec![func.entry()];
    while let Some(b) = work.pop() {
        if func.is_live(b) && seen.insert(b) {
            work.extend(func.succs(b));
        }
    }
    seen
}

fn check_operand(func: &Function, b: BlockId, v: Value) -> Result<()> {
    if let Value::Inst(def) = v {
        if func.inst_block(def).is_none() {
            bail!(
                "IR invariant violated: {} in @{} uses deleted instruction {def}",
                func.block_name(b),
                func.name
            );
        }
    }
    Ok(())
}

fn check_phi(func: &Function, b: BlockId, phi: InstId, preds: &[BlockId]) -> Result<()> {
    let mut domain: Vec<BlockId> = func.phi_incoming(phi).iter().map(|&(p, _)| p).collect();
    domain.sort();
    let before = domain.len();
    domain.dedup();
    if domain.len() != before {
        bail!(
            "IR invariant violated: phi {phi} in {} has duplicate incoming blocks",
            func.block_name(b)
        );
    }
    if domain != preds {
        bail!(
            "IR invariant violated: phi {phi} in {} covers {:?} but the predecessors are {:?}",
            func.block_name(b),
            domain,
            preds
        );
    }
    Ok(())
}

fn check_terminator(func: &Function, b: BlockId) -> Result<()> {
    let term = func.terminator(b);
    let mut result = Ok(());
    term.for_each_operand(|&v| {
        if result.is_ok() {
            result = check_operand(func, b, v);
        }
    });
    result?;

    match term {
        Terminator::CondBr { cond, .. } if func.value_type(*cond) != Type::I1 => {
            bail!("IR invariant violated: branch condition of {} is not i1", func.block_name(b));
        }
        Terminator::Switch {
            cond, cases, weights, ..
        } => {
            let ty = func.value_type(*cond);
            let mut values = BTreeSet::new();
            for case in cases {
                if case.value.ty() != ty {
                    bail!(
                        "IR invariant violated: switch in {} has a {} case on a {} condition",
                        func.block_name(b),
                        case.value.ty(),
                        ty
                    );
                }
                if !values.insert(case.value.as_u64()) {
                    bail!(
                        "IR invariant violated: switch in {} repeats case {}",
                        func.block_name(b),
                        case.value
                    );
                }
            }
            if let Some(w) = weights {
                if w.len() != cases.len() + 1 {
                    bail!(
                        "IR invariant violated: switch in {} has {} weights for {} successors",
                        func.block_name(b),
                        w.len(),
                        cases.len() + 1
                    );
                }
            }
        }
        _ => {}
    }
    Ok(())
}

/// Checks the structural invariants of `func`.
pub fn verify(func: &Function) -> Result<()> {
    let entry = func.entry();
    if !func.is_live(entry) {
        bail!("IR invariant violated: @{} has no entry block", func.name);
    }
    if !func.preds(entry).is_empty() {
        bail!(
            "IR invariant violated: entry block {} of @{} has predecessors",
            func.block_name(entry),
            func.name
        );
    }
    if let Some(&phi) = func.phis(entry).first() {
        bail!(
            "IR invariant violated: phi {phi} in the entry block {} of @{}",
            func.block_name(entry),
            func.name
        );
    }

    // Edges, as the terminators describe them.
    let mut incoming: BTreeMap<BlockId, Vec<BlockId>> = BTreeMap::new();
    for &b in func.layout() {
        for s in func.succs(b) {
            if !func.is_live(s) {
                bail!(
                    "IR invariant violated: {} branches to deleted block {s}",
                    func.block_name(b)
                );
            }
            incoming.entry(s).or_default().push(b);
        }
    }
    for &b in func.layout() {
        let mut have = func.preds(b).to_vec();
        have.sort();
        let mut want = incoming.remove(&b).unwrap_or_default();
        want.sort();
        if have != want {
            bail!(
                "IR invariant violated: predecessor table of {} is {:?} but the edges say {:?}",
                func.block_name(b),
                have,
                want
            );
        }
    }

    let live = reachable(func);
    for &b in func.layout() {
        for &i in func.insts(b) {
            if func.inst_block(i) != Some(b) {
                bail!(
                    "IR invariant violated: instruction {i} listed in {} belongs elsewhere",
                    func.block_name(b)
                );
            }
        }
        if !live.contains(&b) {
            continue;
        }

        let mut preds = func.unique_preds(b);
        preds.sort();
        let mut past_phis = false;
        for &i in func.insts(b) {
            let kind = func.kind(i);
            if kind.is_phi() {
                if past_phis {
                    bail!(
                        "IR invariant violated: phi {i} in {} follows a non-phi instruction",
                        func.block_name(b)
                    );
                }
                check_phi(func, b, i, &preds)?;
            } else {
                past_phis = true;
            }
            for v in kind.operands() {
                check_operand(func, b, v)?;
            }
        }
        check_terminator(func, b)?;
    }
    Ok(())
}

/// Panics with the first violated invariant.
pub fn assert_valid(func: &Function) {
    if let Err(e) = verify(func) {
        panic!("{e}\n{func}");
    }
}
