//! Sinking of common trailing code from predecessors.
//!
//! When several predecessors of `B` end in `br B` after the same sequence of
//! operations, those operations are moved into `B` once, with PHIs for the
//! operands that differ:
//!
//! ```text
//!   a: %x1 = add %p, 1      b: %x2 = add %q, 1
//!      br B                    br B
//!   B: %r = phi [%x1, a], [%x2, b]
//!
//!   B: %p.sink = phi [%p, a], [%q, b]
//!      %x1 = add %p.sink, 1
//! ```
//!
//! Instructions are compared in lockstep from the end of each predecessor,
//! debug markers skipped. Each sunk instruction may cost at most one new PHI
//! (values that are themselves sunk do not count). When `B` also has
//! predecessors that do not branch unconditionally, the unconditional ones
//! are first routed through a new `.sink.split` block, and only if at least
//! one sunk instruction could not have been speculated.

use super::utils::{split_block_predecessors, value_name};
use super::Cx;
use crate::ir::{BlockId, Function, InstId, InstKind, Terminator, Type, User, Value};
use std::collections::HashSet;
use tracing::trace;

/// One lockstep row: the k-th instruction from the end of every predecessor,
/// and per instruction the operands that will need a PHI.
struct Row {
    insts: Vec<InstId>,
    phi_operands: Vec<Vec<Value>>,
}

fn non_debug_users(func: &Function, i: InstId) -> Vec<User> {
    func.users(Value::Inst(i))
        .into_iter()
        .filter(|u| !matches!(u, User::Inst(d) if func.kind(*d).is_debug()))
        .collect()
}

/// Checks one row; returns the operands needing PHIs when it can be sunk.
fn can_sink(func: &Function, succ: BlockId, insts: &[InstId]) -> Option<Vec<Vec<Value>>> {
    let i0 = insts[0];
    let has_use = !non_debug_users(func, i0).is_empty();
    for &i in insts {
        let data = func.inst(i);
        if data.kind.is_phi() || data.kind.is_eh_pad() || data.ty == Type::Token {
            return None;
        }
        if let InstKind::Call { flags, .. } = &data.kind {
            if flags.musttail || flags.nomerge {
                return None;
            }
        }
        // One user reading the value once, or no user at all.
        let users = non_debug_users(func, i).len();
        let slots = func.use_count(Value::Inst(i)) - debug_use_count(func, i);
        if slots != users || (has_use && users != 1) || (!has_use && users != 0) {
            return None;
        }
        if !data.kind.same_operation_as(func.kind(i0)) || data.ty != func.inst(i0).ty {
            return None;
        }
    }

    if has_use {
        // Either every instruction feeds the same PHI of the successor, or
        // every one is used by a later instruction of its own block, which
        // is sunk first.
        let mut common_phi = None;
        let mut same_block = 0;
        for &i in insts {
            let block = func.inst_block(i)?;
            let User::Inst(user) = non_debug_users(func, i)[0] else {
                return None;
            };
            if func.inst_block(user) == Some(block) && !func.kind(user).is_phi() {
                same_block += 1;
            } else if func.kind(user).is_phi()
                && func.inst_block(user) == Some(succ)
                && func.phi_value(user, block) == Some(Value::Inst(i))
            {
                if *common_phi.get_or_insert(user) != user {
                    return None;
                }
            } else {
                return None;
            }
        }
        if same_block != 0 && same_block != insts.len() {
            return None;
        }
    }

    let operands: Vec<Vec<Value>> = insts.iter().map(|&i| func.kind(i).operands()).collect();
    let mut phi_operands = vec![Vec::new(); insts.len()];
    for slot in 0..operands[0].len() {
        let first = operands[0][slot];
        if func.value_type(first) == Type::Token {
            return None;
        }
        if operands.iter().all(|ops| ops[slot] == first) {
            continue;
        }
        for (j, ops) in operands.iter().enumerate() {
            phi_operands[j].push(ops[slot]);
        }
    }
    Some(phi_operands)
}

fn debug_use_count(func: &Function, i: InstId) -> usize {
    func.users(Value::Inst(i))
        .into_iter()
        .filter(|u| matches!(u, User::Inst(d) if func.kind(*d).is_debug()))
        .count()
}

/// Number of leading rows that each need at most one new PHI, given that
/// values sunk by those rows need none.
fn profitable_prefix(rows: &[Row], npreds: usize) -> usize {
    let mut scan = rows.len();
    loop {
        let sunk: HashSet<InstId> = rows[..scan]
            .iter()
            .flat_map(|r| r.insts.iter().copied())
            .collect();
        let too_many_phis = |row: &Row| {
            let values = row
                .phi_operands
                .iter()
                .flatten()
                .filter(|v| !v.as_inst().is_some_and(|i| sunk.contains(&i)))
                .count();
            values.div_ceil(npreds) > 1
        };
        match rows[..scan].iter().position(too_many_phis) {
            Some(k) => scan = k,
            None => return scan,
        }
    }
}

/// Moves the last row into `dest`: the first instruction is kept, with PHIs
/// for operands that differ, and replaces the PHI that merged the row.
fn sink_row(func: &mut Function, dest: BlockId, blocks: &[BlockId], insts: &[InstId]) {
    let i0 = insts[0];
    let operands: Vec<Vec<Value>> = insts.iter().map(|&i| func.kind(i).operands()).collect();
    for slot in 0..operands[0].len() {
        let first = operands[0][slot];
        if operands.iter().all(|ops| ops[slot] == first) {
            continue;
        }
        let ty = func.value_type(first);
        let incoming = blocks.iter().copied().zip(operands.iter().map(|ops| ops[slot])).collect();
        let phi = func.insert_phi(dest, ty, incoming);
        func.set_inst_name(phi, format!("{}.sink", value_name(func, first)));
        func.inst_mut(i0).kind.set_operand(slot, Value::Inst(phi));
    }

    // Debug markers left behind in the predecessors lose their operand.
    for &i in insts {
        let ty = func.inst(i).ty;
        for u in func.users(Value::Inst(i)) {
            if let User::Inst(d) = u {
                if func.kind(d).is_debug() {
                    func.inst_mut(d).kind.set_operand(0, Value::Undef(ty));
                }
            }
        }
    }

    let pos = func.phis(dest).len();
    func.move_inst(i0, dest, pos);
    let merged = non_debug_users(func, i0).into_iter().find_map(|u| match u {
        User::Inst(p) if func.kind(p).is_phi() && func.inst_block(p) == Some(dest) => Some(p),
        _ => None,
    });
    if let Some(phi) = merged {
        func.replace_inst(phi, Value::Inst(i0));
    }
    for &i in &insts[1..] {
        let ty = func.inst(i).ty;
        func.replace_inst(i, Value::Undef(ty));
    }
}

/// Sinks identical trailing instructions of `b`'s unconditional
/// predecessors into `b` (or into a block splitting them off).
pub fn sink_common_code(func: &mut Function, b: BlockId, cx: &Cx) -> bool {
    let preds = func.unique_preds(b);
    if preds.len() < 2
        || func
            .first_non_phi(b)
            .is_some_and(|i| func.kind(i).is_eh_pad())
    {
        return false;
    }
    let mut unconditional = Vec::new();
    let mut has_other_preds = false;
    for &p in &preds {
        match func.terminator(p) {
            Terminator::Br { .. } if p != b => unconditional.push(p),
            _ => has_other_preds = true,
        }
    }
    if unconditional.len() < 2 {
        return false;
    }

    let candidates: Vec<Vec<InstId>> = unconditional
        .iter()
        .map(|&p| {
            func.insts(p)
                .iter()
                .copied()
                .filter(|&i| !func.kind(i).is_debug())
                .collect()
        })
        .collect();
    let depth = candidates.iter().map(Vec::len).min().unwrap_or(0);
    let mut rows = Vec::new();
    for k in 0..depth {
        let insts: Vec<InstId> = candidates.iter().map(|c| c[c.len() - 1 - k]).collect();
        match can_sink(func, b, &insts) {
            Some(phi_operands) => rows.push(Row { insts, phi_operands }),
            None => break,
        }
    }
    let scan = profitable_prefix(&rows, unconditional.len());
    if scan == 0 {
        return false;
    }
    rows.truncate(scan);

    if has_other_preds {
        // Splitting is only worth it if something expensive moves.
        if rows
            .iter()
            .all(|r| cx.cost.is_safe_to_speculate(func, r.insts[0]))
        {
            return false;
        }
        if split_block_predecessors(func, b, &unconditional, ".sink.split").is_none() {
            return false;
        }
    }
    let Some(dest) = func.single_succ(unconditional[0]) else {
        return false;
    };
    trace!(block = %func.block_name(dest), rows = rows.len(), "sinking common code");
    for row in &rows {
        sink_row(func, dest, &unconditional, &row.insts);
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::parse_function;
    use crate::oracle::TargetCostModel;
    use crate::simplify::SimplifyOptions;

    fn sink(f: &mut Function, block: &str) -> bool {
        let b = f.block_by_name(block).unwrap();
        let opts = SimplifyOptions::default();
        let cx = Cx {
            cost: &TargetCostModel,
            opts: &opts,
        };
        sink_common_code(f, b, &cx)
    }

    //  entry
    //  /   \
    // a     b      both end in `add _, 1`
    //  \   /
    //  join
    #[test]
    fn common_add_is_sunk_with_one_phi() {
        let mut f = parse_function(
            "
func @f(i1 %c, i32 %x, i32 %y) -> i32 {
entry:
  br %c, label %a, label %b
a:
  %v1 = add i32 %x, 1
  br label %join
b:
  %v2 = add i32 %y, 1
  br label %join
join:
  %p = phi i32 [ %v1, %a ], [ %v2, %b ]
  ret i32 %p
}
",
        )
        .unwrap();
        assert!(sink(&mut f, "join"));
        let join = f.block_by_name("join").unwrap();
        let a = f.block_by_name("a").unwrap();
        let phis = f.phis(join);
        assert_eq!(phis.len(), 1);
        assert_eq!(f.inst(phis[0]).name.as_deref(), Some("x.sink"));
        assert_eq!(f.body(join).len(), 1);
        assert!(f.insts(a).is_empty());
        let Terminator::Ret { value: Some(Value::Inst(r)) } = *f.terminator(join) else {
            panic!("expected a return of the sunk add");
        };
        assert_eq!(f.inst_block(r), Some(join));
    }

    #[test]
    fn two_differing_operands_are_not_sunk() {
        let mut f = parse_function(
            "
func @f(i1 %c, i32 %x, i32 %y) -> i32 {
entry:
  br %c, label %a, label %b
a:
  %v1 = add i32 %x, 1
  br label %join
b:
  %v2 = add i32 %y, 2
  br label %join
join:
  %p = phi i32 [ %v1, %a ], [ %v2, %b ]
  ret i32 %p
}
",
        )
        .unwrap();
        assert!(!sink(&mut f, "join"));
    }

    // entry also branches straight to join, so the stores from a and b are
    // sunk into a split block.
    #[test]
    fn stores_sink_into_split_block() {
        let mut f = parse_function(
            "
func @f(i32 %x, ptr %p) -> void {
entry:
  switch i32 %x, label %join [
    0, label %a
    1, label %b
  ]
a:
  store i32 1, %p
  br label %join
b:
  store i32 2, %p
  br label %join
join:
  ret void
}
",
        )
        .unwrap();
        assert!(sink(&mut f, "join"));
        let split = f.block_by_name("join.sink.split").unwrap();
        let a = f.block_by_name("a").unwrap();
        assert!(f.insts(a).is_empty());
        assert_eq!(f.phis(split).len(), 1);
        assert!(matches!(f.kind(f.body(split)[0]), InstKind::Store { .. }));
        assert_eq!(f.preds(f.block_by_name("join").unwrap()).len(), 2);
    }

    #[test]
    fn speculatable_code_is_not_split_off() {
        let mut f = parse_function(
            "
func @f(i32 %x, i32 %y) -> i32 {
entry:
  switch i32 %x, label %join [
    0, label %a
    1, label %b
  ]
a:
  %v1 = add i32 %y, 1
  br label %join
b:
  %v2 = add i32 %y, 1
  br label %join
join:
  %p = phi i32 [ 0, %entry ], [ %v1, %a ], [ %v2, %b ]
  ret i32 %p
}
",
        )
        .unwrap();
        assert!(!sink(&mut f, "join"));
    }
}
