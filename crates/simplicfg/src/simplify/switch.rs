//! Switch rewrites that do not need a table.
//!
//! - a switch whose cases form one contiguous range becomes a single
//!   unsigned comparison,
//! - cases the condition provably cannot take are dropped (and the default
//!   is marked unreachable when the cases cover every possible value),
//! - a switch that only picks between two constants for one PHI becomes a
//!   `select`,
//! - case blocks that feed their own case value into a PHI feed the
//!   condition instead,
//! - sparse cases spaced by a power of two are rebased and rotated into a
//!   dense run.

use super::utils::{
    emit, is_empty_block, is_unreachable_block, replace_terminator, successor_weights, to_branch_metadata,
    value_name,
};
use super::value_compare::prune_switch_cases;
use super::Cx;
use crate::ir::eval::fold_inst;
use crate::ir::{
    BinOp, BlockId, CastOp, CmpPred, Constant, Function, InstId, InstKind, Terminator, Type, User, Value,
};
use std::collections::HashMap;
use tracing::trace;

/// Most cases sharing one result that [`switch_to_select`] accepts.
const MAX_CASES_PER_RESULT: usize = 16;

fn switch_parts(func: &Function, b: BlockId) -> Option<(Value, BlockId, Vec<(Constant, BlockId)>)> {
    match func.terminator(b) {
        Terminator::Switch {
            cond, default, cases, ..
        } => Some((*cond, *default, cases.iter().map(|c| (c.value, c.dest)).collect())),
        _ => None,
    }
}

// ── Range to compare ─────────────────────────────────────────────────────────

/// The values, sorted descending, form one run with no gaps.
fn is_contiguous(values: &mut [Constant]) -> bool {
    values.sort_by_key(|c| std::cmp::Reverse(c.as_u64()));
    values.windows(2).all(|w| {
        let ty = w[0].ty();
        w[0] == Constant::from_u64(ty, w[1].as_u64().wrapping_add(1))
    })
}

/// Replaces a switch with two destinations, one of which is reached by a
/// contiguous range of cases, with `icmp ult (cond - min), count`.
pub fn range_to_compare(func: &mut Function, b: BlockId) -> bool {
    let Some((cond, default, cases)) = switch_parts(func, b) else {
        return false;
    };
    if cases.is_empty() {
        return false;
    }
    let has_default = !is_unreachable_block(func, default);

    let mut dest_a = has_default.then_some(default);
    let mut dest_b = None;
    let (mut cases_a, mut cases_b) = (Vec::new(), Vec::new());
    for &(value, dest) in &cases {
        if dest_a.is_none() {
            dest_a = Some(dest);
        }
        if Some(dest) == dest_a {
            cases_a.push(value);
            continue;
        }
        if dest_b.is_none() {
            dest_b = Some(dest);
        }
        if Some(dest) == dest_b {
            cases_b.push(value);
            continue;
        }
        return false;
    }
    let (Some(dest_a), Some(dest_b)) = (dest_a, dest_b) else {
        return false;
    };

    let (contiguous_cases, contiguous_dest, other_dest) = if !cases_a.is_empty() && is_contiguous(&mut cases_a) {
        (cases_a, dest_a, dest_b)
    } else if is_contiguous(&mut cases_b) {
        (cases_b, dest_b, dest_a)
    } else {
        return false;
    };

    let ty = func.value_type(cond);
    let min = contiguous_cases[contiguous_cases.len() - 1];
    let count = Constant::from_u64(ty, contiguous_cases.len() as u64);
    trace!(block = %func.block_name(b), cases = contiguous_cases.len(), "switch range to compare");

    let mut sub = cond;
    if !min.is_zero() {
        let name = format!("{}.off", value_name(func, cond));
        sub = emit(
            func,
            b,
            InstKind::Binary {
                op: BinOp::Add,
                lhs: cond,
                rhs: Value::Const(Constant::from_u64(ty, min.as_u64().wrapping_neg())),
            },
            ty,
            &name,
        );
    }
    let cmp = if count.is_zero() {
        // The run wraps around the whole type.
        Value::constant(Type::I1, 1)
    } else {
        emit(
            func,
            b,
            InstKind::Cmp {
                pred: CmpPred::Ult,
                lhs: sub,
                rhs: Value::Const(count),
            },
            Type::I1,
            "switch",
        )
    };

    // Per-destination weight sums; slot 0 belongs to the default.
    let weights = successor_weights(func.terminator(b)).and_then(|w| {
        let (mut t, mut f) = (0u64, 0u64);
        let dests = std::iter::once(default).chain(cases.iter().map(|&(_, d)| d));
        for (d, w) in dests.zip(w) {
            if d == contiguous_dest {
                t += w;
            } else {
                f += w;
            }
        }
        while t > u64::from(u32::MAX) || f > u64::from(u32::MAX) {
            t /= 2;
            f /= 2;
        }
        to_branch_metadata(t, f)
    });

    replace_terminator(
        func,
        b,
        Terminator::CondBr {
            cond: cmp,
            if_true: contiguous_dest,
            if_false: other_dest,
            weights,
        },
    );
    true
}

// ── Dead cases ───────────────────────────────────────────────────────────────

const MAX_ANALYSIS_DEPTH: u32 = 6;

/// Bits of a value known to be zero and known to be one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct KnownBits {
    zero: u64,
    one: u64,
    bits: u32,
}

impl KnownBits {
    fn unknown(bits: u32) -> Self {
        KnownBits { zero: 0, one: 0, bits }
    }

    fn constant(c: Constant) -> Self {
        let mask = c.ty().mask();
        KnownBits {
            zero: !c.as_u64() & mask,
            one: c.as_u64(),
            bits: c.ty().bits(),
        }
    }

    fn intersect(self, other: KnownBits) -> Self {
        KnownBits {
            zero: self.zero & other.zero,
            one: self.one & other.one,
            bits: self.bits,
        }
    }

    fn unknown_count(&self) -> u32 {
        self.bits - (self.zero | self.one).count_ones()
    }

    /// Leading bits known to equal the sign bit.
    fn sign_bits(&self) -> u32 {
        let shift = 64 - self.bits;
        let run = (self.zero << shift).leading_ones().max((self.one << shift).leading_ones());
        run.clamp(1, self.bits)
    }
}

/// The top `n` bits of a `bits`-wide value.
fn high_mask(mask: u64, bits: u32, n: u32) -> u64 {
    if n == 0 {
        return 0;
    }
    (mask >> (bits - n)) << (bits - n)
}

fn known_bits(func: &Function, v: Value, depth: u32) -> KnownBits {
    let ty = func.value_type(v);
    let bits = ty.bits();
    let mask = ty.mask();
    let unknown = KnownBits::unknown(bits);
    if let Value::Const(c) = v {
        return KnownBits::constant(c);
    }
    let Value::Inst(i) = v else {
        return unknown;
    };
    if depth >= MAX_ANALYSIS_DEPTH || !ty.is_integer() {
        return unknown;
    }
    let kb = |v| known_bits(func, v, depth + 1);
    let shift_amount = |v: Value| v.as_const().map(|c| c.as_u64()).filter(|&s| s < u64::from(bits));
    match *func.kind(i) {
        InstKind::Binary { op, lhs, rhs } => match op {
            BinOp::And => {
                let (l, r) = (kb(lhs), kb(rhs));
                KnownBits {
                    zero: l.zero | r.zero,
                    one: l.one & r.one,
                    bits,
                }
            }
            BinOp::Or => {
                let (l, r) = (kb(lhs), kb(rhs));
                KnownBits {
                    zero: l.zero & r.zero,
                    one: l.one | r.one,
                    bits,
                }
            }
            BinOp::Xor => {
                let (l, r) = (kb(lhs), kb(rhs));
                KnownBits {
                    zero: (l.zero & r.zero) | (l.one & r.one),
                    one: (l.zero & r.one) | (l.one & r.zero),
                    bits,
                }
            }
            BinOp::Shl => match shift_amount(rhs) {
                Some(s) => {
                    let l = kb(lhs);
                    KnownBits {
                        zero: ((l.zero << s) | ((1u64 << s) - 1)) & mask,
                        one: (l.one << s) & mask,
                        bits,
                    }
                }
                None => unknown,
            },
            BinOp::LShr => match shift_amount(rhs) {
                Some(s) => {
                    let l = kb(lhs);
                    KnownBits {
                        zero: (l.zero >> s) | high_mask(mask, bits, s as u32),
                        one: l.one >> s,
                        bits,
                    }
                }
                None => unknown,
            },
            _ => unknown,
        },
        InstKind::Cast { op, value } => {
            let src = kb(value);
            let src_mask = func.value_type(value).mask();
            match op {
                CastOp::ZExt => KnownBits {
                    zero: src.zero | (mask & !src_mask),
                    one: src.one,
                    bits,
                },
                CastOp::Trunc => KnownBits {
                    zero: src.zero & mask,
                    one: src.one & mask,
                    bits,
                },
                CastOp::SExt => {
                    let sign = 1u64 << (src.bits - 1);
                    let ext = mask & !src_mask;
                    KnownBits {
                        zero: src.zero | if src.zero & sign != 0 { ext } else { 0 },
                        one: src.one | if src.one & sign != 0 { ext } else { 0 },
                        bits,
                    }
                }
            }
        }
        InstKind::Select { on_true, on_false, .. } => kb(on_true).intersect(kb(on_false)),
        InstKind::Phi { ref incoming } => {
            let mut acc: Option<KnownBits> = None;
            for &(_, v) in incoming {
                if v == Value::Inst(i) {
                    continue;
                }
                let k = kb(v);
                acc = Some(acc.map_or(k, |a| a.intersect(k)));
            }
            acc.unwrap_or(unknown)
        }
        _ => unknown,
    }
}

/// Lower bound on the number of leading bits of `v` equal to its sign bit.
fn sign_bits(func: &Function, v: Value, depth: u32) -> u32 {
    let from_known = known_bits(func, v, depth).sign_bits();
    let Value::Inst(i) = v else {
        return from_known;
    };
    if depth >= MAX_ANALYSIS_DEPTH {
        return from_known;
    }
    let bits = func.value_type(v).bits();
    let specific = match *func.kind(i) {
        InstKind::Cast {
            op: CastOp::SExt,
            value,
        } => bits - func.value_type(value).bits() + sign_bits(func, value, depth + 1),
        InstKind::Binary {
            op: BinOp::AShr,
            lhs,
            rhs: Value::Const(s),
        } if s.as_u64() < u64::from(bits) => (sign_bits(func, lhs, depth + 1) + s.as_u64() as u32).min(bits),
        _ => 1,
    };
    from_known.max(specific)
}

/// Drops cases the condition cannot take. When the remaining cases cover
/// every value the condition can take, the default becomes unreachable.
pub fn eliminate_dead_cases(func: &mut Function, b: BlockId) -> bool {
    let Some((cond, default, cases)) = switch_parts(func, b) else {
        return false;
    };
    let ty = func.value_type(cond);
    if !ty.is_integer() {
        return false;
    }
    let bits = ty.bits();
    let known = known_bits(func, cond, 0);
    let max_significant = bits - sign_bits(func, cond, 0) + 1;

    let mut dead = Vec::new();
    for &(value, _) in &cases {
        let v = value.as_u64();
        let case_significant = bits - KnownBits::constant(value).sign_bits() + 1;
        if known.zero & v != 0 || known.one & !v & ty.mask() != 0 || case_significant > max_significant {
            dead.push(value);
        }
    }

    let has_default = !is_unreachable_block(func, default);
    let unknown = known.unknown_count();
    if has_default && dead.is_empty() && unknown < 64 && cases.len() as u64 == 1u64 << unknown {
        trace!(block = %func.block_name(b), "switch covers every value, default is unreachable");
        let name = format!("{}.unreachabledefault", func.block_name(b));
        let unreachable = func.add_block_after(b, &name);
        func.set_terminator(unreachable, Terminator::Unreachable);
        let mut term = func.terminator(b).clone();
        if let Terminator::Switch { default, .. } = &mut term {
            *default = unreachable;
        }
        func.set_terminator(b, term);
        return true;
    }
    if dead.is_empty() {
        return false;
    }
    trace!(block = %func.block_name(b), dead = dead.len(), "removing impossible switch cases");
    prune_switch_cases(func, b, &dead);
    true
}

// ── Switch to select ─────────────────────────────────────────────────────────

/// Constants the PHIs of a common destination receive when the switch in
/// `b` takes `dest` with `case_value` (`None` for the default).
///
/// `dest` may be the common destination itself, or a block of foldable
/// instructions that branches there. `common` is set by the first call and
/// checked by the later ones.
pub(super) fn case_results(
    func: &Function,
    b: BlockId,
    case_value: Option<Constant>,
    dest: BlockId,
    common: &mut Option<BlockId>,
) -> Option<Vec<(InstId, Constant)>> {
    let cond = func.terminator(b).condition()?;
    let mut pool: HashMap<Value, Constant> = HashMap::new();
    if let Some(c) = case_value {
        pool.insert(cond, c);
    }

    let (mut pred, mut target) = (b, dest);
    let mut stopped = false;
    for &i in func.insts(dest) {
        let data = func.inst(i);
        if data.kind.is_debug() {
            continue;
        }
        let Some(c) = fold_inst(&data.kind, data.ty, &func.tables, |v| {
            v.as_const().or_else(|| pool.get(&v).copied())
        }) else {
            stopped = true;
            break;
        };
        let local = func.users(Value::Inst(i)).into_iter().all(|u| match u {
            User::Term(t) => t == dest,
            User::Inst(u) if func.kind(u).is_phi() => func
                .phi_incoming(u)
                .iter()
                .all(|&(p, v)| v != Value::Inst(i) || p == dest),
            User::Inst(u) => func.inst_block(u) == Some(dest),
        });
        if !local {
            return None;
        }
        pool.insert(Value::Inst(i), c);
    }
    if !stopped {
        let Terminator::Br { target: next } = *func.terminator(dest) else {
            return None;
        };
        pred = dest;
        target = next;
    }

    match *common {
        None => *common = Some(target),
        Some(c) if c != target => return None,
        Some(_) => {}
    }

    let mut results = Vec::new();
    for phi in func.phis(target) {
        let Some(v) = func.phi_value(phi, pred) else {
            continue;
        };
        let c = v.as_const().or_else(|| pool.get(&v).copied())?;
        results.push((phi, c));
    }
    (!results.is_empty()).then_some(results)
}

/// A result constant and the case values producing it.
type ResultGroup = (Constant, Vec<Constant>);

/// Groups the cases of `b` by the single PHI value they produce.
fn single_phi_results(func: &Function, b: BlockId) -> Option<(InstId, Vec<ResultGroup>, Option<Constant>)> {
    let (_, default, cases) = switch_parts(func, b)?;
    let mut common = None;
    let mut phi = None;
    let mut groups: Vec<ResultGroup> = Vec::new();
    for &(value, dest) in &cases {
        let results = case_results(func, b, Some(value), dest, &mut common)?;
        let [(p, result)] = results.as_slice() else {
            return None;
        };
        if *phi.get_or_insert(*p) != *p {
            return None;
        }
        match groups.iter_mut().find(|(r, _)| r == result) {
            Some((_, values)) => {
                values.push(value);
                if values.len() > MAX_CASES_PER_RESULT {
                    return None;
                }
            }
            None => {
                groups.push((*result, vec![value]));
                if groups.len() > 2 {
                    return None;
                }
            }
        }
    }

    let default_result = match case_results(func, b, None, default, &mut common) {
        Some(r) => match r.as_slice() {
            [(p, c)] if Some(*p) == phi => Some(*c),
            _ => None,
        },
        None => None,
    };
    if default_result.is_none() && !is_unreachable_block(func, default) {
        return None;
    }
    Some((phi?, groups, default_result))
}

fn emit_eq(func: &mut Function, b: BlockId, cond: Value, c: Constant, name: &str) -> Value {
    emit(
        func,
        b,
        InstKind::Cmp {
            pred: CmpPred::Eq,
            lhs: cond,
            rhs: Value::Const(c),
        },
        Type::I1,
        name,
    )
}

fn emit_select(func: &mut Function, b: BlockId, cond: Value, on_true: Value, on_false: Value, ty: Type) -> Value {
    emit(
        func,
        b,
        InstKind::Select {
            cond,
            on_true,
            on_false,
        },
        ty,
        "switch.select",
    )
}

/// Replaces a switch that only chooses between at most two constants for
/// one PHI with a chain of compares and selects.
pub fn switch_to_select(func: &mut Function, b: BlockId) -> bool {
    let Some(cond) = func.terminator(b).condition() else {
        return false;
    };
    if !matches!(func.terminator(b), Terminator::Switch { .. }) {
        return false;
    }
    let Some((phi, groups, default_result)) = single_phi_results(func, b) else {
        return false;
    };
    let ty = func.inst(phi).ty;
    let Some(dest) = func.inst_block(phi) else {
        return false;
    };

    let sel = match (groups.as_slice(), default_result) {
        // switch (x) { case c0: r0; case c1: r1; default: rd }
        ([(r0, c0), (r1, c1)], default_result) if c0.len() == 1 && c1.len() == 1 => {
            let mut inner = Value::Const(*r1);
            if let Some(rd) = default_result {
                let cmp = emit_eq(func, b, cond, c1[0], "switch.selectcmp");
                inner = emit_select(func, b, cmp, Value::Const(*r1), Value::Const(rd), ty);
            }
            let cmp = emit_eq(func, b, cond, c0[0], "switch.selectcmp1");
            emit_select(func, b, cmp, Value::Const(*r0), inner, ty)
        }
        // switch (x) { case c0: case c1: r0; default: rd }
        ([(r0, c0)], Some(rd)) if c0.len() == 2 => {
            let a = emit_eq(func, b, cond, c0[0], "switch.selectcmp.case1");
            let bb = emit_eq(func, b, cond, c0[1], "switch.selectcmp.case2");
            let or = emit(
                func,
                b,
                InstKind::Binary {
                    op: BinOp::Or,
                    lhs: a,
                    rhs: bb,
                },
                Type::I1,
                "switch.selectcmp",
            );
            emit_select(func, b, or, Value::Const(*r0), Value::Const(rd), ty)
        }
        _ => return false,
    };

    trace!(block = %func.block_name(b), "switch to select");
    replace_terminator(func, b, Terminator::Br { target: dest });
    func.set_phi_value(phi, b, sel);
    true
}

// ── Forwarding the condition ─────────────────────────────────────────────────

/// Where a case's value is fed to a PHI as a constant, feeds the switch
/// condition instead, so later merges see identical incoming values.
pub fn forward_condition_to_phi(func: &mut Function, b: BlockId) -> bool {
    let Some((cond, default, cases)) = switch_parts(func, b) else {
        return false;
    };
    let edges_from_b = |d: BlockId| cases.iter().filter(|&&(_, cd)| cd == d).count() + usize::from(default == d);

    let mut changed = false;
    // Per PHI, the incoming blocks whose value equals their case value.
    let mut forwardable: Vec<(InstId, Vec<BlockId>)> = Vec::new();
    for &(value, dest) in &cases {
        // Only the case's own edge may enter `dest` from `b`.
        if edges_from_b(dest) != 1 {
            continue;
        }
        for phi in func.phis(dest) {
            if func.phi_value(phi, b) == Some(Value::Const(value)) {
                func.set_phi_value(phi, b, cond);
                changed = true;
            }
        }

        // An empty case block that only forwards to its successor.
        if func.single_pred(dest) != Some(b) || !is_empty_block(func, dest) || func.has_phis(dest) {
            continue;
        }
        let Terminator::Br { target: succ } = *func.terminator(dest) else {
            continue;
        };
        for phi in func.phis(succ) {
            if func.phi_value(phi, dest) != Some(Value::Const(value)) {
                continue;
            }
            match forwardable.iter_mut().find(|(p, _)| *p == phi) {
                Some((_, blocks)) => blocks.push(dest),
                None => forwardable.push((phi, vec![dest])),
            }
        }
    }
    for (phi, blocks) in forwardable {
        if blocks.len() < 2 {
            continue;
        }
        for pred in blocks {
            func.set_phi_value(phi, pred, cond);
        }
        changed = true;
    }
    if changed {
        trace!(block = %func.block_name(b), "forwarded switch condition into phis");
    }
    changed
}

// ── Range reduction ──────────────────────────────────────────────────────────

/// Fewest cases [`reduce_range`] works on.
const MIN_CASES_TO_REDUCE: usize = 4;

/// At least 40% of the values from the first to the last of the sorted
/// `values` are cases.
fn is_dense(values: &[i64]) -> bool {
    let (Some(&lo), Some(&hi)) = (values.first(), values.last()) else {
        return true;
    };
    let Some(range) = (hi as u64).wrapping_sub(lo as u64).checked_add(1) else {
        return false;
    };
    if range >= u64::MAX / 100 {
        return false;
    }
    values.len() as u64 * 100 >= range * 40
}

/// Rewrites a sparse switch whose case values are `base + k << shift` into
/// a switch over `k` on `rotr(cond - base, shift)`. Values off the grid
/// rotate their low bits to the top and miss every case.
pub fn reduce_range(func: &mut Function, b: BlockId, cx: &Cx) -> bool {
    let Some((cond, _, cases)) = switch_parts(func, b) else {
        return false;
    };
    let ty = func.value_type(cond);
    if !ty.is_integer() || ty.bits() > cx.cost.largest_legal_int_width() || cases.len() < MIN_CASES_TO_REDUCE {
        return false;
    }
    let mut values: Vec<i64> = cases.iter().map(|(c, _)| c.as_i64()).collect();
    values.sort_unstable();
    if is_dense(&values) {
        return false;
    }

    // Rebasing alone keeps the density, so only a shift can help.
    let base = values[0];
    let shift = values
        .iter()
        .map(|&v| (v.wrapping_sub(base) as u64).trailing_zeros())
        .min()
        .unwrap_or(64);
    if shift == 0 || shift >= ty.bits() {
        return false;
    }
    let reduced: Vec<i64> = values
        .iter()
        .map(|&v| ((v.wrapping_sub(base) as u64) >> shift) as i64)
        .collect();
    if !is_dense(&reduced) {
        return false;
    }

    trace!(block = %func.block_name(b), base, shift, "reducing switch range");
    let name = value_name(func, cond);
    let rebased = if base == 0 {
        cond
    } else {
        emit(
            func,
            b,
            InstKind::Binary {
                op: BinOp::Sub,
                lhs: cond,
                rhs: Value::Const(Constant::new(ty, base)),
            },
            ty,
            &format!("{name}.off"),
        )
    };
    let shr = emit(
        func,
        b,
        InstKind::Binary {
            op: BinOp::LShr,
            lhs: rebased,
            rhs: Value::Const(Constant::new(ty, i64::from(shift))),
        },
        ty,
        &format!("{name}.shr"),
    );
    let shl = emit(
        func,
        b,
        InstKind::Binary {
            op: BinOp::Shl,
            lhs: rebased,
            rhs: Value::Const(Constant::new(ty, i64::from(ty.bits() - shift))),
        },
        ty,
        &format!("{name}.shl"),
    );
    let rotated = emit(
        func,
        b,
        InstKind::Binary {
            op: BinOp::Or,
            lhs: shr,
            rhs: shl,
        },
        ty,
        &format!("{name}.rot"),
    );
    func.update_terminator(b, |t| {
        if let Terminator::Switch { cond, cases, .. } = t {
            *cond = rotated;
            for c in cases.iter_mut() {
                let offset = c.value.as_u64().wrapping_sub(base as u64) & ty.mask();
                c.value = Constant::from_u64(ty, offset >> shift);
            }
        }
    });
    true
}
