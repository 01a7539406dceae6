//! Switch to lookup table.
//!
//! A switch that only exists to feed constants into the PHIs of a common
//! destination is replaced by an index computation and one lookup per PHI:
//!
//! ```text
//!   entry: switch %x, d [0: a, 1: b, 2: c]      entry: %c = icmp ult %x, 3
//!   a: br join  b: br join  c: br join    →            br %c, switch.lookup, d
//!   join: phi [10, a], [13, b], [16, c], ...     switch.lookup:
//!                                                  %r = 10 + 3 * %x
//!                                                  br join
//! ```
//!
//! [`LookupTable`] picks the cheapest encoding for each result column.

use super::switch::case_results;
use super::utils::{emit, is_unreachable_block};
use super::Cx;
use crate::ir::{
    BinOp, BlockId, CastOp, CmpPred, ConstTable, Constant, Function, InstId, InstKind, TableId, Terminator, Type,
    User, Value,
};
use crate::oracle::CostOracle;
use tracing::debug;

/// Fewest cases worth a table.
const MIN_CASES: usize = 3;

/// Fewest cases worth a table when holes need a mask check.
const MIN_CASES_WITH_HOLE_MASK: usize = 4;

/// How a table of results is encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableKind {
    /// Every slot holds the same value.
    SingleValue(Constant),
    /// `offset + index * multiplier`.
    LinearMap { offset: Constant, multiplier: Constant },
    /// Slots packed into one integer, element `i` at bit `i * width`.
    BitMap { map: Constant, elem_ty: Type },
    /// A constant table read with `tableload`.
    Array(Vec<Constant>),
}

/// One result column of a switch, indexed by `case - min_case`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupTable {
    kind: TableKind,
    elem_ty: Type,
}

impl LookupTable {
    /// Lays out `values` (case value, result) in a table of `table_size`
    /// slots starting at `min_case`. Holes take `default`, or the first
    /// result when there is none.
    pub fn new(
        table_size: u64,
        min_case: Constant,
        values: &[(Constant, Constant)],
        default: Option<Constant>,
        cost: &dyn CostOracle,
    ) -> Self {
        let elem_ty = values.first().map_or(Type::I32, |(_, r)| r.ty());
        let fill = default.or_else(|| values.first().map(|&(_, r)| r)).unwrap_or(Constant::zero(elem_ty));
        let mut contents = vec![fill; table_size as usize];
        for &(case, result) in values {
            contents[table_index(case, min_case) as usize] = result;
        }

        if contents.iter().all(|&c| c == contents[0]) {
            return LookupTable {
                kind: TableKind::SingleValue(contents[0]),
                elem_ty,
            };
        }

        if elem_ty.is_integer() {
            let step = |a: Constant, b: Constant| Constant::from_u64(elem_ty, b.as_u64().wrapping_sub(a.as_u64()));
            let multiplier = step(contents[0], contents[1]);
            if contents.windows(2).all(|w| step(w[0], w[1]) == multiplier) {
                return LookupTable {
                    kind: TableKind::LinearMap {
                        offset: contents[0],
                        multiplier,
                    },
                    elem_ty,
                };
            }
        }

        if Self::fits_in_register(table_size, elem_ty, cost) {
            let width = elem_ty.bits();
            if let Some(map_ty) = Type::int_with_bits(table_size * u64::from(width)) {
                let map = contents
                    .iter()
                    .rev()
                    .fold(0u64, |acc, c| acc.checked_shl(width).unwrap_or(0) | c.as_u64());
                return LookupTable {
                    kind: TableKind::BitMap {
                        map: Constant::from_u64(map_ty, map),
                        elem_ty,
                    },
                    elem_ty,
                };
            }
        }

        LookupTable {
            kind: TableKind::Array(contents),
            elem_ty,
        }
    }

    pub fn kind(&self) -> &TableKind {
        &self.kind
    }

    /// A table of `table_size` integers of `ty` packs into one legal
    /// register.
    pub fn fits_in_register(table_size: u64, ty: Type, cost: &dyn CostOracle) -> bool {
        if !ty.is_integer() {
            return false;
        }
        table_size
            .checked_mul(u64::from(ty.bits()))
            .is_some_and(|bits| bits <= u64::from(cost.largest_legal_int_width()))
    }

    /// Emits the read of slot `index` at the end of `block`.
    fn build_lookup(self, func: &mut Function, block: BlockId, index: Value) -> Value {
        match self.kind {
            TableKind::SingleValue(c) => Value::Const(c),
            TableKind::LinearMap { offset, multiplier } => {
                let mut result = int_cast(func, block, index, self.elem_ty, "switch.idx.cast");
                if !multiplier.is_one() {
                    result = emit(
                        func,
                        block,
                        InstKind::Binary {
                            op: BinOp::Mul,
                            lhs: result,
                            rhs: Value::Const(multiplier),
                        },
                        self.elem_ty,
                        "switch.idx.mult",
                    );
                }
                if !offset.is_zero() {
                    result = emit(
                        func,
                        block,
                        InstKind::Binary {
                            op: BinOp::Add,
                            lhs: result,
                            rhs: Value::Const(offset),
                        },
                        self.elem_ty,
                        "switch.offset",
                    );
                }
                result
            }
            TableKind::BitMap { map, elem_ty } => {
                let map_ty = map.ty();
                let shift = int_cast(func, block, index, map_ty, "switch.cast");
                let shift = emit(
                    func,
                    block,
                    InstKind::Binary {
                        op: BinOp::Mul,
                        lhs: shift,
                        rhs: Value::constant(map_ty, i64::from(elem_ty.bits())),
                    },
                    map_ty,
                    "switch.shiftamt",
                );
                let down = emit(
                    func,
                    block,
                    InstKind::Binary {
                        op: BinOp::LShr,
                        lhs: Value::Const(map),
                        rhs: shift,
                    },
                    map_ty,
                    "switch.downshift",
                );
                int_cast(func, block, down, elem_ty, "switch.masked")
            }
            TableKind::Array(values) => {
                let table = TableId(func.tables.len() as u32);
                let base = format!("switch.table.{}", func.name);
                let taken = |n: &str| func.tables.iter().any(|t| t.name == n);
                let name = if taken(&base) {
                    (1..)
                        .map(|i| format!("{base}.{i}"))
                        .find(|n| !taken(n))
                        .unwrap_or(base)
                } else {
                    base
                };
                func.tables.push(ConstTable {
                    name,
                    elem_ty: self.elem_ty,
                    values,
                });
                emit(func, block, InstKind::TableLoad { table, index }, self.elem_ty, "switch.load")
            }
        }
    }
}

fn table_index(case: Constant, min_case: Constant) -> u64 {
    case.as_u64().wrapping_sub(min_case.as_u64()) & case.ty().mask()
}

/// Zero-extends or truncates `v` to `to`.
fn int_cast(func: &mut Function, block: BlockId, v: Value, to: Type, name: &str) -> Value {
    let from = func.value_type(v);
    let op = match from.bits().cmp(&to.bits()) {
        std::cmp::Ordering::Equal => return v,
        std::cmp::Ordering::Less => CastOp::ZExt,
        std::cmp::Ordering::Greater => CastOp::Trunc,
    };
    emit(func, block, InstKind::Cast { op, value: v }, to, name)
}

/// Whether tables of `table_size` slots for `result_types` are worth
/// building for `cases` cases.
fn should_build(cases: usize, table_size: u64, result_types: &[Type], cost: &dyn CostOracle) -> bool {
    if cases as u64 > table_size || table_size >= u64::MAX / 10 {
        return false;
    }
    if result_types
        .iter()
        .all(|&ty| LookupTable::fits_in_register(table_size, ty, cost))
    {
        return true;
    }
    if result_types.iter().any(|&ty| !cost.is_type_legal(ty)) {
        return false;
    }
    // At least 40% of the slots are real cases.
    cases as u64 * 10 >= table_size * 4
}

/// Result column of one PHI: (case value, result) in case order.
struct Column {
    phi: InstId,
    values: Vec<(Constant, Constant)>,
}

pub(crate) fn switch_to_lookup_table(func: &mut Function, b: BlockId, cx: &Cx) -> bool {
    let Terminator::Switch {
        cond, default, cases, ..
    } = func.terminator(b).clone()
    else {
        return false;
    };
    if !cx.cost.should_build_lookup_tables() || cases.len() < MIN_CASES {
        return false;
    }

    let mut common = None;
    let mut columns: Vec<Column> = Vec::new();
    let (mut min, mut max) = (cases[0].value, cases[0].value);
    for case in &cases {
        if case.value.as_i64() < min.as_i64() {
            min = case.value;
        }
        if case.value.as_i64() > max.as_i64() {
            max = case.value;
        }
        let Some(results) = case_results(func, b, Some(case.value), case.dest, &mut common) else {
            return false;
        };
        for (phi, result) in results {
            match columns.iter_mut().find(|c| c.phi == phi) {
                Some(col) => col.values.push((case.value, result)),
                None => columns.push(Column {
                    phi,
                    values: vec![(case.value, result)],
                }),
            }
        }
    }
    // Every case must feed every PHI.
    if columns.iter().any(|c| c.values.len() != cases.len()) {
        return false;
    }
    let Some(common) = common else {
        return false;
    };

    let Some(table_size) = table_index(max, min).checked_add(1) else {
        return false;
    };
    let has_holes = (cases.len() as u64) < table_size;
    let mut common_check = Some(common);
    let default_results = case_results(func, b, None, default, &mut common_check);
    let default_for = |phi: InstId| {
        default_results
            .as_ref()
            .and_then(|r| r.iter().find(|&&(p, _)| p == phi).map(|&(_, c)| c))
    };
    let need_mask = has_holes && default_results.is_none();
    if need_mask
        && (cases.len() < MIN_CASES_WITH_HOLE_MASK || table_size > u64::from(cx.cost.largest_legal_int_width()))
    {
        return false;
    }
    if has_holes && !need_mask && columns.iter().any(|c| default_for(c.phi).is_none()) {
        return false;
    }
    let result_types: Vec<Type> = columns.iter().map(|c| c.values[0].1.ty()).collect();
    if !should_build(cases.len(), table_size, &result_types, cx.cost) {
        return false;
    }

    let ty = min.ty();
    let max_table_size = if ty.bits() > 63 { u64::MAX } else { 1u64 << ty.bits() };
    let default_reachable = !is_unreachable_block(func, default);
    let covered = max_table_size == table_size;
    debug!(
        block = %func.block_name(b),
        cases = cases.len(),
        table_size,
        holes = has_holes,
        "switch to lookup table"
    );

    let index = if min.is_zero() {
        cond
    } else {
        emit(
            func,
            b,
            InstKind::Binary {
                op: BinOp::Sub,
                lhs: cond,
                rhs: Value::Const(min),
            },
            ty,
            "switch.tableidx",
        )
    };

    let first = func.add_block_after(b, if need_mask { "switch.hole_check" } else { "switch.lookup" });
    let lookup = if need_mask {
        let lookup = func.add_block_after(first, "switch.lookup");
        build_hole_check(func, first, lookup, index, min, &columns[0], table_size, default, b);
        lookup
    } else {
        first
    };

    let mut returned_early = false;
    let mut incoming = Vec::new();
    for col in &columns {
        let fill = if need_mask { None } else { default_for(col.phi) };
        let table = LookupTable::new(table_size, min, &col.values, fill, cx.cost);
        let result = table.build_lookup(func, lookup, index);
        let returns_directly = func.users(Value::Inst(col.phi)).as_slice() == [User::Term(common)]
            && func.first_non_phi_or_debug(common).is_none()
            && matches!(func.terminator(common), Terminator::Ret { .. });
        if returns_directly {
            func.set_terminator(lookup, Terminator::Ret { value: Some(result) });
            returned_early = true;
            break;
        }
        incoming.push((col.phi, result));
    }
    if !returned_early {
        func.set_terminator(lookup, Terminator::Br { target: common });
        for (phi, result) in incoming {
            func.set_phi_value(phi, lookup, result);
        }
    }

    let term = if !default_reachable || covered {
        Terminator::Br { target: first }
    } else {
        let in_range = emit(
            func,
            b,
            InstKind::Cmp {
                pred: CmpPred::Ult,
                lhs: index,
                rhs: Value::Const(Constant::from_u64(ty, table_size)),
            },
            Type::I1,
            "",
        );
        Terminator::CondBr {
            cond: in_range,
            if_true: first,
            if_false: default,
            weights: None,
        }
    };
    func.set_terminator(b, term);
    true
}

/// Fills `mask_bb` with a test of the bit of `index` in a mask of the
/// slots that hold a real case; holes go to `default`.
#[allow(clippy::too_many_arguments)]
fn build_hole_check(
    func: &mut Function,
    mask_bb: BlockId,
    lookup: BlockId,
    index: Value,
    min: Constant,
    column: &Column,
    table_size: u64,
    default: BlockId,
    switch_block: BlockId,
) {
    // At least 8 bits and a power of two wide.
    let width = (table_size.saturating_sub(1).max(7) + 1).next_power_of_two();
    let mask_ty = Type::int_with_bits(width).unwrap_or(Type::I64);
    let mask = column
        .values
        .iter()
        .fold(0u64, |m, &(case, _)| m | (1u64 << table_index(case, min)));

    let mask_index = int_cast(func, mask_bb, index, mask_ty, "switch.maskindex");
    let shifted = emit(
        func,
        mask_bb,
        InstKind::Binary {
            op: BinOp::LShr,
            lhs: Value::Const(Constant::from_u64(mask_ty, mask)),
            rhs: mask_index,
        },
        mask_ty,
        "switch.shifted",
    );
    let lo_bit = emit(
        func,
        mask_bb,
        InstKind::Cast {
            op: CastOp::Trunc,
            value: shifted,
        },
        Type::I1,
        "switch.lobit",
    );
    func.set_terminator(
        mask_bb,
        Terminator::CondBr {
            cond: lo_bit,
            if_true: lookup,
            if_false: default,
            weights: None,
        },
    );
    func.add_phi_incoming_like(default, mask_bb, switch_block);
}
