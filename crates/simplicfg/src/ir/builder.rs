//! Programmatic construction of functions.
//!
//! `FunctionBuilder` owns the function under construction and a cursor
//! (the current block). Instructions are appended at the cursor; terminators
//! go through [`Function::set_terminator`] so predecessor tables are correct
//! from the start. PHIs may name predecessors whose branches are added later.

use super::types::*;
use super::Function;

/// Builder state.
pub struct FunctionBuilder {
    func: Function,
    /// Block receiving new instructions
    current: Option<BlockId>,
}

impl FunctionBuilder {
    /// Starts a function with the given parameters and return type.
    pub fn new(name: &str, params: &[(&str, Type)], ret_ty: Type) -> Self {
        let params = params.iter().map(|(n, t)| (n.to_string(), *t)).collect();
        FunctionBuilder {
            func: Function::new(name, params, ret_ty),
            current: None,
        }
    }

    /// Creates a block. The first block created is the entry.
    pub fn block(&mut self, name: &str) -> BlockId {
        let b = self.func.add_block(name);
        if self.current.is_none() {
            self.current = Some(b);
        }
        b
    }

    /// Moves the cursor to the end of `b`.
    pub fn switch_to(&mut self, b: BlockId) {
        self.current = Some(b);
    }

    pub fn arg(&self, n: u32) -> Value {
        Value::Arg(n)
    }

    pub fn func(&self) -> &Function {
        &self.func
    }

    /// Returns the function with an empty edge log.
    pub fn finish(mut self) -> Function {
        self.func.take_dom_updates();
        self.func
    }

    fn cursor(&self) -> BlockId {
        match self.current {
            Some(b) => b,
            None => panic!("FunctionBuilder: no block created yet"),
        }
    }

    fn push(&mut self, kind: InstKind, ty: Type) -> Value {
        let b = self.cursor();
        Value::Inst(self.func.append_inst(b, kind, ty))
    }

    /// Names the instruction behind `v` for printing.
    pub fn name(&mut self, v: Value, name: &str) -> Value {
        if let Value::Inst(i) = v {
            self.func.set_inst_name(i, name);
        }
        v
    }

    // ── Instructions ─────────────────────────────────────────────────────────

    pub fn binary(&mut self, op: BinOp, lhs: Value, rhs: Value) -> Value {
        let ty = self.func.value_type(lhs);
        self.push(InstKind::Binary { op, lhs, rhs }, ty)
    }

    pub fn add(&mut self, lhs: Value, rhs: Value) -> Value {
        self.binary(BinOp::Add, lhs, rhs)
    }

    pub fn icmp(&mut self, pred: CmpPred, lhs: Value, rhs: Value) -> Value {
        self.push(InstKind::Cmp { pred, lhs, rhs }, Type::I1)
    }

    pub fn select(&mut self, cond: Value, on_true: Value, on_false: Value) -> Value {
        let ty = self.func.value_type(on_true);
        self.push(
            InstKind::Select {
                cond,
                on_true,
                on_false,
            },
            ty,
        )
    }

    pub fn cast(&mut self, op: CastOp, value: Value, to: Type) -> Value {
        self.push(InstKind::Cast { op, value }, to)
    }

    pub fn load(&mut self, ty: Type, ptr: Value) -> Value {
        self.push(InstKind::Load { ptr, volatile: false }, ty)
    }

    pub fn store(&mut self, value: Value, ptr: Value) -> Value {
        self.push(
            InstKind::Store {
                ptr,
                value,
                volatile: false,
            },
            Type::Void,
        )
    }

    pub fn call(&mut self, ret: Type, callee: &str, args: &[Value], flags: CallFlags) -> Value {
        self.push(
            InstKind::Call {
                callee: callee.to_string(),
                args: args.to_vec(),
                flags,
            },
            ret,
        )
    }

    pub fn landing_pad(&mut self) -> Value {
        self.push(InstKind::LandingPad, Type::Token)
    }

    pub fn cleanup_pad(&mut self) -> Value {
        self.push(InstKind::CleanupPad, Type::Token)
    }

    pub fn debug(&mut self, value: Value, loc: u32) -> Value {
        self.push(InstKind::Debug { value, loc }, Type::Void)
    }

    /// Adds a PHI at the head of the current block.
    pub fn phi(&mut self, ty: Type, incoming: &[(BlockId, Value)]) -> Value {
        let b = self.cursor();
        Value::Inst(self.func.insert_phi(b, ty, incoming.to_vec()))
    }

    // ── Terminators ──────────────────────────────────────────────────────────

    pub fn terminate(&mut self, term: Terminator) {
        let b = self.cursor();
        self.func.set_terminator(b, term);
    }

    pub fn br(&mut self, target: BlockId) {
        self.terminate(Terminator::Br { target });
    }

    pub fn cond_br(&mut self, cond: Value, if_true: BlockId, if_false: BlockId) {
        self.terminate(Terminator::CondBr {
            cond,
            if_true,
            if_false,
            weights: None,
        });
    }

    pub fn cond_br_weighted(&mut self, cond: Value, if_true: BlockId, if_false: BlockId, weights: [u32; 2]) {
        self.terminate(Terminator::CondBr {
            cond,
            if_true,
            if_false,
            weights: Some(weights),
        });
    }

    /// Switch on `cond`; case values take the condition's type.
    pub fn switch(&mut self, cond: Value, default: BlockId, cases: &[(i64, BlockId)]) {
        let ty = self.func.value_type(cond);
        let cases = cases
            .iter()
            .map(|&(v, dest)| SwitchCase {
                value: Constant::new(ty, v),
                dest,
            })
            .collect();
        self.terminate(Terminator::Switch {
            cond,
            default,
            cases,
            weights: None,
        });
    }

    pub fn ret(&mut self, value: Option<Value>) {
        self.terminate(Terminator::Ret { value });
    }

    pub fn unreachable(&mut self) {
        self.terminate(Terminator::Unreachable);
    }

    /// Integer constant of the given type.
    pub fn iconst(&self, ty: Type, v: i64) -> Value {
        Value::constant(ty, v)
    }
}
