//! Parser for the textual IR.
//!
//! The grammar mirrors what [`super::printer`] emits:
//!
//! ```text
//! table @t i32 [1, 2, 3]
//! func @f(i32 %x) -> i32 {
//! entry:
//!   %c = icmp eq i32 %x, 1
//!   br %c, label %a, label %b !prof 3, 7
//! a:
//!   ret i32 10
//! b:
//!   ret i32 4
//! }
//! ```
//!
//! Values may be used before they are defined (PHIs in loops); such uses are
//! recorded and patched once the whole body has been read. Comments start
//! with `;` and run to the end of the line.

use super::types::*;
use super::Function;
use std::collections::HashMap;
use thiserror::Error;

/// Errors produced while reading textual IR.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ParseError {
    #[error("line {line}: expected {expected}, found {found}")]
    Unexpected {
        line: usize,
        expected: String,
        found: String,
    },
    #[error("line {line}: use of undefined value %{name}")]
    UndefinedValue { line: usize, name: String },
    #[error("line {line}: use of undefined label %{name}")]
    UndefinedLabel { line: usize, name: String },
    #[error("line {line}: unknown table @{name}")]
    UnknownTable { line: usize, name: String },
    #[error("line {line}: %{name} is defined twice")]
    Redefinition { line: usize, name: String },
    #[error("line {line}: block %{name} has no terminator")]
    MissingTerminator { line: usize, name: String },
    #[error("unexpected end of input")]
    UnexpectedEof,
}

// ── Lexer ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
enum Tok {
    /// `%name`
    Local(String),
    /// `@name`
    Global(String),
    /// `!name` or `!123`
    Meta(String),
    Word(String),
    Int(i64),
    Punct(char),
    Arrow,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Local(n) => format!("%{n}"),
            Tok::Global(n) => format!("@{n}"),
            Tok::Meta(n) => format!("!{n}"),
            Tok::Word(w) => format!("`{w}`"),
            Tok::Int(v) => v.to_string(),
            Tok::Punct(c) => format!("`{c}`"),
            Tok::Arrow => "`->`".to_string(),
        }
    }
}

fn is_name_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn lex(src: &str) -> Result<Vec<(Tok, usize)>, ParseError> {
    let mut toks = Vec::new();
    for (lineno, line) in src.lines().enumerate() {
        let line_no = lineno + 1;
        let line = line.split(';').next().unwrap_or("");
        let chars: Vec<char> = line.chars().collect();
        let mut i = 0;
        let take_name = |i: &mut usize| {
            let start = *i;
            while *i < chars.len() && is_name_char(chars[*i]) {
                *i += 1;
            }
            chars[start..*i].iter().collect::<String>()
        };
        while i < chars.len() {
            let c = chars[i];
            if c.is_whitespace() {
                i += 1;
                continue;
            }
            let tok = match c {
                '%' | '@' | '!' => {
                    i += 1;
                    let name = take_name(&mut i);
                    if name.is_empty() {
                        return Err(ParseError::Unexpected {
                            line: line_no,
                            expected: "a name".into(),
                            found: format!("`{c}`"),
                        });
                    }
                    match c {
                        '%' => Tok::Local(name),
                        '@' => Tok::Global(name),
                        _ => Tok::Meta(name),
                    }
                }
                '-' if chars.get(i + 1) == Some(&'>') => {
                    i += 2;
                    Tok::Arrow
                }
                '-' | '0'..='9' => {
                    let start = i;
                    i += 1;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                    let text: String = chars[start..i].iter().collect();
                    let value = text.parse::<i64>().or_else(|_| {
                        text.parse::<u64>().map(|u| u as i64)
                    });
                    match value {
                        Ok(v) => Tok::Int(v),
                        Err(_) => {
                            return Err(ParseError::Unexpected {
                                line: line_no,
                                expected: "an integer".into(),
                                found: format!("`{text}`"),
                            })
                        }
                    }
                }
                c if c.is_ascii_alphabetic() || c == '_' => Tok::Word(take_name(&mut i)),
                _ => {
                    i += 1;
                    Tok::Punct(c)
                }
            };
            toks.push((tok, line_no));
        }
    }
    Ok(toks)
}

// ── Parser ───────────────────────────────────────────────────────────────────

/// Where a forward reference has to be patched.
#[derive(Debug, Clone, Copy)]
enum Site {
    Inst(InstId),
    Term(BlockId),
}

#[derive(Debug)]
struct Fixup {
    site: Site,
    operand: usize,
    name: String,
    line: usize,
}

struct Parser {
    toks: Vec<(Tok, usize)>,
    pos: usize,
    func: Function,
    labels: HashMap<String, BlockId>,
    values: HashMap<String, Value>,
    /// Unresolved operands of the statement being parsed, in operand order.
    pending: Vec<Option<(String, usize)>>,
    fixups: Vec<Fixup>,
}

impl Parser {
    fn line(&self) -> usize {
        self.toks
            .get(self.pos)
            .or_else(|| self.toks.last())
            .map_or(0, |t| t.1)
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|t| &t.0)
    }

    fn peek_at(&self, n: usize) -> Option<&Tok> {
        self.toks.get(self.pos + n).map(|t| &t.0)
    }

    fn next(&mut self) -> Result<Tok, ParseError> {
        let tok = self
            .toks
            .get(self.pos)
            .map(|t| t.0.clone())
            .ok_or(ParseError::UnexpectedEof)?;
        self.pos += 1;
        Ok(tok)
    }

    fn unexpected<T>(&self, expected: &str) -> Result<T, ParseError> {
        match self.peek() {
            Some(tok) => Err(ParseError::Unexpected {
                line: self.line(),
                expected: expected.to_string(),
                found: tok.describe(),
            }),
            None => Err(ParseError::UnexpectedEof),
        }
    }

    fn expect_punct(&mut self, c: char) -> Result<(), ParseError> {
        if self.peek() == Some(&Tok::Punct(c)) {
            self.pos += 1;
            Ok(())
        } else {
            self.unexpected(&format!("`{c}`"))
        }
    }

    fn eat_punct(&mut self, c: char) -> bool {
        if self.peek() == Some(&Tok::Punct(c)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_word(&mut self, w: &str) -> Result<(), ParseError> {
        if self.eat_word(w) {
            Ok(())
        } else {
            self.unexpected(&format!("`{w}`"))
        }
    }

    fn eat_word(&mut self, w: &str) -> bool {
        if matches!(self.peek(), Some(Tok::Word(x)) if x == w) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn word(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Tok::Word(w)) => {
                let w = w.clone();
                self.pos += 1;
                Ok(w)
            }
            _ => self.unexpected("a keyword"),
        }
    }

    fn global(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Tok::Global(g)) => {
                let g = g.clone();
                self.pos += 1;
                Ok(g)
            }
            _ => self.unexpected("`@name`"),
        }
    }

    fn local(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            Some(Tok::Local(l)) => {
                let l = l.clone();
                self.pos += 1;
                Ok(l)
            }
            _ => self.unexpected("`%name`"),
        }
    }

    fn int(&mut self) -> Result<i64, ParseError> {
        match self.peek() {
            Some(Tok::Int(v)) => {
                let v = *v;
                self.pos += 1;
                Ok(v)
            }
            Some(Tok::Word(w)) if w == "true" || w == "false" => {
                let v = (w == "true") as i64;
                self.pos += 1;
                Ok(v)
            }
            _ => self.unexpected("an integer"),
        }
    }

    fn ty(&mut self) -> Result<Type, ParseError> {
        if let Some(Tok::Word(w)) = self.peek() {
            if let Some(ty) = Type::from_mnemonic(w) {
                self.pos += 1;
                return Ok(ty);
            }
        }
        self.unexpected("a type")
    }

    fn label_ref(&mut self) -> Result<BlockId, ParseError> {
        self.expect_word("label")?;
        let line = self.line();
        let name = self.local()?;
        self.block_named(&name, line)
    }

    fn block_named(&self, name: &str, line: usize) -> Result<BlockId, ParseError> {
        self.labels
            .get(name)
            .copied()
            .ok_or_else(|| ParseError::UndefinedLabel {
                line,
                name: name.to_string(),
            })
    }

    /// Parses an operand of type `ty`, recording it in `pending`.
    fn value(&mut self, ty: Type) -> Result<Value, ParseError> {
        let line = self.line();
        let v = match self.next()? {
            Tok::Local(name) => match self.values.get(&name) {
                Some(v) => *v,
                None => {
                    self.pending.push(Some((name, line)));
                    return Ok(Value::Undef(ty));
                }
            },
            Tok::Int(v) => Value::constant(ty, v),
            Tok::Word(w) if w == "true" => Value::constant(ty, 1),
            Tok::Word(w) if w == "false" => Value::constant(ty, 0),
            Tok::Word(w) if w == "undef" => Value::Undef(ty),
            Tok::Word(w) if w == "null" => Value::constant(Type::Ptr, 0),
            Tok::Word(w) if w == "blockaddress" => {
                self.expect_punct('(')?;
                let line = self.line();
                let name = self.local()?;
                self.expect_punct(')')?;
                Value::BlockAddr(self.block_named(&name, line)?)
            }
            tok => {
                return Err(ParseError::Unexpected {
                    line,
                    expected: "a value".into(),
                    found: tok.describe(),
                })
            }
        };
        self.pending.push(None);
        Ok(v)
    }

    fn typed_value(&mut self) -> Result<Value, ParseError> {
        let ty = self.ty()?;
        self.value(ty)
    }

    fn typed_args(&mut self) -> Result<Vec<Value>, ParseError> {
        self.expect_punct('(')?;
        let mut args = Vec::new();
        if !self.eat_punct(')') {
            loop {
                args.push(self.typed_value()?);
                if self.eat_punct(')') {
                    break;
                }
                self.expect_punct(',')?;
            }
        }
        Ok(args)
    }

    fn flush_pending(&mut self, site: Site) {
        for (operand, p) in std::mem::take(&mut self.pending).into_iter().enumerate() {
            if let Some((name, line)) = p {
                self.fixups.push(Fixup {
                    site,
                    operand,
                    name,
                    line,
                });
            }
        }
    }

    fn define(&mut self, name: String, v: Value, line: usize) -> Result<(), ParseError> {
        if self.values.insert(name.clone(), v).is_some() {
            return Err(ParseError::Redefinition { line, name });
        }
        Ok(())
    }

    // ── Top level ────────────────────────────────────────────────────────────

    fn table(&mut self) -> Result<(), ParseError> {
        self.expect_word("table")?;
        let name = self.global()?;
        let elem_ty = self.ty()?;
        self.expect_punct('[')?;
        let mut values = Vec::new();
        if !self.eat_punct(']') {
            loop {
                values.push(Constant::new(elem_ty, self.int()?));
                if self.eat_punct(']') {
                    break;
                }
                self.expect_punct(',')?;
            }
        }
        self.func.tables.push(ConstTable {
            name,
            elem_ty,
            values,
        });
        Ok(())
    }

    fn header(&mut self) -> Result<(), ParseError> {
        self.expect_word("func")?;
        self.func.name = self.global()?;
        self.expect_punct('(')?;
        if !self.eat_punct(')') {
            loop {
                let ty = self.ty()?;
                let line = self.line();
                let name = self.local()?;
                let idx = self.func.params.len() as u32;
                self.define(name.clone(), Value::Arg(idx), line)?;
                self.func.params.push((name, ty));
                if self.eat_punct(')') {
                    break;
                }
                self.expect_punct(',')?;
            }
        }
        if self.peek() == Some(&Tok::Arrow) {
            self.pos += 1;
            self.func.ret_ty = self.ty()?;
        }
        self.expect_punct('{')
    }

    /// Creates every block up front so branches may name later labels.
    fn declare_labels(&mut self) -> Result<(), ParseError> {
        let mut depth = 0usize;
        for idx in self.pos..self.toks.len() {
            match &self.toks[idx].0 {
                Tok::Punct('}') if depth == 0 => break,
                Tok::Punct('[') | Tok::Punct('(') => depth += 1,
                Tok::Punct(']') | Tok::Punct(')') => depth = depth.saturating_sub(1),
                Tok::Word(w) if depth == 0 => {
                    if self.toks.get(idx + 1).map(|t| &t.0) == Some(&Tok::Punct(':')) {
                        if self.labels.contains_key(w) {
                            return Err(ParseError::Redefinition {
                                line: self.toks[idx].1,
                                name: w.clone(),
                            });
                        }
                        let b = self.func.add_block(w);
                        self.labels.insert(w.clone(), b);
                    }
                }
                _ => {}
            }
        }
        Ok(())
    }

    fn body(&mut self) -> Result<(), ParseError> {
        let mut current: Option<(BlockId, bool)> = None;
        loop {
            if self.eat_punct('}') {
                break;
            }
            if let (Some(Tok::Word(w)), Some(Tok::Punct(':'))) = (self.peek(), self.peek_at(1)) {
                let name = w.clone();
                if let Some((b, false)) = current {
                    return Err(ParseError::MissingTerminator {
                        line: self.line(),
                        name: self.func.block_name(b).to_string(),
                    });
                }
                current = Some((self.labels[&name], false));
                self.pos += 2;
                continue;
            }
            let Some((block, terminated)) = current else {
                return self.unexpected("a block label");
            };
            if terminated {
                return self.unexpected("a block label after the terminator");
            }
            if self.statement(block)? {
                current = Some((block, true));
            }
        }
        if let Some((b, false)) = current {
            return Err(ParseError::MissingTerminator {
                line: self.line(),
                name: self.func.block_name(b).to_string(),
            });
        }
        Ok(())
    }

    /// Parses one instruction or terminator; returns true for a terminator.
    fn statement(&mut self, block: BlockId) -> Result<bool, ParseError> {
        let line = self.line();
        let result = if matches!(self.peek(), Some(Tok::Local(_))) && self.peek_at(1) == Some(&Tok::Punct('=')) {
            let name = self.local()?;
            self.pos += 1;
            Some(name)
        } else {
            None
        };
        let op = self.word()?;
        if result.is_none() {
            if let Some(term) = self.terminator(&op)? {
                self.func.set_terminator(block, term);
                self.flush_pending(Site::Term(block));
                return Ok(true);
            }
        }
        let (kind, ty) = self.instruction(&op)?;
        let id = self.func.append_inst(block, kind, ty);
        self.flush_pending(Site::Inst(id));
        if let Some(name) = result {
            self.func.set_inst_name(id, name.clone());
            self.define(name, Value::Inst(id), line)?;
        }
        Ok(false)
    }

    fn instruction(&mut self, op: &str) -> Result<(InstKind, Type), ParseError> {
        if let Some(bin) = BinOp::from_mnemonic(op) {
            let ty = self.ty()?;
            let lhs = self.value(ty)?;
            self.expect_punct(',')?;
            let rhs = self.value(ty)?;
            return Ok((InstKind::Binary { op: bin, lhs, rhs }, ty));
        }
        if let Some(cast) = CastOp::from_mnemonic(op) {
            let value = self.typed_value()?;
            self.expect_word("to")?;
            let to = self.ty()?;
            return Ok((InstKind::Cast { op: cast, value }, to));
        }
        match op {
            "phi" => {
                let ty = self.ty()?;
                let mut incoming = Vec::new();
                loop {
                    self.expect_punct('[')?;
                    let v = self.value(ty)?;
                    self.expect_punct(',')?;
                    let line = self.line();
                    let name = self.local()?;
                    let b = self.block_named(&name, line)?;
                    self.expect_punct(']')?;
                    incoming.push((b, v));
                    if !self.eat_punct(',') {
                        break;
                    }
                }
                Ok((InstKind::Phi { incoming }, ty))
            }
            "icmp" => {
                let line = self.line();
                let pred_name = self.word()?;
                let pred = CmpPred::from_mnemonic(&pred_name).ok_or(ParseError::Unexpected {
                    line,
                    expected: "a comparison predicate".into(),
                    found: format!("`{pred_name}`"),
                })?;
                let ty = self.ty()?;
                let lhs = self.value(ty)?;
                self.expect_punct(',')?;
                let rhs = self.value(ty)?;
                Ok((InstKind::Cmp { pred, lhs, rhs }, Type::I1))
            }
            "select" => {
                let cond = self.value(Type::I1)?;
                self.expect_punct(',')?;
                let ty = self.ty()?;
                let on_true = self.value(ty)?;
                self.expect_punct(',')?;
                let on_false = self.value(ty)?;
                Ok((
                    InstKind::Select {
                        cond,
                        on_true,
                        on_false,
                    },
                    ty,
                ))
            }
            "load" => {
                let volatile = self.eat_word("volatile");
                let ty = self.ty()?;
                self.expect_punct(',')?;
                let ptr = self.value(Type::Ptr)?;
                Ok((InstKind::Load { ptr, volatile }, ty))
            }
            "store" => {
                let volatile = self.eat_word("volatile");
                let value = self.typed_value()?;
                self.expect_punct(',')?;
                let ptr = self.value(Type::Ptr)?;
                Ok((
                    InstKind::Store {
                        ptr,
                        value,
                        volatile,
                    },
                    Type::Void,
                ))
            }
            "call" => {
                let mut flags = CallFlags::default();
                loop {
                    if self.eat_word("musttail") {
                        flags.musttail = true;
                    } else if self.eat_word("nomerge") {
                        flags.nomerge = true;
                    } else if self.eat_word("readnone") {
                        flags.readnone = true;
                    } else if self.eat_word("nounwind") {
                        flags.nounwind = true;
                    } else {
                        break;
                    }
                }
                let ty = self.ty()?;
                let callee = self.global()?;
                let args = self.typed_args()?;
                Ok((
                    InstKind::Call {
                        callee,
                        args,
                        flags,
                    },
                    ty,
                ))
            }
            "tableload" => {
                let ty = self.ty()?;
                self.expect_punct(',')?;
                let line = self.line();
                let name = self.global()?;
                let table = self
                    .func
                    .tables
                    .iter()
                    .position(|t| t.name == name)
                    .ok_or(ParseError::UnknownTable { line, name })?;
                self.expect_punct(',')?;
                let index = self.typed_value()?;
                Ok((
                    InstKind::TableLoad {
                        table: TableId(table as u32),
                        index,
                    },
                    ty,
                ))
            }
            "landingpad" => Ok((InstKind::LandingPad, Type::Token)),
            "cleanuppad" => Ok((InstKind::CleanupPad, Type::Token)),
            "dbg" => {
                let value = self.typed_value()?;
                self.expect_punct(',')?;
                let line = self.line();
                let loc = match self.next()? {
                    Tok::Meta(m) => m.parse::<u32>().ok(),
                    _ => None,
                };
                let loc = loc.ok_or(ParseError::Unexpected {
                    line,
                    expected: "a location `!N`".into(),
                    found: "something else".into(),
                })?;
                Ok((InstKind::Debug { value, loc }, Type::Void))
            }
            other => Err(ParseError::Unexpected {
                line: self.line(),
                expected: "an instruction".into(),
                found: format!("`{other}`"),
            }),
        }
    }

    fn weights(&mut self) -> Result<Option<Vec<u32>>, ParseError> {
        if self.peek() != Some(&Tok::Meta("prof".into())) {
            return Ok(None);
        }
        self.pos += 1;
        let mut w = Vec::new();
        loop {
            w.push(self.int()? as u32);
            if !self.eat_punct(',') {
                break;
            }
        }
        Ok(Some(w))
    }

    fn terminator(&mut self, op: &str) -> Result<Option<Terminator>, ParseError> {
        let term = match op {
            "br" => {
                if matches!(self.peek(), Some(Tok::Word(w)) if w == "label") {
                    Terminator::Br {
                        target: self.label_ref()?,
                    }
                } else {
                    let cond = self.value(Type::I1)?;
                    self.expect_punct(',')?;
                    let if_true = self.label_ref()?;
                    self.expect_punct(',')?;
                    let if_false = self.label_ref()?;
                    let line = self.line();
                    let weights = match self.weights()? {
                        None => None,
                        Some(w) if w.len() == 2 => Some([w[0], w[1]]),
                        Some(_) => {
                            return Err(ParseError::Unexpected {
                                line,
                                expected: "two branch weights".into(),
                                found: "a different count".into(),
                            })
                        }
                    };
                    Terminator::CondBr {
                        cond,
                        if_true,
                        if_false,
                        weights,
                    }
                }
            }
            "switch" => {
                let ty = self.ty()?;
                let cond = self.value(ty)?;
                self.expect_punct(',')?;
                let default = self.label_ref()?;
                self.expect_punct('[')?;
                let mut cases = Vec::new();
                while !self.eat_punct(']') {
                    let value = Constant::new(ty, self.int()?);
                    self.expect_punct(',')?;
                    let dest = self.label_ref()?;
                    cases.push(SwitchCase { value, dest });
                }
                let weights = self.weights()?;
                Terminator::Switch {
                    cond,
                    default,
                    cases,
                    weights,
                }
            }
            "ret" => {
                if self.eat_word("void") {
                    Terminator::Ret { value: None }
                } else {
                    Terminator::Ret {
                        value: Some(self.typed_value()?),
                    }
                }
            }
            "unreachable" => Terminator::Unreachable,
            "resume" => Terminator::Resume {
                value: self.value(Type::Token)?,
            },
            "cleanupret" => {
                let pad = self.value(Type::Token)?;
                self.expect_word("unwind")?;
                let unwind = if self.eat_word("to") {
                    self.expect_word("caller")?;
                    None
                } else {
                    Some(self.label_ref()?)
                };
                Terminator::CleanupRet { pad, unwind }
            }
            "indirectbr" => {
                let addr = self.typed_value()?;
                self.expect_punct(',')?;
                self.expect_punct('[')?;
                let mut dests = Vec::new();
                if !self.eat_punct(']') {
                    loop {
                        dests.push(self.label_ref()?);
                        if self.eat_punct(']') {
                            break;
                        }
                        self.expect_punct(',')?;
                    }
                }
                Terminator::IndirectBr { addr, dests }
            }
            "invoke" => {
                let callee = self.global()?;
                let args = self.typed_args()?;
                self.expect_word("to")?;
                let normal = self.label_ref()?;
                self.expect_word("unwind")?;
                let unwind = self.label_ref()?;
                Terminator::Invoke {
                    callee,
                    args,
                    normal,
                    unwind,
                }
            }
            _ => return Ok(None),
        };
        Ok(Some(term))
    }

    fn resolve(&mut self) -> Result<(), ParseError> {
        for fix in std::mem::take(&mut self.fixups) {
            let v = *self
                .values
                .get(&fix.name)
                .ok_or(ParseError::UndefinedValue {
                    line: fix.line,
                    name: fix.name.clone(),
                })?;
            match fix.site {
                Site::Inst(i) => self.func.inst_mut(i).kind.set_operand(fix.operand, v),
                Site::Term(b) => self.func.update_terminator(b, |t| {
                    let mut n = 0;
                    t.for_each_operand_mut(|op| {
                        if n == fix.operand {
                            *op = v;
                        }
                        n += 1;
                    });
                }),
            }
        }
        Ok(())
    }
}

/// Parses one function (with its preceding `table` declarations).
pub fn parse_function(src: &str) -> Result<Function, ParseError> {
    let toks = lex(src)?;
    let mut p = Parser {
        toks,
        pos: 0,
        func: Function::new("", Vec::new(), Type::Void),
        labels: HashMap::new(),
        values: HashMap::new(),
        pending: Vec::new(),
        fixups: Vec::new(),
    };
    while matches!(p.peek(), Some(Tok::Word(w)) if w == "table") {
        p.table()?;
    }
    p.header()?;
    p.declare_labels()?;
    p.body()?;
    p.resolve()?;
    if p.pos != p.toks.len() {
        return p.unexpected("end of input");
    }
    let mut func = p.func;
    // The function is freshly built; nothing to report to a dominator tree.
    func.take_dom_updates();
    Ok(func)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::printer::print_function;

    const DIAMOND: &str = "
func @f(i32 %x) -> i32 {
entry:
  %c = icmp eq i32 %x, 1
  br %c, label %a, label %b !prof 3, 7
a:
  br label %join
b:
  br label %join
join:
  %p = phi i32 [ 10, %a ], [ 4, %b ]
  ret i32 %p
}
";

    #[test]
    fn parses_diamond() {
        let f = parse_function(DIAMOND).unwrap();
        assert_eq!(f.name, "f");
        assert_eq!(f.block_count(), 4);
        let join = f.block_by_name("join").unwrap();
        assert_eq!(f.preds(join).len(), 2);
        let entry = f.entry();
        match f.terminator(entry) {
            Terminator::CondBr { weights, .. } => assert_eq!(*weights, Some([3, 7])),
            other => panic!("unexpected terminator {other:?}"),
        }
    }

    #[test]
    fn printer_output_parses_back() {
        let f = parse_function(DIAMOND).unwrap();
        let text = print_function(&f);
        let g = parse_function(&text).unwrap();
        assert_eq!(print_function(&g), text);
    }

    #[test]
    fn forward_references_in_loops() {
        let src = "
func @count(i32 %n) -> i32 {
entry:
  br label %loop
loop:
  %i = phi i32 [ 0, %entry ], [ %next, %loop ]
  %next = add i32 %i, 1
  %done = icmp eq i32 %next, %n
  br %done, label %exit, label %loop
exit:
  ret i32 %next
}
";
        let f = parse_function(src).unwrap();
        let lp = f.block_by_name("loop").unwrap();
        let phi = f.phis(lp)[0];
        let next = f.body(lp)[0];
        assert_eq!(f.phi_value(phi, lp), Some(Value::Inst(next)));
    }

    #[test]
    fn switch_and_tables() {
        let src = "
table @t i32 [7, 8, 9]
func @s(i32 %x) -> i32 {
entry:
  switch i32 %x, label %d [
    0, label %a
    1, label %a
  ] !prof 1, 2, 3
a:
  %v = tableload i32, @t, i32 %x
  ret i32 %v
d:
  ret i32 0
}
";
        let f = parse_function(src).unwrap();
        assert_eq!(f.tables[0].values.len(), 3);
        match f.terminator(f.entry()) {
            Terminator::Switch { cases, weights, .. } => {
                assert_eq!(cases.len(), 2);
                assert_eq!(weights.as_deref(), Some(&[1, 2, 3][..]));
            }
            other => panic!("unexpected terminator {other:?}"),
        }
    }

    #[test]
    fn undefined_value_reports_line() {
        let src = "func @f() -> i32 {\nentry:\n  ret i32 %nope\n}\n";
        assert_eq!(
            parse_function(src).unwrap_err(),
            ParseError::UndefinedValue {
                line: 3,
                name: "nope".into()
            }
        );
    }

    #[test]
    fn missing_terminator_is_an_error() {
        let src = "func @f() -> void {\nentry:\n  %x = add i32 1, 2\nnext:\n  ret void\n}\n";
        assert!(matches!(
            parse_function(src),
            Err(ParseError::MissingTerminator { .. })
        ));
    }
}
