//! Three-address intermediate representation and its generator.
//!
//! Lowering is a post-order walk over the typed AST. Every value lives in
//! an 8-byte stack slot; narrow (`char`/`short`) objects are sign- or
//! zero-extended to 32 bits when read and truncated when stored, so every
//! operand a `Binary` sees is at least 32 bits wide. Constant folding of
//! literal operands is the only optimization performed.

#[cfg(test)]
mod ir_tests;

use crate::ast::*;
use crate::semantic_analysis::{round_up, Env, Symbol, SymbolKind};

use std::collections::HashMap;

pub type Instructions = Vec<Instruction>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    Imm(i64),
    Temp(u32),
    Var(Identifier),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrBinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
    And,
    Or,
    Xor,
    Shl,
    Shr,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
}

impl IrBinaryOp {
    #[inline]
    pub fn is_relational(self) -> bool {
        matches!(
            self,
            Self::Lt | Self::Le | Self::Gt | Self::Ge | Self::Eq | Self::Ne
        )
    }

    #[inline]
    pub fn is_shift(self) -> bool {
        matches!(self, Self::Shl | Self::Shr)
    }

    #[inline]
    pub fn is_divrem(self) -> bool {
        matches!(self, Self::Div | Self::Rem)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrUnaryOp {
    Negate,
    Complement,
    LogicalNot,
    /// Sign-extend from the given source width up to the instruction width.
    SignExtend(Width),
    ZeroExtend(Width),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallTarget {
    Direct(Identifier),
    Indirect(Value),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Mov {
        width: Width,
        dst: Value,
        src: Value,
    },
    Binary {
        op: IrBinaryOp,
        signed: bool,
        width: Width,
        dst: Value,
        lhs: Value,
        rhs: Value,
    },
    Unary {
        op: IrUnaryOp,
        width: Width,
        dst: Value,
        src: Value,
    },
    Load {
        width: Width,
        signed: bool,
        dst: Value,
        addr: Value,
    },
    Store {
        width: Width,
        addr: Value,
        src: Value,
    },
    /// Address of a named local slot or global symbol.
    Lea {
        dst: Value,
        name: Identifier,
    },
    LoadIndex {
        width: Width,
        signed: bool,
        dst: Value,
        base: Value,
        index: Value,
        elem_size: u64,
    },
    StoreIndex {
        width: Width,
        base: Value,
        index: Value,
        src: Value,
        elem_size: u64,
    },
    LoadMember {
        width: Width,
        signed: bool,
        dst: Value,
        base: Value,
        offset: u64,
    },
    StoreMember {
        width: Width,
        base: Value,
        offset: u64,
        src: Value,
    },
    Param(Value),
    Call {
        dst: Option<(Value, Width)>,
        target: CallTarget,
        args: usize,
        variadic: bool,
    },
    Ret(Option<(Value, Width)>),
    Label(Identifier),
    Jump(Identifier),
    JumpIfZero {
        width: Width,
        cond: Value,
        target: Identifier,
    },
    JumpIfNotZero {
        width: Width,
        cond: Value,
        target: Identifier,
    },
}

/// One lowered function: its instruction list plus the frame layout the
/// backend materializes.
#[derive(Debug)]
pub struct Function {
    pub name: Identifier,
    pub global: bool,
    /// Parameter slots in declaration order with their access widths.
    pub params: Vec<(Identifier, Width)>,
    pub frame_size: u64,
    var_slots: HashMap<Identifier, i64>,
    temp_slots: Vec<i64>,
    pub body: Instructions,
}

impl Function {
    pub fn var_slot(&self, name: &str) -> Option<i64> {
        self.var_slots.get(name).copied()
    }

    pub fn temp_slot(&self, id: u32) -> i64 {
        self.temp_slots[id as usize]
    }
}

#[derive(Debug)]
pub struct Module {
    pub functions: Vec<Function>,
}

#[derive(Default)]
struct FrameBuilder {
    offset: u64,
    var_slots: HashMap<Identifier, i64>,
    temp_slots: Vec<i64>,
}

impl FrameBuilder {
    fn alloc_var(&mut self, name: &str, size: u64) {
        if self.var_slots.contains_key(name) {
            return;
        }
        self.offset += round_up(size.max(1), 8);
        self.var_slots.insert(name.to_owned(), -(self.offset as i64));
    }

    /// Stack-passed parameters already have slots in the caller's frame.
    fn alloc_overflow_param(&mut self, name: &str, index: usize) {
        let offset = 16 + 8 * (index as i64 - 6);
        self.var_slots.insert(name.to_owned(), offset);
    }

    fn alloc_temp(&mut self) -> i64 {
        self.offset += 8;
        let slot = -(self.offset as i64);
        self.temp_slots.push(slot);
        slot
    }

    fn frame_size(&self) -> u64 {
        round_up(self.offset, 16)
    }
}

/// A place an assignment, load or address computation refers to.
enum Lvalue {
    /// A named local or global scalar, accessed by its slot or symbol.
    Plain { name: Identifier, t: Type },
    /// Target address held in a value (pointer dereference).
    Memory { addr: Value, t: Type },
    /// Pointer base plus scaled index.
    Indexed {
        base: Value,
        index: Value,
        elem_size: u64,
        t: Type,
    },
    /// Address of a struct or union member.
    Member { base: Value, offset: u64, t: Type },
}

impl Lvalue {
    fn value_type(&self) -> &Type {
        match self {
            Self::Plain { t, .. }
            | Self::Memory { t, .. }
            | Self::Indexed { t, .. }
            | Self::Member { t, .. } => t,
        }
    }
}

struct IrGen<'a> {
    env: &'a Env,
    instructions: Instructions,
    frame: FrameBuilder,
    temp_count: u32,
    label_count: u64,
    current_fn: Identifier,
}

pub fn lower(ast: &Ast, env: &Env) -> Module {
    let mut functions = Vec::new();
    let mut label_count = 0;
    for dec in &ast.declarations {
        if let Declaration::Fun(fundec) = dec {
            if fundec.body.is_some() {
                let mut gen = IrGen {
                    env,
                    instructions: Instructions::new(),
                    frame: FrameBuilder::default(),
                    temp_count: 0,
                    label_count,
                    current_fn: fundec.name.clone(),
                };
                functions.push(gen.emit_function(fundec));
                label_count = gen.label_count;
            }
        }
    }
    Module { functions }
}

impl IrGen<'_> {
    fn push(&mut self, instruction: Instruction) {
        self.instructions.push(instruction);
    }

    fn new_temp(&mut self) -> Value {
        let id = self.temp_count;
        self.temp_count += 1;
        self.frame.alloc_temp();
        Value::Temp(id)
    }

    fn new_label(&mut self, prefix: &str) -> Identifier {
        let c = self.label_count;
        self.label_count += 1;
        format!("{prefix}.{c}")
    }

    fn symbol(&self, name: &str) -> &Symbol {
        self.env
            .get_symbol(name)
            .unwrap_or_else(|| panic!("unknown symbol {name} reached the IR generator"))
    }

    fn width_of(&self, t: &Type) -> Width {
        self.env.width_of(t)
    }

    fn value_width(&self, t: &Type) -> Width {
        // values are normalized to at least 32 bits in slots
        match self.width_of(t) {
            Width::B1 | Width::B2 | Width::B4 => Width::B4,
            Width::B8 => Width::B8,
        }
    }

    /// Label for a user `goto` target, unique across the module.
    fn user_label(&self, label: &str) -> Identifier {
        format!("{}.{label}", self.current_fn)
    }

    // ----- functions -----

    fn emit_function(&mut self, fundec: &FunDec) -> Function {
        let mut params = Vec::with_capacity(fundec.params.len());
        for (i, (p, ptype)) in fundec
            .params
            .iter()
            .zip(fundec.fun_type.params.iter())
            .enumerate()
        {
            let resolved = self.env.resolve(ptype);
            let width = self.width_of(&resolved);
            if i < 6 {
                let size = self.env.size_of(&resolved).unwrap_or(8);
                self.frame.alloc_var(&p.name, size);
            } else {
                self.frame.alloc_overflow_param(&p.name, i);
            }
            params.push((p.name.clone(), width));
        }

        let body = fundec.body.as_ref().expect("definition has a body");
        self.emit_block(body);
        // a function that falls off the end still returns from rax
        self.push(Instruction::Ret(Some((Value::Imm(0), Width::B4))));

        let global = match self.symbol(&fundec.name).kind {
            SymbolKind::Fun { global, .. } => global,
            _ => true,
        };

        Function {
            name: fundec.name.clone(),
            global,
            params,
            frame_size: self.frame.frame_size(),
            var_slots: std::mem::take(&mut self.frame.var_slots),
            temp_slots: std::mem::take(&mut self.frame.temp_slots),
            body: std::mem::take(&mut self.instructions),
        }
    }

    fn emit_block(&mut self, block: &Block) {
        for item in &block.items {
            match item {
                BlockItem::S(st) => self.emit_statement(st),
                BlockItem::D(dec) => self.emit_declaration(dec),
            }
        }
    }

    fn emit_declaration(&mut self, dec: &VarDec) {
        if dec.storage_class.is_extern() {
            return;
        }
        let resolved = self.env.resolve(&dec.var_type);
        let size = self.env.size_of(&resolved).unwrap_or(8);
        self.frame.alloc_var(&dec.name, size);

        if let Some(Initializer::Scalar(exp)) = &dec.init {
            let value = self.emit_expression(exp);
            let lv = Lvalue::Plain {
                name: dec.name.clone(),
                t: resolved,
            };
            self.store_lvalue(&lv, value);
        }
    }

    // ----- statements -----

    fn emit_statement(&mut self, statement: &Statement) {
        use Statement as S;
        match statement {
            S::Return { exp, .. } => {
                let value = exp.as_ref().map(|e| {
                    let w = self.value_width(e.get_type());
                    (self.emit_expression(e), w)
                });
                self.push(Instruction::Ret(value));
            }
            S::Exp(e) => {
                let _ = self.emit_expression(e);
            }
            S::Null => (),
            S::Compound(block) => self.emit_block(block),
            S::If(if_st) => self.emit_if(if_st),
            S::While(while_st) => self.emit_while(while_st),
            S::DoWhile(dowhile) => self.emit_dowhile(dowhile),
            S::For(for_st) => self.emit_for(for_st),
            S::Switch(switch) => self.emit_switch(switch),
            S::Cased(cased) => {
                self.push(Instruction::Label(cased.label.clone()));
                self.emit_statement(&cased.body);
            }
            S::DCased(dcased) => {
                self.push(Instruction::Label(dcased.label.clone()));
                self.emit_statement(&dcased.body);
            }
            S::Break { label, .. } | S::Continue { label, .. } => {
                self.push(Instruction::Jump(label.clone()));
            }
            S::Goto { label, .. } => {
                let target = self.user_label(label);
                self.push(Instruction::Jump(target));
            }
            S::Labeled(name, st, _) => {
                let label = self.user_label(name);
                self.push(Instruction::Label(label));
                self.emit_statement(st);
            }
        }
    }

    fn emit_condition_jump(&mut self, cond: &Exp, target: Identifier, jump_if_zero: bool) {
        let width = self.value_width(cond.get_type());
        let value = self.emit_expression(cond);
        let instruction = if jump_if_zero {
            Instruction::JumpIfZero {
                width,
                cond: value,
                target,
            }
        } else {
            Instruction::JumpIfNotZero {
                width,
                cond: value,
                target,
            }
        };
        self.push(instruction);
    }

    fn emit_if(&mut self, if_st: &If) {
        let else_label = self.new_label("if_else");
        self.emit_condition_jump(&if_st.condition, else_label.clone(), true);
        self.emit_statement(&if_st.then);
        if let Some(els) = &if_st.els {
            let end_label = self.new_label("if_end");
            self.push(Instruction::Jump(end_label.clone()));
            self.push(Instruction::Label(else_label));
            self.emit_statement(els);
            self.push(Instruction::Label(end_label));
        } else {
            self.push(Instruction::Label(else_label));
        }
    }

    fn emit_while(&mut self, while_st: &While) {
        let continue_label = format!("continue_{}", while_st.label);
        let break_label = format!("break_{}", while_st.label);

        self.push(Instruction::Label(continue_label.clone()));
        self.emit_condition_jump(&while_st.condition, break_label.clone(), true);
        self.emit_statement(&while_st.body);
        self.push(Instruction::Jump(continue_label));
        self.push(Instruction::Label(break_label));
    }

    fn emit_dowhile(&mut self, dowhile: &DoWhile) {
        let start_label = format!("start_{}", dowhile.label);
        let continue_label = format!("continue_{}", dowhile.label);
        let break_label = format!("break_{}", dowhile.label);

        self.push(Instruction::Label(start_label.clone()));
        self.emit_statement(&dowhile.body);
        self.push(Instruction::Label(continue_label));
        self.emit_condition_jump(&dowhile.condition, start_label, false);
        self.push(Instruction::Label(break_label));
    }

    fn emit_for(&mut self, for_st: &For) {
        let start_label = format!("start_{}", for_st.label);
        let continue_label = format!("continue_{}", for_st.label);
        let break_label = format!("break_{}", for_st.label);

        match &for_st.init {
            ForInit::InitDecl(dec) => self.emit_declaration(dec),
            ForInit::InitExp(Some(exp)) => {
                let _ = self.emit_expression(exp);
            }
            ForInit::InitExp(None) => (),
        }

        self.push(Instruction::Label(start_label.clone()));
        if let Some(cond) = &for_st.condition {
            self.emit_condition_jump(cond, break_label.clone(), true);
        }
        self.emit_statement(&for_st.body);
        self.push(Instruction::Label(continue_label));
        if let Some(post) = &for_st.post {
            let _ = self.emit_expression(post);
        }
        self.push(Instruction::Jump(start_label));
        self.push(Instruction::Label(break_label));
    }

    fn emit_switch(&mut self, switch: &Switch) {
        let break_label = format!("break_{}", switch.label);
        let ctrl_t = self.env.resolve(switch.ctrl_exp.get_type());
        let width = self.value_width(&ctrl_t);
        let signed = ctrl_t.is_signed();
        let ctrl = self.emit_expression(&switch.ctrl_exp);

        // ordered compare-and-jump chain; the collected default jumps last
        let mut default_label = None;
        for (value, label) in &switch.cases {
            match value {
                Some(v) => {
                    let t = self.new_temp();
                    self.push(Instruction::Binary {
                        op: IrBinaryOp::Eq,
                        signed,
                        width,
                        dst: t.clone(),
                        lhs: ctrl.clone(),
                        rhs: Value::Imm(*v),
                    });
                    self.push(Instruction::JumpIfNotZero {
                        width: Width::B4,
                        cond: t,
                        target: label.clone(),
                    });
                }
                None => default_label = Some(label.clone()),
            }
        }
        let fallback = default_label.unwrap_or_else(|| break_label.clone());
        self.push(Instruction::Jump(fallback));

        self.emit_statement(&switch.body);
        self.push(Instruction::Label(break_label));
    }

    // ----- lvalues -----

    fn lvalue_ref(&mut self, exp: &Exp) -> Lvalue {
        let t = self.env.resolve(exp.get_type());
        match &exp.kind {
            ExpKind::Var(name) => Lvalue::Plain {
                name: name.clone(),
                t,
            },
            ExpKind::Deref(inner) => {
                let addr = self.emit_expression(inner);
                Lvalue::Memory { addr, t }
            }
            ExpKind::Subscript(base, index) => {
                let elem_size = self.env.size_of(&t).unwrap_or(8);
                let base = self.emit_expression(base);
                let index = self.emit_expression(index);
                Lvalue::Indexed {
                    base,
                    index,
                    elem_size,
                    t,
                }
            }
            ExpKind::Member {
                base,
                member,
                through_pointer,
            } => {
                let layout = self
                    .env
                    .layout_of(base.get_type())
                    .or_else(|| {
                        base.get_type()
                            .pointee()
                            .and_then(|p| self.env.layout_of(p))
                    })
                    .expect("member access on laid-out type");
                let offset = layout
                    .member(member)
                    .expect("member checked during validation")
                    .offset;
                let base = if *through_pointer {
                    self.emit_expression(base)
                } else {
                    self.addr_of_lvalue(base)
                };
                Lvalue::Member { base, offset, t }
            }
            other => panic!("not an lvalue in IR generation: {other:?}"),
        }
    }

    fn addr_of_lvalue(&mut self, exp: &Exp) -> Value {
        match &exp.kind {
            ExpKind::Var(name) => {
                let dst = self.new_temp();
                self.push(Instruction::Lea {
                    dst: dst.clone(),
                    name: name.clone(),
                });
                dst
            }
            ExpKind::Deref(inner) => self.emit_expression(inner),
            ExpKind::Subscript(base, index) => {
                let elem = self.env.resolve(exp.get_type());
                let elem_size = self.env.size_of(&elem).unwrap_or(8);
                let base = self.emit_expression(base);
                let index = self.emit_expression(index);
                let scaled = self.fold_or_binary(
                    IrBinaryOp::Mul,
                    true,
                    Width::B8,
                    index,
                    Value::Imm(elem_size as i64),
                );
                self.fold_or_binary(IrBinaryOp::Add, true, Width::B8, base, scaled)
            }
            ExpKind::Member {
                base,
                member,
                through_pointer,
            } => {
                let layout = self
                    .env
                    .layout_of(base.get_type())
                    .or_else(|| {
                        base.get_type()
                            .pointee()
                            .and_then(|p| self.env.layout_of(p))
                    })
                    .expect("member access on laid-out type");
                let offset = layout
                    .member(member)
                    .expect("member checked during validation")
                    .offset;
                let base = if *through_pointer {
                    self.emit_expression(base)
                } else {
                    self.addr_of_lvalue(base)
                };
                if offset == 0 {
                    base
                } else {
                    self.fold_or_binary(
                        IrBinaryOp::Add,
                        true,
                        Width::B8,
                        base,
                        Value::Imm(offset as i64),
                    )
                }
            }
            other => panic!("cannot take the address of {other:?}"),
        }
    }

    fn load_lvalue(&mut self, lv: &Lvalue) -> Value {
        let t = lv.value_type().clone();
        let width = self.width_of(&t);
        let signed = t.is_signed();
        match lv {
            Lvalue::Plain { name, .. } => self.read_var(name, &t),
            Lvalue::Memory { addr, .. } => {
                let dst = self.new_temp();
                self.push(Instruction::Load {
                    width,
                    signed,
                    dst: dst.clone(),
                    addr: addr.clone(),
                });
                dst
            }
            Lvalue::Indexed {
                base,
                index,
                elem_size,
                ..
            } => {
                let dst = self.new_temp();
                self.push(Instruction::LoadIndex {
                    width,
                    signed,
                    dst: dst.clone(),
                    base: base.clone(),
                    index: index.clone(),
                    elem_size: *elem_size,
                });
                dst
            }
            Lvalue::Member { base, offset, .. } => {
                let dst = self.new_temp();
                self.push(Instruction::LoadMember {
                    width,
                    signed,
                    dst: dst.clone(),
                    base: base.clone(),
                    offset: *offset,
                });
                dst
            }
        }
    }

    fn store_lvalue(&mut self, lv: &Lvalue, src: Value) {
        let width = self.width_of(lv.value_type());
        match lv {
            Lvalue::Plain { name, .. } => {
                self.push(Instruction::Mov {
                    width,
                    dst: Value::Var(name.clone()),
                    src,
                });
            }
            Lvalue::Memory { addr, .. } => {
                self.push(Instruction::Store {
                    width,
                    addr: addr.clone(),
                    src,
                });
            }
            Lvalue::Indexed {
                base,
                index,
                elem_size,
                ..
            } => {
                self.push(Instruction::StoreIndex {
                    width,
                    base: base.clone(),
                    index: index.clone(),
                    src,
                    elem_size: *elem_size,
                });
            }
            Lvalue::Member { base, offset, .. } => {
                self.push(Instruction::StoreMember {
                    width,
                    base: base.clone(),
                    offset: *offset,
                    src,
                });
            }
        }
    }

    /// Reads a named scalar, widening narrow objects to 32 bits.
    fn read_var(&mut self, name: &str, t: &Type) -> Value {
        let width = self.width_of(t);
        if matches!(width, Width::B1 | Width::B2) {
            let op = if t.is_signed() {
                IrUnaryOp::SignExtend(width)
            } else {
                IrUnaryOp::ZeroExtend(width)
            };
            let dst = self.new_temp();
            self.push(Instruction::Unary {
                op,
                width: Width::B4,
                dst: dst.clone(),
                src: Value::Var(name.to_owned()),
            });
            dst
        } else {
            Value::Var(name.to_owned())
        }
    }

    // ----- expressions -----

    fn emit_expression(&mut self, exp: &Exp) -> Value {
        match &exp.kind {
            ExpKind::Constant(c) => Value::Imm(c.as_i64()),
            ExpKind::StringLit { label, .. } => {
                let label = label.clone().expect("string interned during validation");
                let dst = self.new_temp();
                self.push(Instruction::Lea {
                    dst: dst.clone(),
                    name: label,
                });
                dst
            }
            ExpKind::Var(name) => {
                let symbol = self.symbol(name);
                if let Some(v) = symbol.enum_value() {
                    return Value::Imm(v);
                }
                let t = self.env.resolve(&symbol.sym_type.clone());
                self.read_var(name, &t)
            }
            ExpKind::Unary(op, inner) => self.emit_unary(*op, inner, exp),
            ExpKind::Binary(op, lhs, rhs) => self.emit_binary(*op, lhs, rhs, exp),
            ExpKind::Assignment { op, lhs, rhs } => self.emit_assignment(*op, lhs, rhs),
            ExpKind::Conditional {
                condition,
                then,
                els,
            } => self.emit_conditional(condition, then, els, exp),
            ExpKind::Call { callee, args } => self.emit_call(callee, args, exp),
            ExpKind::Subscript(..) | ExpKind::Member { .. } | ExpKind::Deref(_) => {
                let lv = self.lvalue_ref(exp);
                self.load_lvalue(&lv)
            }
            ExpKind::AddrOf(inner) => self.addr_of_lvalue(inner),
            ExpKind::Cast(target, inner) => {
                let from = self.env.resolve(inner.get_type());
                let value = self.emit_expression(inner);
                let to = self.env.resolve(target);
                self.convert_value(value, &from, &to)
            }
            ExpKind::Comma(lhs, rhs) => {
                let _ = self.emit_expression(lhs);
                self.emit_expression(rhs)
            }
            ExpKind::SizeofExp(_) | ExpKind::SizeofType(_) => {
                unreachable!("sizeof folded during validation")
            }
        }
    }

    /// Converts a value between scalar types: widening extends by the
    /// source signedness, narrowing truncates and re-normalizes.
    fn convert_value(&mut self, value: Value, from: &Type, to: &Type) -> Value {
        if to.is_void() {
            return value;
        }
        if let Value::Imm(v) = value {
            return Value::Imm(Const::Long(v).convert_to(to).as_i64());
        }
        // values in slots are already normalized to 32 bits
        let from_w = self.value_width(from);
        let to_w = self.width_of(to);

        if to_w == from_w || (matches!(to_w, Width::B1 | Width::B2) && from_w == Width::B4) {
            // same width, or narrowing that the next store/read normalizes
            if matches!(to_w, Width::B1 | Width::B2) {
                return self.truncate(value, to_w, to.is_signed());
            }
            return value;
        }

        if to_w == Width::B8 {
            let op = if from.is_signed() {
                IrUnaryOp::SignExtend(from_w)
            } else {
                IrUnaryOp::ZeroExtend(from_w)
            };
            let dst = self.new_temp();
            self.push(Instruction::Unary {
                op,
                width: Width::B8,
                dst: dst.clone(),
                src: value,
            });
            return dst;
        }

        // 64 -> 32: the backend reads the low half
        if to_w == Width::B4 {
            let dst = self.new_temp();
            self.push(Instruction::Mov {
                width: Width::B4,
                dst: dst.clone(),
                src: value,
            });
            return dst;
        }

        self.truncate(value, to_w, to.is_signed())
    }

    fn truncate(&mut self, value: Value, to_w: Width, signed: bool) -> Value {
        let t1 = self.new_temp();
        self.push(Instruction::Mov {
            width: to_w,
            dst: t1.clone(),
            src: value,
        });
        let op = if signed {
            IrUnaryOp::SignExtend(to_w)
        } else {
            IrUnaryOp::ZeroExtend(to_w)
        };
        let dst = self.new_temp();
        self.push(Instruction::Unary {
            op,
            width: Width::B4,
            dst: dst.clone(),
            src: t1,
        });
        dst
    }

    fn emit_unary(&mut self, op: UnaryOp, inner: &Exp, exp: &Exp) -> Value {
        match op {
            UnaryOp::Plus => self.emit_expression(inner),
            UnaryOp::Negate | UnaryOp::Complement => {
                let width = self.value_width(exp.get_type());
                let src = self.emit_expression(inner);
                if let Value::Imm(v) = src {
                    let folded = match op {
                        UnaryOp::Negate => v.wrapping_neg(),
                        _ => !v,
                    };
                    return Value::Imm(truncate_imm(folded, width));
                }
                let ir_op = if matches!(op, UnaryOp::Negate) {
                    IrUnaryOp::Negate
                } else {
                    IrUnaryOp::Complement
                };
                let dst = self.new_temp();
                self.push(Instruction::Unary {
                    op: ir_op,
                    width,
                    dst: dst.clone(),
                    src,
                });
                dst
            }
            UnaryOp::LogicalNot => {
                let width = self.value_width(inner.get_type());
                let src = self.emit_expression(inner);
                if let Value::Imm(v) = src {
                    return Value::Imm(i64::from(v == 0));
                }
                let dst = self.new_temp();
                self.push(Instruction::Unary {
                    op: IrUnaryOp::LogicalNot,
                    width,
                    dst: dst.clone(),
                    src,
                });
                dst
            }
            _ => self.emit_incdec(op, inner),
        }
    }

    /// `++`/`--` evaluate their operand's address once; pointers step by
    /// the pointee size.
    fn emit_incdec(&mut self, op: UnaryOp, inner: &Exp) -> Value {
        let lv = self.lvalue_ref(inner);
        let t = self.env.resolve(lv.value_type());
        let step = match t.pointee() {
            Some(pointee) => self.env.size_of(pointee).unwrap_or(1) as i64,
            None => 1,
        };
        let width = self.value_width(&t);
        let ir_op = if op.is_increment() {
            IrBinaryOp::Add
        } else {
            IrBinaryOp::Sub
        };

        let current = self.load_lvalue(&lv);
        if op.is_prefix() {
            let new = self.fold_or_binary(ir_op, t.is_signed(), width, current, Value::Imm(step));
            self.store_lvalue(&lv, new.clone());
            new
        } else {
            let saved = self.new_temp();
            self.push(Instruction::Mov {
                width,
                dst: saved.clone(),
                src: current.clone(),
            });
            let new = self.fold_or_binary(ir_op, t.is_signed(), width, current, Value::Imm(step));
            self.store_lvalue(&lv, new);
            saved
        }
    }

    fn emit_binary(&mut self, op: BinaryOp, lhs: &Exp, rhs: &Exp, exp: &Exp) -> Value {
        match op {
            BinaryOp::LogicalAnd => self.emit_logical_and(lhs, rhs),
            BinaryOp::LogicalOr => self.emit_logical_or(lhs, rhs),
            _ => {
                let lt = self.env.resolve(lhs.get_type());
                let rt = self.env.resolve(rhs.get_type());

                if lt.is_pointer() || rt.is_pointer() {
                    return self.emit_pointer_arith(op, lhs, &lt, rhs, &rt);
                }

                let signed = lt.is_signed();
                let width = if op.is_relational() {
                    self.value_width(&lt)
                } else {
                    self.value_width(exp.get_type())
                };
                let l = self.emit_expression(lhs);
                let r = self.emit_expression(rhs);
                self.fold_or_binary(ir_binop(op), signed, width, l, r)
            }
        }
    }

    fn emit_pointer_arith(
        &mut self,
        op: BinaryOp,
        lhs: &Exp,
        lt: &Type,
        rhs: &Exp,
        rt: &Type,
    ) -> Value {
        let l = self.emit_expression(lhs);
        let r = self.emit_expression(rhs);

        if op.is_relational() {
            // pointers compare as unsigned 64-bit values
            return self.fold_or_binary(ir_binop(op), false, Width::B8, l, r);
        }

        match (lt.is_pointer(), rt.is_pointer()) {
            (true, true) => {
                // ptr - ptr: byte difference scaled down to elements
                let elem = lt.pointee().expect("pointer operand");
                let size = self.env.size_of(elem).unwrap_or(1) as i64;
                let diff = self.fold_or_binary(IrBinaryOp::Sub, true, Width::B8, l, r);
                self.fold_or_binary(IrBinaryOp::Div, true, Width::B8, diff, Value::Imm(size))
            }
            (true, false) | (false, true) => {
                let (ptr, int, elem) = if lt.is_pointer() {
                    (l, r, lt.pointee().expect("pointer operand"))
                } else {
                    (r, l, rt.pointee().expect("pointer operand"))
                };
                let size = self.env.size_of(elem).unwrap_or(1) as i64;
                let scaled =
                    self.fold_or_binary(IrBinaryOp::Mul, true, Width::B8, int, Value::Imm(size));
                let ir_op = if matches!(op, BinaryOp::Subtract) {
                    IrBinaryOp::Sub
                } else {
                    IrBinaryOp::Add
                };
                self.fold_or_binary(ir_op, true, Width::B8, ptr, scaled)
            }
            _ => unreachable!("validated pointer arithmetic"),
        }
    }

    /// Emits a `Binary`, folding it to a literal when both operands are.
    fn fold_or_binary(
        &mut self,
        op: IrBinaryOp,
        signed: bool,
        width: Width,
        lhs: Value,
        rhs: Value,
    ) -> Value {
        if let (Value::Imm(l), Value::Imm(r)) = (&lhs, &rhs) {
            if let Some(v) = fold_binop(op, *l, *r, signed, width) {
                return Value::Imm(v);
            }
        }
        let dst = self.new_temp();
        self.push(Instruction::Binary {
            op,
            signed,
            width,
            dst: dst.clone(),
            lhs,
            rhs,
        });
        dst
    }

    fn emit_logical_and(&mut self, lhs: &Exp, rhs: &Exp) -> Value {
        let false_label = self.new_label("and_false");
        let end_label = self.new_label("and_end");
        let result = self.new_temp();

        self.emit_condition_jump(lhs, false_label.clone(), true);
        self.emit_condition_jump(rhs, false_label.clone(), true);
        self.push(Instruction::Mov {
            width: Width::B4,
            dst: result.clone(),
            src: Value::Imm(1),
        });
        self.push(Instruction::Jump(end_label.clone()));
        self.push(Instruction::Label(false_label));
        self.push(Instruction::Mov {
            width: Width::B4,
            dst: result.clone(),
            src: Value::Imm(0),
        });
        self.push(Instruction::Label(end_label));
        result
    }

    fn emit_logical_or(&mut self, lhs: &Exp, rhs: &Exp) -> Value {
        let true_label = self.new_label("or_true");
        let end_label = self.new_label("or_end");
        let result = self.new_temp();

        self.emit_condition_jump(lhs, true_label.clone(), false);
        self.emit_condition_jump(rhs, true_label.clone(), false);
        self.push(Instruction::Mov {
            width: Width::B4,
            dst: result.clone(),
            src: Value::Imm(0),
        });
        self.push(Instruction::Jump(end_label.clone()));
        self.push(Instruction::Label(true_label));
        self.push(Instruction::Mov {
            width: Width::B4,
            dst: result.clone(),
            src: Value::Imm(1),
        });
        self.push(Instruction::Label(end_label));
        result
    }

    fn emit_conditional(&mut self, condition: &Exp, then: &Exp, els: &Exp, exp: &Exp) -> Value {
        let else_label = self.new_label("cond_else");
        let end_label = self.new_label("cond_end");
        let width = self.value_width(exp.get_type());
        let result = self.new_temp();

        self.emit_condition_jump(condition, else_label.clone(), true);
        let v1 = self.emit_expression(then);
        self.push(Instruction::Mov {
            width,
            dst: result.clone(),
            src: v1,
        });
        self.push(Instruction::Jump(end_label.clone()));
        self.push(Instruction::Label(else_label));
        let v2 = self.emit_expression(els);
        self.push(Instruction::Mov {
            width,
            dst: result.clone(),
            src: v2,
        });
        self.push(Instruction::Label(end_label));
        result
    }

    fn emit_assignment(&mut self, op: Option<BinaryOp>, lhs: &Exp, rhs: &Exp) -> Value {
        let lv = self.lvalue_ref(lhs);
        let lt = self.env.resolve(lv.value_type());

        let value = match op {
            None => self.emit_expression(rhs),
            Some(bop) => {
                let rt = self.env.resolve(rhs.get_type());
                let current = self.load_lvalue(&lv);

                if lt.is_pointer() {
                    let elem = lt.pointee().expect("pointer compound assignment");
                    let size = self.env.size_of(elem).unwrap_or(1) as i64;
                    let r = self.emit_expression(rhs);
                    let scaled =
                        self.fold_or_binary(IrBinaryOp::Mul, true, Width::B8, r, Value::Imm(size));
                    let ir_op = if matches!(bop, BinaryOp::Subtract) {
                        IrBinaryOp::Sub
                    } else {
                        IrBinaryOp::Add
                    };
                    self.fold_or_binary(ir_op, true, Width::B8, current, scaled)
                } else if bop.is_shift() {
                    // the computation runs at the promoted width of the target
                    let width = self.value_width(&lt);
                    let r = self.emit_expression(rhs);
                    self.fold_or_binary(ir_binop(bop), lt.is_signed(), width, current, r)
                } else {
                    // the right side carries the common computation type
                    let width = self.value_width(&rt);
                    let signed = rt.is_signed();
                    let current = self.convert_value(current, &lt, &rt);
                    let r = self.emit_expression(rhs);
                    self.fold_or_binary(ir_binop(bop), signed, width, current, r)
                }
            }
        };

        self.store_lvalue(&lv, value);
        self.load_lvalue(&lv)
    }

    fn emit_call(&mut self, callee: &Exp, args: &[Exp], exp: &Exp) -> Value {
        let (target, variadic) = self.call_target(callee);

        let values: Vec<Value> = args.iter().map(|a| self.emit_expression(a)).collect();
        for v in values {
            self.push(Instruction::Param(v));
        }

        let rtype = self.env.resolve(exp.get_type());
        let dst = if rtype.is_void() {
            None
        } else {
            Some((self.new_temp(), self.value_width(&rtype)))
        };
        self.push(Instruction::Call {
            dst: dst.clone(),
            target,
            args: args.len(),
            variadic,
        });
        dst.map_or(Value::Imm(0), |(v, _)| v)
    }

    fn call_target(&mut self, callee: &Exp) -> (CallTarget, bool) {
        let fun_variadic = |t: &Type| -> bool {
            match &t.kind {
                TypeKind::Fun(ft) => ft.variadic,
                TypeKind::Pointer(inner) => inner.fun_type().is_some_and(|ft| ft.variadic),
                _ => true,
            }
        };

        // a named function, possibly behind the decay wrapper
        let named = match &callee.kind {
            ExpKind::Var(name) => Some(name),
            ExpKind::AddrOf(inner) => match &inner.kind {
                ExpKind::Var(name) => Some(name),
                _ => None,
            },
            _ => None,
        };
        if let Some(name) = named {
            if self.symbol(name).is_function() {
                let variadic = fun_variadic(&self.env.resolve(&self.symbol(name).sym_type.clone()));
                return (CallTarget::Direct(name.clone()), variadic);
            }
        }

        // calls through a pointer value, including `(*fp)(...)`
        let pointer_exp: &Exp = match &callee.kind {
            ExpKind::Deref(inner) if self.env.resolve(callee.get_type()).is_function() => inner,
            _ => callee,
        };
        let variadic = fun_variadic(&self.env.resolve(pointer_exp.get_type()));
        let value = self.emit_expression(pointer_exp);
        (CallTarget::Indirect(value), variadic)
    }
}

fn ir_binop(op: BinaryOp) -> IrBinaryOp {
    match op {
        BinaryOp::Add => IrBinaryOp::Add,
        BinaryOp::Subtract => IrBinaryOp::Sub,
        BinaryOp::Multiply => IrBinaryOp::Mul,
        BinaryOp::Divide => IrBinaryOp::Div,
        BinaryOp::Remainder => IrBinaryOp::Rem,
        BinaryOp::BitwiseAnd => IrBinaryOp::And,
        BinaryOp::BitwiseOr => IrBinaryOp::Or,
        BinaryOp::BitwiseXor => IrBinaryOp::Xor,
        BinaryOp::ShiftLeft => IrBinaryOp::Shl,
        BinaryOp::ShiftRight => IrBinaryOp::Shr,
        BinaryOp::LessThan => IrBinaryOp::Lt,
        BinaryOp::LessOrEqual => IrBinaryOp::Le,
        BinaryOp::GreaterThan => IrBinaryOp::Gt,
        BinaryOp::GreaterOrEqual => IrBinaryOp::Ge,
        BinaryOp::IsEqual => IrBinaryOp::Eq,
        BinaryOp::IsNotEqual => IrBinaryOp::Ne,
        BinaryOp::LogicalAnd | BinaryOp::LogicalOr => {
            unreachable!("short-circuit operators lower to control flow")
        }
    }
}

fn truncate_imm(v: i64, width: Width) -> i64 {
    match width {
        Width::B1 => i64::from(v as i8),
        Width::B2 => i64::from(v as i16),
        Width::B4 => i64::from(v as i32),
        Width::B8 => v,
    }
}

/// Compile-time evaluation of a literal-literal binary operation, with
/// the signedness the instruction would have used at runtime.
fn fold_binop(op: IrBinaryOp, l: i64, r: i64, signed: bool, width: Width) -> Option<i64> {
    let (l, r) = match width {
        Width::B4 if signed => (i64::from(l as i32), i64::from(r as i32)),
        Width::B4 => (i64::from(l as u32), i64::from(r as u32)),
        _ => (l, r),
    };
    let ul = l as u64;
    let ur = r as u64;
    let v = match op {
        IrBinaryOp::Add => l.wrapping_add(r),
        IrBinaryOp::Sub => l.wrapping_sub(r),
        IrBinaryOp::Mul => l.wrapping_mul(r),
        IrBinaryOp::Div => {
            if r == 0 {
                return None;
            }
            if signed {
                l.wrapping_div(r)
            } else {
                (ul / ur) as i64
            }
        }
        IrBinaryOp::Rem => {
            if r == 0 {
                return None;
            }
            if signed {
                l.wrapping_rem(r)
            } else {
                (ul % ur) as i64
            }
        }
        IrBinaryOp::And => l & r,
        IrBinaryOp::Or => l | r,
        IrBinaryOp::Xor => l ^ r,
        IrBinaryOp::Shl => l.wrapping_shl(r as u32),
        IrBinaryOp::Shr => {
            if signed {
                l.wrapping_shr(r as u32)
            } else {
                match width {
                    Width::B4 => i64::from((l as u32).wrapping_shr(r as u32)),
                    _ => (ul.wrapping_shr(r as u32)) as i64,
                }
            }
        }
        IrBinaryOp::Lt => i64::from(if signed { l < r } else { ul < ur }),
        IrBinaryOp::Le => i64::from(if signed { l <= r } else { ul <= ur }),
        IrBinaryOp::Gt => i64::from(if signed { l > r } else { ul > ur }),
        IrBinaryOp::Ge => i64::from(if signed { l >= r } else { ul >= ur }),
        IrBinaryOp::Eq => i64::from(l == r),
        IrBinaryOp::Ne => i64::from(l != r),
    };
    Some(truncate_imm(v, width))
}
