use super::asm_ast::*;
use crate::ast::Width;
use crate::ir::{self, CallTarget, Instruction as Ir, IrBinaryOp, IrUnaryOp, Value};
use crate::semantic_analysis::Env;

const ARG_REGISTERS: [Register; 6] = [
    Register::DI,
    Register::SI,
    Register::DX,
    Register::CX,
    Register::R8,
    Register::R9,
];

pub fn codegen(module: &ir::Module, env: &Env) -> AsmProgram {
    let functions = module.functions.iter().map(gen_function).collect();
    let statics = env
        .static_variables()
        .iter()
        .map(|v| AsmStaticVar {
            name: v.name.clone(),
            global: v.global,
            align: v.align,
            init: v.init.clone(),
        })
        .collect();
    let strings = env.string_literals().to_vec();
    AsmProgram {
        functions,
        statics,
        strings,
    }
}

fn gen_function(fun: &ir::Function) -> AsmFunction {
    let mut g = FnGen {
        fun,
        out: AsmInstructions::new(),
        pending_params: Vec::new(),
    };

    if fun.frame_size > 0 {
        g.out.push(AsmInstruction::AllocateStack(fun.frame_size));
    }
    // incoming register arguments are spilled for uniform slot access
    for (i, (name, width)) in fun.params.iter().take(6).enumerate() {
        let slot = fun.var_slot(name).expect("parameter has a slot");
        g.out.push(AsmInstruction::Mov(
            AsmType::from(*width),
            Operand::Reg(ARG_REGISTERS[i]),
            Operand::Stack(slot),
        ));
    }

    for instruction in &fun.body {
        g.gen_instruction(instruction);
    }

    AsmFunction {
        name: fun.name.clone(),
        global: fun.global,
        body: g.out,
    }
}

/// Access class of a normalized slot value: narrow objects are read and
/// written through 32-bit halves.
fn value_class(width: Width) -> AsmType {
    match width {
        Width::B8 => AsmType::Quadword,
        _ => AsmType::Longword,
    }
}

fn condition(op: IrBinaryOp, signed: bool) -> Condition {
    match (op, signed) {
        (IrBinaryOp::Eq, _) => Condition::E,
        (IrBinaryOp::Ne, _) => Condition::NE,
        (IrBinaryOp::Lt, true) => Condition::L,
        (IrBinaryOp::Le, true) => Condition::LE,
        (IrBinaryOp::Gt, true) => Condition::G,
        (IrBinaryOp::Ge, true) => Condition::GE,
        (IrBinaryOp::Lt, false) => Condition::B,
        (IrBinaryOp::Le, false) => Condition::BE,
        (IrBinaryOp::Gt, false) => Condition::A,
        (IrBinaryOp::Ge, false) => Condition::AE,
        _ => unreachable!("not a relational operator: {op:?}"),
    }
}

struct FnGen<'a> {
    fun: &'a ir::Function,
    out: AsmInstructions,
    pending_params: Vec<Value>,
}

impl FnGen<'_> {
    fn push(&mut self, i: AsmInstruction) {
        self.out.push(i);
    }

    fn resolve(&self, value: &Value) -> Operand {
        match value {
            Value::Imm(i) => Operand::Imm(*i),
            Value::Temp(id) => Operand::Stack(self.fun.temp_slot(*id)),
            Value::Var(name) => match self.fun.var_slot(name) {
                Some(slot) => Operand::Stack(slot),
                None => Operand::Data(name.clone()),
            },
        }
    }

    fn load(&mut self, value: &Value, reg: Register, t: AsmType) {
        let src = self.resolve(value);
        self.push(AsmInstruction::Mov(t, src, Operand::Reg(reg)));
    }

    fn store(&mut self, reg: Register, value: &Value, t: AsmType) {
        let dst = self.resolve(value);
        self.push(AsmInstruction::Mov(t, Operand::Reg(reg), dst));
    }

    /// Loads a memory operand into `%rax`/`%eax`, widening narrow reads.
    fn load_through(&mut self, src: Operand, width: Width, signed: bool) {
        match width {
            Width::B8 => self.push(AsmInstruction::Mov(
                AsmType::Quadword,
                src,
                Operand::Reg(Register::AX),
            )),
            Width::B4 => self.push(AsmInstruction::Mov(
                AsmType::Longword,
                src,
                Operand::Reg(Register::AX),
            )),
            narrow => {
                let from = AsmType::from(narrow);
                let instruction = if signed {
                    AsmInstruction::Movsx {
                        from,
                        to: AsmType::Longword,
                        src,
                        dst: Operand::Reg(Register::AX),
                    }
                } else {
                    AsmInstruction::Movzx {
                        from,
                        to: AsmType::Longword,
                        src,
                        dst: Operand::Reg(Register::AX),
                    }
                };
                self.push(instruction);
            }
        }
    }

    /// Computes base + index * elem_size into `%rdi`, the address register.
    fn index_address(&mut self, base: &Value, index: &Value, elem_size: u64) {
        self.load(base, Register::DI, AsmType::Quadword);
        self.load(index, Register::CX, AsmType::Quadword);
        self.push(AsmInstruction::Binary(
            AsmType::Quadword,
            AsmBinaryOp::Imul,
            Operand::Imm(elem_size as i64),
            Operand::Reg(Register::CX),
        ));
        self.push(AsmInstruction::Binary(
            AsmType::Quadword,
            AsmBinaryOp::Add,
            Operand::Reg(Register::CX),
            Operand::Reg(Register::DI),
        ));
    }

    fn gen_instruction(&mut self, instruction: &Ir) {
        match instruction {
            Ir::Mov { width, dst, src } => {
                let class = value_class(*width);
                self.load(src, Register::AX, class);
                self.store(Register::AX, dst, AsmType::from(*width));
            }
            Ir::Binary {
                op,
                signed,
                width,
                dst,
                lhs,
                rhs,
            } => self.gen_binary(*op, *signed, *width, dst, lhs, rhs),
            Ir::Unary {
                op,
                width,
                dst,
                src,
            } => self.gen_unary(*op, *width, dst, src),
            Ir::Load {
                width,
                signed,
                dst,
                addr,
            } => {
                self.load(addr, Register::DI, AsmType::Quadword);
                self.load_through(Operand::Memory(Register::DI, 0), *width, *signed);
                self.store(Register::AX, dst, value_class(*width));
            }
            Ir::Store { width, addr, src } => {
                self.load(addr, Register::DI, AsmType::Quadword);
                self.load(src, Register::CX, value_class(*width));
                self.push(AsmInstruction::Mov(
                    AsmType::from(*width),
                    Operand::Reg(Register::CX),
                    Operand::Memory(Register::DI, 0),
                ));
            }
            Ir::Lea { dst, name } => {
                let src = match self.fun.var_slot(name) {
                    Some(slot) => Operand::Stack(slot),
                    None => Operand::Data(name.clone()),
                };
                self.push(AsmInstruction::Lea(src, Operand::Reg(Register::AX)));
                self.store(Register::AX, dst, AsmType::Quadword);
            }
            Ir::LoadIndex {
                width,
                signed,
                dst,
                base,
                index,
                elem_size,
            } => {
                self.index_address(base, index, *elem_size);
                self.load_through(Operand::Memory(Register::DI, 0), *width, *signed);
                self.store(Register::AX, dst, value_class(*width));
            }
            Ir::StoreIndex {
                width,
                base,
                index,
                src,
                elem_size,
            } => {
                self.index_address(base, index, *elem_size);
                self.load(src, Register::CX, value_class(*width));
                self.push(AsmInstruction::Mov(
                    AsmType::from(*width),
                    Operand::Reg(Register::CX),
                    Operand::Memory(Register::DI, 0),
                ));
            }
            Ir::LoadMember {
                width,
                signed,
                dst,
                base,
                offset,
            } => {
                self.load(base, Register::DI, AsmType::Quadword);
                self.load_through(Operand::Memory(Register::DI, *offset as i64), *width, *signed);
                self.store(Register::AX, dst, value_class(*width));
            }
            Ir::StoreMember {
                width,
                base,
                offset,
                src,
            } => {
                self.load(base, Register::DI, AsmType::Quadword);
                self.load(src, Register::CX, value_class(*width));
                self.push(AsmInstruction::Mov(
                    AsmType::from(*width),
                    Operand::Reg(Register::CX),
                    Operand::Memory(Register::DI, *offset as i64),
                ));
            }
            Ir::Param(v) => self.pending_params.push(v.clone()),
            Ir::Call {
                dst,
                target,
                args,
                variadic,
            } => self.gen_call(dst.as_ref(), target, *args, *variadic),
            Ir::Ret(value) => {
                if let Some((v, w)) = value {
                    self.load(v, Register::AX, value_class(*w));
                }
                self.push(AsmInstruction::Ret);
            }
            Ir::Label(l) => self.push(AsmInstruction::Label(l.clone())),
            Ir::Jump(l) => self.push(AsmInstruction::Jmp(l.clone())),
            Ir::JumpIfZero {
                width,
                cond,
                target,
            } => self.gen_cond_jump(*width, cond, target, Condition::E),
            Ir::JumpIfNotZero {
                width,
                cond,
                target,
            } => self.gen_cond_jump(*width, cond, target, Condition::NE),
        }
    }

    fn gen_cond_jump(&mut self, width: Width, cond: &Value, target: &str, cc: Condition) {
        let t = value_class(width);
        self.load(cond, Register::AX, t);
        self.push(AsmInstruction::Cmp(
            t,
            Operand::Imm(0),
            Operand::Reg(Register::AX),
        ));
        self.push(AsmInstruction::JmpCC(cc, target.to_owned()));
    }

    fn gen_binary(
        &mut self,
        op: IrBinaryOp,
        signed: bool,
        width: Width,
        dst: &Value,
        lhs: &Value,
        rhs: &Value,
    ) {
        let t = value_class(width);

        if op.is_relational() {
            self.load(lhs, Register::AX, t);
            self.load(rhs, Register::CX, t);
            self.push(AsmInstruction::Cmp(
                t,
                Operand::Reg(Register::CX),
                Operand::Reg(Register::AX),
            ));
            let dst_op = self.resolve(dst);
            self.push(AsmInstruction::Mov(
                AsmType::Longword,
                Operand::Imm(0),
                dst_op.clone(),
            ));
            self.push(AsmInstruction::SetCC(condition(op, signed), dst_op));
            return;
        }

        if op.is_shift() {
            let aop = match op {
                IrBinaryOp::Shl => AsmBinaryOp::Sal,
                _ if signed => AsmBinaryOp::Sar,
                _ => AsmBinaryOp::Shr,
            };
            self.load(lhs, Register::AX, t);
            self.load(rhs, Register::CX, AsmType::Longword);
            self.push(AsmInstruction::Binary(
                t,
                aop,
                Operand::Reg(Register::CX),
                Operand::Reg(Register::AX),
            ));
            self.store(Register::AX, dst, t);
            return;
        }

        if op.is_divrem() {
            self.load(lhs, Register::AX, t);
            self.load(rhs, Register::CX, t);
            if signed {
                self.push(AsmInstruction::Cdq(t));
                self.push(AsmInstruction::Idiv(t, Operand::Reg(Register::CX)));
            } else {
                self.push(AsmInstruction::Mov(
                    t,
                    Operand::Imm(0),
                    Operand::Reg(Register::DX),
                ));
                self.push(AsmInstruction::Div(t, Operand::Reg(Register::CX)));
            }
            let result = if matches!(op, IrBinaryOp::Rem) {
                Register::DX
            } else {
                Register::AX
            };
            self.store(result, dst, t);
            return;
        }

        let aop = match op {
            IrBinaryOp::Add => AsmBinaryOp::Add,
            IrBinaryOp::Sub => AsmBinaryOp::Sub,
            IrBinaryOp::Mul => AsmBinaryOp::Imul,
            IrBinaryOp::And => AsmBinaryOp::And,
            IrBinaryOp::Or => AsmBinaryOp::Or,
            IrBinaryOp::Xor => AsmBinaryOp::Xor,
            _ => unreachable!("handled above"),
        };
        self.load(lhs, Register::AX, t);
        self.load(rhs, Register::CX, t);
        self.push(AsmInstruction::Binary(
            t,
            aop,
            Operand::Reg(Register::CX),
            Operand::Reg(Register::AX),
        ));
        self.store(Register::AX, dst, t);
    }

    fn gen_unary(&mut self, op: IrUnaryOp, width: Width, dst: &Value, src: &Value) {
        match op {
            IrUnaryOp::Negate | IrUnaryOp::Complement => {
                let t = value_class(width);
                let aop = if matches!(op, IrUnaryOp::Negate) {
                    AsmUnaryOp::Neg
                } else {
                    AsmUnaryOp::Not
                };
                self.load(src, Register::AX, t);
                self.push(AsmInstruction::Unary(t, aop, Operand::Reg(Register::AX)));
                self.store(Register::AX, dst, t);
            }
            IrUnaryOp::LogicalNot => {
                let t = value_class(width);
                self.load(src, Register::AX, t);
                self.push(AsmInstruction::Cmp(
                    t,
                    Operand::Imm(0),
                    Operand::Reg(Register::AX),
                ));
                let dst_op = self.resolve(dst);
                self.push(AsmInstruction::Mov(
                    AsmType::Longword,
                    Operand::Imm(0),
                    dst_op.clone(),
                ));
                self.push(AsmInstruction::SetCC(Condition::E, dst_op));
            }
            IrUnaryOp::SignExtend(from) => {
                let src_op = self.resolve(src);
                match from {
                    Width::B4 => {
                        self.push(AsmInstruction::Movsx {
                            from: AsmType::Longword,
                            to: AsmType::Quadword,
                            src: src_op,
                            dst: Operand::Reg(Register::AX),
                        });
                        self.store(Register::AX, dst, AsmType::Quadword);
                    }
                    Width::B8 => {
                        self.load(src, Register::AX, AsmType::Quadword);
                        self.store(Register::AX, dst, AsmType::Quadword);
                    }
                    narrow => {
                        let to = AsmType::from(width);
                        self.push(AsmInstruction::Movsx {
                            from: AsmType::from(narrow),
                            to,
                            src: src_op,
                            dst: Operand::Reg(Register::AX),
                        });
                        self.store(Register::AX, dst, to);
                    }
                }
            }
            IrUnaryOp::ZeroExtend(from) => {
                let src_op = self.resolve(src);
                match from {
                    Width::B4 | Width::B8 => {
                        // a 32-bit move clears the upper half
                        self.push(AsmInstruction::Mov(
                            AsmType::Longword,
                            src_op,
                            Operand::Reg(Register::AX),
                        ));
                        self.store(Register::AX, dst, AsmType::from(width));
                    }
                    narrow => {
                        self.push(AsmInstruction::Movzx {
                            from: AsmType::from(narrow),
                            to: AsmType::Longword,
                            src: src_op,
                            dst: Operand::Reg(Register::AX),
                        });
                        self.store(Register::AX, dst, AsmType::from(width));
                    }
                }
            }
        }
    }

    fn gen_call(
        &mut self,
        dst: Option<&(Value, Width)>,
        target: &CallTarget,
        args: usize,
        variadic: bool,
    ) {
        let split_at = self.pending_params.len() - args;
        let params: Vec<Value> = self.pending_params.split_off(split_at);

        let stack_args = if params.len() > 6 { &params[6..] } else { &[] };
        let padding = (stack_args.len() % 2) as u64 * 8;
        if padding != 0 {
            self.push(AsmInstruction::AllocateStack(padding));
        }

        for arg in stack_args.iter().rev() {
            let op = self.resolve(arg);
            match op {
                Operand::Imm(i) if i64::from(i as i32) != i => {
                    self.load(arg, Register::AX, AsmType::Quadword);
                    self.push(AsmInstruction::Push(Operand::Reg(Register::AX)));
                }
                other => self.push(AsmInstruction::Push(other)),
            }
        }

        for (arg, reg) in params.iter().zip(ARG_REGISTERS) {
            self.load(arg, reg, AsmType::Quadword);
        }

        let indirect_target = match target {
            CallTarget::Indirect(v) => {
                self.load(v, Register::R10, AsmType::Quadword);
                true
            }
            CallTarget::Direct(_) => false,
        };

        if variadic || indirect_target {
            // SysV: %al holds the number of vector registers used
            self.push(AsmInstruction::Mov(
                AsmType::Longword,
                Operand::Imm(0),
                Operand::Reg(Register::AX),
            ));
        }

        match target {
            CallTarget::Direct(name) => self.push(AsmInstruction::Call(name.clone())),
            CallTarget::Indirect(_) => {
                self.push(AsmInstruction::CallIndirect(Operand::Reg(Register::R10)));
            }
        }

        let unwind = 8 * stack_args.len() as u64 + padding;
        if unwind != 0 {
            self.push(AsmInstruction::DeallocateStack(unwind));
        }

        if let Some((v, w)) = dst {
            self.store(Register::AX, v, AsmType::from(*w));
        }
    }
}
