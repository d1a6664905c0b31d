//! Rendering of the assembly AST to GAS/AT&T text via [`Display`].

use crate::codegen::*;
use crate::semantic_analysis::{StaticInit, StaticItem};

use std::fmt;

fn suffix(t: AsmType) -> char {
    match t {
        AsmType::Byte => 'b',
        AsmType::Word => 'w',
        AsmType::Longword => 'l',
        AsmType::Quadword => 'q',
    }
}

fn reg_name(reg: Register, t: AsmType) -> &'static str {
    use AsmType as T;
    use Register as R;
    match (reg, t) {
        (R::AX, T::Byte) => "%al",
        (R::AX, T::Word) => "%ax",
        (R::AX, T::Longword) => "%eax",
        (R::AX, T::Quadword) => "%rax",
        (R::CX, T::Byte) => "%cl",
        (R::CX, T::Word) => "%cx",
        (R::CX, T::Longword) => "%ecx",
        (R::CX, T::Quadword) => "%rcx",
        (R::DX, T::Byte) => "%dl",
        (R::DX, T::Word) => "%dx",
        (R::DX, T::Longword) => "%edx",
        (R::DX, T::Quadword) => "%rdx",
        (R::DI, T::Byte) => "%dil",
        (R::DI, T::Word) => "%di",
        (R::DI, T::Longword) => "%edi",
        (R::DI, T::Quadword) => "%rdi",
        (R::SI, T::Byte) => "%sil",
        (R::SI, T::Word) => "%si",
        (R::SI, T::Longword) => "%esi",
        (R::SI, T::Quadword) => "%rsi",
        (R::R8, T::Byte) => "%r8b",
        (R::R8, T::Word) => "%r8w",
        (R::R8, T::Longword) => "%r8d",
        (R::R8, T::Quadword) => "%r8",
        (R::R9, T::Byte) => "%r9b",
        (R::R9, T::Word) => "%r9w",
        (R::R9, T::Longword) => "%r9d",
        (R::R9, T::Quadword) => "%r9",
        (R::R10, T::Byte) => "%r10b",
        (R::R10, T::Word) => "%r10w",
        (R::R10, T::Longword) => "%r10d",
        (R::R10, T::Quadword) => "%r10",
    }
}

fn fmt_operand(op: &Operand, t: AsmType) -> String {
    match op {
        Operand::Imm(i) => format!("${i}"),
        Operand::Reg(r) => (*reg_name(*r, t)).to_string(),
        Operand::Stack(offset) => format!("{offset}(%rbp)"),
        Operand::Data(name) => format!("{name}(%rip)"),
        Operand::Memory(reg, 0) => format!("({})", reg_name(*reg, AsmType::Quadword)),
        Operand::Memory(reg, offset) => {
            format!("{offset}({})", reg_name(*reg, AsmType::Quadword))
        }
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let cc = match self {
            Self::E => "e",
            Self::NE => "ne",
            Self::G => "g",
            Self::GE => "ge",
            Self::L => "l",
            Self::LE => "le",
            Self::A => "a",
            Self::AE => "ae",
            Self::B => "b",
            Self::BE => "be",
        };
        write!(f, "{cc}")
    }
}

impl fmt::Display for AsmInstruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Mov(t, src, dst) => {
                write!(
                    f,
                    "mov{} {}, {}",
                    suffix(*t),
                    fmt_operand(src, *t),
                    fmt_operand(dst, *t)
                )
            }
            Self::Movsx { from, to, src, dst } => {
                let mnemonic = match (from, to) {
                    (AsmType::Byte, AsmType::Word) => "movsbw",
                    (AsmType::Byte, AsmType::Longword) => "movsbl",
                    (AsmType::Byte, AsmType::Quadword) => "movsbq",
                    (AsmType::Word, AsmType::Longword) => "movswl",
                    (AsmType::Word, AsmType::Quadword) => "movswq",
                    (AsmType::Longword, AsmType::Quadword) => "movslq",
                    _ => unreachable!("no sign extension from {from:?} to {to:?}"),
                };
                write!(
                    f,
                    "{mnemonic} {}, {}",
                    fmt_operand(src, *from),
                    fmt_operand(dst, *to)
                )
            }
            Self::Movzx { from, to, src, dst } => {
                let mnemonic = match (from, to) {
                    (AsmType::Byte, AsmType::Word) => "movzbw",
                    (AsmType::Byte, AsmType::Longword) => "movzbl",
                    (AsmType::Byte, AsmType::Quadword) => "movzbq",
                    (AsmType::Word, AsmType::Longword) => "movzwl",
                    (AsmType::Word, AsmType::Quadword) => "movzwq",
                    _ => unreachable!("no zero extension from {from:?} to {to:?}"),
                };
                write!(
                    f,
                    "{mnemonic} {}, {}",
                    fmt_operand(src, *from),
                    fmt_operand(dst, *to)
                )
            }
            Self::Lea(src, dst) => {
                write!(
                    f,
                    "leaq {}, {}",
                    fmt_operand(src, AsmType::Quadword),
                    fmt_operand(dst, AsmType::Quadword)
                )
            }
            Self::Unary(t, op, operand) => {
                let name = match op {
                    AsmUnaryOp::Neg => "neg",
                    AsmUnaryOp::Not => "not",
                };
                write!(f, "{name}{} {}", suffix(*t), fmt_operand(operand, *t))
            }
            Self::Binary(t, op @ (AsmBinaryOp::Sal | AsmBinaryOp::Sar | AsmBinaryOp::Shr), src, dst) =>
            {
                let name = match op {
                    AsmBinaryOp::Sal => "sal",
                    AsmBinaryOp::Sar => "sar",
                    _ => "shr",
                };
                // the shift count always travels in %cl
                let count = match src {
                    Operand::Reg(Register::CX) => "%cl".to_string(),
                    other => fmt_operand(other, *t),
                };
                write!(f, "{name}{} {count}, {}", suffix(*t), fmt_operand(dst, *t))
            }
            Self::Binary(t, op, src, dst) => {
                let name = match op {
                    AsmBinaryOp::Add => "add",
                    AsmBinaryOp::Sub => "sub",
                    AsmBinaryOp::Imul => "imul",
                    AsmBinaryOp::And => "and",
                    AsmBinaryOp::Or => "or",
                    AsmBinaryOp::Xor => "xor",
                    _ => unreachable!("shifts handled above"),
                };
                write!(
                    f,
                    "{name}{} {}, {}",
                    suffix(*t),
                    fmt_operand(src, *t),
                    fmt_operand(dst, *t)
                )
            }
            Self::Cmp(t, src, dst) => {
                write!(
                    f,
                    "cmp{} {}, {}",
                    suffix(*t),
                    fmt_operand(src, *t),
                    fmt_operand(dst, *t)
                )
            }
            Self::Idiv(t, operand) => {
                write!(f, "idiv{} {}", suffix(*t), fmt_operand(operand, *t))
            }
            Self::Div(t, operand) => {
                write!(f, "div{} {}", suffix(*t), fmt_operand(operand, *t))
            }
            Self::Cdq(AsmType::Quadword) => write!(f, "cqo"),
            Self::Cdq(_) => write!(f, "cdq"),
            Self::Jmp(label) => write!(f, "jmp .L{label}"),
            Self::JmpCC(cc, label) => write!(f, "j{cc} .L{label}"),
            Self::SetCC(cc, operand) => {
                write!(f, "set{cc} {}", fmt_operand(operand, AsmType::Byte))
            }
            Self::Label(label) => write!(f, ".L{label}:"),
            Self::AllocateStack(n) => write!(f, "subq ${n}, %rsp"),
            Self::DeallocateStack(n) => write!(f, "addq ${n}, %rsp"),
            Self::Push(operand) => {
                write!(f, "pushq {}", fmt_operand(operand, AsmType::Quadword))
            }
            Self::Call(name) => write!(f, "call {name}"),
            Self::CallIndirect(operand) => {
                write!(f, "call *{}", fmt_operand(operand, AsmType::Quadword))
            }
            Self::Ret => write!(f, "movq %rbp, %rsp\n\tpopq %rbp\n\tret"),
        }
    }
}

impl fmt::Display for AsmFunction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.global {
            writeln!(f, "\t.globl {}", self.name)?;
        }
        writeln!(f, "\t.text")?;
        writeln!(f, "{}:", self.name)?;
        writeln!(f, "\tpushq %rbp")?;
        writeln!(f, "\tmovq %rsp, %rbp")?;
        for instruction in &self.body {
            if matches!(instruction, AsmInstruction::Label(_)) {
                writeln!(f, "{instruction}")?;
            } else {
                writeln!(f, "\t{instruction}")?;
            }
        }
        Ok(())
    }
}

fn static_directive(f: &mut fmt::Formatter, width: crate::ast::Width, value: i64) -> fmt::Result {
    use crate::ast::Width;
    match width {
        Width::B1 => writeln!(f, "\t.byte {value}"),
        Width::B2 => writeln!(f, "\t.word {value}"),
        Width::B4 => writeln!(f, "\t.long {value}"),
        Width::B8 => writeln!(f, "\t.quad {value}"),
    }
}

impl fmt::Display for AsmStaticVar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let section = match self.init {
            StaticInit::Zero(_) => ".bss",
            _ => ".data",
        };
        if self.global {
            writeln!(f, "\t.globl {}", self.name)?;
        }
        writeln!(f, "\t{section}")?;
        writeln!(f, "\t.align {}", self.align)?;
        writeln!(f, "{}:", self.name)?;
        match &self.init {
            StaticInit::Zero(size) => writeln!(f, "\t.zero {size}"),
            StaticInit::Scalar { width, value } => static_directive(f, *width, *value),
            StaticInit::StringPtr(label) => writeln!(f, "\t.quad {label}"),
            StaticInit::Items(items) => {
                for item in items {
                    match item {
                        StaticItem::Scalar { width, value } => static_directive(f, *width, *value)?,
                        StaticItem::Zero(size) => writeln!(f, "\t.zero {size}")?,
                    }
                }
                Ok(())
            }
        }
    }
}

/// GAS string literal with printable ASCII kept and everything else in
/// octal escapes. `.string` appends the terminating NUL.
fn gas_escape(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() + 2);
    for &b in bytes {
        match b {
            b'\n' => out.push_str("\\n"),
            b'\t' => out.push_str("\\t"),
            b'\r' => out.push_str("\\r"),
            b'"' => out.push_str("\\\""),
            b'\\' => out.push_str("\\\\"),
            0x20..=0x7e => out.push(b as char),
            _ => out.push_str(&format!("\\{b:03o}")),
        }
    }
    out
}

impl fmt::Display for AsmProgram {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        for function in &self.functions {
            write!(f, "{function}")?;
        }
        for var in &self.statics {
            write!(f, "{var}")?;
        }
        if !self.strings.is_empty() {
            writeln!(f, "\t.section .rodata")?;
            for (label, bytes) in &self.strings {
                writeln!(f, "{label}:")?;
                writeln!(f, "\t.string \"{}\"", gas_escape(bytes))?;
            }
        }
        writeln!(f, "\t.section .note.GNU-stack,\"\",@progbits")
    }
}
