use crate::ast::*;

use std::collections::HashMap;

/// Folds an integer constant expression to its value. Identifiers are
/// looked up in the enum-constant table; anything with runtime behavior
/// (variables, calls, assignments) yields `None`.
pub fn eval(exp: &Exp, enums: &HashMap<Identifier, i64>) -> Option<i64> {
    match &exp.kind {
        ExpKind::Constant(c) => Some(c.as_i64()),
        ExpKind::Var(name) => enums.get(name).copied(),
        ExpKind::Unary(op, inner) => {
            let v = eval(inner, enums)?;
            match op {
                UnaryOp::Plus => Some(v),
                UnaryOp::Negate => Some(v.wrapping_neg()),
                UnaryOp::Complement => Some(!v),
                UnaryOp::LogicalNot => Some(i64::from(v == 0)),
                _ => None,
            }
        }
        ExpKind::Binary(op, lhs, rhs) => {
            let l = eval(lhs, enums)?;
            // && and || must not evaluate the right side eagerly for
            // div-by-zero purposes, but constants have no side effects
            let r = eval(rhs, enums)?;
            fold_binary(*op, l, r)
        }
        ExpKind::Conditional {
            condition,
            then,
            els,
        } => {
            let c = eval(condition, enums)?;
            if c != 0 {
                eval(then, enums)
            } else {
                eval(els, enums)
            }
        }
        ExpKind::Cast(target, inner) => {
            let v = eval(inner, enums)?;
            if target.is_integer() {
                Some(Const::Long(v).convert_to(target).as_i64())
            } else {
                None
            }
        }
        ExpKind::Comma(_, rhs) => eval(rhs, enums),
        _ => None,
    }
}

pub fn fold_binary(op: BinaryOp, l: i64, r: i64) -> Option<i64> {
    let v = match op {
        BinaryOp::Add => l.wrapping_add(r),
        BinaryOp::Subtract => l.wrapping_sub(r),
        BinaryOp::Multiply => l.wrapping_mul(r),
        BinaryOp::Divide => {
            if r == 0 {
                return None;
            }
            l.wrapping_div(r)
        }
        BinaryOp::Remainder => {
            if r == 0 {
                return None;
            }
            l.wrapping_rem(r)
        }
        BinaryOp::BitwiseAnd => l & r,
        BinaryOp::BitwiseOr => l | r,
        BinaryOp::BitwiseXor => l ^ r,
        BinaryOp::ShiftLeft => l.wrapping_shl(r as u32),
        BinaryOp::ShiftRight => l.wrapping_shr(r as u32),
        BinaryOp::LessThan => i64::from(l < r),
        BinaryOp::LessOrEqual => i64::from(l <= r),
        BinaryOp::GreaterThan => i64::from(l > r),
        BinaryOp::GreaterOrEqual => i64::from(l >= r),
        BinaryOp::IsEqual => i64::from(l == r),
        BinaryOp::IsNotEqual => i64::from(l != r),
        BinaryOp::LogicalAnd => i64::from(l != 0 && r != 0),
        BinaryOp::LogicalOr => i64::from(l != 0 || r != 0),
    };
    Some(v)
}
