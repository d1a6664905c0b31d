use super::{InnerSemError, Result};
use crate::ast::*;

use std::collections::HashSet;

type LabelSet = HashSet<Identifier>;

fn collect_labels_statement(statement: &Statement, ls: &mut LabelSet) -> Result<()> {
    use Statement as S;
    match statement {
        S::While(While { body, .. })
        | S::DoWhile(DoWhile { body, .. })
        | S::For(For { body, .. })
        | S::Cased(CasedStatement { body, .. })
        | S::DCased(DCasedStatement { body, .. })
        | S::Switch(Switch { body, .. }) => collect_labels_statement(body, ls),
        S::Labeled(name, st, loc) => {
            if !ls.insert(name.clone()) {
                return Err(InnerSemError::LabelRedeclaration(name.clone()).set_loc(*loc));
            }
            collect_labels_statement(st, ls)
        }
        S::If(If { then, els, .. }) => {
            collect_labels_statement(then, ls)?;
            if let Some(st) = els {
                collect_labels_statement(st, ls)?;
            }
            Ok(())
        }
        S::Compound(block) => collect_labels_block(block, ls),
        S::Exp(_)
        | S::Break { .. }
        | S::Continue { .. }
        | S::Return { .. }
        | S::Null
        | S::Goto { .. } => Ok(()),
    }
}

fn collect_labels_block(block: &Block, ls: &mut LabelSet) -> Result<()> {
    block.items.iter().try_for_each(|item| match item {
        BlockItem::S(s) => collect_labels_statement(s, ls),
        BlockItem::D(_) => Ok(()),
    })
}

fn validate_statement(st: &Statement, ls: &LabelSet) -> Result<()> {
    use Statement as S;
    match st {
        S::Goto { label, loc } => {
            if !ls.contains(label) {
                return Err(InnerSemError::UnknownLabel(label.clone()).set_loc(*loc));
            }
            Ok(())
        }
        S::Compound(block) => validate_block(block, ls),
        S::While(While { body, .. })
        | S::DoWhile(DoWhile { body, .. })
        | S::For(For { body, .. })
        | S::Switch(Switch { body, .. })
        | S::Cased(CasedStatement { body, .. })
        | S::DCased(DCasedStatement { body, .. })
        | S::Labeled(_, body, _) => validate_statement(body, ls),
        S::If(If { then, els, .. }) => {
            validate_statement(then, ls)?;
            if let Some(els) = els {
                validate_statement(els, ls)?;
            }
            Ok(())
        }
        S::Break { .. } | S::Null | S::Continue { .. } | S::Return { .. } | S::Exp(_) => Ok(()),
    }
}

fn validate_block(block: &Block, ls: &LabelSet) -> Result<()> {
    block.items.iter().try_for_each(|item| match item {
        BlockItem::S(s) => validate_statement(s, ls),
        BlockItem::D(_) => Ok(()),
    })
}

fn validate_fundec(fundec: &FunDec) -> Result<()> {
    let Some(body) = &fundec.body else {
        return Ok(());
    };
    let mut ls = LabelSet::new();
    collect_labels_block(body, &mut ls)?;
    validate_block(body, &ls)
}

pub fn ensure_goto_correctness(ast: &Ast) -> Result<()> {
    ast.declarations.iter().try_for_each(|dec| match dec {
        Declaration::Fun(fundec) => validate_fundec(fundec),
        _ => Ok(()),
    })
}
