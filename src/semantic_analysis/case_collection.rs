use super::{InnerSemError, Result};
use crate::ast::*;

use std::collections::HashSet;

type CaseSet = HashSet<(Option<i64>, Identifier)>;

fn collect_statement(statement: Statement) -> Result<(Statement, CaseSet)> {
    use Statement as S;
    match statement {
        S::Compound(block) => collect_block(block).map(|(b, cases)| (S::Compound(b), cases)),
        S::Labeled(label, st, loc) => {
            let (body, cases) = collect_statement(*st)?;
            Ok((S::Labeled(label, Box::new(body), loc), cases))
        }
        S::Cased(cased) => collect_cased(cased),
        S::DCased(dcased) => collect_dcased(dcased),
        S::Switch(switch) => collect_switch(switch),
        S::If(if_st) => collect_if(if_st),
        S::For(mut for_st) => {
            let (body, cases) = collect_statement(*for_st.body)?;
            for_st.body = Box::new(body);
            Ok((S::For(for_st), cases))
        }
        S::DoWhile(mut dowhile) => {
            let (body, cases) = collect_statement(*dowhile.body)?;
            dowhile.body = Box::new(body);
            Ok((S::DoWhile(dowhile), cases))
        }
        S::While(mut while_st) => {
            let (body, cases) = collect_statement(*while_st.body)?;
            while_st.body = Box::new(body);
            Ok((S::While(while_st), cases))
        }
        S::Null
        | S::Goto { .. }
        | S::Return { .. }
        | S::Continue { .. }
        | S::Break { .. }
        | S::Exp(_) => Ok((statement, CaseSet::new())),
    }
}

fn collect_cased(cased: CasedStatement) -> Result<(Statement, CaseSet)> {
    let CasedStatement {
        exp,
        body,
        label,
        loc,
    } = cased;
    let value = exp
        .get_const()
        .map(|c| c.as_i64())
        .ok_or_else(|| InnerSemError::NotAConstCase.set_loc(loc))?;
    let (body, mut cases) = collect_statement(*body)?;
    if !cases.insert((Some(value), label.clone())) {
        return Err(InnerSemError::DuplicateCase(value).set_loc(loc));
    }
    let result = CasedStatement {
        exp,
        body: Box::new(body),
        label,
        loc,
    };
    Ok((Statement::Cased(result), cases))
}

fn collect_dcased(dcased: DCasedStatement) -> Result<(Statement, CaseSet)> {
    let DCasedStatement { body, label, loc } = dcased;
    let (body, mut cases) = collect_statement(*body)?;
    if !cases.insert((None, label.clone())) {
        return Err(InnerSemError::DuplicateDefault.set_loc(loc));
    }
    let result = DCasedStatement {
        body: Box::new(body),
        label,
        loc,
    };
    Ok((Statement::DCased(result), cases))
}

fn merge(mut acc: CaseSet, other: CaseSet, loc: Loc) -> Result<CaseSet> {
    for case in other {
        let duplicate = acc.iter().any(|(v, _)| *v == case.0);
        if duplicate {
            let err = match case.0 {
                Some(v) => InnerSemError::DuplicateCase(v),
                None => InnerSemError::DuplicateDefault,
            };
            return Err(err.set_loc(loc));
        }
        acc.insert(case);
    }
    Ok(acc)
}

fn collect_if(if_st: If) -> Result<(Statement, CaseSet)> {
    let If {
        condition,
        then,
        els,
    } = if_st;
    let loc = condition.loc;
    let (then, then_cases) = collect_statement(*then)?;
    let (els, cases) = match els {
        Some(els) => {
            let (els, els_cases) = collect_statement(*els)?;
            let cases = merge(then_cases, els_cases, loc)?;
            (Some(Box::new(els)), cases)
        }
        None => (None, then_cases),
    };
    let result = If {
        condition,
        then: Box::new(then),
        els,
    };
    Ok((Statement::If(result), cases))
}

fn collect_switch(mut switch: Switch) -> Result<(Statement, CaseSet)> {
    let (body, cases) = collect_statement(*switch.body)?;
    switch.body = Box::new(body);
    switch.cases = cases.into_iter().collect();
    // the default case jumps last no matter where it appears in the body
    switch.cases.sort_by_key(|(v, _)| v.is_none());
    Ok((Statement::Switch(switch), CaseSet::new()))
}

fn collect_block(block: Block) -> Result<(Block, CaseSet)> {
    let mut cases = CaseSet::new();
    let mut items = Vec::with_capacity(block.items.len());
    for item in block.items {
        match item {
            BlockItem::S(st) => {
                let (st, inner) = collect_statement(st)?;
                let loc = Loc::default();
                cases = merge(cases, inner, loc)?;
                items.push(BlockItem::S(st));
            }
            BlockItem::D(_) => items.push(item),
        }
    }
    Ok((Block { items }, cases))
}

fn collect_fundec(mut fundec: FunDec) -> Result<FunDec> {
    if let Some(body) = fundec.body {
        let (body, cases) = collect_block(body)?;
        if !cases.is_empty() {
            return Err(InnerSemError::CaseNotInSwitch.set_loc(fundec.loc));
        }
        fundec.body = Some(body);
    }
    Ok(fundec)
}

pub fn collect_cases(ast: Ast) -> Result<Ast> {
    let Ast { declarations } = ast;
    let declarations = declarations
        .into_iter()
        .map(|dec| match dec {
            Declaration::Fun(fundec) => collect_fundec(fundec).map(Declaration::Fun),
            _ => Ok(dec),
        })
        .collect::<Result<Vec<_>>>()?;
    Ok(Ast { declarations })
}
