use super::{const_eval, InnerSemError, Result};
use crate::ast::*;

use std::collections::HashMap;

pub type EnumConsts = HashMap<Identifier, i64>;

#[derive(Default)]
struct NameGenerator {
    counter: usize,
}

impl NameGenerator {
    fn uniquify(&mut self, before: &str) -> Identifier {
        let v = self.counter;
        self.counter += 1;
        format!("{before}.{v}")
    }
}

#[derive(Debug, Clone)]
struct MapEntry {
    name: Identifier,
    in_current_scope: bool,
    has_linkage: bool,
}

impl MapEntry {
    fn leave_scope(mut self) -> Self {
        self.in_current_scope = false;
        self
    }
}

struct IdentifierMap {
    inner: HashMap<Identifier, MapEntry>,
}

impl IdentifierMap {
    fn new() -> Self {
        Self {
            inner: HashMap::new(),
        }
    }

    fn new_scope_copy(other: &Self) -> Self {
        let inner = other
            .inner
            .clone()
            .into_iter()
            .map(|(name, entry)| (name, entry.leave_scope()))
            .collect();
        Self { inner }
    }

    fn get(&self, name: &str) -> Option<&MapEntry> {
        self.inner.get(name)
    }

    fn get_uniq_name(&self, name: &str) -> Option<Identifier> {
        self.inner.get(name).map(|entry| entry.name.clone())
    }

    fn is_in_current_scope(&self, name: &str) -> bool {
        self.inner
            .get(name)
            .filter(|entry| entry.in_current_scope)
            .is_some()
    }

    fn add_linked(&mut self, name: Identifier) {
        let entry = MapEntry {
            name: name.clone(),
            in_current_scope: true,
            has_linkage: true,
        };
        self.inner.insert(name, entry);
    }

    fn add_uniq_to_scope(&mut self, name: Identifier, ng: &mut NameGenerator) -> Identifier {
        let generated = ng.uniquify(&name);
        let entry = MapEntry {
            name: generated.clone(),
            in_current_scope: true,
            has_linkage: false,
        };
        self.inner.insert(name, entry);
        generated
    }
}

struct Resolver {
    ng: NameGenerator,
    enums: EnumConsts,
}

pub fn name_resolution(ast: Ast) -> Result<(Ast, EnumConsts)> {
    let Ast { declarations } = ast;
    let mut resolver = Resolver {
        ng: NameGenerator::default(),
        enums: EnumConsts::new(),
    };
    let mut im = IdentifierMap::new();
    let mut resolved = Vec::with_capacity(declarations.len());
    for dec in declarations {
        resolved.push(resolver.resolve_toplevel(dec, &mut im)?);
    }

    Ok((
        Ast {
            declarations: resolved,
        },
        resolver.enums,
    ))
}

impl Resolver {
    fn resolve_toplevel(&mut self, dec: Declaration, im: &mut IdentifierMap) -> Result<Declaration> {
        match dec {
            Declaration::Fun(fundec) => self.resolve_fundec(fundec, im).map(Declaration::Fun),
            Declaration::Var(vardec) => self.resolve_global_vardec(vardec, im).map(Declaration::Var),
            Declaration::Enum(enumdec) => {
                self.register_enum(&enumdec, im)?;
                Ok(Declaration::Enum(enumdec))
            }
            Declaration::Record(_) | Declaration::Typedef(_) => Ok(dec),
        }
    }

    fn register_enum(&mut self, dec: &EnumDec, im: &mut IdentifierMap) -> Result<()> {
        let mut next = 0i64;
        for e in &dec.enumerators {
            if im.is_in_current_scope(&e.name) {
                return Err(
                    InnerSemError::IdentifierRedeclaration(e.name.clone()).set_loc(e.loc)
                );
            }
            let value = match &e.value {
                Some(exp) => const_eval::eval(exp, &self.enums)
                    .ok_or_else(|| InnerSemError::NotAConstCase.set_loc(exp.loc))?,
                None => next,
            };
            next = value.wrapping_add(1);
            im.add_linked(e.name.clone());
            self.enums.insert(e.name.clone(), value);
        }
        Ok(())
    }

    fn resolve_global_vardec(&mut self, mut dec: VarDec, im: &mut IdentifierMap) -> Result<VarDec> {
        if let Some(prev) = im.get(&dec.name) {
            // file-scope objects all have linkage; redeclaration is legal
            // and reconciled during type checking
            if prev.in_current_scope && !prev.has_linkage {
                return Err(
                    InnerSemError::IdentifierRedeclaration(dec.name.clone()).set_loc(dec.loc)
                );
            }
        }
        im.add_linked(dec.name.clone());

        dec.init = match dec.init {
            Some(Initializer::Scalar(exp)) => {
                Some(Initializer::Scalar(self.resolve_exp(exp, im)?))
            }
            Some(Initializer::List(exps)) => {
                let resolved = exps
                    .into_iter()
                    .map(|e| self.resolve_exp(e, im))
                    .collect::<Result<Vec<_>>>()?;
                Some(Initializer::List(resolved))
            }
            None => None,
        };
        Ok(dec)
    }

    fn resolve_fundec(&mut self, dec: FunDec, im: &mut IdentifierMap) -> Result<FunDec> {
        if let Some(prev) = im.get(&dec.name) {
            if prev.in_current_scope && !prev.has_linkage {
                return Err(
                    InnerSemError::IdentifierRedeclaration(dec.name.clone()).set_loc(dec.loc)
                );
            }
        }
        im.add_linked(dec.name.clone());

        let mut inner = IdentifierMap::new_scope_copy(im);
        let mut params = Vec::with_capacity(dec.params.len());
        for param in dec.params {
            params.push(self.resolve_param(param, &mut inner)?);
        }

        let body = match dec.body {
            Some(block) => Some(self.resolve_block(block, &mut inner)?),
            None => None,
        };

        Ok(FunDec {
            name: dec.name,
            params,
            fun_type: dec.fun_type,
            body,
            storage_class: dec.storage_class,
            loc: dec.loc,
        })
    }

    fn resolve_param(&mut self, param: Param, im: &mut IdentifierMap) -> Result<Param> {
        if im.is_in_current_scope(&param.name) {
            return Err(
                InnerSemError::IdentifierRedeclaration(param.name.clone()).set_loc(param.loc)
            );
        }
        let name = im.add_uniq_to_scope(param.name, &mut self.ng);
        Ok(Param {
            name,
            ptype: param.ptype,
            loc: param.loc,
        })
    }

    fn resolve_block(&mut self, block: Block, im: &mut IdentifierMap) -> Result<Block> {
        let mut items = Vec::with_capacity(block.items.len());
        for item in block.items {
            let resolved = match item {
                BlockItem::S(st) => BlockItem::S(self.resolve_statement(st, im)?),
                BlockItem::D(dec) => BlockItem::D(self.resolve_local_vardec(dec, im)?),
            };
            items.push(resolved);
        }
        Ok(Block { items })
    }

    fn resolve_local_vardec(&mut self, mut dec: VarDec, im: &mut IdentifierMap) -> Result<VarDec> {
        if dec.storage_class.is_static() {
            return Err(InnerSemError::StaticLocal(dec.name.clone()).set_loc(dec.loc));
        }

        if dec.storage_class.is_extern() {
            if dec.init.is_some() {
                return Err(InnerSemError::InitOnExternVar(dec.name.clone()).set_loc(dec.loc));
            }
            if let Some(prev) = im.get(&dec.name) {
                if prev.in_current_scope && !prev.has_linkage {
                    return Err(
                        InnerSemError::IdentifierRedeclaration(dec.name.clone()).set_loc(dec.loc)
                    );
                }
            }
            im.add_linked(dec.name.clone());
            return Ok(dec);
        }

        if im.is_in_current_scope(&dec.name) {
            return Err(InnerSemError::IdentifierRedeclaration(dec.name.clone()).set_loc(dec.loc));
        }
        let unique = im.add_uniq_to_scope(dec.name.clone(), &mut self.ng);
        dec.name = unique;

        dec.init = match dec.init {
            Some(Initializer::Scalar(exp)) => {
                Some(Initializer::Scalar(self.resolve_exp(exp, im)?))
            }
            Some(Initializer::List(exps)) => {
                let resolved = exps
                    .into_iter()
                    .map(|e| self.resolve_exp(e, im))
                    .collect::<Result<Vec<_>>>()?;
                Some(Initializer::List(resolved))
            }
            None => None,
        };
        Ok(dec)
    }

    fn resolve_forinit(&mut self, init: ForInit, im: &mut IdentifierMap) -> Result<ForInit> {
        match init {
            ForInit::InitDecl(dec) => {
                if !dec.storage_class.is_automatic() {
                    return Err(InnerSemError::StorageInForInit.set_loc(dec.loc));
                }
                self.resolve_local_vardec(dec, im).map(ForInit::InitDecl)
            }
            ForInit::InitExp(exp) => self
                .resolve_optional_exp(exp, im)
                .map(ForInit::InitExp),
        }
    }

    fn resolve_optional_exp(
        &mut self,
        exp: Option<Exp>,
        im: &mut IdentifierMap,
    ) -> Result<Option<Exp>> {
        exp.map(|e| self.resolve_exp(e, im)).transpose()
    }

    fn resolve_statement(&mut self, st: Statement, im: &mut IdentifierMap) -> Result<Statement> {
        use Statement as S;
        match st {
            S::Compound(block) => {
                let mut inner = IdentifierMap::new_scope_copy(im);
                self.resolve_block(block, &mut inner).map(S::Compound)
            }
            S::Exp(e) => self.resolve_exp(e, im).map(S::Exp),
            S::If(mut if_st) => {
                if_st.condition = self.resolve_exp(if_st.condition, im)?;
                if_st.then = self.resolve_statement(*if_st.then, im).map(Box::new)?;
                if_st.els = match if_st.els {
                    Some(els) => Some(self.resolve_statement(*els, im).map(Box::new)?),
                    None => None,
                };
                Ok(S::If(if_st))
            }
            S::While(mut while_st) => {
                while_st.condition = self.resolve_exp(while_st.condition, im)?;
                while_st.body = self.resolve_statement(*while_st.body, im).map(Box::new)?;
                Ok(S::While(while_st))
            }
            S::DoWhile(mut dowhile) => {
                dowhile.body = self.resolve_statement(*dowhile.body, im).map(Box::new)?;
                dowhile.condition = self.resolve_exp(dowhile.condition, im)?;
                Ok(S::DoWhile(dowhile))
            }
            S::For(mut for_st) => {
                let mut inner = IdentifierMap::new_scope_copy(im);
                for_st.init = self.resolve_forinit(for_st.init, &mut inner)?;
                for_st.condition = self.resolve_optional_exp(for_st.condition, &mut inner)?;
                for_st.post = self.resolve_optional_exp(for_st.post, &mut inner)?;
                for_st.body = self
                    .resolve_statement(*for_st.body, &mut inner)
                    .map(Box::new)?;
                Ok(S::For(for_st))
            }
            S::Switch(mut switch) => {
                switch.ctrl_exp = self.resolve_exp(switch.ctrl_exp, im)?;
                switch.body = self.resolve_statement(*switch.body, im).map(Box::new)?;
                Ok(S::Switch(switch))
            }
            S::Cased(mut cased) => {
                // the case expression is folded later; enum constants in it
                // still need resolution
                cased.exp = self.resolve_exp(cased.exp, im)?;
                cased.body = self.resolve_statement(*cased.body, im).map(Box::new)?;
                Ok(S::Cased(cased))
            }
            S::DCased(mut dcased) => {
                dcased.body = self.resolve_statement(*dcased.body, im).map(Box::new)?;
                Ok(S::DCased(dcased))
            }
            S::Labeled(name, st, loc) => {
                let st = self.resolve_statement(*st, im).map(Box::new)?;
                Ok(S::Labeled(name, st, loc))
            }
            S::Return { exp, loc } => {
                let exp = self.resolve_optional_exp(exp, im)?;
                Ok(S::Return { exp, loc })
            }
            S::Break { .. } | S::Continue { .. } | S::Goto { .. } | S::Null => Ok(st),
        }
    }

    fn resolve_exp(&mut self, exp: Exp, im: &mut IdentifierMap) -> Result<Exp> {
        let Exp { kind, ty, loc } = exp;
        let kind = match kind {
            // enum constants live in the map under their own linked name,
            // so shadowing by an inner declaration works out naturally
            ExpKind::Var(name) => {
                let unique = im
                    .get_uniq_name(&name)
                    .ok_or_else(|| InnerSemError::VariableNotDeclared(name.clone()).set_loc(loc))?;
                ExpKind::Var(unique)
            }
            ExpKind::Constant(_) | ExpKind::StringLit { .. } | ExpKind::SizeofType(_) => kind,
            ExpKind::Unary(op, inner) => {
                ExpKind::Unary(op, Box::new(self.resolve_exp(*inner, im)?))
            }
            ExpKind::Binary(op, lhs, rhs) => ExpKind::Binary(
                op,
                Box::new(self.resolve_exp(*lhs, im)?),
                Box::new(self.resolve_exp(*rhs, im)?),
            ),
            ExpKind::Assignment { op, lhs, rhs } => ExpKind::Assignment {
                op,
                lhs: Box::new(self.resolve_exp(*lhs, im)?),
                rhs: Box::new(self.resolve_exp(*rhs, im)?),
            },
            ExpKind::Conditional {
                condition,
                then,
                els,
            } => ExpKind::Conditional {
                condition: Box::new(self.resolve_exp(*condition, im)?),
                then: Box::new(self.resolve_exp(*then, im)?),
                els: Box::new(self.resolve_exp(*els, im)?),
            },
            ExpKind::Call { callee, args } => {
                let callee = match callee.kind {
                    // calling an undeclared name is its own diagnostic
                    ExpKind::Var(name) => {
                        let unique = im.get_uniq_name(&name).ok_or_else(|| {
                            InnerSemError::UndeclaredFunction(name.clone()).set_loc(callee.loc)
                        })?;
                        Box::new(Exp {
                            kind: ExpKind::Var(unique),
                            ty: callee.ty,
                            loc: callee.loc,
                        })
                    }
                    _ => Box::new(self.resolve_exp(*callee, im)?),
                };
                let args = args
                    .into_iter()
                    .map(|a| self.resolve_exp(a, im))
                    .collect::<Result<Vec<_>>>()?;
                ExpKind::Call { callee, args }
            }
            ExpKind::Subscript(base, index) => ExpKind::Subscript(
                Box::new(self.resolve_exp(*base, im)?),
                Box::new(self.resolve_exp(*index, im)?),
            ),
            ExpKind::Member {
                base,
                member,
                through_pointer,
            } => ExpKind::Member {
                base: Box::new(self.resolve_exp(*base, im)?),
                member,
                through_pointer,
            },
            ExpKind::Deref(inner) => ExpKind::Deref(Box::new(self.resolve_exp(*inner, im)?)),
            ExpKind::AddrOf(inner) => ExpKind::AddrOf(Box::new(self.resolve_exp(*inner, im)?)),
            ExpKind::Cast(target, inner) => {
                ExpKind::Cast(target, Box::new(self.resolve_exp(*inner, im)?))
            }
            ExpKind::SizeofExp(inner) => {
                ExpKind::SizeofExp(Box::new(self.resolve_exp(*inner, im)?))
            }
            ExpKind::Comma(lhs, rhs) => ExpKind::Comma(
                Box::new(self.resolve_exp(*lhs, im)?),
                Box::new(self.resolve_exp(*rhs, im)?),
            ),
        };
        Ok(Exp { kind, ty, loc })
    }
}
