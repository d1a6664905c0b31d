use super::env::*;
use super::name_resolution::EnumConsts;
use super::{const_eval, InnerSemError, Result};
use crate::ast::*;

use std::collections::{HashMap, HashSet};

/// Final initializer state of a file-scope object. A tentative definition
/// is upgraded by a later initialized one; two initialized definitions
/// conflict.
#[derive(Debug, Clone)]
enum InitState {
    NoInit,
    Tentative,
    Initial(StaticInit),
}

struct StaticEntry {
    state: InitState,
    global: bool,
    var_type: Type,
}

struct TypeChecker {
    env: Env,
    statics: HashMap<Identifier, StaticEntry>,
    static_order: Vec<Identifier>,
    current_rtype: Type,
}

pub fn check_types(ast: Ast, enums: EnumConsts) -> Result<(Ast, Env)> {
    let mut env = Env::new();
    env.enum_consts = enums;
    let mut checker = TypeChecker {
        env,
        statics: HashMap::new(),
        static_order: Vec::new(),
        current_rtype: Type::int(),
    };

    let declarations = ast
        .declarations
        .into_iter()
        .map(|dec| checker.check_toplevel(dec))
        .collect::<Result<Vec<_>>>()?;

    checker.finalize_statics()?;
    Ok((Ast { declarations }, checker.env))
}

/// char and short operands promote to int before arithmetic.
fn promote(t: &Type) -> Type {
    match &t.kind {
        TypeKind::Int { kind, .. } if kind.size() < 4 => Type::int(),
        _ => {
            let mut t = t.clone();
            t.is_const = false;
            t
        }
    }
}

/// Usual arithmetic conversions for two promoted integer operands.
fn common_type(t1: &Type, t2: &Type) -> Type {
    let rank = |t: &Type| match &t.kind {
        TypeKind::Int { kind, signed } => match (kind, signed) {
            (IntKind::Long, false) => 3,
            (IntKind::Long, true) => 2,
            (_, false) => 1,
            _ => 0,
        },
        _ => 0,
    };
    match rank(t1).max(rank(t2)) {
        3 => Type::ulong(),
        2 => Type::long(),
        1 => Type::uint(),
        _ => Type::int(),
    }
}

impl TypeChecker {
    fn check_toplevel(&mut self, dec: Declaration) -> Result<Declaration> {
        match dec {
            Declaration::Typedef(td) => {
                self.env.typedefs.insert(td.name.clone(), td.aliased.clone());
                Ok(Declaration::Typedef(td))
            }
            Declaration::Record(rd) => {
                self.check_record(&rd)?;
                Ok(Declaration::Record(rd))
            }
            Declaration::Enum(ed) => {
                for e in &ed.enumerators {
                    let value = self.env.enum_consts.get(&e.name).copied().unwrap_or(0);
                    self.env.add_symbol(
                        e.name.clone(),
                        Symbol {
                            sym_type: Type::int(),
                            kind: SymbolKind::EnumConst(value),
                        },
                    );
                }
                Ok(Declaration::Enum(ed))
            }
            Declaration::Var(vd) => self.check_global_vardec(vd).map(Declaration::Var),
            Declaration::Fun(fd) => self.check_fundec(fd).map(Declaration::Fun),
        }
    }

    // ----- records -----

    fn check_record(&mut self, dec: &RecordDec) -> Result<()> {
        let Some(members) = &dec.members else {
            return Ok(());
        };
        if self.env.layouts.contains_key(&dec.tag) {
            return Err(InnerSemError::IdentifierRedeclaration(dec.tag.clone()).set_loc(dec.loc));
        }

        let mut laid_out = Vec::with_capacity(members.len());
        let mut seen = HashSet::new();
        let mut offset = 0u64;
        let mut max_size = 0u64;
        let mut align = 1u64;

        for m in members {
            if !seen.insert(m.name.clone()) {
                return Err(InnerSemError::IdentifierRedeclaration(m.name.clone()).set_loc(m.loc));
            }
            let size = self
                .env
                .size_of(&m.mtype)
                .ok_or_else(|| InnerSemError::IncompleteType(m.mtype.to_string()).set_loc(m.loc))?;
            let malign = self
                .env
                .align_of(&m.mtype)
                .ok_or_else(|| InnerSemError::IncompleteType(m.mtype.to_string()).set_loc(m.loc))?;

            let moffset = if dec.is_union {
                0
            } else {
                offset = round_up(offset, malign);
                let at = offset;
                offset += size;
                at
            };
            laid_out.push(MemberLayout {
                name: m.name.clone(),
                mtype: m.mtype.clone(),
                offset: moffset,
            });
            max_size = max_size.max(size);
            align = align.max(malign);
        }

        let raw = if dec.is_union { max_size } else { offset };
        let layout = RecordLayout {
            is_union: dec.is_union,
            members: laid_out,
            size: round_up(raw.max(1), align),
            align,
        };
        self.env.layouts.insert(dec.tag.clone(), layout);
        Ok(())
    }

    // ----- file-scope objects -----

    fn check_global_vardec(&mut self, mut vd: VarDec) -> Result<VarDec> {
        let mut resolved = self.env.resolve(&vd.var_type);
        if resolved.is_void() {
            return Err(InnerSemError::VoidObject(vd.name.clone()).set_loc(vd.loc));
        }

        // `int a[] = {...}` takes its size from the initializer
        if let (TypeKind::Array(elem, None), Some(Initializer::List(exps))) =
            (&resolved.kind, &vd.init)
        {
            let elem = elem.clone();
            let n = exps.len() as u64;
            resolved = Type::array_of(*elem, Some(n));
            vd.var_type = resolved.clone();
        }

        let is_extern = vd.storage_class.is_extern();
        if self.env.size_of(&resolved).is_none() && !is_extern {
            return Err(InnerSemError::IncompleteType(resolved.to_string()).set_loc(vd.loc));
        }

        let state = match &vd.init {
            Some(init) => {
                if is_extern {
                    return Err(InnerSemError::InitOnExternVar(vd.name.clone()).set_loc(vd.loc));
                }
                InitState::Initial(self.static_init_for(&vd.name, &resolved, init, vd.loc)?)
            }
            None if is_extern => InitState::NoInit,
            None => InitState::Tentative,
        };

        let mut global = !vd.storage_class.is_static();

        if let Some(prev) = self.statics.get(&vd.name) {
            if !self.types_compatible(&prev.var_type, &vd.var_type) {
                return Err(InnerSemError::IdentifierRedeclaration(vd.name.clone()).set_loc(vd.loc));
            }
            if is_extern {
                global = prev.global;
            } else if prev.global != global {
                return Err(InnerSemError::ConflictingLinkage(vd.name.clone()).set_loc(vd.loc));
            }
            let merged = match (&prev.state, &state) {
                (InitState::Initial(_), InitState::Initial(_)) => {
                    return Err(
                        InnerSemError::IdentifierRedeclaration(vd.name.clone()).set_loc(vd.loc)
                    );
                }
                (InitState::Initial(i), _) => InitState::Initial(i.clone()),
                (_, InitState::Initial(i)) => InitState::Initial(i.clone()),
                (InitState::Tentative, _) | (_, InitState::Tentative) => InitState::Tentative,
                _ => InitState::NoInit,
            };
            let var_type = if vd.var_type.is_array() {
                // a sized declaration completes an incomplete array
                vd.var_type.clone()
            } else {
                prev.var_type.clone()
            };
            self.statics.insert(
                vd.name.clone(),
                StaticEntry {
                    state: merged,
                    global,
                    var_type,
                },
            );
        } else {
            self.static_order.push(vd.name.clone());
            self.statics.insert(
                vd.name.clone(),
                StaticEntry {
                    state,
                    global,
                    var_type: vd.var_type.clone(),
                },
            );
        }

        let entry = &self.statics[&vd.name];
        self.env.add_symbol(
            vd.name.clone(),
            Symbol {
                sym_type: entry.var_type.clone(),
                kind: SymbolKind::Static {
                    global: entry.global,
                    defined: !matches!(entry.state, InitState::NoInit),
                },
            },
        );
        Ok(vd)
    }

    fn finalize_statics(&mut self) -> Result<()> {
        for name in std::mem::take(&mut self.static_order) {
            let entry = &self.statics[&name];
            let init = match &entry.state {
                InitState::NoInit => continue,
                InitState::Tentative => {
                    let size = self.env.size_of(&entry.var_type).unwrap_or(8);
                    StaticInit::Zero(size)
                }
                InitState::Initial(init) => init.clone(),
            };
            let align = self.env.align_of(&entry.var_type).unwrap_or(8);
            let global = entry.global;
            self.env.register_static(StaticVariable {
                name,
                global,
                align,
                init,
            });
        }
        Ok(())
    }

    fn const_value_of(&mut self, exp: Exp, target: &Type, name: &str) -> Result<i64> {
        let loc = exp.loc;
        let typed = self.check_exp_val(exp)?;
        let value = const_eval::eval(&typed, &self.env.enum_consts)
            .ok_or_else(|| InnerSemError::NonConstantInit(name.to_owned()).set_loc(loc))?;
        Ok(Const::Long(value).convert_to(target).as_i64())
    }

    fn static_init_for(
        &mut self,
        name: &str,
        t: &Type,
        init: &Initializer,
        loc: Loc,
    ) -> Result<StaticInit> {
        let rt = self.env.resolve(t);
        match (&rt.kind, init) {
            (TypeKind::Pointer(_), Initializer::Scalar(exp)) => {
                if let ExpKind::StringLit { bytes, .. } = &exp.kind {
                    let label = self.env.intern_string(bytes);
                    return Ok(StaticInit::StringPtr(label));
                }
                let value = self.const_value_of(exp.clone(), &rt, name)?;
                Ok(StaticInit::Scalar {
                    width: Width::B8,
                    value,
                })
            }
            (TypeKind::Int { .. }, Initializer::Scalar(exp)) => {
                let value = self.const_value_of(exp.clone(), &rt, name)?;
                Ok(StaticInit::Scalar {
                    width: self.env.width_of(&rt),
                    value,
                })
            }
            (TypeKind::Array(elem, Some(n)), Initializer::List(exps)) => {
                let elem = self.env.resolve(elem);
                if !elem.is_scalar() {
                    return Err(InnerSemError::Unsupported(
                        "nested aggregate initializers".to_owned(),
                    )
                    .set_loc(loc));
                }
                if exps.len() as u64 > *n {
                    return Err(InnerSemError::Unsupported(
                        format!("too many initializers for {name}"),
                    )
                    .set_loc(loc));
                }
                let width = self.env.width_of(&elem);
                let esize = width.bytes();
                let mut items = Vec::new();
                for exp in exps {
                    let value = self.const_value_of(exp.clone(), &elem, name)?;
                    items.push(StaticItem::Scalar { width, value });
                }
                let tail = (*n - exps.len() as u64) * esize;
                if tail > 0 {
                    items.push(StaticItem::Zero(tail));
                }
                Ok(StaticInit::Items(items))
            }
            (TypeKind::Struct(tag), Initializer::List(exps)) => {
                let layout = self
                    .env
                    .layouts
                    .get(tag)
                    .cloned()
                    .ok_or_else(|| InnerSemError::IncompleteType(rt.to_string()).set_loc(loc))?;
                if exps.len() > layout.members.len() {
                    return Err(InnerSemError::Unsupported(
                        format!("too many initializers for {name}"),
                    )
                    .set_loc(loc));
                }
                let mut items = Vec::new();
                let mut at = 0u64;
                for (m, exp) in layout.members.iter().zip(exps.iter()) {
                    let mt = self.env.resolve(&m.mtype);
                    if !mt.is_scalar() {
                        return Err(InnerSemError::Unsupported(
                            "nested aggregate initializers".to_owned(),
                        )
                        .set_loc(loc));
                    }
                    if m.offset > at {
                        items.push(StaticItem::Zero(m.offset - at));
                    }
                    let width = self.env.width_of(&mt);
                    let value = self.const_value_of(exp.clone(), &mt, name)?;
                    items.push(StaticItem::Scalar { width, value });
                    at = m.offset + width.bytes();
                }
                if layout.size > at {
                    items.push(StaticItem::Zero(layout.size - at));
                }
                Ok(StaticInit::Items(items))
            }
            _ => Err(InnerSemError::NonConstantInit(name.to_owned()).set_loc(loc)),
        }
    }

    // ----- functions -----

    fn check_fundec(&mut self, mut fd: FunDec) -> Result<FunDec> {
        let has_body = fd.body.is_some();
        let is_static = fd.storage_class.is_static();
        let mut global = !is_static;
        let mut already_defined = false;

        let rtype = self.env.resolve(&fd.fun_type.return_type);
        if !rtype.is_void() && !rtype.is_scalar() {
            return Err(
                InnerSemError::Unsupported("aggregate return types".to_owned()).set_loc(fd.loc)
            );
        }
        for p in &fd.params {
            let pt = self.env.resolve(&p.ptype);
            if pt.is_void() {
                return Err(InnerSemError::VoidObject(p.name.clone()).set_loc(p.loc));
            }
            if !pt.is_scalar() {
                return Err(
                    InnerSemError::Unsupported("aggregate parameters".to_owned()).set_loc(p.loc)
                );
            }
        }

        let fun_type = Type::new(TypeKind::Fun(fd.fun_type.clone()));
        if let Some(prev) = self.env.get_symbol(&fd.name) {
            let (prev_global, prev_defined) = match prev.kind {
                SymbolKind::Fun { global, defined } => (global, defined),
                _ => {
                    return Err(
                        InnerSemError::IdentifierRedeclaration(fd.name.clone()).set_loc(fd.loc)
                    )
                }
            };
            if !self.types_compatible(&prev.sym_type, &fun_type) {
                return Err(InnerSemError::IncompatibleFunDec(fd.name.clone()).set_loc(fd.loc));
            }
            if has_body && prev_defined {
                return Err(InnerSemError::FunctionRedefinition(fd.name.clone()).set_loc(fd.loc));
            }
            if prev_global && is_static {
                return Err(InnerSemError::ConflictingLinkage(fd.name.clone()).set_loc(fd.loc));
            }
            global = prev_global && !is_static;
            already_defined = prev_defined;
        }

        self.env.add_symbol(
            fd.name.clone(),
            Symbol {
                sym_type: fun_type,
                kind: SymbolKind::Fun {
                    global,
                    defined: already_defined || has_body,
                },
            },
        );

        if let Some(body) = fd.body {
            for (p, ptype) in fd.params.iter().zip(fd.fun_type.params.iter()) {
                self.env.add_symbol(
                    p.name.clone(),
                    Symbol {
                        sym_type: ptype.clone(),
                        kind: SymbolKind::Local { is_register: false },
                    },
                );
            }
            self.current_rtype = rtype.clone();
            let body = self.check_block(body)?;
            if !rtype.is_void() && !block_ends_in_return(&body) {
                self.env.warn(
                    fd.loc,
                    format!(
                        "control reaches the end of non-void function '{}'",
                        fd.name
                    ),
                );
            }
            fd.body = Some(body);
        } else {
            fd.body = None;
        }
        Ok(fd)
    }

    fn types_compatible(&self, t1: &Type, t2: &Type) -> bool {
        let t1 = self.env.resolve(t1);
        let t2 = self.env.resolve(t2);
        match (&t1.kind, &t2.kind) {
            (TypeKind::Void, TypeKind::Void) => true,
            (
                TypeKind::Int { kind: k1, signed: s1 },
                TypeKind::Int { kind: k2, signed: s2 },
            ) => k1 == k2 && s1 == s2,
            (TypeKind::Pointer(p1), TypeKind::Pointer(p2)) => self.types_compatible(p1, p2),
            (TypeKind::Array(e1, n1), TypeKind::Array(e2, n2)) => {
                self.types_compatible(e1, e2)
                    && (n1.is_none() || n2.is_none() || n1 == n2)
            }
            (TypeKind::Fun(f1), TypeKind::Fun(f2)) => {
                f1.params.len() == f2.params.len()
                    && f1.variadic == f2.variadic
                    && self.types_compatible(&f1.return_type, &f2.return_type)
                    && f1
                        .params
                        .iter()
                        .zip(f2.params.iter())
                        .all(|(a, b)| self.types_compatible(a, b))
            }
            (TypeKind::Struct(a), TypeKind::Struct(b))
            | (TypeKind::Union(a), TypeKind::Union(b)) => a == b,
            _ => false,
        }
    }

    // ----- blocks, statements, locals -----

    fn check_block(&mut self, block: Block) -> Result<Block> {
        let items = block
            .items
            .into_iter()
            .map(|item| match item {
                BlockItem::S(st) => self.check_statement(st).map(BlockItem::S),
                BlockItem::D(vd) => self.check_local_vardec(vd).map(BlockItem::D),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Block { items })
    }

    fn check_local_vardec(&mut self, mut vd: VarDec) -> Result<VarDec> {
        let resolved = self.env.resolve(&vd.var_type);
        if resolved.is_void() {
            return Err(InnerSemError::VoidObject(vd.name.clone()).set_loc(vd.loc));
        }

        if vd.storage_class.is_extern() {
            // refers to an object with linkage defined elsewhere
            if let Some(prev) = self.env.get_symbol(&vd.name) {
                if prev.is_function() {
                    return Err(
                        InnerSemError::IdentifierRedeclaration(vd.name.clone()).set_loc(vd.loc)
                    );
                }
            } else {
                self.env.add_symbol(
                    vd.name.clone(),
                    Symbol {
                        sym_type: vd.var_type.clone(),
                        kind: SymbolKind::Static {
                            global: true,
                            defined: false,
                        },
                    },
                );
            }
            return Ok(vd);
        }

        if self.env.size_of(&resolved).is_none() {
            return Err(InnerSemError::IncompleteType(resolved.to_string()).set_loc(vd.loc));
        }

        self.env.add_symbol(
            vd.name.clone(),
            Symbol {
                sym_type: vd.var_type.clone(),
                kind: SymbolKind::Local {
                    is_register: vd.storage_class.is_register(),
                },
            },
        );

        vd.init = match vd.init {
            Some(Initializer::Scalar(exp)) => {
                if !resolved.is_scalar() {
                    return Err(InnerSemError::BadConversion(
                        exp.get_type_display(),
                        resolved.to_string(),
                    )
                    .set_loc(vd.loc));
                }
                let typed = self.check_exp_val(exp)?;
                let converted = self.convert_to(typed, &resolved, vd.loc)?;
                Some(Initializer::Scalar(converted))
            }
            Some(Initializer::List(_)) => {
                return Err(InnerSemError::Unsupported(
                    "brace initializers for local variables".to_owned(),
                )
                .set_loc(vd.loc));
            }
            None => None,
        };
        Ok(vd)
    }

    fn check_statement(&mut self, st: Statement) -> Result<Statement> {
        use Statement as S;
        match st {
            S::Compound(block) => self.check_block(block).map(S::Compound),
            S::Exp(e) => self.check_exp_val(e).map(S::Exp),
            S::If(mut if_st) => {
                if_st.condition = self.check_condition(if_st.condition)?;
                if_st.then = self.check_statement(*if_st.then).map(Box::new)?;
                if_st.els = match if_st.els {
                    Some(els) => Some(self.check_statement(*els).map(Box::new)?),
                    None => None,
                };
                Ok(S::If(if_st))
            }
            S::While(mut w) => {
                w.condition = self.check_condition(w.condition)?;
                w.body = self.check_statement(*w.body).map(Box::new)?;
                Ok(S::While(w))
            }
            S::DoWhile(mut d) => {
                d.body = self.check_statement(*d.body).map(Box::new)?;
                d.condition = self.check_condition(d.condition)?;
                Ok(S::DoWhile(d))
            }
            S::For(mut f) => {
                f.init = match f.init {
                    ForInit::InitDecl(vd) => ForInit::InitDecl(self.check_local_vardec(vd)?),
                    ForInit::InitExp(Some(e)) => ForInit::InitExp(Some(self.check_exp_val(e)?)),
                    ForInit::InitExp(None) => ForInit::InitExp(None),
                };
                f.condition = f
                    .condition
                    .map(|c| self.check_condition(c))
                    .transpose()?;
                f.post = f.post.map(|p| self.check_exp_val(p)).transpose()?;
                f.body = self.check_statement(*f.body).map(Box::new)?;
                Ok(S::For(f))
            }
            S::Switch(mut sw) => {
                let loc = sw.ctrl_exp.loc;
                let ctrl = self.check_exp_val(sw.ctrl_exp)?;
                let ctrl_t = self.env.resolve(ctrl.get_type());
                if !ctrl_t.is_integer() {
                    return Err(InnerSemError::NotAnInteger(ctrl_t.to_string()).set_loc(loc));
                }
                let promoted = promote(&ctrl_t);
                sw.ctrl_exp = self.convert_to(ctrl, &promoted, loc)?;

                // case constants convert to the controlling type; two that
                // collide after conversion are duplicates
                let mut seen = HashSet::new();
                for (value, _) in &mut sw.cases {
                    if let Some(v) = value {
                        let converted = Const::Long(*v).convert_to(&promoted).as_i64();
                        *value = Some(converted);
                        if !seen.insert(converted) {
                            return Err(InnerSemError::DuplicateCase(converted).set_loc(loc));
                        }
                    }
                }
                sw.body = self.check_statement(*sw.body).map(Box::new)?;
                Ok(S::Switch(sw))
            }
            S::Cased(mut cased) => {
                cased.body = self.check_statement(*cased.body).map(Box::new)?;
                Ok(S::Cased(cased))
            }
            S::DCased(mut dcased) => {
                dcased.body = self.check_statement(*dcased.body).map(Box::new)?;
                Ok(S::DCased(dcased))
            }
            S::Labeled(name, st, loc) => {
                let st = self.check_statement(*st).map(Box::new)?;
                Ok(S::Labeled(name, st, loc))
            }
            S::Return { exp, loc } => {
                let rtype = self.current_rtype.clone();
                let exp = match exp {
                    Some(e) => {
                        if rtype.is_void() {
                            return Err(InnerSemError::VoidReturn.set_loc(loc));
                        }
                        let typed = self.check_exp_val(e)?;
                        Some(self.convert_to(typed, &rtype, loc)?)
                    }
                    None => {
                        if !rtype.is_void() {
                            return Err(InnerSemError::MissingReturnValue.set_loc(loc));
                        }
                        None
                    }
                };
                Ok(S::Return { exp, loc })
            }
            S::Break { .. } | S::Continue { .. } | S::Goto { .. } | S::Null => Ok(st),
        }
    }

    fn check_condition(&mut self, exp: Exp) -> Result<Exp> {
        let loc = exp.loc;
        let typed = self.check_exp_val(exp)?;
        let t = self.env.resolve(typed.get_type());
        if !t.is_scalar() {
            return Err(InnerSemError::BadOperands("condition".to_owned()).set_loc(loc));
        }
        Ok(typed)
    }

    // ----- expressions -----

    /// Types an expression and applies array/function decay, for use in
    /// any context that needs the value.
    fn check_exp_val(&mut self, exp: Exp) -> Result<Exp> {
        let typed = self.check_exp(exp)?;
        Ok(self.decay(typed))
    }

    fn decay(&mut self, exp: Exp) -> Exp {
        let t = self.env.resolve(exp.get_type());
        match &t.kind {
            TypeKind::Array(elem, _) => {
                let elem = (**elem).clone();
                let loc = exp.loc;
                Exp::new(ExpKind::AddrOf(Box::new(exp)), loc).with_type(Type::pointer_to(elem))
            }
            TypeKind::Fun(_) => {
                let loc = exp.loc;
                let ptr = Type::pointer_to(t.clone());
                Exp::new(ExpKind::AddrOf(Box::new(exp)), loc).with_type(ptr)
            }
            _ => exp,
        }
    }

    /// Inserts a cast when the types differ structurally; rejects
    /// conversions the subset cannot express.
    fn convert_to(&mut self, exp: Exp, target: &Type, loc: Loc) -> Result<Exp> {
        let from = self.env.resolve(exp.get_type());
        let to = self.env.resolve(target);
        if self.types_compatible(&from, &to) {
            return Ok(exp);
        }
        let ok = (from.is_scalar() && to.is_scalar()) || to.is_void();
        if !ok {
            return Err(
                InnerSemError::BadConversion(from.to_string(), to.to_string()).set_loc(loc)
            );
        }
        Ok(Exp::new(ExpKind::Cast(to.clone(), Box::new(exp)), loc).with_type(to))
    }

    fn check_exp(&mut self, exp: Exp) -> Result<Exp> {
        let Exp { kind, loc, .. } = exp;
        match kind {
            ExpKind::Constant(c) => Ok(Exp::constant(c, loc).with_type(c.get_type())),
            ExpKind::StringLit { bytes, .. } => {
                let label = self.env.intern_string(&bytes);
                let ty = Type::pointer_to(Type::char_type());
                Ok(Exp::new(
                    ExpKind::StringLit {
                        bytes,
                        label: Some(label),
                    },
                    loc,
                )
                .with_type(ty))
            }
            ExpKind::Var(name) => {
                let sym = self
                    .env
                    .get_symbol(&name)
                    .ok_or_else(|| InnerSemError::VariableNotDeclared(name.clone()).set_loc(loc))?;
                let ty = match sym.kind {
                    SymbolKind::EnumConst(_) => Type::int(),
                    _ => sym.sym_type.clone(),
                };
                Ok(Exp::var(name, loc).with_type(ty))
            }
            ExpKind::Unary(op, inner) => self.check_unary(op, *inner, loc),
            ExpKind::Binary(op, lhs, rhs) => self.check_binary(op, *lhs, *rhs, loc),
            ExpKind::Assignment { op, lhs, rhs } => self.check_assignment(op, *lhs, *rhs, loc),
            ExpKind::Conditional {
                condition,
                then,
                els,
            } => self.check_conditional(*condition, *then, *els, loc),
            ExpKind::Call { callee, args } => self.check_call(*callee, args, loc),
            ExpKind::Subscript(base, index) => self.check_subscript(*base, *index, loc),
            ExpKind::Member {
                base,
                member,
                through_pointer,
            } => self.check_member(*base, member, through_pointer, loc),
            ExpKind::Deref(inner) => {
                let inner = self.check_exp_val(*inner)?;
                let t = self.env.resolve(inner.get_type());
                let Some(pointee) = t.pointee() else {
                    return Err(InnerSemError::NotAPointer(t.to_string()).set_loc(loc));
                };
                if pointee.is_void() {
                    return Err(InnerSemError::NotAPointer(t.to_string()).set_loc(loc));
                }
                let ty = pointee.clone();
                Ok(Exp::new(ExpKind::Deref(Box::new(inner)), loc).with_type(ty))
            }
            ExpKind::AddrOf(inner) => {
                let inner = self.check_exp(*inner)?;
                if let ExpKind::Var(name) = &inner.kind {
                    let sym = self.env.get_symbol(name);
                    if sym.is_some_and(Symbol::is_register) {
                        return Err(InnerSemError::AddressOfRegister(name.clone()).set_loc(loc));
                    }
                }
                let is_function = self.env.resolve(inner.get_type()).is_function();
                if !inner.is_lvalue() && !is_function {
                    return Err(InnerSemError::WrongLvalue("operand of &".to_owned()).set_loc(loc));
                }
                let ty = Type::pointer_to(inner.get_type().clone());
                Ok(Exp::new(ExpKind::AddrOf(Box::new(inner)), loc).with_type(ty))
            }
            ExpKind::Cast(target, inner) => {
                let resolved = self.env.resolve(&target);
                let inner = self.check_exp_val(*inner)?;
                let from = self.env.resolve(inner.get_type());
                let ok = resolved.is_void() || (resolved.is_scalar() && from.is_scalar());
                if !ok {
                    return Err(InnerSemError::BadConversion(
                        from.to_string(),
                        resolved.to_string(),
                    )
                    .set_loc(loc));
                }
                Ok(Exp::new(ExpKind::Cast(resolved.clone(), Box::new(inner)), loc)
                    .with_type(resolved))
            }
            ExpKind::SizeofExp(inner) => {
                let inner = self.check_exp(*inner)?;
                let size = self
                    .env
                    .size_of(inner.get_type())
                    .ok_or_else(|| {
                        InnerSemError::IncompleteType(inner.get_type().to_string()).set_loc(loc)
                    })?;
                Ok(Exp::constant(Const::ULong(size), loc).with_type(Type::ulong()))
            }
            ExpKind::SizeofType(target) => {
                let resolved = self.env.resolve(&target);
                let size = self.env.size_of(&resolved).ok_or_else(|| {
                    InnerSemError::IncompleteType(resolved.to_string()).set_loc(loc)
                })?;
                Ok(Exp::constant(Const::ULong(size), loc).with_type(Type::ulong()))
            }
            ExpKind::Comma(lhs, rhs) => {
                let lhs = self.check_exp_val(*lhs)?;
                let rhs = self.check_exp_val(*rhs)?;
                let ty = rhs.get_type().clone();
                Ok(Exp::new(ExpKind::Comma(Box::new(lhs), Box::new(rhs)), loc).with_type(ty))
            }
        }
    }

    fn check_unary(&mut self, op: UnaryOp, inner: Exp, loc: Loc) -> Result<Exp> {
        if op.is_incdec() {
            let inner = self.check_exp(inner)?;
            if !inner.is_lvalue() {
                return Err(
                    InnerSemError::WrongLvalue("operand of ++/--".to_owned()).set_loc(loc)
                );
            }
            let t = self.env.resolve(inner.get_type());
            if t.is_const {
                return Err(InnerSemError::ConstAssignment("operand of ++/--".to_owned())
                    .set_loc(loc));
            }
            if !t.is_scalar() {
                return Err(InnerSemError::BadOperands("++/--".to_owned()).set_loc(loc));
            }
            let ty = inner.get_type().clone();
            return Ok(Exp::new(ExpKind::Unary(op, Box::new(inner)), loc).with_type(ty));
        }

        let inner = self.check_exp_val(inner)?;
        let t = self.env.resolve(inner.get_type());
        match op {
            UnaryOp::LogicalNot => {
                if !t.is_scalar() {
                    return Err(InnerSemError::BadOperands("!".to_owned()).set_loc(loc));
                }
                Ok(Exp::new(ExpKind::Unary(op, Box::new(inner)), loc).with_type(Type::int()))
            }
            UnaryOp::Plus | UnaryOp::Negate | UnaryOp::Complement => {
                if !t.is_integer() {
                    return Err(InnerSemError::NotAnInteger(t.to_string()).set_loc(loc));
                }
                let promoted = promote(&t);
                let converted = self.convert_to(inner, &promoted, loc)?;
                Ok(Exp::new(ExpKind::Unary(op, Box::new(converted)), loc).with_type(promoted))
            }
            _ => unreachable!("inc/dec handled above"),
        }
    }

    fn check_binary(&mut self, op: BinaryOp, lhs: Exp, rhs: Exp, loc: Loc) -> Result<Exp> {
        let lhs = self.check_exp_val(lhs)?;
        let rhs = self.check_exp_val(rhs)?;
        let lt = self.env.resolve(lhs.get_type());
        let rt = self.env.resolve(rhs.get_type());

        if op.is_logical() {
            if !lt.is_scalar() || !rt.is_scalar() {
                return Err(InnerSemError::BadOperands("&&/||".to_owned()).set_loc(loc));
            }
            return Ok(Exp::binary(op, lhs, rhs).with_type(Type::int()));
        }

        if op.is_shift() {
            if !lt.is_integer() || !rt.is_integer() {
                return Err(InnerSemError::BadOperands("shift".to_owned()).set_loc(loc));
            }
            let promoted = promote(&lt);
            let lhs = self.convert_to(lhs, &promoted, loc)?;
            let rhs = self.convert_to(rhs, &Type::int(), loc)?;
            return Ok(Exp::binary(op, lhs, rhs).with_type(promoted));
        }

        if op.is_relational() {
            if lt.is_pointer() || rt.is_pointer() {
                // pointer comparison; an integer side must be a null constant
                let lhs = self.pointer_comparand(lhs, &lt, &rt, loc)?;
                let rhs = self.pointer_comparand(rhs, &rt, &lt, loc)?;
                return Ok(Exp::binary(op, lhs, rhs).with_type(Type::int()));
            }
            if !lt.is_integer() || !rt.is_integer() {
                return Err(InnerSemError::BadOperands("comparison".to_owned()).set_loc(loc));
            }
            let common = common_type(&promote(&lt), &promote(&rt));
            let lhs = self.convert_to(lhs, &common, loc)?;
            let rhs = self.convert_to(rhs, &common, loc)?;
            return Ok(Exp::binary(op, lhs, rhs).with_type(Type::int()));
        }

        // pointer arithmetic
        if matches!(op, BinaryOp::Add | BinaryOp::Subtract) && (lt.is_pointer() || rt.is_pointer())
        {
            return self.check_pointer_arith(op, lhs, lt, rhs, rt, loc);
        }

        if !lt.is_integer() || !rt.is_integer() {
            return Err(InnerSemError::BadOperands(format!("{op:?}")).set_loc(loc));
        }
        let common = common_type(&promote(&lt), &promote(&rt));
        let lhs = self.convert_to(lhs, &common, loc)?;
        let rhs = self.convert_to(rhs, &common, loc)?;
        Ok(Exp::binary(op, lhs, rhs).with_type(common))
    }

    fn pointer_comparand(&mut self, e: Exp, own: &Type, other: &Type, loc: Loc) -> Result<Exp> {
        if own.is_pointer() {
            return Ok(e);
        }
        if own.is_integer() && e.get_const().is_some_and(|c| c.is_zero()) {
            return self.convert_to(e, other, loc);
        }
        Err(InnerSemError::BadOperands("pointer comparison".to_owned()).set_loc(loc))
    }

    fn check_pointer_arith(
        &mut self,
        op: BinaryOp,
        lhs: Exp,
        lt: Type,
        rhs: Exp,
        rt: Type,
        loc: Loc,
    ) -> Result<Exp> {
        match (lt.is_pointer(), rt.is_pointer(), op) {
            (true, false, _) if rt.is_integer() => {
                self.require_complete_pointee(&lt, loc)?;
                let rhs = self.convert_to(rhs, &Type::long(), loc)?;
                Ok(Exp::binary(op, lhs, rhs).with_type(lt))
            }
            (false, true, BinaryOp::Add) if lt.is_integer() => {
                self.require_complete_pointee(&rt, loc)?;
                let lhs = self.convert_to(lhs, &Type::long(), loc)?;
                Ok(Exp::binary(op, lhs, rhs).with_type(rt))
            }
            (true, true, BinaryOp::Subtract) => {
                if !self.types_compatible(&lt, &rt) {
                    return Err(
                        InnerSemError::BadOperands("pointer subtraction".to_owned()).set_loc(loc)
                    );
                }
                self.require_complete_pointee(&lt, loc)?;
                Ok(Exp::binary(op, lhs, rhs).with_type(Type::long()))
            }
            _ => Err(InnerSemError::BadOperands("pointer arithmetic".to_owned()).set_loc(loc)),
        }
    }

    fn require_complete_pointee(&self, t: &Type, loc: Loc) -> Result<()> {
        let pointee = t.pointee().expect("caller checked pointer");
        if self.env.size_of(pointee).is_none() {
            return Err(InnerSemError::IncompleteType(pointee.to_string()).set_loc(loc));
        }
        Ok(())
    }

    fn check_assignment(
        &mut self,
        op: Option<BinaryOp>,
        lhs: Exp,
        rhs: Exp,
        loc: Loc,
    ) -> Result<Exp> {
        let lhs = self.check_exp(lhs)?;
        if !lhs.is_lvalue() {
            return Err(
                InnerSemError::WrongLvalue("left side of assignment".to_owned()).set_loc(loc)
            );
        }
        let lt = self.env.resolve(lhs.get_type());
        if lt.is_const {
            return Err(
                InnerSemError::ConstAssignment("left side of assignment".to_owned()).set_loc(loc)
            );
        }
        if lt.is_array() || !lt.is_scalar() {
            return Err(InnerSemError::BadOperands("assignment".to_owned()).set_loc(loc));
        }

        let rhs = self.check_exp_val(rhs)?;
        let rt = self.env.resolve(rhs.get_type());

        let rhs = match op {
            None => self.convert_to(rhs, &lt, loc)?,
            Some(bop) => {
                if bop.is_shift() {
                    if !lt.is_integer() || !rt.is_integer() {
                        return Err(InnerSemError::BadOperands("shift".to_owned()).set_loc(loc));
                    }
                    self.convert_to(rhs, &Type::int(), loc)?
                } else if lt.is_pointer() {
                    if !matches!(bop, BinaryOp::Add | BinaryOp::Subtract) || !rt.is_integer() {
                        return Err(InnerSemError::BadOperands(
                            "compound pointer assignment".to_owned(),
                        )
                        .set_loc(loc));
                    }
                    self.require_complete_pointee(&lt, loc)?;
                    self.convert_to(rhs, &Type::long(), loc)?
                } else {
                    if !lt.is_integer() || !rt.is_integer() {
                        return Err(
                            InnerSemError::BadOperands("compound assignment".to_owned())
                                .set_loc(loc),
                        );
                    }
                    let common = common_type(&promote(&lt), &promote(&rt));
                    self.convert_to(rhs, &common, loc)?
                }
            }
        };

        let ty = lhs.get_type().clone();
        Ok(Exp::new(
            ExpKind::Assignment {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            },
            loc,
        )
        .with_type(ty))
    }

    fn check_conditional(
        &mut self,
        condition: Exp,
        then: Exp,
        els: Exp,
        loc: Loc,
    ) -> Result<Exp> {
        let condition = self.check_condition(condition)?;
        let then = self.check_exp_val(then)?;
        let els = self.check_exp_val(els)?;
        let tt = self.env.resolve(then.get_type());
        let et = self.env.resolve(els.get_type());

        let (then, els, ty) = if tt.is_integer() && et.is_integer() {
            let common = common_type(&promote(&tt), &promote(&et));
            (
                self.convert_to(then, &common, loc)?,
                self.convert_to(els, &common, loc)?,
                common,
            )
        } else if tt.is_pointer() && et.is_pointer() {
            (then, els, tt)
        } else if tt.is_pointer() && et.is_integer() {
            let converted = self.convert_to(els, &tt, loc)?;
            (then, converted, tt)
        } else if tt.is_integer() && et.is_pointer() {
            let converted = self.convert_to(then, &et, loc)?;
            (converted, els, et)
        } else {
            return Err(InnerSemError::BadOperands("?:".to_owned()).set_loc(loc));
        };

        Ok(Exp::new(
            ExpKind::Conditional {
                condition: Box::new(condition),
                then: Box::new(then),
                els: Box::new(els),
            },
            loc,
        )
        .with_type(ty))
    }

    fn check_call(&mut self, callee: Exp, args: Vec<Exp>, loc: Loc) -> Result<Exp> {
        let callee = self.check_exp(callee)?;
        let ct = self.env.resolve(callee.get_type());
        let fun_type = match &ct.kind {
            TypeKind::Fun(ft) => ft.clone(),
            TypeKind::Pointer(inner) => match &self.env.resolve(inner).kind {
                TypeKind::Fun(ft) => ft.clone(),
                _ => {
                    return Err(
                        InnerSemError::VariableCall(callee_name(&callee)).set_loc(loc)
                    )
                }
            },
            _ => return Err(InnerSemError::VariableCall(callee_name(&callee)).set_loc(loc)),
        };

        let expected = fun_type.params.len();
        let got = args.len();
        if got < expected || (got > expected && !fun_type.variadic) {
            return Err(
                InnerSemError::ExpectedArgsCountButGot(expected, got, callee_name(&callee))
                    .set_loc(loc),
            );
        }

        let mut converted = Vec::with_capacity(args.len());
        for (i, arg) in args.into_iter().enumerate() {
            let arg_loc = arg.loc;
            let typed = self.check_exp_val(arg)?;
            let arg = if let Some(ptype) = fun_type.params.get(i) {
                let target = self.env.resolve(ptype);
                self.convert_to(typed, &target, arg_loc)?
            } else {
                // default argument promotions for the variadic tail
                let t = self.env.resolve(typed.get_type());
                if t.is_integer() {
                    let promoted = promote(&t);
                    self.convert_to(typed, &promoted, arg_loc)?
                } else {
                    typed
                }
            };
            converted.push(arg);
        }

        let ty = (*fun_type.return_type).clone();
        Ok(Exp::new(
            ExpKind::Call {
                callee: Box::new(callee),
                args: converted,
            },
            loc,
        )
        .with_type(ty))
    }

    fn check_subscript(&mut self, base: Exp, index: Exp, loc: Loc) -> Result<Exp> {
        let base = self.check_exp_val(base)?;
        let index = self.check_exp_val(index)?;
        let bt = self.env.resolve(base.get_type());
        let it = self.env.resolve(index.get_type());

        // one operand is the pointer, the other the index
        let (base, index, elem) = if bt.is_pointer() && it.is_integer() {
            let elem = bt.pointee().expect("checked").clone();
            (base, index, elem)
        } else if bt.is_integer() && it.is_pointer() {
            let elem = it.pointee().expect("checked").clone();
            (index, base, elem)
        } else {
            return Err(InnerSemError::BadOperands("subscript".to_owned()).set_loc(loc));
        };

        if self.env.size_of(&elem).is_none() {
            return Err(InnerSemError::IncompleteType(elem.to_string()).set_loc(loc));
        }
        let index = self.convert_to(index, &Type::long(), loc)?;
        Ok(
            Exp::new(ExpKind::Subscript(Box::new(base), Box::new(index)), loc)
                .with_type(elem),
        )
    }

    fn check_member(
        &mut self,
        base: Exp,
        member: Identifier,
        through_pointer: bool,
        loc: Loc,
    ) -> Result<Exp> {
        let (base, record_t, base_const) = if through_pointer {
            let base = self.check_exp_val(base)?;
            let bt = self.env.resolve(base.get_type());
            let Some(pointee) = bt.pointee() else {
                return Err(InnerSemError::NotAPointer(bt.to_string()).set_loc(loc));
            };
            let pointee = self.env.resolve(pointee);
            (base, pointee.clone(), pointee.is_const)
        } else {
            let base = self.check_exp(base)?;
            if !base.is_lvalue() {
                return Err(
                    InnerSemError::WrongLvalue("operand of member access".to_owned()).set_loc(loc)
                );
            }
            let bt = self.env.resolve(base.get_type());
            (base, bt.clone(), bt.is_const)
        };

        if !record_t.is_record() {
            return Err(InnerSemError::NotAStruct(record_t.to_string()).set_loc(loc));
        }
        let layout = self
            .env
            .layout_of(&record_t)
            .ok_or_else(|| InnerSemError::IncompleteType(record_t.to_string()).set_loc(loc))?;
        let member_layout = layout.member(&member).ok_or_else(|| {
            InnerSemError::UnknownMember(record_t.to_string(), member.clone()).set_loc(loc)
        })?;

        let mut ty = member_layout.mtype.clone();
        if base_const {
            ty = ty.into_const();
        }
        Ok(Exp::new(
            ExpKind::Member {
                base: Box::new(base),
                member,
                through_pointer,
            },
            loc,
        )
        .with_type(ty))
    }
}

fn callee_name(callee: &Exp) -> Identifier {
    match &callee.kind {
        ExpKind::Var(name) => name.clone(),
        _ => "<expression>".to_owned(),
    }
}

fn block_ends_in_return(block: &Block) -> bool {
    match block.items.last() {
        Some(BlockItem::S(st)) => statement_ends_in_return(st),
        _ => false,
    }
}

fn statement_ends_in_return(st: &Statement) -> bool {
    match st {
        Statement::Return { .. } => true,
        Statement::Compound(block) => block_ends_in_return(block),
        Statement::If(If {
            then,
            els: Some(els),
            ..
        }) => statement_ends_in_return(then) && statement_ends_in_return(els),
        Statement::Labeled(_, inner, _) => statement_ends_in_return(inner),
        _ => false,
    }
}

impl Exp {
    pub(super) fn get_type_display(&self) -> String {
        self.ty
            .as_ref()
            .map_or_else(|| "<untyped>".to_owned(), ToString::to_string)
    }
}
