use super::name_resolution::EnumConsts;
use super::{const_eval, InnerSemError, Result};
use crate::ast::*;

#[derive(Default)]
struct LabelGenerator {
    counter: u64,
    loop_stack: Vec<Identifier>,
    switch_stack: Vec<Identifier>,
    ctx_stack: Vec<GeneratorCtx>,
    ctx: GeneratorCtx,
}

#[derive(Default, Copy, Clone)]
enum GeneratorCtx {
    Switch,
    Loop,
    #[default]
    None,
}

impl LabelGenerator {
    fn label_continue(&self) -> Option<Identifier> {
        self.loop_stack.last().map(|ll| format!("continue_{ll}"))
    }

    fn label_break(&self) -> Option<Identifier> {
        match self.ctx {
            GeneratorCtx::Switch => self.switch_stack.last().map(|sl| format!("break_{sl}")),
            GeneratorCtx::Loop => self.loop_stack.last().map(|ll| format!("break_{ll}")),
            GeneratorCtx::None => None,
        }
    }

    fn label_case(&self, value: i64) -> Option<Identifier> {
        let sign = if value < 0 { "m" } else { "" };
        let abs = value.unsigned_abs();
        self.switch_stack
            .last()
            .map(|sl| format!("case_{sign}{abs}_{sl}"))
    }

    fn label_default_case(&self) -> Option<Identifier> {
        self.switch_stack
            .last()
            .map(|sl| format!("case_default_{sl}"))
    }

    fn new_switch_ctx(&mut self) -> Identifier {
        self.ctx_stack.push(self.ctx);
        self.ctx = GeneratorCtx::Switch;
        self.counter += 1;
        let label = format!("switch_label.{}", self.counter);
        self.switch_stack.push(label.clone());
        label
    }

    fn new_loop_ctx(&mut self) -> Identifier {
        self.ctx_stack.push(self.ctx);
        self.ctx = GeneratorCtx::Loop;
        self.counter += 1;
        let label = format!("loop_label.{}", self.counter);
        self.loop_stack.push(label.clone());
        label
    }

    fn exit_ctx(&mut self) {
        match self.ctx {
            GeneratorCtx::Loop => {
                self.loop_stack.pop();
            }
            GeneratorCtx::Switch => {
                self.switch_stack.pop();
            }
            GeneratorCtx::None => (),
        }
        if let Some(old) = self.ctx_stack.pop() {
            self.ctx = old;
        }
    }
}

struct Labeler<'a> {
    ng: LabelGenerator,
    enums: &'a EnumConsts,
}

pub fn label_loops(ast: Ast, enums: &EnumConsts) -> Result<Ast> {
    let Ast { declarations } = ast;
    let mut labeler = Labeler {
        ng: LabelGenerator::default(),
        enums,
    };
    let declarations = declarations
        .into_iter()
        .map(|dec| labeler.label_toplevel(dec))
        .collect::<Result<Vec<_>>>()?;
    Ok(Ast { declarations })
}

impl Labeler<'_> {
    fn label_toplevel(&mut self, dec: Declaration) -> Result<Declaration> {
        match dec {
            Declaration::Fun(mut fundec) => {
                fundec.body = fundec
                    .body
                    .map(|block| self.label_block(block))
                    .transpose()?;
                Ok(Declaration::Fun(fundec))
            }
            _ => Ok(dec),
        }
    }

    fn label_block(&mut self, block: Block) -> Result<Block> {
        let items = block
            .items
            .into_iter()
            .map(|item| match item {
                BlockItem::S(st) => self.label_statement(st).map(BlockItem::S),
                BlockItem::D(_) => Ok(item),
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Block { items })
    }

    fn label_statement(&mut self, statement: Statement) -> Result<Statement> {
        use Statement as S;
        match statement {
            S::Labeled(label, st, loc) => self
                .label_statement(*st)
                .map(Box::new)
                .map(|st| S::Labeled(label, st, loc)),
            S::Break { loc, .. } => {
                let label = self
                    .ng
                    .label_break()
                    .ok_or_else(|| InnerSemError::BreakOutsideOfLoop.set_loc(loc))?;
                Ok(S::Break { label, loc })
            }
            S::Continue { loc, .. } => {
                let label = self
                    .ng
                    .label_continue()
                    .ok_or_else(|| InnerSemError::ContinueOutsideOfLoop.set_loc(loc))?;
                Ok(S::Continue { label, loc })
            }
            S::Compound(block) => self.label_block(block).map(S::Compound),
            S::Cased(mut cased) => {
                let value = const_eval::eval(&cased.exp, self.enums)
                    .ok_or_else(|| InnerSemError::NotAConstCase.set_loc(cased.loc))?;
                cased.exp = Exp::constant(Const::from_signed(value), cased.loc);
                cased.label = self
                    .ng
                    .label_case(value)
                    .ok_or_else(|| InnerSemError::CaseNotInSwitch.set_loc(cased.loc))?;
                cased.body = self.label_statement(*cased.body).map(Box::new)?;
                Ok(S::Cased(cased))
            }
            S::DCased(mut dcased) => {
                dcased.label = self
                    .ng
                    .label_default_case()
                    .ok_or_else(|| InnerSemError::DefaultNotInSwitch.set_loc(dcased.loc))?;
                dcased.body = self.label_statement(*dcased.body).map(Box::new)?;
                Ok(S::DCased(dcased))
            }
            S::Switch(mut switch) => {
                switch.label = self.ng.new_switch_ctx();
                switch.body = self.label_statement(*switch.body).map(Box::new)?;
                self.ng.exit_ctx();
                Ok(S::Switch(switch))
            }
            S::If(mut if_st) => {
                if_st.then = self.label_statement(*if_st.then).map(Box::new)?;
                if_st.els = match if_st.els {
                    Some(els) => Some(self.label_statement(*els).map(Box::new)?),
                    None => None,
                };
                Ok(S::If(if_st))
            }
            S::For(mut for_st) => {
                for_st.label = self.ng.new_loop_ctx();
                for_st.body = self.label_statement(*for_st.body).map(Box::new)?;
                self.ng.exit_ctx();
                Ok(S::For(for_st))
            }
            S::DoWhile(mut dowhile) => {
                dowhile.label = self.ng.new_loop_ctx();
                dowhile.body = self.label_statement(*dowhile.body).map(Box::new)?;
                self.ng.exit_ctx();
                Ok(S::DoWhile(dowhile))
            }
            S::While(mut while_st) => {
                while_st.label = self.ng.new_loop_ctx();
                while_st.body = self.label_statement(*while_st.body).map(Box::new)?;
                self.ng.exit_ctx();
                Ok(S::While(while_st))
            }
            S::Null | S::Return { .. } | S::Goto { .. } | S::Exp(_) => Ok(statement),
        }
    }
}
