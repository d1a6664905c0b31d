mod case_collection;
mod const_eval;
mod env;
mod goto;
mod loop_labeling;
mod name_resolution;
mod typecheck;
#[cfg(test)]
mod typecheck_tests;

use crate::ast::*;
use case_collection::collect_cases;
use goto::ensure_goto_correctness;
use loop_labeling::label_loops;
use name_resolution::name_resolution;
use thiserror::Error;
use typecheck::check_types;

pub use env::{
    round_up, Env, MemberLayout, RecordLayout, StaticInit, StaticItem, StaticVariable, Symbol,
    SymbolKind, Warning,
};

pub type Result<T> = std::result::Result<T, SemAnalysisError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum InnerSemError {
    #[error("redeclaration of {0}")]
    IdentifierRedeclaration(Identifier),
    #[error("use of undeclared identifier {0}")]
    VariableNotDeclared(Identifier),
    #[error("call to undeclared function {0}")]
    UndeclaredFunction(Identifier),
    #[error("{0} is not an lvalue")]
    WrongLvalue(String),
    #[error("assignment to const-qualified {0}")]
    ConstAssignment(String),
    #[error("label {0} redeclared")]
    LabelRedeclaration(Identifier),
    #[error("goto to unknown label {0}")]
    UnknownLabel(Identifier),
    #[error("duplicate case value {0}")]
    DuplicateCase(i64),
    #[error("more than one default in switch")]
    DuplicateDefault,
    #[error("case label not inside a switch")]
    CaseNotInSwitch,
    #[error("default label not inside a switch")]
    DefaultNotInSwitch,
    #[error("case label is not an integer constant expression")]
    NotAConstCase,
    #[error("break statement outside of a loop or switch")]
    BreakOutsideOfLoop,
    #[error("continue statement outside of a loop")]
    ContinueOutsideOfLoop,
    #[error("incompatible redeclaration of function {0}")]
    IncompatibleFunDec(Identifier),
    #[error("redefinition of function {0}")]
    FunctionRedefinition(Identifier),
    #[error("called object {0} is not a function")]
    VariableCall(Identifier),
    #[error("function {2} expects {0} arguments, but {1} were given")]
    ExpectedArgsCountButGot(usize, usize, Identifier),
    #[error("global initializer for {0} is not a constant expression")]
    NonConstantInit(Identifier),
    #[error("conflicting linkage for {0}")]
    ConflictingLinkage(Identifier),
    #[error("extern declaration of {0} carries an initializer")]
    InitOnExternVar(Identifier),
    #[error("storage class not allowed in a for loop initializer")]
    StorageInForInit,
    #[error("local variable {0} declared static")]
    StaticLocal(Identifier),
    #[error("variable {0} declared void")]
    VoidObject(Identifier),
    #[error("{0} has incomplete type")]
    IncompleteType(String),
    #[error("no member named {1} in {0}")]
    UnknownMember(String, Identifier),
    #[error("member access on non-struct value of type {0}")]
    NotAStruct(String),
    #[error("cannot dereference value of type {0}")]
    NotAPointer(String),
    #[error("operand of type {0} where an integer is required")]
    NotAnInteger(String),
    #[error("invalid operands to {0}")]
    BadOperands(String),
    #[error("cannot take the address of register variable {0}")]
    AddressOfRegister(Identifier),
    #[error("type {0} cannot be converted to {1}")]
    BadConversion(String, String),
    #[error("void function returns a value")]
    VoidReturn,
    #[error("non-void function returns without a value")]
    MissingReturnValue,
    #[error("{0}")]
    Unsupported(String),
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{inner}")]
pub struct SemAnalysisError {
    pub inner: InnerSemError,
    pub loc: Loc,
}

impl SemAnalysisError {
    pub fn get_loc(&self) -> Loc {
        self.loc
    }
}

impl InnerSemError {
    pub fn set_loc(self, loc: Loc) -> SemAnalysisError {
        SemAnalysisError { inner: self, loc }
    }
}

/// Runs the semantic passes in order. The returned AST has every
/// expression typed; the [`Env`] carries everything the IR generator and
/// the backend need besides the tree itself.
pub fn validate(ast: Ast) -> Result<(Ast, Env)> {
    let (ast, enums) = name_resolution(ast)?;
    let ast = label_loops(ast, &enums)?;
    let ast = collect_cases(ast)?;
    ensure_goto_correctness(&ast)?;
    check_types(ast, enums)
}
