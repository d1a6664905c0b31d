mod asm_ast;
mod gen;

pub use asm_ast::*;
pub use gen::codegen;
